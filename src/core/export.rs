//! Export collaborator: serializes archived sessions for external use.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::session::SessionArchive;
use crate::models::reading::DerivedRecord;

const CSV_HEADER: &str = "timestamp,patient_id,elapsed_minutes,cumulative_volume_ml,instantaneous_rate_ml_per_min,smoothed_rate_ml_per_min,severity,alert";

#[derive(Serialize)]
struct ExportDocument<'a> {
    session_id: Uuid,
    patient_id: &'a str,
    started_at: Option<DateTime<Utc>>,
    exported_at: DateTime<Utc>,
    data_points: usize,
    records: &'a [DerivedRecord],
}

/// Renders the full derived record sequence as CSV, one row per reading.
pub fn to_csv(archive: &SessionArchive) -> String {
    let mut out = String::with_capacity(64 * (archive.records.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');
    for record in &archive.records {
        // patient_id is the only free-form field, quote it.
        let _ = writeln!(
            out,
            "{},\"{}\",{},{:.2},{:.2},{:.2},{},{}",
            record.timestamp.to_rfc3339(),
            record.patient_id,
            record.elapsed_minutes,
            record.cumulative_volume_ml,
            record.instantaneous_rate_ml_per_min,
            record.smoothed_rate_ml_per_min,
            record.severity.label(),
            record.severity.alert_label(),
        );
    }
    out
}

/// Renders the archive as a pretty-printed JSON document.
pub fn to_json(archive: &SessionArchive) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&ExportDocument {
        session_id: archive.session_id,
        patient_id: &archive.patient_id,
        started_at: archive.started_at,
        exported_at: Utc::now(),
        data_points: archive.records.len(),
        records: &archive.records,
    })
}
