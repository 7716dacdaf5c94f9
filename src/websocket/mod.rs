//! Real-time fan-out of derived records to connected dashboard clients.

pub mod server;
pub mod session;

use crate::models::reading::DerivedRecord;

/// Envelope pushed to every client when a reading has been derived.
pub fn real_time_message(record: &DerivedRecord) -> String {
    serde_json::json!({
        "type": "real_time_data",
        "data": record,
        "alert": {
            "level": record.severity.alert_label(),
            "ordinal": record.severity.ordinal(),
            "color": record.severity.display_color(),
        },
    })
    .to_string()
}

/// Greeting envelope sent once per connection.
pub fn connection_established_message(mode: &str) -> String {
    serde_json::json!({
        "type": "connection_established",
        "message": "Connected to HemoDrop WebSocket",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "mode": mode,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::reading::Severity;

    #[test]
    fn real_time_envelope_carries_alert_metadata() {
        let record = DerivedRecord {
            patient_id: "p-1".into(),
            timestamp: Utc.timestamp_millis_opt(0).unwrap(),
            cumulative_volume_ml: 510.0,
            instantaneous_rate_ml_per_min: 12.0,
            smoothed_rate_ml_per_min: 9.5,
            elapsed_minutes: 42,
            severity: Severity::Major,
        };
        let value: serde_json::Value = serde_json::from_str(&real_time_message(&record)).unwrap();
        assert_eq!(value["type"], "real_time_data");
        assert_eq!(value["data"]["severity"], "Major Hemorrhage");
        assert_eq!(value["alert"]["level"], "CRITICAL");
        assert_eq!(value["alert"]["ordinal"], 4);
    }

    #[test]
    fn connection_established_reports_mode() {
        let value: serde_json::Value =
            serde_json::from_str(&connection_established_message("simulation")).unwrap();
        assert_eq!(value["type"], "connection_established");
        assert_eq!(value["mode"], "simulation");
    }
}
