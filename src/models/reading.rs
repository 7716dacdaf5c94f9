use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::IngestError;

// ===== Telemetry Models =====

/// One raw telemetry sample: cumulative blood loss for a patient at an instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub patient_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub cumulative_volume_ml: f64,
}

impl Reading {
    pub fn new(patient_id: impl Into<String>, timestamp: DateTime<Utc>, cumulative_volume_ml: f64) -> Self {
        Self {
            patient_id: patient_id.into(),
            timestamp,
            cumulative_volume_ml,
        }
    }
}

/// Wire form of a reading as posted by a sensor bridge or upstream feed.
///
/// Timestamps travel as milliseconds since the Unix epoch.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReadingInput {
    #[validate(length(min = 1, max = 64))]
    pub patient_id: String,
    pub timestamp_ms: i64,
    #[validate(range(min = 0.0))]
    pub cumulative_volume_ml: f64,
}

impl ReadingInput {
    /// Converts the wire form into a validated `Reading`.
    ///
    /// Non-finite or negative volumes and unrepresentable timestamps are
    /// rejected here, at the ingestion boundary, so the derivation engine
    /// never sees them.
    pub fn into_reading(self) -> Result<Reading, IngestError> {
        if !self.cumulative_volume_ml.is_finite() || self.cumulative_volume_ml < 0.0 {
            return Err(IngestError::InvalidVolume(self.cumulative_volume_ml));
        }
        let timestamp = Utc
            .timestamp_millis_opt(self.timestamp_ms)
            .single()
            .ok_or(IngestError::InvalidTimestamp(self.timestamp_ms))?;
        Ok(Reading::new(self.patient_id, timestamp, self.cumulative_volume_ml))
    }
}

/// A reading together with everything the pipeline derives for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedRecord {
    pub patient_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub cumulative_volume_ml: f64,
    pub instantaneous_rate_ml_per_min: f64,
    pub smoothed_rate_ml_per_min: f64,
    pub elapsed_minutes: i64,
    pub severity: Severity,
}

// ===== Severity Classification =====

/// Hemorrhage severity tier, classified from cumulative volume alone.
///
/// The ordering is part of the data contract: trend logic compares tiers,
/// so `Normal < Minor < Moderate < Major` must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "Normal bleeding")]
    Normal,
    #[serde(rename = "Minor Hemorrhage")]
    Minor,
    #[serde(rename = "Moderate Hemorrhage")]
    Moderate,
    #[serde(rename = "Major Hemorrhage")]
    Major,
}

impl Severity {
    /// Classifies a cumulative volume in mL. Tier lower bounds are inclusive.
    pub fn classify(cumulative_volume_ml: f64) -> Self {
        if cumulative_volume_ml >= 500.0 {
            Severity::Major
        } else if cumulative_volume_ml >= 250.0 {
            Severity::Moderate
        } else if cumulative_volume_ml >= 100.0 {
            Severity::Minor
        } else {
            Severity::Normal
        }
    }

    /// 1 = Normal .. 4 = Major.
    pub fn ordinal(self) -> u8 {
        match self {
            Severity::Normal => 1,
            Severity::Minor => 2,
            Severity::Moderate => 3,
            Severity::Major => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Normal => "Normal bleeding",
            Severity::Minor => "Minor Hemorrhage",
            Severity::Moderate => "Moderate Hemorrhage",
            Severity::Major => "Major Hemorrhage",
        }
    }

    pub fn alert_label(self) -> &'static str {
        match self {
            Severity::Normal => "NORMAL",
            Severity::Minor => "CAUTION",
            Severity::Moderate => "WARNING",
            Severity::Major => "CRITICAL",
        }
    }

    /// Stable display color for dashboards.
    pub fn display_color(self) -> &'static str {
        match self {
            Severity::Normal => "#4caf50",
            Severity::Minor => "#ffc107",
            Severity::Moderate => "#ff9800",
            Severity::Major => "#f44336",
        }
    }
}

// ===== Trend Summary =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    RapidIncrease,
    Increasing,
    SlowIncrease,
    Stable,
    Decreasing,
}

/// Trend and acceleration over the trailing few readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub average_rate_ml_per_min: f64,
    pub trend: Trend,
    pub acceleration: f64,
}
