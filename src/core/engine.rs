//! Rate derivation over ordered reading sequences.
//!
//! Every function here is total: anomalous input (out-of-order timestamps,
//! decreasing volume, empty windows) yields clamped zero values, never an
//! error. Malformed numeric input is rejected upstream at the ingestion
//! boundary and does not reach this module.

use tracing::warn;

use crate::models::reading::{DerivedRecord, Reading, Severity};

/// Default single-pole smoothing factor. Weights recent readings while
/// damping per-sample noise; overridable through `smoothing_alpha` config.
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.25;

const MS_PER_MINUTE: f64 = 60_000.0;

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub smoothing_alpha: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
        }
    }
}

impl EngineConfig {
    /// Builds a config with the given smoothing factor, falling back to the
    /// default when the value is outside (0, 1].
    pub fn new(smoothing_alpha: f64) -> Self {
        if smoothing_alpha > 0.0 && smoothing_alpha <= 1.0 {
            Self { smoothing_alpha }
        } else {
            warn!(smoothing_alpha, "smoothing alpha outside (0, 1], using default");
            Self::default()
        }
    }
}

/// Whole minutes elapsed from `start` to `at`, rounded, clamped to >= 0.
pub fn elapsed_minutes(start: chrono::DateTime<chrono::Utc>, at: chrono::DateTime<chrono::Utc>) -> i64 {
    let ms = at.signed_duration_since(start).num_milliseconds() as f64;
    let minutes = (ms / MS_PER_MINUTE).round() as i64;
    minutes.max(0)
}

/// Point-to-point rate of loss in mL/min between two consecutive readings.
///
/// Cumulative blood loss is physically non-decreasing, so a negative volume
/// delta is sensor noise and clamps to 0. A non-positive time delta (tie or
/// out-of-order arrival) also yields 0: a rate must never be negative or
/// undefined.
pub fn instantaneous_rate(previous: &Reading, current: &Reading) -> f64 {
    let delta_volume = (current.cumulative_volume_ml - previous.cumulative_volume_ml).max(0.0);
    let delta_minutes = current
        .timestamp
        .signed_duration_since(previous.timestamp)
        .num_milliseconds() as f64
        / MS_PER_MINUTE;
    if delta_minutes > 0.0 {
        delta_volume / delta_minutes
    } else {
        0.0
    }
}

/// One step of the exponential smoothing fold.
///
/// The previous smoothed value is threaded through explicitly so the fold is
/// testable in isolation and carries no hidden state.
pub fn smooth_step(previous_smoothed: f64, rate: f64, alpha: f64) -> f64 {
    previous_smoothed * (1.0 - alpha) + rate * alpha
}

/// Derives the full record sequence for an ordered slice of readings.
///
/// Pure and idempotent: identical input always produces identical output.
/// The incremental per-append path in the session must agree with this
/// function exactly when fed the same sequence from session start.
pub fn derive(readings: &[Reading], config: &EngineConfig) -> Vec<DerivedRecord> {
    let start = match readings.first() {
        Some(first) => first.timestamp,
        None => return Vec::new(),
    };

    let mut out = Vec::with_capacity(readings.len());
    let mut smoothed = 0.0;
    for (i, reading) in readings.iter().enumerate() {
        let rate = if i == 0 {
            0.0
        } else {
            instantaneous_rate(&readings[i - 1], reading)
        };
        smoothed = if i == 0 {
            rate
        } else {
            smooth_step(smoothed, rate, config.smoothing_alpha)
        };
        out.push(DerivedRecord {
            patient_id: reading.patient_id.clone(),
            timestamp: reading.timestamp,
            cumulative_volume_ml: reading.cumulative_volume_ml,
            instantaneous_rate_ml_per_min: rate,
            smoothed_rate_ml_per_min: smoothed,
            elapsed_minutes: elapsed_minutes(start, reading.timestamp),
            severity: Severity::classify(reading.cumulative_volume_ml),
        });
    }
    out
}
