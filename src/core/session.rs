//! Per-patient monitoring sessions and the session manager.
//!
//! Exactly one session is active per patient; all mutations to a session's
//! buffer are serialized through an async mutex, while distinct patients are
//! processed in parallel.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::config::MonitoringConfig;
use crate::core::buffer::SessionBuffer;
use crate::core::engine::{self, EngineConfig};
use crate::core::trend::trend_summary;
use crate::error::IngestError;
use crate::models::reading::{DerivedRecord, Reading, TrendSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Paused,
}

/// The retained derived sequence handed to the export/archive path when a
/// session is stopped or replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionArchive {
    pub session_id: Uuid,
    pub patient_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub records: Vec<DerivedRecord>,
}

impl SessionArchive {
    pub fn points(&self) -> usize {
        self.records.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub patient_id: String,
    pub state: SessionState,
    pub started_at: Option<DateTime<Utc>>,
    pub window_minutes: f64,
    pub retained_points: usize,
    pub latest: Option<DerivedRecord>,
}

// ===== Monitor Session =====

/// One patient's monitoring session: the windowed buffer plus the smoothing
/// chain carried forward from the true session start.
///
/// The chain state (`last_reading`, `last_smoothed`) is independent of the
/// display window: eviction and window changes never reset it, so the
/// smoothed rate reflects physiological trend rather than display settings.
#[derive(Debug)]
pub struct MonitorSession {
    session_id: Uuid,
    patient_id: String,
    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    last_reading: Option<Reading>,
    last_smoothed: f64,
    buffer: SessionBuffer,
    engine: EngineConfig,
    trend_points: usize,
}

impl MonitorSession {
    pub fn new(patient_id: impl Into<String>, monitoring: &MonitoringConfig) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            patient_id: patient_id.into(),
            state: SessionState::Active,
            started_at: None,
            last_reading: None,
            last_smoothed: 0.0,
            buffer: SessionBuffer::new(monitoring.window_minutes, monitoring.max_retained_points),
            engine: EngineConfig::new(monitoring.smoothing_alpha),
            trend_points: monitoring.trend_points,
        }
    }

    /// Appends a validated reading and derives its record incrementally.
    ///
    /// This is the optimized per-append path; it must agree exactly with a
    /// full `engine::derive` over the same sequence from session start.
    pub fn ingest(&mut self, reading: Reading) -> Result<DerivedRecord, IngestError> {
        if self.state == SessionState::Paused {
            return Err(IngestError::SessionPaused(self.patient_id.clone()));
        }

        let started = *self.started_at.get_or_insert(reading.timestamp);
        let (rate, smoothed) = match &self.last_reading {
            None => (0.0, 0.0),
            Some(previous) => {
                let rate = engine::instantaneous_rate(previous, &reading);
                let smoothed = engine::smooth_step(self.last_smoothed, rate, self.engine.smoothing_alpha);
                (rate, smoothed)
            }
        };

        let record = DerivedRecord {
            patient_id: self.patient_id.clone(),
            timestamp: reading.timestamp,
            cumulative_volume_ml: reading.cumulative_volume_ml,
            instantaneous_rate_ml_per_min: rate,
            smoothed_rate_ml_per_min: smoothed,
            elapsed_minutes: engine::elapsed_minutes(started, reading.timestamp),
            severity: crate::models::reading::Severity::classify(reading.cumulative_volume_ml),
        };

        self.buffer.push(record.clone());
        self.last_reading = Some(reading);
        self.last_smoothed = smoothed;
        Ok(record)
    }

    pub fn pause(&mut self) {
        self.state = SessionState::Paused;
    }

    /// Resumes appending. Elapsed time keeps counting from the original
    /// session start; nothing is recomputed.
    pub fn resume(&mut self) {
        self.state = SessionState::Active;
    }

    pub fn set_window(&mut self, window_minutes: f64) {
        self.buffer.set_window(window_minutes);
    }

    pub fn window(&self, now: DateTime<Utc>) -> Vec<DerivedRecord> {
        self.buffer.window(now)
    }

    pub fn history(&self, now: DateTime<Utc>, minutes: Option<f64>) -> Vec<DerivedRecord> {
        match minutes {
            Some(m) => self.buffer.window_as_of(now, m),
            None => self.buffer.window(now),
        }
    }

    pub fn trend(&self) -> TrendSummary {
        trend_summary(&self.buffer.tail(self.trend_points), self.trend_points)
    }

    pub fn archive(&self) -> SessionArchive {
        SessionArchive {
            session_id: self.session_id,
            patient_id: self.patient_id.clone(),
            started_at: self.started_at,
            records: self.buffer.snapshot(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.session_id,
            patient_id: self.patient_id.clone(),
            state: self.state,
            started_at: self.started_at,
            window_minutes: self.buffer.window_minutes(),
            retained_points: self.buffer.len(),
            latest: self.buffer.latest().cloned(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

// ===== Session Manager =====

type SharedSession = Arc<Mutex<MonitorSession>>;

/// Owns every active session, keyed by patient id.
pub struct SessionManager {
    sessions: DashMap<String, SharedSession>,
    monitoring: MonitoringConfig,
}

impl SessionManager {
    pub fn new(monitoring: MonitoringConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            monitoring,
        }
    }

    /// Routes a validated reading into the patient's session, creating one
    /// on first contact (ingest is what starts monitoring for a patient the
    /// collaborators have not explicitly started).
    pub async fn ingest(&self, reading: Reading) -> Result<DerivedRecord, IngestError> {
        let session = {
            let entry = self
                .sessions
                .entry(reading.patient_id.clone())
                .or_insert_with(|| {
                    info!(patient_id = %reading.patient_id, "starting monitoring session on first reading");
                    Arc::new(Mutex::new(MonitorSession::new(
                        reading.patient_id.clone(),
                        &self.monitoring,
                    )))
                });
            Arc::clone(entry.value())
        };
        let mut session = session.lock().await;
        session.ingest(reading)
    }

    /// Starts a fresh session, atomically replacing any existing one for the
    /// patient. The replaced session's data is returned for archiving, never
    /// merged into the new one.
    pub async fn start_session(
        &self,
        patient_id: &str,
        window_minutes: Option<f64>,
        smoothing_alpha: Option<f64>,
    ) -> (Uuid, Option<SessionArchive>) {
        let mut monitoring = self.monitoring.clone();
        if let Some(minutes) = window_minutes {
            monitoring.window_minutes = minutes;
        }
        if let Some(alpha) = smoothing_alpha {
            monitoring.smoothing_alpha = alpha;
        }

        let session = MonitorSession::new(patient_id, &monitoring);
        let session_id = session.session_id();
        let replaced = self
            .sessions
            .insert(patient_id.to_string(), Arc::new(Mutex::new(session)));

        let archive = match replaced {
            Some(old) => {
                let old = old.lock().await;
                let archive = old.archive();
                info!(
                    patient_id,
                    replaced_points = archive.points(),
                    "replaced existing monitoring session"
                );
                Some(archive)
            }
            None => {
                info!(patient_id, "started monitoring session");
                None
            }
        };
        (session_id, archive)
    }

    /// Stops monitoring and hands back the retained data for export.
    pub async fn stop_session(&self, patient_id: &str) -> Result<SessionArchive, IngestError> {
        let (_, session) = self
            .sessions
            .remove(patient_id)
            .ok_or_else(|| IngestError::NoSession(patient_id.to_string()))?;
        let session = session.lock().await;
        info!(patient_id, points = session.status().retained_points, "stopped monitoring session");
        Ok(session.archive())
    }

    pub async fn pause_session(&self, patient_id: &str) -> Result<(), IngestError> {
        self.session(patient_id)?.lock().await.pause();
        Ok(())
    }

    pub async fn resume_session(&self, patient_id: &str) -> Result<(), IngestError> {
        self.session(patient_id)?.lock().await.resume();
        Ok(())
    }

    pub async fn set_window(&self, patient_id: &str, window_minutes: f64) -> Result<(), IngestError> {
        self.session(patient_id)?.lock().await.set_window(window_minutes);
        Ok(())
    }

    pub async fn history(
        &self,
        patient_id: &str,
        now: DateTime<Utc>,
        minutes: Option<f64>,
    ) -> Result<Vec<DerivedRecord>, IngestError> {
        Ok(self.session(patient_id)?.lock().await.history(now, minutes))
    }

    pub async fn trend(&self, patient_id: &str) -> Result<TrendSummary, IngestError> {
        Ok(self.session(patient_id)?.lock().await.trend())
    }

    pub async fn status(&self, patient_id: &str) -> Result<SessionStatus, IngestError> {
        Ok(self.session(patient_id)?.lock().await.status())
    }

    pub async fn archive(&self, patient_id: &str) -> Result<SessionArchive, IngestError> {
        Ok(self.session(patient_id)?.lock().await.archive())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn session(&self, patient_id: &str) -> Result<SharedSession, IngestError> {
        self.sessions
            .get(patient_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| IngestError::NoSession(patient_id.to_string()))
    }
}
