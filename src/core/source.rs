//! Reading sources: where telemetry comes from.
//!
//! The pipeline depends only on the `ReadingSource` capability; whether the
//! readings come from the in-process simulator or a live upstream feed is
//! the caller's wiring decision. Scheduling is likewise the caller's job:
//! the pump task decides when to poll, the core only exposes synchronous
//! `ingest`/`window` calls.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};
use url::Url;

use crate::core::session::SessionManager;
use crate::models::reading::{DerivedRecord, Reading, ReadingInput};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// A producer of readings for one monitoring stream.
#[cfg_attr(test, mockall::automock)]
pub trait ReadingSource: Send {
    /// The next reading, if one is available right now.
    fn next_reading(&mut self) -> Option<Reading>;
}

// ===== Simulated Source =====

/// Synthetic blood-loss generator: a noisy ramp toward a volume ceiling,
/// clamped so the cumulative series stays non-negative and non-decreasing.
pub struct SimulatedSource {
    patient_id: String,
    max_volume_ml: f64,
    ramp_ml_per_tick: f64,
    volume: f64,
    rng: StdRng,
}

impl SimulatedSource {
    pub fn new(patient_id: impl Into<String>, max_volume_ml: f64, ramp_ml_per_tick: f64) -> Self {
        Self::with_rng(patient_id, max_volume_ml, ramp_ml_per_tick, StdRng::from_entropy())
    }

    /// Deterministic variant for tests.
    pub fn seeded(
        patient_id: impl Into<String>,
        max_volume_ml: f64,
        ramp_ml_per_tick: f64,
        seed: u64,
    ) -> Self {
        Self::with_rng(patient_id, max_volume_ml, ramp_ml_per_tick, StdRng::seed_from_u64(seed))
    }

    fn with_rng(patient_id: impl Into<String>, max_volume_ml: f64, ramp_ml_per_tick: f64, rng: StdRng) -> Self {
        Self {
            patient_id: patient_id.into(),
            max_volume_ml,
            ramp_ml_per_tick,
            volume: 0.0,
            rng,
        }
    }
}

impl ReadingSource for SimulatedSource {
    fn next_reading(&mut self) -> Option<Reading> {
        let jitter = self.rng.gen_range(-10.0..=10.0);
        let candidate = (self.volume + self.ramp_ml_per_tick + jitter).clamp(0.0, self.max_volume_ml);
        // Cumulative loss never goes backwards.
        self.volume = self.volume.max(candidate);
        Some(Reading::new(self.patient_id.clone(), Utc::now(), round2(self.volume)))
    }
}

/// Generates a burst of historical readings at one-minute spacing ending
/// now, ramping toward `max_volume_ml` with noise.
pub fn simulate_burst(patient_id: &str, duration_minutes: u32, max_volume_ml: f64) -> Vec<Reading> {
    let mut rng = StdRng::from_entropy();
    let now = Utc::now();
    let start = now - chrono::Duration::minutes(duration_minutes.saturating_sub(1) as i64);
    let mut volume: f64 = 0.0;
    (0..duration_minutes)
        .map(|i| {
            let linear = i as f64 * max_volume_ml / duration_minutes as f64;
            let candidate = (linear + rng.gen_range(-10.0..=10.0)).clamp(0.0, max_volume_ml);
            volume = volume.max(candidate);
            Reading::new(
                patient_id,
                start + chrono::Duration::minutes(i as i64),
                round2(volume),
            )
        })
        .collect()
}

// ===== Channel Source =====

/// The live-feed implementation: drains readings that a network client task
/// pushes into a channel.
pub struct ChannelSource {
    receiver: mpsc::Receiver<Reading>,
}

impl ChannelSource {
    pub fn new(receiver: mpsc::Receiver<Reading>) -> Self {
        Self { receiver }
    }
}

impl ReadingSource for ChannelSource {
    fn next_reading(&mut self) -> Option<Reading> {
        self.receiver.try_recv().ok()
    }
}

// ===== Pump =====

/// Polls a source on a fixed cadence, routing readings into the session
/// manager and forwarding derived records to `out` (the broadcast path).
/// Runs until the forward channel closes.
pub async fn run_source_pump(
    mut source: Box<dyn ReadingSource>,
    manager: Arc<SessionManager>,
    out: mpsc::Sender<DerivedRecord>,
    period: Duration,
    batch: usize,
) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if pump_batch(source.as_mut(), &manager, &out, batch).await.is_err() {
            info!("broadcast channel closed, stopping source pump");
            return;
        }
    }
}

/// One pump pass: up to `batch` readings. Returns how many were ingested,
/// or an error when the forward channel has closed.
pub async fn pump_batch(
    source: &mut dyn ReadingSource,
    manager: &SessionManager,
    out: &mpsc::Sender<DerivedRecord>,
    batch: usize,
) -> Result<usize, SendError<DerivedRecord>> {
    let mut ingested = 0;
    for _ in 0..batch.max(1) {
        let Some(reading) = source.next_reading() else { break };
        match manager.ingest(reading).await {
            Ok(record) => {
                out.send(record).await?;
                ingested += 1;
            }
            Err(err) => warn!(error = %err, "reading rejected by session"),
        }
    }
    Ok(ingested)
}

// ===== Upstream Feed Client =====

/// Connects to an upstream WebSocket feed and forwards parsed readings into
/// the channel a `ChannelSource` drains. Reconnects with a fixed delay until
/// the channel closes.
pub async fn run_upstream_feed(url: Url, sender: mpsc::Sender<Reading>) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!(url = %url, "connected to upstream feed");
                let (_, mut receiver) = stream.split();
                while let Some(message) = receiver.next().await {
                    match message {
                        Ok(msg) if msg.is_text() => {
                            let Ok(text) = msg.to_text() else { continue };
                            match serde_json::from_str::<ReadingInput>(text) {
                                Ok(input) => match input.into_reading() {
                                    Ok(reading) => {
                                        if sender.send(reading).await.is_err() {
                                            return;
                                        }
                                    }
                                    Err(err) => warn!(error = %err, "upstream reading rejected"),
                                },
                                Err(err) => warn!(error = %err, "unparseable upstream message"),
                            }
                        }
                        Ok(_) => warn!("non-text message from upstream feed"),
                        Err(err) => {
                            error!(error = %err, "upstream feed stream error");
                            break;
                        }
                    }
                }
            }
            Err(err) => error!(error = %err, "failed to connect to upstream feed"),
        }
        if sender.is_closed() {
            return;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
