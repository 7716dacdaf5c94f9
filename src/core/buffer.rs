//! Time-windowed retention buffer for one monitoring session.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use crate::models::reading::DerivedRecord;

/// Ordered, bounded buffer of derived records for a single patient session.
///
/// Retention is bounded two ways: by a trailing time window and by a maximum
/// record count that caps memory regardless of sampling rate. Records are
/// appended in arrival order; well-formed input keeps the sequence sorted by
/// timestamp, and out-of-order arrivals are tolerated (their rates were
/// already clamped to zero upstream).
#[derive(Debug)]
pub struct SessionBuffer {
    records: VecDeque<DerivedRecord>,
    window_minutes: f64,
    max_points: usize,
    latest_timestamp: Option<DateTime<Utc>>,
}

impl SessionBuffer {
    pub fn new(window_minutes: f64, max_points: usize) -> Self {
        Self {
            records: VecDeque::new(),
            window_minutes,
            max_points: max_points.max(1),
            latest_timestamp: None,
        }
    }

    /// Appends a record and runs a physical eviction pass.
    ///
    /// Eviction is driven by the newest retained timestamp rather than the
    /// wall clock, so replayed or historical streams window consistently.
    pub fn push(&mut self, record: DerivedRecord) {
        self.latest_timestamp = Some(match self.latest_timestamp {
            Some(latest) => latest.max(record.timestamp),
            None => record.timestamp,
        });
        self.records.push_back(record);
        self.evict();
    }

    /// Changes the retention horizon and immediately re-windows.
    pub fn set_window(&mut self, window_minutes: f64) {
        self.window_minutes = window_minutes;
        self.evict();
    }

    /// The windowed view at `now` using the configured horizon.
    pub fn window(&self, now: DateTime<Utc>) -> Vec<DerivedRecord> {
        self.window_as_of(now, self.window_minutes)
    }

    /// Pure windowed view: records with `timestamp >= now - minutes`, order
    /// preserved, never more than the configured maximum count.
    pub fn window_as_of(&self, now: DateTime<Utc>, minutes: f64) -> Vec<DerivedRecord> {
        let cutoff = now - window_duration(minutes);
        let mut view: Vec<DerivedRecord> = self
            .records
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .cloned()
            .collect();
        if view.len() > self.max_points {
            let excess = view.len() - self.max_points;
            view.drain(..excess);
        }
        view
    }

    /// Clones the full retained sequence, oldest first.
    pub fn snapshot(&self) -> Vec<DerivedRecord> {
        self.records.iter().cloned().collect()
    }

    /// Clones up to the trailing `n` retained records.
    pub fn tail(&self, n: usize) -> Vec<DerivedRecord> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).cloned().collect()
    }

    pub fn reset(&mut self) {
        self.records.clear();
        self.latest_timestamp = None;
    }

    pub fn latest(&self) -> Option<&DerivedRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn window_minutes(&self) -> f64 {
        self.window_minutes
    }

    fn evict(&mut self) {
        if let Some(latest) = self.latest_timestamp {
            let cutoff = latest - window_duration(self.window_minutes);
            while let Some(front) = self.records.front() {
                if front.timestamp < cutoff {
                    self.records.pop_front();
                } else {
                    break;
                }
            }
        }
        while self.records.len() > self.max_points {
            self.records.pop_front();
        }
    }
}

fn window_duration(minutes: f64) -> Duration {
    Duration::milliseconds((minutes * 60_000.0) as i64)
}
