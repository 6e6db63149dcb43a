//! Motion replay from recorded CSV files
//!
//! Expected CSV format:
//! timestamp_ms,ax,ay,az,gx,gy,gz,pressure_kpa,altitude_m
//!
//! `timestamp_ms` may be epoch milliseconds or an RFC 3339 timestamp.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::motion_source::{MotionSource, ProducerGate, ProducerTasks};
use super::SensorRingBuffer;
use crate::types::{Channel, ChannelMask, Sample};

const EXPECTED_COLUMNS: usize = 9;

#[derive(Debug, Error)]
pub enum CsvSourceError {
    #[error("Failed to read {}: {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("No usable samples in {}", .0.display())]
    Empty(PathBuf),
}

/// One recorded row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedSample {
    pub timestamp_ms: i64,
    pub sample: Sample,
}

/// Parse CSV text into recorded samples. Header, blank and malformed lines are
/// skipped, the latter with a warning.
pub fn parse_recording(contents: &str) -> Vec<RecordedSample> {
    let mut records = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let line_num = idx + 1;
        if line.trim().is_empty() || (line_num == 1 && line.starts_with("timestamp")) {
            continue;
        }
        match parse_csv_line(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(line = line_num, error = %e, "Error parsing CSV line"),
        }
    }
    records
}

fn parse_csv_line(line: &str) -> Result<RecordedSample, String> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < EXPECTED_COLUMNS {
        return Err(format!(
            "Expected {EXPECTED_COLUMNS} columns, got {}",
            fields.len()
        ));
    }

    let timestamp_ms = parse_timestamp_ms(fields[0])?;
    let mut sample = Sample::ZERO;
    for (channel, raw) in Channel::ALL.into_iter().zip(&fields[1..EXPECTED_COLUMNS]) {
        sample.set(channel, parse_f32(raw, channel.short_name())?);
    }
    Ok(RecordedSample {
        timestamp_ms,
        sample,
    })
}

fn parse_timestamp_ms(s: &str) -> Result<i64, String> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
        .map_err(|e| format!("Cannot parse timestamp '{s}': {e}"))
}

fn parse_f32(s: &str, field: &str) -> Result<f32, String> {
    let value = s
        .trim()
        .parse::<f32>()
        .map_err(|_| format!("Cannot parse {field} as f32: '{s}'"))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("Non-finite {field}: '{s}'"))
    }
}

// ============================================================================
// CSV Motion Source
// ============================================================================

/// Replays recorded samples at their recorded pace (scaled by `speed`).
///
/// Every row becomes an inertial write; the barometric channels are written
/// separately, and only when they change, so the buffer sees the same
/// independent-producer pattern as live sensors.
///
/// Stopping keeps the replay position, so a resumed session continues with
/// the next unplayed row. [`MotionSource::rewind`] goes back to the first.
pub struct CsvMotionSource {
    name: String,
    records: Arc<[RecordedSample]>,
    speed: f64,
    /// Index of the next row to replay.
    position: Arc<AtomicUsize>,
    gate: Arc<ProducerGate>,
    tasks: Mutex<Option<ProducerTasks>>,
}

impl CsvMotionSource {
    /// Load a recording from disk.
    pub fn load(path: &Path, speed: f64) -> Result<Self, CsvSourceError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CsvSourceError::Io(path.to_path_buf(), e))?;
        let records = parse_recording(&contents);
        if records.is_empty() {
            return Err(CsvSourceError::Empty(path.to_path_buf()));
        }
        info!(count = records.len(), path = %path.display(), "Loaded motion samples from CSV");
        Ok(Self::from_records(records, speed))
    }

    pub fn from_records(records: Vec<RecordedSample>, speed: f64) -> Self {
        Self {
            name: "csv-replay".to_string(),
            records: records.into(),
            speed,
            position: Arc::new(AtomicUsize::new(0)),
            gate: Arc::new(ProducerGate::new()),
            tasks: Mutex::new(None),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Index of the next row to replay.
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    fn delay_between(&self, prev: &RecordedSample, next: &RecordedSample) -> Duration {
        if self.speed <= 0.0 {
            return Duration::ZERO;
        }
        let gap_ms = (next.timestamp_ms - prev.timestamp_ms).max(0) as f64;
        Duration::from_secs_f64(gap_ms / 1000.0 / self.speed)
    }
}

impl MotionSource for CsvMotionSource {
    fn start(&self, sink: Arc<SensorRingBuffer>) {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("[MotionSource] start() called outside a Tokio runtime, ignoring");
            return;
        }
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.gate.open() {
            debug!("[MotionSource] Already running");
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let gate = Arc::clone(&self.gate);
        let records = Arc::clone(&self.records);
        let delays: Vec<Duration> = std::iter::once(Duration::ZERO)
            .chain(records.windows(2).map(|w| self.delay_between(&w[0], &w[1])))
            .collect();
        let position = Arc::clone(&self.position);
        let resume_at = position.load(Ordering::Acquire);

        let handle = tokio::spawn(async move {
            // Start from whatever is latched so a resume does not repeat the
            // barometer reading it stopped on.
            let mut last_baro = [
                sink.latched(Channel::Pressure),
                sink.latched(Channel::Altitude),
            ];
            for (idx, (record, delay)) in records.iter().zip(&delays).enumerate().skip(resume_at) {
                if !delay.is_zero() {
                    tokio::select! {
                        () = token.cancelled() => return,
                        () = tokio::time::sleep(*delay) => {}
                    }
                }

                let baro = [
                    record.sample.get(Channel::Pressure),
                    record.sample.get(Channel::Altitude),
                ];
                if last_baro != baro {
                    if !gate.write(&sink, &record.sample, ChannelMask::BARO) {
                        return;
                    }
                    last_baro = baro;
                }
                if !gate.write(&sink, &record.sample, ChannelMask::INERTIAL) {
                    return;
                }
                position.store(idx + 1, Ordering::Release);
                // Zero-delay replay must still let other tasks run.
                if delay.is_zero() {
                    tokio::task::yield_now().await;
                }
            }
            info!("[MotionSource] CSV replay finished");
        });
        *tasks = Some(ProducerTasks::new(cancel, vec![handle]));

        info!(
            samples = self.records.len(),
            from_row = resume_at,
            speed = self.speed,
            "[MotionSource] CSV replay started"
        );
    }

    fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.gate.close() {
            return;
        }
        if let Some(running) = tasks.take() {
            running.shutdown();
        }
        info!("[MotionSource] CSV replay stopped");
    }

    fn is_running(&self) -> bool {
        self.gate.is_open()
    }

    fn source_name(&self) -> &str {
        &self.name
    }

    fn rewind(&self) {
        self.position.store(0, Ordering::Release);
    }
}

impl Drop for CsvMotionSource {
    fn drop(&mut self) {
        self.stop();
    }
}
