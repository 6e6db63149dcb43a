//! Motion source abstraction for sensor ingestion.
//!
//! A motion source owns one or more asynchronous producers (accelerometer,
//! gyroscope, barometer) that write masked partial samples into the shared
//! [`SensorRingBuffer`]. Producers never read or resize the buffer.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SensorRingBuffer;
use crate::config::defaults::SEA_LEVEL_PRESSURE_KPA;
use crate::config::SensorConfig;
use crate::types::{Channel, ChannelMask, Sample};

/// Trait abstracting where motion samples come from.
///
/// `start` and `stop` are idempotent. Once `stop` returns, no further write
/// from this source reaches the buffer.
pub trait MotionSource: Send + Sync {
    /// Begin producing into `sink`. A no-op while already running.
    fn start(&self, sink: Arc<SensorRingBuffer>);

    /// Stop all producers. A no-op while already stopped.
    fn stop(&self);

    fn is_running(&self) -> bool;

    /// Human-readable name for logging (e.g. "simulated", "csv-replay").
    fn source_name(&self) -> &str;

    /// Forget any replay progress so the next `start` begins a new session.
    /// Sources without a position ignore it.
    fn rewind(&self) {}
}

// ============================================================================
// Producer Gate
// ============================================================================

/// Running flag that producers consult on every write.
///
/// Writers hold the read side for the duration of one buffer write; `close`
/// takes the write side, so when it returns no write is in progress and every
/// later write sees the gate closed.
#[derive(Debug, Default)]
pub struct ProducerGate {
    open: RwLock<bool>,
}

impl ProducerGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate. Returns false if it was already open.
    pub fn open(&self) -> bool {
        let mut open = self.open.write().unwrap_or_else(PoisonError::into_inner);
        !std::mem::replace(&mut *open, true)
    }

    /// Close the gate, waiting out any write in progress. Returns false if it
    /// was already closed.
    pub fn close(&self) -> bool {
        let mut open = self.open.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *open, false)
    }

    pub fn is_open(&self) -> bool {
        *self.open.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write through the gate. Returns false (and writes nothing) when closed.
    pub fn write(&self, sink: &SensorRingBuffer, sample: &Sample, mask: ChannelMask) -> bool {
        let open = self.open.read().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return false;
        }
        sink.write(sample, mask);
        true
    }
}

/// Cancellation token plus task handles of a running source.
pub(crate) struct ProducerTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl ProducerTasks {
    pub(crate) fn new(cancel: CancellationToken, handles: Vec<JoinHandle<()>>) -> Self {
        Self { cancel, handles }
    }

    pub(crate) fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            handle.abort();
        }
    }
}

// ============================================================================
// Simulated Source
// ============================================================================

/// Shape of the synthetic exercise motion.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionProfile {
    /// Repetitions per second
    pub cadence_hz: f32,
    /// Peak acceleration swing around gravity (g)
    pub accel_amplitude_g: f32,
    /// Peak angular rate (rad/s)
    pub gyro_amplitude: f32,
    /// Fraction of amplitude lost per minute, emulating fatigue
    pub amplitude_decay_per_min: f32,
    /// Standard deviation of additive sensor noise
    pub noise_sigma: f32,
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            cadence_hz: 0.5,
            accel_amplitude_g: 0.6,
            gyro_amplitude: 1.2,
            amplitude_decay_per_min: 0.08,
            noise_sigma: 0.03,
        }
    }
}

impl MotionProfile {
    fn amplitude_scale(&self, elapsed: Duration) -> f32 {
        let minutes = elapsed.as_secs_f32() / 60.0;
        (1.0 - self.amplitude_decay_per_min * minutes).clamp(0.1, 1.0)
    }
}

/// Synthetic motion: accelerometer and gyroscope at the inertial rate, and a
/// barometer at a jittered, irregular interval. Each producer is its own Tokio
/// task and writes only its own channels.
pub struct SimulatedMotionSource {
    config: SensorConfig,
    profile: MotionProfile,
    gate: Arc<ProducerGate>,
    tasks: Mutex<Option<ProducerTasks>>,
}

impl SimulatedMotionSource {
    pub fn new(config: SensorConfig) -> Self {
        Self::with_profile(config, MotionProfile::default())
    }

    pub fn with_profile(config: SensorConfig, profile: MotionProfile) -> Self {
        Self {
            config,
            profile,
            gate: Arc::new(ProducerGate::new()),
            tasks: Mutex::new(None),
        }
    }

    fn spawn_inertial(
        &self,
        sink: Arc<SensorRingBuffer>,
        cancel: CancellationToken,
        mask: ChannelMask,
    ) -> JoinHandle<()> {
        let gate = Arc::clone(&self.gate);
        let profile = self.profile.clone();
        let period = self.config.inertial_period();

        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let noise = Normal::new(0.0_f32, profile.noise_sigma).ok();
            let started = tokio::time::Instant::now();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let elapsed = started.elapsed();
                let phase = std::f32::consts::TAU * profile.cadence_hz * elapsed.as_secs_f32();
                let scale = profile.amplitude_scale(elapsed);
                let mut jitter = || noise.map_or(0.0, |n| n.sample(&mut rng));

                let sample = if mask == ChannelMask::ACCEL {
                    let swing = profile.accel_amplitude_g * scale;
                    Sample::accel(
                        0.1 * swing * phase.cos() + jitter(),
                        0.2 * swing * (2.0 * phase).sin() + jitter(),
                        1.0 + swing * phase.sin() + jitter(),
                    )
                } else {
                    let rate = profile.gyro_amplitude * scale;
                    Sample::gyro(
                        rate * phase.cos() + jitter(),
                        0.3 * rate * phase.sin() + jitter(),
                        0.1 * rate * (2.0 * phase).cos() + jitter(),
                    )
                };

                if !gate.write(&sink, &sample, mask) {
                    break;
                }
            }
        })
    }

    fn spawn_barometer(&self, sink: Arc<SensorRingBuffer>, cancel: CancellationToken) -> JoinHandle<()> {
        let gate = Arc::clone(&self.gate);
        let nominal = self.config.pressure_interval();

        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut altitude_m = 0.0_f32;

            loop {
                // Barometer updates arrive irregularly: 50%..150% of nominal.
                let wait = nominal.mul_f64(rng.gen_range(0.5..1.5));
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(wait) => {}
                }

                altitude_m = (altitude_m + rng.gen_range(-0.05..0.05)).clamp(-2.0, 2.0);
                // ~0.012 kPa per metre near sea level
                let pressure = SEA_LEVEL_PRESSURE_KPA - 0.012 * altitude_m;
                if !gate.write(&sink, &Sample::baro(pressure, altitude_m), ChannelMask::BARO) {
                    break;
                }
            }
        })
    }
}

impl MotionSource for SimulatedMotionSource {
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

        // Seed the barometric latch so inertial rows carry a plausible pressure
        // before the first (irregular) barometer update. A resume keeps the
        // pressure already latched.
        if sink.latched(Channel::Pressure) == 0.0 {
            self.gate
                .write(&sink, &Sample::baro(SEA_LEVEL_PRESSURE_KPA, 0.0), ChannelMask::BARO);
        }

        let cancel = CancellationToken::new();
        let handles = vec![
            self.spawn_inertial(Arc::clone(&sink), cancel.clone(), ChannelMask::ACCEL),
            self.spawn_inertial(Arc::clone(&sink), cancel.clone(), ChannelMask::GYRO),
            self.spawn_barometer(sink, cancel.clone()),
        ];
        *tasks = Some(ProducerTasks::new(cancel, handles));

        info!(
            rate_hz = self.config.inertial_rate_hz,
            pressure_interval_ms = self.config.pressure_interval_ms,
            "[MotionSource] Simulated producers started"
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
        info!("[MotionSource] Simulated producers stopped");
    }

    fn is_running(&self) -> bool {
        self.gate.is_open()
    }

    fn source_name(&self) -> &str {
        "simulated"
    }
}

impl Drop for SimulatedMotionSource {
    fn drop(&mut self) {
        self.stop();
    }
}
