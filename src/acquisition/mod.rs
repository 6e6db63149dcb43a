//! Sensor data acquisition module
//!
//! Motion sources write masked partial samples into a shared lock-free ring
//! buffer; the orchestrator's tick takes chronological snapshots of it.

pub mod csv_source;
pub mod motion_source;
pub mod ring_buffer;

pub use csv_source::{CsvMotionSource, CsvSourceError, RecordedSample};
pub use motion_source::{MotionProfile, MotionSource, ProducerGate, SimulatedMotionSource};
pub use ring_buffer::SensorRingBuffer;
