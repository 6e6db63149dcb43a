//! Fixed-length multi-channel sensor ring buffer
//!
//! Lock-free: every channel value is an `f32` stored as its bit pattern in an
//! `AtomicU32`, so a channel write or read can never tear. The write cursor is
//! an `AtomicUsize` claimed with a single `fetch_update`, so concurrent
//! producers always land in distinct slots and the reader sees each advance as
//! one step.
//!
//! The buffer starts full of zero samples, so a snapshot always has exactly
//! `len()` entries.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::types::{Channel, ChannelMask, Sample, CHANNEL_COUNT};

type AtomicRow = [AtomicU32; CHANNEL_COUNT];

fn zero_row() -> AtomicRow {
    std::array::from_fn(|_| AtomicU32::new(0.0_f32.to_bits()))
}

/// Circular store of the most recent `N` samples.
///
/// Producers only ever call [`write`](Self::write); the tick driver only ever
/// calls [`snapshot`](Self::snapshot).
pub struct SensorRingBuffer {
    slots: Box<[AtomicRow]>,
    /// Last known value of each channel. Unmasked channels of a write are
    /// filled from here.
    latch: AtomicRow,
    cursor: AtomicUsize,
    writes: AtomicU64,
}

impl SensorRingBuffer {
    /// Create a buffer of `len` zero samples. `len` is clamped to at least 1.
    pub fn new(len: usize) -> Self {
        let len = len.max(1);
        Self {
            slots: (0..len).map(|_| zero_row()).collect(),
            latch: zero_row(),
            cursor: AtomicUsize::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of slots (`N`). Constant for the lifetime of the buffer.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Never true: the buffer is always full. Present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot the next write will land in.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Writes accepted since creation or the last reset.
    pub fn total_writes(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    /// Record a (possibly partial) sample.
    ///
    /// Channels in `mask` take their value from `partial`; every other channel
    /// repeats its last known value. The write occupies the current cursor
    /// slot, overwriting the oldest sample, and advances the cursor by one.
    /// Never fails.
    pub fn write(&self, partial: &Sample, mask: ChannelMask) {
        for channel in mask.channels() {
            self.latch[channel.index()].store(partial.get(channel).to_bits(), Ordering::Release);
        }

        let n = self.slots.len();
        let slot = match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % n))
        {
            Ok(prev) | Err(prev) => prev,
        };

        for (cell, latched) in self.slots[slot].iter().zip(self.latch.iter()) {
            cell.store(latched.load(Ordering::Acquire), Ordering::Release);
        }
        self.writes.fetch_add(1, Ordering::AcqRel);
    }

    /// Copy out all `N` samples, oldest first, newest last.
    ///
    /// The result shares nothing with the live buffer: `[cursor..N)` followed
    /// by `[0..cursor)`.
    pub fn snapshot(&self) -> Vec<Sample> {
        let n = self.slots.len();
        let start = self.cursor.load(Ordering::Acquire);
        (0..n).map(|k| self.read_slot((start + k) % n)).collect()
    }

    /// Most recently written sample.
    pub fn latest(&self) -> Sample {
        let n = self.slots.len();
        self.read_slot((self.cursor.load(Ordering::Acquire) + n - 1) % n)
    }

    /// Last value written to `channel`, zero if it was never written.
    pub fn latched(&self, channel: Channel) -> f32 {
        f32::from_bits(self.latch[channel.index()].load(Ordering::Acquire))
    }

    /// Zero every slot and the channel latch and rewind the cursor.
    ///
    /// Only meaningful while no producer is running.
    pub fn reset(&self) {
        for row in self.slots.iter().chain(std::iter::once(&self.latch)) {
            for cell in row {
                cell.store(0.0_f32.to_bits(), Ordering::Release);
            }
        }
        self.cursor.store(0, Ordering::Release);
        self.writes.store(0, Ordering::Release);
    }

    fn read_slot(&self, slot: usize) -> Sample {
        let row = &self.slots[slot];
        Sample(std::array::from_fn(|i| {
            f32::from_bits(row[i].load(Ordering::Acquire))
        }))
    }
}

impl std::fmt::Debug for SensorRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorRingBuffer")
            .field("len", &self.len())
            .field("cursor", &self.cursor())
            .field("total_writes", &self.total_writes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn uniform(v: f32) -> Sample {
        Sample([v; CHANNEL_COUNT])
    }

    #[test]
    fn starts_full_of_zeros() {
        let buf = SensorRingBuffer::new(4);
        let snap = buf.snapshot();
        assert_eq!(snap.len(), 4);
        assert!(snap.iter().all(|s| *s == Sample::ZERO));
        assert_eq!(buf.cursor(), 0);
    }

    #[test]
    fn snapshot_is_chronological_after_wraparound() {
        let buf = SensorRingBuffer::new(5);
        for i in 0..7 {
            buf.write(&uniform(i as f32), ChannelMask::ALL);
        }
        let firsts: Vec<f32> = buf.snapshot().iter().map(|s| s.0[0]).collect();
        assert_eq!(firsts, vec![2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(buf.cursor(), 2);
        assert_eq!(buf.total_writes(), 7);
    }

    #[test]
    fn every_write_count_yields_full_ordered_window() {
        let n = 6;
        for writes in 0..(3 * n) {
            let buf = SensorRingBuffer::new(n);
            for i in 1..=writes {
                buf.write(&uniform(i as f32), ChannelMask::ALL);
            }
            let seq: Vec<f32> = buf.snapshot().iter().map(|s| s.0[0]).collect();
            assert_eq!(seq.len(), n);

            // Non-zero tail must be consecutive and end at the newest write.
            let written: Vec<f32> = seq.iter().copied().filter(|v| *v > 0.0).collect();
            let expected: Vec<f32> = ((writes.saturating_sub(n) + 1)..=writes)
                .map(|i| i as f32)
                .collect();
            assert_eq!(written, expected, "after {writes} writes");
            assert_eq!(buf.cursor(), writes % n);
        }
    }

    #[test]
    fn partial_write_carries_last_known_values() {
        let buf = SensorRingBuffer::new(3);
        buf.write(&Sample::baro(101.3, 12.0), ChannelMask::BARO);
        buf.write(&Sample::accel(0.1, 0.2, 0.9), ChannelMask::ACCEL);
        buf.write(&Sample::gyro(1.0, 2.0, 3.0), ChannelMask::GYRO);

        let newest = buf.latest();
        assert_eq!(newest.get(Channel::AccelZ), 0.9);
        assert_eq!(newest.get(Channel::GyroY), 2.0);
        assert_eq!(newest.get(Channel::Pressure), 101.3);
        assert_eq!(newest.get(Channel::Altitude), 12.0);

        // The accel write happened before any gyro data existed.
        let snap = buf.snapshot();
        assert_eq!(snap[1].get(Channel::GyroY), 0.0);
        assert_eq!(snap[1].get(Channel::AccelX), 0.1);
    }

    #[test]
    fn reset_zeroes_everything() {
        let buf = SensorRingBuffer::new(3);
        buf.write(&uniform(5.0), ChannelMask::ALL);
        buf.reset();
        assert_eq!(buf.cursor(), 0);
        assert_eq!(buf.total_writes(), 0);
        assert!(buf.snapshot().iter().all(|s| *s == Sample::ZERO));
        buf.write(&Sample::accel(1.0, 0.0, 0.0), ChannelMask::ACCEL);
        assert_eq!(buf.latest().get(Channel::Pressure), 0.0);
    }

    #[test]
    fn concurrent_writers_never_tear_or_lose_advances() {
        let n = 64;
        let per_thread = 2_000;
        let buf = SensorRingBuffer::new(n);
        let masks = [
            (ChannelMask::ACCEL, 1.0_f32),
            (ChannelMask::GYRO, 2.0_f32),
            (ChannelMask::BARO, 3.0_f32),
        ];

        std::thread::scope(|scope| {
            for (mask, base) in masks {
                let buf = &buf;
                scope.spawn(move || {
                    for i in 0..per_thread {
                        buf.write(&uniform(base * 10_000.0 + i as f32), mask);
                    }
                });
            }
            // Single concurrent reader.
            let buf = &buf;
            scope.spawn(move || {
                for _ in 0..200 {
                    assert_eq!(buf.snapshot().len(), n);
                }
            });
        });

        assert_eq!(buf.total_writes(), (masks.len() * per_thread) as u64);
        assert_eq!(buf.cursor(), (masks.len() * per_thread) % n);

        let valid: HashSet<u32> = masks
            .iter()
            .flat_map(|(_, base)| (0..per_thread).map(move |i| (base * 10_000.0 + i as f32).to_bits()))
            .chain(std::iter::once(0.0_f32.to_bits()))
            .collect();
        for sample in buf.snapshot() {
            for v in sample.0 {
                assert!(valid.contains(&v.to_bits()), "torn or foreign value {v}");
            }
        }
    }
}
