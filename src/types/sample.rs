//! Sensor sample types: Channel, ChannelMask, Sample

use serde::{Deserialize, Serialize};

/// Number of channels carried by every sample.
pub const CHANNEL_COUNT: usize = 8;

// ============================================================================
// Channels
// ============================================================================

/// One sensor channel, in the fixed order the perception model expects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Channel {
    AccelX,
    AccelY,
    AccelZ,
    GyroX,
    GyroY,
    GyroZ,
    /// Barometric pressure (kPa)
    Pressure,
    /// Relative altitude derived from pressure (m)
    Altitude,
}

impl Channel {
    /// All channels in tensor order.
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::AccelX,
        Channel::AccelY,
        Channel::AccelZ,
        Channel::GyroX,
        Channel::GyroY,
        Channel::GyroZ,
        Channel::Pressure,
        Channel::Altitude,
    ];

    /// Position of this channel inside a [`Sample`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short name for logging and CSV headers.
    pub fn short_name(self) -> &'static str {
        match self {
            Channel::AccelX => "ax",
            Channel::AccelY => "ay",
            Channel::AccelZ => "az",
            Channel::GyroX => "gx",
            Channel::GyroY => "gy",
            Channel::GyroZ => "gz",
            Channel::Pressure => "pressure_kpa",
            Channel::Altitude => "altitude_m",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

// ============================================================================
// Channel Mask
// ============================================================================

/// Set of channels touched by a single producer write.
///
/// Bit `i` corresponds to `Channel::ALL[i]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChannelMask(u8);

impl ChannelMask {
    pub const NONE: ChannelMask = ChannelMask(0);
    pub const ACCEL: ChannelMask = ChannelMask(0b0000_0111);
    pub const GYRO: ChannelMask = ChannelMask(0b0011_1000);
    pub const BARO: ChannelMask = ChannelMask(0b1100_0000);
    pub const INERTIAL: ChannelMask = ChannelMask(0b0011_1111);
    pub const ALL: ChannelMask = ChannelMask(0b1111_1111);

    /// Mask containing a single channel.
    pub const fn only(channel: Channel) -> Self {
        ChannelMask(1 << channel.index())
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, channel: Channel) -> bool {
        self.0 & (1 << channel.index()) != 0
    }

    pub const fn union(self, other: ChannelMask) -> Self {
        ChannelMask(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate the channels present in the mask, in tensor order.
    pub fn channels(self) -> impl Iterator<Item = Channel> {
        Channel::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl std::ops::BitOr for ChannelMask {
    type Output = ChannelMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

// ============================================================================
// Sample
// ============================================================================

/// One multi-channel reading. Immutable once written into the ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample(pub [f32; CHANNEL_COUNT]);

impl Sample {
    pub const ZERO: Sample = Sample([0.0; CHANNEL_COUNT]);

    pub fn get(&self, channel: Channel) -> f32 {
        self.0[channel.index()]
    }

    pub fn set(&mut self, channel: Channel, value: f32) {
        self.0[channel.index()] = value;
    }

    /// Partial sample carrying only accelerometer axes (g).
    pub fn accel(x: f32, y: f32, z: f32) -> Self {
        let mut s = Self::ZERO;
        s.set(Channel::AccelX, x);
        s.set(Channel::AccelY, y);
        s.set(Channel::AccelZ, z);
        s
    }

    /// Partial sample carrying only gyroscope axes (rad/s).
    pub fn gyro(x: f32, y: f32, z: f32) -> Self {
        let mut s = Self::ZERO;
        s.set(Channel::GyroX, x);
        s.set(Channel::GyroY, y);
        s.set(Channel::GyroZ, z);
        s
    }

    /// Partial sample carrying only barometric channels.
    pub fn baro(pressure_kpa: f32, altitude_m: f32) -> Self {
        let mut s = Self::ZERO;
        s.set(Channel::Pressure, pressure_kpa);
        s.set(Channel::Altitude, altitude_m);
        s
    }

    /// Accelerometer magnitude.
    pub fn accel_magnitude(&self) -> f32 {
        let (x, y, z) = (
            self.get(Channel::AccelX),
            self.get(Channel::AccelY),
            self.get(Channel::AccelZ),
        );
        (x * x + y * y + z * z).sqrt()
    }

    /// Gyroscope magnitude.
    pub fn gyro_magnitude(&self) -> f32 {
        let (x, y, z) = (
            self.get(Channel::GyroX),
            self.get(Channel::GyroY),
            self.get(Channel::GyroZ),
        );
        (x * x + y * y + z * z).sqrt()
    }
}
