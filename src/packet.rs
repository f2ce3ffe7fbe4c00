//! Measurement packet data model.

use crate::device_address::DeviceAddress;

/// Orientation as Euler angles, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl EulerAngles {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// One accepted measurement, produced per device per measurement tick.
///
/// `sequence` comes from the per-device packet counter and is strictly
/// increasing for the lifetime of a session. Packets are immutable once
/// built; packets arriving while the session is not streaming are dropped
/// before a `MeasurementPacket` is ever constructed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementPacket {
    /// Bluetooth address of the originating sensor
    pub address: DeviceAddress,
    /// Per-device sequence number, starting at 1
    pub sequence: u64,
    /// Orientation sample in degrees
    pub euler: EulerAngles,
}

/// Payload content selected when putting devices into measurement mode.
///
/// Mirrors the vendor SDK's payload modes; only the orientation-bearing
/// modes are exposed since the relay publishes Euler angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MeasurementMode {
    /// Orientation plus free acceleration and timestamp
    #[default]
    ExtendedEuler,
    /// Orientation only
    CompleteEuler,
    /// Calibrated rate-of-turn and acceleration
    RateQuantities,
}

impl std::fmt::Display for MeasurementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeasurementMode::ExtendedEuler => write!(f, "extended-euler"),
            MeasurementMode::CompleteEuler => write!(f, "complete-euler"),
            MeasurementMode::RateQuantities => write!(f, "rate-quantities"),
        }
    }
}
