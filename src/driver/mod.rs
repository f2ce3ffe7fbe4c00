//! Vendor driver/SDK seam.
//!
//! The radio side of the system (scanning, port handling, measurement
//! commands, packet delivery) belongs to the vendor SDK. This module pins
//! down the capability surface the session logic relies on, so the core can
//! be tested against a scripted fake and the real SDK binding lives behind
//! one trait. The [`sim`] backend generates synthetic measurements for
//! running without sensor hardware.

pub mod sim;

use crate::device_address::DeviceAddress;
use crate::packet::{EulerAngles, MeasurementMode};
use std::sync::Arc;
use thiserror::Error;

/// Error type for driver operations that can fail with a reason.
///
/// Per-device setters on [`MotionDriver`] return `bool` instead, mirroring
/// the vendor SDK convention of success flags plus a last-result text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// Port open handshake failed
    #[error("could not open port for {address}: {reason}")]
    PortOpen { address: DeviceAddress, reason: String },
    /// Discovery could not be enabled
    #[error("device discovery unavailable: {0}")]
    Discovery(String),
}

/// Descriptor for a discovered device, prior to opening its port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub address: DeviceAddress,
}

impl PortInfo {
    pub fn new(address: DeviceAddress) -> Self {
        Self { address }
    }
}

/// On-device signal-processing configuration name (e.g. "General", "Dynamic").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterProfile(pub String);

impl FilterProfile {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FilterProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Orientation reset variants supported by the sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationReset {
    /// Zero the heading while keeping inclination; used for the one-time
    /// in-stream calibration.
    Heading,
    /// Restore the factory default alignment; used during teardown.
    DefaultAlignment,
}

/// Asynchronous callback capability handed to the driver.
///
/// The vendor SDK invokes these from its own threads. Implementations must
/// not block: the accept/discard decision and any forwarding have to be
/// O(1) (atomic loads, atomic increments, `try_send`), because blocking a
/// callback stalls the SDK's internal delivery loop.
pub trait DriverCallbacks: Send + Sync {
    /// A measurement packet arrived from a sensor.
    fn on_packet(&self, address: DeviceAddress, euler: EulerAngles);

    /// The driver raised an asynchronous error.
    fn on_error(&self, code: u32);
}

/// Capability surface of the vendor device driver/SDK.
///
/// All calls are treated as black boxes with the success/failure contracts
/// the session logic depends on: `open_port` may be retried, per-device
/// commands report success as `bool`, `close` and `disable_discovery` never
/// fail.
pub trait MotionDriver: Send + Sync {
    /// Human-readable SDK version string, logged once at startup.
    fn sdk_version(&self) -> String;

    /// Register the callback capability for packet and error delivery.
    fn set_callbacks(&self, callbacks: Arc<dyn DriverCallbacks>);

    /// Start advertising-based device discovery.
    fn enable_discovery(&self) -> Result<(), DriverError>;

    /// Stop device discovery. Infallible and idempotent.
    fn disable_discovery(&self);

    /// Snapshot of the devices discovered so far.
    fn detected_devices(&self) -> Vec<PortInfo>;

    /// Open the port to a device. May fail; the caller owns retry policy.
    fn open_port(&self, port: &PortInfo) -> Result<(), DriverError>;

    /// Human-readable tag name of an opened device, if the sensor has one.
    fn device_tag(&self, address: DeviceAddress) -> Option<String>;

    /// Filter profiles the device supports.
    fn available_filter_profiles(&self, address: DeviceAddress) -> Vec<FilterProfile>;

    /// Profile currently active on the device.
    fn current_filter_profile(&self, address: DeviceAddress) -> Option<FilterProfile>;

    /// Select an onboard filter profile. Returns success.
    fn set_filter_profile(&self, address: DeviceAddress, profile: &FilterProfile) -> bool;

    /// Set the measurement output rate in Hz. Returns success.
    fn set_output_rate(&self, address: DeviceAddress, rate_hz: u16) -> bool;

    /// Put a device into measurement mode. Returns success.
    fn start_measurement(&self, address: DeviceAddress, mode: MeasurementMode) -> bool;

    /// Take a device out of measurement mode. Returns success.
    fn stop_measurement(&self, address: DeviceAddress) -> bool;

    /// Disable onboard logging. Returns success.
    fn disable_logging(&self, address: DeviceAddress) -> bool;

    /// Reset device orientation. Returns success.
    fn reset_orientation(&self, address: DeviceAddress, mode: OrientationReset) -> bool;

    /// Close the connection manager and all ports. Infallible and idempotent.
    fn close(&self);
}
