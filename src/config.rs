//! Relay configuration.
//!
//! All timing policy and transport addressing lives in explicit structs
//! passed at construction to the components that need them. Nothing reads
//! process-wide state.

use crate::driver::FilterProfile;
use crate::packet::MeasurementMode;
use std::time::Duration;

/// Top-level configuration, assembled from the CLI.
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub session: SessionConfig,
    pub transport: TransportConfig,
}

/// Policy for one streaming session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Payload content requested from the sensors
    pub measurement_mode: MeasurementMode,
    /// Measurement output rate in Hz
    pub output_rate_hz: u16,
    /// Onboard filter profile selected during configuration
    pub filter_profile: FilterProfile,
    /// How long to scan for devices
    pub scan_timeout: Duration,
    /// How long to stream; `None` means until stopped externally
    pub stream_duration: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            measurement_mode: MeasurementMode::ExtendedEuler,
            output_rate_hz: 60,
            filter_profile: FilterProfile::new("General"),
            scan_timeout: Duration::from_millis(8000),
            stream_duration: None,
        }
    }
}

impl SessionConfig {
    /// Interpret a millisecond duration value where 0 means infinite.
    pub fn stream_duration_from_ms(ms: u64) -> Option<Duration> {
        if ms == 0 {
            None
        } else {
            Some(Duration::from_millis(ms))
        }
    }
}

/// Addressing for the two transport roles.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Interface the subscriber listener binds to
    pub listen_host: String,
    /// Port the subscriber listener binds to
    pub listen_port: u16,
    /// Upstream endpoint packets are also pushed to, when present
    pub publish_host: Option<String>,
    /// Port of the upstream endpoint
    pub publish_port: u16,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_host: "localhost".to_string(),
            listen_port: 3001,
            publish_host: None,
            publish_port: 3001,
        }
    }
}
