//! `dot-relay` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup
//! and process exit codes. The session logic lives in [`crate::app`] and
//! below, where it can be tested deterministically with an injected driver
//! and transport.

pub mod app;
pub mod config;
pub mod counter;
pub mod device_address;
pub mod driver;
pub mod packet;
pub mod registry;
pub mod relay;
pub mod scan;
pub mod session;
pub mod teardown;
pub mod transport;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types at the crate root
pub use config::{RelayConfig, SessionConfig, TransportConfig};
pub use counter::PacketCounter;
pub use device_address::DeviceAddress;
pub use driver::{DriverCallbacks, DriverError, FilterProfile, MotionDriver, OrientationReset};
pub use packet::{EulerAngles, MeasurementMode, MeasurementPacket};
pub use registry::{ConnectionState, DeviceRegistry};
pub use relay::RelayBridge;
pub use relay::message::{ControlCommand, PacketMessage};
pub use session::{PacketGate, SessionError, SessionReport, SessionState, SessionStateMachine};
pub use transport::{Channel, Transport, TransportError};
