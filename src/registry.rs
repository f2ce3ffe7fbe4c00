//! Registry of discovered and connected devices.

use crate::device_address::DeviceAddress;
use crate::driver::{FilterProfile, MotionDriver, PortInfo};
use log::{info, warn};

/// Connection lifecycle of a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Seen during scanning, port not yet opened
    Discovered,
    /// Both open attempts failed; kept for diagnostics only
    PortOpenFailed,
    /// Port open, configuration not yet applied
    Open,
    /// Profile and output rate applied
    Configured,
    /// Measurement mode started
    Measuring,
    /// Torn down
    Closed,
}

/// One known device and its configuration state.
#[derive(Debug, Clone)]
pub struct Device {
    pub address: DeviceAddress,
    pub filter_profile: Option<FilterProfile>,
    pub output_rate_hz: Option<u16>,
    pub connection_state: ConnectionState,
}

impl Device {
    fn discovered(address: DeviceAddress) -> Self {
        Self {
            address,
            filter_profile: None,
            output_rate_hz: None,
            connection_state: ConnectionState::Discovered,
        }
    }

    /// Whether the device reached `Configured` or a later state.
    pub fn is_active(&self) -> bool {
        matches!(
            self.connection_state,
            ConnectionState::Configured | ConnectionState::Measuring | ConnectionState::Closed
        )
    }
}

/// Holds every device seen this session, in discovery order.
///
/// A device that fails to open stays in the registry (for diagnostics) but
/// is excluded from the active set. The registry is only touched from the
/// control task; the packet-callback context never reaches in here.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovered device. Idempotent by address: re-discovery of a
    /// known address returns the existing entry untouched.
    pub fn record_discovered(&mut self, port: &PortInfo) -> &Device {
        let index = match self.devices.iter().position(|d| d.address == port.address) {
            Some(index) => index,
            None => {
                self.devices.push(Device::discovered(port.address));
                self.devices.len() - 1
            }
        };
        &self.devices[index]
    }

    /// Open the device's port (at most two attempts) and apply profile and
    /// output rate.
    ///
    /// A failed open transitions the device to `PortOpenFailed` and leaves
    /// the rest of the registry alone; the caller decides whether an empty
    /// active set is fatal. Profile and rate failures are logged but do not
    /// demote the device: the sensors fall back to their previous settings
    /// and still measure.
    pub fn open_and_configure(
        &mut self,
        driver: &dyn MotionDriver,
        address: DeviceAddress,
        profile: &FilterProfile,
        output_rate_hz: u16,
    ) -> Result<(), ConnectError> {
        let device = self
            .devices
            .iter_mut()
            .find(|d| d.address == address)
            .ok_or(ConnectError::UnknownDevice(address))?;

        let port = PortInfo::new(address);
        info!("Opening device {}", address);
        if let Err(first) = driver.open_port(&port) {
            warn!("Connection to device {} failed, retrying: {}", address, first);
            if let Err(second) = driver.open_port(&port) {
                device.connection_state = ConnectionState::PortOpenFailed;
                return Err(ConnectError::PortOpen {
                    address,
                    reason: second.to_string(),
                });
            }
        }
        device.connection_state = ConnectionState::Open;

        match driver.device_tag(address) {
            Some(tag) => info!("Found device with tag {} @ {}", tag, address),
            None => info!("Found device @ {}", address),
        }

        // Observability only: which profiles the sensor offers and which one
        // is currently active.
        let available = driver.available_filter_profiles(address);
        if !available.is_empty() {
            let labels: Vec<&str> = available.iter().map(FilterProfile::label).collect();
            info!("Available filter profiles for {}: {}", address, labels.join(", "));
        }
        if let Some(current) = driver.current_filter_profile(address) {
            info!("Current profile for {}: {}", address, current);
        }

        if driver.set_filter_profile(address, profile) {
            info!("Set profile for {} to {}", address, profile);
            device.filter_profile = Some(profile.clone());
        } else {
            warn!("Setting filter profile failed for {}", address);
        }

        if driver.set_output_rate(address, output_rate_hz) {
            device.output_rate_hz = Some(output_rate_hz);
        } else {
            warn!("Setting output rate to {} Hz failed for {}", output_rate_hz, address);
        }

        device.connection_state = ConnectionState::Configured;
        Ok(())
    }

    /// Devices in state `Configured` or later, in discovery order.
    pub fn active_devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.is_active())
    }

    /// Addresses of the active devices, in discovery order.
    pub fn active_addresses(&self) -> Vec<DeviceAddress> {
        self.active_devices().map(|d| d.address).collect()
    }

    /// Every known device, including failed ones.
    pub fn all_devices(&self) -> &[Device] {
        &self.devices
    }

    /// Look up a device by address.
    pub fn device(&self, address: DeviceAddress) -> Option<&Device> {
        self.devices.iter().find(|d| d.address == address)
    }

    /// Mark a device as measuring / closed. No-op for unknown addresses.
    pub fn set_state(&mut self, address: DeviceAddress, state: ConnectionState) {
        if let Some(device) = self.devices.iter_mut().find(|d| d.address == address) {
            device.connection_state = state;
        }
    }
}

/// Errors from opening and configuring a single device.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConnectError {
    #[error("device {0} was never discovered")]
    UnknownDevice(DeviceAddress),
    #[error("could not open device {address} after retry: {reason}")]
    PortOpen { address: DeviceAddress, reason: String },
}
