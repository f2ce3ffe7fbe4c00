//! Shared fakes and fixtures for unit tests.

use crate::device_address::DeviceAddress;
use crate::driver::{
    DriverCallbacks, DriverError, FilterProfile, MotionDriver, OrientationReset, PortInfo,
};
use crate::packet::{EulerAngles, MeasurementMode};
use crate::transport::{Channel, Transport, TransportError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Stable device addresses for unit tests (A sorts before B).
pub const ADDR_A: DeviceAddress = DeviceAddress([0xD4, 0x22, 0xCD, 0x00, 0x4A, 0x1E]);
pub const ADDR_B: DeviceAddress = DeviceAddress([0xD4, 0x22, 0xCD, 0x00, 0x4A, 0x2F]);

/// Euler sample with only the x component set.
pub fn euler(x: f64) -> EulerAngles {
    EulerAngles::new(x, 0.0, 0.0)
}

/// Every driver call a test might want to assert on, in invocation order.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    EnableDiscovery,
    DisableDiscovery,
    OpenPort(DeviceAddress),
    SetFilterProfile(DeviceAddress, String),
    SetOutputRate(DeviceAddress, u16),
    StartMeasurement(DeviceAddress, MeasurementMode),
    StopMeasurement(DeviceAddress),
    DisableLogging(DeviceAddress),
    ResetOrientation(DeviceAddress, OrientationReset),
    Close,
}

#[derive(Default)]
struct FakeDriverState {
    detected: Vec<PortInfo>,
    calls: Vec<DriverCall>,
    discovery_enabled: bool,
    fail_discovery: bool,
    open_failures_left: HashMap<DeviceAddress, usize>,
    open_attempts: HashMap<DeviceAddress, usize>,
    reject_profile: HashSet<DeviceAddress>,
    reject_start: HashSet<DeviceAddress>,
    reject_stop: HashSet<DeviceAddress>,
    callbacks: Option<Arc<dyn DriverCallbacks>>,
}

/// Scripted in-memory driver.
///
/// Builder methods configure which operations fail; every call is recorded
/// so tests can assert on exact sequences. Packets and errors are injected
/// through the registered callback capability, same as a real SDK would.
#[derive(Default)]
pub struct FakeDriver {
    state: Mutex<FakeDriverState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` open attempts for `address` fail.
    pub fn failing_opens(self, address: DeviceAddress, n: usize) -> Self {
        self.state.lock().unwrap().open_failures_left.insert(address, n);
        self
    }

    /// Make `enable_discovery` fail.
    pub fn failing_discovery(self) -> Self {
        self.state.lock().unwrap().fail_discovery = true;
        self
    }

    /// Make `set_filter_profile` report failure for `address`.
    pub fn rejecting_profile(self, address: DeviceAddress) -> Self {
        self.state.lock().unwrap().reject_profile.insert(address);
        self
    }

    /// Make `start_measurement` report failure for `address`.
    pub fn rejecting_start(self, address: DeviceAddress) -> Self {
        self.state.lock().unwrap().reject_start.insert(address);
        self
    }

    /// Make `stop_measurement` report failure for `address`.
    pub fn rejecting_stop(self, address: DeviceAddress) -> Self {
        self.state.lock().unwrap().reject_stop.insert(address);
        self
    }

    /// Add a device to the detected set.
    pub fn add_detected(&self, address: DeviceAddress) {
        self.state.lock().unwrap().detected.push(PortInfo::new(address));
    }

    /// How many times `open_port` was attempted for `address`.
    pub fn open_attempts(&self, address: DeviceAddress) -> usize {
        *self.state.lock().unwrap().open_attempts.get(&address).unwrap_or(&0)
    }

    /// All driver calls so far, in order.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn discovery_disabled(&self) -> bool {
        !self.state.lock().unwrap().discovery_enabled
    }

    /// Deliver a packet through the registered callbacks.
    pub fn send_packet(&self, address: DeviceAddress, euler: EulerAngles) {
        let callbacks = self.state.lock().unwrap().callbacks.clone();
        if let Some(callbacks) = callbacks {
            callbacks.on_packet(address, euler);
        }
    }

    /// Raise an asynchronous driver error.
    pub fn raise_error(&self, code: u32) {
        let callbacks = self.state.lock().unwrap().callbacks.clone();
        if let Some(callbacks) = callbacks {
            callbacks.on_error(code);
        }
    }

    fn record(&self, call: DriverCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl MotionDriver for FakeDriver {
    fn sdk_version(&self) -> String {
        "fake".to_string()
    }

    fn set_callbacks(&self, callbacks: Arc<dyn DriverCallbacks>) {
        self.state.lock().unwrap().callbacks = Some(callbacks);
    }

    fn enable_discovery(&self) -> Result<(), DriverError> {
        self.record(DriverCall::EnableDiscovery);
        let mut state = self.state.lock().unwrap();
        if state.fail_discovery {
            return Err(DriverError::Discovery("scripted failure".to_string()));
        }
        state.discovery_enabled = true;
        Ok(())
    }

    fn disable_discovery(&self) {
        self.record(DriverCall::DisableDiscovery);
        self.state.lock().unwrap().discovery_enabled = false;
    }

    fn detected_devices(&self) -> Vec<PortInfo> {
        self.state.lock().unwrap().detected.clone()
    }

    fn open_port(&self, port: &PortInfo) -> Result<(), DriverError> {
        self.record(DriverCall::OpenPort(port.address));
        let mut state = self.state.lock().unwrap();
        *state.open_attempts.entry(port.address).or_insert(0) += 1;
        match state.open_failures_left.get_mut(&port.address) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(DriverError::PortOpen {
                    address: port.address,
                    reason: "scripted failure".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn device_tag(&self, address: DeviceAddress) -> Option<String> {
        Some(format!("tag-{:02X}", address.0[5]))
    }

    fn available_filter_profiles(&self, _address: DeviceAddress) -> Vec<FilterProfile> {
        vec![FilterProfile::new("General"), FilterProfile::new("Dynamic")]
    }

    fn current_filter_profile(&self, _address: DeviceAddress) -> Option<FilterProfile> {
        Some(FilterProfile::new("General"))
    }

    fn set_filter_profile(&self, address: DeviceAddress, profile: &FilterProfile) -> bool {
        self.record(DriverCall::SetFilterProfile(address, profile.label().to_string()));
        !self.state.lock().unwrap().reject_profile.contains(&address)
    }

    fn set_output_rate(&self, address: DeviceAddress, rate_hz: u16) -> bool {
        self.record(DriverCall::SetOutputRate(address, rate_hz));
        true
    }

    fn start_measurement(&self, address: DeviceAddress, mode: MeasurementMode) -> bool {
        self.record(DriverCall::StartMeasurement(address, mode));
        !self.state.lock().unwrap().reject_start.contains(&address)
    }

    fn stop_measurement(&self, address: DeviceAddress) -> bool {
        self.record(DriverCall::StopMeasurement(address));
        !self.state.lock().unwrap().reject_stop.contains(&address)
    }

    fn disable_logging(&self, address: DeviceAddress) -> bool {
        self.record(DriverCall::DisableLogging(address));
        true
    }

    fn reset_orientation(&self, address: DeviceAddress, mode: OrientationReset) -> bool {
        self.record(DriverCall::ResetOrientation(address, mode));
        true
    }

    fn close(&self) {
        self.record(DriverCall::Close);
    }
}

#[derive(Default)]
struct FakeTransportState {
    emitted: Vec<(Channel, Value)>,
    inbound: HashMap<Channel, mpsc::Sender<Value>>,
}

/// In-memory transport capturing emits and replaying scripted inbound
/// payloads.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeTransportState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far, in order.
    pub fn emitted(&self) -> Vec<(Channel, Value)> {
        self.state.lock().unwrap().emitted.clone()
    }

    /// Payloads emitted on one channel only.
    pub fn emitted_on(&self, channel: Channel) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .emitted
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Inject an inbound payload as if a subscriber had sent it.
    pub fn push_inbound(&self, channel: Channel, payload: Value) {
        let state = self.state.lock().unwrap();
        if let Some(tx) = state.inbound.get(&channel) {
            tx.try_send(payload).expect("inbound queue full in test");
        }
    }
}

impl Transport for FakeTransport {
    fn emit(&self, channel: Channel, payload: Value) -> Result<(), TransportError> {
        self.state.lock().unwrap().emitted.push((channel, payload));
        Ok(())
    }

    fn on_receive(&self, channel: Channel) -> mpsc::Receiver<Value> {
        let (tx, rx) = mpsc::channel(64);
        self.state.lock().unwrap().inbound.insert(channel, tx);
        rx
    }
}
