//! Simulated driver backend.
//!
//! Generates deterministic synthetic orientation data for a configurable
//! number of virtual sensors, so the whole pipeline can run end-to-end on a
//! machine with no radio and no vendor SDK. Virtual devices appear a short
//! while after discovery is enabled, mimicking real advertising latency.

use super::{DriverCallbacks, DriverError, FilterProfile, MotionDriver, OrientationReset, PortInfo};
use crate::device_address::DeviceAddress;
use crate::packet::{EulerAngles, MeasurementMode};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long after `enable_discovery` the virtual devices show up.
const APPEAR_DELAY: Duration = Duration::from_millis(400);

/// Profiles the virtual sensors claim to support.
const SIM_PROFILES: [&str; 2] = ["General", "Dynamic"];

#[derive(Default)]
struct SimState {
    discovery_enabled: bool,
    detected: Vec<PortInfo>,
    open: HashSet<DeviceAddress>,
    measuring: HashSet<DeviceAddress>,
    profiles: HashMap<DeviceAddress, FilterProfile>,
    output_rate_hz: u16,
    callbacks: Option<Arc<dyn DriverCallbacks>>,
}

/// Driver backend producing synthetic euler sweeps.
pub struct SimulatedDriver {
    device_count: usize,
    state: Arc<Mutex<SimState>>,
    closed: Arc<AtomicBool>,
}

impl SimulatedDriver {
    /// Create a simulated driver with `device_count` virtual sensors and
    /// start its measurement tick loop.
    pub fn new(device_count: usize) -> Self {
        let state = Arc::new(Mutex::new(SimState {
            output_rate_hz: 60,
            ..SimState::default()
        }));
        let closed = Arc::new(AtomicBool::new(false));
        spawn_measurement_task(Arc::clone(&state), Arc::clone(&closed));
        Self { device_count, state, closed }
    }

    /// Deterministic address for virtual device `index`.
    fn address_for(index: usize) -> DeviceAddress {
        DeviceAddress([0xD4, 0x22, 0xCD, 0x00, 0x4A, index as u8])
    }
}

/// One task serves all virtual devices, ticking at the configured rate.
fn spawn_measurement_task(state: Arc<Mutex<SimState>>, closed: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut tick = 0u64;
        loop {
            let (rate, measuring, callbacks) = {
                let state = state.lock().unwrap();
                (
                    state.output_rate_hz.max(1),
                    state.measuring.iter().copied().collect::<Vec<_>>(),
                    state.callbacks.clone(),
                )
            };
            tokio::time::sleep(Duration::from_millis(1000 / u64::from(rate))).await;
            if closed.load(Ordering::Relaxed) {
                break;
            }
            tick += 1;
            if let Some(callbacks) = callbacks {
                for (slot, address) in measuring.into_iter().enumerate() {
                    callbacks.on_packet(address, synth_euler(tick, slot));
                }
            }
        }
    });
}

/// Slow deterministic sweep through the euler range, phase-shifted per
/// device so streams are distinguishable.
fn synth_euler(tick: u64, slot: usize) -> EulerAngles {
    let phase = (tick as f64) * 0.5 + (slot as f64) * 45.0;
    EulerAngles::new(
        (phase % 360.0) - 180.0,
        ((phase * 0.5) % 180.0) - 90.0,
        ((phase * 2.0) % 360.0) - 180.0,
    )
}

impl MotionDriver for SimulatedDriver {
    fn sdk_version(&self) -> String {
        format!("simulated ({} virtual devices)", self.device_count)
    }

    fn set_callbacks(&self, callbacks: Arc<dyn DriverCallbacks>) {
        self.state.lock().unwrap().callbacks = Some(callbacks);
    }

    fn enable_discovery(&self) -> Result<(), DriverError> {
        self.state.lock().unwrap().discovery_enabled = true;

        // Devices advertise after a short delay, one by one.
        let state = Arc::clone(&self.state);
        let count = self.device_count;
        tokio::spawn(async move {
            for index in 0..count {
                tokio::time::sleep(APPEAR_DELAY).await;
                let mut state = state.lock().unwrap();
                if !state.discovery_enabled {
                    break;
                }
                let port = PortInfo::new(Self::address_for(index));
                if !state.detected.contains(&port) {
                    state.detected.push(port);
                }
            }
        });
        Ok(())
    }

    fn disable_discovery(&self) {
        self.state.lock().unwrap().discovery_enabled = false;
    }

    fn detected_devices(&self) -> Vec<PortInfo> {
        self.state.lock().unwrap().detected.clone()
    }

    fn open_port(&self, port: &PortInfo) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        if state.detected.iter().any(|p| p.address == port.address) {
            state.open.insert(port.address);
            Ok(())
        } else {
            Err(DriverError::PortOpen {
                address: port.address,
                reason: "device not detected".to_string(),
            })
        }
    }

    fn device_tag(&self, address: DeviceAddress) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .detected
            .iter()
            .position(|p| p.address == address)
            .map(|i| format!("sim-{i}"))
    }

    fn available_filter_profiles(&self, _address: DeviceAddress) -> Vec<FilterProfile> {
        SIM_PROFILES.iter().map(|label| FilterProfile::new(*label)).collect()
    }

    fn current_filter_profile(&self, address: DeviceAddress) -> Option<FilterProfile> {
        self.state.lock().unwrap().profiles.get(&address).cloned()
    }

    fn set_filter_profile(&self, address: DeviceAddress, profile: &FilterProfile) -> bool {
        if !SIM_PROFILES.contains(&profile.label()) {
            return false;
        }
        self.state
            .lock()
            .unwrap()
            .profiles
            .insert(address, profile.clone());
        true
    }

    fn set_output_rate(&self, _address: DeviceAddress, rate_hz: u16) -> bool {
        if rate_hz == 0 {
            return false;
        }
        self.state.lock().unwrap().output_rate_hz = rate_hz;
        true
    }

    fn start_measurement(&self, address: DeviceAddress, _mode: MeasurementMode) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.open.contains(&address) {
            state.measuring.insert(address);
            true
        } else {
            false
        }
    }

    fn stop_measurement(&self, address: DeviceAddress) -> bool {
        self.state.lock().unwrap().measuring.remove(&address);
        true
    }

    fn disable_logging(&self, _address: DeviceAddress) -> bool {
        true
    }

    fn reset_orientation(&self, address: DeviceAddress, _mode: OrientationReset) -> bool {
        self.state.lock().unwrap().open.contains(&address)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        let mut state = self.state.lock().unwrap();
        state.measuring.clear();
        state.open.clear();
    }
}
