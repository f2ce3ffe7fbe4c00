//! Session state machine and packet gating.
//!
//! One `SessionStateMachine` drives a sensor set from discovery to teardown:
//!
//! ```text
//! Idle → Scanning → Configuring → Armed → Streaming → Stopping → Closed
//!                                              |
//!                                              └ Failed (fatal)
//! ```
//!
//! Packet acceptance is decoupled from the control loop: the driver invokes
//! [`PacketGate`] from its own threads, and the gate's stream flag decides
//! in O(1) whether a packet is forwarded to the relay or dropped. Streaming
//! never emits before the gate is armed and never after teardown begins.

use crate::config::SessionConfig;
use crate::counter::PacketCounter;
use crate::device_address::DeviceAddress;
use crate::driver::{DriverCallbacks, DriverError, MotionDriver, OrientationReset};
use crate::packet::{EulerAngles, MeasurementPacket};
use crate::registry::{ConnectionState, DeviceRegistry};
use crate::relay::message::ControlCommand;
use crate::scan;
use crate::teardown;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval};

/// Delay from arming until the one-time heading calibration, measured in
/// actively streamed time.
pub const CALIBRATION_DELAY: Duration = Duration::from_secs(5);

/// Poll interval for deadline, stop and calibration checks.
pub const SESSION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Configuring,
    Armed,
    Streaming,
    Stopping,
    Closed,
    Failed,
}

/// Fatal session errors. Per-device failures never surface here; they are
/// logged and the session continues with the remaining devices.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("no devices found during scan")]
    NoDevicesDiscovered,
    #[error("no devices could be configured")]
    NoDevicesConfigured,
    #[error("no devices entered measurement mode")]
    NoDevicesMeasuring,
    #[error("driver raised fatal error code {0:#06x}")]
    DriverFault(u32),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// What ended the streaming phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    DeadlineReached,
    ExternalStop,
    DriverError,
}

/// Outcome of a completed session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Accepted packets per device, sorted by address
    pub packet_totals: Vec<(DeviceAddress, u64)>,
    /// Packets dropped because the relay queue was full
    pub packets_dropped: u64,
    /// Whether the in-stream heading calibration ran
    pub calibration_done: bool,
    /// Teardown sweep result
    pub teardown: teardown::TeardownSummary,
}

/// Driver-facing packet and error sink.
///
/// Invoked from the driver's callback threads; every path through here is
/// non-blocking: an atomic flag load, an atomic counter increment, and a
/// `try_send` into the bounded relay queue. Packets arriving while the gate
/// is not armed are discarded without a trace (no buffering across state
/// boundaries).
pub struct PacketGate {
    streaming: AtomicBool,
    counter: OnceLock<Arc<PacketCounter>>,
    packet_tx: mpsc::Sender<MeasurementPacket>,
    dropped: AtomicU64,
    error_raised: AtomicBool,
    error_code: AtomicU32,
}

impl PacketGate {
    pub fn new(packet_tx: mpsc::Sender<MeasurementPacket>) -> Self {
        Self {
            streaming: AtomicBool::new(false),
            counter: OnceLock::new(),
            packet_tx,
            dropped: AtomicU64::new(0),
            error_raised: AtomicBool::new(false),
            error_code: AtomicU32::new(0),
        }
    }

    /// Install the counter for the accepting device set and raise the
    /// stream flag. The session calls this once, at the Armed → Streaming
    /// transition; the counter cannot be replaced afterwards.
    pub fn arm(&self, counter: Arc<PacketCounter>) {
        let _ = self.counter.set(counter);
        self.streaming.store(true, Ordering::Release);
    }

    /// Lower the stream flag. Packets arriving afterwards are discarded.
    pub fn disarm(&self) {
        self.streaming.store(false, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub fn error_raised(&self) -> bool {
        self.error_raised.load(Ordering::Acquire)
    }

    pub fn error_code(&self) -> u32 {
        self.error_code.load(Ordering::Relaxed)
    }

    pub fn packets_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn counter(&self) -> Option<&Arc<PacketCounter>> {
        self.counter.get()
    }
}

impl DriverCallbacks for PacketGate {
    fn on_packet(&self, address: DeviceAddress, euler: EulerAngles) {
        if !self.streaming.load(Ordering::Acquire) {
            return;
        }
        let Some(counter) = self.counter.get() else {
            return;
        };
        // Unknown address: device was excluded from packet acceptance.
        let Some(sequence) = counter.next_sequence(address) else {
            return;
        };
        let packet = MeasurementPacket { address, sequence, euler };
        if self.packet_tx.try_send(packet).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_error(&self, code: u32) {
        self.error_code.store(code, Ordering::Relaxed);
        self.error_raised.store(true, Ordering::Release);
    }
}

/// Drives one streaming session from scan to teardown.
///
/// There is exactly one of these per process run; `run` consumes it, so a
/// session cannot be restarted once it reaches a terminal state.
pub struct SessionStateMachine {
    config: SessionConfig,
    driver: Arc<dyn MotionDriver>,
    registry: DeviceRegistry,
    gate: Arc<PacketGate>,
    control_rx: mpsc::Receiver<ControlCommand>,
    state: SessionState,
    calibration_done: bool,
    /// Devices whose measurement actually started; only these are counted.
    accepting: Vec<DeviceAddress>,
}

impl SessionStateMachine {
    /// Wire the session to the driver and the relay.
    ///
    /// Accepted packets flow out through `packet_tx`; subscriber commands
    /// flow in through `control_rx`. Registers the packet gate with the
    /// driver, so callbacks may start arriving immediately — they are
    /// discarded until the gate is armed.
    pub fn new(
        config: SessionConfig,
        driver: Arc<dyn MotionDriver>,
        packet_tx: mpsc::Sender<MeasurementPacket>,
        control_rx: mpsc::Receiver<ControlCommand>,
    ) -> Self {
        let gate = Arc::new(PacketGate::new(packet_tx));
        driver.set_callbacks(Arc::clone(&gate) as Arc<dyn DriverCallbacks>);
        Self {
            config,
            driver,
            registry: DeviceRegistry::new(),
            gate,
            control_rx,
            state: SessionState::Idle,
            calibration_done: false,
            accepting: Vec::new(),
        }
    }

    /// Shared handle to the packet gate, mainly for tests and diagnostics.
    pub fn gate(&self) -> Arc<PacketGate> {
        Arc::clone(&self.gate)
    }

    /// Run the session to completion.
    ///
    /// On a fatal condition the teardown sweep still runs (best-effort)
    /// before the error is returned and the state lands in `Failed`.
    pub async fn run(mut self) -> Result<SessionReport, SessionError> {
        match self.run_phases().await {
            Ok(report) => Ok(report),
            Err(error) => {
                self.state = SessionState::Failed;
                Err(error)
            }
        }
    }

    async fn run_phases(&mut self) -> Result<SessionReport, SessionError> {
        // Idle → Scanning
        self.state = SessionState::Scanning;
        let discovered = scan::scan(
            self.driver.as_ref(),
            self.config.scan_timeout,
            &self.gate.error_raised,
        )
        .await?;
        if discovered.is_empty() {
            warn!("No devices found, aborting");
            self.fail_with_teardown();
            return Err(SessionError::NoDevicesDiscovered);
        }

        // Scanning → Configuring
        self.state = SessionState::Configuring;
        for port in &discovered {
            self.registry.record_discovered(port);
        }
        for port in discovered {
            if self.stop_requested() {
                info!("Stop requested during configuration");
                return Ok(self.stop_and_close(StopReason::ExternalStop));
            }
            if let Err(error) = self.registry.open_and_configure(
                self.driver.as_ref(),
                port.address,
                &self.config.filter_profile,
                self.config.output_rate_hz,
            ) {
                warn!("{}", error);
            }
        }
        if self.registry.active_addresses().is_empty() {
            warn!("No devices could be configured, aborting");
            self.fail_with_teardown();
            return Err(SessionError::NoDevicesConfigured);
        }

        // Configuring → Armed
        self.state = SessionState::Armed;
        info!("Putting devices into measurement mode");
        for address in self.registry.active_addresses() {
            if self.driver.start_measurement(address, self.config.measurement_mode) {
                self.registry.set_state(address, ConnectionState::Measuring);
                self.accepting.push(address);
            } else {
                warn!("Could not put device {} into measurement mode", address);
            }
        }
        if self.accepting.is_empty() {
            warn!("No devices entered measurement mode, aborting");
            self.fail_with_teardown();
            return Err(SessionError::NoDevicesMeasuring);
        }

        // Armed → Streaming: arm the gate, then watch the clock.
        let counter = Arc::new(PacketCounter::new(self.accepting.iter().copied()));
        self.gate.arm(Arc::clone(&counter));
        self.state = SessionState::Streaming;
        let armed_at = Instant::now();
        match self.config.stream_duration {
            Some(limit) => info!("Streaming for {} ms", limit.as_millis()),
            None => info!("Streaming until stopped"),
        }

        let reason = self.streaming_loop(armed_at).await;
        if reason == StopReason::DriverError {
            let code = self.gate.error_code();
            self.stop_and_close(reason);
            return Err(SessionError::DriverFault(code));
        }
        Ok(self.stop_and_close(reason))
    }

    /// Cooperative check loop. Stop requests, driver errors, the deadline
    /// and the calibration mark are all observed within one poll tick.
    async fn streaming_loop(&mut self, armed_at: Instant) -> StopReason {
        let mut ticker = interval(SESSION_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            if let Some(reason) = self.poll_once(armed_at) {
                return reason;
            }
        }
    }

    /// One poll tick worth of checks.
    fn poll_once(&mut self, armed_at: Instant) -> Option<StopReason> {
        if self.stop_requested() {
            info!("Stop requested");
            return Some(StopReason::ExternalStop);
        }
        if self.gate.error_raised() {
            warn!("Driver error {:#06x} during streaming", self.gate.error_code());
            return Some(StopReason::DriverError);
        }
        let elapsed = armed_at.elapsed();
        if let Some(limit) = self.config.stream_duration
            && elapsed >= limit
        {
            info!("Streaming deadline reached");
            return Some(StopReason::DeadlineReached);
        }
        if !self.calibration_done && elapsed >= CALIBRATION_DELAY {
            self.calibrate();
        }
        None
    }

    /// One-time heading reset, 5 s into streaming. The latch makes a second
    /// firing impossible no matter how often the deadline check runs.
    fn calibrate(&mut self) {
        for &address in &self.accepting {
            info!("Resetting heading for device {}", address);
            if !self.driver.reset_orientation(address, OrientationReset::Heading) {
                warn!("Heading reset failed for {}", address);
            }
        }
        self.calibration_done = true;
    }

    /// Streaming/Configuring → Stopping → Closed.
    fn stop_and_close(&mut self, reason: StopReason) -> SessionReport {
        debug!("Stopping ({:?})", reason);
        self.state = SessionState::Stopping;
        // Lower the flag before touching any device: nothing is emitted
        // once teardown begins.
        self.gate.disarm();

        let devices = self.registry.active_addresses();
        let summary = teardown::teardown(self.driver.as_ref(), &devices);
        for address in devices {
            self.registry.set_state(address, ConnectionState::Closed);
        }
        self.state = SessionState::Closed;

        let packet_totals = self
            .gate
            .counter()
            .map(|c| c.totals())
            .unwrap_or_default();
        for (address, count) in &packet_totals {
            info!("Device {}: {} packets relayed", address, count);
        }

        SessionReport {
            packet_totals,
            packets_dropped: self.gate.packets_dropped(),
            calibration_done: self.calibration_done,
            teardown: summary,
        }
    }

    /// Fatal path before streaming ever started: sweep whatever is active
    /// (possibly nothing) and close the driver.
    fn fail_with_teardown(&mut self) {
        let devices = self.registry.active_addresses();
        teardown::teardown(self.driver.as_ref(), &devices);
    }

    /// Drain pending control commands; `true` if any of them was a stop.
    fn stop_requested(&mut self) -> bool {
        loop {
            match self.control_rx.try_recv() {
                Ok(ControlCommand::Stop) => return true,
                Ok(ControlCommand::Start) => {
                    debug!("Start requested while session is active, ignoring");
                }
                Err(_) => return false,
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }
}
