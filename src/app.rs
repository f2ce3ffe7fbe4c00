//! Core application runner for `dot-relay`.
//!
//! Decoupled from CLI parsing and process exit codes so a whole session can
//! be run deterministically in tests with an injected driver and transport.

use crate::config::{RelayConfig, SessionConfig, TransportConfig};
use crate::driver::{FilterProfile, MotionDriver};
use crate::packet::MeasurementMode;
use crate::relay::message::ControlCommand;
use crate::relay::{PACKET_CHANNEL_BUFFER_SIZE, RelayBridge};
use crate::session::{SessionError, SessionReport, SessionStateMachine};
use crate::transport::{Transport, TransportError};
use clap::Parser;
use log::info;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Command-line options.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Measurement payload mode
    #[arg(long, default_value_t, value_enum)]
    pub mode: MeasurementMode,

    /// Sensor output rate in Hz
    #[arg(long, default_value_t = 60)]
    pub rate: u16,

    /// Onboard filter profile to select
    #[arg(long, default_value = "General")]
    pub profile: String,

    /// Scan duration in milliseconds
    #[arg(long, default_value_t = 8000)]
    pub scan_timeout: u64,

    /// Streaming duration in milliseconds, 0 for infinite
    #[arg(long, default_value_t = 0)]
    pub duration: u64,

    /// Host the subscriber listener binds to
    #[arg(long, default_value = "localhost")]
    pub listen_host: String,

    /// Port the subscriber listener binds to
    #[arg(long, default_value_t = 3001)]
    pub listen_port: u16,

    /// Optional upstream host packets are also pushed to
    #[arg(long)]
    pub publish_host: Option<String>,

    /// Port of the upstream endpoint
    #[arg(long, default_value_t = 3001)]
    pub publish_port: u16,

    /// Number of simulated sensors served by the built-in driver backend
    #[arg(long, default_value_t = 2)]
    pub sim_devices: usize,
}

impl Options {
    /// Assemble the typed configuration from the CLI surface.
    pub fn to_config(&self) -> RelayConfig {
        RelayConfig {
            session: SessionConfig {
                measurement_mode: self.mode,
                output_rate_hz: self.rate,
                filter_profile: FilterProfile::new(self.profile.clone()),
                scan_timeout: std::time::Duration::from_millis(self.scan_timeout),
                stream_duration: SessionConfig::stream_duration_from_ms(self.duration),
            },
            transport: TransportConfig {
                listen_host: self.listen_host.clone(),
                listen_port: self.listen_port,
                publish_host: self.publish_host.clone(),
                publish_port: self.publish_port,
            },
        }
    }
}

/// Errors returned by the application runner.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Wires the relay pipeline together and runs one session to completion.
pub struct App {
    config: SessionConfig,
    driver: Arc<dyn MotionDriver>,
    transport: Arc<dyn Transport>,
    control_tx: mpsc::Sender<ControlCommand>,
    control_rx: mpsc::Receiver<ControlCommand>,
}

impl App {
    pub fn new(
        config: SessionConfig,
        driver: Arc<dyn MotionDriver>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::channel(8);
        Self { config, driver, transport, control_tx, control_rx }
    }

    /// Sender for injecting external control commands (Ctrl-C handler,
    /// tests). Commands land on the same path as subscriber commands.
    pub fn control_handle(&self) -> mpsc::Sender<ControlCommand> {
        self.control_tx.clone()
    }

    /// Run the session: scan, configure, stream, tear down.
    pub async fn run(self) -> Result<SessionReport, RunError> {
        info!("Using motion SDK version: {}", self.driver.sdk_version());

        let (packet_tx, packet_rx) = mpsc::channel(PACKET_CHANNEL_BUFFER_SIZE);
        let bridge = RelayBridge::new(Arc::clone(&self.transport));
        bridge.start(packet_rx, self.control_tx.clone());

        let session =
            SessionStateMachine::new(self.config, self.driver, packet_tx, self.control_rx);
        let report = session.run().await?;

        info!(
            "Session closed: {} device(s), {} packet(s) dropped, calibration {}",
            report.packet_totals.len(),
            report.packets_dropped,
            if report.calibration_done { "done" } else { "skipped" },
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ADDR_A, FakeDriver, FakeTransport, euler};
    use crate::transport::Channel;
    use serde_json::json;
    use std::time::Duration;

    fn session_config(duration_ms: u64) -> SessionConfig {
        SessionConfig {
            scan_timeout: Duration::from_millis(200),
            stream_duration: SessionConfig::stream_duration_from_ms(duration_ms),
            ..SessionConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_session_publishes_packets_to_subscribers() {
        let driver = Arc::new(FakeDriver::new());
        driver.add_detected(ADDR_A);
        let transport = Arc::new(FakeTransport::new());
        let app = App::new(
            session_config(1000),
            Arc::clone(&driver) as Arc<dyn MotionDriver>,
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        let feeder = Arc::clone(&driver);
        tokio::spawn(async move {
            // Mid-stream (scan ends at 200 ms).
            tokio::time::sleep(Duration::from_millis(600)).await;
            feeder.send_packet(ADDR_A, euler(12.5));
            feeder.send_packet(ADDR_A, euler(13.0));
        });

        let report = app.run().await.unwrap();
        assert_eq!(report.packet_totals, vec![(ADDR_A, 2)]);

        // Give the publish loop a beat to drain.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let published = transport.emitted_on(Channel::Stream);
        assert_eq!(published.len(), 2);
        assert_eq!(published[0]["address"], json!(ADDR_A.to_string()));
        assert_eq!(published[0]["sequence"], json!(1));
        assert_eq!(published[0]["euler_x"], json!(12.5));
        assert_eq!(published[1]["sequence"], json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriber_stop_command_ends_session() {
        let driver = Arc::new(FakeDriver::new());
        driver.add_detected(ADDR_A);
        let transport = Arc::new(FakeTransport::new());
        let app = App::new(
            session_config(0),
            Arc::clone(&driver) as Arc<dyn MotionDriver>,
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        let commander = Arc::clone(&transport);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            commander.push_inbound(Channel::Control, json!({"command": "stop"}));
        });

        let report = app.run().await.unwrap();
        assert!(!report.calibration_done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_control_handle_stops_session() {
        let driver = Arc::new(FakeDriver::new());
        driver.add_detected(ADDR_A);
        let transport = Arc::new(FakeTransport::new());
        let app = App::new(
            session_config(0),
            Arc::clone(&driver) as Arc<dyn MotionDriver>,
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        let stop = app.control_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let _ = stop.send(ControlCommand::Stop).await;
        });

        app.run().await.unwrap();
    }

    #[test]
    fn test_options_to_config() {
        let options = Options::parse_from([
            "dot-relay",
            "--rate",
            "120",
            "--profile",
            "Dynamic",
            "--scan-timeout",
            "2000",
            "--duration",
            "10000",
            "--publish-host",
            "relay.example",
        ]);
        let config = options.to_config();
        assert_eq!(config.session.output_rate_hz, 120);
        assert_eq!(config.session.filter_profile.label(), "Dynamic");
        assert_eq!(config.session.scan_timeout, Duration::from_millis(2000));
        assert_eq!(
            config.session.stream_duration,
            Some(Duration::from_millis(10000))
        );
        assert_eq!(config.transport.publish_host.as_deref(), Some("relay.example"));
    }

    #[test]
    fn test_options_zero_duration_is_infinite() {
        let options = Options::parse_from(["dot-relay"]);
        let config = options.to_config();
        assert!(config.session.stream_duration.is_none());
    }
}
