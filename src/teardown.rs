//! Best-effort shutdown sweep.

use crate::device_address::DeviceAddress;
use crate::driver::{MotionDriver, OrientationReset};
use log::{info, warn};

/// What the sweep managed to do, for the final session log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeardownSummary {
    pub devices: usize,
    pub failed_steps: usize,
}

/// Tear down every device in discovery order, then close the driver.
///
/// Each device gets, in order: orientation reset to default alignment,
/// stop-measurement, disable-logging. A failed step is logged and the sweep
/// moves on; no step failure aborts the remaining steps or the remaining
/// devices. The driver handle is closed unconditionally afterwards.
///
/// Idempotent: running it again (or with no devices) repeats the same
/// best-effort calls and succeeds.
pub fn teardown(driver: &dyn MotionDriver, devices: &[DeviceAddress]) -> TeardownSummary {
    let mut summary = TeardownSummary {
        devices: devices.len(),
        ..Default::default()
    };

    for &address in devices {
        info!("Resetting heading to default for device {}", address);
        if !driver.reset_orientation(address, OrientationReset::DefaultAlignment) {
            warn!("Orientation reset failed for {}", address);
            summary.failed_steps += 1;
        }
        if !driver.stop_measurement(address) {
            warn!("Failed to stop measurement for {}", address);
            summary.failed_steps += 1;
        }
        if !driver.disable_logging(address) {
            warn!("Failed to disable logging for {}", address);
            summary.failed_steps += 1;
        }
    }

    info!("Closing ports");
    driver.close();
    summary
}
