//! Bounded device discovery.

use crate::driver::{DriverError, MotionDriver, PortInfo};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::{Instant, interval};

/// Poll interval for the discovery loop.
pub const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Keeps discovery enabled for its lifetime.
///
/// Discovery must be switched off on every exit path of the scan loop,
/// including early error returns, so the release lives in `Drop`.
struct DiscoveryGuard<'a> {
    driver: &'a dyn MotionDriver,
}

impl<'a> DiscoveryGuard<'a> {
    fn enable(driver: &'a dyn MotionDriver) -> Result<Self, DriverError> {
        driver.enable_discovery()?;
        Ok(Self { driver })
    }
}

impl Drop for DiscoveryGuard<'_> {
    fn drop(&mut self) {
        self.driver.disable_discovery();
    }
}

/// Scan for devices for at most `timeout`.
///
/// Polls the driver's detected set every 100 ms and logs a progress notice
/// only when the count changes since the last poll. The loop exits early
/// when the driver raises its asynchronous error flag; whatever was
/// discovered up to that point is returned. An empty result is the caller's
/// problem — scanning is one-shot, never retried here.
pub async fn scan(
    driver: &dyn MotionDriver,
    timeout: Duration,
    error_flag: &AtomicBool,
) -> Result<Vec<PortInfo>, DriverError> {
    info!("Scanning for devices for {} seconds", timeout.as_secs());
    let _guard = DiscoveryGuard::enable(driver)?;

    let start = Instant::now();
    let mut ticker = interval(SCAN_POLL_INTERVAL);
    let mut last_count = 0usize;

    loop {
        ticker.tick().await;
        if error_flag.load(Ordering::Relaxed) {
            info!("Driver error raised, stopping scan early");
            break;
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            break;
        }
        let count = driver.detected_devices().len();
        if count != last_count {
            let remaining = timeout.saturating_sub(elapsed);
            info!(
                "Discovered {} device(s), stopping scan in {} seconds",
                count,
                remaining.as_secs()
            );
            last_count = count;
        }
    }

    info!("Stopped scanning for devices");
    Ok(driver.detected_devices())
}
