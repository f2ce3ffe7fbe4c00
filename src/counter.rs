//! Per-device packet counters.
//!
//! Counters are used for dropped-packet diagnostics and to stamp each
//! accepted packet with a strictly increasing per-device sequence number.
//! They are incremented from the driver's packet-callback context, which may
//! run concurrently for different devices, so each counter is an atomic.

use crate::device_address::DeviceAddress;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Strictly increasing per-device packet counters.
///
/// The device set is fixed at construction (when streaming is armed). After
/// that the map is only ever read, so callback-context lookups take no lock.
/// A packet from a device outside the set yields `None` and is dropped by
/// the caller.
#[derive(Debug)]
pub struct PacketCounter {
    counters: HashMap<DeviceAddress, AtomicU64>,
}

impl PacketCounter {
    /// Build counters for the given device set, all starting at zero.
    pub fn new(devices: impl IntoIterator<Item = DeviceAddress>) -> Self {
        let counters = devices
            .into_iter()
            .map(|address| (address, AtomicU64::new(0)))
            .collect();
        Self { counters }
    }

    /// Increment the counter for `address` and return the new sequence
    /// number (first packet gets 1). `None` if the device is not tracked.
    pub fn next_sequence(&self, address: DeviceAddress) -> Option<u64> {
        self.counters
            .get(&address)
            .map(|counter| counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Current count for a device without incrementing.
    pub fn count(&self, address: DeviceAddress) -> Option<u64> {
        self.counters
            .get(&address)
            .map(|counter| counter.load(Ordering::Relaxed))
    }

    /// Snapshot of all counters, for the end-of-session summary.
    pub fn totals(&self) -> Vec<(DeviceAddress, u64)> {
        let mut totals: Vec<(DeviceAddress, u64)> = self
            .counters
            .iter()
            .map(|(address, counter)| (*address, counter.load(Ordering::Relaxed)))
            .collect();
        totals.sort_by_key(|(address, _)| address.0);
        totals
    }
}
