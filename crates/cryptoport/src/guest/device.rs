// SPDX-License-Identifier: Apache-2.0

use super::Handler;
use crate::channel::{CancelToken, Channel};
use crate::segment::SegmentList;
use crate::{Error, Result};

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, trace};

/// A guest-side crypto device bound to one channel.
pub struct Device {
    minor: u32,
    channel: Box<dyn Channel>,
    lock: Mutex<()>,
    cancel: CancelToken,
}

impl Device {
    pub fn new(minor: u32, channel: impl Channel + 'static) -> Self {
        Self {
            minor,
            channel: Box::new(channel),
            lock: Mutex::new(()),
            cancel: CancelToken::new(),
        }
    }

    #[inline]
    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Token aborting requests blocked on this device.
    #[inline]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

impl Handler for Device {
    fn sally(&self, segments: SegmentList) -> Result<SegmentList> {
        // One request in flight per device; completions arrive in submission order.
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let minor = self.minor;
        trace!("minor {minor}: submitting {} segments", segments.len());
        self.channel.submit(segments, &self.cancel)
    }
}

/// Devices indexed by minor number.
#[derive(Default)]
pub struct Registry {
    devices: RwLock<Vec<Arc<Device>>>,
}

impl Registry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `device`, rejecting a minor that is already taken.
    pub fn add(&self, device: Device) -> Result<Arc<Device>> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        if devices.iter().any(|d| d.minor == device.minor) {
            return Err(Error::DeviceExists(device.minor));
        }
        debug!("registered crypto device minor {}", device.minor);
        let device = Arc::new(device);
        devices.push(device.clone());
        Ok(device)
    }

    /// Looks up the device registered under `minor`.
    pub fn get(&self, minor: u32) -> Result<Arc<Device>> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices
            .iter()
            .find(|d| d.minor == minor)
            .cloned()
            .ok_or(Error::NoSuchDevice(minor))
    }

    /// Unregisters `minor`. Sessions already open on it keep working.
    pub fn remove(&self, minor: u32) -> Option<Arc<Device>> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let index = devices.iter().position(|d| d.minor == minor)?;
        Some(devices.remove(index))
    }

    /// Registered minor numbers, in registration order.
    pub fn minors(&self) -> Vec<u32> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.iter().map(|d| d.minor).collect()
    }
}
