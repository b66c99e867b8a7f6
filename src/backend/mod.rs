// SPDX-License-Identifier: Apache-2.0

#[cfg(target_os = "linux")]
mod cryptodev;
mod soft;

use std::sync::Arc;

use anyhow::{Context, Result};
use cryptoport::channel::{Options, Virtqueue};
use cryptoport::guest::{self, Registry, Session};
use cryptoport::host::{Device, Dispatcher};
use log::{debug, info};
use once_cell::sync::Lazy;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Host backends, in order of preference.
pub static BACKENDS: Lazy<Vec<Box<dyn Backend>>> = Lazy::new(|| {
    vec![
        #[cfg(target_os = "linux")]
        Box::new(cryptodev::Backend),
        Box::new(soft::Backend),
    ]
});

pub trait Backend: Sync + Send {
    /// The name of the backend
    fn name(&self) -> &'static str;

    /// Whether or not the platform has support for this backend
    fn have(&self) -> bool {
        self.data().iter().all(|d| d.pass)
    }

    /// The tests that show platform support for the backend
    fn data(&self) -> Vec<Datum>;

    /// Starts a host on this backend with `devices` guest devices attached
    fn relay(&self, devices: u32, options: Options) -> Result<Relay>;
}

impl Serialize for dyn Backend {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("Backend", 3)?;
        s.serialize_field("backend", self.name())?;
        s.serialize_field("have", &self.have())?;
        s.serialize_field("data", &self.data())?;
        s.end()
    }
}

#[derive(Debug, Serialize)]
pub struct Datum {
    /// The name of this datum.
    pub name: String,

    /// Whether the datum indicates support for the platform or not.
    pub pass: bool,

    /// Short additional information to display to the user.
    pub info: Option<String>,

    /// Longer explanatory message on how to resolve problems.
    pub mesg: Option<String>,
}

/// A running host with guest devices registered as minors `0..devices`.
pub struct Relay {
    registry: Registry,
    shutdown: Option<Box<dyn FnOnce() + Send>>,
}

impl Relay {
    /// Serves `device` through one virtqueue per guest device.
    pub fn spawn<D: Device>(device: D, devices: u32, options: Options) -> Result<Self> {
        let name = device.name();
        let dispatcher = Arc::new(Dispatcher::new(device));
        let registry = Registry::new();
        for minor in 0..devices {
            let queue = Virtqueue::spawn(dispatcher.clone(), options)
                .with_context(|| format!("failed to start virtqueue for minor {minor}"))?;
            registry.add(guest::Device::new(minor, queue))?;
        }
        info!("{name} relay up with {devices} device(s)");

        Ok(Self {
            registry,
            shutdown: Some(Box::new(move || dispatcher.shutdown())),
        })
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Opens a session on device `minor`.
    pub fn session(&self, minor: u32) -> Result<Session> {
        Session::open(&self.registry, minor)
            .with_context(|| format!("failed to open crypto device minor {minor}"))
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            debug!("shutting down relay");
            shutdown();
        }
    }
}
