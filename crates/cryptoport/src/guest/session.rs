// SPDX-License-Identifier: Apache-2.0

use super::{Device, Handler, Registry};
use crate::cipher::{Cipher, Operation};
use crate::{Error, Result, NO_FD};

use core::ffi::c_int;
use std::sync::Arc;

use log::{trace, warn};

/// Lifecycle of a [`Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Active,
    Closed,
}

/// The guest's open file on a crypto device.
///
/// Holds exactly one host handle while [`Active`](State::Active). Closing is final.
pub struct Session {
    device: Arc<Device>,
    host_fd: c_int,
    state: State,
}

impl Session {
    /// Opens the device registered under `minor`.
    pub fn open(registry: &Registry, minor: u32) -> Result<Self> {
        Self::with_device(registry.get(minor)?)
    }

    /// Opens `device` directly.
    pub fn with_device(device: Arc<Device>) -> Result<Self> {
        trace!("opening crypto device minor {}", device.minor());
        let host_fd = device.open()?;
        Ok(Self {
            device,
            host_fd,
            state: State::Active,
        })
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// Host handle, or [`NO_FD`] once closed.
    #[inline]
    pub fn host_fd(&self) -> c_int {
        self.host_fd
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    fn active(&self) -> Result<c_int> {
        match self.state {
            State::Active => Ok(self.host_fd),
            State::Closed => Err(Error::SessionClosed),
        }
    }

    /// Releases the host handle.
    ///
    /// Local state is always discarded; failures to reach the host are only logged.
    pub fn close(&mut self) {
        if self.state == State::Closed {
            return;
        }

        let fd = self.host_fd;
        self.host_fd = NO_FD;
        self.state = State::Closed;

        trace!("closing host handle {fd}");
        if let Err(e) = self.device.close(fd) {
            warn!("failed to close host handle {fd}: {e}");
        }
    }

    /// Creates a cipher session keyed with `key`, returning its id.
    pub fn create_session(&self, cipher: Cipher, key: &[u8]) -> Result<u32> {
        self.device.create_session(self.active()?, cipher, key)
    }

    /// Ends session `ses`, returning the host status.
    pub fn end_session(&self, ses: u32) -> Result<c_int> {
        self.device.end_session(self.active()?, ses)
    }

    /// Transforms `src` within session `ses`.
    pub fn crypt(&self, ses: u32, op: Operation, src: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
        self.device.crypt(self.active()?, ses, op, src, iv)
    }

    #[inline]
    pub fn encrypt(&self, ses: u32, src: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
        self.crypt(ses, Operation::Encrypt, src, iv)
    }

    #[inline]
    pub fn decrypt(&self, ses: u32, src: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
        self.crypt(ses, Operation::Decrypt, src, iv)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close()
    }
}
