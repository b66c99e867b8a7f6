// SPDX-License-Identifier: Apache-2.0

//! API for the paravirtualized cryptodev boundary
//!
//! `cryptoport` is a protocol crate for proxying cryptodev requests (open, close and the
//! session/crypt ioctls) from a guest to a host process which owns the real device.
//!
//! # Mechanism of action
//!
//! The guest never shares its own memory layout with the host. Every logical request is
//! flattened into a [`SegmentList`](segment::SegmentList): an ordered list of independent byte
//! buffers, each tagged as either readable (filled by the guest, read by the host) or writable
//! (filled by the host, read back by the guest). All readable segments precede all writable
//! segments.
//!
//! No segment ever contains a pointer. Whenever the host needs a structure with pointer fields
//! (for example a cryptodev `crypt_op`), it builds that structure locally and points its fields
//! at the buffers of the corresponding segments, found by index.
//!
//! # Segment layout
//!
//! The order and count of segments for each request kind is fixed and shared by both sides via
//! the [`schema`] table. Scalars are 4-byte integers in host-native byte order.
//!
//! | Kind             | Readable                                                 | Writable       |
//! |------------------|----------------------------------------------------------|----------------|
//! | `OPEN`           | `syscall`                                                | `host_fd`      |
//! | `CLOSE`          | `syscall`, `host_fd`                                     |                |
//! | `CREATE_SESSION` | `syscall`, `host_fd`, `cmd`, `cipher`, `key`             | `ses`, `status`|
//! | `END_SESSION`    | `syscall`, `host_fd`, `cmd`, `ses`                       | `status`       |
//! | `CRYPT`          | `syscall`, `host_fd`, `cmd`, `ses`, `op`, `len`, `src`, `iv` | `dst`, `status` |
//!
//! The guest side lives in [`guest`], the host side in [`host`]. The transport connecting the
//! two only needs to implement [`Channel`](channel::Channel).

#![deny(clippy::all)]
#![warn(rust_2018_idioms)]

pub mod channel;
pub mod cipher;
pub mod codec;
pub mod guest;
pub mod host;
pub mod schema;
pub mod segment;

use core::ffi::c_int;

use libc::{
    E2BIG, EBADF, ECANCELED, EEXIST, EFAULT, EINVAL, EIO, ENODEV, ENOTSUP, EPIPE, ETIMEDOUT,
};

/// Error type used within this crate.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No device is registered under the given minor number.
    #[error("no crypto device with minor {0}")]
    NoSuchDevice(u32),

    /// A device is already registered under the given minor number.
    #[error("crypto device with minor {0} already registered")]
    DeviceExists(u32),

    /// The host failed to open its side of the device.
    #[error("host failed to open the crypto device")]
    HostOpenFailed,

    /// The session was already closed.
    #[error("session is closed")]
    SessionClosed,

    /// The cipher is not known to this crate.
    #[error("unsupported cipher {0}")]
    UnsupportedCipher(u32),

    /// The key length does not match what the cipher requires.
    #[error("invalid key length {len} for cipher {cipher}")]
    InvalidKeyLength { cipher: u32, len: usize },

    /// A buffer length violates the cipher's block constraints.
    #[error("invalid {what} length {len}")]
    InvalidLength { what: &'static str, len: usize },

    /// A payload exceeds the largest buffer the relay will carry.
    #[error("payload of {len} bytes exceeds maximum of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// A segment returned by the host does not have the expected shape.
    #[error("bad address in response")]
    Fault,

    /// A segment list does not match the schema for its kind.
    #[error("malformed segment list: {0}")]
    Malformed(&'static str),

    /// The host reported a failure status for a session operation.
    #[error("host operation failed with status {0}")]
    Remote(c_int),

    /// The host reported a failure status for a transform.
    #[error("transform failed with status {0}")]
    TransformFailed(c_int),

    /// The channel did not complete the request in time.
    #[error("transport timed out")]
    TransportTimeout,

    /// The request was cancelled while waiting for completion.
    #[error("request cancelled")]
    Cancelled,

    /// The remote side of the channel is gone.
    #[error("channel disconnected")]
    Disconnected,
}

impl Error {
    /// Returns the errno value corresponding to this error.
    pub fn errno(&self) -> c_int {
        match self {
            Self::NoSuchDevice(_) | Self::HostOpenFailed => ENODEV,
            Self::DeviceExists(_) => EEXIST,
            Self::SessionClosed => EBADF,
            Self::UnsupportedCipher(_) => ENOTSUP,
            Self::InvalidKeyLength { .. } | Self::InvalidLength { .. } => EINVAL,
            Self::PayloadTooLarge { .. } => E2BIG,
            Self::Fault => EFAULT,
            Self::Malformed(_) => EIO,
            Self::Remote(status) | Self::TransformFailed(status) => {
                status.checked_neg().unwrap_or(EIO)
            }
            Self::TransportTimeout => ETIMEDOUT,
            Self::Cancelled => ECANCELED,
            Self::Disconnected => EPIPE,
        }
    }
}

/// Result type returned by functionality exposed by this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Sentinel value of an unset host handle.
pub const NO_FD: c_int = -1;

/// The cryptoport version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
