// SPDX-License-Identifier: Apache-2.0

//! Guest entrypoint into the relay.
//!
//! A [`Session`] is the guest's open file on a crypto device. Every operation on it is staged
//! into a request, [encoded](crate::codec::encode) into segments, passed to the host through the
//! device's [`Channel`](crate::channel::Channel) via [`sally`](Handler::sally), and collected
//! from the writable segments once the host completes it.
//!
//! Devices are looked up by minor number in a [`Registry`].

pub mod call;

mod device;
mod session;

pub use call::Call;
pub use device::{Device, Registry};
pub use session::{Session, State};

use crate::cipher::{Cipher, Operation};
use crate::codec::{decode, encode};
use crate::segment::SegmentList;
use crate::Result;

use core::ffi::c_int;

/// Guest request handler.
pub trait Handler {
    /// Passes `segments` to the host and blocks until they are completed.
    fn sally(&self, segments: SegmentList) -> Result<SegmentList>;

    /// Executes an arbitrary call.
    #[inline]
    fn execute<C: Call>(&self, call: C) -> Result<C::Collected> {
        let (kind, segments) = {
            let request = call.stage()?;
            (request.kind(), encode(&request)?)
        };
        let segments = self.sally(segments)?;
        call.collect(decode(segments, kind)?)
    }

    /// Opens a host resource and returns its handle.
    #[inline]
    fn open(&self) -> Result<c_int> {
        self.execute(call::Open)
    }

    #[inline]
    fn close(&self, fd: c_int) -> Result<()> {
        self.execute(call::Close { fd })
    }

    #[inline]
    fn create_session(&self, fd: c_int, cipher: Cipher, key: &[u8]) -> Result<u32> {
        self.execute(call::CreateSession { fd, cipher, key })
    }

    /// Ends session `ses` and returns the host status.
    #[inline]
    fn end_session(&self, fd: c_int, ses: u32) -> Result<c_int> {
        self.execute(call::EndSession { fd, ses })
    }

    #[inline]
    fn crypt(&self, fd: c_int, ses: u32, op: Operation, src: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
        self.execute(call::Crypt {
            fd,
            ses,
            op,
            src,
            iv,
        })
    }
}
