// SPDX-License-Identifier: Apache-2.0

use super::Call;
use crate::cipher::{validate_transform, Operation};
use crate::codec::{Ioctl, Request, Response};
use crate::{Error, Result};

use core::ffi::c_int;

/// Runs a transform within a session, collecting the destination bytes.
pub struct Crypt<'a> {
    pub fd: c_int,
    pub ses: u32,
    pub op: Operation,
    pub src: &'a [u8],
    pub iv: &'a [u8],
}

impl<'a> Call for Crypt<'a> {
    type Collected = Vec<u8>;

    fn stage(&self) -> Result<Request<'_>> {
        validate_transform(self.src, self.iv)?;
        Ok(Request::Ioctl {
            fd: self.fd,
            ioctl: Ioctl::Crypt {
                ses: self.ses,
                op: self.op,
                src: self.src,
                iv: self.iv,
            },
        })
    }

    fn collect(self, response: Response) -> Result<Vec<u8>> {
        match response {
            Response::Crypt { dst, status: 0 } if dst.len() == self.src.len() => Ok(dst),
            Response::Crypt { status: 0, .. } => Err(Error::Fault),
            Response::Crypt { status, .. } => Err(Error::TransformFailed(status)),
            _ => Err(Error::Fault),
        }
    }
}
