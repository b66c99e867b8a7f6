// SPDX-License-Identifier: Apache-2.0

use super::Call;
use crate::cipher::Cipher;
use crate::codec::{Ioctl, Request, Response};
use crate::{Error, Result};

use core::ffi::c_int;

/// Creates a cipher session on an open host resource, collecting the session id.
pub struct CreateSession<'a> {
    pub fd: c_int,
    pub cipher: Cipher,
    pub key: &'a [u8],
}

impl<'a> Call for CreateSession<'a> {
    type Collected = u32;

    fn stage(&self) -> Result<Request<'_>> {
        self.cipher.validate_key(self.key)?;
        Ok(Request::Ioctl {
            fd: self.fd,
            ioctl: Ioctl::CreateSession {
                cipher: self.cipher as _,
                key: self.key,
            },
        })
    }

    fn collect(self, response: Response) -> Result<u32> {
        match response {
            Response::CreateSession { ses, status: 0 } => Ok(ses),
            Response::CreateSession { status, .. } => Err(Error::Remote(status)),
            _ => Err(Error::Fault),
        }
    }
}
