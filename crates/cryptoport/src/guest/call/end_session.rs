// SPDX-License-Identifier: Apache-2.0

use super::Call;
use crate::codec::{Ioctl, Request, Response};
use crate::{Error, Result};

use core::ffi::c_int;

/// Ends a cipher session, collecting the raw host status.
pub struct EndSession {
    pub fd: c_int,
    pub ses: u32,
}

impl Call for EndSession {
    type Collected = c_int;

    #[inline]
    fn stage(&self) -> Result<Request<'_>> {
        Ok(Request::Ioctl {
            fd: self.fd,
            ioctl: Ioctl::EndSession { ses: self.ses },
        })
    }

    #[inline]
    fn collect(self, response: Response) -> Result<c_int> {
        match response {
            Response::EndSession { status } => Ok(status),
            _ => Err(Error::Fault),
        }
    }
}
