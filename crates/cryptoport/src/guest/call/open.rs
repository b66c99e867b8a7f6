// SPDX-License-Identifier: Apache-2.0

use super::Call;
use crate::codec::{Request, Response};
use crate::{Error, Result};

use core::ffi::c_int;

/// Opens a host resource, collecting its handle.
pub struct Open;

impl Call for Open {
    type Collected = c_int;

    #[inline]
    fn stage(&self) -> Result<Request<'_>> {
        Ok(Request::Open)
    }

    fn collect(self, response: Response) -> Result<c_int> {
        match response {
            Response::Open { fd } if fd >= 0 => Ok(fd),
            Response::Open { .. } => Err(Error::HostOpenFailed),
            _ => Err(Error::Fault),
        }
    }
}
