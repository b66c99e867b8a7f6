// SPDX-License-Identifier: Apache-2.0

use super::Call;
use crate::codec::{Request, Response};
use crate::{Error, Result};

use core::ffi::c_int;

pub struct Close {
    pub fd: c_int,
}

impl Call for Close {
    type Collected = ();

    #[inline]
    fn stage(&self) -> Result<Request<'_>> {
        Ok(Request::Close { fd: self.fd })
    }

    #[inline]
    fn collect(self, response: Response) -> Result<()> {
        match response {
            Response::Close => Ok(()),
            _ => Err(Error::Fault),
        }
    }
}
