// SPDX-License-Identifier: Apache-2.0

//! Calls executable by [`Handler::execute`](super::Handler::execute).

mod close;
mod create_session;
mod crypt;
mod end_session;
mod open;


pub use close::Close;
pub use create_session::CreateSession;
pub use crypt::Crypt;
pub use end_session::EndSession;
pub use open::Open;

use crate::codec::{Request, Response};
use crate::Result;

/// An [executable](super::Handler::execute) call.
pub trait Call {
    /// Value the call collects as.
    type Collected;

    /// Validates the arguments and returns the request to encode.
    ///
    /// Nothing is sent if this fails.
    fn stage(&self) -> Result<Request<'_>>;

    /// Interprets the host's response.
    fn collect(self, response: Response) -> Result<Self::Collected>;
}
