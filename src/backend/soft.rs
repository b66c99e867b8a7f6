// SPDX-License-Identifier: Apache-2.0

use super::{Datum, Relay};

use anyhow::Result;
use cryptoport::channel::Options;
use cryptoport::cipher::Cipher;
use cryptoport::host::soft::Soft;

pub struct Backend;

impl super::Backend for Backend {
    #[inline]
    fn name(&self) -> &'static str {
        "soft"
    }

    fn data(&self) -> Vec<Datum> {
        let lens: Vec<_> = Cipher::AesCbc
            .key_lens()
            .iter()
            .map(|len| (len * 8).to_string())
            .collect();

        vec![Datum {
            name: "AES-CBC".into(),
            pass: true,
            info: Some(format!("in-process, {}-bit keys", lens.join("/"))),
            mesg: None,
        }]
    }

    fn relay(&self, devices: u32, options: Options) -> Result<Relay> {
        Relay::spawn(Soft::default(), devices, options)
    }
}
