// SPDX-License-Identifier: Apache-2.0

use super::{Datum, Relay};

use std::fs::OpenOptions;

use anyhow::Result;
use cryptoport::channel::Options;
use cryptoport::host::cryptodev::{Cryptodev, DEVICE};

pub struct Backend;

fn dev_crypto() -> Datum {
    let pass = std::path::Path::new(DEVICE).exists();
    Datum {
        name: "Driver".into(),
        pass,
        info: Some(DEVICE.into()),
        mesg: if pass {
            None
        } else {
            Some("Load the cryptodev-linux kernel module: `modprobe cryptodev`".into())
        },
    }
}

fn dev_crypto_access() -> Datum {
    let result = OpenOptions::new().read(true).write(true).open(DEVICE);
    Datum {
        name: " Read/write access".into(),
        pass: result.is_ok(),
        info: result.as_ref().err().map(|e| e.to_string()),
        mesg: None,
    }
}

impl super::Backend for Backend {
    #[inline]
    fn name(&self) -> &'static str {
        "cryptodev"
    }

    fn data(&self) -> Vec<Datum> {
        vec![dev_crypto(), dev_crypto_access()]
    }

    fn relay(&self, devices: u32, options: Options) -> Result<Relay> {
        Relay::spawn(Cryptodev::default(), devices, options)
    }
}
