// SPDX-License-Identifier: Apache-2.0

use super::BackendOptions;
use crate::backend::Relay;

use anyhow::{ensure, Context, Result};
use clap::Args;
use cryptoport::cipher::{Cipher, BLOCK_SIZE};
use cryptoport::guest::Session;
use log::info;

const KEY: &[u8; 16] = b"0123456789abcdef";

/// Run an encrypt/decrypt round trip through every guest device
#[derive(Args, Debug)]
pub struct Options {
    #[clap(flatten)]
    pub backend: BackendOptions,
}

impl Options {
    pub fn execute(self) -> Result<()> {
        let relay = self.backend.relay()?;
        for minor in relay.registry().minors() {
            check(&relay, minor).with_context(|| format!("self test failed on minor {minor}"))?;
            println!("minor {minor}: ok");
        }
        Ok(())
    }
}

/// Encrypts a zero block with every key size and decrypts it again.
fn check(relay: &Relay, minor: u32) -> Result<()> {
    let session = relay.session(minor)?;
    info!("minor {minor}: host handle {}", session.host_fd());

    for &len in Cipher::AesCbc.key_lens() {
        let key: Vec<u8> = KEY.iter().cycle().take(len).copied().collect();
        round_trip(&session, &key)?;
    }
    Ok(())
}

fn round_trip(session: &Session, key: &[u8]) -> Result<()> {
    let ses = session.create_session(Cipher::AesCbc, key)?;
    let iv = &KEY[..BLOCK_SIZE];

    let plaintext = [0u8; BLOCK_SIZE];
    let ciphertext = session.encrypt(ses, &plaintext, iv)?;
    info!("AES-{}-CBC: {}", key.len() * 8, hex::encode(&ciphertext));
    ensure!(ciphertext != plaintext, "ciphertext equals plaintext");

    let decrypted = session.decrypt(ses, &ciphertext, iv)?;
    ensure!(
        decrypted == plaintext,
        "decryption does not restore plaintext"
    );

    let status = session.end_session(ses)?;
    ensure!(
        status == 0,
        "ending session {ses} failed with status {status}"
    );
    Ok(())
}
