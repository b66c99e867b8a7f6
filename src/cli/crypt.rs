// SPDX-License-Identifier: Apache-2.0

use super::BackendOptions;

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{ensure, Context, Result};
use clap::Args;
use cryptoport::cipher::{Cipher, Operation, BLOCK_SIZE};
use cryptoport::codec::MAX_PAYLOAD;
use cryptoport::guest::Session;
use log::debug;

/// Hex encoded bytes given on the command line.
#[derive(Clone, Debug)]
pub struct Hex(Vec<u8>);

impl FromStr for Hex {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s).map(Self)
    }
}

/// Transform a file with AES-CBC through a guest device
///
/// The input length must be a multiple of the 16-byte block size; no padding is applied.
#[derive(Args, Debug)]
pub struct Options {
    #[clap(flatten)]
    pub backend: BackendOptions,

    /// Key, hex encoded (16, 24 or 32 bytes)
    #[clap(long)]
    key: Hex,

    /// Initialization vector, hex encoded (16 bytes)
    #[clap(long)]
    iv: Hex,

    /// Guest device to use
    #[clap(long, default_value_t = 0)]
    minor: u32,

    /// Output file; standard output when omitted
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Input file; standard input when omitted or `-`
    input: Option<PathBuf>,
}

impl Options {
    pub fn execute(self, op: Operation) -> Result<()> {
        let input = match self.input {
            Some(ref path) if path.as_os_str() != "-" => {
                fs::read(path).with_context(|| format!("failed to read {:?}", path))?
            }
            _ => {
                let mut buf = Vec::new();
                io::stdin()
                    .read_to_end(&mut buf)
                    .context("failed to read standard input")?;
                buf
            }
        };

        let relay = self.backend.relay()?;
        let session = relay.session(self.minor)?;
        let output = transform(&session, op, &self.key.0, &self.iv.0, &input)?;
        drop(session);

        match self.output {
            Some(ref path) => {
                fs::write(path, &output).with_context(|| format!("failed to write {:?}", path))?
            }
            None => io::stdout().write_all(&output)?,
        }
        Ok(())
    }
}

/// Runs `op` over `input` in chunks the relay accepts, chaining the IV between chunks.
fn transform(
    session: &Session,
    op: Operation,
    key: &[u8],
    iv: &[u8],
    input: &[u8],
) -> Result<Vec<u8>> {
    ensure!(
        input.len() % BLOCK_SIZE == 0,
        "input length {} is not a multiple of {BLOCK_SIZE}",
        input.len()
    );

    let ses = session
        .create_session(Cipher::AesCbc, key)
        .context("failed to create cipher session")?;

    let mut iv = iv.to_vec();
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks(MAX_PAYLOAD) {
        debug!("{:?} {} bytes in session {ses}", op, chunk.len());
        let dst = session.crypt(ses, op, chunk, &iv)?;

        let last = match op {
            Operation::Encrypt => &dst[dst.len() - BLOCK_SIZE..],
            Operation::Decrypt => &chunk[chunk.len() - BLOCK_SIZE..],
        };
        iv = last.to_vec();
        output.extend_from_slice(&dst);
    }

    session.end_session(ses)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BACKENDS;

    #[test]
    fn parse_hex() {
        assert_eq!(Hex::from_str("00ff10").unwrap().0, [0x00, 0xff, 0x10]);
        assert!(Hex::from_str("0g").is_err());
        assert!(Hex::from_str("abc").is_err());
    }

    #[test]
    fn chunked() {
        let soft = BACKENDS.iter().find(|b| b.name() == "soft").unwrap();
        let relay = soft.relay(1, Default::default()).unwrap();
        let session = relay.session(0).unwrap();

        let key = b"0123456789abcdef";
        let input: Vec<u8> = (0..MAX_PAYLOAD * 2 + BLOCK_SIZE).map(|i| i as u8).collect();

        // Chaining across chunks matches encrypting each chunk with the previous tail as IV.
        let ciphertext = transform(&session, Operation::Encrypt, key, key, &input).unwrap();
        let first = transform(
            &session,
            Operation::Encrypt,
            key,
            key,
            &input[..MAX_PAYLOAD],
        )
        .unwrap();
        let tail = &first[MAX_PAYLOAD - BLOCK_SIZE..];
        let second = transform(
            &session,
            Operation::Encrypt,
            key,
            tail,
            &input[MAX_PAYLOAD..MAX_PAYLOAD * 2],
        )
        .unwrap();
        assert_eq!(ciphertext[..MAX_PAYLOAD], first[..]);
        assert_eq!(ciphertext[MAX_PAYLOAD..MAX_PAYLOAD * 2], second[..]);

        let decrypted = transform(&session, Operation::Decrypt, key, key, &ciphertext).unwrap();
        assert_eq!(decrypted, input);

        assert!(transform(&session, Operation::Encrypt, key, key, &input[..20]).is_err());
    }
}
