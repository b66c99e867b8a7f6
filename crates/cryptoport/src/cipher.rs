// SPDX-License-Identifier: Apache-2.0

//! Cipher and operation definitions shared by guest and host.
//!
//! Numeric values follow the cryptodev-linux ABI, so they can be handed to a real
//! `/dev/crypto` without translation.

use crate::{Error, Result};

/// Block size of every supported cipher, in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Largest key cryptodev accepts.
pub const MAX_KEY_LEN: usize = 64;

/// Supported ciphers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Cipher {
    /// AES in CBC mode (`CRYPTO_AES_CBC`); the key length selects AES-128/192/256.
    AesCbc = 11,
}

impl Cipher {
    /// Key lengths accepted by the cipher.
    #[inline]
    pub const fn key_lens(self) -> &'static [usize] {
        match self {
            Self::AesCbc => &[16, 24, 32],
        }
    }

    /// Block size of the cipher.
    #[inline]
    pub const fn block_size(self) -> usize {
        match self {
            Self::AesCbc => BLOCK_SIZE,
        }
    }

    /// Checks that `key` has a length the cipher accepts.
    pub fn validate_key(self, key: &[u8]) -> Result<()> {
        if self.key_lens().contains(&key.len()) {
            Ok(())
        } else {
            Err(Error::InvalidKeyLength {
                cipher: self as _,
                len: key.len(),
            })
        }
    }
}

impl TryFrom<u32> for Cipher {
    type Error = Error;

    #[inline]
    fn try_from(id: u32) -> Result<Self> {
        match id {
            id if id == Cipher::AesCbc as _ => Ok(Cipher::AesCbc),
            _ => Err(Error::UnsupportedCipher(id)),
        }
    }
}

/// Direction of a transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Operation {
    /// `COP_ENCRYPT`
    Encrypt = 0,

    /// `COP_DECRYPT`
    Decrypt = 1,
}

impl TryFrom<u32> for Operation {
    type Error = Error;

    #[inline]
    fn try_from(op: u32) -> Result<Self> {
        match op {
            op if op == Operation::Encrypt as _ => Ok(Operation::Encrypt),
            op if op == Operation::Decrypt as _ => Ok(Operation::Decrypt),
            _ => Err(Error::Malformed("unknown transform operation")),
        }
    }
}

/// Checks the source and IV lengths of a transform against the block size.
pub fn validate_transform(src: &[u8], iv: &[u8]) -> Result<()> {
    if src.is_empty() || src.len() % BLOCK_SIZE != 0 {
        return Err(Error::InvalidLength {
            what: "source",
            len: src.len(),
        });
    }
    if iv.len() != BLOCK_SIZE {
        return Err(Error::InvalidLength {
            what: "iv",
            len: iv.len(),
        });
    }
    Ok(())
}
