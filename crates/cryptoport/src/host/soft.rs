// SPDX-License-Identifier: Apache-2.0

//! In-process AES-CBC backend.

use super::{CryptOp, Device, Resource, SessionOp};
use crate::cipher::{validate_transform, Cipher, Operation};

use core::ffi::c_int;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use libc::EINVAL;
use log::trace;

/// First handle given out; lower values look like stdio.
const FIRST_HANDLE: c_int = 3;

macro_rules! transform {
    ($aes:ty, $op:expr, $key:expr, $iv:expr, $src:expr, $dst:expr) => {
        match $op {
            Operation::Encrypt => cbc::Encryptor::<$aes>::new_from_slices($key, $iv)
                .map_err(|_| EINVAL)?
                .encrypt_padded_b2b_mut::<NoPadding>($src, $dst)
                .map(|_| ())
                .map_err(|_| EINVAL),
            Operation::Decrypt => cbc::Decryptor::<$aes>::new_from_slices($key, $iv)
                .map_err(|_| EINVAL)?
                .decrypt_padded_b2b_mut::<NoPadding>($src, $dst)
                .map(|_| ())
                .map_err(|_| EINVAL),
        }
    };
}

/// Software device; every open yields a fresh handle.
#[derive(Debug)]
pub struct Soft {
    next: AtomicI32,
}

impl Default for Soft {
    fn default() -> Self {
        Self {
            next: AtomicI32::new(FIRST_HANDLE),
        }
    }
}

impl Device for Soft {
    type Resource = Handle;

    fn name(&self) -> &'static str {
        "soft"
    }

    fn open(&self) -> io::Result<Handle> {
        let fd = self.next.fetch_add(1, Ordering::Relaxed);
        if fd < FIRST_HANDLE {
            return Err(io::Error::from_raw_os_error(libc::EMFILE));
        }
        Ok(Handle {
            fd,
            sessions: Mutex::new(HashMap::new()),
            next: AtomicU32::new(1),
        })
    }
}

/// An opened software device holding its own sessions.
#[derive(Debug)]
pub struct Handle {
    fd: c_int,
    sessions: Mutex<HashMap<u32, Vec<u8>>>,
    next: AtomicU32,
}

impl Handle {
    fn key(&self, ses: u32) -> Result<Vec<u8>, c_int> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.get(&ses).cloned().ok_or(EINVAL)
    }
}

impl Resource for Handle {
    fn handle(&self) -> c_int {
        self.fd
    }

    fn create_session(&self, op: &mut SessionOp<'_>) -> Result<(), c_int> {
        let cipher = Cipher::try_from(op.cipher).map_err(|e| e.errno())?;
        cipher.validate_key(op.key).map_err(|e| e.errno())?;

        let ses = self.next.fetch_add(1, Ordering::Relaxed);
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(ses, op.key.to_vec());
        trace!("handle {} created session {ses}", self.fd);

        op.ses = ses;
        Ok(())
    }

    fn end_session(&self, ses: u32) -> Result<(), c_int> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(&ses).map(|_| ()).ok_or(EINVAL)
    }

    fn crypt(&self, op: &mut CryptOp<'_>) -> Result<(), c_int> {
        let key = self.key(op.ses)?;
        validate_transform(op.src, op.iv).map_err(|e| e.errno())?;
        if op.dst.len() != op.src.len() {
            return Err(EINVAL);
        }

        match key.len() {
            16 => transform!(aes::Aes128, op.op, &key, op.iv, op.src, op.dst),
            24 => transform!(aes::Aes192, op.op, &key, op.iv, op.src, op.dst),
            32 => transform!(aes::Aes256, op.op, &key, op.iv, op.src, op.dst),
            _ => Err(EINVAL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libc::ENOTSUP;

    fn session(handle: &Handle, key: &[u8]) -> u32 {
        let mut op = SessionOp {
            cipher: Cipher::AesCbc as _,
            key,
            ses: 0,
        };
        handle.create_session(&mut op).unwrap();
        op.ses
    }

    fn crypt(handle: &Handle, ses: u32, op: Operation, src: &[u8], iv: &[u8]) -> Vec<u8> {
        let mut dst = vec![0; src.len()];
        handle
            .crypt(&mut CryptOp {
                ses,
                op,
                src,
                iv,
                dst: &mut dst,
            })
            .unwrap();
        dst
    }

    #[test]
    fn handles() {
        let soft = Soft::default();
        let a = soft.open().unwrap();
        let b = soft.open().unwrap();
        assert_eq!(a.handle(), FIRST_HANDLE);
        assert_eq!(b.handle(), FIRST_HANDLE + 1);
    }

    // FIPS-197 / SP 800-38A F.2.1 CBC-AES128.Encrypt, first block.
    #[test]
    fn known_answer() {
        let key = hex(b"2b7e151628aed2a6abf7158809cf4f3c");
        let iv = hex(b"000102030405060708090a0b0c0d0e0f");
        let plaintext = hex(b"6bc1bee22e409f96e93d7e117393172a");
        let ciphertext = hex(b"7649abac8119b246cee98e9b12e9197d");

        let handle = Soft::default().open().unwrap();
        let ses = session(&handle, &key);
        assert_eq!(
            crypt(&handle, ses, Operation::Encrypt, &plaintext, &iv),
            ciphertext
        );
        assert_eq!(
            crypt(&handle, ses, Operation::Decrypt, &ciphertext, &iv),
            plaintext
        );
    }

    #[test]
    fn key_sizes() {
        let handle = Soft::default().open().unwrap();
        let iv = [7; 16];
        let src = [0x5a; 48];
        for len in [16, 24, 32] {
            let ses = session(&handle, &vec![len as u8; len]);
            let dst = crypt(&handle, ses, Operation::Encrypt, &src, &iv);
            assert_ne!(dst, src);
            assert_eq!(crypt(&handle, ses, Operation::Decrypt, &dst, &iv), src);
        }
    }

    #[test]
    fn sessions() {
        let handle = Soft::default().open().unwrap();

        let mut op = SessionOp {
            cipher: 99,
            key: &[0; 16],
            ses: 0,
        };
        assert_eq!(handle.create_session(&mut op), Err(ENOTSUP));

        op.cipher = Cipher::AesCbc as _;
        op.key = &[0; 15];
        assert_eq!(handle.create_session(&mut op), Err(EINVAL));

        let ses = session(&handle, &[0; 16]);
        assert_eq!(handle.end_session(ses), Ok(()));
        assert_eq!(handle.end_session(ses), Err(EINVAL));

        let mut dst = [0; 16];
        assert_eq!(
            handle.crypt(&mut CryptOp {
                ses,
                op: Operation::Encrypt,
                src: &[0; 16],
                iv: &[0; 16],
                dst: &mut dst,
            }),
            Err(EINVAL)
        );
    }

    fn hex(digits: &[u8]) -> Vec<u8> {
        digits
            .chunks(2)
            .map(|pair| {
                let s = core::str::from_utf8(pair).unwrap();
                u8::from_str_radix(s, 16).unwrap()
            })
            .collect()
    }
}
