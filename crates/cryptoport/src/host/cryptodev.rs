// SPDX-License-Identifier: Apache-2.0

//! Backend driving a cryptodev-linux `/dev/crypto` node.
//!
//! The segment buffers are linked into the kernel's `session_op` and `crypt_op` structures
//! right before each ioctl; nothing the guest sent is dereferenced as a pointer.

use super::{CryptOp, Device, Resource, SessionOp};

use core::ffi::c_int;
use core::ptr::{null, null_mut};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use iocuddle::{Group, Ioctl, Write, WriteRead};
use libc::{EINVAL, EIO};
use log::trace;

/// Default device node.
pub const DEVICE: &str = "/dev/crypto";

const CRYPTODEV: Group = Group::new(b'c');

/// `CIOCGSESSION`
const CREATE_SESSION: Ioctl<WriteRead, &RawSessionOp> = unsafe { CRYPTODEV.write_read(102) };

/// `CIOCFSESSION`
const END_SESSION: Ioctl<Write, &u32> = unsafe { CRYPTODEV.write(103) };

/// `CIOCCRYPT`
const CRYPT: Ioctl<WriteRead, &RawCryptOp> = unsafe { CRYPTODEV.write_read(104) };

/// `struct session_op`
#[repr(C)]
#[derive(Debug)]
struct RawSessionOp {
    cipher: u32,
    mac: u32,
    keylen: u32,
    key: *const u8,
    mackeylen: u32,
    mackey: *const u8,
    ses: u32,
}

/// `struct crypt_op`
#[repr(C)]
#[derive(Debug)]
struct RawCryptOp {
    ses: u32,
    op: u16,
    flags: u16,
    len: u32,
    src: *const u8,
    dst: *mut u8,
    mac: *mut u8,
    iv: *const u8,
}

fn errno(err: io::Error) -> c_int {
    err.raw_os_error().unwrap_or(EIO)
}

/// A cryptodev device node.
#[derive(Clone, Debug)]
pub struct Cryptodev {
    path: PathBuf,
}

impl Default for Cryptodev {
    fn default() -> Self {
        Self::new(DEVICE)
    }
}

impl Cryptodev {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Device for Cryptodev {
    type Resource = Node;

    fn name(&self) -> &'static str {
        "cryptodev"
    }

    fn open(&self) -> io::Result<Node> {
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        trace!("opened {} as {}", self.path.display(), file.as_raw_fd());
        Ok(Node(file))
    }
}

/// An open file description of the device node.
#[derive(Debug)]
pub struct Node(File);

impl Resource for Node {
    fn handle(&self) -> c_int {
        self.0.as_raw_fd()
    }

    fn create_session(&self, op: &mut SessionOp<'_>) -> Result<(), c_int> {
        let mut raw = RawSessionOp {
            cipher: op.cipher,
            mac: 0,
            keylen: op.key.len().try_into().map_err(|_| EINVAL)?,
            key: op.key.as_ptr(),
            mackeylen: 0,
            mackey: null(),
            ses: 0,
        };
        CREATE_SESSION
            .ioctl(&mut self.0.as_raw_fd(), &mut raw)
            .map_err(errno)?;
        op.ses = raw.ses;
        Ok(())
    }

    fn end_session(&self, ses: u32) -> Result<(), c_int> {
        END_SESSION
            .ioctl(&mut self.0.as_raw_fd(), &ses)
            .map_err(errno)?;
        Ok(())
    }

    fn crypt(&self, op: &mut CryptOp<'_>) -> Result<(), c_int> {
        if op.dst.len() != op.src.len() {
            return Err(EINVAL);
        }
        let mut raw = RawCryptOp {
            ses: op.ses,
            op: op.op as _,
            flags: 0,
            len: op.src.len().try_into().map_err(|_| EINVAL)?,
            src: op.src.as_ptr(),
            dst: op.dst.as_mut_ptr(),
            mac: null_mut(),
            iv: op.iv.as_ptr(),
        };
        CRYPT
            .ioctl(&mut self.0.as_raw_fd(), &mut raw)
            .map_err(errno)?;
        Ok(())
    }
}
