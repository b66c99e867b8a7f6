// SPDX-License-Identifier: Apache-2.0

//! Segment layout of every request kind.
//!
//! This table is the single definition of the segment order. The encoder, the host-side
//! request parser and the guest-side response decoder all look fields up here by name, so the
//! two sides cannot drift apart.

use crate::segment::{Segment, SCALAR_SIZE};
use crate::{Error, Result};

/// Top-level request opcode, always carried by the first readable segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Syscall {
    Open = 0,
    Close = 1,
    Ioctl = 2,
}

impl TryFrom<u32> for Syscall {
    type Error = Error;

    #[inline]
    fn try_from(num: u32) -> Result<Self> {
        match num {
            num if num == Syscall::Open as _ => Ok(Syscall::Open),
            num if num == Syscall::Close as _ => Ok(Syscall::Close),
            num if num == Syscall::Ioctl as _ => Ok(Syscall::Ioctl),
            _ => Err(Error::Malformed("unknown syscall type")),
        }
    }
}

/// Ioctl sub-opcode, carried by the third readable segment of an [`Syscall::Ioctl`].
///
/// Values are the cryptodev ioctl numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    /// `CIOCGSESSION`
    CreateSession = 102,

    /// `CIOCFSESSION`
    EndSession = 103,

    /// `CIOCCRYPT`
    Crypt = 104,
}

impl TryFrom<u32> for Command {
    type Error = Error;

    #[inline]
    fn try_from(cmd: u32) -> Result<Self> {
        match cmd {
            cmd if cmd == Command::CreateSession as _ => Ok(Command::CreateSession),
            cmd if cmd == Command::EndSession as _ => Ok(Command::EndSession),
            cmd if cmd == Command::Crypt as _ => Ok(Command::Crypt),
            _ => Err(Error::Malformed("unknown ioctl command")),
        }
    }
}

/// A request kind: an opcode, plus the sub-opcode for ioctls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Open,
    Close,
    CreateSession,
    EndSession,
    Crypt,
}

impl Kind {
    #[inline]
    pub const fn syscall(self) -> Syscall {
        match self {
            Self::Open => Syscall::Open,
            Self::Close => Syscall::Close,
            Self::CreateSession | Self::EndSession | Self::Crypt => Syscall::Ioctl,
        }
    }

    #[inline]
    pub const fn command(self) -> Option<Command> {
        match self {
            Self::Open | Self::Close => None,
            Self::CreateSession => Some(Command::CreateSession),
            Self::EndSession => Some(Command::EndSession),
            Self::Crypt => Some(Command::Crypt),
        }
    }

    /// Determines the kind of a list from its leading readable segments.
    pub fn identify(readable: &[Segment]) -> Result<Self> {
        let syscall = readable
            .first()
            .and_then(Segment::get)
            .ok_or(Error::Malformed("missing syscall type"))?;
        match Syscall::try_from(syscall)? {
            Syscall::Open => Ok(Self::Open),
            Syscall::Close => Ok(Self::Close),
            Syscall::Ioctl => {
                let cmd = readable
                    .get(2)
                    .and_then(Segment::get)
                    .ok_or(Error::Malformed("missing ioctl command"))?;
                match Command::try_from(cmd)? {
                    Command::CreateSession => Ok(Self::CreateSession),
                    Command::EndSession => Ok(Self::EndSession),
                    Command::Crypt => Ok(Self::Crypt),
                }
            }
        }
    }

    /// The segment layout of this kind.
    #[inline]
    pub fn schema(self) -> &'static Schema {
        match self {
            Self::Open => &OPEN,
            Self::Close => &CLOSE,
            Self::CreateSession => &CREATE_SESSION,
            Self::EndSession => &END_SESSION,
            Self::Crypt => &CRYPT,
        }
    }
}

/// A named field of a request or response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Syscall,
    HostFd,
    Command,
    Cipher,
    Key,
    Session,
    Op,
    Len,
    Src,
    Iv,
    Dst,
    Status,
}

impl Field {
    /// Returns the fixed width of scalar fields, `None` for variable-length buffers.
    #[inline]
    pub const fn width(self) -> Option<usize> {
        match self {
            Self::Key | Self::Src | Self::Iv | Self::Dst => None,
            _ => Some(SCALAR_SIZE),
        }
    }
}

/// Ordered readable and writable fields of one request kind.
#[derive(Debug, PartialEq, Eq)]
pub struct Schema {
    pub readable: &'static [Field],
    pub writable: &'static [Field],
}

pub const OPEN: Schema = Schema {
    readable: &[Field::Syscall],
    writable: &[Field::HostFd],
};

pub const CLOSE: Schema = Schema {
    readable: &[Field::Syscall, Field::HostFd],
    writable: &[],
};

pub const CREATE_SESSION: Schema = Schema {
    readable: &[
        Field::Syscall,
        Field::HostFd,
        Field::Command,
        Field::Cipher,
        Field::Key,
    ],
    writable: &[Field::Session, Field::Status],
};

pub const END_SESSION: Schema = Schema {
    readable: &[
        Field::Syscall,
        Field::HostFd,
        Field::Command,
        Field::Session,
    ],
    writable: &[Field::Status],
};

pub const CRYPT: Schema = Schema {
    readable: &[
        Field::Syscall,
        Field::HostFd,
        Field::Command,
        Field::Session,
        Field::Op,
        Field::Len,
        Field::Src,
        Field::Iv,
    ],
    writable: &[Field::Dst, Field::Status],
};

impl Schema {
    /// Total number of segments.
    #[inline]
    pub const fn len(&self) -> usize {
        self.readable.len() + self.writable.len()
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of `field` among the readable segments.
    #[inline]
    pub fn readable_index(&self, field: Field) -> Option<usize> {
        self.readable.iter().position(|f| *f == field)
    }

    /// Position of `field` among the writable segments.
    #[inline]
    pub fn writable_index(&self, field: Field) -> Option<usize> {
        self.writable.iter().position(|f| *f == field)
    }

    /// Checks segment counts and scalar widths of one half of a list against `fields`.
    pub fn check(fields: &[Field], segments: &[Segment]) -> Result<()> {
        if fields.len() != segments.len() {
            return Err(Error::Malformed("unexpected segment count"));
        }
        for (field, segment) in fields.iter().zip(segments) {
            if matches!(field.width(), Some(width) if width != segment.len()) {
                return Err(Error::Malformed("unexpected scalar width"));
            }
        }
        Ok(())
    }
}

/// Looks up the readable segment carrying `field`.
#[inline]
pub fn readable<'a>(schema: &Schema, segments: &'a [Segment], field: Field) -> Result<&'a Segment> {
    schema
        .readable_index(field)
        .and_then(|i| segments.get(i))
        .ok_or(Error::Malformed("missing readable field"))
}

/// Looks up the writable segment carrying `field`.
#[inline]
pub fn writable<'a>(
    schema: &Schema,
    segments: &'a mut [Segment],
    field: Field,
) -> Result<&'a mut Segment> {
    schema
        .writable_index(field)
        .and_then(move |i| segments.get_mut(i))
        .ok_or(Error::Malformed("missing writable field"))
}
