// SPDX-License-Identifier: Apache-2.0

//! Conversion between requests, responses and [`SegmentList`]s.
//!
//! Encoding copies every caller buffer into segment-owned storage and emits one segment per
//! scalar or buffer, in [`schema`](crate::schema) order. Nothing here performs I/O.

use crate::cipher::{Operation, MAX_KEY_LEN};
use crate::schema::{self, Field, Kind, Schema};
use crate::segment::{Segment, SegmentList};
use crate::{Error, Result};

use core::ffi::c_int;

/// Largest source buffer a single transform may carry.
pub const MAX_PAYLOAD: usize = 64 * 1024;

/// Ioctl payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ioctl<'a> {
    CreateSession {
        cipher: u32,
        key: &'a [u8],
    },
    EndSession {
        ses: u32,
    },
    Crypt {
        ses: u32,
        op: Operation,
        src: &'a [u8],
        iv: &'a [u8],
    },
}

/// A logical request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request<'a> {
    Open,
    Close { fd: c_int },
    Ioctl { fd: c_int, ioctl: Ioctl<'a> },
}

impl<'a> Request<'a> {
    #[inline]
    pub fn kind(&self) -> Kind {
        match self {
            Self::Open => Kind::Open,
            Self::Close { .. } => Kind::Close,
            Self::Ioctl { ioctl, .. } => match ioctl {
                Ioctl::CreateSession { .. } => Kind::CreateSession,
                Ioctl::EndSession { .. } => Kind::EndSession,
                Ioctl::Crypt { .. } => Kind::Crypt,
            },
        }
    }

    /// Rejects payloads the relay refuses to carry.
    pub fn check_bounds(&self) -> Result<()> {
        match self {
            Self::Ioctl {
                ioctl: Ioctl::CreateSession { key, .. },
                ..
            } if key.len() > MAX_KEY_LEN => Err(Error::PayloadTooLarge {
                len: key.len(),
                max: MAX_KEY_LEN,
            }),
            Self::Ioctl {
                ioctl: Ioctl::Crypt { src, .. },
                ..
            } if src.len() > MAX_PAYLOAD => Err(Error::PayloadTooLarge {
                len: src.len(),
                max: MAX_PAYLOAD,
            }),
            _ => Ok(()),
        }
    }

    /// Builds the readable segment carrying `field`.
    fn readable(&self, field: Field) -> Option<Segment> {
        let kind = self.kind();
        match (*self, field) {
            (_, Field::Syscall) => Some(Segment::scalar(kind.syscall() as _)),
            (Self::Close { fd } | Self::Ioctl { fd, .. }, Field::HostFd) => {
                Some(Segment::scalar(fd as _))
            }
            (Self::Ioctl { .. }, Field::Command) => kind.command().map(|c| Segment::scalar(c as _)),
            (Self::Ioctl { ioctl, .. }, field) => match (ioctl, field) {
                (Ioctl::CreateSession { cipher, .. }, Field::Cipher) => {
                    Some(Segment::scalar(cipher))
                }
                (Ioctl::CreateSession { key, .. }, Field::Key) => Some(Segment::readable(key)),
                (Ioctl::EndSession { ses } | Ioctl::Crypt { ses, .. }, Field::Session) => {
                    Some(Segment::scalar(ses))
                }
                (Ioctl::Crypt { op, .. }, Field::Op) => Some(Segment::scalar(op as _)),
                (Ioctl::Crypt { src, .. }, Field::Len) => Some(Segment::scalar(src.len() as _)),
                (Ioctl::Crypt { src, .. }, Field::Src) => Some(Segment::readable(src)),
                (Ioctl::Crypt { iv, .. }, Field::Iv) => Some(Segment::readable(iv)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Length of the writable segment carrying `field`.
    fn writable_len(&self, field: Field) -> Option<usize> {
        match (field.width(), self) {
            (Some(width), _) => Some(width),
            (
                None,
                Self::Ioctl {
                    ioctl: Ioctl::Crypt { src, .. },
                    ..
                },
            ) if field == Field::Dst => Some(src.len()),
            _ => None,
        }
    }

    /// Host-side view of a request, borrowing the buffers of the readable segments.
    pub fn parse(readable: &'a [Segment]) -> Result<Self> {
        let kind = Kind::identify(readable)?;
        let schema = kind.schema();
        Schema::check(schema.readable, readable)?;

        let scalar = |field| {
            schema::readable(schema, readable, field)?
                .get()
                .ok_or(Error::Malformed("unexpected scalar width"))
        };
        let bytes = |field| schema::readable(schema, readable, field).map(Segment::as_slice);

        let fd = |field| scalar(field).map(|fd| fd as c_int);
        Ok(match kind {
            Kind::Open => Self::Open,
            Kind::Close => Self::Close {
                fd: fd(Field::HostFd)?,
            },
            Kind::CreateSession => Self::Ioctl {
                fd: fd(Field::HostFd)?,
                ioctl: Ioctl::CreateSession {
                    cipher: scalar(Field::Cipher)?,
                    key: bytes(Field::Key)?,
                },
            },
            Kind::EndSession => Self::Ioctl {
                fd: fd(Field::HostFd)?,
                ioctl: Ioctl::EndSession {
                    ses: scalar(Field::Session)?,
                },
            },
            Kind::Crypt => {
                let len = scalar(Field::Len)? as usize;
                let src = bytes(Field::Src)?;
                if len != src.len() || len > MAX_PAYLOAD {
                    return Err(Error::Malformed("source length mismatch"));
                }
                Self::Ioctl {
                    fd: fd(Field::HostFd)?,
                    ioctl: Ioctl::Crypt {
                        ses: scalar(Field::Session)?,
                        op: scalar(Field::Op)?.try_into()?,
                        src,
                        iv: bytes(Field::Iv)?,
                    },
                }
            }
        })
    }
}

/// A decoded reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Open { fd: c_int },
    Close,
    CreateSession { ses: u32, status: c_int },
    EndSession { status: c_int },
    Crypt { dst: Vec<u8>, status: c_int },
}

/// Flattens `request` into a [`SegmentList`].
///
/// Bounds are checked before any segment is built.
pub fn encode(request: &Request<'_>) -> Result<SegmentList> {
    request.check_bounds()?;

    let schema = request.kind().schema();
    let mut list = SegmentList::with_capacity(schema.len());
    for field in schema.readable {
        let segment = request
            .readable(*field)
            .ok_or(Error::Malformed("field missing from request"))?;
        list.push(segment)?;
    }
    for field in schema.writable {
        let len = request
            .writable_len(*field)
            .ok_or(Error::Malformed("field missing from request"))?;
        list.push(Segment::writable(len))?;
    }
    Ok(list)
}

/// Reads the writable segments of a completed `list` of the given `kind`.
///
/// A writable half that does not match the schema is reported as [`Error::Fault`].
pub fn decode(list: SegmentList, kind: Kind) -> Result<Response> {
    let schema = kind.schema();
    let mut writable = list.into_writable();
    Schema::check(schema.writable, &writable).map_err(|_| Error::Fault)?;

    let scalar = |writable: &[Segment], field| {
        schema
            .writable_index(field)
            .and_then(|i| writable.get(i))
            .and_then(Segment::get_signed)
            .ok_or(Error::Fault)
    };

    Ok(match kind {
        Kind::Open => Response::Open {
            fd: scalar(&writable, Field::HostFd)?,
        },
        Kind::Close => Response::Close,
        Kind::CreateSession => Response::CreateSession {
            ses: scalar(&writable, Field::Session)? as u32,
            status: scalar(&writable, Field::Status)?,
        },
        Kind::EndSession => Response::EndSession {
            status: scalar(&writable, Field::Status)?,
        },
        Kind::Crypt => {
            let status = scalar(&writable, Field::Status)?;
            let dst = schema.writable_index(Field::Dst).ok_or(Error::Fault)?;
            Response::Crypt {
                dst: writable.swap_remove(dst).into_vec(),
                status,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Command, Syscall};
    use crate::segment::Direction;

    fn scalars(segments: &[Segment]) -> Vec<Option<u32>> {
        segments.iter().map(Segment::get).collect()
    }

    #[test]
    fn open() {
        let list = encode(&Request::Open).unwrap();
        assert_eq!(scalars(list.readable()), [Some(Syscall::Open as u32)]);
        assert_eq!(list.writable(), [Segment::writable(4)]);
    }

    #[test]
    fn close() {
        let list = encode(&Request::Close { fd: 7 }).unwrap();
        assert_eq!(
            scalars(list.readable()),
            [Some(Syscall::Close as u32), Some(7)]
        );
        assert!(list.writable().is_empty());
    }

    #[test]
    fn create_session() {
        let key = b"0123456789abcdef";
        let list = encode(&Request::Ioctl {
            fd: 3,
            ioctl: Ioctl::CreateSession { cipher: 11, key },
        })
        .unwrap();

        let readable = list.readable();
        assert_eq!(
            scalars(&readable[..4]),
            [
                Some(Syscall::Ioctl as u32),
                Some(3),
                Some(Command::CreateSession as u32),
                Some(11)
            ]
        );
        assert_eq!(readable[4].as_slice(), key);
        assert_ne!(readable[4].as_ptr(), key.as_ptr());
        assert_eq!(
            list.writable(),
            [Segment::writable(4), Segment::writable(4)]
        );
    }

    #[test]
    fn crypt() {
        let src = [0xaa; 32];
        let iv = [0x55; 16];
        let list = encode(&Request::Ioctl {
            fd: 3,
            ioctl: Ioctl::Crypt {
                ses: 9,
                op: Operation::Decrypt,
                src: &src,
                iv: &iv,
            },
        })
        .unwrap();

        assert_eq!(list.len(), 10);
        let readable = list.readable();
        assert_eq!(
            scalars(&readable[..6]),
            [
                Some(Syscall::Ioctl as u32),
                Some(3),
                Some(Command::Crypt as u32),
                Some(9),
                Some(Operation::Decrypt as u32),
                Some(32)
            ]
        );
        assert_eq!(readable[6].as_slice(), src);
        assert_eq!(readable[7].as_slice(), iv);
        assert!(readable.iter().all(|s| s.direction() == Direction::Readable));
        assert_eq!(
            list.writable(),
            [Segment::writable(32), Segment::writable(4)]
        );
    }

    #[test]
    fn payload_too_large() {
        let src = vec![0; MAX_PAYLOAD + 16];
        let iv = [0; 16];
        assert_eq!(
            encode(&Request::Ioctl {
                fd: 3,
                ioctl: Ioctl::Crypt {
                    ses: 1,
                    op: Operation::Encrypt,
                    src: &src,
                    iv: &iv,
                },
            }),
            Err(Error::PayloadTooLarge {
                len: MAX_PAYLOAD + 16,
                max: MAX_PAYLOAD
            })
        );

        let key = [0; MAX_KEY_LEN + 1];
        assert_eq!(
            encode(&Request::Ioctl {
                fd: 3,
                ioctl: Ioctl::CreateSession {
                    cipher: 11,
                    key: &key
                },
            }),
            Err(Error::PayloadTooLarge {
                len: MAX_KEY_LEN + 1,
                max: MAX_KEY_LEN
            })
        );
    }

    #[test]
    fn parse() {
        let src = [1; 16];
        let iv = [2; 16];
        let requests = [
            Request::Open,
            Request::Close { fd: 4 },
            Request::Ioctl {
                fd: 4,
                ioctl: Ioctl::CreateSession {
                    cipher: 11,
                    key: b"0123456789abcdef",
                },
            },
            Request::Ioctl {
                fd: 4,
                ioctl: Ioctl::EndSession { ses: 2 },
            },
            Request::Ioctl {
                fd: 4,
                ioctl: Ioctl::Crypt {
                    ses: 2,
                    op: Operation::Encrypt,
                    src: &src,
                    iv: &iv,
                },
            },
        ];
        for request in requests {
            let list = encode(&request).unwrap();
            assert_eq!(Request::parse(list.readable()), Ok(request));
        }
    }

    #[test]
    fn parse_length_mismatch() {
        let mut list = SegmentList::new();
        for segment in [
            Segment::scalar(Syscall::Ioctl as _),
            Segment::scalar(4),
            Segment::scalar(Command::Crypt as _),
            Segment::scalar(2),
            Segment::scalar(Operation::Encrypt as _),
            Segment::scalar(32),
            Segment::readable(&[0; 16]),
            Segment::readable(&[0; 16]),
        ] {
            list.push(segment).unwrap();
        }
        assert_eq!(
            Request::parse(list.readable()),
            Err(Error::Malformed("source length mismatch"))
        );
    }

    #[test]
    fn decode_crypt() {
        let src = [0; 16];
        let iv = [0; 16];
        let mut list = encode(&Request::Ioctl {
            fd: 3,
            ioctl: Ioctl::Crypt {
                ses: 1,
                op: Operation::Encrypt,
                src: &src,
                iv: &iv,
            },
        })
        .unwrap();

        let (_, writable) = list.split_mut();
        writable[0].as_mut_slice().copy_from_slice(&[0x42; 16]);
        assert!(writable[1].put_signed(-22));

        assert_eq!(
            decode(list, Kind::Crypt),
            Ok(Response::Crypt {
                dst: vec![0x42; 16],
                status: -22
            })
        );
    }

    #[test]
    fn decode_fault() {
        let mut list = SegmentList::new();
        list.push(Segment::scalar(Syscall::Open as _)).unwrap();
        list.push(Segment::writable(2)).unwrap();
        assert_eq!(decode(list, Kind::Open), Err(Error::Fault));

        // Status of the wrong width.
        let mut list = SegmentList::new();
        list.push(Segment::scalar(Syscall::Ioctl as _)).unwrap();
        list.push(Segment::writable(16)).unwrap();
        list.push(Segment::writable(2)).unwrap();
        assert_eq!(decode(list, Kind::Crypt), Err(Error::Fault));
    }
}
