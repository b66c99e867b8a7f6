// SPDX-License-Identifier: Apache-2.0

//! Host-specific functionality.
//!
//! The [`Dispatcher`] owns the resources opened on behalf of the guest. It decodes each
//! [`SegmentList`], rebuilds the operation descriptor with its pointer fields linked to the
//! segment buffers, and runs the operation against a [`Device`] backend.

#[cfg(target_os = "linux")]
pub mod cryptodev;
pub mod soft;

mod table;

pub use table::Table;

use crate::cipher::Operation;
use crate::codec::{Ioctl, Request};
use crate::schema::{self, Field, Kind, Schema};
use crate::segment::{Segment, SegmentList, SCALAR_SIZE};
use crate::NO_FD;

use core::ffi::c_int;
use std::io;

use libc::{EBADF, EINVAL};
use log::{debug, error, trace, warn};

/// Session descriptor handed to [`Resource::create_session`].
#[derive(Debug, PartialEq, Eq)]
pub struct SessionOp<'a> {
    pub cipher: u32,
    pub key: &'a [u8],

    /// Filled in by the backend.
    pub ses: u32,
}

/// Transform descriptor handed to [`Resource::crypt`].
#[derive(Debug, PartialEq, Eq)]
pub struct CryptOp<'a> {
    pub ses: u32,
    pub op: Operation,
    pub src: &'a [u8],
    pub iv: &'a [u8],

    /// Written in place by the backend; always as long as `src`.
    pub dst: &'a mut [u8],
}

/// An opened crypto device.
///
/// Failures are reported as positive errno values.
pub trait Resource: Send + Sync + 'static {
    /// Handle reported to the guest.
    fn handle(&self) -> c_int;

    fn create_session(&self, op: &mut SessionOp<'_>) -> Result<(), c_int>;

    fn end_session(&self, ses: u32) -> Result<(), c_int>;

    fn crypt(&self, op: &mut CryptOp<'_>) -> Result<(), c_int>;
}

/// A crypto device backend.
pub trait Device: Send + Sync + 'static {
    type Resource: Resource;

    /// Backend name, for logging.
    fn name(&self) -> &'static str;

    /// Opens a new resource; dropping it closes it.
    fn open(&self) -> io::Result<Self::Resource>;
}

#[inline]
fn status(result: Result<(), c_int>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(errno) => -errno,
    }
}

/// Writes `value` into the writable segment carrying `field`.
fn put(schema: &Schema, writable: &mut [Segment], field: Field, value: i32) {
    let written = match schema::writable(schema, writable, field) {
        Ok(segment) => segment.put_signed(value),
        Err(_) => false,
    };
    if !written {
        warn!("cannot write {field:?} to response");
    }
}

/// Reports a request the dispatcher cannot understand.
///
/// A request of known `kind` gets `-EINVAL` in its status segment, or in its handle segment
/// for an open. Otherwise the first scalar-wide writable segment is used, if any.
fn reject(kind: Option<Kind>, writable: &mut [Segment]) {
    let segment = match kind {
        Some(kind) => {
            let schema = kind.schema();
            schema
                .writable_index(Field::Status)
                .or_else(|| schema.writable_index(Field::HostFd))
                .and_then(move |i| writable.get_mut(i))
        }
        None => writable.iter_mut().find(|s| s.len() == SCALAR_SIZE),
    };

    match segment.map(|segment| segment.put_signed(-EINVAL)) {
        Some(true) => {}
        Some(false) => warn!("cannot write rejection status to response"),
        None => trace!("no segment to report rejection in"),
    }
}

/// Executes requests against the resources of one [`Device`].
pub struct Dispatcher<D: Device> {
    device: D,
    table: Table<D::Resource>,
}

impl<D: Device> Dispatcher<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            table: Table::new(),
        }
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn table(&self) -> &Table<D::Resource> {
        &self.table
    }

    /// Executes the request in `segments`, writing the results into its writable segments.
    ///
    /// Malformed input is answered with `-EINVAL` in the first writable segment, if any.
    pub fn handle(&self, segments: &mut SegmentList) {
        let (readable, writable) = segments.split_mut();

        let request = match Request::parse(readable) {
            Ok(request) => request,
            Err(e) => {
                warn!("rejecting request: {e}");
                return reject(Kind::identify(readable).ok(), writable);
            }
        };

        let schema = request.kind().schema();
        if let Err(e) = Schema::check(schema.writable, writable) {
            warn!("rejecting {:?} request: {e}", request.kind());
            return reject(Some(request.kind()), writable);
        }

        debug!("{} {:?}", self.device.name(), request.kind());
        match request {
            Request::Open => put(schema, writable, Field::HostFd, self.open()),

            Request::Close { fd } => {
                let status = self.close(fd);
                trace!("close({fd}) = {status}");
            }

            Request::Ioctl { fd, ioctl } => match ioctl {
                Ioctl::CreateSession { cipher, key } => {
                    let mut op = SessionOp {
                        cipher,
                        key,
                        ses: 0,
                    };
                    let status = status(self.with(fd, |r| r.create_session(&mut op)));
                    put(schema, writable, Field::Session, op.ses as _);
                    put(schema, writable, Field::Status, status);
                }

                Ioctl::EndSession { ses } => {
                    let status = status(self.with(fd, |r| r.end_session(ses)));
                    put(schema, writable, Field::Status, status);
                }

                Ioctl::Crypt { ses, op, src, iv } => {
                    let result = match schema::writable(schema, writable, Field::Dst) {
                        Ok(dst) => self.with(fd, |r| {
                            r.crypt(&mut CryptOp {
                                ses,
                                op,
                                src,
                                iv,
                                dst: dst.as_mut_slice(),
                            })
                        }),
                        Err(_) => Err(EINVAL),
                    };
                    put(schema, writable, Field::Status, status(result));
                }
            },
        }
    }

    /// Runs `f` against the live resource `fd`.
    fn with(
        &self,
        fd: c_int,
        f: impl FnOnce(&D::Resource) -> Result<(), c_int>,
    ) -> Result<(), c_int> {
        let resource = self.table.get(fd).ok_or(EBADF)?;
        f(&resource)
    }

    /// Opens a resource and registers it. Returns its handle, or [`NO_FD`].
    pub fn open(&self) -> c_int {
        let resource = match self.device.open() {
            Ok(resource) => resource,
            Err(e) => {
                error!("failed to open {} device: {e}", self.device.name());
                return NO_FD;
            }
        };

        let fd = resource.handle();
        match self.table.insert(fd, resource) {
            Ok(()) => fd,
            Err(errno) => {
                error!("handle {fd} already registered (errno {errno})");
                NO_FD
            }
        }
    }

    /// Unregisters and closes `fd`. Returns `0`, or `-EBADF` if `fd` was not live.
    pub fn close(&self, fd: c_int) -> c_int {
        match self.table.remove(fd) {
            Some(_) => 0,
            None => {
                debug!("close of unknown handle {fd}");
                -EBADF
            }
        }
    }

    /// Closes every live resource.
    pub fn shutdown(&self) {
        for (fd, _) in self.table.drain() {
            debug!("closing handle {fd} at shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::soft::Soft;
    use super::*;
    use crate::cipher::Cipher;
    use crate::codec::{decode, encode, Response};
    use crate::schema::{Command, Syscall};

    fn submit(dispatcher: &Dispatcher<Soft>, request: Request<'_>) -> Response {
        let mut list = encode(&request).unwrap();
        dispatcher.handle(&mut list);
        decode(list, request.kind()).unwrap()
    }

    fn open(dispatcher: &Dispatcher<Soft>) -> c_int {
        match submit(dispatcher, Request::Open) {
            Response::Open { fd } => fd,
            r => panic!("unexpected response {r:?}"),
        }
    }

    #[test]
    fn open_close() {
        let dispatcher = Dispatcher::new(Soft::default());
        let a = open(&dispatcher);
        let b = open(&dispatcher);
        assert!(a >= 0);
        assert_ne!(a, b);
        assert_eq!(dispatcher.table().len(), 2);

        let close = submit(&dispatcher, Request::Close { fd: a });
        assert_eq!(close, Response::Close);
        assert_eq!(dispatcher.table().len(), 1);

        assert_eq!(dispatcher.close(a), -EBADF);
        assert_eq!(dispatcher.table().len(), 1);

        dispatcher.shutdown();
        assert!(dispatcher.table().is_empty());
    }

    #[test]
    fn stale_handle() {
        let dispatcher = Dispatcher::new(Soft::default());
        let key = [0; 16];
        for fd in [NO_FD, 42] {
            assert_eq!(
                submit(
                    &dispatcher,
                    Request::Ioctl {
                        fd,
                        ioctl: Ioctl::CreateSession {
                            cipher: Cipher::AesCbc as _,
                            key: &key
                        },
                    }
                ),
                Response::CreateSession {
                    ses: 0,
                    status: -EBADF
                }
            );
        }
    }

    #[test]
    fn crypt() {
        let dispatcher = Dispatcher::new(Soft::default());
        let fd = open(&dispatcher);

        let ses = match submit(
            &dispatcher,
            Request::Ioctl {
                fd,
                ioctl: Ioctl::CreateSession {
                    cipher: Cipher::AesCbc as _,
                    key: b"0123456789abcdef",
                },
            },
        ) {
            Response::CreateSession { ses, status: 0 } => ses,
            r => panic!("unexpected response {r:?}"),
        };

        let iv = *b"0123456789abcdef";
        let ciphertext = match submit(
            &dispatcher,
            Request::Ioctl {
                fd,
                ioctl: Ioctl::Crypt {
                    ses,
                    op: Operation::Encrypt,
                    src: &[0; 16],
                    iv: &iv,
                },
            },
        ) {
            Response::Crypt { dst, status: 0 } => dst,
            r => panic!("unexpected response {r:?}"),
        };
        assert_ne!(ciphertext, [0; 16]);

        assert_eq!(
            submit(
                &dispatcher,
                Request::Ioctl {
                    fd,
                    ioctl: Ioctl::Crypt {
                        ses,
                        op: Operation::Decrypt,
                        src: &ciphertext,
                        iv: &iv,
                    },
                }
            ),
            Response::Crypt {
                dst: vec![0; 16],
                status: 0
            }
        );

        assert_eq!(
            submit(
                &dispatcher,
                Request::Ioctl {
                    fd,
                    ioctl: Ioctl::EndSession { ses },
                }
            ),
            Response::EndSession { status: 0 }
        );
        assert_eq!(
            submit(
                &dispatcher,
                Request::Ioctl {
                    fd,
                    ioctl: Ioctl::EndSession { ses },
                }
            ),
            Response::EndSession { status: -EINVAL }
        );
    }

    /// Builds a raw list from readable segments and writable lengths.
    fn raw(readable: &[Segment], writable: &[usize]) -> SegmentList {
        let mut list = SegmentList::new();
        for segment in readable {
            list.push(segment.clone()).unwrap();
        }
        for len in writable {
            list.push(Segment::writable(*len)).unwrap();
        }
        list
    }

    fn ioctl(fd: c_int, cmd: Command) -> [Segment; 3] {
        [
            Segment::scalar(Syscall::Ioctl as _),
            Segment::scalar(fd as _),
            Segment::scalar(cmd as _),
        ]
    }

    #[test]
    fn unknown_opcode() {
        let dispatcher = Dispatcher::new(Soft::default());

        let mut list = raw(&[Segment::scalar(7)], &[4]);
        dispatcher.handle(&mut list);
        assert_eq!(list.writable()[0].get_signed(), Some(-EINVAL));

        let readable = [
            Segment::scalar(Syscall::Ioctl as _),
            Segment::scalar(3),
            Segment::scalar(99),
        ];
        let mut list = raw(&readable, &[16, 4]);
        dispatcher.handle(&mut list);
        assert_eq!(list.writable()[0].as_slice(), [0; 16]);
        assert_eq!(list.writable()[1].get_signed(), Some(-EINVAL));

        // Nothing to answer into.
        let mut list = raw(&[Segment::scalar(7)], &[]);
        dispatcher.handle(&mut list);
        assert!(dispatcher.table().is_empty());
    }

    #[test]
    fn malformed() {
        let dispatcher = Dispatcher::new(Soft::default());

        // End session without the session id.
        let mut list = raw(&ioctl(3, Command::EndSession), &[4]);
        dispatcher.handle(&mut list);
        assert_eq!(list.writable()[0].get_signed(), Some(-EINVAL));

        // Open with an undersized response segment.
        let mut list = raw(&[Segment::scalar(Syscall::Open as _)], &[2]);
        dispatcher.handle(&mut list);
        assert_eq!(list.writable()[0].as_slice(), [0, 0]);
        assert!(dispatcher.table().is_empty());

        assert_eq!(decode(list, Kind::Open), Err(crate::Error::Fault));
    }

    #[test]
    fn malformed_create_session() {
        let dispatcher = Dispatcher::new(Soft::default());
        let fd = open(&dispatcher);

        // Cipher scalar two bytes wide.
        let mut readable = ioctl(fd, Command::CreateSession).to_vec();
        readable.push(Segment::readable(&[11, 0]));
        readable.push(Segment::readable(b"0123456789abcdef"));
        let mut list = raw(&readable, &[4, 4]);
        dispatcher.handle(&mut list);

        assert_eq!(
            decode(list, Kind::CreateSession),
            Ok(Response::CreateSession {
                ses: 0,
                status: -EINVAL
            })
        );
    }

    #[test]
    fn malformed_crypt() {
        let dispatcher = Dispatcher::new(Soft::default());
        let fd = open(&dispatcher);

        // Neither encrypt nor decrypt.
        let mut readable = ioctl(fd, Command::Crypt).to_vec();
        readable.extend([
            Segment::scalar(1),
            Segment::scalar(7),
            Segment::scalar(16),
            Segment::readable(&[0; 16]),
            Segment::readable(&[0; 16]),
        ]);
        let mut list = raw(&readable, &[16, 4]);
        dispatcher.handle(&mut list);

        assert_eq!(
            decode(list, Kind::Crypt),
            Ok(Response::Crypt {
                dst: vec![0; 16],
                status: -EINVAL
            })
        );

        // Response half missing its status segment.
        readable[4] = Segment::scalar(Operation::Encrypt as _);
        let mut list = raw(&readable, &[16]);
        dispatcher.handle(&mut list);
        assert_eq!(list.writable()[0].as_slice(), [0; 16]);
    }

    /// Device handing out one fixed handle, or failing when it has none.
    struct Fixed(Option<c_int>);

    struct Stub(c_int);

    impl Resource for Stub {
        fn handle(&self) -> c_int {
            self.0
        }

        fn create_session(&self, _op: &mut SessionOp<'_>) -> Result<(), c_int> {
            Err(libc::ENOTSUP)
        }

        fn end_session(&self, _ses: u32) -> Result<(), c_int> {
            Err(libc::ENOTSUP)
        }

        fn crypt(&self, _op: &mut CryptOp<'_>) -> Result<(), c_int> {
            Err(libc::ENOTSUP)
        }
    }

    impl Device for Fixed {
        type Resource = Stub;

        fn name(&self) -> &'static str {
            "fixed"
        }

        fn open(&self) -> io::Result<Stub> {
            match self.0 {
                Some(fd) => Ok(Stub(fd)),
                None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
            }
        }
    }

    #[test]
    fn open_failure() {
        let dispatcher = Dispatcher::new(Fixed(None));
        assert_eq!(dispatcher.open(), NO_FD);
        assert!(dispatcher.table().is_empty());

        let mut list = encode(&Request::Open).unwrap();
        dispatcher.handle(&mut list);
        assert_eq!(decode(list, Kind::Open), Ok(Response::Open { fd: NO_FD }));
        assert!(dispatcher.table().is_empty());
    }

    #[test]
    fn duplicate_handle() {
        let dispatcher = Dispatcher::new(Fixed(Some(5)));
        assert_eq!(dispatcher.open(), 5);
        assert_eq!(dispatcher.open(), NO_FD);
        assert_eq!(dispatcher.table().len(), 1);

        assert_eq!(dispatcher.close(5), 0);
        assert!(dispatcher.table().is_empty());
    }
}
