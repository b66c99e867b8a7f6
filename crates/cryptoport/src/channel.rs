// SPDX-License-Identifier: Apache-2.0

//! Transports between guest and host.
//!
//! A [`Channel`] takes a fully encoded [`SegmentList`], hands it to the host and blocks until
//! the host has filled in the writable segments. Every submission gets its own single-shot
//! reply, so a late completion can never be matched to a later request.

use crate::host::{Device, Dispatcher};
use crate::segment::SegmentList;
use crate::{Error, Result};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace};

/// Granularity at which a waiting submission checks its [`CancelToken`].
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Synchronous transport to the host.
pub trait Channel: Send + Sync {
    /// Submits `segments` and blocks until the host completes them.
    ///
    /// Returns the same list with its writable segments filled in.
    fn submit(&self, segments: SegmentList, cancel: &CancelToken) -> Result<SegmentList>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    #[inline]
    fn submit(&self, segments: SegmentList, cancel: &CancelToken) -> Result<SegmentList> {
        (**self).submit(segments, cancel)
    }
}

/// Shared flag aborting a blocked submission.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Aborts every current and future submission using this token.
    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Channel tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    /// Number of elements the queue holds before submitters block.
    pub queue_size: usize,

    /// Bound on the wait for a completion; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            queue_size: 64,
            timeout: None,
        }
    }
}

/// Dispatches on the submitting thread.
pub struct Loopback<D: Device> {
    dispatcher: Arc<Dispatcher<D>>,
}

impl<D: Device> Loopback<D> {
    pub fn new(dispatcher: Arc<Dispatcher<D>>) -> Self {
        Self { dispatcher }
    }
}

impl<D: Device> Channel for Loopback<D> {
    fn submit(&self, mut segments: SegmentList, cancel: &CancelToken) -> Result<SegmentList> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.dispatcher.handle(&mut segments);
        Ok(segments)
    }
}

struct Element {
    segments: SegmentList,
    reply: SyncSender<SegmentList>,
}

/// A queue served by a dedicated host thread, one element at a time.
pub struct Virtqueue {
    queue: Mutex<Option<SyncSender<Element>>>,
    host: Option<JoinHandle<()>>,
    timeout: Option<Duration>,
}

impl Virtqueue {
    /// Starts the host thread serving `dispatcher`.
    pub fn spawn<D: Device>(dispatcher: Arc<Dispatcher<D>>, options: Options) -> Result<Self> {
        let (queue, elements) = sync_channel(options.queue_size);
        let host = thread::Builder::new()
            .name("virtio-cryptodev".into())
            .spawn(move || serve(&dispatcher, elements))
            .map_err(|_| Error::Disconnected)?;

        Ok(Self {
            queue: Mutex::new(Some(queue)),
            host: Some(host),
            timeout: options.timeout,
        })
    }

    fn sender(&self) -> Result<SyncSender<Element>> {
        self.queue
            .lock()
            .map_err(|_| Error::Disconnected)?
            .clone()
            .ok_or(Error::Disconnected)
    }
}

fn serve<D: Device>(dispatcher: &Dispatcher<D>, elements: Receiver<Element>) {
    for Element {
        mut segments,
        reply,
    } in elements
    {
        trace!("popped element with {} segments", segments.len());
        dispatcher.handle(&mut segments);

        // The submitter may have timed out or been cancelled.
        if reply.send(segments).is_err() {
            debug!("dropping completion of abandoned request");
        }
    }
    debug!("virtqueue closed");
}

impl Channel for Virtqueue {
    fn submit(&self, segments: SegmentList, cancel: &CancelToken) -> Result<SegmentList> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (reply, completion) = sync_channel(1);
        self.sender()?
            .send(Element { segments, reply })
            .map_err(|_| Error::Disconnected)?;

        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::TransportTimeout);
                    }
                    POLL_INTERVAL.min(deadline - now)
                }
                None => POLL_INTERVAL,
            };

            match completion.recv_timeout(wait) {
                Ok(segments) => return Ok(segments),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(Error::Disconnected),
            }
        }
    }
}

impl Drop for Virtqueue {
    fn drop(&mut self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.take();
        }
        if let Some(host) = self.host.take() {
            if host.join().is_err() {
                debug!("virtqueue host thread panicked");
            }
        }
    }
}
