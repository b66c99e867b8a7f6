// SPDX-License-Identifier: Apache-2.0

//! Segments and segment lists.

use crate::{Error, Result};

use core::mem::size_of;

/// Size of every scalar segment in bytes.
pub const SCALAR_SIZE: usize = size_of::<u32>();

/// Which side of the boundary fills a [`Segment`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Filled by the guest, read by the host.
    Readable,

    /// Filled by the host, read back by the guest.
    Writable,
}

/// One independently addressable byte buffer.
///
/// A segment always owns its storage, so it stays valid for as long as the channel holds it,
/// regardless of what happens to the caller's buffers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    dir: Direction,
    buf: Box<[u8]>,
}

impl Segment {
    /// Creates a readable segment holding a copy of `bytes`.
    #[inline]
    pub fn readable(bytes: &[u8]) -> Self {
        Self {
            dir: Direction::Readable,
            buf: bytes.into(),
        }
    }

    /// Creates a readable segment holding a single scalar.
    #[inline]
    pub fn scalar(value: u32) -> Self {
        Self::readable(&value.to_ne_bytes())
    }

    /// Creates a zeroed writable segment of `len` bytes.
    #[inline]
    pub fn writable(len: usize) -> Self {
        Self {
            dir: Direction::Writable,
            buf: vec![0; len].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.dir
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Base address of the segment buffer.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.buf.as_ptr()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Consumes the segment, returning its bytes.
    #[inline]
    pub fn into_vec(self) -> Vec<u8> {
        self.buf.into_vec()
    }

    /// Reads the segment as a scalar, if it has scalar width.
    #[inline]
    pub fn get(&self) -> Option<u32> {
        let bytes: [u8; SCALAR_SIZE] = self.buf.as_ref().try_into().ok()?;
        Some(u32::from_ne_bytes(bytes))
    }

    /// Reads the segment as a signed scalar, if it has scalar width.
    #[inline]
    pub fn get_signed(&self) -> Option<i32> {
        self.get().map(|v| v as i32)
    }

    /// Stores a scalar into the segment. Returns `false` if the segment does not have
    /// scalar width.
    #[inline]
    pub fn put(&mut self, value: u32) -> bool {
        if self.buf.len() != SCALAR_SIZE {
            return false;
        }
        self.buf.copy_from_slice(&value.to_ne_bytes());
        true
    }

    /// Stores a signed scalar into the segment.
    #[inline]
    pub fn put_signed(&mut self, value: i32) -> bool {
        self.put(value as u32)
    }
}

/// Ordered list of [`Segment`]s: all readable segments first, then all writable ones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentList {
    segments: Vec<Segment>,
    num_readable: usize,
}

impl SegmentList {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty list with room for `capacity` segments.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            segments: Vec::with_capacity(capacity),
            num_readable: 0,
        }
    }

    /// Appends a segment.
    ///
    /// Fails if a readable segment would follow a writable one.
    pub fn push(&mut self, segment: Segment) -> Result<()> {
        match segment.direction() {
            Direction::Readable if self.num_readable != self.segments.len() => {
                return Err(Error::Malformed("readable segment after writable segment"))
            }
            Direction::Readable => self.num_readable += 1,
            Direction::Writable => {}
        }
        self.segments.push(segment);
        Ok(())
    }

    /// Total number of segments.
    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments the host reads.
    #[inline]
    pub fn readable(&self) -> &[Segment] {
        &self.segments[..self.num_readable]
    }

    /// Segments the host writes.
    #[inline]
    pub fn writable(&self) -> &[Segment] {
        &self.segments[self.num_readable..]
    }

    /// Splits the list into its readable and writable halves.
    #[inline]
    pub fn split_mut(&mut self) -> (&[Segment], &mut [Segment]) {
        let (readable, writable) = self.segments.split_at_mut(self.num_readable);
        (&*readable, writable)
    }

    #[inline]
    pub fn iter(&self) -> core::slice::Iter<'_, Segment> {
        self.segments.iter()
    }

    /// Consumes the list, returning the writable segments in order.
    #[inline]
    pub fn into_writable(mut self) -> Vec<Segment> {
        self.segments.split_off(self.num_readable)
    }
}

impl<'a> IntoIterator for &'a SegmentList {
    type Item = &'a Segment;
    type IntoIter = core::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}
