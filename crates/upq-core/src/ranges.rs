//! Byte-range math for chunked uploads.
//!
//! Ranges are inclusive on both ends, matching the `Content-Range` header and
//! the remote's `nextExpectedRanges` strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Inclusive byte range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value: `bytes start-end/total`.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }

    /// True if this range ends on the file's last byte.
    pub fn is_last(&self, total: u64) -> bool {
        self.end + 1 >= total
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Ranges to send from `offset` to end-of-file in `chunk_size` steps.
///
/// Contiguous and ascending; every range has `chunk_size` bytes except the
/// last, which is truncated to the file length. Empty when `offset >= total`
/// or `chunk_size == 0`.
pub fn plan_chunks(offset: u64, total: u64, chunk_size: u64) -> ChunkPlan {
    ChunkPlan {
        next: offset,
        total,
        chunk_size,
    }
}

/// Iterator returned by [`plan_chunks`].
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    next: u64,
    total: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// Number of ranges still to be yielded.
    pub fn remaining(&self) -> u64 {
        if self.chunk_size == 0 || self.next >= self.total {
            return 0;
        }
        (self.total - self.next).div_ceil(self.chunk_size)
    }
}

impl Iterator for ChunkPlan {
    type Item = ByteRange;

    fn next(&mut self) -> Option<ByteRange> {
        if self.chunk_size == 0 || self.next >= self.total {
            return None;
        }
        let start = self.next;
        let end = start
            .saturating_add(self.chunk_size - 1)
            .min(self.total - 1);
        self.next = end + 1;
        Some(ByteRange { start, end })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining() as usize;
        (n, Some(n))
    }
}

/// One entry of the remote's pending-ranges list: `"start-end"` or open-ended `"start-"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl PendingRange {
    pub fn open(start: u64) -> Self {
        Self { start, end: None }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (a, b) = s.trim().split_once('-')?;
        let start = a.trim().parse::<u64>().ok()?;
        let b = b.trim();
        let end = if b.is_empty() {
            None
        } else {
            let end = b.parse::<u64>().ok()?;
            if end < start {
                return None;
            }
            Some(end)
        };
        Some(Self { start, end })
    }
}

impl fmt::Display for PendingRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}-{}", self.start, end),
            None => write!(f, "{}-", self.start),
        }
    }
}

impl Serialize for PendingRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PendingRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PendingRange::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid byte range {:?}", s)))
    }
}

/// Resume point from the remote's pending ranges.
///
/// `None` (no information) resumes at 0. An empty list means the remote
/// expects nothing more; returns `None` in that case so callers can treat the
/// file as fully uploaded. Otherwise the first entry's start, since the list
/// is ascending and everything before it is acknowledged.
pub fn resume_offset(pending: Option<&[PendingRange]>) -> Option<u64> {
    match pending {
        None => Some(0),
        Some([]) => None,
        Some([first, ..]) => Some(first.start),
    }
}
