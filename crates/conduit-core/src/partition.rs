//! Partition ranges and the admission rule.
//!
//! Each relay instance owns an inclusive, contiguous slice `[min, max]` of the
//! 40-bit digest space. A message is admitted iff the digest of its
//! identifier falls inside that slice. Coverage of the whole space across a
//! fleet is an operator concern; `split_even` helps lay one out.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::{digest_of, Digest};
use crate::identifier::Identifier;

/// Inclusive range of digests owned by one relay instance. `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct PartitionRange {
    min: Digest,
    max: Digest,
}

#[derive(Deserialize)]
struct RawRange {
    min: Digest,
    max: Digest,
}

impl TryFrom<RawRange> for PartitionRange {
    type Error = RangeError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        PartitionRange::new(raw.min, raw.max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("min_hash {min} is greater than max_hash {max}")]
    Inverted { min: Digest, max: Digest },
    #[error("cannot split the digest space into {0} ranges (1..={max})", max = MAX_SPLIT)]
    BadSplit(u64),
}

/// Largest fleet `split_even` will lay out.
pub const MAX_SPLIT: u64 = 1 << 16;

impl PartitionRange {
    pub fn new(min: Digest, max: Digest) -> Result<Self, RangeError> {
        if min > max {
            return Err(RangeError::Inverted { min, max });
        }
        Ok(Self { min, max })
    }

    /// The whole digest space. A single-instance deployment.
    pub const fn full() -> Self {
        Self {
            min: Digest::MIN,
            max: Digest::MAX,
        }
    }

    pub fn min(&self) -> Digest {
        self.min
    }

    pub fn max(&self) -> Digest {
        self.max
    }

    /// Inclusive on both ends.
    pub fn contains(&self, digest: Digest) -> bool {
        self.min <= digest && digest <= self.max
    }

    /// Number of digest values in the range.
    pub fn width(&self) -> u64 {
        self.max.to_u64() - self.min.to_u64() + 1
    }

    /// Split the whole digest space into `count` contiguous, disjoint ranges
    /// that together cover it. Widths differ by at most one. `count` must be
    /// in `1..=MAX_SPLIT`.
    pub fn split_even(count: u64) -> Result<Vec<Self>, RangeError> {
        let space = Digest::MAX_VALUE + 1;
        if count == 0 || count > MAX_SPLIT {
            return Err(RangeError::BadSplit(count));
        }

        let base = space / count;
        let extra = space % count;
        let mut ranges = Vec::with_capacity(count as usize);
        let mut start = 0u64;
        for i in 0..count {
            let width = base + u64::from(i < extra);
            let end = start + width - 1;
            ranges.push(Self {
                min: Digest::from_u64(start).ok_or(RangeError::BadSplit(count))?,
                max: Digest::from_u64(end).ok_or(RangeError::BadSplit(count))?,
            });
            start = end + 1;
        }
        Ok(ranges)
    }
}

impl Default for PartitionRange {
    fn default() -> Self {
        Self::full()
    }
}

impl fmt::Display for PartitionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Result of the admission check. Carries the digest so callers do not
/// hash twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub admitted: bool,
    pub digest: Digest,
}

/// Hash `identifier` and test it against `range`. Pure.
pub fn admit(identifier: &Identifier, range: &PartitionRange) -> Admission {
    let digest = digest_of(identifier);
    Admission {
        admitted: range.contains(digest),
        digest,
    }
}
