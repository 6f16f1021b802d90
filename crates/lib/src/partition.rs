//! Work partitioning across shards.
//!
//! A partition is a pure selection: given the shard index and the shard count it
//! returns the contiguous slice of a collection that belongs to the current shard.
//! Shards are expected to run as separate invocations (for example one per CI matrix
//! entry), each computing only its own slice.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
  #[error("partition total must be at least 1")]
  ZeroShards,

  #[error("shard index {index} is out of range for {total} shard(s)")]
  ShardOutOfRange { index: usize, total: usize },

  #[error("malformed partition '{raw}': expected 'index/total'")]
  Malformed { raw: String },

  #[error("partition '{raw}' does not match the declared total of {expected} shard(s)")]
  TotalMismatch { raw: String, expected: usize },
}

/// The current shard: a zero-based `index` out of `total` shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Partition {
  index: usize,
  total: usize,
}

impl Partition {
  pub fn new(index: usize, total: usize) -> Result<Self, PartitionError> {
    if total == 0 {
      return Err(PartitionError::ZeroShards);
    }
    if index >= total {
      return Err(PartitionError::ShardOutOfRange { index, total });
    }
    Ok(Self { index, total })
  }

  /// A single shard covering every item.
  pub fn single() -> Self {
    Self { index: 0, total: 1 }
  }

  pub fn index(&self) -> usize {
    self.index
  }

  pub fn total(&self) -> usize {
    self.total
  }

  /// Index range of this shard within a collection of `len` items.
  ///
  /// Items are split into contiguous chunks of `ceil(len / total)`; trailing shards
  /// may be shorter or empty.
  pub fn range(&self, len: usize) -> Range<usize> {
    let per_shard = len.div_ceil(self.total);
    let start = (self.index * per_shard).min(len);
    let end = (start + per_shard).min(len);
    start..end
  }

  /// This shard's slice of `items`.
  pub fn current<'a, T>(&self, items: &'a [T]) -> &'a [T] {
    &items[self.range(items.len())]
  }
}

impl Default for Partition {
  fn default() -> Self {
    Self::single()
  }
}

impl fmt::Display for Partition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.index, self.total)
  }
}

impl FromStr for Partition {
  type Err = PartitionError;

  /// Parse `index/total`, with a zero-based index.
  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    let malformed = || PartitionError::Malformed { raw: raw.to_string() };

    let (index, total) = raw.trim().split_once('/').ok_or_else(malformed)?;
    let index: usize = index.trim().parse().map_err(|_| malformed())?;
    let total: usize = total.trim().parse().map_err(|_| malformed())?;

    Partition::new(index, total)
  }
}
