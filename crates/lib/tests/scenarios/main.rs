//! End-to-end scenarios through the public invocation API.

mod common;
mod failures;
mod ordering;
mod partitions;
