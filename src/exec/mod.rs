// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Data-parallel execution over a collection snapshot.
//!
//! Every entry point takes cloned document handles from the published
//! read view (cheap: containers are reference-counted), so scans never
//! contend with writers. Below [`PARALLEL_THRESHOLD`] items everything
//! runs on the calling thread; above it the work is split into
//! `max(1, cores − 1)` chunks and results are concatenated in input
//! order, so parallel and sequential execution are observationally
//! identical.

pub mod aggregate;
pub mod filter;
pub mod join;

pub use aggregate::AggregateOp;
pub use filter::{Filter, FilterOp};

/// Collections smaller than this are scanned on the calling thread.
pub(crate) const PARALLEL_THRESHOLD: usize = 100;

pub(crate) fn chunk_size(len: usize) -> usize {
    let workers = std::cmp::max(1, rayon::current_num_threads().saturating_sub(1));
    (len + workers - 1) / workers
}
