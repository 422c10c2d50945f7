// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Parallel aggregation: count, sum, avg, min, max.
//!
//! Non-numeric field values are ignored. `min`/`max` of an empty set are
//! absent; `avg` of an empty set is 0 (long-standing quirk, kept and
//! tested).

use dotdb_kernel::{tree, DotPath, Value};
use rayon::prelude::*;

use super::{chunk_size, PARALLEL_THRESHOLD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateOp {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "count" => Some(AggregateOp::Count),
            "sum" => Some(AggregateOp::Sum),
            "avg" => Some(AggregateOp::Avg),
            "min" => Some(AggregateOp::Min),
            "max" => Some(AggregateOp::Max),
            _ => None,
        }
    }
}

/// Combiner state: `(sum, n)` pairs for avg, running min/max for the
/// extremes.
#[derive(Debug, Clone, Copy, Default)]
struct NumericFold {
    sum: f64,
    count: u64,
    min: Option<f64>,
    max: Option<f64>,
}

impl NumericFold {
    fn observe(mut self, n: f64) -> Self {
        self.sum += n;
        self.count += 1;
        self.min = Some(self.min.map_or(n, |m| m.min(n)));
        self.max = Some(self.max.map_or(n, |m| m.max(n)));
        self
    }

    fn merge(self, other: Self) -> Self {
        NumericFold {
            sum: self.sum + other.sum,
            count: self.count + other.count,
            min: merge_extreme(self.min, other.min, f64::min),
            max: merge_extreme(self.max, other.max, f64::max),
        }
    }
}

fn merge_extreme(a: Option<f64>, b: Option<f64>, pick: fn(f64, f64) -> f64) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(pick(x, y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn fold_chunk(chunk: &[Value], field: &DotPath) -> NumericFold {
    chunk
        .iter()
        .filter_map(|doc| tree::get(doc, field).and_then(Value::as_f64))
        .fold(NumericFold::default(), NumericFold::observe)
}

/// Run one aggregation over the documents. `field` is ignored for
/// `count` and required for everything else (the engine enforces that).
pub(crate) fn run(docs: &[Value], op: AggregateOp, field: Option<&DotPath>) -> Option<f64> {
    if op == AggregateOp::Count {
        return Some(docs.len() as f64);
    }
    let field = field?;

    let fold = if docs.len() < PARALLEL_THRESHOLD {
        fold_chunk(docs, field)
    } else {
        docs.par_chunks(chunk_size(docs.len()))
            .map(|chunk| fold_chunk(chunk, field))
            .reduce(NumericFold::default, NumericFold::merge)
    };

    match op {
        AggregateOp::Count => Some(fold.count as f64),
        AggregateOp::Sum => Some(fold.sum),
        AggregateOp::Avg => {
            if fold.count == 0 {
                Some(0.0)
            } else {
                Some(fold.sum / fold.count as f64)
            }
        }
        AggregateOp::Min => fold.min,
        AggregateOp::Max => fold.max,
    }
}
