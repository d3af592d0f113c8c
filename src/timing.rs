//! Call duration from per-thread counters
//!
//! The delta of a call is `counter(exit) - counter(entry)`, read from the
//! per-thread perf context of each event. Well-nested calls always yield a
//! non-negative delta; a negative one is kept as-is and reported.

use crate::error::{AnalysisError, Result};
use crate::pairer::CallPair;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

/// A completed call with its counter delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedPair {
    pub entry: usize,
    pub exit: usize,
    /// Counter units elapsed between entry and exit
    pub delta: i64,
}

impl TimedPair {
    pub fn is_negative(&self) -> bool {
        self.delta < 0
    }
}

/// Attach counter deltas to call pairs
///
/// `counters` maps event position to its per-thread counter value and must
/// cover both ends of every pair.
pub fn compute_deltas(
    pairs: &[CallPair],
    counters: &FnvHashMap<usize, i64>,
) -> Result<Vec<TimedPair>> {
    let lookup = |index: usize| {
        counters.get(&index).copied().ok_or(AnalysisError::MissingColumn {
            table: "timed_pairs",
            column: "counter".to_string(),
            index,
        })
    };

    let mut timed = Vec::with_capacity(pairs.len());
    let mut negative = 0usize;
    for pair in pairs {
        let delta = lookup(pair.exit)?.wrapping_sub(lookup(pair.entry)?);
        if delta < 0 {
            negative += 1;
        }
        timed.push(TimedPair {
            entry: pair.entry,
            exit: pair.exit,
            delta,
        });
    }

    if negative > 0 {
        tracing::warn!(
            "{} of {} calls have a negative counter delta; counters may be misattributed",
            negative,
            timed.len()
        );
    }
    Ok(timed)
}
