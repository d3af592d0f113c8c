//! Entry/exit call pairing
//!
//! Events are partitioned by (pid, tid) and replayed in capture order
//! against one stack per thread. Synchronous calls nest strictly, so every
//! exit must close the innermost open entry of its thread. Anything else
//! means the trace is corrupt or the calls were not synchronous, and
//! pairing fails rather than guessing.

use crate::error::{AnalysisError, Result};
use crate::name::Direction;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

/// Instrumentation event with its thread identity, as fed to the pairer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadedEvent {
    /// Position of the event in the capture
    pub index: usize,
    pub pid: i64,
    pub tid: i64,
    pub direction: Direction,
    pub hash: String,
}

/// One completed call: positions of its entry and exit events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallPair {
    pub entry: usize,
    pub exit: usize,
}

/// Output of a pairing run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    /// Completed calls, ordered by entry position
    pub pairs: Vec<CallPair>,
    /// Entries still open at end of capture (in-flight calls, dropped)
    pub unmatched_entries: usize,
}

/// Per-thread stack of open calls
#[derive(Debug, Default)]
struct CallStack {
    open: Vec<(String, usize)>,
}

/// Replays instrumentation events into call pairs
#[derive(Debug, Default)]
pub struct CallPairer {
    stacks: FnvHashMap<(i64, i64), CallStack>,
    pairs: Vec<CallPair>,
}

impl CallPairer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next event in capture order
    pub fn push(&mut self, event: &ThreadedEvent) -> Result<()> {
        let stack = self.stacks.entry((event.pid, event.tid)).or_default();

        match event.direction {
            Direction::Entry => {
                stack.open.push((event.hash.clone(), event.index));
            }
            Direction::Exit => {
                let Some((open_hash, entry)) = stack.open.pop() else {
                    return Err(AnalysisError::EmptyStack {
                        pid: event.pid,
                        tid: event.tid,
                        index: event.index,
                        hash: event.hash.clone(),
                    });
                };
                if open_hash != event.hash {
                    return Err(AnalysisError::StackMismatch {
                        pid: event.pid,
                        tid: event.tid,
                        index: event.index,
                        expected: open_hash,
                        found: event.hash.clone(),
                    });
                }
                self.pairs.push(CallPair {
                    entry,
                    exit: event.index,
                });
            }
        }
        Ok(())
    }

    /// Number of open calls on one thread
    pub fn depth(&self, pid: i64, tid: i64) -> usize {
        self.stacks.get(&(pid, tid)).map_or(0, |s| s.open.len())
    }

    /// Close the run, dropping calls still open at end of capture
    pub fn finish(mut self) -> Pairing {
        let unmatched_entries = self.stacks.values().map(|s| s.open.len()).sum();
        if unmatched_entries > 0 {
            tracing::debug!("Dropping {} in-flight calls at end of capture", unmatched_entries);
        }
        self.pairs.sort_unstable();
        Pairing {
            pairs: self.pairs,
            unmatched_entries,
        }
    }
}

/// Pair a whole event sequence
///
/// Events must be in capture order; events of different threads may be
/// interleaved arbitrarily.
pub fn pair_calls<'a, I>(events: I) -> Result<Pairing>
where
    I: IntoIterator<Item = &'a ThreadedEvent>,
{
    let mut pairer = CallPairer::new();
    for event in events {
        pairer.push(event)?;
    }
    Ok(pairer.finish())
}
