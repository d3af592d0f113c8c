//! Manifest join: completed calls -> call records
//!
//! Each timed call is resolved to its callable descriptor through the hash
//! of its entry event, then expanded to one row per declared argument
//! position whose entry-event payload decoded to a non-empty shape.

use crate::fields::ArgumentMap;
use crate::manifest::Manifest;
use crate::pairer::ThreadedEvent;
use crate::timing::TimedPair;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

/// One row of the joined call table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub entry: usize,
    pub exit: usize,
    pub pid: i64,
    pub tid: i64,
    pub hash: String,
    pub symbol: String,
    pub return_type: String,
    pub arg_num: u32,
    pub arg_type: String,
    pub width: u64,
    pub height: u64,
    pub pointer: Option<u64>,
    /// Counter units between entry and exit
    pub delta: i64,
}

/// Join output with counts of what was left out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joined {
    pub records: Vec<CallRecord>,
    /// Calls whose hash is absent from the manifest
    pub unresolved_calls: usize,
    /// Declared arguments without a usable shape
    pub unshaped_arguments: usize,
}

/// Join timed calls against the manifest and decoded argument fields
///
/// `events` maps event position to the instrumentation event at that
/// position; `arguments` maps event position to its decoded arguments.
/// Output rows are ordered by (entry, arg_num).
pub fn join_records(
    timed: &[TimedPair],
    events: &FnvHashMap<usize, &ThreadedEvent>,
    arguments: &FnvHashMap<usize, &ArgumentMap>,
    manifest: &Manifest,
) -> Joined {
    let mut joined = Joined::default();

    for call in timed {
        let Some(entry) = events.get(&call.entry) else {
            continue;
        };
        let Some(callable) = manifest.get(&entry.hash) else {
            joined.unresolved_calls += 1;
            continue;
        };
        let symbol = callable.symbol();
        let decoded = arguments.get(&call.entry);

        for arg in &callable.arg_list {
            let fields = decoded.and_then(|args| args.get(&arg.arg_num));
            let Some(shape) = fields.and_then(|f| f.shape).filter(|s| s.width > 0) else {
                joined.unshaped_arguments += 1;
                continue;
            };
            joined.records.push(CallRecord {
                entry: call.entry,
                exit: call.exit,
                pid: entry.pid,
                tid: entry.tid,
                hash: entry.hash.clone(),
                symbol: symbol.clone(),
                return_type: callable.return_type.clone(),
                arg_num: arg.arg_num,
                arg_type: arg.arg_type.clone(),
                width: shape.width,
                height: shape.height,
                pointer: fields.and_then(|f| f.pointer),
                delta: call.delta,
            });
        }
    }

    joined.records.sort_by_key(|r| (r.entry, r.arg_num));
    if joined.unresolved_calls > 0 {
        tracing::debug!(
            "{} calls reference hashes missing from the manifest",
            joined.unresolved_calls
        );
    }
    joined
}
