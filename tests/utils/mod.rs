// Shared trace builders for integration tests
//
// Synthetic captures are built as RawEvents the way a trace export carries
// them: instrumentation event names, per-thread stream context and
// positional argument payload fields.

#![allow(dead_code)]

use callscope::event::{RawEvent, Scope};
use callscope::manifest::{ArgDescriptor, CallableDescriptor, Manifest};
use callscope::name::Direction;
use callscope::pairer::ThreadedEvent;
use serde_json::json;
use std::path::{Path, PathBuf};

pub const PROVIDER: &str = "f0cal";
pub const PACKAGE: &str = "opencv";
pub const PID: i64 = 4242;

/// Instrumentation event name for a call-site hash
pub fn event_name(direction: Direction, hash: &str) -> String {
    let marker = match direction {
        Direction::Entry => 'i',
        Direction::Exit => 'o',
    };
    format!("{}:{}_{}{}", PROVIDER, PACKAGE, marker, hash)
}

/// Instrumentation event carrying thread context and a cpu clock reading
pub fn call_event(direction: Direction, hash: &str, tid: i64, clock: i64) -> RawEvent {
    RawEvent::new(event_name(direction, hash), clock as u64, clock as u64)
        .with_field(Scope::StreamEventContext, "vpid", PID)
        .with_field(Scope::StreamEventContext, "pthread_id", tid)
        .with_field(Scope::StreamEventContext, "perf_thread_cpu_clock", clock)
}

/// Attach a `v<N>_shape` payload field
pub fn with_shape(event: RawEvent, arg: u32, width: u64, height: u64) -> RawEvent {
    event.with_field(Scope::EventFields, format!("v{}_shape", arg), json!([width, height]))
}

/// Attach a `v<N>_ptr` payload field as a hex string
pub fn with_ptr(event: RawEvent, arg: u32, ptr: u64) -> RawEvent {
    event.with_field(Scope::EventFields, format!("v{}_ptr", arg), format!("{:#x}", ptr))
}

/// Event that is not instrumentation (kernel or runtime noise)
pub fn noise_event(name: &str, clock: u64) -> RawEvent {
    RawEvent::new(name, clock, clock)
}

/// Descriptor with one `cv::Mat` argument at position 0
pub fn shaped_descriptor(hash: &str, prefix: &str, suffix: &str) -> CallableDescriptor {
    CallableDescriptor {
        hash: hash.to_string(),
        prefix: prefix.to_string(),
        suffix: suffix.to_string(),
        return_type: "void".to_string(),
        arg_list: vec![ArgDescriptor {
            arg_num: 0,
            arg_type: "cv::Mat".to_string(),
        }],
    }
}

pub fn manifest_of(descriptors: Vec<CallableDescriptor>) -> Manifest {
    Manifest::from_descriptors(descriptors).unwrap()
}

/// Write a manifest JSON file and return its path
pub fn write_manifest(dir: &Path, name: &str, descriptors: &[CallableDescriptor]) -> PathBuf {
    let path = dir.join(name);
    let body = json!({ "shims": descriptors });
    std::fs::write(&path, serde_json::to_string_pretty(&body).unwrap()).unwrap();
    path
}

/// Write events as a JSON-lines trace export and return its path
pub fn write_trace(dir: &Path, name: &str, events: &[RawEvent]) -> PathBuf {
    let path = dir.join(name);
    let mut body = String::new();
    for event in events {
        body.push_str(&serde_json::to_string(event).unwrap());
        body.push('\n');
    }
    std::fs::write(&path, body).unwrap();
    path
}

/// Three threads, each running `aa` (delta 100, 640x480) around a nested
/// `bb` (delta 50, 320x240), interleaved on one timeline
pub fn nested_capture() -> Vec<RawEvent> {
    let mut events = Vec::new();
    let starts = [(1, 1_000), (2, 1_010), (3, 1_020)];

    for (tid, t0) in starts {
        let outer = with_shape(call_event(Direction::Entry, "aa", tid, t0), 0, 640, 480);
        events.push((t0, with_ptr(outer, 0, 0x7f00 + tid as u64)));
        let inner = call_event(Direction::Entry, "bb", tid, t0 + 20);
        events.push((t0 + 20, with_shape(inner, 0, 320, 240)));
        events.push((t0 + 70, call_event(Direction::Exit, "bb", tid, t0 + 70)));
        events.push((t0 + 100, call_event(Direction::Exit, "aa", tid, t0 + 100)));
    }
    events.sort_by_key(|(clock, _)| *clock);

    let mut out: Vec<RawEvent> = events.into_iter().map(|(_, e)| e).collect();
    out.insert(0, noise_event("sched_switch", 990));
    out
}

/// Manifest resolving both call sites of [`nested_capture`]
pub fn nested_manifest() -> Vec<CallableDescriptor> {
    vec![
        shaped_descriptor("aa", "cv::resize", ""),
        shaped_descriptor("bb", "cv::cvtColor", ""),
    ]
}

/// A well-nested entry/exit sequence of `calls` calls on one thread
///
/// `choices` steers push vs. pop when both are possible; `hashes` picks a
/// call-site hash for each call (cycled).
pub fn nested_sequence(calls: usize, choices: &[bool], hashes: &[u8]) -> Vec<(Direction, String)> {
    let mut out = Vec::with_capacity(calls * 2);
    let mut stack: Vec<String> = Vec::new();
    let mut opened = 0;
    let mut step = 0;
    while opened < calls || !stack.is_empty() {
        let push = match (opened < calls, !stack.is_empty()) {
            (true, true) => choices.get(step % choices.len().max(1)).copied().unwrap_or(true),
            (can_push, _) => can_push,
        };
        if push {
            let h = hashes.get(opened % hashes.len().max(1)).copied().unwrap_or(0);
            let hash = format!("h{}", h % 4);
            out.push((Direction::Entry, hash.clone()));
            stack.push(hash);
            opened += 1;
        } else if let Some(hash) = stack.pop() {
            out.push((Direction::Exit, hash));
        }
        step += 1;
    }
    out
}

/// Merge per-thread sequences, picking the next thread from `picks`
///
/// Order within each thread is preserved. Yields (thread, item).
pub fn interleave<T: Clone>(threads: &[Vec<T>], picks: &[usize]) -> Vec<(usize, T)> {
    let mut cursors = vec![0usize; threads.len()];
    let total: usize = threads.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);
    let mut step = 0;
    while out.len() < total {
        let mut t = picks.get(step % picks.len().max(1)).copied().unwrap_or(0) % threads.len();
        while cursors[t] >= threads[t].len() {
            t = (t + 1) % threads.len();
        }
        out.push((t, threads[t][cursors[t]].clone()));
        cursors[t] += 1;
        step += 1;
    }
    out
}

/// Pairer input for an interleaved stream
pub fn threaded(stream: &[(usize, (Direction, String))]) -> Vec<ThreadedEvent> {
    stream
        .iter()
        .enumerate()
        .map(|(index, (tid, (direction, hash)))| ThreadedEvent {
            index,
            pid: PID,
            tid: *tid as i64,
            direction: *direction,
            hash: hash.clone(),
        })
        .collect()
}

/// Raw capture for an interleaved stream with a shared monotonic clock
///
/// Every entry carries a 64x64 shape at position 0.
pub fn raw_capture(stream: &[(usize, (Direction, String))]) -> Vec<RawEvent> {
    stream
        .iter()
        .enumerate()
        .map(|(i, (tid, (direction, hash)))| {
            let clock = 1_000 + 10 * i as i64;
            let event = call_event(*direction, hash, *tid as i64, clock);
            match direction {
                Direction::Entry => with_shape(event, 0, 64, 64),
                Direction::Exit => event,
            }
        })
        .collect()
}

/// Manifest resolving every hash produced by [`nested_sequence`]
pub fn sequence_manifest() -> Manifest {
    manifest_of(
        (0..4)
            .map(|h| shaped_descriptor(&format!("h{}", h), &format!("fn{}", h), ""))
            .collect(),
    )
}
