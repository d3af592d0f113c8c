//! Raw trace events as produced by an event source
//!
//! A [`RawEvent`] carries the event name, the capture clock values and every
//! field the trace attached to it, grouped by CTF scope. Events are immutable
//! once produced; all downstream views address them by their position in the
//! capture.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Field name -> value mapping for one scope of one event
pub type FieldMap = BTreeMap<String, Value>;

/// Named grouping of fields attached to a trace event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Instrumentation payload (argument shapes, pointers, mangled names)
    EventFields,
    /// Per-event context added by the tracer
    EventContext,
    /// Per-event stream context (thread/process ids, perf counters)
    StreamEventContext,
    /// Per-event stream header
    StreamEventHeader,
    /// Per-packet context (cpu id, discarded events, packet bounds)
    StreamPacketContext,
    /// Per-packet trace header
    TracePacketHeader,
}

impl Scope {
    /// All scopes, in CTF declaration order
    pub const ALL: [Scope; 6] = [
        Scope::EventFields,
        Scope::EventContext,
        Scope::StreamEventContext,
        Scope::StreamEventHeader,
        Scope::StreamPacketContext,
        Scope::TracePacketHeader,
    ];

    /// Scope name as it appears in trace exports
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::EventFields => "event_fields",
            Scope::EventContext => "event_context",
            Scope::StreamEventContext => "stream_event_context",
            Scope::StreamEventHeader => "stream_event_header",
            Scope::StreamPacketContext => "stream_packet_context",
            Scope::TracePacketHeader => "trace_packet_header",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event as captured by the tracer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event identifier, e.g. `f0cal:libfoo_i1a2b3c`
    pub name: String,
    /// Monotonic cycle counter at capture
    pub cycles: u64,
    /// Wall-clock timestamp (ns)
    pub timestamp: u64,
    /// Fields grouped by scope
    #[serde(default)]
    pub scopes: BTreeMap<Scope, FieldMap>,
}

impl RawEvent {
    /// Create an event with no fields attached
    pub fn new(name: impl Into<String>, cycles: u64, timestamp: u64) -> Self {
        Self {
            name: name.into(),
            cycles,
            timestamp,
            scopes: BTreeMap::new(),
        }
    }

    /// Attach a field to a scope (builder style)
    pub fn with_field(
        mut self,
        scope: Scope,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.scopes
            .entry(scope)
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    /// All fields of one scope, if the event carries that scope at all
    pub fn scope(&self, scope: Scope) -> Option<&FieldMap> {
        self.scopes.get(&scope)
    }

    /// A single field lookup within a scope
    pub fn field(&self, scope: Scope, key: &str) -> Option<&Value> {
        self.scopes.get(&scope).and_then(|fields| fields.get(key))
    }
}
