//! Per-scope field extraction
//!
//! Each view pulls a typed record out of one scope of a raw event. A view
//! either resolves completely for an event or the event is left out of it;
//! nothing is zero-filled. Views whose columns are required for pairing
//! turn a missing field into [`AnalysisError::MissingColumn`].

use crate::error::{AnalysisError, Result};
use crate::event::{RawEvent, Scope};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Process id field in the stream event context
pub const PID_FIELD: &str = "vpid";
/// Thread id field in the stream event context
pub const TID_FIELD: &str = "pthread_id";
/// Payload field carrying the mangled callable name
pub const MANGLED_NAME_FIELD: &str = "mangled_name_field";

/// Fields every packet context view row must carry
pub const PACKET_FIELDS: [&str; 7] = [
    "content_size",
    "cpu_id",
    "events_discarded",
    "packet_seq_num",
    "packet_size",
    "timestamp_begin",
    "timestamp_end",
];

/// Thread/process identity and perf counter of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadContext {
    pub pid: i64,
    pub tid: i64,
    /// Value of the configured per-thread counter
    pub counter: i64,
}

/// Packet bounds and loss accounting attached to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketContext {
    pub content_size: u64,
    pub cpu_id: u64,
    pub events_discarded: u64,
    pub packet_seq_num: u64,
    pub packet_size: u64,
    pub timestamp_begin: u64,
    pub timestamp_end: u64,
}

/// Width/height pair decoded from an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub width: u64,
    pub height: u64,
}

/// One decoded payload attribute of a positional argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgField {
    Shape(Shape),
    Pointer(u64),
}

/// Everything decoded for one argument position of one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedArgument {
    pub shape: Option<Shape>,
    pub pointer: Option<u64>,
}

impl DecodedArgument {
    fn absorb(&mut self, field: ArgField) {
        match field {
            ArgField::Shape(shape) => self.shape = Some(shape),
            ArgField::Pointer(ptr) => self.pointer = Some(ptr),
        }
    }
}

/// Argument position -> decoded attributes for one event
pub type ArgumentMap = BTreeMap<u32, DecodedArgument>;

fn arg_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^v(\d+)_(shape|ptr)$").expect("argument key pattern is valid")
    })
}

fn invalid(
    table: &'static str,
    column: &str,
    index: usize,
    reason: impl Into<String>,
) -> AnalysisError {
    AnalysisError::InvalidField {
        table,
        column: column.to_string(),
        index,
        reason: reason.into(),
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        // Integral floats only; anything outside i64 would saturate
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    as_i64(value).and_then(|v| u64::try_from(v).ok()).or_else(|| value.as_u64())
}

fn require_i64(event: &RawEvent, index: usize, field: &str) -> Result<i64> {
    let value = event
        .field(Scope::StreamEventContext, field)
        .ok_or_else(|| AnalysisError::MissingColumn {
            table: "thread_context",
            column: field.to_string(),
            index,
        })?;
    as_i64(value).ok_or_else(|| {
        let reason = format!("expected integer, got {}", value);
        invalid("thread_context", field, index, reason)
    })
}

/// Thread context of an instrumentation event
///
/// Pairing cannot proceed without it, so a missing field is fatal.
pub fn thread_context(
    event: &RawEvent,
    index: usize,
    counter_field: &str,
) -> Result<ThreadContext> {
    Ok(ThreadContext {
        pid: require_i64(event, index, PID_FIELD)?,
        tid: require_i64(event, index, TID_FIELD)?,
        counter: require_i64(event, index, counter_field)?,
    })
}

/// Packet context of an event, or `None` when any packet field is absent
pub fn packet_context(event: &RawEvent, index: usize) -> Result<Option<PacketContext>> {
    let Some(fields) = event.scope(Scope::StreamPacketContext) else {
        return Ok(None);
    };

    let mut values = [0u64; PACKET_FIELDS.len()];
    for (slot, name) in values.iter_mut().zip(PACKET_FIELDS) {
        let Some(value) = fields.get(name) else {
            return Ok(None);
        };
        *slot = as_u64(value).ok_or_else(|| {
            let reason = format!("expected unsigned integer, got {}", value);
            invalid("packet_context", name, index, reason)
        })?;
    }

    let [
        content_size,
        cpu_id,
        events_discarded,
        packet_seq_num,
        packet_size,
        timestamp_begin,
        timestamp_end,
    ] = values;
    Ok(Some(PacketContext {
        content_size,
        cpu_id,
        events_discarded,
        packet_seq_num,
        packet_size,
        timestamp_begin,
        timestamp_end,
    }))
}

fn decode_shape(value: &Value, column: &str, index: usize) -> Result<Shape> {
    let fail = |reason: String| invalid("argument_fields", column, index, reason);
    let dims = value
        .as_array()
        .filter(|dims| dims.len() >= 2)
        .ok_or_else(|| fail(format!("expected [width, height], got {}", value)))?;
    let width = as_u64(&dims[0]).ok_or_else(|| fail("width is not an unsigned integer".into()))?;
    let height = as_u64(&dims[1]).ok_or_else(|| fail("height is not an unsigned integer".into()))?;
    Ok(Shape { width, height })
}

fn decode_pointer(value: &Value, column: &str, index: usize) -> Result<u64> {
    let parsed = match value {
        Value::String(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        other => as_u64(other),
    };
    parsed.ok_or_else(|| {
        let reason = format!("expected pointer, got {}", value);
        invalid("argument_fields", column, index, reason)
    })
}

/// Decode every `v<N>_shape` / `v<N>_ptr` payload field of an event
///
/// Null values are treated as absent. Returns an empty map for events that
/// carry no positional argument fields.
pub fn decode_arguments(event: &RawEvent, index: usize) -> Result<ArgumentMap> {
    let mut args = ArgumentMap::new();
    let Some(payload) = event.scope(Scope::EventFields) else {
        return Ok(args);
    };

    for (key, value) in payload {
        if value.is_null() {
            continue;
        }
        let Some(caps) = arg_key_regex().captures(key) else {
            continue;
        };
        let position: u32 = caps[1]
            .parse()
            .map_err(|_| invalid("argument_fields", key, index, "argument position out of range"))?;
        let field = match &caps[2] {
            "shape" => ArgField::Shape(decode_shape(value, key, index)?),
            _ => ArgField::Pointer(decode_pointer(value, key, index)?),
        };
        args.entry(position).or_default().absorb(field);
    }
    Ok(args)
}

/// Mangled callable name carried in the payload, if any
pub fn mangled_name(event: &RawEvent) -> Option<&str> {
    event
        .field(Scope::EventFields, MANGLED_NAME_FIELD)
        .and_then(Value::as_str)
}

/// Demangle an Itanium C++ symbol, keeping the raw text when it does not parse
pub fn demangle(mangled: &str) -> String {
    cpp_demangle::Symbol::new(mangled)
        .ok()
        .and_then(|symbol| symbol.demangle(&cpp_demangle::DemangleOptions::default()).ok())
        .unwrap_or_else(|| mangled.to_string())
}
