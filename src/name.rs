//! Event name decomposition
//!
//! Instrumentation events are named `<provider>:<package>_<i|o><hash>`.
//! Anything else in the trace is noise from other tracepoints and is
//! filtered out, not reported.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Whether an event marks the start or the end of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    fn from_char(c: &str) -> Option<Self> {
        match c {
            "i" => Some(Direction::Entry),
            "o" => Some(Direction::Exit),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Entry => f.write_str("entry"),
            Direction::Exit => f.write_str("exit"),
        }
    }
}

/// Components of an instrumentation event name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedEventId {
    pub provider: String,
    pub package: String,
    pub direction: Direction,
    pub hash: String,
}

fn event_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<provider>\w*):(?P<pkg>\w*)_(?P<io>[io])(?P<hash>\w*)$")
            .expect("event name pattern is valid")
    })
}

/// Decompose an event name, or `None` if it is not an instrumentation event
///
/// The package part may itself contain underscores; the direction marker is
/// the last `_i`/`_o` that leaves a word-character hash behind it.
pub fn parse_event_name(name: &str) -> Option<ParsedEventId> {
    let caps = event_name_regex().captures(name)?;
    Some(ParsedEventId {
        provider: caps["provider"].to_string(),
        package: caps["pkg"].to_string(),
        direction: Direction::from_char(&caps["io"])?,
        hash: caps["hash"].to_string(),
    })
}
