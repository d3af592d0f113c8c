//! Event sources
//!
//! An event source yields raw events in capture order. Sources are
//! single-pass: re-reading a trace means calling [`EventSource::open`]
//! again, which hands back a fresh iterator.

use crate::error::{AnalysisError, Result};
use crate::event::RawEvent;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Iterator over raw events of one pass through a trace
pub type EventIter<'a> = Box<dyn Iterator<Item = Result<RawEvent>> + 'a>;

/// Producer of raw trace events in monotonic capture order
pub trait EventSource {
    /// Open a fresh pass over the trace
    fn open(&self) -> Result<EventIter<'_>>;

    /// Number of events in the trace (full pass by default)
    fn count(&self) -> Result<usize> {
        let mut count = 0;
        for event in self.open()? {
            event?;
            count += 1;
        }
        Ok(count)
    }
}

/// Trace export with one JSON-encoded [`RawEvent`] per line
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    /// Create a source for an existing export file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AnalysisError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("trace export not found: {}", path.display()),
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Path of the export file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSource for JsonLinesSource {
    fn open(&self) -> Result<EventIter<'_>> {
        let reader = BufReader::new(File::open(&self.path)?);
        tracing::debug!("Opened trace export {}", self.path.display());

        let iter = reader
            .lines()
            .enumerate()
            .filter_map(|(line_no, line)| match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(serde_json::from_str::<RawEvent>(&line).map_err(|e| {
                    AnalysisError::InvalidSource {
                        line: line_no + 1,
                        reason: e.to_string(),
                    }
                })),
                Err(e) => Some(Err(AnalysisError::Io(e))),
            });
        Ok(Box::new(iter))
    }
}

/// Events held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    events: Vec<RawEvent>,
}

impl MemorySource {
    pub fn new(events: Vec<RawEvent>) -> Self {
        Self { events }
    }
}

impl EventSource for MemorySource {
    fn open(&self) -> Result<EventIter<'_>> {
        Ok(Box::new(self.events.iter().cloned().map(Ok)))
    }

    fn count(&self) -> Result<usize> {
        Ok(self.events.len())
    }
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn open(&self) -> Result<EventIter<'_>> {
        (**self).open()
    }

    fn count(&self) -> Result<usize> {
        (**self).count()
    }
}
