//! Trace analysis pipeline
//!
//! [`TraceAnalyzer`] exposes every derived table of one trace as a named,
//! lazily computed artifact:
//!
//! ```text
//! raw_events -> parsed_events -> thread_context -> threaded_events -> pairs
//!            -> timed_pairs -> call_records -> summary
//! ```
//!
//! with `argument_fields`, `packet_context`, `mangled_names` and `callables`
//! as side views. Each table is computed on first access, stored in the
//! analyzer's cache, and served from the cache afterwards. A table whose
//! construction fails is never stored.
//!
//! # Example
//!
//! ```no_run
//! use callscope::config::AnalysisConfig;
//! use callscope::pipeline::TraceAnalyzer;
//! use callscope::source::JsonLinesSource;
//!
//! let source = JsonLinesSource::from_path("trace.jsonl").unwrap();
//! let mut analyzer = TraceAnalyzer::from_config(source, AnalysisConfig::default()).unwrap();
//! for row in analyzer.summary().unwrap() {
//!     println!("{} {}x{}: {} calls", row.symbol, row.width, row.height, row.count);
//! }
//! ```

use crate::cache::{analysis_identity, CacheStats, CacheStore, ComputationCache, MemoryStore};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::event::RawEvent;
use crate::fields::{self, ArgumentMap, PacketContext, ThreadContext};
use crate::join::{self, CallRecord, Joined};
use crate::manifest::{CallableDescriptor, Manifest};
use crate::name::{parse_event_name, ParsedEventId};
use crate::pairer::{self, Pairing, ThreadedEvent};
use crate::source::EventSource;
use crate::stats::{self, SummaryRow};
use crate::timing::{self, TimedPair};
use fnv::{FnvHashMap, FnvHashSet};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cache keys of the derived tables
pub mod tables {
    pub const RAW_EVENTS: &str = "raw_events";
    pub const PARSED_EVENTS: &str = "parsed_events";
    pub const THREAD_CONTEXT: &str = "thread_context";
    pub const THREADED_EVENTS: &str = "threaded_events";
    pub const PAIRS: &str = "pairs";
    pub const TIMED_PAIRS: &str = "timed_pairs";
    pub const ARGUMENT_FIELDS: &str = "argument_fields";
    pub const PACKET_CONTEXT: &str = "packet_context";
    pub const MANGLED_NAMES: &str = "mangled_names";
    pub const CALLABLES: &str = "callables";
    pub const CALL_RECORDS: &str = "call_records";
    pub const SUMMARY: &str = "summary";

    /// Tables that depend on the trace alone
    pub const TRACE_ONLY: [&str; 3] = [RAW_EVENTS, PACKET_CONTEXT, MANGLED_NAMES];
}

/// An instrumentation event and its position in the capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedEventId {
    pub index: usize,
    pub id: ParsedEventId,
}

/// Decomposed event names plus what was filtered out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEvents {
    pub events: Vec<IndexedEventId>,
    pub total: usize,
    /// Names outside the instrumentation grammar
    pub unparsed: usize,
    /// Instrumentation events of other providers
    pub filtered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedThreadContext {
    pub index: usize,
    pub context: ThreadContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedArguments {
    pub index: usize,
    pub args: ArgumentMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedPacketContext {
    pub index: usize,
    pub context: PacketContext,
}

/// First occurrence of a mangled callable name in the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MangledName {
    pub index: usize,
    pub mangled_name: String,
    /// Demangled form, or the raw name when it is not an Itanium symbol
    pub demangled_name: String,
}

/// Packet accounting for one CPU stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuPackets {
    pub cpu_id: u64,
    /// Distinct packets seen
    pub packets: usize,
    /// Events the tracer reported as lost on this stream
    pub events_discarded: u64,
}

/// Counts of rows excluded along the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub events_total: usize,
    pub unparsed_names: usize,
    pub provider_filtered: usize,
    pub instrumentation_events: usize,
    pub completed_calls: usize,
    pub unmatched_entries: usize,
    pub negative_deltas: usize,
    pub unresolved_calls: usize,
    pub unshaped_arguments: usize,
    pub call_records: usize,
}

/// Lazily computed, cached view of one trace capture
pub struct TraceAnalyzer<E: EventSource, S: CacheStore = MemoryStore> {
    source: E,
    manifest: Manifest,
    config: AnalysisConfig,
    /// Digest of config and manifest, suffixed to dependent table keys
    scope: String,
    cache: ComputationCache<S>,
}

impl<E: EventSource> TraceAnalyzer<E, MemoryStore> {
    /// Analyzer with an in-memory cache
    pub fn new(source: E, manifest: Manifest, config: AnalysisConfig) -> Self {
        Self::with_store(source, manifest, config, MemoryStore::new())
    }

    /// Analyzer whose manifest is loaded from `config.manifest_glob`
    pub fn from_config(source: E, config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let manifest = Manifest::from_glob(&config.manifest_glob)?;
        Ok(Self::new(source, manifest, config))
    }
}

impl<E: EventSource, S: CacheStore> TraceAnalyzer<E, S> {
    /// Analyzer backed by a caller-provided cache store
    ///
    /// The store must belong to the same trace as `source`.
    pub fn with_store(source: E, manifest: Manifest, config: AnalysisConfig, store: S) -> Self {
        let scope = analysis_identity(&config, &manifest);
        tracing::debug!("Analysis identity {}", scope);
        Self {
            source,
            manifest,
            config,
            scope,
            cache: ComputationCache::new(store),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Store key of a table
    ///
    /// Tables in [`tables::TRACE_ONLY`] are keyed by name. All others carry
    /// the analysis identity, so a store shared by analyses with different
    /// config or manifest never serves another analysis' table.
    pub fn cache_key(&self, name: &str) -> String {
        if tables::TRACE_ONLY.iter().any(|t| *t == name) {
            name.to_string()
        } else {
            format!("{}-{}", name, self.scope)
        }
    }

    /// Whether a table has already been computed
    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains(&self.cache_key(name))
    }

    fn cached<T, F>(&mut self, name: &'static str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let key = self.cache_key(name);
        if let Some(table) = self.cache.load(&key)? {
            return Ok(table);
        }
        tracing::debug!("Computing table '{}'", key);
        let table = compute(self)?;
        self.cache.store(&key, &table)?;
        Ok(table)
    }

    /// Every event of the capture, in capture order
    pub fn raw_events(&mut self) -> Result<Vec<RawEvent>> {
        self.cached(tables::RAW_EVENTS, |this| {
            let events = this.source.open()?.collect::<Result<Vec<_>>>()?;
            tracing::info!("Read {} trace events", events.len());
            Ok(events)
        })
    }

    /// Instrumentation events with decomposed names
    pub fn parsed_events(&mut self) -> Result<ParsedEvents> {
        self.cached(tables::PARSED_EVENTS, |this| {
            let raw = this.raw_events()?;
            let provider = this.config.provider.clone();
            let mut parsed = ParsedEvents {
                total: raw.len(),
                ..ParsedEvents::default()
            };
            for (index, event) in raw.iter().enumerate() {
                match parse_event_name(&event.name) {
                    None => parsed.unparsed += 1,
                    Some(id) if provider.as_deref().is_some_and(|p| p != id.provider) => {
                        parsed.filtered += 1
                    }
                    Some(id) => parsed.events.push(IndexedEventId { index, id }),
                }
            }
            tracing::debug!(
                "{} instrumentation events, {} unparsed, {} from other providers",
                parsed.events.len(),
                parsed.unparsed,
                parsed.filtered
            );
            Ok(parsed)
        })
    }

    /// Thread identity and counter of every instrumentation event
    pub fn thread_context(&mut self) -> Result<Vec<IndexedThreadContext>> {
        self.cached(tables::THREAD_CONTEXT, |this| {
            let raw = this.raw_events()?;
            let parsed = this.parsed_events()?;
            let counter_field = this.config.counter_field.clone();
            parsed
                .events
                .iter()
                .map(|e| -> Result<IndexedThreadContext> {
                    Ok(IndexedThreadContext {
                        index: e.index,
                        context: fields::thread_context(&raw[e.index], e.index, &counter_field)?,
                    })
                })
                .collect()
        })
    }

    /// Instrumentation events tagged with (pid, tid), in capture order
    pub fn threaded_events(&mut self) -> Result<Vec<ThreadedEvent>> {
        self.cached(tables::THREADED_EVENTS, |this| {
            let parsed = this.parsed_events()?;
            let contexts = this.thread_context()?;
            Ok(parsed
                .events
                .into_iter()
                .zip(contexts)
                .map(|(event, ctx)| ThreadedEvent {
                    index: event.index,
                    pid: ctx.context.pid,
                    tid: ctx.context.tid,
                    direction: event.id.direction,
                    hash: event.id.hash,
                })
                .collect())
        })
    }

    /// Completed calls as (entry, exit) positions
    pub fn pairs(&mut self) -> Result<Pairing> {
        self.cached(tables::PAIRS, |this| {
            let events = this.threaded_events()?;
            let pairing = pairer::pair_calls(&events)?;
            tracing::info!(
                "Paired {} calls ({} in flight at capture end)",
                pairing.pairs.len(),
                pairing.unmatched_entries
            );
            Ok(pairing)
        })
    }

    /// Completed calls with counter deltas
    pub fn timed_pairs(&mut self) -> Result<Vec<TimedPair>> {
        self.cached(tables::TIMED_PAIRS, |this| {
            let pairing = this.pairs()?;
            let counters: FnvHashMap<usize, i64> = this
                .thread_context()?
                .into_iter()
                .map(|c| (c.index, c.context.counter))
                .collect();
            timing::compute_deltas(&pairing.pairs, &counters)
        })
    }

    /// Decoded positional arguments of instrumentation events that carry any
    pub fn argument_fields(&mut self) -> Result<Vec<IndexedArguments>> {
        self.cached(tables::ARGUMENT_FIELDS, |this| {
            let raw = this.raw_events()?;
            let parsed = this.parsed_events()?;
            let mut out = Vec::new();
            for e in &parsed.events {
                let args = fields::decode_arguments(&raw[e.index], e.index)?;
                if !args.is_empty() {
                    out.push(IndexedArguments { index: e.index, args });
                }
            }
            Ok(out)
        })
    }

    /// Packet context of every event that carries a complete one
    pub fn packet_context(&mut self) -> Result<Vec<IndexedPacketContext>> {
        self.cached(tables::PACKET_CONTEXT, |this| {
            let raw = this.raw_events()?;
            let mut out = Vec::new();
            for (index, event) in raw.iter().enumerate() {
                if let Some(context) = fields::packet_context(event, index)? {
                    out.push(IndexedPacketContext { index, context });
                }
            }
            Ok(out)
        })
    }

    /// Distinct mangled names in the payload, by first occurrence
    pub fn mangled_names(&mut self) -> Result<Vec<MangledName>> {
        self.cached(tables::MANGLED_NAMES, |this| {
            let raw = this.raw_events()?;
            let mut seen = FnvHashSet::default();
            let mut out = Vec::new();
            for (index, event) in raw.iter().enumerate() {
                if let Some(name) = fields::mangled_name(event) {
                    if seen.insert(name.to_string()) {
                        out.push(MangledName {
                            index,
                            mangled_name: name.to_string(),
                            demangled_name: fields::demangle(name),
                        });
                    }
                }
            }
            Ok(out)
        })
    }

    /// Manifest descriptors of call sites that appear in the trace
    pub fn callables(&mut self) -> Result<Vec<CallableDescriptor>> {
        self.cached(tables::CALLABLES, |this| {
            let parsed = this.parsed_events()?;
            let hashes: FnvHashSet<&str> =
                parsed.events.iter().map(|e| e.id.hash.as_str()).collect();
            Ok(this
                .manifest
                .descriptors()
                .iter()
                .filter(|d| hashes.contains(d.hash.as_str()))
                .cloned()
                .collect())
        })
    }

    /// Joined per-call, per-shaped-argument table
    pub fn call_records(&mut self) -> Result<Joined> {
        self.cached(tables::CALL_RECORDS, |this| {
            let timed = this.timed_pairs()?;
            let threaded = this.threaded_events()?;
            let arguments = this.argument_fields()?;

            let events: FnvHashMap<usize, &ThreadedEvent> =
                threaded.iter().map(|e| (e.index, e)).collect();
            let args: FnvHashMap<usize, &ArgumentMap> =
                arguments.iter().map(|a| (a.index, &a.args)).collect();
            let joined = join::join_records(&timed, &events, &args, &this.manifest);
            tracing::info!("Joined {} call records", joined.records.len());
            Ok(joined)
        })
    }

    /// Latency/throughput report per (symbol, shape)
    pub fn summary(&mut self) -> Result<Vec<SummaryRow>> {
        self.cached(tables::SUMMARY, |this| {
            let joined = this.call_records()?;
            Ok(stats::aggregate(&joined.records, this.config.latency_scale))
        })
    }

    /// Convenience accessor for the joined rows alone
    pub fn records(&mut self) -> Result<Vec<CallRecord>> {
        Ok(self.call_records()?.records)
    }

    /// Packet and loss accounting per CPU, ordered by CPU id
    pub fn packet_summary(&mut self) -> Result<Vec<CpuPackets>> {
        let packets = self.packet_context()?;
        let mut per_cpu: BTreeMap<u64, (FnvHashSet<u64>, u64)> = BTreeMap::new();
        for p in &packets {
            let entry = per_cpu.entry(p.context.cpu_id).or_default();
            entry.0.insert(p.context.packet_seq_num);
            // the discarded counter is cumulative per stream
            entry.1 = entry.1.max(p.context.events_discarded);
        }
        Ok(per_cpu
            .into_iter()
            .map(|(cpu_id, (seqs, events_discarded))| CpuPackets {
                cpu_id,
                packets: seqs.len(),
                events_discarded,
            })
            .collect())
    }

    /// Exclusion counts for every stage up to the joined table
    pub fn diagnostics(&mut self) -> Result<Diagnostics> {
        let parsed = self.parsed_events()?;
        let pairing = self.pairs()?;
        let timed = self.timed_pairs()?;
        let joined = self.call_records()?;
        Ok(Diagnostics {
            events_total: parsed.total,
            unparsed_names: parsed.unparsed,
            provider_filtered: parsed.filtered,
            instrumentation_events: parsed.events.len(),
            completed_calls: pairing.pairs.len(),
            unmatched_entries: pairing.unmatched_entries,
            negative_deltas: timed.iter().filter(|t| t.is_negative()).count(),
            unresolved_calls: joined.unresolved_calls,
            unshaped_arguments: joined.unshaped_arguments,
            call_records: joined.records.len(),
        })
    }

    /// Hand back the cache store, e.g. to reuse it for a later analyzer
    pub fn into_store(self) -> S {
        self.cache.into_store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Scope;
    use crate::manifest::ArgDescriptor;
    use crate::source::MemorySource;
    use serde_json::json;

    fn call_event(name: &str, tid: i64, clock: i64) -> RawEvent {
        RawEvent::new(name, clock as u64, clock as u64)
            .with_field(Scope::StreamEventContext, "vpid", 100)
            .with_field(Scope::StreamEventContext, "pthread_id", tid)
            .with_field(Scope::StreamEventContext, "perf_thread_cpu_clock", clock)
    }

    fn manifest() -> Manifest {
        Manifest::from_descriptors([CallableDescriptor {
            hash: "aa".to_string(),
            prefix: "resize".to_string(),
            suffix: String::new(),
            return_type: "void".to_string(),
            arg_list: vec![ArgDescriptor {
                arg_num: 0,
                arg_type: "Mat".to_string(),
            }],
        }])
        .unwrap()
    }

    fn analyzer(events: Vec<RawEvent>) -> TraceAnalyzer<MemorySource> {
        TraceAnalyzer::new(MemorySource::new(events), manifest(), AnalysisConfig::default())
    }

    #[test]
    fn test_summary_for_single_call() {
        let mut a = analyzer(vec![
            call_event("f0cal:cv_iaa", 1, 1_000_000)
                .with_field(Scope::EventFields, "v0_shape", json!([8, 4])),
            RawEvent::new("sched_switch", 0, 0),
            call_event("f0cal:cv_oaa", 1, 3_000_000),
        ]);
        let summary = a.summary().unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].symbol, "resize");
        assert_eq!(summary[0].count, 1);
        assert!((summary[0].latency_mean - 2.0).abs() < 1e-9);

        let diag = a.diagnostics().unwrap();
        assert_eq!(diag.events_total, 3);
        assert_eq!(diag.unparsed_names, 1);
        assert_eq!(diag.completed_calls, 1);
        assert_eq!(diag.call_records, 1);
    }

    #[test]
    fn test_tables_are_cached_by_name() {
        let mut a = analyzer(vec![
            call_event("f0cal:cv_iaa", 1, 0),
            call_event("f0cal:cv_oaa", 1, 5),
        ]);
        assert!(!a.is_cached(tables::PAIRS));
        let first = a.pairs().unwrap();
        assert!(a.is_cached(tables::PAIRS));
        assert!(a.is_cached(tables::RAW_EVENTS));
        let second = a.pairs().unwrap();
        assert_eq!(first, second);
        assert!(a.cache_stats().hits >= 1);
    }

    #[test]
    fn test_failed_table_is_not_cached() {
        let mut a = analyzer(vec![
            call_event("f0cal:cv_iaa", 1, 0),
            call_event("f0cal:cv_obb", 1, 5),
        ]);
        assert!(a.pairs().is_err());
        assert!(!a.is_cached(tables::PAIRS));
        assert!(a.summary().is_err());
        assert!(!a.is_cached(tables::SUMMARY));
    }

    #[test]
    fn test_provider_filter() {
        let mut config = AnalysisConfig::default();
        config.provider = Some("f0cal".to_string());
        let mut a = TraceAnalyzer::new(
            MemorySource::new(vec![
                call_event("other:cv_iaa", 1, 0),
                call_event("f0cal:cv_iaa", 1, 0),
            ]),
            manifest(),
            config,
        );
        let parsed = a.parsed_events().unwrap();
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.events[0].index, 1);
        assert_eq!(parsed.filtered, 1);
    }

    #[test]
    fn test_missing_thread_context_is_fatal() {
        let mut a = analyzer(vec![RawEvent::new("f0cal:cv_iaa", 0, 0)]);
        assert!(matches!(
            a.threaded_events(),
            Err(crate::error::AnalysisError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_mangled_names_and_packets() {
        let packet = |e: RawEvent, cpu: u64, seq: u64, lost: u64| {
            e.with_field(Scope::StreamPacketContext, "content_size", 1)
                .with_field(Scope::StreamPacketContext, "cpu_id", cpu)
                .with_field(Scope::StreamPacketContext, "events_discarded", lost)
                .with_field(Scope::StreamPacketContext, "packet_seq_num", seq)
                .with_field(Scope::StreamPacketContext, "packet_size", 1)
                .with_field(Scope::StreamPacketContext, "timestamp_begin", 0)
                .with_field(Scope::StreamPacketContext, "timestamp_end", 1)
        };
        let mut a = analyzer(vec![
            packet(call_event("f0cal:cv_iaa", 1, 0), 0, 1, 0)
                .with_field(Scope::EventFields, "mangled_name_field", "_ZN2cv6resizeE"),
            packet(call_event("f0cal:cv_oaa", 1, 5), 0, 2, 3)
                .with_field(Scope::EventFields, "mangled_name_field", "_ZN2cv6resizeE"),
            packet(RawEvent::new("noise", 0, 0), 1, 1, 0),
            RawEvent::new("noise", 0, 0),
        ]);

        let names = a.mangled_names().unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].index, 0);
        assert_eq!(names[0].demangled_name, "cv::resize");

        let cpus = a.packet_summary().unwrap();
        assert_eq!(cpus.len(), 2);
        assert_eq!(cpus[0], CpuPackets { cpu_id: 0, packets: 2, events_discarded: 3 });
        assert_eq!(cpus[1].packets, 1);
    }

    #[test]
    fn test_callables_only_lists_traced_hashes() {
        let mut a = analyzer(vec![call_event("f0cal:cv_izz", 1, 0)]);
        assert!(a.callables().unwrap().is_empty());
        let mut b = analyzer(vec![call_event("f0cal:cv_iaa", 1, 0)]);
        assert_eq!(b.callables().unwrap().len(), 1);
    }
}
