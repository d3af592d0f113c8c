//! Property-based tests for call reconstruction and aggregation
//!
//! Random well-nested call sequences per thread are interleaved on one
//! timeline and run through the pairer, the full analyzer and the
//! aggregator.

mod utils;

use callscope::config::AnalysisConfig;
use callscope::error::AnalysisError;
use callscope::name::Direction;
use callscope::pairer::pair_calls;
use callscope::source::MemorySource;
use callscope::stats::{aggregate, DEFAULT_LATENCY_SCALE};
use callscope::TraceAnalyzer;
use proptest::prelude::*;
use utils::*;

/// Per-thread call counts, push/pop choices, hash picks and interleaving picks
fn capture_strategy() -> impl Strategy<Value = (Vec<usize>, Vec<bool>, Vec<u8>, Vec<usize>)> {
    (
        prop::collection::vec(0usize..8, 1..5),
        prop::collection::vec(any::<bool>(), 1..32),
        prop::collection::vec(any::<u8>(), 1..16),
        prop::collection::vec(0usize..8, 1..64),
    )
}

fn build_stream(
    calls: &[usize],
    choices: &[bool],
    hashes: &[u8],
    picks: &[usize],
) -> Vec<(usize, (Direction, String))> {
    let threads: Vec<Vec<(Direction, String)>> =
        calls.iter().map(|&n| nested_sequence(n, choices, hashes)).collect();
    interleave(&threads, picks)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_well_nested_threads_pair_completely(
        (calls, choices, hashes, picks) in capture_strategy()
    ) {
        let stream = build_stream(&calls, &choices, &hashes, &picks);
        let events = threaded(&stream);
        let pairing = pair_calls(&events).unwrap();

        let expected: usize = calls.iter().sum();
        prop_assert_eq!(pairing.pairs.len(), expected);
        prop_assert_eq!(pairing.unmatched_entries, 0);

        for pair in &pairing.pairs {
            prop_assert!(pair.entry < pair.exit);
            let entry = &events[pair.entry];
            let exit = &events[pair.exit];
            prop_assert_eq!(entry.direction, Direction::Entry);
            prop_assert_eq!(exit.direction, Direction::Exit);
            prop_assert_eq!(&entry.hash, &exit.hash);
            prop_assert_eq!((entry.pid, entry.tid), (exit.pid, exit.tid));
        }
    }

    #[test]
    fn prop_every_event_used_once((calls, choices, hashes, picks) in capture_strategy()) {
        let stream = build_stream(&calls, &choices, &hashes, &picks);
        let events = threaded(&stream);
        let pairing = pair_calls(&events).unwrap();

        let mut used: Vec<usize> = pairing.pairs.iter().flat_map(|p| [p.entry, p.exit]).collect();
        used.sort_unstable();
        used.dedup();
        prop_assert_eq!(used.len(), events.len());
    }

    #[test]
    fn prop_foreign_exit_hash_is_fatal(
        (calls, choices, hashes, picks) in capture_strategy(),
        victim in any::<prop::sample::Index>(),
    ) {
        let stream = build_stream(&calls, &choices, &hashes, &picks);
        let mut events = threaded(&stream);
        let exits: Vec<usize> = events
            .iter()
            .filter(|e| e.direction == Direction::Exit)
            .map(|e| e.index)
            .collect();
        prop_assume!(!exits.is_empty());

        let target = exits[victim.index(exits.len())];
        events[target].hash = "zz".to_string();
        let err = pair_calls(&events).unwrap_err();
        let is_mismatch =
            matches!(err, AnalysisError::StackMismatch { index, .. } if index == target);
        prop_assert!(is_mismatch);
    }

    #[test]
    fn prop_trailing_entries_are_excluded(
        (calls, choices, hashes, picks) in capture_strategy(),
        extra in 1usize..4,
    ) {
        let mut stream = build_stream(&calls, &choices, &hashes, &picks);
        for _ in 0..extra {
            stream.push((0, (Direction::Entry, "h1".to_string())));
        }
        let events = threaded(&stream);
        let pairing = pair_calls(&events).unwrap();

        prop_assert_eq!(pairing.pairs.len(), calls.iter().sum::<usize>());
        prop_assert_eq!(pairing.unmatched_entries, extra);
        let trailing_start = events.len() - extra;
        prop_assert!(pairing.pairs.iter().all(|p| p.entry < trailing_start));
    }

    #[test]
    fn prop_monotonic_clock_gives_non_negative_deltas(
        (calls, choices, hashes, picks) in capture_strategy()
    ) {
        let stream = build_stream(&calls, &choices, &hashes, &picks);
        let source = MemorySource::new(raw_capture(&stream));
        let mut analyzer = TraceAnalyzer::new(
            source,
            sequence_manifest(),
            AnalysisConfig::default(),
        );

        let timed = analyzer.timed_pairs().unwrap();
        prop_assert_eq!(timed.len(), calls.iter().sum::<usize>());
        prop_assert!(timed.iter().all(|t| t.delta >= 0));
        prop_assert_eq!(analyzer.diagnostics().unwrap().negative_deltas, 0);
    }

    #[test]
    fn prop_join_is_idempotent((calls, choices, hashes, picks) in capture_strategy()) {
        let stream = build_stream(&calls, &choices, &hashes, &picks);
        let events = raw_capture(&stream);

        let mut first = TraceAnalyzer::new(
            MemorySource::new(events.clone()),
            sequence_manifest(),
            AnalysisConfig::default(),
        );
        let mut second = TraceAnalyzer::new(
            MemorySource::new(events),
            sequence_manifest(),
            AnalysisConfig::default(),
        );

        let a = first.call_records().unwrap();
        let again = first.call_records().unwrap();
        let b = second.call_records().unwrap();
        prop_assert_eq!(&a, &again);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.records.len(), calls.iter().sum::<usize>());
    }

    #[test]
    fn prop_aggregation_ignores_record_order(
        (calls, choices, hashes, picks) in capture_strategy(),
        seed in any::<u64>(),
    ) {
        let stream = build_stream(&calls, &choices, &hashes, &picks);
        let mut analyzer = TraceAnalyzer::new(
            MemorySource::new(raw_capture(&stream)),
            sequence_manifest(),
            AnalysisConfig::default(),
        );
        let records = analyzer.records().unwrap();

        // deterministic shuffle keyed by the seed
        let mut shuffled = records.clone();
        shuffled.sort_by_key(|r| {
            (r.entry as u64)
                .wrapping_mul(seed | 1)
                .rotate_left((seed % 63) as u32)
        });

        let expected = aggregate(&records, DEFAULT_LATENCY_SCALE);
        let actual = aggregate(&shuffled, DEFAULT_LATENCY_SCALE);
        prop_assert_eq!(expected, actual);
    }
}
