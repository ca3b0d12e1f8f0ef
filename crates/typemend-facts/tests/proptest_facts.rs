//! Property tests for the fact store.

use proptest::prelude::*;
use typemend_facts::{is_converged, merge_facts, read_facts, write_facts, FactMap, SymbolFact};

fn arb_type_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("char".to_string()),
        Just("unsigned char".to_string()),
        Just("short".to_string()),
        Just("int".to_string()),
        Just("unsigned int".to_string()),
        Just("long".to_string()),
        Just("unsigned long".to_string()),
        Just("size_t".to_string()),
        Just("ptrdiff_t".to_string()),
        Just("long long".to_string()),
        Just("unsigned long long".to_string()),
    ]
}

fn arb_fact() -> impl Strategy<Value = SymbolFact> {
    (
        "[a-z]{1,6}",
        arb_type_name(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(name, type_name, is_field, is_typedef)| SymbolFact {
            usr: format!("c:@{}", name),
            type_name,
            is_field,
            is_typedef,
        })
}

proptest! {
    /// `read(write(facts))` reproduces the map exactly.
    #[test]
    fn prop_fact_file_round_trip(facts in proptest::collection::vec(arb_fact(), 0..24)) {
        let map = merge_facts(&facts);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rt.facts");

        write_facts(&path, &map).unwrap();
        let read_back = merge_facts(&read_facts(&path).unwrap());
        prop_assert_eq!(read_back, map);
    }

    /// A written fact file always converges against its own map.
    #[test]
    fn prop_write_then_converged(facts in proptest::collection::vec(arb_fact(), 0..24)) {
        let map = merge_facts(&facts);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("global.facts");

        prop_assert!(!is_converged(&path, &map) || map.is_empty());
        write_facts(&path, &map).unwrap();
        prop_assert!(is_converged(&path, &map));
    }

    /// Merging is idempotent: re-merging a merged map changes nothing.
    #[test]
    fn prop_merge_idempotent(facts in proptest::collection::vec(arb_fact(), 0..24)) {
        let once = merge_facts(&facts);
        let flat: Vec<SymbolFact> = once.values().cloned().collect();
        let twice = merge_facts(&flat);
        prop_assert_eq!(once, twice);
    }

    /// The merged type never gets narrower than any input for that USR.
    #[test]
    fn prop_merge_monotone_width(facts in proptest::collection::vec(arb_fact(), 1..24)) {
        let merged: FactMap = merge_facts(&facts);
        for fact in &facts {
            let resolved = &merged[&fact.usr];
            prop_assert!(
                typemend_facts::type_rank(&resolved.type_name)
                    >= typemend_facts::type_rank(&fact.type_name)
            );
            if fact.is_typedef {
                prop_assert!(resolved.is_typedef);
            }
        }
    }
}
