//! Metric name admission vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use flushmeter_core::{Collector, NameRules};

mod vector_loader;
use vector_loader::NameVector;

fn load(name: &str) -> Vec<NameVector> {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}

#[test]
fn name_vectors() {
    let rules = NameRules::default();
    for v in load("names.json") {
        let name = v.build();
        let res = rules.validate(&name);

        match &v.expect_error {
            Some(code) => {
                let e = res.expect_err("expected rejection");
                assert_eq!(e.code(), code.as_str(), "vector={}", v.description);
            }
            None => assert!(res.is_ok(), "vector={} got {:?}", v.description, res),
        }
    }
}

#[test]
fn rejected_vectors_never_reach_a_snapshot() {
    let collector = Collector::default();
    let vectors = load("names.json");
    for v in &vectors {
        let name = v.build();
        let _ = collector.increment(&name, 1);
        let _ = collector.timing(&name, 5.0);
    }

    let snap = collector.snapshot_and_clear();
    let rejected: Vec<String> = vectors
        .iter()
        .filter(|v| v.expect_error.is_some())
        .map(|v| v.build())
        .collect();
    for name in &rejected {
        assert!(snap.counter(name).is_none(), "{name} leaked into counters");
        assert!(snap.timing(name).is_none(), "{name} leaked into timings");
    }
    assert_eq!(collector.rejected_count(), 2 * rejected.len() as u64);
}
