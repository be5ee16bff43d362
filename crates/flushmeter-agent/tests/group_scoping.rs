#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use flushmeter_agent::{Instrument, LogTransport, Tracker, TrackerSettings};

fn tracker() -> Tracker {
    Tracker::new(TrackerSettings::default(), Arc::new(LogTransport))
}

#[test]
fn nested_groups_prefix_names_and_unwind_on_exit() {
    let t = tracker();
    t.group("a", |a| {
        a.group("b", |b| b.increment("c"));
        a.increment("d");
    });
    t.increment("c");

    let snap = t.collector().snapshot_and_clear();
    assert_eq!(snap.counter("a.b.c"), Some(1));
    assert_eq!(snap.counter("a.d"), Some(1));
    assert_eq!(snap.counter("c"), Some(1));
    assert_eq!(snap.len(), 3);
}

#[test]
fn group_returns_body_value_and_propagates_errors() {
    let t = tracker();

    let value = t.group("ok", |g| {
        g.timing("time", 3.0);
        42
    });
    assert_eq!(value, 42);

    let result: Result<(), String> = t.group("failing", |g| {
        g.increment("attempt");
        Err("boom".to_string())
    });
    assert_eq!(result, Err("boom".to_string()));

    // The failing frame is gone.
    t.group("after", |g| assert_eq!(g.resolve("x"), "after.x"));

    let snap = t.collector().snapshot_and_clear();
    assert_eq!(snap.counter("failing.attempt"), Some(1));
    assert_eq!(snap.timing("ok.time").map(|s| s.count), Some(1));
}

#[test]
fn panic_inside_group_unwinds_the_frame() {
    let t = tracker();

    let caught = catch_unwind(AssertUnwindSafe(|| {
        t.group("outer", |g| {
            g.group("inner", |i| {
                i.increment("before");
                panic!("handler blew up");
            })
        })
    }));
    assert!(caught.is_err());

    t.increment("top");
    t.group("fresh", |g| g.increment("x"));

    let snap = t.collector().snapshot_and_clear();
    assert_eq!(snap.counter("outer.inner.before"), Some(1));
    assert_eq!(snap.counter("top"), Some(1));
    assert_eq!(snap.counter("fresh.x"), Some(1));
}

fn record_request(sink: &mut impl Instrument, status: u16) {
    sink.group("status", |s| {
        s.increment(&status.to_string());
        s.timing(&format!("{status}.time"), 12.5);
    });
}

#[test]
fn tracker_and_group_share_the_capability_set() {
    let mut t = tracker();
    record_request(&mut t, 200);
    t.clone().group("rack.request", |g| record_request(g, 500));

    let snap = t.collector().snapshot_and_clear();
    assert_eq!(snap.counter("status.200"), Some(1));
    assert_eq!(snap.counter("rack.request.status.500"), Some(1));
    assert_eq!(snap.timing("rack.request.status.500.time").map(|s| s.sum), Some(12.5));
}

#[test]
fn invalid_names_inside_groups_never_fail_the_caller() {
    let t = tracker();
    t.group("bad name", |g| g.increment("x"));
    t.group("ok", |g| {
        g.increment("");
        g.increment_by("neg", -1);
        g.timing("nan", f64::NAN);
        g.measure("inf", f64::INFINITY);
    });
    t.increment("flushmeter.internal");

    assert!(t.collector().is_empty());
    assert_eq!(t.collector().rejected_count(), 6);
    assert_eq!(t.diagnostics().rejected_observations, 6);
}

#[test]
fn groups_on_separate_threads_do_not_leak_namespaces() {
    let t = tracker();
    std::thread::scope(|s| {
        for worker in 0..8 {
            let t = t.clone();
            s.spawn(move || {
                for _ in 0..100 {
                    t.group(&format!("w{worker}"), |g| g.increment("hits"));
                    t.increment("plain");
                }
            });
        }
    });

    let snap = t.collector().snapshot_and_clear();
    assert_eq!(snap.counter("plain"), Some(800));
    for worker in 0..8 {
        assert_eq!(snap.counter(&format!("w{worker}.hits")), Some(100));
    }
}
