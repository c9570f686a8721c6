//! Tests for parallel map, filter and flat_map stages.

use anyhow::anyhow;
use ironpipe::testing::*;
use ironpipe::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Map that sleeps longer for smaller inputs, so completion order is reversed.
fn uneven_cost() -> MapFn {
    MapFn::new("uneven_cost", |e: Element| {
        let v = e.as_i64().ok_or_else(|| anyhow!("int expected"))?;
        thread::sleep(Duration::from_millis(((10 - v.rem_euclid(10)) * 2) as u64));
        Ok(Element::Int(v * 10))
    })
}

#[test]
fn ordered_map_keeps_input_order() -> anyhow::Result<()> {
    let opts = ParallelOptions::ordered().with_workers(4);
    let out = from_range(0..20).map_parallel(uneven_cost(), opts)?.collect()?;
    assert_elements_equal(&out, &int_values((0..20).map(|v| v * 10)));
    Ok(())
}

#[test]
fn unordered_map_matches_sequential_multiset() -> anyhow::Result<()> {
    let sequential = from_range(0..50).map(square()).collect()?;
    for workers in [1, 2, 7] {
        for chunk in [1, 3, 64] {
            let opts = ParallelOptions::unordered()
                .with_workers(workers)
                .with_chunk_size(chunk);
            let out = from_range(0..50).map_parallel(square(), opts)?.collect()?;
            assert_same_multiset(&out, &sequential);
        }
    }
    Ok(())
}

#[test]
fn unordered_filter_keeps_the_passing_elements() -> anyhow::Result<()> {
    let opts = ParallelOptions::unordered().with_workers(3);
    let out = from_range(0..10).filter_parallel(is_even(), opts)?.collect()?;
    assert_same_multiset(&out, &int_values([0, 2, 4, 6, 8]));
    Ok(())
}

#[test]
fn ordered_filter_preserves_identity_and_order() -> anyhow::Result<()> {
    let words = from_vec(vec!["apple", "kiwi", "banana", "fig", "cherry"]);
    let long = PredicateFn::new("long", |e: &Element| Ok(e.as_str().is_some_and(|s| s.len() > 4)));
    let out = words
        .filter_parallel(long, ParallelOptions::ordered().with_workers(2))?
        .collect()?;
    let expected: Vec<Element> = ["apple", "banana", "cherry"].into_iter().map(Element::from).collect();
    assert_elements_equal(&out, &expected);
    Ok(())
}

#[test]
fn flat_map_keeps_per_element_output_together() -> anyhow::Result<()> {
    let opts = ParallelOptions::ordered().with_workers(4).with_chunk_size(2);
    let out = from_range(0..6).flat_map_parallel(duplicate(), opts)?.collect()?;
    assert_elements_equal(&out, &int_values([0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5]));

    let unordered = from_range(0..6)
        .flat_map_parallel(duplicate(), ParallelOptions::unordered().with_workers(4))?
        .collect()?;
    assert_same_multiset(&unordered, &out);
    Ok(())
}

#[test]
fn default_options_use_every_cpu_in_order() -> anyhow::Result<()> {
    let opts = ParallelOptions::default();
    assert_eq!(opts.order, Order::Ordered);
    assert_eq!(opts.chunk_size, 1);
    assert!(opts.resolved_workers() >= 1);
    let out = from_range(0..30).map_parallel(double(), opts)?.collect()?;
    assert_elements_equal(&out, &int_values((0..30).map(|v| v * 2)));
    Ok(())
}

#[test]
fn ordered_failure_delivers_earlier_results_first() -> anyhow::Result<()> {
    let opts = ParallelOptions::ordered().with_workers(4);
    let p = from_range(0..20).map_parallel(fail_on(12), opts)?;

    let mut ok = Vec::new();
    let mut failure = None;
    for item in p.iter()? {
        match item {
            Ok(e) => ok.push(e),
            Err(e) => failure = Some(e),
        }
    }
    assert_elements_equal(&ok, &ints(0..12));
    match failure {
        Some(Error::WorkerFailure { step, reason }) => {
            assert_eq!(step, "parallel_map(fail_on_12)");
            assert!(reason.contains("refusing to process 12"), "{reason}");
        }
        other => panic!("expected a worker failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn unordered_failure_aborts_the_stage() -> anyhow::Result<()> {
    let opts = ParallelOptions::unordered().with_workers(3);
    let result = from_range(0..100).map_parallel(fail_on(40), opts)?.collect();
    assert!(matches!(result, Err(Error::WorkerFailure { .. })));
    Ok(())
}

#[test]
fn worker_panics_become_worker_failures() -> anyhow::Result<()> {
    let boom = MapFn::new("boom", |e: Element| {
        if e.as_i64() == Some(3) {
            panic!("boom at 3");
        }
        Ok(e)
    });
    let result = from_range(0..8)
        .map_parallel(boom, ParallelOptions::ordered().with_workers(2))?
        .collect();
    match result {
        Err(Error::WorkerFailure { reason, .. }) => assert!(reason.contains("boom at 3"), "{reason}"),
        other => panic!("expected a worker failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn upstream_errors_pass_through_in_position() -> anyhow::Result<()> {
    let p = from_range(0..10)
        .map(fail_on(5))
        .map_parallel(double(), ParallelOptions::ordered().with_workers(2).with_chunk_size(2))?;
    let items: Vec<_> = p.iter()?.collect();
    let ok: Vec<Element> = items.iter().filter_map(|r| r.as_ref().ok().cloned()).collect();
    assert_elements_equal(&ok, &int_values([0, 2, 4, 6, 8]));
    assert!(matches!(items.last(), Some(Err(Error::ElementCompute { .. }))));
    Ok(())
}

#[test]
fn the_stage_never_reads_its_whole_input_ahead() -> anyhow::Result<()> {
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pulled);
    let tap = MapFn::new("tap", move |e: Element| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(e)
    });

    let opts = ParallelOptions::ordered().with_workers(2).with_chunk_size(4);
    let p = from_range(0..10_000).map(tap).map_parallel(double(), opts)?;
    let out = p.head(1)?;
    assert_elements_equal(&out, &int_values([0]));
    // 2 workers * 2 chunks in flight * 4 elements per chunk.
    assert!(pulled.load(Ordering::SeqCst) <= 16, "pulled {}", pulled.load(Ordering::SeqCst));
    Ok(())
}

#[mark_flaky_tests::flaky]
#[test]
fn dropping_the_iterator_stops_the_workers() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let slow = MapFn::new("slow", move |e: Element| {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        Ok(e)
    });

    let p = from_range(0..1_000).map_parallel(slow, ParallelOptions::unordered().with_workers(4))?;
    {
        let mut it = p.iter()?;
        assert!(it.next().is_some());
    }
    let after_drop = calls.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), after_drop, "no work after drop");
    assert!(after_drop < 100);
    Ok(())
}

#[test]
fn a_pipeline_with_a_parallel_stage_can_run_many_passes() -> anyhow::Result<()> {
    let p = from_range(0..25).map_parallel(double(), ParallelOptions::ordered().with_workers(3))?;
    for _ in 0..5 {
        assert_eq!(p.count()?, 25);
    }
    Ok(())
}
