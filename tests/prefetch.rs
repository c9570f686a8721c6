//! Tests for background prefetching.

use ironpipe::testing::*;
use ironpipe::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn prefetching_never_changes_the_sequence() -> anyhow::Result<()> {
    let p = from_range(0..250).map(square()).shuffle_seeded(16, 9)?;
    let direct = p.collect()?;
    for depth in [0, 1, 5, 100] {
        let prefetched: Vec<Element> = p.prefetch_iter(depth)?.collect::<Result<_>>()?;
        assert_elements_equal(&prefetched, &direct);
    }
    Ok(())
}

#[test]
fn prefetch_step_matches_direct_iteration() -> anyhow::Result<()> {
    for depth in [0, 1, 5, 100] {
        let out = from_range(0..40).prefetch(depth).map(double()).batch(7)?.collect()?;
        let direct = from_range(0..40).map(double()).batch(7)?.collect()?;
        assert_elements_equal(&out, &direct);
    }
    Ok(())
}

#[test]
fn errors_arrive_in_their_slot() -> anyhow::Result<()> {
    for depth in [0, 1, 5, 100] {
        let p = from_range(0..10).map(fail_on(6));
        let items: Vec<_> = p.prefetch_iter(depth)?.collect();
        assert_eq!(items.len(), 7, "depth {depth}");
        for (i, item) in items.iter().take(6).enumerate() {
            assert_eq!(item.as_ref().ok(), Some(&Element::Int(i as i64)));
        }
        assert!(matches!(items[6], Err(Error::ElementCompute { .. })));
    }
    Ok(())
}

#[test]
fn producer_panics_are_reported() -> anyhow::Result<()> {
    let explode = StreamFn::new("explode", |s: ElementStream| {
        Box::new(s.map(|item| {
            if matches!(item, Ok(Element::Int(2))) {
                panic!("producer exploded");
            }
            item
        }))
    });
    let p = from_range(0..5).apply(explode).prefetch(2);
    let items: Vec<_> = p.iter()?.collect();
    assert_eq!(items.len(), 3);
    assert!(matches!(items[2], Err(Error::WorkerFailure { .. })));
    Ok(())
}

#[mark_flaky_tests::flaky]
#[test]
fn the_producer_stays_within_its_depth() -> anyhow::Result<()> {
    let produced = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&produced);
    let tap = MapFn::new("tap", move |e: Element| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(e)
    });

    let p = from_range(0..1_000).map(tap);
    let mut it = p.prefetch_iter(5)?;
    assert_eq!(it.next().transpose()?, Some(Element::Int(0)));
    thread::sleep(Duration::from_millis(50));
    // One delivered, then at most five ahead: four buffered and one held by the
    // producer while it waits on the full buffer.
    assert!(produced.load(Ordering::SeqCst) <= 6, "produced {}", produced.load(Ordering::SeqCst));
    Ok(())
}

#[test]
fn dropping_early_stops_an_unbounded_producer() -> anyhow::Result<()> {
    let produced = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&produced);
    let tap = MapFn::new("tap", move |e: Element| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(e)
    });

    let p = from_range(0..3).repeat().map(tap);
    {
        let mut it = p.prefetch_iter(4)?;
        for _ in 0..10 {
            assert!(it.next().is_some());
        }
        // Dropped here with the producer blocked on a full buffer; drop joins it.
    }
    let after = produced.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(produced.load(Ordering::SeqCst), after);
    Ok(())
}

#[test]
fn dropping_never_waits_on_a_stalled_upstream() -> anyhow::Result<()> {
    let (release, gate) = crossbeam::channel::bounded::<()>(0);
    let stalled = ints(0..2)
        .into_iter()
        .map(Ok::<_, Error>)
        .chain(std::iter::from_fn(move || {
            // Blocks until the gate is released, then ends the stream.
            let _ = gate.recv();
            None
        }));
    let mut it = PrefetchIter::spawn(Box::new(stalled), 2)?;
    assert_eq!(it.next().transpose()?, Some(Element::Int(0)));
    assert_eq!(it.next().transpose()?, Some(Element::Int(1)));

    let started = Instant::now();
    drop(it);
    assert!(started.elapsed() < Duration::from_secs(2), "drop took {:?}", started.elapsed());
    drop(release);
    Ok(())
}

#[test]
fn depth_one_hands_over_one_element_at_a_time() -> anyhow::Result<()> {
    let produced = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&produced);
    let tap = MapFn::new("tap", move |e: Element| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(e)
    });

    let mut it = from_range(0..100).map(tap).prefetch_iter(1)?;
    assert_eq!(it.next().transpose()?, Some(Element::Int(0)));
    thread::sleep(Duration::from_millis(30));
    assert!(produced.load(Ordering::SeqCst) <= 2, "produced {}", produced.load(Ordering::SeqCst));
    assert_eq!(it.count(), 99);
    Ok(())
}

#[test]
fn prefetch_ahead_of_a_parallel_stage() -> anyhow::Result<()> {
    let p = from_range(0..64)
        .map_parallel(double(), ParallelOptions::ordered().with_workers(4).with_chunk_size(8))?
        .prefetch(16);
    assert_elements_equal(&p.collect()?, &int_values((0..64).map(|v| v * 2)));
    Ok(())
}

#[test]
fn prefetch_iter_wraps_any_stream() -> anyhow::Result<()> {
    let stream: ElementStream = Box::new(ints(0..4).into_iter().map(Ok::<_, Error>));
    let out: Vec<Element> = PrefetchIter::spawn(stream, 2)?.collect::<Result<_>>()?;
    assert_elements_equal(&out, &ints(0..4));
    Ok(())
}
