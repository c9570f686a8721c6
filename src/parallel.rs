//! Parallel execution of per-element steps over a scoped worker pool.
//!
//! A parallel step pulls its upstream on the consumer thread, cuts it into
//! chunks of `chunk_size` elements and hands each chunk to a dedicated
//! [`rayon::ThreadPool`]. At most `2 * workers` chunks are in flight or waiting
//! for delivery, so the stage never buffers its whole input.
//!
//! ## Lifetime
//! The pool is created on the first pull and owned by the stream. It is released
//! when the stream is exhausted, when a worker fails, or when the consumer drops
//! the stream early. On drop, in-flight chunks are cancelled (workers stop before
//! the next element) and drained, so no worker runs user code after the drop
//! returns.
//!
//! ## Ordering
//! - [`Order::Ordered`] delivers chunk results in input order through a reorder
//!   buffer.
//! - [`Order::Unordered`] delivers whichever completed chunk has the lowest
//!   sequence number among those available, without waiting for earlier ones.
//!   Within a chunk, and within one element's flat-map output, order is kept.
//!
//! ## Failure
//! An element error or a worker panic aborts the stage. In ordered mode the
//! results of every chunk before the failing one are still delivered, then the
//! error; in unordered mode the error is raised as soon as it is the next
//! available result. Results still in flight are discarded. Nothing is retried.

use crate::element::Element;
use crate::error::{Error, Result};
use crate::source::ElementStream;
use crate::udf::{FlatMapFn, MapFn, PredicateFn};
use crossbeam::channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::iter::Fuse;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Result delivery order of a parallel step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    #[default]
    Ordered,
    Unordered,
}

/// Configuration of a parallel step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelOptions {
    /// Worker threads; `None` uses the number of logical CPUs.
    pub workers: Option<usize>,
    /// Elements handed to a worker per dispatch.
    pub chunk_size: usize,
    pub order: Order,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            workers: None,
            chunk_size: 1,
            order: Order::Ordered,
        }
    }
}

impl ParallelOptions {
    #[must_use]
    pub fn ordered() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn unordered() -> Self {
        Self {
            order: Order::Unordered,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Worker count after applying the CPU-count default.
    #[must_use]
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(Error::InvalidArgument("workers must be at least 1".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidArgument("chunk size must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// The per-element computation a worker performs.
pub(crate) enum Kernel {
    Map(MapFn),
    Filter(PredicateFn),
    FlatMap(FlatMapFn),
}

/// What a worker sends back for one input element.
enum Output {
    One(Element),
    /// The input element paired with the predicate result computed remotely.
    Keep(Element, bool),
    Many(Vec<Element>),
}

impl Kernel {
    fn run(&self, e: Element) -> anyhow::Result<Output> {
        match self {
            Kernel::Map(f) => (f.body())(e).map(Output::One),
            Kernel::Filter(p) => {
                let keep = (p.body())(&e)?;
                Ok(Output::Keep(e, keep))
            }
            Kernel::FlatMap(f) => (f.body())(e).map(Output::Many),
        }
    }
}

type ChunkResult = Result<Vec<Output>>;

/// Stream adapter that fans a step out over a worker pool.
pub(crate) struct ParallelStream {
    label: String,
    upstream: Fuse<ElementStream>,
    upstream_done: bool,
    kernel: Arc<Kernel>,
    opts: ParallelOptions,
    pool: Option<rayon::ThreadPool>,
    tx: Sender<(u64, ChunkResult)>,
    rx: Receiver<(u64, ChunkResult)>,
    cancel: Arc<AtomicBool>,
    next_dispatch: u64,
    next_deliver: u64,
    in_flight: usize,
    ready: BTreeMap<u64, ChunkResult>,
    pending: VecDeque<Element>,
    finished: bool,
}

impl ParallelStream {
    pub(crate) fn new(
        upstream: ElementStream,
        kernel: Arc<Kernel>,
        opts: ParallelOptions,
        label: String,
    ) -> Self {
        let (tx, rx) = unbounded();
        Self {
            label,
            upstream: upstream.fuse(),
            upstream_done: false,
            kernel,
            opts,
            pool: None,
            tx,
            rx,
            cancel: Arc::new(AtomicBool::new(false)),
            next_dispatch: 0,
            next_deliver: 0,
            in_flight: 0,
            ready: BTreeMap::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn max_in_flight(&self) -> usize {
        self.opts.resolved_workers() * 2
    }

    fn ensure_pool(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }
        let workers = self.opts.resolved_workers();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ironpipe-worker-{i}"))
            .build()
            .map_err(|e| Error::WorkerFailure {
                step: self.label.clone(),
                reason: format!("cannot start worker pool: {e}"),
            })?;
        tracing::debug!(step = %self.label, workers, chunk_size = self.opts.chunk_size, "worker pool started");
        self.pool = Some(pool);
        Ok(())
    }

    /// Pull chunks from upstream and dispatch them until the in-flight limit.
    ///
    /// Results parked in the reorder buffer count against the limit, so a slow
    /// head-of-line chunk cannot make the stage read ahead without bound.
    fn fill(&mut self) -> Result<()> {
        while !self.upstream_done && self.in_flight + self.ready.len() < self.max_in_flight() {
            let mut chunk = Vec::with_capacity(self.opts.chunk_size);
            let mut upstream_err = None;
            while chunk.len() < self.opts.chunk_size {
                match self.upstream.next() {
                    Some(Ok(e)) => chunk.push(e),
                    Some(Err(e)) => {
                        upstream_err = Some(e);
                        break;
                    }
                    None => {
                        self.upstream_done = true;
                        break;
                    }
                }
            }
            if !chunk.is_empty() {
                self.dispatch(chunk)?;
            }
            if let Some(e) = upstream_err {
                // Slot the upstream error after the chunks read before it.
                let seq = self.next_dispatch;
                self.next_dispatch += 1;
                self.ready.insert(seq, Err(e));
                self.upstream_done = true;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, chunk: Vec<Element>) -> Result<()> {
        self.ensure_pool()?;
        let seq = self.next_dispatch;
        self.next_dispatch += 1;
        self.in_flight += 1;

        let kernel = Arc::clone(&self.kernel);
        let cancel = Arc::clone(&self.cancel);
        let tx = self.tx.clone();
        let label = self.label.clone();
        if let Some(pool) = &self.pool {
            pool.spawn(move || {
                let out = run_chunk(&kernel, chunk, &cancel, &label);
                // The receiver is gone only if the stream was dropped.
                let _ = tx.send((seq, out));
            });
        }
        Ok(())
    }

    /// Next result that may be delivered under the configured order.
    fn take_ready(&mut self) -> Option<ChunkResult> {
        match self.opts.order {
            Order::Ordered => {
                let r = self.ready.remove(&self.next_deliver)?;
                self.next_deliver += 1;
                Some(r)
            }
            Order::Unordered => self.ready.pop_first().map(|(_, r)| r),
        }
    }

    fn accept(&mut self, outputs: Vec<Output>) {
        for out in outputs {
            match out {
                Output::One(e) | Output::Keep(e, true) => self.pending.push_back(e),
                Output::Keep(_, false) => {}
                Output::Many(v) => self.pending.extend(v),
            }
        }
    }

    /// Tear down after a failure: cancel and drain in-flight work, drop the pool.
    fn abort(&mut self, err: &Error) {
        tracing::warn!(step = %self.label, error = %err, "parallel step aborted");
        self.finished = true;
        self.release();
    }

    fn release(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        while self.in_flight > 0 {
            if self.rx.recv().is_err() {
                break;
            }
            self.in_flight -= 1;
        }
        self.ready.clear();
        if self.pool.take().is_some() {
            tracing::debug!(step = %self.label, "worker pool released");
        }
    }
}

impl Iterator for ParallelStream {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(e) = self.pending.pop_front() {
                return Some(Ok(e));
            }
            if self.finished {
                return None;
            }
            if let Some(result) = self.take_ready() {
                match result {
                    Ok(outputs) => self.accept(outputs),
                    Err(e) => {
                        self.abort(&e);
                        return Some(Err(e));
                    }
                }
                continue;
            }
            if let Err(e) = self.fill() {
                self.abort(&e);
                return Some(Err(e));
            }
            if self.in_flight == 0 {
                if self.ready.is_empty() {
                    self.finished = true;
                    self.release();
                    return None;
                }
                continue;
            }
            // We hold a sender, so the channel never disconnects here.
            let Ok((seq, result)) = self.rx.recv() else {
                self.finished = true;
                return None;
            };
            self.in_flight -= 1;
            self.ready.insert(seq, result);
        }
    }
}

impl Drop for ParallelStream {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_chunk(kernel: &Kernel, chunk: Vec<Element>, cancel: &AtomicBool, label: &str) -> ChunkResult {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut outputs = Vec::with_capacity(chunk.len());
        for e in chunk {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::WorkerFailure {
                    step: label.to_string(),
                    reason: "cancelled".to_string(),
                });
            }
            let out = kernel.run(e).map_err(|err| Error::WorkerFailure {
                step: label.to_string(),
                reason: format!("{err:#}"),
            })?;
            outputs.push(out);
        }
        Ok(outputs)
    }));
    outcome.unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "worker panicked".to_string());
        Err(Error::WorkerFailure {
            step: label.to_string(),
            reason: format!("panic: {reason}"),
        })
    })
}
