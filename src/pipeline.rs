use crate::element::Element;
use crate::error::Result;
use crate::materialize::Dataset;
use crate::parallel::ParallelOptions;
use crate::prefetch::PrefetchIter;
use crate::source::{ElementStream, Source, ValuesSource};
use crate::step::{Step, StepChain};
use crate::stream_ops::{FusedStream, RepeatStream};
use crate::udf::{FlatMapFn, FnRegistry, MapFn, PredicateFn, StreamFn};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// -------- Pipeline + step list --------
/// A source plus an ordered list of steps, evaluated lazily on iteration.
///
/// Steps live in a persistent singly linked list that points from the newest
/// step back to the first. Appending allocates one node and shares the rest, so
/// a derived pipeline never copies or mutates its parent. Iteration flattens the
/// list with a linear loop.
#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn Source>,
    tail: Option<Arc<StepNode>>,
    len: usize,
}

struct StepNode {
    step: Step,
    parent: Option<Arc<StepNode>>,
}

impl Drop for StepNode {
    // Unlink iteratively; the default recursive drop overflows on long chains.
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut owned) => next = owned.parent.take(),
                Err(_) => break,
            }
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.steps().iter().map(Step::label).collect();
        f.debug_struct("Pipeline")
            .field("source", &self.source.name())
            .field("steps", &labels)
            .finish()
    }
}

/// Pipeline over an in-memory vector.
pub fn from_vec<T: Into<Element>>(data: Vec<T>) -> Pipeline {
    Pipeline::new(ValuesSource::new(data.into_iter().map(Into::into).collect()))
}

/// Pipeline over the integers of `range`.
pub fn from_range(range: std::ops::Range<i64>) -> Pipeline {
    Pipeline::new(ValuesSource::new(range.map(Element::Int).collect()))
}

impl Pipeline {
    pub fn new<S: Source + 'static>(source: S) -> Self {
        Self::from_source(Arc::new(source))
    }

    #[must_use]
    pub fn from_source(source: Arc<dyn Source>) -> Self {
        Self {
            source,
            tail: None,
            len: 0,
        }
    }

    /// Build a pipeline from a source and an existing step chain.
    #[must_use]
    pub fn with_chain(source: Arc<dyn Source>, chain: &StepChain) -> Self {
        Self::from_source(source).then(chain)
    }

    #[must_use]
    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The steps in application order.
    #[must_use]
    pub fn steps(&self) -> Vec<Step> {
        let mut out = Vec::with_capacity(self.len);
        let mut cur = self.tail.as_deref();
        while let Some(node) = cur {
            out.push(node.step.clone());
            cur = node.parent.as_deref();
        }
        out.reverse();
        out
    }

    /// The step list detached from the source.
    #[must_use]
    pub fn chain(&self) -> StepChain {
        StepChain::new(self.steps())
    }

    fn push(&self, step: Step) -> Self {
        Self {
            source: Arc::clone(&self.source),
            tail: Some(Arc::new(StepNode {
                step,
                parent: self.tail.clone(),
            })),
            len: self.len + 1,
        }
    }

    fn push_checked(&self, step: Step) -> Result<Self> {
        step.validate()?;
        Ok(self.push(step))
    }

    /// Append every step of `chain`, in order.
    #[must_use]
    pub fn then(&self, chain: &StepChain) -> Self {
        chain
            .steps()
            .iter()
            .fold(self.clone(), |p, step| p.push(step.clone()))
    }

    #[must_use]
    pub fn map(&self, f: MapFn) -> Self {
        self.push(Step::Map(f))
    }

    #[must_use]
    pub fn filter(&self, pred: PredicateFn) -> Self {
        self.push(Step::Filter(pred))
    }

    #[must_use]
    pub fn flat_map(&self, f: FlatMapFn) -> Self {
        self.push(Step::FlatMap(f))
    }

    /// Apply a whole-stream function.
    #[must_use]
    pub fn apply(&self, f: StreamFn) -> Self {
        self.push(Step::Custom(f))
    }

    /// Group consecutive elements into lists of `size`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `size` is zero.
    pub fn batch(&self, size: usize) -> Result<Self> {
        self.push_checked(Step::Batch(size))
    }

    /// Shuffle within consecutive chunks of `window` elements, seeded from the
    /// process RNG once, when the step is created.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `window` is zero.
    pub fn shuffle(&self, window: usize) -> Result<Self> {
        self.shuffle_seeded(window, rand::random())
    }

    /// Shuffle within consecutive chunks of `window` elements using `seed`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `window` is zero.
    pub fn shuffle_seeded(&self, window: usize, seed: u64) -> Result<Self> {
        self.push_checked(Step::Shuffle { window, seed })
    }

    /// Sliding window of `size`, stride 1.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `size` is zero.
    pub fn window(&self, size: usize) -> Result<Self> {
        self.push_checked(Step::Window(size))
    }

    /// Pair elements positionally with `other`.
    #[must_use]
    pub fn zip(&self, other: &Pipeline) -> Self {
        self.zip_all(std::slice::from_ref(other))
    }

    /// Positional tuples across this pipeline and every one of `others`.
    #[must_use]
    pub fn zip_all(&self, others: &[Pipeline]) -> Self {
        self.push(Step::Zip(others.to_vec()))
    }

    #[must_use]
    pub fn concat(&self, other: &Pipeline) -> Self {
        self.concat_all(std::slice::from_ref(other))
    }

    #[must_use]
    pub fn concat_all(&self, others: &[Pipeline]) -> Self {
        self.push(Step::Concat(others.to_vec()))
    }

    /// Repeat the upstream forever. Bound consumption with [`take`](Self::take)
    /// or [`head`](Self::head).
    #[must_use]
    pub fn repeat(&self) -> Self {
        self.push(Step::Repeat(None))
    }

    /// Repeat the upstream `times` passes.
    #[must_use]
    pub fn repeat_n(&self, times: u64) -> Self {
        self.push(Step::Repeat(Some(times)))
    }

    /// Yield at most `n` elements.
    #[must_use]
    pub fn take(&self, n: usize) -> Self {
        self.push(Step::Take(n))
    }

    /// Produce up to `depth` elements ahead on a background thread.
    #[must_use]
    pub fn prefetch(&self, depth: usize) -> Self {
        self.push(Step::Prefetch(depth))
    }

    /// # Errors
    /// [`Error::InvalidArgument`] if `opts` has zero workers or chunk size.
    pub fn map_parallel(&self, f: MapFn, opts: ParallelOptions) -> Result<Self> {
        self.push_checked(Step::ParallelMap(f, opts))
    }

    /// # Errors
    /// [`Error::InvalidArgument`] if `opts` has zero workers or chunk size.
    pub fn filter_parallel(&self, pred: PredicateFn, opts: ParallelOptions) -> Result<Self> {
        self.push_checked(Step::ParallelFilter(pred, opts))
    }

    /// # Errors
    /// [`Error::InvalidArgument`] if `opts` has zero workers or chunk size.
    pub fn flat_map_parallel(&self, f: FlatMapFn, opts: ParallelOptions) -> Result<Self> {
        self.push_checked(Step::ParallelFlatMap(f, opts))
    }

    /// Collect every named function used by this pipeline (including zip and
    /// concat partners) into a registry.
    #[must_use]
    pub fn registry(&self) -> FnRegistry {
        let mut reg = FnRegistry::new();
        let mut stack = vec![self.clone()];
        while let Some(p) = stack.pop() {
            for step in p.steps() {
                match step {
                    Step::Map(f) | Step::ParallelMap(f, _) => {
                        reg.register_map(f);
                    }
                    Step::Filter(f) | Step::ParallelFilter(f, _) => {
                        reg.register_predicate(f);
                    }
                    Step::FlatMap(f) | Step::ParallelFlatMap(f, _) => {
                        reg.register_flat_map(f);
                    }
                    Step::Custom(f) => {
                        reg.register_stream(f);
                    }
                    Step::Zip(others) | Step::Concat(others) => stack.extend(others),
                    _ => {}
                }
            }
        }
        reg
    }

    /// Begin a pass and apply every step; the raw stream behind [`iter`](Self::iter).
    pub(crate) fn stream(&self) -> Result<ElementStream> {
        let steps: Arc<[Step]> = self.steps().into();
        tracing::debug!(source = %self.source.name(), steps = steps.len(), "begin pass");
        build_stream(&self.source, &steps, steps.len())
    }

    /// Begin a fresh pass over the source and iterate the transformed elements.
    ///
    /// The iterator stops after the first error it yields.
    ///
    /// # Errors
    /// Returns an error if the source cannot begin a pass or a step cannot start.
    pub fn iter(&self) -> Result<PipelineIter> {
        Ok(PipelineIter::new(self.stream()?))
    }

    /// Iterate with `depth` elements prefetched on a background thread.
    ///
    /// # Errors
    /// See [`iter`](Self::iter); also fails if the producer thread cannot start.
    pub fn prefetch_iter(&self, depth: usize) -> Result<PipelineIter> {
        let stream = PrefetchIter::spawn(self.stream()?, depth)?;
        Ok(PipelineIter::new(Box::new(stream)))
    }

    /// Evaluate one full pass into memory.
    ///
    /// # Errors
    /// The first error raised by the source or any step.
    pub fn collect(&self) -> Result<Vec<Element>> {
        self.iter()?.collect()
    }

    /// The first `n` elements. Only as much upstream work as needed is done.
    ///
    /// # Errors
    /// The first error raised before `n` elements were produced.
    pub fn head(&self, n: usize) -> Result<Vec<Element>> {
        self.iter()?.take(n).collect()
    }

    /// The first element, if any.
    ///
    /// # Errors
    /// An error raised while producing the first element.
    pub fn first(&self) -> Result<Option<Element>> {
        self.iter()?.next().transpose()
    }

    /// Number of elements in one pass.
    ///
    /// # Errors
    /// The first error raised during the pass.
    pub fn count(&self) -> Result<usize> {
        let mut n = 0usize;
        for item in self.iter()? {
            item?;
            n += 1;
        }
        Ok(n)
    }

    /// Evaluate one pass, persist it at `path` and return the in-memory dataset.
    ///
    /// The format follows the extension: `.jsonl` writes JSON Lines, anything
    /// else the checksummed binary format.
    ///
    /// # Errors
    /// Any pass error, or an I/O or encoding error while writing.
    pub fn materialize(&self, path: impl AsRef<Path>) -> Result<Dataset> {
        let elements = self.collect()?;
        Dataset::persist(elements, path.as_ref())
    }
}

/// Apply `steps[..upto]` to a fresh pass of `source`.
///
/// Runs of adjacent map and filter steps become a single fused stage. `repeat`
/// captures everything before it as a factory so it can restart the upstream.
fn build_stream(source: &Arc<dyn Source>, steps: &Arc<[Step]>, upto: usize) -> Result<ElementStream> {
    let mut stream = source.begin_pass()?;
    let mut i = 0;
    while i < upto {
        let run = steps[i..upto]
            .iter()
            .take_while(|s| matches!(s, Step::Map(_) | Step::Filter(_)))
            .count();
        if run > 1 {
            let fused = FusedStream::new(stream, &steps[i..i + run]);
            tracing::trace!(steps = fused.len(), "fused element-wise steps");
            stream = Box::new(fused);
            i += run;
            continue;
        }
        stream = match &steps[i] {
            Step::Repeat(times) => {
                let source = Arc::clone(source);
                let steps = Arc::clone(steps);
                let start = i;
                let factory = Box::new(move || build_stream(&source, &steps, start));
                Box::new(RepeatStream::new(stream, factory, *times))
            }
            other => other.apply(stream)?,
        };
        i += 1;
    }
    Ok(stream)
}

/// Iterator over one pass of a [`Pipeline`].
///
/// Dropping it ends the pass and releases everything the pass holds: open
/// files, worker pools and prefetch threads.
pub struct PipelineIter {
    inner: ElementStream,
    failed: bool,
}

impl PipelineIter {
    fn new(inner: ElementStream) -> Self {
        Self {
            inner,
            failed: false,
        }
    }
}

impl Iterator for PipelineIter {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.inner.next()?;
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

impl<T: Into<Element>> FromIterator<T> for Pipeline {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        from_vec(iter.into_iter().collect())
    }
}

impl From<Dataset> for Pipeline {
    fn from(d: Dataset) -> Self {
        Pipeline::new(d)
    }
}
