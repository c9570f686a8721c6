//! Transform steps: the tagged, immutable units a pipeline is made of.
//!
//! A [`Step`] carries only named functions and plain parameters, which is what
//! makes a step list serializable (see [`crate::definition`]). Applying a step
//! wraps an upstream [`ElementStream`] in a new lazy stream; nothing is pulled
//! until the consumer asks for the next element.

use crate::element::Element;
use crate::error::{Error, Result};
use crate::parallel::{Kernel, ParallelOptions, ParallelStream};
use crate::pipeline::Pipeline;
use crate::prefetch::PrefetchIter;
use crate::source::ElementStream;
use crate::stream_ops::{
    BatchStream, ConcatStream, FlatMapStream, ShuffleStream, WindowStream, ZipStream,
};
use crate::udf::{FlatMapFn, MapFn, PredicateFn, StreamFn};
use std::sync::Arc;

/// One stream transformation.
#[derive(Clone, Debug)]
pub enum Step {
    Map(MapFn),
    Filter(PredicateFn),
    FlatMap(FlatMapFn),
    /// Group consecutive elements into lists of `size`.
    Batch(usize),
    /// Shuffle within non-overlapping chunks of `window` elements.
    Shuffle { window: usize, seed: u64 },
    /// Sliding window of `size`, stride 1.
    Window(usize),
    Zip(Vec<Pipeline>),
    Concat(Vec<Pipeline>),
    /// Re-run the upstream `times` passes, or forever when `None`.
    Repeat(Option<u64>),
    Take(usize),
    Prefetch(usize),
    ParallelMap(MapFn, ParallelOptions),
    ParallelFilter(PredicateFn, ParallelOptions),
    ParallelFlatMap(FlatMapFn, ParallelOptions),
    Custom(StreamFn),
}

impl Step {
    /// Stable tag of this step kind, as written in pipeline definitions.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Step::Map(_) => "map",
            Step::Filter(_) => "filter",
            Step::FlatMap(_) => "flat_map",
            Step::Batch(_) => "batch",
            Step::Shuffle { .. } => "shuffle",
            Step::Window(_) => "window",
            Step::Zip(_) => "zip",
            Step::Concat(_) => "concat",
            Step::Repeat(_) => "repeat",
            Step::Take(_) => "take",
            Step::Prefetch(_) => "prefetch",
            Step::ParallelMap(..) => "parallel_map",
            Step::ParallelFilter(..) => "parallel_filter",
            Step::ParallelFlatMap(..) => "parallel_flat_map",
            Step::Custom(_) => "custom",
        }
    }

    /// Label used in logs and error messages, e.g. `map(square)`.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Step::Map(f) | Step::ParallelMap(f, _) => format!("{}({})", self.kind(), f.name()),
            Step::Filter(f) | Step::ParallelFilter(f, _) => format!("{}({})", self.kind(), f.name()),
            Step::FlatMap(f) | Step::ParallelFlatMap(f, _) => {
                format!("{}({})", self.kind(), f.name())
            }
            Step::Custom(f) => format!("custom({})", f.name()),
            Step::Batch(n) | Step::Window(n) | Step::Take(n) | Step::Prefetch(n) => {
                format!("{}({n})", self.kind())
            }
            Step::Shuffle { window, seed } => format!("shuffle({window}, seed={seed})"),
            Step::Zip(o) | Step::Concat(o) => format!("{}(+{})", self.kind(), o.len()),
            Step::Repeat(Some(n)) => format!("repeat({n})"),
            Step::Repeat(None) => "repeat".to_string(),
        }
    }

    /// Reject parameters that can never produce a meaningful stream.
    pub(crate) fn validate(&self) -> Result<()> {
        let zero = |what: &str| Err(Error::InvalidArgument(format!("{what} must be at least 1")));
        match self {
            Step::Batch(0) => zero("batch size"),
            Step::Window(0) => zero("window size"),
            Step::Shuffle { window: 0, .. } => zero("shuffle window"),
            Step::ParallelMap(_, o) | Step::ParallelFilter(_, o) | Step::ParallelFlatMap(_, o) => {
                o.validate()
            }
            _ => Ok(()),
        }
    }

    /// Wrap `upstream` with this step.
    ///
    /// `Repeat` is not handled here: it needs to restart the whole upstream,
    /// which only the pipeline can do.
    pub(crate) fn apply(&self, upstream: ElementStream) -> Result<ElementStream> {
        Ok(match self {
            Step::Map(f) => {
                let f = f.clone();
                let label = self.label();
                Box::new(upstream.map(move |item| {
                    item.and_then(|e| (f.body())(e).map_err(|err| Error::compute(&label, err)))
                }))
            }
            Step::Filter(p) => {
                let p = p.clone();
                let label = self.label();
                Box::new(upstream.filter_map(move |item| match item {
                    Err(e) => Some(Err(e)),
                    Ok(e) => match (p.body())(&e) {
                        Ok(true) => Some(Ok(e)),
                        Ok(false) => None,
                        Err(err) => Some(Err(Error::compute(&label, err))),
                    },
                }))
            }
            Step::FlatMap(f) => Box::new(FlatMapStream::new(upstream, f.clone(), self.label())),
            Step::Batch(size) => Box::new(BatchStream::new(upstream, *size)),
            Step::Shuffle { window, seed } => Box::new(ShuffleStream::new(upstream, *window, *seed)),
            Step::Window(size) => Box::new(WindowStream::new(upstream, *size)),
            Step::Zip(others) => {
                let mut streams = Vec::with_capacity(others.len() + 1);
                streams.push(upstream);
                for other in others {
                    streams.push(other.stream()?);
                }
                Box::new(ZipStream::new(streams))
            }
            Step::Concat(others) => {
                // Partners begin their passes lazily, when the stream reaches them.
                let partners: Vec<Pipeline> = others.clone();
                Box::new(ConcatStream::new(upstream, partners))
            }
            Step::Take(n) => Box::new(upstream.take(*n)),
            Step::Prefetch(depth) => Box::new(PrefetchIter::spawn(upstream, *depth)?),
            Step::ParallelMap(f, opts) => Box::new(ParallelStream::new(
                upstream,
                Arc::new(Kernel::Map(f.clone())),
                *opts,
                self.label(),
            )),
            Step::ParallelFilter(p, opts) => Box::new(ParallelStream::new(
                upstream,
                Arc::new(Kernel::Filter(p.clone())),
                *opts,
                self.label(),
            )),
            Step::ParallelFlatMap(f, opts) => Box::new(ParallelStream::new(
                upstream,
                Arc::new(Kernel::FlatMap(f.clone())),
                *opts,
                self.label(),
            )),
            Step::Custom(f) => (f.body())(upstream),
            Step::Repeat(_) => {
                return Err(Error::InvalidArgument(
                    "repeat must be expanded by the pipeline".to_string(),
                ));
            }
        })
    }
}

/// Flat step list detached from any source, ready to be attached to one.
///
/// Produced by [`Pipeline::chain`] or by loading a pipeline definition.
#[derive(Clone, Debug, Default)]
pub struct StepChain {
    steps: Vec<Step>,
}

impl StepChain {
    #[must_use]
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Attach this chain to a source, producing a runnable pipeline.
    #[must_use]
    pub fn attach<S: crate::source::Source + 'static>(&self, source: S) -> Pipeline {
        Pipeline::new(source).then(self)
    }

    /// Stream elements of `items` through this chain; convenient for tests.
    ///
    /// # Errors
    /// See [`Pipeline::collect`].
    pub fn run_on(&self, items: Vec<Element>) -> Result<Vec<Element>> {
        self.attach(crate::source::ValuesSource::new(items)).collect()
    }
}

impl From<Vec<Step>> for StepChain {
    fn from(steps: Vec<Step>) -> Self {
        Self::new(steps)
    }
}
