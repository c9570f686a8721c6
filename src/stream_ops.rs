//! Stream-wise operators: fused element-wise stages, flat-map, batch, windowed
//! shuffle, sliding window, zip, concat and repeat.
//!
//! Every operator here is a pull-based iterator adapter over an
//! [`ElementStream`]. Errors from upstream are passed through at the position
//! they occur; a partially filled batch, chunk, or window is discarded when its
//! fill is interrupted by an error, since the pass is over at that point.

use crate::element::Element;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::source::ElementStream;
use crate::step::Step;
use crate::udf::{FlatMapFn, MapFn, PredicateFn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::iter::Fuse;

enum ElementOp {
    Map(MapFn, String),
    Filter(PredicateFn, String),
}

/// A run of adjacent map and filter steps executed as one stage.
///
/// Each element is pushed through every op in a loop, so a chain of thousands
/// of maps costs one iterator frame instead of one per step.
pub(crate) struct FusedStream {
    inner: ElementStream,
    ops: Vec<ElementOp>,
}

impl FusedStream {
    /// Fuse the leading map/filter steps of `steps`; other steps are ignored.
    pub(crate) fn new(inner: ElementStream, steps: &[Step]) -> Self {
        let ops = steps
            .iter()
            .map_while(|step| match step {
                Step::Map(f) => Some(ElementOp::Map(f.clone(), step.label())),
                Step::Filter(p) => Some(ElementOp::Filter(p.clone(), step.label())),
                _ => None,
            })
            .collect();
        Self { inner, ops }
    }

    pub(crate) fn len(&self) -> usize {
        self.ops.len()
    }
}

impl Iterator for FusedStream {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        'elements: loop {
            let mut e = match self.inner.next()? {
                Ok(e) => e,
                Err(err) => return Some(Err(err)),
            };
            for op in &self.ops {
                match op {
                    ElementOp::Map(f, label) => match (f.body())(e) {
                        Ok(out) => e = out,
                        Err(err) => return Some(Err(Error::compute(label, err))),
                    },
                    ElementOp::Filter(p, label) => match (p.body())(&e) {
                        Ok(true) => {}
                        Ok(false) => continue 'elements,
                        Err(err) => return Some(Err(Error::compute(label, err))),
                    },
                }
            }
            return Some(Ok(e));
        }
    }
}

/// Applies a flat-map function and yields its outputs in order.
pub(crate) struct FlatMapStream {
    inner: ElementStream,
    f: FlatMapFn,
    label: String,
    pending: std::vec::IntoIter<Element>,
}

impl FlatMapStream {
    pub(crate) fn new(inner: ElementStream, f: FlatMapFn, label: String) -> Self {
        Self {
            inner,
            f,
            label,
            pending: Vec::new().into_iter(),
        }
    }
}

impl Iterator for FlatMapStream {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(e) = self.pending.next() {
                return Some(Ok(e));
            }
            match self.inner.next()? {
                Ok(e) => match (self.f.body())(e) {
                    Ok(out) => self.pending = out.into_iter(),
                    Err(err) => return Some(Err(Error::compute(&self.label, err))),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Groups consecutive elements into lists of `size`; the last list may be short.
pub(crate) struct BatchStream {
    inner: Fuse<ElementStream>,
    size: usize,
}

impl BatchStream {
    pub(crate) fn new(inner: ElementStream, size: usize) -> Self {
        Self {
            inner: inner.fuse(),
            size,
        }
    }
}

impl Iterator for BatchStream {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.size);
        while batch.len() < self.size {
            match self.inner.next() {
                Some(Ok(e)) => batch.push(e),
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(Ok(Element::List(batch)))
        }
    }
}

/// Windowed shuffle: reads chunks of up to `window` elements, permutes each
/// chunk uniformly, and yields it before reading the next.
///
/// The RNG belongs to this stream and is seeded from the step's seed, so every
/// pass of the same step produces the same permutation sequence.
pub(crate) struct ShuffleStream {
    inner: Fuse<ElementStream>,
    window: usize,
    rng: StdRng,
    chunk: std::vec::IntoIter<Element>,
}

impl ShuffleStream {
    pub(crate) fn new(inner: ElementStream, window: usize, seed: u64) -> Self {
        Self {
            inner: inner.fuse(),
            window,
            rng: StdRng::seed_from_u64(seed),
            chunk: Vec::new().into_iter(),
        }
    }
}

impl Iterator for ShuffleStream {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.chunk.next() {
            return Some(Ok(e));
        }
        let mut buf = Vec::with_capacity(self.window);
        while buf.len() < self.window {
            match self.inner.next() {
                Some(Ok(e)) => buf.push(e),
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            }
        }
        buf.shuffle(&mut self.rng);
        self.chunk = buf.into_iter();
        self.chunk.next().map(Ok)
    }
}

/// Sliding window of `size` with stride 1, holding at most `size` elements.
pub(crate) struct WindowStream {
    inner: Fuse<ElementStream>,
    size: usize,
    buf: VecDeque<Element>,
}

impl WindowStream {
    pub(crate) fn new(inner: ElementStream, size: usize) -> Self {
        Self {
            inner: inner.fuse(),
            size,
            buf: VecDeque::with_capacity(size),
        }
    }
}

impl Iterator for WindowStream {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buf.len() < self.size {
            match self.inner.next()? {
                Ok(e) => self.buf.push_back(e),
                Err(e) => return Some(Err(e)),
            }
        }
        let window = Element::List(self.buf.iter().cloned().collect());
        self.buf.pop_front();
        Some(Ok(window))
    }
}

/// Positional tuples across several streams; ends with the shortest.
pub(crate) struct ZipStream {
    streams: Vec<ElementStream>,
    done: bool,
}

impl ZipStream {
    pub(crate) fn new(streams: Vec<ElementStream>) -> Self {
        Self {
            streams,
            done: false,
        }
    }
}

impl Iterator for ZipStream {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut row = Vec::with_capacity(self.streams.len());
        for s in &mut self.streams {
            match s.next() {
                Some(Ok(e)) => row.push(e),
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
        Some(Ok(Element::List(row)))
    }
}

/// The primary stream in full, then each partner pipeline in argument order.
///
/// Partner passes begin only when the stream reaches them, and each partner's
/// pass is released before the next one starts.
pub(crate) struct ConcatStream {
    current: Option<ElementStream>,
    partners: VecDeque<Pipeline>,
}

impl ConcatStream {
    pub(crate) fn new(primary: ElementStream, partners: Vec<Pipeline>) -> Self {
        Self {
            current: Some(primary),
            partners: partners.into(),
        }
    }
}

impl Iterator for ConcatStream {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.as_mut()?.next() {
                return Some(item);
            }
            self.current = None;
            let partner = self.partners.pop_front()?;
            match partner.stream() {
                Ok(s) => self.current = Some(s),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Factory that begins a fresh pass of everything upstream of a `repeat`.
pub(crate) type PassFactory = Box<dyn Fn() -> Result<ElementStream> + Send>;

/// Re-begins the upstream each time it is exhausted.
///
/// `remaining` counts passes still to start, `None` meaning forever. A pass
/// that yields nothing ends the repetition: repeating an empty sequence would
/// otherwise spin without ever producing an element.
pub(crate) struct RepeatStream {
    current: Option<ElementStream>,
    factory: PassFactory,
    remaining: Option<u64>,
    yielded: bool,
}

impl RepeatStream {
    pub(crate) fn new(first: ElementStream, factory: PassFactory, times: Option<u64>) -> Self {
        let (current, remaining) = match times {
            Some(0) => (None, Some(0)),
            Some(n) => (Some(first), Some(n - 1)),
            None => (Some(first), None),
        };
        Self {
            current,
            factory,
            remaining,
            yielded: false,
        }
    }
}

impl Iterator for RepeatStream {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.as_mut()?.next() {
                self.yielded = true;
                return Some(item);
            }
            self.current = None;
            if !self.yielded || self.remaining == Some(0) {
                return None;
            }
            if let Some(n) = self.remaining.as_mut() {
                *n -= 1;
            }
            self.yielded = false;
            match (self.factory)() {
                Ok(s) => self.current = Some(s),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
