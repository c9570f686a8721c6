//! # Ironpipe
//!
//! A **lazy, composable data-loading pipeline** for Rust. Ironpipe chains
//! element-wise and stream-wise operators over a re-openable source and only
//! does work when you iterate, which makes it suitable for corpora that are far
//! larger than memory or never end.
//!
//! ## Key Features
//!
//! - **Lazy, pull-based evaluation** - each stage advances only when its consumer asks
//! - **Stream algorithms** - batching, windowed shuffle, sliding windows, zip, concat, repeat
//! - **Parallel stages** - map/filter/flat-map over a scoped worker pool, ordered or unordered
//! - **Prefetching** - overlap production and consumption through a bounded buffer
//! - **Materialization** - persist a pass to disk and re-iterate it without the source
//! - **Portable step lists** - save a pipeline's steps as JSON and replay them on another source
//!
//! ## Quick Start
//!
//! ```
//! use ironpipe::*;
//!
//! # fn main() -> ironpipe::Result<()> {
//! let square = MapFn::new("square", |e: Element| {
//!     let v = e.as_i64().ok_or_else(|| anyhow::anyhow!("expected int"))?;
//!     Ok(Element::Int(v * v))
//! });
//!
//! let batches = from_range(0..10).map(square).batch(4)?;
//!
//! assert_eq!(
//!     batches.collect()?,
//!     vec![
//!         Element::list([0, 1, 4, 9]),
//!         Element::list([16, 25, 36, 49]),
//!         Element::list([64, 81]),
//!     ]
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Source
//!
//! A [`Source`] can begin any number of independent passes. Built-in sources
//! read text files ([`TextSource`], with transparent gzip), directory listings
//! ([`DirectorySource`]), JSON Lines ([`JsonlSource`]), in-memory values
//! ([`ValuesSource`]) and materialized datasets ([`Dataset`]).
//!
//! ### Pipeline
//!
//! A [`Pipeline`] is a source plus an append-only list of [`Step`]s. Every
//! operator returns a new pipeline that shares its parent's source and steps;
//! nothing is copied and nothing is mutated. Iterating begins a fresh pass:
//!
//! - [`iter`](Pipeline::iter) - fallible iterator over one pass
//! - [`collect`](Pipeline::collect), [`head`](Pipeline::head), [`first`](Pipeline::first), [`count`](Pipeline::count)
//! - [`prefetch_iter`](Pipeline::prefetch_iter) - iterate with a background producer
//! - [`materialize`](Pipeline::materialize) - evaluate, persist and return a [`Dataset`]
//!
//! ### Named functions
//!
//! User functions are wrapped in named handles ([`MapFn`], [`PredicateFn`],
//! [`FlatMapFn`], [`StreamFn`]) so a step list can be written as JSON and
//! re-linked later through a [`FnRegistry`].
//!
//! ### Parallel stages
//!
//! [`map_parallel`](Pipeline::map_parallel), [`filter_parallel`](Pipeline::filter_parallel)
//! and [`flat_map_parallel`](Pipeline::flat_map_parallel) take [`ParallelOptions`]:
//! a worker count, a chunk size and an [`Order`]. The worker pool exists only
//! while a pass is running through the stage.
//!
//! ## Errors
//!
//! Every fallible operation returns [`Result`] with the crate's [`Error`]. A
//! failing element aborts the current pass at exactly the position that needed
//! it; the pipeline itself stays usable. Nothing is retried.
//!
//! ## Logging
//!
//! Ironpipe emits [`tracing`] events (pass start, pool lifetime, prefetch
//! producer lifetime, materialization) and installs no subscriber.
//!
//! ## Feature Flags
//!
//! - `compression-gzip` (default) - transparent `.gz` decompression for file sources
//!
//! ## Module Overview
//!
//! - [`pipeline`] - Pipeline construction, iteration and terminals
//! - [`step`] - Step variants and detached step chains
//! - [`source`] - The source contract and in-memory sources
//! - [`io`] - File-backed sources and compression
//! - [`parallel`] - Scoped worker pool execution
//! - [`prefetch`] - Background prefetching iterator
//! - [`materialize`] - Persisted datasets
//! - [`definition`] - Saving and loading step lists
//! - [`testing`] - Assertions and fixtures for pipeline tests

pub mod definition;
pub mod element;
pub mod error;
pub mod io;
pub mod materialize;
pub mod parallel;
pub mod pipeline;
pub mod prefetch;
pub mod source;
pub mod step;
mod stream_ops;
pub mod testing;
pub mod udf;

pub use definition::{PipelineDefinition, PipelineSpec, StepSpec, load_pipeline, save_pipeline};
pub use element::Element;
pub use error::{Error, Result};
pub use io::dir::DirectorySource;
pub use io::jsonl::{JsonlSource, write_jsonl};
pub use io::text::TextSource;
pub use materialize::{Dataset, MaterializeFormat};
pub use parallel::{Order, ParallelOptions};
pub use pipeline::{Pipeline, PipelineIter, from_range, from_vec};
pub use prefetch::PrefetchIter;
pub use source::{ElementStream, Source, SourceSpec, ValuesSource};
pub use step::{Step, StepChain};
pub use udf::{FlatMapFn, FnRegistry, MapFn, Named, PredicateFn, StreamFn};
