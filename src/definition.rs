//! Pipeline definitions: the step list of a pipeline, saved without its source.
//!
//! A definition is a JSON document of the form
//!
//! ```json
//! { "version": 1, "steps": [ { "kind": "map", "function": "tokenize" }, { "kind": "batch", "size": 32 } ] }
//! ```
//!
//! User functions are written by name only. Loading resolves every name through
//! a [`FnRegistry`], and the resulting [`StepChain`] can be attached to any
//! source. Zip and concat partners are full pipelines, so they are written with
//! a [`SourceSpec`] of their own; a partner whose source cannot describe itself
//! makes the pipeline unserializable.
//!
//! ```
//! use ironpipe::*;
//!
//! # fn main() -> ironpipe::Result<()> {
//! let double = MapFn::new("double", |e: Element| Ok(Element::Int(e.as_i64().unwrap_or(0) * 2)));
//! let train = from_range(0..5).map(double.clone()).batch(2)?;
//!
//! let json = PipelineDefinition::from_pipeline(&train)?.to_json()?;
//! let chain = PipelineDefinition::from_json(&json)?.resolve(&FnRegistry::new().with_map(double))?;
//!
//! let held_out = chain.attach(ValuesSource::new(vec![Element::Int(10), Element::Int(11)]));
//! assert_eq!(held_out.collect()?, vec![Element::list([20, 22])]);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::parallel::ParallelOptions;
use crate::pipeline::Pipeline;
use crate::source::SourceSpec;
use crate::step::{Step, StepChain};
use crate::udf::FnRegistry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Version written into, and required from, every definition.
pub const DEFINITION_VERSION: u32 = 1;

/// Serialized form of one [`Step`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepSpec {
    Map {
        function: String,
    },
    Filter {
        function: String,
    },
    FlatMap {
        function: String,
    },
    Batch {
        size: usize,
    },
    Shuffle {
        window: usize,
        seed: u64,
    },
    Window {
        size: usize,
    },
    Zip {
        others: Vec<PipelineSpec>,
    },
    Concat {
        others: Vec<PipelineSpec>,
    },
    Repeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        times: Option<u64>,
    },
    Take {
        count: usize,
    },
    Prefetch {
        depth: usize,
    },
    ParallelMap {
        function: String,
        #[serde(default)]
        options: ParallelOptions,
    },
    ParallelFilter {
        function: String,
        #[serde(default)]
        options: ParallelOptions,
    },
    ParallelFlatMap {
        function: String,
        #[serde(default)]
        options: ParallelOptions,
    },
    Custom {
        function: String,
    },
}

/// A complete pipeline (source included), used for zip and concat partners.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub source: SourceSpec,
    pub steps: Vec<StepSpec>,
}

/// Versioned, source-free step list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub version: u32,
    pub steps: Vec<StepSpec>,
}

impl StepSpec {
    fn from_step(step: &Step) -> Result<Self> {
        Ok(match step {
            Step::Map(f) => Self::Map {
                function: f.name().to_string(),
            },
            Step::Filter(f) => Self::Filter {
                function: f.name().to_string(),
            },
            Step::FlatMap(f) => Self::FlatMap {
                function: f.name().to_string(),
            },
            Step::Batch(size) => Self::Batch { size: *size },
            Step::Shuffle { window, seed } => Self::Shuffle {
                window: *window,
                seed: *seed,
            },
            Step::Window(size) => Self::Window { size: *size },
            Step::Zip(others) => Self::Zip {
                others: others.iter().map(PipelineSpec::from_pipeline).collect::<Result<_>>()?,
            },
            Step::Concat(others) => Self::Concat {
                others: others.iter().map(PipelineSpec::from_pipeline).collect::<Result<_>>()?,
            },
            Step::Repeat(times) => Self::Repeat { times: *times },
            Step::Take(count) => Self::Take { count: *count },
            Step::Prefetch(depth) => Self::Prefetch { depth: *depth },
            Step::ParallelMap(f, options) => Self::ParallelMap {
                function: f.name().to_string(),
                options: *options,
            },
            Step::ParallelFilter(f, options) => Self::ParallelFilter {
                function: f.name().to_string(),
                options: *options,
            },
            Step::ParallelFlatMap(f, options) => Self::ParallelFlatMap {
                function: f.name().to_string(),
                options: *options,
            },
            Step::Custom(f) => Self::Custom {
                function: f.name().to_string(),
            },
        })
    }

    fn resolve(&self, registry: &FnRegistry) -> Result<Step> {
        let step = match self {
            Self::Map { function } => Step::Map(registry.map(function)?),
            Self::Filter { function } => Step::Filter(registry.predicate(function)?),
            Self::FlatMap { function } => Step::FlatMap(registry.flat_map(function)?),
            Self::Batch { size } => Step::Batch(*size),
            Self::Shuffle { window, seed } => Step::Shuffle {
                window: *window,
                seed: *seed,
            },
            Self::Window { size } => Step::Window(*size),
            Self::Zip { others } => Step::Zip(resolve_all(others, registry)?),
            Self::Concat { others } => Step::Concat(resolve_all(others, registry)?),
            Self::Repeat { times } => Step::Repeat(*times),
            Self::Take { count } => Step::Take(*count),
            Self::Prefetch { depth } => Step::Prefetch(*depth),
            Self::ParallelMap { function, options } => {
                Step::ParallelMap(registry.map(function)?, *options)
            }
            Self::ParallelFilter { function, options } => {
                Step::ParallelFilter(registry.predicate(function)?, *options)
            }
            Self::ParallelFlatMap { function, options } => {
                Step::ParallelFlatMap(registry.flat_map(function)?, *options)
            }
            Self::Custom { function } => Step::Custom(registry.stream(function)?),
        };
        step.validate()
            .map_err(|e| Error::serialization(format!("invalid `{}` step: {e}", step.kind())))?;
        Ok(step)
    }
}

fn resolve_all(specs: &[PipelineSpec], registry: &FnRegistry) -> Result<Vec<Pipeline>> {
    specs.iter().map(|s| s.resolve(registry)).collect()
}

fn specs_of(pipeline: &Pipeline) -> Result<Vec<StepSpec>> {
    pipeline.steps().iter().map(StepSpec::from_step).collect()
}

fn chain_of(steps: &[StepSpec], registry: &FnRegistry) -> Result<StepChain> {
    let steps = steps
        .iter()
        .map(|s| s.resolve(registry))
        .collect::<Result<Vec<_>>>()?;
    Ok(StepChain::new(steps))
}

impl PipelineSpec {
    /// Describe `pipeline` including its source.
    ///
    /// # Errors
    /// [`Error::Serialization`] if the source (or a nested partner's source)
    /// has no serializable description.
    pub fn from_pipeline(pipeline: &Pipeline) -> Result<Self> {
        let source = pipeline.source().describe().ok_or_else(|| {
            Error::serialization(format!(
                "source `{}` of a zip/concat partner cannot be serialized",
                pipeline.source().name()
            ))
        })?;
        Ok(Self {
            source,
            steps: specs_of(pipeline)?,
        })
    }

    /// Reopen the source and re-link the steps.
    ///
    /// # Errors
    /// Source errors from reopening, or [`Error::Serialization`] for unknown
    /// function names.
    pub fn resolve(&self, registry: &FnRegistry) -> Result<Pipeline> {
        let source = self.source.open()?;
        Ok(Pipeline::with_chain(source, &chain_of(&self.steps, registry)?))
    }
}

impl PipelineDefinition {
    /// Capture the step list of `pipeline`, leaving its source behind.
    ///
    /// # Errors
    /// [`Error::Serialization`] if a zip/concat partner cannot be described.
    pub fn from_pipeline(pipeline: &Pipeline) -> Result<Self> {
        Ok(Self {
            version: DEFINITION_VERSION,
            steps: specs_of(pipeline)?,
        })
    }

    /// Re-link every step against `registry`.
    ///
    /// # Errors
    /// [`Error::Serialization`] for unknown function names or invalid parameters;
    /// source errors while reopening zip/concat partners.
    pub fn resolve(&self, registry: &FnRegistry) -> Result<StepChain> {
        chain_of(&self.steps, registry)
    }

    /// # Errors
    /// [`Error::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a definition and check its version.
    ///
    /// # Errors
    /// [`Error::Serialization`] for malformed JSON or an unsupported version.
    pub fn from_json(json: &str) -> Result<Self> {
        let def: Self = serde_json::from_str(json)?;
        if def.version != DEFINITION_VERSION {
            return Err(Error::serialization(format!(
                "unsupported pipeline definition version {} (expected {DEFINITION_VERSION})",
                def.version
            )));
        }
        Ok(def)
    }
}

/// Write the step list of `pipeline` to `path` as JSON.
///
/// # Errors
/// [`Error::Serialization`] if the pipeline cannot be described, [`Error::Io`]
/// if the file cannot be written.
pub fn save_pipeline(path: impl AsRef<Path>, pipeline: &Pipeline) -> Result<()> {
    let path = path.as_ref();
    let def = PipelineDefinition::from_pipeline(pipeline)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, def.to_json()?)?;
    tracing::info!(path = %path.display(), steps = def.steps.len(), "pipeline definition saved");
    Ok(())
}

/// Read a step list written by [`save_pipeline`] and re-link it.
///
/// # Errors
/// [`Error::Io`] if the file cannot be read, [`Error::Serialization`] for
/// malformed content or unknown function names.
pub fn load_pipeline(path: impl AsRef<Path>, registry: &FnRegistry) -> Result<StepChain> {
    let path = path.as_ref();
    let def = PipelineDefinition::from_json(&fs::read_to_string(path)?)?;
    let chain = def.resolve(registry)?;
    tracing::info!(path = %path.display(), steps = chain.len(), "pipeline definition loaded");
    Ok(chain)
}
