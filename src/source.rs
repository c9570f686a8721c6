//! The source contract: anything that can begin a fresh pass over its elements.
//!
//! A [`Source`] is re-openable. Every call to [`Source::begin_pass`] returns an
//! independent stream with no cursor shared with earlier passes, and any
//! resource it opens (a file handle, a directory listing) lives inside that
//! stream, so it is released when the stream is exhausted or dropped.
//!
//! Built-in sources can also [`describe`](Source::describe) themselves as a
//! serializable [`SourceSpec`], which is how pipelines that zip or concat other
//! pipelines stay serializable.

use crate::element::Element;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// One pass over a source: a lazy, fallible sequence of elements.
pub type ElementStream = Box<dyn Iterator<Item = Result<Element>> + Send>;

/// Restartable producer of element streams.
pub trait Source: Send + Sync {
    /// Human-readable name used in logs and error messages.
    fn name(&self) -> String;

    /// Begin a fresh, independent pass.
    ///
    /// # Errors
    /// [`Error::SourceUnavailable`](crate::Error::SourceUnavailable) if the
    /// backing resource cannot be opened for this pass.
    fn begin_pass(&self) -> Result<ElementStream>;

    /// A serializable description of this source, if it has one.
    fn describe(&self) -> Option<SourceSpec> {
        None
    }
}

/// Serializable description of a built-in source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    Values { values: Vec<Element> },
    Text {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        lossy: bool,
    },
    Directory { path: PathBuf, pattern: String },
    Jsonl { path: PathBuf },
    Materialized { path: PathBuf },
}

impl SourceSpec {
    /// Re-create the described source.
    ///
    /// # Errors
    /// Whatever the underlying constructor reports, typically
    /// [`Error::SourceUnavailable`](crate::Error::SourceUnavailable).
    pub fn open(&self) -> Result<Arc<dyn Source>> {
        Ok(match self {
            SourceSpec::Values { values } => Arc::new(ValuesSource::new(values.clone())),
            SourceSpec::Text { path, lossy } => {
                Arc::new(crate::io::text::TextSource::open(path)?.lossy(*lossy))
            }
            SourceSpec::Directory { path, pattern } => {
                Arc::new(crate::io::dir::DirectorySource::open(path, pattern)?)
            }
            SourceSpec::Jsonl { path } => Arc::new(crate::io::jsonl::JsonlSource::open(path)?),
            SourceSpec::Materialized { path } => Arc::new(crate::materialize::Dataset::load(path)?),
        })
    }
}

/// In-memory source over a shared vector of elements.
#[derive(Clone, Debug)]
pub struct ValuesSource {
    values: Arc<Vec<Element>>,
}

impl ValuesSource {
    #[must_use]
    pub fn new(values: Vec<Element>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Source for ValuesSource {
    fn name(&self) -> String {
        format!("values[{}]", self.values.len())
    }

    fn begin_pass(&self) -> Result<ElementStream> {
        Ok(shared_stream(Arc::clone(&self.values)))
    }

    fn describe(&self) -> Option<SourceSpec> {
        Some(SourceSpec::Values {
            values: self.values.as_ref().clone(),
        })
    }
}

/// Stream that clones elements out of a shared vector one at a time.
pub(crate) fn shared_stream(values: Arc<Vec<Element>>) -> ElementStream {
    Box::new((0..values.len()).map(move |i| Ok::<_, crate::Error>(values[i].clone())))
}
