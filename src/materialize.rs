//! Materialized datasets: a fully evaluated pass, persisted and re-iterable.
//!
//! [`Pipeline::materialize`](crate::Pipeline::materialize) consumes one pass,
//! writes the elements to disk and hands back a [`Dataset`]. A dataset is itself
//! a [`Source`], so it can seed new pipelines without touching the original
//! source again.
//!
//! # Formats
//!
//! - **Binary** (default): an 8-byte magic followed by a postcard-encoded
//!   envelope holding the format version, the element count, a SHA-256 checksum
//!   of the payload, and the postcard-encoded elements. Loading verifies both
//!   the count and the checksum.
//! - **JSON Lines**: one element per line, chosen when the path ends in `.jsonl`.
//!
//! [`Dataset::load`] detects the format from the file's leading bytes first and
//! falls back to the extension.

use crate::element::Element;
use crate::error::{Error, Result};
use crate::io::jsonl::{JsonlSource, write_jsonl};
use crate::pipeline::Pipeline;
use crate::source::{ElementStream, Source, SourceSpec, shared_stream};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, create_dir_all};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Leading bytes of the binary format.
pub const MAGIC: &[u8; 8] = b"IRNPIPE\0";

/// Current version of the binary envelope.
pub const FORMAT_VERSION: u32 = 1;

/// On-disk encoding of a materialized dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MaterializeFormat {
    #[default]
    Binary,
    JsonLines,
}

impl MaterializeFormat {
    /// Pick the format from a path's extension: `.jsonl` is JSON Lines,
    /// everything else binary.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jsonl") => Self::JsonLines,
            _ => Self::Binary,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    count: u64,
    checksum: String,
    payload: Vec<u8>,
}

/// SHA-256 of `data` as lowercase hex.
#[must_use]
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// A finite, fully evaluated collection that can be iterated any number of times.
#[derive(Clone, Debug)]
pub struct Dataset {
    elements: Arc<Vec<Element>>,
    origin: Option<PathBuf>,
}

impl Dataset {
    /// An in-memory dataset that has not been written anywhere.
    #[must_use]
    pub fn from_vec(elements: Vec<Element>) -> Self {
        Self {
            elements: Arc::new(elements),
            origin: None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The file this dataset was written to or loaded from.
    #[must_use]
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Element> {
        self.elements.iter()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Element> {
        self.elements.as_ref().clone()
    }

    /// A new pipeline reading from this dataset.
    #[must_use]
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.clone())
    }

    /// Write `elements` to `path` and return them as a dataset backed by that file.
    pub(crate) fn persist(elements: Vec<Element>, path: &Path) -> Result<Self> {
        let dataset = Self {
            elements: Arc::new(elements),
            origin: Some(path.to_path_buf()),
        };
        dataset.save(path)?;
        Ok(dataset)
    }

    /// Write this dataset to `path` in the format implied by its extension.
    ///
    /// # Errors
    /// [`Error::Io`] if the file cannot be written, [`Error::Serialization`] if
    /// an element cannot be encoded (JSON Lines rejects NaN and infinite floats).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let format = MaterializeFormat::from_path(path);
        match format {
            MaterializeFormat::JsonLines => {
                write_jsonl(path, self.elements.iter())?;
            }
            MaterializeFormat::Binary => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    create_dir_all(parent)?;
                }
                let payload = postcard::to_allocvec(self.elements.as_ref())?;
                let envelope = Envelope {
                    version: FORMAT_VERSION,
                    count: self.elements.len() as u64,
                    checksum: compute_checksum(&payload),
                    payload,
                };
                let encoded = postcard::to_allocvec(&envelope)?;
                let mut file = File::create(path)?;
                file.write_all(MAGIC)?;
                file.write_all(&encoded)?;
                file.sync_all()?;
            }
        }
        tracing::info!(path = %path.display(), elements = self.elements.len(), ?format, "dataset materialized");
        Ok(())
    }

    /// Read a dataset written by [`save`](Self::save) or
    /// [`Pipeline::materialize`](crate::Pipeline::materialize).
    ///
    /// # Errors
    /// [`Error::SourceUnavailable`] if the file is missing, [`Error::Serialization`]
    /// on an unknown format, a version mismatch, a count mismatch or a bad checksum.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| Error::unavailable(path.display().to_string(), e))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let elements = if let Some(body) = bytes.strip_prefix(MAGIC.as_slice()) {
            decode_binary(body, path)?
        } else if MaterializeFormat::from_path(path) == MaterializeFormat::JsonLines {
            JsonlSource::open(path)?.begin_pass()?.collect::<Result<Vec<_>>>()?
        } else {
            return Err(Error::serialization(format!(
                "{} is not a materialized dataset",
                path.display()
            )));
        };

        tracing::info!(path = %path.display(), elements = elements.len(), "dataset loaded");
        Ok(Self {
            elements: Arc::new(elements),
            origin: Some(path.to_path_buf()),
        })
    }
}

fn decode_binary(body: &[u8], path: &Path) -> Result<Vec<Element>> {
    let envelope: Envelope = postcard::from_bytes(body)?;
    if envelope.version != FORMAT_VERSION {
        return Err(Error::serialization(format!(
            "{}: unsupported dataset format version {}",
            path.display(),
            envelope.version
        )));
    }
    let actual = compute_checksum(&envelope.payload);
    if actual != envelope.checksum {
        return Err(Error::serialization(format!(
            "{}: checksum mismatch (expected {}, found {actual})",
            path.display(),
            envelope.checksum
        )));
    }
    let elements: Vec<Element> = postcard::from_bytes(&envelope.payload)?;
    if elements.len() as u64 != envelope.count {
        return Err(Error::serialization(format!(
            "{}: header says {} elements, payload has {}",
            path.display(),
            envelope.count,
            elements.len()
        )));
    }
    Ok(elements)
}

impl Source for Dataset {
    fn name(&self) -> String {
        match &self.origin {
            Some(p) => format!("dataset({})", p.display()),
            None => format!("dataset[{}]", self.elements.len()),
        }
    }

    fn begin_pass(&self) -> Result<ElementStream> {
        Ok(shared_stream(Arc::clone(&self.elements)))
    }

    fn describe(&self) -> Option<SourceSpec> {
        Some(match &self.origin {
            Some(path) => SourceSpec::Materialized { path: path.clone() },
            None => SourceSpec::Values {
                values: self.to_vec(),
            },
        })
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Element;
    type IntoIter = std::slice::Iter<'a, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
