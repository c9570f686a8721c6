//! Directory listing source backed by glob patterns.
//!
//! Each pass re-lists the directory, so files added between passes are seen by
//! the next pass. Paths are yielded as [`Element::Text`] in sorted order to keep
//! passes deterministic.
//!
//! ```no_run
//! use ironpipe::io::dir::DirectorySource;
//! use ironpipe::Pipeline;
//!
//! let texts = Pipeline::new(DirectorySource::open("corpus", "*.txt")?);
//! for path in texts.iter()? {
//!     println!("{}", path?);
//! }
//! # Ok::<(), ironpipe::Error>(())
//! ```

use crate::element::Element;
use crate::error::{Error, Result};
use crate::source::{ElementStream, Source, SourceSpec};
use glob::{Pattern, glob};
use std::path::{Path, PathBuf};

/// Source yielding the paths in a directory that match a pattern.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    dir: PathBuf,
    pattern: String,
}

impl DirectorySource {
    /// Create a source listing `dir` entries matching `pattern` (e.g. `*.txt`).
    ///
    /// # Errors
    /// [`Error::SourceUnavailable`] if `dir` is not a directory or the pattern
    /// is invalid.
    pub fn open(dir: impl AsRef<Path>, pattern: &str) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(Error::unavailable(
                dir.display().to_string(),
                "not an existing directory",
            ));
        }
        Pattern::new(pattern).map_err(|e| {
            Error::unavailable(dir.display().to_string(), format!("invalid pattern `{pattern}`: {e}"))
        })?;
        Ok(Self {
            dir,
            pattern: pattern.to_string(),
        })
    }

    /// List every entry of `dir`.
    ///
    /// # Errors
    /// See [`DirectorySource::open`].
    pub fn all(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(dir, "*")
    }

    fn expand(&self) -> Result<Vec<PathBuf>> {
        let full = self.dir.join(&self.pattern);
        let full = full.to_string_lossy();
        let entries =
            glob(&full).map_err(|e| Error::unavailable(self.name(), format!("invalid glob: {e}")))?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry.map_err(|e| Error::Io(e.into_error()))?);
        }
        paths.sort();
        Ok(paths)
    }
}

impl Source for DirectorySource {
    fn name(&self) -> String {
        format!("dir:{}/{}", self.dir.display(), self.pattern)
    }

    fn begin_pass(&self) -> Result<ElementStream> {
        let paths = self.expand()?;
        tracing::debug!(source = %self.name(), entries = paths.len(), "listed directory");
        Ok(Box::new(
            paths
                .into_iter()
                .map(|p| Ok::<_, Error>(Element::Text(p.to_string_lossy().into_owned()))),
        ))
    }

    fn describe(&self) -> Option<SourceSpec> {
        Some(SourceSpec::Directory {
            path: self.dir.clone(),
            pattern: self.pattern.clone(),
        })
    }
}
