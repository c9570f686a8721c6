//! Line-oriented text file source.
//!
//! Each pass opens the file anew and yields one [`Element::Text`] per line with
//! the trailing `\n` (and `\r\n`) removed. The file handle belongs to the pass
//! stream and is closed when the stream ends or is dropped.
//!
//! Invalid UTF-8 is an error by default; [`TextSource::lossy`] replaces bad
//! sequences with U+FFFD instead.

use crate::element::Element;
use crate::error::{Error, Result};
use crate::io::compression::auto_detect_reader;
use crate::source::{ElementStream, Source, SourceSpec};
use std::fs::File;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Source yielding the lines of a UTF-8 text file.
#[derive(Clone, Debug)]
pub struct TextSource {
    path: PathBuf,
    lossy: bool,
}

impl TextSource {
    /// Create a source over `path`.
    ///
    /// # Errors
    /// [`Error::SourceUnavailable`] if `path` is not an existing file. The check
    /// happens here, not at first iteration.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(Error::unavailable(
                path.display().to_string(),
                "not an existing file",
            ));
        }
        Ok(Self { path, lossy: false })
    }

    /// Decode invalid UTF-8 lossily instead of failing the pass.
    #[must_use]
    pub fn lossy(mut self, lossy: bool) -> Self {
        self.lossy = lossy;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Source for TextSource {
    fn name(&self) -> String {
        format!("text:{}", self.path.display())
    }

    fn begin_pass(&self) -> Result<ElementStream> {
        let file =
            File::open(&self.path).map_err(|e| Error::unavailable(self.name(), e))?;
        let reader = auto_detect_reader(file, &self.path)?;
        if self.lossy {
            return Ok(Box::new(reader.split(b'\n').map(|line| -> Result<Element> {
                let mut line = line?;
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                Ok(Element::Text(String::from_utf8_lossy(&line).into_owned()))
            })));
        }
        Ok(Box::new(reader.lines().map(|line| -> Result<Element> {
            let mut line = line?;
            if line.ends_with('\r') {
                line.pop();
            }
            Ok(Element::Text(line))
        })))
    }

    fn describe(&self) -> Option<SourceSpec> {
        Some(SourceSpec::Text {
            path: self.path.clone(),
            lossy: self.lossy,
        })
    }
}
