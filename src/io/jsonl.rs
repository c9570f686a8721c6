//! JSON Lines source and writer.
//!
//! Lines hold serialized [`Element`]s in Serde's externally tagged layout
//! (`{"Int":3}`, `{"Text":"a"}`, `"Null"`). Blank lines are skipped on read. The
//! same layout backs the JSON Lines materialization format.

use crate::element::Element;
use crate::error::{Error, Result};
use crate::io::compression::auto_detect_reader;
use crate::source::{ElementStream, Source, SourceSpec};
use std::fs::{File, create_dir_all};
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Source yielding one element per non-blank line of a JSONL file.
#[derive(Clone, Debug)]
pub struct JsonlSource {
    path: PathBuf,
}

impl JsonlSource {
    /// # Errors
    /// [`Error::SourceUnavailable`] if `path` is not an existing file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(Error::unavailable(
                path.display().to_string(),
                "not an existing file",
            ));
        }
        Ok(Self { path })
    }
}

impl Source for JsonlSource {
    fn name(&self) -> String {
        format!("jsonl:{}", self.path.display())
    }

    fn begin_pass(&self) -> Result<ElementStream> {
        let file = File::open(&self.path).map_err(|e| Error::unavailable(self.name(), e))?;
        let reader = auto_detect_reader(file, &self.path)?;
        let path = self.path.clone();
        Ok(Box::new(reader.lines().enumerate().filter_map(
            move |(i, line)| match line {
                Err(e) => Some(Err(Error::Io(e))),
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(serde_json::from_str::<Element>(&line).map_err(|e| {
                    Error::serialization(format!(
                        "parse JSONL line {} in {}: {e}",
                        i + 1,
                        path.display()
                    ))
                })),
            },
        )))
    }

    fn describe(&self) -> Option<SourceSpec> {
        Some(SourceSpec::Jsonl {
            path: self.path.clone(),
        })
    }
}

/// Write elements as JSON Lines, creating parent directories as needed.
///
/// # Returns
/// The number of elements written.
///
/// # Errors
/// [`Error::Serialization`] if an element holds a NaN or infinite float, which
/// JSON cannot represent; nothing is written in that case. Otherwise returns an
/// error if the file cannot be created or written.
pub fn write_jsonl<'a>(path: impl AsRef<Path>, data: impl IntoIterator<Item = &'a Element>) -> Result<usize> {
    let path = path.as_ref();
    let data: Vec<&Element> = data.into_iter().collect();
    if let Some(pos) = data.iter().position(|e| !e.is_finite()) {
        return Err(Error::serialization(format!(
            "element {pos} holds a non-finite float, which JSON Lines cannot store in {}",
            path.display()
        )));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    let mut n = 0usize;
    for item in data {
        serde_json::to_writer(&mut w, item)?;
        w.write_all(b"\n")?;
        n += 1;
    }
    w.flush()?;
    Ok(n)
}
