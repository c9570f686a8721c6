//! Mock I/O helpers: temporary files and directories for source tests.
//!
//! Every helper returns a guard that deletes the file or directory when dropped.

use crate::element::Element;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

/// A temporary file that is automatically deleted when dropped.
pub struct TempFilePath {
    #[allow(dead_code)]
    temp_file: NamedTempFile,
    path: PathBuf,
}

impl TempFilePath {
    /// Create a new temporary file.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created.
    pub fn new() -> std::io::Result<Self> {
        let temp_file = NamedTempFile::new()?;
        let path = temp_file.path().to_path_buf();
        Ok(Self { temp_file, path })
    }

    /// Create a new temporary file with a specific extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created.
    pub fn with_extension(extension: &str) -> std::io::Result<Self> {
        let temp_file = tempfile::Builder::new()
            .suffix(&format!(".{extension}"))
            .tempfile()?;
        let path = temp_file.path().to_path_buf();
        Ok(Self { temp_file, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A temporary directory that is automatically deleted when dropped.
pub struct TempDirPath {
    #[allow(dead_code)]
    temp_dir: TempDir,
    path: PathBuf,
}

impl TempDirPath {
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().to_path_buf();
        Ok(Self { temp_dir, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A path for `filename` inside this directory. The file is not created.
    #[must_use]
    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.path.join(filename)
    }

    /// Create `filename` inside this directory with `contents`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn touch(&self, filename: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.file_path(filename);
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}

/// Create a temporary text file with one line per entry of `lines`.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be created.
///
/// # Example
///
/// ```
/// use ironpipe::testing::mock_text_file;
/// use ironpipe::{Element, Pipeline, TextSource};
///
/// # fn main() -> anyhow::Result<()> {
/// let file = mock_text_file(&["a", "b"])?;
/// let lines = Pipeline::new(TextSource::open(file.path())?).collect()?;
/// assert_eq!(lines, vec![Element::from("a"), Element::from("b")]);
/// # Ok(())
/// # }
/// ```
pub fn mock_text_file(lines: &[&str]) -> std::io::Result<TempFilePath> {
    let temp = TempFilePath::with_extension("txt")?;
    let mut file = std::fs::File::create(temp.path())?;
    for line in lines {
        writeln!(file, "{line}")?;
    }
    file.flush()?;
    Ok(temp)
}

/// Create a temporary JSON Lines file holding `data`.
///
/// # Errors
///
/// If the temporary file is unable to be created, an error is returned.
pub fn mock_jsonl_file(data: &[Element]) -> std::io::Result<TempFilePath> {
    let temp = TempFilePath::with_extension("jsonl")?;
    let mut file = std::fs::File::create(temp.path())?;
    for record in data {
        let json = serde_json::to_string(record)?;
        writeln!(file, "{json}")?;
    }
    file.flush()?;
    Ok(temp)
}

/// Create a temporary gzip-compressed text file with one line per entry.
///
/// # Errors
///
/// Returns an error if the file cannot be created or compressed.
#[cfg(feature = "compression-gzip")]
pub fn mock_gz_text_file(lines: &[&str]) -> std::io::Result<TempFilePath> {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    let temp = TempFilePath::with_extension("txt.gz")?;
    let mut encoder = GzEncoder::new(std::fs::File::create(temp.path())?, Compression::default());
    for line in lines {
        writeln!(encoder, "{line}")?;
    }
    encoder.finish()?.flush()?;
    Ok(temp)
}
