//! Transparent decompression for file-backed sources.
//!
//! Codecs are detected from the file extension first and from magic bytes as a
//! fallback, so `corpus.txt.gz` and a gzip file without an extension both read
//! as plain text. With no codec features enabled, [`auto_detect_reader`] is a
//! buffered pass-through.
//!
//! Readers returned here are `Send` because they are owned by element streams,
//! which may be moved onto a prefetch thread.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// A reader that may cross thread boundaries.
pub type SendRead = Box<dyn Read + Send>;

/// Pluggable decompression codec.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g. "gzip").
    fn name(&self) -> &str;

    /// Lowercase extensions with leading dot (e.g. `&[".gz"]`).
    fn extensions(&self) -> &[&str];

    /// Optional magic byte signature for content-based detection.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap a reader with decompression.
    fn wrap_reader(&self, reader: SendRead) -> std::io::Result<SendRead>;
}

#[cfg(feature = "compression-gzip")]
pub struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader(&self, reader: SendRead) -> std::io::Result<SendRead> {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }
}

fn codecs() -> Vec<Box<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Box::new(GzipCodec),
    ]
}

fn detect_from_extension(path: &Path) -> Option<Box<dyn CompressionCodec>> {
    let lower = path.to_string_lossy().to_lowercase();
    codecs()
        .into_iter()
        .find(|c| c.extensions().iter().any(|ext| lower.ends_with(ext)))
}

/// Open `file` for line-oriented reading, decompressing when a codec matches.
///
/// # Errors
/// Returns an error if the header cannot be read or the codec fails to
/// initialize.
pub fn auto_detect_reader(file: File, path: &Path) -> std::io::Result<Box<dyn BufRead + Send>> {
    if let Some(codec) = detect_from_extension(path) {
        tracing::debug!(path = %path.display(), codec = codec.name(), "decompressing by extension");
        let inner = codec.wrap_reader(Box::new(file))?;
        return Ok(Box::new(BufReader::new(inner)));
    }

    let mut buffered = BufReader::new(file);
    let header = buffered.fill_buf()?.to_vec();
    for codec in codecs() {
        if let Some(magic) = codec.magic_bytes()
            && header.starts_with(magic)
        {
            tracing::debug!(path = %path.display(), codec = codec.name(), "decompressing by magic bytes");
            let inner = codec.wrap_reader(Box::new(buffered))?;
            return Ok(Box::new(BufReader::new(inner)));
        }
    }
    Ok(Box::new(buffered))
}
