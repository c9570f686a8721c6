//! Testing utilities for ironpipe pipelines.
//!
//! - **Assertions**: compare pass outputs in order or as multisets
//! - **Fixtures**: integer sequences and ready-made named functions
//! - **Mock I/O**: temporary text, JSONL and gzip files for source tests
//!
//! # Quick Start
//!
//! ```
//! use ironpipe::*;
//! use ironpipe::testing::*;
//!
//! # fn main() -> ironpipe::Result<()> {
//! let out = from_range(0..4).map(double()).collect()?;
//! assert_elements_equal(&out, &int_values([0, 2, 4, 6]));
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mock_io;

pub use assertions::*;
pub use fixtures::*;
pub use mock_io::*;
