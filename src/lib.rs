//! # zipstream: Streaming ZIP Codec with Full ZIP64 Support
//!
//! `zipstream` is a lightweight ZIP archive codec built around two
//! independent streaming pipelines: a push-driven writer that never seeks
//! and a pull-driven reader that parses the central directory lazily.
//!
//! ## Features
//!
//! - **Streaming Write**: entry sizes are unknown up front, so every entry
//!   uses the data-descriptor form; archives of any size stream through
//!   constant memory and any `Write` sink
//! - **Lazy Read**: the central directory is located by tail-scanning and
//!   entry data is fetched only on demand
//! - **ZIP64**: per-entry and per-archive promotion happens on-the-fly,
//!   with classic records kept for legacy readers
//! - **Async**: Tokio-based reader and writer twins behind the `async`
//!   feature
//!
//! ## Quick Start
//!
//! ### Writing a ZIP archive
//!
//! ```
//! use zipstream::StreamingZipWriter;
//!
//! let mut writer = StreamingZipWriter::new(Vec::new());
//!
//! writer.start_entry("file1.txt")?;
//! writer.write_data(b"Hello, World!")?;
//!
//! writer.start_entry("file2.txt")?;
//! writer.write_data(b"Another file")?;
//!
//! let bytes = writer.finish()?;
//! # assert!(!bytes.is_empty());
//! # Ok::<(), zipstream::ZipError>(())
//! ```
//!
//! ### Reading a ZIP archive
//!
//! ```no_run
//! use zipstream::ZipArchive;
//!
//! let mut archive = ZipArchive::open("archive.zip")?;
//!
//! // List all entries
//! for entry in archive.entries() {
//!     println!("{}: {} bytes", entry.name, entry.uncompressed_size);
//! }
//!
//! // Read a specific file
//! let data = archive.read_entry_by_name("file.txt")?;
//! # Ok::<(), zipstream::ZipError>(())
//! ```

pub mod error;
mod format;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_reader;
#[cfg(feature = "async")]
pub mod async_writer;

pub use error::{Result, ZipError};
pub use format::DosDateTime;
pub use reader::{ZipArchive, ZipEntry};
pub use writer::{EntryOptions, StreamingZipWriter};

#[cfg(feature = "async")]
pub use async_reader::AsyncZipArchive;
#[cfg(feature = "async")]
pub use async_writer::AsyncStreamingZipWriter;
