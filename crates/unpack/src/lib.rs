//! # cbx-unpack
//!
//! Extraction engine for comic book archives.
//!
//! Supported formats:
//! - ZIP (.cbz, .zip)
//! - RAR (.cbr, .rar), through the `unrar` or `rar` command line tools
//! - tar (.cbt, .tar), plain or gzip/bzip2 compressed
//! - 7z (.cb7, .7z), native with an external `7z` fallback
//! - MOBI comic containers
//! - plain directories, served in place
//!
//! Formats are recognized by content, never by file extension. Extraction
//! runs on a background worker thread with per-entry readiness signalling,
//! so a reader can display the first pages while the rest of the archive is
//! still being unpacked.
//!
//! ## Examples
//!
//! ```no_run
//! use cbx_unpack::Extractor;
//!
//! let mut session = Extractor::setup("comic.cbz", "/tmp/comic")?;
//! let files = session.get_files();
//! session.extract();
//! if session.wait_until_ready(&files[0]) {
//!     println!("first page ready");
//! }
//! # Ok::<(), cbx_unpack::UnpackError>(())
//! ```

mod backend;

pub mod error;
pub mod extract;
pub mod pack;
pub mod probe;
pub mod safety;
pub mod tools;

pub use error::{SecurityError, UnpackError};
pub use extract::{EntryOutcome, Extractor, WaitHandle};
pub use pack::Packer;
pub use probe::{archive_info, archive_kind, list_entries, ArchiveInfo, ArchiveKind};
pub use tools::ToolFamily;
