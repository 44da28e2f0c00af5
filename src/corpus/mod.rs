//! Document corpus handling
//!
//! Everything between a corpus declaration and the byte streams handed to
//! bulk parameter sources: local preparation (download, decompression, size
//! verification), the file-offset sidecar used for O(1) seeks, the
//! per-client [`Slice`] line window and the bulk readers that attach action
//! and meta-data lines.

pub mod offsets;
pub mod prepare;
pub mod reader;
pub mod slice;

pub use offsets::OffsetTable;
pub use prepare::{Decompressor, DocumentSetPreparator, Downloader};
pub use reader::{DocsReader, GenerateActionMetaData};
pub use slice::Slice;
