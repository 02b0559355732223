//! Merge reviewer comments into existing `.docx` packages.
//!
//! Each record's anchor text is fuzzily matched to a paragraph, positioned inside it, and
//! attached as a native Word comment. Untouched package parts are carried over byte for byte.

pub mod config;
pub mod docx;
pub mod error;
pub mod ffi;
pub mod matching;
pub mod merge;
pub mod progress;

pub use config::MergeSettings;
pub use error::{merge_error, MergeError};
pub use merge::{parse_records, CommentMerger, CommentRecord, MergeDetail, MergeOutput, MergeReport};
