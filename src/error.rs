use thiserror::Error;

/// Fatal merge failures. Everything else is reported per record in the
/// [`MergeReport`](crate::merge::MergeReport).
///
/// These travel inside `anyhow::Error`; use [`merge_error`] to recover the kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("not a readable docx package: {0}")]
    InvalidPackage(String),

    #[error("required part missing: {0}")]
    PartMissing(String),

    #[error("invalid comment records: {0}")]
    InvalidRecords(String),

    #[error("output package is corrupt: {0}")]
    OutputCorrupt(String),
}

impl MergeError {
    /// The input itself cannot be merged into; fixing the file or the records is the remedy.
    pub fn is_input_problem(&self) -> bool {
        matches!(
            self,
            Self::InvalidPackage(_) | Self::PartMissing(_) | Self::InvalidRecords(_)
        )
    }
}

/// Finds a [`MergeError`] anywhere in an error chain, through any added context.
pub fn merge_error(err: &anyhow::Error) -> Option<&MergeError> {
    err.chain().find_map(|e| e.downcast_ref::<MergeError>())
}
