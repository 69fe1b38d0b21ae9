use thiserror::Error;

use crate::annotations::ValidationError;

/// Errors from marking up a document.
#[derive(Debug, Error)]
pub enum MarkupError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("duplicate annotation id: {0}")]
    DuplicateId(String),
}
