//! Errors surfaced to the user through `ViewerStatus::Error`.
//!
//! Audio problems never get here; `ToneGenerator` logs and carries on.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewerError {
    /// Terminal for the current document, no retry
    #[error("Failed to load document: {0}")]
    DocumentLoad(String),
    /// One page failed to paint; navigation keeps working
    #[error("Error rendering page {page}: {message}")]
    PageRender { page: u32, message: String },
}
