//! FOLIO - paginated document viewer core
//!
//! Render scheduling against a single surface plus timed auto-advance.
//! Re-exports the main types for the `folio` binary and embedding hosts.

// Core engine (scheduler, viewer, auto-advance, workers)
pub mod core;

// Document sources
pub mod sources;

// App modules
pub mod cli;
pub mod config;
pub mod runner;

#[cfg(test)]
mod test_support;

// Re-export commonly used types from core
pub use core::document::{Document, DocumentInput, DocumentKind, DocumentLoader, LoadError, Page, RenderError};
pub use core::navigation::{Keymap, NavIntent};
pub use core::scheduler::RenderScheduler;
pub use core::viewer::{Viewer, ViewerEvent, ViewerStatus};
pub use core::workers::{WorkerPool, Workers};
pub use sources::ImageLoader;
