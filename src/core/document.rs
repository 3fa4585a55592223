//! Document source contract.
//!
//! The viewer never decodes document formats itself. A [`DocumentLoader`]
//! turns opaque input into a [`Document`], the document hands out [`Page`]s,
//! and a page paints itself onto the [`Surface`] at a given geometry.
//!
//! Loads and renders run on worker threads, so everything here is
//! `Send + Sync`.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use super::surface::{RenderGeometry, Surface};

/// What the loader is asked to open
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentInput {
    /// In-memory document bytes (uploaded file, blob)
    Bytes(Vec<u8>),
    /// File or directory on disk
    Path(PathBuf),
    /// Remote locator; fetching is up to the loader
    Url(String),
}

impl DocumentInput {
    /// Short human-readable description for logs
    pub fn describe(&self) -> String {
        match self {
            DocumentInput::Bytes(b) => format!("<{} bytes>", b.len()),
            DocumentInput::Path(p) => p.display().to_string(),
            DocumentInput::Url(u) => u.clone(),
        }
    }
}

/// Document family. Selects the zoom policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DocumentKind {
    /// Multi-page document rendered by an external engine (PDF and friends)
    #[default]
    Paged,
    /// Raster images shown as pages
    Image,
}

/// Document could not be opened
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot decode document: {0}")]
    Decode(String),
    #[error("document has no pages")]
    Empty,
    #[error("unsupported input: {0}")]
    Unsupported(String),
}

/// Page could not be fetched or painted
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("page {page} out of range 1..={count}")]
    PageOutOfRange { page: u32, count: u32 },
    #[error("cannot decode page {page}: {message}")]
    Decode { page: u32, message: String },
    #[error("drawing surface unavailable")]
    SurfaceUnavailable,
    #[error("{0}")]
    Engine(String),
}

/// Opens documents. Runs on a worker thread.
pub trait DocumentLoader: Send + Sync {
    fn open(&self, input: &DocumentInput) -> Result<Arc<dyn Document>, LoadError>;
}

/// Loaded document handle
pub trait Document: Send + Sync {
    /// Number of pages, always >= 1
    fn page_count(&self) -> u32;

    fn kind(&self) -> DocumentKind;

    /// Fetch page `number` (1-based)
    fn page(&self, number: u32) -> Result<Box<dyn Page>, RenderError>;

    /// Release resources tied to the handle. Called once when the viewer
    /// switches documents or shuts down.
    fn close(&self) {}
}

/// A single page able to paint itself
pub trait Page: Send {
    /// Natural size in display units at zoom 1.0
    fn size(&self) -> (f32, f32);

    /// Paint onto `surface`. The scheduler has already cleared and resized
    /// the surface to `geometry`'s pixel size.
    fn render_to(&self, surface: &mut Surface, geometry: &RenderGeometry) -> Result<(), RenderError>;

    /// Optional cleanup after rendering
    fn release(&mut self) {}
}
