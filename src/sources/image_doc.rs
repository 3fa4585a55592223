//! Image documents backed by the `image` crate.
//!
//! - bytes / single file: one page
//! - directory: one page per supported image, sorted by file name
//!
//! Directory pages only read headers at load time; pixels are decoded when
//! the page is fetched for rendering, on the worker thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbaImage;
use log::{debug, info, warn};

use crate::core::document::{
    Document, DocumentInput, DocumentKind, DocumentLoader, LoadError, Page, RenderError,
};
use crate::core::surface::{RenderGeometry, Surface};

/// Extensions picked up when scanning a directory
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "tga", "bmp", "gif"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Loads image documents from bytes, files and directories
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageLoader;

impl ImageLoader {
    fn from_bytes(bytes: &[u8]) -> Result<ImageDocument, LoadError> {
        let img = image::load_from_memory(bytes).map_err(|e| LoadError::Decode(e.to_string()))?;
        Ok(ImageDocument::single(PageSource::Decoded(Arc::new(img.to_rgba8()))))
    }

    fn from_file(path: &Path) -> Result<ImageDocument, LoadError> {
        let img = image::open(path).map_err(|e| LoadError::Decode(format!("{}: {}", path.display(), e)))?;
        Ok(ImageDocument::single(PageSource::Decoded(Arc::new(img.to_rgba8()))))
    }

    fn from_dir(dir: &Path) -> Result<ImageDocument, LoadError> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image_file(p))
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut pages = Vec::with_capacity(files.len());
        for path in files {
            match image::image_dimensions(&path) {
                Ok(size) => pages.push(PageSource::File { path, size }),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        if pages.is_empty() {
            return Err(LoadError::Empty);
        }
        Ok(ImageDocument { pages })
    }
}

impl DocumentLoader for ImageLoader {
    fn open(&self, input: &DocumentInput) -> Result<Arc<dyn Document>, LoadError> {
        let document = match input {
            DocumentInput::Bytes(bytes) => Self::from_bytes(bytes)?,
            DocumentInput::Path(path) => {
                // Surfaces missing paths as Io, not Decode
                let meta = std::fs::metadata(path)?;
                if meta.is_dir() {
                    Self::from_dir(path)?
                } else {
                    Self::from_file(path)?
                }
            }
            DocumentInput::Url(url) => return Err(LoadError::Unsupported(format!("remote input {}", url))),
        };
        info!("Image document: {} page(s) from {}", document.pages.len(), input.describe());
        Ok(Arc::new(document))
    }
}

enum PageSource {
    Decoded(Arc<RgbaImage>),
    /// Decoded on demand
    File { path: PathBuf, size: (u32, u32) },
}

pub struct ImageDocument {
    pages: Vec<PageSource>,
}

impl ImageDocument {
    fn single(source: PageSource) -> Self {
        Self { pages: vec![source] }
    }
}

impl Document for ImageDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn kind(&self) -> DocumentKind {
        DocumentKind::Image
    }

    fn page(&self, number: u32) -> Result<Box<dyn Page>, RenderError> {
        let count = self.page_count();
        let source = number
            .checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .ok_or(RenderError::PageOutOfRange { page: number, count })?;

        let image = match source {
            PageSource::Decoded(img) => Arc::clone(img),
            PageSource::File { path, size } => {
                debug!("Decoding page {} from {}", number, path.display());
                let img = image::open(path).map_err(|e| RenderError::Decode {
                    page: number,
                    message: e.to_string(),
                })?;
                let img = img.to_rgba8();
                if img.dimensions() != *size {
                    warn!(
                        "{} changed size since load: {:?} -> {:?}",
                        path.display(),
                        size,
                        img.dimensions()
                    );
                }
                Arc::new(img)
            }
        };
        Ok(Box::new(ImagePage { image }))
    }
}

struct ImagePage {
    image: Arc<RgbaImage>,
}

impl Page for ImagePage {
    fn size(&self) -> (f32, f32) {
        let (w, h) = self.image.dimensions();
        (w as f32, h as f32)
    }

    fn render_to(&self, surface: &mut Surface, geometry: &RenderGeometry) -> Result<(), RenderError> {
        let (w, h) = geometry.pixel_size();
        let target = surface.pixels_mut();
        if target.dimensions() != (w, h) {
            return Err(RenderError::SurfaceUnavailable);
        }
        if self.image.dimensions() == (w, h) {
            imageops::overlay(target, self.image.as_ref(), 0, 0);
        } else {
            let scaled = imageops::resize(self.image.as_ref(), w, h, FilterType::Triangle);
            imageops::overlay(target, &scaled, 0, 0);
        }
        Ok(())
    }
}
