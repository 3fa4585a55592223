//! Document sources shipped with the crate.
//!
//! Engine-backed paged formats plug in through `DocumentLoader` from the
//! host; only raster images are handled here.

pub mod image_doc;

pub use image_doc::{ImageDocument, ImageLoader};
