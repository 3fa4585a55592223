//! Core engine modules - scheduler, viewer, auto-advance, workers
//!
//! These modules form the viewer engine, independent of any host UI.

pub mod auto_advance;
pub mod clock;
pub mod document;
pub mod error;
pub mod navigation;
pub mod scheduler;
pub mod surface;
pub mod tone;
pub mod viewer;
pub mod workers;

#[cfg(feature = "audio")]
mod audio_cpal;

// Re-exports for convenience
pub use auto_advance::AutoAdvance;
pub use clock::{Clock, SystemClock};
pub use error::ViewerError;
pub use scheduler::{RenderEvent, RenderScheduler, RenderStats};
pub use surface::{RenderGeometry, Surface};
pub use tone::{Tone, ToneGenerator};
pub use viewer::{Viewer, ViewerEvent, ViewerOptions, ViewerStatus, ZoomPolicy};
pub use workers::Workers;
