//! Render scheduler - one surface, one render at a time, latest request wins.
//!
//! **Why**: page renders are slow compared to how fast the user can page or
//! drag the zoom. Queuing every intermediate state would paint pages the user
//! already left, so the scheduler keeps exactly one pending slot and
//! overwrites it.
//!
//! **Used by**: `Viewer` (every page/zoom change), `Viewer::pump` (completions)
//!
//! # Model
//!
//! - Idle: the scheduler owns the `Surface`.
//! - In flight: the surface is moved into a worker job together with the
//!   request. Nobody else can touch it until the job sends it back, so
//!   mutual exclusion needs no lock.
//! - Pending: at most one request, overwritten by each new request.
//!
//! Every request bumps a shared generation counter. A job checks it before
//! fetching the page and again before clearing the surface; if a newer
//! request exists the job hands the surface back untouched (`Superseded`).
//! A paint that already started runs to completion.
//!
//! Documents are tagged with an epoch. Completions from a previous document
//! still return the surface but produce no event.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, trace, warn};

use super::document::{Document, RenderError};
use super::surface::{DEFAULT_OVERSAMPLE, RenderGeometry, Surface};
use super::workers::WorkerPool;

/// Page + zoom the surface should show
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderRequest {
    pub page: u32,
    pub zoom: f32,
    pub issued_at: Instant,
    generation: u64,
}

/// Result of a finished render, reported by `poll()`
#[derive(Clone, Debug, PartialEq)]
pub enum RenderEvent {
    Painted {
        request: RenderRequest,
        geometry: RenderGeometry,
    },
    Failed {
        request: RenderRequest,
        message: String,
    },
    /// A newer request arrived before this one touched the surface
    Superseded { request: RenderRequest },
}

/// Counters for diagnostics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub requested: u64,
    pub started: u64,
    pub painted: u64,
    pub failed: u64,
    pub superseded: u64,
    /// Pending requests overwritten before they started
    pub dropped: u64,
    /// Completions discarded because the document changed
    pub stale: u64,
}

enum JobResult {
    Painted(RenderGeometry),
    Superseded,
    Failed(RenderError),
}

struct Completion {
    epoch: u64,
    request: RenderRequest,
    surface: Surface,
    result: JobResult,
}

pub struct RenderScheduler {
    pool: Arc<dyn WorkerPool>,
    document: Option<Arc<dyn Document>>,
    /// None while a render is in flight
    surface: Option<Surface>,
    in_flight: Option<RenderRequest>,
    pending: Option<RenderRequest>,
    generation: Arc<AtomicU64>,
    epoch: u64,
    oversample: f32,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    stats: RenderStats,
}

impl RenderScheduler {
    pub fn new(pool: Arc<dyn WorkerPool>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            pool,
            document: None,
            surface: Some(Surface::new()),
            in_flight: None,
            pending: None,
            generation: Arc::new(AtomicU64::new(0)),
            epoch: 0,
            oversample: DEFAULT_OVERSAMPLE,
            tx,
            rx,
            stats: RenderStats::default(),
        }
    }

    /// Set oversampling factor for subsequent renders (clamped to 0.5..=8)
    pub fn set_oversample(&mut self, oversample: f32) {
        self.oversample = oversample.clamp(0.5, 8.0);
    }

    pub fn oversample(&self) -> f32 {
        self.oversample
    }

    /// Switch document. Drops the pending request and invalidates the job in
    /// flight; its surface still comes back through `poll()`.
    pub fn set_document(&mut self, document: Option<Arc<dyn Document>>) {
        self.epoch += 1;
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(dropped) = self.pending.take() {
            trace!("Document changed, dropping pending render of page {}", dropped.page);
            self.stats.dropped += 1;
        }
        self.document = document;
        debug!("Render scheduler epoch {}", self.epoch);
    }

    pub fn document(&self) -> Option<&Arc<dyn Document>> {
        self.document.as_ref()
    }

    /// Ask for `page` at `zoom`. Starts right away when idle, otherwise
    /// replaces the pending request.
    pub fn request_render(&mut self, page: u32, zoom: f32) {
        if self.document.is_none() {
            trace!("Render of page {} ignored: no document", page);
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let request = RenderRequest {
            page,
            zoom,
            issued_at: Instant::now(),
            generation,
        };
        self.stats.requested += 1;

        if self.in_flight.is_some() {
            if let Some(old) = self.pending.replace(request) {
                trace!("Pending render page {} @ {:.2} replaced by page {} @ {:.2}", old.page, old.zoom, page, zoom);
                self.stats.dropped += 1;
            } else {
                trace!("Render busy, page {} @ {:.2} pending", page, zoom);
            }
            return;
        }

        self.start(request);
    }

    /// True while a render job owns the surface
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<&RenderRequest> {
        self.in_flight.as_ref()
    }

    pub fn pending(&self) -> Option<&RenderRequest> {
        self.pending.as_ref()
    }

    /// Current surface, None while a render is in flight
    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Apply finished renders, start the pending request if any.
    ///
    /// Call from the main loop.
    pub fn poll(&mut self) -> Vec<RenderEvent> {
        let mut events = Vec::new();

        while let Ok(done) = self.rx.try_recv() {
            self.surface = Some(done.surface);
            self.in_flight = None;

            if done.epoch != self.epoch {
                trace!("Discarding render of page {} from epoch {}", done.request.page, done.epoch);
                self.stats.stale += 1;
            } else {
                events.push(self.record(done.request, done.result));
            }

            if let Some(next) = self.pending.take() {
                self.start(next);
            }
        }

        events
    }

    fn record(&mut self, request: RenderRequest, result: JobResult) -> RenderEvent {
        match result {
            JobResult::Painted(geometry) => {
                self.stats.painted += 1;
                debug!(
                    "Painted page {} @ {:.2} in {:.1}ms",
                    request.page,
                    request.zoom,
                    request.issued_at.elapsed().as_secs_f64() * 1000.0
                );
                RenderEvent::Painted { request, geometry }
            }
            JobResult::Superseded => {
                self.stats.superseded += 1;
                trace!("Render of page {} superseded before painting", request.page);
                RenderEvent::Superseded { request }
            }
            JobResult::Failed(err) => {
                self.stats.failed += 1;
                warn!("Error rendering page {}: {}", request.page, err);
                RenderEvent::Failed {
                    request,
                    message: err.to_string(),
                }
            }
        }
    }

    fn start(&mut self, request: RenderRequest) {
        let Some(document) = self.document.clone() else {
            return;
        };
        let Some(surface) = self.surface.take() else {
            // Unreachable while in_flight tracks the surface; keep the request.
            warn!("Surface unavailable, render of page {} deferred", request.page);
            self.pending = Some(request);
            return;
        };

        self.in_flight = Some(request);
        self.stats.started += 1;
        trace!("Render start: page {} @ {:.2} (gen {})", request.page, request.zoom, request.generation);

        let generation = Arc::clone(&self.generation);
        let tx = self.tx.clone();
        let epoch = self.epoch;
        let oversample = self.oversample;

        self.pool.execute(Box::new(move || {
            let mut surface = surface;
            let result = catch_unwind(AssertUnwindSafe(|| {
                render_page(document.as_ref(), &mut surface, &request, &generation, oversample)
            }));
            let (surface, result) = match result {
                Ok(result) => (surface, result),
                // Surface state unknown after a panic; hand back a fresh one
                Err(_) => (
                    Surface::new(),
                    JobResult::Failed(RenderError::Engine("page renderer panicked".into())),
                ),
            };
            // Receiver gone means the viewer was dropped
            let _ = tx.send(Completion {
                epoch,
                request,
                surface,
                result,
            });
        }));
    }
}

/// Worker-side body of one render
fn render_page(
    document: &dyn Document,
    surface: &mut Surface,
    request: &RenderRequest,
    generation: &AtomicU64,
    oversample: f32,
) -> JobResult {
    let is_current = || generation.load(Ordering::Acquire) == request.generation;

    if !is_current() {
        return JobResult::Superseded;
    }

    let mut page = match document.page(request.page) {
        Ok(page) => page,
        Err(e) => return JobResult::Failed(e),
    };

    if !is_current() {
        page.release();
        return JobResult::Superseded;
    }

    let geometry = RenderGeometry::new(page.size(), request.zoom, oversample);
    surface.prepare(&geometry);
    let result = page.render_to(surface, &geometry);
    page.release();

    match result {
        Ok(()) => {
            surface.mark_painted(request.page, request.zoom);
            JobResult::Painted(geometry)
        }
        Err(e) => JobResult::Failed(e),
    }
}
