//! Viewer state machine - page, zoom, status, scroll and auto-advance.
//!
//! **Architecture**: `Viewer` is the single owner of viewer state and lives on
//! the main loop thread. Input handlers, the auto-advance check and render
//! completions all mutate it through `&mut self`, one at a time. Worker
//! threads only ever see data moved into their jobs.
//!
//! **Used by**: main loop (`tick()` + `pump()` every frame), input handling
//! (`apply()`), host code reading `status()` / `surface()`.
//!
//! # Status
//!
//! ```text
//! Idle --open--> Loading --loaded+painted--> Ready
//!                   |                          |
//!                   +--load failed--> Error <--+-- render failed
//! ```
//!
//! A render error stays visible until the next successful render. A load
//! error is terminal for that document.
//!
//! # Session epoch
//!
//! `open()` and `close()` bump a shared epoch. Loads queued for an older epoch
//! are skipped by the pool; loads and renders that finish after the bump are
//! discarded in `pump()` without touching state.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, info, trace, warn};

use super::auto_advance::AutoAdvance;
use super::clock::{Clock, SystemClock};
use super::document::{Document, DocumentInput, DocumentKind, DocumentLoader, LoadError};
use super::error::ViewerError;
use super::navigation::NavIntent;
use super::scheduler::{RenderEvent, RenderScheduler, RenderStats};
use super::surface::{DEFAULT_OVERSAMPLE, Surface};
use super::tone::ToneGenerator;
use super::workers::WorkerPool;

/// Distance from the bottom that still counts as "at bottom"
const BOTTOM_SLACK: f32 = 20.0;

/// Fraction of the viewport scrolled by one auto-advance step
const AUTO_SCROLL_FRACTION: f32 = 0.5;

/// Zoom limits and step for one document kind
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomPolicy {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub default: f32,
}

impl ZoomPolicy {
    pub const PAGED: ZoomPolicy = ZoomPolicy {
        min: 0.5,
        max: 4.0,
        step: 0.25,
        default: 1.0,
    };

    pub const IMAGE: ZoomPolicy = ZoomPolicy {
        min: 0.5,
        max: 2.0,
        step: 0.1,
        default: 1.0,
    };

    pub fn for_kind(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Paged => Self::PAGED,
            DocumentKind::Image => Self::IMAGE,
        }
    }

    /// Clamp to range, rounded to 1/1000 so repeated steps don't drift
    pub fn clamp(&self, zoom: f32) -> f32 {
        let zoom = if zoom.is_finite() { zoom } else { self.default };
        ((zoom * 1000.0).round() / 1000.0).clamp(self.min, self.max)
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub enum ViewerStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error(String),
}

/// Vertical scroll inside the current page
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ScrollState {
    pub top: f32,
    /// Visible height; 0 until the host reports it
    pub viewport_height: f32,
    /// Display height of the painted page
    pub content_height: f32,
}

impl ScrollState {
    pub fn max_top(&self) -> f32 {
        (self.content_height - self.viewport_height).max(0.0)
    }

    pub fn at_bottom(&self) -> bool {
        self.top + self.viewport_height >= self.content_height - BOTTOM_SLACK
    }

    /// There is page content below the viewport
    pub fn can_scroll_down(&self) -> bool {
        self.viewport_height > 0.0 && self.content_height > self.viewport_height && !self.at_bottom()
    }

    pub fn scroll_by(&mut self, dy: f32) {
        self.top = (self.top + dy).clamp(0.0, self.max_top());
    }

    pub fn to_top(&mut self) {
        self.top = 0.0;
    }

    pub fn to_bottom(&mut self) {
        self.top = self.max_top();
    }
}

/// Page/zoom/status snapshot
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ViewerState {
    /// 1-based, 0 while no document is loaded
    pub current_page: u32,
    pub page_count: u32,
    pub zoom: f32,
    pub status: ViewerStatus,
    pub scroll: ScrollState,
}

/// What happened during `pump()` / `tick()`
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerEvent {
    DocumentLoaded { page_count: u32 },
    DocumentFailed(ViewerError),
    PagePainted { page: u32, zoom: f32 },
    RenderFailed(ViewerError),
    /// Auto-advance moved to `page`, or scrolled within it
    AutoAdvanced { page: u32, scrolled: bool },
    /// Auto-advance reached the end of the document and turned itself off
    AutoAdvanceFinished,
}

/// Startup options, usually from `Settings`
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerOptions {
    pub oversample: f32,
    pub dwell_seconds: u32,
    pub sound_enabled: bool,
    pub viewport_height: f32,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            oversample: DEFAULT_OVERSAMPLE,
            dwell_seconds: super::auto_advance::DEFAULT_DWELL_SECS,
            sound_enabled: true,
            viewport_height: 0.0,
        }
    }
}

type LoadResult = (u64, Result<Arc<dyn Document>, LoadError>);

pub struct Viewer {
    state: ViewerState,
    zoom_policy: ZoomPolicy,
    document: Option<Arc<dyn Document>>,
    loader: Arc<dyn DocumentLoader>,
    pool: Arc<dyn WorkerPool>,
    epoch: Arc<AtomicU64>,
    load_tx: Sender<LoadResult>,
    load_rx: Receiver<LoadResult>,
    scheduler: RenderScheduler,
    auto: AutoAdvance,
    tone: ToneGenerator,
    clock: Box<dyn Clock>,
    last_error: Option<ViewerError>,
    /// Current page/zoom has painted (or failed), so `content_height` is real
    page_measured: bool,
}

impl Viewer {
    /// Create an idle viewer.
    ///
    /// `epoch` must be the counter the pool checks in `execute_with_epoch`.
    pub fn new(loader: Arc<dyn DocumentLoader>, pool: Arc<dyn WorkerPool>, epoch: Arc<AtomicU64>) -> Self {
        let clock: Box<dyn Clock> = Box::new(SystemClock);
        let (load_tx, load_rx) = unbounded();
        Self {
            state: ViewerState {
                zoom: ZoomPolicy::PAGED.default,
                ..Default::default()
            },
            zoom_policy: ZoomPolicy::PAGED,
            document: None,
            loader,
            scheduler: RenderScheduler::new(Arc::clone(&pool)),
            pool,
            epoch,
            load_tx,
            load_rx,
            auto: AutoAdvance::new(clock.now()),
            tone: ToneGenerator::system(),
            clock,
            last_error: None,
            page_measured: false,
        }
    }

    pub fn with_options(mut self, options: &ViewerOptions) -> Self {
        self.scheduler.set_oversample(options.oversample);
        self.auto.set_dwell_seconds(options.dwell_seconds);
        self.auto.set_sound_enabled(options.sound_enabled);
        self.state.scroll.viewport_height = options.viewport_height.max(0.0);
        self
    }

    pub fn with_tone(mut self, tone: ToneGenerator) -> Self {
        self.tone = tone;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.auto = AutoAdvance::new(clock.now());
        self.clock = clock;
        self
    }

    // === Accessors ===

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn status(&self) -> &ViewerStatus {
        &self.state.status
    }

    pub fn current_page(&self) -> u32 {
        self.state.current_page
    }

    pub fn page_count(&self) -> u32 {
        self.state.page_count
    }

    pub fn zoom(&self) -> f32 {
        self.state.zoom
    }

    pub fn zoom_policy(&self) -> ZoomPolicy {
        self.zoom_policy
    }

    pub fn scroll(&self) -> &ScrollState {
        &self.state.scroll
    }

    pub fn auto_advance(&self) -> &AutoAdvance {
        &self.auto
    }

    /// Painted surface, None while a render owns it
    pub fn surface(&self) -> Option<&Surface> {
        self.scheduler.surface()
    }

    pub fn render_stats(&self) -> RenderStats {
        self.scheduler.stats()
    }

    pub fn last_error(&self) -> Option<&ViewerError> {
        self.last_error.as_ref()
    }

    pub fn tone(&self) -> &ToneGenerator {
        &self.tone
    }

    pub fn is_loaded(&self) -> bool {
        self.document.is_some()
    }

    // === Document lifecycle ===

    /// Start loading `input`. Replaces the current document.
    pub fn open(&mut self, input: DocumentInput) {
        let epoch = self.invalidate();
        self.state.status = ViewerStatus::Loading;
        info!("Loading document {}", input.describe());

        let loader = Arc::clone(&self.loader);
        let tx = self.load_tx.clone();
        self.pool.execute_with_epoch(
            epoch,
            Box::new(move || {
                let result = catch_unwind(AssertUnwindSafe(|| loader.open(&input)))
                    .unwrap_or_else(|_| Err(LoadError::Decode("document loader panicked".into())));
                // Receiver gone means the viewer was dropped
                let _ = tx.send((epoch, result));
            }),
        );
    }

    /// Drop the current document and go back to Idle
    pub fn close(&mut self) {
        self.invalidate();
        info!("Document closed");
    }

    /// Bump the epoch, release the document, reset state. Returns new epoch.
    fn invalidate(&mut self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(doc) = self.document.take() {
            doc.close();
        }
        self.scheduler.set_document(None);
        self.zoom_policy = ZoomPolicy::PAGED;
        let viewport_height = self.state.scroll.viewport_height;
        self.state = ViewerState {
            zoom: self.zoom_policy.default,
            scroll: ScrollState {
                viewport_height,
                ..Default::default()
            },
            ..Default::default()
        };
        self.last_error = None;
        self.page_measured = false;
        epoch
    }

    fn attach(&mut self, document: Arc<dyn Document>, events: &mut Vec<ViewerEvent>) {
        let page_count = document.page_count();
        if page_count == 0 {
            document.close();
            self.fail_load(LoadError::Empty, events);
            return;
        }

        self.zoom_policy = ZoomPolicy::for_kind(document.kind());
        self.state.page_count = page_count;
        self.state.current_page = 1;
        self.state.zoom = self.zoom_policy.default;
        self.state.scroll.to_top();
        self.scheduler.set_document(Some(Arc::clone(&document)));
        self.document = Some(document);
        self.auto.reset(self.clock.now());
        info!("Document loaded: {} page(s)", page_count);

        events.push(ViewerEvent::DocumentLoaded { page_count });
        self.request_render();
    }

    fn fail_load(&mut self, err: LoadError, events: &mut Vec<ViewerEvent>) {
        warn!("Error loading document: {}", err);
        let error = ViewerError::DocumentLoad(err.to_string());
        self.state.status = ViewerStatus::Error(error.to_string());
        self.last_error = Some(error.clone());
        events.push(ViewerEvent::DocumentFailed(error));
    }

    // === Main loop ===

    /// Apply finished loads and renders. Call once per frame.
    pub fn pump(&mut self) -> Vec<ViewerEvent> {
        let mut events = Vec::new();
        let current_epoch = self.epoch.load(Ordering::Acquire);

        while let Ok((epoch, result)) = self.load_rx.try_recv() {
            if epoch != current_epoch {
                trace!("Discarding load from epoch {}", epoch);
                if let Ok(doc) = result {
                    doc.close();
                }
                continue;
            }
            match result {
                Ok(doc) => self.attach(doc, &mut events),
                Err(e) => self.fail_load(e, &mut events),
            }
        }

        for event in self.scheduler.poll() {
            match event {
                RenderEvent::Painted { request, geometry } => {
                    self.state.status = ViewerStatus::Ready;
                    self.last_error = None;
                    if self.is_current(request.page, request.zoom) {
                        self.state.scroll.content_height = geometry.display_size().1;
                        let top = self.state.scroll.top;
                        self.state.scroll.top = top.clamp(0.0, self.state.scroll.max_top());
                        self.page_measured = true;
                    }
                    events.push(ViewerEvent::PagePainted {
                        page: request.page,
                        zoom: request.zoom,
                    });
                }
                RenderEvent::Failed { request, message } => {
                    let error = ViewerError::PageRender {
                        page: request.page,
                        message,
                    };
                    self.state.status = ViewerStatus::Error(error.to_string());
                    self.last_error = Some(error.clone());
                    if self.is_current(request.page, request.zoom) {
                        // Nothing to scroll on a failed page
                        self.state.scroll.content_height = 0.0;
                        self.state.scroll.top = 0.0;
                        self.page_measured = true;
                    }
                    events.push(ViewerEvent::RenderFailed(error));
                }
                RenderEvent::Superseded { .. } => {}
            }
        }

        if self.document.is_some()
            && self.scheduler.is_busy()
            && !matches!(self.state.status, ViewerStatus::Error(_))
        {
            self.state.status = ViewerStatus::Loading;
        }

        events
    }

    /// Auto-advance check. Call every frame; does work at most once a second.
    pub fn tick(&mut self) -> Option<ViewerEvent> {
        let now = self.clock.now();
        if self.document.is_none() || !self.auto.check(now) {
            return None;
        }
        if self.state.scroll.viewport_height > 0.0 && !self.page_measured {
            // Dwell stays due; retried on the next check once the page paints
            trace!("Auto-advance: waiting for page {} geometry", self.state.current_page);
            return None;
        }

        let event = if self.state.scroll.can_scroll_down() {
            let step = self.state.scroll.viewport_height * AUTO_SCROLL_FRACTION;
            self.state.scroll.scroll_by(step);
            trace!("Auto-advance: scrolled to {:.0}", self.state.scroll.top);
            ViewerEvent::AutoAdvanced {
                page: self.state.current_page,
                scrolled: true,
            }
        } else if self.change_page(1) {
            debug!("Auto-advance: page {}", self.state.current_page);
            ViewerEvent::AutoAdvanced {
                page: self.state.current_page,
                scrolled: false,
            }
        } else {
            info!("Auto-advance reached the last page, stopping");
            self.auto.set_active(false, now);
            return Some(ViewerEvent::AutoAdvanceFinished);
        };

        self.auto.mark_advanced(now);
        if self.auto.sound_enabled() {
            self.tone.play();
        }
        Some(event)
    }

    // === Transitions ===

    /// Apply a navigation intent. Returns true if anything changed.
    pub fn apply(&mut self, intent: NavIntent) -> bool {
        trace!("Intent: {:?}", intent);
        match intent {
            NavIntent::PageDelta(delta) => self.change_page(delta),
            NavIntent::JumpToPage(n) => self.jump_to_page(n),
            NavIntent::ZoomDelta(steps) => self.zoom_by(steps),
            NavIntent::ResetView => self.reset_view(),
            NavIntent::ScrollToTop => self.scroll_to_top(),
            NavIntent::ScrollToBottom => self.scroll_to_bottom(),
            NavIntent::ScrollBy(dy) => self.scroll_by(dy),
            NavIntent::ToggleAutoAdvance => {
                let now = self.clock.now();
                let active = self.auto.toggle(now);
                info!("Auto-advance {}", if active { "ON" } else { "OFF" });
                true
            }
            NavIntent::Faster => {
                self.auto.faster();
                true
            }
            NavIntent::Slower => {
                self.auto.slower();
                true
            }
            NavIntent::SetSound(enabled) => {
                self.set_sound_enabled(enabled);
                true
            }
            NavIntent::Quit => false,
        }
    }

    /// Move by `delta` pages, clamped to the document. Resets the dwell clock.
    pub fn change_page(&mut self, delta: i32) -> bool {
        if self.document.is_none() {
            return false;
        }
        let target = (self.state.current_page as i64 + delta as i64).clamp(1, self.state.page_count as i64) as u32;
        if target == self.state.current_page {
            return false;
        }
        self.go_to(target);
        true
    }

    /// Direct page entry. Out-of-range input is ignored.
    pub fn jump_to_page(&mut self, page: i64) -> bool {
        if self.document.is_none() || page < 1 || page > self.state.page_count as i64 {
            trace!("Jump to page {} rejected", page);
            return false;
        }
        let page = page as u32;
        if page == self.state.current_page {
            // Same page: scroll and dwell restart, re-render only after an error
            self.state.scroll.to_top();
            self.auto.reset(self.clock.now());
            if self.has_error() {
                self.request_render();
            }
            return true;
        }
        self.go_to(page);
        true
    }

    /// Direct page entry from text (page number field)
    pub fn jump_to_page_input(&mut self, input: &str) -> bool {
        match input.trim().parse::<i64>() {
            Ok(page) => self.jump_to_page(page),
            Err(_) => {
                trace!("Jump input {:?} is not a number", input);
                false
            }
        }
    }

    fn go_to(&mut self, page: u32) {
        self.state.current_page = page;
        self.state.scroll.to_top();
        self.auto.reset(self.clock.now());
        self.request_render();
    }

    /// Set zoom (clamped). Does not reset the dwell clock.
    pub fn set_zoom(&mut self, zoom: f32) -> bool {
        if self.document.is_none() {
            return false;
        }
        let zoom = self.zoom_policy.clamp(zoom);
        if (zoom - self.state.zoom).abs() < f32::EPSILON {
            return false;
        }
        trace!("Zoom {:.2} -> {:.2}", self.state.zoom, zoom);
        self.state.zoom = zoom;
        self.request_render();
        true
    }

    /// Zoom by `steps` of the document's zoom step
    pub fn zoom_by(&mut self, steps: i32) -> bool {
        self.set_zoom(self.state.zoom + steps as f32 * self.zoom_policy.step)
    }

    /// Page 1, default zoom, scroll to top, dwell restart
    pub fn reset_view(&mut self) -> bool {
        if self.document.is_none() {
            return false;
        }
        let zoom = self.zoom_policy.default;
        let changed = self.state.current_page != 1 || (self.state.zoom - zoom).abs() >= f32::EPSILON;
        self.state.current_page = 1;
        self.state.zoom = zoom;
        self.state.scroll.to_top();
        self.auto.reset(self.clock.now());
        if changed || self.has_error() {
            self.request_render();
        }
        true
    }

    pub fn scroll_by(&mut self, dy: f32) -> bool {
        let before = self.state.scroll.top;
        self.state.scroll.scroll_by(dy);
        self.state.scroll.top != before
    }

    pub fn scroll_to_top(&mut self) -> bool {
        let before = self.state.scroll.top;
        self.state.scroll.to_top();
        self.state.scroll.top != before
    }

    /// Jump to the page bottom. Counts as manual navigation: dwell restarts.
    pub fn scroll_to_bottom(&mut self) -> bool {
        self.state.scroll.to_bottom();
        self.auto.reset(self.clock.now());
        true
    }

    /// Host reports the visible height
    pub fn set_viewport_height(&mut self, height: f32) {
        self.state.scroll.viewport_height = height.max(0.0);
        let max = self.state.scroll.max_top();
        self.state.scroll.top = self.state.scroll.top.min(max);
    }

    // === Auto-advance controls ===

    pub fn toggle_auto_advance(&mut self) -> bool {
        self.apply(NavIntent::ToggleAutoAdvance);
        self.auto.is_active()
    }

    pub fn set_auto_advance(&mut self, active: bool) {
        let now = self.clock.now();
        self.auto.set_active(active, now);
    }

    pub fn set_dwell_seconds(&mut self, seconds: u32) {
        self.auto.set_dwell_seconds(seconds);
    }

    pub fn set_sound_enabled(&mut self, enabled: bool) {
        self.auto.set_sound_enabled(enabled);
    }

    fn request_render(&mut self) {
        self.scheduler.request_render(self.state.current_page, self.state.zoom);
        self.page_measured = false;
        if !self.has_error() {
            self.state.status = ViewerStatus::Loading;
        }
    }

    fn has_error(&self) -> bool {
        matches!(self.state.status, ViewerStatus::Error(_))
    }

    fn is_current(&self, page: u32, zoom: f32) -> bool {
        page == self.state.current_page && (zoom - self.state.zoom).abs() < f32::EPSILON
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        // Anything still running finishes into a closed channel
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(doc) = self.document.take() {
            doc.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tone::{AudioError, AudioOutput, Tone};
    use crate::test_support::{ManualClock, ManualPool, MapLoader, RecordingDocument};
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Harness {
        viewer: Viewer,
        pool: Arc<ManualPool>,
        clock: ManualClock,
        loader: Arc<MapLoader>,
        beeps: Rc<Cell<u32>>,
        opens: Rc<Cell<u32>>,
    }

    struct CountingOutput(Rc<Cell<u32>>);

    impl AudioOutput for CountingOutput {
        fn sample_rate(&self) -> u32 {
            8_000
        }
        fn play(&mut self, _samples: &[f32]) -> Result<(), AudioError> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    fn harness(loader: MapLoader) -> Harness {
        let epoch = Arc::new(AtomicU64::new(0));
        let pool = Arc::new(ManualPool::with_epoch(Arc::clone(&epoch)));
        let loader = Arc::new(loader);
        let clock = ManualClock::default();
        let beeps = Rc::new(Cell::new(0));
        let opens = Rc::new(Cell::new(0));
        let (b, o) = (Rc::clone(&beeps), Rc::clone(&opens));
        let tone = ToneGenerator::new(
            Tone::default(),
            Box::new(move || {
                o.set(o.get() + 1);
                Ok(Box::new(CountingOutput(Rc::clone(&b))) as Box<dyn AudioOutput>)
            }),
        );
        let viewer = Viewer::new(loader.clone(), pool.clone(), epoch)
            .with_clock(Box::new(clock.clone()))
            .with_tone(tone);
        Harness {
            viewer,
            pool,
            clock,
            loader,
            beeps,
            opens,
        }
    }

    impl Harness {
        /// Run all jobs and pump until quiet
        fn settle(&mut self) -> Vec<ViewerEvent> {
            let mut events = Vec::new();
            loop {
                events.extend(self.viewer.pump());
                if !self.pool.run_next() {
                    break;
                }
            }
            events
        }

        fn open(&mut self, name: &str) -> Vec<ViewerEvent> {
            self.viewer.open(DocumentInput::Url(name.into()));
            self.settle()
        }

        fn tick_secs(&mut self, secs: u64) -> Option<ViewerEvent> {
            self.clock.advance_secs(secs);
            let event = self.viewer.tick();
            self.settle();
            event
        }
    }

    fn loaded(pages: u32) -> Harness {
        let mut h = harness(MapLoader::default().with("doc", RecordingDocument::new(pages)));
        h.open("doc");
        h
    }

    #[test]
    fn test_open_renders_first_page() {
        let mut h = harness(MapLoader::default().with("doc", RecordingDocument::new(5)));
        h.viewer.open(DocumentInput::Url("doc".into()));
        assert_eq!(*h.viewer.status(), ViewerStatus::Loading);

        let events = h.settle();
        assert_eq!(events[0], ViewerEvent::DocumentLoaded { page_count: 5 });
        assert_eq!(events[1], ViewerEvent::PagePainted { page: 1, zoom: 1.0 });
        assert_eq!(*h.viewer.status(), ViewerStatus::Ready);
        assert_eq!(h.viewer.current_page(), 1);
        assert_eq!(h.viewer.page_count(), 5);
        assert_eq!(h.viewer.surface().unwrap().painted(), Some((1, 1.0)));
    }

    struct PanickingLoader;

    impl DocumentLoader for PanickingLoader {
        fn open(&self, _input: &DocumentInput) -> Result<Arc<dyn Document>, LoadError> {
            panic!("decoder bug");
        }
    }

    #[test]
    fn test_loader_panic_is_error() {
        let epoch = Arc::new(AtomicU64::new(0));
        let pool = Arc::new(ManualPool::with_epoch(Arc::clone(&epoch)));
        let mut viewer = Viewer::new(Arc::new(PanickingLoader), pool.clone(), epoch);
        viewer.open(DocumentInput::Url("doc".into()));
        assert!(pool.run_next());

        let events = viewer.pump();
        assert!(matches!(events[0], ViewerEvent::DocumentFailed(ViewerError::DocumentLoad(_))));
        assert!(matches!(viewer.status(), ViewerStatus::Error(_)));
        assert!(matches!(viewer.last_error(), Some(ViewerError::DocumentLoad(msg)) if msg.contains("panicked")));
    }

    #[test]
    fn test_open_failure_is_error() {
        let mut h = harness(MapLoader::default());
        let events = h.open("missing");
        assert!(matches!(events[0], ViewerEvent::DocumentFailed(ViewerError::DocumentLoad(_))));
        assert!(matches!(h.viewer.status(), ViewerStatus::Error(msg) if msg.starts_with("Failed to load document")));
        assert!(!h.viewer.change_page(1));
    }

    #[test]
    fn test_change_page_stays_in_bounds() {
        let mut h = loaded(10);
        for delta in [-100, -1, 0, 1, 3, 9, 100, i32::MIN, i32::MAX] {
            for start in 1..=10 {
                h.viewer.jump_to_page(start);
                h.viewer.change_page(delta);
                let page = h.viewer.current_page();
                assert!((1..=10).contains(&page), "delta {} from {} gave {}", delta, start, page);
            }
        }
    }

    #[test]
    fn test_change_page_noop_at_bounds() {
        let mut h = loaded(3);
        assert!(!h.viewer.change_page(-1));
        h.settle();
        let requested = h.viewer.render_stats().requested;
        assert!(h.viewer.change_page(5));
        assert_eq!(h.viewer.current_page(), 3);
        assert!(!h.viewer.change_page(1));
        assert_eq!(h.viewer.render_stats().requested, requested + 1);
    }

    #[test]
    fn test_jump_rejects_out_of_range() {
        let mut h = loaded(10);
        h.viewer.jump_to_page(4);
        h.settle();

        assert!(!h.viewer.jump_to_page(0));
        assert!(!h.viewer.jump_to_page(11));
        assert!(!h.viewer.jump_to_page_input("abc"));
        assert!(!h.viewer.jump_to_page_input("4.5"));
        assert_eq!(h.viewer.current_page(), 4);
        assert_eq!(*h.viewer.status(), ViewerStatus::Ready);

        assert!(h.viewer.jump_to_page_input(" 10 "));
        assert_eq!(h.viewer.current_page(), 10);
    }

    #[test]
    fn test_zoom_clamped_per_kind() {
        let mut h = loaded(2);
        assert!(h.viewer.set_zoom(10.0));
        assert_eq!(h.viewer.zoom(), 4.0);
        assert!(h.viewer.set_zoom(0.1));
        assert_eq!(h.viewer.zoom(), 0.5);
        assert!(!h.viewer.zoom_by(-1));

        let mut h = harness(
            MapLoader::default().with("img", RecordingDocument::new(1).with_kind(DocumentKind::Image)),
        );
        h.open("img");
        assert!(h.viewer.set_zoom(3.0));
        assert_eq!(h.viewer.zoom(), 2.0);
        h.viewer.set_zoom(1.0);
        h.viewer.zoom_by(3);
        assert!((h.viewer.zoom() - 1.3).abs() < 1e-6);
    }

    #[test]
    fn test_zoom_mid_render_paints_final_zoom() {
        let mut h = loaded(10);
        h.viewer.jump_to_page(4);
        h.viewer.set_zoom(1.5);
        h.viewer.set_zoom(2.0);
        h.settle();

        assert_eq!(h.viewer.surface().unwrap().painted(), Some((4, 2.0)));
        assert_eq!(*h.viewer.status(), ViewerStatus::Ready);
    }

    #[test]
    fn test_rapid_paging_paints_last_page_only() {
        let mut h = loaded(10);
        let doc = h.loader.get("doc");
        h.viewer.jump_to_page(3);
        h.viewer.jump_to_page(7);
        h.settle();

        assert_eq!(RecordingDocument::painted_pages(&doc.paints), vec![1, 7]);
        assert_eq!(h.viewer.current_page(), 7);
    }

    #[test]
    fn test_render_error_does_not_block_navigation() {
        let mut h = harness(MapLoader::default().with("doc", RecordingDocument::new(5).failing_on(2)));
        h.open("doc");
        h.viewer.change_page(1);
        let events = h.settle();
        assert!(matches!(events[0], ViewerEvent::RenderFailed(ViewerError::PageRender { page: 2, .. })));
        assert!(matches!(h.viewer.status(), ViewerStatus::Error(_)));

        assert!(h.viewer.change_page(1));
        // Error stays up until a render succeeds
        assert!(matches!(h.viewer.status(), ViewerStatus::Error(_)));
        h.settle();
        assert_eq!(*h.viewer.status(), ViewerStatus::Ready);
        assert_eq!(h.viewer.current_page(), 3);
        assert!(h.viewer.last_error().is_none());
    }

    #[test]
    fn test_same_page_jump_retries_failed_render() {
        let mut h = harness(MapLoader::default().with("doc", RecordingDocument::new(2).failing_on(1)));
        h.open("doc");
        assert!(matches!(h.viewer.status(), ViewerStatus::Error(_)));

        let requested = h.viewer.render_stats().requested;
        assert!(h.viewer.jump_to_page(1));
        assert_eq!(h.viewer.render_stats().requested, requested + 1);
        h.settle();
        assert!(h.viewer.reset_view());
        assert_eq!(h.viewer.render_stats().requested, requested + 2);

        // Healthy page: a same-page jump only restarts scroll and dwell
        h.settle();
        h.viewer.jump_to_page(2);
        h.settle();
        assert_eq!(*h.viewer.status(), ViewerStatus::Ready);
        let requested = h.viewer.render_stats().requested;
        assert!(h.viewer.jump_to_page(2));
        assert_eq!(h.viewer.render_stats().requested, requested);
    }

    #[test]
    fn test_reopen_discards_stale_load() {
        let loader = MapLoader::default()
            .with("a", RecordingDocument::new(3).with_id(1))
            .with("b", RecordingDocument::new(8).with_id(2));
        let mut h = harness(loader);
        h.viewer.open(DocumentInput::Url("a".into()));
        h.pool.run_next(); // "a" finished loading but not pumped
        h.viewer.open(DocumentInput::Url("b".into()));
        h.settle();

        let a = h.loader.get("a");
        assert_eq!(h.viewer.page_count(), 8);
        assert!(RecordingDocument::painted_pages(&a.paints).is_empty());
        assert_eq!(a.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_goes_idle_and_drops_pending() {
        let mut h = loaded(4);
        h.viewer.change_page(1);
        h.viewer.close();
        h.settle();

        assert_eq!(*h.viewer.status(), ViewerStatus::Idle);
        assert_eq!(h.viewer.page_count(), 0);
        assert_eq!(h.loader.get("doc").closed.load(Ordering::SeqCst), 1);
        assert!(h.viewer.surface().is_some());
    }

    #[test]
    fn test_reset_view() {
        let mut h = loaded(6);
        h.viewer.jump_to_page(5);
        h.viewer.set_zoom(2.5);
        h.viewer.set_viewport_height(100.0);
        h.settle();
        h.viewer.scroll_by(80.0);

        assert!(h.viewer.reset_view());
        h.settle();
        assert_eq!(h.viewer.current_page(), 1);
        assert_eq!(h.viewer.zoom(), 1.0);
        assert_eq!(h.viewer.scroll().top, 0.0);
        assert_eq!(h.viewer.surface().unwrap().painted(), Some((1, 1.0)));
    }

    #[test]
    fn test_auto_advance_walks_to_last_page() {
        let mut h = loaded(5);
        h.viewer.set_dwell_seconds(1);
        h.viewer.toggle_auto_advance();

        for expected in 2..=5 {
            let event = h.tick_secs(1);
            assert_eq!(event, Some(ViewerEvent::AutoAdvanced { page: expected, scrolled: false }));
        }
        assert_eq!(h.viewer.current_page(), 5);
        assert_eq!(h.viewer.surface().unwrap().painted(), Some((5, 1.0)));
        assert_eq!(h.beeps.get(), 4);

        let requested = h.viewer.render_stats().requested;
        assert_eq!(h.tick_secs(1), Some(ViewerEvent::AutoAdvanceFinished));
        assert!(!h.viewer.auto_advance().is_active());
        assert_eq!(h.tick_secs(1), None);
        assert_eq!(h.viewer.render_stats().requested, requested);
        assert_eq!(h.beeps.get(), 4);
    }

    #[test]
    fn test_manual_navigation_restarts_dwell() {
        let mut h = loaded(10);
        h.viewer.set_dwell_seconds(5);
        h.viewer.toggle_auto_advance();

        h.clock.advance(Duration::from_millis(4_500));
        h.viewer.change_page(1); // manual at t=4.5s
        for _ in 0..5 {
            h.clock.advance(Duration::from_millis(900));
            assert_eq!(h.viewer.tick(), None);
        }
        // t = 9.0s, 4.5s since the manual change; the check at t = 10s fires
        h.clock.advance(Duration::from_millis(1_000));
        assert!(matches!(h.viewer.tick(), Some(ViewerEvent::AutoAdvanced { page: 3, .. })));
    }

    #[test]
    fn test_zoom_does_not_restart_dwell() {
        let mut h = loaded(10);
        h.viewer.set_dwell_seconds(2);
        h.viewer.toggle_auto_advance();
        h.tick_secs(1);
        h.viewer.zoom_by(1);
        assert!(matches!(h.tick_secs(1), Some(ViewerEvent::AutoAdvanced { page: 2, .. })));
    }

    #[test]
    fn test_auto_advance_scrolls_tall_page_first() {
        let mut h = loaded(3);
        // Recording pages are 100 tall at zoom 1.0
        h.viewer.set_viewport_height(40.0);
        h.viewer.set_dwell_seconds(1);
        h.viewer.toggle_auto_advance();

        assert_eq!(h.tick_secs(1), Some(ViewerEvent::AutoAdvanced { page: 1, scrolled: true }));
        assert_eq!(h.viewer.scroll().top, 20.0);
        assert_eq!(h.tick_secs(1), Some(ViewerEvent::AutoAdvanced { page: 1, scrolled: true }));
        assert_eq!(h.viewer.scroll().top, 40.0);
        // 40 + 40 >= 100 - 20: at bottom, next step turns the page
        assert_eq!(h.tick_secs(1), Some(ViewerEvent::AutoAdvanced { page: 2, scrolled: false }));
        assert_eq!(h.viewer.scroll().top, 0.0);
    }

    #[test]
    fn test_auto_advance_waits_for_page_geometry() {
        let doc = RecordingDocument::new(3).with_page_height(2, 400.0);
        let mut h = harness(MapLoader::default().with("doc", doc));
        h.open("doc");
        h.viewer.set_viewport_height(100.0);
        h.viewer.set_dwell_seconds(1);
        h.viewer.toggle_auto_advance();

        h.clock.advance_secs(1);
        assert_eq!(h.viewer.tick(), Some(ViewerEvent::AutoAdvanced { page: 2, scrolled: false }));
        // Page 2 has not painted yet; page 1's height must not be reused
        h.clock.advance_secs(1);
        assert_eq!(h.viewer.tick(), None);
        assert_eq!(h.viewer.current_page(), 2);

        h.settle();
        assert_eq!(h.viewer.scroll().content_height, 400.0);
        h.clock.advance_secs(1);
        assert_eq!(h.viewer.tick(), Some(ViewerEvent::AutoAdvanced { page: 2, scrolled: true }));
        assert_eq!(h.viewer.scroll().top, 50.0);
    }

    #[test]
    fn test_auto_advance_passes_failed_page() {
        let mut h = harness(MapLoader::default().with("doc", RecordingDocument::new(3).failing_on(2)));
        h.open("doc");
        h.viewer.set_viewport_height(100.0);
        h.viewer.set_dwell_seconds(1);
        h.viewer.toggle_auto_advance();

        assert_eq!(h.tick_secs(1), Some(ViewerEvent::AutoAdvanced { page: 2, scrolled: false }));
        assert!(matches!(h.viewer.status(), ViewerStatus::Error(_)));
        assert_eq!(h.tick_secs(1), Some(ViewerEvent::AutoAdvanced { page: 3, scrolled: false }));
    }

    #[test]
    fn test_sound_toggle() {
        let mut h = loaded(10);
        h.viewer.set_dwell_seconds(1);
        h.viewer.toggle_auto_advance();

        h.viewer.set_sound_enabled(false);
        h.tick_secs(1);
        h.tick_secs(1);
        assert_eq!(h.beeps.get(), 0);
        assert_eq!(h.opens.get(), 0);

        h.viewer.apply(NavIntent::SetSound(true));
        h.tick_secs(1);
        h.tick_secs(1);
        assert_eq!(h.beeps.get(), 2);
        assert_eq!(h.opens.get(), 1);
        assert_eq!(h.viewer.tone().played(), 2);
        assert_eq!(h.viewer.current_page(), 5);
    }

    #[test]
    fn test_scroll_to_bottom_restarts_dwell() {
        let mut h = loaded(10);
        h.viewer.set_dwell_seconds(2);
        h.viewer.toggle_auto_advance();
        h.tick_secs(1);
        h.viewer.apply(NavIntent::ScrollToBottom);
        assert_eq!(h.tick_secs(1), None);
        assert!(h.tick_secs(1).is_some());
    }

    #[test]
    fn test_no_document_ignores_navigation() {
        let mut h = harness(MapLoader::default());
        assert!(!h.viewer.apply(NavIntent::PageDelta(1)));
        assert!(!h.viewer.apply(NavIntent::ZoomDelta(1)));
        assert!(!h.viewer.apply(NavIntent::ResetView));
        h.viewer.toggle_auto_advance();
        assert_eq!(h.tick_secs(30), None);
        assert_eq!(h.pool.queued(), 0);
    }
}
