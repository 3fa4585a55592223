//! Deterministic doubles shared by unit tests.
//!
//! `ManualPool` queues jobs until the test runs them, which lets tests
//! interleave requests with render completions exactly.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use image::Rgba;

use crate::core::clock::Clock;
use crate::core::document::{
    Document, DocumentInput, DocumentKind, DocumentLoader, LoadError, Page, RenderError,
};
use crate::core::surface::{RenderGeometry, Surface};
use crate::core::workers::{Job, WorkerPool};

/// Worker pool that runs jobs only when asked to
#[derive(Default)]
pub struct ManualPool {
    jobs: Mutex<VecDeque<(Option<u64>, Job)>>,
    epoch: Arc<AtomicU64>,
}

impl ManualPool {
    pub fn with_epoch(epoch: Arc<AtomicU64>) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            epoch,
        }
    }

    /// Run the oldest queued job. Returns false if nothing was queued.
    pub fn run_next(&self) -> bool {
        let next = self.jobs.lock().unwrap().pop_front();
        match next {
            Some((Some(epoch), job)) => {
                if self.epoch.load(Ordering::Acquire) == epoch {
                    job();
                }
                true
            }
            Some((None, job)) => {
                job();
                true
            }
            None => false,
        }
    }

    pub fn queued(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

impl WorkerPool for ManualPool {
    fn execute(&self, job: Job) {
        self.jobs.lock().unwrap().push_back((None, job));
    }

    fn execute_with_epoch(&self, epoch: u64, job: Job) {
        self.jobs.lock().unwrap().push_back((Some(epoch), job));
    }
}

/// Shared log of every paint: (document id, page, zoom)
pub type PaintLog = Arc<Mutex<Vec<(u32, u32, f32)>>>;

/// In-memory document that records paints
pub struct RecordingDocument {
    pub id: u32,
    pub pages: u32,
    pub kind: DocumentKind,
    pub failing: HashSet<u32>,
    pub heights: HashMap<u32, f32>,
    pub paints: PaintLog,
    pub closed: Arc<AtomicUsize>,
}

impl RecordingDocument {
    pub fn new(pages: u32) -> Self {
        Self {
            id: 0,
            pages,
            kind: DocumentKind::Paged,
            failing: HashSet::new(),
            heights: HashMap::new(),
            paints: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    pub fn failing_on(mut self, page: u32) -> Self {
        self.failing.insert(page);
        self
    }

    /// Natural height of `page`; pages default to 50x100
    pub fn with_page_height(mut self, page: u32, height: f32) -> Self {
        self.heights.insert(page, height);
        self
    }

    pub fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Pages painted so far, in order
    pub fn painted_pages(log: &PaintLog) -> Vec<u32> {
        log.lock().unwrap().iter().map(|(_, page, _)| *page).collect()
    }
}

impl Document for RecordingDocument {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn kind(&self) -> DocumentKind {
        self.kind
    }

    fn page(&self, number: u32) -> Result<Box<dyn Page>, RenderError> {
        if number == 0 || number > self.pages {
            return Err(RenderError::PageOutOfRange {
                page: number,
                count: self.pages,
            });
        }
        Ok(Box::new(RecordingPage {
            doc: self.id,
            number,
            fail: self.failing.contains(&number),
            height: self.heights.get(&number).copied().unwrap_or(100.0),
            paints: Arc::clone(&self.paints),
        }))
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct RecordingPage {
    doc: u32,
    number: u32,
    fail: bool,
    height: f32,
    paints: PaintLog,
}

impl Page for RecordingPage {
    fn size(&self) -> (f32, f32) {
        (50.0, self.height)
    }

    fn render_to(&self, surface: &mut Surface, geometry: &RenderGeometry) -> Result<(), RenderError> {
        if self.fail {
            return Err(RenderError::Engine(format!("broken page {}", self.number)));
        }
        let shade = (self.number % 256) as u8;
        surface.pixels_mut().put_pixel(0, 0, Rgba([shade, shade, shade, 255]));
        self.paints
            .lock()
            .unwrap()
            .push((self.doc, self.number, geometry.zoom));
        Ok(())
    }
}

/// Loader keyed by `DocumentInput::describe()`; unknown inputs fail to decode
#[derive(Default)]
pub struct MapLoader {
    documents: HashMap<String, Arc<RecordingDocument>>,
}

impl MapLoader {
    pub fn with(mut self, name: &str, document: RecordingDocument) -> Self {
        self.documents.insert(name.to_string(), Arc::new(document));
        self
    }

    pub fn get(&self, name: &str) -> Arc<RecordingDocument> {
        Arc::clone(&self.documents[name])
    }
}

impl DocumentLoader for MapLoader {
    fn open(&self, input: &DocumentInput) -> Result<Arc<dyn Document>, LoadError> {
        match self.documents.get(&input.describe()) {
            Some(doc) => Ok(Arc::clone(doc) as Arc<dyn Document>),
            None => Err(LoadError::Decode("not a document".into())),
        }
    }
}

/// Clock moved by hand
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}
