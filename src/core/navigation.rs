//! Navigation intents and the default keymap.
//!
//! Input handlers never touch viewer state directly. They turn key presses
//! into `NavIntent`s, send them over a channel, and the main loop applies
//! them with `Viewer::apply()`.

use std::collections::HashMap;

/// Pixels scrolled by one x/c key press
pub const KEY_SCROLL_STEP: f32 = 150.0;

/// Discrete user intent, one per viewer transition
#[derive(Clone, Debug, PartialEq)]
pub enum NavIntent {
    /// Move by N pages (clamped)
    PageDelta(i32),
    /// Direct page entry; out-of-range is ignored
    JumpToPage(i64),
    /// Zoom by N steps of the document's zoom step
    ZoomDelta(i32),
    ResetView,
    ScrollToTop,
    ScrollToBottom,
    ScrollBy(f32),
    ToggleAutoAdvance,
    /// Shorter dwell
    Faster,
    /// Longer dwell
    Slower,
    SetSound(bool),
    Quit,
}

/// Key name -> intent table
#[derive(Clone, Debug)]
pub struct Keymap {
    bindings: HashMap<String, NavIntent>,
}

impl Default for Keymap {
    fn default() -> Self {
        let mut map = Self::empty();
        map.setup_default_bindings();
        map
    }
}

impl Keymap {
    pub fn empty() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// Bind key (case-insensitive for single letters)
    pub fn bind(&mut self, key: &str, intent: NavIntent) {
        self.bindings.insert(normalize(key), intent);
    }

    pub fn unbind(&mut self, key: &str) {
        self.bindings.remove(&normalize(key));
    }

    pub fn lookup(&self, key: &str) -> Option<NavIntent> {
        self.bindings.get(&normalize(key)).cloned()
    }

    /// Default bindings of the viewer
    pub fn setup_default_bindings(&mut self) {
        use NavIntent::*;

        // Paging
        self.bind("ArrowLeft", PageDelta(-1));
        self.bind("PageUp", PageDelta(-1));
        self.bind("z", PageDelta(-1));
        self.bind("ArrowRight", PageDelta(1));
        self.bind("PageDown", PageDelta(1));
        self.bind("m", PageDelta(1));
        self.bind(",", PageDelta(1));

        // Zoom
        self.bind("+", ZoomDelta(1));
        self.bind("=", ZoomDelta(1));
        self.bind("-", ZoomDelta(-1));
        self.bind("r", ResetView);

        // Scrolling inside the page
        self.bind("o", ScrollToTop);
        self.bind("Home", ScrollToTop);
        self.bind("p", ScrollToBottom);
        self.bind("End", ScrollToBottom);
        self.bind("x", ScrollBy(-KEY_SCROLL_STEP));
        self.bind("c", ScrollBy(KEY_SCROLL_STEP));

        // Auto-advance
        self.bind("s", ToggleAutoAdvance);
        self.bind("]", Faster);
        self.bind("[", Slower);

        self.bind("q", Quit);
    }

    /// Parse one input line: a bound key, `g <n>` / a bare number for direct
    /// page entry, or `sound on|off`.
    pub fn parse_line(&self, line: &str) -> Option<NavIntent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if let Some(intent) = self.lookup(line) {
            return Some(intent);
        }

        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("g" | "goto"), Some(n), None) => n.parse().ok().map(NavIntent::JumpToPage),
            (Some("sound"), Some("on"), None) => Some(NavIntent::SetSound(true)),
            (Some("sound"), Some("off"), None) => Some(NavIntent::SetSound(false)),
            (Some(n), None, None) => n.parse().ok().map(NavIntent::JumpToPage),
            _ => None,
        }
    }
}

fn normalize(key: &str) -> String {
    if key.chars().count() == 1 {
        key.to_lowercase()
    } else {
        key.to_string()
    }
}
