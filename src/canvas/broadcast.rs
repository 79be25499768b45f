//! Fan-out of canvas updates to every attached viewer.

use parking_lot::Mutex;
use rand::Rng;
use ratatui::style::Style;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One cell's new content.
#[derive(Debug, Clone, PartialEq)]
pub struct CellUpdate {
    pub x: u16,
    pub y: u16,
    pub glyph: char,
    pub style: Style,
}

/// Anything that can receive shared canvas content.
///
/// Implementations buffer the content; flushing it to a terminal is the owner's job.
pub trait Viewer: Send + Sync {
    fn set_content(&self, x: u16, y: u16, glyph: char, combining: &[char], style: Style);

    /// Apply a whole frame at once. Implementations that guard their cells with a lock
    /// should take it once here so a concurrent flush never sees half a frame.
    fn apply_frame(&self, updates: &[CellUpdate]) {
        for update in updates {
            self.set_content(update.x, update.y, update.glyph, &[], update.style);
        }
    }
}

/// Registry handle for one attached viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewerId(u64);

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Every currently attached viewer, keyed by a random id.
#[derive(Default)]
pub struct ViewerBroadcast {
    viewers: Mutex<HashMap<ViewerId, Arc<dyn Viewer>>>,
}

impl ViewerBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a viewer under a fresh id.
    ///
    /// Ids are drawn at random until one is free; there is no retry bound.
    pub fn add(&self, viewer: Arc<dyn Viewer>) -> ViewerId {
        let mut viewers = self.viewers.lock();
        let mut rng = rand::thread_rng();
        let id = loop {
            let candidate = ViewerId(rng.gen());
            if !viewers.contains_key(&candidate) {
                break candidate;
            }
        };
        viewers.insert(id, viewer);
        id
    }

    /// Apply one update to every viewer.
    pub fn set_content(&self, x: u16, y: u16, glyph: char, style: Style) {
        let viewers = self.viewers.lock();
        for viewer in viewers.values() {
            viewer.set_content(x, y, glyph, &[], style);
        }
    }

    /// Apply a frame's batch to every viewer while holding the registry lock once.
    pub fn apply_frame(&self, updates: &[CellUpdate]) {
        if updates.is_empty() {
            return;
        }
        let viewers = self.viewers.lock();
        for viewer in viewers.values() {
            viewer.apply_frame(updates);
        }
    }

    /// Detach a viewer. Returns false if the id was not registered.
    pub fn remove(&self, id: ViewerId) -> bool {
        self.viewers.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.viewers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.lock().is_empty()
    }
}
