//! The shared, fading canvas.
//!
//! All sessions draw into one [`DecayEngine`] and watch through one [`ViewerBroadcast`].
//! Both are constructed once at startup and handed to every session through a
//! [`SharedCanvas`] handle; a single frame clock advances them.

pub mod broadcast;
pub mod clock;
pub mod decay;

pub use broadcast::{CellUpdate, Viewer, ViewerBroadcast, ViewerId};
pub use clock::spawn_frame_clock;
pub use decay::{DecayEngine, Point, BACKGROUND_GLYPH, ERASE_AGE, PAINT_GLYPH, RING_SIZE};

use crate::gradient::GradientTable;
use std::sync::Arc;

/// Handles to the process-wide canvas services.
#[derive(Clone)]
pub struct SharedCanvas {
    pub decay: Arc<DecayEngine>,
    pub viewers: Arc<ViewerBroadcast>,
    pub gradients: Arc<GradientTable>,
}

impl SharedCanvas {
    pub fn new(gradients: GradientTable) -> Self {
        Self {
            decay: Arc::new(DecayEngine::new()),
            viewers: Arc::new(ViewerBroadcast::new()),
            gradients: Arc::new(gradients),
        }
    }

    /// Run one frame: take the due updates, then broadcast them.
    ///
    /// The decay lock is released before the registry lock is taken. Returns the number
    /// of updates broadcast.
    pub fn advance_frame(&self) -> usize {
        let due = self.decay.tick();
        let updates: Vec<CellUpdate> = due.iter().map(Point::to_update).collect();
        self.viewers.apply_frame(&updates);
        updates.len()
    }
}
