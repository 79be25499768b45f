//! Decay ring scheduling the fade of every drawn point.
//!
//! Drawing a point pre-schedules one update for each of the next 256 frames: ages
//! 0..=254 repaint the cell along its gradient and age 255 erases it. Each frame the
//! frame clock takes the bucket at the head of the ring and advances the head.

use crate::canvas::broadcast::CellUpdate;
use crate::gradient::GradientSpec;
use parking_lot::Mutex;
use ratatui::style::Style;
use std::sync::Arc;

/// Number of frames a point lives for, and the number of buckets in the ring.
pub const RING_SIZE: usize = 256;
/// Age of the final, erasing update for a point.
pub const ERASE_AGE: u8 = 255;
/// Glyph used for painted cells.
pub const PAINT_GLYPH: char = '█';
/// Glyph written when a cell fades back to background.
pub const BACKGROUND_GLYPH: char = ' ';

/// One scheduled update of one cell.
#[derive(Debug, Clone)]
pub struct Point {
    pub x: u16,
    pub y: u16,
    pub age: u8,
    pub gradient: Arc<GradientSpec>,
}

impl Point {
    pub fn is_erase(&self) -> bool {
        self.age == ERASE_AGE
    }

    /// Render update this point produces when its frame comes up.
    pub fn to_update(&self) -> CellUpdate {
        if self.is_erase() {
            CellUpdate {
                x: self.x,
                y: self.y,
                glyph: BACKGROUND_GLYPH,
                style: Style::reset(),
            }
        } else {
            CellUpdate {
                x: self.x,
                y: self.y,
                glyph: PAINT_GLYPH,
                style: Style::default().fg(self.gradient.point(self.age).into()),
            }
        }
    }
}

struct Ring {
    buckets: Vec<Vec<Point>>,
    head: usize,
}

/// Shared schedule of pending point updates.
pub struct DecayEngine {
    ring: Mutex<Ring>,
}

impl DecayEngine {
    pub fn new() -> Self {
        Self {
            ring: Mutex::new(Ring {
                buckets: (0..RING_SIZE).map(|_| Vec::new()).collect(),
                head: 0,
            }),
        }
    }

    /// Schedule the full fade of `(x, y)` starting with the next frame.
    pub fn add_point(&self, x: u16, y: u16, gradient: &Arc<GradientSpec>) {
        let mut ring = self.ring.lock();
        let head = ring.head;
        for age in 0..RING_SIZE {
            ring.buckets[(head + age) % RING_SIZE].push(Point {
                x,
                y,
                age: age as u8,
                gradient: Arc::clone(gradient),
            });
        }
    }

    /// Take every update due this frame, in insertion order, and advance the ring.
    pub fn tick(&self) -> Vec<Point> {
        let mut ring = self.ring.lock();
        let head = ring.head;
        let due = std::mem::take(&mut ring.buckets[head]);
        ring.head = (head + 1) % RING_SIZE;
        due
    }

    /// Number of updates still scheduled across all frames.
    pub fn pending(&self) -> usize {
        self.ring.lock().buckets.iter().map(Vec::len).sum()
    }
}

impl Default for DecayEngine {
    fn default() -> Self {
        Self::new()
    }
}
