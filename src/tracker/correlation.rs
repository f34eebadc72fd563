//! Per-object single-object tracker interface.
//!
//! The tracking algorithm itself (KCF, DSST, ...) lives outside this crate.
//! Each [`LocalObject`](crate::tracker::LocalObject) owns exactly one
//! instance, created at track creation and dropped at eviction.

use crate::tracker::frame::Frame;
use crate::tracker::rect::Rect;

/// Result of advancing a correlation tracker by one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackUpdate {
    pub bbox: Rect,
    pub success: bool,
}

impl TrackUpdate {
    pub fn succeeded(bbox: Rect) -> Self {
        Self {
            bbox,
            success: true,
        }
    }

    pub fn failed(bbox: Rect) -> Self {
        Self {
            bbox,
            success: false,
        }
    }
}

pub trait CorrelationTracker: Send {
    /// Estimate the object's box in `frame`.
    fn update(&mut self, frame: &Frame) -> TrackUpdate;

    /// Restart tracking from `bbox` in `frame`.
    fn reinit(&mut self, bbox: &Rect, frame: &Frame);
}

/// Builds a fresh tracker for a newly created track.
pub trait CorrelationTrackerFactory: Send {
    fn create(&self, bbox: &Rect, frame: &Frame) -> Box<dyn CorrelationTracker>;
}

impl<F> CorrelationTrackerFactory for F
where
    F: Fn(&Rect, &Frame) -> Box<dyn CorrelationTracker> + Send,
{
    fn create(&self, bbox: &Rect, frame: &Frame) -> Box<dyn CorrelationTracker> {
        self(bbox, frame)
    }
}
