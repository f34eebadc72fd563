//! One tracked entity and its lifetime state.

use std::sync::atomic::{AtomicU64, Ordering};

use nalgebra::Point3;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::tracker::correlation::CorrelationTracker;
use crate::tracker::frame::{Crop, Frame};
use crate::tracker::history::History;
use crate::tracker::kalman_filter::{KalmanFilter, PositionFilter};
use crate::tracker::rect::Rect;

/// Global track ID counter for unique ID generation.
static TRACK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Reset the global track ID counter (useful for testing).
pub fn reset_track_id_counter() {
    TRACK_ID_COUNTER.store(0, Ordering::SeqCst);
}

/// Get the next unique track ID.
pub(crate) fn next_track_id() -> u64 {
    TRACK_ID_COUNTER.fetch_add(1, Ordering::SeqCst) + 1
}

/// Returned by [`LocalObject::find_min_query_score`] when the track has no
/// feature to compare against. Never below any threshold.
pub const NO_MATCH_SCORE: f32 = f32::INFINITY;

/// A tracked object.
pub struct LocalObject {
    /// Unique for the lifetime of the process, never reused.
    pub id: u64,
    /// Current box in image coordinates.
    pub bbox: Rect,
    /// Consecutive correlation-tracker failures.
    pub tracking_fail_count: u32,
    /// Other live tracks overlapping this one in the current frame.
    pub overlap_count: u32,
    /// Last successful 3D estimate, in the map frame.
    pub position_3d: Option<Point3<f64>>,
    pub is_track_succeed: bool,
    /// RGB display color, derived from the id.
    pub color: [u8; 3],
    pub(crate) history: History,
    pub(crate) last_record_stamp: Option<f64>,
    pub(crate) position_filter: Option<PositionFilter>,
    tracker: Box<dyn CorrelationTracker>,
}

impl std::fmt::Debug for LocalObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalObject")
            .field("id", &self.id)
            .field("bbox", &self.bbox)
            .field("tracking_fail_count", &self.tracking_fail_count)
            .field("overlap_count", &self.overlap_count)
            .field("position_3d", &self.position_3d)
            .field("history", &self.history.len())
            .finish()
    }
}

impl LocalObject {
    /// Create a track with the next free id.
    pub fn new(bbox: Rect, tracker: Box<dyn CorrelationTracker>, history_capacity: usize) -> Self {
        Self::with_id(next_track_id(), bbox, tracker, history_capacity)
    }

    pub fn with_id(
        id: u64,
        bbox: Rect,
        tracker: Box<dyn CorrelationTracker>,
        history_capacity: usize,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(id);
        Self {
            id,
            bbox,
            tracking_fail_count: 0,
            overlap_count: 0,
            position_3d: None,
            is_track_succeed: true,
            color: [rng.random(), rng.random(), rng.random()],
            history: History::with_capacity(history_capacity),
            last_record_stamp: None,
            position_filter: None,
            tracker,
        }
    }

    /// Advance the correlation tracker.
    ///
    /// A successful update replaces the box and clears the failure count. A
    /// failure, or a box that falls entirely outside the frame, bumps the
    /// count and leaves the box as it was.
    pub fn update_tracker(&mut self, frame: &Frame) -> bool {
        let result = self.tracker.update(frame);
        let bbox = result.bbox.clip(&frame.bounds());
        self.is_track_succeed = result.success && !bbox.is_empty();
        if self.is_track_succeed {
            self.bbox = bbox;
            self.tracking_fail_count = 0;
        } else {
            self.tracking_fail_count += 1;
        }
        self.is_track_succeed
    }

    /// Restart the correlation tracker at `bbox`.
    pub fn reinit(&mut self, bbox: Rect, frame: &Frame) {
        let bbox = bbox.clip(&frame.bounds());
        self.tracker.reinit(&bbox, frame);
        self.bbox = bbox;
        self.tracking_fail_count = 0;
        self.is_track_succeed = true;
    }

    /// Smallest distance between `query` and any stored feature, or
    /// [`NO_MATCH_SCORE`] if there is none.
    pub fn find_min_query_score(&self, query: &Array1<f32>) -> f32 {
        self.history
            .best_match(query)
            .map_or(NO_MATCH_SCORE, |(d, _)| d)
    }

    pub fn crop_history(&self) -> impl Iterator<Item = &Crop> {
        self.history.crops()
    }

    pub fn feature_history(&self) -> impl Iterator<Item = &Array1<f32>> {
        self.history.features()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Write a new 3D estimate, smoothing it if `kf` is given.
    pub(crate) fn set_position(&mut self, point: Point3<f64>, stamp: f64, kf: Option<&KalmanFilter>) {
        let raw = [point.x, point.y, point.z];
        let Some(kf) = kf else {
            self.position_3d = Some(point);
            return;
        };
        let filtered = match self.position_filter.as_mut() {
            Some(pf) => pf.update(kf, raw, stamp),
            None => {
                self.position_filter = Some(PositionFilter::new(kf, raw, stamp));
                Ok(raw)
            }
        };
        match filtered {
            Ok(p) => self.position_3d = Some(Point3::new(p[0], p[1], p[2])),
            Err(e) => {
                log::warn!("track {}: position filter reset: {}", self.id, e);
                self.position_filter = Some(PositionFilter::new(kf, raw, stamp));
                self.position_3d = Some(point);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tracker::correlation::TrackUpdate;
    use ndarray::{Array3, array};
    use std::collections::VecDeque;

    /// Replays a fixed list of results, then keeps failing.
    pub(crate) struct ScriptedTracker {
        pub(crate) script: VecDeque<TrackUpdate>,
        pub(crate) last: Rect,
    }

    impl ScriptedTracker {
        pub(crate) fn boxed(last: Rect, script: Vec<TrackUpdate>) -> Box<dyn CorrelationTracker> {
            Box::new(Self {
                script: script.into(),
                last,
            })
        }
    }

    impl CorrelationTracker for ScriptedTracker {
        fn update(&mut self, _frame: &Frame) -> TrackUpdate {
            self.script
                .pop_front()
                .unwrap_or(TrackUpdate::failed(self.last))
        }

        fn reinit(&mut self, bbox: &Rect, _frame: &Frame) {
            self.last = *bbox;
        }
    }

    #[test]
    fn test_fail_count_resets_on_success() {
        let b = Rect::new(10.0, 10.0, 50.0, 100.0);
        let tracker = ScriptedTracker::boxed(
            b,
            vec![
                TrackUpdate::failed(b),
                TrackUpdate::failed(b),
                TrackUpdate::succeeded(Rect::new(12.0, 10.0, 50.0, 100.0)),
            ],
        );
        let mut obj = LocalObject::with_id(1, b, tracker, 4);
        let frame = Frame::blank(0.0, 640, 480);

        assert!(!obj.update_tracker(&frame));
        assert_eq!(obj.tracking_fail_count, 1);
        assert!(!obj.update_tracker(&frame));
        assert_eq!(obj.tracking_fail_count, 2);
        assert_eq!(obj.bbox, b);
        assert!(obj.update_tracker(&frame));
        assert_eq!(obj.tracking_fail_count, 0);
        assert_eq!(obj.bbox.x, 12.0);
    }

    #[test]
    fn test_box_outside_frame_counts_as_failure() {
        let b = Rect::new(10.0, 10.0, 50.0, 100.0);
        let tracker = ScriptedTracker::boxed(
            b,
            vec![TrackUpdate::succeeded(Rect::new(900.0, 900.0, 10.0, 10.0))],
        );
        let mut obj = LocalObject::with_id(1, b, tracker, 4);
        assert!(!obj.update_tracker(&Frame::blank(0.0, 640, 480)));
        assert_eq!(obj.tracking_fail_count, 1);
    }

    #[test]
    fn test_find_min_query_score_empty_history() {
        let b = Rect::new(0.0, 0.0, 10.0, 10.0);
        let obj = LocalObject::with_id(1, b, ScriptedTracker::boxed(b, vec![]), 4);
        let score = obj.find_min_query_score(&array![0.0, 0.0]);
        assert_eq!(score, NO_MATCH_SCORE);
        assert!(!(score < f32::MAX));
    }

    #[test]
    fn test_find_min_query_score() {
        let b = Rect::new(0.0, 0.0, 10.0, 10.0);
        let mut obj = LocalObject::with_id(1, b, ScriptedTracker::boxed(b, vec![]), 4);
        obj.history
            .push(Array3::zeros((2, 2, 3)), b, 0.0, Some(array![6.0, 8.0]));
        obj.history
            .push(Array3::zeros((2, 2, 3)), b, 0.1, Some(array![30.0, 40.0]));
        assert_eq!(obj.find_min_query_score(&array![0.0, 0.0]), 10.0);
    }

    #[test]
    fn test_color_is_stable_per_id() {
        let b = Rect::new(0.0, 0.0, 10.0, 10.0);
        let a = LocalObject::with_id(42, b, ScriptedTracker::boxed(b, vec![]), 1);
        let c = LocalObject::with_id(42, b, ScriptedTracker::boxed(b, vec![]), 1);
        assert_eq!(a.color, c.color);
    }
}
