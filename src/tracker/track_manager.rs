//! The live track set and its lifecycle.

use std::collections::HashSet;

use log::{debug, warn};
use nalgebra::Point3;
use ndarray::Array1;
use serde::Serialize;

use crate::error::TrackerError;
use crate::tracker::associator::{self, Association, Detection, TrackRef};
use crate::tracker::config::TrackerConfig;
use crate::tracker::correlation::CorrelationTrackerFactory;
use crate::tracker::frame::{Crop, Frame, blur_score};
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::local_object::LocalObject;
use crate::tracker::localizer::{Extrinsics, Localizer};
use crate::tracker::rect::Rect;
use crate::tracker::reid::{self, ReconcileOutcome, ReidQuery, ReidResult};

/// Lifecycle notifications, drained with [`TrackManager::drain_events`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackEvent {
    Created(u64),
    Evicted(u64),
    Merged { survivor: u64, absorbed: u64 },
    Reinitialized(u64),
}

/// Published view of one track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSnapshot {
    pub id: u64,
    pub bbox: Rect,
    pub position_3d: Option<Point3<f64>>,
    pub color: [u8; 3],
}

/// Owns every [`LocalObject`].
///
/// Within one frame the order is [`advance`](Self::advance),
/// [`evict_timed_out`](Self::evict_timed_out),
/// [`compute_overlap_flags`](Self::compute_overlap_flags);
/// [`step`](Self::step) runs the three in that order.
pub struct TrackManager {
    objects: Vec<LocalObject>,
    config: TrackerConfig,
    factory: Box<dyn CorrelationTrackerFactory>,
    localizer: Localizer,
    kf3d: Option<KalmanFilter>,
    last_frame: Option<Frame>,
    in_flight: HashSet<u64>,
    events: Vec<TrackEvent>,
}

impl TrackManager {
    pub fn new(config: TrackerConfig, factory: Box<dyn CorrelationTrackerFactory>) -> Self {
        let localizer = Localizer::new(config.camera_intrinsic, config.match_centroid_padding);
        let kf3d = config.kf3d.enabled.then(|| KalmanFilter::new(&config.kf3d));
        Self {
            objects: Vec::new(),
            config,
            factory,
            localizer,
            kf3d,
            last_frame: None,
            in_flight: HashSet::new(),
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn objects(&self) -> &[LocalObject] {
        &self.objects
    }

    pub fn get(&self, id: u64) -> Option<&LocalObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    /// Run every correlation tracker on `frame`.
    pub fn advance(&mut self, frame: &Frame) {
        for obj in &mut self.objects {
            obj.update_tracker(frame);
        }
        self.last_frame = Some(frame.clone());
    }

    /// Remove tracks whose failure count reached `track_fail_timeout_tick`.
    pub fn evict_timed_out(&mut self) -> Vec<u64> {
        let timeout = self.config.track_fail_timeout_tick;
        let mut evicted = Vec::new();
        self.objects.retain(|obj| {
            if obj.tracking_fail_count >= timeout {
                evicted.push(obj.id);
                false
            } else {
                true
            }
        });
        for id in &evicted {
            debug!("track {} timed out", id);
            self.in_flight.remove(id);
            self.events.push(TrackEvent::Evicted(*id));
        }
        evicted
    }

    /// Recount, for every track, how many others overlap it above
    /// `bbox_overlap_ratio_threshold`.
    pub fn compute_overlap_flags(&mut self) {
        for obj in &mut self.objects {
            obj.overlap_count = 0;
        }
        let threshold = self.config.bbox_overlap_ratio_threshold;
        for i in 0..self.objects.len() {
            for j in i + 1..self.objects.len() {
                if self.objects[i].bbox.overlap_ratio(&self.objects[j].bbox) > threshold {
                    self.objects[i].overlap_count += 1;
                    self.objects[j].overlap_count += 1;
                }
            }
        }
    }

    /// Per-frame pass: advance, evict, flag overlaps.
    pub fn step(&mut self, frame: &Frame) {
        self.advance(frame);
        self.evict_timed_out();
        self.compute_overlap_flags();
    }

    /// [`step`](Self::step), then fuse `cloud` into 3D positions when
    /// `use_lidar` is set.
    pub fn step_with_cloud(&mut self, frame: &Frame, cloud: &[Point3<f64>], extrinsics: &Extrinsics) {
        self.step(frame);
        if self.config.use_lidar {
            self.localize(cloud, extrinsics, frame.stamp);
        }
    }

    /// Update `position_3d` of every track that has points in its box.
    /// Tracks without points keep their previous position. Returns the
    /// number of tracks updated.
    pub fn localize(&mut self, cloud: &[Point3<f64>], extrinsics: &Extrinsics, stamp: f64) -> usize {
        let Some(bounds) = self.last_frame.as_ref().map(Frame::bounds) else {
            return 0;
        };
        let mut updated = 0;
        for obj in &mut self.objects {
            if let Some(p) = self.localizer.localize(&obj.bbox, cloud, &bounds, extrinsics) {
                obj.set_position(p, stamp, self.kf3d.as_ref());
                updated += 1;
            }
        }
        updated
    }

    /// Match a detector batch to the live tracks.
    ///
    /// Detections are clipped to the frame before matching and dropped if
    /// nothing of them is visible. Matched tracks restart their correlation
    /// tracker at the clipped box; unmatched detections become new tracks.
    /// When the association
    /// hands one track to several detections, they are applied in
    /// detection order and the last one sets the box.
    pub fn on_detections(&mut self, detections: &[Detection], frame: &Frame) -> Association {
        let bounds = frame.bounds();
        let association = {
            let tracks: Vec<TrackRef<'_>> = self.objects.iter().map(TrackRef::from).collect();
            associator::associate(detections, &tracks, &bounds, &self.config)
        };

        let dups = association.duplicate_track_ids();
        if !dups.is_empty() {
            warn!("tracks {:?} matched by more than one detection", dups);
        }

        for (det, assigned) in detections.iter().zip(&association.assignments) {
            let bbox = det.bbox.clip(&bounds);
            if bbox.is_empty() {
                debug!("detection at {:?} lies outside the frame, dropped", det.bbox);
                continue;
            }
            match assigned.and_then(|id| self.index_of(id)) {
                Some(idx) => {
                    self.objects[idx].reinit(bbox, frame);
                    self.record_observation(idx, det, frame);
                }
                None => {
                    self.create_object(det, frame);
                }
            }
        }
        self.last_frame = Some(frame.clone());
        association
    }

    /// Start a track at a detection.
    pub fn create_object(&mut self, detection: &Detection, frame: &Frame) -> u64 {
        let bbox = detection.bbox.clip(&frame.bounds());
        let tracker = self.factory.create(&bbox, frame);
        let obj = LocalObject::new(bbox, tracker, self.config.history_capacity);
        let id = obj.id;
        debug!("track {} created at {:?}", id, bbox);
        self.objects.push(obj);
        let idx = self.objects.len() - 1;
        self.record_observation(idx, detection, frame);
        self.events.push(TrackEvent::Created(id));
        id
    }

    /// Append a crop to the track's history if it is worth keeping: the
    /// track isn't overlapping another, the box aspect is plausible, the
    /// crop is sharp and enough time passed since the last one.
    fn record_observation(&mut self, idx: usize, detection: &Detection, frame: &Frame) -> bool {
        let cfg = &self.config;
        let obj = &mut self.objects[idx];

        if obj.overlap_count > 0 || obj.bbox.width <= 0.0 {
            return false;
        }
        let ratio = obj.bbox.height / obj.bbox.width;
        if ratio < cfg.height_width_ratio_min || ratio > cfg.height_width_ratio_max {
            return false;
        }
        if let Some(last) = obj.last_record_stamp {
            if frame.stamp - last < cfg.record_interval {
                return false;
            }
        }

        let crop: Option<Crop> = detection.crop.clone().or_else(|| {
            frame.crop(&obj.bbox.padded(cfg.track_to_reid_bbox_margin, &frame.bounds()))
        });
        let Some(crop) = crop else {
            return false;
        };
        if blur_score(&crop) < cfg.blur_detection_threshold {
            debug!("track {}: blurry crop discarded", obj.id);
            return false;
        }

        obj.history
            .push(crop, obj.bbox, frame.stamp, detection.feature.clone());
        obj.last_record_stamp = Some(frame.stamp);
        true
    }

    /// Crop batches ready for the embedding service.
    ///
    /// A track is queued once it holds `batch_num_min` crops without
    /// features, and not again until its batch comes back through
    /// [`apply_reid_batch`](Self::apply_reid_batch).
    pub fn take_reid_queries(&mut self) -> Vec<ReidQuery> {
        let mut queries = Vec::new();
        for obj in &self.objects {
            if self.in_flight.contains(&obj.id) {
                continue;
            }
            let pending: Vec<_> = obj.history.pending().collect();
            if pending.len() < self.config.batch_num_min.max(1) {
                continue;
            }
            queries.push(ReidQuery {
                track_id: obj.id,
                seqs: pending.iter().map(|o| o.seq).collect(),
                crops: pending.iter().map(|o| o.crop.clone()).collect(),
                bboxes: pending.iter().map(|o| o.bbox).collect(),
            });
        }
        for q in &queries {
            self.in_flight.insert(q.track_id);
        }
        queries
    }

    /// Give up on an outstanding query so the track can be queued again.
    pub fn release_query(&mut self, track_id: u64) {
        self.in_flight.remove(&track_id);
    }

    /// Fold the embeddings of a query back into the track.
    ///
    /// The newest embedding is reconciled against the histories as they
    /// were before this batch, then every embedding is stored next to its
    /// crop. Returns `None` if the track is gone.
    pub fn apply_reid_batch(
        &mut self,
        query: &ReidQuery,
        features: Vec<Array1<f32>>,
    ) -> Result<Option<ReconcileOutcome>, TrackerError> {
        self.in_flight.remove(&query.track_id);
        if features.len() != query.seqs.len() {
            return Err(TrackerError::EmbeddingBatch {
                expected: query.seqs.len(),
                got: features.len(),
            });
        }
        let Some(idx) = self.index_of(query.track_id) else {
            return Ok(None);
        };
        let (Some(embedding), Some(bbox)) = (features.last(), query.bboxes.last()) else {
            return Ok(None);
        };

        let result = ReidResult {
            track_id: query.track_id,
            embedding: embedding.clone(),
            bbox: *bbox,
        };
        let outcome = self.evaluate(&result)?;

        let history = &mut self.objects[idx].history;
        for (seq, feature) in query.seqs.iter().zip(features) {
            history.set_feature(*seq, feature);
        }

        self.apply_outcome(&result, outcome);
        Ok(Some(outcome))
    }

    /// Reconcile an externally computed embedding and act on the outcome.
    pub fn reconcile(&mut self, result: &ReidResult) -> Result<ReconcileOutcome, TrackerError> {
        let outcome = self.evaluate(result)?;
        self.apply_outcome(result, outcome);
        Ok(outcome)
    }

    fn evaluate(&self, result: &ReidResult) -> Result<ReconcileOutcome, TrackerError> {
        let tracks: Vec<TrackRef<'_>> = self.objects.iter().map(TrackRef::from).collect();
        reid::reconcile(result, &tracks, &self.config)
    }

    fn apply_outcome(&mut self, result: &ReidResult, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Confirmed | ReconcileOutcome::NoMatch => {}
            ReconcileOutcome::Corrected { bbox } => {
                let Some(frame) = self.last_frame.clone() else {
                    return;
                };
                if let Some(idx) = self.index_of(result.track_id) {
                    self.objects[idx].reinit(bbox, &frame);
                    self.events.push(TrackEvent::Reinitialized(result.track_id));
                }
            }
            ReconcileOutcome::MergeWith(other) => {
                self.merge(result.track_id, other);
            }
        }
    }

    /// Coalesce two tracks. The earlier-created id survives and inherits the
    /// other's history. Returns the surviving id.
    pub fn merge(&mut self, a: u64, b: u64) -> Option<u64> {
        if a == b {
            return None;
        }
        let (survivor, absorbed) = (a.min(b), a.max(b));
        self.index_of(survivor)?;
        let absorbed_idx = self.index_of(absorbed)?;

        let gone = self.objects.remove(absorbed_idx);
        let survivor_idx = self.index_of(survivor)?;
        self.objects[survivor_idx].history.absorb(gone.history);
        self.in_flight.remove(&absorbed);

        debug!("track {} merged into {}", absorbed, survivor);
        self.events.push(TrackEvent::Merged { survivor, absorbed });
        Some(survivor)
    }

    pub fn snapshot(&self) -> Vec<TrackSnapshot> {
        self.objects
            .iter()
            .map(|o| TrackSnapshot {
                id: o.id,
                bbox: o.bbox,
                position_3d: o.position_3d,
                color: o.color,
            })
            .collect()
    }

    pub fn drain_events(&mut self) -> Vec<TrackEvent> {
        std::mem::take(&mut self.events)
    }

    fn index_of(&self, id: u64) -> Option<usize> {
        self.objects.iter().position(|o| o.id == id)
    }
}
