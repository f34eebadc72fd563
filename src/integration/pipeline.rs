//! TrackerPipeline: the track set shared across asynchronous callbacks.

use log::{info, warn};
use parking_lot::{Mutex, MutexGuard};

use crate::error::TrackerError;
use crate::tracker::{
    ApproximateTimeSync, Association, CorrelationTrackerFactory, Crop, Detection, Extrinsics,
    Frame, PointCloud, ReconcileOutcome, ReidResult, TrackEvent, TrackManager, TrackSnapshot,
    TrackerConfig,
};

use super::EmbeddingService;

/// Bundles the [`TrackManager`] with an embedding backend and the
/// image/point-cloud synchronizer.
///
/// Every method takes `&self`, so one pipeline behind an `Arc` can serve
/// frame, detector, ReID and LiDAR callbacks running on different threads.
/// Each operation holds the track-set lock for its whole read-modify-write;
/// embedding extraction runs with the lock released.
pub struct TrackerPipeline<E: EmbeddingService> {
    tracker: Mutex<TrackManager>,
    embedder: Mutex<E>,
    sync: Mutex<ApproximateTimeSync<Frame, PointCloud>>,
    extrinsics: Mutex<Extrinsics>,
    use_lidar: bool,
    embed_detections: bool,
    realtime_batch_size: usize,
}

impl<E: EmbeddingService> TrackerPipeline<E> {
    /// Create a pipeline. Fails if the embedding backend cannot start; the
    /// tracker does not run without one.
    pub fn new(
        config: TrackerConfig,
        factory: Box<dyn CorrelationTrackerFactory>,
        mut embedder: E,
    ) -> Result<Self, TrackerError> {
        embedder
            .warm_up()
            .map_err(|e| TrackerError::EmbeddingBackend(e.to_string()))?;
        info!(
            "tracker pipeline started (lidar fusion {})",
            if config.use_lidar { "on" } else { "off" }
        );

        let sync = ApproximateTimeSync::new(config.sync_tolerance, config.sync_queue_size);
        let use_lidar = config.use_lidar;
        let embed_detections = config.embed_detections;
        let realtime_batch_size = config.realtime_batch_size.max(1);
        Ok(Self {
            tracker: Mutex::new(TrackManager::new(config, factory)),
            embedder: Mutex::new(embedder),
            sync: Mutex::new(sync),
            extrinsics: Mutex::new(Extrinsics::default()),
            use_lidar,
            embed_detections,
            realtime_batch_size,
        })
    }

    /// New camera frame. With LiDAR fusion on, the frame waits for its point
    /// cloud; otherwise the tracks advance right away.
    pub fn on_frame(&self, frame: Frame) {
        if self.use_lidar {
            self.sync.lock().push_image(frame.stamp, frame);
        } else {
            self.tracker.lock().step(&frame);
        }
    }

    /// New point cloud. Advances and localizes the tracks if an image pairs
    /// with it. Returns whether a pair was found.
    pub fn on_point_cloud(&self, stamp: f64, cloud: PointCloud) -> bool {
        let Some((frame, cloud)) = self.sync.lock().push_cloud(stamp, cloud) else {
            return false;
        };
        let extrinsics = *self.extrinsics.lock();
        self.tracker
            .lock()
            .step_with_cloud(&frame, &cloud, &extrinsics);
        true
    }

    /// Refresh the sensor transforms.
    pub fn set_extrinsics(&self, extrinsics: Extrinsics) {
        *self.extrinsics.lock() = extrinsics;
    }

    /// Detector batch for `frame`.
    ///
    /// With `embed_detections` on, boxes without a feature are embedded
    /// first, in batches of `realtime_batch_size` and with the track set
    /// unlocked. Detections of a failed batch are matched on geometry alone.
    pub fn on_detections(&self, detections: &[Detection], frame: &Frame) -> Association {
        if !self.embed_detections {
            return self.tracker.lock().on_detections(detections, frame);
        }
        let embedded = self.embed_boxes(detections, frame);
        self.tracker.lock().on_detections(&embedded, frame)
    }

    fn embed_boxes(&self, detections: &[Detection], frame: &Frame) -> Vec<Detection> {
        let mut out = detections.to_vec();
        let (indices, crops): (Vec<usize>, Vec<Crop>) = out
            .iter()
            .enumerate()
            .filter(|(_, d)| d.feature.is_none())
            .filter_map(|(i, d)| {
                d.crop
                    .clone()
                    .or_else(|| frame.crop(&d.bbox))
                    .map(|c| (i, c))
            })
            .unzip();

        let batch = self.realtime_batch_size;
        for (idx, chunk) in indices.chunks(batch).zip(crops.chunks(batch)) {
            let result = self.embedder.lock().extract(chunk);
            match result {
                Ok(features) if features.len() == chunk.len() => {
                    for (&i, feature) in idx.iter().zip(features) {
                        out[i].feature = Some(feature);
                    }
                }
                Ok(features) => warn!(
                    "embedding {} detections returned {} features",
                    chunk.len(),
                    features.len()
                ),
                Err(e) => warn!("embedding detections failed: {}", e),
            }
        }
        out
    }

    /// Externally computed ReID result.
    pub fn on_reid_result(&self, result: &ReidResult) -> Result<ReconcileOutcome, TrackerError> {
        self.tracker.lock().reconcile(result)
    }

    /// Embed every ready crop batch and reconcile the results.
    ///
    /// Queries are collected under the lock, extracted without it, and
    /// merged back under a fresh lock per batch. A failed extraction is
    /// logged and the batch is retried on a later call.
    pub fn run_reid(&self) -> Result<Vec<(u64, ReconcileOutcome)>, TrackerError> {
        let queries = self.tracker.lock().take_reid_queries();
        let mut outcomes = Vec::with_capacity(queries.len());

        for query in queries {
            let features = self.embedder.lock().extract(&query.crops);
            let features = match features {
                Ok(f) => f,
                Err(e) => {
                    warn!("embedding track {} failed: {}", query.track_id, e);
                    self.tracker.lock().release_query(query.track_id);
                    continue;
                }
            };
            if let Some(outcome) = self.tracker.lock().apply_reid_batch(&query, features)? {
                outcomes.push((query.track_id, outcome));
            }
        }
        Ok(outcomes)
    }

    pub fn snapshot(&self) -> Vec<TrackSnapshot> {
        self.tracker.lock().snapshot()
    }

    pub fn drain_events(&self) -> Vec<TrackEvent> {
        self.tracker.lock().drain_events()
    }

    /// Lock the track set directly.
    pub fn tracker(&self) -> MutexGuard<'_, TrackManager> {
        self.tracker.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{CorrelationTracker, Rect, TrackUpdate};
    use ndarray::{Array1, Array3, array};
    use std::sync::Arc;

    struct StillTracker(Rect);

    impl CorrelationTracker for StillTracker {
        fn update(&mut self, _frame: &Frame) -> TrackUpdate {
            TrackUpdate::succeeded(self.0)
        }

        fn reinit(&mut self, bbox: &Rect, _frame: &Frame) {
            self.0 = *bbox;
        }
    }

    fn factory() -> Box<dyn CorrelationTrackerFactory> {
        Box::new(|b: &Rect, _: &Frame| Box::new(StillTracker(*b)) as Box<dyn CorrelationTracker>)
    }

    struct ConstEmbedder {
        fail_next: bool,
        batches: Vec<usize>,
    }

    impl EmbeddingService for ConstEmbedder {
        type Error = String;

        fn extract(&mut self, crops: &[Crop]) -> Result<Vec<Array1<f32>>, Self::Error> {
            self.batches.push(crops.len());
            if std::mem::take(&mut self.fail_next) {
                return Err("device busy".to_string());
            }
            Ok(crops.iter().map(|_| array![1.0, 1.0]).collect())
        }
    }

    struct BrokenEmbedder;

    impl EmbeddingService for BrokenEmbedder {
        type Error = String;

        fn warm_up(&mut self) -> Result<(), Self::Error> {
            Err("reid.onnx not found".to_string())
        }

        fn extract(&mut self, _crops: &[Crop]) -> Result<Vec<Array1<f32>>, Self::Error> {
            unreachable!()
        }
    }

    fn pipeline(config: TrackerConfig, fail_next: bool) -> TrackerPipeline<ConstEmbedder> {
        let embedder = ConstEmbedder {
            fail_next,
            batches: Vec::new(),
        };
        TrackerPipeline::new(config, factory(), embedder).unwrap()
    }

    fn textured(stamp: f64) -> Frame {
        Frame::new(
            stamp,
            Array3::from_shape_fn((480, 640, 3), |(y, x, _)| {
                if (x / 2 + y / 2) % 2 == 0 { 255 } else { 0 }
            }),
        )
    }

    #[test]
    fn test_broken_backend_is_fatal() {
        let err = TrackerPipeline::new(TrackerConfig::default(), factory(), BrokenEmbedder);
        assert!(matches!(err, Err(TrackerError::EmbeddingBackend(_))));
    }

    #[test]
    fn test_frame_advances_tracks() {
        let pipeline = pipeline(TrackerConfig::default(), false);
        let frame = Frame::blank(0.0, 640, 480);
        pipeline.on_detections(
            &[Detection::from_rect(Rect::new(10.0, 10.0, 50.0, 100.0))],
            &frame,
        );
        pipeline.on_frame(Frame::blank(0.1, 640, 480));
        assert_eq!(pipeline.snapshot().len(), 1);
        assert_eq!(pipeline.tracker().objects()[0].tracking_fail_count, 0);
    }

    #[test]
    fn test_run_reid_retries_after_failure() {
        let cfg = TrackerConfig {
            batch_num_min: 1,
            ..TrackerConfig::default()
        };
        let pipeline = pipeline(cfg, true);
        pipeline.on_detections(
            &[Detection::from_rect(Rect::new(100.0, 100.0, 50.0, 100.0))],
            &textured(0.0),
        );

        assert!(pipeline.run_reid().unwrap().is_empty());
        let outcomes = pipeline.run_reid().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].1, ReconcileOutcome::NoMatch);
        assert_eq!(pipeline.tracker().objects()[0].feature_history().count(), 1);
    }

    fn embedding_config() -> TrackerConfig {
        TrackerConfig {
            embed_detections: true,
            ..TrackerConfig::default()
        }
    }

    #[test]
    fn test_detection_embeddings_drive_association() {
        let pipeline = pipeline(embedding_config(), false);
        pipeline.on_detections(
            &[Detection::from_rect(Rect::new(100.0, 100.0, 50.0, 100.0))],
            &textured(0.0),
        );
        let id = pipeline.snapshot()[0].id;
        assert_eq!(pipeline.tracker().objects()[0].feature_history().count(), 1);

        let a = pipeline.on_detections(
            &[Detection::from_rect(Rect::new(110.0, 100.0, 50.0, 100.0))],
            &textured(0.2),
        );
        assert_eq!(a.assignments, vec![Some(id)]);
        // identical embeddings: appearance distance 0, not the 10px offset
        assert_eq!(a.candidates[0].best().map(|c| c.score), Some(0.0));
    }

    #[test]
    fn test_detection_embeddings_are_batched() {
        let pipeline = pipeline(embedding_config(), false);
        let dets: Vec<Detection> = (0..5)
            .map(|i| Detection::from_rect(Rect::new(120.0 * i as f32, 10.0, 50.0, 100.0)))
            .collect();
        pipeline.on_detections(&dets, &Frame::blank(0.0, 640, 480));
        assert_eq!(pipeline.embedder.lock().batches, vec![4, 1]);
        assert_eq!(pipeline.snapshot().len(), 5);
    }

    #[test]
    fn test_failed_detection_embedding_falls_back_to_geometry() {
        let pipeline = pipeline(embedding_config(), true);
        let a = pipeline.on_detections(
            &[Detection::from_rect(Rect::new(100.0, 100.0, 50.0, 100.0))],
            &textured(0.0),
        );
        assert_eq!(a.assignments, vec![None]);
        let tracker = pipeline.tracker();
        assert_eq!(tracker.objects()[0].feature_history().count(), 0);
        assert_eq!(tracker.objects()[0].history().pending_len(), 1);
    }

    #[test]
    fn test_lidar_frames_wait_for_cloud() {
        let cfg = TrackerConfig {
            use_lidar: true,
            ..TrackerConfig::default()
        };
        let pipeline = pipeline(cfg, false);
        pipeline.on_frame(Frame::blank(1.0, 640, 480));
        assert!(pipeline.tracker().last_frame().is_none());
        assert!(!pipeline.on_point_cloud(2.0, vec![]));
        pipeline.on_frame(Frame::blank(3.0, 640, 480));
        assert!(pipeline.on_point_cloud(3.01, vec![]));
        assert_eq!(pipeline.tracker().last_frame().map(|f| f.stamp), Some(3.0));
    }

    #[test]
    fn test_callbacks_from_many_threads() {
        let pipeline = Arc::new(pipeline(TrackerConfig::default(), false));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let p = Arc::clone(&pipeline);
                std::thread::spawn(move || {
                    let frame = Frame::blank(i as f64, 640, 480);
                    let x = 120.0 * i as f32;
                    let det = Detection::from_rect(Rect::new(x, 10.0, 50.0, 100.0));
                    p.on_detections(&[det], &frame);
                    p.on_frame(frame);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let mut ids: Vec<u64> = pipeline.snapshot().iter().map(|s| s.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }
}
