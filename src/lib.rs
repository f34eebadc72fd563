//! Online multi-object tracking for a mobile robot.
//!
//! Per-object correlation trackers carry boxes from frame to frame, detector
//! batches are associated greedily against the live tracks, batched ReID
//! embeddings confirm, correct or merge identities, and synchronized LiDAR
//! clouds give each track a 3D position.

pub mod error;
pub mod integration;
pub mod tracker;

pub use error::TrackerError;
pub use integration::{DetectionBuilder, EmbeddingService, TrackerPipeline};
pub use tracker::{
    Detection, Extrinsics, Frame, LocalObject, Rect, ReconcileOutcome, TrackEvent, TrackManager,
    TrackerConfig,
};
