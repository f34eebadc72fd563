//! Tracker parameters.

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Pinhole camera intrinsics, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsic {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Default for CameraIntrinsic {
    fn default() -> Self {
        Self {
            fx: 615.0,
            fy: 615.0,
            cx: 320.0,
            cy: 240.0,
        }
    }
}

/// Noise model of the 3D position smoother.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanFilter3dParam {
    pub enabled: bool,
    /// Process noise on position, metres per second.
    pub std_position: f64,
    /// Process noise on velocity, metres per second squared.
    pub std_velocity: f64,
    /// Measurement noise of a LiDAR centroid, metres.
    pub std_measurement: f64,
}

impl Default for KalmanFilter3dParam {
    fn default() -> Self {
        Self {
            enabled: false,
            std_position: 0.1,
            std_velocity: 0.5,
            std_measurement: 0.2,
        }
    }
}

/// Configuration for the [`TrackManager`](crate::tracker::TrackManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Consecutive correlation-tracker failures before a track is evicted.
    pub track_fail_timeout_tick: u32,
    /// Overlap ratio above which two tracks are flagged as overlapping.
    pub bbox_overlap_ratio_threshold: f32,
    /// Margin added around a box before cropping it for ReID.
    pub track_to_reid_bbox_margin: f32,
    pub height_width_ratio_min: f32,
    pub height_width_ratio_max: f32,
    /// Minimum Laplacian variance of a crop worth recording.
    pub blur_detection_threshold: f32,
    /// Minimum seconds between two recorded crops of one track.
    pub record_interval: f64,
    /// Pending crops needed before a track is queued for ReID.
    pub batch_num_min: usize,
    /// Padding around a detection box within which tracks are candidates.
    pub detector_bbox_padding: f32,
    /// Geometric match score a detection must stay below to match a track.
    pub bbox_match_threshold: f32,
    /// Appearance distance below which two embeddings are the same object.
    pub reid_match_threshold: f32,
    pub reid_match_bbox_dis: f32,
    pub reid_match_bbox_size_diff: f32,
    /// Padding around a track box when selecting projected LiDAR points.
    pub match_centroid_padding: f32,
    /// Capacity of each track's crop/feature history.
    pub history_capacity: usize,
    /// Re-check uniqueness after every accepted detection-to-track match.
    pub recheck_after_accept: bool,
    /// Embed detector boxes before association so matching can use
    /// appearance. Detections that already carry a feature are left alone.
    pub embed_detections: bool,
    /// Largest batch sent to the embedding service for detector boxes.
    pub realtime_batch_size: usize,
    /// Fuse point clouds into 3D positions.
    pub use_lidar: bool,
    /// Maximum image/point-cloud timestamp gap, seconds.
    pub sync_tolerance: f64,
    /// Number of images kept while waiting for a point cloud.
    pub sync_queue_size: usize,
    pub camera_intrinsic: CameraIntrinsic,
    pub kf3d: KalmanFilter3dParam,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_fail_timeout_tick: 30,
            bbox_overlap_ratio_threshold: 0.5,
            track_to_reid_bbox_margin: 10.0,
            height_width_ratio_min: 1.0,
            height_width_ratio_max: 3.0,
            blur_detection_threshold: 160.0,
            record_interval: 0.1,
            batch_num_min: 3,
            detector_bbox_padding: 10.0,
            bbox_match_threshold: 60.0,
            reid_match_threshold: 200.0,
            reid_match_bbox_dis: 30.0,
            reid_match_bbox_size_diff: 30.0,
            match_centroid_padding: 20.0,
            history_capacity: 10,
            recheck_after_accept: false,
            embed_detections: false,
            realtime_batch_size: 4,
            use_lidar: false,
            sync_tolerance: 0.05,
            sync_queue_size: 10,
            camera_intrinsic: CameraIntrinsic::default(),
            kf3d: KalmanFilter3dParam::default(),
        }
    }
}

impl TrackerConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, TrackerError> {
        Ok(serde_json::from_str(json)?)
    }
}
