mod association;
mod associator;
mod config;
mod correlation;
mod frame;
mod history;
mod kalman_filter;
mod local_object;
mod localizer;
mod reid;
mod rect;
mod sync;
mod track_manager;

pub use association::{AssociationType, AssociationVector};
pub use associator::{Association, Detection, TrackRef, associate, match_detection};
pub use config::{CameraIntrinsic, KalmanFilter3dParam, TrackerConfig};
pub use correlation::{CorrelationTracker, CorrelationTrackerFactory, TrackUpdate};
pub use frame::{Crop, Frame, blur_score};
pub use history::{History, Observation, feature_distance};
pub use kalman_filter::{KalmanFilter, PositionFilter};
pub use local_object::{LocalObject, NO_MATCH_SCORE, reset_track_id_counter};
pub use localizer::{Extrinsics, Localizer, PointCloud};
pub use reid::{ReconcileOutcome, ReidQuery, ReidResult, reconcile};
pub use rect::Rect;
pub use sync::ApproximateTimeSync;
pub use track_manager::{TrackEvent, TrackManager, TrackSnapshot};
