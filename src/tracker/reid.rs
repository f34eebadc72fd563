//! Re-identification reconciliation.

use log::debug;
use ndarray::Array1;

use crate::error::TrackerError;
use crate::tracker::associator::TrackRef;
use crate::tracker::config::TrackerConfig;
use crate::tracker::frame::Crop;
use crate::tracker::rect::Rect;

/// An embedding computed for one observation of a track.
#[derive(Debug, Clone)]
pub struct ReidResult {
    pub track_id: u64,
    pub embedding: Array1<f32>,
    /// Box the embedded crop was taken from.
    pub bbox: Rect,
}

/// Batch of recorded crops of one track, waiting for embeddings.
#[derive(Debug, Clone)]
pub struct ReidQuery {
    pub track_id: u64,
    /// History sequence numbers, aligned with `crops`.
    pub seqs: Vec<u64>,
    pub crops: Vec<Crop>,
    pub bboxes: Vec<Rect>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// The embedding matches the track's own history.
    Confirmed,
    /// Identity confirmed, but the tracker drifted away from the observed
    /// box; restart it there.
    Corrected { bbox: Rect },
    /// Another live track's history matches better: both are one object.
    MergeWith(u64),
    /// Nothing within threshold.
    NoMatch,
}

/// Decide what a new embedding says about `result.track_id`.
///
/// The embedding is compared with every stored feature of every live
/// track. If another track's history is strictly closer than the track's
/// own and within `reid_match_threshold`, the two are merge candidates.
/// Otherwise a match within threshold against the own history confirms the
/// identity, and a box that moved more than `reid_match_bbox_dis` or
/// changed size by more than `reid_match_bbox_size_diff` relative to the
/// observed box marks the correlation tracker as drifted.
pub fn reconcile(
    result: &ReidResult,
    tracks: &[TrackRef<'_>],
    config: &TrackerConfig,
) -> Result<ReconcileOutcome, TrackerError> {
    let own = tracks
        .iter()
        .find(|t| t.id == result.track_id)
        .ok_or(TrackerError::UnknownTrack(result.track_id))?;

    let own_score = own
        .history
        .and_then(|h| h.best_match(&result.embedding))
        .map_or(f32::INFINITY, |(d, _)| d);

    let best_other = tracks
        .iter()
        .filter(|t| t.id != result.track_id)
        .filter_map(|t| {
            t.history
                .and_then(|h| h.best_match(&result.embedding))
                .map(|(d, _)| (t.id, d))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1));

    if let Some((other_id, other_score)) = best_other {
        if other_score < own_score && other_score < config.reid_match_threshold {
            debug!(
                "reid: track {} matches track {} ({} < own {})",
                result.track_id, other_id, other_score, own_score
            );
            return Ok(ReconcileOutcome::MergeWith(other_id));
        }
    }

    if own_score >= config.reid_match_threshold {
        debug!("reid: track {} unconfirmed ({})", result.track_id, own_score);
        return Ok(ReconcileOutcome::NoMatch);
    }

    if own.bbox.distance(&result.bbox) > config.reid_match_bbox_dis
        || own.bbox.size_diff(&result.bbox) > config.reid_match_bbox_size_diff
    {
        debug!(
            "reid: track {} drifted to {:?}, observed at {:?}",
            result.track_id, own.bbox, result.bbox
        );
        return Ok(ReconcileOutcome::Corrected { bbox: result.bbox });
    }

    Ok(ReconcileOutcome::Confirmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::history::History;
    use ndarray::{Array3, array};

    fn history(features: &[Array1<f32>]) -> History {
        let mut h = History::with_capacity(8);
        for f in features {
            h.push(Array3::zeros((2, 2, 3)), Rect::default(), 0.0, Some(f.clone()));
        }
        h
    }

    fn cfg() -> TrackerConfig {
        TrackerConfig {
            reid_match_threshold: 10.0,
            ..TrackerConfig::default()
        }
    }

    #[test]
    fn test_confirmed_without_merge() {
        let b = Rect::new(10.0, 10.0, 50.0, 100.0);
        let ha = history(&[array![5.0, 0.0]]);
        let hb = history(&[array![100.0, 0.0]]);
        let tracks = [
            TrackRef { id: 1, bbox: b, history: Some(&ha) },
            TrackRef { id: 2, bbox: Rect::new(300.0, 10.0, 50.0, 100.0), history: Some(&hb) },
        ];
        let result = ReidResult {
            track_id: 1,
            embedding: array![0.0, 0.0],
            bbox: b,
        };
        assert_eq!(reconcile(&result, &tracks, &cfg()).unwrap(), ReconcileOutcome::Confirmed);
    }

    #[test]
    fn test_drift_triggers_correction() {
        let ha = history(&[array![5.0, 0.0]]);
        let tracks = [TrackRef {
            id: 1,
            bbox: Rect::new(100.0, 10.0, 50.0, 100.0),
            history: Some(&ha),
        }];
        let observed = Rect::new(10.0, 10.0, 50.0, 100.0);
        let result = ReidResult {
            track_id: 1,
            embedding: array![0.0, 0.0],
            bbox: observed,
        };
        assert_eq!(
            reconcile(&result, &tracks, &cfg()).unwrap(),
            ReconcileOutcome::Corrected { bbox: observed }
        );
    }

    #[test]
    fn test_closer_match_elsewhere_merges() {
        let b = Rect::new(10.0, 10.0, 50.0, 100.0);
        let ha = history(&[array![8.0, 0.0]]);
        let hb = history(&[array![1.0, 0.0]]);
        let tracks = [
            TrackRef { id: 1, bbox: b, history: Some(&ha) },
            TrackRef { id: 2, bbox: b, history: Some(&hb) },
        ];
        let result = ReidResult {
            track_id: 2,
            embedding: array![0.0, 0.0],
            bbox: b,
        };
        // own distance 1 beats 8: no merge
        assert_eq!(reconcile(&result, &tracks, &cfg()).unwrap(), ReconcileOutcome::Confirmed);

        let result = ReidResult { track_id: 1, ..result };
        assert_eq!(reconcile(&result, &tracks, &cfg()).unwrap(), ReconcileOutcome::MergeWith(2));
    }

    #[test]
    fn test_empty_history_never_matches() {
        let b = Rect::new(10.0, 10.0, 50.0, 100.0);
        let empty = History::with_capacity(4);
        let tracks = [
            TrackRef { id: 1, bbox: b, history: Some(&empty) },
            TrackRef { id: 2, bbox: b, history: Some(&empty) },
        ];
        let result = ReidResult {
            track_id: 1,
            embedding: array![0.0, 0.0],
            bbox: b,
        };
        assert_eq!(reconcile(&result, &tracks, &cfg()).unwrap(), ReconcileOutcome::NoMatch);
    }

    #[test]
    fn test_unknown_track() {
        let result = ReidResult {
            track_id: 9,
            embedding: array![0.0],
            bbox: Rect::default(),
        };
        assert!(matches!(
            reconcile(&result, &[], &cfg()),
            Err(TrackerError::UnknownTrack(9))
        ));
    }
}
