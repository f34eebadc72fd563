//! Detection-to-track association.
//!
//! Matching is greedy and local: every detection ranks the live tracks on its
//! own, takes its best candidate, and contested tracks go to the detection
//! whose box is closer. This is not a global assignment. With
//! `recheck_after_accept` off, a detection that loses a contested track falls
//! through to its next candidate without checking whether someone else holds
//! it, so two detections can still end up on one track.
//! [`Association::duplicate_track_ids`] reports that case.

use std::collections::{HashMap, VecDeque};

use log::debug;
use ndarray::Array1;

use crate::tracker::association::{AssociationType, AssociationVector};
use crate::tracker::config::TrackerConfig;
use crate::tracker::frame::Crop;
use crate::tracker::history::History;
use crate::tracker::local_object::LocalObject;
use crate::tracker::rect::Rect;

/// Detector output for one object.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Bounding box in TLWH format
    pub bbox: Rect,
    /// Image patch under the box, if the detector sent one
    pub crop: Option<Crop>,
    /// Appearance embedding, if one was computed for this detection
    pub feature: Option<Array1<f32>>,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::from_rect(Rect::from_tlbr(x1, y1, x2, y2))
    }

    pub fn from_rect(bbox: Rect) -> Self {
        Self {
            bbox,
            crop: None,
            feature: None,
        }
    }
}

/// What the associator needs to know about a live track.
#[derive(Debug, Clone, Copy)]
pub struct TrackRef<'a> {
    pub id: u64,
    pub bbox: Rect,
    pub history: Option<&'a History>,
}

impl<'a> From<&'a LocalObject> for TrackRef<'a> {
    fn from(obj: &'a LocalObject) -> Self {
        Self {
            id: obj.id,
            bbox: obj.bbox,
            history: Some(obj.history()),
        }
    }
}

/// Rank every live track for one detection.
///
/// The detection box is clipped to `frame_bounds` first; a detection lying
/// entirely outside the frame has no candidates. Only tracks touching the
/// clipped box padded by `detector_bbox_padding` are considered. Scores are
/// normalised by their acceptance threshold: the appearance distance over
/// `reid_match_threshold` when both sides carry features, else the
/// `[x, y, w, h]` distance over `bbox_match_threshold`. A candidate
/// qualifies when its score is below 1.
pub fn match_detection(
    detection: &Detection,
    tracks: &[TrackRef<'_>],
    frame_bounds: &Rect,
    config: &TrackerConfig,
) -> AssociationVector {
    let mut candidates = AssociationVector::new();
    let bbox = detection.bbox.clip(frame_bounds);
    if bbox.is_empty() {
        return candidates;
    }
    let gate = bbox.padded(config.detector_bbox_padding, frame_bounds);

    for track in tracks {
        if gate.intersect(&track.bbox).is_empty() {
            continue;
        }

        let appearance = detection
            .feature
            .as_ref()
            .zip(track.history)
            .and_then(|(feat, history)| history.best_match(feat))
            .map(|(dist, _)| dist);

        let score = match appearance {
            Some(dist) => dist / config.reid_match_threshold,
            None => bbox.match_score(&track.bbox) / config.bbox_match_threshold,
        };

        candidates.add_new_ass(AssociationType::new(
            track.id,
            score,
            bbox.distance(&track.bbox),
        ));
    }

    candidates.report();
    candidates
}

/// Outcome of one association pass.
#[derive(Debug, Clone, Default)]
pub struct Association {
    /// Accepted track per detection, in detection order. `None` means the
    /// detection should start a new track, unless it lies outside the frame.
    pub assignments: Vec<Option<u64>>,
    /// Qualifying candidates per detection, best first.
    pub candidates: Vec<AssociationVector>,
}

impl Association {
    pub fn matched(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.assignments
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.map(|id| (i, id)))
    }

    pub fn unmatched(&self) -> impl Iterator<Item = usize> + '_ {
        self.assignments
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.is_none().then_some(i))
    }

    /// Track ids accepted by more than one detection, ascending.
    pub fn duplicate_track_ids(&self) -> Vec<u64> {
        let mut counts: HashMap<u64, usize> = HashMap::new();
        for id in self.assignments.iter().flatten() {
            *counts.entry(*id).or_default() += 1;
        }
        let mut dups: Vec<u64> = counts
            .into_iter()
            .filter_map(|(id, n)| (n > 1).then_some(id))
            .collect();
        dups.sort_unstable();
        dups
    }
}

/// Match a frame's detections against the live tracks.
///
/// Detections are processed in input order, so the result is deterministic
/// for a given input. A contested track goes to the detection with the
/// smaller `bbox_match_dis`; on a tie the detection that claimed it first
/// keeps it.
pub fn associate(
    detections: &[Detection],
    tracks: &[TrackRef<'_>],
    frame_bounds: &Rect,
    config: &TrackerConfig,
) -> Association {
    let candidates: Vec<AssociationVector> = detections
        .iter()
        .map(|det| {
            let mut v = match_detection(det, tracks, frame_bounds, config);
            v.retain_below(1.0);
            v
        })
        .collect();

    let mut assignments: Vec<Option<u64>> = vec![None; detections.len()];
    let mut cursor = vec![0usize; detections.len()];
    let mut owner: HashMap<u64, usize> = HashMap::new();
    let mut queue: VecDeque<usize> = (0..detections.len()).collect();

    while let Some(i) = queue.pop_front() {
        let Some(cand) = candidates[i].get(cursor[i]).copied() else {
            assignments[i] = None;
            continue;
        };

        let Some(&j) = owner.get(&cand.id) else {
            owner.insert(cand.id, i);
            assignments[i] = Some(cand.id);
            continue;
        };

        // Contested: rerank the two claims by box distance.
        let held = candidates[j]
            .get(cursor[j])
            .map_or(f32::INFINITY, |a| a.bbox_match_dis);
        let mut contest = AssociationVector::new();
        contest.add_new_ass(AssociationType::new(j as u64, 0.0, held));
        contest.add_new_ass(AssociationType::new(i as u64, 0.0, cand.bbox_match_dis));
        contest.reranking();
        let winner = contest.best().map_or(j, |a| a.id as usize);
        let loser = if winner == i { j } else { i };

        debug!(
            "track {} contested by detections {} and {}, detection {} keeps it",
            cand.id, j, i, winner
        );

        owner.insert(cand.id, winner);
        assignments[winner] = Some(cand.id);
        cursor[loser] += 1;

        if config.recheck_after_accept {
            queue.push_back(loser);
        } else {
            // Fall through once, unchecked.
            assignments[loser] = candidates[loser].get(cursor[loser]).map(|a| a.id);
        }
    }

    Association {
        assignments,
        candidates,
    }
}
