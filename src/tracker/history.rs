//! Bounded appearance history of a track.

use std::collections::VecDeque;

use ndarray::Array1;

use crate::tracker::frame::Crop;
use crate::tracker::rect::Rect;

/// One recorded view of a track: the crop, where it was taken and,
/// once the embedding service has processed it, its feature vector.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Sequence number, unique within the owning history.
    pub seq: u64,
    pub crop: Crop,
    pub bbox: Rect,
    pub stamp: f64,
    pub feature: Option<Array1<f32>>,
}

/// Euclidean distance between two embeddings. Mismatched lengths never match.
pub fn feature_distance(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Appearance history of one track.
///
/// Embedded observations (crop plus feature) live in a fixed-capacity FIFO,
/// so `crops()` and `features()` always have the same length. Crops still
/// waiting for their embedding are staged in a second FIFO of the same
/// capacity and only join the history once their feature arrives. Pushing
/// past capacity drops the oldest entry of either queue.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<Observation>,
    staged: VecDeque<Observation>,
    capacity: usize,
    next_seq: u64,
}

impl History {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            staged: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of embedded observations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of crops waiting for an embedding.
    pub fn pending_len(&self) -> usize {
        self.staged.len()
    }

    /// Record a crop. With a feature it joins the history right away,
    /// without one it is staged until [`set_feature`](Self::set_feature).
    pub fn push(&mut self, crop: Crop, bbox: Rect, stamp: f64, feature: Option<Array1<f32>>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let obs = Observation {
            seq,
            crop,
            bbox,
            stamp,
            feature,
        };
        if obs.feature.is_some() {
            Self::push_bounded(&mut self.entries, obs, self.capacity);
        } else {
            Self::push_bounded(&mut self.staged, obs, self.capacity);
        }
        seq
    }

    fn push_bounded(queue: &mut VecDeque<Observation>, obs: Observation, capacity: usize) {
        if queue.len() == capacity {
            queue.pop_front();
        }
        queue.push_back(obs);
    }

    /// Embedded observations, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.entries.iter()
    }

    pub fn crops(&self) -> impl Iterator<Item = &Crop> {
        self.entries.iter().map(|o| &o.crop)
    }

    pub fn features(&self) -> impl Iterator<Item = &Array1<f32>> {
        self.entries.iter().filter_map(|o| o.feature.as_ref())
    }

    pub fn feature_len(&self) -> usize {
        self.features().count()
    }

    /// Staged crops still waiting for an embedding, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &Observation> {
        self.staged.iter()
    }

    /// Attach a feature to the staged crop with sequence number `seq` and
    /// move it into the history.
    ///
    /// Returns `false` if that crop has already been dropped.
    pub fn set_feature(&mut self, seq: u64, feature: Array1<f32>) -> bool {
        let Some(pos) = self.staged.iter().position(|o| o.seq == seq) else {
            return false;
        };
        let Some(mut obs) = self.staged.remove(pos) else {
            return false;
        };
        obs.feature = Some(feature);
        Self::push_bounded(&mut self.entries, obs, self.capacity);
        true
    }

    /// Closest stored feature to `query`, with its observation.
    pub fn best_match(&self, query: &Array1<f32>) -> Option<(f32, &Observation)> {
        self.entries
            .iter()
            .filter_map(|o| o.feature.as_ref().map(|f| (feature_distance(f, query), o)))
            .filter(|(d, _)| d.is_finite())
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }

    /// Append every observation of `other`, renumbering them. Embedded ones
    /// join the history, staged ones stay staged. Capacity still applies.
    pub fn absorb(&mut self, other: History) {
        for obs in other.entries.into_iter().chain(other.staged) {
            self.push(obs.crop, obs.bbox, obs.stamp, obs.feature);
        }
    }
}
