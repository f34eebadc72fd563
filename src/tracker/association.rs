//! Ranked match candidates for one observation against the track set.

use log::trace;

/// One candidate match: lower `score` is more similar, lower
/// `bbox_match_dis` is closer in image space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssociationType {
    pub id: u64,
    pub score: f32,
    pub bbox_match_dis: f32,
}

impl AssociationType {
    pub fn new(id: u64, score: f32, bbox_match_dis: f32) -> Self {
        Self {
            id,
            score,
            bbox_match_dis,
        }
    }
}

/// Candidates kept in ascending `score` order at all times.
#[derive(Debug, Clone, Default)]
pub struct AssociationVector {
    ass_vector: Vec<AssociationType>,
}

impl AssociationVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordered insertion. Equal scores keep insertion order.
    pub fn add_new_ass(&mut self, ass_object: AssociationType) {
        let pos = self
            .ass_vector
            .iter()
            .position(|a| ass_object.score < a.score)
            .unwrap_or(self.ass_vector.len());
        self.ass_vector.insert(pos, ass_object);
    }

    /// Reorder by ascending `bbox_match_dis`. Stable, so candidates at the
    /// same distance keep their score order.
    pub fn reranking(&mut self) {
        self.ass_vector
            .sort_by(|a, b| a.bbox_match_dis.total_cmp(&b.bbox_match_dis));
    }

    pub fn report(&self) {
        trace!("Data association report:");
        for ass in &self.ass_vector {
            trace!(
                "id: {} | score: {} | bbox dis: {}",
                ass.id, ass.score, ass.bbox_match_dis
            );
        }
    }

    pub fn best(&self) -> Option<&AssociationType> {
        self.ass_vector.first()
    }

    pub fn get(&self, index: usize) -> Option<&AssociationType> {
        self.ass_vector.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AssociationType> {
        self.ass_vector.iter()
    }

    pub fn len(&self) -> usize {
        self.ass_vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ass_vector.is_empty()
    }

    /// Drop every candidate whose score is not below `threshold`.
    pub fn retain_below(&mut self, threshold: f32) {
        self.ass_vector.retain(|a| a.score < threshold);
    }
}
