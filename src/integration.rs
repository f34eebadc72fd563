//! Integration module for connecting the tracker to its collaborators.
//!
//! This module provides the embedding-backend trait, a detection builder and
//! the thread-safe pipeline that serializes access to the track set across
//! frame, detector, ReID and point-cloud callbacks.

mod builder;
mod embedding;
mod pipeline;

pub use builder::DetectionBuilder;
pub use embedding::EmbeddingService;
pub use pipeline::TrackerPipeline;

#[cfg(feature = "burn-backend")]
mod burn_backend;

#[cfg(feature = "burn-backend")]
pub use burn_backend::{BurnEmbedder, BurnEmbedderError, BurnEmbeddingModel};
