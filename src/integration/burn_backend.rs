//! Burn inference backend for appearance embeddings.
//!
//! This module provides a `BurnEmbedder` that implements `EmbeddingService`
//! for running ReID models built with the Burn framework.
//!
//! # Example
//!
//! ```ignore
//! use reidtrack_rs::integration::{BurnEmbedder, BurnEmbeddingModel};
//! use burn::backend::NdArray;
//!
//! // Implement BurnEmbeddingModel for your ReID network
//! struct MyResNet50 { /* ... */ }
//!
//! impl BurnEmbeddingModel<NdArray> for MyResNet50 {
//!     fn forward(&self, input: burn::tensor::Tensor<NdArray, 4>) -> Vec<Vec<f32>> {
//!         // Run inference
//!     }
//! }
//!
//! let model = MyResNet50::load("reid.bin");
//! let embedder = BurnEmbedder::new(model, Default::default());
//! ```

use burn::prelude::*;
use burn::tensor::Tensor;
use ndarray::Array1;

use super::EmbeddingService;
use crate::tracker::Crop;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Error type for Burn embedding failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BurnEmbedderError {
    /// The model returned a different number of vectors than crops given.
    #[error("model returned {got} embeddings for {expected} crops")]
    BatchMismatch { expected: usize, got: usize },
    /// A crop has no pixels.
    #[error("crop {0} is empty")]
    EmptyCrop(usize),
    /// The model is unusable.
    #[error("model error: {0}")]
    Model(String),
}

/// Trait for Burn-based ReID models.
///
/// Implement this trait for your specific model architecture.
pub trait BurnEmbeddingModel<B: Backend>: Send + Sync {
    /// Run forward pass on the input tensor.
    ///
    /// # Arguments
    /// * `input` - Input tensor of shape [batch, channels, height, width]
    ///
    /// # Returns
    /// One embedding per batch entry.
    fn forward(&self, input: Tensor<B, 4>) -> Vec<Vec<f32>>;

    /// Get the expected input size (channels, height, width).
    fn input_size(&self) -> (usize, usize, usize) {
        (3, 256, 128) // Person ReID input size
    }

    /// Largest batch the model accepts in one call.
    fn max_batch(&self) -> usize {
        8
    }

    /// Check that the weights are loaded and runnable.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Burn-based embedder implementing `EmbeddingService`.
pub struct BurnEmbedder<B: Backend, M: BurnEmbeddingModel<B>> {
    model: M,
    device: B::Device,
}

impl<B: Backend, M: BurnEmbeddingModel<B>> BurnEmbedder<B, M> {
    /// Create a new Burn embedder with the given model and device.
    pub fn new(model: M, device: B::Device) -> Self {
        Self { model, device }
    }

    /// Resize (nearest neighbour), normalize with ImageNet statistics and
    /// pack crops into a `[batch, 3, H, W]` tensor.
    pub fn preprocess(&self, crops: &[Crop]) -> Result<Tensor<B, 4>, BurnEmbedderError> {
        let (channels, target_h, target_w) = self.model.input_size();
        let mut data = Vec::with_capacity(crops.len() * channels * target_h * target_w);

        for (n, crop) in crops.iter().enumerate() {
            let (h, w, crop_channels) = crop.dim();
            if h == 0 || w == 0 || crop_channels == 0 {
                return Err(BurnEmbedderError::EmptyCrop(n));
            }
            for c in 0..channels {
                // grayscale crops repeat their one channel
                let ch = c.min(crop_channels - 1).min(2);
                let norm = c.min(2);
                for y in 0..target_h {
                    let sy = (y * h / target_h).min(h - 1);
                    for x in 0..target_w {
                        let sx = (x * w / target_w).min(w - 1);
                        let v = crop[[sy, sx, ch]] as f32 / 255.0;
                        data.push((v - IMAGENET_MEAN[norm]) / IMAGENET_STD[norm]);
                    }
                }
            }
        }

        Ok(
            Tensor::<B, 1>::from_floats(data.as_slice(), &self.device).reshape([
                crops.len(),
                channels,
                target_h,
                target_w,
            ]),
        )
    }
}

impl<B: Backend, M: BurnEmbeddingModel<B>> EmbeddingService for BurnEmbedder<B, M> {
    type Error = BurnEmbedderError;

    fn warm_up(&mut self) -> Result<(), Self::Error> {
        self.model.check().map_err(BurnEmbedderError::Model)
    }

    fn extract(&mut self, crops: &[Crop]) -> Result<Vec<Array1<f32>>, Self::Error> {
        let mut out = Vec::with_capacity(crops.len());
        for chunk in crops.chunks(self.model.max_batch().max(1)) {
            let tensor = self.preprocess(chunk)?;
            let embeddings = self.model.forward(tensor);
            if embeddings.len() != chunk.len() {
                return Err(BurnEmbedderError::BatchMismatch {
                    expected: chunk.len(),
                    got: embeddings.len(),
                });
            }
            out.extend(embeddings.into_iter().map(Array1::from_vec));
        }
        Ok(out)
    }
}
