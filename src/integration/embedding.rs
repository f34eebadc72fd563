//! Trait for appearance-embedding backends.

use ndarray::Array1;

use crate::tracker::Crop;

/// Batch embedding extraction: crops in, one fixed-length vector per crop out.
///
/// Implement this trait to connect any ReID model to the tracker.
///
/// # Example
///
/// ```ignore
/// use reidtrack_rs::integration::EmbeddingService;
/// use reidtrack_rs::tracker::Crop;
/// use ndarray::Array1;
///
/// struct MyReid {
///     // Your model here
/// }
///
/// impl EmbeddingService for MyReid {
///     type Error = std::io::Error;
///
///     fn extract(&mut self, crops: &[Crop]) -> Result<Vec<Array1<f32>>, Self::Error> {
///         Ok(crops.iter().map(|_| Array1::zeros(2048)).collect())
///     }
/// }
/// ```
pub trait EmbeddingService {
    /// Error type for extraction failures.
    type Error: std::fmt::Display;

    /// Load whatever the backend needs (weights, engine cache, device).
    ///
    /// Called once when the pipeline starts; an error here stops the
    /// pipeline from being built.
    fn warm_up(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Embed every crop, in order.
    fn extract(&mut self, crops: &[Crop]) -> Result<Vec<Array1<f32>>, Self::Error>;
}
