//! Approximate-time pairing of image and point-cloud streams.

use std::collections::VecDeque;

use log::warn;

/// Pairs each point cloud with the newest buffered image whose timestamp is
/// within `tolerance` seconds. Images that can no longer be paired and
/// clouds without a partner are dropped.
#[derive(Debug)]
pub struct ApproximateTimeSync<I, C> {
    images: VecDeque<(f64, I)>,
    tolerance: f64,
    queue_size: usize,
    _cloud: std::marker::PhantomData<fn(C)>,
}

impl<I, C> ApproximateTimeSync<I, C> {
    pub fn new(tolerance: f64, queue_size: usize) -> Self {
        Self {
            images: VecDeque::new(),
            tolerance,
            queue_size: queue_size.max(1),
            _cloud: std::marker::PhantomData,
        }
    }

    pub fn pending_images(&self) -> usize {
        self.images.len()
    }

    pub fn push_image(&mut self, stamp: f64, image: I) {
        if self.images.len() == self.queue_size {
            self.images.pop_front();
        }
        self.images.push_back((stamp, image));
    }

    /// Offer a cloud. Returns the matched pair, consuming the image and
    /// every image older than it.
    pub fn push_cloud(&mut self, stamp: f64, cloud: C) -> Option<(I, C)> {
        let idx = self
            .images
            .iter()
            .rposition(|(t, _)| (t - stamp).abs() <= self.tolerance);

        let Some(idx) = idx else {
            // images that are already too old for this cloud won't pair later
            self.images.retain(|(t, _)| *t >= stamp - self.tolerance);
            warn!("point cloud at {:.3} has no image within {:.3}s, dropped", stamp, self.tolerance);
            return None;
        };

        self.images.drain(..idx);
        self.images.pop_front().map(|(_, image)| (image, cloud))
    }
}
