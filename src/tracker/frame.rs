//! Image frames and crops.

use ndarray::{Array2, Array3, ArcArray, Ix3, s};

use crate::tracker::rect::Rect;

/// An image crop, HxWx3.
pub type Crop = Array3<u8>;

/// One camera frame. The pixel buffer is shared, so cloning a frame is cheap.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Capture time in seconds.
    pub stamp: f64,
    /// Pixels in HxWx3 layout, RGB.
    pub image: ArcArray<u8, Ix3>,
}

impl Frame {
    pub fn new(stamp: f64, image: Array3<u8>) -> Self {
        Self {
            stamp,
            image: image.into_shared(),
        }
    }

    /// A black frame, handy for trackers that don't look at pixels.
    pub fn blank(stamp: f64, width: usize, height: usize) -> Self {
        Self::new(stamp, Array3::zeros((height, width, 3)))
    }

    pub fn width(&self) -> usize {
        self.image.dim().1
    }

    pub fn height(&self) -> usize {
        self.image.dim().0
    }

    /// The full frame rectangle.
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width() as f32, self.height() as f32)
    }

    /// Copy out the pixels under `bbox`, clipped to the frame.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn crop(&self, bbox: &Rect) -> Option<Crop> {
        let r = bbox.clip(&self.bounds());
        let x0 = r.x.floor().max(0.0) as usize;
        let y0 = r.y.floor().max(0.0) as usize;
        let x1 = ((r.x + r.width).ceil() as usize).min(self.width());
        let y1 = ((r.y + r.height).ceil() as usize).min(self.height());
        if r.is_empty() || x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(self.image.slice(s![y0..y1, x0..x1, ..]).to_owned())
    }
}

/// Luma of an RGB crop. Crops with fewer than three channels are taken as
/// grayscale and use their first channel.
fn to_gray(img: &Crop) -> Array2<f32> {
    let (h, w, c) = img.dim();
    if c < 3 {
        return Array2::from_shape_fn((h, w), |(y, x)| img[[y, x, 0]] as f32);
    }
    Array2::from_shape_fn((h, w), |(y, x)| {
        0.299 * img[[y, x, 0]] as f32 + 0.587 * img[[y, x, 1]] as f32 + 0.114 * img[[y, x, 2]] as f32
    })
}

/// Variance of the 4-neighbour Laplacian of the grayscale crop.
///
/// Low values mean little high-frequency content, i.e. a blurry crop.
/// Crops smaller than 3x3, or without channels, score zero.
pub fn blur_score(img: &Crop) -> f32 {
    let (h, w, c) = img.dim();
    if h < 3 || w < 3 || c == 0 {
        return 0.0;
    }
    let gray = to_gray(img);

    let center = gray.slice(s![1..h - 1, 1..w - 1]);
    let lap = &gray.slice(s![0..h - 2, 1..w - 1])
        + &gray.slice(s![2..h, 1..w - 1])
        + &gray.slice(s![1..h - 1, 0..w - 2])
        + &gray.slice(s![1..h - 1, 2..w])
        - &(&center * 4.0);

    let n = lap.len() as f32;
    let mean = lap.sum() / n;
    lap.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n
}
