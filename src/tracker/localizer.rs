//! 2D box + LiDAR point cloud fusion.

use nalgebra::{Isometry3, Point3};

use crate::tracker::config::CameraIntrinsic;
use crate::tracker::rect::Rect;

/// Points in the LiDAR frame.
pub type PointCloud = Vec<Point3<f64>>;

/// Rigid transforms relating the sensors and the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrinsics {
    /// LiDAR frame to camera optical frame (z forward, x right, y down).
    pub lidar_to_camera: Isometry3<f64>,
    /// LiDAR frame to the frame positions are reported in.
    pub lidar_to_map: Isometry3<f64>,
}

impl Default for Extrinsics {
    fn default() -> Self {
        Self {
            lidar_to_camera: Isometry3::identity(),
            lidar_to_map: Isometry3::identity(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Localizer {
    intrinsic: CameraIntrinsic,
    padding: f32,
}

impl Localizer {
    pub fn new(intrinsic: CameraIntrinsic, padding: f32) -> Self {
        Self { intrinsic, padding }
    }

    /// Pixel of a camera-frame point. Points at or behind the image plane
    /// have no pixel.
    pub fn project(&self, p: &Point3<f64>) -> Option<(f32, f32)> {
        if p.z <= 0.0 {
            return None;
        }
        let u = self.intrinsic.fx * p.x / p.z + self.intrinsic.cx;
        let v = self.intrinsic.fy * p.y / p.z + self.intrinsic.cy;
        Some((u as f32, v as f32))
    }

    /// LiDAR points whose projection lands inside `bbox` padded by the
    /// configured margin and clipped to `frame_bounds`.
    pub fn segment(
        &self,
        cloud: &[Point3<f64>],
        bbox: &Rect,
        frame_bounds: &Rect,
        extrinsics: &Extrinsics,
    ) -> Vec<Point3<f64>> {
        let region = bbox.padded(self.padding, frame_bounds);
        if region.is_empty() {
            return Vec::new();
        }
        cloud
            .iter()
            .filter(|p| {
                self.project(&extrinsics.lidar_to_camera.transform_point(p))
                    .is_some_and(|(u, v)| region.contains(u, v))
            })
            .copied()
            .collect()
    }

    /// Centroid, in the map frame, of the points that fall in `bbox`.
    ///
    /// `None` when no point projects into the box.
    pub fn localize(
        &self,
        bbox: &Rect,
        cloud: &[Point3<f64>],
        frame_bounds: &Rect,
        extrinsics: &Extrinsics,
    ) -> Option<Point3<f64>> {
        let segment = self.segment(cloud, bbox, frame_bounds, extrinsics);
        if segment.is_empty() {
            return None;
        }
        let n = segment.len() as f64;
        let sum = segment
            .iter()
            .map(|p| extrinsics.lidar_to_map.transform_point(p).coords)
            .fold(nalgebra::Vector3::zeros(), |acc, c| acc + c);
        Some(Point3::from(sum / n))
    }
}
