//! Constant-velocity Kalman filter over 3D positions, using ndarray for the
//! state and nalgebra for the innovation inverse.

use ndarray::{Array1, Array2};

use crate::error::TrackerError;
use crate::tracker::config::KalmanFilter3dParam;

const NDIM: usize = 3;

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    update_mat: Array2<f64>,
    std_position: f64,
    std_velocity: f64,
    std_measurement: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new(&KalmanFilter3dParam::default())
    }
}

impl KalmanFilter {
    pub fn new(param: &KalmanFilter3dParam) -> Self {
        let mut update_mat = Array2::<f64>::zeros((NDIM, 2 * NDIM));
        for i in 0..NDIM {
            update_mat[[i, i]] = 1.0;
        }

        Self {
            update_mat,
            std_position: param.std_position,
            std_velocity: param.std_velocity,
            std_measurement: param.std_measurement,
        }
    }

    fn motion_mat(dt: f64) -> Array2<f64> {
        let mut motion_mat = Array2::<f64>::eye(2 * NDIM);
        for i in 0..NDIM {
            motion_mat[[i, NDIM + i]] = dt;
        }
        motion_mat
    }

    /// State from a first measurement, with zero velocity.
    pub fn initiate(&self, measurement: [f64; NDIM]) -> (Array1<f64>, Array2<f64>) {
        let mut mean = Array1::<f64>::zeros(2 * NDIM);
        for i in 0..NDIM {
            mean[i] = measurement[i];
        }

        let mut cov = Array2::<f64>::zeros((2 * NDIM, 2 * NDIM));
        for i in 0..NDIM {
            cov[[i, i]] = (2.0 * self.std_measurement).powi(2);
            cov[[NDIM + i, NDIM + i]] = (10.0 * self.std_velocity).powi(2);
        }

        (mean, cov)
    }

    pub fn predict(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
        dt: f64,
    ) -> (Array1<f64>, Array2<f64>) {
        let dt = dt.max(0.0);
        let mut motion_cov = Array2::<f64>::zeros((2 * NDIM, 2 * NDIM));
        for i in 0..NDIM {
            motion_cov[[i, i]] = (self.std_position * dt).powi(2);
            motion_cov[[NDIM + i, NDIM + i]] = (self.std_velocity * dt).powi(2);
        }

        let motion_mat = Self::motion_mat(dt);
        let new_mean = motion_mat.dot(mean);
        let new_covariance = motion_mat.dot(covariance).dot(&motion_mat.t()) + motion_cov;

        (new_mean, new_covariance)
    }

    pub fn project(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
    ) -> (Array1<f64>, Array2<f64>) {
        let innovation_cov = Array2::<f64>::eye(NDIM) * self.std_measurement.powi(2);

        let mean_proj = self.update_mat.dot(mean);
        let covariance_proj =
            self.update_mat.dot(covariance).dot(&self.update_mat.t()) + innovation_cov;

        (mean_proj, covariance_proj)
    }

    pub fn update(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
        measurement: [f64; NDIM],
    ) -> Result<(Array1<f64>, Array2<f64>), TrackerError> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);

        let innovation = Array1::from_vec(measurement.to_vec()) - projected_mean;

        // K = P * H^T * S^-1, with H = [I 0]
        let s_inv = Self::invert(&projected_cov)?;
        let pht = covariance.dot(&self.update_mat.t());
        let kalman_gain = pht.dot(&s_inv);

        let new_mean = mean + &kalman_gain.dot(&innovation);
        let new_covariance = covariance - &kalman_gain.dot(&projected_cov).dot(&kalman_gain.t());

        Ok((new_mean, new_covariance))
    }

    fn invert(m: &Array2<f64>) -> Result<Array2<f64>, TrackerError> {
        let nm = nalgebra::Matrix3::from_fn(|i, j| m[[i, j]]);
        let inv = nm.try_inverse().ok_or(TrackerError::SingularMatrix)?;
        Ok(Array2::from_shape_fn((NDIM, NDIM), |(i, j)| inv[(i, j)]))
    }
}

/// Smoothed 3D position of one track.
#[derive(Debug, Clone)]
pub struct PositionFilter {
    mean: Array1<f64>,
    covariance: Array2<f64>,
    stamp: f64,
}

impl PositionFilter {
    pub fn new(kf: &KalmanFilter, position: [f64; 3], stamp: f64) -> Self {
        let (mean, covariance) = kf.initiate(position);
        Self {
            mean,
            covariance,
            stamp,
        }
    }

    /// Fold in a new centroid and return the filtered position.
    pub fn update(
        &mut self,
        kf: &KalmanFilter,
        position: [f64; 3],
        stamp: f64,
    ) -> Result<[f64; 3], TrackerError> {
        let (mean, cov) = kf.predict(&self.mean, &self.covariance, stamp - self.stamp);
        let (mean, cov) = kf.update(&mean, &cov, position)?;
        self.mean = mean;
        self.covariance = cov;
        self.stamp = stamp;
        Ok(self.position())
    }

    pub fn position(&self) -> [f64; 3] {
        [self.mean[0], self.mean[1], self.mean[2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_initiate() {
        let kf = KalmanFilter::default();
        let (mean, _) = kf.initiate([1.0, 2.0, 3.0]);
        assert_eq!(mean[0], 1.0);
        assert_eq!(mean[5], 0.0);
    }

    #[test]
    fn test_update_moves_towards_measurement() {
        let kf = KalmanFilter::default();
        let mut pf = PositionFilter::new(&kf, [0.0, 0.0, 0.0], 0.0);
        let p = pf.update(&kf, [1.0, 0.0, 0.0], 0.1).unwrap();
        assert!(p[0] > 0.0 && p[0] < 1.0);
        assert_abs_diff_eq!(p[1], 0.0);
    }

    #[test]
    fn test_project_adds_measurement_noise() {
        let kf = KalmanFilter::default();
        let (mean, cov) = kf.initiate([1.0, 2.0, 3.0]);
        let (proj_mean, proj_cov) = kf.project(&mean, &cov);
        assert_eq!(proj_mean.to_vec(), vec![1.0, 2.0, 3.0]);
        // initial 0.4^2 position variance plus 0.2^2 measurement noise
        assert_abs_diff_eq!(proj_cov[[0, 0]], 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(proj_cov[[0, 1]], 0.0);
    }

    #[test]
    fn test_static_target_converges() {
        let kf = KalmanFilter::default();
        let mut pf = PositionFilter::new(&kf, [5.0, 5.0, 0.0], 0.0);
        for i in 1..50 {
            pf.update(&kf, [5.0, 5.0, 0.0], i as f64 * 0.1).unwrap();
        }
        assert_abs_diff_eq!(pf.position()[0], 5.0, epsilon = 1e-6);
    }
}
