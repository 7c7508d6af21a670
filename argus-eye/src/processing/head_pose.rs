//! Head-pose estimation from six facial landmarks
//!
//! Uses iterative pose-from-orthography-and-scaling against a fixed 3D
//! head model. The model is expressed in camera-aligned axes (x right,
//! y down, z away from the camera) with the nose tip at the origin, so
//! a face looking straight into the lens solves to the identity rotation.

use crate::models::FaceLandmarks;
use nalgebra::{Matrix3, Rotation3, SMatrix, Vector3};

const MAX_ITERATIONS: usize = 40;
const CONVERGENCE_EPSILON: f64 = 1e-7;
/// Distance of the rendered head from the camera, millimetres
const PROJECTION_DEPTH: f64 = 600.0;

/// Euler angles in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadPose {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Generic head model, millimetres, nose tip first
const MODEL_POINTS: [[f64; 3]; 6] = [
    [0.0, 0.0, 0.0],       // nose tip
    [0.0, 63.6, 12.5],     // chin
    [-43.3, -32.7, 26.0],  // image-left eye outer corner
    [43.3, -32.7, 26.0],   // image-right eye outer corner
    [-28.9, 28.9, 24.1],   // image-left mouth corner
    [28.9, 28.9, 24.1],    // image-right mouth corner
];

#[derive(Debug, Clone, Default)]
pub struct HeadPoseSolver;

impl HeadPoseSolver {
    pub fn new() -> Self {
        Self
    }

    /// Solve for head rotation.
    ///
    /// The camera is approximated with focal length equal to the frame
    /// width and the principal point at the frame centre. Returns `None`
    /// for degenerate landmark layouts.
    pub fn solve(&self, landmarks: &FaceLandmarks, width: u32, height: u32) -> Option<HeadPose> {
        if width == 0 || height == 0 {
            return None;
        }

        let focal = width as f64;
        let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
        let image: Vec<(f64, f64)> = landmarks
            .points()
            .iter()
            .map(|p| (p[0] - cx, p[1] - cy))
            .collect();

        let model = SMatrix::<f64, 5, 3>::from_fn(|r, c| MODEL_POINTS[r + 1][c]);
        let pseudo_inverse = (model.transpose() * model).try_inverse()? * model.transpose();

        let mut epsilon = [0.0f64; 5];
        let mut rotation = Matrix3::identity();

        for _ in 0..MAX_ITERATIONS {
            let (x0, y0) = image[0];
            let xs = SMatrix::<f64, 5, 1>::from_fn(|r, _| image[r + 1].0 * (1.0 + epsilon[r]) - x0);
            let ys = SMatrix::<f64, 5, 1>::from_fn(|r, _| image[r + 1].1 * (1.0 + epsilon[r]) - y0);

            let i_vec: Vector3<f64> = pseudo_inverse * xs;
            let j_vec: Vector3<f64> = pseudo_inverse * ys;
            let (s1, s2) = (i_vec.norm(), j_vec.norm());
            if s1 < f64::EPSILON || s2 < f64::EPSILON {
                return None;
            }

            let i_hat = i_vec / s1;
            let k_hat = i_hat.cross(&(j_vec / s2)).try_normalize(f64::EPSILON)?;
            let j_hat = k_hat.cross(&i_hat);
            rotation = Matrix3::from_rows(&[i_hat.transpose(), j_hat.transpose(), k_hat.transpose()]);

            let z0 = focal / ((s1 + s2) / 2.0);
            let mut delta = 0.0f64;
            for r in 0..5 {
                let point = Vector3::from(MODEL_POINTS[r + 1]);
                let next = point.dot(&k_hat) / z0;
                delta = delta.max((next - epsilon[r]).abs());
                epsilon[r] = next;
            }

            if delta < CONVERGENCE_EPSILON {
                break;
            }
        }

        let pose = euler_degrees(&rotation);
        if pose.yaw.is_finite() && pose.pitch.is_finite() && pose.roll.is_finite() {
            Some(pose)
        } else {
            None
        }
    }

    /// Render the head model at `pose` through the same camera `solve`
    /// assumes. Roll is ignored.
    pub fn project(&self, pose: HeadPose, width: u32, height: u32) -> FaceLandmarks {
        let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), pose.yaw.to_radians())
            * Rotation3::from_axis_angle(&Vector3::x_axis(), pose.pitch.to_radians());
        let translation = Vector3::new(0.0, 0.0, PROJECTION_DEPTH);
        let focal = width as f64;
        let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);

        let [nose_tip, chin, left_eye_corner, right_eye_corner, left_mouth_corner, right_mouth_corner] =
            MODEL_POINTS.map(|p| {
                let cam = rotation * Vector3::from(p) + translation;
                [focal * cam.x / cam.z + cx, focal * cam.y / cam.z + cy]
            });

        FaceLandmarks {
            nose_tip,
            chin,
            left_eye_corner,
            right_eye_corner,
            left_mouth_corner,
            right_mouth_corner,
            landmark_count: MODEL_POINTS.len(),
            face_box: None,
            left_eye: None,
            right_eye: None,
        }
    }
}

fn euler_degrees(r: &Matrix3<f64>) -> HeadPose {
    let yaw = (-r[(2, 0)]).atan2((r[(0, 0)].powi(2) + r[(1, 0)].powi(2)).sqrt());
    let pitch = r[(2, 1)].atan2(r[(2, 2)]);
    let roll = r[(1, 0)].atan2(r[(0, 0)]);
    HeadPose {
        yaw: yaw.to_degrees(),
        pitch: pitch.to_degrees(),
        roll: roll.to_degrees(),
    }
}
