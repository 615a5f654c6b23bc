//! Head orientation from six face landmarks via a perspective-n-point solve.
//!
//! The camera is modelled with focal length equal to the frame width, the
//! principal point at the frame center and no lens distortion. The solve is a
//! direct linear transform for the initial guess, refined by Levenberg-Marquardt
//! on the pixel reprojection error.

use nalgebra::{Matrix3, Rotation3, SMatrix, SVector, Vector3, Vector6};

use crate::{
    Error, Result,
    types::{FACE_LANDMARKS, HeadPose, LandmarkSet},
};

const NUM_POINTS: usize = 6;
const NUM_RESIDUALS: usize = NUM_POINTS * 2;
const MAX_ITERATIONS: usize = 100;
const MIN_DEPTH: f64 = 1e-6;
const MIN_IMAGE_SPREAD: f64 = 1e-6;

/// Face-model indices of nose tip, chin, left eye outer corner, right eye
/// outer corner, left mouth corner, right mouth corner.
pub const POSE_LANDMARK_INDICES: [usize; NUM_POINTS] = [1, 152, 33, 263, 61, 291];

/// Canonical face, y pointing down to match image coordinates.
pub const FACE_TEMPLATE: [[f64; 3]; NUM_POINTS] = [
    [0.0, 0.0, 0.0],
    [0.0, 330.0, 65.0],
    [-225.0, -170.0, 135.0],
    [225.0, -170.0, 135.0],
    [-150.0, 150.0, 125.0],
    [150.0, 150.0, 125.0],
];

type Jacobian = SMatrix<f64, NUM_RESIDUALS, 6>;
type Residuals = SVector<f64, NUM_RESIDUALS>;

#[derive(Clone, Copy, Debug)]
pub struct CameraIntrinsics {
    pub focal: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn for_frame(width: u32, height: u32) -> Self {
        Self {
            focal: f64::from(width),
            cx: f64::from(width) / 2.0,
            cy: f64::from(height) / 2.0,
        }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focal, 0.0, self.cx, //
            0.0, self.focal, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    pub fn project(&self, point: &Vector3<f64>) -> Option<(f64, f64)> {
        if point.z <= MIN_DEPTH {
            return None;
        }
        Some((
            self.focal * point.x / point.z + self.cx,
            self.focal * point.y / point.z + self.cy,
        ))
    }
}

#[derive(Clone, Debug)]
pub struct PnpSolution {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    /// Root-mean-square reprojection error in pixels.
    pub rms_error: f64,
}

impl PnpSolution {
    /// Euler angles in degrees, pitch and yaw negated for a y-up left-handed consumer.
    pub fn head_pose(&self) -> HeadPose {
        let (x, y, z) = self.rotation.euler_angles();
        HeadPose {
            pitch: -x.to_degrees(),
            yaw: -y.to_degrees(),
            roll: z.to_degrees(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PoseSolver {
    model_points: [Vector3<f64>; NUM_POINTS],
}

impl Default for PoseSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseSolver {
    pub fn new() -> Self {
        Self::with_template(FACE_TEMPLATE)
    }

    pub fn with_template(template: [[f64; 3]; NUM_POINTS]) -> Self {
        Self {
            model_points: template.map(|[x, y, z]| Vector3::new(x, y, z)),
        }
    }

    /// Picks the six pose landmarks out of a face set and solves for head orientation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the set is not a full face mesh and
    /// [`Error::NoPoseSolution`] when the point configuration is degenerate.
    pub fn estimate(&self, face: &LandmarkSet, width: u32, height: u32) -> Result<HeadPose> {
        if face.len() < FACE_LANDMARKS {
            return Err(Error::InvalidInput(format!(
                "Expected {} face landmarks, got {}",
                FACE_LANDMARKS,
                face.len()
            )));
        }

        let mut image_points = [(0.0, 0.0); NUM_POINTS];
        for (slot, &idx) in image_points.iter_mut().zip(POSE_LANDMARK_INDICES.iter()) {
            let p = face
                .get(idx)
                .ok_or_else(|| Error::InvalidInput(format!("Missing face landmark {idx}")))?;
            *slot = (
                f64::from(p.x) * f64::from(width),
                f64::from(p.y) * f64::from(height),
            );
        }

        Ok(self.solve(&image_points, width, height)?.head_pose())
    }

    /// Solves for the camera-from-model transform given pixel positions of the template points.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPoseSolution`] when the frame has no area, the image
    /// points collapse to a point or line, or no refinement ends with every
    /// point in front of the camera.
    pub fn solve(
        &self,
        image_points: &[(f64, f64); NUM_POINTS],
        width: u32,
        height: u32,
    ) -> Result<PnpSolution> {
        if width == 0 || height == 0 {
            return Err(Error::NoPoseSolution("frame has zero area".to_string()));
        }
        if image_points
            .iter()
            .any(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(Error::NoPoseSolution("non-finite image point".to_string()));
        }

        let intrinsics = CameraIntrinsics::for_frame(width, height);
        let normalized = image_points.map(|(u, v)| {
            (
                (u - intrinsics.cx) / intrinsics.focal,
                (v - intrinsics.cy) / intrinsics.focal,
            )
        });
        if is_degenerate(&normalized) {
            return Err(Error::NoPoseSolution(
                "image points are coincident or collinear".to_string(),
            ));
        }

        let mut best: Option<(Vector6<f64>, f64)> = None;
        let starts = [
            self.linear_estimate(&normalized),
            Some(self.weak_perspective_estimate(&normalized)),
        ];
        for start in starts.into_iter().flatten() {
            let Some((params, cost)) = self.refine(start, &normalized, intrinsics.focal) else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, best_cost)| cost < *best_cost) {
                best = Some((params, cost));
            }
        }

        let (params, cost) = best.ok_or_else(|| {
            Error::NoPoseSolution("refinement did not converge in front of the camera".to_string())
        })?;
        let (rotation, translation) = split_params(&params);

        Ok(PnpSolution {
            rotation,
            translation,
            rms_error: (cost / NUM_POINTS as f64).sqrt(),
        })
    }

    /// Direct linear transform on normalized coordinates. `None` when the
    /// recovered matrix is not a proper rotation in front of the camera.
    fn linear_estimate(&self, normalized: &[(f64, f64); NUM_POINTS]) -> Option<Vector6<f64>> {
        let (centroid, scale) = centroid_and_scale(&self.model_points);
        if scale <= f64::EPSILON {
            return None;
        }

        let mut a = SMatrix::<f64, NUM_RESIDUALS, 12>::zeros();
        for (i, (model, &(xn, yn))) in self.model_points.iter().zip(normalized).enumerate() {
            let p = (model - centroid) / scale;
            let homogeneous = [p.x, p.y, p.z, 1.0];
            for (k, &value) in homogeneous.iter().enumerate() {
                a[(2 * i, k)] = value;
                a[(2 * i, 8 + k)] = -xn * value;
                a[(2 * i + 1, 4 + k)] = value;
                a[(2 * i + 1, 8 + k)] = -yn * value;
            }
        }

        let svd = a.svd(false, true);
        let v_t = svd.v_t?;
        let null_idx = svd.singular_values.imin();
        let mut p = v_t.row(null_idx).transpose();

        // The model centroid maps to the last column; it must sit in front of the camera.
        if p[11] < 0.0 {
            p = -p;
        }

        let m = Matrix3::new(p[0], p[1], p[2], p[4], p[5], p[6], p[8], p[9], p[10]);
        let offset = Vector3::new(p[3], p[7], p[11]);

        let m_svd = m.svd(true, true);
        let (u, v_t) = (m_svd.u?, m_svd.v_t?);
        let r = u * v_t;
        if r.determinant() <= 0.0 {
            return None;
        }
        let lambda = m_svd.singular_values.sum() / 3.0;
        if lambda <= f64::EPSILON {
            return None;
        }

        // x ~ R (X - c) / s + t'  =>  x ~ R X + (s t' - R c)
        let rotation = Rotation3::from_matrix_unchecked(r);
        let translation = offset / lambda * scale - rotation * centroid;
        if !translation.iter().all(|v| v.is_finite()) {
            return None;
        }

        Some(join_params(&rotation, &translation))
    }

    /// Frontal face at the depth that matches the observed spread.
    fn weak_perspective_estimate(&self, normalized: &[(f64, f64); NUM_POINTS]) -> Vector6<f64> {
        let (centroid, model_scale) = centroid_and_scale(&self.model_points);
        let (mx, my) = mean_2d(normalized);
        let image_scale = normalized
            .iter()
            .map(|(x, y)| ((x - mx).powi(2) + (y - my).powi(2)).sqrt())
            .sum::<f64>()
            / NUM_POINTS as f64;

        let depth = model_scale / image_scale.max(MIN_IMAGE_SPREAD);
        let translation = Vector3::new(
            mx * depth - centroid.x,
            my * depth - centroid.y,
            depth - centroid.z,
        );
        join_params(&Rotation3::identity(), &translation)
    }

    fn residuals(
        &self,
        params: &Vector6<f64>,
        normalized: &[(f64, f64); NUM_POINTS],
        focal: f64,
    ) -> Option<Residuals> {
        let (rotation, translation) = split_params(params);
        let mut out = Residuals::zeros();
        for (i, (model, &(xn, yn))) in self.model_points.iter().zip(normalized).enumerate() {
            let cam = rotation * model + translation;
            if cam.z <= MIN_DEPTH {
                return None;
            }
            out[2 * i] = (cam.x / cam.z - xn) * focal;
            out[2 * i + 1] = (cam.y / cam.z - yn) * focal;
        }
        Some(out)
    }

    fn jacobian(
        &self,
        params: &Vector6<f64>,
        normalized: &[(f64, f64); NUM_POINTS],
        focal: f64,
    ) -> Option<Jacobian> {
        let mut jac = Jacobian::zeros();
        for j in 0..6 {
            let step = 1e-6 * params[j].abs().max(1.0);
            let mut forward = *params;
            let mut backward = *params;
            forward[j] += step;
            backward[j] -= step;
            let diff = (self.residuals(&forward, normalized, focal)?
                - self.residuals(&backward, normalized, focal)?)
                / (2.0 * step);
            jac.set_column(j, &diff);
        }
        Some(jac)
    }

    /// Levenberg-Marquardt on the squared pixel reprojection error.
    fn refine(
        &self,
        start: Vector6<f64>,
        normalized: &[(f64, f64); NUM_POINTS],
        focal: f64,
    ) -> Option<(Vector6<f64>, f64)> {
        let mut params = start;
        let mut residuals = self.residuals(&params, normalized, focal)?;
        let mut cost = residuals.norm_squared();
        let mut damping = 1e-3;

        for _ in 0..MAX_ITERATIONS {
            let jac = self.jacobian(&params, normalized, focal)?;
            let jt_j = jac.transpose() * jac;
            let gradient = jac.transpose() * residuals;

            let mut accepted = false;
            while damping < 1e12 {
                let mut system = jt_j;
                for d in 0..6 {
                    system[(d, d)] += damping * jt_j[(d, d)].max(1e-9);
                }
                let Some(step) = system.lu().solve(&(-gradient)) else {
                    damping *= 10.0;
                    continue;
                };

                let candidate = params + step;
                match self.residuals(&candidate, normalized, focal) {
                    Some(next) if next.norm_squared() < cost => {
                        let next_cost = next.norm_squared();
                        let improvement = cost - next_cost;
                        params = candidate;
                        residuals = next;
                        cost = next_cost;
                        damping = (damping / 10.0).max(1e-12);
                        accepted = true;
                        if step.norm() < 1e-12 || improvement < 1e-14 * (1.0 + cost) {
                            return finite(params, cost);
                        }
                        break;
                    }
                    _ => damping *= 10.0,
                }
            }

            if !accepted {
                break;
            }
        }

        finite(params, cost)
    }
}

fn finite(params: Vector6<f64>, cost: f64) -> Option<(Vector6<f64>, f64)> {
    (params.iter().all(|v| v.is_finite()) && cost.is_finite()).then_some((params, cost))
}

fn split_params(params: &Vector6<f64>) -> (Rotation3<f64>, Vector3<f64>) {
    let axis_angle = Vector3::new(params[0], params[1], params[2]);
    let translation = Vector3::new(params[3], params[4], params[5]);
    (Rotation3::new(axis_angle), translation)
}

fn join_params(rotation: &Rotation3<f64>, translation: &Vector3<f64>) -> Vector6<f64> {
    let r = rotation.scaled_axis();
    Vector6::new(r.x, r.y, r.z, translation.x, translation.y, translation.z)
}

fn centroid_and_scale(points: &[Vector3<f64>; NUM_POINTS]) -> (Vector3<f64>, f64) {
    let centroid = points.iter().fold(Vector3::zeros(), |acc, p| acc + p) / NUM_POINTS as f64;
    let scale = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / NUM_POINTS as f64;
    (centroid, scale)
}

fn mean_2d(points: &[(f64, f64); NUM_POINTS]) -> (f64, f64) {
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |acc, (x, y)| (acc.0 + x, acc.1 + y));
    (sx / NUM_POINTS as f64, sy / NUM_POINTS as f64)
}

/// Smallest spread direction of the 2-D points is (close to) zero.
fn is_degenerate(points: &[(f64, f64); NUM_POINTS]) -> bool {
    let (mx, my) = mean_2d(points);
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in points {
        let (dx, dy) = (x - mx, y - my);
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    let trace = sxx + syy;
    let det = sxx * syy - sxy * sxy;
    let min_eigen = trace / 2.0 - ((trace / 2.0).powi(2) - det).max(0.0).sqrt();
    trace < MIN_IMAGE_SPREAD || min_eigen < MIN_IMAGE_SPREAD * trace
}
