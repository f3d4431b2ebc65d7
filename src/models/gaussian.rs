//! Gaussian line profile evaluation.
//!
//! The fitter relies on two primitive operations:
//! - evaluate `A * exp(-(x - C)^2 / (2 W^2))` at a pixel (for residuals/plots)
//! - the partial derivatives with respect to `(A, C, W)` (for the Jacobian)
//!
//! Parameters travel through the solver as a 3-vector `[A, C, W]`.

use nalgebra::{DMatrix, DVector};

use crate::domain::GaussianProfile;
use crate::math::LeastSquaresProblem;

/// Evaluate the profile at pixel coordinate `x`.
pub fn evaluate(profile: &GaussianProfile, x: f64) -> f64 {
    let d = x - profile.center;
    profile.amplitude * (-(d * d) / (2.0 * profile.width * profile.width)).exp()
}

/// Partial derivatives `[∂/∂A, ∂/∂C, ∂/∂W]` at pixel coordinate `x`.
pub fn gradient(profile: &GaussianProfile, x: f64) -> [f64; 3] {
    let w2 = profile.width * profile.width;
    let d = x - profile.center;
    let g = (-(d * d) / (2.0 * w2)).exp();
    let a = profile.amplitude;
    [g, a * g * d / w2, a * g * d * d / (w2 * profile.width)]
}

/// Sample the profile at each coordinate in `xs`.
pub fn sample(profile: &GaussianProfile, xs: &[f64]) -> Vec<f64> {
    xs.iter().map(|&x| evaluate(profile, x)).collect()
}

pub fn to_params(profile: &GaussianProfile) -> DVector<f64> {
    DVector::from_vec(vec![profile.amplitude, profile.center, profile.width])
}

pub fn from_params(params: &DVector<f64>) -> GaussianProfile {
    GaussianProfile::new(params[0], params[1], params[2])
}

/// Residuals `model(x_i) - y_i` over a window of samples.
pub struct GaussianProblem<'a> {
    pub x: &'a [f64],
    pub y: &'a [f64],
}

impl LeastSquaresProblem for GaussianProblem<'_> {
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        let profile = from_params(params);
        DVector::from_iterator(
            self.x.len(),
            self.x.iter().zip(self.y).map(|(&x, &y)| evaluate(&profile, x) - y),
        )
    }

    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64> {
        let profile = from_params(params);
        let mut jac = DMatrix::<f64>::zeros(self.x.len(), 3);
        for (i, &x) in self.x.iter().enumerate() {
            let row = gradient(&profile, x);
            for (j, v) in row.into_iter().enumerate() {
                jac[(i, j)] = v;
            }
        }
        jac
    }
}
