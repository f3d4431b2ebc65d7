//! Levenberg–Marquardt solver for small nonlinear least-squares problems.
//!
//! We minimize `Σ r_i(p)^2` with damped Gauss–Newton steps:
//!
//! ```text
//! (JᵀJ + λ D²) δ = -Jᵀ r
//! ```
//!
//! where `D` holds the running maximum of the Jacobian column norms (MINPACK's
//! scale-invariant damping). The step is computed as the SVD least-squares
//! solution of the stacked system `[J; sqrt(λ) D] δ ≈ [-r; 0]`.
//!
//! Termination mirrors MINPACK `lmder`:
//! - `ftol`: actual and predicted relative reductions of the sum of squares
//!   are both below `ftol`
//! - `xtol`: the scaled step is below `xtol` times the scaled parameter norm
//!   (also tested on rejected steps, where it means no further progress is
//!   possible at working precision)
//! - `gtol`: the cosine between the residual vector and every Jacobian column
//!   is below `gtol`
//! - evaluation budget exhausted
//!
//! The first three are successful terminations; the caller decides what
//! a successful termination means for its model.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::math::solve_least_squares;

const MIN_DAMPING: f64 = 1e-15;
const MAX_DAMPING: f64 = 1e16;

/// A residual function with an analytic Jacobian.
pub trait LeastSquaresProblem {
    /// Residual vector at `params`.
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64>;

    /// Jacobian `∂r_i/∂p_j` at `params` (rows = residuals, cols = params).
    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64>;
}

/// Stopping criteria and damping schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    /// Maximum number of residual evaluations (accepted and rejected trials).
    pub max_evaluations: usize,
    /// Initial λ relative to the column scaling.
    pub initial_damping: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        // Same tolerances as the classic MINPACK driver; 200 * (n + 1) evaluations for n = 3.
        Self {
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            gtol: 0.0,
            max_evaluations: 800,
            initial_damping: 1e-3,
        }
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    ResidualTolerance,
    StepTolerance,
    BothTolerances,
    GradientTolerance,
    MaxEvaluations,
    /// Damping overflowed without finding a descent step.
    NoProgress,
    /// Residuals or Jacobian were not finite.
    NonFinite,
}

impl Termination {
    /// Whether the solver stopped at a local minimum.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Termination::ResidualTolerance
                | Termination::StepTolerance
                | Termination::BothTolerances
                | Termination::GradientTolerance
        )
    }

    pub fn describe(self) -> &'static str {
        match self {
            Termination::ResidualTolerance => "relative reduction below ftol",
            Termination::StepTolerance => "relative step below xtol",
            Termination::BothTolerances => "reduction and step below tolerance",
            Termination::GradientTolerance => "gradient orthogonal to residuals",
            Termination::MaxEvaluations => "evaluation budget exhausted",
            Termination::NoProgress => "no descent step found",
            Termination::NonFinite => "non-finite residuals",
        }
    }
}

/// Final state of a solver run.
#[derive(Debug, Clone)]
pub struct SolverReport {
    /// Last accepted iterate.
    pub params: DVector<f64>,
    pub termination: Termination,
    pub evaluations: usize,
    pub iterations: usize,
    /// Sum of squared residuals at `params`.
    pub sse: f64,
}

/// Minimize the sum of squared residuals starting from `initial`.
pub fn levenberg_marquardt<P: LeastSquaresProblem>(
    problem: &P,
    initial: DVector<f64>,
    opts: &SolverOptions,
) -> SolverReport {
    let n = initial.len();
    let mut params = initial;
    let mut r = problem.residuals(&params);
    let mut sse = r.norm_squared();
    let mut evaluations = 1usize;
    let mut iterations = 0usize;

    let report = |params: DVector<f64>, termination, evaluations, iterations, sse| SolverReport {
        params,
        termination,
        evaluations,
        iterations,
        sse,
    };

    if !sse.is_finite() {
        return report(params, Termination::NonFinite, evaluations, iterations, sse);
    }
    if sse == 0.0 {
        return report(params, Termination::GradientTolerance, evaluations, iterations, sse);
    }

    let mut diag = DVector::<f64>::zeros(n);
    let mut lambda = opts.initial_damping.max(MIN_DAMPING);

    loop {
        if evaluations >= opts.max_evaluations {
            return report(params, Termination::MaxEvaluations, evaluations, iterations, sse);
        }

        let jac = problem.jacobian(&params);
        if jac.iter().any(|v| !v.is_finite()) {
            return report(params, Termination::NonFinite, evaluations, iterations, sse);
        }
        iterations += 1;

        let col_norms: Vec<f64> = (0..n).map(|j| jac.column(j).norm()).collect();
        for j in 0..n {
            diag[j] = diag[j].max(col_norms[j]);
            if diag[j] == 0.0 {
                diag[j] = 1.0;
            }
        }

        // Gradient test: cosine between r and each column of J.
        let rnorm = sse.sqrt();
        let g = jac.transpose() * &r;
        let mut gnorm = 0.0_f64;
        for j in 0..n {
            if col_norms[j] > 0.0 {
                gnorm = gnorm.max((g[j] / (col_norms[j] * rnorm)).abs());
            }
        }
        if gnorm <= opts.gtol {
            return report(params, Termination::GradientTolerance, evaluations, iterations, sse);
        }

        let pnorm = diag.component_mul(&params).norm();

        // Inner loop: raise λ until a trial step reduces the sum of squares.
        loop {
            let Some(step) = damped_step(&jac, &r, &diag, lambda) else {
                lambda *= 10.0;
                if lambda > MAX_DAMPING {
                    return report(params, Termination::NoProgress, evaluations, iterations, sse);
                }
                continue;
            };

            let trial = &params + &step;
            let r_trial = problem.residuals(&trial);
            evaluations += 1;
            let sse_trial = r_trial.norm_squared();

            let step_norm = diag.component_mul(&step).norm();
            let small_step = step_norm <= opts.xtol * pnorm;

            log::trace!(
                "levmar eval={evaluations} lambda={lambda:.3e} sse={sse:.6e} trial={sse_trial:.6e} step={step_norm:.3e}"
            );

            if sse_trial.is_finite() && sse_trial < sse {
                let predicted = (&r + &jac * &step).norm_squared();
                let actual_rel = (sse - sse_trial) / sse;
                let predicted_rel = ((sse - predicted) / sse).abs();
                let small_reduction = actual_rel <= opts.ftol && predicted_rel <= opts.ftol;

                params = trial;
                r = r_trial;
                sse = sse_trial;
                lambda = (lambda / 10.0).max(MIN_DAMPING);

                let termination = match (small_reduction, small_step) {
                    (true, true) => Some(Termination::BothTolerances),
                    (true, false) => Some(Termination::ResidualTolerance),
                    (false, true) => Some(Termination::StepTolerance),
                    (false, false) if sse == 0.0 => Some(Termination::GradientTolerance),
                    (false, false) => None,
                };
                if let Some(termination) = termination {
                    return report(params, termination, evaluations, iterations, sse);
                }
                break;
            }

            if small_step {
                return report(params, Termination::StepTolerance, evaluations, iterations, sse);
            }
            if evaluations >= opts.max_evaluations {
                return report(params, Termination::MaxEvaluations, evaluations, iterations, sse);
            }
            lambda *= 10.0;
            if lambda > MAX_DAMPING {
                return report(params, Termination::NoProgress, evaluations, iterations, sse);
            }
        }
    }
}

fn damped_step(jac: &DMatrix<f64>, r: &DVector<f64>, diag: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let m = jac.nrows();
    let n = jac.ncols();
    let sqrt_lambda = lambda.sqrt();

    let mut a = DMatrix::<f64>::zeros(m + n, n);
    a.rows_mut(0, m).copy_from(jac);
    for j in 0..n {
        a[(m + j, j)] = sqrt_lambda * diag[j];
    }

    let mut b = DVector::<f64>::zeros(m + n);
    for i in 0..m {
        b[i] = -r[i];
    }

    solve_least_squares(&a, &b)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rosenbrock written as residuals: r1 = 10 (y - x^2), r2 = 1 - x.
    struct Rosenbrock;

    impl LeastSquaresProblem for Rosenbrock {
        fn residuals(&self, p: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]])
        }

        fn jacobian(&self, p: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_row_slice(2, 2, &[-20.0 * p[0], 10.0, -1.0, 0.0])
        }
    }

    /// Straight line `y = a + b x` (linear: LM should finish in a few steps).
    struct Line {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for Line {
        fn residuals(&self, p: &DVector<f64>) -> DVector<f64> {
            DVector::from_iterator(
                self.x.len(),
                self.x.iter().zip(&self.y).map(|(&x, &y)| p[0] + p[1] * x - y),
            )
        }

        fn jacobian(&self, _p: &DVector<f64>) -> DMatrix<f64> {
            let mut j = DMatrix::zeros(self.x.len(), 2);
            for (i, &x) in self.x.iter().enumerate() {
                j[(i, 0)] = 1.0;
                j[(i, 1)] = x;
            }
            j
        }
    }

    #[test]
    fn solves_rosenbrock() {
        let report = levenberg_marquardt(
            &Rosenbrock,
            DVector::from_vec(vec![-1.2, 1.0]),
            &SolverOptions::default(),
        );
        assert!(report.termination.is_success(), "{:?}", report.termination);
        assert!((report.params[0] - 1.0).abs() < 1e-6);
        assert!((report.params[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn linear_problem_with_noise_converges() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &x)| 2.0 + 0.5 * x + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        let report = levenberg_marquardt(&Line { x, y }, DVector::from_vec(vec![0.0, 0.0]), &SolverOptions::default());
        assert!(report.termination.is_success());
        assert!((report.params[1] - 0.5).abs() < 0.05);
        assert!(report.sse > 0.0);
    }

    #[test]
    fn exact_start_returns_immediately() {
        let line = Line {
            x: vec![0.0, 1.0, 2.0],
            y: vec![1.0, 2.0, 3.0],
        };
        let report = levenberg_marquardt(&line, DVector::from_vec(vec![1.0, 1.0]), &SolverOptions::default());
        assert_eq!(report.termination, Termination::GradientTolerance);
        assert_eq!(report.evaluations, 1);
    }

    #[test]
    fn evaluation_budget_is_respected() {
        let opts = SolverOptions {
            max_evaluations: 3,
            ..SolverOptions::default()
        };
        let report = levenberg_marquardt(&Rosenbrock, DVector::from_vec(vec![-1.2, 1.0]), &opts);
        assert_eq!(report.termination, Termination::MaxEvaluations);
        assert!(report.evaluations <= 3);
    }

    #[test]
    fn non_finite_start_is_reported() {
        let line = Line {
            x: vec![0.0, 1.0],
            y: vec![f64::NAN, 1.0],
        };
        let report = levenberg_marquardt(&line, DVector::from_vec(vec![0.0, 0.0]), &SolverOptions::default());
        assert_eq!(report.termination, Termination::NonFinite);
    }
}
