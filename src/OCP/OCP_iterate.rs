//! # Iterates, solutions and guess generation
//!
//! An `Iterate` is one numeric point in variable space: the per-block tables plus the
//! grid times they sit on. Guesses enter the solve as iterates, get resampled onto the
//! transcription's own grid, and the optimizer's answer leaves as a `Solution` (an
//! iterate plus objective and solver verdict).
use crate::OCP::OCP_variables::{Var, VariablesDM};

use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;

/// Solver verdict and bookkeeping attached to a `Solution`. `success` is authoritative:
/// a failed solve is reported here, never raised.
#[derive(Debug, Clone)]
pub struct SolverStats {
    pub success: bool,
    pub status: String,
    pub iterations: usize,
    pub objective: f64,
    pub constraint_violation: f64,
    /// backend-specific extras (timings, inner iteration counts, ...)
    pub extra: HashMap<String, String>,
}

impl SolverStats {
    pub fn failed(status: &str) -> Self {
        Self {
            success: false,
            status: status.to_string(),
            iterations: 0,
            objective: f64::NAN,
            constraint_violation: f64::INFINITY,
            extra: HashMap::new(),
        }
    }
}

/// One numeric point in the decision space, on a given time grid.
#[derive(Debug, Clone)]
pub struct Iterate {
    pub variables: VariablesDM,
    pub times: DVector<f64>,
}

impl Iterate {
    pub fn new(variables: VariablesDM, times: DVector<f64>) -> Self {
        Self { variables, times }
    }

    /// Resample every time-varying block onto `new_times` with row-wise piecewise-linear
    /// interpolation, endpoints held. Blocks whose column count does not match the old
    /// time grid (e.g. interior-only slacks) pass through untouched, as do the scalar
    /// times and the parameters.
    pub fn resample(&self, new_times: &DVector<f64>) -> Iterate {
        let mut variables = VariablesDM::new();
        for (&key, block) in &self.variables {
            let resampled = match key {
                Var::initial_time | Var::final_time | Var::parameters => block.clone(),
                _ if block.ncols() == self.times.len() => {
                    let mut out = DMatrix::zeros(block.nrows(), new_times.len());
                    for r in 0..block.nrows() {
                        let row: Vec<f64> = (0..block.ncols()).map(|c| block[(r, c)]).collect();
                        for (c, &t) in new_times.iter().enumerate() {
                            out[(r, c)] = interp_linear(&self.times, &row, t);
                        }
                    }
                    out
                }
                _ => block.clone(),
            };
            variables.insert(key, resampled);
        }
        Iterate {
            variables,
            times: new_times.clone(),
        }
    }
}

/// Piecewise-linear interpolation of `(times, values)` at `t`; values are held constant
/// outside the sampled range.
pub fn interp_linear(times: &DVector<f64>, values: &[f64], t: f64) -> f64 {
    let n = times.len();
    assert_eq!(n, values.len(), "time and value rows must have equal length");
    assert!(n > 0, "cannot interpolate an empty row");
    if n == 1 || t <= times[0] {
        return values[0];
    }
    if t >= times[n - 1] {
        return values[n - 1];
    }
    let mut i = 0;
    while i + 1 < n && times[i + 1] < t {
        i += 1;
    }
    let (t0, t1) = (times[i], times[i + 1]);
    let w = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
    values[i] + w * (values[i + 1] - values[i])
}

/// The midpoint rule for default guesses: midpoint of two finite bounds, the finite side
/// when only one exists, 0 when neither does.
pub fn bound_midpoint(lower: f64, upper: f64) -> f64 {
    if lower.is_finite() && upper.is_finite() {
        0.5 * (lower + upper)
    } else if lower.is_finite() {
        lower
    } else if upper.is_finite() {
        upper
    } else {
        0.0
    }
}

/// Uniform sample of the bound interval from a raw draw `r` in [-1, 1]; falls back to
/// clamping the draw itself when the interval arithmetic produces NaN.
pub fn bound_random(lower: f64, upper: f64, r: f64) -> f64 {
    let value = 0.5 * (r + 1.0) * (upper - lower) + lower;
    if value.is_nan() {
        r.clamp(lower, upper)
    } else {
        value
    }
}

/// Result of a solve: the expanded variables on the final time grid, the objective, and
/// the backend's verdict.
#[derive(Debug, Clone)]
pub struct Solution {
    pub variables: VariablesDM,
    pub times: DVector<f64>,
    pub objective: f64,
    pub stats: SolverStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_interp_linear_inside_and_outside() {
        let times = DVector::from_vec(vec![0.0, 1.0, 3.0]);
        let values = vec![0.0, 2.0, 2.0];
        assert_relative_eq!(interp_linear(&times, &values, 0.5), 1.0, epsilon = 1e-14);
        assert_relative_eq!(interp_linear(&times, &values, 2.0), 2.0, epsilon = 1e-14);
        // held endpoints
        assert_relative_eq!(interp_linear(&times, &values, -1.0), 0.0, epsilon = 1e-14);
        assert_relative_eq!(interp_linear(&times, &values, 5.0), 2.0, epsilon = 1e-14);
    }

    #[test]
    fn test_resample_linear_row_is_exact() {
        let mut variables = VariablesDM::new();
        variables.insert(Var::initial_time, DMatrix::from_element(1, 1, 0.0));
        variables.insert(Var::final_time, DMatrix::from_element(1, 1, 1.0));
        let old_times = DVector::from_vec(vec![0.0, 0.5, 1.0]);
        variables.insert(
            Var::states,
            DMatrix::from_fn(1, 3, |_, c| 2.0 * old_times[c]),
        );
        variables.insert(Var::controls, DMatrix::zeros(0, 3));
        variables.insert(Var::multipliers, DMatrix::zeros(0, 3));
        variables.insert(Var::derivatives, DMatrix::zeros(0, 3));
        variables.insert(Var::slacks, DMatrix::zeros(0, 0));
        variables.insert(Var::parameters, DMatrix::from_element(1, 1, 7.0));
        let it = Iterate::new(variables, old_times);

        let new_times = DVector::from_vec(vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let resampled = it.resample(&new_times);
        let states = &resampled.variables[&Var::states];
        assert_eq!(states.ncols(), 5);
        for c in 0..5 {
            assert_relative_eq!(states[(0, c)], 2.0 * new_times[c], epsilon = 1e-14);
        }
        // parameters pass through
        assert_relative_eq!(
            resampled.variables[&Var::parameters][(0, 0)],
            7.0,
            epsilon = 1e-14
        );
    }

    #[test]
    fn test_bound_midpoint_rules() {
        assert_eq!(bound_midpoint(-1.0, 3.0), 1.0);
        assert_eq!(bound_midpoint(2.0, f64::INFINITY), 2.0);
        assert_eq!(bound_midpoint(f64::NEG_INFINITY, -4.0), -4.0);
        assert_eq!(bound_midpoint(f64::NEG_INFINITY, f64::INFINITY), 0.0);
    }

    #[test]
    fn test_bound_random_stays_in_interval() {
        for &r in &[-1.0, -0.3, 0.0, 0.7, 1.0] {
            let v = bound_random(-2.0, 4.0, r);
            assert!(v >= -2.0 && v <= 4.0);
        }
        // infinite interval arithmetic yields NaN, the draw itself is used
        let v = bound_random(f64::NEG_INFINITY, f64::INFINITY, 0.25);
        assert_eq!(v, 0.25);
    }
}
