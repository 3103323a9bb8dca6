//! # Collocation schemes
//!
//! The scheme is the only scheme-specific part of the transcription: it fixes the grid
//! layout (mesh points plus any interior collocation points), the defect stencil tying
//! state derivatives to states across each mesh interval, the quadrature weights for the
//! integral cost, and the mask selecting which grid points carry algebraic (kinematic)
//! constraints. Everything else in the transcription is parameterized by these outputs.
use crate::OCP::OCP_errors::TranscriptionError;
use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_matrix::ExprMatrix;

use nalgebra::DVector;

/// interface every transcription scheme implements
pub trait CollocationScheme: Send + Sync {
    fn name(&self) -> &'static str;

    /// full normalized grid on [0, 1] built from the mesh
    fn grid(&self, mesh: &[f64]) -> DVector<f64>;

    /// number of defect rows per mesh interval
    fn num_defects_per_interval(&self, num_states: usize) -> usize;

    /// quadrature weights over the grid; dot them with the integrand row and scale by
    /// the phase duration to approximate the time integral
    fn quadrature_coefficients(&self, mesh: &[f64]) -> DVector<f64>;

    /// 0/1 mask over the grid: true where kinematic constraints are enforced.
    /// Mesh points are always true; interior collocation points may be false.
    fn kinematic_constraint_mask(&self, mesh: &[f64]) -> Vec<bool>;

    /// defect expressions, one column per mesh interval
    fn calc_defects(
        &self,
        states: &ExprMatrix,
        xdot: &ExprMatrix,
        duration: &Expr,
        mesh: &[f64],
    ) -> ExprMatrix;
}

/// dispatch by configured scheme name
pub fn scheme_for_name(name: &str) -> Result<Box<dyn CollocationScheme>, TranscriptionError> {
    match name {
        "trapezoidal" => Ok(Box::new(Trapezoidal)),
        "hermite-simpson" => Ok(Box::new(HermiteSimpson)),
        other => Err(TranscriptionError::Configuration(format!(
            "unknown transcriptionScheme '{}'; expected 'trapezoidal' or 'hermite-simpson'",
            other
        ))),
    }
}

/// First-order scheme: the grid is the mesh itself, defects come from the trapezoid rule
/// over each interval.
pub struct Trapezoidal;

impl CollocationScheme for Trapezoidal {
    fn name(&self) -> &'static str {
        "trapezoidal"
    }

    fn grid(&self, mesh: &[f64]) -> DVector<f64> {
        DVector::from_vec(mesh.to_vec())
    }

    fn num_defects_per_interval(&self, num_states: usize) -> usize {
        num_states
    }

    fn quadrature_coefficients(&self, mesh: &[f64]) -> DVector<f64> {
        let m = mesh.len();
        let mut q = DVector::zeros(m);
        for i in 0..m - 1 {
            let h = mesh[i + 1] - mesh[i];
            q[i] += 0.5 * h;
            q[i + 1] += 0.5 * h;
        }
        q
    }

    fn kinematic_constraint_mask(&self, mesh: &[f64]) -> Vec<bool> {
        vec![true; mesh.len()]
    }

    fn calc_defects(
        &self,
        states: &ExprMatrix,
        xdot: &ExprMatrix,
        duration: &Expr,
        mesh: &[f64],
    ) -> ExprMatrix {
        let ns = states.nrows();
        let intervals = mesh.len() - 1;
        ExprMatrix::from_fn(ns, intervals, |r, i| {
            let h = mesh[i + 1] - mesh[i];
            let step = duration.clone() * Expr::Const(0.5 * h);
            (states.get(r, i + 1).clone()
                - states.get(r, i).clone()
                - step * (xdot.get(r, i).clone() + xdot.get(r, i + 1).clone()))
            .simplify_()
        })
    }
}

/// Third-order scheme: one collocation point in the middle of every mesh interval
/// (G = 2M - 1). Defects stack the Hermite interpolation rows above the Simpson
/// integration rows, so there are 2 NS defect rows per interval. Kinematic constraints
/// are not enforced on the interval midpoints.
pub struct HermiteSimpson;

impl CollocationScheme for HermiteSimpson {
    fn name(&self) -> &'static str {
        "hermite-simpson"
    }

    fn grid(&self, mesh: &[f64]) -> DVector<f64> {
        let m = mesh.len();
        let mut grid = DVector::zeros(2 * m - 1);
        for i in 0..m - 1 {
            grid[2 * i] = mesh[i];
            grid[2 * i + 1] = 0.5 * (mesh[i] + mesh[i + 1]);
        }
        grid[2 * m - 2] = mesh[m - 1];
        grid
    }

    fn num_defects_per_interval(&self, num_states: usize) -> usize {
        2 * num_states
    }

    fn quadrature_coefficients(&self, mesh: &[f64]) -> DVector<f64> {
        let m = mesh.len();
        let mut q = DVector::zeros(2 * m - 1);
        for i in 0..m - 1 {
            let h = mesh[i + 1] - mesh[i];
            q[2 * i] += h / 6.0;
            q[2 * i + 1] += 2.0 * h / 3.0;
            q[2 * i + 2] += h / 6.0;
        }
        q
    }

    fn kinematic_constraint_mask(&self, mesh: &[f64]) -> Vec<bool> {
        let g = 2 * mesh.len() - 1;
        (0..g).map(|i| i % 2 == 0).collect()
    }

    fn calc_defects(
        &self,
        states: &ExprMatrix,
        xdot: &ExprMatrix,
        duration: &Expr,
        mesh: &[f64],
    ) -> ExprMatrix {
        let ns = states.nrows();
        let intervals = mesh.len() - 1;
        ExprMatrix::from_fn(2 * ns, intervals, |row, i| {
            let h = mesh[i + 1] - mesh[i];
            let (left, mid, right) = (2 * i, 2 * i + 1, 2 * i + 2);
            if row < ns {
                // Hermite interpolation: the midpoint state matches the cubic interpolant
                let r = row;
                let step = duration.clone() * Expr::Const(h / 8.0);
                (states.get(r, mid).clone()
                    - Expr::Const(0.5)
                        * (states.get(r, left).clone() + states.get(r, right).clone())
                    - step * (xdot.get(r, left).clone() - xdot.get(r, right).clone()))
                .simplify_()
            } else {
                // Simpson integration across the interval
                let r = row - ns;
                let step = duration.clone() * Expr::Const(h / 6.0);
                (states.get(r, right).clone()
                    - states.get(r, left).clone()
                    - step
                        * (xdot.get(r, left).clone()
                            + Expr::Const(4.0) * xdot.get(r, mid).clone()
                            + xdot.get(r, right).clone()))
                .simplify_()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn uniform_mesh(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
    }

    #[test]
    fn test_trapezoidal_grid_is_mesh() {
        let mesh = uniform_mesh(4);
        let scheme = Trapezoidal;
        let grid = scheme.grid(&mesh);
        assert_eq!(grid.len(), 4);
        assert_eq!(scheme.kinematic_constraint_mask(&mesh), vec![true; 4]);
        assert_eq!(scheme.num_defects_per_interval(3), 3);
    }

    #[test]
    fn test_trapezoidal_quadrature_sums_to_one() {
        let mesh = vec![0.0, 0.1, 0.5, 1.0];
        let q = Trapezoidal.quadrature_coefficients(&mesh);
        assert_relative_eq!(q.sum(), 1.0, epsilon = 1e-14);
        assert_relative_eq!(q[0], 0.05, epsilon = 1e-14);
    }

    #[test]
    fn test_hermite_simpson_grid_and_mask() {
        let mesh = uniform_mesh(5);
        let scheme = HermiteSimpson;
        let grid = scheme.grid(&mesh);
        assert_eq!(grid.len(), 9);
        assert_relative_eq!(grid[1], 0.125, epsilon = 1e-14);
        let mask = scheme.kinematic_constraint_mask(&mesh);
        assert_eq!(mask.len(), 9);
        assert_eq!(mask.iter().filter(|&&b| b).count(), 5);
        assert!(mask[0] && mask[8] && !mask[1]);
        assert_eq!(scheme.num_defects_per_interval(2), 4);
    }

    #[test]
    fn test_hermite_simpson_quadrature_sums_to_one() {
        let mesh = uniform_mesh(5);
        let q = HermiteSimpson.quadrature_coefficients(&mesh);
        assert_eq!(q.len(), 9);
        assert_relative_eq!(q.sum(), 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_trapezoidal_defect_is_exact_for_linear_state() {
        // x(tau) = tau with xdot = 1 and duration 1 makes every defect vanish
        let mesh = uniform_mesh(3);
        let states = ExprMatrix::from_fn(1, 3, |_, c| Expr::Const(mesh[c]));
        let xdot = ExprMatrix::from_fn(1, 3, |_, _| Expr::Const(1.0));
        let defects = Trapezoidal.calc_defects(&states, &xdot, &Expr::Const(1.0), &mesh);
        assert_eq!(defects.shape(), (1, 2));
        for i in 0..2 {
            assert_relative_eq!(
                defects.get(0, i).eval_expression(&[], &[]),
                0.0,
                epsilon = 1e-14
            );
        }
    }

    #[test]
    fn test_hermite_simpson_defect_is_exact_for_quadratic_state() {
        // x(tau) = tau^2, xdot = 2 tau, duration 1: both the interpolation and the
        // Simpson rows vanish because the rule is exact through cubics
        let mesh = uniform_mesh(3);
        let scheme = HermiteSimpson;
        let grid = scheme.grid(&mesh);
        let states = ExprMatrix::from_fn(1, 5, |_, c| Expr::Const(grid[c] * grid[c]));
        let xdot = ExprMatrix::from_fn(1, 5, |_, c| Expr::Const(2.0 * grid[c]));
        let defects = scheme.calc_defects(&states, &xdot, &Expr::Const(1.0), &mesh);
        assert_eq!(defects.shape(), (2, 2));
        for r in 0..2 {
            for i in 0..2 {
                assert_relative_eq!(
                    defects.get(r, i).eval_expression(&[], &[]),
                    0.0,
                    epsilon = 1e-14
                );
            }
        }
    }

    #[test]
    fn test_scheme_dispatch() {
        assert!(scheme_for_name("trapezoidal").is_ok());
        assert!(scheme_for_name("hermite-simpson").is_ok());
        assert!(scheme_for_name("euler").is_err());
    }
}
