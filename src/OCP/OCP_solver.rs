//! # NLP backend adapter
//!
//! ## Module Purpose
//! The transcription hands the flattened problem `(x, f, g)` plus numeric seed and bound
//! vectors to a backend selected by name. Backends are opaque to the rest of the crate;
//! the only contract is `(x_opt, stats)` back, with `stats.success` carrying the verdict.
//!
//! ## Reference backend
//! The built-in `"lm"` backend is a damped Gauss-Newton / Levenberg-Marquardt penalty
//! method:
//! 1. split `g` into equality rows (`lbg == ubg`) and inequality rows activated at a
//!    violated bound,
//! 2. differentiate each active row symbolically, but only with respect to the variables
//!    that actually appear in it, in parallel,
//! 3. take damped steps on the merit `f + 0.5 rho ||r||^2`, clamping every iterate into
//!    the box `[lbx, ubx]` and holding `lbx == ubx` variables fixed,
//! 4. escalate the penalty when the step converges while still infeasible.
//!
//! It is meant for feasibility-dominated problems of moderate size; production-scale
//! backends register through the same `NlpProblem` surface.
use crate::OCP::OCP_errors::TranscriptionError;
use crate::OCP::OCP_iterate::SolverStats;
use crate::symbolic::symbolic_engine::Expr;

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::collections::HashMap;
use tabled::{builder::Builder, settings::Style};

/// The flattened NLP the transcription produces.
pub struct NlpProblem {
    pub x_names: Vec<String>,
    pub f: Expr,
    pub g: Vec<Expr>,
    pub x0: DVector<f64>,
    pub lbx: DVector<f64>,
    pub ubx: DVector<f64>,
    pub lbg: DVector<f64>,
    pub ubg: DVector<f64>,
}

type Compiled = Box<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// compile a batch of expressions against one shared name->index map
pub fn compile_expressions(exprs: &[Expr], names: &[String]) -> Vec<Compiled> {
    let index_map: HashMap<String, usize> = names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.clone(), i))
        .collect();
    exprs
        .iter()
        .map(|e| e.lambdify_with_index_map(&index_map))
        .collect()
}

/// Backend dispatch by configured name.
pub fn solve_nlp(
    name: &str,
    nlp: &NlpProblem,
    plugin_options: &HashMap<String, String>,
    solver_options: &HashMap<String, String>,
) -> Result<(DVector<f64>, SolverStats), TranscriptionError> {
    for (k, v) in plugin_options {
        debug!("plugin option {} = {} (forwarded)", k, v);
    }
    match name {
        "lm" => {
            let opts = LmOptions::from_map(solver_options)?;
            Ok(lm_solve(nlp, &opts))
        }
        other => Err(TranscriptionError::Configuration(format!(
            "unknown optimSolver '{}'; the built-in backend is 'lm'",
            other
        ))),
    }
}

/// Options of the reference backend.
#[derive(Debug, Clone)]
pub struct LmOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub feasibility_tolerance: f64,
    pub penalty: f64,
    pub max_penalty: f64,
    pub max_damp_iter: usize,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-10,
            feasibility_tolerance: 1e-9,
            penalty: 1e4,
            max_penalty: 1e10,
            max_damp_iter: 10,
        }
    }
}

impl LmOptions {
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, TranscriptionError> {
        let mut opts = LmOptions::default();
        for (key, value) in map {
            let parse_f64 = || {
                value.parse::<f64>().map_err(|_| {
                    TranscriptionError::Configuration(format!(
                        "solver option '{}' expects a number, got '{}'",
                        key, value
                    ))
                })
            };
            let parse_usize = || {
                value.parse::<usize>().map_err(|_| {
                    TranscriptionError::Configuration(format!(
                        "solver option '{}' expects an integer, got '{}'",
                        key, value
                    ))
                })
            };
            match key.as_str() {
                "max_iterations" => opts.max_iterations = parse_usize()?,
                "tolerance" => opts.tolerance = parse_f64()?,
                "feasibility_tolerance" => opts.feasibility_tolerance = parse_f64()?,
                "penalty" => opts.penalty = parse_f64()?,
                "max_penalty" => opts.max_penalty = parse_f64()?,
                "max_damp_iter" => opts.max_damp_iter = parse_usize()?,
                other => {
                    return Err(TranscriptionError::Configuration(format!(
                        "unknown solver option '{}'",
                        other
                    )));
                }
            }
        }
        Ok(opts)
    }
}

/// one constraint row prepared for the backend
struct ConstraintRow {
    value: Compiled,
    /// (flat column, partial derivative) for every variable the row depends on
    partials: Vec<(usize, Compiled)>,
    lower: f64,
    upper: f64,
}

impl ConstraintRow {
    /// residual of the row at `x`: distance to the target for an equality row, distance
    /// to the violated bound for an inequality row, `None` when satisfied strictly inside
    fn residual(&self, x: &[f64]) -> Option<f64> {
        let v = (self.value)(x);
        if self.lower == self.upper {
            Some(v - self.lower)
        } else if v < self.lower {
            Some(v - self.lower)
        } else if v > self.upper {
            Some(v - self.upper)
        } else {
            None
        }
    }
}

fn prepare_rows(nlp: &NlpProblem) -> Vec<ConstraintRow> {
    let index_map: HashMap<String, usize> = nlp
        .x_names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.clone(), i))
        .collect();
    // only differentiate with respect to the variables present in each row
    nlp.g
        .par_iter()
        .enumerate()
        .map(|(j, expr)| {
            let deps = expr.extract_variables();
            let mut partials: Vec<(usize, Compiled)> = Vec::with_capacity(deps.len());
            for name in deps {
                let col = *index_map
                    .get(&name)
                    .unwrap_or_else(|| panic!("constraint references unknown variable {}", name));
                let partial = expr.diff(&name).simplify_();
                if !partial.is_zero() {
                    partials.push((col, partial.lambdify_with_index_map(&index_map)));
                }
            }
            partials.sort_by_key(|(col, _)| *col);
            ConstraintRow {
                value: expr.lambdify_with_index_map(&index_map),
                partials,
                lower: nlp.lbg[j],
                upper: nlp.ubg[j],
            }
        })
        .collect()
}

fn lm_solve(nlp: &NlpProblem, opts: &LmOptions) -> (DVector<f64>, SolverStats) {
    let n = nlp.x_names.len();

    // clamp the seed into the box; equal bounds pin the variable for good
    let mut x: Vec<f64> = (0..n)
        .map(|i| nlp.x0[i].clamp(nlp.lbx[i], nlp.ubx[i]))
        .collect();
    let free: Vec<usize> = (0..n).filter(|&i| nlp.lbx[i] < nlp.ubx[i]).collect();
    let mut free_pos = vec![usize::MAX; n];
    for (k, &i) in free.iter().enumerate() {
        free_pos[i] = k;
    }
    let n_free = free.len();

    let index_map: HashMap<String, usize> = nlp
        .x_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect();
    let f_fn = nlp.f.lambdify_with_index_map(&index_map);
    // sparse objective gradient over the free variables
    let grad_entries: Vec<(usize, Compiled)> = {
        let deps = nlp.f.extract_variables();
        let mut entries = Vec::new();
        for name in deps {
            let col = index_map[&name];
            if free_pos[col] == usize::MAX {
                continue;
            }
            let partial = nlp.f.diff(&name).simplify_();
            if !partial.is_zero() {
                entries.push((col, partial.lambdify_with_index_map(&index_map)));
            }
        }
        entries
    };
    let rows = prepare_rows(nlp);

    let violation = |x: &[f64]| -> f64 {
        rows.iter()
            .map(|row| row.residual(x).map_or(0.0, f64::abs))
            .fold(0.0, f64::max)
    };
    let merit = |x: &[f64], rho: f64| -> f64 {
        let r2: f64 = rows
            .iter()
            .map(|row| {
                let r = row.residual(x).unwrap_or(0.0);
                r * r
            })
            .sum();
        f_fn(x) + 0.5 * rho * r2
    };

    let mut rho = opts.penalty;
    let mut mu = 1e-4;
    let mut status = "max_iterations_exceeded".to_string();
    let mut iterations = 0;

    if n_free == 0 {
        // everything pinned by the bounds; nothing to optimize
        status = if violation(&x) <= opts.feasibility_tolerance {
            "solved".to_string()
        } else {
            "infeasible_bounds".to_string()
        };
    }

    'outer: while n_free > 0 && iterations < opts.max_iterations {
        iterations += 1;

        // active residuals and their Jacobian over the free variables
        let mut residuals: Vec<f64> = Vec::new();
        let mut jac_rows: Vec<&ConstraintRow> = Vec::new();
        for row in &rows {
            if let Some(r) = row.residual(&x) {
                residuals.push(r);
                jac_rows.push(row);
            }
        }
        let n_active = residuals.len();
        let r_vec = DVector::from_vec(residuals);
        let mut jac = DMatrix::zeros(n_active, n_free);
        for (i, row) in jac_rows.iter().enumerate() {
            for (col, partial) in &row.partials {
                if free_pos[*col] != usize::MAX {
                    jac[(i, free_pos[*col])] = partial(&x);
                }
            }
        }

        // gradient of the merit over the free variables
        let mut grad = DVector::zeros(n_free);
        for (col, partial) in &grad_entries {
            grad[free_pos[*col]] += partial(&x);
        }
        grad += rho * jac.transpose() * &r_vec;

        let viol = violation(&x);
        if viol <= opts.feasibility_tolerance && grad.amax() <= opts.tolerance {
            status = "solved".to_string();
            break;
        }

        let jtj = rho * jac.transpose() * &jac;

        // damped step: raise mu until the merit decreases
        let merit_old = merit(&x, rho);
        let mut accepted = false;
        for _ in 0..opts.max_damp_iter {
            let mut h = jtj.clone();
            for d in 0..n_free {
                h[(d, d)] += mu;
            }
            let step = match h.cholesky() {
                Some(chol) => chol.solve(&(-&grad)),
                None => {
                    mu *= 4.0;
                    continue;
                }
            };
            let mut x_trial = x.clone();
            // the convergence test looks at the applied movement, after clamping,
            // so an optimum pinned against the box still registers as converged
            let mut step_norm: f64 = 0.0;
            for (k, &i) in free.iter().enumerate() {
                x_trial[i] = (x[i] + step[k]).clamp(nlp.lbx[i], nlp.ubx[i]);
                step_norm = step_norm.max((x_trial[i] - x[i]).abs());
            }
            if merit(&x_trial, rho) <= merit_old + 1e-14 * merit_old.abs().max(1.0) {
                x = x_trial;
                mu = (mu * 0.25).max(1e-12);
                accepted = true;
                if step_norm <= opts.tolerance {
                    let viol_new = violation(&x);
                    if viol_new <= opts.feasibility_tolerance {
                        status = "solved".to_string();
                        break 'outer;
                    }
                    // converged in step size but still infeasible: push the penalty
                    if rho < opts.max_penalty {
                        rho *= 10.0;
                        mu = 1e-4;
                        debug!("penalty escalated to {:e}", rho);
                    } else {
                        status = "stalled".to_string();
                        break 'outer;
                    }
                }
                break;
            }
            mu *= 4.0;
        }
        if !accepted {
            let viol_now = violation(&x);
            if viol_now <= opts.feasibility_tolerance {
                status = "solved".to_string();
            } else if rho < opts.max_penalty {
                rho *= 10.0;
                mu = 1e-4;
                continue;
            } else {
                status = "stalled".to_string();
            }
            break;
        }
    }

    let final_violation = violation(&x);
    let final_objective = f_fn(&x);
    let success = status == "solved" && final_violation <= opts.feasibility_tolerance;
    if !success && status == "max_iterations_exceeded" {
        warn!(
            "backend stopped after {} iterations with violation {:e}",
            iterations, final_violation
        );
    }

    let mut extra = HashMap::new();
    extra.insert("penalty".to_string(), format!("{:e}", rho));
    extra.insert("damping".to_string(), format!("{:e}", mu));
    let stats = SolverStats {
        success,
        status,
        iterations,
        objective: final_objective,
        constraint_violation: final_violation,
        extra,
    };
    print_stats_table(&stats, n, nlp.g.len());

    (DVector::from_vec(x), stats)
}

fn print_stats_table(stats: &SolverStats, nx: usize, ng: usize) {
    let mut builder = Builder::default();
    builder.push_record(vec!["metric".to_string(), "value".to_string()]);
    builder.push_record(vec!["status".to_string(), stats.status.clone()]);
    builder.push_record(vec!["iterations".to_string(), stats.iterations.to_string()]);
    builder.push_record(vec!["variables".to_string(), nx.to_string()]);
    builder.push_record(vec!["constraints".to_string(), ng.to_string()]);
    builder.push_record(vec![
        "objective".to_string(),
        format!("{:.6e}", stats.objective),
    ]);
    builder.push_record(vec![
        "constraint violation".to_string(),
        format!("{:.6e}", stats.constraint_violation),
    ]);
    let table = builder.build().with(Style::modern()).to_string();
    info!("\n{}", table);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unconstrained_fixed_variables() {
        // both variables pinned by equal bounds: the seed is clamped and returned
        let nlp = NlpProblem {
            x_names: names(&["a", "b"]),
            f: Expr::Const(0.0),
            g: vec![],
            x0: DVector::from_vec(vec![5.0, -3.0]),
            lbx: DVector::from_vec(vec![1.0, 2.0]),
            ubx: DVector::from_vec(vec![1.0, 2.0]),
            lbg: DVector::zeros(0),
            ubg: DVector::zeros(0),
        };
        let (x, stats) = lm_solve(&nlp, &LmOptions::default());
        assert!(stats.success);
        assert_eq!(x[0], 1.0);
        assert_eq!(x[1], 2.0);
    }

    #[test]
    fn test_linear_equality_system() {
        // a + b = 3, a - b = 1 -> a = 2, b = 1
        let a = Expr::Var("a".to_string());
        let b = Expr::Var("b".to_string());
        let nlp = NlpProblem {
            x_names: names(&["a", "b"]),
            f: Expr::Const(0.0),
            g: vec![a.clone() + b.clone(), a - b],
            x0: DVector::from_vec(vec![0.0, 0.0]),
            lbx: DVector::from_vec(vec![f64::NEG_INFINITY; 2]),
            ubx: DVector::from_vec(vec![f64::INFINITY; 2]),
            lbg: DVector::from_vec(vec![3.0, 1.0]),
            ubg: DVector::from_vec(vec![3.0, 1.0]),
        };
        let (x, stats) = lm_solve(&nlp, &LmOptions::default());
        assert!(stats.success, "status: {}", stats.status);
        assert!((x[0] - 2.0).abs() < 1e-8);
        assert!((x[1] - 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_quadratic_objective_with_box() {
        // minimize (a - 5)^2 with a <= 2 -> a = 2
        let a = Expr::Var("a".to_string());
        let f = (a.clone() - Expr::Const(5.0)).sq();
        let nlp = NlpProblem {
            x_names: names(&["a"]),
            f,
            g: vec![],
            x0: DVector::from_vec(vec![0.0]),
            lbx: DVector::from_vec(vec![f64::NEG_INFINITY]),
            ubx: DVector::from_vec(vec![2.0]),
            lbg: DVector::zeros(0),
            ubg: DVector::zeros(0),
        };
        let (x, stats) = lm_solve(&nlp, &LmOptions::default());
        assert!(stats.success, "status: {}", stats.status);
        assert!((x[0] - 2.0).abs() < 1e-6, "x = {}", x[0]);
    }

    #[test]
    fn test_infeasible_equalities_fail() {
        // a = 0 and a = 1 cannot both hold
        let a = Expr::Var("a".to_string());
        let nlp = NlpProblem {
            x_names: names(&["a"]),
            f: Expr::Const(0.0),
            g: vec![a.clone(), a],
            x0: DVector::from_vec(vec![0.5]),
            lbx: DVector::from_vec(vec![f64::NEG_INFINITY]),
            ubx: DVector::from_vec(vec![f64::INFINITY]),
            lbg: DVector::from_vec(vec![0.0, 1.0]),
            ubg: DVector::from_vec(vec![0.0, 1.0]),
        };
        let (_, stats) = lm_solve(&nlp, &LmOptions::default());
        assert!(!stats.success);
        assert!(stats.constraint_violation > 0.1);
    }

    #[test]
    fn test_unknown_backend_is_configuration_error() {
        let nlp = NlpProblem {
            x_names: vec![],
            f: Expr::Const(0.0),
            g: vec![],
            x0: DVector::zeros(0),
            lbx: DVector::zeros(0),
            ubx: DVector::zeros(0),
            lbg: DVector::zeros(0),
            ubg: DVector::zeros(0),
        };
        let res = solve_nlp("ipopt", &nlp, &HashMap::new(), &HashMap::new());
        assert!(matches!(
            res,
            Err(TranscriptionError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_solver_option_rejected() {
        let mut map = HashMap::new();
        map.insert("max_iterations".to_string(), "5".to_string());
        assert!(LmOptions::from_map(&map).is_ok());
        map.insert("print_level".to_string(), "3".to_string());
        assert!(LmOptions::from_map(&map).is_err());
    }
}
