//! # Direct-collocation transcription
//!
//! ## Module Purpose
//! This is the core of the crate: it converts a continuous-time optimal control problem
//! over a multibody system into a large sparse NLP and decodes the optimizer's answer
//! back into a trajectory. The heavy lifting is bookkeeping, done once per solve:
//! 1. lay out the decision variables over the grid and fill their bound tables,
//! 2. assemble the state-derivative trajectory from the explicit or implicit dynamics,
//!    applying the mid-interval velocity correction when kinematic constraint
//!    derivatives are enforced,
//! 3. generate the scheme's defect constraints across every mesh interval,
//! 4. build the quadrature objective,
//! 5. flatten everything, run the backend, expand the result.
//!
//! ## Grid bookkeeping
//! The scheme's kinematic-constraint mask splits the grid indices into the `dae` set
//! (mask 1, all mesh points) and the interior set (mask 0, collocation points between
//! mesh points). Dynamics with algebraic constraints are evaluated on the `dae` set, the
//! constraint-free variant on the interior set, and the two are stitched column-wise
//! into one derivative trajectory.
//!
//! ## Lifecycle
//! Construct once per solve, `solve(guess)`, drop. The symbolic containers are not
//! reentrant; nothing here is shared across threads except through the mapped
//! point-function evaluation, whose handles the problem guarantees to be thread-safe.
use crate::OCP::OCP_api::SolverConfig;
use crate::OCP::OCP_diagnostics::print_constraint_values;
use crate::OCP::OCP_errors::TranscriptionError;
use crate::OCP::OCP_iterate::{bound_midpoint, bound_random, Iterate, Solution};
use crate::OCP::OCP_problem::{PointFunction, Problem, VarInfo};
use crate::OCP::OCP_schemes::{scheme_for_name, CollocationScheme};
use crate::OCP::OCP_solver::{compile_expressions, solve_nlp, NlpProblem};
use crate::OCP::OCP_sparsity::write_sparsity_files;
use crate::OCP::OCP_variables::{
    expand_variables_dm, flatten_variables_dm, flatten_variables_sym, Constraints, Var,
    VariablesDM, VariablesSym, VAR_ORDER,
};
use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_matrix::{map_columns, ExprMatrix};

use log::{error, info};
use nalgebra::{DMatrix, DVector};
use rand::Rng;

/// default symmetric bound on the acceleration-level decision variables in implicit mode
const DERIVATIVE_BOUND: f64 = 1000.0;

pub struct Transcription<'a> {
    problem: &'a Problem,
    config: &'a SolverConfig,
    scheme: Box<dyn CollocationScheme>,

    num_mesh_points: usize,
    num_grid_points: usize,
    num_mesh_intervals: usize,
    num_interior_points: usize,
    num_defects_per_interval: usize,
    num_residuals: usize,
    num_constraints: usize,

    mesh: Vec<f64>,
    grid: DVector<f64>,
    duration: Expr,
    times: ExprMatrix,

    vars: VariablesSym,
    lower_bounds: VariablesDM,
    upper_bounds: VariablesDM,

    params_traj_grid: ExprMatrix,
    params_traj_mesh: ExprMatrix,
    params_traj_interior: ExprMatrix,

    grid_indices: Vec<usize>,
    dae_indices: Vec<usize>,
    interior_indices: Vec<usize>,

    xdot: ExprMatrix,
    constraints: Constraints<ExprMatrix>,
    constraints_lower: Constraints<DMatrix<f64>>,
    constraints_upper: Constraints<DMatrix<f64>>,
    objective: Expr,

    transcribed: bool,
}

impl<'a> Transcription<'a> {
    pub fn new(
        problem: &'a Problem,
        config: &'a SolverConfig,
    ) -> Result<Transcription<'a>, TranscriptionError> {
        config.validate()?;
        let scheme = scheme_for_name(&config.transcription_scheme)?;

        let nq = problem.num_coordinates();
        let nu = problem.num_speeds();
        if nq != nu {
            return Err(TranscriptionError::Configuration(format!(
                "problems with differing numbers of coordinates and speeds are not \
                 supported (e.g., quaternions): NQ = {}, NU = {}",
                nq, nu
            )));
        }
        if problem.state_infos.len() != problem.num_states() {
            return Err(TranscriptionError::Configuration(format!(
                "expected {} state infos (NQ + NU + NZ) but {} were added",
                problem.num_states(),
                problem.state_infos.len()
            )));
        }
        for info in &problem.path_constraint_infos {
            if info.lower.len() != info.size || info.upper.len() != info.size {
                return Err(TranscriptionError::Configuration(format!(
                    "path constraint '{}' declares size {} but carries {} lower and {} \
                     upper bounds",
                    info.name,
                    info.size,
                    info.lower.len(),
                    info.upper.len()
                )));
            }
        }

        let mut transcription = Transcription {
            problem,
            config,
            scheme,
            num_mesh_points: 0,
            num_grid_points: 0,
            num_mesh_intervals: 0,
            num_interior_points: 0,
            num_defects_per_interval: 0,
            num_residuals: 0,
            num_constraints: 0,
            mesh: config.mesh.clone(),
            grid: DVector::zeros(0),
            duration: Expr::Const(0.0),
            times: ExprMatrix::zeros(0, 0),
            vars: VariablesSym::new(),
            lower_bounds: VariablesDM::new(),
            upper_bounds: VariablesDM::new(),
            params_traj_grid: ExprMatrix::zeros(0, 0),
            params_traj_mesh: ExprMatrix::zeros(0, 0),
            params_traj_interior: ExprMatrix::zeros(0, 0),
            grid_indices: Vec::new(),
            dae_indices: Vec::new(),
            interior_indices: Vec::new(),
            xdot: ExprMatrix::zeros(0, 0),
            constraints: Constraints {
                defects: ExprMatrix::zeros(0, 0),
                residuals: ExprMatrix::zeros(0, 0),
                kinematic: ExprMatrix::zeros(0, 0),
                path: Vec::new(),
            },
            constraints_lower: Constraints {
                defects: DMatrix::zeros(0, 0),
                residuals: DMatrix::zeros(0, 0),
                kinematic: DMatrix::zeros(0, 0),
                path: Vec::new(),
            },
            constraints_upper: Constraints {
                defects: DMatrix::zeros(0, 0),
                residuals: DMatrix::zeros(0, 0),
                kinematic: DMatrix::zeros(0, 0),
                path: Vec::new(),
            },
            objective: Expr::Const(0.0),
            transcribed: false,
        };
        transcription.create_variables_and_set_bounds()?;
        Ok(transcription)
    }

    fn is_implicit(&self) -> bool {
        self.config.dynamics_mode == "implicit"
    }

    /// number of acceleration-level decision rows; nonzero only in implicit mode
    fn num_derivative_rows(&self) -> usize {
        if self.is_implicit() {
            self.problem.num_speeds()
        } else {
            0
        }
    }

    fn create_variables_and_set_bounds(&mut self) -> Result<(), TranscriptionError> {
        // Set the grid: mesh points plus any interior collocation points the scheme adds.
        self.num_mesh_points = self.mesh.len();
        self.grid = self.scheme.grid(&self.mesh);
        self.num_grid_points = self.grid.len();
        self.num_mesh_intervals = self.num_mesh_points - 1;
        self.num_interior_points = self.num_grid_points - self.num_mesh_points;
        self.num_defects_per_interval = self
            .scheme
            .num_defects_per_interval(self.problem.num_states());
        self.num_residuals = if self.is_implicit() {
            self.problem.num_speeds()
        } else {
            0
        };
        self.num_constraints = self.num_defects_per_interval * self.num_mesh_intervals
            + self.num_residuals * self.num_grid_points
            + self.problem.num_kinematic_constraint_equations * self.num_mesh_points;
        for info in &self.problem.path_constraint_infos {
            self.num_constraints += info.size * self.num_mesh_points;
        }

        let ns = self.problem.num_states();
        let nc = self.problem.num_controls();
        let nm = self.problem.num_multipliers();
        let nw = self.num_derivative_rows();
        let nl = self.problem.num_slacks();
        let np = self.problem.num_parameters();
        let g = self.num_grid_points;
        let p = self.num_interior_points;

        // Create variables.
        self.vars.insert(
            Var::initial_time,
            ExprMatrix::scalar(Expr::Var("initial_time".to_string())),
        );
        self.vars.insert(
            Var::final_time,
            ExprMatrix::scalar(Expr::Var("final_time".to_string())),
        );
        self.duration =
            Expr::Var("final_time".to_string()) - Expr::Var("initial_time".to_string());
        self.times = self.create_times();
        self.vars.insert(Var::states, ExprMatrix::sym("states", ns, g));
        self.vars
            .insert(Var::controls, ExprMatrix::sym("controls", nc, g));
        self.vars
            .insert(Var::multipliers, ExprMatrix::sym("multipliers", nm, g));
        self.vars
            .insert(Var::derivatives, ExprMatrix::sym("derivatives", nw, g));
        // slack variables live on the mesh-interval interior only
        self.vars.insert(Var::slacks, ExprMatrix::sym("slacks", nl, p));
        self.vars
            .insert(Var::parameters, ExprMatrix::sym("parameters", np, 1));

        let params = self.vars[&Var::parameters].clone();
        self.params_traj_grid = params.repmat_cols(self.num_grid_points);
        self.params_traj_mesh = params.repmat_cols(self.num_mesh_points);
        self.params_traj_interior = params.repmat_cols(self.num_interior_points);

        // Index partition from the scheme's kinematic-constraint mask.
        let mask = self.scheme.kinematic_constraint_mask(&self.mesh);
        if mask.len() != self.num_grid_points {
            return Err(TranscriptionError::Internal(format!(
                "scheme '{}' produced a mask of length {} on a grid of {} points",
                self.scheme.name(),
                mask.len(),
                self.num_grid_points
            )));
        }
        self.grid_indices = (0..self.num_grid_points).collect();
        self.dae_indices = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| if on { Some(i) } else { None })
            .collect();
        self.interior_indices = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| if on { None } else { Some(i) })
            .collect();
        if self.dae_indices.len() != self.num_mesh_points
            || !mask[0]
            || !mask[self.num_grid_points - 1]
        {
            return Err(TranscriptionError::Internal(format!(
                "scheme '{}' must enforce kinematic constraints on exactly the {} mesh \
                 points, including both endpoints",
                self.scheme.name(),
                self.num_mesh_points
            )));
        }

        // Set variable bounds.
        for key in VAR_ORDER {
            let shape = self.vars[&key].shape();
            self.lower_bounds
                .insert(key, DMatrix::from_element(shape.0, shape.1, 0.0));
            self.upper_bounds
                .insert(key, DMatrix::from_element(shape.0, shape.1, 0.0));
        }

        let problem = self.problem;
        self.set_scalar_bounds(Var::initial_time, problem.time_initial_bounds);
        self.set_scalar_bounds(Var::final_time, problem.time_final_bounds);
        self.set_trajectory_bounds(Var::states, &problem.state_infos);
        self.set_trajectory_bounds(Var::controls, &problem.control_infos);
        self.set_trajectory_bounds(Var::multipliers, &problem.multiplier_infos);
        if self.is_implicit() {
            let lower = self.lower_bounds.get_mut(&Var::derivatives).unwrap();
            lower.fill(-DERIVATIVE_BOUND);
            let upper = self.upper_bounds.get_mut(&Var::derivatives).unwrap();
            upper.fill(DERIVATIVE_BOUND);
        }
        for (row, info) in self.problem.slack_infos.iter().enumerate() {
            for c in 0..p {
                self.lower_bounds.get_mut(&Var::slacks).unwrap()[(row, c)] = info.bounds.0;
                self.upper_bounds.get_mut(&Var::slacks).unwrap()[(row, c)] = info.bounds.1;
            }
        }
        for (row, info) in self.problem.parameter_infos.iter().enumerate() {
            self.lower_bounds.get_mut(&Var::parameters).unwrap()[(row, 0)] = info.bounds.0;
            self.upper_bounds.get_mut(&Var::parameters).unwrap()[(row, 0)] = info.bounds.1;
        }

        // Constraint containers and their (mostly zero) bound tables.
        let nd = self.num_defects_per_interval;
        let intervals = self.num_mesh_intervals;
        let nr = self.num_residuals;
        let k = self.problem.num_kinematic_constraint_equations;
        let m = self.num_mesh_points;
        let (kc_lower, kc_upper) = self.problem.kinematic_constraint_bounds;

        self.constraints = Constraints {
            defects: ExprMatrix::zeros(nd, intervals),
            residuals: ExprMatrix::zeros(nr, g),
            kinematic: ExprMatrix::zeros(k, m),
            path: self
                .problem
                .path_constraint_infos
                .iter()
                .map(|info| ExprMatrix::zeros(info.size, m))
                .collect(),
        };
        self.constraints_lower = Constraints {
            defects: DMatrix::zeros(nd, intervals),
            residuals: DMatrix::zeros(nr, g),
            kinematic: DMatrix::from_element(k, m, kc_lower),
            path: self
                .problem
                .path_constraint_infos
                .iter()
                .map(|info| DMatrix::from_fn(info.size, m, |r, _| info.lower[r]))
                .collect(),
        };
        self.constraints_upper = Constraints {
            defects: DMatrix::zeros(nd, intervals),
            residuals: DMatrix::zeros(nr, g),
            kinematic: DMatrix::from_element(k, m, kc_upper),
            path: self
                .problem
                .path_constraint_infos
                .iter()
                .map(|info| DMatrix::from_fn(info.size, m, |r, _| info.upper[r]))
                .collect(),
        };
        Ok(())
    }

    fn set_scalar_bounds(&mut self, key: Var, bounds: (f64, f64)) {
        self.lower_bounds.get_mut(&key).unwrap()[(0, 0)] = bounds.0;
        self.upper_bounds.get_mut(&key).unwrap()[(0, 0)] = bounds.1;
    }

    /// interior columns get the regular bounds, the first and last columns the
    /// initial/final bounds with fallback to the regular ones
    fn set_trajectory_bounds(&mut self, key: Var, infos: &[VarInfo]) {
        let g = self.num_grid_points;
        let lower = self.lower_bounds.get_mut(&key).unwrap();
        let upper = self.upper_bounds.get_mut(&key).unwrap();
        for (row, info) in infos.iter().enumerate() {
            for c in 1..g.saturating_sub(1) {
                lower[(row, c)] = info.bounds.0;
                upper[(row, c)] = info.bounds.1;
            }
            let initial = info.initial_bounds.unwrap_or(info.bounds);
            lower[(row, 0)] = initial.0;
            upper[(row, 0)] = initial.1;
            let final_ = info.final_bounds.unwrap_or(info.bounds);
            lower[(row, g - 1)] = final_.0;
            upper[(row, g - 1)] = final_.1;
        }
    }

    /// symbolic time row t(tau) = t0 + (tf - t0) * tau over the grid
    fn create_times(&self) -> ExprMatrix {
        let t0 = Expr::Var("initial_time".to_string());
        let duration = self.duration.clone();
        ExprMatrix::from_fn(1, self.grid.len(), |_, c| {
            (t0.clone() + duration.clone() * Expr::Const(self.grid[c])).simplify_()
        })
    }

    /// numeric counterpart of [`Self::create_times`]
    pub fn times_numeric(&self, t0: f64, tf: f64) -> DVector<f64> {
        DVector::from_fn(self.grid.len(), |i, _| t0 + (tf - t0) * self.grid[i])
    }

    /// TRAJECTORY EVALUATION

    /// Map a point-function over the selected time indices and assemble the per-grid
    /// symbolic outputs. `time_indices` must be one of the three canonical index sets;
    /// anything else is a programmer bug and is reported as an internal error.
    pub fn eval_on_trajectory(
        &self,
        point_function: &PointFunction,
        inputs: &[Var],
        time_indices: &[usize],
    ) -> Result<Vec<ExprMatrix>, TranscriptionError> {
        let params_traj = if time_indices == self.grid_indices.as_slice() {
            &self.params_traj_grid
        } else if time_indices == self.dae_indices.as_slice() {
            &self.params_traj_mesh
        } else if time_indices == self.interior_indices.as_slice() {
            &self.params_traj_interior
        } else {
            return Err(TranscriptionError::Internal(
                "eval_on_trajectory received an index vector that is not the grid, dae, \
                 or interior set"
                    .to_string(),
            ));
        };
        if time_indices.is_empty() {
            return Err(TranscriptionError::Internal(
                "eval_on_trajectory called with an empty index set".to_string(),
            ));
        }
        let nq = self.problem.num_coordinates();
        let nu = self.problem.num_speeds();
        let n = time_indices.len();

        let build_and_call = |k: usize| -> Result<Vec<ExprMatrix>, TranscriptionError> {
            let ti = time_indices[k];
            let mut call_inputs: Vec<ExprMatrix> = Vec::with_capacity(inputs.len() + 2);
            call_inputs.push(self.times.column(ti));
            for tag in inputs {
                let block = match tag {
                    Var::multibody_states => {
                        self.vars[&Var::states].rows(0, nq + nu).column(ti)
                    }
                    // the slack block is exactly as wide as the index set it is
                    // evaluated on, so it is consumed by position, not by grid index
                    Var::slacks => self.vars[&Var::slacks].column(k),
                    Var::states | Var::controls | Var::multipliers | Var::derivatives => {
                        self.vars[tag].column(ti)
                    }
                    other => {
                        return Err(TranscriptionError::Internal(format!(
                            "{:?} cannot be used as a point-function input tag",
                            other
                        )));
                    }
                };
                call_inputs.push(block);
            }
            call_inputs.push(params_traj.column(k));
            point_function(&call_inputs)
        };

        let (kind, workers) = (
            self.config.parallelism.0.as_str(),
            self.config.parallelism.1,
        );
        let per_index = map_columns(n, (kind, workers), build_and_call)?;

        let n_out = per_index[0].len();
        for (k, outputs) in per_index.iter().enumerate() {
            if outputs.len() != n_out {
                return Err(TranscriptionError::PointFunction(format!(
                    "point-function returned {} outputs at index {} but {} at index 0",
                    outputs.len(),
                    k,
                    n_out
                )));
            }
        }
        let mut assembled = Vec::with_capacity(n_out);
        for o in 0..n_out {
            let cols: Vec<ExprMatrix> = per_index.iter().map(|out| out[o].clone()).collect();
            assembled.push(ExprMatrix::hcat(&cols));
        }
        Ok(assembled)
    }

    /// TRANSCRIPTION

    pub fn transcribe(&mut self) -> Result<(), TranscriptionError> {
        if self.transcribed {
            return Ok(());
        }
        self.set_objective()?;

        let nq = self.problem.num_coordinates();
        let nu = self.problem.num_speeds();
        let ns = self.problem.num_states();
        let g = self.num_grid_points;
        let dae = self.dae_indices.clone();
        let interior = self.interior_indices.clone();

        self.xdot = ExprMatrix::zeros(ns, g);

        // qdot: coordinate derivatives are the speed rows of the state trajectory
        let u = self.vars[&Var::states].rows(nq, nu);
        self.xdot.set_rows(0, &u);

        // Velocity correction on the interior points. Higher-index algebraic
        // constraints need the coordinate derivatives nudged back onto the constrained
        // velocity manifold at the points where the constraints themselves are not
        // enforced.
        if self.config.enforce_constraint_derivatives && self.num_interior_points > 0 {
            let out = self.eval_on_trajectory(
                self.problem.velocity_correction(),
                &[Var::multibody_states, Var::slacks],
                &interior,
            )?;
            let u_corr = expect_output(&out, 0, (nq, interior.len()), "velocity correction")?;
            self.xdot.add_to_rows_columns(0, &interior, u_corr);
        }

        // udot, zdot, residual, kcerr
        let inputs = [
            Var::states,
            Var::controls,
            Var::multipliers,
            Var::derivatives,
        ];
        if self.is_implicit() {
            // accelerations are decision variables; the model returns their residual
            let w = self.vars[&Var::derivatives].clone();
            self.xdot.set_rows(nq, &w);

            let out = self.eval_on_trajectory(
                self.problem.implicit_multibody_system(),
                &inputs,
                &dae,
            )?;
            let nr = self.num_residuals;
            let k = self.problem.num_kinematic_constraint_equations;
            let m = self.num_mesh_points;
            let residual = expect_output(&out, 0, (nr, m), "implicit dynamics residual")?;
            self.constraints.residuals.set_rows_columns(0, &dae, residual);
            let zdot = expect_output(&out, 1, (ns - nq - nu, m), "auxiliary derivatives")?;
            self.xdot.set_rows_columns(nq + nu, &dae, zdot);
            self.constraints.kinematic =
                expect_output(&out, 2, (k, m), "kinematic constraint errors")?.clone();

            if self.num_interior_points > 0 {
                let out = self.eval_on_trajectory(
                    self.problem.implicit_multibody_system_ignoring_constraints(),
                    &inputs,
                    &interior,
                )?;
                let p = interior.len();
                let residual =
                    expect_output(&out, 0, (nr, p), "implicit dynamics residual")?;
                self.constraints
                    .residuals
                    .set_rows_columns(0, &interior, residual);
                let zdot =
                    expect_output(&out, 1, (ns - nq - nu, p), "auxiliary derivatives")?;
                self.xdot.set_rows_columns(nq + nu, &interior, zdot);
            }
        } else {
            // explicit dynamics: the model returns the speed and auxiliary derivatives
            let out =
                self.eval_on_trajectory(self.problem.multibody_system(), &inputs, &dae)?;
            let k = self.problem.num_kinematic_constraint_equations;
            let m = self.num_mesh_points;
            let udot = expect_output(&out, 0, (nu, m), "speed derivatives")?;
            self.xdot.set_rows_columns(nq, &dae, udot);
            let zdot = expect_output(&out, 1, (ns - nq - nu, m), "auxiliary derivatives")?;
            self.xdot.set_rows_columns(nq + nu, &dae, zdot);
            self.constraints.kinematic =
                expect_output(&out, 2, (k, m), "kinematic constraint errors")?.clone();

            if self.num_interior_points > 0 {
                let out = self.eval_on_trajectory(
                    self.problem.multibody_system_ignoring_constraints(),
                    &inputs,
                    &interior,
                )?;
                let p = interior.len();
                let udot = expect_output(&out, 0, (nu, p), "speed derivatives")?;
                self.xdot.set_rows_columns(nq, &interior, udot);
                let zdot =
                    expect_output(&out, 1, (ns - nq - nu, p), "auxiliary derivatives")?;
                self.xdot.set_rows_columns(nq + nu, &interior, zdot);
            }
        }

        // Defects.
        let defects = self.scheme.calc_defects(
            &self.vars[&Var::states],
            &self.xdot,
            &self.duration,
            &self.mesh,
        );
        if defects.shape() != (self.num_defects_per_interval, self.num_mesh_intervals) {
            return Err(TranscriptionError::Internal(format!(
                "scheme '{}' produced defects of shape {:?}, expected {:?}",
                self.scheme.name(),
                defects.shape(),
                (self.num_defects_per_interval, self.num_mesh_intervals)
            )));
        }
        self.constraints.defects = defects;

        // Path constraints are enforced on the mesh points.
        for ipc in 0..self.problem.path_constraint_infos.len() {
            let info = &self.problem.path_constraint_infos[ipc];
            let out = self.eval_on_trajectory(&info.function, &inputs, &dae)?;
            let block = expect_output(
                &out,
                0,
                (info.size, self.num_mesh_points),
                &format!("path constraint '{}'", info.name),
            )?;
            self.constraints.path[ipc] = block.clone();
        }

        self.transcribed = true;
        Ok(())
    }

    /// OBJECTIVE

    fn set_objective(&mut self) -> Result<(), TranscriptionError> {
        // The integrand is included symbolically; numeric evaluation happens only
        // inside the backend.
        let out = self.eval_on_trajectory(
            self.problem.integral_cost_integrand(),
            &[
                Var::states,
                Var::controls,
                Var::multipliers,
                Var::derivatives,
            ],
            &self.grid_indices.clone(),
        )?;
        let mut integrand =
            expect_output(&out, 0, (1, self.num_grid_points), "cost integrand")?.clone();

        if self.config.minimize_lagrange_multipliers && self.problem.num_multipliers() > 0 {
            let weight = Expr::Const(self.config.lagrange_multiplier_weight);
            let reg = self.vars[&Var::multipliers].sq().sum_rows().scale(&weight);
            integrand = integrand + reg;
        }

        let quad = self.scheme.quadrature_coefficients(&self.mesh);
        if quad.len() != self.num_grid_points {
            return Err(TranscriptionError::Internal(format!(
                "scheme '{}' produced {} quadrature coefficients on a grid of {} points",
                self.scheme.name(),
                quad.len(),
                self.num_grid_points
            )));
        }
        let integral_cost =
            (self.duration.clone() * integrand.weighted_sum_row(&quad)).simplify_();

        let last = self.num_grid_points - 1;
        let endpoint_inputs = vec![
            self.vars[&Var::final_time].clone(),
            self.vars[&Var::states].column(last),
            self.vars[&Var::controls].column(last),
            self.vars[&Var::multipliers].column(last),
            self.vars[&Var::derivatives].column(last),
            self.vars[&Var::parameters].clone(),
        ];
        let endpoint_out = (self.problem.endpoint_cost())(&endpoint_inputs)?;
        let endpoint_cost = expect_output(&endpoint_out, 0, (1, 1), "endpoint cost")?;

        self.objective = (integral_cost + endpoint_cost.get(0, 0).clone()).simplify_();
        Ok(())
    }

    /// GUESS HANDLING

    /// fill blocks the guess does not carry with bound midpoints
    fn fill_missing_blocks(&self, guess: &mut Iterate) -> Result<(), TranscriptionError> {
        for key in VAR_ORDER {
            if !guess.variables.contains_key(&key) {
                let lower = &self.lower_bounds[&key];
                let upper = &self.upper_bounds[&key];
                let block = DMatrix::from_fn(lower.nrows(), lower.ncols(), |r, c| {
                    bound_midpoint(lower[(r, c)], upper[(r, c)])
                });
                guess.variables.insert(key, block);
            }
        }
        for key in VAR_ORDER {
            if key == Var::slacks {
                continue;
            }
            let expected = self.lower_bounds[&key].shape();
            let actual = guess.variables[&key].shape();
            if expected != actual {
                // an empty block carries no data; its column count is irrelevant
                if expected.0 == 0 && actual.0 == 0 {
                    guess
                        .variables
                        .insert(key, DMatrix::zeros(expected.0, expected.1));
                    continue;
                }
                return Err(TranscriptionError::Configuration(format!(
                    "guess block {:?} has shape {:?}, expected {:?}",
                    key, actual, expected
                )));
            }
        }
        Ok(())
    }

    /// Reshape the slack rows of a guess so they align with the interior index set:
    /// a grid-wide table loses its mesh-point columns, an interior-wide table passes
    /// through, anything else is rejected.
    pub fn normalize_slack_guess(&self, guess: &mut Iterate) -> Result<(), TranscriptionError> {
        let p = self.num_interior_points;
        let g = self.num_grid_points;
        let nl = self.problem.num_slacks();
        let slacks = guess
            .variables
            .entry(Var::slacks)
            .or_insert_with(|| DMatrix::zeros(nl, p));
        if slacks.nrows() != nl {
            return Err(TranscriptionError::Configuration(format!(
                "slack guess has {} rows, expected {}",
                slacks.nrows(),
                nl
            )));
        }
        if nl == 0 {
            *slacks = DMatrix::zeros(0, p);
            return Ok(());
        }
        if slacks.ncols() == g {
            let interior = &self.interior_indices;
            let reshaped = DMatrix::from_fn(nl, p, |r, k| slacks[(r, interior[k])]);
            *slacks = reshaped;
        } else if slacks.ncols() != p {
            return Err(TranscriptionError::Configuration(format!(
                "expected slack variables to have {} (interior) or {} (grid) columns, \
                 but they have {}",
                p,
                g,
                slacks.ncols()
            )));
        }
        Ok(())
    }

    /// guess with every cell at the midpoint of its bounds
    pub fn create_initial_guess_from_bounds(&self) -> Iterate {
        let mut variables = VariablesDM::new();
        for key in VAR_ORDER {
            let lower = &self.lower_bounds[&key];
            let upper = &self.upper_bounds[&key];
            variables.insert(
                key,
                DMatrix::from_fn(lower.nrows(), lower.ncols(), |r, c| {
                    bound_midpoint(lower[(r, c)], upper[(r, c)])
                }),
            );
        }
        let t0 = variables[&Var::initial_time][(0, 0)];
        let tf = variables[&Var::final_time][(0, 0)];
        Iterate::new(variables, self.times_numeric(t0, tf))
    }

    /// guess with every cell uniformly sampled on its bound interval
    pub fn create_random_iterate_within_bounds<R: Rng>(&self, rng: &mut R) -> Iterate {
        let mut variables = VariablesDM::new();
        for key in VAR_ORDER {
            let lower = &self.lower_bounds[&key];
            let upper = &self.upper_bounds[&key];
            variables.insert(
                key,
                DMatrix::from_fn(lower.nrows(), lower.ncols(), |r, c| {
                    let draw = rng.random_range(-1.0..=1.0);
                    bound_random(lower[(r, c)], upper[(r, c)], draw)
                }),
            );
        }
        let t0 = variables[&Var::initial_time][(0, 0)];
        let tf = variables[&Var::final_time][(0, 0)];
        Iterate::new(variables, self.times_numeric(t0, tf))
    }

    /// as [`Self::create_random_iterate_within_bounds`] with the thread-local generator
    pub fn create_random_iterate(&self) -> Iterate {
        self.create_random_iterate_within_bounds(&mut rand::rng())
    }

    /// SOLVE

    pub fn solve(&mut self, guess_orig: &Iterate) -> Result<Solution, TranscriptionError> {
        self.transcribe()?;

        // Resample the guess onto this transcription's grid, scaled by the guess's own
        // phase endpoints.
        let t0_guess = guess_orig
            .variables
            .get(&Var::initial_time)
            .map(|m| m[(0, 0)])
            .unwrap_or_else(|| {
                bound_midpoint(
                    self.problem.time_initial_bounds.0,
                    self.problem.time_initial_bounds.1,
                )
            });
        let tf_guess = guess_orig
            .variables
            .get(&Var::final_time)
            .map(|m| m[(0, 0)])
            .unwrap_or_else(|| {
                bound_midpoint(
                    self.problem.time_final_bounds.0,
                    self.problem.time_final_bounds.1,
                )
            });
        let guess_times = self.times_numeric(t0_guess, tf_guess);
        let mut guess = guess_orig.resample(&guess_times);
        guess
            .variables
            .entry(Var::initial_time)
            .or_insert_with(|| DMatrix::from_element(1, 1, t0_guess));
        guess
            .variables
            .entry(Var::final_time)
            .or_insert_with(|| DMatrix::from_element(1, 1, tf_guess));
        self.fill_missing_blocks(&mut guess)?;
        self.normalize_slack_guess(&mut guess)?;

        // Assemble the flat NLP.
        let x_names = variable_names(&self.vars);
        let g_sym = self.constraints.flatten();
        if g_sym.len() != self.num_constraints {
            return Err(TranscriptionError::Internal(format!(
                "flattened {} constraints but the layout promised {}",
                g_sym.len(),
                self.num_constraints
            )));
        }

        if let Some(prefix) = &self.config.write_sparsity {
            write_sparsity_files(prefix, &x_names, &self.objective, &g_sym)?;
        }

        let nlp = NlpProblem {
            x_names: x_names.clone(),
            f: self.objective.clone(),
            g: g_sym.clone(),
            x0: flatten_variables_dm(&guess.variables),
            lbx: flatten_variables_dm(&self.lower_bounds),
            ubx: flatten_variables_dm(&self.upper_bounds),
            lbg: self.constraints_lower.flatten(),
            ubg: self.constraints_upper.flatten(),
        };
        info!(
            "solving transcribed problem: {} variables, {} constraints, scheme {}, {} \
             dynamics",
            x_names.len(),
            g_sym.len(),
            self.scheme.name(),
            self.config.dynamics_mode
        );
        let (x_opt, mut stats) = solve_nlp(
            &self.config.optim_solver,
            &nlp,
            &self.config.plugin_options,
            &self.config.solver_options,
        )?;

        // Expand the result; the solver's own constraint values are never trusted,
        // they are recomputed from the stored expressions.
        let variables = expand_variables_dm(&x_opt, &self.lower_bounds);
        let t0 = variables[&Var::initial_time][(0, 0)];
        let tf = variables[&Var::final_time][(0, 0)];
        let times = self.times_numeric(t0, tf);

        let x_slice: Vec<f64> = x_opt.iter().copied().collect();
        let g_fns = compile_expressions(&g_sym, &x_names);
        let g_val = DVector::from_fn(g_sym.len(), |i, _| g_fns[i](&x_slice));
        let constraint_values = Constraints::expand(&g_val, &self.constraints_lower);
        let f_fn = compile_expressions(std::slice::from_ref(&self.objective), &x_names);
        let objective = f_fn[0](&x_slice);
        stats.objective = objective;

        let solution = Solution {
            variables,
            times,
            objective,
            stats,
        };
        if !solution.stats.success {
            error!(
                "solver '{}' reported {}; printing the constraint report",
                self.config.optim_solver, solution.stats.status
            );
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            self.report_failure(&solution, &constraint_values, &mut lock)?;
        }
        Ok(solution)
    }

    /// Write the active/violated bound and constraint-norm report for a failed solve.
    pub fn report_failure<W: std::io::Write>(
        &self,
        solution: &Solution,
        constraint_values: &Constraints<DMatrix<f64>>,
        stream: &mut W,
    ) -> Result<(), TranscriptionError> {
        let mesh_times =
            DVector::from_fn(self.dae_indices.len(), |i, _| solution.times[self.dae_indices[i]]);
        let interior_times = DVector::from_fn(self.interior_indices.len(), |i, _| {
            solution.times[self.interior_indices[i]]
        });
        print_constraint_values(
            self.problem,
            &solution.variables,
            &solution.times,
            &interior_times,
            &mesh_times,
            constraint_values,
            &self.lower_bounds,
            &self.upper_bounds,
            self.num_constraints,
            stream,
        )?;
        Ok(())
    }

    /// numeric constraint values at an arbitrary flat point, in structured form
    pub fn constraint_values(
        &self,
        x: &DVector<f64>,
    ) -> Result<Constraints<DMatrix<f64>>, TranscriptionError> {
        if !self.transcribed {
            return Err(TranscriptionError::Internal(
                "constraint_values called before transcribe".to_string(),
            ));
        }
        let x_names: Vec<String> = flatten_variables_sym(&self.vars)
            .iter()
            .map(|e| e.to_string())
            .collect();
        let g_sym = self.constraints.flatten();
        let x_slice: Vec<f64> = x.iter().copied().collect();
        let g_fns = compile_expressions(&g_sym, &x_names);
        let g_val = DVector::from_fn(g_sym.len(), |i, _| g_fns[i](&x_slice));
        Ok(Constraints::expand(&g_val, &self.constraints_lower))
    }

    /// ACCESSORS

    pub fn num_grid_points(&self) -> usize {
        self.num_grid_points
    }
    pub fn num_mesh_points(&self) -> usize {
        self.num_mesh_points
    }
    pub fn num_mesh_intervals(&self) -> usize {
        self.num_mesh_intervals
    }
    pub fn num_interior_points(&self) -> usize {
        self.num_interior_points
    }
    pub fn num_constraints(&self) -> usize {
        self.num_constraints
    }
    pub fn grid(&self) -> &DVector<f64> {
        &self.grid
    }
    pub fn grid_indices(&self) -> &[usize] {
        &self.grid_indices
    }
    pub fn dae_indices(&self) -> &[usize] {
        &self.dae_indices
    }
    pub fn interior_indices(&self) -> &[usize] {
        &self.interior_indices
    }
    pub fn variables(&self) -> &VariablesSym {
        &self.vars
    }
    pub fn lower_bounds(&self) -> &VariablesDM {
        &self.lower_bounds
    }
    pub fn upper_bounds(&self) -> &VariablesDM {
        &self.upper_bounds
    }
    pub fn xdot(&self) -> &ExprMatrix {
        &self.xdot
    }
    pub fn constraints(&self) -> &Constraints<ExprMatrix> {
        &self.constraints
    }
    pub fn constraints_lower(&self) -> &Constraints<DMatrix<f64>> {
        &self.constraints_lower
    }
    pub fn constraints_upper(&self) -> &Constraints<DMatrix<f64>> {
        &self.constraints_upper
    }
    pub fn objective(&self) -> &Expr {
        &self.objective
    }
}

/// fetch and shape-check one output of a mapped point-function
fn expect_output<'m>(
    outputs: &'m [ExprMatrix],
    index: usize,
    shape: (usize, usize),
    what: &str,
) -> Result<&'m ExprMatrix, TranscriptionError> {
    let matrix = outputs.get(index).ok_or_else(|| {
        TranscriptionError::PointFunction(format!(
            "{} missing from point-function outputs (wanted output {}, got {})",
            what,
            index,
            outputs.len()
        ))
    })?;
    if matrix.shape() != shape {
        return Err(TranscriptionError::PointFunction(format!(
            "{} has shape {:?}, expected {:?}",
            what,
            matrix.shape(),
            shape
        )));
    }
    Ok(matrix)
}

/// symbol names of the flattened variable vector, in canonical order
pub fn variable_names(vars: &VariablesSym) -> Vec<String> {
    flatten_variables_sym(vars)
        .iter()
        .map(|e| match e {
            Expr::Var(name) => name.clone(),
            other => panic!("flattened variable is not a symbol: {}", other),
        })
        .collect()
}
