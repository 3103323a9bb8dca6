//! # Solver configuration and entry point
//!
//! Consumers build a [`Problem`], fill a [`SolverConfig`], and call
//! [`SolverConfig::solve`] with a guess. Everything else - grid construction, variable
//! layout, dynamics assembly, the backend call, diagnostics - happens behind that one
//! call, once per solve.
use crate::OCP::OCP_errors::TranscriptionError;
use crate::OCP::OCP_iterate::{Iterate, Solution};
use crate::OCP::OCP_problem::Problem;
use crate::OCP::OCP_transcription::Transcription;
use crate::Utils::logger::init_logging;

use std::collections::HashMap;

/// User-facing configuration of one solve.
pub struct SolverConfig {
    /// ordered mesh times on [0, 1]; strictly increasing, first 0, last 1
    pub mesh: Vec<f64>,
    /// "trapezoidal" or "hermite-simpson"
    pub transcription_scheme: String,
    /// "explicit" or "implicit"
    pub dynamics_mode: String,
    /// backend name handed to the adapter; the built-in backend is "lm"
    pub optim_solver: String,
    /// opaque options forwarded to the backend plugin layer
    pub plugin_options: HashMap<String, String>,
    /// opaque options forwarded to the backend itself
    pub solver_options: HashMap<String, String>,
    pub minimize_lagrange_multipliers: bool,
    pub lagrange_multiplier_weight: f64,
    /// gates the mid-interval velocity correction
    pub enforce_constraint_derivatives: bool,
    /// (kind, workers) hint for mapping point-functions over the grid;
    /// kind "serial", "thread" or "openmp" (the latter two share the thread pool)
    pub parallelism: (String, usize),
    /// prefix for the four sparsity pattern files; none written when absent
    pub write_sparsity: Option<String>,
    /// "debug", "info", "warn", "error" or "off"; logging untouched when absent
    pub loglevel: Option<String>,
    /// also write the log into a timestamped file
    pub save_log: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            mesh: (0..=10).map(|i| i as f64 / 10.0).collect(),
            transcription_scheme: "trapezoidal".to_string(),
            dynamics_mode: "explicit".to_string(),
            optim_solver: "lm".to_string(),
            plugin_options: HashMap::new(),
            solver_options: HashMap::new(),
            minimize_lagrange_multipliers: false,
            lagrange_multiplier_weight: 1.0,
            enforce_constraint_derivatives: false,
            parallelism: ("serial".to_string(), 1),
            write_sparsity: None,
            loglevel: None,
            save_log: false,
        }
    }
}

impl SolverConfig {
    /// replace the mesh with `n_points` uniformly spaced mesh times
    pub fn set_mesh_uniform(&mut self, n_points: usize) -> &mut Self {
        assert!(n_points >= 2, "a mesh needs at least two points");
        self.mesh = (0..n_points)
            .map(|i| i as f64 / (n_points - 1) as f64)
            .collect();
        self
    }

    pub fn validate(&self) -> Result<(), TranscriptionError> {
        if self.mesh.len() < 2 {
            return Err(TranscriptionError::Configuration(format!(
                "mesh must contain at least two points, got {}",
                self.mesh.len()
            )));
        }
        if self.mesh[0] != 0.0 || *self.mesh.last().unwrap() != 1.0 {
            return Err(TranscriptionError::Configuration(format!(
                "mesh must start at 0 and end at 1, got [{}, {}]",
                self.mesh[0],
                self.mesh.last().unwrap()
            )));
        }
        for w in self.mesh.windows(2) {
            if w[1] <= w[0] {
                return Err(TranscriptionError::Configuration(format!(
                    "mesh must be strictly increasing, found {} followed by {}",
                    w[0], w[1]
                )));
            }
        }
        match self.dynamics_mode.as_str() {
            "explicit" | "implicit" => {}
            other => {
                return Err(TranscriptionError::Configuration(format!(
                    "dynamicsMode must be 'explicit' or 'implicit', got '{}'",
                    other
                )));
            }
        }
        match self.parallelism.0.as_str() {
            // "openmp" is accepted for compatibility and handled by the thread pool
            "serial" | "thread" | "openmp" => {}
            other => {
                return Err(TranscriptionError::Configuration(format!(
                    "parallelism kind must be 'serial', 'thread' or 'openmp', got '{}'",
                    other
                )));
            }
        }
        if !self.lagrange_multiplier_weight.is_finite() || self.lagrange_multiplier_weight < 0.0 {
            return Err(TranscriptionError::Configuration(format!(
                "lagrangeMultiplierWeight must be a finite non-negative number, got {}",
                self.lagrange_multiplier_weight
            )));
        }
        if let Some(level) = &self.loglevel {
            match level.as_str() {
                "debug" | "info" | "warn" | "error" | "off" | "none" => {}
                other => {
                    return Err(TranscriptionError::Configuration(format!(
                        "loglevel must be debug, info, warn, error or off, got '{}'",
                        other
                    )));
                }
            }
        }
        Ok(())
    }

    /// Transcribe the problem, run the backend, expand the answer. Build-phase errors
    /// return `Err`; a failed optimization returns `Ok` with
    /// `solution.stats.success == false` and a printed diagnostic report.
    pub fn solve(
        &self,
        problem: &Problem,
        guess: &Iterate,
    ) -> Result<Solution, TranscriptionError> {
        self.validate()?;
        init_logging(&self.loglevel, self.save_log);
        let mut transcription = Transcription::new(problem, self)?;
        transcription.solve(guess)
    }

    /// convenience: solve seeded with the all-midpoint guess
    pub fn solve_from_bounds_midpoint(
        &self,
        problem: &Problem,
    ) -> Result<Solution, TranscriptionError> {
        self.validate()?;
        init_logging(&self.loglevel, self.save_log);
        let mut transcription = Transcription::new(problem, self)?;
        let guess = transcription.create_initial_guess_from_bounds();
        transcription.solve(&guess)
    }
}
