//! # Problem interface
//!
//! ## Module Purpose
//! Opaque handle describing the continuous-time optimal control problem: counts, per-row
//! bound tables, kinematic and path constraint descriptions, and the point-function
//! handles the transcription maps over the time grid. The multibody physics behind the
//! point-functions is never inspected here - handles are called, their symbolic outputs
//! are stitched into the expression graph, nothing more.
//!
//! ## Point-function contract
//! A point-function receives one-column symbolic matrices `[time, block..., parameters]`
//! (the block list depends on the handle) and returns one-column symbolic outputs. The
//! transcription maps it across a set of time indices; handles must be pure so the mapped
//! evaluation can run on worker threads.
use crate::OCP::OCP_errors::TranscriptionError;
use crate::symbolic::symbolic_matrix::ExprMatrix;

/// A mapped point-function: inputs and outputs are one-column symbolic matrices.
pub type PointFunction =
    Box<dyn Fn(&[ExprMatrix]) -> Result<Vec<ExprMatrix>, TranscriptionError> + Send + Sync>;

/// Bounds and name of one row of a time-varying variable block.
#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: String,
    /// bounds applied on the mesh interior
    pub bounds: (f64, f64),
    /// bounds on the first grid point; falls back to `bounds` when absent
    pub initial_bounds: Option<(f64, f64)>,
    /// bounds on the last grid point; falls back to `bounds` when absent
    pub final_bounds: Option<(f64, f64)>,
}

impl VarInfo {
    pub fn new(name: &str, bounds: (f64, f64)) -> Self {
        Self {
            name: name.to_string(),
            bounds,
            initial_bounds: None,
            final_bounds: None,
        }
    }

    pub fn with_endpoint_bounds(
        name: &str,
        bounds: (f64, f64),
        initial_bounds: Option<(f64, f64)>,
        final_bounds: Option<(f64, f64)>,
    ) -> Self {
        Self {
            name: name.to_string(),
            bounds,
            initial_bounds,
            final_bounds,
        }
    }
}

/// One slack row; slacks live only on the mesh-interior grid points.
#[derive(Debug, Clone)]
pub struct SlackInfo {
    pub name: String,
    pub bounds: (f64, f64),
}

/// One static parameter with its bounds.
#[derive(Debug, Clone)]
pub struct ParameterInfo {
    pub name: String,
    pub bounds: (f64, f64),
}

/// A user path constraint: `size` rows evaluated at every mesh point, each row with its
/// own bounds, backed by a point-function.
pub struct PathConstraintInfo {
    pub name: String,
    pub size: usize,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub function: PointFunction,
}

/// The problem handle consumed by the transcription.
pub struct Problem {
    num_coordinates: usize,
    num_speeds: usize,
    num_auxiliary: usize,

    pub state_infos: Vec<VarInfo>,
    pub control_infos: Vec<VarInfo>,
    pub multiplier_infos: Vec<VarInfo>,
    pub slack_infos: Vec<SlackInfo>,
    pub parameter_infos: Vec<ParameterInfo>,
    pub path_constraint_infos: Vec<PathConstraintInfo>,

    pub time_initial_bounds: (f64, f64),
    pub time_final_bounds: (f64, f64),

    pub num_kinematic_constraint_equations: usize,
    /// one (lower, upper) pair applied to every kinematic constraint row at every mesh point
    pub kinematic_constraint_bounds: (f64, f64),

    multibody_system: PointFunction,
    multibody_system_ignoring_constraints: PointFunction,
    implicit_multibody_system: PointFunction,
    implicit_multibody_system_ignoring_constraints: PointFunction,
    velocity_correction: PointFunction,
    integral_cost_integrand: PointFunction,
    endpoint_cost: PointFunction,
}

fn empty_dynamics(nu: usize, nz: usize, nkc: Option<usize>) -> PointFunction {
    Box::new(move |_inputs| {
        let mut out = vec![ExprMatrix::zeros(nu, 1), ExprMatrix::zeros(nz, 1)];
        if let Some(k) = nkc {
            out.push(ExprMatrix::zeros(k, 1));
        }
        Ok(out)
    })
}

impl Problem {
    /// New problem with the given coordinate/speed/auxiliary split. All point-function
    /// handles start as empty-output stubs sized to the counts, so a freshly built
    /// problem can already be transcribed.
    pub fn new(num_coordinates: usize, num_speeds: usize, num_auxiliary: usize) -> Self {
        use crate::symbolic::symbolic_engine::Expr;
        let nq = num_coordinates;
        let nu = num_speeds;
        let nz = num_auxiliary;
        Self {
            num_coordinates: nq,
            num_speeds: nu,
            num_auxiliary: nz,
            state_infos: Vec::new(),
            control_infos: Vec::new(),
            multiplier_infos: Vec::new(),
            slack_infos: Vec::new(),
            parameter_infos: Vec::new(),
            path_constraint_infos: Vec::new(),
            time_initial_bounds: (f64::NEG_INFINITY, f64::INFINITY),
            time_final_bounds: (f64::NEG_INFINITY, f64::INFINITY),
            num_kinematic_constraint_equations: 0,
            kinematic_constraint_bounds: (0.0, 0.0),
            multibody_system: empty_dynamics(nu, nz, Some(0)),
            multibody_system_ignoring_constraints: empty_dynamics(nu, nz, None),
            implicit_multibody_system: empty_dynamics(nu, nz, Some(0)),
            implicit_multibody_system_ignoring_constraints: empty_dynamics(nu, nz, None),
            velocity_correction: Box::new(move |_inputs| Ok(vec![ExprMatrix::zeros(nq, 1)])),
            integral_cost_integrand: Box::new(|_inputs| {
                Ok(vec![ExprMatrix::scalar(Expr::Const(0.0))])
            }),
            endpoint_cost: Box::new(|_inputs| Ok(vec![ExprMatrix::scalar(Expr::Const(0.0))])),
        }
    }

    /// COUNTS

    pub fn num_coordinates(&self) -> usize {
        self.num_coordinates
    }
    pub fn num_speeds(&self) -> usize {
        self.num_speeds
    }
    pub fn num_auxiliary(&self) -> usize {
        self.num_auxiliary
    }
    pub fn num_states(&self) -> usize {
        self.num_coordinates + self.num_speeds + self.num_auxiliary
    }
    pub fn num_controls(&self) -> usize {
        self.control_infos.len()
    }
    pub fn num_multipliers(&self) -> usize {
        self.multiplier_infos.len()
    }
    pub fn num_slacks(&self) -> usize {
        self.slack_infos.len()
    }
    pub fn num_parameters(&self) -> usize {
        self.parameter_infos.len()
    }

    /// BUILDING

    pub fn add_state(&mut self, info: VarInfo) -> &mut Self {
        self.state_infos.push(info);
        self
    }
    pub fn add_control(&mut self, info: VarInfo) -> &mut Self {
        self.control_infos.push(info);
        self
    }
    pub fn add_multiplier(&mut self, info: VarInfo) -> &mut Self {
        self.multiplier_infos.push(info);
        self
    }
    pub fn add_slack(&mut self, name: &str, bounds: (f64, f64)) -> &mut Self {
        self.slack_infos.push(SlackInfo {
            name: name.to_string(),
            bounds,
        });
        self
    }
    pub fn add_parameter(&mut self, name: &str, bounds: (f64, f64)) -> &mut Self {
        self.parameter_infos.push(ParameterInfo {
            name: name.to_string(),
            bounds,
        });
        self
    }
    pub fn add_path_constraint(&mut self, info: PathConstraintInfo) -> &mut Self {
        self.path_constraint_infos.push(info);
        self
    }
    pub fn set_time_bounds(&mut self, initial: (f64, f64), final_: (f64, f64)) -> &mut Self {
        self.time_initial_bounds = initial;
        self.time_final_bounds = final_;
        self
    }
    pub fn set_kinematic_constraints(&mut self, count: usize, bounds: (f64, f64)) -> &mut Self {
        self.num_kinematic_constraint_equations = count;
        self.kinematic_constraint_bounds = bounds;
        self
    }

    pub fn set_multibody_system(&mut self, f: PointFunction) -> &mut Self {
        self.multibody_system = f;
        self
    }
    pub fn set_multibody_system_ignoring_constraints(&mut self, f: PointFunction) -> &mut Self {
        self.multibody_system_ignoring_constraints = f;
        self
    }
    pub fn set_implicit_multibody_system(&mut self, f: PointFunction) -> &mut Self {
        self.implicit_multibody_system = f;
        self
    }
    pub fn set_implicit_multibody_system_ignoring_constraints(
        &mut self,
        f: PointFunction,
    ) -> &mut Self {
        self.implicit_multibody_system_ignoring_constraints = f;
        self
    }
    pub fn set_velocity_correction(&mut self, f: PointFunction) -> &mut Self {
        self.velocity_correction = f;
        self
    }
    pub fn set_integral_cost_integrand(&mut self, f: PointFunction) -> &mut Self {
        self.integral_cost_integrand = f;
        self
    }
    pub fn set_endpoint_cost(&mut self, f: PointFunction) -> &mut Self {
        self.endpoint_cost = f;
        self
    }

    /// HANDLES (read-only)

    pub fn multibody_system(&self) -> &PointFunction {
        &self.multibody_system
    }
    pub fn multibody_system_ignoring_constraints(&self) -> &PointFunction {
        &self.multibody_system_ignoring_constraints
    }
    pub fn implicit_multibody_system(&self) -> &PointFunction {
        &self.implicit_multibody_system
    }
    pub fn implicit_multibody_system_ignoring_constraints(&self) -> &PointFunction {
        &self.implicit_multibody_system_ignoring_constraints
    }
    pub fn velocity_correction(&self) -> &PointFunction {
        &self.velocity_correction
    }
    pub fn integral_cost_integrand(&self) -> &PointFunction {
        &self.integral_cost_integrand
    }
    pub fn endpoint_cost(&self) -> &PointFunction {
        &self.endpoint_cost
    }

    pub fn state_names(&self) -> Vec<String> {
        self.state_infos.iter().map(|i| i.name.clone()).collect()
    }
    pub fn control_names(&self) -> Vec<String> {
        self.control_infos.iter().map(|i| i.name.clone()).collect()
    }
    pub fn multiplier_names(&self) -> Vec<String> {
        self.multiplier_infos.iter().map(|i| i.name.clone()).collect()
    }
    pub fn slack_names(&self) -> Vec<String> {
        self.slack_infos.iter().map(|i| i.name.clone()).collect()
    }
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameter_infos.iter().map(|i| i.name.clone()).collect()
    }
}
