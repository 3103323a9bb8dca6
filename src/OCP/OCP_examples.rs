/// a collection of small optimal control problems with known solutions for testing purposes
use crate::OCP::OCP_api::SolverConfig;
use crate::OCP::OCP_problem::{Problem, VarInfo};
use crate::symbolic::symbolic_matrix::ExprMatrix;

use strum_macros::EnumIter;

/*
Identity integrator:
x' = u, x(0) = 0, x(1) = 1, no cost
exact solution (the feasible set is a line through it and the backend's least-squares
step lands on the symmetric member):
x(t) = t, u(t) = 1

Minimum-effort double integrator:
q' = u, u' = a, minimize the integral of a^2
q(0) = 0, q(1) = 1, u(0) = u(1) = 0
exact solution:
q(t) = 3 t^2 - 2 t^3
u(t) = 6 t - 6 t^2
a(t) = 6 - 12 t
*/
#[derive(Debug, PartialEq, Eq, EnumIter)]
pub enum ExampleOCP {
    IdentityIntegrator,
    DoubleIntegrator,
}

impl ExampleOCP {
    pub fn setup(&self) -> Problem {
        match self {
            ExampleOCP::IdentityIntegrator => {
                // one auxiliary state driven directly by the control; no coordinates
                let mut problem = Problem::new(0, 0, 1);
                problem.add_state(VarInfo::with_endpoint_bounds(
                    "x",
                    (-5.0, 5.0),
                    Some((0.0, 0.0)),
                    Some((1.0, 1.0)),
                ));
                problem.add_control(VarInfo::new("u", (-10.0, 10.0)));
                problem.set_time_bounds((0.0, 0.0), (1.0, 1.0));
                problem.set_multibody_system(Box::new(|inputs: &[ExprMatrix]| {
                    let controls = &inputs[2];
                    Ok(vec![
                        ExprMatrix::zeros(0, 1),
                        controls.clone(),
                        ExprMatrix::zeros(0, 1),
                    ])
                }));
                problem.set_multibody_system_ignoring_constraints(Box::new(
                    |inputs: &[ExprMatrix]| {
                        let controls = &inputs[2];
                        Ok(vec![ExprMatrix::zeros(0, 1), controls.clone()])
                    },
                ));
                problem
            }
            ExampleOCP::DoubleIntegrator => {
                let mut problem = Problem::new(1, 1, 0);
                problem.add_state(VarInfo::with_endpoint_bounds(
                    "q",
                    (-5.0, 5.0),
                    Some((0.0, 0.0)),
                    Some((1.0, 1.0)),
                ));
                problem.add_state(VarInfo::with_endpoint_bounds(
                    "u",
                    (-10.0, 10.0),
                    Some((0.0, 0.0)),
                    Some((0.0, 0.0)),
                ));
                problem.add_control(VarInfo::new("a", (-30.0, 30.0)));
                problem.set_time_bounds((0.0, 0.0), (1.0, 1.0));
                problem.set_multibody_system(Box::new(|inputs: &[ExprMatrix]| {
                    let controls = &inputs[2];
                    Ok(vec![
                        controls.clone(),
                        ExprMatrix::zeros(0, 1),
                        ExprMatrix::zeros(0, 1),
                    ])
                }));
                problem.set_multibody_system_ignoring_constraints(Box::new(
                    |inputs: &[ExprMatrix]| {
                        let controls = &inputs[2];
                        Ok(vec![controls.clone(), ExprMatrix::zeros(0, 1)])
                    },
                ));
                problem.set_integral_cost_integrand(Box::new(|inputs: &[ExprMatrix]| {
                    let a = inputs[2].get(0, 0).clone();
                    Ok(vec![ExprMatrix::scalar(a.sq())])
                }));
                problem
            }
        }
    }

    pub fn config(&self) -> SolverConfig {
        let mut config = SolverConfig::default();
        match self {
            ExampleOCP::IdentityIntegrator => {
                config.set_mesh_uniform(11);
            }
            ExampleOCP::DoubleIntegrator => {
                config.set_mesh_uniform(21);
                // the penalty backend trades feasibility against the effort objective,
                // so give it headroom and a matching feasibility target
                config
                    .solver_options
                    .insert("max_iterations".to_string(), "2000".to_string());
                config
                    .solver_options
                    .insert("penalty".to_string(), "1e7".to_string());
                config
                    .solver_options
                    .insert("feasibility_tolerance".to_string(), "1e-5".to_string());
                config
                    .solver_options
                    .insert("tolerance".to_string(), "1e-8".to_string());
            }
        }
        config
    }

    pub fn state_names(&self) -> Vec<String> {
        match self {
            ExampleOCP::IdentityIntegrator => vec!["x".to_string()],
            ExampleOCP::DoubleIntegrator => vec!["q".to_string(), "u".to_string()],
        }
    }

    /// exact state trajectory at time t
    pub fn exact_solution(&self, t: f64) -> Vec<f64> {
        match self {
            ExampleOCP::IdentityIntegrator => vec![t],
            ExampleOCP::DoubleIntegrator => {
                vec![3.0 * t * t - 2.0 * t * t * t, 6.0 * t - 6.0 * t * t]
            }
        }
    }
}
