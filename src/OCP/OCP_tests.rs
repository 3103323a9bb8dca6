#[cfg(test)]
mod tests {
    use crate::OCP::OCP_api::SolverConfig;
    use crate::OCP::OCP_errors::TranscriptionError;
    use crate::OCP::OCP_examples::ExampleOCP;
    use crate::OCP::OCP_problem::{Problem, VarInfo};
    use crate::OCP::OCP_transcription::Transcription;
    use crate::OCP::OCP_variables::{flatten_variables_dm, Var};
    use crate::symbolic::symbolic_engine::Expr;
    use crate::symbolic::symbolic_matrix::ExprMatrix;

    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    /// NQ = NU = 1 rig with one kinematic constraint, one slack row and a velocity
    /// correction that returns the slack itself, so the corrected coordinate
    /// derivative is recognizable symbolically.
    fn constrained_rig() -> Problem {
        let mut problem = Problem::new(1, 1, 0);
        problem.add_state(VarInfo::new("q", (-2.0, 2.0)));
        problem.add_state(VarInfo::new("qdot", (-4.0, 4.0)));
        problem.add_control(VarInfo::new("a", (-10.0, 10.0)));
        problem.add_slack("gamma", (-5.0, 5.0));
        problem.set_time_bounds((0.0, 0.0), (1.0, 1.0));
        problem.set_kinematic_constraints(1, (0.0, 0.0));
        problem.set_multibody_system(Box::new(|inputs: &[ExprMatrix]| {
            let states = &inputs[1];
            let controls = &inputs[2];
            Ok(vec![
                controls.clone(),
                ExprMatrix::zeros(0, 1),
                ExprMatrix::scalar(states.get(0, 0).clone()),
            ])
        }));
        problem.set_multibody_system_ignoring_constraints(Box::new(
            |inputs: &[ExprMatrix]| {
                let controls = &inputs[2];
                Ok(vec![controls.clone(), ExprMatrix::zeros(0, 1)])
            },
        ));
        problem.set_velocity_correction(Box::new(|inputs: &[ExprMatrix]| {
            // inputs: time, multibody states, slacks, parameters
            Ok(vec![inputs[2].clone()])
        }));
        problem
    }

    #[test]
    fn test_zero_free_problem_trapezoidal() {
        // no states, no controls, zero cost: the solve is trivially successful and the
        // time row is just the scaled grid
        let mut problem = Problem::new(0, 0, 0);
        problem.set_time_bounds((0.0, 0.0), (2.0, 2.0));
        let mut config = SolverConfig::default();
        config.mesh = vec![0.0, 0.5, 1.0];

        let mut transcription = Transcription::new(&problem, &config).unwrap();
        assert_eq!(transcription.num_constraints(), 0);
        let guess = transcription.create_initial_guess_from_bounds();
        let solution = transcription.solve(&guess).unwrap();

        assert!(solution.stats.success, "status: {}", solution.stats.status);
        assert_eq!(solution.objective, 0.0);
        assert_eq!(solution.times.len(), 3);
        assert_relative_eq!(solution.times[0], 0.0, epsilon = 1e-14);
        assert_relative_eq!(solution.times[1], 1.0, epsilon = 1e-14);
        assert_relative_eq!(solution.times[2], 2.0, epsilon = 1e-14);
    }

    #[test]
    fn test_identity_integrator_trapezoidal() {
        let ocp = ExampleOCP::IdentityIntegrator;
        let problem = ocp.setup();
        let config = ocp.config();

        let mut transcription = Transcription::new(&problem, &config).unwrap();
        let guess = transcription.create_initial_guess_from_bounds();
        let solution = transcription.solve(&guess).unwrap();
        assert!(solution.stats.success, "status: {}", solution.stats.status);

        // defects closed to solver tolerance
        let x = flatten_variables_dm(&solution.variables);
        let constraints = transcription.constraint_values(&x).unwrap();
        let mut worst: f64 = 0.0;
        for c in 0..constraints.defects.ncols() {
            for r in 0..constraints.defects.nrows() {
                worst = worst.max(constraints.defects[(r, c)].abs());
            }
        }
        assert!(worst <= 1e-8, "worst defect {}", worst);

        // boundary conditions hit and the state monotone between them
        let states = &solution.variables[&Var::states];
        assert_relative_eq!(states[(0, 0)], 0.0, epsilon = 1e-9);
        assert_relative_eq!(states[(0, 10)], 1.0, epsilon = 1e-9);
        for c in 0..10 {
            assert!(
                states[(0, c + 1)] >= states[(0, c)] - 1e-6,
                "state not monotone at column {}",
                c
            );
        }
        // times strictly increasing with exact endpoints
        assert_relative_eq!(solution.times[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(solution.times[10], 1.0, epsilon = 1e-12);
        for c in 0..10 {
            assert!(solution.times[c + 1] > solution.times[c]);
        }
    }

    #[test]
    fn test_hermite_simpson_grid_partition() {
        let problem = constrained_rig();
        let mut config = SolverConfig::default();
        config.transcription_scheme = "hermite-simpson".to_string();
        config.set_mesh_uniform(5);
        config.enforce_constraint_derivatives = true;

        let transcription = Transcription::new(&problem, &config).unwrap();
        assert_eq!(transcription.num_grid_points(), 9);
        assert_eq!(transcription.num_interior_points(), 4);
        assert_eq!(transcription.dae_indices(), &[0, 2, 4, 6, 8]);
        assert_eq!(transcription.interior_indices(), &[1, 3, 5, 7]);

        // the two sets partition the grid
        let mut all: Vec<usize> = transcription
            .dae_indices()
            .iter()
            .chain(transcription.interior_indices())
            .copied()
            .collect();
        all.sort_unstable();
        let expected: Vec<usize> = (0..9).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_hermite_simpson_velocity_correction() {
        let problem = constrained_rig();
        let mut config = SolverConfig::default();
        config.transcription_scheme = "hermite-simpson".to_string();
        config.set_mesh_uniform(5);
        config.enforce_constraint_derivatives = true;

        let mut transcription = Transcription::new(&problem, &config).unwrap();
        transcription.transcribe().unwrap();

        // the qdot row carries u plus the slack-driven correction on the interior
        // points, u alone on the mesh points
        for (k, &c) in transcription.interior_indices().iter().enumerate() {
            let expected = Expr::Var(format!("states_1_{}", c))
                + Expr::Var(format!("slacks_0_{}", k));
            assert_eq!(transcription.xdot().get(0, c), &expected);
        }
        for &c in transcription.dae_indices() {
            assert_eq!(
                transcription.xdot().get(0, c),
                &Expr::Var(format!("states_1_{}", c))
            );
        }
    }

    #[test]
    fn test_slack_guess_reshaped_from_grid_width() {
        let problem = constrained_rig();
        let mut config = SolverConfig::default();
        config.transcription_scheme = "hermite-simpson".to_string();
        config.set_mesh_uniform(5);
        config.enforce_constraint_derivatives = true;

        let transcription = Transcription::new(&problem, &config).unwrap();
        let mut guess = transcription.create_initial_guess_from_bounds();
        // a grid-wide slack table: the mesh-point columns must be dropped
        guess.variables.insert(
            Var::slacks,
            DMatrix::from_fn(1, 9, |_, c| c as f64),
        );
        transcription.normalize_slack_guess(&mut guess).unwrap();
        let slacks = &guess.variables[&Var::slacks];
        assert_eq!(slacks.ncols(), 4);
        assert_eq!(
            (0..4).map(|k| slacks[(0, k)]).collect::<Vec<f64>>(),
            vec![1.0, 3.0, 5.0, 7.0]
        );

        // an interior-wide table passes through
        let mut guess2 = transcription.create_initial_guess_from_bounds();
        guess2
            .variables
            .insert(Var::slacks, DMatrix::from_element(1, 4, 0.5));
        transcription.normalize_slack_guess(&mut guess2).unwrap();
        assert_eq!(guess2.variables[&Var::slacks].ncols(), 4);

        // anything else is a configuration error naming the widths
        let mut guess3 = transcription.create_initial_guess_from_bounds();
        guess3
            .variables
            .insert(Var::slacks, DMatrix::from_element(1, 6, 0.0));
        let err = transcription.normalize_slack_guess(&mut guess3).unwrap_err();
        match err {
            TranscriptionError::Configuration(msg) => {
                assert!(msg.contains("4"), "message was: {}", msg);
                assert!(msg.contains("9"), "message was: {}", msg);
            }
            other => panic!("expected a configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_implicit_mode_residual_wiring() {
        // NQ = NU = 2, implicit dynamics: the residual block spans the grid with zero
        // bounds and the speed-derivative rows of xdot are the derivative variables
        let mut problem = Problem::new(2, 2, 0);
        for name in ["q0", "q1", "u0", "u1"] {
            problem.add_state(VarInfo::new(name, (-1.0, 1.0)));
        }
        problem.set_time_bounds((0.0, 0.0), (1.0, 1.0));
        problem.set_implicit_multibody_system(Box::new(|inputs: &[ExprMatrix]| {
            let derivatives = &inputs[4];
            Ok(vec![
                derivatives.clone(),
                ExprMatrix::zeros(0, 1),
                ExprMatrix::zeros(0, 1),
            ])
        }));
        problem.set_implicit_multibody_system_ignoring_constraints(Box::new(
            |inputs: &[ExprMatrix]| {
                let derivatives = &inputs[4];
                Ok(vec![derivatives.clone(), ExprMatrix::zeros(0, 1)])
            },
        ));

        let mut config = SolverConfig::default();
        config.dynamics_mode = "implicit".to_string();
        config.mesh = vec![0.0, 0.25, 0.5, 1.0];

        let mut transcription = Transcription::new(&problem, &config).unwrap();
        transcription.transcribe().unwrap();

        let g = transcription.num_grid_points();
        assert_eq!(transcription.constraints().residuals.shape(), (2, g));
        let lower = &transcription.constraints_lower().residuals;
        let upper = &transcription.constraints_upper().residuals;
        for c in 0..g {
            for r in 0..2 {
                assert_eq!(lower[(r, c)], 0.0);
                assert_eq!(upper[(r, c)], 0.0);
            }
        }
        // udot rows come straight from the derivative variables
        for c in 0..g {
            assert_eq!(
                transcription.xdot().get(2, c),
                &Expr::Var(format!("derivatives_0_{}", c))
            );
            assert_eq!(
                transcription.xdot().get(3, c),
                &Expr::Var(format!("derivatives_1_{}", c))
            );
        }
        // implicit mode puts the wide default box on the derivative variables
        let dlower = &transcription.lower_bounds()[&Var::derivatives];
        let dupper = &transcription.upper_bounds()[&Var::derivatives];
        assert_eq!(dlower.shape(), (2, g));
        assert!(dlower.iter().all(|&v| v == -1000.0));
        assert!(dupper.iter().all(|&v| v == 1000.0));
    }

    #[test]
    fn test_infeasible_bounds_failure_report() {
        // x must travel from 0 to 1 but the control box caps the slope at 0.1:
        // the solve fails and the report shows the control pinned at its upper bound
        // and the defect rows that refused to close
        let mut problem = Problem::new(0, 0, 1);
        problem.add_state(VarInfo::with_endpoint_bounds(
            "x",
            (-5.0, 5.0),
            Some((0.0, 0.0)),
            Some((1.0, 1.0)),
        ));
        problem.add_control(VarInfo::new("u", (0.0, 0.1)));
        problem.set_time_bounds((0.0, 0.0), (1.0, 1.0));
        problem.set_multibody_system(Box::new(|inputs: &[ExprMatrix]| {
            let controls = &inputs[2];
            Ok(vec![
                ExprMatrix::zeros(0, 1),
                controls.clone(),
                ExprMatrix::zeros(0, 1),
            ])
        }));

        let mut config = SolverConfig::default();
        config.mesh = vec![0.0, 0.5, 1.0];

        let mut transcription = Transcription::new(&problem, &config).unwrap();
        let guess = transcription.create_initial_guess_from_bounds();
        let solution = transcription.solve(&guess).unwrap();
        assert!(!solution.stats.success);
        assert!(solution.stats.constraint_violation > 1e-3);

        let x = flatten_variables_dm(&solution.variables);
        let constraints = transcription.constraint_values(&x).unwrap();
        let mut report = Vec::new();
        transcription
            .report_failure(&solution, &constraints, &mut report)
            .unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("Control bounds"), "report:\n{}", report);
        assert!(
            report.contains("some bounds active"),
            "report:\n{}",
            report
        );
        assert!(report.contains(" U\n"), "report:\n{}", report);
        assert!(
            report.contains("Differential equation defects:"),
            "report:\n{}",
            report
        );
        assert!(report.contains("00:x"), "report:\n{}", report);
    }

    #[test]
    fn test_sparsity_dump_files() {
        let ocp = ExampleOCP::DoubleIntegrator;
        let problem = ocp.setup();
        let mut config = ocp.config();
        config.mesh = vec![0.0, 0.5, 1.0];
        let dir = std::env::temp_dir().join("transcription_sparsity_test");
        std::fs::create_dir_all(&dir).unwrap();
        let prefix = format!("{}/di", dir.display());
        config.write_sparsity = Some(prefix.clone());

        let mut transcription = Transcription::new(&problem, &config).unwrap();
        let guess = transcription.create_initial_guess_from_bounds();
        let _solution = transcription.solve(&guess).unwrap();

        // nx = 2 times + 2 states x 3 + 1 control x 3; ng = 2 defect rows x 2 intervals
        let nx = 11;
        let ng = 4;
        let read_header = |suffix: &str| -> (usize, usize) {
            let content =
                std::fs::read_to_string(format!("{}{}", prefix, suffix)).unwrap();
            let parts: Vec<usize> = content
                .lines()
                .nth(1)
                .unwrap()
                .split_whitespace()
                .map(|t| t.parse().unwrap())
                .collect();
            (parts[0], parts[1])
        };
        assert_eq!(read_header("_objective_gradient_sparsity.mtx"), (nx, 1));
        assert_eq!(read_header("_objective_Hessian_sparsity.mtx"), (nx, nx));
        assert_eq!(read_header("_Lagrangian_Hessian_sparsity.mtx"), (nx, nx));
        assert_eq!(read_header("constraint_Jacobian_sparsity.mtx"), (ng, nx));
    }

    #[test]
    fn test_eval_on_trajectory_rejects_foreign_index_sets() {
        let ocp = ExampleOCP::IdentityIntegrator;
        let problem = ocp.setup();
        let mut config = ocp.config();
        config.mesh = vec![0.0, 0.5, 1.0];
        let transcription = Transcription::new(&problem, &config).unwrap();
        let err = transcription
            .eval_on_trajectory(
                problem.integral_cost_integrand(),
                &[Var::states, Var::controls, Var::multipliers, Var::derivatives],
                &[0, 2],
            )
            .unwrap_err();
        assert!(matches!(err, TranscriptionError::Internal(_)));
    }

    #[test]
    fn test_midpoint_guess_cell_rules_through_transcription() {
        let mut problem = Problem::new(0, 0, 1);
        problem.add_state(VarInfo::new("x", (-4.0, 2.0)));
        problem.add_control(VarInfo::new("u", (1.0, f64::INFINITY)));
        problem.set_time_bounds((0.0, 0.0), (1.0, 1.0));
        let mut config = SolverConfig::default();
        config.mesh = vec![0.0, 0.5, 1.0];
        let transcription = Transcription::new(&problem, &config).unwrap();
        let guess = transcription.create_initial_guess_from_bounds();
        // two finite bounds -> midpoint; one finite bound -> that bound
        assert_eq!(guess.variables[&Var::states][(0, 1)], -1.0);
        assert_eq!(guess.variables[&Var::controls][(0, 1)], 1.0);
        assert_eq!(guess.times.len(), 3);
        assert_relative_eq!(guess.times[1], 0.5, epsilon = 1e-14);
    }

    #[test]
    fn test_random_guess_within_bounds() {
        let ocp = ExampleOCP::DoubleIntegrator;
        let problem = ocp.setup();
        let config = ocp.config();
        let transcription = Transcription::new(&problem, &config).unwrap();
        let iterate = transcription.create_random_iterate();
        let lower = transcription.lower_bounds();
        let upper = transcription.upper_bounds();
        for key in [Var::states, Var::controls] {
            let block = &iterate.variables[&key];
            for c in 0..block.ncols() {
                for r in 0..block.nrows() {
                    assert!(block[(r, c)] >= lower[&key][(r, c)] - 1e-12);
                    assert!(block[(r, c)] <= upper[&key][(r, c)] + 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_double_integrator_tracks_exact_solution() {
        let ocp = ExampleOCP::DoubleIntegrator;
        let problem = ocp.setup();
        let config = ocp.config();
        let mut transcription = Transcription::new(&problem, &config).unwrap();
        let guess = transcription.create_initial_guess_from_bounds();
        let solution = transcription.solve(&guess).unwrap();
        assert!(solution.stats.success, "status: {}", solution.stats.status);
        let states = &solution.variables[&Var::states];
        for (c, &t) in solution.times.iter().enumerate() {
            let exact = ocp.exact_solution(t);
            assert!(
                (states[(0, c)] - exact[0]).abs() < 0.05,
                "q({}) = {} vs exact {}",
                t,
                states[(0, c)],
                exact[0]
            );
        }
    }

    #[test]
    fn test_total_constraint_count_matches_layout() {
        let problem = constrained_rig();
        let mut config = SolverConfig::default();
        config.transcription_scheme = "hermite-simpson".to_string();
        config.set_mesh_uniform(5);
        config.enforce_constraint_derivatives = true;
        let mut transcription = Transcription::new(&problem, &config).unwrap();
        // Nd * I + K * M: 2 states -> 4 defect rows over 4 intervals, 1 kinematic
        // row over 5 mesh points
        assert_eq!(transcription.num_constraints(), 4 * 4 + 1 * 5);
        transcription.transcribe().unwrap();
        assert_eq!(
            transcription.constraints().flatten().len(),
            transcription.num_constraints()
        );
        // defects are pinned to zero on both sides, kinematic rows carry the problem's
        // own bounds
        assert!(transcription
            .constraints_lower()
            .defects
            .iter()
            .chain(transcription.constraints_upper().defects.iter())
            .all(|&v| v == 0.0));
        assert!(transcription
            .constraints_lower()
            .kinematic
            .iter()
            .all(|&v| v == 0.0));
    }
}
