#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
pub mod OCP;
pub mod Utils;
pub mod symbolic;

use crate::OCP::OCP_examples::ExampleOCP;
use crate::OCP::OCP_iterate::Solution;
use crate::OCP::OCP_variables::Var;
use crate::Utils::logger::save_solution_to_csv;

fn print_solution(solution: &Solution, names: &[String]) {
    println!(
        "success = {}, status = {}, objective = {:.6e}",
        solution.stats.success, solution.stats.status, solution.stats.objective
    );
    let states = &solution.variables[&Var::states];
    for (r, name) in names.iter().enumerate() {
        print!("{:>6}: ", name);
        for c in 0..states.ncols() {
            print!("{:>9.4} ", states[(r, c)]);
        }
        println!();
    }
}

fn main() {
    let example = 0;
    match example {
        0 => {
            // IDENTITY INTEGRATOR
            // one state driven directly by one control; pure feasibility problem
            let ocp = ExampleOCP::IdentityIntegrator;
            let problem = ocp.setup();
            let mut config = ocp.config();
            config.loglevel = Some("info".to_string());
            let solution = config.solve_from_bounds_midpoint(&problem).unwrap();
            print_solution(&solution, &ocp.state_names());
        }
        1 => {
            // MINIMUM-EFFORT DOUBLE INTEGRATOR
            // rest-to-rest slew of a point mass, minimizing the integral of a^2
            let ocp = ExampleOCP::DoubleIntegrator;
            let problem = ocp.setup();
            let mut config = ocp.config();
            config.loglevel = Some("info".to_string());
            let solution = config.solve_from_bounds_midpoint(&problem).unwrap();
            print_solution(&solution, &ocp.state_names());
            let headers = vec!["q".to_string(), "u".to_string()];
            let _ = save_solution_to_csv(
                &solution,
                &headers,
                "double_integrator.csv",
                &"t".to_string(),
            );
        }
        2 => {
            // SPARSITY DUMP
            // same problem, but write the four pattern files next to the binary
            let ocp = ExampleOCP::DoubleIntegrator;
            let problem = ocp.setup();
            let mut config = ocp.config();
            config.write_sparsity = Some("double_integrator".to_string());
            let solution = config.solve_from_bounds_midpoint(&problem).unwrap();
            print_solution(&solution, &ocp.state_names());
        }
        _ => {
            println!("unknown example number {}", example);
        }
    }
}
