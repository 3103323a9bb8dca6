pub mod OCP_api;
pub mod OCP_diagnostics;
pub mod OCP_errors;
pub mod OCP_examples;
pub mod OCP_iterate;
pub mod OCP_problem;
pub mod OCP_schemes;
pub mod OCP_solver;
pub mod OCP_sparsity;
pub mod OCP_tests;
pub mod OCP_transcription;
pub mod OCP_variables;
