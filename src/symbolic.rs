#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
/// # Symbolic engine
/// a module
/// 1) defines the scalar symbolic expression type Expr
/// 2) differentiates symbolic expressions
/// 3) turns a symbolic expression into a Rust function
///# Example#
/// ```
/// use RustedTrajOpt::symbolic::symbolic_engine::Expr;
/// // create symbolic variables
/// let vars = Expr::Symbols("x, y");
/// let (x, y) = (vars[0].clone(), vars[1].clone());
/// let f = x.clone() * x.clone() + y.clone().exp();
/// // differentiate with respect to x and y
/// let df_dx = f.diff("x");
/// let df_dy = f.diff("y");
/// println!("df_dx = {}, df_dy = {}", df_dx, df_dy);
/// // convert symbolic expression to a Rust function and evaluate the function
/// let fun = f.lambdify(&["x", "y"]);
/// let f_res = fun(&[1.0, 0.0]);
/// assert_eq!(f_res, 2.0);
/// ```
/// ________________________________________________________________________________________________________________________________________________
pub mod symbolic_engine;
#[cfg(test)]
pub mod symbolic_engine_tests;
///________________________________________________________________________________________________________________________________________________
///
/// dense matrix of symbolic expressions with slicing, block assignment, repetition and
/// concatenation, and a (possibly parallel) column-wise map of point-functions
/// Example#
/// ```
/// use RustedTrajOpt::symbolic::symbolic_matrix::ExprMatrix;
/// // a 2 x 3 matrix of named entries states_r_c
/// let states = ExprMatrix::sym("states", 2, 3);
/// // grab the first row (the coordinate row) at columns 0 and 2
/// let q = states.rows(0, 1).columns(&[0, 2]);
/// assert_eq!(q.shape(), (1, 2));
/// ```
pub mod symbolic_matrix;
