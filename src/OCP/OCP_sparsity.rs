//! # Sparsity export
//!
//! Optional debugging output: the structural nonzero patterns of the objective gradient,
//! the objective Hessian, the Lagrangian Hessian (with an all-ones multiplier vector)
//! and the constraint Jacobian, written as Matrix Market coordinate files. Patterns come
//! from the expression graphs themselves: first-order structure from dependency sets,
//! second-order structure from the dependency sets of the symbolic first derivatives.
use crate::OCP::OCP_errors::TranscriptionError;
use crate::symbolic::symbolic_engine::Expr;

use log::info;
use sprs::{CsMat, TriMat};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};

/// Write the four sparsity files with the given path prefix.
pub fn write_sparsity_files(
    prefix: &str,
    x_names: &[String],
    objective: &Expr,
    constraints: &[Expr],
) -> Result<(), TranscriptionError> {
    let nx = x_names.len();
    let ng = constraints.len();
    let index_map: HashMap<&str, usize> = x_names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();

    // objective gradient: one column, a row per variable the objective touches
    let mut gradient = TriMat::new((nx, 1));
    for name in objective.extract_variables() {
        gradient.add_triplet(index_map[name.as_str()], 0, 1.0);
    }
    write_matrix_market(
        &format!("{}_objective_gradient_sparsity.mtx", prefix),
        &gradient.to_csr(),
    )?;

    // objective Hessian
    let hess_pattern = hessian_pattern(objective, &index_map);
    write_pattern(
        &format!("{}_objective_Hessian_sparsity.mtx", prefix),
        nx,
        &hess_pattern,
    )?;

    // Lagrangian Hessian with all-ones multipliers: union of the objective's pattern
    // with every constraint row's pattern
    let mut lagr_pattern = hess_pattern;
    for row in constraints {
        lagr_pattern.extend(hessian_pattern(row, &index_map));
    }
    write_pattern(
        &format!("{}_Lagrangian_Hessian_sparsity.mtx", prefix),
        nx,
        &lagr_pattern,
    )?;

    // constraint Jacobian
    let mut jacobian = TriMat::new((ng, nx));
    for (r, row) in constraints.iter().enumerate() {
        for name in row.extract_variables() {
            jacobian.add_triplet(r, index_map[name.as_str()], 1.0);
        }
    }
    write_matrix_market(
        &format!("{}constraint_Jacobian_sparsity.mtx", prefix),
        &jacobian.to_csr(),
    )?;

    info!("sparsity patterns written with prefix '{}'", prefix);
    Ok(())
}

/// structural nonzeros of the Hessian of `expr`, symmetrized
fn hessian_pattern(
    expr: &Expr,
    index_map: &HashMap<&str, usize>,
) -> HashSet<(usize, usize)> {
    let mut pattern = HashSet::new();
    for name_i in expr.extract_variables() {
        let i = index_map[name_i.as_str()];
        let first = expr.diff(&name_i).simplify_();
        for name_j in first.extract_variables() {
            let j = index_map[name_j.as_str()];
            pattern.insert((i, j));
            pattern.insert((j, i));
        }
    }
    pattern
}

fn write_pattern(
    path: &str,
    nx: usize,
    pattern: &HashSet<(usize, usize)>,
) -> Result<(), TranscriptionError> {
    let mut tri = TriMat::new((nx, nx));
    for &(r, c) in pattern {
        tri.add_triplet(r, c, 1.0);
    }
    write_matrix_market(path, &tri.to_csr())
}

/// Matrix Market coordinate output of a structural pattern.
fn write_matrix_market(path: &str, mat: &CsMat<f64>) -> Result<(), TranscriptionError> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    writeln!(out, "%%MatrixMarket matrix coordinate real general")?;
    writeln!(out, "{} {} {}", mat.rows(), mat.cols(), mat.nnz())?;
    for (value, (r, c)) in mat.iter() {
        writeln!(out, "{} {} {}", r + 1, c + 1, value)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn read_header(path: &str) -> (usize, usize, usize) {
        let content = fs::read_to_string(path).unwrap();
        let line = content.lines().nth(1).unwrap();
        let parts: Vec<usize> = line
            .split_whitespace()
            .map(|t| t.parse().unwrap())
            .collect();
        (parts[0], parts[1], parts[2])
    }

    #[test]
    fn test_sparsity_dimensions_and_counts() {
        let x_names = names(&["a", "b", "c"]);
        let a = Expr::Var("a".to_string());
        let b = Expr::Var("b".to_string());
        // f = a^2 + b: gradient touches a and b, Hessian only (a, a)
        let f = a.clone().sq() + b.clone();
        // g0 = a * b couples (a, b) in the Lagrangian Hessian
        let g = vec![a.clone() * b.clone(), b];

        let dir = std::env::temp_dir().join("sparsity_pattern_test");
        fs::create_dir_all(&dir).unwrap();
        let prefix = format!("{}/t", dir.display());
        write_sparsity_files(&prefix, &x_names, &f, &g).unwrap();

        let (r, c, nnz) = read_header(&format!("{}_objective_gradient_sparsity.mtx", prefix));
        assert_eq!((r, c, nnz), (3, 1, 2));

        let (r, c, nnz) = read_header(&format!("{}_objective_Hessian_sparsity.mtx", prefix));
        assert_eq!((r, c), (3, 3));
        assert_eq!(nnz, 1); // only d2f/da2

        let (r, c, nnz) = read_header(&format!("{}_Lagrangian_Hessian_sparsity.mtx", prefix));
        assert_eq!((r, c), (3, 3));
        assert_eq!(nnz, 3); // (a,a) plus the symmetric (a,b) coupling

        let (r, c, nnz) = read_header(&format!("{}constraint_Jacobian_sparsity.mtx", prefix));
        assert_eq!((r, c), (2, 3));
        assert_eq!(nnz, 3);
    }
}
