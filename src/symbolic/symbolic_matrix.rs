use crate::symbolic::symbolic_engine::Expr;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::collections::HashSet;
use std::ops::{Add, Index, IndexMut, Sub};

/// Dense matrix of symbolic expressions.
///
/// The storage is a nalgebra DMatrix so shapes, indexing and iteration behave like every
/// other matrix in the crate; all arithmetic stays symbolic.
#[derive(Clone, Debug, PartialEq)]
pub struct ExprMatrix {
    pub data: DMatrix<Expr>,
}

impl ExprMatrix {
    /// Create new symbolic matrix from raw storage
    pub fn new(data: DMatrix<Expr>) -> Self {
        Self { data }
    }

    /// Create a matrix of fresh named entries `name_r_c`
    pub fn sym(name: &str, nrows: usize, ncols: usize) -> Self {
        Self {
            data: DMatrix::from_fn(nrows, ncols, |r, c| Expr::indexed_var(name, r, c)),
        }
    }

    /// Create zero matrix of given shape
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            data: DMatrix::from_element(nrows, ncols, Expr::Const(0.0)),
        }
    }

    /// 1 x 1 matrix holding a single expression
    pub fn scalar(expr: Expr) -> Self {
        Self {
            data: DMatrix::from_element(1, 1, expr),
        }
    }

    pub fn from_fn<F: FnMut(usize, usize) -> Expr>(nrows: usize, ncols: usize, f: F) -> Self {
        Self {
            data: DMatrix::from_fn(nrows, ncols, f),
        }
    }

    /// lift a numeric matrix into constants
    pub fn from_numeric(m: &DMatrix<f64>) -> Self {
        Self {
            data: DMatrix::from_fn(m.nrows(), m.ncols(), |r, c| Expr::Const(m[(r, c)])),
        }
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.data.nrows(), self.data.ncols())
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0 || self.data.ncols() == 0
    }

    pub fn get(&self, row: usize, col: usize) -> &Expr {
        &self.data[(row, col)]
    }

    pub fn set(&mut self, row: usize, col: usize, expr: Expr) {
        self.data[(row, col)] = expr;
    }

    /// copy of `n` rows starting at `start`
    pub fn rows(&self, start: usize, n: usize) -> ExprMatrix {
        ExprMatrix {
            data: self.data.rows(start, n).into_owned(),
        }
    }

    /// copy of the selected columns, in the given order
    pub fn columns(&self, indices: &[usize]) -> ExprMatrix {
        ExprMatrix {
            data: DMatrix::from_fn(self.nrows(), indices.len(), |r, k| {
                self.data[(r, indices[k])].clone()
            }),
        }
    }

    pub fn column(&self, index: usize) -> ExprMatrix {
        self.columns(&[index])
    }

    /// write `block` into the rows `row_start..row_start+block.nrows()` of the selected columns
    pub fn set_rows_columns(&mut self, row_start: usize, cols: &[usize], block: &ExprMatrix) {
        assert_eq!(
            block.ncols(),
            cols.len(),
            "block column count must match the index set"
        );
        assert!(row_start + block.nrows() <= self.nrows());
        for (k, &c) in cols.iter().enumerate() {
            for r in 0..block.nrows() {
                self.data[(row_start + r, c)] = block.data[(r, k)].clone();
            }
        }
    }

    /// write `block` into rows `row_start..` across all columns
    pub fn set_rows(&mut self, row_start: usize, block: &ExprMatrix) {
        let cols: Vec<usize> = (0..self.ncols()).collect();
        self.set_rows_columns(row_start, &cols, block);
    }

    /// add `block` elementwise into the selected rows/columns
    pub fn add_to_rows_columns(&mut self, row_start: usize, cols: &[usize], block: &ExprMatrix) {
        assert_eq!(
            block.ncols(),
            cols.len(),
            "block column count must match the index set"
        );
        assert!(row_start + block.nrows() <= self.nrows());
        for (k, &c) in cols.iter().enumerate() {
            for r in 0..block.nrows() {
                let old = self.data[(row_start + r, c)].clone();
                self.data[(row_start + r, c)] = (old + block.data[(r, k)].clone()).simplify_();
            }
        }
    }

    /// repeat a single-column matrix `n` times (like repmat over columns)
    pub fn repmat_cols(&self, n: usize) -> ExprMatrix {
        assert_eq!(self.ncols(), 1, "repmat_cols expects a single column");
        ExprMatrix {
            data: DMatrix::from_fn(self.nrows(), n, |r, _| self.data[(r, 0)].clone()),
        }
    }

    /// horizontal concatenation; all parts must agree on row count
    pub fn hcat(parts: &[ExprMatrix]) -> ExprMatrix {
        if parts.is_empty() {
            return ExprMatrix::zeros(0, 0);
        }
        let nrows = parts[0].nrows();
        let ncols: usize = parts.iter().map(|p| p.ncols()).sum();
        for p in parts {
            assert_eq!(p.nrows(), nrows, "hcat parts must agree on row count");
        }
        let mut data = DMatrix::from_element(nrows, ncols, Expr::Const(0.0));
        let mut offset = 0;
        for p in parts {
            for c in 0..p.ncols() {
                for r in 0..nrows {
                    data[(r, offset + c)] = p.data[(r, c)].clone();
                }
            }
            offset += p.ncols();
        }
        ExprMatrix { data }
    }

    /// vertical concatenation; all parts must agree on column count
    pub fn vcat(parts: &[ExprMatrix]) -> ExprMatrix {
        if parts.is_empty() {
            return ExprMatrix::zeros(0, 0);
        }
        let ncols = parts[0].ncols();
        let nrows: usize = parts.iter().map(|p| p.nrows()).sum();
        for p in parts {
            assert_eq!(p.ncols(), ncols, "vcat parts must agree on column count");
        }
        let mut data = DMatrix::from_element(nrows, ncols, Expr::Const(0.0));
        let mut offset = 0;
        for p in parts {
            for r in 0..p.nrows() {
                for c in 0..ncols {
                    data[(offset + r, c)] = p.data[(r, c)].clone();
                }
            }
            offset += p.nrows();
        }
        ExprMatrix { data }
    }

    /// elementwise square
    pub fn sq(&self) -> ExprMatrix {
        ExprMatrix {
            data: DMatrix::from_fn(self.nrows(), self.ncols(), |r, c| {
                self.data[(r, c)].clone().sq()
            }),
        }
    }

    /// scale every entry by a symbolic factor
    pub fn scale(&self, factor: &Expr) -> ExprMatrix {
        ExprMatrix {
            data: DMatrix::from_fn(self.nrows(), self.ncols(), |r, c| {
                (factor.clone() * self.data[(r, c)].clone()).simplify_()
            }),
        }
    }

    /// 1 x ncols row of column sums
    pub fn sum_rows(&self) -> ExprMatrix {
        ExprMatrix {
            data: DMatrix::from_fn(1, self.ncols(), |_, c| {
                let mut acc = Expr::Const(0.0);
                for r in 0..self.nrows() {
                    acc = acc + self.data[(r, c)].clone();
                }
                acc.simplify_()
            }),
        }
    }

    /// quadrature contraction of a 1 x n row against numeric weights
    pub fn weighted_sum_row(&self, weights: &DVector<f64>) -> Expr {
        assert_eq!(self.nrows(), 1, "weighted_sum_row expects a row");
        assert_eq!(self.ncols(), weights.len(), "weight count must match columns");
        let mut acc = Expr::Const(0.0);
        for c in 0..self.ncols() {
            acc = acc + Expr::Const(weights[c]) * self.data[(0, c)].clone();
        }
        acc.simplify_()
    }

    /// column-major flattening into a plain vector of expressions
    pub fn flatten(&self) -> Vec<Expr> {
        let mut out = Vec::with_capacity(self.nrows() * self.ncols());
        for c in 0..self.ncols() {
            for r in 0..self.nrows() {
                out.push(self.data[(r, c)].clone());
            }
        }
        out
    }

    /// union of variable dependencies over all entries
    pub fn extract_variables(&self) -> HashSet<String> {
        let mut set = HashSet::new();
        for e in self.data.iter() {
            set.extend(e.extract_variables());
        }
        set
    }
}

impl Index<(usize, usize)> for ExprMatrix {
    type Output = Expr;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<(usize, usize)> for ExprMatrix {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        &mut self.data[index]
    }
}

// Elementwise addition
impl Add for ExprMatrix {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        assert_eq!(self.shape(), other.shape(), "matrix dimensions must match");
        ExprMatrix {
            data: DMatrix::from_fn(self.nrows(), self.ncols(), |r, c| {
                (self.data[(r, c)].clone() + other.data[(r, c)].clone()).simplify_()
            }),
        }
    }
}

// Elementwise subtraction
impl Sub for ExprMatrix {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        assert_eq!(self.shape(), other.shape(), "matrix dimensions must match");
        ExprMatrix {
            data: DMatrix::from_fn(self.nrows(), self.ncols(), |r, c| {
                (self.data[(r, c)].clone() - other.data[(r, c)].clone()).simplify_()
            }),
        }
    }
}

/// Map a fallible per-column function over `n_cols` column indices, serially or on the
/// rayon pool depending on the `(kind, workers)` hint. The output is ordered by input
/// index regardless of how the evaluation was scheduled.
pub fn map_columns<E, F>(
    n_cols: usize,
    parallelism: (&str, usize),
    f: F,
) -> Result<Vec<Vec<ExprMatrix>>, E>
where
    F: Fn(usize) -> Result<Vec<ExprMatrix>, E> + Send + Sync,
    E: Send,
{
    let (kind, workers) = parallelism;
    if kind == "serial" || workers <= 1 || n_cols <= 1 {
        (0..n_cols).map(f).collect()
    } else {
        (0..n_cols).into_par_iter().map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sym_naming_and_shape() {
        let m = ExprMatrix::sym("states", 2, 3);
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.get(1, 2), &Expr::Var("states_1_2".to_string()));
    }

    #[test]
    fn test_columns_select_order() {
        let m = ExprMatrix::sym("u", 1, 4);
        let picked = m.columns(&[3, 0]);
        assert_eq!(picked.get(0, 0), &Expr::Var("u_0_3".to_string()));
        assert_eq!(picked.get(0, 1), &Expr::Var("u_0_0".to_string()));
    }

    #[test]
    fn test_set_and_add_block() {
        let mut m = ExprMatrix::zeros(2, 3);
        let block = ExprMatrix::sym("b", 1, 2);
        m.set_rows_columns(0, &[0, 2], &block);
        assert_eq!(m.get(0, 2), &Expr::Var("b_0_1".to_string()));
        m.add_to_rows_columns(0, &[0, 2], &block);
        assert_eq!(
            m.get(0, 0),
            &(Expr::Var("b_0_0".to_string()) + Expr::Var("b_0_0".to_string()))
        );
    }

    #[test]
    fn test_hcat_vcat_shapes() {
        let a = ExprMatrix::sym("a", 2, 1);
        let b = ExprMatrix::sym("b", 2, 2);
        let h = ExprMatrix::hcat(&[a.clone(), b.clone()]);
        assert_eq!(h.shape(), (2, 3));
        let v = ExprMatrix::vcat(&[a.clone(), a]);
        assert_eq!(v.shape(), (4, 1));
        assert_eq!(h.get(0, 1), &Expr::Var("b_0_0".to_string()));
    }

    #[test]
    fn test_flatten_is_column_major() {
        let m = ExprMatrix::sym("x", 2, 2);
        let flat = m.flatten();
        let names: Vec<String> = flat.iter().map(|e| e.to_string()).collect();
        assert_eq!(names, vec!["x_0_0", "x_1_0", "x_0_1", "x_1_1"]);
    }

    #[test]
    fn test_weighted_sum_row() {
        let m = ExprMatrix::from_numeric(&DMatrix::from_row_slice(1, 3, &[1.0, 2.0, 3.0]));
        let w = DVector::from_vec(vec![0.5, 1.0, 0.5]);
        let s = m.weighted_sum_row(&w);
        assert_eq!(s, Expr::Const(4.0));
    }

    #[test]
    fn test_map_columns_serial_and_parallel_agree() {
        let build = |i: usize| -> Result<Vec<ExprMatrix>, ()> {
            Ok(vec![ExprMatrix::scalar(Expr::Const(i as f64))])
        };
        let serial = map_columns(8, ("serial", 1), build).unwrap();
        let parallel = map_columns(8, ("thread", 4), build).unwrap();
        assert_eq!(serial, parallel);
        assert_eq!(serial[5][0].get(0, 0), &Expr::Const(5.0));
    }

    #[test]
    fn test_empty_blocks() {
        let m = ExprMatrix::zeros(0, 4);
        assert!(m.is_empty());
        assert!(m.flatten().is_empty());
        let picked = m.columns(&[1, 2]);
        assert_eq!(picked.shape(), (0, 2));
    }
}
