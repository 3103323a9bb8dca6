//! # Decision-variable layout
//!
//! ## Module Purpose
//! Owns the named blocks of decision variables of the transcribed problem and the matching
//! bound tables, and packs/unpacks between the structured per-block form and the flat
//! vector the optimizer consumes.
//!
//! ## Canonical order
//! Flattening walks [`VAR_ORDER`]: the two scalar times first, then each time-varying
//! block column-major (all rows of column 0, then column 1, ...), then parameters.
//! `expand` is the exact inverse for any set of block shapes, so
//! `expand(flatten(vars)) == vars` holds elementwise.
use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_matrix::ExprMatrix;

use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;
use strum_macros::EnumIter;

/// Keys of the variable blocks. `multibody_states` is an input tag only (the first
/// NQ + NU rows of `states`); it never owns storage of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Var {
    initial_time,
    final_time,
    states,
    controls,
    multipliers,
    derivatives,
    slacks,
    parameters,
    multibody_states,
}

/// The canonical flatten order. Scalars first, then the column-major blocks.
pub const VAR_ORDER: [Var; 8] = [
    Var::initial_time,
    Var::final_time,
    Var::states,
    Var::controls,
    Var::multipliers,
    Var::derivatives,
    Var::slacks,
    Var::parameters,
];

pub type VariablesSym = HashMap<Var, ExprMatrix>;
pub type VariablesDM = HashMap<Var, DMatrix<f64>>;

/// flatten symbolic variables into one contiguous vector of scalar symbols
pub fn flatten_variables_sym(vars: &VariablesSym) -> Vec<Expr> {
    let mut out = Vec::new();
    for key in VAR_ORDER {
        let block = vars
            .get(&key)
            .unwrap_or_else(|| panic!("variable block {:?} missing from container", key));
        out.extend(block.flatten());
    }
    out
}

/// flatten numeric variable tables in the same canonical order
pub fn flatten_variables_dm(vars: &VariablesDM) -> DVector<f64> {
    let mut out = Vec::new();
    for key in VAR_ORDER {
        let block = vars
            .get(&key)
            .unwrap_or_else(|| panic!("variable block {:?} missing from container", key));
        for c in 0..block.ncols() {
            for r in 0..block.nrows() {
                out.push(block[(r, c)]);
            }
        }
    }
    DVector::from_vec(out)
}

/// inverse of [`flatten_variables_dm`]; `template` supplies the block shapes
pub fn expand_variables_dm(x: &DVector<f64>, template: &VariablesDM) -> VariablesDM {
    let mut out = VariablesDM::new();
    let mut offset = 0;
    for key in VAR_ORDER {
        let like = template
            .get(&key)
            .unwrap_or_else(|| panic!("variable block {:?} missing from template", key));
        let (nr, nc) = like.shape();
        let mut block = DMatrix::zeros(nr, nc);
        for c in 0..nc {
            for r in 0..nr {
                block[(r, c)] = x[offset];
                offset += 1;
            }
        }
        out.insert(key, block);
    }
    assert_eq!(offset, x.len(), "flat vector length does not match template shapes");
    out
}

/// Constraint blocks of the transcribed problem, generic over symbolic or numeric storage.
///
/// Flatten order: defects, residuals, kinematic, then each path-constraint block; each
/// block column-major like the variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraints<T> {
    pub defects: T,
    pub residuals: T,
    pub kinematic: T,
    pub path: Vec<T>,
}

impl Constraints<ExprMatrix> {
    pub fn flatten(&self) -> Vec<Expr> {
        let mut out = Vec::new();
        out.extend(self.defects.flatten());
        out.extend(self.residuals.flatten());
        out.extend(self.kinematic.flatten());
        for p in &self.path {
            out.extend(p.flatten());
        }
        out
    }
}

impl Constraints<DMatrix<f64>> {
    pub fn flatten(&self) -> DVector<f64> {
        let mut out = Vec::new();
        let mut push_block = |block: &DMatrix<f64>| {
            for c in 0..block.ncols() {
                for r in 0..block.nrows() {
                    out.push(block[(r, c)]);
                }
            }
        };
        push_block(&self.defects);
        push_block(&self.residuals);
        push_block(&self.kinematic);
        for p in &self.path {
            push_block(p);
        }
        DVector::from_vec(out)
    }

    /// inverse of `flatten`; `template` supplies the block shapes
    pub fn expand(g: &DVector<f64>, template: &Constraints<DMatrix<f64>>) -> Self {
        let mut offset = 0;
        let mut take_block = |like: &DMatrix<f64>| {
            let (nr, nc) = like.shape();
            let mut block = DMatrix::zeros(nr, nc);
            for c in 0..nc {
                for r in 0..nr {
                    block[(r, c)] = g[offset];
                    offset += 1;
                }
            }
            block
        };
        let defects = take_block(&template.defects);
        let residuals = take_block(&template.residuals);
        let kinematic = take_block(&template.kinematic);
        let path: Vec<DMatrix<f64>> = template.path.iter().map(&mut take_block).collect();
        assert_eq!(offset, g.len(), "flat vector length does not match template shapes");
        Constraints {
            defects,
            residuals,
            kinematic,
            path,
        }
    }
}
