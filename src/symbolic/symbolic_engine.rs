#![allow(non_camel_case_types)]
use std::collections::{HashMap, HashSet};
use std::f64;
use std::fmt;
// Define an enum to represent different types of symbolic expressions

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Var(String),
    Const(f64),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Exp(Box<Expr>),
    Ln(Box<Expr>),
    Abs(Box<Expr>),
}

// Implement Display for pretty printing

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Const(val) => write!(f, "{}", val),
            Expr::Add(lhs, rhs) => write!(f, "({} + {})", lhs, rhs),
            Expr::Sub(lhs, rhs) => write!(f, "({} - {})", lhs, rhs),
            Expr::Mul(lhs, rhs) => write!(f, "({} * {})", lhs, rhs),
            Expr::Div(lhs, rhs) => write!(f, "({} / {})", lhs, rhs),
            Expr::Pow(base, exp) => write!(f, "({} ^ {})", base, exp),
            Expr::Exp(expr) => write!(f, "exp({})", expr),
            Expr::Ln(expr) => write!(f, "ln({})", expr),
            Expr::Abs(expr) => write!(f, "abs({})", expr),
        }
    }
}

impl std::ops::Add for Expr {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Expr::Add(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Sub for Expr {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Expr::Sub(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Mul for Expr {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Expr::Mul(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Div for Expr {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        Expr::Div(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Neg for Expr {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Expr::Sub(Expr::Const(0.0).boxed(), self.boxed())
    }
}

impl Expr {
    /// BASIC FEATURES

    /// create new variables from string
    pub fn Symbols(symbols: &str) -> Vec<Expr> {
        let symbols = symbols.to_string();
        let vec_trimmed: Vec<String> = symbols.split(',').map(|s| s.trim().to_string()).collect();
        let vector_of_symbolic_vars: Vec<Expr> = vec_trimmed
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| Expr::Var(s.to_string()))
            .collect();
        vector_of_symbolic_vars
    }

    /// create an indexed variable name_i_j - the naming convention for matrix entries
    pub fn indexed_var(name: &str, i: usize, j: usize) -> Expr {
        Expr::Var(format!("{}_{}_{}", name, i, j))
    }

    // just shortcut for box
    fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    // implementing different functions that are not part of std
    pub fn exp(mut self) -> Expr {
        self = Expr::Exp(self.boxed());
        self
    }
    pub fn ln(mut self) -> Expr {
        self = Expr::Ln(self.boxed());
        self
    }
    pub fn abs(mut self) -> Expr {
        self = Expr::Abs(self.boxed());
        self
    }
    pub fn pow(mut self, rhs: Expr) -> Expr {
        self = Expr::Pow(self.boxed(), rhs.boxed());
        self
    }
    pub fn sq(self) -> Expr {
        Expr::Mul(self.clone().boxed(), self.boxed())
    }
    pub fn is_zero(&self) -> bool {
        match self {
            Expr::Const(val) => val == &0.0,
            _ => false,
        }
    }
    pub fn is_const(&self) -> bool {
        matches!(self, Expr::Const(_))
    }

    /// DIFFERENTIATION

    // differentiate with respect to a variable - partial derivative in case of a function of many variables,
    // a full derivative in case of a function of one variable
    pub fn diff(&self, var: &str) -> Expr {
        match self {
            Expr::Var(name) => {
                if name == var {
                    Expr::Const(1.0)
                } else {
                    Expr::Const(0.0)
                }
            }
            Expr::Const(_) => Expr::Const(0.0),
            Expr::Add(lhs, rhs) => Expr::Add(Box::new(lhs.diff(var)), Box::new(rhs.diff(var))),
            Expr::Sub(lhs, rhs) => Expr::Sub(Box::new(lhs.diff(var)), Box::new(rhs.diff(var))),
            Expr::Mul(lhs, rhs) => Expr::Add(
                Box::new(Expr::Mul(Box::new(lhs.diff(var)), rhs.clone())),
                Box::new(Expr::Mul(lhs.clone(), Box::new(rhs.diff(var)))),
            ),
            Expr::Div(lhs, rhs) => Expr::Div(
                Box::new(Expr::Sub(
                    Box::new(Expr::Mul(Box::new(lhs.diff(var)), rhs.clone())),
                    Box::new(Expr::Mul(Box::new(rhs.diff(var)), lhs.clone())),
                )),
                Box::new(Expr::Mul(rhs.clone(), rhs.clone())),
            ),
            Expr::Pow(base, exp) => Expr::Mul(
                Box::new(Expr::Mul(
                    exp.clone(),
                    Box::new(Expr::Pow(
                        base.clone(),
                        Box::new(Expr::Sub(exp.clone(), Box::new(Expr::Const(1.0)))),
                    )),
                )),
                Box::new(base.diff(var)),
            ),
            Expr::Exp(expr) => {
                Expr::Mul(Box::new(Expr::Exp(expr.clone())), Box::new(expr.diff(var)))
            }
            Expr::Ln(expr) => Expr::Div(Box::new(expr.diff(var)), expr.clone()),
            // d|u|/dx = u/|u| * u'
            Expr::Abs(expr) => Expr::Mul(
                Box::new(Expr::Div(expr.clone(), Box::new(Expr::Abs(expr.clone())))),
                Box::new(expr.diff(var)),
            ),
        }
    } // end of diff

    /// SIMPLIFICATION
    /// constant folding plus the 0/1 identities; enough to keep transcription graphs
    /// from drowning in zero terms
    pub fn simplify_(&self) -> Expr {
        match self {
            Expr::Var(_) | Expr::Const(_) => self.clone(),
            Expr::Add(lhs, rhs) => {
                let (l, r) = (lhs.simplify_(), rhs.simplify_());
                match (&l, &r) {
                    (Expr::Const(a), Expr::Const(b)) => Expr::Const(a + b),
                    (Expr::Const(a), _) if *a == 0.0 => r,
                    (_, Expr::Const(b)) if *b == 0.0 => l,
                    _ => Expr::Add(l.boxed(), r.boxed()),
                }
            }
            Expr::Sub(lhs, rhs) => {
                let (l, r) = (lhs.simplify_(), rhs.simplify_());
                match (&l, &r) {
                    (Expr::Const(a), Expr::Const(b)) => Expr::Const(a - b),
                    (_, Expr::Const(b)) if *b == 0.0 => l,
                    _ => Expr::Sub(l.boxed(), r.boxed()),
                }
            }
            Expr::Mul(lhs, rhs) => {
                let (l, r) = (lhs.simplify_(), rhs.simplify_());
                match (&l, &r) {
                    (Expr::Const(a), Expr::Const(b)) => Expr::Const(a * b),
                    (Expr::Const(a), _) if *a == 0.0 => Expr::Const(0.0),
                    (_, Expr::Const(b)) if *b == 0.0 => Expr::Const(0.0),
                    (Expr::Const(a), _) if *a == 1.0 => r,
                    (_, Expr::Const(b)) if *b == 1.0 => l,
                    _ => Expr::Mul(l.boxed(), r.boxed()),
                }
            }
            Expr::Div(lhs, rhs) => {
                let (l, r) = (lhs.simplify_(), rhs.simplify_());
                match (&l, &r) {
                    (Expr::Const(a), Expr::Const(b)) if *b != 0.0 => Expr::Const(a / b),
                    (Expr::Const(a), _) if *a == 0.0 => Expr::Const(0.0),
                    (_, Expr::Const(b)) if *b == 1.0 => l,
                    _ => Expr::Div(l.boxed(), r.boxed()),
                }
            }
            Expr::Pow(base, exp) => {
                let (b, e) = (base.simplify_(), exp.simplify_());
                match (&b, &e) {
                    (Expr::Const(b_), Expr::Const(e_)) => Expr::Const(b_.powf(*e_)),
                    (_, Expr::Const(e_)) if *e_ == 1.0 => b,
                    (_, Expr::Const(e_)) if *e_ == 0.0 => Expr::Const(1.0),
                    _ => Expr::Pow(b.boxed(), e.boxed()),
                }
            }
            Expr::Exp(expr) => {
                let e = expr.simplify_();
                match &e {
                    Expr::Const(v) => Expr::Const(v.exp()),
                    _ => Expr::Exp(e.boxed()),
                }
            }
            Expr::Ln(expr) => {
                let e = expr.simplify_();
                match &e {
                    Expr::Const(v) if *v > 0.0 => Expr::Const(v.ln()),
                    _ => Expr::Ln(e.boxed()),
                }
            }
            Expr::Abs(expr) => {
                let e = expr.simplify_();
                match &e {
                    Expr::Const(v) => Expr::Const(v.abs()),
                    _ => Expr::Abs(e.boxed()),
                }
            }
        }
    }

    /// VARIABLE ANALYSIS

    /// collect the set of variable names the expression depends on
    pub fn extract_variables(&self) -> HashSet<String> {
        let mut set = HashSet::new();
        self.collect_variables(&mut set);
        set
    }

    fn collect_variables(&self, set: &mut HashSet<String>) {
        match self {
            Expr::Var(name) => {
                set.insert(name.clone());
            }
            Expr::Const(_) => {}
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs)
            | Expr::Pow(lhs, rhs) => {
                lhs.collect_variables(set);
                rhs.collect_variables(set);
            }
            Expr::Exp(expr) | Expr::Ln(expr) | Expr::Abs(expr) => expr.collect_variables(set),
        }
    }

    pub fn depends_on(&self, var: &str) -> bool {
        match self {
            Expr::Var(name) => name == var,
            Expr::Const(_) => false,
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs)
            | Expr::Pow(lhs, rhs) => lhs.depends_on(var) || rhs.depends_on(var),
            Expr::Exp(expr) | Expr::Ln(expr) | Expr::Abs(expr) => expr.depends_on(var),
        }
    }

    /// LAMBDIFY
    /// function to lambdify the symbolic function of multiple variables = convert it into a rust function.
    /// Variable positions are resolved once against `vars` while the closure tree is built,
    /// so evaluation does no name lookups.
    pub fn lambdify(&self, vars: &[&str]) -> Box<dyn Fn(&[f64]) -> f64 + Send + Sync> {
        let index_map: HashMap<String, usize> = vars
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i))
            .collect();
        self.lambdify_with_index_map(&index_map)
    }

    /// as [`Expr::lambdify`] but against a prebuilt name -> position map, so batches of
    /// expressions over the same argument list share one map
    pub fn lambdify_with_index_map(
        &self,
        index_map: &HashMap<String, usize>,
    ) -> Box<dyn Fn(&[f64]) -> f64 + Send + Sync> {
        match self {
            Expr::Var(name) => {
                let index = *index_map
                    .get(name)
                    .unwrap_or_else(|| panic!("variable {} not found in argument list", name));
                Box::new(move |args| args[index])
            }
            Expr::Const(val) => {
                let val = *val;
                Box::new(move |_| val)
            }
            Expr::Add(lhs, rhs) => {
                let lhs_fn = lhs.lambdify_with_index_map(index_map);
                let rhs_fn = rhs.lambdify_with_index_map(index_map);
                Box::new(move |args| lhs_fn(args) + rhs_fn(args))
            }
            Expr::Sub(lhs, rhs) => {
                let lhs_fn = lhs.lambdify_with_index_map(index_map);
                let rhs_fn = rhs.lambdify_with_index_map(index_map);
                Box::new(move |args| lhs_fn(args) - rhs_fn(args))
            }
            Expr::Mul(lhs, rhs) => {
                let lhs_fn = lhs.lambdify_with_index_map(index_map);
                let rhs_fn = rhs.lambdify_with_index_map(index_map);
                Box::new(move |args| lhs_fn(args) * rhs_fn(args))
            }
            Expr::Div(lhs, rhs) => {
                let lhs_fn = lhs.lambdify_with_index_map(index_map);
                let rhs_fn = rhs.lambdify_with_index_map(index_map);
                Box::new(move |args| lhs_fn(args) / rhs_fn(args))
            }
            Expr::Pow(base, exp) => {
                let base_fn = base.lambdify_with_index_map(index_map);
                let exp_fn = exp.lambdify_with_index_map(index_map);
                Box::new(move |args| base_fn(args).powf(exp_fn(args)))
            }
            Expr::Exp(expr) => {
                let expr_fn = expr.lambdify_with_index_map(index_map);
                Box::new(move |args| expr_fn(args).exp())
            }
            Expr::Ln(expr) => {
                let expr_fn = expr.lambdify_with_index_map(index_map);
                Box::new(move |args| expr_fn(args).ln())
            }
            Expr::Abs(expr) => {
                let expr_fn = expr.lambdify_with_index_map(index_map);
                Box::new(move |args| expr_fn(args).abs())
            }
        }
    } // end of lambdify

    /// evaluate the expression directly without building a closure tree
    pub fn eval_expression(&self, vars: &[&str], values: &[f64]) -> f64 {
        match self {
            Expr::Var(name) => {
                let index = vars
                    .iter()
                    .position(|v| v == name)
                    .unwrap_or_else(|| panic!("variable {} not found in argument list", name));
                values[index]
            }
            Expr::Const(val) => *val,
            Expr::Add(lhs, rhs) => {
                lhs.eval_expression(vars, values) + rhs.eval_expression(vars, values)
            }
            Expr::Sub(lhs, rhs) => {
                lhs.eval_expression(vars, values) - rhs.eval_expression(vars, values)
            }
            Expr::Mul(lhs, rhs) => {
                lhs.eval_expression(vars, values) * rhs.eval_expression(vars, values)
            }
            Expr::Div(lhs, rhs) => {
                lhs.eval_expression(vars, values) / rhs.eval_expression(vars, values)
            }
            Expr::Pow(base, exp) => base
                .eval_expression(vars, values)
                .powf(exp.eval_expression(vars, values)),
            Expr::Exp(expr) => expr.eval_expression(vars, values).exp(),
            Expr::Ln(expr) => expr.eval_expression(vars, values).ln(),
            Expr::Abs(expr) => expr.eval_expression(vars, values).abs(),
        }
    }
}
