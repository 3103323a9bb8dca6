#[cfg(test)]
mod tests {
    use crate::symbolic::symbolic_engine::Expr;
    use approx::assert_relative_eq;

    #[test]
    fn test_symbols_creation() {
        let vars = Expr::Symbols("x, y, z");
        assert_eq!(vars.len(), 3);
        assert_eq!(vars[1], Expr::Var("y".to_string()));
    }

    #[test]
    fn test_diff_polynomial() {
        let x = Expr::Var("x".to_string());
        // d(x^2)/dx = 2*x
        let f = x.clone().pow(Expr::Const(2.0));
        let df = f.diff("x").simplify_();
        let val = df.eval_expression(&["x"], &[3.0]);
        assert_relative_eq!(val, 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_diff_product_and_quotient() {
        let vars = Expr::Symbols("x, y");
        let (x, y) = (vars[0].clone(), vars[1].clone());
        let f = x.clone() * y.clone() / (x.clone() + Expr::Const(1.0));
        let df_dy = f.diff("y");
        // df/dy = x / (x + 1)
        let val = df_dy.eval_expression(&["x", "y"], &[1.0, 5.0]);
        assert_relative_eq!(val, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_diff_exp_ln() {
        let x = Expr::Var("x".to_string());
        let f = x.clone().exp() + x.clone().ln();
        let df = f.diff("x");
        let val = df.eval_expression(&["x"], &[2.0]);
        assert_relative_eq!(val, 2.0_f64.exp() + 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_simplify_folds_constants_and_identities() {
        let x = Expr::Var("x".to_string());
        let f = (Expr::Const(0.0) * x.clone() + x.clone() * Expr::Const(1.0)
            - Expr::Const(0.0))
        .simplify_();
        assert_eq!(f, x);
        let c = (Expr::Const(2.0) * Expr::Const(3.0) + Expr::Const(4.0)).simplify_();
        assert_eq!(c, Expr::Const(10.0));
    }

    #[test]
    fn test_extract_variables() {
        let vars = Expr::Symbols("a, b");
        let f = vars[0].clone() * vars[1].clone() + vars[0].clone().exp();
        let set = f.extract_variables();
        assert_eq!(set.len(), 2);
        assert!(set.contains("a"));
        assert!(set.contains("b"));
        assert!(f.depends_on("a"));
        assert!(!f.depends_on("c"));
    }

    #[test]
    fn test_lambdify_matches_eval() {
        let vars = Expr::Symbols("x, y");
        let f = vars[0].clone() * vars[0].clone() + vars[1].clone() * Expr::Const(3.0);
        let fun = f.lambdify(&["x", "y"]);
        let args = [2.0, -1.0];
        assert_relative_eq!(
            fun(&args),
            f.eval_expression(&["x", "y"], &args),
            epsilon = 1e-14
        );
        assert_relative_eq!(fun(&args), 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_indexed_var_naming() {
        let v = Expr::indexed_var("controls", 2, 7);
        assert_eq!(v, Expr::Var("controls_2_7".to_string()));
    }

    #[test]
    fn test_neg_and_abs() {
        let x = Expr::Var("x".to_string());
        let f = (-x.clone()).abs();
        assert_relative_eq!(f.eval_expression(&["x"], &[-3.5]), 3.5, epsilon = 1e-14);
    }
}
