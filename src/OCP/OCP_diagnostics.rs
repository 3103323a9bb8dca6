//! # Failure diagnostics
//!
//! When the backend reports non-success the driver prints this report so the user can
//! see which variable bounds pinched and where the dynamics defects or algebraic
//! constraints refused to close. Magnitudes are printed in fixed-width scientific
//! notation, times with fixed precision.
use crate::OCP::OCP_problem::Problem;
use crate::OCP::OCP_variables::{Constraints, Var, VariablesDM};

use nalgebra::{DMatrix, DVector};
use std::io::{self, Write};

/// Print active/violated bounds for every variable block, then the norm tables of the
/// defect, kinematic and path constraint rows.
#[allow(clippy::too_many_arguments)]
pub fn print_constraint_values<W: Write>(
    problem: &Problem,
    vars: &VariablesDM,
    times: &DVector<f64>,
    interior_times: &DVector<f64>,
    mesh_times: &DVector<f64>,
    constraints: &Constraints<DMatrix<f64>>,
    lower_bounds: &VariablesDM,
    upper_bounds: &VariablesDM,
    num_constraints: usize,
    stream: &mut W,
) -> io::Result<()> {
    let state_names = problem.state_names();
    let control_names = problem.control_names();
    let multiplier_names = problem.multiplier_names();
    let slack_names = problem.slack_names();
    let derivative_names: Vec<String> = {
        let nw = vars[&Var::derivatives].nrows();
        let nq = problem.num_coordinates();
        (0..nw)
            .map(|i| format!("{}_dot", state_names[nq + i]))
            .collect()
    };

    let mut max_name_length = 0;
    for names in [
        &state_names,
        &control_names,
        &multiplier_names,
        &derivative_names,
        &slack_names,
    ] {
        for n in names.iter() {
            max_name_length = max_name_length.max(n.len());
        }
    }
    let width = max_name_length.max(12);

    writeln!(stream, "\nActive or violated continuous variable bounds")?;
    writeln!(
        stream,
        "L and U indicate which bound is active; '*' indicates a bound is violated."
    )?;
    writeln!(stream, "The case of lower==upper==value is ignored.")?;

    print_block_bounds(
        stream,
        width,
        "State bounds",
        &state_names,
        times,
        &vars[&Var::states],
        &lower_bounds[&Var::states],
        &upper_bounds[&Var::states],
    )?;
    print_block_bounds(
        stream,
        width,
        "Control bounds",
        &control_names,
        times,
        &vars[&Var::controls],
        &lower_bounds[&Var::controls],
        &upper_bounds[&Var::controls],
    )?;
    print_block_bounds(
        stream,
        width,
        "Multiplier bounds",
        &multiplier_names,
        times,
        &vars[&Var::multipliers],
        &lower_bounds[&Var::multipliers],
        &upper_bounds[&Var::multipliers],
    )?;
    print_block_bounds(
        stream,
        width,
        "Derivative bounds",
        &derivative_names,
        times,
        &vars[&Var::derivatives],
        &lower_bounds[&Var::derivatives],
        &upper_bounds[&Var::derivatives],
    )?;
    print_block_bounds(
        stream,
        width,
        "Slack bounds",
        &slack_names,
        interior_times,
        &vars[&Var::slacks],
        &lower_bounds[&Var::slacks],
        &upper_bounds[&Var::slacks],
    )?;

    // Scalar time and parameter bounds.
    writeln!(stream, "\nActive or violated parameter bounds")?;
    writeln!(
        stream,
        "L and U indicate which bound is active; '*' indicates a bound is violated."
    )?;
    writeln!(stream, "The case of lower==upper==value is ignored.")?;

    let time_names = vec!["initial_time".to_string(), "final_time".to_string()];
    let time_values = DMatrix::from_fn(2, 1, |r, _| {
        if r == 0 {
            vars[&Var::initial_time][(0, 0)]
        } else {
            vars[&Var::final_time][(0, 0)]
        }
    });
    let time_lower = DMatrix::from_fn(2, 1, |r, _| {
        if r == 0 {
            lower_bounds[&Var::initial_time][(0, 0)]
        } else {
            lower_bounds[&Var::final_time][(0, 0)]
        }
    });
    let time_upper = DMatrix::from_fn(2, 1, |r, _| {
        if r == 0 {
            upper_bounds[&Var::initial_time][(0, 0)]
        } else {
            upper_bounds[&Var::final_time][(0, 0)]
        }
    });
    print_scalar_bounds(stream, width, "Time bounds", &time_names, &time_values, &time_lower, &time_upper)?;
    print_scalar_bounds(
        stream,
        width,
        "Parameter bounds",
        &problem.parameter_names(),
        &vars[&Var::parameters],
        &lower_bounds[&Var::parameters],
        &upper_bounds[&Var::parameters],
    )?;

    writeln!(stream, "\nTotal number of constraints: {}.", num_constraints)?;

    // Differential equation defects.
    writeln!(stream, "\nDifferential equation defects:")?;
    writeln!(
        stream,
        "  L2 norm across mesh, max abs value (L1 norm), time of max abs"
    )?;
    let ns = state_names.len();
    for r in 0..constraints.defects.nrows() {
        let label = if ns > 0 {
            format!("{:02}:{}", r, state_names[r % ns])
        } else {
            format!("{:02}", r)
        };
        let (l2, l1, argmax) = row_norms(&constraints.defects, r);
        writeln!(
            stream,
            "{:>width$}       {:>10.2e}       {:>10.2e}       {:.6}",
            label,
            l2,
            l1,
            mesh_times[argmax],
            width = width + 3
        )?;
    }

    // Kinematic constraints.
    write!(stream, "\nKinematic constraints:")?;
    let kincon_names: Vec<String> = if multiplier_names.len() == constraints.kinematic.nrows() {
        multiplier_names.clone()
    } else {
        (0..constraints.kinematic.nrows())
            .map(|i| format!("kc_{:02}", i))
            .collect()
    };
    if kincon_names.is_empty() {
        writeln!(stream, " none")?;
    } else {
        writeln!(stream)?;
        writeln!(
            stream,
            "  L2 norm across mesh, max abs value (L1 norm), time of max abs"
        )?;
        for r in 0..constraints.kinematic.nrows() {
            let (l2, l1, argmax) = row_norms(&constraints.kinematic, r);
            writeln!(
                stream,
                "{:02}:{:>width$}       {:>10.2e}       {:>10.2e}       {:.6}",
                r,
                kincon_names[r],
                l2,
                l1,
                mesh_times[argmax],
                width = width
            )?;
        }
        writeln!(stream, "Kinematic constraint values at each mesh point:")?;
        write!(stream, "      time  ")?;
        for r in 0..constraints.kinematic.nrows() {
            write!(stream, "{:>10}  ", r)?;
        }
        writeln!(stream)?;
        for imesh in 0..constraints.kinematic.ncols() {
            write!(stream, "{:03}  {:>10.6}  ", imesh, mesh_times[imesh])?;
            for r in 0..constraints.kinematic.nrows() {
                write!(stream, "{:>10.2e}  ", constraints.kinematic[(r, imesh)])?;
            }
            writeln!(stream)?;
        }
    }

    // Path constraints.
    write!(stream, "\nPath constraints:")?;
    if problem.path_constraint_infos.is_empty() {
        writeln!(stream, " none")?;
        return Ok(());
    }
    writeln!(stream)?;
    writeln!(
        stream,
        "  L2 norm across mesh, max abs value (L1 norm), time of max abs"
    )?;
    for (ipc, info) in problem.path_constraint_infos.iter().enumerate() {
        let block = &constraints.path[ipc];
        for ieq in 0..info.size {
            let label = format!("{}_{:02}", info.name, ieq);
            let (l2, l1, argmax) = row_norms(block, ieq);
            writeln!(
                stream,
                "{:02}:{:>width$}       {:>10.2e}       {:>10.2e}       {:.6}",
                ipc,
                label,
                l2,
                l1,
                mesh_times[argmax],
                width = width + 3
            )?;
        }
    }
    for (ipc, info) in problem.path_constraint_infos.iter().enumerate() {
        let block = &constraints.path[ipc];
        writeln!(
            stream,
            "Path constraint '{}' values at each mesh point:",
            info.name
        )?;
        write!(stream, "      time  ")?;
        for ieq in 0..info.size {
            write!(stream, "{:>10}  ", ieq)?;
        }
        writeln!(stream)?;
        for imesh in 0..block.ncols() {
            write!(stream, "{:03}  {:>10.6}  ", imesh, mesh_times[imesh])?;
            for ieq in 0..info.size {
                write!(stream, "{:>10.2e}  ", block[(ieq, imesh)])?;
            }
            writeln!(stream)?;
        }
    }
    Ok(())
}

/// L2 norm, max absolute value and its column for one row of a constraint table
fn row_norms(block: &DMatrix<f64>, row: usize) -> (f64, f64, usize) {
    let mut l2 = 0.0;
    let mut l1 = 0.0;
    let mut argmax = 0;
    for c in 0..block.ncols() {
        let v = block[(row, c)];
        l2 += v * v;
        if v.abs() > l1 {
            l1 = v.abs();
            argmax = c;
        }
    }
    (l2.sqrt(), l1, argmax)
}

fn print_block_bounds<W: Write>(
    stream: &mut W,
    width: usize,
    description: &str,
    names: &[String],
    times: &DVector<f64>,
    values: &DMatrix<f64>,
    lower: &DMatrix<f64>,
    upper: &DMatrix<f64>,
) -> io::Result<()> {
    write!(stream, "\n{}: ", description)?;

    let mut bounds_active = false;
    let mut bounds_violated = false;
    for r in 0..values.nrows() {
        for c in 0..values.ncols() {
            let (l, v, u) = (lower[(r, c)], values[(r, c)], upper[(r, c)]);
            if v <= l || v >= u {
                if v == l && l == u {
                    continue;
                }
                bounds_active = true;
                if v < l || v > u {
                    bounds_violated = true;
                }
            }
        }
    }
    if !bounds_active && !bounds_violated {
        writeln!(stream, "no bounds active or violated")?;
        return Ok(());
    }
    if !bounds_violated {
        writeln!(stream, "some bounds active but no bounds violated")?;
    } else {
        writeln!(stream, "some bounds active or violated")?;
    }
    writeln!(
        stream,
        "{:>width$}  {:>10}  {:>10}    {:>10}    {:>10}",
        "",
        "time",
        "lower",
        "value",
        "upper",
        width = width
    )?;
    for r in 0..values.nrows() {
        for c in 0..values.ncols() {
            let (l, v, u) = (lower[(r, c)], values[(r, c)], upper[(r, c)]);
            if v <= l || v >= u {
                // lower==upper==value is a pinned variable sitting exactly where it
                // must; not an issue
                if v == l && l == u {
                    continue;
                }
                write!(
                    stream,
                    "{:>width$}  {:>10.2e}  {:>10.2e} <= {:>10.2e} <= {:>10.2e} ",
                    names[r],
                    times[c],
                    l,
                    v,
                    u,
                    width = width
                )?;
                write!(stream, "{}", if v <= l { "L" } else { " " })?;
                write!(stream, "{}", if v >= u { "U" } else { " " })?;
                if v < l || v > u {
                    write!(stream, "*")?;
                }
                writeln!(stream)?;
            }
        }
    }
    Ok(())
}

fn print_scalar_bounds<W: Write>(
    stream: &mut W,
    width: usize,
    description: &str,
    names: &[String],
    values: &DMatrix<f64>,
    lower: &DMatrix<f64>,
    upper: &DMatrix<f64>,
) -> io::Result<()> {
    write!(stream, "\n{}: ", description)?;

    let mut bounds_active = false;
    let mut bounds_violated = false;
    for r in 0..values.nrows() {
        let (l, v, u) = (lower[(r, 0)], values[(r, 0)], upper[(r, 0)]);
        if v <= l || v >= u {
            if v == l && l == u {
                continue;
            }
            bounds_active = true;
            if v < l || v > u {
                bounds_violated = true;
            }
        }
    }
    if !bounds_active && !bounds_violated {
        writeln!(stream, "no bounds active or violated")?;
        return Ok(());
    }
    if !bounds_violated {
        writeln!(stream, "some bounds active but no bounds violated")?;
    } else {
        writeln!(stream, "some bounds active or violated")?;
    }
    writeln!(
        stream,
        "{:>width$}  {:>10}    {:>10}    {:>10}",
        "",
        "lower",
        "value",
        "upper",
        width = width
    )?;
    for r in 0..values.nrows() {
        let (l, v, u) = (lower[(r, 0)], values[(r, 0)], upper[(r, 0)]);
        if v <= l || v >= u {
            if v == l && l == u {
                continue;
            }
            write!(
                stream,
                "{:>width$}  {:>10.2e} <= {:>10.2e} <= {:>10.2e} ",
                names[r],
                l,
                v,
                u,
                width = width
            )?;
            write!(stream, "{}", if v <= l { "L" } else { " " })?;
            write!(stream, "{}", if v >= u { "U" } else { " " })?;
            if v < l || v > u {
                write!(stream, "*")?;
            }
            writeln!(stream)?;
        }
    }
    Ok(())
}
