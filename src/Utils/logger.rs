use crate::OCP::OCP_iterate::Solution;
use crate::OCP::OCP_variables::Var;

use chrono::Local;
use csv::Writer;
use log::info;
use nalgebra::{DMatrix, DVector};
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::File;
use std::io::{self, Write};

/// Initialize terminal (and optionally file) logging from the configured level.
/// Re-initialization attempts are ignored so repeated solves in one process stay quiet.
pub fn init_logging(loglevel: &Option<String>, save_log: bool) {
    let level = match loglevel.as_deref() {
        None => return,
        Some("off") | Some("none") => return,
        Some("debug") => LevelFilter::Debug,
        Some("info") => LevelFilter::Info,
        Some("warn") => LevelFilter::Warn,
        Some("error") => LevelFilter::Error,
        Some(other) => panic!("loglevel must be debug, info, warn or error, got {}", other),
    };
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if save_log {
        let date_and_time = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let name = format!("log_{}.txt", date_and_time);
        if let Ok(file) = File::create(&name) {
            loggers.push(WriteLogger::new(level, Config::default(), file));
        }
    }
    // a second solve in the same process hits AlreadyInit; that is fine
    let _ = CombinedLogger::init(loggers);
}

/// stack states / controls / multipliers row-wise into one table for export
fn solution_table(solution: &Solution) -> DMatrix<f64> {
    let blocks = [Var::states, Var::controls, Var::multipliers];
    let rows: usize = blocks
        .iter()
        .map(|key| solution.variables[key].nrows())
        .sum();
    let ncols = solution.times.len();
    let mut table = DMatrix::zeros(rows, ncols);
    let mut offset = 0;
    for key in blocks {
        let block = &solution.variables[&key];
        for r in 0..block.nrows() {
            for c in 0..ncols {
                table[(offset + r, c)] = block[(r, c)];
            }
        }
        offset += block.nrows();
    }
    table
}

pub fn save_solution_to_file(
    solution: &Solution,
    headers: &Vec<String>,
    filename: &str,
    arg: &String,
) -> io::Result<()> {
    let table = solution_table(solution);
    let mut file = File::create(filename)?;
    let mut headers_with_t = Vec::new();
    headers_with_t.push(arg.clone());
    headers_with_t.extend(headers.iter().cloned());
    // Write headers
    writeln!(file, "{}", headers_with_t.join("\t"))?;
    let times: &DVector<f64> = &solution.times;
    for c in 0..table.ncols() {
        let mut row_data = Vec::new();
        row_data.push(times[c].to_string());
        row_data.extend((0..table.nrows()).map(|r| table[(r, c)].to_string()));
        writeln!(file, "{}", row_data.join("\t"))?;
    }
    info!("solution saved to {}", filename);
    Ok(())
}

pub fn save_solution_to_csv(
    solution: &Solution,
    headers: &Vec<String>,
    filename: &str,
    arg: &String,
) -> io::Result<()> {
    let table = solution_table(solution);
    let file = File::create(filename)?;
    let mut writer = Writer::from_writer(file);

    // Prepare and write headers
    let mut headers_with_t = Vec::new();
    headers_with_t.push(arg.clone());
    headers_with_t.extend(headers.iter().cloned());
    writer.write_record(&headers_with_t)?;

    // Write data rows, one per time point
    for c in 0..table.ncols() {
        let mut row_data = Vec::new();
        row_data.push(solution.times[c].to_string());
        row_data.extend((0..table.nrows()).map(|r| table[(r, c)].to_string()));
        writer.write_record(&row_data)?;
    }

    writer.flush()?;
    info!("solution saved to {}", filename);
    Ok(())
}
