use anyhow::{Context, Result};
use log::info;
use std::path::Path;

use crate::config::Config;
use crate::frontier::{sweep, FrontierPoint};
use crate::mad::{optimize, show_results, Optimization};
use crate::outputs::{write_frontier_plot, write_portfolio_plot};
use crate::pdf::{sections_from_records, write_pdf};
use crate::preprocess;
use crate::records::{read_records, write_records, write_solver_log, SolveRecord};
use crate::report::write_report;
use crate::solver_log::{parse_portfolios, parse_sections, read_log, PortfolioEntry};

fn ensure_output_dir(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.output.dir).with_context(|| {
        format!(
            "could not create output directory '{}'",
            config.output.dir.display()
        )
    })
}

/// Single solve at `target_return`, printed in the solver log layout.
pub fn optimize_target(config: &Config, target_return: f64) -> Result<Optimization> {
    let table = preprocess::main(&config.data)?;
    let result = optimize(&table, target_return, &config.solver_settings())?;

    println!("{}", show_results(&result));

    Ok(result)
}

/// Sweeps the frontier and writes the records, the solver log and the plot.
pub fn trace_frontier(
    config: &Config,
    min: f64,
    max: f64,
    step: f64,
) -> Result<Vec<FrontierPoint>> {
    let table = preprocess::main(&config.data)?;
    let points = sweep(&table, min, max, step, &config.solver_settings())?;

    ensure_output_dir(config)?;

    let records = SolveRecord::from_points(&points);
    write_records(&config.output.records(), &records)?;
    write_solver_log(&config.output.solver_log(), &records)?;
    write_frontier_plot(&config.output.plot(), &points)?;

    let optimal = points.iter().filter(|p| p.risk_return().is_some()).count();
    info!(
        "Frontier traced: {} of {} targets optimal, outputs in '{}'",
        optimal,
        points.len(),
        config.output.dir.display()
    );

    Ok(points)
}

/// Text and PDF reports, either from the run's records or from a plain text
/// solver log. A log also gets its portfolios plotted, since no frontier run
/// drew them.
pub fn write_reports(config: &Config, log: Option<&Path>) -> Result<()> {
    let max = config.report.max_portfolios;

    let (portfolios, sections) = match log {
        Some(path) => {
            let text = read_log(path)?;
            (parse_portfolios(&text, max), parse_sections(&text))
        }
        None => {
            let records = read_records(&config.output.records())?;
            (
                PortfolioEntry::from_records(&records),
                sections_from_records(&records),
            )
        }
    };

    ensure_output_dir(config)?;

    write_report(
        &config.output.report(),
        &portfolios,
        max,
        config.report.weight_threshold,
    )?;
    let pages = write_pdf(&config.output.pdf(), &sections)?;

    if log.is_some() {
        write_portfolio_plot(&config.output.plot(), &portfolios)?;
    }

    info!(
        "Reported {} portfolios, {} sections over {} pdf pages",
        portfolios.len().min(max),
        sections.len(),
        pages
    );

    Ok(())
}

pub fn run(config: &Config) -> Result<()> {
    let frontier = &config.frontier;

    trace_frontier(config, frontier.min_return, frontier.max_return, frontier.step)?;
    write_reports(config, None)?;

    Ok(())
}
