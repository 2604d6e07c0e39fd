//! Persisted output of a run: one JSON record per solve, plus the plain text
//! solver log in the layout `solver_log` knows how to read back.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::frontier::FrontierPoint;
use crate::mad::{Optimization, DISPLAY_THRESHOLD};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveRecord {
    pub iteration: usize,
    pub target_return: f64,
    pub result: Optimization,
}

impl SolveRecord {
    pub fn from_points(points: &[FrontierPoint]) -> Vec<SolveRecord> {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| SolveRecord {
                iteration: i + 1,
                target_return: p.target_return,
                result: p.result.clone(),
            })
            .collect()
    }
}

pub fn write_records(path: &Path, records: &[SolveRecord]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("could not create '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);

    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    Ok(())
}

pub fn read_records(path: &Path) -> Result<Vec<SolveRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("could not open '{}'", path.display()))?;

    BufReader::new(file)
        .lines()
        .enumerate()
        .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
        .map(|(i, line)| {
            let line = line?;
            serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: malformed solve record", path.display(), i + 1))
        })
        .collect()
}

/// One block per solve, each closed by `End of Portfolio`.
pub fn render_solver_log(records: &[SolveRecord]) -> String {
    let mut out = String::new();

    for record in records {
        out.push_str(&format!(
            "Iteration {}: target return {:.4}\n",
            record.iteration, record.target_return
        ));
        out.push_str(&format!("Status: {}\n", record.result.status()));

        match &record.result {
            Optimization::Optimal(allocation) => {
                out.push_str(&format!(
                    "Expected Return: {:.4}\n",
                    allocation.expected_return
                ));
                out.push_str(&format!(
                    "MAD Risk Measure: {:.4}\n",
                    allocation.risk_measure
                ));
                out.push_str("Optimal Portfolio Weights:\n");
                for w in allocation.significant_weights(DISPLAY_THRESHOLD) {
                    out.push_str(&format!("{} {:.4}\n", w.asset, w.weight));
                }
            }
            Optimization::NotOptimal { message, .. } => {
                out.push_str(&format!("{message}\n"));
            }
        }

        out.push_str("End of Portfolio\n\n");
    }

    out
}

pub fn write_solver_log(path: &Path, records: &[SolveRecord]) -> Result<()> {
    std::fs::write(path, render_solver_log(records))
        .with_context(|| format!("could not write '{}'", path.display()))
}
