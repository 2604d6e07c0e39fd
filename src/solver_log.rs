//! Line-oriented reading of plain text solver logs.
//!
//! The parsers are tolerant: lines they do not recognise are skipped and
//! portfolios missing their return or risk are dropped.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::records::SolveRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioEntry {
    pub expected_return: f64,
    pub mad_risk: f64,
    pub weights: Vec<(String, f64)>,
}

impl PortfolioEntry {
    /// Optimal solves, in record order.
    pub fn from_records(records: &[SolveRecord]) -> Vec<PortfolioEntry> {
        records
            .iter()
            .filter_map(|r| r.result.allocation())
            .map(|a| PortfolioEntry {
                expected_return: a.expected_return,
                mad_risk: a.risk_measure,
                weights: a
                    .weights
                    .iter()
                    .map(|w| (w.asset.clone(), w.weight))
                    .collect(),
            })
            .collect()
    }
}

#[derive(Default)]
struct PartialEntry {
    expected_return: Option<f64>,
    mad_risk: Option<f64>,
    weights: Option<Vec<(String, f64)>>,
}

impl PartialEntry {
    fn finish(self) -> Option<PortfolioEntry> {
        Some(PortfolioEntry {
            expected_return: self.expected_return?,
            mad_risk: self.mad_risk?,
            weights: self.weights.unwrap_or_default(),
        })
    }
}

fn value_after_colon(line: &str) -> Option<f64> {
    line.split_once(':')?.1.trim().parse().ok()
}

fn weight_line() -> Regex {
    Regex::new(r"^(.+)\s+(\d\.\d+)$").expect("weight pattern is valid")
}

/// Extracts at most `max` complete portfolios from a solver log.
pub fn parse_portfolios(text: &str, max: usize) -> Vec<PortfolioEntry> {
    let weight_re = weight_line();
    let mut portfolios = Vec::new();
    let mut current = PartialEntry::default();

    for line in text.lines() {
        if portfolios.len() >= max {
            break;
        }

        let line = line.trim();

        if line.starts_with("Expected Return:") {
            current.expected_return = value_after_colon(line);
        } else if line.starts_with("MAD Risk Measure:") {
            current.mad_risk = value_after_colon(line);
        } else if line.starts_with("Optimal Portfolio Weights:") {
            current.weights = Some(Vec::new());
        } else if line.starts_with("Optimization Status: Optimal")
            || line.starts_with("End of Portfolio")
        {
            if let Some(entry) = std::mem::take(&mut current).finish() {
                portfolios.push(entry);
            }
        } else if let (Some(weights), Some(caps)) =
            (current.weights.as_mut(), weight_re.captures(line))
        {
            if let Ok(weight) = caps[2].parse() {
                weights.push((caps[1].trim().to_string(), weight));
            }
        }
    }

    portfolios
}

/// A titled block of a solver log, with its asset/weight rows split out.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Section {
    pub header: String,
    pub lines: Vec<String>,
    pub weights: Vec<(String, String)>,
}

fn starts_section(line: &str) -> bool {
    line.contains("Iteration") || line.contains("Portfolio Optimization Results")
}

/// Splits a solver log into sections. Text before the first header forms a
/// section of its own.
pub fn parse_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current: Option<Section> = None;
    let mut in_weights = false;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if starts_section(line) || current.is_none() {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            current = Some(Section {
                header: line.to_string(),
                ..Section::default()
            });
            in_weights = false;
            continue;
        }

        let Some(section) = current.as_mut() else {
            continue;
        };

        if line.contains("Weight") {
            in_weights = true;
        } else if line.starts_with("End of Portfolio") {
            in_weights = false;
            continue;
        } else if line.starts_with("Optimization Status") {
            in_weights = false;
        } else if in_weights {
            if let Some((asset, weight)) = line.rsplit_once(char::is_whitespace) {
                section
                    .weights
                    .push((asset.trim().to_string(), weight.to_string()));
                continue;
            }
        }

        section.lines.push(line.to_string());
    }

    if let Some(section) = current {
        sections.push(section);
    }

    sections
}

pub fn read_log(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("could not read log '{}'", path.display()))
}
