use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::mad::SolverSettings;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub optimizer: Optimizer,
    #[serde(default)]
    pub frontier: Frontier,
    #[serde(default)]
    pub report: Report,
    #[serde(default)]
    pub output: Output,
}

/// Where the return series lives and which columns are not assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Data {
    #[serde(default = "default_returns_path")]
    pub returns_path: PathBuf,
    #[serde(default = "default_date_column")]
    pub date_column: String,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Optimizer {
    #[serde(default = "default_target_return")]
    pub target_return: f64,
    #[serde(default = "default_max_iter")]
    pub max_iter: u32,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frontier {
    #[serde(default = "default_min_return")]
    pub min_return: f64,
    #[serde(default = "default_max_return")]
    pub max_return: f64,
    #[serde(default = "default_step")]
    pub step: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    #[serde(default = "default_max_portfolios")]
    pub max_portfolios: usize,
    #[serde(default = "default_weight_threshold")]
    pub weight_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_returns_path() -> PathBuf {
    PathBuf::from("data/01_raw/returns.csv")
}
fn default_date_column() -> String {
    "Date".to_string()
}
fn default_exclude() -> Vec<String> {
    vec!["Market Portfolio.1".to_string()]
}
fn default_target_return() -> f64 {
    0.01
}
fn default_max_iter() -> u32 {
    200
}
fn default_tolerance() -> f64 {
    1e-8
}
fn default_min_return() -> f64 {
    0.0
}
fn default_max_return() -> f64 {
    0.02
}
fn default_step() -> f64 {
    0.0005
}
fn default_max_portfolios() -> usize {
    10
}
fn default_weight_threshold() -> f64 {
    1e-4
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("data/04_outputs")
}

impl Default for Data {
    fn default() -> Self {
        Data {
            returns_path: default_returns_path(),
            date_column: default_date_column(),
            exclude: default_exclude(),
        }
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer {
            target_return: default_target_return(),
            max_iter: default_max_iter(),
            tolerance: default_tolerance(),
            verbose: false,
        }
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Frontier {
            min_return: default_min_return(),
            max_return: default_max_return(),
            step: default_step(),
        }
    }
}

impl Default for Report {
    fn default() -> Self {
        Report {
            max_portfolios: default_max_portfolios(),
            weight_threshold: default_weight_threshold(),
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Output {
            dir: default_output_dir(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let config = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config at '{}'", path.display()))?;

        Config::from_toml(&config)
    }

    pub fn from_toml(text: &str) -> Result<Config> {
        toml::from_str(text).context("config should be a toml file with proper attributes")
    }

    pub fn solver_settings(&self) -> SolverSettings {
        SolverSettings {
            verbose: self.optimizer.verbose,
            max_iter: self.optimizer.max_iter,
            tol_gap_abs: self.optimizer.tolerance,
            tol_gap_rel: self.optimizer.tolerance,
            tol_feas: self.optimizer.tolerance,
        }
    }
}

impl Output {
    pub fn records(&self) -> PathBuf {
        self.dir.join("solves.jsonl")
    }

    pub fn solver_log(&self) -> PathBuf {
        self.dir.join("solver_log.txt")
    }

    pub fn report(&self) -> PathBuf {
        self.dir.join("efficient_frontier_analysis.txt")
    }

    pub fn pdf(&self) -> PathBuf {
        self.dir.join("portfolio_report.pdf")
    }

    pub fn plot(&self) -> PathBuf {
        self.dir.join("efficient_frontier.html")
    }
}
