//! Mean-absolute-deviation portfolio optimization.
//!
//! The MAD model of Konno and Yamazaki written as a linear program and handed
//! to Clarabel. With `N` assets and `T` periods the decision vector is
//! `x = [w_1..w_N, d_1..d_T]`, the objective `(1/T) * sum d_t`, and the
//! constraints, in Clarabel's `Ax + s = b` form, are:
//!
//! - zero cone: `sum w = 1`
//! - nonnegative cone, in order: `-mu'w <= -r*`, then for every period
//!   `dev_t'w - d_t <= 0` and `-dev_t'w - d_t <= 0`, then `-w <= 0`, `-d <= 0`.

use anyhow::{anyhow, Result};
use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};
use itertools::Itertools;
use log::{debug, warn};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::timeseries::{Portfolio, ReturnTable};

pub const FAILURE_MESSAGE: &str = "Optimization did not succeed";

/// Allowed gap between the solver's objective and the MAD of the returned weights.
const RISK_TOLERANCE: f64 = 1e-6;

/// Weights below this are treated as zero when displayed.
pub const DISPLAY_THRESHOLD: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    IterationLimit,
    NumericalError,
    Undefined,
}

impl From<SolverStatus> for SolveStatus {
    fn from(status: SolverStatus) -> Self {
        match status {
            SolverStatus::Solved => SolveStatus::Optimal,
            SolverStatus::PrimalInfeasible => SolveStatus::Infeasible,
            SolverStatus::DualInfeasible => SolveStatus::Unbounded,
            SolverStatus::MaxIterations | SolverStatus::MaxTime => SolveStatus::IterationLimit,
            SolverStatus::NumericalError => SolveStatus::NumericalError,
            _ => SolveStatus::Undefined,
        }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolveStatus::Optimal => "Optimal",
            SolveStatus::Infeasible => "Infeasible",
            SolveStatus::Unbounded => "Unbounded",
            SolveStatus::IterationLimit => "Iteration Limit",
            SolveStatus::NumericalError => "Numerical Error",
            SolveStatus::Undefined => "Undefined",
        };

        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct SolverSettings {
    pub verbose: bool,
    pub max_iter: u32,
    pub tol_gap_abs: f64,
    pub tol_gap_rel: f64,
    pub tol_feas: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            verbose: false,
            max_iter: 200,
            tol_gap_abs: 1e-8,
            tol_gap_rel: 1e-8,
            tol_feas: 1e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetWeight {
    pub asset: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub weights: Vec<AssetWeight>,
    pub expected_return: f64,
    pub risk_measure: f64,
}

impl Allocation {
    /// Weights above `threshold`, largest first.
    pub fn significant_weights(&self, threshold: f64) -> Vec<&AssetWeight> {
        self.weights
            .iter()
            .filter(|w| w.weight > threshold)
            .sorted_by_key(|w| std::cmp::Reverse(OrderedFloat(w.weight)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Optimization {
    Optimal(Allocation),
    NotOptimal { status: SolveStatus, message: String },
}

impl Optimization {
    pub fn status(&self) -> SolveStatus {
        match self {
            Optimization::Optimal(_) => SolveStatus::Optimal,
            Optimization::NotOptimal { status, .. } => *status,
        }
    }

    pub fn allocation(&self) -> Option<&Allocation> {
        match self {
            Optimization::Optimal(allocation) => Some(allocation),
            Optimization::NotOptimal { .. } => None,
        }
    }
}

/// Column-wise sparse matrix builder; rows must be pushed in ascending order
/// within a column.
struct CscBuilder {
    rows: usize,
    colptr: Vec<usize>,
    rowval: Vec<usize>,
    nzval: Vec<f64>,
}

impl CscBuilder {
    fn new(rows: usize) -> CscBuilder {
        CscBuilder {
            rows,
            colptr: vec![0],
            rowval: Vec::new(),
            nzval: Vec::new(),
        }
    }

    fn push(&mut self, row: usize, value: f64) {
        if value != 0.0 {
            self.rowval.push(row);
            self.nzval.push(value);
        }
    }

    fn end_column(&mut self) {
        self.colptr.push(self.rowval.len());
    }

    fn build(self) -> CscMatrix<f64> {
        let cols = self.colptr.len() - 1;

        CscMatrix::new(self.rows, cols, self.colptr, self.rowval, self.nzval)
    }
}

/// The LP in Clarabel's standard form.
struct MadProblem {
    p: CscMatrix<f64>,
    q: Vec<f64>,
    a: CscMatrix<f64>,
    b: Vec<f64>,
    cones: Vec<SupportedConeT<f64>>,
}

fn build_problem(table: &ReturnTable, mu: &[f64], target_return: f64) -> MadProblem {
    let n = table.asset_count();
    let t = table.period_count();
    let vars = n + t;

    let return_row = 1;
    let deviation_row = |period: usize| 2 + 2 * period;
    let weight_row = |asset: usize| 2 + 2 * t + asset;
    let aux_row = |period: usize| 2 + 2 * t + n + period;
    let rows = 2 + 3 * t + n;

    let mut a = CscBuilder::new(rows);

    for (asset, ts) in table.timeseries().iter().enumerate() {
        a.push(0, 1.0);
        a.push(return_row, -mu[asset]);
        for (period, x) in ts.returns.iter().enumerate() {
            let dev = x - mu[asset];
            a.push(deviation_row(period), dev);
            a.push(deviation_row(period) + 1, -dev);
        }
        a.push(weight_row(asset), -1.0);
        a.end_column();
    }

    for period in 0..t {
        a.push(deviation_row(period), -1.0);
        a.push(deviation_row(period) + 1, -1.0);
        a.push(aux_row(period), -1.0);
        a.end_column();
    }

    let mut b = vec![0.0; rows];
    b[0] = 1.0;
    b[return_row] = -target_return;

    let mut q = vec![0.0; vars];
    q[n..].iter_mut().for_each(|c| *c = 1.0 / t as f64);

    MadProblem {
        p: CscMatrix::new(vars, vars, vec![0; vars + 1], Vec::new(), Vec::new()),
        q,
        a: a.build(),
        b,
        cones: vec![
            SupportedConeT::ZeroConeT(1),
            SupportedConeT::NonnegativeConeT(rows - 1),
        ],
    }
}

/// Minimizes the portfolio's mean absolute deviation subject to an expected
/// return of at least `target_return`, long-only and fully invested.
///
/// A non-optimal solver status is a regular [`Optimization::NotOptimal`]
/// value; only invalid input or solver setup failures are errors.
pub fn optimize(
    table: &ReturnTable,
    target_return: f64,
    settings: &SolverSettings,
) -> Result<Optimization> {
    if !target_return.is_finite() {
        return Err(anyhow!("Target return must be finite, got {target_return}"));
    }

    let mu = table.average_returns();
    let n = table.asset_count();

    debug!(
        "Solving MAD problem: {} assets, {} periods, average returns {:.6} to {:.6}, target {:.6}",
        n,
        table.period_count(),
        mu.iter().copied().fold(f64::INFINITY, f64::min),
        mu.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        target_return
    );

    let problem = build_problem(table, &mu, target_return);

    let clarabel_settings = DefaultSettingsBuilder::default()
        .verbose(settings.verbose)
        .max_iter(settings.max_iter)
        .tol_gap_abs(settings.tol_gap_abs)
        .tol_gap_rel(settings.tol_gap_rel)
        .tol_feas(settings.tol_feas)
        .build()
        .map_err(|e| anyhow!("Invalid solver settings: {e:?}"))?;

    let mut solver = DefaultSolver::new(
        &problem.p,
        &problem.q,
        &problem.a,
        &problem.b,
        &problem.cones,
        clarabel_settings,
    );
    solver.solve();

    let status = SolveStatus::from(solver.solution.status);
    debug!(
        "Solver finished with status {} after {} iterations",
        status, solver.info.iterations
    );

    if status != SolveStatus::Optimal {
        return Ok(Optimization::NotOptimal {
            status,
            message: FAILURE_MESSAGE.to_string(),
        });
    }

    let x = &solver.solution.x;

    let weights = table
        .assets()
        .zip(&x[..n])
        .map(|(asset, w)| AssetWeight {
            asset: asset.to_string(),
            weight: w.max(0.0),
        })
        .collect::<Vec<_>>();

    let objective: f64 = problem.q.iter().zip(x).map(|(c, v)| c * v).sum();
    let risk_measure = objective.max(0.0);

    let split = weights.iter().map(|w| w.weight).collect::<Vec<_>>();
    let portfolio = Portfolio::new(table, &split)?;
    let expected_return = portfolio.average();

    let realized = portfolio.mean_absolute_deviation();
    if (realized - risk_measure).abs() > RISK_TOLERANCE {
        warn!(
            "Solver objective {risk_measure:.8} differs from realized MAD {realized:.8} at target {target_return:.6}"
        );
    }

    Ok(Optimization::Optimal(Allocation {
        weights,
        expected_return,
        risk_measure,
    }))
}

/// Human readable rendering of a single solve.
pub fn show_results(result: &Optimization) -> String {
    let mut out = String::new();

    out.push_str("\nOptimization Results:\n");
    out.push_str(&"-".repeat(50));
    out.push('\n');
    out.push_str(&format!("Status: {}\n", result.status()));

    match result {
        Optimization::Optimal(allocation) => {
            out.push_str("\nPortfolio Metrics:\n");
            out.push_str(&format!(
                "Expected Return: {:.4}\n",
                allocation.expected_return
            ));
            out.push_str(&format!("Risk Measure: {:.4}\n", allocation.risk_measure));
            out.push_str("\nOptimal Portfolio Weights:\n");

            let weights = allocation.significant_weights(DISPLAY_THRESHOLD);
            let width = weights.iter().map(|w| w.asset.len()).max().unwrap_or(0);
            for w in weights {
                out.push_str(&format!("{:<width$}  {:.4}\n", w.asset, w.weight));
            }
        }
        Optimization::NotOptimal { message, .. } => {
            out.push_str(&format!("\n{message}\n"));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_assets() -> ReturnTable {
        // A is riskless at 1%, B swings around a 2% mean.
        ReturnTable::from_rows(
            vec!["A".to_string(), "B".to_string()],
            &[
                vec![0.01, 0.0],
                vec![0.01, 0.04],
                vec![0.01, 0.0],
                vec![0.01, 0.04],
            ],
        )
        .unwrap()
    }

    fn five_assets() -> ReturnTable {
        ReturnTable::from_rows(
            ["AAA", "BBB", "CCC", "DDD", "EEE"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            &[
                vec![0.012, -0.004, 0.021, 0.005, 0.030],
                vec![-0.008, 0.011, 0.002, 0.006, -0.025],
                vec![0.015, 0.003, -0.012, 0.004, 0.041],
                vec![0.004, 0.009, 0.018, 0.007, -0.010],
                vec![-0.002, -0.006, 0.009, 0.003, 0.022],
                vec![0.010, 0.014, -0.004, 0.005, 0.005],
            ],
        )
        .unwrap()
    }

    fn weight_sum(allocation: &Allocation) -> f64 {
        allocation.weights.iter().map(|w| w.weight).sum()
    }

    #[test]
    fn riskless_and_risky_asset_split_evenly() {
        let result = optimize(&two_assets(), 0.015, &SolverSettings::default()).unwrap();
        let allocation = result.allocation().expect("should be optimal");

        assert_eq!(allocation.weights[0].asset, "A");
        assert!((allocation.weights[0].weight - 0.5).abs() < 1e-4);
        assert!((allocation.weights[1].weight - 0.5).abs() < 1e-4);
        assert!((allocation.expected_return - 0.015).abs() < 1e-6);
        assert!((allocation.risk_measure - 0.01).abs() < 1e-6);
    }

    #[test]
    fn weights_sum_to_one_and_meet_target() {
        let table = five_assets();
        let max_mean = table
            .average_returns()
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max);

        for target in [-0.01, 0.0, 0.004, 0.006, max_mean - 1e-4] {
            let result = optimize(&table, target, &SolverSettings::default()).unwrap();
            let allocation = result.allocation().expect("should be optimal");

            assert!((weight_sum(allocation) - 1.0).abs() < 1e-6);
            assert!(allocation.expected_return >= target - 1e-6);
            assert!(allocation.weights.iter().all(|w| w.weight >= 0.0));
            assert!(allocation.risk_measure >= -1e-9);
        }
    }

    #[test]
    fn risk_measure_matches_realized_deviation() {
        use crate::timeseries::Portfolio;

        let table = five_assets();
        let result = optimize(&table, 0.005, &SolverSettings::default()).unwrap();
        let allocation = result.allocation().unwrap();

        let split = allocation.weights.iter().map(|w| w.weight).collect::<Vec<_>>();
        let portfolio = Portfolio::new(&table, &split).unwrap();

        assert!((portfolio.mean_absolute_deviation() - allocation.risk_measure).abs() < 1e-6);
        assert!((portfolio.average() - allocation.expected_return).abs() < 1e-9);
    }

    #[test]
    fn unreachable_target_is_reported_not_raised() {
        let result = optimize(&two_assets(), 0.03, &SolverSettings::default()).unwrap();

        match result {
            Optimization::NotOptimal { status, message } => {
                assert_ne!(status, SolveStatus::Optimal);
                assert_eq!(message, FAILURE_MESSAGE);
            }
            Optimization::Optimal(_) => panic!("target above every mean should not be optimal"),
        }
    }

    #[test]
    fn single_period_risk_is_not_negative() {
        let table = ReturnTable::from_rows(
            vec!["A".to_string(), "B".to_string()],
            &[vec![0.01, 0.03]],
        )
        .unwrap();

        let result = optimize(&table, 0.02, &SolverSettings::default()).unwrap();
        let allocation = result.allocation().unwrap();

        assert!(allocation.risk_measure >= 0.0);
        assert!(allocation.risk_measure < 1e-6);
        assert!(show_results(&result).contains("Risk Measure: 0.0000"));
    }

    #[test]
    fn non_finite_target_is_an_error() {
        assert!(optimize(&two_assets(), f64::NAN, &SolverSettings::default()).is_err());
    }

    #[test]
    fn constraint_matrix_layout() {
        let table = two_assets();
        let mu = table.average_returns();
        let problem = build_problem(&table, &mu, 0.015);

        // 1 budget row, 1 return row, 2 per period, 1 per weight, 1 per deviation.
        assert_eq!(problem.a.m, 2 + 2 * 4 + 2 + 4);
        assert_eq!(problem.a.n, 2 + 4);
        assert_eq!(problem.b[0], 1.0);
        assert_eq!(problem.b[1], -0.015);
        assert_eq!(problem.q, vec![0.0, 0.0, 0.25, 0.25, 0.25, 0.25]);
    }

    #[test]
    fn display_lists_significant_weights_largest_first() {
        let result = Optimization::Optimal(Allocation {
            weights: vec![
                AssetWeight {
                    asset: "A".to_string(),
                    weight: 0.3,
                },
                AssetWeight {
                    asset: "B".to_string(),
                    weight: 0.00001,
                },
                AssetWeight {
                    asset: "C".to_string(),
                    weight: 0.69999,
                },
            ],
            expected_return: 0.0123,
            risk_measure: 0.0045,
        });

        let text = show_results(&result);

        assert!(text.contains("Status: Optimal"));
        assert!(text.contains("Expected Return: 0.0123"));
        assert!(text.find("C  0.7000").unwrap() < text.find("A  0.3000").unwrap());
        assert!(!text.contains("B  "));
    }

    #[test]
    fn display_failure() {
        let text = show_results(&Optimization::NotOptimal {
            status: SolveStatus::Infeasible,
            message: FAILURE_MESSAGE.to_string(),
        });

        assert!(text.contains("Status: Infeasible"));
        assert!(text.contains(FAILURE_MESSAGE));
    }
}
