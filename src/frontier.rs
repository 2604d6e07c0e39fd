use anyhow::{anyhow, Result};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::mad::{optimize, Optimization, SolverSettings};
use crate::timeseries::ReturnTable;

/// Upper bound on the number of targets in one sweep.
pub const MAX_GRID_POINTS: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskReturn {
    pub risk: f64,
    pub expected_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub target_return: f64,
    pub result: Optimization,
}

impl FrontierPoint {
    /// The plotted pair, or `None` where the solve was not optimal.
    pub fn risk_return(&self) -> Option<RiskReturn> {
        self.result.allocation().map(|a| RiskReturn {
            risk: a.risk_measure,
            expected_return: a.expected_return,
        })
    }
}

/// Target returns `min_return + i * step` for `i` in `0..ceil((max - min) / step)`.
pub fn target_grid(min_return: f64, max_return: f64, step: f64) -> Result<Vec<f64>> {
    if !min_return.is_finite() || !max_return.is_finite() {
        return Err(anyhow!("Frontier bounds must be finite"));
    }

    if !(step.is_finite() && step > 0.0) {
        return Err(anyhow!("Frontier step must be positive, got {step}"));
    }

    if max_return <= min_return {
        return Ok(Vec::new());
    }

    let count = ((max_return - min_return) / step).ceil();

    if !count.is_finite() || count > MAX_GRID_POINTS as f64 {
        return Err(anyhow!(
            "Frontier step {step} gives more than {MAX_GRID_POINTS} targets in [{min_return}, {max_return})"
        ));
    }
    let count = count as usize;

    Ok((0..count).map(|i| min_return + i as f64 * step).collect())
}

/// Solves once per grid point. Non-optimal solves stay in the sweep as
/// placeholders, in grid order.
pub fn sweep(
    table: &ReturnTable,
    min_return: f64,
    max_return: f64,
    step: f64,
    settings: &SolverSettings,
) -> Result<Vec<FrontierPoint>> {
    let targets = target_grid(min_return, max_return, step)?;

    info!(
        "Tracing frontier over {} target returns in [{}, {})",
        targets.len(),
        min_return,
        max_return
    );

    let mut points = Vec::with_capacity(targets.len());

    let pb = ProgressBar::new(targets.len() as u64);
    for target_return in targets {
        let result = optimize(table, target_return, settings)?;

        match &result {
            Optimization::Optimal(allocation) => debug!(
                "Target {:.6}: return {:.6}, MAD {:.6}",
                target_return, allocation.expected_return, allocation.risk_measure
            ),
            Optimization::NotOptimal { status, .. } => {
                warn!("Target {target_return:.6}: solver status {status}, point skipped")
            }
        }

        points.push(FrontierPoint {
            target_return,
            result,
        });
        pb.inc(1);
    }
    pb.finish();

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ReturnTable {
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

    #[test]
    fn grid_has_ceil_points_and_excludes_upper_bound() {
        assert_eq!(target_grid(0.0, 1.0, 0.25).unwrap(), vec![0.0, 0.25, 0.5, 0.75]);
        assert_eq!(target_grid(0.0, 1.0, 0.3).unwrap().len(), 4);
        assert_eq!(target_grid(0.0, 0.1, 1.0).unwrap(), vec![0.0]);
    }

    #[test]
    fn empty_or_invalid_grids() {
        assert!(target_grid(0.02, 0.01, 0.001).unwrap().is_empty());
        assert!(target_grid(0.01, 0.01, 0.001).unwrap().is_empty());
        assert!(target_grid(0.0, 0.02, 0.0).is_err());
        assert!(target_grid(0.0, 0.02, -0.001).is_err());
        assert!(target_grid(f64::NAN, 0.02, 0.001).is_err());
    }

    #[test]
    fn tiny_steps_are_rejected() {
        assert!(target_grid(0.0, 0.02, 1e-320).is_err());
        assert!(target_grid(0.0, 0.02, 1e-12).is_err());
        assert_eq!(target_grid(0.0, 1e6, 1.0).unwrap().len(), MAX_GRID_POINTS);
        assert!(target_grid(0.0, 1e6 + 1.0, 1.0).is_err());
    }

    #[test]
    fn sweep_keeps_placeholders_in_grid_order() {
        // Means are 1% and 2%: targets from 2.5% on cannot be reached.
        let points = sweep(&table(), 0.0, 0.04, 0.005, &SolverSettings::default()).unwrap();

        assert_eq!(points.len(), ((0.04f64 - 0.0) / 0.005).ceil() as usize);
        assert!(points
            .windows(2)
            .all(|w| w[0].target_return < w[1].target_return));

        for point in &points {
            if point.target_return <= 0.0195 {
                let rr = point.risk_return().expect("reachable target should be optimal");
                assert!(rr.expected_return >= point.target_return - 1e-6);
            } else if point.target_return >= 0.0245 {
                assert!(point.risk_return().is_none());
            }
        }
    }

    #[test]
    fn risk_grows_along_the_frontier() {
        let points = sweep(&table(), 0.01, 0.019, 0.0025, &SolverSettings::default()).unwrap();
        let risks = points
            .iter()
            .filter_map(|p| p.risk_return())
            .map(|rr| rr.risk)
            .collect::<Vec<_>>();

        assert_eq!(risks.len(), 4);
        assert!(risks.windows(2).all(|w| w[1] >= w[0] - 1e-7));
    }
}
