use anyhow::{Context, Result};
use itertools::Itertools;
use plotly::{common::Mode, layout::Axis, Layout, Plot, Scatter};
use std::path::Path;

use crate::frontier::FrontierPoint;
use crate::mad::{Optimization, DISPLAY_THRESHOLD};
use crate::solver_log::PortfolioEntry;

fn hover_text(point: &FrontierPoint) -> String {
    match &point.result {
        Optimization::Optimal(allocation) => format!(
            "Target {:.4}: {}",
            point.target_return,
            allocation
                .significant_weights(DISPLAY_THRESHOLD)
                .iter()
                .map(|w| format!("{} {:.2}%", w.asset, w.weight * 100.0))
                .join(", ")
        ),
        Optimization::NotOptimal { status, .. } => {
            format!("Target {:.4}: {}", point.target_return, status)
        }
    }
}

fn entry_hover_text(entry: &PortfolioEntry) -> String {
    format!(
        "Return {:.4}: {}",
        entry.expected_return,
        entry
            .weights
            .iter()
            .filter(|(_, w)| *w > DISPLAY_THRESHOLD)
            .map(|(asset, w)| format!("{} {:.2}%", asset, w * 100.0))
            .join(", ")
    )
}

fn risk_return_plot(
    risks: Vec<Option<f64>>,
    returns: Vec<Option<f64>>,
    hover: Vec<String>,
) -> Plot {
    let scatter = Scatter::new(risks, returns)
        .mode(Mode::LinesMarkers)
        .name("Efficient Frontier")
        .hover_text_array(hover);

    let mut plot = Plot::new();

    plot.add_trace(scatter);
    let layout = Layout::new()
        .title("<b>Efficient Frontier of MAD Model</b>".into())
        .x_axis(Axis::new().title("MAD Risk".into()))
        .y_axis(Axis::new().title("Expected Return".into()));
    plot.set_layout(layout);

    plot
}

fn write_plot(path: &Path, plot: &Plot) -> Result<()> {
    std::fs::write(path, plot.to_html())
        .with_context(|| format!("could not write plot '{}'", path.display()))
}

/// Risk on x, return on y; non-optimal points are left as gaps in the line.
pub fn frontier_plot(points: &[FrontierPoint]) -> Plot {
    let (risks, returns) = points
        .iter()
        .map(|p| match p.risk_return() {
            Some(rr) => (Some(rr.risk), Some(rr.expected_return)),
            None => (None, None),
        })
        .unzip();

    risk_return_plot(risks, returns, points.iter().map(hover_text).collect_vec())
}

/// Same chart drawn from portfolios read back out of a solver log.
pub fn portfolio_plot(entries: &[PortfolioEntry]) -> Plot {
    let (risks, returns) = entries
        .iter()
        .map(|e| (Some(e.mad_risk), Some(e.expected_return)))
        .unzip();

    risk_return_plot(
        risks,
        returns,
        entries.iter().map(entry_hover_text).collect_vec(),
    )
}

pub fn write_frontier_plot(path: &Path, points: &[FrontierPoint]) -> Result<()> {
    write_plot(path, &frontier_plot(points))
}

pub fn write_portfolio_plot(path: &Path, entries: &[PortfolioEntry]) -> Result<()> {
    write_plot(path, &portfolio_plot(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mad::{Allocation, AssetWeight, SolveStatus};

    fn points() -> Vec<FrontierPoint> {
        vec![
            FrontierPoint {
                target_return: 0.01,
                result: Optimization::Optimal(Allocation {
                    weights: vec![AssetWeight {
                        asset: "Bonds".to_string(),
                        weight: 1.0,
                    }],
                    expected_return: 0.011,
                    risk_measure: 0.002,
                }),
            },
            FrontierPoint {
                target_return: 0.05,
                result: Optimization::NotOptimal {
                    status: SolveStatus::Infeasible,
                    message: "Optimization did not succeed".to_string(),
                },
            },
        ]
    }

    #[test]
    fn placeholders_become_gaps() {
        let json: serde_json::Value =
            serde_json::from_str(&frontier_plot(&points()).to_json()).unwrap();
        let trace = &json["data"][0];

        assert_eq!(trace["x"], serde_json::json!([0.002, null]));
        assert_eq!(trace["y"], serde_json::json!([0.011, null]));
        assert!(trace.to_string().contains("Target 0.0100: Bonds 100.00%"));
        assert!(trace.to_string().contains("Target 0.0500: Infeasible"));
    }

    #[test]
    fn plot_is_written_as_html() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frontier.html");

        write_frontier_plot(&path, &points()).unwrap();

        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("Efficient Frontier of MAD Model"));
    }

    #[test]
    fn log_portfolios_are_plotted() {
        let entries = vec![
            PortfolioEntry {
                expected_return: 0.01,
                mad_risk: 0.002,
                weights: vec![("Bonds".to_string(), 1.0), ("Stocks".to_string(), 0.0)],
            },
            PortfolioEntry {
                expected_return: 0.02,
                mad_risk: 0.006,
                weights: vec![("Bonds".to_string(), 0.5), ("Stocks".to_string(), 0.5)],
            },
        ];

        let json: serde_json::Value =
            serde_json::from_str(&portfolio_plot(&entries).to_json()).unwrap();
        let trace = &json["data"][0];

        assert_eq!(trace["x"], serde_json::json!([0.002, 0.006]));
        assert_eq!(trace["y"], serde_json::json!([0.01, 0.02]));
        assert!(trace.to_string().contains("Return 0.0100: Bonds 100.00%\""));
        assert!(trace
            .to_string()
            .contains("Return 0.0200: Bonds 50.00%, Stocks 50.00%"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frontier.html");
        write_portfolio_plot(&path, &entries).unwrap();

        assert!(path.exists());
    }
}
