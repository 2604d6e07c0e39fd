use anyhow::{Context, Result};
use std::path::Path;

use crate::solver_log::PortfolioEntry;

const TITLE: &str = "Efficient Frontier Analysis for MAD Model";

/// Renders at most `max` portfolios; weights at or below `threshold` are left out.
pub fn render_report(portfolios: &[PortfolioEntry], max: usize, threshold: f64) -> String {
    let rule = "=".repeat(50);
    let mut out = format!("{TITLE}\n{rule}\n\n");

    for (i, portfolio) in portfolios.iter().take(max).enumerate() {
        out.push_str(&format!("Portfolio {}:\n", i + 1));
        out.push_str(&format!(
            "  Expected Return: {:.4}\n",
            portfolio.expected_return
        ));
        out.push_str(&format!("  MAD Risk Measure: {:.4}\n", portfolio.mad_risk));
        out.push_str("  Weights:\n");
        for (asset, weight) in portfolio.weights.iter().filter(|(_, w)| *w > threshold) {
            out.push_str(&format!("    {asset}: {weight:.4}\n"));
        }
        out.push('\n');
    }

    out.push_str(&rule);
    out.push_str("\nEnd of Report");

    out
}

pub fn write_report(
    path: &Path,
    portfolios: &[PortfolioEntry],
    max: usize,
    threshold: f64,
) -> Result<()> {
    std::fs::write(path, render_report(portfolios, max, threshold))
        .with_context(|| format!("could not write report '{}'", path.display()))
}
