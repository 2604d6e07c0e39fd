use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// One asset's realized periodic returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    pub id: String,
    pub returns: Vec<f64>,
}

impl TimeSeries {
    pub fn new(id: String, returns: Vec<f64>) -> TimeSeries {
        TimeSeries { id, returns }
    }

    pub fn average_returns(&self) -> f64 {
        self.returns.iter().mean()
    }

    /// Deviation of each period's return from the sample mean.
    pub fn deviations(&self) -> Vec<f64> {
        let mean = self.average_returns();

        self.returns.iter().map(|x| x - mean).collect()
    }

    pub fn mean_absolute_deviation(&self) -> f64 {
        self.deviations().iter().map(|d| d.abs()).mean()
    }
}

/// Periods x assets table of returns, stored column-wise.
///
/// Every column has the same, non-zero, number of periods and there is at
/// least one column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<TimeSeries>", into = "Vec<TimeSeries>")]
pub struct ReturnTable {
    timeseries: Vec<TimeSeries>,
}

impl ReturnTable {
    pub fn new(timeseries: Vec<TimeSeries>) -> Result<ReturnTable> {
        let first = timeseries
            .first()
            .ok_or(anyhow!("Return table needs at least one asset column"))?;
        let periods = first.returns.len();

        if periods == 0 {
            return Err(anyhow!("Return table needs at least one period"));
        }

        if let Some(ts) = timeseries.iter().find(|ts| ts.returns.len() != periods) {
            return Err(anyhow!(
                "Asset '{}' has {} periods, expected {}",
                ts.id,
                ts.returns.len(),
                periods
            ));
        }

        if let Some(ts) = timeseries
            .iter()
            .find(|ts| ts.returns.iter().any(|x| !x.is_finite()))
        {
            return Err(anyhow!("Asset '{}' has non-finite returns", ts.id));
        }

        Ok(ReturnTable { timeseries })
    }

    /// Builds a table from row-major data: `rows[t][a]` is asset `a` at period `t`.
    pub fn from_rows(assets: Vec<String>, rows: &[Vec<f64>]) -> Result<ReturnTable> {
        let mut columns = vec![Vec::with_capacity(rows.len()); assets.len()];

        for (t, row) in rows.iter().enumerate() {
            if row.len() != assets.len() {
                return Err(anyhow!(
                    "Row {} has {} values, expected {}",
                    t,
                    row.len(),
                    assets.len()
                ));
            }

            for (column, value) in columns.iter_mut().zip(row) {
                column.push(*value);
            }
        }

        ReturnTable::new(
            assets
                .into_iter()
                .zip(columns)
                .map(|(id, returns)| TimeSeries::new(id, returns))
                .collect(),
        )
    }

    pub fn timeseries(&self) -> &[TimeSeries] {
        &self.timeseries
    }

    pub fn asset_count(&self) -> usize {
        self.timeseries.len()
    }

    pub fn period_count(&self) -> usize {
        self.timeseries[0].returns.len()
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.timeseries.iter().map(|ts| ts.id.as_str())
    }

    pub fn average_returns(&self) -> Vec<f64> {
        self.timeseries.iter().map(|ts| ts.average_returns()).collect()
    }
}

impl TryFrom<Vec<TimeSeries>> for ReturnTable {
    type Error = anyhow::Error;

    fn try_from(timeseries: Vec<TimeSeries>) -> Result<ReturnTable> {
        ReturnTable::new(timeseries)
    }
}

impl From<ReturnTable> for Vec<TimeSeries> {
    fn from(table: ReturnTable) -> Vec<TimeSeries> {
        table.timeseries
    }
}

/// A weighted combination of the table's assets.
pub struct Portfolio {
    final_ts: TimeSeries,
}

impl Portfolio {
    pub fn new(table: &ReturnTable, split: &[f64]) -> Result<Portfolio> {
        if table.asset_count() != split.len() {
            return Err(anyhow!("'table' and 'split' have different lengths"));
        }

        let returns = table.timeseries.iter().zip(split).fold(
            vec![0.0; table.period_count()],
            |mut acc, (ts, weight)| {
                for (i, r) in ts.returns.iter().enumerate() {
                    acc[i] += weight * r
                }
                acc
            },
        );

        let id = table.assets().collect::<Vec<_>>().join("_");

        Ok(Portfolio {
            final_ts: TimeSeries::new(id, returns),
        })
    }

    pub fn average(&self) -> f64 {
        self.final_ts.average_returns()
    }

    pub fn mean_absolute_deviation(&self) -> f64 {
        self.final_ts.mean_absolute_deviation()
    }
}
