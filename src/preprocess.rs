use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use polars::{lazy::dsl::col, prelude::*};
use std::path::Path;

use crate::config::Data;
use crate::timeseries::{ReturnTable, TimeSeries};

/// Cell contents read as missing values.
pub const NULL_MARKERS: [&str; 7] = ["NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

pub fn load_returns(path: &Path) -> Result<DataFrame> {
    let df = CsvReader::from_path(path)
        .with_context(|| format!("could not open returns file '{}'", path.display()))?
        .has_header(true)
        .with_null_values(Some(NullValues::AllColumns(
            NULL_MARKERS.iter().map(|m| (*m).into()).collect(),
        )))
        .finish()?;

    Ok(df)
}

/// Drops columns with no values at all, then every row with a missing value.
pub fn drop_incomplete(df: DataFrame) -> Result<DataFrame> {
    let empty_columns = df
        .get_columns()
        .iter()
        .filter(|s| s.null_count() == s.len())
        .map(|s| s.name().to_string())
        .collect::<Vec<_>>();

    let mut df = df;
    for name in &empty_columns {
        warn!("Dropping column '{name}': it has no values");
        df = df.drop(name)?;
    }

    let before = df.height();
    let df = df.drop_nulls::<String>(None)?;

    if df.height() < before {
        info!("Dropped {} incomplete rows", before - df.height());
    }

    Ok(df)
}

/// Asset columns are every column except the date column and the excluded ones.
pub fn asset_columns(df: &DataFrame, data: &Data) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .filter(|name| *name != data.date_column && !data.exclude.iter().any(|e| e == name))
        .map(|name| name.to_string())
        .collect()
}

pub fn convert_into_table(df: DataFrame, data: &Data) -> Result<ReturnTable> {
    let assets = asset_columns(&df, data);

    if assets.is_empty() {
        return Err(anyhow!("No asset columns left after dropping non-asset columns"));
    }

    let df = df
        .lazy()
        .select(
            assets
                .iter()
                .map(|name| col(name).cast(DataType::Float64))
                .collect::<Vec<_>>(),
        )
        .collect()?;

    let columns = assets
        .iter()
        .map(|name| {
            df[name.as_str()]
                .f64()?
                .into_iter()
                .map(|x| x.ok_or(anyhow!("Column '{name}' has non-numeric values")))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    // NaN cells are missing values too.
    let complete = (0..df.height())
        .filter(|&t| columns.iter().all(|c| !c[t].is_nan()))
        .collect::<Vec<_>>();

    if complete.len() < df.height() {
        info!(
            "Dropped {} rows holding NaN returns",
            df.height() - complete.len()
        );
    }

    let timeseries = assets
        .into_iter()
        .zip(columns)
        .map(|(name, values)| {
            let values = complete.iter().map(|&t| values[t]).collect();
            TimeSeries::new(name, values)
        })
        .collect();

    ReturnTable::new(timeseries)
}

/// Loads and cleans the configured returns file.
pub fn main(data: &Data) -> Result<ReturnTable> {
    let df = load_returns(&data.returns_path)?;
    let df = drop_incomplete(df)?;
    let table = convert_into_table(df, data)?;

    info!(
        "Loaded {} assets over {} periods from '{}'",
        table.asset_count(),
        table.period_count(),
        data.returns_path.display()
    );

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> Data {
        Data::default()
    }

    #[test]
    fn incomplete_rows_and_empty_columns_are_dropped() {
        let df = df!(
            "Date" => &["2020-01", "2020-02", "2020-03"],
            "A" => &[Some(0.01), None, Some(0.03)],
            "B" => &[Some(0.02), Some(0.01), Some(0.00)],
            "Empty" => &[None::<f64>, None, None],
        )
        .unwrap();

        let df = drop_incomplete(df).unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(df.get_column_names(), vec!["Date", "A", "B"]);
    }

    #[test]
    fn date_and_excluded_columns_are_not_assets() {
        let df = df!(
            "Date" => &["2020-01", "2020-02"],
            "Market Portfolio" => &[0.01, 0.02],
            "Market Portfolio.1" => &[0.01, 0.02],
            "Bonds" => &[0.002, 0.003],
        )
        .unwrap();

        let table = convert_into_table(df, &data()).unwrap();

        assert_eq!(
            table.assets().collect::<Vec<_>>(),
            vec!["Market Portfolio", "Bonds"]
        );
        assert_eq!(table.period_count(), 2);
    }

    #[test]
    fn integer_columns_are_read_as_returns() {
        let df = df!(
            "Date" => &["2020-01", "2020-02"],
            "Flat" => &[0i64, 1],
        )
        .unwrap();

        let table = convert_into_table(df, &data()).unwrap();

        assert_eq!(table.timeseries()[0].returns, vec![0.0, 1.0]);
    }

    #[test]
    fn non_numeric_assets_are_rejected() {
        let df = df!(
            "Date" => &["2020-01", "2020-02"],
            "A" => &["up", "down"],
        )
        .unwrap();

        assert!(convert_into_table(df, &data()).is_err());
    }

    #[test]
    fn nan_rows_are_dropped() {
        let df = df!(
            "Date" => &["2020-01", "2020-02", "2020-03"],
            "A" => &[0.01, f64::NAN, 0.03],
            "B" => &[0.02, 0.01, 0.00],
        )
        .unwrap();

        let table = convert_into_table(df, &data()).unwrap();

        assert_eq!(table.timeseries()[0].returns, vec![0.01, 0.03]);
        assert_eq!(table.timeseries()[1].returns, vec![0.02, 0.00]);
    }

    fn load_with_missing_cell(marker: &str) -> ReturnTable {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("returns.csv");
        std::fs::write(
            &path,
            format!("Date,A,B\n2020-01,0.01,0.02\n2020-02,{marker},0.01\n2020-03,0.03,0.00\n"),
        )
        .unwrap();

        main(&Data {
            returns_path: path,
            ..Data::default()
        })
        .unwrap()
    }

    #[test]
    fn missing_value_markers_drop_the_row() {
        for marker in ["", "NaN", "NA", "nan", "N/A", "null"] {
            let table = load_with_missing_cell(marker);

            assert_eq!(table.period_count(), 2, "marker {marker:?}");
            assert_eq!(table.timeseries()[0].returns, vec![0.01, 0.03]);
        }
    }

    #[test]
    fn table_without_assets_is_rejected() {
        let df = df!("Date" => &["2020-01"]).unwrap();

        assert!(convert_into_table(df, &data()).is_err());
    }
}
