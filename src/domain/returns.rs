//! Aligned multi-asset return table.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDateTime;
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::error::AetherError;
use super::metrics::period_returns;
use super::ohlcv::PriceSeries;

/// T x N simple returns, one column per asset, rows on shared timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnMatrix {
    assets: Vec<String>,
    /// Timestamp at the end of each return period; empty when built from raw columns.
    timestamps: Vec<NaiveDateTime>,
    returns: DMatrix<f64>,
}

impl ReturnMatrix {
    /// Inner-join the series on timestamp and take close-to-close returns.
    ///
    /// Assets trading on different calendars are truncated to the timestamps
    /// they all share.
    pub fn from_series(series: &[PriceSeries]) -> Result<Self, AetherError> {
        if series.is_empty() {
            return Err(AetherError::insufficient("return matrix assets", 0, 1));
        }
        check_unique(series.iter().map(|s| s.symbol()))?;

        let mut common: BTreeSet<NaiveDateTime> = series[0].timestamps().into_iter().collect();
        for s in &series[1..] {
            let ts: BTreeSet<NaiveDateTime> = s.timestamps().into_iter().collect();
            common = common.intersection(&ts).copied().collect();
        }

        if common.len() < 2 {
            return Err(AetherError::Alignment {
                reason: format!(
                    "{} timestamps shared across {} series, need at least 2",
                    common.len(),
                    series.len()
                ),
            });
        }

        let mut columns = Vec::with_capacity(series.len());
        for s in series {
            let by_ts: BTreeMap<NaiveDateTime, f64> =
                s.bars().iter().map(|b| (b.timestamp, b.close)).collect();
            let closes: Vec<f64> = common.iter().filter_map(|ts| by_ts.get(ts).copied()).collect();
            if closes.len() < s.len() {
                debug!(
                    symbol = s.symbol(),
                    kept = closes.len(),
                    dropped = s.len() - closes.len(),
                    "truncated to common timestamps"
                );
            }
            columns.push(period_returns(&closes));
        }

        let timestamps: Vec<NaiveDateTime> = common.into_iter().skip(1).collect();
        let assets = series.iter().map(|s| s.symbol().to_string()).collect();
        Ok(ReturnMatrix {
            assets,
            timestamps,
            returns: columns_to_matrix(&columns),
        })
    }

    /// Build from already computed return columns of equal length.
    pub fn from_columns(assets: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self, AetherError> {
        if assets.len() != columns.len() {
            return Err(AetherError::Alignment {
                reason: format!("{} asset names for {} columns", assets.len(), columns.len()),
            });
        }
        if assets.is_empty() {
            return Err(AetherError::insufficient("return matrix assets", 0, 1));
        }
        check_unique(assets.iter().map(String::as_str))?;

        let periods = columns[0].len();
        if let Some((name, col)) = assets
            .iter()
            .zip(&columns)
            .find(|(_, c)| c.len() != periods)
        {
            return Err(AetherError::Alignment {
                reason: format!("{} has {} returns, expected {}", name, col.len(), periods),
            });
        }
        if columns.iter().flatten().any(|r| !r.is_finite()) {
            return Err(AetherError::Data {
                reason: "return columns contain non-finite values".to_string(),
            });
        }

        Ok(ReturnMatrix {
            assets,
            timestamps: Vec::new(),
            returns: columns_to_matrix(&columns),
        })
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn returns(&self) -> &DMatrix<f64> {
        &self.returns
    }

    pub fn n_assets(&self) -> usize {
        self.returns.ncols()
    }

    pub fn n_periods(&self) -> usize {
        self.returns.nrows()
    }

    pub fn mean_returns(&self) -> DVector<f64> {
        let t = self.n_periods().max(1) as f64;
        DVector::from_iterator(
            self.n_assets(),
            self.returns.column_iter().map(|c| c.sum() / t),
        )
    }

    /// Sample covariance (T - 1 denominator).
    pub fn covariance(&self) -> Result<DMatrix<f64>, AetherError> {
        let t = self.n_periods();
        if t < 2 {
            return Err(AetherError::insufficient("covariance periods", t, 2));
        }

        let means = self.mean_returns();
        let mut centered = self.returns.clone();
        for (j, mut col) in centered.column_iter_mut().enumerate() {
            col.add_scalar_mut(-means[j]);
        }
        Ok(centered.transpose() * &centered / (t - 1) as f64)
    }
}

fn check_unique<'a>(names: impl Iterator<Item = &'a str>) -> Result<(), AetherError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(AetherError::configuration(
                "symbols",
                format!("{} appears more than once", name),
            ));
        }
    }
    Ok(())
}

fn columns_to_matrix(columns: &[Vec<f64>]) -> DMatrix<f64> {
    let rows = columns.first().map_or(0, Vec::len);
    DMatrix::from_fn(rows, columns.len(), |r, c| columns[c][r])
}
