//! # Portfolio Data Utilities
//!
//! $$
//! r_{t,a}=\frac{P_{t,a}}{P_{t-1,a}}-1,\qquad
//! \Sigma=\frac{1}{T-1}\sum_{t=1}^{T}(r_t-\bar r)(r_t-\bar r)^\top
//! $$
//!
//! Price matrix container and the return statistics consumed by the evaluator.

use std::collections::HashSet;

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;

use super::error::PortfolioError;
use super::error::Result;

fn validate_universe(tickers: &[String], n_columns: usize) -> Result<()> {
  if tickers.is_empty() {
    return Err(PortfolioError::EmptyUniverse);
  }

  if tickers.len() != n_columns {
    return Err(PortfolioError::DimensionMismatch {
      expected: tickers.len(),
      actual: n_columns,
    });
  }

  let mut seen = HashSet::with_capacity(tickers.len());
  for ticker in tickers {
    if !seen.insert(ticker.as_str()) {
      return Err(PortfolioError::DuplicateTicker(ticker.clone()));
    }
  }

  Ok(())
}

fn is_valid_price(p: f64) -> bool {
  p.is_finite() && p > 0.0
}

/// Dates x assets matrix of close prices. Missing observations are stored as `NaN`.
#[derive(Clone, Debug)]
pub struct PriceMatrix {
  tickers: Vec<String>,
  dates: Option<Vec<NaiveDate>>,
  prices: Array2<f64>,
}

impl PriceMatrix {
  /// Build a price matrix with one column per ticker.
  pub fn new(tickers: Vec<String>, prices: Array2<f64>) -> Result<Self> {
    validate_universe(&tickers, prices.ncols())?;

    Ok(Self {
      tickers,
      dates: None,
      prices,
    })
  }

  /// Attach the row dates. Their count must match the number of price rows.
  pub fn with_dates(mut self, dates: Vec<NaiveDate>) -> Result<Self> {
    if dates.len() != self.prices.nrows() {
      return Err(PortfolioError::DimensionMismatch {
        expected: self.prices.nrows(),
        actual: dates.len(),
      });
    }

    self.dates = Some(dates);
    Ok(self)
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  pub fn dates(&self) -> Option<&[NaiveDate]> {
    self.dates.as_deref()
  }

  pub fn prices(&self) -> ArrayView2<'_, f64> {
    self.prices.view()
  }

  pub fn n_assets(&self) -> usize {
    self.tickers.len()
  }

  pub fn n_rows(&self) -> usize {
    self.prices.nrows()
  }

  /// Rows in which every asset has a positive, finite price.
  pub fn complete_rows(&self) -> usize {
    self
      .prices
      .outer_iter()
      .filter(|row| row.iter().all(|&p| is_valid_price(p)))
      .count()
  }
}

/// Daily returns and their first two moments.
#[derive(Clone, Debug)]
pub struct ReturnStatistics {
  tickers: Vec<String>,
  dates: Option<Vec<NaiveDate>>,
  returns: Array2<f64>,
  mean_returns: Array1<f64>,
  covariance: Array2<f64>,
}

impl ReturnStatistics {
  /// Simple daily returns of `prices`. Rows with an undefined return in any asset are dropped.
  pub fn from_prices(prices: &PriceMatrix) -> Result<Self> {
    validate_universe(&prices.tickers, prices.prices.ncols())?;

    let n = prices.n_assets();
    let raw = &prices.prices;
    let mut flat = Vec::with_capacity(raw.nrows().saturating_sub(1) * n);
    let mut kept_dates = Vec::new();

    for t in 1..raw.nrows() {
      let prev = raw.row(t - 1);
      let curr = raw.row(t);
      let row: Vec<f64> = curr
        .iter()
        .zip(prev.iter())
        .map(|(&c, &p)| {
          if is_valid_price(c) && is_valid_price(p) {
            c / p - 1.0
          } else {
            f64::NAN
          }
        })
        .collect();

      if row.iter().all(|r| r.is_finite()) {
        flat.extend(row);
        if let Some(dates) = &prices.dates {
          kept_dates.push(dates[t]);
        }
      }
    }

    let n_obs = flat.len() / n;
    if n_obs == 0 {
      // no two adjacent rows are complete, so the longest usable run has at most one row
      return Err(PortfolioError::InsufficientData {
        required: 2,
        actual: prices.complete_rows().min(1),
      });
    }

    let returns = Array2::from_shape_vec((n_obs, n), flat)
      .map_err(|e| PortfolioError::InvalidParameter(e.to_string()))?;
    let dates = prices.dates.as_ref().map(|_| kept_dates);

    Self::build(prices.tickers.clone(), dates, returns)
  }

  /// Statistics from an already computed dates x assets return matrix.
  pub fn from_returns(tickers: Vec<String>, returns: Array2<f64>) -> Result<Self> {
    validate_universe(&tickers, returns.ncols())?;

    if returns.nrows() == 0 {
      return Err(PortfolioError::InsufficientData {
        required: 1,
        actual: 0,
      });
    }

    if returns.iter().any(|r| !r.is_finite()) {
      return Err(PortfolioError::InvalidParameter(
        "return matrix contains non-finite values".to_string(),
      ));
    }

    Self::build(tickers, None, returns)
  }

  fn build(
    tickers: Vec<String>,
    dates: Option<Vec<NaiveDate>>,
    returns: Array2<f64>,
  ) -> Result<Self> {
    let mean_returns = returns
      .mean_axis(Axis(0))
      .ok_or(PortfolioError::InsufficientData {
        required: 2,
        actual: 1,
      })?;
    let covariance = sample_covariance(&returns)?;

    Ok(Self {
      tickers,
      dates,
      returns,
      mean_returns,
      covariance,
    })
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  /// Dates of the return rows (the later date of each price pair).
  pub fn dates(&self) -> Option<&[NaiveDate]> {
    self.dates.as_deref()
  }

  /// Dates x assets simple returns.
  pub fn returns(&self) -> ArrayView2<'_, f64> {
    self.returns.view()
  }

  pub fn mean_returns(&self) -> ArrayView1<'_, f64> {
    self.mean_returns.view()
  }

  pub fn covariance(&self) -> ArrayView2<'_, f64> {
    self.covariance.view()
  }

  pub fn n_assets(&self) -> usize {
    self.tickers.len()
  }

  pub fn n_observations(&self) -> usize {
    self.returns.nrows()
  }

  /// Daily portfolio return series `R . w`.
  pub fn portfolio_returns(&self, weights: &[f64]) -> Result<Array1<f64>> {
    if weights.len() != self.n_assets() {
      return Err(PortfolioError::DimensionMismatch {
        expected: self.n_assets(),
        actual: weights.len(),
      });
    }

    Ok(self.returns.dot(&ArrayView1::from(weights)))
  }

  /// Pearson correlation of the asset return columns.
  ///
  /// Entries involving a constant return series are `NaN`.
  pub fn correlation_matrix(&self) -> Result<Array2<f64>> {
    let n = self.n_assets();
    if self.n_observations() < 2 {
      return Ok(Array2::from_elem((n, n), f64::NAN));
    }

    self
      .returns
      .t()
      .pearson_correlation()
      .map_err(|_| PortfolioError::InsufficientData {
        required: 3,
        actual: self.n_observations() + 1,
      })
  }

  /// Growth of one unit invested in each asset, `prod(1 + r)` up to each date.
  pub fn cumulative_returns(&self) -> Array2<f64> {
    let mut growth = self.returns.mapv(|r| 1.0 + r);
    growth.accumulate_axis_inplace(Axis(0), |&prev, curr| *curr *= prev);
    growth
  }
}

/// Sample covariance (denominator `T - 1`) of a dates x assets matrix.
///
/// A single observation leaves the estimator undefined and yields a `NaN` matrix.
pub fn sample_covariance(returns: &Array2<f64>) -> Result<Array2<f64>> {
  let n = returns.ncols();
  let t = returns.nrows();

  if t == 0 {
    return Err(PortfolioError::InsufficientData {
      required: 2,
      actual: 1,
    });
  }

  if t < 2 {
    return Ok(Array2::from_elem((n, n), f64::NAN));
  }

  returns
    .t()
    .cov(1.0)
    .map_err(|_| PortfolioError::InsufficientData {
      required: 2,
      actual: t + 1,
    })
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn tickers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn builds_returns_mean_and_covariance() {
    let prices = PriceMatrix::new(
      tickers(&["AAA", "BBB"]),
      array![[100.0, 50.0], [110.0, 50.0], [99.0, 55.0], [99.0, 49.5]],
    )
    .unwrap();

    let stats = ReturnStatistics::from_prices(&prices).unwrap();
    let r = stats.returns();

    assert_eq!(r.dim(), (3, 2));
    assert_abs_diff_eq!(r[[0, 0]], 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(r[[1, 0]], -0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(r[[1, 1]], 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(r[[2, 1]], -0.1, epsilon = 1e-12);

    assert_abs_diff_eq!(stats.mean_returns()[0], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(stats.mean_returns()[1], 0.0, epsilon = 1e-12);

    // returns: a = [0.1, -0.1, 0], b = [0, 0.1, -0.1]
    let cov = stats.covariance();
    assert_abs_diff_eq!(cov[[0, 0]], 0.01, epsilon = 1e-12);
    assert_abs_diff_eq!(cov[[1, 1]], 0.01, epsilon = 1e-12);
    assert_abs_diff_eq!(cov[[0, 1]], -0.005, epsilon = 1e-12);
    assert_abs_diff_eq!(cov[[1, 0]], cov[[0, 1]], epsilon = 1e-15);
  }

  #[test]
  fn single_price_row_is_insufficient() {
    let prices = PriceMatrix::new(tickers(&["AAA", "BBB"]), array![[100.0, 50.0]]).unwrap();

    assert_eq!(
      ReturnStatistics::from_prices(&prices).unwrap_err(),
      PortfolioError::InsufficientData {
        required: 2,
        actual: 1
      }
    );
  }

  #[test]
  fn empty_universe_is_rejected() {
    let err = PriceMatrix::new(Vec::new(), Array2::zeros((5, 0))).unwrap_err();
    assert_eq!(err, PortfolioError::EmptyUniverse);
  }

  #[test]
  fn ticker_and_column_counts_must_agree() {
    let err = PriceMatrix::new(tickers(&["AAA"]), array![[1.0, 2.0]]).unwrap_err();
    assert_eq!(
      err,
      PortfolioError::DimensionMismatch {
        expected: 1,
        actual: 2
      }
    );

    let err = PriceMatrix::new(tickers(&["AAA", "AAA"]), array![[1.0, 2.0]]).unwrap_err();
    assert_eq!(err, PortfolioError::DuplicateTicker("AAA".to_string()));
  }

  #[test]
  fn rows_touching_missing_prices_are_dropped() {
    let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
    let prices = PriceMatrix::new(
      tickers(&["AAA", "BBB"]),
      array![
        [f64::NAN, 20.0],
        [10.0, 21.0],
        [11.0, 22.0],
        [12.0, f64::NAN],
        [13.0, 24.0],
        [14.0, 25.0]
      ],
    )
    .unwrap()
    .with_dates(vec![d(1), d(2), d(3), d(4), d(5), d(6)])
    .unwrap();

    let stats = ReturnStatistics::from_prices(&prices).unwrap();

    assert_eq!(stats.n_observations(), 2);
    assert_eq!(stats.dates().unwrap(), &[d(3), d(6)]);
    assert_abs_diff_eq!(stats.returns()[[0, 0]], 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(stats.returns()[[1, 1]], 25.0 / 24.0 - 1.0, epsilon = 1e-12);
  }

  #[test]
  fn non_positive_prices_count_as_missing() {
    let prices = PriceMatrix::new(
      tickers(&["AAA"]),
      array![[10.0], [0.0], [-3.0], [12.0]],
    )
    .unwrap();

    assert_eq!(prices.complete_rows(), 2);
    assert_eq!(
      ReturnStatistics::from_prices(&prices).unwrap_err(),
      PortfolioError::InsufficientData {
        required: 2,
        actual: 1
      }
    );
  }

  #[test]
  fn fully_missing_prices_report_no_usable_rows() {
    let prices = PriceMatrix::new(
      tickers(&["AAA", "BBB"]),
      array![[f64::NAN, 1.0], [2.0, f64::NAN], [f64::NAN, 3.0]],
    )
    .unwrap();

    let err = ReturnStatistics::from_prices(&prices).unwrap_err();
    assert_eq!(
      err,
      PortfolioError::InsufficientData {
        required: 2,
        actual: 0
      }
    );
    assert!(err.to_string().contains("got 0"), "{err}");
  }

  #[test]
  fn single_return_row_leaves_covariance_undefined() {
    let prices = PriceMatrix::new(tickers(&["AAA"]), array![[10.0], [11.0]]).unwrap();
    let stats = ReturnStatistics::from_prices(&prices).unwrap();

    assert_eq!(stats.n_observations(), 1);
    assert!(stats.covariance()[[0, 0]].is_nan());
  }

  #[test]
  fn from_returns_validates_input() {
    let err = ReturnStatistics::from_returns(tickers(&["AAA"]), Array2::zeros((0, 1))).unwrap_err();
    assert!(matches!(err, PortfolioError::InsufficientData { .. }));

    let err =
      ReturnStatistics::from_returns(tickers(&["AAA"]), array![[0.01], [f64::NAN]]).unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidParameter(_)));
  }

  #[test]
  fn portfolio_returns_are_weighted_row_sums() {
    let stats = ReturnStatistics::from_returns(
      tickers(&["AAA", "BBB"]),
      array![[0.01, 0.03], [-0.02, 0.02]],
    )
    .unwrap();

    let p = stats.portfolio_returns(&[0.5, 0.5]).unwrap();
    assert_abs_diff_eq!(p[0], 0.02, epsilon = 1e-12);
    assert_abs_diff_eq!(p[1], 0.0, epsilon = 1e-12);

    assert!(matches!(
      stats.portfolio_returns(&[1.0]),
      Err(PortfolioError::DimensionMismatch { .. })
    ));
  }

  #[test]
  fn correlation_of_mirrored_assets_is_minus_one() {
    let stats = ReturnStatistics::from_returns(
      tickers(&["AAA", "BBB"]),
      array![[0.01, -0.01], [0.02, -0.02], [-0.03, 0.03]],
    )
    .unwrap();

    let corr = stats.correlation_matrix().unwrap();
    assert_abs_diff_eq!(corr[[0, 0]], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(corr[[0, 1]], -1.0, epsilon = 1e-12);
  }

  #[test]
  fn cumulative_returns_compound_per_asset() {
    let stats =
      ReturnStatistics::from_returns(tickers(&["AAA"]), array![[0.1], [0.1], [-0.5]]).unwrap();

    let growth = stats.cumulative_returns();
    assert_abs_diff_eq!(growth[[0, 0]], 1.1, epsilon = 1e-12);
    assert_abs_diff_eq!(growth[[1, 0]], 1.21, epsilon = 1e-12);
    assert_abs_diff_eq!(growth[[2, 0]], 0.605, epsilon = 1e-12);
  }
}
