//! # Risk-Adjusted Performance
//!
//! $$
//! R_p = 252\,\mu^\top\mathbf w,\qquad
//! \sigma_p=\sqrt{252}\sqrt{\mathbf w^\top\Sigma\mathbf w},\qquad
//! S=\frac{R_p-r_f}{\sigma_p}
//! $$
//!
//! Sortino replaces $\sigma_p$ by $\sqrt{252}$ times the standard deviation of the strictly
//! negative daily portfolio returns.

use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::ArrayView1;

use super::data::ReturnStatistics;
use super::error::PortfolioError;
use super::error::Result;
use super::types::Metric;
use super::types::TRADING_DAYS;

/// Annualized risk figures below this are treated as zero.
pub const MIN_RISK: f64 = 1e-12;

/// Breakdown of a single evaluation.
#[derive(ImplNew, Clone, Copy, Debug, PartialEq)]
pub struct Performance {
  pub annualized_return: f64,
  pub annualized_volatility: f64,
  /// Risk-adjusted ratio of the selected metric (positive orientation).
  pub score: f64,
}

/// Scores candidate weight vectors against fixed return statistics.
///
/// Weights are evaluated as given; the budget and bound constraints belong to the optimizer.
#[derive(Clone, Copy, Debug)]
pub struct PerformanceEvaluator<'a> {
  stats: &'a ReturnStatistics,
  risk_free_rate: f64,
  metric: Metric,
  trading_days: f64,
}

impl<'a> PerformanceEvaluator<'a> {
  /// `risk_free_rate` is annual and quoted in percent.
  pub fn new(stats: &'a ReturnStatistics, risk_free_rate: f64, metric: Metric) -> Self {
    Self {
      stats,
      risk_free_rate,
      metric,
      trading_days: TRADING_DAYS as f64,
    }
  }

  pub fn with_trading_days(mut self, trading_days: usize) -> Self {
    self.trading_days = trading_days as f64;
    self
  }

  pub fn stats(&self) -> &'a ReturnStatistics {
    self.stats
  }

  pub fn metric(&self) -> Metric {
    self.metric
  }

  pub fn risk_free_rate(&self) -> f64 {
    self.risk_free_rate
  }

  pub fn n_assets(&self) -> usize {
    self.stats.n_assets()
  }

  fn check_len(&self, weights: &[f64]) -> Result<()> {
    if weights.len() != self.n_assets() {
      return Err(PortfolioError::DimensionMismatch {
        expected: self.n_assets(),
        actual: weights.len(),
      });
    }
    Ok(())
  }

  /// `252 * (mu . w)`.
  pub fn annualized_return(&self, weights: &[f64]) -> Result<f64> {
    self.check_len(weights)?;
    let w = ArrayView1::from(weights);
    Ok(self.trading_days * self.stats.mean_returns().dot(&w))
  }

  /// `sqrt(252) * sqrt(w' Sigma w)`. `NaN` when the covariance is undefined.
  pub fn annualized_volatility(&self, weights: &[f64]) -> Result<f64> {
    self.check_len(weights)?;
    let w = ArrayView1::from(weights);
    let variance = w.dot(&self.stats.covariance().dot(&w));

    if variance.is_nan() {
      return Ok(f64::NAN);
    }
    Ok((variance.max(0.0) * self.trading_days).sqrt())
  }

  /// Annualized population standard deviation of the strictly negative daily portfolio
  /// returns, or `None` when there are none.
  pub fn downside_volatility(&self, weights: &[f64]) -> Result<Option<f64>> {
    let daily = self.stats.portfolio_returns(weights)?;
    let downside: Array1<f64> = daily.iter().copied().filter(|&r| r < 0.0).collect();

    if downside.is_empty() {
      return Ok(None);
    }
    Ok(Some(downside.std(0.0) * self.trading_days.sqrt()))
  }

  fn risk(&self, weights: &[f64], annualized_volatility: f64) -> Result<f64> {
    match self.metric {
      Metric::Sharpe => Ok(annualized_volatility),
      Metric::Sortino => Ok(self.downside_volatility(weights)?.unwrap_or(0.0)),
    }
  }

  /// Annualized return, volatility and the metric's ratio for `weights`.
  ///
  /// Fails with [`PortfolioError::DegenerateRisk`] when the metric's risk figure is zero
  /// or undefined.
  pub fn evaluate(&self, weights: &[f64]) -> Result<Performance> {
    let annualized_return = self.annualized_return(weights)?;
    let annualized_volatility = self.annualized_volatility(weights)?;
    let risk = self.risk(weights, annualized_volatility)?;

    if !(risk.is_finite() && risk > MIN_RISK) {
      return Err(PortfolioError::DegenerateRisk {
        metric: self.metric,
      });
    }

    let score = (annualized_return - self.risk_free_rate / 100.0) / risk;
    Ok(Performance::new(annualized_return, annualized_volatility, score))
  }

  /// Quantity minimized by the optimizer: the negated ratio.
  pub fn objective(&self, weights: &[f64]) -> Result<f64> {
    Ok(-self.evaluate(weights)?.score)
  }
}

/// Negated Sharpe or Sortino ratio of `weights`.
pub fn portfolio_performance(
  weights: &[f64],
  stats: &ReturnStatistics,
  risk_free_rate: f64,
  metric: Metric,
) -> Result<f64> {
  PerformanceEvaluator::new(stats, risk_free_rate, metric).objective(weights)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use approx::assert_relative_eq;
  use ndarray::array;
  use ndarray::Array2;

  use super::*;

  fn two_asset_stats() -> ReturnStatistics {
    ReturnStatistics::from_returns(
      vec!["A".to_string(), "B".to_string()],
      array![
        [0.01, 0.00],
        [-0.02, 0.01],
        [0.03, -0.01],
        [0.01, 0.02],
        [-0.01, 0.00]
      ],
    )
    .unwrap()
  }

  #[test]
  fn sharpe_matches_closed_form() {
    let stats = two_asset_stats();
    let eval = PerformanceEvaluator::new(&stats, 0.0, Metric::Sharpe);

    // mean = 0.004 for both, var(0.5, 0.5) = 0.25 * (3.8e-4 + 1.3e-4 - 2 * 9.5e-5)
    let perf = eval.evaluate(&[0.5, 0.5]).unwrap();
    let ret = 252.0 * 0.004;
    let vol = (252.0_f64 * 8.0e-5).sqrt();

    assert_relative_eq!(perf.annualized_return, ret, max_relative = 1e-10);
    assert_relative_eq!(perf.annualized_volatility, vol, max_relative = 1e-10);
    assert_relative_eq!(perf.score, ret / vol, max_relative = 1e-10);
    assert_relative_eq!(eval.objective(&[0.5, 0.5]).unwrap(), -ret / vol, max_relative = 1e-10);
  }

  #[test]
  fn risk_free_rate_is_annual_percent() {
    let stats = two_asset_stats();
    let base = PerformanceEvaluator::new(&stats, 0.0, Metric::Sharpe)
      .evaluate(&[0.5, 0.5])
      .unwrap();
    let with_rf = PerformanceEvaluator::new(&stats, 2.0, Metric::Sharpe)
      .evaluate(&[0.5, 0.5])
      .unwrap();

    assert_relative_eq!(
      with_rf.score,
      (base.annualized_return - 0.02) / base.annualized_volatility,
      max_relative = 1e-12
    );
  }

  #[test]
  fn sortino_uses_population_std_of_negative_days() {
    let stats = two_asset_stats();
    let eval = PerformanceEvaluator::new(&stats, 0.0, Metric::Sortino);

    // portfolio returns: [0.005, -0.005, 0.01, 0.015, -0.005] -> downside [-0.005, -0.005]
    // has zero dispersion, so look at A alone: downside [-0.02, -0.01]
    let perf = eval.evaluate(&[1.0, 0.0]).unwrap();
    let downside = 0.005 * 252.0_f64.sqrt();
    assert_relative_eq!(perf.score, 252.0 * 0.004 / downside, max_relative = 1e-10);

    assert_eq!(
      eval.evaluate(&[0.5, 0.5]).unwrap_err(),
      PortfolioError::DegenerateRisk {
        metric: Metric::Sortino
      }
    );
  }

  #[test]
  fn sortino_without_negative_days_is_degenerate() {
    let stats =
      ReturnStatistics::from_returns(vec!["UP".to_string()], array![[0.01], [0.02], [0.0]])
        .unwrap();

    let eval = PerformanceEvaluator::new(&stats, 0.0, Metric::Sortino);
    assert_eq!(eval.downside_volatility(&[1.0]).unwrap(), None);
    assert!(matches!(
      eval.objective(&[1.0]),
      Err(PortfolioError::DegenerateRisk { .. })
    ));
  }

  #[test]
  fn single_asset_with_zero_variance_is_degenerate() {
    let stats =
      ReturnStatistics::from_returns(vec!["FLAT".to_string()], Array2::from_elem((6, 1), 0.001))
        .unwrap();

    let eval = PerformanceEvaluator::new(&stats, 0.0, Metric::Sharpe);
    assert_eq!(
      eval.objective(&[1.0]).unwrap_err(),
      PortfolioError::DegenerateRisk {
        metric: Metric::Sharpe
      }
    );
  }

  #[test]
  fn sharpe_is_invariant_to_positive_scaling() {
    let stats = two_asset_stats();
    let eval = PerformanceEvaluator::new(&stats, 0.0, Metric::Sharpe);

    let w = [0.3, 0.7];
    let scaled: Vec<f64> = w.iter().map(|x| x * 3.5).collect();
    let total: f64 = scaled.iter().sum();
    let renormalized: Vec<f64> = scaled.iter().map(|x| x / total).collect();

    let base = eval.objective(&w).unwrap();
    assert_relative_eq!(eval.objective(&scaled).unwrap(), base, max_relative = 1e-12);
    assert_relative_eq!(eval.objective(&renormalized).unwrap(), base, max_relative = 1e-12);
  }

  #[test]
  fn identical_assets_are_interchangeable() {
    let stats = ReturnStatistics::from_returns(
      vec!["A".to_string(), "A2".to_string(), "B".to_string()],
      array![
        [0.01, 0.01, 0.00],
        [-0.02, -0.02, 0.01],
        [0.03, 0.03, -0.01],
        [0.01, 0.01, 0.02],
        [-0.01, -0.01, 0.00]
      ],
    )
    .unwrap();

    for metric in [Metric::Sharpe, Metric::Sortino] {
      let eval = PerformanceEvaluator::new(&stats, 0.0, metric);
      let a = eval.objective(&[0.1, 0.5, 0.4]).unwrap();
      let b = eval.objective(&[0.5, 0.1, 0.4]).unwrap();
      assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }
  }

  #[test]
  fn wrong_weight_length_is_rejected() {
    let stats = two_asset_stats();
    let eval = PerformanceEvaluator::new(&stats, 0.0, Metric::Sharpe);

    assert_eq!(
      eval.objective(&[1.0]).unwrap_err(),
      PortfolioError::DimensionMismatch {
        expected: 2,
        actual: 1
      }
    );
  }

  #[test]
  fn free_function_matches_evaluator() {
    let stats = two_asset_stats();
    let direct = portfolio_performance(&[0.2, 0.8], &stats, 1.0, Metric::Sharpe).unwrap();
    let eval = PerformanceEvaluator::new(&stats, 1.0, Metric::Sharpe);

    assert_eq!(direct, eval.objective(&[0.2, 0.8]).unwrap());
  }
}
