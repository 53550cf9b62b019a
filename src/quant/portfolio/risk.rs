//! # Historical Risk
//!
//! $$
//! \mathrm{VaR}_{c}=Q_{1-c}\big(\{r_{p,t}\}\big),\qquad
//! \mathrm{CVaR}_{c}=\mathbb E\left[r_{p,t}\mid r_{p,t}\le\mathrm{VaR}_c\right]
//! $$
//!
//! Non-parametric tail risk of a fixed allocation, reported as daily returns (a loss is negative).

use ordered_float::OrderedFloat;

use super::data::ReturnStatistics;
use super::error::PortfolioError;
use super::error::Result;
use super::performance::PerformanceEvaluator;
use super::types::Metric;
use super::types::RiskSummary;

fn check_confidence(confidence: f64) -> Result<()> {
  if !(confidence > 0.0 && confidence < 1.0) {
    return Err(PortfolioError::InvalidParameter(format!(
      "confidence must lie in (0, 1), got {confidence}"
    )));
  }
  Ok(())
}

/// `q`-quantile with linear interpolation between order statistics at rank `q * (n - 1)`.
pub fn percentile(values: &[f64], q: f64) -> Result<f64> {
  if values.is_empty() {
    return Err(PortfolioError::InsufficientData {
      required: 1,
      actual: 0,
    });
  }
  if !(0.0..=1.0).contains(&q) {
    return Err(PortfolioError::InvalidParameter(format!(
      "quantile must lie in [0, 1], got {q}"
    )));
  }

  let mut sorted: Vec<OrderedFloat<f64>> = values.iter().copied().map(OrderedFloat).collect();
  sorted.sort();

  let rank = q * (sorted.len() - 1) as f64;
  let lo = rank.floor() as usize;
  let hi = rank.ceil() as usize;
  let frac = rank - lo as f64;

  Ok(sorted[lo].0 + frac * (sorted[hi].0 - sorted[lo].0))
}

/// 1-period historical VaR: the `1 - confidence` percentile of `returns`.
pub fn historical_var(returns: &[f64], confidence: f64) -> Result<f64> {
  check_confidence(confidence)?;
  percentile(returns, 1.0 - confidence)
}

/// Mean of the returns at or below the historical VaR.
pub fn historical_cvar(returns: &[f64], confidence: f64) -> Result<f64> {
  let var = historical_var(returns, confidence)?;
  let tail: Vec<f64> = returns.iter().copied().filter(|&r| r <= var).collect();

  if tail.is_empty() {
    return Ok(var);
  }
  Ok(tail.iter().sum::<f64>() / tail.len() as f64)
}

/// Annualized moments and historical tail risk of `weights`.
pub fn risk_summary(
  weights: &[f64],
  stats: &ReturnStatistics,
  confidence: f64,
  trading_days: usize,
) -> Result<RiskSummary> {
  check_confidence(confidence)?;

  let eval = PerformanceEvaluator::new(stats, 0.0, Metric::Sharpe).with_trading_days(trading_days);
  let daily = stats.portfolio_returns(weights)?.to_vec();

  Ok(RiskSummary {
    annualized_return: eval.annualized_return(weights)?,
    annualized_volatility: eval.annualized_volatility(weights)?,
    var: historical_var(&daily, confidence)?,
    cvar: historical_cvar(&daily, confidence)?,
    mean_daily_return: daily.iter().sum::<f64>() / daily.len() as f64,
    confidence,
  })
}
