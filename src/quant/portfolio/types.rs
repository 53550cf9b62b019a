//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}\in\Delta} \frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!
//! Shared enums and result containers for risk-adjusted allocation.

use std::fmt::Display;
use std::str::FromStr;

use super::error::PortfolioError;
use crate::optim::Termination;

/// Trading days per year used for annualization.
pub const TRADING_DAYS: usize = 252;

/// Risk-adjusted performance metric maximized by the optimizer.
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Metric {
  /// Excess return over total volatility.
  #[default]
  Sharpe,
  /// Excess return over the volatility of negative daily returns.
  Sortino,
}

impl Display for Metric {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Metric::Sharpe => write!(f, "Sharpe Ratio"),
      Metric::Sortino => write!(f, "Sortino Ratio"),
    }
  }
}

impl FromStr for Metric {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "sharpe" | "sharpe ratio" | "sharpe_ratio" | "sharpe-ratio" => Ok(Self::Sharpe),
      "sortino" | "sortino ratio" | "sortino_ratio" | "sortino-ratio" => Ok(Self::Sortino),
      _ => Err(PortfolioError::UnknownMetric(s.to_string())),
    }
  }
}

/// Output of the constrained allocation search.
#[derive(Clone, Debug)]
pub struct OptimizationResult {
  /// Long-only, fully invested weights in asset order.
  pub weights: Vec<f64>,
  /// Objective (negated ratio) at `weights`. Penalized candidates carry the penalty value.
  pub objective: f64,
  /// Whether the tolerance-based stopping rule was met at a non-penalized allocation.
  pub converged: bool,
  /// Solver iterations of the selected start.
  pub iterations: u64,
  /// Why the solver stopped.
  pub termination: Termination,
}

/// Portfolio-level risk figures for a fixed allocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct RiskSummary {
  /// `252 * (mu . w)`.
  pub annualized_return: f64,
  /// `sqrt(252) * sqrt(w' Sigma w)`.
  pub annualized_volatility: f64,
  /// Historical 1-day Value-at-Risk: the `1 - confidence` percentile of daily portfolio returns.
  pub var: f64,
  /// Historical 1-day CVaR: mean of the daily portfolio returns at or below `var`.
  pub cvar: f64,
  /// Mean daily portfolio return.
  pub mean_daily_return: f64,
  /// Confidence level used for `var` and `cvar`.
  pub confidence: f64,
}

/// Result of a full optimization request.
#[derive(Clone, Debug)]
pub struct AllocationReport {
  /// Asset identifiers in price-matrix order.
  pub tickers: Vec<String>,
  /// Optimal weights, aligned with `tickers`.
  pub weights: Vec<f64>,
  /// Metric that was maximized.
  pub metric: Metric,
  /// Annual risk-free rate in percent.
  pub risk_free_rate: f64,
  /// Achieved ratio (positive orientation).
  pub score: f64,
  /// Achieved objective, i.e. `-score`.
  pub objective: f64,
  pub converged: bool,
  pub iterations: u64,
  /// Return, volatility and tail risk of the optimal allocation.
  pub risk: RiskSummary,
}

impl AllocationReport {
  pub fn annualized_return(&self) -> f64 {
    self.risk.annualized_return
  }

  pub fn annualized_volatility(&self) -> f64 {
    self.risk.annualized_volatility
  }

  /// 1-day historical VaR at the configured confidence (95% by default).
  pub fn var_1day(&self) -> f64 {
    self.risk.var
  }

  /// Weight assigned to `ticker`, if it is part of the universe.
  pub fn weight_of(&self, ticker: &str) -> Option<f64> {
    self
      .tickers
      .iter()
      .position(|t| t == ticker)
      .map(|idx| self.weights[idx])
  }

  /// `(ticker, weight)` pairs in asset order.
  pub fn allocations(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .tickers
      .iter()
      .map(String::as_str)
      .zip(self.weights.iter().copied())
  }
}
