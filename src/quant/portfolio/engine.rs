//! # Portfolio Engine
//!
//! $$
//! \mathbf{w}^\* = \operatorname{Optimize}(P, r_f, m)
//! $$
//!
//! Entry point chaining return statistics, the allocation search and the risk summary.

use ndarray::Array2;
use tracing::info;
use tracing::warn;

use super::data::PriceMatrix;
use super::data::ReturnStatistics;
use super::error::PortfolioError;
use super::error::Result;
use super::optimizers::optimize_allocation;
use super::performance::PerformanceEvaluator;
use super::risk::risk_summary;
use super::types::AllocationReport;
use super::types::Metric;
use super::types::TRADING_DAYS;
use crate::optim::SlsqpConfig;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug)]
pub struct PortfolioEngineConfig {
  /// Ratio maximized by [`PortfolioEngine::optimize`].
  pub metric: Metric,
  /// Annual risk-free rate in percent.
  pub risk_free_rate: f64,
  /// Annualization factor.
  pub trading_days: usize,
  /// Confidence level of the historical VaR/CVaR.
  pub var_confidence: f64,
  /// Number of independent start points.
  pub restarts: usize,
  pub solver: SlsqpConfig,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      metric: Metric::Sharpe,
      risk_free_rate: 0.0,
      trading_days: TRADING_DAYS,
      var_confidence: 0.95,
      restarts: 1,
      solver: SlsqpConfig::default(),
    }
  }
}

impl PortfolioEngineConfig {
  /// Reject settings the pipeline cannot run with.
  pub fn validate(&self) -> Result<()> {
    let invalid = |msg: String| Err(PortfolioError::InvalidParameter(msg));

    if !self.risk_free_rate.is_finite() {
      return invalid(format!("risk-free rate must be finite, got {}", self.risk_free_rate));
    }
    if self.trading_days == 0 {
      return invalid("trading_days must be positive".to_string());
    }
    if !(self.var_confidence > 0.0 && self.var_confidence < 1.0) {
      return invalid(format!(
        "var_confidence must lie in (0, 1), got {}",
        self.var_confidence
      ));
    }
    if self.restarts == 0 {
      return invalid("restarts must be at least 1".to_string());
    }

    let s = &self.solver;
    if s.max_iters == 0 {
      return invalid("solver.max_iters must be positive".to_string());
    }
    for (name, value) in [
      ("ftol", s.ftol),
      ("xtol", s.xtol),
      ("fd_step", s.fd_step),
      ("armijo", s.armijo),
    ] {
      if !(value.is_finite() && value > 0.0) {
        return invalid(format!("solver.{name} must be positive, got {value}"));
      }
    }
    if s.armijo >= 1.0 {
      return invalid(format!("solver.armijo must be below 1, got {}", s.armijo));
    }

    Ok(())
  }
}

/// Configured allocation pipeline.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Return statistics of `prices`.
  pub fn statistics(&self, prices: &PriceMatrix) -> Result<ReturnStatistics> {
    ReturnStatistics::from_prices(prices)
  }

  /// Optimal allocation and risk summary for a price matrix.
  pub fn optimize(&self, prices: &PriceMatrix) -> Result<AllocationReport> {
    self.config.validate()?;
    let stats = self.statistics(prices)?;
    self.optimize_statistics(&stats)
  }

  /// Same as [`Self::optimize`] for precomputed statistics.
  ///
  /// Fails with [`PortfolioError::DegenerateRisk`] when the risk denominator vanishes at the
  /// selected allocation.
  pub fn optimize_statistics(&self, stats: &ReturnStatistics) -> Result<AllocationReport> {
    let cfg = &self.config;
    cfg.validate()?;

    let evaluator = PerformanceEvaluator::new(stats, cfg.risk_free_rate, cfg.metric)
      .with_trading_days(cfg.trading_days);
    let result = optimize_allocation(&evaluator, &cfg.solver, cfg.restarts)?;

    let performance = evaluator.evaluate(&result.weights).inspect_err(|e| {
      if matches!(e, PortfolioError::DegenerateRisk { .. }) {
        warn!(
          metric = %cfg.metric,
          weights = ?result.weights,
          "optimal allocation has degenerate risk"
        );
      }
    })?;
    let risk = risk_summary(&result.weights, stats, cfg.var_confidence, cfg.trading_days)?;

    info!(
      metric = %cfg.metric,
      score = performance.score,
      annualized_return = risk.annualized_return,
      annualized_volatility = risk.annualized_volatility,
      var = risk.var,
      converged = result.converged,
      "portfolio optimized"
    );

    Ok(AllocationReport {
      tickers: stats.tickers().to_vec(),
      weights: result.weights,
      metric: cfg.metric,
      risk_free_rate: cfg.risk_free_rate,
      score: performance.score,
      objective: -performance.score,
      converged: result.converged,
      iterations: result.iterations,
      risk,
    })
  }
}

/// Optimize a dates x assets price matrix with the default configuration.
///
/// `risk_free_rate` is annual and quoted in percent.
pub fn optimize(
  tickers: &[String],
  prices: Array2<f64>,
  risk_free_rate: f64,
  metric: Metric,
) -> Result<AllocationReport> {
  if tickers.is_empty() {
    return Err(PortfolioError::EmptyUniverse);
  }

  let prices = PriceMatrix::new(tickers.to_vec(), prices)?;
  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    metric,
    risk_free_rate,
    ..PortfolioEngineConfig::default()
  });
  engine.optimize(&prices)
}
