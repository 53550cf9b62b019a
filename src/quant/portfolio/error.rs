//! # Portfolio Errors
//!
//! Failure kinds of the allocation pipeline. Data errors abort a run; a degenerate
//! risk figure is recovered inside the search and only surfaced for the final allocation.

use thiserror::Error;

use super::types::Metric;

/// Errors raised while building return statistics, evaluating or optimizing an allocation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
  /// No assets were supplied.
  #[error("empty universe: at least one asset is required")]
  EmptyUniverse,

  /// Not enough valid price rows to form a single return observation.
  #[error("insufficient data: need at least {required} valid observations, got {actual}")]
  InsufficientData { required: usize, actual: usize },

  /// The risk denominator of the selected metric is zero (or undefined) for an allocation.
  #[error("degenerate risk: {metric} denominator is zero for this allocation")]
  DegenerateRisk { metric: Metric },

  #[error("dimension mismatch: expected {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("duplicate ticker: {0}")]
  DuplicateTicker(String),

  #[error("unknown metric: {0}")]
  UnknownMetric(String),

  #[error("invalid parameter: {0}")]
  InvalidParameter(String),

  /// The constrained solver failed before producing an iterate.
  #[error("solver failure: {0}")]
  Solver(String),
}

pub type Result<T> = std::result::Result<T, PortfolioError>;
