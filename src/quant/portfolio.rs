//! # Portfolio
//!
//! $$
//! \max_{\mathbf w\in\Delta}\ \frac{252\,\mu^\top\mathbf w-r_f}{\sqrt{252}\,\sigma(\mathbf w)}
//! $$
//!
//! Risk-adjusted allocation: return statistics, Sharpe/Sortino evaluation, the long-only
//! optimizer and historical tail risk.

pub mod data;
pub mod engine;
pub mod error;
pub mod optimizers;
pub mod performance;
pub mod risk;
pub mod types;

pub use data::PriceMatrix;
pub use data::ReturnStatistics;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use engine::optimize;
pub use error::PortfolioError;
pub use optimizers::AllocationProblem;
pub use optimizers::DEGENERATE_PENALTY;
pub use optimizers::optimize_allocation;
pub use performance::Performance;
pub use performance::PerformanceEvaluator;
pub use performance::portfolio_performance;
pub use risk::historical_cvar;
pub use risk::historical_var;
pub use risk::risk_summary;
pub use types::AllocationReport;
pub use types::Metric;
pub use types::OptimizationResult;
pub use types::RiskSummary;
pub use types::TRADING_DAYS;
