//! # portfolio-rs
//!
//! $$
//! \mathbf w^\*=\arg\max_{\mathbf w\ge 0,\ \mathbf 1^\top\mathbf w=1} S(\mathbf w)
//! $$
//!
//! Risk-adjusted portfolio allocation over historical prices.
//!
//! - [`quant::portfolio`] builds return statistics, scores allocations by the Sharpe or Sortino
//!   ratio, searches the long-only simplex and reports historical VaR/CVaR.
//! - [`optim`] holds the bound- and equality-constrained SQP solver used by the search.

pub mod optim;
pub mod quant;
