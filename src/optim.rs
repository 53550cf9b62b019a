//! # Optim
//!
//! $$
//! \min_{\mathbf x\in\mathbb R^n} f(\mathbf x)\quad\text{s.t.}\quad
//! \mathbf a^\top\mathbf x=b,\ \ \mathbf l\le\mathbf x\le\mathbf u
//! $$
//!
//! Gradient-based constrained minimization over argmin problem definitions.

pub mod qp;
pub mod slsqp;

pub use slsqp::LinearEquality;
pub use slsqp::Slsqp;
pub use slsqp::SlsqpConfig;
pub use slsqp::SlsqpReport;
pub use slsqp::Termination;
pub use slsqp::central_difference;
