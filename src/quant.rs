//! # Quant
//!
//! $$
//! S=\frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!
//! Quantitative finance building blocks.

pub mod portfolio;
