//! # SLSQP
//!
//! $$
//! \min_{\mathbf x} f(\mathbf x)\quad\text{s.t.}\quad \mathbf a^\top\mathbf x=b,\ \
//! \mathbf l\le\mathbf x\le\mathbf u
//! $$
//!
//! Sequential quadratic programming with a damped BFGS Hessian, an active-set QP
//! subproblem and Armijo backtracking. Iterates stay inside the box.

use std::fmt::Display;

use anyhow::bail;
use argmin::core::CostFunction;
use argmin::core::Error;
use argmin::core::Gradient;
use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::Array2;
use tracing::debug;

use super::qp::solve_qp;

const FEASIBILITY_TOL: f64 = 1e-12;
const BISECTION_ITERS: usize = 200;

/// Solver tolerances and limits.
#[derive(Clone, Copy, Debug)]
pub struct SlsqpConfig {
  pub max_iters: u64,
  /// Tolerance on the predicted decrease and on the change of the objective.
  pub ftol: f64,
  /// Infinity-norm threshold of the search direction.
  pub xtol: f64,
  /// Step of the central finite-difference gradient.
  pub fd_step: f64,
  /// Sufficient-decrease constant of the line search.
  pub armijo: f64,
  pub max_backtracks: usize,
}

impl Default for SlsqpConfig {
  fn default() -> Self {
    Self {
      max_iters: 100,
      ftol: 1e-9,
      xtol: 1e-12,
      fd_step: 1e-6,
      armijo: 1e-4,
      max_backtracks: 40,
    }
  }
}

/// Why the iteration stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
  /// Predicted decrease or objective change fell below `ftol`.
  Converged,
  /// The QP direction vanished.
  StepTooSmall,
  /// No step satisfied the Armijo condition.
  LineSearchFailed,
  MaxItersReached,
}

impl Termination {
  pub fn is_converged(&self) -> bool {
    matches!(self, Termination::Converged | Termination::StepTooSmall)
  }
}

impl Display for Termination {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Termination::Converged => write!(f, "converged"),
      Termination::StepTooSmall => write!(f, "search direction below xtol"),
      Termination::LineSearchFailed => write!(f, "line search failed"),
      Termination::MaxItersReached => write!(f, "maximum iterations reached"),
    }
  }
}

/// Linear equality `coefficients . x = rhs`.
#[derive(ImplNew, Clone, Debug, PartialEq)]
pub struct LinearEquality {
  pub coefficients: Vec<f64>,
  pub rhs: f64,
}

impl LinearEquality {
  /// Full-investment constraint `sum(x) = 1`.
  pub fn budget(n: usize) -> Self {
    Self::new(vec![1.0; n], 1.0)
  }

  fn residual(&self, x: &[f64]) -> f64 {
    dot(&self.coefficients, x) - self.rhs
  }
}

/// Final iterate of a run.
#[derive(Clone, Debug)]
pub struct SlsqpReport {
  pub x: Vec<f64>,
  pub cost: f64,
  pub iterations: u64,
  pub termination: Termination,
}

impl SlsqpReport {
  pub fn converged(&self) -> bool {
    self.termination.is_converged()
  }
}

/// Bound- and equality-constrained minimizer.
#[derive(Clone, Debug)]
pub struct Slsqp {
  config: SlsqpConfig,
  lower: Vec<f64>,
  upper: Vec<f64>,
  equality: Option<LinearEquality>,
}

impl Slsqp {
  pub fn new(config: SlsqpConfig, lower: Vec<f64>, upper: Vec<f64>) -> Self {
    Self {
      config,
      lower,
      upper,
      equality: None,
    }
  }

  pub fn with_equality(mut self, equality: LinearEquality) -> Self {
    self.equality = Some(equality);
    self
  }

  pub fn config(&self) -> &SlsqpConfig {
    &self.config
  }

  fn check_dimensions(&self, n: usize) -> Result<(), Error> {
    if self.lower.len() != n || self.upper.len() != n {
      bail!(
        "bounds have length {}/{} but the start point has length {}",
        self.lower.len(),
        self.upper.len(),
        n
      );
    }
    if let Some(eq) = &self.equality {
      if eq.coefficients.len() != n {
        bail!(
          "equality has {} coefficients but the start point has length {}",
          eq.coefficients.len(),
          n
        );
      }
    }
    for (i, (&lo, &hi)) in self.lower.iter().zip(&self.upper).enumerate() {
      if !lo.is_finite() || !hi.is_finite() || lo > hi {
        bail!("invalid bounds [{lo}, {hi}] for variable {i}");
      }
    }
    Ok(())
  }

  fn clamp(&self, x: &mut [f64]) {
    for ((xi, &lo), &hi) in x.iter_mut().zip(&self.lower).zip(&self.upper) {
      *xi = xi.clamp(lo, hi);
    }
  }

  /// Closest point to `x0` (in the Euclidean sense) satisfying the bounds and the equality.
  pub fn project(&self, x0: &[f64]) -> Result<Vec<f64>, Error> {
    self.check_dimensions(x0.len())?;

    let mut x = x0.to_vec();
    self.clamp(&mut x);

    let Some(eq) = &self.equality else {
      return Ok(x);
    };
    if eq.residual(&x).abs() <= FEASIBILITY_TOL {
      return Ok(x);
    }

    let a = &eq.coefficients;
    let (mut min_phi, mut max_phi) = (0.0, 0.0);
    for i in 0..a.len() {
      let (lo, hi) = (a[i] * self.lower[i], a[i] * self.upper[i]);
      min_phi += lo.min(hi);
      max_phi += lo.max(hi);
    }
    if eq.rhs < min_phi - FEASIBILITY_TOL || eq.rhs > max_phi + FEASIBILITY_TOL {
      bail!(
        "infeasible constraints: equality rhs {} outside attainable range [{min_phi}, {max_phi}]",
        eq.rhs
      );
    }

    // phi(tau) = a . clamp(x0 - tau a) is non-increasing in tau
    let shifted = |tau: f64| -> Vec<f64> {
      let mut y: Vec<f64> = x0.iter().zip(a).map(|(xi, ai)| xi - tau * ai).collect();
      self.clamp(&mut y);
      y
    };
    let phi = |tau: f64| dot(a, &shifted(tau));

    let mut span = 1.0;
    while (phi(-span) < eq.rhs || phi(span) > eq.rhs) && span < 1e300 {
      span *= 2.0;
    }

    let (mut lo, mut hi) = (-span, span);
    for _ in 0..BISECTION_ITERS {
      let mid = 0.5 * (lo + hi);
      if phi(mid) > eq.rhs {
        lo = mid;
      } else {
        hi = mid;
      }
      if hi - lo <= f64::EPSILON * mid.abs().max(1.0) {
        break;
      }
    }

    Ok(shifted(0.5 * (lo + hi)))
  }

  /// Minimize `problem` starting from `x0`.
  ///
  /// The start is first projected onto the feasible set. Errors from the problem abort
  /// the run and are passed through unchanged.
  pub fn minimize<P>(&self, problem: &P, x0: &[f64]) -> Result<SlsqpReport, Error>
  where
    P: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
  {
    let n = x0.len();
    let cfg = &self.config;
    let mut x = self.project(x0)?;
    let mut f = problem.cost(&x)?;
    if !f.is_finite() {
      bail!("objective is not finite at the start point");
    }
    let mut g = Array1::from(problem.gradient(&x)?);
    let mut hessian = Array2::<f64>::eye(n);

    let lower = Array1::from(self.lower.clone());
    let upper = Array1::from(self.upper.clone());
    let eq_coefficients = self.equality.as_ref().map(|eq| Array1::from(eq.coefficients.clone()));

    let mut iterations = 0;
    let report = |x: Vec<f64>, cost: f64, iterations: u64, termination: Termination| {
      debug!(iterations, cost, %termination, "slsqp finished");
      Ok(SlsqpReport {
        x,
        cost,
        iterations,
        termination,
      })
    };

    while iterations < cfg.max_iters {
      let xa = Array1::from(x.clone());
      let lo_shift = &lower - &xa;
      let hi_shift = &upper - &xa;
      let equality = match (&self.equality, &eq_coefficients) {
        (Some(eq), Some(a)) => Some((a, -eq.residual(&x))),
        _ => None,
      };

      let d = solve_qp(&hessian, &g, &lo_shift, &hi_shift, equality);
      let step_norm = d.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
      if step_norm <= cfg.xtol {
        return report(x, f, iterations, Termination::StepTooSmall);
      }

      let slope = g.dot(&d);
      if -slope <= cfg.ftol {
        return report(x, f, iterations, Termination::Converged);
      }

      let mut alpha = 1.0;
      let mut accepted = None;
      for _ in 0..=cfg.max_backtracks {
        let mut candidate: Vec<f64> = x.iter().zip(&d).map(|(xi, di)| xi + alpha * di).collect();
        self.clamp(&mut candidate);
        let fc = problem.cost(&candidate)?;
        if fc.is_finite() && fc <= f + cfg.armijo * alpha * slope {
          accepted = Some((candidate, fc));
          break;
        }
        alpha *= 0.5;
      }
      let Some((x_new, f_new)) = accepted else {
        return report(x, f, iterations, Termination::LineSearchFailed);
      };

      let g_new = Array1::from(problem.gradient(&x_new)?);
      let s = Array1::from(x_new.clone()) - &xa;
      let y = &g_new - &g;
      damped_bfgs_update(&mut hessian, &s, &y);

      iterations += 1;
      let change = (f - f_new).abs();
      x = x_new;
      f = f_new;
      g = g_new;

      let violation = self.equality.as_ref().map_or(0.0, |eq| eq.residual(&x).abs());
      debug!(iterations, cost = f, alpha, step = step_norm, violation, "slsqp iteration");

      if change < cfg.ftol && violation < cfg.ftol {
        return report(x, f, iterations, Termination::Converged);
      }
    }

    report(x, f, iterations, Termination::MaxItersReached)
  }
}

/// Powell-damped BFGS update keeping `b` positive definite.
fn damped_bfgs_update(b: &mut Array2<f64>, s: &Array1<f64>, y: &Array1<f64>) {
  let bs = b.dot(s);
  let sbs = s.dot(&bs);
  let sy = s.dot(y);
  if !(sbs > 0.0 && sbs.is_finite() && sy.is_finite()) {
    return;
  }

  let theta = if sy >= 0.2 * sbs {
    1.0
  } else {
    0.8 * sbs / (sbs - sy)
  };
  let r = theta * y + (1.0 - theta) * &bs;
  let sr = s.dot(&r);
  if !(sr > 0.0 && sr.is_finite()) {
    return;
  }

  let n = s.len();
  for i in 0..n {
    for j in 0..n {
      b[[i, j]] += r[i] * r[j] / sr - bs[i] * bs[j] / sbs;
    }
  }
}

/// Central finite-difference gradient of `problem` at `x`.
pub fn central_difference<P>(problem: &P, x: &[f64], h: f64) -> Result<Vec<f64>, Error>
where
  P: CostFunction<Param = Vec<f64>, Output = f64>,
{
  let mut grad = vec![0.0; x.len()];
  let mut probe = x.to_vec();

  for i in 0..x.len() {
    let xi = probe[i];
    probe[i] = xi + h;
    let f_plus = problem.cost(&probe)?;
    probe[i] = xi - h;
    let f_minus = problem.cost(&probe)?;
    probe[i] = xi;
    grad[i] = (f_plus - f_minus) / (2.0 * h);
  }

  Ok(grad)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b).map(|(x, y)| x * y).sum()
}
