//! # Allocation Optimizer
//!
//! $$
//! \mathbf w^\*=\arg\min_{\mathbf w}\ -S(\mathbf w)\quad\text{s.t.}\quad
//! \mathbf 1^\top\mathbf w=1,\ \ 0\le w_i\le 1
//! $$
//!
//! Long-only, fully invested search for the weights maximizing the Sharpe or Sortino ratio.

use argmin::core::CostFunction;
use argmin::core::Error;
use argmin::core::Gradient;
use rayon::prelude::*;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::error::PortfolioError;
use super::error::Result;
use super::performance::PerformanceEvaluator;
use super::types::OptimizationResult;
use crate::optim::LinearEquality;
use crate::optim::Slsqp;
use crate::optim::SlsqpConfig;
use crate::optim::SlsqpReport;
use crate::optim::Termination;
use crate::optim::central_difference;

/// Objective assigned to allocations whose risk denominator vanishes.
pub const DEGENERATE_PENALTY: f64 = 1e10;

/// Negated risk-adjusted ratio as an argmin problem.
#[derive(Clone, Copy, Debug)]
pub struct AllocationProblem<'a> {
  evaluator: PerformanceEvaluator<'a>,
  fd_step: f64,
}

impl<'a> AllocationProblem<'a> {
  pub fn new(evaluator: PerformanceEvaluator<'a>, fd_step: f64) -> Self {
    Self { evaluator, fd_step }
  }
}

impl CostFunction for AllocationProblem<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, Error> {
    match self.evaluator.objective(x) {
      Ok(value) => Ok(value),
      Err(PortfolioError::DegenerateRisk { .. }) => Ok(DEGENERATE_PENALTY),
      Err(e) => Err(e.into()),
    }
  }
}

impl Gradient for AllocationProblem<'_> {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, x: &Self::Param) -> std::result::Result<Self::Gradient, Error> {
    central_difference(self, x, self.fd_step)
  }
}

fn solver_error(e: Error) -> PortfolioError {
  match e.downcast::<PortfolioError>() {
    Ok(err) => err,
    Err(e) => PortfolioError::Solver(e.to_string()),
  }
}

/// Deterministic start points: the uniform allocation, then allocations tilted towards
/// one asset at a time.
pub fn start_points(n: usize, count: usize) -> Vec<Vec<f64>> {
  (0..count)
    .map(|k| {
      if k == 0 {
        return vec![1.0 / n as f64; n];
      }
      let mut w = vec![0.5 / n as f64; n];
      w[(k - 1) % n] += 0.5;
      w
    })
    .collect()
}

/// Starts tried when every regular start lands on the penalty plateau: the tilted
/// allocations not yet used, then each single-asset vertex.
fn fallback_points(n: usize, used: usize) -> Vec<Vec<f64>> {
  let vertices = (0..n).map(|i| {
    let mut w = vec![0.0; n];
    w[i] = 1.0;
    w
  });
  start_points(n, n + 1)
    .into_iter()
    .skip(used)
    .chain(vertices)
    .collect()
}

fn is_penalized(cost: f64) -> bool {
  cost >= DEGENERATE_PENALTY
}

/// Converged on a non-degenerate allocation.
fn accepted(run: &SlsqpReport) -> bool {
  run.converged() && !is_penalized(run.cost)
}

/// Clamp to `[0, 1]` and rescale to unit sum.
fn normalize(weights: &[f64]) -> Vec<f64> {
  let clamped: Vec<f64> = weights.iter().map(|w| w.clamp(0.0, 1.0)).collect();
  let total: f64 = clamped.iter().sum();

  if total < 1e-15 {
    vec![1.0 / weights.len() as f64; weights.len()]
  } else {
    clamped.iter().map(|w| w / total).collect()
  }
}

/// Maximize the evaluator's metric over the long-only simplex.
///
/// `restarts` is the number of start points (at most `n + 1` are used). Runs are
/// independent and the best one wins: converged runs first, then the lowest objective,
/// then the earliest start. A non-converged best run is still returned, flagged via
/// [`OptimizationResult::converged`].
///
/// When every run ends on [`DEGENERATE_PENALTY`] the remaining tilted starts and the
/// single-asset vertices are tried as well. A penalized result is never flagged converged.
pub fn optimize_allocation(
  evaluator: &PerformanceEvaluator<'_>,
  solver: &SlsqpConfig,
  restarts: usize,
) -> Result<OptimizationResult> {
  let n = evaluator.n_assets();
  if n == 0 {
    return Err(PortfolioError::EmptyUniverse);
  }
  if restarts == 0 {
    return Err(PortfolioError::InvalidParameter(
      "restarts must be at least 1".to_string(),
    ));
  }

  let problem = AllocationProblem::new(*evaluator, solver.fd_step);

  if n == 1 {
    let weights = vec![1.0];
    let objective = problem.cost(&weights).map_err(solver_error)?;
    return Ok(OptimizationResult {
      weights,
      objective,
      converged: true,
      iterations: 0,
      termination: Termination::Converged,
    });
  }

  let slsqp = Slsqp::new(*solver, vec![0.0; n], vec![1.0; n])
    .with_equality(LinearEquality::budget(n));
  let starts = start_points(n, restarts.min(n + 1));

  let run_all = |starts: &[Vec<f64>]| {
    starts
      .par_iter()
      .map(|x0| slsqp.minimize(&problem, x0).map_err(solver_error))
      .collect::<Result<Vec<SlsqpReport>>>()
  };

  let mut runs = run_all(&starts)?;
  if runs.iter().all(|run| is_penalized(run.cost)) {
    let fallback = fallback_points(n, starts.len());
    debug!(
      extra_starts = fallback.len(),
      "every start has degenerate risk, trying fallback starts"
    );
    runs.extend(run_all(&fallback)?);
  }

  for (k, run) in runs.iter().enumerate() {
    debug!(
      start = k,
      cost = run.cost,
      iterations = run.iterations,
      termination = %run.termination,
      "allocation start finished"
    );
  }

  let (best_idx, best) = runs
    .iter()
    .enumerate()
    .min_by(|(ia, a), (ib, b)| {
      accepted(b)
        .cmp(&accepted(a))
        .then(a.cost.total_cmp(&b.cost))
        .then(ia.cmp(ib))
    })
    .ok_or_else(|| PortfolioError::Solver("no start point was evaluated".to_string()))?;

  let mut weights = normalize(&best.x);
  let mut objective = problem.cost(&weights).map_err(solver_error)?;
  if is_penalized(objective) && !is_penalized(best.cost) {
    weights = best.x.clone();
    objective = best.cost;
  }
  let converged = best.converged() && !is_penalized(objective);

  if !converged {
    warn!(
      metric = %evaluator.metric(),
      termination = %best.termination,
      iterations = best.iterations,
      "allocation search did not converge, returning best iterate"
    );
  }
  info!(
    metric = %evaluator.metric(),
    n_assets = n,
    starts = runs.len(),
    best_start = best_idx,
    objective,
    iterations = best.iterations,
    "allocation search finished"
  );

  Ok(OptimizationResult {
    weights,
    objective,
    converged,
    iterations: best.iterations,
    termination: best.termination,
  })
}
