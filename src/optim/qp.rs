//! # Box-Constrained QP
//!
//! $$
//! \min_{\mathbf d}\ \tfrac12\mathbf d^\top B\mathbf d+\mathbf g^\top\mathbf d
//! \quad\text{s.t.}\quad \mathbf a^\top\mathbf d=r,\ \ \mathbf l\le\mathbf d\le\mathbf u
//! $$
//!
//! Primal active-set solver for the SQP search-direction subproblem. `B` must be
//! symmetric positive definite and `d = 0` must be feasible.

use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Array1;
use ndarray::Array2;

const STEP_TOL: f64 = 1e-12;
const MULTIPLIER_TOL: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bound {
  Lower,
  Upper,
}

/// Solve the equality-constrained subproblem on the free variables.
///
/// Returns the step for every variable (zero on the working set) and the multiplier of the
/// equality row, or `None` when the KKT matrix is singular.
fn kkt_step(
  b: &Array2<f64>,
  grad: &Array1<f64>,
  free: &[usize],
  equality: Option<(&Array1<f64>, f64)>,
) -> Option<(Array1<f64>, f64)> {
  let nf = free.len();
  let m = nf + usize::from(equality.is_some());
  let mut kkt = DMatrix::<f64>::zeros(m, m);
  let mut rhs = DVector::<f64>::zeros(m);

  for (ri, &i) in free.iter().enumerate() {
    for (ci, &j) in free.iter().enumerate() {
      kkt[(ri, ci)] = b[[i, j]];
    }
    rhs[ri] = -grad[i];
  }

  if let Some((a, residual)) = equality {
    for (ri, &i) in free.iter().enumerate() {
      kkt[(ri, nf)] = a[i];
      kkt[(nf, ri)] = a[i];
    }
    rhs[nf] = residual;
  }

  let sol = kkt.lu().solve(&rhs)?;
  if sol.iter().any(|v| !v.is_finite()) {
    return None;
  }

  let mut step = Array1::zeros(grad.len());
  for (ri, &i) in free.iter().enumerate() {
    step[i] = sol[ri];
  }
  let nu = if equality.is_some() { sol[nf] } else { 0.0 };

  Some((step, nu))
}

/// Search direction of one SQP iteration.
///
/// `lower`/`upper` are the bounds shifted by the current iterate, `equality` is `(a, r)` for
/// the linearized constraint `a . d = r`.
pub fn solve_qp(
  b: &Array2<f64>,
  g: &Array1<f64>,
  lower: &Array1<f64>,
  upper: &Array1<f64>,
  equality: Option<(&Array1<f64>, f64)>,
) -> Array1<f64> {
  let n = g.len();
  let mut d = Array1::<f64>::zeros(n);
  let mut working: Vec<Option<Bound>> = vec![None; n];
  // variables pinned by equal bounds never leave the working set
  let pinned: Vec<bool> = (0..n).map(|i| upper[i] - lower[i] <= 0.0).collect();
  for i in 0..n {
    if pinned[i] {
      working[i] = Some(Bound::Lower);
    }
  }

  for _ in 0..(10 * n + 50) {
    let free: Vec<usize> = (0..n).filter(|&i| working[i].is_none()).collect();
    if free.is_empty() && equality.is_some() {
      break;
    }

    let grad = b.dot(&d) + g;
    let (p, nu) = if free.is_empty() {
      (Array1::zeros(n), 0.0)
    } else {
      let eq = equality.map(|(a, r)| (a, r - a.dot(&d)));
      match kkt_step(b, &grad, &free, eq) {
        Some(step) => step,
        None => break,
      }
    };

    let p_norm = p.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if p_norm <= STEP_TOL {
      // stationary on the working set: release the most violated bound, if any
      let mut release = None;
      let mut worst = MULTIPLIER_TOL;
      for i in 0..n {
        if pinned[i] {
          continue;
        }
        let lambda = grad[i] + equality.map_or(0.0, |(a, _)| nu * a[i]);
        let violation = match working[i] {
          Some(Bound::Lower) => -lambda,
          Some(Bound::Upper) => lambda,
          None => continue,
        };
        if violation > worst {
          worst = violation;
          release = Some(i);
        }
      }

      match release {
        Some(i) => working[i] = None,
        None => break,
      }
      continue;
    }

    let mut alpha = 1.0;
    let mut blocking = None;
    for &i in &free {
      if p[i] < 0.0 {
        let t = (lower[i] - d[i]) / p[i];
        if t < alpha {
          alpha = t;
          blocking = Some((i, Bound::Lower));
        }
      } else if p[i] > 0.0 {
        let t = (upper[i] - d[i]) / p[i];
        if t < alpha {
          alpha = t;
          blocking = Some((i, Bound::Upper));
        }
      }
    }

    d.scaled_add(alpha.max(0.0), &p);
    if let Some((i, bound)) = blocking {
      d[i] = match bound {
        Bound::Lower => lower[i],
        Bound::Upper => upper[i],
      };
      working[i] = Some(bound);
    }
  }

  d
}
