//! Keller's principal pivoting method for bounded mixed LCPs.
//!
//! Keller's algorithm maintains a partition of the variables into a free
//! set `alpha` (bilateral rows, `l = -inf`, `u = +inf`, and any index whose
//! `w` has been driven to zero) and bounded sets `beta_l` / `beta_u` (at
//! the lower / upper bound). Each outer pivot picks the worst `w` sign
//! violation on the bounded sets and drives it out along a principal pivot
//! direction, moving indices between the sets as they hit bounds.
//!
//! Suited to the symmetric positive semi-definite matrices produced by
//! `J M^-1 J^T` assemblies; for copositive friction couplings use Lemke.

use nalgebra::{DMatrix, DVector, LU};
use tracing::{debug, trace, warn};

use crate::regularize::{mlcp_solution_valid, regularized, RegularizationSchedule};
use crate::util::{
    default_zero_tol, insert_sorted, remove_sorted, select, select_square, select_vec, NEAR_ZERO,
};

/// Keller's principal pivoting MLCP solver.
#[derive(Debug, Default)]
pub struct KellerSolver {
    pivots: usize,
}

/// Signum with a dead zone of `NEAR_ZERO`.
fn sgn(x: f64) -> f64 {
    if x > NEAR_ZERO {
        1.0
    } else if x < -NEAR_ZERO {
        -1.0
    } else {
        0.0
    }
}

struct IndexSets {
    /// Free (non-basic) indices, sorted.
    alpha: Vec<usize>,
    /// All bounded (basic) indices, sorted.
    beta: Vec<usize>,
    /// Bounded indices currently at their lower bound, sorted.
    beta_l: Vec<usize>,
    /// Bounded indices currently at their upper bound, sorted.
    beta_u: Vec<usize>,
}

impl KellerSolver {
    /// Create a solver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pivots performed by the last solve.
    #[must_use]
    pub fn pivots(&self) -> usize {
        self.pivots
    }

    /// Solve the MLCP `(M, q, l, u)` into `z`.
    ///
    /// Infinite bounds mark free variables. A non-positive `zero_tol`
    /// selects the problem-scaled default. Returns `false` on a singular
    /// free-set subsystem, ray termination, or the `2n` pivot cap.
    pub fn solve(
        &mut self,
        m: &DMatrix<f64>,
        q: &DVector<f64>,
        l: &DVector<f64>,
        u: &DVector<f64>,
        z: &mut DVector<f64>,
        zero_tol: f64,
    ) -> bool {
        let n = q.len();
        self.pivots = 0;

        if n == 0 {
            *z = DVector::zeros(0);
            debug!("keller: empty problem");
            return true;
        }

        let zero_tol = if zero_tol > 0.0 {
            zero_tol
        } else {
            default_zero_tol(m)
        };

        // Initial partition: free rows to alpha, bounded rows to the side
        // of their finite bound (lower wins when both are finite).
        let mut sets = IndexSets {
            alpha: Vec::new(),
            beta: Vec::new(),
            beta_l: Vec::new(),
            beta_u: Vec::new(),
        };
        for i in 0..n {
            if l[i] == f64::NEG_INFINITY && u[i] == f64::INFINITY {
                sets.alpha.push(i);
            } else {
                if l[i] == f64::NEG_INFINITY {
                    sets.beta_u.push(i);
                } else {
                    sets.beta_l.push(i);
                }
                sets.beta.push(i);
            }
        }

        // Solve the free-set system and derive the full z and w.
        let mut lu = match Self::factor(m, &sets.alpha) {
            Ok(f) => f,
            Err(()) => {
                warn!(n, "keller: initial free-set system is singular");
                return false;
            }
        };
        let mut z_alpha = match Self::solve_free(&lu, m, q, l, u, &sets) {
            Some(v) => v,
            None => {
                warn!(n, "keller: initial free-set solve failed");
                return false;
            }
        };
        let mut w = DVector::zeros(n);
        Self::compute_z_w(m, q, &z_alpha, l, u, &sets, z, &mut w);

        let max_piv = 2 * n;
        while self.pivots < max_piv {
            self.pivots += 1;

            // Worst violation on each bounded side.
            let mut s_l = None;
            let mut w_plus_min = f64::INFINITY;
            for &i in &sets.beta_l {
                if w[i] < w_plus_min {
                    s_l = Some(i);
                    w_plus_min = w[i];
                }
            }
            let mut s_u = None;
            let mut w_minus_max = f64::NEG_INFINITY;
            for &i in &sets.beta_u {
                if w[i] > w_minus_max {
                    s_u = Some(i);
                    w_minus_max = w[i];
                }
            }

            // No violation: z feasibility is maintained throughout, so this
            // is a solution.
            if w_minus_max < zero_tol && w_plus_min > -zero_tol {
                Self::compute_z_w(m, q, &z_alpha, l, u, &sets, z, &mut w);
                debug!(n, pivots = self.pivots, "keller: solved");
                return true;
            }

            let s = match (s_l, s_u) {
                (Some(sl), Some(su)) => {
                    if w[sl] < -w[su] {
                        sl
                    } else {
                        su
                    }
                }
                (Some(sl), None) => sl,
                (None, Some(su)) => su,
                (None, None) => unreachable!("violation implies a bounded index"),
            };
            trace!(s, w_s = w[s], "keller: driving index");

            let p = -sgn(w[s]);
            debug_assert!(p != 0.0);

            // Drive w_s toward zero, moving blockers out of alpha as they
            // hit bounds, until theta0 wins and s itself joins alpha.
            loop {
                // v_alpha = -M_aa^-1 M[alpha, s]
                let m_col_s: Vec<f64> = sets.alpha.iter().map(|&i| m[(i, s)]).collect();
                let rhs = -DVector::from_vec(m_col_s);
                let v_alpha = if sets.alpha.is_empty() {
                    DVector::zeros(0)
                } else {
                    match lu.solve(&rhs) {
                        Some(v) => v,
                        None => {
                            warn!(n, "keller: free-set system became singular");
                            return false;
                        }
                    }
                };

                // rho_s = M_ss - M[s, alpha] M_aa^-1 M[alpha, s]
                let mut rho_s = m[(s, s)];
                for (k, &i) in sets.alpha.iter().enumerate() {
                    rho_s += m[(s, i)] * v_alpha[k];
                }

                let inf = f64::INFINITY * p;
                let mut theta0 = inf;
                let mut theta2 = inf;
                let mut theta3 = inf;

                if rho_s > NEAR_ZERO {
                    theta0 = -w[s] / rho_s;
                }
                let theta1 = if p > 0.0 { u[s] - z[s] } else { l[s] - z[s] };

                let mut r2 = None;
                let mut r3 = None;
                for (k, &i) in sets.alpha.iter().enumerate() {
                    let pv = p * v_alpha[k];
                    if pv < -zero_tol {
                        let cand = p * (l[i] - z_alpha[k]) / v_alpha[k];
                        if r2.is_none() || cand < theta2 {
                            r2 = Some(i);
                            theta2 = cand;
                        }
                    } else if pv > zero_tol {
                        let cand = p * (u[i] - z_alpha[k]) / v_alpha[k];
                        if r3.is_none() || cand < theta3 {
                            r3 = Some(i);
                            theta3 = cand;
                        }
                    }
                }

                let theta = p * [p * theta0, p * theta1, p * theta2, p * theta3]
                    .iter()
                    .fold(f64::INFINITY, |acc, &t| acc.min(t));
                trace!(theta0, theta1, theta2, theta3, theta, "keller: step lengths");

                if theta.is_infinite() {
                    warn!(n, pivots = self.pivots, "keller: ray termination");
                    return false;
                }

                // Advance z_alpha, w_s, and w on the bounded set.
                z_alpha += &v_alpha * theta;
                w[s] += theta * rho_s;
                if !sets.beta.is_empty() {
                    let m_ba = select(m, &sets.beta, &sets.alpha);
                    let extra = if sets.alpha.is_empty() {
                        DVector::zeros(sets.beta.len())
                    } else {
                        &m_ba * &v_alpha
                    };
                    for (k, &i) in sets.beta.iter().enumerate() {
                        w[i] += theta * (m[(i, s)] + extra[k]);
                    }
                }
                for (k, &i) in sets.alpha.iter().enumerate() {
                    z[i] = z_alpha[k];
                }

                if theta == theta0 {
                    // s joins the free set with w_s pinned to zero.
                    w[s] = 0.0;
                    insert_sorted(&mut sets.alpha, s);
                    remove_sorted(&mut sets.beta, s);
                    remove_sorted(&mut sets.beta_l, s);
                    remove_sorted(&mut sets.beta_u, s);
                } else if theta == theta1 {
                    // s reaches its opposite bound and stays bounded.
                    if p > 0.0 {
                        z[s] = u[s];
                        remove_sorted(&mut sets.beta_l, s);
                        insert_sorted(&mut sets.beta_u, s);
                    } else {
                        z[s] = l[s];
                        remove_sorted(&mut sets.beta_u, s);
                        insert_sorted(&mut sets.beta_l, s);
                    }
                } else if theta == theta2 {
                    let r = r2.unwrap_or(s);
                    z[r] = l[r];
                    remove_sorted(&mut sets.alpha, r);
                    insert_sorted(&mut sets.beta_l, r);
                    insert_sorted(&mut sets.beta, r);
                } else {
                    let r = r3.unwrap_or(s);
                    z[r] = u[r];
                    remove_sorted(&mut sets.alpha, r);
                    insert_sorted(&mut sets.beta_u, r);
                    insert_sorted(&mut sets.beta, r);
                }

                // Re-factor the free-set system and refresh z / w.
                lu = match Self::factor(m, &sets.alpha) {
                    Ok(f) => f,
                    Err(()) => {
                        warn!(n, "keller: free-set system became singular");
                        return false;
                    }
                };
                z_alpha = match Self::solve_free(&lu, m, q, l, u, &sets) {
                    Some(v) => v,
                    None => {
                        warn!(n, "keller: free-set solve failed");
                        return false;
                    }
                };
                Self::compute_z_w(m, q, &z_alpha, l, u, &sets, z, &mut w);

                // theta2/theta3 only removed a blocker from the free set;
                // keep driving s. theta0 freed s, theta1 pinned it at its
                // opposite bound - either way this drive is over.
                if theta == theta0 || theta == theta1 {
                    break;
                }
            }
        }

        warn!(n, max_piv, "keller: maximum pivots exceeded");
        false
    }

    /// Solve with diagonal regularization and post-hoc verification.
    pub fn solve_regularized(
        &mut self,
        m: &DMatrix<f64>,
        q: &DVector<f64>,
        l: &DVector<f64>,
        u: &DVector<f64>,
        z: &mut DVector<f64>,
        schedule: &RegularizationSchedule,
        zero_tol: f64,
    ) -> bool {
        if q.is_empty() {
            *z = DVector::zeros(0);
            return true;
        }

        let verify_tol = if zero_tol > 0.0 {
            zero_tol
        } else {
            (q.len() as f64 * crate::util::inf_norm(m) * NEAR_ZERO).max(f64::EPSILON)
        };

        let mut total_pivots = 0;
        if self.solve(m, q, l, u, z, zero_tol) && mlcp_solution_valid(m, q, l, u, z, verify_tol) {
            debug!("keller: solved with no regularization necessary");
            return true;
        }
        total_pivots += self.pivots;

        for lambda in schedule.factors() {
            debug!(lambda, "keller: trying regularization factor");
            let mm = regularized(m, lambda);
            if self.solve(&mm, q, l, u, z, zero_tol)
                && mlcp_solution_valid(&mm, q, l, u, z, verify_tol)
            {
                debug!(lambda, "keller: solved with regularization");
                self.pivots += total_pivots;
                return true;
            }
            total_pivots += self.pivots;
        }

        warn!(
            n = q.len(),
            total_pivots, "keller: unable to solve at any regularization level"
        );
        self.pivots = total_pivots;
        false
    }

    /// Factor the free-set subsystem `M[alpha, alpha]`.
    fn factor(
        m: &DMatrix<f64>,
        alpha: &[usize],
    ) -> Result<LU<f64, nalgebra::Dyn, nalgebra::Dyn>, ()> {
        let sub = select_square(m, alpha);
        let lu = sub.lu();
        // Reject exactly singular subsystems up front; near-singular ones
        // surface through a failed solve.
        if !alpha.is_empty() && lu.determinant() == 0.0 {
            return Err(());
        }
        Ok(lu)
    }

    /// `z_alpha = -M_aa^-1 (q_alpha + M_ab z_beta)` where the bounded
    /// variables sit at their active bounds. With all bounds at zero or
    /// infinity the correction term vanishes, which is the common impact
    /// case.
    fn solve_free(
        lu: &LU<f64, nalgebra::Dyn, nalgebra::Dyn>,
        m: &DMatrix<f64>,
        q: &DVector<f64>,
        l: &DVector<f64>,
        u: &DVector<f64>,
        sets: &IndexSets,
    ) -> Option<DVector<f64>> {
        if sets.alpha.is_empty() {
            return Some(DVector::zeros(0));
        }
        let mut rhs = -select_vec(q, &sets.alpha);
        for (k, &i) in sets.alpha.iter().enumerate() {
            for &j in &sets.beta_l {
                rhs[k] -= m[(i, j)] * l[j];
            }
            for &j in &sets.beta_u {
                rhs[k] -= m[(i, j)] * u[j];
            }
        }
        lu.solve(&rhs)
    }

    /// Fill the full `z` from the partition and recompute `w = Mz + q`.
    fn compute_z_w(
        m: &DMatrix<f64>,
        q: &DVector<f64>,
        z_alpha: &DVector<f64>,
        l: &DVector<f64>,
        u: &DVector<f64>,
        sets: &IndexSets,
        z: &mut DVector<f64>,
        w: &mut DVector<f64>,
    ) {
        let n = q.len();
        if z.len() != n {
            *z = DVector::zeros(n);
        }
        for (k, &i) in sets.alpha.iter().enumerate() {
            z[i] = z_alpha[k];
        }
        for &i in &sets.beta_l {
            z[i] = l[i];
        }
        for &i in &sets.beta_u {
            z[i] = u[i];
        }
        *w = m * &*z + q;
    }
}
