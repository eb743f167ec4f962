//! Indexed principal pivoting ("fast") solvers for PSD problems.
//!
//! These solvers exploit the observation that impact problems usually have
//! few active constraints: they maintain explicit non-basic / basic index
//! sets, solve only the non-basic subsystem each iteration, and move the
//! single most violated index between sets. Ties are broken uniformly at
//! random to avoid cycling; the RNG lives in the solver and is seeded by
//! the caller, so runs are reproducible.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace, warn};

use crate::regularize::{
    lcp_solution_valid, mlcp_solution_valid, regularized, RegularizationSchedule,
};
use crate::util::{
    default_zero_tol, insert_sorted, remove_sorted, select, select_square, select_vec, NEAR_ZERO,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for [`FastSolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FastSolverConfig {
    /// RNG seed for tie-breaking. Fix this per call site for reproducible
    /// pivot sequences.
    pub seed: u64,

    /// Warm-start from the incoming `z` when it is sized to the problem.
    pub warm_start: bool,
}

impl Default for FastSolverConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            warm_start: true,
        }
    }
}

/// Indexed principal pivoting solver for LCPs and bounded MLCPs.
#[derive(Debug)]
pub struct FastSolver {
    config: FastSolverConfig,
    rng: StdRng,
    pivots: usize,
}

impl Default for FastSolver {
    fn default() -> Self {
        Self::new(FastSolverConfig::default())
    }
}

impl FastSolver {
    /// Create a solver with the given configuration.
    #[must_use]
    pub fn new(config: FastSolverConfig) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(config.seed),
            pivots: 0,
        }
    }

    /// Re-seed the tie-breaking RNG.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Pivots performed by the last solve.
    #[must_use]
    pub fn pivots(&self) -> usize {
        self.pivots
    }

    /// Index of a minimum entry of `v`; when several entries lie within
    /// `tol` of the minimum, one of them is chosen uniformly at random.
    fn rand_min(&mut self, v: &DVector<f64>, tol: f64) -> usize {
        debug_assert!(!v.is_empty());
        let mut min_idx = 0;
        for i in 1..v.len() {
            if v[i] < v[min_idx] {
                min_idx = i;
            }
        }
        // Inclusive comparison: the established minimum always qualifies,
        // even at tol = 0.
        let minima: Vec<usize> = (0..v.len()).filter(|&i| v[i] <= v[min_idx] + tol).collect();
        minima[self.rng.gen_range(0..minima.len())]
    }

    /// Solve the (unbounded) LCP `(M, q)` into `z`.
    ///
    /// Warm-starts from `z` when enabled and sized; otherwise seeds the
    /// non-basic set with the most negative component of `q`. Capped at
    /// `2n` pivots; intended for PSD `M` with few active constraints.
    pub fn solve_lcp(
        &mut self,
        m: &DMatrix<f64>,
        q: &DVector<f64>,
        z: &mut DVector<f64>,
        zero_tol: f64,
    ) -> bool {
        let n = q.len();
        self.pivots = 0;

        if n == 0 {
            *z = DVector::zeros(0);
            return true;
        }

        let zero_tol = if zero_tol > 0.0 {
            zero_tol
        } else {
            default_zero_tol(m)
        };

        let mut nonbas: Vec<usize> = Vec::new();
        let mut bas: Vec<usize> = Vec::new();

        if self.config.warm_start && z.len() == n && z.iter().any(|&zi| zi.abs() >= zero_tol) {
            debug!(n, "lcp_fast: warm starting");
            for i in 0..n {
                if z[i].abs() < zero_tol {
                    bas.push(i);
                } else {
                    nonbas.push(i);
                }
            }
        } else {
            let minw = self.rand_min(q, 0.0);
            if q[minw] > -zero_tol {
                debug!(n, "lcp_fast: trivial solution");
                *z = DVector::zeros(n);
                return true;
            }
            nonbas.push(minw);
            bas.extend((0..n).filter(|&i| i != minw));
        }

        let max_piv = 2 * n;
        while self.pivots < max_piv {
            self.pivots += 1;

            // Solve the non-basic subsystem M_nn z_n = -q_n.
            let zn = if nonbas.is_empty() {
                DVector::zeros(0)
            } else {
                let m_sub = select_square(m, &nonbas);
                match m_sub.lu().solve(&(-select_vec(q, &nonbas))) {
                    Some(v) => v,
                    None => {
                        warn!(n, "lcp_fast: non-basic subsystem is singular");
                        return false;
                    }
                }
            };

            // w on the basic set.
            let m_mix = select(m, &bas, &nonbas);
            let w = if nonbas.is_empty() {
                select_vec(q, &bas)
            } else {
                &m_mix * &zn + select_vec(q, &bas)
            };

            let minw = (!bas.is_empty()).then(|| self.rand_min(&w, zero_tol));
            let minz = (!nonbas.is_empty()).then(|| self.rand_min(&zn, zero_tol));

            let w_ok = minw.map_or(true, |i| w[i] > -zero_tol);
            if w_ok {
                if let Some(iz) = minz.filter(|&iz| zn[iz] < -zero_tol) {
                    // z feasibility violated: most negative z goes basic.
                    let idx = nonbas.remove(iz);
                    insert_sorted(&mut bas, idx);
                    trace!(idx, "lcp_fast: moving z index to basic set");
                } else {
                    *z = DVector::zeros(n);
                    for (k, &i) in nonbas.iter().enumerate() {
                        z[i] = zn[k];
                    }
                    debug!(n, pivots = self.pivots, "lcp_fast: solved");
                    return true;
                }
            } else if let Some(iw) = minw {
                // w violated: that index becomes non-basic, and the worst
                // negative z (if any) swaps in the other direction.
                let widx = bas[iw];
                if let Some(iz) = minz.filter(|&iz| zn[iz] < -zero_tol) {
                    let zidx = nonbas[iz];
                    nonbas.remove(iz);
                    bas.remove(iw);
                    insert_sorted(&mut nonbas, widx);
                    insert_sorted(&mut bas, zidx);
                    trace!(widx, zidx, "lcp_fast: swapping basic/non-basic");
                } else {
                    bas.remove(iw);
                    insert_sorted(&mut nonbas, widx);
                    trace!(widx, "lcp_fast: moving w index to non-basic set");
                }
            }
        }

        warn!(n, max_piv, "lcp_fast: maximum pivots exceeded");
        false
    }

    /// Solve the bounded MLCP `(M, q, l, u)` into `z`.
    ///
    /// Free variables (`l = -inf`, `u = +inf`) start non-basic and stay
    /// interior. Capped at `max(n^2, 1000)` pivots.
    #[allow(clippy::too_many_lines)]
    pub fn solve_mlcp(
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
            return true;
        }

        let zero_tol = if zero_tol > 0.0 {
            zero_tol
        } else {
            default_zero_tol(m)
        };

        let mut nonbas: Vec<usize> = Vec::new();
        let mut bas: Vec<usize> = Vec::new();
        let mut bas_l: Vec<usize> = Vec::new();
        let mut bas_u: Vec<usize> = Vec::new();

        let no_lower_inf = (0..n).all(|i| l[i] != f64::NEG_INFINITY);

        if self.config.warm_start && z.len() == n && z.iter().any(|&zi| zi != 0.0) {
            debug!(n, "mlcp_fast: warm starting");
            for i in 0..n {
                if (z[i] - l[i]).abs() < zero_tol {
                    bas_l.push(i);
                    bas.push(i);
                } else if (u[i] - z[i]).abs() < zero_tol {
                    bas_u.push(i);
                    bas.push(i);
                } else {
                    nonbas.push(i);
                }
            }
        } else if no_lower_inf {
            // With all lower bounds finite, z = l may already solve it.
            let w = m * l + q;
            let minw = self.rand_min(&w, 0.0);
            if w[minw] > -zero_tol {
                debug!(n, "mlcp_fast: trivial solution at lower bounds");
                *z = l.clone();
                return true;
            }
            nonbas.push(minw);
            for i in (0..n).filter(|&i| i != minw) {
                bas_l.push(i);
                bas.push(i);
            }
        } else {
            // As few non-basic indices as possible: only genuinely free rows.
            for i in 0..n {
                if l[i] == f64::NEG_INFINITY && u[i] == f64::INFINITY {
                    nonbas.push(i);
                } else if l[i] == f64::NEG_INFINITY {
                    bas_u.push(i);
                    bas.push(i);
                } else {
                    bas_l.push(i);
                    bas.push(i);
                }
            }
        }

        let max_piv = (n * n).max(1000);
        while self.pivots < max_piv {
            self.pivots += 1;

            // Basic z values sit at their bounds.
            let z_bas = DVector::from_iterator(
                bas.len(),
                bas.iter()
                    .map(|&i| if bas_l.binary_search(&i).is_ok() { l[i] } else { u[i] }),
            );

            // Solve the non-basic subsystem, accounting for bound terms:
            // M_nn z_n = -(q_n + M_nb z_b).
            let m_sub = select_square(m, &nonbas);
            let m_nb = select(m, &nonbas, &bas);
            let mut rhs = -select_vec(q, &nonbas);
            if !bas.is_empty() && !nonbas.is_empty() {
                rhs -= &m_nb * &z_bas;
            }
            let zn = if nonbas.is_empty() {
                DVector::zeros(0)
            } else {
                match m_sub.lu().solve(&rhs) {
                    Some(v) => v,
                    None => {
                        warn!(n, "mlcp_fast: non-basic subsystem is singular");
                        return false;
                    }
                }
            };

            // w on the basic set: M_bn z_n + M_bb z_b + q_b.
            let m_mix = select(m, &bas, &nonbas);
            let m_bas = select_square(m, &bas);
            let mut w_bas = select_vec(q, &bas);
            if !bas.is_empty() {
                if !nonbas.is_empty() {
                    w_bas += &m_mix * &zn;
                }
                w_bas += &m_bas * &z_bas;
            }

            // Worst w violation on each side: lower-basic w must be
            // non-negative, upper-basic w non-positive.
            let mut wvio_best: Option<(usize, f64)> = None;
            for (k, &i) in bas.iter().enumerate() {
                let severity = if bas_l.binary_search(&i).is_ok() {
                    -w_bas[k]
                } else {
                    w_bas[k]
                };
                if wvio_best.map_or(true, |(_, s)| severity > s) {
                    wvio_best = Some((i, severity));
                }
            }
            let max_wvio = wvio_best.map_or(f64::NEG_INFINITY, |(_, s)| s);

            // Scatter the current z.
            *z = DVector::zeros(n);
            for &i in &bas_l {
                z[i] = l[i];
            }
            for &i in &bas_u {
                z[i] = u[i];
            }
            for (k, &i) in nonbas.iter().enumerate() {
                z[i] = zn[k];
            }

            if max_wvio < zero_tol {
                // w is feasible; check non-basic z against its bounds.
                match self.worst_z_violation(z, l, u, &nonbas, zero_tol) {
                    Some(to_bas) => {
                        self.move_to_bound(
                            to_bas, z, l, u, &mut nonbas, &mut bas, &mut bas_l, &mut bas_u,
                        );
                        continue;
                    }
                    None => {
                        debug!(n, pivots = self.pivots, "mlcp_fast: solved");
                        return true;
                    }
                }
            }

            // Collect every w index violated within tolerance of the worst
            // and pick one at random to leave the basic set.
            let mut wvio: Vec<usize> = Vec::new();
            for (k, &i) in bas.iter().enumerate() {
                let severity = if bas_l.binary_search(&i).is_ok() {
                    -w_bas[k]
                } else {
                    w_bas[k]
                };
                if severity + zero_tol > max_wvio {
                    wvio.push(i);
                }
            }
            debug_assert!(!wvio.is_empty());
            let to_nonbas = wvio[self.rng.gen_range(0..wvio.len())];
            remove_sorted(&mut bas, to_nonbas);
            if !remove_sorted(&mut bas_l, to_nonbas) {
                remove_sorted(&mut bas_u, to_nonbas);
            }
            insert_sorted(&mut nonbas, to_nonbas);
            trace!(to_nonbas, "mlcp_fast: moving w-violated index to non-basic");

            // A z-bound violation may move in the other direction.
            if let Some(to_bas) = self.worst_z_violation(z, l, u, &nonbas, zero_tol) {
                if to_bas != to_nonbas {
                    self.move_to_bound(
                        to_bas, z, l, u, &mut nonbas, &mut bas, &mut bas_l, &mut bas_u,
                    );
                }
            }
        }

        warn!(n, max_piv, "mlcp_fast: maximum pivots exceeded");
        false
    }

    /// Most violated non-basic z bound, chosen randomly among ties.
    fn worst_z_violation(
        &mut self,
        z: &DVector<f64>,
        l: &DVector<f64>,
        u: &DVector<f64>,
        nonbas: &[usize],
        zero_tol: f64,
    ) -> Option<usize> {
        let mut worst = 0.0;
        for &i in nonbas {
            let v = (l[i] - z[i]).max(z[i] - u[i]);
            if v > worst {
                worst = v;
            }
        }
        if worst <= zero_tol {
            return None;
        }
        let ties: Vec<usize> = nonbas
            .iter()
            .copied()
            .filter(|&i| (l[i] - z[i]).max(z[i] - u[i]) + zero_tol > worst)
            .collect();
        Some(ties[self.rng.gen_range(0..ties.len())])
    }

    /// Move a non-basic index to the basic set, on the side it violates.
    #[allow(clippy::too_many_arguments)]
    fn move_to_bound(
        &mut self,
        idx: usize,
        z: &DVector<f64>,
        l: &DVector<f64>,
        u: &DVector<f64>,
        nonbas: &mut Vec<usize>,
        bas: &mut Vec<usize>,
        bas_l: &mut Vec<usize>,
        bas_u: &mut Vec<usize>,
    ) {
        if l[idx] - z[idx] > z[idx] - u[idx] {
            insert_sorted(bas_l, idx);
        } else {
            insert_sorted(bas_u, idx);
        }
        insert_sorted(bas, idx);
        remove_sorted(nonbas, idx);
        trace!(idx, "mlcp_fast: moving z-violated index to basic set");
    }

    /// Regularized LCP wrapper with post-hoc verification.
    pub fn solve_lcp_regularized(
        &mut self,
        m: &DMatrix<f64>,
        q: &DVector<f64>,
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
        if self.solve_lcp(m, q, z, zero_tol) && lcp_solution_valid(m, q, z, verify_tol) {
            debug!("lcp_fast: solved with no regularization necessary");
            return true;
        }
        total_pivots += self.pivots;

        for lambda in schedule.factors() {
            debug!(lambda, "lcp_fast: trying regularization factor");
            let mm = regularized(m, lambda);
            if self.solve_lcp(&mm, q, z, zero_tol) && lcp_solution_valid(&mm, q, z, verify_tol) {
                debug!(lambda, "lcp_fast: solved with regularization");
                self.pivots += total_pivots;
                return true;
            }
            total_pivots += self.pivots;
        }

        warn!(
            n = q.len(),
            total_pivots, "lcp_fast: unable to solve at any regularization level"
        );
        self.pivots = total_pivots;
        false
    }

    /// Regularized MLCP wrapper with post-hoc verification.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_mlcp_regularized(
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
        if self.solve_mlcp(m, q, l, u, z, zero_tol)
            && mlcp_solution_valid(m, q, l, u, z, verify_tol)
        {
            debug!("mlcp_fast: solved with no regularization necessary");
            return true;
        }
        total_pivots += self.pivots;

        for lambda in schedule.factors() {
            debug!(lambda, "mlcp_fast: trying regularization factor");
            let mm = regularized(m, lambda);
            if self.solve_mlcp(&mm, q, l, u, z, zero_tol)
                && mlcp_solution_valid(&mm, q, l, u, z, verify_tol)
            {
                debug!(lambda, "mlcp_fast: solved with regularization");
                self.pivots += total_pivots;
                return true;
            }
            total_pivots += self.pivots;
        }

        warn!(
            n = q.len(),
            total_pivots, "mlcp_fast: unable to solve at any regularization level"
        );
        self.pivots = total_pivots;
        false
    }
}
