//! Lemke's complementary pivoting algorithm.
//!
//! Lemke's method augments the LCP with an artificial variable `z0` driven
//! in along a covering vector; the basis is then pivoted until `z0` leaves
//! again (success) or no variable can feasibly leave (ray termination).
//! It handles the copositive-plus matrices produced by polyhedral friction
//! models, which the symmetric principal-pivoting solvers cannot.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace, warn};

use crate::regularize::{dump_failure, lcp_solution_valid, regularized, RegularizationSchedule};
use crate::util::{default_piv_tol, default_zero_tol, min_entry, NEAR_ZERO};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for [`LemkeSolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LemkeConfig {
    /// Seed the initial basis from the incoming `z` (entries above zero go
    /// basic). Off by default: warm bases tend to hurt Lemke's pivot count
    /// on impact problems.
    pub warm_start: bool,

    /// On a singular basis, restart from a random basis instead of failing.
    /// Off by default; benchmark before enabling.
    pub restart_on_singular: bool,

    /// On a singular basis, fall back to an SVD least-squares solve of the
    /// basis system instead of failing. Off by default; benchmark before
    /// enabling. Takes precedence over `restart_on_singular`.
    pub least_squares_fallback: bool,

    /// Maximum random restarts when `restart_on_singular` is set.
    pub max_restarts: usize,

    /// Write failed `(M, q)` problems to a `lemke.Mq.<digits>.fail` dump.
    pub log_failures: bool,

    /// Seed for restart bases and dump file names.
    pub seed: u64,
}

impl Default for LemkeConfig {
    fn default() -> Self {
        Self {
            warm_start: false,
            restart_on_singular: false,
            least_squares_fallback: false,
            max_restarts: 3,
            log_failures: false,
            seed: 0,
        }
    }
}

/// Lemke's algorithm with a covering vector, plus a regularized wrapper.
///
/// The solver owns its scratch state and pivot counters; create one per
/// thread.
#[derive(Debug)]
pub struct LemkeSolver {
    config: LemkeConfig,
    rng: StdRng,
    pivots: usize,
}

impl Default for LemkeSolver {
    fn default() -> Self {
        Self::new(LemkeConfig::default())
    }
}

impl LemkeSolver {
    /// Create a solver with the given configuration.
    #[must_use]
    pub fn new(config: LemkeConfig) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(config.seed),
            pivots: 0,
        }
    }

    /// Pivots performed by the last `solve`/`solve_regularized` call.
    #[must_use]
    pub fn pivots(&self) -> usize {
        self.pivots
    }

    /// Solve the LCP `(M, q)`.
    ///
    /// `z` is input and output: with `warm_start` enabled and `z` sized to
    /// the problem, its support seeds the initial basis. Non-positive
    /// tolerances select the problem-scaled defaults.
    ///
    /// Returns `false` on ray termination, a singular basis with no enabled
    /// fallback, or when the pivot cap `min(1000, 50n)` is reached.
    pub fn solve(
        &mut self,
        m: &DMatrix<f64>,
        q: &DVector<f64>,
        z: &mut DVector<f64>,
        piv_tol: f64,
        zero_tol: f64,
    ) -> bool {
        let n = q.len();
        let max_iter = usize::min(1000, 50 * n);
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
        let piv_tol = if piv_tol > 0.0 {
            piv_tol
        } else {
            default_piv_tol(m)
        };

        // Trivial solution: q already non-negative.
        if min_entry(q) > -zero_tol {
            *z = DVector::zeros(n);
            return true;
        }

        let mut z0 = if self.config.warm_start && z.len() == n {
            z.clone()
        } else {
            DVector::zeros(0)
        };

        let mut restarts = 0usize;
        let artificial = 2 * n;

        'restart: loop {
            // Initial basis from the support of z0, or the trivial basis.
            let mut bas: Vec<usize> = Vec::new();
            let mut nonbas: Vec<usize> = Vec::new();
            if z0.len() == n {
                for i in 0..n {
                    if z0[i] > 0.0 {
                        bas.push(i);
                    } else {
                        nonbas.push(i);
                    }
                }
            } else {
                nonbas.extend(0..n);
            }

            // Basis matrix with the invariant Bl * x = -q. Column j carries
            // basic variable bas[j]: +M column for a z variable, -e_i for a
            // w variable.
            let mut bl = DMatrix::<f64>::zeros(n, n);
            let mut x;
            if bas.is_empty() {
                for i in 0..n {
                    bl[(i, i)] = -1.0;
                }
                x = q.clone();
            } else {
                for (j, &col) in bas.iter().enumerate() {
                    bl.set_column(j, &m.column(col));
                }
                for (j, &col) in nonbas.iter().enumerate() {
                    bl[(col, bas.len() + j)] = -1.0;
                }
                match bl.clone().lu().solve(&(-q)) {
                    Some(sol) => x = sol,
                    None => {
                        // Warm basis was no good; drop to the trivial basis.
                        debug!(n, "lemke: warm-start basis singular, using trivial basis");
                        bas.clear();
                        nonbas = (0..n).collect();
                        bl.fill(0.0);
                        for i in 0..n {
                            bl[(i, i)] = -1.0;
                        }
                        x = q.clone();
                        z0 = DVector::zeros(0);
                    }
                }
            }

            // The initial basis may already be feasible.
            if x.iter().all(|&xi| xi >= 0.0) {
                let mut out = DVector::zeros(n);
                for (j, &var) in bas.iter().enumerate() {
                    out[var] = x[j];
                }
                *z = out;
                debug!(n, "lemke: initial basis provides a solution");
                return true;
            }

            // First leaving variable: most negative basic value. The
            // artificial enters on the covering column.
            let num_zbas = bas.len();
            for &i in &nonbas {
                bas.push(i + n);
            }
            debug_assert_eq!(bas.len(), n);

            let mut lvindex = 0;
            for i in 1..n {
                if x[i] < x[lvindex] {
                    lvindex = i;
                }
            }
            let tval = -x[lvindex];
            let mut leaving = bas[lvindex];
            bas[lvindex] = artificial;

            let cover: DVector<f64> = x.map(|xi| if xi < 0.0 { 1.0 } else { 0.0 });
            let mut be = -(&bl * &cover);
            x += cover * tval;
            x[lvindex] = tval;
            bl.set_column(lvindex, &be);
            trace!(
                first_leaving = leaving,
                tval,
                num_zbas,
                "lemke: artificial pivoted in"
            );

            let mut entering;
            while self.pivots < max_iter {
                self.pivots += 1;

                if leaving == artificial {
                    let mut z_full = DVector::zeros(2 * n);
                    for (j, &var) in bas.iter().enumerate() {
                        if var < 2 * n {
                            z_full[var] = x[j];
                        }
                    }
                    *z = z_full.rows(0, n).clone_owned();
                    debug!(n, pivots = self.pivots, "lemke: solved");
                    return true;
                } else if leaving < n {
                    entering = n + leaving;
                    be = DVector::zeros(n);
                    be[leaving] = -1.0;
                } else {
                    entering = leaving - n;
                    be = m.column(entering).clone_owned();
                }

                // Pivot direction d = Bl^-1 * Be.
                let d = match bl.clone().lu().solve(&be) {
                    Some(d) => d,
                    None => {
                        if self.config.least_squares_fallback {
                            match bl.clone().svd(true, true).solve(&be, NEAR_ZERO) {
                                Ok(d) => d,
                                Err(_) => {
                                    warn!(n, "lemke: least-squares fallback failed");
                                    self.fail_dump(m, q);
                                    *z = DVector::zeros(n);
                                    return false;
                                }
                            }
                        } else if self.config.restart_on_singular
                            && restarts < self.config.max_restarts
                        {
                            restarts += 1;
                            warn!(n, restarts, "lemke: basis singular, random restart");
                            z0 = DVector::from_iterator(
                                n,
                                (0..n).map(|_| f64::from(self.rng.gen_range(0..2u8))),
                            );
                            continue 'restart;
                        } else {
                            warn!(n, "lemke: basis became singular");
                            self.fail_dump(m, q);
                            *z = DVector::zeros(n);
                            return false;
                        }
                    }
                };

                // Candidate leaving rows: positive pivot components.
                let j_set: Vec<usize> = (0..n).filter(|&i| d[i] > piv_tol).collect();
                if j_set.is_empty() {
                    warn!(n, pivots = self.pivots, "lemke: ray termination");
                    self.fail_dump(m, q);
                    *z = DVector::zeros(n);
                    return false;
                }

                // Minimum ratio test with a zero_tol cushion; keep every
                // index at the minimum, then take the first (lexicographic
                // ordering is not needed in practice; random tie-breaks
                // measurably hurt this solver).
                let theta = j_set
                    .iter()
                    .map(|&i| (x[i] + zero_tol) / d[i])
                    .fold(f64::INFINITY, f64::min);
                let ties: Vec<usize> = j_set
                    .into_iter()
                    .filter(|&i| x[i] / d[i] <= theta)
                    .collect();
                if ties.is_empty() {
                    warn!(n, theta, "lemke: no pivot below ratio (zero_tol too low?)");
                    self.fail_dump(m, q);
                    *z = DVector::zeros(n);
                    return false;
                }

                // The artificial variable leaves as soon as it qualifies.
                lvindex = ties
                    .iter()
                    .copied()
                    .find(|&i| bas[i] == artificial)
                    .unwrap_or(ties[0]);
                leaving = bas[lvindex];

                // Pivot.
                let ratio = x[lvindex] / d[lvindex];
                x -= &d * ratio;
                x[lvindex] = ratio;
                bl.set_column(lvindex, &be);
                bas[lvindex] = entering;
                trace!(leaving, entering, ratio, "lemke: pivot");
            }

            warn!(n, max_iter, "lemke: maximum pivots exceeded");
            self.fail_dump(m, q);
            *z = DVector::zeros(n);
            return false;
        }
    }

    /// Solve with diagonal regularization and post-hoc verification.
    ///
    /// Tries the unregularized problem first, then each `M + 10^k I` from
    /// the schedule. The unregularized candidate is verified against `M`;
    /// each regularized candidate against its shifted matrix (accepting a
    /// shifted solution is the point of regularizing - see DESIGN notes).
    pub fn solve_regularized(
        &mut self,
        m: &DMatrix<f64>,
        q: &DVector<f64>,
        z: &mut DVector<f64>,
        schedule: &RegularizationSchedule,
        piv_tol: f64,
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
        if self.solve(m, q, z, piv_tol, zero_tol) && lcp_solution_valid(m, q, z, verify_tol) {
            debug!("lemke: solved with no regularization necessary");
            return true;
        }
        total_pivots += self.pivots;

        for lambda in schedule.factors() {
            debug!(lambda, "lemke: trying regularization factor");
            let mm = regularized(m, lambda);
            if self.solve(&mm, q, z, piv_tol, zero_tol)
                && lcp_solution_valid(&mm, q, z, verify_tol)
            {
                debug!(lambda, "lemke: solved with regularization");
                self.pivots += total_pivots;
                return true;
            }
            total_pivots += self.pivots;
        }

        warn!(
            n = q.len(),
            total_pivots, "lemke: unable to solve at any regularization level"
        );
        self.pivots = total_pivots;
        false
    }

    fn fail_dump(&mut self, m: &DMatrix<f64>, q: &DVector<f64>) {
        if self.config.log_failures {
            match dump_failure(m, q, &mut self.rng) {
                Ok(path) => warn!(path = %path.display(), "lemke: failure dumped"),
                Err(e) => warn!(error = %e, "lemke: could not write failure dump"),
            }
        }
    }
}
