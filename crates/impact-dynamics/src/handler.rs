//! The impact handler: partition, solve, apply.
//!
//! Connected components of constraints are decoupled in the impulse
//! equations, so each is assembled and solved independently. Body
//! velocities are written only after every component has solved; a failure
//! anywhere leaves all velocities untouched and surfaces
//! [`ImpactError::SolveFailed`].

use crate::friction::{build_mlcp, FrictionModel, MlcpProblem};
use crate::islands::ConstraintIslands;
use crate::problem::{BilateralRow, ImpactProblemData};
use crate::UnilateralConstraint;
use impact_lcp::{FastSolver, FastSolverConfig, KellerSolver, LemkeSolver, RegularizationSchedule};
use impact_types::{BodySet, DVector, ImpactError, Result};
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for [`ImpactHandler`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImpactHandlerConfig {
    /// Friction model override. `None` selects per component: frictionless
    /// when every contact has zero friction, the polyhedral cone
    /// otherwise.
    pub friction_model: Option<FrictionModel>,

    /// Rank tolerance for the bilateral-row selection; non-positive
    /// selects the default.
    pub eps_rank: f64,

    /// Zero tolerance handed to the solvers; non-positive selects the
    /// problem-scaled default per component.
    pub zero_tol: f64,

    /// Pivot tolerance handed to Lemke; non-positive selects the default.
    pub piv_tol: f64,

    /// Regularization schedule shared by all solver paths.
    pub regularization: RegularizationSchedule,

    /// Maximum restitution re-solves per component.
    pub max_restitution_iterations: usize,

    /// Seed for the fast pivoter's tie-breaking RNG, applied at the start
    /// of every `process_constraints` call for reproducibility.
    pub rng_seed: u64,
}

impl Default for ImpactHandlerConfig {
    fn default() -> Self {
        Self {
            friction_model: None,
            eps_rank: -1.0,
            zero_tol: -1.0,
            piv_tol: -1.0,
            regularization: RegularizationSchedule::default(),
            max_restitution_iterations: 5,
            rng_seed: 0,
        }
    }
}

impl ImpactHandlerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ImpactError::InvalidConfig`] for an unusable schedule or
    /// iteration count.
    pub fn validate(&self) -> Result<()> {
        self.regularization
            .validate()
            .map_err(ImpactError::invalid_config)?;
        if self.max_restitution_iterations == 0 {
            return Err(ImpactError::invalid_config(
                "at least one restitution iteration is required",
            ));
        }
        Ok(())
    }
}

/// Summary of one impact-handling call.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImpactReport {
    /// Number of connected components solved.
    pub islands: usize,
    /// Impulse magnitude per input constraint (normal impulse for
    /// contacts, limit impulse for limits), indexed like the constraint
    /// vector handed to `process_constraints`.
    pub impulses: Vec<f64>,
    /// Total pivots across all solver invocations.
    pub total_pivots: usize,
}

/// Callback invoked before solving; may remove (or otherwise edit)
/// constraints. The handler does not re-validate feasibility of the edited
/// set - removing constraints can prevent progress, and that is the
/// caller's responsibility.
pub type PreSolveCallback = Box<dyn FnMut(&mut Vec<UnilateralConstraint>)>;

/// Callback invoked after impulses have been applied.
pub type PostSolveCallback = Box<dyn FnMut(&[UnilateralConstraint], &ImpactReport)>;

/// Resolves simultaneous unilateral constraints by computing and applying
/// instantaneous impulses.
///
/// Owns its solver instances and scratch; create one per thread. The only
/// state mutated outside the handler is the body velocities, written in a
/// single deterministic pass at the end of a successful call.
pub struct ImpactHandler {
    config: ImpactHandlerConfig,
    lemke: LemkeSolver,
    keller: KellerSolver,
    fast: FastSolver,
    bilateral: Vec<BilateralRow>,
    pre_callback: Option<PreSolveCallback>,
    post_callback: Option<PostSolveCallback>,
    pivots_accum: usize,
}

impl Default for ImpactHandler {
    fn default() -> Self {
        Self::new(ImpactHandlerConfig::default())
    }
}

impl ImpactHandler {
    /// Create a handler with the given configuration.
    #[must_use]
    pub fn new(config: ImpactHandlerConfig) -> Self {
        Self {
            config,
            lemke: LemkeSolver::default(),
            keller: KellerSolver::default(),
            fast: FastSolver::new(FastSolverConfig {
                seed: config.rng_seed,
                warm_start: true,
            }),
            bilateral: Vec::new(),
            pre_callback: None,
            post_callback: None,
            pivots_accum: 0,
        }
    }

    /// Register bilateral (implicit joint) rows consulted during assembly.
    pub fn set_bilateral_rows(&mut self, rows: Vec<BilateralRow>) {
        self.bilateral = rows;
    }

    /// Register the pre-solve callback.
    pub fn set_pre_solve_callback(&mut self, cb: PreSolveCallback) {
        self.pre_callback = Some(cb);
    }

    /// Register the post-solve callback.
    pub fn set_post_solve_callback(&mut self, cb: PostSolveCallback) {
        self.post_callback = Some(cb);
    }

    /// Process a set of unilateral constraints: partition into connected
    /// components, solve each impact problem, and apply the impulses to
    /// the bodies' velocities.
    ///
    /// # Errors
    ///
    /// [`ImpactError::SolveFailed`] when any component fails at every
    /// regularization level (velocities are left unchanged), or an input
    /// error from assembly.
    pub fn process_constraints(
        &mut self,
        bodies: &mut BodySet,
        mut constraints: Vec<UnilateralConstraint>,
    ) -> Result<ImpactReport> {
        // Reproducible tie-breaking regardless of call history.
        self.fast.reseed(self.config.rng_seed);
        self.pivots_accum = 0;

        if let Some(cb) = self.pre_callback.as_mut() {
            cb(&mut constraints);
        }

        let mut report = ImpactReport {
            islands: 0,
            impulses: vec![0.0; constraints.len()],
            total_pivots: 0,
        };

        if constraints.is_empty() {
            debug!("impact handler: empty constraint set");
            return Ok(report);
        }

        let islands = ConstraintIslands::build(&constraints);
        report.islands = islands.num_islands();

        // Solve every component before touching any body velocity.
        let mut pending: Vec<(ImpactProblemData, MlcpProblem, DVector<f64>)> = Vec::new();
        for island in islands.islands() {
            let data = ImpactProblemData::assemble(
                &constraints,
                island,
                bodies,
                &self.bilateral,
                self.config.eps_rank,
            )?;
            let model = self.select_model(&data);
            debug!(
                contacts = data.num_contacts(),
                limits = data.num_limits(),
                ?model,
                "solving impact component"
            );
            let problem = build_mlcp(&data, &model);
            let z = self.solve_with_restitution(&data, &problem)?;
            pending.push((data, problem, z));
        }

        // Deterministic finalization pass.
        for (data, problem, z) in &pending {
            let mut gen_impulse = problem.j_full.transpose() * z;
            if let Some(pre) = &problem.pre_impulse {
                gen_impulse += pre;
            }
            let dv = data.velocity_delta(bodies, &gen_impulse)?;
            for (k, &id) in data.body_ids.iter().enumerate() {
                let body = bodies
                    .get_mut(id)
                    .ok_or(ImpactError::InvalidBody(id))?;
                let nb = body.num_coords();
                let off = data.body_offsets[k];
                let mut vel = body.velocity().clone();
                for j in 0..nb {
                    vel[j] += dv[off + j];
                }
                body.velocity_mut().copy_from(&vel);
            }

            // Report per-constraint impulses.
            let c0 = problem.layout.contact_offset();
            for (i, &ci) in data.contact_indices.iter().enumerate() {
                report.impulses[ci] = z[c0 + i];
            }
            let l0 = problem.layout.limit_offset();
            for (i, &ci) in data.limit_indices.iter().enumerate() {
                report.impulses[ci] = z[l0 + i];
            }
        }

        report.total_pivots = self.pivots_accum;
        if let Some(cb) = self.post_callback.as_mut() {
            cb(&constraints, &report);
        }
        Ok(report)
    }

    /// Pick the friction model for a component.
    ///
    /// A configured model wins; otherwise frictionless when every contact
    /// has zero friction, else the polyhedral cone via the LCP path (the
    /// quadratic-program path the original reserved for non-convex cases
    /// is intentionally not carried).
    fn select_model(&self, data: &ImpactProblemData) -> FrictionModel {
        if let Some(model) = self.config.friction_model {
            return model;
        }
        if data.mu.iter().all(|&m| m <= 0.0) {
            FrictionModel::Frictionless
        } else {
            FrictionModel::AnitescuPotra
        }
    }

    /// Solve a component's MLCP, then iterate the restitution correction
    /// until the restituted normal velocities are met.
    fn solve_with_restitution(
        &mut self,
        data: &ImpactProblemData,
        problem: &MlcpProblem,
    ) -> Result<DVector<f64>> {
        let q0 = problem.q.clone();
        let mut z = self.solve_once(problem, &q0)?;

        // Restitution targets per bounded row.
        let c0 = problem.layout.contact_offset();
        let l0 = problem.layout.limit_offset();
        let mut eps_rows: Vec<(usize, f64)> = Vec::new();
        for (i, &eps) in data.contact_restitution.iter().enumerate() {
            if eps > 0.0 {
                eps_rows.push((c0 + i, eps));
            }
        }
        for (i, &eps) in data.limit_restitution.iter().enumerate() {
            if eps > 0.0 {
                eps_rows.push((l0 + i, eps));
            }
        }
        if eps_rows.is_empty() {
            return Ok(z);
        }

        let tol = if self.config.zero_tol > 0.0 {
            self.config.zero_tol
        } else {
            impact_lcp::default_zero_tol(&problem.m)
        };

        let mut q_rest = q0.clone();
        for &(row, eps) in &eps_rows {
            q_rest[row] += eps * q0[row];
        }

        for _ in 0..self.config.max_restitution_iterations {
            // Post-impact velocity on row i is (M z + q0)_i; it must meet
            // -eps * (pre-impact velocity).
            let w = &problem.m * &z + &q0;
            let violated = eps_rows
                .iter()
                .any(|&(row, eps)| w[row] + eps * q0[row] < -tol);
            if !violated {
                break;
            }
            z = self.solve_once(problem, &q_rest)?;
        }
        Ok(z)
    }

    /// One regularized solve, routed by problem structure: cone-coupled
    /// LCPs (copositive, not symmetric) go straight to Lemke; symmetric
    /// plain LCPs try the fast pivoter with Lemke as fallback; anything
    /// with free variables uses the bounded pivoters.
    fn solve_once(&mut self, problem: &MlcpProblem, q: &DVector<f64>) -> Result<DVector<f64>> {
        let n = q.len();
        let mut z = DVector::zeros(n);
        if n == 0 {
            return Ok(z);
        }

        let sched = self.config.regularization;
        let zero_tol = self.config.zero_tol;
        let ok = if problem.is_plain_lcp() && problem.layout.n_slack > 0 {
            let solved = self.lemke.solve_regularized(
                &problem.m,
                q,
                &mut z,
                &sched,
                self.config.piv_tol,
                zero_tol,
            );
            self.pivots_accum += self.lemke.pivots();
            solved
        } else if problem.is_plain_lcp() {
            let solved = self
                .fast
                .solve_lcp_regularized(&problem.m, q, &mut z, &sched, zero_tol);
            let mut pivots = self.fast.pivots();
            let solved = solved || {
                z = DVector::zeros(n);
                let r = self.lemke.solve_regularized(
                    &problem.m,
                    q,
                    &mut z,
                    &sched,
                    self.config.piv_tol,
                    zero_tol,
                );
                pivots += self.lemke.pivots();
                r
            };
            self.pivots_accum += pivots;
            solved
        } else {
            let solved =
                self.fast
                    .solve_mlcp_regularized(&problem.m, q, &problem.l, &problem.u, &mut z, &sched, zero_tol);
            let mut pivots = self.fast.pivots();
            let solved = solved || {
                z = DVector::zeros(n);
                let r = self.keller.solve_regularized(
                    &problem.m,
                    q,
                    &problem.l,
                    &problem.u,
                    &mut z,
                    &sched,
                    zero_tol,
                );
                pivots += self.keller.pivots();
                r
            };
            self.pivots_accum += pivots;
            solved
        };

        if !ok {
            let residual = (&problem.m * &z + q)
                .iter()
                .fold(0.0_f64, |acc, &x| acc.max(-x));
            warn!(size = n, residual, "impact component failed to solve");
            return Err(ImpactError::SolveFailed { size: n, residual });
        }
        Ok(z)
    }
}
