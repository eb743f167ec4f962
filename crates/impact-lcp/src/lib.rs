//! Pivoting solvers for linear complementarity problems.
//!
//! This crate provides the numerical core of the impact engine: given a
//! matrix `M` and vector `q`, find `z` such that
//!
//! ```text
//! w = M z + q,    z >= 0,    w >= 0,    z' w = 0        (LCP)
//! ```
//!
//! or, in the mixed/bounded variant with `l <= z <= u`,
//!
//! ```text
//! z_i = l_i  =>  w_i >= 0
//! z_i = u_i  =>  w_i <= 0
//! l_i < z_i < u_i  =>  w_i = 0                          (MLCP)
//! ```
//!
//! Free variables (`l = -inf`, `u = +inf`) model bilateral constraint rows;
//! this is what makes the bounded solvers usable for no-slip friction and
//! implicit joint constraints.
//!
//! # Solvers
//!
//! | solver | problem | method | determinism |
//! |---|---|---|---|
//! | [`LemkeSolver`] | LCP | Lemke with covering vector | deterministic (first-index tie-break) |
//! | [`KellerSolver`] | MLCP | Keller principal pivoting | deterministic |
//! | [`FastSolver`] | LCP + MLCP | indexed principal pivoting | random tie-break, caller-seeded |
//!
//! All three return `bool`: `true` means a solution within tolerance was
//! produced in `z`; `false` means ray termination, a singular basis, or the
//! pivot cap. Every failure path emits a `tracing` event with the problem
//! size and the offending quantity - failures are never silent.
//!
//! # Regularization
//!
//! Each solver has a `solve_regularized` variant that retries with
//! `M + 10^k I` over a [`RegularizationSchedule`] of exponents and accepts
//! the first candidate that passes post-hoc verification. "Solved but
//! inaccurate" collapses into failure so the wrapper keeps escalating.
//!
//! # Tolerances
//!
//! Tolerances are parameters, never compiled constants. Passing a
//! non-positive value selects the defaults
//! `zero_tol = n * ||M||_inf * eps` and
//! `piv_tol = eps * n * max(1, ||M||_inf)`.
//!
//! # Example
//!
//! ```
//! use impact_lcp::LemkeSolver;
//! use nalgebra::{DMatrix, DVector};
//!
//! let m = DMatrix::from_row_slice(1, 1, &[2.0]);
//! let q = DVector::from_vec(vec![-3.0]);
//! let mut z = DVector::zeros(1);
//!
//! let mut solver = LemkeSolver::default();
//! assert!(solver.solve(&m, &q, &mut z, -1.0, -1.0));
//! assert!((z[0] - 1.5).abs() < 1e-12);
//! ```

#![doc(html_root_url = "https://docs.rs/impact-lcp/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn, clippy::suboptimal_flops)]

mod fast;
mod keller;
mod lemke;
mod regularize;
mod util;

pub use fast::{FastSolver, FastSolverConfig};
pub use keller::KellerSolver;
pub use lemke::{LemkeConfig, LemkeSolver};
pub use regularize::{
    dump_failure, lcp_solution_valid, mlcp_solution_valid, RegularizationSchedule,
};
pub use util::{default_piv_tol, default_zero_tol, NEAR_ZERO};
