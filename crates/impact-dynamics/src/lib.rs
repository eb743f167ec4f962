//! Impact constraint assembly and resolution.
//!
//! This crate turns contact and joint-limit constraints into mixed linear
//! complementarity problems, solves them with the pivoting solvers from
//! `impact-lcp`, and propagates the resulting impulses back onto body
//! velocities.
//!
//! # Pipeline
//!
//! ```text
//! constraints
//!     |  ConstraintIslands::build          (union-find over shared bodies)
//!     v
//! connected components
//!     |  ImpactProblemData::assemble       (Jacobians, inertia products,
//!     v                                     pre-impact velocities)
//! per-component problem data
//!     |  build_mlcp                        (friction model -> M, q, l, u)
//!     v
//! MLCP
//!     |  impact-lcp solvers + regularization
//!     v
//! impulse vector z
//!     |  restitution loop, then ImpactHandler applies J^T z through each
//!     v   body's inverse inertia
//! updated body velocities
//! ```
//!
//! Components are decoupled in the impulse equations, so each solves
//! independently; the handler only writes body velocities once every
//! component has solved, and leaves them untouched on failure.
//!
//! # Friction models
//!
//! - [`FrictionModel::Frictionless`] - normal and limit rows only.
//! - [`FrictionModel::Viscous`] - tangential impulses proportional to the
//!   pre-impact tangential velocity, applied directly; no friction
//!   variables in the LCP.
//! - [`FrictionModel::AnitescuPotra`] - polyhedral Coulomb cone over `2k`
//!   tangent directions with a slack row per contact.
//! - [`FrictionModel::NoSlip`] - tangential rows enter as bilateral (free)
//!   variables, pinning tangential velocities to zero.
//!
//! # Example
//!
//! ```
//! use impact_dynamics::{ContactConstraint, ImpactHandler, UnilateralConstraint};
//! use impact_types::{BodyId, BodySet, DynamicBody, GeomId, RigidBody};
//! use nalgebra::{Matrix3, Point3, Vector3};
//!
//! // A unit-mass sphere moving down onto a fixed one.
//! let mut bodies = BodySet::new();
//! bodies.insert(Box::new(
//!     RigidBody::new(BodyId::new(0), 1.0, Matrix3::identity() * 0.4, Point3::new(0.0, 2.0, 0.0))
//!         .with_velocity(Vector3::new(0.0, -1.0, 0.0), Vector3::zeros()),
//! ));
//! bodies.insert(Box::new(RigidBody::fixed(BodyId::new(1), Point3::origin())));
//!
//! let contact = ContactConstraint::new(
//!     GeomId::new(0),
//!     GeomId::new(1),
//!     BodyId::new(0),
//!     BodyId::new(1),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Vector3::y(),
//! );
//!
//! let mut handler = ImpactHandler::default();
//! let report = handler
//!     .process_constraints(&mut bodies, vec![UnilateralConstraint::Contact(contact)])
//!     .unwrap();
//! assert_eq!(report.islands, 1);
//! // The impact arrested the approach.
//! assert!(bodies.get(BodyId::new(0)).unwrap().velocity()[1] >= -1e-8);
//! ```

#![doc(html_root_url = "https://docs.rs/impact-dynamics/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn, clippy::suboptimal_flops)]

mod constraint;
mod friction;
mod handler;
mod islands;
mod problem;
mod sparse;

pub use constraint::{
    ContactConstraint, LimitConstraint, LimitSide, UnilateralConstraint,
};
pub use friction::{build_mlcp, FrictionModel, MlcpProblem, VariableLayout};
pub use handler::{
    ImpactHandler, ImpactHandlerConfig, ImpactReport, PostSolveCallback, PreSolveCallback,
};
pub use islands::{ConstraintIslands, Island};
pub use problem::{BilateralRow, ImpactProblemData};
pub use sparse::{BlockJacobian, MatrixBlock};

// Re-export the error type callers match on.
pub use impact_types::ImpactError;
