//! Core types for impulse-based rigid body dynamics.
//!
//! This crate provides the foundational types shared by the rest of the
//! workspace:
//!
//! - [`BodyId`] / [`GeomId`] - stable identifiers for bodies and collision
//!   geometries
//! - [`DynamicBody`] - the abstract inverse-inertia operator that maps a
//!   generalized impulse to a velocity change
//! - [`RigidBody`] - the 6-DOF rigid body implementation
//! - [`BodySet`] - id-keyed body storage mutated by the impact handler
//! - [`ImpactError`] - the error taxonomy for solver and handler failures
//!
//! # Design Philosophy
//!
//! These types carry **no solver logic**. They are the common language
//! between the collision pipeline (which produces contact constraints), the
//! problem assembler (which builds complementarity problems from them), and
//! the impact handler (which writes impulse-induced velocity changes back).
//!
//! Bodies are referenced by [`BodyId`], never by pointer; the handler
//! resolves identifiers to velocity buffers through [`BodySet`]. Articulated
//! bodies with non-diagonal mass matrices fit behind the same
//! [`DynamicBody`] trait as long as they can answer the two questions the
//! solver core asks: "what is the world velocity of this material point as a
//! linear function of your generalized velocity?" and "what velocity change
//! does this generalized impulse produce?"
//!
//! # Example
//!
//! ```
//! use impact_types::{BodyId, BodySet, DynamicBody, RigidBody};
//! use nalgebra::{DVector, Matrix3, Point3};
//!
//! let mut bodies = BodySet::new();
//! bodies.insert(Box::new(RigidBody::new(
//!     BodyId::new(0),
//!     1.0,
//!     Matrix3::identity() * 0.4,
//!     Point3::origin(),
//! )));
//!
//! let body = bodies.get(BodyId::new(0)).unwrap();
//! let dv = body.apply_inv_inertia(&DVector::from_vec(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
//! assert!((dv[0] - 1.0).abs() < 1e-12);
//! ```

#![doc(html_root_url = "https://docs.rs/impact-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]

mod body;
mod error;

pub use body::{BodyId, BodySet, DynamicBody, GeomId, RigidBody};
pub use error::ImpactError;

// Re-export math types for convenience
pub use nalgebra::{DMatrix, DVector, Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for impact-handling operations.
pub type Result<T> = std::result::Result<T, ImpactError>;
