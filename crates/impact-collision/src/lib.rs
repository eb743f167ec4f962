//! Contact geometry and narrow-phase collision detection.
//!
//! This crate produces the contact records consumed by the impact
//! constraint assembler:
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                     find_contacts                            |
//! |  Dispatches on the primitive pair: sphere/sphere and         |
//! |  box/sphere take closed-form paths, everything else goes     |
//! |  through the generic vertex-vs-surface query                 |
//! +---------------------------+----------------------------------+
//!                             |
//!                             v
//! +--------------------------------------------------------------+
//! |                    CollisionGeometry                         |
//! |  A posed Shape owned by a body: world-frame vertex set and   |
//! |  signed-distance-and-normal queries                          |
//! +---------------------------+----------------------------------+
//!                             |
//!                             v
//! +--------------------------------------------------------------+
//! |                         Shape                                |
//! |  Sphere / Cuboid / Cylinder / Cone / Plane / Heightfield /   |
//! |  TriMesh with local-frame distance queries                   |
//! +--------------------------------------------------------------+
//! ```
//!
//! The [`Obb`] type lives here too: its separating-axis test, slab
//! ray test, and velocity expansion serve whatever broad phase the caller
//! runs in front of this narrow phase.
//!
//! # Conventions
//!
//! - Signed distances are negative inside a shape.
//! - Contact normals point from geometry B into geometry A.
//! - `eps_near` (default [`NEAR_TOLERANCE`]) both admits quasi-coincident
//!   contact candidates and cushions the SAT axis tests.
//!
//! # Example
//!
//! ```
//! use impact_collision::{find_contacts, CollisionGeometry, Shape, NEAR_TOLERANCE};
//! use impact_types::{BodyId, GeomId};
//! use nalgebra::{Isometry3, Vector3};
//!
//! let a = CollisionGeometry::new(
//!     GeomId::new(0),
//!     BodyId::new(0),
//!     Shape::sphere(1.0),
//!     Isometry3::translation(0.0, 2.0, 0.0),
//! );
//! let b = CollisionGeometry::new(
//!     GeomId::new(1),
//!     BodyId::new(1),
//!     Shape::sphere(1.0),
//!     Isometry3::identity(),
//! );
//!
//! let contacts = find_contacts(&a, &b, NEAR_TOLERANCE);
//! assert_eq!(contacts.len(), 1);
//! // Touching spheres: normal from B into A is +y.
//! assert!((contacts[0].normal - Vector3::y()).norm() < 1e-12);
//! ```

#![doc(html_root_url = "https://docs.rs/impact-collision/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn, clippy::suboptimal_flops)]

mod ccd;
mod geometry;
mod obb;
mod shape;

pub use ccd::{find_contacts, ContactRecord};
pub use geometry::CollisionGeometry;
pub use obb::Obb;
pub use shape::Shape;

/// Distance within which two surfaces are considered touching, and the
/// cushion applied to separating-axis comparisons.
pub const NEAR_TOLERANCE: f64 = 1e-8;
