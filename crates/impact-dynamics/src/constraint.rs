//! Unilateral constraint types: contacts and joint limits.

use impact_collision::ContactRecord;
use impact_types::{BodyId, GeomId};
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A contact constraint between two collision geometries.
///
/// The normal points from body B into body A: the constraint velocity is
/// `n . (v_pA - v_pB)` and must end non-negative (scaled by restitution)
/// after the impulse.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactConstraint {
    /// Geometry on body A.
    pub geom_a: GeomId,
    /// Geometry on body B.
    pub geom_b: GeomId,
    /// Body A.
    pub body_a: BodyId,
    /// Body B.
    pub body_b: BodyId,
    /// Contact point in world frame.
    pub point: Point3<f64>,
    /// Unit contact normal in world frame, pointing from B into A.
    pub normal: Vector3<f64>,
    /// Coulomb friction coefficient, `>= 0`.
    pub friction: f64,
    /// Coefficient of restitution in `[0, 1]`.
    pub restitution: f64,
    /// Number of positive tangent directions in the polyhedral friction
    /// cone. `2` selects the orthonormal tangent pair; larger values select
    /// an evenly spaced fan.
    pub friction_dirs: usize,
}

impl ContactConstraint {
    /// Create a frictionless, perfectly plastic contact.
    #[must_use]
    pub fn new(
        geom_a: GeomId,
        geom_b: GeomId,
        body_a: BodyId,
        body_b: BodyId,
        point: Point3<f64>,
        normal: Vector3<f64>,
    ) -> Self {
        Self {
            geom_a,
            geom_b,
            body_a,
            body_b,
            point,
            normal,
            friction: 0.0,
            restitution: 0.0,
            friction_dirs: 2,
        }
    }

    /// Create a contact from a narrow-phase record.
    #[must_use]
    pub fn from_record(record: &ContactRecord) -> Self {
        Self::new(
            record.geom_a,
            record.geom_b,
            record.body_a,
            record.body_b,
            record.point,
            record.normal,
        )
    }

    /// Set the friction coefficient.
    #[must_use]
    pub fn with_friction(mut self, mu: f64) -> Self {
        self.friction = mu.max(0.0);
        self
    }

    /// Set the restitution coefficient.
    #[must_use]
    pub fn with_restitution(mut self, eps: f64) -> Self {
        self.restitution = eps.clamp(0.0, 1.0);
        self
    }

    /// Set the number of positive tangent directions.
    #[must_use]
    pub fn with_friction_dirs(mut self, dirs: usize) -> Self {
        self.friction_dirs = dirs.max(2);
        self
    }

    /// Two orthonormal tangent vectors spanning the contact plane.
    #[must_use]
    pub fn tangent_basis(&self) -> (Vector3<f64>, Vector3<f64>) {
        compute_tangent_basis(&self.normal)
    }

    /// The positive tangent directions of the polyhedral friction cone.
    ///
    /// With `friction_dirs == 2` this is the orthonormal pair; otherwise
    /// `friction_dirs` directions evenly spaced over the tangent
    /// half-plane. The cone itself uses these directions and their
    /// negations.
    #[must_use]
    pub fn friction_fan(&self) -> Vec<Vector3<f64>> {
        let (t, s) = self.tangent_basis();
        if self.friction_dirs <= 2 {
            return vec![t, s];
        }
        (0..self.friction_dirs)
            .map(|i| {
                let a = std::f64::consts::PI * i as f64 / self.friction_dirs as f64;
                t * a.cos() + s * a.sin()
            })
            .collect()
    }
}

/// Two orthogonal unit vectors in the plane normal to `normal`.
fn compute_tangent_basis(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    // Choose a helper axis not parallel to the normal.
    let up = if normal.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let t = normal.cross(&up).normalize();
    let s = normal.cross(&t).normalize();
    (t, s)
}

/// Which bound of a joint limit is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LimitSide {
    /// Joint coordinate at its lower bound: velocity must be non-negative.
    Lower,
    /// Joint coordinate at its upper bound: velocity must be non-positive.
    Upper,
}

/// A joint-limit constraint: a single scalar unilateral row on one of a
/// body's generalized coordinates.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LimitConstraint {
    /// Body whose joint hit its limit.
    pub body: BodyId,
    /// Index of the limited generalized coordinate.
    pub dof: usize,
    /// Active bound.
    pub side: LimitSide,
    /// Coefficient of restitution for the limit stop.
    pub restitution: f64,
}

impl LimitConstraint {
    /// Create a limit constraint with no restitution.
    #[must_use]
    pub fn new(body: BodyId, dof: usize, side: LimitSide) -> Self {
        Self {
            body,
            dof,
            side,
            restitution: 0.0,
        }
    }

    /// Set the limit-stop restitution.
    #[must_use]
    pub fn with_restitution(mut self, eps: f64) -> Self {
        self.restitution = eps.clamp(0.0, 1.0);
        self
    }

    /// Sign of the selector row: the constraint velocity is
    /// `sign * qdot[dof]` and must be non-negative.
    #[must_use]
    pub fn sign(&self) -> f64 {
        match self.side {
            LimitSide::Lower => 1.0,
            LimitSide::Upper => -1.0,
        }
    }
}

/// A unilateral constraint: a contact or a joint limit.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UnilateralConstraint {
    /// Contact between two geometries.
    Contact(ContactConstraint),
    /// Joint limit on a single degree of freedom.
    Limit(LimitConstraint),
}

impl UnilateralConstraint {
    /// The bodies this constraint touches.
    #[must_use]
    pub fn bodies(&self) -> (BodyId, Option<BodyId>) {
        match self {
            Self::Contact(c) => (c.body_a, Some(c.body_b)),
            Self::Limit(l) => (l.body, None),
        }
    }

    /// The constraint's restitution coefficient.
    #[must_use]
    pub fn restitution(&self) -> f64 {
        match self {
            Self::Contact(c) => c.restitution,
            Self::Limit(l) => l.restitution,
        }
    }

    /// Whether this is a contact constraint.
    #[must_use]
    pub fn is_contact(&self) -> bool {
        matches!(self, Self::Contact(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn contact(normal: Vector3<f64>) -> ContactConstraint {
        ContactConstraint::new(
            GeomId::new(0),
            GeomId::new(1),
            BodyId::new(0),
            BodyId::new(1),
            Point3::origin(),
            normal,
        )
    }

    #[test]
    fn test_tangent_basis_orthonormal() {
        for normal in [
            Vector3::x(),
            Vector3::y(),
            Vector3::z(),
            Vector3::new(1.0, 1.0, 1.0).normalize(),
            Vector3::new(-0.3, 0.2, 0.9).normalize(),
        ] {
            let (t, s) = contact(normal).tangent_basis();
            assert_relative_eq!(t.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(s.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t.dot(&s), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t.dot(&normal), 0.0, epsilon = 1e-12);
            assert_relative_eq!(s.dot(&normal), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_friction_fan_spacing() {
        let c = contact(Vector3::z()).with_friction_dirs(4);
        let fan = c.friction_fan();
        assert_eq!(fan.len(), 4);
        for d in &fan {
            assert_relative_eq!(d.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(d.dot(&Vector3::z()), 0.0, epsilon = 1e-12);
        }
        // Adjacent directions are 45 degrees apart.
        assert_relative_eq!(
            fan[0].dot(&fan[1]),
            std::f64::consts::FRAC_PI_4.cos(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_limit_sign() {
        let lower = LimitConstraint::new(BodyId::new(0), 2, LimitSide::Lower);
        let upper = LimitConstraint::new(BodyId::new(0), 2, LimitSide::Upper);
        assert_eq!(lower.sign(), 1.0);
        assert_eq!(upper.sign(), -1.0);
    }

    #[test]
    fn test_constraint_bodies() {
        let c = UnilateralConstraint::Contact(contact(Vector3::z()));
        assert_eq!(c.bodies(), (BodyId::new(0), Some(BodyId::new(1))));
        let l = UnilateralConstraint::Limit(LimitConstraint::new(
            BodyId::new(5),
            0,
            LimitSide::Lower,
        ));
        assert_eq!(l.bodies(), (BodyId::new(5), None));
        assert!(!l.is_contact());
    }
}
