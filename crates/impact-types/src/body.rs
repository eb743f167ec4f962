//! Body identifiers, the inverse-inertia operator trait, and rigid bodies.

use nalgebra::{DMatrix, DVector, Matrix3, Point3, Vector3};
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier for a dynamic body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub u64);

impl BodyId {
    /// Create a new body ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Unique identifier for a collision geometry.
///
/// A body may own several geometries; contact constraints reference the
/// geometry pair they arose from as well as the owning bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeomId(pub u64);

impl GeomId {
    /// Create a new geometry ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// A dynamic entity with a generalized velocity and an inverse-inertia
/// operator.
///
/// The impact solver core never looks inside a body's mass matrix. It only
/// needs the two linear maps below, which is what lets articulated bodies
/// (whose generalized mass matrices are dense) share the code path with
/// plain rigid bodies.
pub trait DynamicBody {
    /// The body's stable identifier.
    fn id(&self) -> BodyId;

    /// Number of generalized velocity coordinates.
    fn num_coords(&self) -> usize;

    /// The current generalized velocity.
    fn velocity(&self) -> &DVector<f64>;

    /// Mutable access to the generalized velocity.
    ///
    /// Only the impact handler's finalization pass should write through
    /// this; see the shared-resource policy in the crate docs.
    fn velocity_mut(&mut self) -> &mut DVector<f64>;

    /// Apply the inverse inertia operator: map a generalized impulse to the
    /// velocity change it produces.
    ///
    /// For a fixed (infinite-mass) body this returns zero.
    fn apply_inv_inertia(&self, impulse: &DVector<f64>) -> DVector<f64>;

    /// Jacobian of the world velocity of a material point with respect to
    /// the generalized velocity: a `3 x num_coords` matrix `J` such that
    /// the point's world velocity is `J * v`.
    fn point_jacobian(&self, point: &Point3<f64>) -> DMatrix<f64>;

    /// Kinetic energy at the current velocity.
    fn kinetic_energy(&self) -> f64;
}

/// A 6-DOF rigid body: scalar mass plus a world-frame inertia tensor.
///
/// The generalized velocity is the stacked twist `[v; omega]` (linear then
/// angular, both in world frame). The inverse mass matrix is block diagonal:
///
/// ```text
/// [ 1/m * I3     0      ]
/// [    0      I_world^-1 ]
/// ```
///
/// Fixed bodies carry zero inverse mass and inertia and never move.
#[derive(Debug, Clone)]
pub struct RigidBody {
    id: BodyId,
    mass: f64,
    inertia: Matrix3<f64>,
    inv_mass: f64,
    inv_inertia: Matrix3<f64>,
    com: Point3<f64>,
    velocity: DVector<f64>,
}

impl RigidBody {
    /// Create a dynamic rigid body from its mass, world-frame inertia
    /// tensor, and center of mass.
    ///
    /// # Panics
    ///
    /// Panics if `mass` is not strictly positive or the inertia tensor is
    /// singular. Construct fixed bodies with [`RigidBody::fixed`] instead.
    #[must_use]
    pub fn new(id: BodyId, mass: f64, inertia: Matrix3<f64>, com: Point3<f64>) -> Self {
        assert!(mass > 0.0, "dynamic body mass must be positive");
        let inv_inertia = inertia
            .try_inverse()
            .unwrap_or_else(|| panic!("inertia tensor of body {:?} is singular", id));
        Self {
            id,
            mass,
            inertia,
            inv_mass: 1.0 / mass,
            inv_inertia,
            com,
            velocity: DVector::zeros(6),
        }
    }

    /// Create a fixed (infinite-mass) body. Its inverse inertia is zero, so
    /// impulses never move it.
    #[must_use]
    pub fn fixed(id: BodyId, com: Point3<f64>) -> Self {
        Self {
            id,
            mass: 0.0,
            inertia: Matrix3::zeros(),
            inv_mass: 0.0,
            inv_inertia: Matrix3::zeros(),
            com,
            velocity: DVector::zeros(6),
        }
    }

    /// Set the body's twist from linear and angular world-frame velocities.
    #[must_use]
    pub fn with_velocity(mut self, linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        self.velocity = DVector::from_vec(vec![
            linear.x, linear.y, linear.z, angular.x, angular.y, angular.z,
        ]);
        self
    }

    /// Whether this body has infinite mass.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        self.inv_mass == 0.0
    }

    /// Inverse mass (zero for fixed bodies).
    #[must_use]
    pub fn inv_mass(&self) -> f64 {
        self.inv_mass
    }

    /// World-frame inverse inertia tensor (zero for fixed bodies).
    #[must_use]
    pub fn inv_inertia(&self) -> &Matrix3<f64> {
        &self.inv_inertia
    }

    /// World position of the center of mass.
    #[must_use]
    pub fn com(&self) -> Point3<f64> {
        self.com
    }

    /// Move the center of mass (e.g. after the caller integrates positions).
    pub fn set_com(&mut self, com: Point3<f64>) {
        self.com = com;
    }

    /// Linear part of the twist.
    #[must_use]
    pub fn linear_velocity(&self) -> Vector3<f64> {
        Vector3::new(self.velocity[0], self.velocity[1], self.velocity[2])
    }

    /// Angular part of the twist.
    #[must_use]
    pub fn angular_velocity(&self) -> Vector3<f64> {
        Vector3::new(self.velocity[3], self.velocity[4], self.velocity[5])
    }
}

fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

impl DynamicBody for RigidBody {
    fn id(&self) -> BodyId {
        self.id
    }

    fn num_coords(&self) -> usize {
        6
    }

    fn velocity(&self) -> &DVector<f64> {
        &self.velocity
    }

    fn velocity_mut(&mut self) -> &mut DVector<f64> {
        &mut self.velocity
    }

    fn apply_inv_inertia(&self, impulse: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(impulse.len(), 6);
        let j = Vector3::new(impulse[0], impulse[1], impulse[2]);
        let tau = Vector3::new(impulse[3], impulse[4], impulse[5]);
        let dv = j * self.inv_mass;
        let dw = self.inv_inertia * tau;
        DVector::from_vec(vec![dv.x, dv.y, dv.z, dw.x, dw.y, dw.z])
    }

    fn point_jacobian(&self, point: &Point3<f64>) -> DMatrix<f64> {
        // v_p = v + omega x r  =>  J = [I3 | -skew(r)]
        let r = point - self.com;
        let mut j = DMatrix::zeros(3, 6);
        j.view_mut((0, 0), (3, 3)).copy_from(&Matrix3::identity());
        j.view_mut((0, 3), (3, 3)).copy_from(&(-skew(&r)));
        j
    }

    fn kinetic_energy(&self) -> f64 {
        let v = self.linear_velocity();
        let w = self.angular_velocity();
        0.5 * self.mass * v.norm_squared() + 0.5 * w.dot(&(self.inertia * w))
    }
}

/// Id-keyed storage for the bodies participating in an impact event.
///
/// The handler resolves [`BodyId`]s through this set and mutates velocities
/// in place during its finalization pass.
#[derive(Default)]
pub struct BodySet {
    bodies: Vec<Box<dyn DynamicBody>>,
    index: HashMap<BodyId, usize>,
}

impl BodySet {
    /// Create an empty body set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bodies: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Insert a body. A body with the same id replaces the previous one.
    pub fn insert(&mut self, body: Box<dyn DynamicBody>) {
        let id = body.id();
        if let Some(&slot) = self.index.get(&id) {
            self.bodies[slot] = body;
        } else {
            self.index.insert(id, self.bodies.len());
            self.bodies.push(body);
        }
    }

    /// Look up a body by id.
    #[must_use]
    pub fn get(&self, id: BodyId) -> Option<&dyn DynamicBody> {
        self.index.get(&id).map(|&i| self.bodies[i].as_ref())
    }

    /// Look up a body mutably by id.
    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut (dyn DynamicBody + 'static)> {
        let slot = self.index.get(&id).copied()?;
        Some(self.bodies[slot].as_mut())
    }

    /// Whether a body with the given id exists.
    #[must_use]
    pub fn contains(&self, id: BodyId) -> bool {
        self.index.contains_key(&id)
    }

    /// Number of bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Iterate over the bodies in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn DynamicBody> {
        self.bodies.iter().map(|b| &**b)
    }

    /// Total kinetic energy over all bodies.
    #[must_use]
    pub fn total_kinetic_energy(&self) -> f64 {
        self.bodies.iter().map(|b| b.kinetic_energy()).sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rigid_body_inv_inertia() {
        let body = RigidBody::new(
            BodyId::new(1),
            2.0,
            Matrix3::identity() * 0.8,
            Point3::origin(),
        );

        let impulse = DVector::from_vec(vec![2.0, 0.0, 0.0, 0.0, 0.8, 0.0]);
        let dv = body.apply_inv_inertia(&impulse);

        assert_relative_eq!(dv[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(dv[4], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fixed_body_never_moves() {
        let body = RigidBody::fixed(BodyId::new(7), Point3::origin());
        let impulse = DVector::from_vec(vec![100.0; 6]);
        let dv = body.apply_inv_inertia(&impulse);
        assert_relative_eq!(dv.norm(), 0.0, epsilon = 1e-15);
        assert!(body.is_fixed());
    }

    #[test]
    fn test_point_jacobian_matches_twist() {
        let body = RigidBody::new(
            BodyId::new(0),
            1.0,
            Matrix3::identity(),
            Point3::new(1.0, 0.0, 0.0),
        )
        .with_velocity(Vector3::new(0.5, 0.0, 0.0), Vector3::new(0.0, 0.0, 2.0));

        // Point one unit above the COM along +y: v_p = v + w x r
        let p = Point3::new(1.0, 1.0, 0.0);
        let j = body.point_jacobian(&p);
        let vp = &j * body.velocity();

        // w x r = (0,0,2) x (0,1,0) = (-2, 0, 0)
        assert_relative_eq!(vp[0], 0.5 - 2.0, epsilon = 1e-12);
        assert_relative_eq!(vp[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(vp[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_kinetic_energy() {
        let body = RigidBody::new(
            BodyId::new(0),
            2.0,
            Matrix3::identity() * 0.5,
            Point3::origin(),
        )
        .with_velocity(Vector3::new(3.0, 0.0, 0.0), Vector3::new(0.0, 2.0, 0.0));

        // 0.5*2*9 + 0.5*(2 * 0.5*2) = 9 + 1
        assert_relative_eq!(body.kinetic_energy(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_body_set_lookup() {
        let mut set = BodySet::new();
        set.insert(Box::new(RigidBody::fixed(BodyId::new(3), Point3::origin())));
        set.insert(Box::new(RigidBody::new(
            BodyId::new(5),
            1.0,
            Matrix3::identity(),
            Point3::origin(),
        )));

        assert_eq!(set.len(), 2);
        assert!(set.contains(BodyId::new(3)));
        assert!(set.get(BodyId::new(5)).is_some());
        assert!(set.get(BodyId::new(9)).is_none());
    }
}
