//! A posed collision shape owned by a body.

use crate::Shape;
use impact_types::{BodyId, GeomId};
use nalgebra::{Isometry3, Point3, Vector3};

/// A collision geometry: a [`Shape`] with a world pose and an owning body.
///
/// This is the contact boundary the narrow phase works against: it answers
/// world-frame vertex and signed-distance queries by transforming through
/// the pose.
#[derive(Debug, Clone)]
pub struct CollisionGeometry {
    id: GeomId,
    body: BodyId,
    shape: Shape,
    pose: Isometry3<f64>,
}

impl CollisionGeometry {
    /// Create a geometry with the given pose.
    #[must_use]
    pub fn new(id: GeomId, body: BodyId, shape: Shape, pose: Isometry3<f64>) -> Self {
        Self {
            id,
            body,
            shape,
            pose,
        }
    }

    /// The geometry identifier.
    #[must_use]
    pub fn id(&self) -> GeomId {
        self.id
    }

    /// The owning body.
    #[must_use]
    pub fn body(&self) -> BodyId {
        self.body
    }

    /// The underlying shape.
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The world pose.
    #[must_use]
    pub fn pose(&self) -> &Isometry3<f64> {
        &self.pose
    }

    /// Update the world pose.
    pub fn set_pose(&mut self, pose: Isometry3<f64>) {
        self.pose = pose;
    }

    /// World position of the shape's local origin.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        self.pose.translation.vector.into()
    }

    /// Boundary vertex samples in world frame.
    #[must_use]
    pub fn vertices(&self) -> Vec<Point3<f64>> {
        self.shape
            .boundary_vertices()
            .into_iter()
            .map(|v| self.pose.transform_point(&v))
            .collect()
    }

    /// Signed distance from a world point to the shape surface (negative
    /// inside) and the outward world-frame unit normal.
    #[must_use]
    pub fn distance_and_normal(&self, point: &Point3<f64>) -> (f64, Vector3<f64>) {
        let local = self.pose.inverse_transform_point(point);
        let (d, n_local) = self.shape.signed_distance_and_normal(&local);
        (d, self.pose.transform_vector(&n_local))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_posed_distance() {
        let g = CollisionGeometry::new(
            GeomId::new(0),
            BodyId::new(0),
            Shape::sphere(1.0),
            Isometry3::translation(0.0, 0.0, 5.0),
        );
        let (d, n) = g.distance_and_normal(&Point3::new(0.0, 0.0, 8.0));
        assert_relative_eq!(d, 2.0, epsilon = 1e-12);
        assert_relative_eq!((n - Vector3::z()).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotated_vertices() {
        use std::f64::consts::FRAC_PI_2;
        let pose = Isometry3::rotation(Vector3::z() * FRAC_PI_2);
        let g = CollisionGeometry::new(
            GeomId::new(0),
            BodyId::new(0),
            Shape::cuboid(Vector3::new(1.0, 2.0, 0.5)),
            pose,
        );
        // After a 90 degree z rotation, the +x half-extent maps to +y.
        let verts = g.vertices();
        let max_y = verts.iter().map(|v| v.y).fold(f64::MIN, f64::max);
        assert_relative_eq!(max_y, 1.0, epsilon = 1e-12);
    }
}
