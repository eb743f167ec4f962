//! Narrow-phase contact generation.
//!
//! Produces a minimal set of contact records from two touching or
//! interpenetrating geometries. Specialized closed-form paths cover the
//! sphere/sphere and box/sphere pairs; every other pair goes through the
//! generic vertex-vs-surface query, which resolves shallow interpenetration
//! and the standard touching case.

use crate::{CollisionGeometry, Shape};
use impact_types::{BodyId, GeomId};
use nalgebra::{Point3, Vector3};
use tracing::trace;

/// A single contact between two geometries.
///
/// The normal points from geometry B into geometry A, matching the
/// convention of the contact constraint assembler.
#[derive(Debug, Clone)]
pub struct ContactRecord {
    /// First geometry.
    pub geom_a: GeomId,
    /// Second geometry.
    pub geom_b: GeomId,
    /// Body owning geometry A.
    pub body_a: BodyId,
    /// Body owning geometry B.
    pub body_b: BodyId,
    /// Contact point in world frame.
    pub point: Point3<f64>,
    /// Unit contact normal in world frame, pointing from B into A.
    pub normal: Vector3<f64>,
}

fn record(
    a: &CollisionGeometry,
    b: &CollisionGeometry,
    point: Point3<f64>,
    normal: Vector3<f64>,
) -> ContactRecord {
    ContactRecord {
        geom_a: a.id(),
        geom_b: b.id(),
        body_a: a.body(),
        body_b: b.body(),
        point,
        normal,
    }
}

/// Determine contact data between two geometries that are touching or
/// interpenetrating.
///
/// Returns at least one contact when the geometries are within `eps_near`
/// of touching, and an empty vector otherwise. There are no error paths.
#[must_use]
pub fn find_contacts(
    a: &CollisionGeometry,
    b: &CollisionGeometry,
    eps_near: f64,
) -> Vec<ContactRecord> {
    match (a.shape(), b.shape()) {
        (Shape::Sphere { .. }, Shape::Sphere { .. }) => contacts_sphere_sphere(a, b),
        (Shape::Sphere { .. }, Shape::Cuboid { .. }) => contacts_box_sphere(b, a, eps_near)
            .into_iter()
            .map(|c| flip(c, a, b))
            .collect(),
        (Shape::Cuboid { .. }, Shape::Sphere { .. }) => contacts_box_sphere(a, b, eps_near),
        _ => contacts_generic(a, b, eps_near),
    }
}

/// Re-orient a contact computed with the roles of A and B swapped.
fn flip(c: ContactRecord, a: &CollisionGeometry, b: &CollisionGeometry) -> ContactRecord {
    record(a, b, c.point, -c.normal)
}

/// Generic path: each geometry's boundary vertices against the other's
/// signed-distance query, keeping the candidates nearest the minimum
/// distance.
fn contacts_generic(
    a: &CollisionGeometry,
    b: &CollisionGeometry,
    eps_near: f64,
) -> Vec<ContactRecord> {
    let mut out: Vec<ContactRecord> = Vec::new();
    let mut min_dist = f64::INFINITY;

    // Vertices of A against B.
    for v in a.vertices() {
        let (dist, n) = b.distance_and_normal(&v);
        if dist - eps_near <= min_dist {
            if dist - eps_near < min_dist && min_dist > 0.0 {
                out.clear();
            }
            min_dist = min_dist.min(dist.max(0.0));
            out.push(record(a, b, v, n));
        }
    }

    // Vertices of B against A, with the normal flipped to point B -> A.
    for v in b.vertices() {
        let (dist, n) = a.distance_and_normal(&v);
        if dist - eps_near <= min_dist {
            if dist - eps_near < min_dist && min_dist > 0.0 {
                out.clear();
            }
            min_dist = min_dist.min(dist.max(0.0));
            out.push(record(a, b, v, -n));
        }
    }

    // Only touching/penetrating candidates constitute contacts.
    if min_dist > eps_near {
        trace!(min_dist, "narrow phase: geometries separated");
        return Vec::new();
    }
    out
}

/// Sphere against sphere: one contact, valid for both the touching and the
/// overlapping case.
fn contacts_sphere_sphere(a: &CollisionGeometry, b: &CollisionGeometry) -> Vec<ContactRecord> {
    let (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) = (a.shape(), b.shape())
    else {
        return Vec::new();
    };

    let ca = a.center();
    let cb = b.center();
    let d = ca - cb;
    let len = d.norm();
    let n = if len > 1e-12 { d / len } else { Vector3::z() };

    // Midpoint of the two surface points along the center line.
    let closest_a = ca - n * *ra;
    let closest_b = cb + n * *rb;
    let p = Point3::from((closest_a.coords + closest_b.coords) * 0.5);

    vec![record(a, b, p, n)]
}

/// Box (A) against sphere (B).
fn contacts_box_sphere(
    a: &CollisionGeometry,
    b: &CollisionGeometry,
    eps_near: f64,
) -> Vec<ContactRecord> {
    let (Shape::Cuboid { half_extents }, Shape::Sphere { radius }) = (a.shape(), b.shape()) else {
        return Vec::new();
    };

    // Sphere center in the box frame; closest point on the box.
    let center_world = b.center();
    let center_box = a.pose().inverse_transform_point(&center_world);
    let p_box_local = Shape::cuboid_closest_point(half_extents, &center_box);
    let dist = (center_box - p_box_local).norm() - radius;
    if dist > eps_near {
        return Vec::new();
    }

    // Normal from the box center toward the sphere center.
    let box_center = a.center();
    let n_dir = center_world - box_center;
    let normal = if n_dir.norm() > 1e-12 {
        n_dir.normalize()
    } else {
        Vector3::z()
    };

    // Closest point on the sphere surface toward the box.
    let p_sphere = center_world - normal * (*radius + dist.min(0.0));
    let p_box = a.pose().transform_point(&p_box_local);

    // Separated within tolerance: midpoint. Penetrating: the sphere point.
    let p = if dist > 0.0 {
        Point3::from((p_sphere.coords + p_box.coords) * 0.5)
    } else {
        p_sphere
    };

    // Normal convention: B -> A is sphere -> box here, caller flips for the
    // sphere-first ordering. The contact normal must push the sphere out of
    // the box, i.e. point from box into sphere when the sphere is A.
    vec![record(a, b, p, -normal)]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::NEAR_TOLERANCE;
    use approx::assert_relative_eq;
    use nalgebra::Isometry3;

    fn geom(id: u64, body: u64, shape: Shape, pos: (f64, f64, f64)) -> CollisionGeometry {
        CollisionGeometry::new(
            GeomId::new(id),
            BodyId::new(body),
            shape,
            Isometry3::translation(pos.0, pos.1, pos.2),
        )
    }

    #[test]
    fn test_sphere_sphere_touching() {
        let a = geom(0, 0, Shape::sphere(1.0), (0.0, 2.0, 0.0));
        let b = geom(1, 1, Shape::sphere(1.0), (0.0, 0.0, 0.0));
        let contacts = find_contacts(&a, &b, NEAR_TOLERANCE);
        assert_eq!(contacts.len(), 1);

        let c = &contacts[0];
        // Normal is unit, from B to A.
        assert_relative_eq!(c.normal.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!((c.normal - Vector3::y()).norm(), 0.0, epsilon = 1e-12);
        // Contact point on the center line, equidistant from both surfaces.
        assert_relative_eq!(c.point.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(c.point.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(c.point.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_sphere_overlapping() {
        let a = geom(0, 0, Shape::sphere(1.0), (0.0, 1.5, 0.0));
        let b = geom(1, 1, Shape::sphere(1.0), (0.0, 0.0, 0.0));
        let contacts = find_contacts(&a, &b, NEAR_TOLERANCE);
        assert_eq!(contacts.len(), 1);
        // Midpoint of surface points: A surface at 0.5, B surface at 1.0.
        assert_relative_eq!(contacts[0].point.y, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_box_sphere_penetrating() {
        // Box 2x2x2 at origin, sphere r=0.5 at (0, 1.3, 0): penetrating by 0.2.
        let a = geom(0, 0, Shape::cuboid(Vector3::new(1.0, 1.0, 1.0)), (0.0, 0.0, 0.0));
        let b = geom(1, 1, Shape::sphere(0.5), (0.0, 1.3, 0.0));
        let contacts = find_contacts(&a, &b, NEAR_TOLERANCE);
        assert_eq!(contacts.len(), 1);

        let c = &contacts[0];
        // Contact at the sphere surface point toward the box.
        assert_relative_eq!(c.point.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(c.point.y, 1.0, epsilon = 1e-9);
        assert_relative_eq!(c.point.z, 0.0, epsilon = 1e-12);
        // Normal pushes the sphere (B) out: from B into A is -y here, since
        // A is the box.
        assert_relative_eq!((c.normal + Vector3::y()).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_box_order_flips_normal() {
        let box_geom = geom(0, 0, Shape::cuboid(Vector3::new(1.0, 1.0, 1.0)), (0.0, 0.0, 0.0));
        let sph_geom = geom(1, 1, Shape::sphere(0.5), (0.0, 1.3, 0.0));

        let ab = find_contacts(&box_geom, &sph_geom, NEAR_TOLERANCE);
        let ba = find_contacts(&sph_geom, &box_geom, NEAR_TOLERANCE);
        assert_eq!(ab.len(), 1);
        assert_eq!(ba.len(), 1);
        assert_relative_eq!((ab[0].normal + ba[0].normal).norm(), 0.0, epsilon = 1e-12);
        // Sphere-first: normal from box (B) into sphere (A) is +y.
        assert_relative_eq!((ba[0].normal - Vector3::y()).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_box_sphere_separated() {
        let a = geom(0, 0, Shape::cuboid(Vector3::new(1.0, 1.0, 1.0)), (0.0, 0.0, 0.0));
        let b = geom(1, 1, Shape::sphere(0.5), (0.0, 5.0, 0.0));
        assert!(find_contacts(&a, &b, NEAR_TOLERANCE).is_empty());
    }

    #[test]
    fn test_generic_path_box_on_plane() {
        // Unit box resting exactly on the z=0 plane: the four bottom
        // vertices are the contact set.
        let plane = geom(0, 0, Shape::Plane, (0.0, 0.0, 0.0));
        let cube = geom(1, 1, Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)), (0.0, 0.0, 0.5));
        let contacts = find_contacts(&cube, &plane, NEAR_TOLERANCE);
        assert_eq!(contacts.len(), 4);
        for c in &contacts {
            assert_relative_eq!(c.point.z, 0.0, epsilon = 1e-12);
            assert_relative_eq!((c.normal - Vector3::z()).norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_generic_path_separated() {
        let plane = geom(0, 0, Shape::Plane, (0.0, 0.0, 0.0));
        let cube = geom(1, 1, Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)), (0.0, 0.0, 2.0));
        assert!(find_contacts(&cube, &plane, NEAR_TOLERANCE).is_empty());
    }

    #[test]
    fn test_generic_path_penetrating_keeps_deepest() {
        // Box pushed 0.1 into the plane: bottom vertices all at -0.1.
        let plane = geom(0, 0, Shape::Plane, (0.0, 0.0, 0.0));
        let cube = geom(1, 1, Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)), (0.0, 0.0, 0.4));
        let contacts = find_contacts(&cube, &plane, NEAR_TOLERANCE);
        assert_eq!(contacts.len(), 4);
        for c in &contacts {
            assert_relative_eq!(c.point.z, -0.1, epsilon = 1e-12);
        }
    }
}
