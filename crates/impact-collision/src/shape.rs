//! Shape primitives with local-frame distance queries.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of segments used when sampling circular rims and spheres.
const RING_SEGMENTS: usize = 12;

/// A collision shape primitive, expressed in its own local frame.
///
/// The generic narrow-phase path only needs two queries from a shape:
/// its boundary vertex samples and a signed-distance-and-normal query.
/// Specialized contact paths additionally read the discriminant (e.g.
/// sphere radius, cuboid half extents) directly.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Shape {
    /// Sphere centered at the origin.
    Sphere {
        /// Sphere radius.
        radius: f64,
    },
    /// Axis-aligned box centered at the origin.
    Cuboid {
        /// Half extent along each local axis.
        half_extents: Vector3<f64>,
    },
    /// Cylinder along the local z axis, centered at the origin.
    Cylinder {
        /// Half of the axial length.
        half_height: f64,
        /// Cylinder radius.
        radius: f64,
    },
    /// Cone along the local z axis: base disk at `-half_height`, apex at
    /// `+half_height`.
    Cone {
        /// Half of the axial length.
        half_height: f64,
        /// Base radius.
        radius: f64,
    },
    /// Half-space `z <= 0` with outward normal `+z`.
    Plane,
    /// Regular height grid over the local xy plane.
    Heightfield {
        /// Row-major heights, `rows x cols`.
        heights: Vec<f64>,
        /// Number of grid rows (y direction).
        rows: usize,
        /// Number of grid columns (x direction).
        cols: usize,
        /// Spacing between grid points.
        cell_size: f64,
    },
    /// Triangle mesh, queried through its vertex cloud.
    TriMesh {
        /// Mesh vertices in the local frame.
        vertices: Vec<Point3<f64>>,
    },
}

impl Shape {
    /// Create a sphere.
    #[must_use]
    pub fn sphere(radius: f64) -> Self {
        Self::Sphere { radius }
    }

    /// Create a box from its half extents.
    #[must_use]
    pub fn cuboid(half_extents: Vector3<f64>) -> Self {
        Self::Cuboid { half_extents }
    }

    /// Create a cylinder along local z.
    #[must_use]
    pub fn cylinder(half_height: f64, radius: f64) -> Self {
        Self::Cylinder {
            half_height,
            radius,
        }
    }

    /// Create a cone along local z.
    #[must_use]
    pub fn cone(half_height: f64, radius: f64) -> Self {
        Self::Cone {
            half_height,
            radius,
        }
    }

    /// Boundary vertex samples in the local frame.
    ///
    /// The plane is unbounded and contributes none; contacts against a
    /// plane come from the other geometry's vertices.
    #[must_use]
    pub fn boundary_vertices(&self) -> Vec<Point3<f64>> {
        match self {
            Self::Sphere { radius } => sphere_vertices(*radius),
            Self::Cuboid { half_extents } => cuboid_vertices(half_extents),
            Self::Cylinder {
                half_height,
                radius,
            } => {
                let mut v = ring_vertices(*radius, -half_height);
                v.extend(ring_vertices(*radius, *half_height));
                v
            }
            Self::Cone {
                half_height,
                radius,
            } => {
                let mut v = ring_vertices(*radius, -half_height);
                v.push(Point3::new(0.0, 0.0, *half_height));
                v
            }
            Self::Plane => Vec::new(),
            Self::Heightfield {
                heights,
                rows,
                cols,
                cell_size,
            } => {
                let x0 = -0.5 * (*cols as f64 - 1.0) * cell_size;
                let y0 = -0.5 * (*rows as f64 - 1.0) * cell_size;
                let mut v = Vec::with_capacity(heights.len());
                for r in 0..*rows {
                    for c in 0..*cols {
                        v.push(Point3::new(
                            x0 + c as f64 * cell_size,
                            y0 + r as f64 * cell_size,
                            heights[r * cols + c],
                        ));
                    }
                }
                v
            }
            Self::TriMesh { vertices } => vertices.clone(),
        }
    }

    /// Signed distance from a local-frame point to the shape surface
    /// (negative inside) and the outward unit normal at the closest
    /// surface point.
    #[must_use]
    pub fn signed_distance_and_normal(&self, p: &Point3<f64>) -> (f64, Vector3<f64>) {
        match self {
            Self::Sphere { radius } => {
                let r = p.coords.norm();
                if r < 1e-12 {
                    (-radius, Vector3::z())
                } else {
                    (r - radius, p.coords / r)
                }
            }
            Self::Cuboid { half_extents } => cuboid_distance(half_extents, p),
            Self::Cylinder {
                half_height,
                radius,
            } => cylinder_distance(*half_height, *radius, p),
            Self::Cone {
                half_height,
                radius,
            } => cone_distance(*half_height, *radius, p),
            Self::Plane => (p.z, Vector3::z()),
            Self::Heightfield {
                heights,
                rows,
                cols,
                cell_size,
            } => heightfield_distance(heights, *rows, *cols, *cell_size, p),
            Self::TriMesh { vertices } => trimesh_distance(vertices, p),
        }
    }

    /// Closest point on the surface or interior of a cuboid to `p`, in the
    /// local frame. Used by the box/sphere contact path.
    #[must_use]
    pub fn cuboid_closest_point(half_extents: &Vector3<f64>, p: &Point3<f64>) -> Point3<f64> {
        Point3::new(
            p.x.clamp(-half_extents.x, half_extents.x),
            p.y.clamp(-half_extents.y, half_extents.y),
            p.z.clamp(-half_extents.z, half_extents.z),
        )
    }
}

fn cuboid_vertices(he: &Vector3<f64>) -> Vec<Point3<f64>> {
    let mut v = Vec::with_capacity(8);
    for &sx in &[-1.0, 1.0] {
        for &sy in &[-1.0, 1.0] {
            for &sz in &[-1.0, 1.0] {
                v.push(Point3::new(sx * he.x, sy * he.y, sz * he.z));
            }
        }
    }
    v
}

fn ring_vertices(radius: f64, z: f64) -> Vec<Point3<f64>> {
    (0..RING_SEGMENTS)
        .map(|i| {
            let a = 2.0 * std::f64::consts::PI * i as f64 / RING_SEGMENTS as f64;
            Point3::new(radius * a.cos(), radius * a.sin(), z)
        })
        .collect()
}

fn sphere_vertices(radius: f64) -> Vec<Point3<f64>> {
    let mut v = vec![
        Point3::new(0.0, 0.0, radius),
        Point3::new(0.0, 0.0, -radius),
    ];
    for lat in 1..4 {
        let phi = std::f64::consts::PI * lat as f64 / 4.0;
        let (z, r) = (radius * phi.cos(), radius * phi.sin());
        v.extend(ring_vertices(r, z));
    }
    v
}

fn cuboid_distance(he: &Vector3<f64>, p: &Point3<f64>) -> (f64, Vector3<f64>) {
    let q = Vector3::new(p.x.abs() - he.x, p.y.abs() - he.y, p.z.abs() - he.z);
    let sign = Vector3::new(
        if p.x >= 0.0 { 1.0 } else { -1.0 },
        if p.y >= 0.0 { 1.0 } else { -1.0 },
        if p.z >= 0.0 { 1.0 } else { -1.0 },
    );
    let outside = Vector3::new(q.x.max(0.0), q.y.max(0.0), q.z.max(0.0));
    let out_dist = outside.norm();
    if out_dist > 0.0 {
        let normal = Vector3::new(outside.x * sign.x, outside.y * sign.y, outside.z * sign.z)
            / out_dist;
        return (out_dist, normal);
    }
    // Inside: distance to (and normal of) the nearest face.
    let (mut axis, mut max_q) = (0, q.x);
    if q.y > max_q {
        axis = 1;
        max_q = q.y;
    }
    if q.z > max_q {
        axis = 2;
        max_q = q.z;
    }
    let mut normal = Vector3::zeros();
    normal[axis] = sign[axis];
    (max_q, normal)
}

fn cylinder_distance(hh: f64, radius: f64, p: &Point3<f64>) -> (f64, Vector3<f64>) {
    let rho = (p.x * p.x + p.y * p.y).sqrt();
    let radial = if rho > 1e-12 {
        Vector3::new(p.x / rho, p.y / rho, 0.0)
    } else {
        Vector3::x()
    };
    let d_side = rho - radius;
    let d_cap = p.z.abs() - hh;
    let axial = Vector3::new(0.0, 0.0, if p.z >= 0.0 { 1.0 } else { -1.0 });

    if d_side <= 0.0 && d_cap <= 0.0 {
        // Inside: nearest feature wins.
        if d_side > d_cap {
            (d_side, radial)
        } else {
            (d_cap, axial)
        }
    } else if d_side > 0.0 && d_cap > 0.0 {
        // Outside past a rim edge.
        let dist = (d_side * d_side + d_cap * d_cap).sqrt();
        (dist, (d_side * radial + d_cap * axial) / dist)
    } else if d_side > 0.0 {
        (d_side, radial)
    } else {
        (d_cap, axial)
    }
}

fn cone_distance(hh: f64, radius: f64, p: &Point3<f64>) -> (f64, Vector3<f64>) {
    // Work in the (rho, z) half-plane: the lateral surface is the segment
    // from the base rim (radius, -hh) to the apex (0, hh).
    let rho = (p.x * p.x + p.y * p.y).sqrt();
    let radial = if rho > 1e-12 {
        Vector3::new(p.x / rho, p.y / rho, 0.0)
    } else {
        Vector3::x()
    };

    // Distance to the lateral segment.
    let a = nalgebra::Vector2::new(radius, -hh);
    let b = nalgebra::Vector2::new(0.0, hh);
    let pq = nalgebra::Vector2::new(rho, p.z);
    let ab = b - a;
    let t = ((pq - a).dot(&ab) / ab.norm_squared()).clamp(0.0, 1.0);
    let closest_lat = a + ab * t;
    let d_lat = (pq - closest_lat).norm();

    // Distance to the base disk (z = -hh, rho <= radius).
    let d_base = if rho <= radius {
        (p.z + hh).abs()
    } else {
        let dr = rho - radius;
        let dz = p.z + hh;
        (dr * dr + dz * dz).sqrt()
    };

    // Inside test: between base and apex, within the lateral radius at
    // this height.
    let lateral_rho = (radius * (hh - p.z) / (2.0 * hh)).max(0.0);
    let inside = p.z >= -hh && p.z <= hh && rho <= lateral_rho;

    if inside {
        let d = -(d_lat.min(d_base));
        if d_lat < d_base {
            // Outward lateral normal in (rho, z): perpendicular to ab.
            let n2 = nalgebra::Vector2::new(ab.y, -ab.x).normalize();
            (d, (radial * n2.x + Vector3::z() * n2.y).normalize())
        } else {
            (d, -Vector3::z())
        }
    } else if d_lat < d_base {
        let away = pq - closest_lat;
        let n2 = if d_lat > 1e-12 {
            away / d_lat
        } else {
            nalgebra::Vector2::new(ab.y, -ab.x).normalize()
        };
        (d_lat, (radial * n2.x + Vector3::z() * n2.y).normalize())
    } else {
        (d_base, -Vector3::z())
    }
}

fn heightfield_distance(
    heights: &[f64],
    rows: usize,
    cols: usize,
    cell_size: f64,
    p: &Point3<f64>,
) -> (f64, Vector3<f64>) {
    let x0 = -0.5 * (cols as f64 - 1.0) * cell_size;
    let y0 = -0.5 * (rows as f64 - 1.0) * cell_size;
    let fx = ((p.x - x0) / cell_size).clamp(0.0, cols as f64 - 1.0);
    let fy = ((p.y - y0) / cell_size).clamp(0.0, rows as f64 - 1.0);
    let c0 = (fx as usize).min(cols - 2);
    let r0 = (fy as usize).min(rows - 2);
    let tx = fx - c0 as f64;
    let ty = fy - r0 as f64;

    let h = |r: usize, c: usize| heights[r * cols + c];
    let h00 = h(r0, c0);
    let h01 = h(r0, c0 + 1);
    let h10 = h(r0 + 1, c0);
    let h11 = h(r0 + 1, c0 + 1);
    let height = h00 * (1.0 - tx) * (1.0 - ty) + h01 * tx * (1.0 - ty) + h10 * (1.0 - tx) * ty
        + h11 * tx * ty;

    // Surface gradient gives the normal; vertical distance is a good
    // approximation for shallow slopes.
    let dx = ((h01 - h00) * (1.0 - ty) + (h11 - h10) * ty) / cell_size;
    let dy = ((h10 - h00) * (1.0 - tx) + (h11 - h01) * tx) / cell_size;
    let normal = Vector3::new(-dx, -dy, 1.0).normalize();
    (p.z - height, normal)
}

fn trimesh_distance(vertices: &[Point3<f64>], p: &Point3<f64>) -> (f64, Vector3<f64>) {
    // Vertex-cloud approximation: distance to the nearest vertex with the
    // normal pointing from it toward the query point. Adequate for the
    // generic vertex-vs-surface contact path; meshes needing exact queries
    // should be decomposed into primitives.
    let mut best = f64::INFINITY;
    let mut nearest = Point3::origin();
    for v in vertices {
        let d = (p - v).norm();
        if d < best {
            best = d;
            nearest = *v;
        }
    }
    let dir = p - nearest;
    let n = if best > 1e-12 { dir / best } else { Vector3::z() };
    (best, n)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sphere_distance() {
        let s = Shape::sphere(2.0);
        let (d, n) = s.signed_distance_and_normal(&Point3::new(3.0, 0.0, 0.0));
        assert_relative_eq!(d, 1.0, epsilon = 1e-12);
        assert_relative_eq!((n - Vector3::x()).norm(), 0.0, epsilon = 1e-12);

        let (d, _) = s.signed_distance_and_normal(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(d, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cuboid_distance_outside_face() {
        let b = Shape::cuboid(Vector3::new(1.0, 1.0, 1.0));
        let (d, n) = b.signed_distance_and_normal(&Point3::new(0.0, 0.0, 2.5));
        assert_relative_eq!(d, 1.5, epsilon = 1e-12);
        assert_relative_eq!((n - Vector3::z()).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cuboid_distance_corner() {
        let b = Shape::cuboid(Vector3::new(1.0, 1.0, 1.0));
        let (d, _) = b.signed_distance_and_normal(&Point3::new(2.0, 2.0, 2.0));
        assert_relative_eq!(d, 3.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_cuboid_distance_inside() {
        let b = Shape::cuboid(Vector3::new(1.0, 1.0, 1.0));
        let (d, n) = b.signed_distance_and_normal(&Point3::new(0.2, 0.0, 0.9));
        assert_relative_eq!(d, -0.1, epsilon = 1e-12);
        assert_relative_eq!((n - Vector3::z()).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cuboid_monotonic_under_scaling() {
        // Growing the box shrinks the distance to an outside point.
        let p = Point3::new(0.0, 3.0, 0.0);
        let mut last = f64::INFINITY;
        for scale in [1.0, 1.5, 2.0, 2.5] {
            let b = Shape::cuboid(Vector3::new(scale, scale, scale));
            let (d, _) = b.signed_distance_and_normal(&p);
            assert!(d < last);
            last = d;
        }
    }

    #[test]
    fn test_plane_distance() {
        let (d, n) = Shape::Plane.signed_distance_and_normal(&Point3::new(5.0, 5.0, -0.25));
        assert_relative_eq!(d, -0.25, epsilon = 1e-12);
        assert_relative_eq!((n - Vector3::z()).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cylinder_distance_side() {
        let c = Shape::cylinder(1.0, 0.5);
        let (d, n) = c.signed_distance_and_normal(&Point3::new(1.5, 0.0, 0.0));
        assert_relative_eq!(d, 1.0, epsilon = 1e-12);
        assert_relative_eq!((n - Vector3::x()).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cylinder_distance_cap() {
        let c = Shape::cylinder(1.0, 0.5);
        let (d, n) = c.signed_distance_and_normal(&Point3::new(0.0, 0.0, 1.75));
        assert_relative_eq!(d, 0.75, epsilon = 1e-12);
        assert_relative_eq!((n - Vector3::z()).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cone_apex_and_base() {
        let c = Shape::cone(1.0, 1.0);
        // Below the base center.
        let (d, n) = c.signed_distance_and_normal(&Point3::new(0.0, 0.0, -2.0));
        assert_relative_eq!(d, 1.0, epsilon = 1e-12);
        assert_relative_eq!((n + Vector3::z()).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cuboid_vertices() {
        let b = Shape::cuboid(Vector3::new(1.0, 2.0, 3.0));
        let verts = b.boundary_vertices();
        assert_eq!(verts.len(), 8);
        assert!(verts.iter().any(|v| *v == Point3::new(1.0, 2.0, 3.0)));
        assert!(verts.iter().any(|v| *v == Point3::new(-1.0, -2.0, -3.0)));
    }

    #[test]
    fn test_sphere_vertices_on_surface() {
        let s = Shape::sphere(2.0);
        for v in s.boundary_vertices() {
            assert_relative_eq!(v.coords.norm(), 2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_closest_point_on_cuboid() {
        let he = Vector3::new(1.0, 1.0, 1.0);
        let p = Shape::cuboid_closest_point(&he, &Point3::new(3.0, 0.5, -2.0));
        assert_relative_eq!((p - Point3::new(1.0, 0.5, -1.0)).norm(), 0.0, epsilon = 1e-12);
    }
}
