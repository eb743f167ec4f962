//! Oriented bounding boxes.
//!
//! Broad- and mid-phase culling volume with three numerically subtle
//! operations: the 15-axis separating-axis overlap test (cushioned against
//! parallel-edge cross products), the slab-method ray/segment test, and
//! velocity expansion for swept collision checks.

use crate::NEAR_TOLERANCE;
use nalgebra::{Matrix3, Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An oriented bounding box: center, axis orientation, and half extents.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Obb {
    /// Box center in world frame.
    pub center: Point3<f64>,
    /// Rotation whose columns are the box's local axes in world frame.
    pub axes: Matrix3<f64>,
    /// Half extent along each local axis.
    pub half_extents: Vector3<f64>,
}

impl Obb {
    /// Create an OBB from center, axes, and half extents.
    #[must_use]
    pub fn new(center: Point3<f64>, axes: Matrix3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            center,
            axes,
            half_extents,
        }
    }

    /// Axis-aligned OBB from center and half extents.
    #[must_use]
    pub fn axis_aligned(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self::new(center, Matrix3::identity(), half_extents)
    }

    /// The eight corner vertices in world frame.
    #[must_use]
    pub fn vertices(&self) -> [Point3<f64>; 8] {
        let mut out = [Point3::origin(); 8];
        let mut k = 0;
        for &sx in &[-1.0, 1.0] {
            for &sy in &[-1.0, 1.0] {
                for &sz in &[-1.0, 1.0] {
                    let local = Vector3::new(
                        sx * self.half_extents.x,
                        sy * self.half_extents.y,
                        sz * self.half_extents.z,
                    );
                    out[k] = self.center + self.axes * local;
                    k += 1;
                }
            }
        }
        out
    }

    /// Squared distance from a point to the box (zero inside).
    #[must_use]
    pub fn sq_dist_to_point(&self, p: &Point3<f64>) -> f64 {
        let local = self.axes.transpose() * (p - self.center);
        let mut sq = 0.0;
        for i in 0..3 {
            let over = local[i].abs() - self.half_extents[i];
            if over > 0.0 {
                sq += over * over;
            }
        }
        sq
    }

    /// Whether a point lies inside or on the box, within `tol` per axis.
    #[must_use]
    pub fn contains_point(&self, p: &Point3<f64>, tol: f64) -> bool {
        let local = self.axes.transpose() * (p - self.center);
        (0..3).all(|i| local[i].abs() <= self.half_extents[i] + tol)
    }

    /// Separating-axis overlap test over the 15 candidate axes (3 face
    /// axes of each box plus the 9 edge cross products).
    ///
    /// Each `|R_ij|` carries a `NEAR_TOLERANCE` cushion so nearly parallel
    /// edges do not produce false separations from a vanishing cross
    /// product.
    #[must_use]
    pub fn intersects(a: &Self, b: &Self) -> bool {
        let (al, bl) = (&a.half_extents, &b.half_extents);

        // Rotation expressing b in a's frame, and the translation in a's
        // frame.
        let r = a.axes.transpose() * b.axes;
        let t = a.axes.transpose() * (b.center - a.center);

        let mut abs_r = Matrix3::zeros();
        for i in 0..3 {
            for j in 0..3 {
                abs_r[(i, j)] = r[(i, j)].abs() + NEAR_TOLERANCE;
            }
        }

        // Face axes of a.
        for i in 0..3 {
            let ra = al[i];
            let rb = bl.x * abs_r[(i, 0)] + bl.y * abs_r[(i, 1)] + bl.z * abs_r[(i, 2)];
            if t[i].abs() > ra + rb {
                return false;
            }
        }

        // Face axes of b.
        for j in 0..3 {
            let ra = al.x * abs_r[(0, j)] + al.y * abs_r[(1, j)] + al.z * abs_r[(2, j)];
            let rb = bl[j];
            let proj = t.x * r[(0, j)] + t.y * r[(1, j)] + t.z * r[(2, j)];
            if proj.abs() > ra + rb {
                return false;
            }
        }

        // Cross products a_i x b_j.
        for i in 0..3 {
            let (i1, i2) = ((i + 1) % 3, (i + 2) % 3);
            for j in 0..3 {
                let (j1, j2) = ((j + 1) % 3, (j + 2) % 3);
                let ra = al[i1] * abs_r[(i2, j)] + al[i2] * abs_r[(i1, j)];
                let rb = bl[j1] * abs_r[(i, j2)] + bl[j2] * abs_r[(i, j1)];
                let proj = t[i2] * r[(i1, j)] - t[i1] * r[(i2, j)];
                if proj.abs() > ra + rb {
                    return false;
                }
            }
        }

        true
    }

    /// Slab-method intersection with the segment `origin + t * dir`,
    /// `t in [tmin, tmax]`.
    ///
    /// Returns the entry parameter and entry point when hitting. A segment
    /// parallel to a slab misses unless its origin lies within that slab.
    #[must_use]
    pub fn intersects_ray(
        &self,
        origin: &Point3<f64>,
        dir: &Vector3<f64>,
        tmin: f64,
        tmax: f64,
    ) -> Option<(f64, Point3<f64>)> {
        let p = self.axes.transpose() * (origin - self.center);
        let d = self.axes.transpose() * dir;

        let mut t0 = tmin;
        let mut t1 = tmax;
        for i in 0..3 {
            let h = self.half_extents[i];
            if d[i].abs() < NEAR_TOLERANCE {
                if p[i] < -h || p[i] > h {
                    return None;
                }
            } else {
                let ood = 1.0 / d[i];
                let mut ta = (-h - p[i]) * ood;
                let mut tb = (h - p[i]) * ood;
                if ta > tb {
                    std::mem::swap(&mut ta, &mut tb);
                }
                t0 = t0.max(ta);
                t1 = t1.min(tb);
                if t0 > t1 + NEAR_TOLERANCE {
                    return None;
                }
            }
        }

        let q = self.center + self.axes * (p + d * t0);
        Some((t0, q))
    }

    /// The box swept along a displacement, keeping the original axes:
    /// the center shifts by half the displacement and each extent grows by
    /// half the displacement's projection on that axis.
    #[must_use]
    pub fn swept(&self, displacement: &Vector3<f64>) -> Self {
        if displacement.norm_squared() < f64::EPSILON {
            return self.clone();
        }
        let local = self.axes.transpose() * displacement;
        Self {
            center: self.center + displacement * 0.5,
            axes: self.axes,
            half_extents: self.half_extents + local.abs() * 0.5,
        }
    }

    /// Velocity-expanded OBB: grows the box to bound everything it can
    /// sweep through during `dt` at the given body velocities.
    ///
    /// The translational part sweeps the box along `lin_vel * dt`. The
    /// rotational part bounds each vertex's arc by its swept radius
    /// `||omega x r||`, projected on three orthogonal directions derived
    /// from the rotation axis, and unions the result with the swept box.
    /// The orientation of the box never changes.
    #[must_use]
    pub fn expanded_by_velocity(
        &self,
        lin_vel: &Vector3<f64>,
        ang_vel: &Vector3<f64>,
        dt: f64,
    ) -> Self {
        // Linear expansion.
        let o = if lin_vel.norm() * dt <= NEAR_TOLERANCE {
            self.clone()
        } else {
            self.swept(&(lin_vel * dt))
        };

        let w_norm = ang_vel.norm();
        if w_norm < NEAR_TOLERANCE {
            return o;
        }

        // Work in the box-axis frame.
        let w = o.axes.transpose() * ang_vel;
        let wn = w / w_norm;

        // Projector onto the plane orthogonal to the rotation axis.
        let proj = Matrix3::identity() - wn * wn.transpose();

        // Three directions spanning the swept plane, biased toward each
        // coordinate axis.
        let c = proj * Vector3::new(w.x.abs() + 1.0, w.y, w.z);
        let d = proj * Vector3::new(w.x, w.y.abs() + 1.0, w.z);
        let e = proj * Vector3::new(w.x, w.y, w.z.abs() + 1.0);
        let c_hat = normalized_or_zero(&c);
        let d_hat = normalized_or_zero(&d);
        let e_hat = normalized_or_zero(&e);

        // Current bounds in the box-axis frame.
        let center_local = o.axes.transpose() * o.center.coords;
        let mut min_b = center_local - o.half_extents;
        let mut max_b = center_local + o.half_extents;

        for &sx in &[-1.0, 1.0] {
            for &sy in &[-1.0, 1.0] {
                for &sz in &[-1.0, 1.0] {
                    let corner = Vector3::new(
                        sx * o.half_extents.x,
                        sy * o.half_extents.y,
                        sz * o.half_extents.z,
                    );
                    let r = center_local + corner;

                    // Swept radius of this vertex around the rotation axis.
                    let arc = wn.cross(&r).norm();
                    let l_prime = Vector3::new(
                        c_hat.x.abs() * arc,
                        d_hat.y.abs() * arc,
                        e_hat.z.abs() * arc,
                    );

                    // The vertex's rotation circle is centered on its axial
                    // projection.
                    let circle_center = wn * wn.dot(&r);
                    for k in 0..3 {
                        min_b[k] = min_b[k].min(circle_center[k] - l_prime[k]);
                        max_b[k] = max_b[k].max(circle_center[k] + l_prime[k]);
                    }
                }
            }
        }

        let new_center_local = (min_b + max_b) * 0.5;
        Self {
            center: Point3::from(o.axes * new_center_local),
            axes: o.axes,
            half_extents: (max_b - min_b) * 0.5,
        }
    }
}

fn normalized_or_zero(v: &Vector3<f64>) -> Vector3<f64> {
    let n = v.norm();
    if n > NEAR_TOLERANCE {
        v / n
    } else {
        Vector3::zeros()
    }
}
