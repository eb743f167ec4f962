//! Friction models and MLCP construction.
//!
//! Each model maps assembled problem data to a mixed complementarity
//! problem over the variable layout
//!
//! ```text
//! z = [ cn | friction | slack | limits | bilateral ]
//! ```
//!
//! where the friction block and the slack block exist only for the models
//! that need them. Bilateral rows are always free variables; the bounded
//! solvers pin their `w` to zero.

use crate::problem::ImpactProblemData;
use impact_types::{DMatrix, DVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Friction model applied to a component's contacts.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrictionModel {
    /// Normal and limit impulses only.
    Frictionless,
    /// Tangential impulse proportional to the pre-impact tangential
    /// velocity, applied directly without LCP variables.
    Viscous {
        /// Viscous friction coefficient.
        coefficient: f64,
    },
    /// Polyhedral Coulomb cone over the contact's tangent fan, with one
    /// slack variable per contact.
    AnitescuPotra,
    /// Tangential velocities pinned to zero through bilateral rows.
    NoSlip,
}

/// Index layout of the MLCP variable vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableLayout {
    /// Number of normal-impulse variables.
    pub n_contacts: usize,
    /// Number of friction variables.
    pub n_friction: usize,
    /// Number of cone slack variables.
    pub n_slack: usize,
    /// Number of limit-impulse variables.
    pub n_limits: usize,
    /// Number of bilateral variables.
    pub n_bilateral: usize,
}

impl VariableLayout {
    /// Total variable count.
    #[must_use]
    pub fn total(&self) -> usize {
        self.n_contacts + self.n_friction + self.n_slack + self.n_limits + self.n_bilateral
    }

    /// Offset of the normal-impulse block.
    #[must_use]
    pub fn contact_offset(&self) -> usize {
        0
    }

    /// Offset of the friction block.
    #[must_use]
    pub fn friction_offset(&self) -> usize {
        self.n_contacts
    }

    /// Offset of the slack block.
    #[must_use]
    pub fn slack_offset(&self) -> usize {
        self.n_contacts + self.n_friction
    }

    /// Offset of the limit block.
    #[must_use]
    pub fn limit_offset(&self) -> usize {
        self.n_contacts + self.n_friction + self.n_slack
    }

    /// Offset of the bilateral block.
    #[must_use]
    pub fn bilateral_offset(&self) -> usize {
        self.n_contacts + self.n_friction + self.n_slack + self.n_limits
    }
}

/// A mixed LCP built from problem data, with the bookkeeping needed to
/// translate its solution back into generalized impulses.
#[derive(Debug)]
pub struct MlcpProblem {
    /// System matrix.
    pub m: DMatrix<f64>,
    /// Constant vector (pre-impact constraint velocities).
    pub q: DVector<f64>,
    /// Lower bounds (`-inf` marks a free variable).
    pub l: DVector<f64>,
    /// Upper bounds.
    pub u: DVector<f64>,
    /// Variable layout.
    pub layout: VariableLayout,
    /// Stacked impulse-direction rows aligned with `z` (zero rows for
    /// slack variables): the generalized impulse is `j_full^T z`.
    pub j_full: DMatrix<f64>,
    /// Generalized impulse applied ahead of the solve (viscous model),
    /// already reflected in `q`.
    pub pre_impulse: Option<DVector<f64>>,
}

impl MlcpProblem {
    /// Whether every variable has the plain LCP bounds `[0, inf)`.
    #[must_use]
    pub fn is_plain_lcp(&self) -> bool {
        self.l.iter().all(|&x| x == 0.0) && self.u.iter().all(|&x| x == f64::INFINITY)
    }
}

/// Copy `block` into `m` at the given offsets.
fn fill(m: &mut DMatrix<f64>, row: usize, col: usize, block: &DMatrix<f64>) {
    m.view_mut((row, col), (block.nrows(), block.ncols()))
        .copy_from(block);
}

/// Build the MLCP for a component under the given friction model.
#[must_use]
pub fn build_mlcp(data: &ImpactProblemData, model: &FrictionModel) -> MlcpProblem {
    match model {
        FrictionModel::Frictionless => build_unilateral(data, None),
        FrictionModel::Viscous { coefficient } => {
            // Tangential impulse -c * (Cs v, Ct v) applied outright; the
            // unilateral problem then sees the adjusted velocities.
            let imp = data.cs_dense.transpose() * (&data.cs_v * -*coefficient)
                + data.ct_dense.transpose() * (&data.ct_v * -*coefficient);
            build_unilateral(data, Some(imp))
        }
        FrictionModel::AnitescuPotra => build_anitescu_potra(data),
        FrictionModel::NoSlip => build_no_slip(data),
    }
}

/// Normal + limit + bilateral rows; optionally with a pre-applied
/// generalized impulse folded into the constant vector.
fn build_unilateral(data: &ImpactProblemData, pre_impulse: Option<DVector<f64>>) -> MlcpProblem {
    let n_c = data.num_contacts();
    let n_l = data.num_limits();
    let n_x = data.jx_dense.nrows();
    let layout = VariableLayout {
        n_contacts: n_c,
        n_friction: 0,
        n_slack: 0,
        n_limits: n_l,
        n_bilateral: n_x,
    };
    let n = layout.total();

    let mut m = DMatrix::zeros(n, n);
    let c0 = layout.contact_offset();
    let l0 = layout.limit_offset();
    let x0 = layout.bilateral_offset();

    fill(&mut m, c0, c0, &(&data.cn_dense * &data.w_cn_t));
    fill(&mut m, c0, l0, &(&data.cn_dense * &data.w_l_t));
    fill(&mut m, c0, x0, &(&data.cn_dense * &data.w_jx_t));
    fill(&mut m, l0, c0, &(&data.l_dense * &data.w_cn_t));
    fill(&mut m, l0, l0, &(&data.l_dense * &data.w_l_t));
    fill(&mut m, l0, x0, &(&data.l_dense * &data.w_jx_t));
    fill(&mut m, x0, c0, &(&data.jx_dense * &data.w_cn_t));
    fill(&mut m, x0, l0, &(&data.jx_dense * &data.w_l_t));
    fill(&mut m, x0, x0, &(&data.jx_dense * &data.w_jx_t));

    let mut q = DVector::zeros(n);
    q.rows_mut(c0, n_c).copy_from(&data.cn_v);
    q.rows_mut(l0, n_l).copy_from(&data.l_v);
    q.rows_mut(x0, n_x).copy_from(&data.jx_v);

    let mut j_full = DMatrix::zeros(n, data.n_coords);
    fill(&mut j_full, c0, 0, &data.cn_dense);
    fill(&mut j_full, l0, 0, &data.l_dense);
    fill(&mut j_full, x0, 0, &data.jx_dense);

    // Fold a pre-applied impulse into the constant vector: the rows see
    // the velocity delta it produces.
    if let Some(imp) = &pre_impulse {
        // dv = M^-1 imp, row deltas = J dv. The cached products give
        // J M^-1 through their transposes.
        let dq_c = data.w_cn_t.transpose() * imp;
        let dq_l = data.w_l_t.transpose() * imp;
        let dq_x = data.w_jx_t.transpose() * imp;
        for i in 0..n_c {
            q[c0 + i] += dq_c[i];
        }
        for i in 0..n_l {
            q[l0 + i] += dq_l[i];
        }
        for i in 0..n_x {
            q[x0 + i] += dq_x[i];
        }
    }

    let mut l = DVector::zeros(n);
    let mut u = DVector::from_element(n, f64::INFINITY);
    for i in 0..n_x {
        l[x0 + i] = f64::NEG_INFINITY;
        u[x0 + i] = f64::INFINITY;
    }

    MlcpProblem {
        m,
        q,
        l,
        u,
        layout,
        j_full,
        pre_impulse,
    }
}

/// The polyhedral-cone coupling: friction rows pick up `+lambda`, slack
/// rows enforce `mu cn - sum(beta) >= 0`.
fn build_anitescu_potra(data: &ImpactProblemData) -> MlcpProblem {
    let n_c = data.num_contacts();
    let n_d = data.d_dense.nrows();
    let n_l = data.num_limits();
    let n_x = data.jx_dense.nrows();
    let layout = VariableLayout {
        n_contacts: n_c,
        n_friction: n_d,
        n_slack: n_c,
        n_limits: n_l,
        n_bilateral: n_x,
    };
    let n = layout.total();

    let c0 = layout.contact_offset();
    let f0 = layout.friction_offset();
    let s0 = layout.slack_offset();
    let l0 = layout.limit_offset();
    let x0 = layout.bilateral_offset();

    let mut m = DMatrix::zeros(n, n);

    // Velocity-coupled blocks.
    fill(&mut m, c0, c0, &(&data.cn_dense * &data.w_cn_t));
    fill(&mut m, c0, f0, &(&data.cn_dense * &data.w_d_t));
    fill(&mut m, c0, l0, &(&data.cn_dense * &data.w_l_t));
    fill(&mut m, c0, x0, &(&data.cn_dense * &data.w_jx_t));

    fill(&mut m, f0, c0, &(&data.d_dense * &data.w_cn_t));
    fill(&mut m, f0, f0, &(&data.d_dense * &data.w_d_t));
    fill(&mut m, f0, l0, &(&data.d_dense * &data.w_l_t));
    fill(&mut m, f0, x0, &(&data.d_dense * &data.w_jx_t));

    fill(&mut m, l0, c0, &(&data.l_dense * &data.w_cn_t));
    fill(&mut m, l0, f0, &(&data.l_dense * &data.w_d_t));
    fill(&mut m, l0, l0, &(&data.l_dense * &data.w_l_t));
    fill(&mut m, l0, x0, &(&data.l_dense * &data.w_jx_t));

    fill(&mut m, x0, c0, &(&data.jx_dense * &data.w_cn_t));
    fill(&mut m, x0, f0, &(&data.jx_dense * &data.w_d_t));
    fill(&mut m, x0, l0, &(&data.jx_dense * &data.w_l_t));
    fill(&mut m, x0, x0, &(&data.jx_dense * &data.w_jx_t));

    // Cone coupling: friction rows gain the slack, slack rows read
    // mu * cn - sum of that contact's friction impulses.
    let mut fan_off = 0;
    for (i, fan) in data.fan_dirs.iter().enumerate() {
        let rows = 2 * fan.len();
        m[(s0 + i, c0 + i)] = data.mu[i];
        for k in 0..rows {
            m[(f0 + fan_off + k, s0 + i)] = 1.0;
            m[(s0 + i, f0 + fan_off + k)] = -1.0;
        }
        fan_off += rows;
    }

    let mut q = DVector::zeros(n);
    q.rows_mut(c0, n_c).copy_from(&data.cn_v);
    q.rows_mut(f0, n_d).copy_from(&data.d_v);
    q.rows_mut(l0, n_l).copy_from(&data.l_v);
    q.rows_mut(x0, n_x).copy_from(&data.jx_v);

    let mut j_full = DMatrix::zeros(n, data.n_coords);
    fill(&mut j_full, c0, 0, &data.cn_dense);
    fill(&mut j_full, f0, 0, &data.d_dense);
    fill(&mut j_full, l0, 0, &data.l_dense);
    fill(&mut j_full, x0, 0, &data.jx_dense);

    let mut l = DVector::zeros(n);
    let mut u = DVector::from_element(n, f64::INFINITY);
    for i in 0..n_x {
        l[x0 + i] = f64::NEG_INFINITY;
    }

    MlcpProblem {
        m,
        q,
        l,
        u,
        layout,
        j_full,
        pre_impulse: None,
    }
}

/// Tangential rows as free variables: the solver drives their `w`
/// (tangential velocity) to zero.
fn build_no_slip(data: &ImpactProblemData) -> MlcpProblem {
    let n_c = data.num_contacts();
    let n_l = data.num_limits();
    let n_x = data.jx_dense.nrows();
    let layout = VariableLayout {
        n_contacts: n_c,
        n_friction: 2 * n_c,
        n_slack: 0,
        n_limits: n_l,
        n_bilateral: n_x,
    };
    let n = layout.total();

    let c0 = layout.contact_offset();
    let f0 = layout.friction_offset();
    let l0 = layout.limit_offset();
    let x0 = layout.bilateral_offset();

    // Stack [Cs; Ct] as the friction block.
    let mut st_dense = DMatrix::zeros(2 * n_c, data.n_coords);
    fill(&mut st_dense, 0, 0, &data.cs_dense);
    fill(&mut st_dense, n_c, 0, &data.ct_dense);
    let mut w_st_t = DMatrix::zeros(data.n_coords, 2 * n_c);
    w_st_t.view_mut((0, 0), (data.n_coords, n_c)).copy_from(&data.w_cs_t);
    w_st_t
        .view_mut((0, n_c), (data.n_coords, n_c))
        .copy_from(&data.w_ct_t);

    let mut m = DMatrix::zeros(n, n);
    fill(&mut m, c0, c0, &(&data.cn_dense * &data.w_cn_t));
    fill(&mut m, c0, f0, &(&data.cn_dense * &w_st_t));
    fill(&mut m, c0, l0, &(&data.cn_dense * &data.w_l_t));
    fill(&mut m, c0, x0, &(&data.cn_dense * &data.w_jx_t));

    fill(&mut m, f0, c0, &(&st_dense * &data.w_cn_t));
    fill(&mut m, f0, f0, &(&st_dense * &w_st_t));
    fill(&mut m, f0, l0, &(&st_dense * &data.w_l_t));
    fill(&mut m, f0, x0, &(&st_dense * &data.w_jx_t));

    fill(&mut m, l0, c0, &(&data.l_dense * &data.w_cn_t));
    fill(&mut m, l0, f0, &(&data.l_dense * &w_st_t));
    fill(&mut m, l0, l0, &(&data.l_dense * &data.w_l_t));
    fill(&mut m, l0, x0, &(&data.l_dense * &data.w_jx_t));

    fill(&mut m, x0, c0, &(&data.jx_dense * &data.w_cn_t));
    fill(&mut m, x0, f0, &(&data.jx_dense * &w_st_t));
    fill(&mut m, x0, l0, &(&data.jx_dense * &data.w_l_t));
    fill(&mut m, x0, x0, &(&data.jx_dense * &data.w_jx_t));

    let mut q = DVector::zeros(n);
    q.rows_mut(c0, n_c).copy_from(&data.cn_v);
    q.rows_mut(f0, n_c).copy_from(&data.cs_v);
    q.rows_mut(f0 + n_c, n_c).copy_from(&data.ct_v);
    q.rows_mut(l0, n_l).copy_from(&data.l_v);
    q.rows_mut(x0, n_x).copy_from(&data.jx_v);

    let mut j_full = DMatrix::zeros(n, data.n_coords);
    fill(&mut j_full, c0, 0, &data.cn_dense);
    fill(&mut j_full, f0, 0, &st_dense);
    fill(&mut j_full, l0, 0, &data.l_dense);
    fill(&mut j_full, x0, 0, &data.jx_dense);

    let mut l = DVector::zeros(n);
    let u = DVector::from_element(n, f64::INFINITY);
    for i in 0..2 * n_c {
        l[f0 + i] = f64::NEG_INFINITY;
    }
    for i in 0..n_x {
        l[x0 + i] = f64::NEG_INFINITY;
    }

    MlcpProblem {
        m,
        q,
        l,
        u,
        layout,
        j_full,
        pre_impulse: None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::{ConstraintIslands, ContactConstraint, ImpactProblemData, UnilateralConstraint};
    use approx::assert_relative_eq;
    use impact_types::{BodyId, BodySet, GeomId, Matrix3, Point3, RigidBody, Vector3};

    fn data(mu: f64) -> (ImpactProblemData, Vec<UnilateralConstraint>) {
        let mut bodies = BodySet::new();
        bodies.insert(Box::new(
            RigidBody::new(
                BodyId::new(0),
                1.0,
                Matrix3::identity() * 0.4,
                Point3::new(0.0, 2.0, 0.0),
            )
            .with_velocity(Vector3::new(0.3, -1.0, 0.0), Vector3::zeros()),
        ));
        bodies.insert(Box::new(RigidBody::fixed(BodyId::new(1), Point3::origin())));

        let contact = ContactConstraint::new(
            GeomId::new(0),
            GeomId::new(1),
            BodyId::new(0),
            BodyId::new(1),
            Point3::new(0.0, 1.0, 0.0),
            Vector3::y(),
        )
        .with_friction(mu);
        let constraints = vec![UnilateralConstraint::Contact(contact)];
        let islands = ConstraintIslands::build(&constraints);
        let d = ImpactProblemData::assemble(&constraints, &islands.islands()[0], &bodies, &[], -1.0)
            .unwrap();
        (d, constraints)
    }

    #[test]
    fn test_frictionless_layout() {
        let (d, _) = data(0.0);
        let p = build_mlcp(&d, &FrictionModel::Frictionless);
        assert_eq!(p.layout.total(), 1);
        assert!(p.is_plain_lcp());
        // q is the approach velocity.
        assert_relative_eq!(p.q[0], -1.0, epsilon = 1e-12);
        // Effective mass against a fixed body is 1/m.
        assert_relative_eq!(p.m[(0, 0)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_anitescu_potra_layout() {
        let (d, _) = data(0.5);
        let p = build_mlcp(&d, &FrictionModel::AnitescuPotra);
        // 1 normal + 4 friction + 1 slack.
        assert_eq!(p.layout.total(), 6);
        assert!(p.is_plain_lcp());
        // Slack row: mu on the normal column, -1 on the friction columns.
        let s = p.layout.slack_offset();
        let f = p.layout.friction_offset();
        assert_relative_eq!(p.m[(s, 0)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(p.m[(s, f)], -1.0, epsilon = 1e-12);
        assert_relative_eq!(p.m[(f, s)], 1.0, epsilon = 1e-12);
        // Slack rows carry no impulse.
        assert_relative_eq!(p.j_full.row(s).norm(), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_no_slip_has_free_friction_rows() {
        let (d, _) = data(0.5);
        let p = build_mlcp(&d, &FrictionModel::NoSlip);
        assert_eq!(p.layout.total(), 3);
        assert!(!p.is_plain_lcp());
        let f = p.layout.friction_offset();
        assert_eq!(p.l[f], f64::NEG_INFINITY);
        assert_eq!(p.l[0], 0.0);
    }

    #[test]
    fn test_viscous_adjusts_q() {
        let (d, _) = data(0.0);
        let plain = build_mlcp(&d, &FrictionModel::Frictionless);
        let viscous = build_mlcp(&d, &FrictionModel::Viscous { coefficient: 0.5 });
        assert!(viscous.pre_impulse.is_some());
        // The tangential velocity (0.3 in x) produces an impulse that
        // cannot change the normal row here (orthogonal directions), so q
        // is unchanged; the impulse itself is nonzero.
        assert_relative_eq!(viscous.q[0], plain.q[0], epsilon = 1e-12);
        assert!(viscous.pre_impulse.as_ref().unwrap().norm() > 0.0);
    }
}
