//! Per-component problem data assembly.
//!
//! For one connected component of constraints, the assembler stacks the
//! generalized coordinates of every incident body, builds the contact,
//! friction, limit, and bilateral Jacobians, and caches the
//! inverse-inertia products and pre-impact constraint velocities the
//! friction models combine into complementarity problems.

use crate::islands::Island;
use crate::sparse::{BlockJacobian, MatrixBlock};
use crate::UnilateralConstraint;
use impact_types::{BodyId, BodySet, DMatrix, DVector, ImpactError, Result, Vector3};
use tracing::debug;

/// One row of a bilateral (implicit joint) constraint, as per-body row
/// segments.
///
/// Each entry pairs a body with the row segment over that body's
/// generalized coordinates; the full row is their concatenation. Rows whose
/// bodies are not all inside a component are ignored when that component
/// assembles (bilateral rows must not couple components).
#[derive(Debug, Clone)]
pub struct BilateralRow {
    /// Per-body row segments.
    pub entries: Vec<(BodyId, DVector<f64>)>,
}

impl BilateralRow {
    /// Create a bilateral row.
    #[must_use]
    pub fn new(entries: Vec<(BodyId, DVector<f64>)>) -> Self {
        Self { entries }
    }
}

/// Assembled problem data for one connected component.
///
/// Row counts: `cn`, `cs`, `ct` have one row per contact; `d_fan` has
/// `2 * friction_dirs` rows per contact (the polyhedral cone directions and
/// their negations); `l_jac` one row per limit; `jx` the full-rank subset
/// of the component's bilateral rows.
#[derive(Debug)]
pub struct ImpactProblemData {
    /// Original indices of the component's contact constraints.
    pub contact_indices: Vec<usize>,
    /// Original indices of the component's limit constraints.
    pub limit_indices: Vec<usize>,
    /// Bodies in the component, in island order.
    pub body_ids: Vec<BodyId>,
    /// Coordinate offset of each body in the stacked vectors.
    pub body_offsets: Vec<usize>,
    /// Total stacked coordinate count.
    pub n_coords: usize,

    /// Stacked pre-impact generalized velocities.
    pub v: DVector<f64>,
    /// Friction coefficient per contact.
    pub mu: Vec<f64>,
    /// Restitution per contact.
    pub contact_restitution: Vec<f64>,
    /// Restitution per limit.
    pub limit_restitution: Vec<f64>,
    /// Cone directions per contact (positive half only).
    pub fan_dirs: Vec<Vec<Vector3<f64>>>,

    /// Normal Jacobian, one row per contact.
    pub cn: BlockJacobian,
    /// First tangent Jacobian.
    pub cs: BlockJacobian,
    /// Second tangent Jacobian.
    pub ct: BlockJacobian,
    /// Polyhedral cone Jacobian, `2 * friction_dirs` rows per contact.
    pub d_fan: BlockJacobian,
    /// Limit Jacobian, one row per limit.
    pub l_jac: BlockJacobian,
    /// Full-rank bilateral Jacobian.
    pub jx: BlockJacobian,

    /// Dense forms of the Jacobians.
    pub cn_dense: DMatrix<f64>,
    /// Dense `cs`.
    pub cs_dense: DMatrix<f64>,
    /// Dense `ct`.
    pub ct_dense: DMatrix<f64>,
    /// Dense `d_fan`.
    pub d_dense: DMatrix<f64>,
    /// Dense `l_jac`.
    pub l_dense: DMatrix<f64>,
    /// Dense `jx`.
    pub jx_dense: DMatrix<f64>,

    /// `M^-1 Cn^T` (stacked coords by contact rows).
    pub w_cn_t: DMatrix<f64>,
    /// `M^-1 Cs^T`.
    pub w_cs_t: DMatrix<f64>,
    /// `M^-1 Ct^T`.
    pub w_ct_t: DMatrix<f64>,
    /// `M^-1 D^T`.
    pub w_d_t: DMatrix<f64>,
    /// `M^-1 L^T`.
    pub w_l_t: DMatrix<f64>,
    /// `M^-1 Jx^T`.
    pub w_jx_t: DMatrix<f64>,

    /// Pre-impact normal velocities `Cn v`.
    pub cn_v: DVector<f64>,
    /// Pre-impact first-tangent velocities.
    pub cs_v: DVector<f64>,
    /// Pre-impact second-tangent velocities.
    pub ct_v: DVector<f64>,
    /// Pre-impact cone-direction velocities.
    pub d_v: DVector<f64>,
    /// Pre-impact limit velocities.
    pub l_v: DVector<f64>,
    /// Pre-impact bilateral velocities.
    pub jx_v: DVector<f64>,
}

impl ImpactProblemData {
    /// Assemble problem data for one island.
    ///
    /// `eps_rank` controls the full-rank selection of bilateral rows; a
    /// non-positive value selects the default relative tolerance.
    ///
    /// # Errors
    ///
    /// Returns [`ImpactError::InvalidBody`] when a constraint references a
    /// body missing from the set, and [`ImpactError::InvalidDof`] when a
    /// limit indexes past a body's coordinates.
    pub fn assemble(
        constraints: &[UnilateralConstraint],
        island: &Island,
        bodies: &BodySet,
        bilateral: &[BilateralRow],
        eps_rank: f64,
    ) -> Result<Self> {
        // Coordinate layout.
        let mut body_offsets = Vec::with_capacity(island.bodies.len());
        let mut n_coords = 0;
        for &id in &island.bodies {
            let body = bodies.get(id).ok_or(ImpactError::InvalidBody(id))?;
            body_offsets.push(n_coords);
            n_coords += body.num_coords();
        }
        let offset_of = |id: BodyId| -> Option<usize> {
            island
                .bodies
                .iter()
                .position(|&b| b == id)
                .map(|i| body_offsets[i])
        };

        // Stacked velocities.
        let mut v = DVector::zeros(n_coords);
        for (k, &id) in island.bodies.iter().enumerate() {
            let body = bodies.get(id).ok_or(ImpactError::InvalidBody(id))?;
            v.rows_mut(body_offsets[k], body.num_coords())
                .copy_from(body.velocity());
        }

        // Split the island's constraints.
        let mut contact_indices = Vec::new();
        let mut limit_indices = Vec::new();
        for &ci in &island.constraints {
            match &constraints[ci] {
                UnilateralConstraint::Contact(_) => contact_indices.push(ci),
                UnilateralConstraint::Limit(_) => limit_indices.push(ci),
            }
        }
        let n_c = contact_indices.len();
        let n_l = limit_indices.len();

        let mut cn = BlockJacobian::new(n_c, n_coords);
        let mut cs = BlockJacobian::new(n_c, n_coords);
        let mut ct = BlockJacobian::new(n_c, n_coords);
        let mut l_jac = BlockJacobian::new(n_l, n_coords);

        let mut mu = Vec::with_capacity(n_c);
        let mut contact_restitution = Vec::with_capacity(n_c);
        let mut fan_dirs = Vec::with_capacity(n_c);
        let mut fan_rows = 0;

        for &ci in &contact_indices {
            let UnilateralConstraint::Contact(c) = &constraints[ci] else {
                continue;
            };
            mu.push(c.friction);
            contact_restitution.push(c.restitution);
            let fan = c.friction_fan();
            fan_rows += 2 * fan.len();
            fan_dirs.push(fan);
        }

        let mut d_fan = BlockJacobian::new(fan_rows, n_coords);

        // Contact rows: direction^T * point Jacobian, positive for body A,
        // negative for body B.
        let mut fan_row = 0;
        for (r, &ci) in contact_indices.iter().enumerate() {
            let UnilateralConstraint::Contact(c) = &constraints[ci] else {
                continue;
            };
            let (t, s) = c.tangent_basis();
            let fan = &fan_dirs[r];

            for (id, sign) in [(c.body_a, 1.0), (c.body_b, -1.0)] {
                let body = bodies.get(id).ok_or(ImpactError::InvalidBody(id))?;
                let off = offset_of(id).ok_or(ImpactError::InvalidBody(id))?;
                let jp = body.point_jacobian(&c.point);
                let nb = body.num_coords();

                let dir_row = |d: &Vector3<f64>| -> DMatrix<f64> {
                    let mut row = DMatrix::zeros(1, nb);
                    for j in 0..nb {
                        row[(0, j)] =
                            sign * (d.x * jp[(0, j)] + d.y * jp[(1, j)] + d.z * jp[(2, j)]);
                    }
                    row
                };

                cn.push(MatrixBlock::new(r, off, dir_row(&c.normal)));
                cs.push(MatrixBlock::new(r, off, dir_row(&t)));
                ct.push(MatrixBlock::new(r, off, dir_row(&s)));
                for (k, d) in fan.iter().enumerate() {
                    let pos = dir_row(d);
                    let neg = dir_row(&(-d));
                    d_fan.push(MatrixBlock::new(fan_row + 2 * k, off, pos));
                    d_fan.push(MatrixBlock::new(fan_row + 2 * k + 1, off, neg));
                }
            }
            fan_row += 2 * fan.len();
        }

        // Limit rows: signed unit selectors.
        let mut limit_restitution = Vec::with_capacity(n_l);
        for (r, &ci) in limit_indices.iter().enumerate() {
            let UnilateralConstraint::Limit(lim) = &constraints[ci] else {
                continue;
            };
            limit_restitution.push(lim.restitution);
            let body = bodies.get(lim.body).ok_or(ImpactError::InvalidBody(lim.body))?;
            let off = offset_of(lim.body).ok_or(ImpactError::InvalidBody(lim.body))?;
            let nb = body.num_coords();
            if lim.dof >= nb {
                return Err(ImpactError::InvalidDof {
                    body: lim.body,
                    num_coords: nb,
                    dof: lim.dof,
                });
            }
            let mut row = DMatrix::zeros(1, nb);
            row[(0, lim.dof)] = lim.sign();
            l_jac.push(MatrixBlock::new(r, off, row));
        }

        // Bilateral rows fully inside the component, reduced to a
        // full-rank subset.
        let jx = assemble_bilateral(bilateral, island, &body_offsets, bodies, n_coords, eps_rank)?;

        let cn_dense = cn.to_dense();
        let cs_dense = cs.to_dense();
        let ct_dense = ct.to_dense();
        let d_dense = d_fan.to_dense();
        let l_dense = l_jac.to_dense();
        let jx_dense = jx.to_dense();

        let w_cn_t = inv_inertia_product(bodies, &island.bodies, &body_offsets, &cn_dense)?;
        let w_cs_t = inv_inertia_product(bodies, &island.bodies, &body_offsets, &cs_dense)?;
        let w_ct_t = inv_inertia_product(bodies, &island.bodies, &body_offsets, &ct_dense)?;
        let w_d_t = inv_inertia_product(bodies, &island.bodies, &body_offsets, &d_dense)?;
        let w_l_t = inv_inertia_product(bodies, &island.bodies, &body_offsets, &l_dense)?;
        let w_jx_t = inv_inertia_product(bodies, &island.bodies, &body_offsets, &jx_dense)?;

        let cn_v = &cn_dense * &v;
        let cs_v = &cs_dense * &v;
        let ct_v = &ct_dense * &v;
        let d_v = &d_dense * &v;
        let l_v = &l_dense * &v;
        let jx_v = &jx_dense * &v;

        debug!(
            contacts = n_c,
            limits = n_l,
            bilateral = jx_dense.nrows(),
            coords = n_coords,
            "assembled impact problem data"
        );

        Ok(Self {
            contact_indices,
            limit_indices,
            body_ids: island.bodies.clone(),
            body_offsets,
            n_coords,
            v,
            mu,
            contact_restitution,
            limit_restitution,
            fan_dirs,
            cn,
            cs,
            ct,
            d_fan,
            l_jac,
            jx,
            cn_dense,
            cs_dense,
            ct_dense,
            d_dense,
            l_dense,
            jx_dense,
            w_cn_t,
            w_cs_t,
            w_ct_t,
            w_d_t,
            w_l_t,
            w_jx_t,
            cn_v,
            cs_v,
            ct_v,
            d_v,
            l_v,
            jx_v,
        })
    }

    /// Number of contacts in the component.
    #[must_use]
    pub fn num_contacts(&self) -> usize {
        self.contact_indices.len()
    }

    /// Number of limits in the component.
    #[must_use]
    pub fn num_limits(&self) -> usize {
        self.limit_indices.len()
    }

    /// Per-contact friction impulse bound `mu_i * cn_i` for the given
    /// normal impulses.
    #[must_use]
    pub fn friction_upper_bounds(&self, cn_impulses: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.mu.len(),
            self.mu.iter().zip(cn_impulses.iter()).map(|(&m, &c)| m * c),
        )
    }

    /// Map a stacked generalized impulse to the stacked velocity change it
    /// produces, through each body's inverse inertia.
    ///
    /// # Errors
    ///
    /// Returns [`ImpactError::InvalidBody`] when a component body has been
    /// removed from the set since assembly.
    pub fn velocity_delta(
        &self,
        bodies: &BodySet,
        gen_impulse: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        let mut dv = DVector::zeros(self.n_coords);
        for (k, &id) in self.body_ids.iter().enumerate() {
            let body = bodies.get(id).ok_or(ImpactError::InvalidBody(id))?;
            let nb = body.num_coords();
            let imp = gen_impulse.rows(self.body_offsets[k], nb).clone_owned();
            let delta = body.apply_inv_inertia(&imp);
            dv.rows_mut(self.body_offsets[k], nb).copy_from(&delta);
        }
        Ok(dv)
    }
}

/// `M^-1 J^T` computed per body block.
fn inv_inertia_product(
    bodies: &BodySet,
    body_ids: &[BodyId],
    offsets: &[usize],
    j_dense: &DMatrix<f64>,
) -> Result<DMatrix<f64>> {
    let n_rows = j_dense.nrows();
    let n_coords = j_dense.ncols();
    let mut out = DMatrix::zeros(n_coords, n_rows);
    for r in 0..n_rows {
        for (k, &id) in body_ids.iter().enumerate() {
            let body = bodies.get(id).ok_or(ImpactError::InvalidBody(id))?;
            let nb = body.num_coords();
            let off = offsets[k];
            let imp = DVector::from_iterator(nb, (0..nb).map(|j| j_dense[(r, off + j)]));
            if imp.iter().all(|&x| x == 0.0) {
                continue;
            }
            let dv = body.apply_inv_inertia(&imp);
            out.view_mut((off, r), (nb, 1)).copy_from(&dv);
        }
    }
    Ok(out)
}

/// Stack the bilateral rows that live entirely inside the component and
/// keep a full-rank subset (greedy Gram-Schmidt row selection).
fn assemble_bilateral(
    bilateral: &[BilateralRow],
    island: &Island,
    offsets: &[usize],
    bodies: &BodySet,
    n_coords: usize,
    eps_rank: f64,
) -> Result<BlockJacobian> {
    let eps_rank = if eps_rank > 0.0 {
        eps_rank
    } else {
        impact_lcp::NEAR_ZERO
    };

    // Gather candidate rows as dense vectors.
    let mut rows: Vec<(usize, DVector<f64>)> = Vec::new();
    for (bi, row) in bilateral.iter().enumerate() {
        let inside = row
            .entries
            .iter()
            .all(|(id, _)| island.bodies.binary_search(id).is_ok());
        if !inside || row.entries.is_empty() {
            continue;
        }
        let mut dense = DVector::zeros(n_coords);
        for (id, seg) in &row.entries {
            let k = island
                .bodies
                .iter()
                .position(|b| b == id)
                .ok_or(ImpactError::InvalidBody(*id))?;
            let body = bodies.get(*id).ok_or(ImpactError::InvalidBody(*id))?;
            if seg.len() != body.num_coords() {
                return Err(ImpactError::InvalidDof {
                    body: *id,
                    num_coords: body.num_coords(),
                    dof: seg.len(),
                });
            }
            for j in 0..seg.len() {
                dense[offsets[k] + j] += seg[j];
            }
        }
        rows.push((bi, dense));
    }

    // Greedy full-rank selection: keep a row when its residual against the
    // span of kept rows is non-negligible relative to its own norm.
    let mut basis: Vec<DVector<f64>> = Vec::new();
    let mut kept: Vec<usize> = Vec::new();
    for (k, (_, row)) in rows.iter().enumerate() {
        let mut res = row.clone();
        for b in &basis {
            let proj = b.dot(&res);
            res -= b * proj;
        }
        let norm = res.norm();
        if norm > eps_rank * row.norm().max(1.0) {
            basis.push(res / norm);
            kept.push(k);
        }
    }

    let mut jx = BlockJacobian::new(kept.len(), n_coords);
    for (out_r, &k) in kept.iter().enumerate() {
        let row = &rows[k].1;
        let mut block = DMatrix::zeros(1, n_coords);
        for j in 0..n_coords {
            block[(0, j)] = row[j];
        }
        jx.push(MatrixBlock::new(out_r, 0, block));
    }
    Ok(jx)
}
