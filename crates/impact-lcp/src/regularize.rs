//! Regularization schedules, solution verification, and failure dumps.
//!
//! The pivoting solvers can report success on problems they have in fact
//! solved only approximately (an ill-conditioned basis can leave residuals
//! far above tolerance). The regularized wrappers therefore re-verify every
//! candidate solution and treat "solved but inaccurate" as failure, retrying
//! with a progressively stronger diagonal shift `M + 10^k I`.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use std::io::Write;
use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Exponent schedule for diagonal regularization.
///
/// The wrapper tries the unregularized problem first, then `M + 10^k I` for
/// `k = min_exp, min_exp + step_exp, ..., max_exp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegularizationSchedule {
    /// First exponent tried.
    pub min_exp: i32,
    /// Exponent increment between attempts.
    pub step_exp: u32,
    /// Last exponent tried (inclusive).
    pub max_exp: i32,
}

impl Default for RegularizationSchedule {
    fn default() -> Self {
        Self {
            min_exp: -20,
            step_exp: 4,
            max_exp: 1,
        }
    }
}

impl RegularizationSchedule {
    /// Create a schedule.
    #[must_use]
    pub const fn new(min_exp: i32, step_exp: u32, max_exp: i32) -> Self {
        Self {
            min_exp,
            step_exp,
            max_exp,
        }
    }

    /// Validate the schedule.
    ///
    /// # Errors
    ///
    /// Returns an error string if the exponent range is empty or the step is
    /// zero.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.step_exp == 0 {
            return Err("regularization step exponent must be nonzero");
        }
        if self.min_exp > self.max_exp {
            return Err("regularization exponent range is empty");
        }
        Ok(())
    }

    /// Iterate over the regularization factors `10^k`.
    pub fn factors(&self) -> impl Iterator<Item = f64> + '_ {
        let step = self.step_exp as i32;
        (0..)
            .map(move |i| self.min_exp + i * step)
            .take_while(move |&k| k <= self.max_exp)
            .map(|k| 10.0_f64.powi(k))
    }
}

/// Add `lambda` to the diagonal of a copy of `m`.
pub(crate) fn regularized(m: &DMatrix<f64>, lambda: f64) -> DMatrix<f64> {
    let mut mm = m.clone();
    for i in 0..mm.nrows() {
        mm[(i, i)] += lambda;
    }
    mm
}

/// Verify an LCP solution: `z >= -tol`, `Mz + q >= -tol`, and each product
/// `z_i w_i` within `[-tol, tol)`.
#[must_use]
pub fn lcp_solution_valid(m: &DMatrix<f64>, q: &DVector<f64>, z: &DVector<f64>, tol: f64) -> bool {
    if z.len() != q.len() {
        return false;
    }
    let w = m * z + q;
    for i in 0..z.len() {
        if z[i] < -tol || w[i] < -tol {
            return false;
        }
        let p = z[i] * w[i];
        if p < -tol || p >= tol {
            return false;
        }
    }
    true
}

/// Verify an MLCP solution against its bounds.
///
/// For each index: at the lower bound `w` must be non-negative, at the
/// upper bound non-positive, and in the interior effectively zero - all
/// within `tol`.
#[must_use]
pub fn mlcp_solution_valid(
    m: &DMatrix<f64>,
    q: &DVector<f64>,
    l: &DVector<f64>,
    u: &DVector<f64>,
    z: &DVector<f64>,
    tol: f64,
) -> bool {
    if z.len() != q.len() {
        return false;
    }
    let w = m * z + q;
    for i in 0..z.len() {
        if z[i] < l[i] + tol {
            // at (or beyond) the lower bound
            if z[i] + tol < l[i] || w[i] < -tol {
                return false;
            }
        } else if z[i] > u[i] - tol {
            // at (or beyond) the upper bound
            if z[i] - tol > u[i] || w[i] > tol {
                return false;
            }
        } else if w[i].abs() > tol {
            return false;
        }
    }
    true
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |h, &b| {
        (h ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Dump a failed problem to `lemke.Mq.<8 digits>.fail` in the working
/// directory and return the path.
///
/// The payload is plaintext: one matrix row per line, entries space
/// separated, with `q` on its own final row. A magic comment line frames the
/// start and an FNV-1a checksum over the payload bytes frames the end, so
/// the file doubles as a durable regression-test artifact; readers that skip
/// `#` lines see the bare matrix format.
///
/// # Errors
///
/// Returns any I/O error from creating or writing the file.
pub fn dump_failure<R: Rng>(
    m: &DMatrix<f64>,
    q: &DVector<f64>,
    rng: &mut R,
) -> std::io::Result<PathBuf> {
    let mut name = String::from("lemke.Mq.");
    for _ in 0..8 {
        name.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    name.push_str(".fail");

    let mut payload = String::new();
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            payload.push_str(&format!("{} ", m[(i, j)]));
        }
        payload.push('\n');
    }
    for j in 0..q.len() {
        payload.push_str(&format!("{} ", q[j]));
    }
    payload.push('\n');

    let path = PathBuf::from(name);
    let mut out = std::fs::File::create(&path)?;
    writeln!(out, "# impact-lcp failure v1 {}x{}", m.nrows(), m.ncols())?;
    out.write_all(payload.as_bytes())?;
    writeln!(out, "# fnv1a {:016x}", fnv1a(payload.as_bytes()))?;
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_factors() {
        let sched = RegularizationSchedule::new(-8, 4, 0);
        let factors: Vec<f64> = sched.factors().collect();
        assert_eq!(factors.len(), 3);
        assert!((factors[0] - 1e-8).abs() < 1e-22);
        assert!((factors[1] - 1e-4).abs() < 1e-18);
        assert!((factors[2] - 1.0).abs() < 1e-14);
    }

    #[test]
    fn test_schedule_validate() {
        assert!(RegularizationSchedule::default().validate().is_ok());
        assert!(RegularizationSchedule::new(1, 2, 0).validate().is_err());
        assert!(RegularizationSchedule::new(0, 0, 4).validate().is_err());
    }

    #[test]
    fn test_lcp_verification() {
        // M = [[2]], q = [-3], z = [1.5] => w = 0
        let m = DMatrix::from_row_slice(1, 1, &[2.0]);
        let q = DVector::from_vec(vec![-3.0]);
        let good = DVector::from_vec(vec![1.5]);
        let bad = DVector::from_vec(vec![1.0]);
        assert!(lcp_solution_valid(&m, &q, &good, 1e-10));
        assert!(!lcp_solution_valid(&m, &q, &bad, 1e-10));
    }

    #[test]
    fn test_mlcp_verification_bounds() {
        // One variable pinned at its upper bound with negative w is valid.
        let m = DMatrix::from_row_slice(1, 1, &[1.0]);
        let q = DVector::from_vec(vec![-5.0]);
        let l = DVector::from_vec(vec![0.0]);
        let u = DVector::from_vec(vec![2.0]);
        let z = DVector::from_vec(vec![2.0]);
        // w = 2 - 5 = -3 <= 0 at the upper bound
        assert!(mlcp_solution_valid(&m, &q, &l, &u, &z, 1e-10));

        // Interior z with nonzero w is invalid.
        let z = DVector::from_vec(vec![1.0]);
        assert!(!mlcp_solution_valid(&m, &q, &l, &u, &z, 1e-10));
    }

    #[test]
    fn test_dump_roundtrip_format() {
        use rand::SeedableRng;
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let q = DVector::from_vec(vec![-1.0, 2.0]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        let path = dump_failure(&m, &q, &mut rng).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("# impact-lcp failure v1"));
        assert!(lines.last().unwrap().starts_with("# fnv1a"));
        // payload: 2 matrix rows + 1 q row
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[3].trim(), "-1 2");
    }
}
