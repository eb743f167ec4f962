//! Shared numeric helpers for the pivoting solvers.

use nalgebra::{DMatrix, DVector};

/// Threshold below which a quantity is treated as numerically zero when no
/// problem-scaled tolerance applies (square root of machine epsilon).
pub const NEAR_ZERO: f64 = 1.490_116_119_384_765_6e-8;

/// Default zero tolerance for a problem: `n * ||M||_inf * eps`.
///
/// Guarded away from exact zero so that all-zero matrices still get a
/// meaningful comparison threshold.
#[must_use]
pub fn default_zero_tol(m: &DMatrix<f64>) -> f64 {
    (m.nrows() as f64 * inf_norm(m) * f64::EPSILON).max(f64::EPSILON)
}

/// Default pivot tolerance for a problem: `eps * n * max(1, ||M||_inf)`.
#[must_use]
pub fn default_piv_tol(m: &DMatrix<f64>) -> f64 {
    f64::EPSILON * m.nrows() as f64 * inf_norm(m).max(1.0)
}

/// Largest absolute entry of a matrix (zero for empty matrices).
pub(crate) fn inf_norm(m: &DMatrix<f64>) -> f64 {
    m.iter().fold(0.0_f64, |acc, &x| acc.max(x.abs()))
}

/// Select the square submatrix `m[idx, idx]`.
pub(crate) fn select_square(m: &DMatrix<f64>, idx: &[usize]) -> DMatrix<f64> {
    select(m, idx, idx)
}

/// Select the submatrix `m[rows, cols]`.
pub(crate) fn select(m: &DMatrix<f64>, rows: &[usize], cols: &[usize]) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(rows.len(), cols.len());
    for (i, &r) in rows.iter().enumerate() {
        for (j, &c) in cols.iter().enumerate() {
            out[(i, j)] = m[(r, c)];
        }
    }
    out
}

/// Select the subvector `v[idx]`.
pub(crate) fn select_vec(v: &DVector<f64>, idx: &[usize]) -> DVector<f64> {
    DVector::from_iterator(idx.len(), idx.iter().map(|&i| v[i]))
}

/// Insert `x` into a sorted index list, keeping it sorted.
pub(crate) fn insert_sorted(v: &mut Vec<usize>, x: usize) {
    let pos = v.partition_point(|&e| e < x);
    v.insert(pos, x);
}

/// Remove `x` from a sorted index list. Returns whether it was present.
pub(crate) fn remove_sorted(v: &mut Vec<usize>, x: usize) -> bool {
    match v.binary_search(&x) {
        Ok(pos) => {
            v.remove(pos);
            true
        }
        Err(_) => false,
    }
}

/// Minimum entry of a vector, `+inf` when empty.
pub(crate) fn min_entry(v: &DVector<f64>) -> f64 {
    v.iter().fold(f64::INFINITY, |acc, &x| acc.min(x))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_select_square() {
        let m = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let sub = select_square(&m, &[0, 2]);
        assert_eq!(sub[(0, 0)], 1.0);
        assert_eq!(sub[(0, 1)], 3.0);
        assert_eq!(sub[(1, 0)], 7.0);
        assert_eq!(sub[(1, 1)], 9.0);
    }

    #[test]
    fn test_sorted_ops() {
        let mut v = vec![1, 4, 9];
        insert_sorted(&mut v, 5);
        assert_eq!(v, vec![1, 4, 5, 9]);
        assert!(remove_sorted(&mut v, 4));
        assert!(!remove_sorted(&mut v, 4));
        assert_eq!(v, vec![1, 5, 9]);
    }

    #[test]
    fn test_default_tols_nonzero() {
        let m = DMatrix::<f64>::zeros(2, 2);
        assert!(default_zero_tol(&m) > 0.0);
    }
}
