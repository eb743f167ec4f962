//! Block-sparse Jacobians.
//!
//! Constraint Jacobians are sparse with dense structure: each constraint
//! row only touches the coordinates of one or two bodies, and those
//! segments are dense. The representation here is a list of dense blocks,
//! each tagged with its starting row and column in the notional dense
//! matrix. Blocks may overlap only where the caller intends the overlaps
//! to add.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// A dense block positioned inside a sparse matrix.
#[derive(Debug, Clone)]
pub struct MatrixBlock {
    /// Starting row of the block in the dense matrix.
    pub row: usize,
    /// Starting column of the block in the dense matrix.
    pub col: usize,
    /// The dense block itself.
    pub block: DMatrix<f64>,
}

impl MatrixBlock {
    /// Create a block at the given offsets.
    #[must_use]
    pub fn new(row: usize, col: usize, block: DMatrix<f64>) -> Self {
        Self { row, col, block }
    }

    /// Rows in the block.
    #[must_use]
    pub fn nrows(&self) -> usize {
        self.block.nrows()
    }

    /// Columns in the block.
    #[must_use]
    pub fn ncols(&self) -> usize {
        self.block.ncols()
    }
}

/// A sparse matrix stored as positioned dense blocks, with the
/// multiplication routines the assembler needs.
#[derive(Debug, Clone, Default)]
pub struct BlockJacobian {
    /// The positioned blocks. Overlaps add.
    pub blocks: Vec<MatrixBlock>,
    rows: usize,
    cols: usize,
}

impl BlockJacobian {
    /// Create an empty Jacobian of the given dense dimensions.
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            blocks: Vec::new(),
            rows,
            cols,
        }
    }

    /// Rows of the dense matrix.
    #[must_use]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Columns of the dense matrix.
    #[must_use]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Whether the Jacobian carries no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Append a block.
    ///
    /// # Panics
    ///
    /// Panics in debug builds when the block extends past the matrix.
    pub fn push(&mut self, block: MatrixBlock) {
        debug_assert!(block.row + block.nrows() <= self.rows);
        debug_assert!(block.col + block.ncols() <= self.cols);
        self.blocks.push(block);
    }

    /// `J * x` for a dense vector.
    #[must_use]
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(x.len(), self.cols);
        let mut out = DVector::zeros(self.rows);
        for b in &self.blocks {
            let seg = x.rows(b.col, b.ncols());
            let prod = &b.block * seg;
            for i in 0..b.nrows() {
                out[b.row + i] += prod[i];
            }
        }
        out
    }

    /// `J^T * y` for a dense vector of row values.
    #[must_use]
    pub fn transpose_mul_vec(&self, y: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(y.len(), self.rows);
        let mut out = DVector::zeros(self.cols);
        for b in &self.blocks {
            let seg = y.rows(b.row, b.nrows());
            let prod = b.block.transpose() * seg;
            for j in 0..b.ncols() {
                out[b.col + j] += prod[j];
            }
        }
        out
    }

    /// `J * X` for a dense matrix.
    #[must_use]
    pub fn mul_dense(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        debug_assert_eq!(x.nrows(), self.cols);
        let mut out = DMatrix::zeros(self.rows, x.ncols());
        for b in &self.blocks {
            let seg = x.rows(b.col, b.ncols());
            let prod = &b.block * seg;
            out.view_mut((b.row, 0), (b.nrows(), x.ncols()))
                .iter_mut()
                .zip(prod.iter())
                .for_each(|(o, &p)| *o += p);
        }
        out
    }

    /// `J * M` where `M` is itself given as positioned blocks, producing a
    /// dense result with `result_cols` columns.
    #[must_use]
    pub fn mul_blocks(&self, m: &[MatrixBlock], result_cols: usize) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(self.rows, result_cols);
        for a in &self.blocks {
            for b in m {
                // Column span of a must meet the row span of b.
                let lo = a.col.max(b.row);
                let hi = (a.col + a.ncols()).min(b.row + b.nrows());
                if lo >= hi {
                    continue;
                }
                let a_sub = a.block.columns(lo - a.col, hi - lo);
                let b_sub = b.block.rows(lo - b.row, hi - lo);
                let prod = a_sub * b_sub;
                for i in 0..prod.nrows() {
                    for j in 0..prod.ncols() {
                        out[(a.row + i, b.col + j)] += prod[(i, j)];
                    }
                }
            }
        }
        out
    }

    /// Materialize the dense matrix.
    #[must_use]
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(self.rows, self.cols);
        for b in &self.blocks {
            for i in 0..b.nrows() {
                for j in 0..b.ncols() {
                    out[(b.row + i, b.col + j)] += b.block[(i, j)];
                }
            }
        }
        out
    }

    /// Convert to CSR for row-oriented sparse consumers.
    #[must_use]
    pub fn to_csr(&self) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.rows, self.cols);
        for b in &self.blocks {
            for i in 0..b.nrows() {
                for j in 0..b.ncols() {
                    let v = b.block[(i, j)];
                    if v.abs() > 1e-15 {
                        coo.push(b.row + i, b.col + j, v);
                    }
                }
            }
        }
        CsrMatrix::from(&coo)
    }
}
