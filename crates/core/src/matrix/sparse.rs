use nalgebra::DMatrix;
use sprs::{CsMat, TriMat};

/// Incremental sparse matrix builder using triplet (COO) format.
///
/// Duplicate entries at the same (row, col) are summed when converting to CSC.
#[derive(Debug)]
pub struct TripletBuilder {
    triplet: TriMat<f64>,
}

impl TripletBuilder {
    /// Create a new builder for a matrix of the given dimensions.
    pub fn new(nrow: usize, ncol: usize) -> Self {
        Self {
            triplet: TriMat::new((nrow, ncol)),
        }
    }

    /// Add a value at (row, col). Duplicate entries will be summed.
    pub fn add(&mut self, row: usize, col: usize, val: f64) {
        self.triplet.add_triplet(row, col, val);
    }

    /// Add a symmetric entry: inserts at both (row, col) and (col, row).
    /// If row == col, only one entry is added.
    pub fn add_symmetric(&mut self, row: usize, col: usize, val: f64) {
        self.triplet.add_triplet(row, col, val);
        if row != col {
            self.triplet.add_triplet(col, row, val);
        }
    }

    /// Convert to a CSC (Compressed Sparse Column) matrix.
    pub fn to_csc(&self) -> CsMat<f64> {
        self.triplet.to_csc()
    }
}

/// Band templates for a block-diagonal AR(1) precision.
///
/// For each run of length `r` starting at offset `o`:
/// - `offdiag` has 1 on the first sub/super-diagonal inside the run,
/// - `diag` has 1 on the interior diagonal positions `o+1 ..= o+r-2`.
///
/// Nothing couples two runs.
pub fn ar1_band_templates(run_sizes: &[usize]) -> (CsMat<f64>, CsMat<f64>) {
    let n: usize = run_sizes.iter().sum();
    let mut offdiag = TripletBuilder::new(n, n);
    let mut diag = TripletBuilder::new(n, n);

    let mut start = 0;
    for &r in run_sizes {
        for i in start..start + r.saturating_sub(1) {
            offdiag.add_symmetric(i, i + 1, 1.0);
        }
        if r > 2 {
            for i in start + 1..start + r - 1 {
                diag.add(i, i, 1.0);
            }
        }
        start += r;
    }

    (offdiag.to_csc(), diag.to_csc())
}

/// Multiply a sparse matrix by a dense matrix: result = A * X.
pub fn spmm(a: &CsMat<f64>, x: &DMatrix<f64>) -> DMatrix<f64> {
    assert_eq!(a.cols(), x.nrows());
    let mut result = DMatrix::zeros(a.rows(), x.ncols());
    for (&val, (row, col)) in a.iter() {
        for c in 0..x.ncols() {
            result[(row, c)] += val * x[(col, c)];
        }
    }
    result
}

/// Expand a sparse matrix into a dense one.
pub fn sparse_to_dense(a: &CsMat<f64>) -> DMatrix<f64> {
    let mut dense = DMatrix::zeros(a.rows(), a.cols());
    for (&val, (row, col)) in a.iter() {
        dense[(row, col)] += val;
    }
    dense
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_run_templates() {
        let (off, diag) = ar1_band_templates(&[4]);
        let off = sparse_to_dense(&off);
        let diag = sparse_to_dense(&diag);
        for i in 0..4usize {
            for j in 0..4usize {
                let expected = if i.abs_diff(j) == 1 { 1.0 } else { 0.0 };
                assert_eq!(off[(i, j)], expected);
            }
        }
        assert_eq!(diag[(0, 0)], 0.0);
        assert_eq!(diag[(1, 1)], 1.0);
        assert_eq!(diag[(2, 2)], 1.0);
        assert_eq!(diag[(3, 3)], 0.0);
    }

    #[test]
    fn test_runs_do_not_couple() {
        let (off, diag) = ar1_band_templates(&[2, 1, 3]);
        let off = sparse_to_dense(&off);
        let diag = sparse_to_dense(&diag);
        assert_eq!(off.nrows(), 6);
        assert_eq!(off[(0, 1)], 1.0);
        // Run boundaries at 2 and 3
        assert_eq!(off[(1, 2)], 0.0);
        assert_eq!(off[(2, 3)], 0.0);
        assert_eq!(off[(3, 4)], 1.0);
        assert_eq!(off[(4, 5)], 1.0);
        let interior: Vec<f64> = (0..6).map(|i| diag[(i, i)]).collect();
        assert_eq!(interior, vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_spmm_matches_dense() {
        let mut tri = TripletBuilder::new(3, 3);
        tri.add(0, 0, 2.0);
        tri.add_symmetric(0, 2, -1.0);
        tri.add(1, 1, 3.0);
        let a = tri.to_csc();
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let expected = sparse_to_dense(&a) * &x;
        assert_eq!(spmm(&a, &x), expected);
    }
}
