//! Triangular solves against Kronecker products of lower-triangular factors.
//!
//! A right-hand side with `N = s_1 * ... * s_k` rows is read as a k-mode tensor
//! in row-major multi-index order: row `r` corresponds to `(i_1, ..., i_k)` with
//! `r = i_1 * (s_2 ... s_k) + ... + i_k`. This is the ordering produced by the
//! dense product `A (x) B`, so `(L_1 (x) ... (x) L_k)` acts on `x` by applying
//! each `L_i` along its own mode.
//!
//! The masked variants operate on the *compressed* right-hand side holding only
//! rows flagged valid by the mask, in the same order. They solve against the
//! principal submatrix `P L P'` of the full triangular factor, which is still
//! triangular, without ever touching the invalid rows.

use nalgebra::DMatrix;

use crate::error::{CovError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeOp {
    Solve,
    SolveTransposed,
    Mul,
    MulTransposed,
}

/// Solve `(L_1 (x) ... (x) L_k) z = x` for lower-triangular factors `L_i`.
pub fn solve_lower_kron(factors: &[DMatrix<f64>], x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    sweep(factors, x, ModeOp::Solve)
}

/// Solve `(L_1 (x) ... (x) L_k)' z = x` for lower-triangular factors `L_i`.
pub fn solve_upper_kron(factors: &[DMatrix<f64>], x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    sweep(factors, x, ModeOp::SolveTransposed)
}

/// Multiply by `(L_1 (x) ... (x) L_k)` (or its transpose) without forming it.
pub fn kron_mul(factors: &[DMatrix<f64>], x: &DMatrix<f64>, transpose: bool) -> Result<DMatrix<f64>> {
    let op = if transpose {
        ModeOp::MulTransposed
    } else {
        ModeOp::Mul
    };
    sweep(factors, x, op)
}

/// Masked lower solve: `(P L P') z = y` with `L = L_1 (x) ... (x) L_k` and `y`
/// holding only the rows flagged in `mask`.
pub fn solve_lower_masked_kron(
    factors: &[DMatrix<f64>],
    y: &DMatrix<f64>,
    mask: &[bool],
) -> Result<DMatrix<f64>> {
    check_masked(factors, y, mask)?;
    masked_lower(factors, y, mask)
}

/// Masked upper solve: `(P L' P') z = y`, the transpose counterpart of
/// [`solve_lower_masked_kron`].
pub fn solve_upper_masked_kron(
    factors: &[DMatrix<f64>],
    y: &DMatrix<f64>,
    mask: &[bool],
) -> Result<DMatrix<f64>> {
    check_masked(factors, y, mask)?;
    masked_upper(factors, y, mask)
}

/// Dense Kronecker product of a list of matrices (left to right).
///
/// Materializes the full product; only meant for small sizes and testing.
pub fn kronecker_product(mats: &[DMatrix<f64>]) -> DMatrix<f64> {
    mats.iter()
        .fold(DMatrix::identity(1, 1), |acc, m| acc.kronecker(m))
}

/// For every factor `i` and diagonal position `d`, count the valid flattened
/// entries whose `i`-th multi-index equals `d`, i.e. the mask summed over all
/// modes but `i`.
pub fn mask_marginal_counts(sizes: &[usize], mask: &[bool]) -> Vec<Vec<usize>> {
    let mut counts: Vec<Vec<usize>> = sizes.iter().map(|&s| vec![0; s]).collect();
    for (flat, _) in mask.iter().enumerate().filter(|(_, &valid)| valid) {
        let mut rem = flat;
        for mode in (0..sizes.len()).rev() {
            counts[mode][rem % sizes[mode]] += 1;
            rem /= sizes[mode];
        }
    }
    counts
}

/// Validate that every factor is square and non-empty, returning the sizes.
pub fn factor_sizes(factors: &[DMatrix<f64>]) -> Result<Vec<usize>> {
    if factors.is_empty() {
        return Err(CovError::Config(
            "Kronecker operation needs at least one factor".to_string(),
        ));
    }
    factors
        .iter()
        .enumerate()
        .map(|(i, f)| {
            if f.nrows() != f.ncols() {
                return Err(CovError::dim(
                    f.nrows(),
                    f.ncols(),
                    format!("Kronecker factor {i} must be square"),
                ));
            }
            if f.nrows() == 0 {
                return Err(CovError::Config(format!("Kronecker factor {i} is empty")));
            }
            Ok(f.nrows())
        })
        .collect()
}

fn sweep(factors: &[DMatrix<f64>], x: &DMatrix<f64>, op: ModeOp) -> Result<DMatrix<f64>> {
    let sizes = factor_sizes(factors)?;
    let n: usize = sizes.iter().product();
    if x.nrows() != n {
        return Err(CovError::dim(n, x.nrows(), "Kronecker right-hand side rows"));
    }
    let mut z = x.clone();
    for (mode, factor) in factors.iter().enumerate() {
        apply_mode(factor, &sizes, mode, &mut z, op)?;
    }
    Ok(z)
}

fn check_masked(factors: &[DMatrix<f64>], y: &DMatrix<f64>, mask: &[bool]) -> Result<()> {
    let sizes = factor_sizes(factors)?;
    let n: usize = sizes.iter().product();
    if mask.len() != n {
        return Err(CovError::dim(n, mask.len(), "Kronecker mask length"));
    }
    let n_valid = mask.iter().filter(|&&m| m).count();
    if y.nrows() != n_valid {
        return Err(CovError::dim(
            n_valid,
            y.nrows(),
            "masked Kronecker right-hand side rows",
        ));
    }
    Ok(())
}

/// Apply `op` with `factor` along tensor mode `mode` of `x`, in place.
///
/// Every mode-`mode` fiber of every column is gathered into one `s x F`
/// matrix so the factor is applied in a single triangular call.
fn apply_mode(
    factor: &DMatrix<f64>,
    sizes: &[usize],
    mode: usize,
    x: &mut DMatrix<f64>,
    op: ModeOp,
) -> Result<()> {
    let s = sizes[mode];
    let left: usize = sizes[..mode].iter().product();
    let right: usize = sizes[mode + 1..].iter().product();
    let per_col = left * right;
    // (column, first row) of fiber k; fiber rows are strided by `right`.
    let origin = |k: usize| {
        let (c, rem) = (k / per_col, k % per_col);
        (c, (rem / right) * s * right + rem % right)
    };

    let mut fibers = DMatrix::from_fn(s, x.ncols() * per_col, |a, k| {
        let (c, base) = origin(k);
        x[(base + a * right, c)]
    });
    apply_triangular(factor, &mut fibers, op)?;
    for (k, fiber) in fibers.column_iter().enumerate() {
        let (c, base) = origin(k);
        for (a, v) in fiber.iter().enumerate() {
            x[(base + a * right, c)] = *v;
        }
    }
    Ok(())
}

/// `L b`, `L' b`, `L^{-1} b` or `L^{-T} b` for lower-triangular `l`, in place.
fn apply_triangular(l: &DMatrix<f64>, b: &mut DMatrix<f64>, op: ModeOp) -> Result<()> {
    let solved = match op {
        ModeOp::Solve => l.solve_lower_triangular_mut(b),
        ModeOp::SolveTransposed => l.tr_solve_lower_triangular_mut(b),
        ModeOp::Mul => {
            *b = l.lower_triangle() * &*b;
            true
        }
        ModeOp::MulTransposed => {
            *b = l.lower_triangle().tr_mul(b);
            true
        }
    };
    if !solved {
        return Err(CovError::not_pd("Kronecker factor with a zero diagonal entry"));
    }
    Ok(())
}

/// `P_to (L_1 (x) ... (x) L_k) P_from' x` (or with the transposed product).
fn masked_kron_mul(
    factors: &[DMatrix<f64>],
    x: &DMatrix<f64>,
    from_mask: &[bool],
    to_mask: &[bool],
    transpose: bool,
) -> Result<DMatrix<f64>> {
    let sizes: Vec<usize> = factors.iter().map(|f| f.nrows()).collect();
    let mut full = DMatrix::zeros(from_mask.len(), x.ncols());
    for (k, i) in valid_indices(from_mask).into_iter().enumerate() {
        full.row_mut(i).copy_from(&x.row(k));
    }
    let op = if transpose {
        ModeOp::MulTransposed
    } else {
        ModeOp::Mul
    };
    for (mode, factor) in factors.iter().enumerate() {
        apply_mode(factor, &sizes, mode, &mut full, op)?;
    }
    Ok(full.select_rows(valid_indices(to_mask).iter()))
}

fn valid_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &valid)| valid.then_some(i))
        .collect()
}

/// Split a mask over the leading factor into one sub-mask per leading index,
/// with the row offset of each block in the compressed right-hand side.
fn leading_blocks(mask: &[bool], n_lead: usize) -> Vec<(&[bool], usize, usize)> {
    let block = mask.len() / n_lead;
    let mut offset = 0;
    mask.chunks(block)
        .map(|sub| {
            let count = sub.iter().filter(|&&m| m).count();
            let entry = (sub, offset, count);
            offset += count;
            entry
        })
        .collect()
}

fn stack_rows(blocks: &[DMatrix<f64>], ncols: usize) -> DMatrix<f64> {
    let total: usize = blocks.iter().map(|b| b.nrows()).sum();
    let mut out = DMatrix::zeros(total, ncols);
    let mut offset = 0;
    for b in blocks {
        out.rows_mut(offset, b.nrows()).copy_from(b);
        offset += b.nrows();
    }
    out
}

fn masked_lower(factors: &[DMatrix<f64>], y: &DMatrix<f64>, mask: &[bool]) -> Result<DMatrix<f64>> {
    let Some((lead, rest)) = factors.split_first() else {
        return Ok(y.clone());
    };
    if rest.is_empty() {
        let idx = valid_indices(mask);
        let lv = lead.select_rows(idx.iter()).select_columns(idx.iter());
        let mut z = y.clone();
        if !lv.solve_lower_triangular_mut(&mut z) {
            return Err(CovError::not_pd("masked Kronecker factor with a zero diagonal entry"));
        }
        return Ok(z);
    }

    let m = y.ncols();
    let blocks = leading_blocks(mask, lead.nrows());
    let mut solved: Vec<DMatrix<f64>> = Vec::with_capacity(blocks.len());

    for (i, &(sub_i, offset, count)) in blocks.iter().enumerate() {
        let mut t = y.rows(offset, count).into_owned();
        if count > 0 {
            for (j, &(sub_j, _, count_j)) in blocks.iter().enumerate().take(i) {
                let lij = lead[(i, j)];
                if lij != 0.0 && count_j > 0 {
                    t -= masked_kron_mul(rest, &solved[j], sub_j, sub_i, false)? * lij;
                }
            }
            t /= lead[(i, i)];
        }
        solved.push(masked_lower(rest, &t, sub_i)?);
    }

    Ok(stack_rows(&solved, m))
}

fn masked_upper(factors: &[DMatrix<f64>], y: &DMatrix<f64>, mask: &[bool]) -> Result<DMatrix<f64>> {
    let Some((lead, rest)) = factors.split_first() else {
        return Ok(y.clone());
    };
    if rest.is_empty() {
        let idx = valid_indices(mask);
        let lv = lead.select_rows(idx.iter()).select_columns(idx.iter());
        let mut z = y.clone();
        if !lv.tr_solve_lower_triangular_mut(&mut z) {
            return Err(CovError::not_pd("masked Kronecker factor with a zero diagonal entry"));
        }
        return Ok(z);
    }

    let m = y.ncols();
    let blocks = leading_blocks(mask, lead.nrows());
    let mut solved: Vec<DMatrix<f64>> = vec![DMatrix::zeros(0, m); blocks.len()];

    for (i, &(sub_i, offset, count)) in blocks.iter().enumerate().rev() {
        let mut t = y.rows(offset, count).into_owned();
        if count > 0 {
            for (j, &(sub_j, _, count_j)) in blocks.iter().enumerate().skip(i + 1) {
                let lji = lead[(j, i)];
                if lji != 0.0 && count_j > 0 {
                    t -= masked_kron_mul(rest, &solved[j], sub_j, sub_i, true)? * lji;
                }
            }
            t /= lead[(i, i)];
        }
        solved[i] = masked_upper(rest, &t, sub_i)?;
    }

    Ok(stack_rows(&solved, m))
}
