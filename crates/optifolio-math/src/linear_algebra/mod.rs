//! Linear algebra utilities.
//!
//! Dense matrix helpers used by the portfolio optimizers: symmetric
//! positive-definite solves, Moore-Penrose pseudo-inverses and ridge
//! regularization.

use crate::error::{MathError, MathResult};
use nalgebra::{DMatrix, DVector};

/// Relative eigenvalue threshold below which a symmetric matrix is treated
/// as singular.
pub const SINGULARITY_TOLERANCE: f64 = 1e-12;

/// Returns `(A + Aᵀ) / 2`.
pub fn symmetrize(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    (matrix + matrix.transpose()) * 0.5
}

/// Returns `A + λI`.
pub fn ridge(matrix: &DMatrix<f64>, lambda: f64) -> MathResult<DMatrix<f64>> {
    ensure_square(matrix)?;
    if !lambda.is_finite() || lambda < 0.0 {
        return Err(MathError::invalid_input(format!(
            "ridge penalty must be a non-negative finite number, got {lambda}"
        )));
    }

    let n = matrix.nrows();
    Ok(matrix + DMatrix::identity(n, n) * lambda)
}

/// Returns true if a symmetric matrix is numerically singular.
///
/// The test compares the smallest eigenvalue against the largest one scaled
/// by [`SINGULARITY_TOLERANCE`], so it is insensitive to the units of the
/// matrix (daily vs annual covariances).
pub fn is_singular_symmetric(matrix: &DMatrix<f64>) -> bool {
    if matrix.nrows() == 0 || matrix.nrows() != matrix.ncols() {
        return true;
    }

    let eigenvalues = matrix.symmetric_eigenvalues();
    let max = eigenvalues.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let min = eigenvalues.iter().fold(f64::INFINITY, |acc, &v| acc.min(v));

    max <= 0.0 || min <= max * SINGULARITY_TOLERANCE
}

/// Solves `A x = b` for a symmetric positive-definite `A` via Cholesky.
pub fn cholesky_solve(a: &DMatrix<f64>, b: &DVector<f64>) -> MathResult<DVector<f64>> {
    ensure_square(a)?;
    ensure_rhs(a, b)?;

    if is_singular_symmetric(a) {
        return Err(MathError::SingularMatrix);
    }

    let chol = a.clone().cholesky().ok_or(MathError::SingularMatrix)?;
    Ok(chol.solve(b))
}

/// Moore-Penrose pseudo-inverse through the SVD.
///
/// Singular values below `max_singular_value * SINGULARITY_TOLERANCE` are
/// treated as zero.
pub fn pseudo_inverse(a: &DMatrix<f64>) -> MathResult<DMatrix<f64>> {
    if a.nrows() == 0 || a.ncols() == 0 {
        return Err(MathError::invalid_input("cannot pseudo-invert an empty matrix"));
    }

    let svd = a.clone().svd(true, true);
    let max_sv = svd.singular_values.iter().fold(0.0_f64, |acc, &v| acc.max(v));
    if max_sv <= 0.0 {
        return Err(MathError::SingularMatrix);
    }

    svd.pseudo_inverse(max_sv * SINGULARITY_TOLERANCE)
        .map_err(MathError::invalid_input)
}

fn ensure_square(a: &DMatrix<f64>) -> MathResult<()> {
    if a.nrows() != a.ncols() {
        return Err(MathError::invalid_input(format!(
            "matrix must be square, got {}x{}",
            a.nrows(),
            a.ncols()
        )));
    }
    Ok(())
}

fn ensure_rhs(a: &DMatrix<f64>, b: &DVector<f64>) -> MathResult<()> {
    if a.nrows() != b.len() {
        return Err(MathError::DimensionMismatch {
            rows1: a.nrows(),
            cols1: a.ncols(),
            rows2: b.len(),
            cols2: 1,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cholesky_solve() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_vec(vec![1.0, 2.0]);

        let x = cholesky_solve(&a, &b).unwrap();
        let residual = &a * &x - &b;

        assert!(residual.amax() < 1e-12);
    }

    #[test]
    fn test_singular_detection_is_scale_free() {
        // Perfectly correlated pair in daily-return units
        let a = DMatrix::from_row_slice(2, 2, &[1e-4, 1e-4, 1e-4, 1e-4]);
        assert!(is_singular_symmetric(&a));
        let b = DVector::from_vec(vec![1.0, 0.0]);
        assert!(matches!(cholesky_solve(&a, &b), Err(MathError::SingularMatrix)));

        let c = DMatrix::from_row_slice(2, 2, &[1e-4, 0.0, 0.0, 4e-4]);
        assert!(!is_singular_symmetric(&c));
    }

    #[test]
    fn test_pseudo_inverse_of_rank_deficient_matrix() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let pinv = pseudo_inverse(&a).unwrap();

        // pinv of [[1,1],[1,1]] is [[0.25,0.25],[0.25,0.25]]
        for v in pinv.iter() {
            assert_relative_eq!(*v, 0.25, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_ridge_adds_to_diagonal() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let r = ridge(&a, 0.5).unwrap();

        assert_relative_eq!(r[(0, 0)], 1.5);
        assert_relative_eq!(r[(0, 1)], 1.0);
        assert!(ridge(&a, -1.0).is_err());
    }

    #[test]
    fn test_symmetrize() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.5, 1.0]);
        let s = symmetrize(&a);

        assert_eq!(s, s.transpose());
        assert_relative_eq!(s[(0, 1)], 2.25);
        assert_relative_eq!(s[(0, 0)], 1.0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn spd(entries: &[f64], n: usize, shift: f64) -> DMatrix<f64> {
            let l = DMatrix::from_row_slice(n, n, &entries[..n * n]);
            &l * l.transpose() + DMatrix::identity(n, n) * shift
        }

        proptest! {
            #[test]
            fn prop_cholesky_solve_residual(
                entries in prop::collection::vec(-1.0f64..1.0, 36),
                rhs in prop::collection::vec(-1.0f64..1.0, 6),
                n in 1usize..=6,
                shift in 0.01f64..1.0,
            ) {
                let a = spd(&entries, n, shift);
                let b = DVector::from_column_slice(&rhs[..n]);
                let x = cholesky_solve(&a, &b).unwrap();

                prop_assert!((&a * &x - &b).amax() < 1e-9);
            }

            #[test]
            fn prop_pseudo_inverse_matches_inverse_when_regular(
                entries in prop::collection::vec(-1.0f64..1.0, 16),
                n in 1usize..=4,
                shift in 0.1f64..1.0,
            ) {
                let a = spd(&entries, n, shift);
                let inv = a.clone().cholesky().unwrap().inverse();
                let pinv = pseudo_inverse(&a).unwrap();

                prop_assert!((inv - pinv).amax() < 1e-8);
            }
        }
    }
}
