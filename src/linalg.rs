//! Dense linear algebra for the small systems which arise inside the update:
//! inverting the spatial metric, and the linearly-implicit source solves on
//! the 3D levels.

use crate::error::{Error, Result, ValidationError};

/// Invert the `m x n` row-major matrix `a` in place, using Gauss-Jordan
/// elimination with partial pivoting: at each column the row with the largest
/// available magnitude is swapped into the pivot position.
///
/// The matrix must be square. A pivot whose magnitude does not exceed `n *
/// f32::EPSILON` times the largest entry of the input (or which is not
/// finite) fails with `Error::SingularMatrix`; the contents of `a` are then
/// unspecified.
pub fn invert_mat(a: &mut [f32], m: usize, n: usize) -> Result<()> {
    if m != n {
        return Err(ValidationError::invalid(
            "matrix",
            format!("cannot invert a non-square {}x{} matrix", m, n),
        )
        .into());
    }
    if a.len() != m * n {
        return Err(ValidationError::LengthMismatch {
            field: "matrix".into(),
            expected: m * n,
            actual: a.len(),
        }
        .into());
    }
    if n == 0 {
        return Ok(());
    }

    let scale = a.iter().fold(0.0, |s: f32, x| s.max(x.abs()));
    let tolerance = n as f32 * f32::EPSILON * scale;
    let mut inverse = vec![0.0; n * n];

    for i in 0..n {
        inverse[i * n + i] = 1.0;
    }

    for col in 0..n {
        let mut pivot_row = col;
        let mut pivot_abs = a[col * n + col].abs();

        for row in col + 1..n {
            let x = a[row * n + col].abs();
            if x > pivot_abs {
                pivot_row = row;
                pivot_abs = x;
            }
        }
        let pivot = a[pivot_row * n + col];

        if !pivot.is_finite() || pivot_abs <= tolerance {
            return Err(Error::SingularMatrix { column: col, pivot });
        }
        if pivot_row != col {
            swap_rows(a, n, col, pivot_row);
            swap_rows(&mut inverse, n, col, pivot_row);
        }

        let scale_row = 1.0 / pivot;
        for j in 0..n {
            a[col * n + j] *= scale_row;
            inverse[col * n + j] *= scale_row;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row * n + col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[row * n + j] -= factor * a[col * n + j];
                inverse[row * n + j] -= factor * inverse[col * n + j];
            }
        }
    }
    a.copy_from_slice(&inverse);
    Ok(())
}

fn swap_rows(a: &mut [f32], n: usize, r0: usize, r1: usize) {
    for j in 0..n {
        a.swap(r0 * n + j, r1 * n + j);
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::invert_mat;
    use crate::error::Error;

    fn product(a: &[f32], b: &[f32], n: usize) -> Vec<f32> {
        let mut c = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                c[i * n + j] = (0..n).map(|k| a[i * n + k] * b[k * n + j]).sum();
            }
        }
        c
    }

    fn assert_close(a: &[f32], b: &[f32], tol: f32) {
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < tol, "{} != {}", x, y);
        }
    }

    #[test]
    fn a_times_inverse_is_the_identity() {
        let a = vec![4.0, 1.0, 2.0, 1.0, 3.0, 0.5, 2.0, 0.5, 5.0];
        let mut inv = a.clone();
        invert_mat(&mut inv, 3, 3).unwrap();
        assert_close(&product(&a, &inv, 3), &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0], 1e-5);
    }

    #[test]
    fn inverting_twice_recovers_the_matrix() {
        let a = vec![0.0, 2.0, 1.0, 1.0, 0.0, 3.0, 2.0, 1.0, 0.0];
        let mut b = a.clone();
        invert_mat(&mut b, 3, 3).unwrap();
        invert_mat(&mut b, 3, 3).unwrap();
        assert_close(&a, &b, 1e-5);
    }

    #[test]
    fn zero_leading_entry_needs_pivoting() {
        let mut a = vec![0.0, 1.0, 1.0, 0.0];
        invert_mat(&mut a, 2, 2).unwrap();
        assert_eq!(a, vec![0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn singular_matrix_is_reported() {
        let mut a = vec![1.0, 2.0, 2.0, 4.0];
        match invert_mat(&mut a, 2, 2) {
            Err(Error::SingularMatrix { column, .. }) => assert_eq!(column, 1),
            other => panic!("expected a singular matrix error, got {:?}", other),
        }
    }

    #[test]
    fn non_square_matrix_is_rejected() {
        let mut a = vec![1.0; 6];
        assert!(invert_mat(&mut a, 2, 3).unwrap_err().is_validation());
    }
}
