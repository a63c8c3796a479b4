use crate::error::ContractViolation;

/// Dense matrix multiply: `c[m, n] = alpha * a[m, k] · b[k, n] + beta * c[m, n]`.
///
/// All matrices are row-major with explicit leading dimensions (`lda`, `ldb`, `ldc`), so
/// callers can pass sub-matrix views without copying. With `beta == 0` the output is
/// overwritten and its previous content, even NaN, is never read.
///
/// Implementations are interchangeable: every implementation must produce the same result
/// up to floating point reassociation.
pub trait Gemm {
    /// Computes the product into `c`.
    ///
    /// # Errors
    ///
    /// Returns an error if a leading dimension is smaller than its row length or a slice is
    /// too short for the requested view.
    #[allow(clippy::too_many_arguments)]
    fn gemm(
        &self,
        m: usize,
        n: usize,
        k: usize,
        alpha: f32,
        a: &[f32],
        lda: usize,
        b: &[f32],
        ldb: usize,
        beta: f32,
        c: &mut [f32],
        ldc: usize,
    ) -> Result<(), ContractViolation>;
}

/// Checks that a row-major `rows x cols` view with leading dimension `ld` fits in `len`.
pub(crate) fn check_matrix(
    name: &'static str,
    len: usize,
    rows: usize,
    cols: usize,
    ld: usize,
) -> Result<(), ContractViolation> {
    if ld < cols {
        return Err(ContractViolation::LeadingDimension { name, ld, cols });
    }
    if rows == 0 || cols == 0 {
        return Ok(());
    }
    let required = (rows - 1) * ld + cols;
    if len < required {
        return Err(ContractViolation::BufferTooSmall {
            name,
            required,
            actual: len,
        });
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn check_operands(
    m: usize,
    n: usize,
    k: usize,
    a: &[f32],
    lda: usize,
    b: &[f32],
    ldb: usize,
    c: &[f32],
    ldc: usize,
) -> Result<(), ContractViolation> {
    check_matrix("lhs", a.len(), m, k, lda)?;
    check_matrix("rhs", b.len(), k, n, ldb)?;
    check_matrix("output", c.len(), m, n, ldc)
}

/// Scales the `m x n` view of `c` by `beta`, overwriting when `beta == 0`.
fn scale_output(m: usize, n: usize, beta: f32, c: &mut [f32], ldc: usize) {
    for row in c.chunks_mut(ldc).take(m) {
        let row = &mut row[..n];
        if beta == 0.0 {
            row.fill(0.0);
        } else {
            row.iter_mut().for_each(|v| *v *= beta);
        }
    }
}

/// CPU GEMM backed by [`matrixmultiply::sgemm`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixMultiplyGemm;

impl Gemm for MatrixMultiplyGemm {
    fn gemm(
        &self,
        m: usize,
        n: usize,
        k: usize,
        alpha: f32,
        a: &[f32],
        lda: usize,
        b: &[f32],
        ldb: usize,
        beta: f32,
        c: &mut [f32],
        ldc: usize,
    ) -> Result<(), ContractViolation> {
        check_operands(m, n, k, a, lda, b, ldb, c, ldc)?;
        if m == 0 || n == 0 {
            return Ok(());
        }
        if k == 0 {
            scale_output(m, n, beta, c, ldc);
            return Ok(());
        }

        // SAFETY: the three views were bounds checked above and `c` does not alias `a`
        // or `b` since it is borrowed mutably.
        unsafe {
            matrixmultiply::sgemm(
                /* m */ m,
                /* k */ k,
                /* n */ n,
                /* alpha */ alpha,
                /* a */ a.as_ptr(),
                /* rsa */ lda as isize,
                /* csa */ 1,
                /* b */ b.as_ptr(),
                /* rsb */ ldb as isize,
                /* csb */ 1,
                /* beta */ beta,
                /* c */ c.as_mut_ptr(),
                /* rsc */ ldc as isize,
                /* csc */ 1,
            );
        }
        Ok(())
    }
}

/// Straightforward triple-loop GEMM, the numeric reference for other implementations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceGemm;

impl Gemm for ReferenceGemm {
    fn gemm(
        &self,
        m: usize,
        n: usize,
        k: usize,
        alpha: f32,
        a: &[f32],
        lda: usize,
        b: &[f32],
        ldb: usize,
        beta: f32,
        c: &mut [f32],
        ldc: usize,
    ) -> Result<(), ContractViolation> {
        check_operands(m, n, k, a, lda, b, ldb, c, ldc)?;
        for i in 0..m {
            for j in 0..n {
                let mut sum = 0.0;
                for p in 0..k {
                    sum += a[i * lda + p] * b[p * ldb + j];
                }
                let dst = &mut c[i * ldc + j];
                *dst = if beta == 0.0 {
                    alpha * sum
                } else {
                    alpha * sum + beta * *dst
                };
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::Rng;

    fn both() -> [Box<dyn Gemm>; 2] {
        [Box::new(MatrixMultiplyGemm), Box::new(ReferenceGemm)]
    }

    #[test]
    fn test_gemm_2x3x2() -> Result<(), ContractViolation> {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        for gemm in both() {
            let mut c = [f32::NAN; 4];
            gemm.gemm(2, 2, 3, 1.0, &a, 3, &b, 2, 0.0, &mut c, 2)?;
            assert_eq!(c, [58.0, 64.0, 139.0, 154.0]);
        }
        Ok(())
    }

    #[test]
    fn test_gemm_alpha_beta() -> Result<(), ContractViolation> {
        let a = [1.0, 0.0, 0.0, 1.0];
        let b = [2.0, 3.0, 4.0, 5.0];
        for gemm in both() {
            let mut c = [1.0; 4];
            gemm.gemm(2, 2, 2, 2.0, &a, 2, &b, 2, 1.0, &mut c, 2)?;
            assert_eq!(c, [5.0, 7.0, 9.0, 11.0]);
        }
        Ok(())
    }

    #[test]
    fn test_gemm_strided_views() -> Result<(), ContractViolation> {
        // a is the left 2x2 block of a 2x3 matrix, c the left 2x2 block of a 2x4 matrix
        let a = [1.0, 2.0, -1.0, 3.0, 4.0, -1.0];
        let b = [1.0, 0.0, 0.0, 1.0];
        for gemm in both() {
            let mut c = [9.0; 8];
            gemm.gemm(2, 2, 2, 1.0, &a, 3, &b, 2, 0.0, &mut c, 4)?;
            assert_eq!(c, [1.0, 2.0, 9.0, 9.0, 3.0, 4.0, 9.0, 9.0]);
        }
        Ok(())
    }

    #[test]
    fn test_gemm_empty_k_overwrites() -> Result<(), ContractViolation> {
        for gemm in both() {
            let mut c = [f32::NAN; 6];
            gemm.gemm(2, 3, 0, 1.0, &[], 0, &[], 3, 0.0, &mut c, 3)?;
            assert_eq!(c, [0.0; 6]);
        }
        Ok(())
    }

    #[test]
    fn test_gemm_matches_reference() -> Result<(), ContractViolation> {
        let mut rng = rand::rng();
        let (m, n, k) = (7, 13, 19);
        let a: Vec<f32> = (0..m * k).map(|_| rng.random_range(-1.0..1.0)).collect();
        let b: Vec<f32> = (0..k * n).map(|_| rng.random_range(-1.0..1.0)).collect();

        let mut expected = vec![0.0; m * n];
        ReferenceGemm.gemm(m, n, k, 1.0, &a, k, &b, n, 0.0, &mut expected, n)?;
        let mut actual = vec![0.0; m * n];
        MatrixMultiplyGemm.gemm(m, n, k, 1.0, &a, k, &b, n, 0.0, &mut actual, n)?;

        for (a, e) in actual.iter().zip(expected.iter()) {
            assert_relative_eq!(a, e, epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_gemm_bounds() {
        let a = [0.0; 5];
        let b = [0.0; 6];
        let mut c = [0.0; 4];
        assert_eq!(
            MatrixMultiplyGemm.gemm(2, 2, 3, 1.0, &a, 3, &b, 2, 0.0, &mut c, 2),
            Err(ContractViolation::BufferTooSmall {
                name: "lhs",
                required: 6,
                actual: 5,
            })
        );
        assert_eq!(
            ReferenceGemm.gemm(2, 2, 3, 1.0, &[0.0; 6], 2, &b, 2, 0.0, &mut c, 2),
            Err(ContractViolation::LeadingDimension {
                name: "lhs",
                ld: 2,
                cols: 3,
            })
        );
    }
}
