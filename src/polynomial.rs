// SPDX-License-Identifier: MPL-2.0

//! Functions for polynomial evaluation and interpolation.
//!
//! Polynomials are represented as slices of field elements, lowest-degree
//! coefficient first. The zero polynomial is the empty slice.

use crate::field::FieldElement;

/// Evaluate a polynomial at a point using Horner's method.
pub fn poly_eval<F: FieldElement>(poly: &[F], eval_at: F) -> F {
    poly.iter()
        .rev()
        .fold(F::zero(), |sum, &coeff| sum * eval_at + coeff)
}

/// Returns the longest prefix of `p` with no trailing zero coefficients.
pub fn poly_strip<F: FieldElement>(p: &[F]) -> &[F] {
    let len = p
        .iter()
        .rposition(|&coeff| coeff != F::zero())
        .map_or(0, |last| last + 1);
    &p[..len]
}

/// Returns the degree of polynomial `p`, treating the zero polynomial as having degree 0.
pub fn poly_deg<F: FieldElement>(p: &[F]) -> usize {
    poly_strip(p).len().saturating_sub(1)
}

/// Multiplies polynomials `p` and `q` and returns the result.
pub fn poly_mul<F: FieldElement>(p: &[F], q: &[F]) -> Vec<F> {
    let p = poly_strip(p);
    let q = poly_strip(q);
    if p.is_empty() || q.is_empty() {
        return Vec::new();
    }

    let mut out = vec![F::zero(); p.len() + q.len() - 1];
    for (i, &p_coeff) in p.iter().enumerate() {
        for (j, &q_coeff) in q.iter().enumerate() {
            out[i + j] += p_coeff * q_coeff;
        }
    }
    out
}

/// Returns the coefficients of the unique polynomial of degree less than `xs.len()` that
/// evaluates to `ys[i]` at `xs[i]` for each `i`, computed by Lagrange interpolation.
///
/// The evaluation points `xs` must be pairwise distinct and `ys` must have the same length as
/// `xs`; otherwise the output is unspecified.
pub fn poly_interp<F: FieldElement>(xs: &[F], ys: &[F]) -> Vec<F> {
    let mut out = vec![F::zero(); xs.len()];
    for (i, (&xi, &yi)) in xs.iter().zip(ys.iter()).enumerate() {
        // basis(x) = prod_{j != i} (x - xs[j]), scaled so that basis(xs[i]) = ys[i].
        let mut basis = vec![F::one()];
        let mut denom = F::one();
        for (j, &xj) in xs.iter().enumerate() {
            if j != i {
                basis = poly_mul(&basis, &[-xj, F::one()]);
                denom *= xi - xj;
            }
        }

        let scale = yi * denom.inv();
        for (out_coeff, basis_coeff) in out.iter_mut().zip(basis.iter()) {
            *out_coeff += scale * *basis_coeff;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{random_vector, Field32, Field64, FieldElement};

    #[test]
    fn test_eval() {
        // 1 + 4x + 2x^2 at x = 3 is 1 + 12 + 18 = 31.
        let poly: Vec<Field32> = vec![1.into(), 4.into(), 2.into()];
        assert_eq!(poly_eval(&poly, 3.into()), 31);

        // Appending a 5x^3 term adds 5 * 27 = 135.
        let poly: Vec<Field32> = vec![1.into(), 4.into(), 2.into(), 5.into()];
        assert_eq!(poly_eval(&poly, 3.into()), 166);

        // The zero polynomial evaluates to zero, and a constant to itself.
        assert_eq!(poly_eval::<Field32>(&[], 3.into()), Field32::zero());
        assert_eq!(poly_eval(&[Field32::from(7)], 100.into()), 7);
    }

    #[test]
    fn test_poly_strip_and_deg() {
        let zero = Field32::zero();
        let one = Field32::one();

        assert_eq!(poly_strip::<Field32>(&[]), &[] as &[Field32]);
        assert_eq!(poly_strip(&[zero, zero, zero]), &[] as &[Field32]);
        assert_eq!(poly_strip(&[one, zero]), &[one]);
        assert_eq!(poly_strip(&[zero, one, zero, zero]), &[zero, one]);

        assert_eq!(poly_deg::<Field32>(&[]), 0);
        assert_eq!(poly_deg(&[one]), 0);
        assert_eq!(poly_deg(&[zero, one]), 1);
        assert_eq!(poly_deg(&[one, one, one, zero]), 2);
        assert_eq!(poly_deg(&[zero, zero, one, zero, zero]), 2);
    }

    #[test]
    fn test_poly_mul() {
        // (1 + x)(2 + x) = 2 + 3x + x^2
        let p = [Field64::from(1), Field64::from(1)];
        let q = [Field64::from(2), Field64::from(1)];
        let want: Vec<Field64> = vec![2.into(), 3.into(), 1.into()];
        assert_eq!(poly_mul(&p, &q), want);

        // Multiplying by the zero polynomial yields the zero polynomial.
        assert_eq!(poly_mul(&p, &[Field64::zero()]), Vec::<Field64>::new());

        // The evaluation of a product is the product of the evaluations.
        let p: Vec<Field64> = random_vector(10).unwrap();
        let q: Vec<Field64> = random_vector(7).unwrap();
        let r = poly_mul(&p, &q);
        for x in random_vector(10).unwrap() {
            assert_eq!(poly_eval(&r, x), poly_eval(&p, x) * poly_eval(&q, x));
        }
    }

    #[test]
    fn test_poly_interp() {
        // Distinct evaluation points with random values.
        let xs: Vec<Field64> = (0..10).map(|i| Field64::from(i as u64)).collect();
        let ys: Vec<Field64> = random_vector(10).unwrap();

        let poly = poly_interp(&xs, &ys);
        assert!(poly_deg(&poly) < xs.len());
        for (x, y) in xs.iter().zip(ys.iter()) {
            assert_eq!(poly_eval(&poly, *x), *y);
        }

        // Interpolating evaluations of a known polynomial recovers it.
        let want: Vec<Field64> = random_vector(5).unwrap();
        let ys: Vec<Field64> = xs[..5].iter().map(|x| poly_eval(&want, *x)).collect();
        let got = poly_interp(&xs[..5], &ys);
        assert_eq!(poly_strip(&got), poly_strip(&want));
    }
}
