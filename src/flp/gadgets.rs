// SPDX-License-Identifier: MPL-2.0

//! A collection of gadgets.
//!
//! Each gadget implements the same identity twice: once over field elements, used while
//! evaluating a validity circuit, and once over wire polynomials, used while constructing a
//! proof. For long wire polynomials the polynomial form switches from schoolbook
//! multiplication to FFT-based multiplication.

use crate::fft::{discrete_fourier_transform, discrete_fourier_transform_inv_finish};
use crate::field::FieldElement;
use crate::flp::{try_from_usize, FlpError, Gadget};
use crate::polynomial::poly_mul;

use std::any::Any;
use std::fmt::{self, Debug};

/// For wire polynomials at least this long, gadgets use FFT for polynomial multiplication.
/// Otherwise, the gadget uses direct multiplication.
const FFT_THRESHOLD: usize = 60;

// The number of field elements written by `call_poly` for a gadget of the given degree called
// on wire polynomials interpolated over a grid of `(1 + num_calls).next_power_of_two()` points.
fn gadget_poly_len(degree: usize, num_calls: usize) -> usize {
    (degree * (1 + num_calls).next_power_of_two()).next_power_of_two()
}

/// An arity-2 gadget that multiplies its inputs.
#[derive(Clone)]
pub struct Mul<F: FieldElement> {
    /// The number of times this gadget is called by the validity circuit.
    num_calls: usize,
    /// Size of the buffer for FFT operations.
    n: usize,
    /// Inverse of `n` in `F`.
    n_inv: F,
}

impl<F: FieldElement> Mul<F> {
    /// Return a new multiplier gadget that the validity circuit calls `num_calls` times.
    pub fn new(num_calls: usize) -> Self {
        let n = gadget_poly_len(2, num_calls);
        let n_inv = try_from_usize::<F>(n).unwrap().inv();
        Self {
            num_calls,
            n,
            n_inv,
        }
    }

    // Multiply input polynomials directly.
    fn call_poly_direct(&mut self, outp: &mut [F], inp: &[Vec<F>]) -> Result<(), FlpError> {
        let v = poly_mul(&inp[0], &inp[1]);
        outp[..v.len()].clone_from_slice(&v);
        Ok(())
    }

    // Multiply input polynomials using FFT.
    fn call_poly_fft(&mut self, outp: &mut [F], inp: &[Vec<F>]) -> Result<(), FlpError> {
        let n = self.n;
        let mut buf = vec![F::zero(); n];

        discrete_fourier_transform(&mut buf, &inp[0], n)?;
        discrete_fourier_transform(outp, &inp[1], n)?;

        for (x, y) in buf.iter_mut().zip(outp[..n].iter()) {
            *x *= *y;
        }

        discrete_fourier_transform(outp, &buf, n)?;
        discrete_fourier_transform_inv_finish(outp, n, self.n_inv);
        Ok(())
    }
}

impl<F: FieldElement> Gadget<F> for Mul<F> {
    fn call(&mut self, inp: &[F]) -> Result<F, FlpError> {
        gadget_call_check(self, inp.len())?;
        Ok(inp[0] * inp[1])
    }

    fn call_poly(&mut self, outp: &mut [F], inp: &[Vec<F>]) -> Result<(), FlpError> {
        gadget_call_poly_check(self, outp, inp)?;
        for x in outp.iter_mut() {
            *x = F::zero();
        }

        if inp[0].len() >= FFT_THRESHOLD {
            self.call_poly_fft(outp, inp)
        } else {
            self.call_poly_direct(outp, inp)
        }
    }

    fn arity(&self) -> usize {
        2
    }

    fn degree(&self) -> usize {
        2
    }

    fn calls(&self) -> usize {
        self.num_calls
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

impl<F: FieldElement> Debug for Mul<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mul")
            .field("num_calls", &self.num_calls)
            .finish()
    }
}

/// An arity-1 gadget that maps its input `x` to `x^2 - x`. The output is zero precisely when
/// the input is zero or one, which makes this the range check used by bit-encoded types.
#[derive(Clone)]
pub struct Range2<F: FieldElement> {
    /// The number of times this gadget is called by the validity circuit.
    num_calls: usize,
    /// Size of the buffer for FFT operations.
    n: usize,
    /// Inverse of `n` in `F`.
    n_inv: F,
}

impl<F: FieldElement> Range2<F> {
    /// Return a new range-check gadget that the validity circuit calls `num_calls` times.
    pub fn new(num_calls: usize) -> Self {
        let n = gadget_poly_len(2, num_calls);
        let n_inv = try_from_usize::<F>(n).unwrap().inv();
        Self {
            num_calls,
            n,
            n_inv,
        }
    }

    // Square the input polynomial directly, then subtract it.
    fn call_poly_direct(&mut self, outp: &mut [F], inp: &[Vec<F>]) -> Result<(), FlpError> {
        let v = poly_mul(&inp[0], &inp[0]);
        outp[..v.len()].clone_from_slice(&v);
        for (x, y) in outp.iter_mut().zip(inp[0].iter()) {
            *x -= *y;
        }
        Ok(())
    }

    // Square the input polynomial using FFT, then subtract it.
    fn call_poly_fft(&mut self, outp: &mut [F], inp: &[Vec<F>]) -> Result<(), FlpError> {
        let n = self.n;
        let mut buf = vec![F::zero(); n];

        discrete_fourier_transform(&mut buf, &inp[0], n)?;
        for x in buf.iter_mut() {
            *x = *x * *x;
        }

        discrete_fourier_transform(outp, &buf, n)?;
        discrete_fourier_transform_inv_finish(outp, n, self.n_inv);

        for (x, y) in outp.iter_mut().zip(inp[0].iter()) {
            *x -= *y;
        }
        Ok(())
    }
}

impl<F: FieldElement> Gadget<F> for Range2<F> {
    fn call(&mut self, inp: &[F]) -> Result<F, FlpError> {
        gadget_call_check(self, inp.len())?;
        Ok(inp[0] * inp[0] - inp[0])
    }

    fn call_poly(&mut self, outp: &mut [F], inp: &[Vec<F>]) -> Result<(), FlpError> {
        gadget_call_poly_check(self, outp, inp)?;
        for x in outp.iter_mut() {
            *x = F::zero();
        }

        if inp[0].len() >= FFT_THRESHOLD {
            self.call_poly_fft(outp, inp)
        } else {
            self.call_poly_direct(outp, inp)
        }
    }

    fn arity(&self) -> usize {
        1
    }

    fn degree(&self) -> usize {
        2
    }

    fn calls(&self) -> usize {
        self.num_calls
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

impl<F: FieldElement> Debug for Range2<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Range2")
            .field("num_calls", &self.num_calls)
            .finish()
    }
}

// Check that the input parameters of g.call() are well-formed.
fn gadget_call_check<F: FieldElement, G: Gadget<F>>(
    gadget: &G,
    in_len: usize,
) -> Result<(), FlpError> {
    if in_len != gadget.arity() {
        return Err(FlpError::Gadget(format!(
            "unexpected number of inputs: got {}; want {}",
            in_len,
            gadget.arity()
        )));
    }

    if in_len == 0 {
        return Err(FlpError::Gadget("can't call an arity-0 gadget".to_string()));
    }

    Ok(())
}

// Check that the input parameters of g.call_poly() are well-formed.
fn gadget_call_poly_check<F: FieldElement, G: Gadget<F>>(
    gadget: &G,
    outp: &[F],
    inp: &[Vec<F>],
) -> Result<(), FlpError> {
    gadget_call_check(gadget, inp.len())?;

    for wire_poly in inp[1..].iter() {
        if wire_poly.len() != inp[0].len() {
            return Err(FlpError::Gadget(
                "gadget called on wire polynomials with different lengths".to_string(),
            ));
        }
    }

    if outp.len() < gadget.degree() * inp[0].len() {
        return Err(FlpError::Gadget(
            "slice allocated for gadget output polynomial is too small".to_string(),
        ));
    }

    Ok(())
}
