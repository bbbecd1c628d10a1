// Radix-2 FFT engine used by the donuts drift algorithm. The transforms are
// iterative Cooley-Tukey over complex arrays whose length is a power of two;
// the inverse reuses the forward transform with index mirroring and 1/n
// scaling. Cross-correlation multiplies one spectrum by the conjugate of the
// other and inverse-transforms the product.

use std::f64::consts::PI;

use num_complex::Complex;

/// In-place forward transform, decimation in time. The length must be a
/// power of two and at least 2.
pub fn forward(data: &mut [Complex<f64>]) {
    let n = data.len();
    assert!(
        n >= 2 && n.is_power_of_two(),
        "FFT length {} is not a power of two >= 2",
        n
    );

    // Reorder into bit-reversed index order.
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            data.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let half = len / 2;
        let angle = -2.0 * PI / len as f64;
        for start in (0..n).step_by(len) {
            for k in 0..half {
                let w = Complex::from_polar(1.0, angle * k as f64);
                let u = data[start + k];
                let v = data[start + k + half] * w;
                data[start + k] = u + v;
                data[start + k + half] = u - v;
            }
        }
        len <<= 1;
    }
}

/// In-place inverse transform: forward transform, then mirror the indices
/// around the array midpoint and scale by 1/n.
pub fn inverse(data: &mut [Complex<f64>]) {
    forward(data);
    let n = data.len();
    let n2 = n / 2;
    let scale = 1.0 / n as f64;
    data[0] *= scale;
    data[n2] *= scale;
    for i in 1..n2 {
        let tmp = data[i] * scale;
        data[i] = data[n - i] * scale;
        data[n - i] = tmp;
    }
}

/// Circular cross-correlation of two equal-length spectra: pointwise
/// multiply `x1` with the conjugate of `x2`, then inverse-transform. The
/// real part of the result peaks at the displacement of `x1`'s signal
/// relative to `x2`'s.
pub fn correlate(x1: &[Complex<f64>], x2: &[Complex<f64>]) -> Vec<Complex<f64>> {
    assert_eq!(x1.len(), x2.len(), "spectra lengths differ");
    let mut product: Vec<Complex<f64>> =
        x1.iter().zip(x2.iter()).map(|(a, b)| a * b.conj()).collect();
    inverse(&mut product);
    product
}

/// Hann taper over the real part of a projection. Not applied by the digest
/// builders; the drift signal path is un-windowed.
pub fn hann_window(data: &mut [Complex<f64>]) {
    let len = data.len();
    for (n, value) in data.iter_mut().enumerate() {
        let sin_value = (PI * n as f64 / len as f64).sin();
        value.re *= sin_value * sin_value;
    }
}

/// Tukey (tapered cosine) window over the real part of a projection, with
/// flat center and tapered fraction `alpha`. Not applied by the digest
/// builders; the drift signal path is un-windowed.
pub fn tukey_window(data: &mut [Complex<f64>], alpha: f64) {
    let len = data.len();
    let edge = (alpha * len as f64 / 2.0) as isize - 1;
    if edge < 1 {
        return;
    }
    let edge = edge as usize;
    for n in 0..=edge {
        let sin_value = (PI * n as f64 / (2 * edge) as f64).sin();
        let sin_value_sqr = sin_value * sin_value;
        data[n].re *= sin_value_sqr;
        data[len - n - 1].re *= sin_value_sqr;
    }
}
