// Drift estimation between two digests of the same scene. Centroid digests
// subtract directly; donuts digests correlate each axis projection in the
// frequency domain and refine the correlation peak to sub-pixel precision.

use canonical_error::{invalid_argument_error, CanonicalError};
use num_complex::Complex;

use crate::digest::FrameDigest;
use crate::fft;

/// Returns the (dx, dy) displacement of `current` relative to `reference`,
/// in pixels. Both digests must carry the same algorithm variant and the
/// same geometry; anything else (including a released digest) is an
/// `InvalidArgument` mismatch.
pub fn calculate_drift(
    reference: &FrameDigest,
    current: &FrameDigest,
) -> Result<(f64, f64), CanonicalError> {
    match (reference, current) {
        (
            FrameDigest::Centroid { x: rx, y: ry, width: rw, height: rh },
            FrameDigest::Centroid { x: nx, y: ny, width: nw, height: nh },
        ) => {
            if rw != nw || rh != nh {
                return Err(invalid_argument_error(&format!(
                    "digest geometries differ: {}x{} vs {}x{}",
                    rw, rh, nw, nh
                )));
            }
            Ok((nx - rx, ny - ry))
        }
        (
            FrameDigest::Donuts { fft_x: rfx, fft_y: rfy, width: rw, height: rh, .. },
            FrameDigest::Donuts { fft_x: nfx, fft_y: nfy, width: nw, height: nh, .. },
        ) => {
            if rw != nw || rh != nh {
                return Err(invalid_argument_error(&format!(
                    "digest geometries differ: {}x{} vs {}x{}",
                    rw, rh, nw, nh
                )));
            }
            let drift_x = find_distance(&fft::correlate(nfx, rfx));
            let drift_y = find_distance(&fft::correlate(nfy, rfy));
            Ok((drift_x, drift_y))
        }
        _ => Err(invalid_argument_error(
            "digest algorithms differ or a digest has been released",
        )),
    }
}

// Locates the correlation maximum and refines it with a quadratic fit over
// the peak bin and its two (circularly adjacent) neighbors, then maps the
// bin index into a signed offset: indices beyond the array's half-length
// wrap to negative displacements.
fn find_distance(c: &[Complex<f64>]) -> f64 {
    let n = c.len();
    let n2 = n / 2;
    let mut max = 0;
    for i in 0..n {
        if c[i].re > c[max].re {
            max = i;
        }
    }
    let (prev, next) = if max == 0 || max == n2 {
        (n - 1, 1)
    } else if max == n - 1 {
        (n - 2, 0)
    } else {
        (max - 1, max + 1)
    };
    let denominator = 2.0 * (2.0 * c[max].re - c[next].re - c[prev].re);
    let max_subp = if denominator.abs() > f64::EPSILON {
        (c[next].re - c[prev].re) / denominator
    } else {
        // Degenerate (flat) correlation; no sub-pixel information.
        0.0
    };
    if max == n2 {
        // The wrap boundary is ambiguous between +n/2 and -n/2.
        max_subp
    } else if max > n2 {
        (max as f64 - n as f64) + max_subp
    } else {
        max as f64 + max_subp
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use canonical_error::CanonicalErrorCode;

    use super::*;
    use crate::digest::{donuts_digest, selection_digest, FrameDigest};
    use crate::raw_image::{PixelData, PixelFormat, RawImage};
    use crate::test_frames::{gaussian_frame_u16, Star};

    fn star_image(data: &[u16], width: usize, height: usize) -> RawImage {
        RawImage::new(PixelFormat::Mono16, PixelData::Words(data), width, height).unwrap()
    }

    #[test]
    fn test_centroid_drift_additivity() {
        let reference_data = gaussian_frame_u16(
            64,
            64,
            100.0,
            &[Star { x: 32.3, y: 31.7, amplitude: 4000.0, sigma: 2.0 }],
        );
        let current_data = gaussian_frame_u16(
            64,
            64,
            100.0,
            &[Star { x: 32.8, y: 31.2, amplitude: 4000.0, sigma: 2.0 }],
        );
        let reference =
            selection_digest(&star_image(&reference_data, 64, 64), 32.0, 32.0, 8).unwrap();
        let current =
            selection_digest(&star_image(&current_data, 64, 64), 32.0, 32.0, 8).unwrap();
        let (dx, dy) = calculate_drift(&reference, &current).unwrap();
        assert_abs_diff_eq!(dx, 0.5, epsilon = 0.05);
        assert_abs_diff_eq!(dy, -0.5, epsilon = 0.05);
    }

    #[test]
    fn test_donuts_drift_additivity() {
        let reference_data = gaussian_frame_u16(
            64,
            64,
            100.0,
            &[Star { x: 30.5, y: 33.5, amplitude: 4000.0, sigma: 3.0 }],
        );
        let current_data = gaussian_frame_u16(
            64,
            64,
            100.0,
            &[Star { x: 33.5, y: 31.5, amplitude: 4000.0, sigma: 3.0 }],
        );
        let reference = donuts_digest(&star_image(&reference_data, 64, 64), 0).unwrap();
        let current = donuts_digest(&star_image(&current_data, 64, 64), 0).unwrap();
        let (dx, dy) = calculate_drift(&reference, &current).unwrap();
        assert_abs_diff_eq!(dx, 3.0, epsilon = 0.1);
        assert_abs_diff_eq!(dy, -2.0, epsilon = 0.1);
    }

    #[test]
    fn test_donuts_zero_drift() {
        let data = gaussian_frame_u16(
            64,
            64,
            100.0,
            &[Star { x: 32.5, y: 32.5, amplitude: 4000.0, sigma: 3.0 }],
        );
        let a = donuts_digest(&star_image(&data, 64, 64), 0).unwrap();
        let b = donuts_digest(&star_image(&data, 64, 64), 0).unwrap();
        let (dx, dy) = calculate_drift(&a, &b).unwrap();
        assert_abs_diff_eq!(dx, 0.0, epsilon = 0.01);
        assert_abs_diff_eq!(dy, 0.0, epsilon = 0.01);
    }

    #[test]
    fn test_mismatched_digests_rejected() {
        let data = gaussian_frame_u16(
            64,
            64,
            100.0,
            &[Star { x: 32.5, y: 32.5, amplitude: 4000.0, sigma: 3.0 }],
        );
        let image = star_image(&data, 64, 64);
        let centroid = selection_digest(&image, 32.0, 32.0, 8).unwrap();
        let donuts = donuts_digest(&image, 0).unwrap();

        let err = calculate_drift(&centroid, &donuts).unwrap_err();
        assert_eq!(err.code, CanonicalErrorCode::InvalidArgument);

        let err = calculate_drift(&centroid, &FrameDigest::None).unwrap_err();
        assert_eq!(err.code, CanonicalErrorCode::InvalidArgument);

        // Same algorithm, different geometry.
        let small_data = gaussian_frame_u16(
            32,
            32,
            100.0,
            &[Star { x: 16.5, y: 16.5, amplitude: 4000.0, sigma: 2.0 }],
        );
        let small = selection_digest(&star_image(&small_data, 32, 32), 16.0, 16.0, 8).unwrap();
        let err = calculate_drift(&centroid, &small).unwrap_err();
        assert_eq!(err.code, CanonicalErrorCode::InvalidArgument);
    }

    #[test]
    fn test_find_distance_wrap_mapping() {
        // A correlation peak past the half-length maps to a negative offset.
        let mut c = vec![Complex::new(0.0, 0.0); 32];
        c[29].re = 10.0;
        assert_abs_diff_eq!(find_distance(&c), -3.0, epsilon = 1e-9);

        let mut c = vec![Complex::new(0.0, 0.0); 32];
        c[5].re = 10.0;
        assert_abs_diff_eq!(find_distance(&c), 5.0, epsilon = 1e-9);

        // Peak at zero with symmetric neighbors: no displacement.
        let mut c = vec![Complex::new(0.0, 0.0); 32];
        c[0].re = 10.0;
        c[1].re = 4.0;
        c[31].re = 4.0;
        assert_abs_diff_eq!(find_distance(&c), 0.0, epsilon = 1e-9);
    }
}
