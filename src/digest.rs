// Frame digests: compact, comparable fingerprints of a frame or selection.
// Two algorithms produce them. Centroid takes the intensity-weighted first
// moment of pixels above a background threshold; donuts collapses the frame
// into row/column intensity projections and transforms them to the frequency
// domain for correlation-based drift tracking.

use canonical_error::{failed_precondition_error, invalid_argument_error, CanonicalError};
use log::debug;
use num_complex::Complex;

use crate::fft;
use crate::hot_pixel::filter_hot_pixel;
use crate::raw_image::RawImage;

// Background thresholds, as multiples of the mean intensity. The values are
// tuned per call site; see indigo heritage notes in DESIGN.md.
const SELECTION_THRESHOLD: f64 = 1.10;
const CENTROID_THRESHOLD: f64 = 1.20;
const DONUTS_THRESHOLD: f64 = 1.15;

// Sliding-minimum radius for projection background removal.
const BG_RADIUS: usize = 5;

/// A fingerprint of one frame (or selection). Digests are compared pairwise
/// by the drift estimator; both sides must carry the same variant and the
/// same geometry. A `Donuts` digest owns its frequency-domain projections;
/// `release()` frees them and returns the digest to `None`.
#[derive(Debug, Clone, Default)]
pub enum FrameDigest {
    #[default]
    None,
    Centroid {
        x: f64,
        y: f64,
        width: usize,
        height: usize,
    },
    Donuts {
        fft_x: Vec<Complex<f64>>,
        fft_y: Vec<Complex<f64>>,
        snr: f64,
        width: usize,
        height: usize,
    },
}

impl FrameDigest {
    /// Frees any owned frequency-domain data and resets to `None`. A digest
    /// must be released (or dropped) before its slot is reused for a
    /// different geometry.
    pub fn release(&mut self) {
        *self = FrameDigest::None;
    }

    /// Geometry the digest was computed over. For donuts this is the
    /// power-of-two padded projection size, not the frame size.
    pub fn width(&self) -> usize {
        match self {
            FrameDigest::None => 0,
            FrameDigest::Centroid { width, .. } => *width,
            FrameDigest::Donuts { width, .. } => *width,
        }
    }

    pub fn height(&self) -> usize {
        match self {
            FrameDigest::None => 0,
            FrameDigest::Centroid { height, .. } => *height,
            FrameDigest::Donuts { height, .. } => *height,
        }
    }

    /// Sub-pixel star position, for centroid digests.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        match self {
            FrameDigest::Centroid { x, y, .. } => Some((*x, *y)),
            _ => None,
        }
    }

    /// Signal-to-noise estimate, for donuts digests.
    pub fn snr(&self) -> Option<f64> {
        match self {
            FrameDigest::Donuts { snr, .. } => Some(*snr),
            _ => None,
        }
    }
}

/// Builds a centroid digest of the (2 * radius + 1) square selection around
/// (x, y). Pixels pass through the hot pixel filter; pixels below 110% of
/// the window mean are zeroed before the moment computation. The resulting
/// coordinates follow the convention that a single pixel's centroid is at
/// 0.5, not 1.0.
///
/// Fails with `InvalidArgument` if the selection does not lie fully inside
/// the frame, and with `FailedPrecondition` if the window maximum does not
/// exceed the threshold (no usable star; retry with more exposure or gain).
pub fn selection_digest(
    image: &RawImage,
    x: f64,
    y: f64,
    radius: usize,
) -> Result<FrameDigest, CanonicalError> {
    let width = image.width() as isize;
    let height = image.height() as isize;
    let r = radius as isize;
    let xx = x.round() as isize;
    let yy = y.round() as isize;

    if width <= 2 * r + 1 || height <= 2 * r + 1 {
        return Err(invalid_argument_error(&format!(
            "selection radius {} does not fit a {}x{} frame",
            radius, width, height
        )));
    }
    if xx < r || width - r < xx || yy < r || height - r < yy {
        return Err(invalid_argument_error(&format!(
            "selection at ({:.1}, {:.1}) radius {} exceeds frame bounds",
            x, y, radius
        )));
    }

    let (cs, ce) = (xx - r, xx + r);
    let (ls, le) = (yy - r, yy + r);

    let mut sum = 0.0;
    let mut max = 0.0_f64;
    for j in ls..=le {
        for i in cs..=ce {
            let value = filter_hot_pixel(image, i as usize, j as usize);
            sum += value;
            if value > max {
                max = value;
            }
        }
    }

    let window = (2 * r + 1) * (2 * r + 1);
    let threshold = SELECTION_THRESHOLD * sum / window as f64;
    debug!("selection: threshold = {:.3}, max = {:.3}", threshold, max);
    if max <= threshold {
        return Err(failed_precondition_error(
            "insufficient signal: selection maximum does not exceed threshold",
        ));
    }

    let mut m10 = 0.0;
    let mut m01 = 0.0;
    let mut m00 = 0.0;
    for j in ls..=le {
        for i in cs..=ce {
            let value = (filter_hot_pixel(image, i as usize, j as usize) - threshold).max(0.0);
            m10 += (i + 1 - cs) as f64 * value;
            m01 += (j + 1 - ls) as f64 * value;
            m00 += value;
        }
    }

    Ok(FrameDigest::Centroid {
        x: cs as f64 + m10 / m00 - 0.5,
        y: ls as f64 + m01 / m00 - 0.5,
        width: image.width(),
        height: image.height(),
    })
}

/// Re-centers the selection on each pass: every iteration feeds the digest's
/// centroid back in as the next selection center, letting a poor initial
/// guess converge onto the star.
pub fn selection_digest_iterative(
    image: &RawImage,
    x: f64,
    y: f64,
    radius: usize,
    iterations: usize,
) -> Result<FrameDigest, CanonicalError> {
    let mut digest = selection_digest(image, x, y, radius)?;
    for _ in 1..iterations {
        let (cx, cy) = digest.centroid().unwrap();
        digest = selection_digest(image, cx, cy, radius)?;
    }
    Ok(digest)
}

/// Builds a centroid digest of the whole frame: the intensity-weighted first
/// moment over every pixel, with the 0.5-pixel convention. The 120%-of-mean
/// threshold only gates usability; the moment itself is unthresholded.
pub fn centroid_digest(image: &RawImage) -> Result<FrameDigest, CanonicalError> {
    let width = image.width();
    let height = image.height();
    let size = width * height;

    let mut sum = 0.0;
    let mut max = 0.0_f64;
    for i in 0..size {
        let value = image.luminance(i);
        sum += value;
        if value > max {
            max = value;
        }
    }

    let threshold = CENTROID_THRESHOLD * sum / size as f64;
    debug!("centroid: threshold = {:.3}, max = {:.3}", threshold, max);
    if max <= threshold {
        return Err(failed_precondition_error(
            "insufficient signal: frame maximum does not exceed threshold",
        ));
    }

    let mut m10 = 0.0;
    let mut m01 = 0.0;
    let mut m00 = 0.0;
    let mut ci = 1usize;
    let mut li = 1usize;
    for i in 0..size {
        let value = image.luminance(i);
        m10 += ci as f64 * value;
        m01 += li as f64 * value;
        m00 += value;
        ci += 1;
        if ci > width {
            ci = 1;
            li += 1;
        }
    }

    Ok(FrameDigest::Centroid {
        x: m10 / m00 - 0.5,
        y: m01 / m00 - 0.5,
        width,
        height,
    })
}

/// Builds a donuts digest of the whole frame, excluding `edge_clip` pixels
/// from both ends of each axis to avoid frame-edge artifacts. Hot-filtered
/// intensities above 115% of the clipped-region mean accumulate into row and
/// column projections; each projection is background-calibrated, padded to
/// the next power of two and forward-transformed. The digest geometry is the
/// padded size.
pub fn donuts_digest(image: &RawImage, edge_clip: usize) -> Result<FrameDigest, CanonicalError> {
    let width = image.width();
    let height = image.height();

    // Each clipped sub-dimension must hold at least 2 pixels; anything less
    // cannot feed the transform.
    if width < 2 * edge_clip + 2 || height < 2 * edge_clip + 2 {
        return Err(invalid_argument_error(&format!(
            "edge clipping {} leaves no transformable region of a {}x{} frame",
            edge_clip, width, height
        )));
    }

    let (cs, ce) = (edge_clip, width - edge_clip);
    let (ls, le) = (edge_clip, height - edge_clip);
    let sub_width = width - 2 * edge_clip;
    let sub_height = height - 2 * edge_clip;

    let mut sum = 0.0;
    let mut max = 0.0_f64;
    for j in ls..le {
        for i in cs..ce {
            let value = filter_hot_pixel(image, i, j);
            sum += value;
            if value > max {
                max = value;
            }
        }
    }

    let threshold = DONUTS_THRESHOLD * sum / (sub_width * sub_height) as f64;
    debug!(
        "donuts: threshold = {:.3}, max = {:.3}, edge_clip = {}px",
        threshold, max, edge_clip
    );
    if max <= threshold {
        return Err(failed_precondition_error(
            "insufficient signal: frame maximum does not exceed threshold",
        ));
    }

    let fft_width = sub_width.next_power_of_two();
    let fft_height = sub_height.next_power_of_two();
    let mut col_x = vec![Complex::new(0.0, 0.0); fft_width];
    let mut col_y = vec![Complex::new(0.0, 0.0); fft_height];
    for j in ls..le {
        for i in cs..ce {
            let value = (filter_hot_pixel(image, i, j) - threshold).max(0.0);
            col_x[i - cs].re += value;
            col_y[j - ls].re += value;
        }
    }

    let snr = (calibrate_projection(&mut col_x[..sub_width])
        + calibrate_projection(&mut col_y[..sub_height]))
        / 2.0;

    fft::forward(&mut col_x);
    fft::forward(&mut col_y);

    Ok(FrameDigest::Donuts {
        fft_x: col_x,
        fft_y: col_y,
        snr,
        width: fft_width,
        height: fft_height,
    })
}

// Removes a sliding local-minimum background (radius BG_RADIUS) from the
// projection, zeroes the uncovered ends, and estimates signal-to-noise as
// the ratio of above- to below-threshold mean squares, with the threshold
// one standard deviation above the calibrated mean. Mutates the projection
// in place; the FFT consumes the calibrated values.
fn calibrate_projection(vector: &mut [Complex<f64>]) -> f64 {
    let size = vector.len();
    if size < 2 * (BG_RADIUS + 1) {
        return 0.0;
    }
    let first = BG_RADIUS + 1;
    let last = size - BG_RADIUS - 1;

    let mut mins = vec![0.0; size];
    for i in first..=last {
        let mut min = vector[i - BG_RADIUS].re;
        for j in (i - BG_RADIUS + 1)..=(i + BG_RADIUS) {
            let value = vector[j].re;
            if value < min {
                min = value;
            }
        }
        mins[i] = min;
    }

    for value in vector[..first].iter_mut() {
        value.re = 0.0;
    }
    for value in vector[last + 1..].iter_mut() {
        value.re = 0.0;
    }

    let count = (last - first + 1) as f64;
    let mut avg = 0.0;
    for i in first..=last {
        let value = vector[i].re - mins[i];
        vector[i].re = value;
        avg += value;
    }
    avg /= count;

    let mut variance = 0.0;
    for i in first..=last {
        let value = vector[i].re - avg;
        variance += value * value;
    }
    variance /= count;

    let threshold = avg + variance.sqrt();
    let mut signal_ms = 0.0;
    let mut noise_ms = 0.0;
    let mut signal_count = 0usize;
    let mut noise_count = 0usize;
    for i in first..=last {
        let value = vector[i].re;
        if value > threshold {
            signal_ms += value * value;
            signal_count += 1;
        } else {
            noise_ms += value * value;
            noise_count += 1;
        }
    }
    if signal_count == 0 {
        return 0.0;
    }
    if noise_count == 0 || noise_ms == 0.0 {
        // Nothing but signal above the cut; noise-free projection.
        return f64::INFINITY;
    }
    (signal_ms / signal_count as f64) / (noise_ms / noise_count as f64)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use canonical_error::CanonicalErrorCode;

    use super::*;
    use crate::raw_image::{PixelData, PixelFormat, RawImage};
    use crate::test_frames::{gaussian_frame_u16, Star};

    #[test]
    fn test_selection_centroid_recovery() {
        let data = gaussian_frame_u16(
            64,
            64,
            100.0,
            &[Star { x: 32.3, y: 31.7, amplitude: 4000.0, sigma: 2.0 }],
        );
        let image =
            RawImage::new(PixelFormat::Mono16, PixelData::Words(&data), 64, 64).unwrap();
        let digest = selection_digest(&image, 32.0, 32.0, 8).unwrap();
        let (x, y) = digest.centroid().unwrap();
        assert_abs_diff_eq!(x, 32.3, epsilon = 0.1);
        assert_abs_diff_eq!(y, 31.7, epsilon = 0.1);
        assert_eq!(digest.width(), 64);
        assert_eq!(digest.height(), 64);
    }

    #[test]
    fn test_iterative_selection_converges_from_poor_guess() {
        let data = gaussian_frame_u16(
            64,
            64,
            100.0,
            &[Star { x: 30.5, y: 33.5, amplitude: 4000.0, sigma: 2.0 }],
        );
        let image =
            RawImage::new(PixelFormat::Mono16, PixelData::Words(&data), 64, 64).unwrap();
        // First pass centered 4px off still sees the star's flank; the
        // second pass re-centers on it.
        let digest = selection_digest_iterative(&image, 34.0, 37.0, 8, 2).unwrap();
        let (x, y) = digest.centroid().unwrap();
        assert_abs_diff_eq!(x, 30.5, epsilon = 0.1);
        assert_abs_diff_eq!(y, 33.5, epsilon = 0.1);
    }

    #[test]
    fn test_selection_boundary_safety() {
        let data = vec![100u16; 64 * 64];
        let image =
            RawImage::new(PixelFormat::Mono16, PixelData::Words(&data), 64, 64).unwrap();
        // Radius reaching outside the frame is a geometry error, not a read.
        let err = selection_digest(&image, 3.0, 32.0, 8).unwrap_err();
        assert_eq!(err.code, CanonicalErrorCode::InvalidArgument);
        let err = selection_digest(&image, 32.0, 62.0, 8).unwrap_err();
        assert_eq!(err.code, CanonicalErrorCode::InvalidArgument);
        // Radius larger than the frame itself.
        let err = selection_digest(&image, 32.0, 32.0, 40).unwrap_err();
        assert_eq!(err.code, CanonicalErrorCode::InvalidArgument);
    }

    #[test]
    fn test_flat_selection_reports_insufficient_signal() {
        let data = vec![500u16; 64 * 64];
        let image =
            RawImage::new(PixelFormat::Mono16, PixelData::Words(&data), 64, 64).unwrap();
        let err = selection_digest(&image, 32.0, 32.0, 8).unwrap_err();
        assert_eq!(err.code, CanonicalErrorCode::FailedPrecondition);
    }

    #[test]
    fn test_whole_frame_centroid() {
        let data = gaussian_frame_u16(
            64,
            64,
            0.0,
            &[Star { x: 20.5, y: 40.5, amplitude: 4000.0, sigma: 2.0 }],
        );
        let image =
            RawImage::new(PixelFormat::Mono16, PixelData::Words(&data), 64, 64).unwrap();
        let digest = centroid_digest(&image).unwrap();
        let (x, y) = digest.centroid().unwrap();
        // Unthresholded whole-frame moment over a zero background.
        assert_abs_diff_eq!(x, 20.5, epsilon = 0.1);
        assert_abs_diff_eq!(y, 40.5, epsilon = 0.1);
    }

    #[test]
    fn test_donuts_geometry() {
        let data = gaussian_frame_u16(
            100,
            80,
            100.0,
            &[Star { x: 50.5, y: 40.5, amplitude: 4000.0, sigma: 3.0 }],
        );
        let image =
            RawImage::new(PixelFormat::Mono16, PixelData::Words(&data), 100, 80).unwrap();
        let digest = donuts_digest(&image, 10).unwrap();
        // 100 - 2*10 = 80 pads to 128; 80 - 2*10 = 60 pads to 64.
        assert_eq!(digest.width(), 128);
        assert_eq!(digest.height(), 64);
        assert!(digest.snr().unwrap() > 1.0);

        let err = donuts_digest(&image, 40).unwrap_err();
        assert_eq!(err.code, CanonicalErrorCode::InvalidArgument);
    }

    #[test]
    fn test_donuts_degenerate_region_rejected() {
        // Clipping a 3-wide frame to a single column leaves a projection too
        // short to transform; that is a geometry error, not a crash. The
        // 2-pixel feature survives the hot-pixel filter, so geometry is the
        // only thing wrong with this frame.
        let mut data = vec![100u16; 3 * 64];
        data[30 * 3 + 1] = 4000;
        data[31 * 3 + 1] = 4000;
        let image =
            RawImage::new(PixelFormat::Mono16, PixelData::Words(&data), 3, 64).unwrap();
        let err = donuts_digest(&image, 1).unwrap_err();
        assert_eq!(err.code, CanonicalErrorCode::InvalidArgument);
    }

    #[test]
    fn test_flat_donuts_reports_insufficient_signal() {
        let data = vec![500u16; 64 * 64];
        let image =
            RawImage::new(PixelFormat::Mono16, PixelData::Words(&data), 64, 64).unwrap();
        let err = donuts_digest(&image, 0).unwrap_err();
        assert_eq!(err.code, CanonicalErrorCode::FailedPrecondition);
    }

    #[test]
    fn test_release_frees_digest() {
        let data = gaussian_frame_u16(
            64,
            64,
            100.0,
            &[Star { x: 32.5, y: 32.5, amplitude: 4000.0, sigma: 3.0 }],
        );
        let image =
            RawImage::new(PixelFormat::Mono16, PixelData::Words(&data), 64, 64).unwrap();
        let mut digest = donuts_digest(&image, 0).unwrap();
        assert_eq!(digest.width(), 64);
        digest.release();
        assert!(matches!(digest, FrameDigest::None));
        assert_eq!(digest.width(), 0);
    }

    #[test]
    fn test_calibrate_projection_snr() {
        // Flat background with one clear pulse: strong signal.
        let mut projection: Vec<Complex<f64>> =
            (0..64).map(|_| Complex::new(10.0, 0.0)).collect();
        for i in 30..34 {
            projection[i].re = 500.0;
        }
        let snr = calibrate_projection(&mut projection);
        assert!(snr > 10.0, "snr = {}", snr);
        // Ends outside the sliding window are zeroed.
        assert_eq!(projection[0].re, 0.0);
        assert_eq!(projection[63].re, 0.0);

        // Too short for the sliding window: no estimate.
        let mut short: Vec<Complex<f64>> = (0..8).map(|_| Complex::new(1.0, 0.0)).collect();
        assert_eq!(calibrate_projection(&mut short), 0.0);
    }
}
