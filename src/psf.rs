// Focus quality metrics for a selected star: half flux diameter (HFD) and
// full width at half maximum (FWHM), both in pixels, plus the
// background-subtracted peak. HFD degrades gracefully as focus is lost and
// is the preferred autofocus signal; FWHM is only meaningful near focus.

use canonical_error::{invalid_argument_error, CanonicalError};
use log::debug;

use crate::raw_image::RawImage;

/// Focus metrics over one selection window.
#[derive(Debug, Clone, PartialEq)]
pub struct PsfMetrics {
    /// Full width at half maximum, pixels. Falls back to the window extent
    /// (2 * radius + 1) when the star is too faint or too defocused.
    pub fwhm: f64,
    /// Half flux diameter, pixels. Same fallback as `fwhm`.
    pub hfd: f64,
    /// Peak luminance above the local background.
    pub peak: f64,
}

/// Measures the star around (`x`, `y`) within a square window of the given
/// radius. The window border supplies the background estimate, so the radius
/// should comfortably exceed the star extent. Low-signal cases are not
/// errors; the metrics saturate at the window extent instead.
pub fn selection_psf(
    image: &RawImage,
    x: f64,
    y: f64,
    radius: usize,
) -> Result<PsfMetrics, CanonicalError> {
    let width = image.width();
    let height = image.height();
    if radius < 1 {
        return Err(invalid_argument_error("selection radius must be at least 1"));
    }
    if width <= 2 * radius || height <= 2 * radius {
        return Err(invalid_argument_error(&format!(
            "frame {}x{} cannot hold a radius {} selection",
            width, height, radius
        )));
    }
    let xx = x.round() as isize;
    let yy = y.round() as isize;
    let radius = radius as isize;
    if xx < radius || xx + radius >= width as isize {
        return Err(invalid_argument_error(&format!(
            "selection x {:.1} is too close to the frame edge",
            x
        )));
    }
    if yy < radius || yy + radius >= height as isize {
        return Err(invalid_argument_error(&format!(
            "selection y {:.1} is too close to the frame edge",
            y
        )));
    }

    let cb = xx - radius;
    let ce = xx + radius;
    let lb = yy - radius;
    let le = yy + radius;

    // Background from the window border; everything brighter than it is
    // treated as star signal.
    let mut border = Vec::with_capacity(8 * radius as usize);
    let mut max = 0.0_f64;
    for j in lb..=le {
        for i in cb..=ce {
            let value = image.luminance_at(i as usize, j as usize);
            if j == lb || j == le || i == cb || i == ce {
                border.push(value);
            }
            if value > max {
                max = value;
            }
        }
    }
    let background = border.iter().sum::<f64>() / border.len() as f64;
    let peak = max - background;
    let variance = border
        .iter()
        .map(|v| (v - background) * (v - background))
        .sum::<f64>()
        / border.len() as f64;
    let stddev = variance.sqrt();
    debug!(
        "selection_psf: background = {:.2}, stddev = {:.2}, max = {:.2}",
        background, stddev, max
    );

    let fallback = (2 * radius + 1) as f64;

    // HFD holds up down to roughly 2 stddev of signal.
    let hfd = if max < background + 2.0 * stddev {
        fallback
    } else {
        let mut prod = 0.0;
        let mut total = 0.0;
        for j in lb..=le {
            for i in cb..=ce {
                let value = image.luminance_at(i as usize, j as usize) - background;
                if value > 0.0 {
                    let dx = x - i as f64;
                    let dy = y - j as f64;
                    let dist = (dx * dx + dy * dy).sqrt();
                    prod += dist * value;
                    total += value;
                }
            }
        }
        if total > 0.0 {
            2.0 * prod / total
        } else {
            fallback
        }
    };

    // FWHM is erratic below 6 stddev of signal.
    let fwhm = if max < background + 6.0 * stddev {
        fallback
    } else {
        let half_max = peak / 2.0 + background;
        let directions: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
        let mut half_widths = [radius as f64; 4];
        for (d, &(di, dj)) in directions.iter().enumerate() {
            let mut previous = max;
            for k in 1..radius {
                let i = (xx + k * di) as usize;
                let j = (yy + k * dj) as usize;
                let value = image.luminance_at(i, j);
                if value <= half_max {
                    half_widths[d] = if value == previous {
                        k as f64
                    } else {
                        // Linear interpolation of the half-max crossing.
                        (k - 1) as f64 + (previous - half_max) / (previous - value)
                    };
                    break;
                }
                if value < previous {
                    previous = value;
                }
            }
        }
        let fwhm = half_widths.iter().sum::<f64>() / 2.0;
        if fwhm < 1.0 || fwhm > (2 * radius) as f64 {
            fallback
        } else {
            fwhm
        }
    };

    Ok(PsfMetrics { fwhm, hfd, peak })
}
