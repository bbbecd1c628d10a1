// Guide star detection over a full frame: iterative brightest-pixel search
// with a hot-pixel veto, greedy neighborhood suppression around each find,
// and optional sub-pixel refinement through the selection digest.

use log::debug;

use crate::digest::selection_digest_iterative;
use crate::hot_pixel::median3;
use crate::raw_image::RawImage;

// Stars must be this much brighter than the frame average.
const STARS_THRESHOLD: f64 = 1.35;
// Pixels at or below this fraction of the threshold stop a quadrant sweep.
const CLEAR_CUTOFF: f64 = 0.99;
// Margin excluded from the peak search along every frame edge; frames
// shorter than 4 margins use a quarter of their height instead.
const EDGE_CLIPPING: usize = 20;
// Farthest a quadrant sweep reaches from the peak.
const STAR_SPREAD: usize = 100;
// Refinement passes fed through the iterative selection digest.
const REFINE_ITERATIONS: usize = 2;

/// One detected guide star candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct StarCandidate {
    /// Sub-pixel position when refinement ran, else the peak pixel.
    pub x: f64,
    pub y: f64,
    /// Natural log of the accumulated above-threshold flux.
    pub luminance: f64,
    /// Distance from the frame center, normalized by the half-extent of the
    /// shorter axis.
    pub nc_distance: f64,
    /// The peak pixel sat at the format's maximum representable value.
    pub oversaturated: bool,
}

/// Locates up to `max_count` stars, brightest first (by log-scaled
/// accumulated flux). `refine_radius` >= 3 enables sub-pixel refinement of
/// each peak through the centroid digest; candidates whose refinement fails
/// are dropped. A `refine_radius` of 0 (or anything below 3) keeps the
/// integer peak coordinates.
pub fn find_stars(image: &RawImage, refine_radius: u16, max_count: usize) -> Vec<StarCandidate> {
    let width = image.width();
    let height = image.height();
    let size = width * height;

    // Working copy; found stars are blanked out of it.
    let mut buf: Vec<f64> = (0..size).map(|i| image.luminance(i)).collect();
    let max_luminance = image.format().max_value();

    let clip_edge = if height >= EDGE_CLIPPING * 4 {
        EDGE_CLIPPING
    } else {
        height / 4
    };
    // The median veto reads one pixel in every direction. A frame narrower
    // than the margins leaves an empty scan region and yields no stars.
    let clip_left = clip_edge.max(1);
    let clip_top = clip_edge.max(1);
    let clip_right = width.saturating_sub(clip_edge).min(width - 1);
    let clip_bottom = height.saturating_sub(clip_edge).min(height - 1);

    let threshold = STARS_THRESHOLD * buf.iter().sum::<f64>() / size as f64;
    let clear_cutoff = threshold * CLEAR_CUTOFF;
    debug!("find_stars: threshold = {:.3}", threshold);

    let width2 = width / 2;
    let height2 = height / 2;
    let divider = if width > height { height2 } else { width2 };

    let mut stars: Vec<StarCandidate> = Vec::new();
    loop {
        // Brightest remaining pixel whose horizontal and vertical 3-sample
        // medians also clear the threshold; a hot pixel or hot line fails
        // the median test.
        let mut lmax = threshold;
        let mut peak = None;
        for j in clip_top..clip_bottom {
            for i in clip_left..clip_right {
                let off = j * width + i;
                if buf[off] > lmax
                    && median3(buf[off - 1], buf[off], buf[off + 1]) > threshold
                    && median3(buf[off - width], buf[off], buf[off + width]) > threshold
                {
                    lmax = buf[off];
                    peak = Some((i, j));
                }
            }
        }
        let Some((star_x, star_y)) = peak else {
            break;
        };

        // Blank the star out of the working copy, sweeping each of the four
        // quadrants greedily and accumulating the flux above threshold. A
        // sweep row (or the whole quadrant) ends at the first pixel that
        // falls under the cutoff.
        let mut luminance = 0.0;
        let min_i = star_x.saturating_sub(STAR_SPREAD);
        let max_i = (width - 1).min(star_x + STAR_SPREAD);
        let min_j = star_y.saturating_sub(STAR_SPREAD);
        let max_j = (height - 1).min(star_y + STAR_SPREAD);

        // +X, +Y quadrant.
        'pos_y: for j in star_y..=max_j {
            if buf[j * width + star_x] < clear_cutoff {
                break 'pos_y;
            }
            for i in star_x..=max_i {
                let off = j * width + i;
                if buf[off] > clear_cutoff {
                    luminance += buf[off] - threshold;
                    buf[off] = 0.0;
                } else {
                    break;
                }
            }
        }
        // -X, +Y quadrant.
        if star_x > 0 {
            'neg_x: for j in star_y..=max_j {
                if buf[j * width + star_x - 1] < clear_cutoff {
                    break 'neg_x;
                }
                for i in (min_i..star_x).rev() {
                    let off = j * width + i;
                    if buf[off] > clear_cutoff {
                        luminance += buf[off] - threshold;
                        buf[off] = 0.0;
                    } else {
                        break;
                    }
                }
            }
        }
        // +X, -Y quadrant.
        if star_y > 0 {
            'neg_y: for j in (min_j..star_y).rev() {
                if buf[j * width + star_x] < clear_cutoff {
                    break 'neg_y;
                }
                for i in star_x..=max_i {
                    let off = j * width + i;
                    if buf[off] > clear_cutoff {
                        luminance += buf[off] - threshold;
                        buf[off] = 0.0;
                    } else {
                        break;
                    }
                }
            }
        }
        // -X, -Y quadrant.
        if star_x > 0 && star_y > 0 {
            'neg_xy: for j in (min_j..star_y).rev() {
                if buf[j * width + star_x - 1] < clear_cutoff {
                    break 'neg_xy;
                }
                for i in (min_i..star_x).rev() {
                    let off = j * width + i;
                    if buf[off] > clear_cutoff {
                        luminance += buf[off] - threshold;
                        buf[off] = 0.0;
                    } else {
                        break;
                    }
                }
            }
        }

        let mut x = star_x as f64;
        let mut y = star_y as f64;
        let mut refined = true;
        if refine_radius >= 3 {
            match selection_digest_iterative(
                image,
                x,
                y,
                refine_radius as usize,
                REFINE_ITERATIONS,
            ) {
                Ok(digest) => {
                    let (cx, cy) = digest.centroid().unwrap();
                    x = cx;
                    y = cy;
                }
                Err(e) => {
                    debug!("find_stars: dropping peak at ({}, {}): {}", star_x, star_y, e);
                    refined = false;
                }
            }
        }
        if refined {
            let dx = x - width2 as f64;
            let dy = y - height2 as f64;
            stars.push(StarCandidate {
                x,
                y,
                luminance: luminance.abs().ln(),
                nc_distance: (dx * dx + dy * dy).sqrt() / divider as f64,
                oversaturated: lmax == max_luminance,
            });
        }
        if stars.len() >= max_count {
            break;
        }
    }

    stars.sort_by(|a, b| b.luminance.total_cmp(&a.luminance));
    for (i, star) in stars.iter().enumerate() {
        debug!(
            "find_stars: star #{}: x = {:.2}, y = {:.2}, ncdist = {:.3}, lum = {:.3}",
            i + 1,
            star.x,
            star.y,
            star.nc_distance,
            star.luminance
        );
    }
    stars
}
