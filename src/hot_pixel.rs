// Hot pixel suppression. A hot pixel is a lone sensor defect reporting a
// value far above its surroundings; a genuine star is always wider than one
// pixel, so comparing a pixel against a diagonal neighborhood separates the
// two.

use crate::raw_image::RawImage;

/// Returns the luminance of pixel (x, y) with single-pixel defects removed.
///
/// The pixel is sampled together with its 4 diagonal neighbors:
///
/// ```text
/// P0 .. P1
/// .. P2 ..
/// P3 .. P4
/// ```
///
/// If P2 is the maximum of the window and more than twice the second-largest
/// value, it is replaced with the window median; otherwise it is returned
/// unchanged. The diagonal window also catches hot rows and columns, since a
/// hot line never contributes to the diagonals. Coordinates are clamped one
/// pixel inside the frame edges.
pub fn filter_hot_pixel(image: &RawImage, x: usize, y: usize) -> f64 {
    let x = x.clamp(1, image.width() - 2);
    let y = y.clamp(1, image.height() - 2);

    let mut window = [
        image.luminance_at(x - 1, y - 1),
        image.luminance_at(x + 1, y - 1),
        image.luminance_at(x, y),
        image.luminance_at(x - 1, y + 1),
        image.luminance_at(x + 1, y + 1),
    ];
    let value = window[2];
    window.sort_unstable_by(|a, b| b.total_cmp(a));
    // window[0] = max, window[1] = second max, window[2] = median.
    if value == window[0] && value > 2.0 * window[1] {
        window[2]
    } else {
        value
    }
}

/// Median of three values; the 1-D companion of the diagonal window, used by
/// the star detector to veto hot pixels and hot lines along each axis.
pub fn median3(a: f64, b: f64, c: f64) -> f64 {
    if a > b {
        if b > c {
            b
        } else if a > c {
            c
        } else {
            a
        }
    } else if a > c {
        a
    } else if b > c {
        c
    } else {
        b
    }
}
