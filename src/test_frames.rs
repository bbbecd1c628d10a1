// Synthetic frame rendering for tests: circular Gaussian stars on a flat
// background, sampled at pixel centers so the analytic centroid of a star
// at (x, y) is exactly (x, y) in the half-pixel coordinate convention.

/// A single synthetic star.
pub struct Star {
    pub x: f64,
    pub y: f64,
    pub amplitude: f64,
    pub sigma: f64,
}

/// Renders a 16-bit mono frame. Each pixel samples the sum of the star
/// Gaussians at its center (i + 0.5, j + 0.5), clamped to the u16 range.
pub fn gaussian_frame_u16(
    width: usize,
    height: usize,
    background: f64,
    stars: &[Star],
) -> Vec<u16> {
    let mut data = Vec::with_capacity(width * height);
    for j in 0..height {
        for i in 0..width {
            let px = i as f64 + 0.5;
            let py = j as f64 + 0.5;
            let mut value = background;
            for star in stars {
                let dx = px - star.x;
                let dy = py - star.y;
                let r2 = dx * dx + dy * dy;
                value += star.amplitude * (-r2 / (2.0 * star.sigma * star.sigma)).exp();
            }
            data.push(value.round().clamp(0.0, 65535.0) as u16);
        }
    }
    data
}
