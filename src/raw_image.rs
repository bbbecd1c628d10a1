// Raw pixel buffer access for the six camera encodings. Upstream camera
// drivers pick the encoding; everything in this crate reduces a pixel to a
// single luminance-like scalar through RawImage::luminance().

use canonical_error::{invalid_argument_error, CanonicalError};

/// Pixel encodings produced by the camera drivers. Multi-channel formats
/// carry their channels in the byte order the name implies; the alpha
/// channel of `Rgba32`/`Abgr32` never contributes to luminance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Mono8,
    Mono16,
    Rgb24,
    Rgba32,
    Abgr32,
    Rgb48,
}

impl PixelFormat {
    /// Color/alpha samples stored per pixel.
    pub fn samples_per_pixel(self) -> usize {
        match self {
            PixelFormat::Mono8 | PixelFormat::Mono16 => 1,
            PixelFormat::Rgb24 | PixelFormat::Rgb48 => 3,
            PixelFormat::Rgba32 | PixelFormat::Abgr32 => 4,
        }
    }

    /// True for formats stored as 16-bit samples.
    pub fn is_sixteen_bit(self) -> bool {
        matches!(self, PixelFormat::Mono16 | PixelFormat::Rgb48)
    }

    /// Largest value a single sample can hold; used to flag oversaturated
    /// star peaks.
    pub fn max_value(self) -> f64 {
        if self.is_sixteen_bit() {
            65535.0
        } else {
            255.0
        }
    }
}

/// Borrowed sample storage. 8-bit formats index into `Bytes`, 16-bit formats
/// into `Words`.
#[derive(Debug, Clone, Copy)]
pub enum PixelData<'a> {
    Bytes(&'a [u8]),
    Words(&'a [u16]),
}

/// A borrowed, read-only view of one exposure. The buffer belongs to the
/// caller; nothing in this crate mutates or outlives it.
#[derive(Debug, Clone, Copy)]
pub struct RawImage<'a> {
    format: PixelFormat,
    data: PixelData<'a>,
    width: usize,
    height: usize,
}

impl<'a> RawImage<'a> {
    /// Wraps a raw exposure buffer. Fails if the storage width does not
    /// match the format, the buffer length does not match the geometry, or
    /// the frame is smaller than the 3x3 minimum.
    pub fn new(
        format: PixelFormat,
        data: PixelData<'a>,
        width: usize,
        height: usize,
    ) -> Result<Self, CanonicalError> {
        if width < 3 || height < 3 {
            return Err(invalid_argument_error(&format!(
                "frame {}x{} is below the 3x3 minimum",
                width, height
            )));
        }
        let expected = width * height * format.samples_per_pixel();
        let actual = match data {
            PixelData::Bytes(buf) => {
                if format.is_sixteen_bit() {
                    return Err(invalid_argument_error(
                        "16-bit pixel format requires 16-bit sample storage",
                    ));
                }
                buf.len()
            }
            PixelData::Words(buf) => {
                if !format.is_sixteen_bit() {
                    return Err(invalid_argument_error(
                        "8-bit pixel format requires 8-bit sample storage",
                    ));
                }
                buf.len()
            }
        };
        if actual != expected {
            return Err(invalid_argument_error(&format!(
                "buffer holds {} samples, {}x{} {:?} needs {}",
                actual, width, height, format, expected
            )));
        }
        Ok(RawImage {
            format,
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Intensity of the pixel at linear index `index`, as the unweighted
    /// average of its color channels (alpha excluded). The index must be
    /// less than width * height.
    pub fn luminance(&self, index: usize) -> f64 {
        match (self.format, self.data) {
            (PixelFormat::Mono8, PixelData::Bytes(buf)) => buf[index] as f64,
            (PixelFormat::Mono16, PixelData::Words(buf)) => buf[index] as f64,
            (PixelFormat::Rgb24, PixelData::Bytes(buf)) => {
                let k = 3 * index;
                (buf[k] as f64 + buf[k + 1] as f64 + buf[k + 2] as f64) / 3.0
            }
            (PixelFormat::Rgba32, PixelData::Bytes(buf)) => {
                let k = 4 * index;
                (buf[k] as f64 + buf[k + 1] as f64 + buf[k + 2] as f64) / 3.0
            }
            (PixelFormat::Abgr32, PixelData::Bytes(buf)) => {
                let k = 4 * index;
                (buf[k + 1] as f64 + buf[k + 2] as f64 + buf[k + 3] as f64) / 3.0
            }
            (PixelFormat::Rgb48, PixelData::Words(buf)) => {
                let k = 3 * index;
                (buf[k] as f64 + buf[k + 1] as f64 + buf[k + 2] as f64) / 3.0
            }
            // The constructor pairs storage with format.
            _ => unreachable!("pixel storage does not match format"),
        }
    }

    /// Intensity of the pixel at (x, y). Coordinates must lie inside the
    /// frame.
    pub fn luminance_at(&self, x: usize, y: usize) -> f64 {
        self.luminance(y * self.width + x)
    }
}
