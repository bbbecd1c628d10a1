//! Guide frame analysis for astronomical autoguiding and autofocus.
//!
//! The crate turns raw camera frames into compact digests (a thresholded
//! centroid or a pair of axis-projection spectra), estimates frame-to-frame
//! drift from digest pairs, aggregates drifts across several guide stars,
//! detects guide star candidates, and measures focus quality (HFD, FWHM)
//! of a selected star.

pub mod digest;
pub mod drift;
pub mod fft;
pub mod hot_pixel;
pub mod multistar;
pub mod psf;
pub mod raw_image;
pub mod star_finder;

#[cfg(test)]
pub(crate) mod test_frames;
