// Multi-star drift aggregation: combines per-star drift estimates from
// several simultaneously tracked guide stars into one consensus drift,
// rejecting statistical outliers (a star lost to a cloud edge, a cosmic ray
// hit). The aggregation itself is a plain outlier-filtered average; see
// DESIGN.md for the heritage of that choice.

use canonical_error::{failed_precondition_error, invalid_argument_error, CanonicalError};
use log::debug;
use statistical::{mean, population_standard_deviation};

use crate::digest::FrameDigest;
use crate::drift::calculate_drift;

// Stars whose drift magnitude falls further than this many standard
// deviations from the mean are dropped.
const OUTLIER_CUT: f64 = 1.1;

/// Aggregates per-star (reference, current) centroid digest pairs into a
/// consensus digest: the filtered average drift added onto `avg_reference`'s
/// centroid. With 2 or fewer stars every drift is kept (outlier statistics
/// need 3+ samples).
///
/// Fails with `InvalidArgument` if any digest is not a centroid digest or
/// the slices are empty or unequal, and with `FailedPrecondition` if no star
/// survives the outlier filter.
pub fn reduce_multistar_digest(
    avg_reference: &FrameDigest,
    references: &[FrameDigest],
    currents: &[FrameDigest],
) -> Result<FrameDigest, CanonicalError> {
    let count = references.len();
    if count < 1 || currents.len() != count {
        return Err(invalid_argument_error(&format!(
            "need equal, non-empty digest lists; got {} references and {} currents",
            count,
            currents.len()
        )));
    }
    let (avg_x, avg_y) = avg_reference.centroid().ok_or_else(|| {
        invalid_argument_error("multi-star aggregation requires a centroid reference digest")
    })?;
    for digest in references.iter().chain(currents.iter()) {
        if digest.centroid().is_none() {
            return Err(invalid_argument_error(
                "multi-star aggregation requires centroid digests",
            ));
        }
    }

    let mut drifts_x = Vec::with_capacity(count);
    let mut drifts_y = Vec::with_capacity(count);
    let mut magnitudes = Vec::with_capacity(count);
    for (reference, current) in references.iter().zip(currents.iter()) {
        let (dx, dy) = calculate_drift(reference, current)?;
        drifts_x.push(dx);
        drifts_y.push(dy);
        magnitudes.push((dx * dx + dy * dy).sqrt());
    }

    let average = mean(&magnitudes);
    let stddev = population_standard_deviation(&magnitudes, Some(average));
    debug!("multi-star: average = {:.4}, stddev = {:.4}", average, stddev);

    let mut drift_x = 0.0;
    let mut drift_y = 0.0;
    let mut used_count = 0usize;
    for i in 0..count {
        // Outlier rejection is only meaningful with 3+ samples.
        if count <= 2 || (average - magnitudes[i]).abs() <= OUTLIER_CUT * stddev {
            used_count += 1;
            drift_x += drifts_x[i];
            drift_y += drifts_y[i];
            debug!("multi-star: ++ used star [{}], drift = {:.4}", i, magnitudes[i]);
        } else {
            debug!("multi-star: -- skipped star [{}], drift = {:.4}", i, magnitudes[i]);
        }
    }
    if used_count < 1 {
        return Err(failed_precondition_error(
            "no star survived multi-star outlier rejection",
        ));
    }

    drift_x /= used_count as f64;
    drift_y /= used_count as f64;
    debug!(
        "multi-star: used {} of {} stars, drift = ({:.3}, {:.3})",
        used_count, count, drift_x, drift_y
    );
    Ok(FrameDigest::Centroid {
        x: avg_x + drift_x,
        y: avg_y + drift_y,
        width: currents[0].width(),
        height: currents[0].height(),
    })
}

/// Root mean square error of a drift sample, for guide-quality reporting.
pub fn rmse(set: &[f64]) -> f64 {
    if set.is_empty() {
        return 0.0;
    }
    (set.iter().map(|v| v * v).sum::<f64>() / set.len() as f64).sqrt()
}
