//! Per-object noise estimation and power-floor filtering.
//!
//! After both scans agree on a cell, the detector estimates the noise on
//! every virtual antenna separately.  The estimate averages the power of
//! the range reference cells around the object at its Doppler bin, using
//! the range window geometry.  The resulting vector feeds the angle and
//! velocity estimators, which need the per-channel noise level rather
//! than the combined one.

use log::debug;
use ndarray::{s, ArrayView3};

use crate::types::{CellDetection, CfarWindow, DetectedObject};

/// Output of [`finalize`].
#[derive(Clone, Debug, Default)]
pub struct Finalized {
    pub objects: Vec<DetectedObject>,
    /// Candidates dropped by the power floor.
    pub power_rejected: usize,
}

/// Range indices averaged for the noise estimate of an object at range
/// bin `range`.
///
/// Near either end of the axis the missing side is replaced by a second
/// copy of the available one, so the set always holds `2 * cell_num`
/// indices inside `[0, n_range)`.  Requires `n_range > 2 * gaptot`.
pub fn reference_cells(range: usize, n_range: usize, window: &CfarWindow) -> Vec<usize> {
    let gaptot = window.gaptot();
    let gap = window.gap_num;

    if range <= gaptot {
        let far = range + gap + 1..range + gaptot + 1;
        far.clone().chain(far).collect()
    } else if range + gaptot >= n_range {
        let near = range - gaptot..range - gap;
        near.clone().chain(near).collect()
    } else {
        (range - gaptot..range - gap)
            .chain(range + gap + 1..range + gaptot + 1)
            .collect()
    }
}

/// Smallest per-antenna power at one cell.
fn min_channel_power(power: &ArrayView3<'_, f32>, range: usize, doppler: usize) -> f32 {
    power
        .slice(s![range, doppler, ..])
        .fold(f32::INFINITY, |acc, &p| acc.min(p))
}

/// Apply the power floor to each candidate and attach its per-antenna
/// noise vector.
///
/// `power` is the `(range, doppler, antenna)` power cube and `window` the
/// range-axis window.  Candidate order is preserved.
pub fn finalize(
    power: ArrayView3<'_, f32>,
    candidates: &[CellDetection],
    window: &CfarWindow,
    power_thre: f32,
) -> Finalized {
    let (n_range, _, n_antenna) = power.dim();
    let mut out = Finalized::default();

    for cand in candidates {
        let (r, d) = (cand.range_index, cand.doppler_index);

        let floor = min_channel_power(&power, r, d);
        if floor < power_thre {
            debug!(
                "Dropping ({}, {}): weakest channel {:.3} below power floor {:.3}",
                r, d, floor, power_thre
            );
            out.power_rejected += 1;
            continue;
        }

        let cells = reference_cells(r, n_range, window);
        let mut noise = vec![0.0f32; n_antenna];
        for &c in &cells {
            for (acc, &p) in noise.iter_mut().zip(power.slice(s![c, d, ..]).iter()) {
                *acc += p;
            }
        }
        let count = cells.len() as f32;
        noise.iter_mut().for_each(|v| *v /= count);

        out.objects.push(DetectedObject {
            range_index: r,
            doppler_index: d,
            noise,
            snr: cand.snr,
        });
    }

    out
}
