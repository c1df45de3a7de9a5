//! One-dimensional CASO (cell-averaging, smallest-of) scan.
//!
//! # Background
//!
//! A CFAR detector compares each cell with a threshold that scales with
//! the locally estimated noise, so the false-alarm rate stays constant
//! while the clutter level changes across the map.  The estimate comes
//! from two reference windows, one on each side of the cell under test
//! (CUT), separated from it by guard cells that keep target energy out of
//! the estimate.
//!
//! The *smallest-of* rule takes the lower of the two window averages.
//! When a second strong target or a clutter edge sits in one window, that
//! side's average is inflated; using the other side keeps the threshold
//! low enough that the weaker neighbour is not masked.
//!
//! # Edge handling
//!
//! The scan region is padded with `gaptot` of its own samples on each side
//! so that every cell has full reference windows.  The range and Doppler
//! passes wrap differently (see [`Padding`]) and the difference changes
//! which values fill the edge windows, so the two conventions are kept
//! distinct.

use crate::types::CfarWindow;

/// How the scan region is extended by `gaptot` samples on each side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Padding {
    /// `head ++ region ++ tail`: the region's first samples are repeated in
    /// front and its last samples behind.  Used along range.
    HeadFirst,
    /// `tail ++ region ++ head`: a circular wrap.  Used along Doppler.
    TailFirst,
}

/// A threshold crossing inside a scan region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellHit {
    /// Position relative to the start of the scan region.
    pub index: usize,
    /// Smallest-of reference average.
    pub noise: f32,
    /// Cell value over `noise`.
    pub snr: f32,
}

/// Extend `region` by `gaptot` of its own samples on both sides.
///
/// `gaptot` must not exceed `region.len()`.
pub fn pad(region: &[f32], gaptot: usize, padding: Padding) -> Vec<f32> {
    debug_assert!(gaptot <= region.len());

    let head = &region[..gaptot];
    let tail = &region[region.len() - gaptot..];
    let (front, back) = match padding {
        Padding::HeadFirst => (head, tail),
        Padding::TailFirst => (tail, head),
    };

    let mut padded = Vec::with_capacity(region.len() + 2 * gaptot);
    padded.extend_from_slice(front);
    padded.extend_from_slice(region);
    padded.extend_from_slice(back);
    padded
}

fn mean(cells: &[f32]) -> f32 {
    cells.iter().sum::<f32>() / cells.len() as f32
}

/// Smaller of the two window averages, NaN if either is NaN.
fn smallest_of(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else {
        a.min(b)
    }
}

/// Run the CASO test on every cell of `region`.
///
/// A cell is reported when its value exceeds `k0` times the smaller of the
/// two reference averages.  With `max_enable`, it must additionally be the
/// maximum of its whole window, both reference windows and the guard band
/// included, which keeps only the peak of an extended return.
///
/// The caller guarantees `window.cell_num > 0` and
/// `window.gaptot() <= region.len()`.
pub fn scan(region: &[f32], window: &CfarWindow, max_enable: bool, padding: Padding) -> Vec<CellHit> {
    let gaptot = window.gaptot();
    let padded = pad(region, gaptot, padding);

    (0..region.len())
        .filter_map(|j| {
            // In padded coordinates the CUT sits at j + gaptot.
            let lead = &padded[j..j + window.cell_num];
            let lag = &padded[j + gaptot + window.gap_num + 1..j + 2 * gaptot + 1];
            let noise = smallest_of(mean(lead), mean(lag));
            let cut = padded[j + gaptot];

            // Written as negated passes so a NaN anywhere never detects.
            if !(cut > window.k0 * noise) {
                return None;
            }
            if max_enable && !padded[j..=j + 2 * gaptot].iter().all(|&v| cut >= v) {
                return None;
            }

            Some(CellHit {
                index: j,
                noise,
                snr: cut / noise,
            })
        })
        .collect()
}
