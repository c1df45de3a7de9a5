//! Common types shared across the CFAR detection pipeline.
//!
//! These structures carry the detector configuration (the `detectObj`
//! block of a radar parameter file), the per-cell records produced by the
//! one-dimensional CASO scans, and the finalised objects handed to the
//! downstream angle and velocity estimators.

use std::fmt;

#[cfg(feature = "python")]
use pyo3::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Axis
// ---------------------------------------------------------------------------

/// The two axes of the range-Doppler map a CFAR window can slide along.
///
/// Window parameters are stored as 2-element arrays indexed by
/// [`Axis::index`], matching the `[range, doppler]` layout of the radar
/// configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Range,
    Doppler,
}

impl Axis {
    /// Position of this axis in the `[range, doppler]` parameter arrays.
    pub fn index(self) -> usize {
        match self {
            Axis::Range => 0,
            Axis::Doppler => 1,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Range => f.write_str("range"),
            Axis::Doppler => f.write_str("doppler"),
        }
    }
}

// ---------------------------------------------------------------------------
// CfarWindow
// ---------------------------------------------------------------------------

/// Sliding-window geometry and threshold scale for one axis.
///
/// Around the cell under test sit `gap_num` guard cells on each side,
/// and beyond them `cell_num` reference cells on each side:
///
/// ```text
///  [ ref a ][ guard ] CUT [ guard ][ ref b ]
///  cell_num  gap_num       gap_num  cell_num
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CfarWindow {
    /// Reference cells on each side of the guard band.
    pub cell_num: usize,
    /// Guard cells on each side of the cell under test.
    pub gap_num: usize,
    /// Threshold scale applied to the smallest-of noise estimate.
    pub k0: f32,
}

impl CfarWindow {
    /// Distance from the cell under test to the outer edge of a reference
    /// window.
    pub fn gaptot(&self) -> usize {
        self.cell_num + self.gap_num
    }
}

// ---------------------------------------------------------------------------
// DetectParams
// ---------------------------------------------------------------------------

/// Configuration of the CFAR detector.
///
/// Field names serialise to the camelCase keys used by the radar
/// configuration files (`refWinSize`, `guardWinSize`, `K0`, ...), so a
/// `detectObj` section can be deserialised directly.  Per-axis fields are
/// `[range, doppler]` pairs.
#[cfg_attr(feature = "python", pyclass(get_all, set_all))]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectParams {
    /// Reference half-window length `cellNum` per axis.
    pub ref_win_size: [usize; 2],

    /// Guard half-window length `gapNum` per axis.
    pub guard_win_size: [usize; 2],

    /// Threshold scale per axis.  A cell is a detection when its power
    /// exceeds `K0` times the smallest-of reference average.
    #[serde(rename = "K0")]
    pub k0: [f32; 2],

    /// Require the cell under test to also be the maximum of its whole
    /// window (both reference windows plus the guard band).
    #[serde(default, deserialize_with = "flag_from_int")]
    pub max_enable: bool,

    /// Cells skipped at the start of each scanned axis.
    #[serde(default)]
    pub discard_cell_left: usize,

    /// Cells skipped at the end of each scanned axis.
    #[serde(default)]
    pub discard_cell_right: usize,

    /// Minimum per-channel power a detection must reach on every antenna.
    #[serde(default)]
    pub power_thre: f32,

    /// Number of virtual antenna channels (`num_rx * num_tx`).
    pub num_antenna: usize,

    /// Detection algorithm selector.  Only `1` (CASO) is implemented.
    #[serde(default = "default_detect_method")]
    pub detect_method: u32,

    /// Number of rayon worker threads for the scans.  0 uses the global
    /// pool.
    #[serde(default)]
    pub n_workers: usize,
}

fn default_detect_method() -> u32 {
    1
}

/// Accept `maxEnable` both as a YAML boolean and as the `0`/`1` integer
/// written by MATLAB-derived configuration files.
fn flag_from_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            ref_win_size: [8, 4],
            guard_win_size: [4, 0],
            k0: [5.0, 3.0],
            max_enable: false,
            discard_cell_left: 0,
            discard_cell_right: 0,
            power_thre: 0.0,
            num_antenna: 12,
            detect_method: 1,
            n_workers: 0,
        }
    }
}

impl DetectParams {
    /// Window geometry for one axis.
    pub fn window(&self, axis: Axis) -> CfarWindow {
        let i = axis.index();
        CfarWindow {
            cell_num: self.ref_win_size[i],
            gap_num: self.guard_win_size[i],
            k0: self.k0[i],
        }
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl DetectParams {
    #[new]
    #[pyo3(signature = (
        ref_win_size=[8, 4],
        guard_win_size=[4, 0],
        k0=[5.0, 3.0],
        max_enable=false,
        discard_cell_left=0,
        discard_cell_right=0,
        power_thre=0.0,
        num_antenna=12,
        detect_method=1,
        n_workers=0
    ))]
    #[allow(clippy::too_many_arguments)]
    pub fn py_new(
        ref_win_size: [usize; 2],
        guard_win_size: [usize; 2],
        k0: [f32; 2],
        max_enable: bool,
        discard_cell_left: usize,
        discard_cell_right: usize,
        power_thre: f32,
        num_antenna: usize,
        detect_method: u32,
        n_workers: usize,
    ) -> Self {
        Self {
            ref_win_size,
            guard_win_size,
            k0,
            max_enable,
            discard_cell_left,
            discard_cell_right,
            power_thre,
            num_antenna,
            detect_method,
            n_workers,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "DetectParams(ref={:?}, guard={:?}, K0={:?}, max={}, discard=({}, {}), power_thre={}, antennas={})",
            self.ref_win_size,
            self.guard_win_size,
            self.k0,
            self.max_enable,
            self.discard_cell_left,
            self.discard_cell_right,
            self.power_thre,
            self.num_antenna,
        )
    }
}

// ---------------------------------------------------------------------------
// CellDetection
// ---------------------------------------------------------------------------

/// A threshold crossing produced by a one-dimensional CASO scan.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellDetection {
    pub range_index: usize,
    pub doppler_index: usize,

    /// Smallest-of reference average used as the threshold base.
    pub noise: f32,

    /// Cell power over `noise`.
    pub snr: f32,
}

// ---------------------------------------------------------------------------
// DetectedObject
// ---------------------------------------------------------------------------

/// A detection that survived both scans and the power floor.
#[cfg_attr(feature = "python", pyclass(get_all))]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Range bin of the object.
    pub range_index: usize,

    /// Doppler bin of the object.
    pub doppler_index: usize,

    /// Per-antenna noise power, averaged over the range reference cells at
    /// the object's Doppler bin.  Length equals the number of virtual
    /// antennas, in antenna-major order.
    pub noise: Vec<f32>,

    /// Signal-to-noise ratio reported by the Doppler scan.
    pub snr: f32,
}

#[cfg(feature = "python")]
#[pymethods]
impl DetectedObject {
    fn __repr__(&self) -> String {
        format!(
            "DetectedObject(range={}, doppler={}, snr={:.2}, antennas={})",
            self.range_index,
            self.doppler_index,
            self.snr,
            self.noise.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// DetectionResult
// ---------------------------------------------------------------------------

/// Aggregated output of one detector run.
#[cfg_attr(feature = "python", pyclass(get_all))]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Valid objects, in the order they were confirmed.
    pub objects: Vec<DetectedObject>,

    /// Threshold crossings from the range pass, over all Doppler columns.
    pub range_detections: usize,

    /// Distinct cells confirmed by the Doppler pass.
    pub candidates: usize,

    /// Candidates dropped because a channel fell below the power floor.
    pub power_rejected: usize,

    /// Wall-clock time of the run, in milliseconds.
    pub processing_time_ms: u64,
}

impl DetectionResult {
    /// Number of valid objects.
    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    /// Serialise the result to a pretty-printed JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl DetectionResult {
    #[getter(num_objects)]
    fn py_num_objects(&self) -> usize {
        self.num_objects()
    }

    #[pyo3(name = "to_json")]
    fn py_to_json(&self) -> PyResult<String> {
        self.to_json()
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))
    }

    fn __repr__(&self) -> String {
        format!(
            "DetectionResult(objects={}, range_hits={}, candidates={}, power_rejected={}, time={}ms)",
            self.objects.len(),
            self.range_detections,
            self.candidates,
            self.power_rejected,
            self.processing_time_ms,
        )
    }
}
