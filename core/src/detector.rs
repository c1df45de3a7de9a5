//! Two-stage CFAR-CASO detector, the heart of the detection pipeline.
//!
//! # Algorithm overview
//!
//! 1. **Non-coherent combining**: flatten the `(rx, tx)` antenna axes and
//!    sum squared magnitudes over antennas into an integrated
//!    range-Doppler map (plus a floor of 1.0, see
//!    [`crate::combine::INTEGRATION_FLOOR`]).
//! 2. **Range pass**: run a CASO scan down every Doppler column.  The
//!    columns are independent and scanned in parallel with **rayon**.
//! 3. **Doppler pass**: only range bins with at least one range hit are
//!    revisited.  Each such row is scanned along Doppler, and a crossing
//!    is kept only if the range pass flagged the same cell.  Confirmed
//!    cells are merged into a duplicate-free list.
//! 4. **Finalisation**: drop cells whose weakest antenna falls below
//!    `powerThre` and estimate per-antenna noise for the rest
//!    ([`crate::noise`]).
//!
//! The detector holds no state between runs; [`CasoDetector::run`] is a
//! pure function of the cube and the parameters.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Instant;

use log::{debug, info};
use ndarray::{s, ArrayView2, ArrayView3, ArrayView4};
use num_complex::Complex32;
#[cfg(feature = "python")]
use pyo3::prelude::*;
use rayon::prelude::*;

use crate::caso::{self, Padding};
use crate::combine::{combine_antennas, integrate, power_cube};
use crate::noise;
use crate::types::{Axis, CellDetection, DetectParams, DetectionResult};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during a detector run.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("unknown detect method {0} (only 1 = CFAR-CASO is supported)")]
    UnsupportedMethod(u32),

    #[error("input cube has zero-length axis (shape: {0}×{1}×{2})")]
    EmptyCube(usize, usize, usize),

    #[error("cube has {actual} antenna channels but numAntenna is {expected}")]
    AntennaMismatch { expected: usize, actual: usize },

    #[error("{0} reference window is empty (refWinSize must be at least 1)")]
    EmptyReferenceWindow(Axis),

    #[error("{axis} threshold scale K0 must be positive and finite, got {k0}")]
    InvalidScale { axis: Axis, k0: f32 },

    #[error("{axis} window spans {gaptot} cells but only {available} remain after discarding edge cells")]
    WindowTooLarge {
        axis: Axis,
        gaptot: usize,
        available: usize,
    },

    #[error("range axis of {n_range} bins cannot hold noise reference windows of {gaptot} cells on one side")]
    RangeTooShort { n_range: usize, gaptot: usize },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

// ---------------------------------------------------------------------------
// DetectMethod
// ---------------------------------------------------------------------------

/// Detection algorithm selected by `detectMethod`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectMethod {
    /// Cell-averaging smallest-of, `detectMethod == 1`.
    Caso,
}

impl TryFrom<u32> for DetectMethod {
    type Error = DetectError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(DetectMethod::Caso),
            other => Err(DetectError::UnsupportedMethod(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// CasoDetector
// ---------------------------------------------------------------------------

/// The CFAR-CASO detector.
///
/// Construct with a [`DetectParams`] and call [`CasoDetector::run`] on a
/// complex `(range, doppler, rx, tx)` cube, or [`CasoDetector::run_power`]
/// on a cube that is already combined and squared.
#[cfg_attr(feature = "python", pyclass)]
#[derive(Clone, Debug)]
pub struct CasoDetector {
    params: DetectParams,
}

impl CasoDetector {
    pub fn new(params: DetectParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectParams {
        &self.params
    }

    /// Run the detector on the complex FFT output.
    ///
    /// # Arguments
    /// * `cube`: complex samples with shape `(range, doppler, rx, tx)`.
    pub fn run(&self, cube: ArrayView4<'_, Complex32>) -> Result<DetectionResult, DetectError> {
        let start = Instant::now();
        DetectMethod::try_from(self.params.detect_method)?;

        let power = power_cube(combine_antennas(cube).view());
        self.detect(power.view(), start)
    }

    /// Run the detector on a `(range, doppler, antenna)` power cube.
    pub fn run_power(&self, power: ArrayView3<'_, f32>) -> Result<DetectionResult, DetectError> {
        self.detect(power, Instant::now())
    }

    /// Shared body of [`run`](Self::run) and [`run_power`](Self::run_power);
    /// `start` marks when the caller received its input.
    fn detect(
        &self,
        power: ArrayView3<'_, f32>,
        start: Instant,
    ) -> Result<DetectionResult, DetectError> {
        match DetectMethod::try_from(self.params.detect_method)? {
            DetectMethod::Caso => {}
        }

        let (n_range, n_doppler, n_antenna) = power.dim();
        if n_range == 0 || n_doppler == 0 || n_antenna == 0 {
            return Err(DetectError::EmptyCube(n_range, n_doppler, n_antenna));
        }
        if n_antenna != self.params.num_antenna {
            return Err(DetectError::AntennaMismatch {
                expected: self.params.num_antenna,
                actual: n_antenna,
            });
        }
        self.validate_windows(n_range, n_doppler)?;

        info!(
            "Starting CFAR-CASO: {}×{}×{} cube, K0={:?}, ref={:?}, guard={:?}, max={}",
            n_range,
            n_doppler,
            n_antenna,
            self.params.k0,
            self.params.ref_win_size,
            self.params.guard_win_size,
            self.params.max_enable,
        );

        // ------------------------------------------------------------------
        // Step 1: Non-coherent integration
        // ------------------------------------------------------------------
        let map = integrate(power);

        // ------------------------------------------------------------------
        // Steps 2 & 3: Range pass, then candidate-restricted Doppler pass
        // ------------------------------------------------------------------
        let params = &self.params;
        let (range_hits, candidates) = self.with_pool(|| {
            let range_hits = range_scan(map.view(), params);
            let candidates = doppler_scan(map.view(), &range_hits, params);
            (range_hits, candidates)
        })?;
        info!(
            "Range pass: {} crossings; Doppler pass: {} confirmed cells",
            range_hits.len(),
            candidates.len(),
        );

        // ------------------------------------------------------------------
        // Step 4: Power floor and per-antenna noise
        // ------------------------------------------------------------------
        let done = noise::finalize(
            power,
            &candidates,
            &self.params.window(Axis::Range),
            self.params.power_thre,
        );

        let elapsed = start.elapsed().as_millis() as u64;
        info!(
            "Detection complete in {} ms: {} objects ({} below power floor)",
            elapsed,
            done.objects.len(),
            done.power_rejected,
        );

        Ok(DetectionResult {
            objects: done.objects,
            range_detections: range_hits.len(),
            candidates: candidates.len(),
            power_rejected: done.power_rejected,
            processing_time_ms: elapsed,
        })
    }

    // ======================================================================
    // Internal helpers
    // ======================================================================

    /// Check every window against the axis it slides along, so no scan can
    /// index outside the map.
    ///
    /// The range axis is held to `n_range > 2 * gaptot`, stricter than
    /// `gaptot < n_range - discard`: every range bin, wherever it sits, must
    /// have a full noise window on at least one side.
    fn validate_windows(&self, n_range: usize, n_doppler: usize) -> Result<(), DetectError> {
        let discard = self.params.discard_cell_left + self.params.discard_cell_right;

        for (axis, len) in [(Axis::Range, n_range), (Axis::Doppler, n_doppler)] {
            let window = self.params.window(axis);
            if window.cell_num == 0 {
                return Err(DetectError::EmptyReferenceWindow(axis));
            }
            if !(window.k0.is_finite() && window.k0 > 0.0) {
                return Err(DetectError::InvalidScale { axis, k0: window.k0 });
            }
            let available = len.saturating_sub(discard);
            if window.gaptot() >= available {
                return Err(DetectError::WindowTooLarge {
                    axis,
                    gaptot: window.gaptot(),
                    available,
                });
            }
        }

        // The noise pass reads a full window on one side of every range bin.
        let gaptot = self.params.window(Axis::Range).gaptot();
        if n_range <= 2 * gaptot {
            return Err(DetectError::RangeTooShort { n_range, gaptot });
        }
        Ok(())
    }

    /// Run `f` on a dedicated pool when `n_workers` is set, otherwise on
    /// the global rayon pool.
    fn with_pool<T, F>(&self, f: F) -> Result<T, DetectError>
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        if self.params.n_workers == 0 {
            return Ok(f());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.params.n_workers)
            .build()?;
        Ok(pool.install(f))
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl CasoDetector {
    #[new]
    #[pyo3(signature = (params=None))]
    pub fn py_new(params: Option<DetectParams>) -> Self {
        Self::new(params.unwrap_or_default())
    }

    /// Run on a flattened (row-major) power cube of shape
    /// `(n_range, n_doppler, n_antenna)`.
    #[pyo3(name = "run")]
    pub fn py_run(
        &self,
        power: Vec<f32>,
        n_range: usize,
        n_doppler: usize,
        n_antenna: usize,
    ) -> PyResult<DetectionResult> {
        let array = ndarray::Array3::from_shape_vec((n_range, n_doppler, n_antenna), power)
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;
        self.run_power(array.view())
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))
    }

    /// Run on the complex FFT output given as separate flattened
    /// (row-major) real and imaginary parts of shape
    /// `(n_range, n_doppler, n_rx, n_tx)`.
    #[pyo3(name = "run_complex")]
    pub fn py_run_complex(
        &self,
        re: Vec<f32>,
        im: Vec<f32>,
        n_range: usize,
        n_doppler: usize,
        n_rx: usize,
        n_tx: usize,
    ) -> PyResult<DetectionResult> {
        if re.len() != im.len() {
            return Err(pyo3::exceptions::PyValueError::new_err(format!(
                "real and imaginary parts differ in length ({} vs {})",
                re.len(),
                im.len()
            )));
        }
        let samples: Vec<Complex32> = re
            .into_iter()
            .zip(im)
            .map(|(re, im)| Complex32::new(re, im))
            .collect();
        let array = ndarray::Array4::from_shape_vec((n_range, n_doppler, n_rx, n_tx), samples)
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;
        self.run(array.view())
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))
    }

    fn __repr__(&self) -> String {
        format!("CasoDetector({:?})", self.params)
    }
}

// ---------------------------------------------------------------------------
// Scan stages
// ---------------------------------------------------------------------------

/// CASO scan down every Doppler column of the integrated map.
///
/// Windows are assumed validated against the map shape.  Hits are ordered
/// by Doppler column, then range.
pub fn range_scan(map: ArrayView2<'_, f32>, params: &DetectParams) -> Vec<CellDetection> {
    let (n_range, n_doppler) = map.dim();
    let window = params.window(Axis::Range);
    let (left, right) = (params.discard_cell_left, params.discard_cell_right);

    (0..n_doppler)
        .into_par_iter()
        .flat_map_iter(|k| {
            let region = map.slice(s![left..n_range - right, k]).to_vec();
            caso::scan(&region, &window, params.max_enable, Padding::HeadFirst)
                .into_iter()
                .map(move |hit| CellDetection {
                    range_index: hit.index + left,
                    doppler_index: k,
                    noise: hit.noise,
                    snr: hit.snr,
                })
        })
        .collect()
}

/// Doppler bins flagged by the range pass, grouped by range bin.
///
/// Keys are the distinct range bins in ascending order; they select the
/// rows the Doppler pass revisits.
pub fn group_by_range(range_hits: &[CellDetection]) -> BTreeMap<usize, BTreeSet<usize>> {
    let mut groups: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for hit in range_hits {
        groups
            .entry(hit.range_index)
            .or_default()
            .insert(hit.doppler_index);
    }
    groups
}

/// Append the detections in `row` whose `(range, doppler)` cell has not
/// been seen yet.
pub fn merge_unique(
    merged: &mut Vec<CellDetection>,
    seen: &mut HashSet<(usize, usize)>,
    row: impl IntoIterator<Item = CellDetection>,
) {
    for det in row {
        if seen.insert((det.range_index, det.doppler_index)) {
            merged.push(det);
        }
    }
}

/// CASO scan along Doppler, restricted to range bins with range hits and
/// confirmed against them.
///
/// Rows are scanned in parallel and merged in ascending range order.
pub fn doppler_scan(
    map: ArrayView2<'_, f32>,
    range_hits: &[CellDetection],
    params: &DetectParams,
) -> Vec<CellDetection> {
    let n_doppler = map.ncols();
    let window = params.window(Axis::Doppler);
    let (left, right) = (params.discard_cell_left, params.discard_cell_right);

    let groups = group_by_range(range_hits);
    let rows: Vec<(usize, &BTreeSet<usize>)> = groups.iter().map(|(&r, d)| (r, d)).collect();
    debug!("Doppler pass over {} candidate range bins", rows.len());

    let per_row: Vec<Vec<CellDetection>> = rows
        .par_iter()
        .map(|&(range, confirmed)| {
            let region = map.slice(s![range, left..n_doppler - right]).to_vec();
            caso::scan(&region, &window, params.max_enable, Padding::TailFirst)
                .into_iter()
                .map(|hit| CellDetection {
                    range_index: range,
                    doppler_index: hit.index + left,
                    noise: hit.noise,
                    snr: hit.snr,
                })
                .filter(|det| confirmed.contains(&det.doppler_index))
                .collect()
        })
        .collect();

    let mut merged = Vec::new();
    let mut seen = HashSet::new();
    for row in per_row {
        merge_unique(&mut merged, &mut seen, row);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn params() -> DetectParams {
        DetectParams {
            ref_win_size: [4, 3],
            guard_win_size: [2, 1],
            k0: [5.0, 4.0],
            num_antenna: 1,
            ..DetectParams::default()
        }
    }

    fn det(range_index: usize, doppler_index: usize) -> CellDetection {
        CellDetection {
            range_index,
            doppler_index,
            noise: 1.0,
            snr: 1.0,
        }
    }

    fn cells(dets: &[CellDetection]) -> Vec<(usize, usize)> {
        dets.iter()
            .map(|d| (d.range_index, d.doppler_index))
            .collect()
    }

    #[test]
    fn unknown_method_is_rejected_before_scanning() {
        let detector = CasoDetector::new(DetectParams {
            detect_method: 2,
            ..params()
        });
        // A cube that would also fail window validation: the method check
        // must come first.
        let power = ndarray::Array3::<f32>::zeros((2, 2, 1));
        let err = detector.run_power(power.view()).unwrap_err();
        assert!(matches!(err, DetectError::UnsupportedMethod(2)));
    }

    #[test]
    fn oversized_window_fails_fast() {
        let detector = CasoDetector::new(DetectParams {
            discard_cell_left: 4,
            discard_cell_right: 4,
            ..params()
        });
        // Doppler axis: 16 - 8 = 8 cells left for a window of 4, fine.
        // Range axis: 20 - 8 = 12 cells left for a window of 6, fine.
        let ok = ndarray::Array3::<f32>::zeros((20, 16, 1));
        assert!(detector.run_power(ok.view()).is_ok());

        // Range axis: 14 - 8 = 6 cells left for a window of 6.
        let short = ndarray::Array3::<f32>::zeros((14, 16, 1));
        match detector.run_power(short.view()).unwrap_err() {
            DetectError::WindowTooLarge {
                axis,
                gaptot,
                available,
            } => {
                assert_eq!(axis, Axis::Range);
                assert_eq!((gaptot, available), (6, 6));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn range_axis_must_hold_noise_windows() {
        let detector = CasoDetector::new(params());
        // 12 cells: scan window of 6 fits, but 12 <= 2 * 6.
        let power = ndarray::Array3::<f32>::zeros((12, 16, 1));
        assert!(matches!(
            detector.run_power(power.view()).unwrap_err(),
            DetectError::RangeTooShort {
                n_range: 12,
                gaptot: 6
            }
        ));

        // One more bin leaves a full window beside every range bin.
        let enough = ndarray::Array3::<f32>::zeros((13, 16, 1));
        assert!(detector.run_power(enough.view()).is_ok());
    }

    #[test]
    fn complex_and_power_entry_points_agree() {
        let detector = CasoDetector::new(DetectParams {
            num_antenna: 6,
            ..params()
        });
        assert_eq!(detector.params().num_antenna, 6);

        let mut cube = ndarray::Array4::from_elem((32, 16, 3, 2), Complex32::new(1.0, 0.0));
        for rx in 0..3 {
            for tx in 0..2 {
                cube[[14, 9, rx, tx]] = Complex32::new(8.0, 0.0);
            }
        }
        let power = power_cube(combine_antennas(cube.view()).view());

        let from_cube = detector.run(cube.view()).unwrap();
        let from_power = detector.run_power(power.view()).unwrap();
        assert_eq!(from_cube.objects, from_power.objects);
        let found: Vec<(usize, usize)> = from_cube
            .objects
            .iter()
            .map(|o| (o.range_index, o.doppler_index))
            .collect();
        assert_eq!(found, vec![(14, 9)]);
    }

    #[test]
    fn invalid_window_parameters_are_rejected() {
        let empty = CasoDetector::new(DetectParams {
            ref_win_size: [4, 0],
            ..params()
        });
        let power = ndarray::Array3::<f32>::zeros((32, 16, 1));
        assert!(matches!(
            empty.run_power(power.view()).unwrap_err(),
            DetectError::EmptyReferenceWindow(Axis::Doppler)
        ));

        let negative = CasoDetector::new(DetectParams {
            k0: [-1.0, 4.0],
            ..params()
        });
        assert!(matches!(
            negative.run_power(power.view()).unwrap_err(),
            DetectError::InvalidScale {
                axis: Axis::Range,
                ..
            }
        ));
    }

    #[test]
    fn antenna_count_must_match() {
        let detector = CasoDetector::new(params());
        let power = ndarray::Array3::<f32>::zeros((32, 16, 4));
        assert!(matches!(
            detector.run_power(power.view()).unwrap_err(),
            DetectError::AntennaMismatch {
                expected: 1,
                actual: 4
            }
        ));
    }

    #[test]
    fn range_scan_reports_absolute_indices() {
        let mut map = Array2::from_elem((32, 8), 2.0f32);
        map[[10, 5]] = 80.0;
        let p = DetectParams {
            discard_cell_left: 3,
            discard_cell_right: 2,
            ..params()
        };

        let hits = range_scan(map.view(), &p);
        assert_eq!(cells(&hits), vec![(10, 5)]);
        assert_eq!(hits[0].noise, 2.0);
        assert_eq!(hits[0].snr, 40.0);
    }

    #[test]
    fn groups_collect_distinct_range_bins() {
        let hits = [det(7, 1), det(3, 4), det(7, 9), det(7, 1)];
        let groups = group_by_range(&hits);

        assert_eq!(groups.keys().copied().collect::<Vec<_>>(), vec![3, 7]);
        assert_eq!(groups[&7].iter().copied().collect::<Vec<_>>(), vec![1, 9]);
    }

    #[test]
    fn merge_keeps_first_occurrence_of_each_cell() {
        let mut merged = Vec::new();
        let mut seen = HashSet::new();

        merge_unique(&mut merged, &mut seen, vec![det(5, 2), det(5, 3)]);
        merge_unique(&mut merged, &mut seen, vec![det(5, 3), det(6, 2), det(5, 2)]);

        assert_eq!(cells(&merged), vec![(5, 2), (5, 3), (6, 2)]);
    }

    #[test]
    fn doppler_scan_requires_range_confirmation() {
        // Two peaks on row 12; only the one at Doppler 4 was a range hit.
        let mut map = Array2::from_elem((32, 24), 1.0f32);
        map[[12, 4]] = 60.0;
        map[[12, 15]] = 60.0;

        let confirmed = doppler_scan(map.view(), &[det(12, 4)], &params());
        assert_eq!(cells(&confirmed), vec![(12, 4)]);
        assert_eq!(confirmed[0].snr, 60.0);
    }

    #[test]
    fn doppler_scan_matches_on_absolute_doppler_index() {
        let mut map = Array2::from_elem((32, 24), 1.0f32);
        map[[12, 9]] = 60.0;
        let p = DetectParams {
            discard_cell_left: 2,
            discard_cell_right: 1,
            ..params()
        };

        let confirmed = doppler_scan(map.view(), &[det(12, 9)], &p);
        assert_eq!(cells(&confirmed), vec![(12, 9)]);
    }

    #[test]
    fn doppler_scan_visits_each_range_bin_once() {
        // Range hits repeat the same cell; the row is scanned once and the
        // cell reported once.
        let mut map = Array2::from_elem((32, 24), 1.0f32);
        map[[20, 6]] = 60.0;

        let hits = [det(20, 6), det(20, 6), det(20, 11)];
        let confirmed = doppler_scan(map.view(), &hits, &params());
        assert_eq!(cells(&confirmed), vec![(20, 6)]);
    }
}
