//! # radarcfar-core
//!
//! Two-stage CFAR-CASO target detection for FMCW radar range-Doppler
//! cubes, with optional Python bindings via [PyO3](https://pyo3.rs).
//!
//! ## Overview
//!
//! | Module        | Purpose                                                     |
//! |---------------|-------------------------------------------------------------|
//! | [`detector`]  | The detector pipeline: range pass, Doppler pass, finalising |
//! | [`caso`]      | One-dimensional smallest-of CFAR scan                       |
//! | [`combine`]   | Non-coherent combining of the virtual antenna array         |
//! | [`noise`]     | Per-antenna noise estimation and power-floor filtering      |
//! | [`config`]    | Loading detector parameters from YAML radar configuration   |
//! | [`types`]     | Shared data structures (parameters, detections, results)    |
//!
//! ## Rust usage
//!
//! ```no_run
//! use ndarray::Array4;
//! use num_complex::Complex32;
//! use radarcfar_core::{CasoDetector, DetectParams};
//!
//! let params = DetectParams::from_yaml_file("radar_config.yaml")?;
//! let cube = Array4::<Complex32>::zeros((256, 128, 4, 3));
//!
//! let result = CasoDetector::new(params).run(cube.view())?;
//! for obj in &result.objects {
//!     println!("range {} doppler {} snr {:.1}", obj.range_index, obj.doppler_index, obj.snr);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Python usage
//!
//! Built with the `python` feature, the library exposes a module called
//! `radarcfar_core`:
//!
//! ```python
//! import radarcfar_core
//!
//! params = radarcfar_core.DetectParams(k0=[5.0, 3.0], num_antenna=12)
//! detector = radarcfar_core.CasoDetector(params)
//! result = detector.run_complex(cube.real.ravel(), cube.imag.ravel(), *cube.shape)
//!
//! for obj in result.objects:
//!     print(obj)
//! ```

pub mod caso;
pub mod combine;
pub mod config;
pub mod detector;
pub mod noise;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use config::ConfigError;
pub use detector::{CasoDetector, DetectError, DetectMethod};
pub use types::{Axis, CellDetection, DetectParams, DetectedObject, DetectionResult};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// The top-level Python module exposed by this crate.
///
/// Registered classes:
/// - `CasoDetector`: the CFAR-CASO detector
/// - `DetectParams`: detector configuration
/// - `DetectedObject`: a single valid object
/// - `DetectionResult`: aggregated detector output
#[cfg(feature = "python")]
#[pymodule]
fn radarcfar_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<CasoDetector>()?;
    m.add_class::<DetectParams>()?;
    m.add_class::<DetectedObject>()?;
    m.add_class::<DetectionResult>()?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add("__doc__", "CFAR-CASO detection on range-Doppler radar cubes.")?;

    Ok(())
}
