//! Non-coherent antenna combining.
//!
//! The FFT stage hands over a complex cube indexed
//! `(range, doppler, rx, tx)`.  The detector works on the virtual array,
//! so the two antenna axes are flattened into one with the receive index
//! varying fastest: virtual antenna `a = rx + num_rx * tx`.  The noise
//! vectors reported for each object follow the same ordering, and the
//! angle estimators downstream rely on it.

use ndarray::{Array2, Array3, ArrayView3, ArrayView4, Axis};
use num_complex::Complex32;

/// Offset added to every cell of the integrated map.  Keeps reference
/// averages strictly positive so the smallest-of threshold never
/// degenerates to zero.
pub const INTEGRATION_FLOOR: f32 = 1.0;

/// Flatten `(range, doppler, rx, tx)` into `(range, doppler, rx * tx)`,
/// receive index fastest.
pub fn combine_antennas(cube: ArrayView4<'_, Complex32>) -> Array3<Complex32> {
    let (n_range, n_doppler, n_rx, n_tx) = cube.dim();
    Array3::from_shape_fn((n_range, n_doppler, n_rx * n_tx), |(r, d, a)| {
        cube[[r, d, a % n_rx, a / n_rx]]
    })
}

/// Squared magnitude of every sample.
pub fn power_cube(cube: ArrayView3<'_, Complex32>) -> Array3<f32> {
    cube.mapv(|x| x.norm_sqr())
}

/// Sum power over the antenna axis and add [`INTEGRATION_FLOOR`].
pub fn integrate(power: ArrayView3<'_, f32>) -> Array2<f32> {
    power
        .sum_axis(Axis(2))
        .mapv_into(|v| v + INTEGRATION_FLOOR)
}
