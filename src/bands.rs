//! Rescaling of the model's native 95% confidence interval to an arbitrary
//! secondary level.
//!
//! The half-width of a Gaussian interval is proportional to the standard
//! normal quantile of its level, so the secondary band is the native
//! half-width scaled by the ratio of the two quantiles and re-centered on
//! the point forecast.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::model::Band;

/// Confidence level of the interval the model library hands back.
pub const NATIVE_LEVEL: f64 = 0.95;

/// Standard-normal quantile for a two-sided interval at `level`.
/// Caller guarantees `level` is strictly inside (0, 1).
pub fn normal_quantile(level: f64) -> f64 {
    // The unit normal always constructs.
    let standard = Normal::new(0.0, 1.0).unwrap();
    standard.inverse_cdf((1.0 + level) / 2.0)
}

/// Derive a band at `level` from the native 95% bounds, centered on `point`.
pub fn rescale(point: f64, native: Band, level: f64) -> Band {
    let half = (native.high - native.low) / 2.0;
    let ratio = normal_quantile(level) / normal_quantile(NATIVE_LEVEL);
    let adjusted = half * ratio;
    Band {
        low: point - adjusted,
        high: point + adjusted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn quantile_matches_known_values() {
        assert!((normal_quantile(0.95) - 1.959_963_985).abs() < 1e-6);
        assert!((normal_quantile(0.80) - 1.281_551_566).abs() < 1e-6);
    }

    #[test]
    fn band_is_centered_on_point() {
        let band = rescale(100.0, Band { low: 90.0, high: 110.0 }, 0.80);
        assert!(((band.low + band.high) / 2.0 - 100.0).abs() < EPS);
    }

    #[test]
    fn lower_level_gives_narrower_band() {
        let native = Band { low: 90.0, high: 110.0 };
        let alt = rescale(100.0, native, 0.80);
        assert!(alt.high - alt.low < native.high - native.low);
        assert!(alt.low > native.low && alt.high < native.high);
    }

    #[test]
    fn rescaling_to_native_level_is_identity_for_centered_input() {
        let native = Band { low: 85.0, high: 115.0 };
        let same = rescale(100.0, native, NATIVE_LEVEL);
        assert!((same.low - native.low).abs() < EPS);
        assert!((same.high - native.high).abs() < EPS);
    }

    #[test]
    fn off_center_native_band_is_recentered() {
        // A skewed native interval still yields a band centered on the point.
        let band = rescale(100.0, Band { low: 95.0, high: 115.0 }, 0.90);
        assert!(((band.low + band.high) / 2.0 - 100.0).abs() < EPS);
    }
}
