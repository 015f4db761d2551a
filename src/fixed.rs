// fixed.rs — Fixed-point encoding for integer-only atomic accumulation.
//
// Neither the GPU nor `std::sync::atomic` offers a float atomic add, so the
// weighted coordinate sums are kept as scaled integers:
//
//   contribution = round(coord · w_q · PRECISION)          (u32 per pixel)
//   accum_x      = Σ contribution                          (64-bit sum)
//   centroid_x   = (accum_x / PRECISION) / (Σ w_code / 255)
//
// Weights are quantized to 8-bit codes first (`encode_weight`) and every
// consumer uses `w_q = code / 255`, so the numerator and the denominator of
// the centroid are built from the same numbers.
//
// CAPACITY
// ────────
// The contribution of one pixel must fit the u32 atomic operand, and the sum
// over a whole frame must fit 64 bits (the GPU carries into a second word).
// The weight accumulator stays a plain u32. `check_capacity` verifies all
// three bounds for a given frame size and precision.

use crate::error::ConfigError;

/// Largest encoded weight. A fully weighted pixel contributes this much.
pub const WEIGHT_SCALE: u32 = 255;

/// Quantize a weight in [0, 1] to its 8-bit code.
#[inline]
pub fn encode_weight(w: f32) -> u8 {
    (w.clamp(0.0, 1.0) * WEIGHT_SCALE as f32).round() as u8
}

/// Decode a (possibly summed) weight code back to weight units.
#[inline]
pub fn decode_weight(code_sum: u32) -> f32 {
    code_sum as f32 / WEIGHT_SCALE as f32
}

/// Scale factor between real-valued sums and their integer representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPoint {
    precision: u32,
}

impl FixedPoint {
    /// # Panics
    /// Panics if `precision == 0`. Configuration validation rejects that
    /// earlier with a proper error.
    pub fn new(precision: u32) -> Self {
        assert!(precision > 0, "fixed-point precision must be non-zero");
        FixedPoint { precision }
    }

    #[inline]
    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Encode a non-negative real value.
    #[inline]
    pub fn encode(&self, v: f32) -> u64 {
        (v.max(0.0) as f64 * self.precision as f64).round() as u64
    }

    /// Decode an accumulated integer sum.
    #[inline]
    pub fn decode(&self, e: u64) -> f64 {
        e as f64 / self.precision as f64
    }

    /// Per-pixel contribution of `coord` weighted by the quantized weight
    /// `code`. Evaluated in f32 in the same operation order as the assign
    /// kernel, rounding half up (`floor(v + 0.5)`) like the kernel does.
    #[inline]
    pub fn contribution(&self, coord: u32, code: u8) -> u32 {
        let wq = code as f32 / WEIGHT_SCALE as f32;
        (coord as f32 * wq * self.precision as f32 + 0.5).floor() as u32
    }
}

/// Verify that a `width × height` frame cannot overflow any accumulator at
/// the given precision, whatever the site layout.
pub fn check_capacity(width: u32, height: u32, precision: u32) -> Result<(), ConfigError> {
    let pixels = width as u128 * height as u128;
    let max_coord = width.max(height).saturating_sub(1) as u128;
    let per_pixel = max_coord * precision as u128;

    let bounds: [(&'static str, u128, u128); 4] = [
        ("per-pixel coordinate contribution", per_pixel, u32::MAX as u128),
        ("frame coordinate sum", pixels * per_pixel, u64::MAX as u128),
        ("weight sum", pixels * WEIGHT_SCALE as u128, u32::MAX as u128),
        ("pixel count", pixels, u32::MAX as u128),
    ];
    for (what, required, limit) in bounds {
        if required > limit {
            return Err(ConfigError::AccumulatorOverflow { what, required, limit });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_codes_cover_full_range() {
        assert_eq!(encode_weight(0.0), 0);
        assert_eq!(encode_weight(1.0), 255);
        assert_eq!(encode_weight(2.0), 255);
        assert_eq!(encode_weight(-0.5), 0);
        assert_eq!(encode_weight(0.5), 128);
        assert!((decode_weight(255) - 1.0).abs() < 1e-7);
        assert!((decode_weight(510) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn contribution_of_full_weight_is_scaled_coordinate() {
        let fp = FixedPoint::new(1000);
        assert_eq!(fp.contribution(7, 255), 7000);
        assert_eq!(fp.contribution(7, 0), 0);
        assert_eq!(fp.contribution(0, 255), 0);
    }

    #[test]
    fn decode_inverts_encode_on_grid_values() {
        let fp = FixedPoint::new(1000);
        assert_eq!(fp.encode(1.5), 1500);
        assert!((fp.decode(1500) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn default_frame_fits() {
        assert!(check_capacity(640, 480, 1000).is_ok());
        assert!(check_capacity(1920, 1080, 1000).is_ok());
    }

    #[test]
    fn oversize_precision_is_rejected() {
        // 639 · 10^7 > u32::MAX.
        let err = check_capacity(640, 480, 10_000_000).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::AccumulatorOverflow { what: "per-pixel coordinate contribution", .. }
        ));
    }

    #[test]
    fn huge_frame_overflows_weight_sum() {
        // 8192² · 255 > u32::MAX.
        let err = check_capacity(8192, 8192, 1).unwrap_err();
        assert!(matches!(err, ConfigError::AccumulatorOverflow { what: "weight sum", .. }));
    }
}
