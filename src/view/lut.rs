//! Rescale and window lookup tables
//!
//! A rescale LUT precomputes the rescaled value of every representable raw
//! sample (2^bits_stored entries, signed domain shifted into the table).
//! A window LUT maps those rescaled values through the active window level
//! into display indices; it regenerates lazily when the level changes.

use crate::types::{RescaleSlopeAndIntercept, WindowLevel};

/// Precomputed rescale transform over the raw sample domain.
#[derive(Debug, Clone)]
pub struct RescaleLut {
    rsi: RescaleSlopeAndIntercept,
    table: Vec<f64>,
    signed_shift: i32,
}

impl RescaleLut {
    /// Build the table for a `bits_stored`-wide domain; the signed domain
    /// is `[-2^(bits-1), 2^(bits-1))`.
    #[must_use]
    pub fn new(rsi: RescaleSlopeAndIntercept, bits_stored: u16, is_signed: bool) -> Self {
        let bits = bits_stored.clamp(1, 16);
        let length = 1usize << bits;
        let signed_shift = if is_signed { (length / 2) as i32 } else { 0 };
        let table = (0..length)
            .map(|index| rsi.apply(f64::from(index as i32 - signed_shift)))
            .collect();
        Self {
            rsi,
            table,
            signed_shift,
        }
    }

    #[must_use]
    pub fn rsi(&self) -> RescaleSlopeAndIntercept {
        self.rsi
    }

    #[must_use]
    pub fn length(&self) -> usize {
        self.table.len()
    }

    #[inline]
    #[must_use]
    pub fn value(&self, index: usize) -> f64 {
        self.table[index]
    }

    /// Table index of a raw sample value, clamped into the domain.
    #[inline]
    #[must_use]
    pub fn index_of(&self, raw: i32) -> usize {
        (raw + self.signed_shift).clamp(0, self.table.len() as i32 - 1) as usize
    }
}

/// Window/level display LUT over a rescale LUT.
#[derive(Debug, Clone)]
pub struct WindowLut {
    rescale: RescaleLut,
    window_level: WindowLevel,
    table: Vec<u8>,
    ready: bool,
}

impl WindowLut {
    #[must_use]
    pub fn new(rescale: RescaleLut, window_level: WindowLevel) -> Self {
        let length = rescale.length();
        Self {
            rescale,
            window_level,
            table: vec![0; length],
            ready: false,
        }
    }

    #[must_use]
    pub fn rescale_lut(&self) -> &RescaleLut {
        &self.rescale
    }

    #[must_use]
    pub fn window_level(&self) -> WindowLevel {
        self.window_level
    }

    /// Change the window level; the table regenerates on the next update.
    pub fn set_window_level(&mut self, window_level: WindowLevel) {
        self.window_level = window_level;
        self.ready = false;
    }

    /// Regenerate the table if the window level changed since last time.
    pub fn update(&mut self) {
        if self.ready {
            return;
        }
        for index in 0..self.table.len() {
            self.table[index] = self.window_level.apply(self.rescale.value(index));
        }
        self.ready = true;
    }

    /// Display index of a raw sample value.
    #[inline]
    #[must_use]
    pub fn value(&self, raw: i32) -> u8 {
        self.table[self.rescale.index_of(raw)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lut(rsi: RescaleSlopeAndIntercept, bits: u16, signed: bool, wl: WindowLevel) -> WindowLut {
        let mut lut = WindowLut::new(RescaleLut::new(rsi, bits, signed), wl);
        lut.update();
        lut
    }

    #[test]
    fn test_ct_window_scenario() {
        // 16-bit MONOCHROME2, slope 1 intercept -1024, center 40 width 400:
        // raw 1024 rescales to 0, whose display index per the linear ramp
        // round((0 - (40 - 200)) / 400 * 255) is 102
        let lut = lut(
            RescaleSlopeAndIntercept::new(1.0, -1024.0),
            16,
            false,
            WindowLevel::new(40.0, 400.0),
        );
        assert_eq!(lut.value(1024), 102);
    }

    #[test]
    fn test_output_in_range_and_monotonic() {
        let lut = lut(
            RescaleSlopeAndIntercept::new(1.0, -1024.0),
            12,
            false,
            WindowLevel::new(40.0, 400.0),
        );
        let mut previous = lut.value(0);
        for raw in 0..(1 << 12) {
            let value = lut.value(raw);
            assert!(value >= previous, "not monotonic at raw {raw}");
            previous = value;
        }
        assert_eq!(lut.value(0), 0);
        assert_eq!(lut.value((1 << 12) - 1), 255);
    }

    #[test]
    fn test_signed_domain() {
        let lut = lut(
            RescaleSlopeAndIntercept::identity(),
            8,
            true,
            WindowLevel::new(0.0, 256.0),
        );
        // domain is [-128, 128); -128 maps to the bottom of the ramp
        assert_eq!(lut.value(-128), 0);
        assert_eq!(lut.value(127), 255);
        assert!(lut.value(0) > lut.value(-64));
        // out-of-domain raw values clamp instead of wrapping
        assert_eq!(lut.value(-4000), 0);
        assert_eq!(lut.value(4000), 255);
    }

    #[test]
    fn test_update_regenerates_only_after_change() {
        let rescale = RescaleLut::new(RescaleSlopeAndIntercept::identity(), 8, false);
        let mut lut = WindowLut::new(rescale, WindowLevel::new(128.0, 256.0));
        lut.update();
        let before = lut.value(128);
        lut.set_window_level(WindowLevel::new(10.0, 20.0));
        lut.update();
        assert_ne!(lut.value(128), before);
        assert_eq!(lut.value(128), 255);
    }

    #[test]
    fn test_rescale_lut_values() {
        let rescale = RescaleLut::new(RescaleSlopeAndIntercept::new(2.0, -10.0), 8, false);
        assert_eq!(rescale.length(), 256);
        assert_eq!(rescale.value(0), -10.0);
        assert_eq!(rescale.value(255), 500.0);
    }
}
