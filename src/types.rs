//! Domain-specific value types shared across the pipeline

use std::fmt;

/// DICOM transfer syntax (UID, name)
///
/// The transfer syntax drives three parsing decisions: value representation
/// encoding (implicit vs explicit), byte order, and the pixel decompression
/// algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSyntax {
    pub uid: String,
    pub name: String,
}

/// (UID, name, decompression algorithm) for every supported syntax
const KNOWN_SYNTAXES: &[(&str, &str, Option<&str>)] = &[
    ("1.2.840.10008.1.2", "Implicit VR Little Endian", None),
    ("1.2.840.10008.1.2.1", "Explicit VR Little Endian", None),
    ("1.2.840.10008.1.2.2", "Explicit VR Big Endian", None),
    (
        "1.2.840.10008.1.2.4.50",
        "JPEG Baseline (Process 1)",
        Some("jpeg-baseline"),
    ),
    (
        "1.2.840.10008.1.2.4.51",
        "JPEG Extended (Process 2 & 4)",
        Some("jpeg-baseline"),
    ),
    (
        "1.2.840.10008.1.2.4.57",
        "JPEG Lossless, Non-Hierarchical (Process 14)",
        Some("jpeg-lossless"),
    ),
    (
        "1.2.840.10008.1.2.4.70",
        "JPEG Lossless, Non-Hierarchical, First-Order Prediction",
        Some("jpeg-lossless"),
    ),
    (
        "1.2.840.10008.1.2.4.90",
        "JPEG 2000 Image Compression (Lossless Only)",
        Some("jpeg2000"),
    ),
    ("1.2.840.10008.1.2.4.91", "JPEG 2000 Image Compression", Some("jpeg2000")),
    ("1.2.840.10008.1.2.5", "RLE Lossless", Some("rle")),
];

impl TransferSyntax {
    /// Look up a transfer syntax by UID. Returns `None` for unknown UIDs.
    #[must_use]
    pub fn from_uid(uid: &str) -> Option<Self> {
        let uid = uid.trim_end_matches('\0').trim();
        KNOWN_SYNTAXES
            .iter()
            .find(|(u, ..)| *u == uid)
            .map(|(u, name, _)| Self {
                uid: (*u).to_string(),
                name: (*name).to_string(),
            })
    }

    #[inline]
    #[must_use]
    pub fn is_implicit_vr(&self) -> bool {
        self.uid == "1.2.840.10008.1.2"
    }

    #[inline]
    #[must_use]
    pub fn is_big_endian(&self) -> bool {
        self.uid == "1.2.840.10008.1.2.2"
    }

    /// Name of the decompression algorithm for encapsulated pixel data,
    /// or `None` when samples are stored natively.
    #[must_use]
    pub fn decompression_name(&self) -> Option<&'static str> {
        KNOWN_SYNTAXES
            .iter()
            .find(|(u, ..)| *u == self.uid)
            .and_then(|(.., algo)| *algo)
    }
}

impl fmt::Display for TransferSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{name} ({uid})", name = self.name, uid = self.uid)
    }
}

/// Rescale slope and intercept, the linear transform from stored sample
/// values to modality units (e.g. Hounsfield)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RescaleSlopeAndIntercept {
    pub slope: f64,
    pub intercept: f64,
}

impl RescaleSlopeAndIntercept {
    #[must_use]
    pub fn new(slope: f64, intercept: f64) -> Self {
        Self { slope, intercept }
    }

    #[must_use]
    pub const fn identity() -> Self {
        Self {
            slope: 1.0,
            intercept: 0.0,
        }
    }

    #[inline(always)]
    #[must_use]
    // Hot path: called for every sample during rescaled passes
    pub fn apply(&self, value: f64) -> f64 {
        value.mul_add(self.slope, self.intercept)
    }

    #[inline]
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.slope == 1.0 && self.intercept == 0.0
    }

    /// Stable key used to share window LUTs between slices with equal RSI.
    #[must_use]
    pub fn signature(&self) -> String {
        format!("s{slope}i{intercept}", slope = self.slope, intercept = self.intercept)
    }
}

impl Default for RescaleSlopeAndIntercept {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Display for RescaleSlopeAndIntercept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slope={slope}, intercept={intercept}",
            slope = self.slope,
            intercept = self.intercept
        )
    }
}

/// Window center and width (VOI), mapping a rescaled value interval to the
/// display range. Width is expected to be >= 1; the view setters guard this.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowLevel {
    center: f64,
    width: f64,
}

impl WindowLevel {
    #[must_use]
    pub fn new(center: f64, width: f64) -> Self {
        Self { center, width }
    }

    #[inline]
    #[must_use]
    pub fn center(&self) -> f64 {
        self.center
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Map a rescaled value to a display index in [0, 255].
    ///
    /// Linear ramp over [center - width/2, center + width/2], clamped at
    /// both ends; monotonic non-decreasing in the input.
    #[inline]
    #[must_use]
    pub fn apply(&self, value: f64) -> u8 {
        let low = self.center - self.width / 2.0;
        let index = ((value - low) / self.width * 255.0).round();
        index.clamp(0.0, 255.0) as u8
    }
}

impl fmt::Display for WindowLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "center={center}, width={width}",
            center = self.center,
            width = self.width
        )
    }
}

/// Min/max pair for raw or rescaled sample values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataRange {
    pub min: f64,
    pub max: f64,
}

impl DataRange {
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl fmt::Display for DataRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{min}, {max}]", min = self.min, max = self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_syntax_classification() {
        let implicit = TransferSyntax::from_uid("1.2.840.10008.1.2").unwrap();
        assert!(implicit.is_implicit_vr());
        assert!(!implicit.is_big_endian());
        assert_eq!(implicit.decompression_name(), None);

        let big = TransferSyntax::from_uid("1.2.840.10008.1.2.2").unwrap();
        assert!(!big.is_implicit_vr());
        assert!(big.is_big_endian());

        let rle = TransferSyntax::from_uid("1.2.840.10008.1.2.5").unwrap();
        assert_eq!(rle.decompression_name(), Some("rle"));

        let j2k = TransferSyntax::from_uid("1.2.840.10008.1.2.4.90").unwrap();
        assert_eq!(j2k.decompression_name(), Some("jpeg2000"));

        assert!(TransferSyntax::from_uid("1.2.3.4").is_none());
    }

    #[test]
    fn test_transfer_syntax_trims_padding() {
        // UI values are even-padded with NUL
        let ts = TransferSyntax::from_uid("1.2.840.10008.1.2.1\0").unwrap();
        assert_eq!(ts.uid, "1.2.840.10008.1.2.1");
    }

    #[test]
    fn test_rsi_apply_and_flags() {
        let rsi = RescaleSlopeAndIntercept::new(1.0, -1024.0);
        assert_eq!(rsi.apply(1024.0), 0.0);
        assert!(!rsi.is_identity());
        assert!(RescaleSlopeAndIntercept::identity().is_identity());
        assert_ne!(rsi.signature(), RescaleSlopeAndIntercept::identity().signature());
    }

    #[test]
    fn test_window_level_apply_bounds() {
        let wl = WindowLevel::new(40.0, 400.0);
        // below the window
        assert_eq!(wl.apply(-1000.0), 0);
        // above the window
        assert_eq!(wl.apply(1000.0), 255);
        // raw 1024 with slope 1 intercept -1024 rescales to 0
        assert_eq!(
            wl.apply(0.0),
            ((0.0 - (40.0 - 200.0)) / 400.0 * 255.0_f64).round() as u8
        );
        assert_eq!(wl.apply(0.0), 102);
    }

    #[test]
    fn test_window_level_monotonic() {
        let wl = WindowLevel::new(50.0, 300.0);
        let mut prev = wl.apply(-400.0);
        let mut v = -400.0;
        while v <= 400.0 {
            let cur = wl.apply(v);
            assert!(cur >= prev, "not monotonic at {v}");
            prev = cur;
            v += 0.5;
        }
    }
}
