//! Photometric interpretation (color space)

use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotometricInterpretation {
    Monochrome1,
    Monochrome2,
    Rgb,
    YbrFull,
    YbrFull422,
    Palette,
    Unknown(String),
}

impl FromStr for PhotometricInterpretation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "MONOCHROME1" => Self::Monochrome1,
            "MONOCHROME2" => Self::Monochrome2,
            "RGB" => Self::Rgb,
            "YBR_FULL" => Self::YbrFull,
            "YBR_FULL_422" => Self::YbrFull422,
            "PALETTE COLOR" => Self::Palette,
            other => Self::Unknown(other.to_string()),
        })
    }
}

impl PhotometricInterpretation {
    #[inline(always)]
    #[must_use]
    pub fn is_grayscale(&self) -> bool {
        matches!(self, Self::Monochrome1 | Self::Monochrome2)
    }

    #[inline(always)]
    #[must_use]
    pub fn is_rgb(&self) -> bool {
        matches!(self, Self::Rgb)
    }

    #[inline(always)]
    #[must_use]
    pub fn is_ycbcr(&self) -> bool {
        matches!(self, Self::YbrFull | Self::YbrFull422)
    }

    #[inline(always)]
    #[must_use]
    pub fn is_palette(&self) -> bool {
        matches!(self, Self::Palette)
    }

    /// MONOCHROME1 renders lowest values white, so its default colour map
    /// is the inverted ramp.
    #[inline(always)]
    #[must_use]
    pub fn uses_inverted_map(&self) -> bool {
        matches!(self, Self::Monochrome1)
    }

    /// Expected samples per pixel.
    #[inline]
    #[must_use]
    pub fn components(&self) -> usize {
        if self.is_rgb() || self.is_ycbcr() { 3 } else { 1 }
    }
}

impl Display for PhotometricInterpretation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monochrome1 => write!(f, "MONOCHROME1"),
            Self::Monochrome2 => write!(f, "MONOCHROME2"),
            Self::Rgb => write!(f, "RGB"),
            Self::YbrFull => write!(f, "YBR_FULL"),
            Self::YbrFull422 => write!(f, "YBR_FULL_422"),
            Self::Palette => write!(f, "PALETTE COLOR"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_round_trip() {
        for term in ["MONOCHROME1", "MONOCHROME2", "RGB", "YBR_FULL", "PALETTE COLOR"] {
            let pi = PhotometricInterpretation::from_str(term).unwrap();
            assert_eq!(pi.to_string(), term);
        }
    }

    #[test]
    fn test_padded_term() {
        let pi = PhotometricInterpretation::from_str("MONOCHROME2 ").unwrap();
        assert_eq!(pi, PhotometricInterpretation::Monochrome2);
    }

    #[test]
    fn test_component_counts() {
        assert_eq!(PhotometricInterpretation::Monochrome2.components(), 1);
        assert_eq!(PhotometricInterpretation::Palette.components(), 1);
        assert_eq!(PhotometricInterpretation::Rgb.components(), 3);
        assert_eq!(PhotometricInterpretation::YbrFull.components(), 3);
    }

    #[test]
    fn test_inverted_map() {
        assert!(PhotometricInterpretation::Monochrome1.uses_inverted_map());
        assert!(!PhotometricInterpretation::Monochrome2.uses_inverted_map());
    }
}
