//! Value representations and the implicit-VR tag table

use super::tag::{Tag, tags};
use std::fmt;

/// DICOM value representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vr {
    Ae,
    As,
    At,
    Cs,
    Da,
    Ds,
    Dt,
    Fl,
    Fd,
    Is,
    Lo,
    Lt,
    Ob,
    Of,
    Ow,
    Pn,
    Sh,
    Sl,
    Sq,
    Ss,
    St,
    Tm,
    Ui,
    Ul,
    Un,
    Us,
    Ut,
}

impl Vr {
    /// Decode a two-byte VR code as found in explicit-VR streams.
    pub fn from_bytes(code: [u8; 2]) -> Option<Self> {
        Some(match &code {
            b"AE" => Self::Ae,
            b"AS" => Self::As,
            b"AT" => Self::At,
            b"CS" => Self::Cs,
            b"DA" => Self::Da,
            b"DS" => Self::Ds,
            b"DT" => Self::Dt,
            b"FL" => Self::Fl,
            b"FD" => Self::Fd,
            b"IS" => Self::Is,
            b"LO" => Self::Lo,
            b"LT" => Self::Lt,
            b"OB" => Self::Ob,
            b"OF" => Self::Of,
            b"OW" => Self::Ow,
            b"PN" => Self::Pn,
            b"SH" => Self::Sh,
            b"SL" => Self::Sl,
            b"SQ" => Self::Sq,
            b"SS" => Self::Ss,
            b"ST" => Self::St,
            b"TM" => Self::Tm,
            b"UI" => Self::Ui,
            b"UL" => Self::Ul,
            b"UN" => Self::Un,
            b"US" => Self::Us,
            b"UT" => Self::Ut,
            _ => return None,
        })
    }

    /// VRs encoded with the 12-byte explicit header
    /// (2 reserved bytes + 4-byte length).
    #[inline]
    #[must_use]
    pub fn uses_long_header(&self) -> bool {
        matches!(self, Self::Ob | Self::Of | Self::Ow | Self::Sq | Self::Un | Self::Ut)
    }

    /// String VRs whose bytes go through the active character set.
    /// Structural string VRs (UIDs, code strings, dates) stay ASCII.
    #[inline]
    #[must_use]
    pub fn is_charset_sensitive(&self) -> bool {
        matches!(self, Self::Lo | Self::Lt | Self::Pn | Self::Sh | Self::St | Self::Ut)
    }

    #[inline]
    #[must_use]
    pub fn is_string(&self) -> bool {
        matches!(
            self,
            Self::Ae
                | Self::As
                | Self::Cs
                | Self::Da
                | Self::Ds
                | Self::Dt
                | Self::Is
                | Self::Lo
                | Self::Lt
                | Self::Pn
                | Self::Sh
                | Self::St
                | Self::Tm
                | Self::Ui
                | Self::Ut
        )
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ae => "AE",
            Self::As => "AS",
            Self::At => "AT",
            Self::Cs => "CS",
            Self::Da => "DA",
            Self::Ds => "DS",
            Self::Dt => "DT",
            Self::Fl => "FL",
            Self::Fd => "FD",
            Self::Is => "IS",
            Self::Lo => "LO",
            Self::Lt => "LT",
            Self::Ob => "OB",
            Self::Of => "OF",
            Self::Ow => "OW",
            Self::Pn => "PN",
            Self::Sh => "SH",
            Self::Sl => "SL",
            Self::Sq => "SQ",
            Self::Ss => "SS",
            Self::St => "ST",
            Self::Tm => "TM",
            Self::Ui => "UI",
            Self::Ul => "UL",
            Self::Un => "UN",
            Self::Us => "US",
            Self::Ut => "UT",
        };
        f.write_str(s)
    }
}

/// Resolve the VR of a tag in an implicit-VR stream.
///
/// Covers the tags this pipeline consumes; anything else decodes as UN
/// (raw bytes), which keeps unknown and private elements intact in the
/// dictionary without a full data dictionary.
#[must_use]
pub fn implicit_vr(tag: Tag) -> Vr {
    match tag {
        tags::FILE_META_GROUP_LENGTH => Vr::Ul,
        tags::TRANSFER_SYNTAX_UID | tags::SOP_CLASS_UID | tags::SOP_INSTANCE_UID => Vr::Ui,
        tags::SPECIFIC_CHARACTER_SET | tags::MODALITY | tags::PHOTOMETRIC_INTERPRETATION => Vr::Cs,
        tags::PATIENT_NAME => Vr::Pn,
        tags::WINDOW_CENTER_WIDTH_EXPLANATION => Vr::Lo,
        tags::NUMBER_OF_FRAMES | tags::RECOMMENDED_DISPLAY_FRAME_RATE => Vr::Is,
        tags::SLICE_THICKNESS
        | tags::SPACING_BETWEEN_SLICES
        | tags::IMAGE_POSITION_PATIENT
        | tags::IMAGE_ORIENTATION_PATIENT
        | tags::PIXEL_SPACING
        | tags::WINDOW_CENTER
        | tags::WINDOW_WIDTH
        | tags::RESCALE_INTERCEPT
        | tags::RESCALE_SLOPE => Vr::Ds,
        tags::SAMPLES_PER_PIXEL
        | tags::PLANAR_CONFIGURATION
        | tags::ROWS
        | tags::COLUMNS
        | tags::BITS_ALLOCATED
        | tags::BITS_STORED
        | tags::HIGH_BIT
        | tags::PIXEL_REPRESENTATION
        | tags::RED_PALETTE_DESCRIPTOR
        | tags::GREEN_PALETTE_DESCRIPTOR
        | tags::BLUE_PALETTE_DESCRIPTOR => Vr::Us,
        tags::RED_PALETTE_DATA | tags::GREEN_PALETTE_DATA | tags::BLUE_PALETTE_DATA => Vr::Ow,
        tags::PIXEL_DATA => Vr::Ow,
        _ => Vr::Un,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vr_roundtrip() {
        for code in [b"AE", b"DS", b"OB", b"SQ", b"US", b"UT"] {
            let vr = Vr::from_bytes(*code).unwrap();
            assert_eq!(vr.to_string().as_bytes(), *code);
        }
        assert_eq!(Vr::from_bytes(*b"ZZ"), None);
    }

    #[test]
    fn test_long_header_vrs() {
        assert!(Vr::Ob.uses_long_header());
        assert!(Vr::Sq.uses_long_header());
        assert!(!Vr::Us.uses_long_header());
        assert!(!Vr::Ds.uses_long_header());
    }

    #[test]
    fn test_implicit_vr_table() {
        assert_eq!(implicit_vr(tags::ROWS), Vr::Us);
        assert_eq!(implicit_vr(tags::RESCALE_SLOPE), Vr::Ds);
        assert_eq!(implicit_vr(tags::PIXEL_DATA), Vr::Ow);
        // private/unknown tags fall back to UN
        assert_eq!(implicit_vr(Tag::new(0x0009, 0x1001)), Vr::Un);
    }

    #[test]
    fn test_charset_sensitivity() {
        assert!(Vr::Pn.is_charset_sensitive());
        assert!(Vr::Lo.is_charset_sensitive());
        assert!(!Vr::Ui.is_charset_sensitive());
        assert!(!Vr::Cs.is_charset_sensitive());
    }
}
