//! Character set handling for text-valued elements
//!
//! The parser starts with a caller-supplied default and switches as soon as
//! a SpecificCharacterSet element is decoded. Only the single-byte sets
//! this pipeline meets in practice are supported; anything unrecognized
//! keeps the previous decoder.

use log::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharacterSet {
    /// ISO-IR 6, the DICOM default repertoire
    #[default]
    Ascii,
    /// ISO-IR 100 (ISO 8859-1)
    Latin1,
    /// ISO-IR 192 (Unicode in UTF-8)
    Utf8,
}

impl CharacterSet {
    /// Resolve a defined term from SpecificCharacterSet, or a lowercase
    /// label as accepted for the caller-supplied default.
    #[must_use]
    pub fn from_term(term: &str) -> Option<Self> {
        match term.trim() {
            "" | "ISO_IR 6" | "ISO 2022 IR 6" | "ascii" | "us-ascii" => Some(Self::Ascii),
            "ISO_IR 100" | "ISO 2022 IR 100" | "iso-8859-1" | "latin1" => Some(Self::Latin1),
            "ISO_IR 192" | "utf-8" | "utf8" => Some(Self::Utf8),
            _ => None,
        }
    }

    /// Resolve a term, logging and keeping `self` when unrecognized.
    #[must_use]
    pub fn switch_to(self, term: &str) -> Self {
        match Self::from_term(term) {
            Some(cs) => cs,
            None => {
                warn!("unsupported character set '{term}', keeping {self:?}");
                self
            }
        }
    }

    /// Decode raw element bytes to a string.
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            // Non-ASCII bytes in an ASCII stream are mapped like Latin-1
            // rather than dropped, matching lenient viewer behavior.
            Self::Ascii | Self::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}
