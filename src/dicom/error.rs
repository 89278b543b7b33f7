//! Parser error taxonomy

use super::tag::Tag;
use thiserror::Error;

/// Errors raised while decoding a DICOM byte stream.
///
/// All of these are fatal to the load of that stream: no partial element
/// dictionary or image is produced.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("not a DICOM stream: missing DICM magic word")]
    InvalidMagic,

    #[error("truncated stream at offset {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    #[error("unsupported value representation '{vr}' at offset {offset}")]
    UnsupportedVr { vr: String, offset: usize },

    #[error("unsupported transfer syntax '{uid}'")]
    UnsupportedTransferSyntax { uid: String },

    #[error("missing required element {tag}")]
    MissingElement { tag: Tag },

    #[error("invalid value for {tag}: {reason}")]
    InvalidValue { tag: Tag, reason: String },
}
