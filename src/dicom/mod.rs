//! DICOM stream parsing and element access
//!
//! This module turns a raw byte buffer into a flat element dictionary and
//! provides the typed read-only accessor the rest of the pipeline consumes.

pub mod charset;
pub mod elements;
pub mod error;
pub mod parser;
mod photometric;
pub mod tag;
pub mod value;
pub mod vr;

// Re-export public API
pub use charset::CharacterSet;
pub use elements::{DicomElements, DumpRow};
pub use error::ParseError;
pub use parser::DicomParser;
pub use photometric::PhotometricInterpretation;
pub use tag::{Tag, tags};
pub use value::{DicomDataSet, RawElement, Value};
pub use vr::Vr;
