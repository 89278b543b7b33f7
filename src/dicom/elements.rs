//! Semantic read-only view over a parsed element dictionary

use super::error::ParseError;
use super::tag::{Tag, tags};
use super::value::{DicomDataSet, RawElement, Value};
use super::vr::Vr;
use crate::types::TransferSyntax;

/// Read-only accessor wrapping a raw element dictionary.
///
/// The typed getters return `None` when the element is absent or of an
/// unexpected shape; required-element decisions stay with the callers.
#[derive(Debug, Clone)]
pub struct DicomElements {
    dataset: DicomDataSet,
}

/// One row of the dump output; sequences indent their children by depth.
#[derive(Debug, Clone)]
pub struct DumpRow {
    pub depth: usize,
    pub tag: Tag,
    pub vr: Vr,
    pub length: u32,
    pub name: Option<&'static str>,
    pub value: String,
}

impl DicomElements {
    #[must_use]
    pub fn new(dataset: DicomDataSet) -> Self {
        Self { dataset }
    }

    #[must_use]
    pub fn dataset(&self) -> &DicomDataSet {
        &self.dataset
    }

    #[must_use]
    pub fn element(&self, tag: Tag) -> Option<&RawElement> {
        self.dataset.get(tag)
    }

    #[must_use]
    pub fn str_value(&self, tag: Tag) -> Option<&str> {
        self.dataset.get(tag)?.first_string()
    }

    #[must_use]
    pub fn string_values(&self, tag: Tag) -> Option<&[String]> {
        match &self.dataset.get(tag)?.value {
            Value::Strings(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn u16_value(&self, tag: Tag) -> Option<u16> {
        u16::try_from(self.dataset.get(tag)?.first_int()?).ok()
    }

    #[must_use]
    pub fn f64_value(&self, tag: Tag) -> Option<f64> {
        self.dataset.get(tag)?.first_float()
    }

    #[must_use]
    pub fn f64_values(&self, tag: Tag) -> Option<Vec<f64>> {
        self.dataset.get(tag)?.floats()
    }

    #[must_use]
    pub fn u16_values(&self, tag: Tag) -> Option<Vec<u16>> {
        match &self.dataset.get(tag)?.value {
            Value::Ints(values) => values.iter().map(|&v| u16::try_from(v).ok()).collect(),
            _ => None,
        }
    }

    /// Interpret a byte-valued element (e.g. palette lookup table data) as
    /// little-endian 16-bit words.
    #[must_use]
    pub fn u16_words(&self, tag: Tag) -> Option<Vec<u16>> {
        match &self.dataset.get(tag)?.value {
            Value::Bytes(bytes) => Some(
                bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Per-frame pixel buffers; required for image construction.
    pub fn pixel_frames(&self) -> Result<&[Vec<u8>], ParseError> {
        match self.dataset.get(tags::PIXEL_DATA).map(|e| &e.value) {
            Some(Value::PixelFrames(frames)) => Ok(frames),
            _ => Err(ParseError::MissingElement {
                tag: tags::PIXEL_DATA,
            }),
        }
    }

    pub fn transfer_syntax(&self) -> Result<TransferSyntax, ParseError> {
        let uid = self
            .str_value(tags::TRANSFER_SYNTAX_UID)
            .ok_or(ParseError::MissingElement {
                tag: tags::TRANSFER_SYNTAX_UID,
            })?;
        TransferSyntax::from_uid(uid).ok_or_else(|| ParseError::UnsupportedTransferSyntax {
            uid: uid.to_string(),
        })
    }

    /// Dump the dictionary to plain rows for the metadata merge/print
    /// collaborator.
    #[must_use]
    pub fn dump(&self) -> Vec<DumpRow> {
        let mut rows = Vec::with_capacity(self.dataset.len());
        dump_into(&self.dataset, 0, &mut rows);
        rows
    }
}

fn dump_into(dataset: &DicomDataSet, depth: usize, rows: &mut Vec<DumpRow>) {
    for element in dataset.iter() {
        rows.push(DumpRow {
            depth,
            tag: element.tag,
            vr: element.vr,
            length: element.length,
            name: element.tag.name(),
            value: printable_value(&element.value),
        });
        if let Value::Sequence(items) = &element.value {
            for item in items {
                dump_into(item, depth + 1, rows);
            }
        }
    }
}

fn printable_value(value: &Value) -> String {
    fn join<T: ToString>(values: &[T]) -> String {
        values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\\")
    }
    match value {
        Value::Strings(v) => join(v),
        Value::Ints(v) => join(v),
        Value::Floats(v) => join(v),
        Value::Bytes(v) => format!("<{len} bytes>", len = v.len()),
        Value::PixelFrames(frames) => {
            let total: usize = frames.iter().map(Vec::len).sum();
            format!("<{count} frame(s), {total} bytes>", count = frames.len())
        }
        Value::Sequence(items) => format!("<{count} item(s)>", count = items.len()),
    }
}
