//! Decoded element values and the flat element dictionary

use super::tag::Tag;
use super::vr::Vr;
use std::collections::BTreeMap;
use std::collections::btree_map;

/// A decoded element value.
///
/// Numeric strings (DS/IS) stay as strings; the accessor layer parses them
/// on demand so the dictionary mirrors the stream faithfully.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Strings(Vec<String>),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Bytes(Vec<u8>),
    /// Pixel data, one byte buffer per frame (single entry when the stream
    /// holds one frame).
    PixelFrames(Vec<Vec<u8>>),
    /// Nested item data sets of a sequence element.
    Sequence(Vec<DicomDataSet>),
}

/// One parsed element: tag, VR, on-wire length and decoded value.
///
/// `length` keeps the encoded value (0xFFFF_FFFF for undefined-length
/// elements) for dump output.
#[derive(Debug, Clone, PartialEq)]
pub struct RawElement {
    pub tag: Tag,
    pub vr: Vr,
    pub length: u32,
    pub value: Value,
}

impl RawElement {
    /// First string value, if this element holds strings.
    #[must_use]
    pub fn first_string(&self) -> Option<&str> {
        match &self.value {
            Value::Strings(values) => values.first().map(String::as_str),
            _ => None,
        }
    }

    /// First value as an integer (from integer or numeric-string values).
    #[must_use]
    pub fn first_int(&self) -> Option<i64> {
        match &self.value {
            Value::Ints(values) => values.first().copied(),
            Value::Strings(values) => values.first()?.trim().parse().ok(),
            Value::Floats(values) => values.first().map(|v| *v as i64),
            _ => None,
        }
    }

    /// First value as a float (from float, integer or numeric-string values).
    #[must_use]
    pub fn first_float(&self) -> Option<f64> {
        match &self.value {
            Value::Floats(values) => values.first().copied(),
            Value::Ints(values) => values.first().map(|v| *v as f64),
            Value::Strings(values) => values.first()?.trim().parse().ok(),
            _ => None,
        }
    }

    /// All values as floats, when every entry converts.
    #[must_use]
    pub fn floats(&self) -> Option<Vec<f64>> {
        match &self.value {
            Value::Floats(values) => Some(values.clone()),
            Value::Ints(values) => Some(values.iter().map(|&v| v as f64).collect()),
            Value::Strings(values) => values
                .iter()
                .map(|s| s.trim().parse::<f64>().ok())
                .collect(),
            _ => None,
        }
    }

    /// Number of values held by this element.
    #[must_use]
    pub fn multiplicity(&self) -> usize {
        match &self.value {
            Value::Strings(v) => v.len(),
            Value::Ints(v) => v.len(),
            Value::Floats(v) => v.len(),
            Value::Bytes(v) => v.len(),
            Value::PixelFrames(v) => v.len(),
            Value::Sequence(v) => v.len(),
        }
    }
}

/// Flat, stream-ordered dictionary of parsed elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DicomDataSet {
    elements: BTreeMap<Tag, RawElement>,
}

impl DicomDataSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, element: RawElement) {
        self.elements.insert(element.tag, element);
    }

    #[must_use]
    pub fn get(&self, tag: Tag) -> Option<&RawElement> {
        self.elements.get(&tag)
    }

    #[must_use]
    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    pub fn iter(&self) -> btree_map::Values<'_, Tag, RawElement> {
        self.elements.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::tag::tags;

    #[test]
    fn test_numeric_string_parsing() {
        let element = RawElement {
            tag: tags::RESCALE_INTERCEPT,
            vr: Vr::Ds,
            length: 6,
            value: Value::Strings(vec!["-1024 ".to_string()]),
        };
        assert_eq!(element.first_float(), Some(-1024.0));
        assert_eq!(element.first_int(), Some(-1024));
    }

    #[test]
    fn test_floats_from_mixed_representations() {
        let strings = RawElement {
            tag: tags::IMAGE_POSITION_PATIENT,
            vr: Vr::Ds,
            length: 12,
            value: Value::Strings(vec!["1.5".into(), "-2".into(), "0".into()]),
        };
        assert_eq!(strings.floats(), Some(vec![1.5, -2.0, 0.0]));

        let ints = RawElement {
            tag: tags::ROWS,
            vr: Vr::Us,
            length: 2,
            value: Value::Ints(vec![512]),
        };
        assert_eq!(ints.floats(), Some(vec![512.0]));
    }

    #[test]
    fn test_dataset_keeps_tag_order() {
        let mut ds = DicomDataSet::new();
        for tag in [tags::PIXEL_DATA, tags::ROWS, tags::MODALITY] {
            ds.insert(RawElement {
                tag,
                vr: Vr::Un,
                length: 0,
                value: Value::Bytes(vec![]),
            });
        }
        let order: Vec<Tag> = ds.iter().map(|e| e.tag).collect();
        assert_eq!(order, vec![tags::MODALITY, tags::ROWS, tags::PIXEL_DATA]);
    }
}
