//! Synthetic DICOM dataset encoder for unit tests
//!
//! Builds byte-exact streams in any of the three uncompressed transfer
//! syntaxes plus encapsulated layouts, so the tests never depend on
//! fixture files.

use crate::dicom::tag::{Tag, tags};
use crate::types::TransferSyntax;

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

pub struct DatasetBuilder {
    syntax_uid: String,
    explicit: bool,
    big_endian: bool,
    body: Vec<u8>,
}

impl DatasetBuilder {
    /// Builder for a known transfer syntax.
    pub fn new(syntax_uid: &str) -> Self {
        let syntax = TransferSyntax::from_uid(syntax_uid)
            .unwrap_or_else(|| panic!("unknown test syntax {syntax_uid}"));
        Self {
            syntax_uid: syntax.uid.clone(),
            explicit: !syntax.is_implicit_vr(),
            big_endian: syntax.is_big_endian(),
            body: Vec::new(),
        }
    }

    /// Builder writing an arbitrary (possibly bogus) syntax UID,
    /// body encoded explicit little endian.
    pub fn with_raw_syntax(syntax_uid: &str) -> Self {
        Self {
            syntax_uid: syntax_uid.to_string(),
            explicit: true,
            big_endian: false,
            body: Vec::new(),
        }
    }

    pub fn string(mut self, tag: Tag, vr: &str, value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        if bytes.len() % 2 != 0 {
            bytes.push(if vr == "UI" { 0 } else { b' ' });
        }
        self.write_header(tag, vr.as_bytes().try_into().unwrap(), bytes.len() as u32);
        self.body.extend_from_slice(&bytes);
        self
    }

    pub fn u16s(mut self, tag: Tag, values: &[u16]) -> Self {
        self.write_header(tag, *b"US", (values.len() * 2) as u32);
        for &v in values {
            self.push_u16(v);
        }
        self
    }

    pub fn bytes(mut self, tag: Tag, vr: &str, bytes: &[u8]) -> Self {
        let mut bytes = bytes.to_vec();
        if bytes.len() % 2 != 0 {
            bytes.push(0);
        }
        self.write_header(tag, vr.as_bytes().try_into().unwrap(), bytes.len() as u32);
        self.body.extend_from_slice(&bytes);
        self
    }

    /// Write an element with a raw two-byte VR code, bypassing validity.
    pub fn raw_element(mut self, tag: Tag, vr_code: [u8; 2], bytes: &[u8]) -> Self {
        self.push_tag(tag);
        self.body.extend_from_slice(&vr_code);
        self.push_u16(bytes.len() as u16);
        self.body.extend_from_slice(bytes);
        self
    }

    /// Native 16-bit pixel data (OW, defined length) in the builder's
    /// byte order.
    pub fn pixel_data_native(mut self, samples: &[u16]) -> Self {
        self.write_header(tags::PIXEL_DATA, *b"OW", (samples.len() * 2) as u32);
        for &v in samples {
            self.push_u16(v);
        }
        self
    }

    /// Native 8-bit pixel data (OB, defined length).
    pub fn pixel_data_native_bytes(mut self, bytes: &[u8]) -> Self {
        let mut bytes = bytes.to_vec();
        if bytes.len() % 2 != 0 {
            bytes.push(0);
        }
        self.write_header(tags::PIXEL_DATA, *b"OB", bytes.len() as u32);
        self.body.extend_from_slice(&bytes);
        self
    }

    /// Encapsulated pixel data: basic offset table item (empty unless
    /// `offsets` given), one item per fragment, sequence delimitation.
    pub fn pixel_data_encapsulated(mut self, fragments: &[Vec<u8>], offsets: Option<&[u32]>) -> Self {
        self.write_header(tags::PIXEL_DATA, *b"OB", UNDEFINED_LENGTH);
        // offset table
        self.push_tag(tags::ITEM);
        match offsets {
            Some(offsets) => {
                self.push_u32((offsets.len() * 4) as u32);
                for &o in offsets {
                    // offset table entries are little endian on the wire
                    self.body.extend_from_slice(&o.to_le_bytes());
                }
            }
            None => self.push_u32(0),
        }
        for fragment in fragments {
            assert!(fragment.len() % 2 == 0, "fragments must be even-length");
            self.push_tag(tags::ITEM);
            self.push_u32(fragment.len() as u32);
            self.body.extend_from_slice(fragment);
        }
        self.push_tag(tags::SEQUENCE_DELIMITATION);
        self.push_u32(0);
        self
    }

    /// A sequence of items, each a list of string elements. Items use
    /// defined lengths; the sequence itself is defined when `defined`.
    pub fn sequence(mut self, tag: Tag, items: &[&[(Tag, &str, &str)]], defined: bool) -> Self {
        let mut seq_bytes = Vec::new();
        for item in items {
            let mut item_builder = Self {
                syntax_uid: self.syntax_uid.clone(),
                explicit: self.explicit,
                big_endian: self.big_endian,
                body: Vec::new(),
            };
            for (tag, vr, value) in *item {
                item_builder = item_builder.string(*tag, vr, value);
            }
            let item_bytes = item_builder.body;
            seq_bytes.extend_from_slice(&self.tag_bytes(tags::ITEM));
            seq_bytes.extend_from_slice(&self.u32_bytes(item_bytes.len() as u32));
            seq_bytes.extend_from_slice(&item_bytes);
        }
        if defined {
            self.write_header(tag, *b"SQ", seq_bytes.len() as u32);
            self.body.extend_from_slice(&seq_bytes);
        } else {
            self.write_header(tag, *b"SQ", UNDEFINED_LENGTH);
            self.body.extend_from_slice(&seq_bytes);
            self.push_tag(tags::SEQUENCE_DELIMITATION);
            self.push_u32(0);
        }
        self
    }

    /// Assemble preamble, magic, file meta group and body.
    pub fn build(&self) -> Vec<u8> {
        // meta elements: explicit little endian, unconditionally
        let mut uid = self.syntax_uid.as_bytes().to_vec();
        if uid.len() % 2 != 0 {
            uid.push(0);
        }
        let mut meta = Vec::new();
        meta.extend_from_slice(&0x0002u16.to_le_bytes());
        meta.extend_from_slice(&0x0010u16.to_le_bytes());
        meta.extend_from_slice(b"UI");
        meta.extend_from_slice(&(uid.len() as u16).to_le_bytes());
        meta.extend_from_slice(&uid);

        let mut out = vec![0u8; 128];
        out.extend_from_slice(b"DICM");
        // group length element first, as written by conforming encoders
        out.extend_from_slice(&0x0002u16.to_le_bytes());
        out.extend_from_slice(&0x0000u16.to_le_bytes());
        out.extend_from_slice(b"UL");
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
        out.extend_from_slice(&meta);
        out.extend_from_slice(&self.body);
        out
    }

    fn write_header(&mut self, tag: Tag, vr_code: [u8; 2], length: u32) {
        self.push_tag(tag);
        if self.explicit {
            self.body.extend_from_slice(&vr_code);
            let long = matches!(&vr_code, b"OB" | b"OW" | b"OF" | b"SQ" | b"UN" | b"UT");
            if long {
                self.body.extend_from_slice(&[0, 0]);
                self.push_u32(length);
            } else {
                self.push_u16(length as u16);
            }
        } else {
            self.push_u32(length);
        }
    }

    fn tag_bytes(&self, tag: Tag) -> [u8; 4] {
        let (g, e) = if self.big_endian {
            (tag.group.to_be_bytes(), tag.element.to_be_bytes())
        } else {
            (tag.group.to_le_bytes(), tag.element.to_le_bytes())
        };
        [g[0], g[1], e[0], e[1]]
    }

    fn u32_bytes(&self, v: u32) -> [u8; 4] {
        if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    }

    fn push_tag(&mut self, tag: Tag) {
        let bytes = self.tag_bytes(tag);
        self.body.extend_from_slice(&bytes);
    }

    fn push_u16(&mut self, v: u16) {
        let bytes = if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };
        self.body.extend_from_slice(&bytes);
    }

    fn push_u32(&mut self, v: u32) {
        let bytes = self.u32_bytes(v);
        self.body.extend_from_slice(&bytes);
    }
}

/// A complete single-slice 16-bit MONOCHROME2 CT-like dataset,
/// explicit VR little endian, positioned at `origin_z` on the slice axis.
pub fn monochrome_dataset(rows: u16, cols: u16, pixels: &[u16], origin_z: f64) -> Vec<u8> {
    monochrome_builder(rows, cols, pixels, origin_z).build()
}

/// Same as [`monochrome_dataset`] but returns the builder so tests can
/// add or override elements before building.
pub fn monochrome_builder(rows: u16, cols: u16, pixels: &[u16], origin_z: f64) -> DatasetBuilder {
    DatasetBuilder::new("1.2.840.10008.1.2.1")
        .string(tags::SOP_INSTANCE_UID, "UI", &format!("1.2.826.0.1.3.1.{}", origin_z.abs() as u64))
        .string(tags::MODALITY, "CS", "CT")
        .string(tags::PHOTOMETRIC_INTERPRETATION, "CS", "MONOCHROME2")
        .u16s(tags::SAMPLES_PER_PIXEL, &[1])
        .u16s(tags::ROWS, &[rows])
        .u16s(tags::COLUMNS, &[cols])
        .u16s(tags::BITS_ALLOCATED, &[16])
        .u16s(tags::BITS_STORED, &[16])
        .u16s(tags::HIGH_BIT, &[15])
        .u16s(tags::PIXEL_REPRESENTATION, &[0])
        .string(tags::IMAGE_POSITION_PATIENT, "DS", &format!("0\\0\\{origin_z}"))
        .string(tags::IMAGE_ORIENTATION_PATIENT, "DS", "1\\0\\0\\0\\1\\0")
        .string(tags::PIXEL_SPACING, "DS", "0.5\\0.5")
        .string(tags::RESCALE_SLOPE, "DS", "1")
        .string(tags::RESCALE_INTERCEPT, "DS", "-1024")
        .string(tags::WINDOW_CENTER, "DS", "40")
        .string(tags::WINDOW_WIDTH, "DS", "400")
        .pixel_data_native(pixels)
}
