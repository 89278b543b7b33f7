//! DICOM byte stream parsing
//!
//! Decodes a raw buffer into a flat, stream-ordered element dictionary.
//! Both explicit and implicit VR encodings and both byte orders are
//! supported, selected by the transfer syntax read from the file meta
//! group. Pixel data is always returned as per-frame byte buffers,
//! reassembled from fragments when the payload is encapsulated.

use super::charset::CharacterSet;
use super::error::ParseError;
use super::tag::{Tag, tags};
use super::value::{DicomDataSet, RawElement, Value};
use super::vr::{Vr, implicit_vr};
use crate::types::TransferSyntax;
use log::debug;

/// Length value marking undefined-length elements and items.
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Size of the preamble plus the DICM magic word.
const HEADER_SIZE: usize = 132;

/// DICOM stream parser.
///
/// Holds the caller-supplied default character set; one parser can decode
/// any number of buffers.
#[derive(Debug, Default)]
pub struct DicomParser {
    default_character_set: CharacterSet,
}

impl DicomParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the character set used for text elements until the stream
    /// declares its own. Unrecognized labels keep the DICOM default.
    pub fn set_default_character_set(&mut self, label: &str) {
        self.default_character_set = CharacterSet::default().switch_to(label);
    }

    /// Parse a whole DICOM buffer into an element dictionary.
    pub fn parse(&self, buffer: &[u8]) -> Result<DicomDataSet, ParseError> {
        if buffer.len() < HEADER_SIZE {
            return Err(ParseError::Truncated {
                offset: buffer.len(),
                needed: HEADER_SIZE - buffer.len(),
            });
        }
        if &buffer[128..132] != b"DICM" {
            return Err(ParseError::InvalidMagic);
        }

        let mut dataset = DicomDataSet::new();
        let mut ctx = ParseContext {
            reader: Reader::new(buffer, HEADER_SIZE),
            explicit: true,
            charset: self.default_character_set,
        };

        // File meta group: always explicit VR little endian.
        while ctx.reader.peek_group() == Some(0x0002) {
            let element = ctx.read_element(&dataset)?;
            dataset.insert(element);
        }

        // The transfer syntax selects the encoding of the rest.
        let syntax = transfer_syntax(&dataset)?;
        debug!("parsing data set with transfer syntax {syntax}");
        ctx.explicit = !syntax.is_implicit_vr();
        ctx.reader.big_endian = syntax.is_big_endian();

        ctx.parse_into(&mut dataset, None, None)?;
        Ok(dataset)
    }
}

/// Resolve the parsed TransferSyntaxUID element.
fn transfer_syntax(dataset: &DicomDataSet) -> Result<TransferSyntax, ParseError> {
    let element = dataset
        .get(tags::TRANSFER_SYNTAX_UID)
        .ok_or(ParseError::MissingElement {
            tag: tags::TRANSFER_SYNTAX_UID,
        })?;
    let uid = element.first_string().ok_or_else(|| ParseError::InvalidValue {
        tag: tags::TRANSFER_SYNTAX_UID,
        reason: "empty value".to_string(),
    })?;
    TransferSyntax::from_uid(uid).ok_or_else(|| ParseError::UnsupportedTransferSyntax {
        uid: uid.to_string(),
    })
}

/// Byte cursor over the input buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self {
            buf,
            pos,
            big_endian: false,
        }
    }

    #[inline]
    fn has_more(&self) -> bool {
        self.pos < self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        let remaining = self.buf.len() - self.pos;
        if n > remaining {
            return Err(ParseError::Truncated {
                offset: self.pos,
                needed: n - remaining,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, ParseError> {
        let bytes = self.take(2)?;
        Ok(if self.big_endian {
            u16::from_be_bytes([bytes[0], bytes[1]])
        } else {
            u16::from_le_bytes([bytes[0], bytes[1]])
        })
    }

    fn read_u32(&mut self) -> Result<u32, ParseError> {
        let bytes = self.take(4)?;
        Ok(if self.big_endian {
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        } else {
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        })
    }

    fn read_tag(&mut self) -> Result<Tag, ParseError> {
        let group = self.read_u16()?;
        let element = self.read_u16()?;
        Ok(Tag::new(group, element))
    }

    /// Group number of the next element, without advancing. File meta
    /// elements are little endian regardless of the main byte order.
    fn peek_group(&self) -> Option<u16> {
        if self.pos + 2 > self.buf.len() {
            return None;
        }
        Some(u16::from_le_bytes([self.buf[self.pos], self.buf[self.pos + 1]]))
    }
}

/// Parsing state: cursor, active encoding and active character set.
struct ParseContext<'a> {
    reader: Reader<'a>,
    explicit: bool,
    charset: CharacterSet,
}

impl ParseContext<'_> {
    /// Parse elements into `dataset` until the buffer end, the `end`
    /// offset, or a `stop` delimiter tag (consumed together with its
    /// length) is reached.
    fn parse_into(
        &mut self,
        dataset: &mut DicomDataSet,
        end: Option<usize>,
        stop: Option<Tag>,
    ) -> Result<(), ParseError> {
        loop {
            if let Some(end) = end
                && self.reader.pos >= end
            {
                return Ok(());
            }
            if !self.reader.has_more() {
                return Ok(());
            }
            let tag = self.reader.read_tag()?;
            if Some(tag) == stop {
                self.reader.read_u32()?;
                return Ok(());
            }
            if tag.is_delimiter() {
                return Err(ParseError::InvalidValue {
                    tag,
                    reason: "unexpected delimitation item".to_string(),
                });
            }
            let element = self.read_element_body(tag, dataset)?;
            dataset.insert(element);
        }
    }

    /// Read one element, tag included.
    fn read_element(&mut self, dataset: &DicomDataSet) -> Result<RawElement, ParseError> {
        let tag = self.reader.read_tag()?;
        self.read_element_body(tag, dataset)
    }

    /// Read VR, length and value of the element whose tag was just read.
    fn read_element_body(
        &mut self,
        tag: Tag,
        dataset: &DicomDataSet,
    ) -> Result<RawElement, ParseError> {
        let (vr, length) = if self.explicit {
            let offset = self.reader.pos;
            let code = self.reader.take(2)?;
            let code = [code[0], code[1]];
            let vr = Vr::from_bytes(code).ok_or_else(|| ParseError::UnsupportedVr {
                vr: String::from_utf8_lossy(&code).into_owned(),
                offset,
            })?;
            let length = if vr.uses_long_header() {
                self.reader.take(2)?; // reserved
                self.reader.read_u32()?
            } else {
                u32::from(self.reader.read_u16()?)
            };
            (vr, length)
        } else {
            (implicit_vr(tag), self.reader.read_u32()?)
        };

        let value = if tag == tags::PIXEL_DATA && length == UNDEFINED_LENGTH {
            Value::PixelFrames(self.read_encapsulated_frames(dataset)?)
        } else if tag == tags::PIXEL_DATA {
            let bytes = self.reader.take(length as usize)?.to_vec();
            Value::PixelFrames(split_native_frames(
                bytes,
                dataset,
                vr,
                self.reader.big_endian,
            )?)
        } else if vr == Vr::Sq || length == UNDEFINED_LENGTH {
            // undefined-length UN elements hold an implicitly encoded
            // sequence as well
            Value::Sequence(self.read_sequence(length)?)
        } else {
            let bytes = self.reader.take(length as usize)?;
            self.decode_value(vr, bytes)
        };

        if tag == tags::SPECIFIC_CHARACTER_SET
            && let Value::Strings(terms) = &value
        {
            self.charset = self.charset.switch_to(terms.first().map_or("", String::as_str));
        }

        Ok(RawElement {
            tag,
            vr,
            length,
            value,
        })
    }

    /// Decode a primitive (non-sequence, non-pixel) value.
    fn decode_value(&self, vr: Vr, bytes: &[u8]) -> Value {
        let be = self.reader.big_endian;
        match vr {
            Vr::Us => Value::Ints(chunk2(bytes, be).map(i64::from).collect()),
            Vr::Ss => Value::Ints(
                chunk2(bytes, be).map(|v| i64::from(v as i16)).collect(),
            ),
            Vr::Ul => Value::Ints(chunk4(bytes, be).map(i64::from).collect()),
            Vr::Sl => Value::Ints(
                chunk4(bytes, be).map(|v| i64::from(v as i32)).collect(),
            ),
            Vr::At => Value::Ints(
                chunk2(bytes, be)
                    .collect::<Vec<_>>()
                    .chunks_exact(2)
                    .map(|pair| (i64::from(pair[0]) << 16) | i64::from(pair[1]))
                    .collect(),
            ),
            Vr::Fl => Value::Floats(
                chunk4(bytes, be).map(|v| f64::from(f32::from_bits(v))).collect(),
            ),
            Vr::Fd => Value::Floats(
                bytes
                    .chunks_exact(8)
                    .map(|c| {
                        let raw = [c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]];
                        if be {
                            f64::from_be_bytes(raw)
                        } else {
                            f64::from_le_bytes(raw)
                        }
                    })
                    .collect(),
            ),
            Vr::Ob | Vr::Un => Value::Bytes(bytes.to_vec()),
            // word-valued buffers are normalized to little endian once,
            // so downstream consumers never re-check the byte order
            Vr::Ow => Value::Bytes(normalize_words(bytes, 2, be)),
            Vr::Of => Value::Bytes(normalize_words(bytes, 4, be)),
            _ => {
                let text = if vr.is_charset_sensitive() {
                    self.charset.decode(bytes)
                } else {
                    CharacterSet::Ascii.decode(bytes)
                };
                Value::Strings(
                    text.split('\\')
                        .map(|part| part.trim_matches(['\0', ' ']).to_string())
                        .collect(),
                )
            }
        }
    }

    /// Parse sequence items, defined or undefined length.
    fn read_sequence(&mut self, length: u32) -> Result<Vec<DicomDataSet>, ParseError> {
        let mut items = Vec::new();
        if length == UNDEFINED_LENGTH {
            while let Some(item) = self.read_item()? {
                items.push(item);
            }
        } else {
            let end = self.reader.pos + length as usize;
            while self.reader.pos < end {
                match self.read_item()? {
                    Some(item) => items.push(item),
                    None => break,
                }
            }
        }
        Ok(items)
    }

    /// Read one sequence item; `None` on the sequence delimitation item.
    fn read_item(&mut self) -> Result<Option<DicomDataSet>, ParseError> {
        let tag = self.reader.read_tag()?;
        if tag == tags::SEQUENCE_DELIMITATION {
            self.reader.read_u32()?;
            return Ok(None);
        }
        if tag != tags::ITEM {
            return Err(ParseError::InvalidValue {
                tag,
                reason: "expected sequence item".to_string(),
            });
        }
        let length = self.reader.read_u32()?;
        let mut item = DicomDataSet::new();
        if length == UNDEFINED_LENGTH {
            self.parse_into(&mut item, None, Some(tags::ITEM_DELIMITATION))?;
        } else {
            let end = self.reader.pos + length as usize;
            self.parse_into(&mut item, Some(end), None)?;
        }
        Ok(Some(item))
    }

    /// Reassemble encapsulated pixel data fragments into per-frame buffers.
    ///
    /// The first item is the Basic Offset Table. Non-empty offsets delimit
    /// frames (a frame may span fragments); with an empty table, fragments
    /// map to frames one to one, or concatenate when a single frame is
    /// declared.
    fn read_encapsulated_frames(
        &mut self,
        dataset: &DicomDataSet,
    ) -> Result<Vec<Vec<u8>>, ParseError> {
        let tag = self.reader.read_tag()?;
        if tag != tags::ITEM {
            return Err(ParseError::InvalidValue {
                tag: tags::PIXEL_DATA,
                reason: "encapsulated data does not start with an offset table item".to_string(),
            });
        }
        let bot_length = self.reader.read_u32()? as usize;
        let bot_bytes = self.reader.take(bot_length)?;
        let offsets: Vec<usize> = bot_bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as usize)
            .collect();

        // fragment start offsets as the offset table counts them:
        // from the first byte after the table, item headers included
        let mut fragments: Vec<(usize, Vec<u8>)> = Vec::new();
        let mut running = 0usize;
        loop {
            let tag = self.reader.read_tag()?;
            if tag == tags::SEQUENCE_DELIMITATION {
                self.reader.read_u32()?;
                break;
            }
            if tag != tags::ITEM {
                return Err(ParseError::InvalidValue {
                    tag: tags::PIXEL_DATA,
                    reason: "expected pixel data fragment item".to_string(),
                });
            }
            let length = self.reader.read_u32()? as usize;
            let bytes = self.reader.take(length)?.to_vec();
            fragments.push((running, bytes));
            running += 8 + length;
        }

        if !offsets.is_empty() {
            let mut frames = Vec::with_capacity(offsets.len());
            for (index, &start) in offsets.iter().enumerate() {
                let end = offsets.get(index + 1).copied().unwrap_or(usize::MAX);
                let mut frame = Vec::new();
                for (offset, bytes) in &fragments {
                    if *offset >= start && *offset < end {
                        frame.extend_from_slice(bytes);
                    }
                }
                frames.push(frame);
            }
            return Ok(frames);
        }

        let frame_count = dataset
            .get(tags::NUMBER_OF_FRAMES)
            .and_then(RawElement::first_int)
            .unwrap_or(1)
            .max(1) as usize;
        if frame_count == 1 {
            let mut frame = Vec::new();
            for (_, bytes) in fragments {
                frame.extend_from_slice(&bytes);
            }
            Ok(vec![frame])
        } else if fragments.len() == frame_count {
            Ok(fragments.into_iter().map(|(_, bytes)| bytes).collect())
        } else {
            Err(ParseError::InvalidValue {
                tag: tags::PIXEL_DATA,
                reason: format!(
                    "cannot group {fragment_count} fragments into {frame_count} frames without an offset table",
                    fragment_count = fragments.len()
                ),
            })
        }
    }
}

/// Split a native pixel data buffer into per-frame buffers, normalizing
/// word order to little endian.
fn split_native_frames(
    bytes: Vec<u8>,
    dataset: &DicomDataSet,
    vr: Vr,
    big_endian: bool,
) -> Result<Vec<Vec<u8>>, ParseError> {
    let bytes = if big_endian && vr == Vr::Ow {
        normalize_words(&bytes, 2, true)
    } else {
        bytes
    };

    let frame_count = dataset
        .get(tags::NUMBER_OF_FRAMES)
        .and_then(RawElement::first_int)
        .unwrap_or(1)
        .max(1) as usize;
    if frame_count == 1 {
        return Ok(vec![bytes]);
    }

    let get_u16 = |tag: Tag| {
        dataset
            .get(tag)
            .and_then(RawElement::first_int)
            .ok_or(ParseError::MissingElement { tag })
    };
    let rows = get_u16(tags::ROWS)? as usize;
    let columns = get_u16(tags::COLUMNS)? as usize;
    let samples = dataset
        .get(tags::SAMPLES_PER_PIXEL)
        .and_then(RawElement::first_int)
        .unwrap_or(1) as usize;
    let bits = dataset
        .get(tags::BITS_ALLOCATED)
        .and_then(RawElement::first_int)
        .unwrap_or(8) as usize;

    let frame_size = rows * columns * samples * (bits / 8).max(1);
    if bytes.len() < frame_count * frame_size {
        return Err(ParseError::InvalidValue {
            tag: tags::PIXEL_DATA,
            reason: format!(
                "buffer holds {have} bytes, {frame_count} frames of {frame_size} expected",
                have = bytes.len()
            ),
        });
    }
    Ok(bytes
        .chunks(frame_size)
        .take(frame_count)
        .map(<[u8]>::to_vec)
        .collect())
}

fn chunk2(bytes: &[u8], big_endian: bool) -> impl Iterator<Item = u16> + '_ {
    bytes.chunks_exact(2).map(move |c| {
        if big_endian {
            u16::from_be_bytes([c[0], c[1]])
        } else {
            u16::from_le_bytes([c[0], c[1]])
        }
    })
}

fn chunk4(bytes: &[u8], big_endian: bool) -> impl Iterator<Item = u32> + '_ {
    bytes.chunks_exact(4).map(move |c| {
        if big_endian {
            u32::from_be_bytes([c[0], c[1], c[2], c[3]])
        } else {
            u32::from_le_bytes([c[0], c[1], c[2], c[3]])
        }
    })
}

/// Swap `word_size`-byte groups to little endian when the source is big
/// endian; pass through otherwise.
fn normalize_words(bytes: &[u8], word_size: usize, big_endian: bool) -> Vec<u8> {
    if !big_endian {
        return bytes.to_vec();
    }
    let mut out = bytes.to_vec();
    for word in out.chunks_exact_mut(word_size) {
        word.reverse();
    }
    out
}
