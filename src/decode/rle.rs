//! DICOM RLE (PackBits) frame decoding
//!
//! An RLE frame starts with a 64-byte header: the number of segments
//! followed by up to 15 segment offsets, all little-endian u32. Each
//! segment is one byte plane of the samples, most significant byte first;
//! planes are PackBits-compressed independently.

use super::DecodeError;
use super::codec::PixelMeta;

const HEADER_SIZE: usize = 64;
const MAX_SEGMENTS: usize = 15;

/// Decode one RLE frame into little-endian samples, interleaved or planar
/// per the dataset's planar configuration.
pub fn decode(bytes: &[u8], meta: &PixelMeta) -> Result<Vec<u8>, DecodeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(malformed("header shorter than 64 bytes"));
    }
    let word = |i: usize| {
        u32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]])
            as usize
    };
    let segment_count = word(0);
    if segment_count == 0 || segment_count > MAX_SEGMENTS {
        return Err(malformed(&format!("invalid segment count {segment_count}")));
    }

    let bytes_per_sample = meta.bytes_per_sample();
    let samples = usize::from(meta.samples_per_pixel);
    if segment_count != samples * bytes_per_sample {
        return Err(malformed(&format!(
            "{segment_count} segments for {samples} samples of {bytes_per_sample} byte(s)"
        )));
    }

    let mut segments = Vec::with_capacity(segment_count);
    for index in 0..segment_count {
        let start = word(1 + index);
        let end = if index + 1 < segment_count {
            word(2 + index)
        } else {
            bytes.len()
        };
        if start < HEADER_SIZE || end > bytes.len() || start > end {
            return Err(malformed(&format!("segment {index} offsets out of range")));
        }
        let plane = unpack(&bytes[start..end], meta.slice_size)?;
        segments.push(plane);
    }

    // recombine byte planes, MSB segment first, into little-endian samples
    let planar = meta.planar_configuration == Some(1);
    let mut out = vec![0u8; meta.slice_size * segment_count];
    for (segment_index, plane) in segments.iter().enumerate() {
        let sample = segment_index / bytes_per_sample;
        let le_byte = bytes_per_sample - 1 - (segment_index % bytes_per_sample);
        for (pixel, &byte) in plane.iter().enumerate() {
            let offset = if planar {
                (sample * meta.slice_size + pixel) * bytes_per_sample + le_byte
            } else {
                (pixel * samples + sample) * bytes_per_sample + le_byte
            };
            out[offset] = byte;
        }
    }
    Ok(out)
}

/// PackBits expansion of one segment to exactly `expected` bytes.
fn unpack(segment: &[u8], expected: usize) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(expected);
    let mut pos = 0;
    while pos < segment.len() && out.len() < expected {
        let control = segment[pos] as i8;
        pos += 1;
        if control >= 0 {
            let count = control as usize + 1;
            if pos + count > segment.len() {
                return Err(malformed("literal run past segment end"));
            }
            out.extend_from_slice(&segment[pos..pos + count]);
            pos += count;
        } else if control != -128 {
            let count = 1 - control as isize;
            let Some(&byte) = segment.get(pos) else {
                return Err(malformed("replicate run past segment end"));
            };
            pos += 1;
            out.extend(std::iter::repeat_n(byte, count as usize));
        }
        // -128 is a no-op by specification
    }
    if out.len() != expected {
        return Err(malformed(&format!(
            "segment expanded to {got} bytes, {expected} expected",
            got = out.len()
        )));
    }
    Ok(out)
}

fn malformed(reason: &str) -> DecodeError {
    DecodeError::Malformed {
        algorithm: "rle",
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// PackBits-encode a plane as literal runs (good enough for tests).
    fn encode_literal(plane: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in plane.chunks(128) {
            out.push((chunk.len() - 1) as u8);
            out.extend_from_slice(chunk);
        }
        out
    }

    fn frame(segments: &[Vec<u8>]) -> Vec<u8> {
        let mut header = vec![0u8; HEADER_SIZE];
        header[..4].copy_from_slice(&(segments.len() as u32).to_le_bytes());
        let mut body = Vec::new();
        let mut offset = HEADER_SIZE;
        for (i, seg) in segments.iter().enumerate() {
            header[(1 + i) * 4..(2 + i) * 4].copy_from_slice(&(offset as u32).to_le_bytes());
            body.extend_from_slice(seg);
            offset += seg.len();
        }
        header.extend_from_slice(&body);
        header
    }

    fn meta(bits: u16, samples: u16, slice_size: usize, planar: Option<u16>) -> PixelMeta {
        PixelMeta {
            bits_allocated: bits,
            is_signed: false,
            slice_size,
            samples_per_pixel: samples,
            planar_configuration: planar,
        }
    }

    #[test]
    fn test_decode_8bit_literal() {
        let plane = vec![1u8, 2, 3, 4];
        let bytes = frame(&[encode_literal(&plane)]);
        let out = decode(&bytes, &meta(8, 1, 4, None)).unwrap();
        assert_eq!(out, plane);
    }

    #[test]
    fn test_decode_replicate_run() {
        // control -3 replicates the next byte 4 times
        let seg = vec![(-3i8) as u8, 0xAB];
        let bytes = frame(&[seg]);
        let out = decode(&bytes, &meta(8, 1, 4, None)).unwrap();
        assert_eq!(out, vec![0xAB; 4]);
    }

    #[test]
    fn test_decode_16bit_msb_lsb_recombination() {
        // samples 0x0102 and 0x0304: MSB plane [01, 03], LSB plane [02, 04]
        let msb = encode_literal(&[0x01, 0x03]);
        let lsb = encode_literal(&[0x02, 0x04]);
        let bytes = frame(&[msb, lsb]);
        let out = decode(&bytes, &meta(16, 1, 2, None)).unwrap();
        // little-endian samples
        assert_eq!(out, vec![0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn test_decode_rgb_interleaved_and_planar() {
        let r = encode_literal(&[10, 11]);
        let g = encode_literal(&[20, 21]);
        let b = encode_literal(&[30, 31]);
        let bytes = frame(&[r.clone(), g.clone(), b.clone()]);

        let out = decode(&bytes, &meta(8, 3, 2, Some(0))).unwrap();
        assert_eq!(out, vec![10, 20, 30, 11, 21, 31]);

        let bytes = frame(&[r, g, b]);
        let out = decode(&bytes, &meta(8, 3, 2, Some(1))).unwrap();
        assert_eq!(out, vec![10, 11, 20, 21, 30, 31]);
    }

    #[test]
    fn test_decode_rejects_wrong_segment_count() {
        let bytes = frame(&[encode_literal(&[1, 2])]);
        // 16-bit mono needs two segments
        assert!(decode(&bytes, &meta(16, 1, 2, None)).is_err());
    }

    #[test]
    fn test_decode_rejects_short_segment() {
        let bytes = frame(&[encode_literal(&[1, 2])]);
        assert!(decode(&bytes, &meta(8, 1, 4, None)).is_err());
    }
}
