//! Per-frame decompression codecs
//!
//! One decode call turns a compressed frame into little-endian,
//! `bits_allocated`-wide samples laid out as the dataset declares
//! (interleaved or planar).

use super::DecodeError;
use super::rle;
// leading :: picks the raster crate over this crate's image module
use ::image::ImageDecoder;
use ::image::codecs::jpeg::JpegDecoder;
use std::io::Cursor;

/// Decompression algorithm, resolved from the transfer syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Rle,
    JpegBaseline,
    JpegLossless,
    Jpeg2000,
}

impl Algorithm {
    /// Resolve an algorithm name as produced by
    /// [`TransferSyntax::decompression_name`](crate::types::TransferSyntax).
    pub fn from_name(name: &str) -> Result<Self, DecodeError> {
        match name {
            "rle" => Ok(Self::Rle),
            "jpeg-baseline" => Ok(Self::JpegBaseline),
            "jpeg-lossless" => Ok(Self::JpegLossless),
            "jpeg2000" => Ok(Self::Jpeg2000),
            _ => Err(DecodeError::UnsupportedAlgorithm {
                name: name.to_string(),
            }),
        }
    }
}

/// Pixel layout metadata a decode task carries along with its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelMeta {
    pub bits_allocated: u16,
    pub is_signed: bool,
    /// Samples per component plane (rows x columns).
    pub slice_size: usize,
    pub samples_per_pixel: u16,
    pub planar_configuration: Option<u16>,
}

impl PixelMeta {
    #[inline]
    #[must_use]
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_allocated / 8).max(1)
    }

    /// Total decoded frame size in bytes.
    #[inline]
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.slice_size * usize::from(self.samples_per_pixel) * self.bytes_per_sample()
    }
}

/// Decode one compressed frame.
pub fn decode_frame(
    algorithm: Algorithm,
    bytes: &[u8],
    meta: &PixelMeta,
) -> Result<Vec<u8>, DecodeError> {
    let decoded = match algorithm {
        Algorithm::Rle => rle::decode(bytes, meta)?,
        Algorithm::JpegBaseline => decode_jpeg_baseline(bytes, meta)?,
        Algorithm::Jpeg2000 => decode_jpeg2000(bytes, meta)?,
        Algorithm::JpegLossless => {
            return Err(DecodeError::UnsupportedAlgorithm {
                name: "jpeg-lossless".to_string(),
            });
        }
    };
    if decoded.len() != meta.frame_bytes() {
        return Err(DecodeError::SizeMismatch {
            got: decoded.len(),
            expected: meta.frame_bytes(),
        });
    }
    Ok(decoded)
}

/// JPEG baseline is 8-bit by definition; samples come out interleaved.
fn decode_jpeg_baseline(bytes: &[u8], meta: &PixelMeta) -> Result<Vec<u8>, DecodeError> {
    if meta.bits_allocated != 8 {
        return Err(DecodeError::Malformed {
            algorithm: "jpeg-baseline",
            reason: format!(
                "{bits}-bit samples declared for an 8-bit codec",
                bits = meta.bits_allocated
            ),
        });
    }
    let decoder = JpegDecoder::new(Cursor::new(bytes)).map_err(|e| DecodeError::Malformed {
        algorithm: "jpeg-baseline",
        reason: e.to_string(),
    })?;
    let mut out = vec![0u8; decoder.total_bytes() as usize];
    decoder
        .read_image(&mut out)
        .map_err(|e| DecodeError::Malformed {
            algorithm: "jpeg-baseline",
            reason: e.to_string(),
        })?;
    Ok(out)
}

/// JPEG 2000 decodes to per-component planes of i32 samples; they are
/// written back as interleaved little-endian samples.
fn decode_jpeg2000(bytes: &[u8], meta: &PixelMeta) -> Result<Vec<u8>, DecodeError> {
    let image = jpeg2k::Image::from_bytes(bytes).map_err(|e| DecodeError::Malformed {
        algorithm: "jpeg2000",
        reason: e.to_string(),
    })?;
    let components = image.components();
    if components.len() != usize::from(meta.samples_per_pixel) {
        return Err(DecodeError::Malformed {
            algorithm: "jpeg2000",
            reason: format!(
                "{got} components, {expected} declared",
                got = components.len(),
                expected = meta.samples_per_pixel
            ),
        });
    }
    let bytes_per_sample = meta.bytes_per_sample();
    let samples = usize::from(meta.samples_per_pixel);
    let mut out = vec![0u8; meta.frame_bytes()];
    for (component_index, component) in components.iter().enumerate() {
        for (i, sample) in component.data().iter().enumerate() {
            let offset = (i * samples + component_index) * bytes_per_sample;
            if offset + bytes_per_sample > out.len() {
                return Err(DecodeError::Malformed {
                    algorithm: "jpeg2000",
                    reason: "component plane larger than declared frame".to_string(),
                });
            }
            out[offset..offset + bytes_per_sample]
                .copy_from_slice(&sample.to_le_bytes()[..bytes_per_sample]);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_algorithm_names() {
        assert_eq!(Algorithm::from_name("rle").unwrap(), Algorithm::Rle);
        assert_eq!(
            Algorithm::from_name("jpeg2000").unwrap(),
            Algorithm::Jpeg2000
        );
        assert_matches!(
            Algorithm::from_name("wavelet"),
            Err(DecodeError::UnsupportedAlgorithm { .. })
        );
    }

    #[test]
    fn test_jpeg_lossless_is_reported_unsupported() {
        let meta = PixelMeta {
            bits_allocated: 16,
            is_signed: false,
            slice_size: 4,
            samples_per_pixel: 1,
            planar_configuration: None,
        };
        assert_matches!(
            decode_frame(Algorithm::JpegLossless, &[0; 8], &meta),
            Err(DecodeError::UnsupportedAlgorithm { name }) if name == "jpeg-lossless"
        );
    }

    #[test]
    fn test_jpeg_baseline_rejects_16_bit() {
        let meta = PixelMeta {
            bits_allocated: 16,
            is_signed: false,
            slice_size: 4,
            samples_per_pixel: 1,
            planar_configuration: None,
        };
        assert_matches!(
            decode_frame(Algorithm::JpegBaseline, &[0; 8], &meta),
            Err(DecodeError::Malformed { .. })
        );
    }

    #[test]
    fn test_frame_bytes() {
        let meta = PixelMeta {
            bits_allocated: 16,
            is_signed: true,
            slice_size: 512 * 512,
            samples_per_pixel: 1,
            planar_configuration: None,
        };
        assert_eq!(meta.frame_bytes(), 512 * 512 * 2);
        assert_eq!(meta.bytes_per_sample(), 2);
    }
}
