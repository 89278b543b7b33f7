//! Image construction from parsed elements and per-frame pixel buffers

use super::geometry::{Geometry, Orientation, Spacing};
use super::image::{Image, ImageMeta, SliceBuffer, WindowPreset};
use crate::dicom::{DicomElements, PhotometricInterpretation, tags};
use crate::types::{RescaleSlopeAndIntercept, WindowLevel};
use anyhow::{Context, Result, bail};
use log::warn;
use std::str::FromStr;

/// Builds [`Image`] values out of an element accessor and decoded
/// per-frame buffers.
#[derive(Debug, Default)]
pub struct ImageFactory;

impl ImageFactory {
    /// Derive geometry, rescale parameters and metadata from the elements
    /// and widen the frame buffers into the image sample store.
    ///
    /// # Errors
    ///
    /// Fails on missing size elements, unsupported bit depths, or frame
    /// buffers inconsistent with the declared layout.
    pub fn create(elements: &DicomElements, frames: &[Vec<u8>]) -> Result<Image> {
        let columns = elements
            .u16_value(tags::COLUMNS)
            .context("missing Columns")?;
        let rows = elements.u16_value(tags::ROWS).context("missing Rows")?;
        if columns == 0 || rows == 0 {
            bail!("degenerate image size {columns}x{rows}");
        }

        let bits_allocated = elements
            .u16_value(tags::BITS_ALLOCATED)
            .context("missing BitsAllocated")?;
        let bits_stored = elements
            .u16_value(tags::BITS_STORED)
            .unwrap_or(bits_allocated);
        let is_signed = elements
            .u16_value(tags::PIXEL_REPRESENTATION)
            .unwrap_or(0)
            == 1;
        let samples_per_pixel = elements.u16_value(tags::SAMPLES_PER_PIXEL).unwrap_or(1);
        let planar_configuration = elements.u16_value(tags::PLANAR_CONFIGURATION).unwrap_or(0);

        let photometric_interpretation = elements
            .str_value(tags::PHOTOMETRIC_INTERPRETATION)
            .map(|s| PhotometricInterpretation::from_str(s).expect("infallible"))
            .unwrap_or(PhotometricInterpretation::Monochrome2);

        validate_pixel_module(
            &photometric_interpretation,
            samples_per_pixel,
            planar_configuration,
            bits_allocated,
        )?;

        let geometry = derive_geometry(elements, columns, rows);
        let slice_size = geometry.size().slice_size();
        let expected = slice_size * usize::from(samples_per_pixel) * usize::from(bits_allocated / 8);

        let mut buffer: Vec<Vec<SliceBuffer>> = Vec::with_capacity(frames.len());
        for (index, frame) in frames.iter().enumerate() {
            // odd-sized frames carry one even-padding byte
            if frame.len() < expected || frame.len() > expected + 1 {
                bail!(
                    "frame {index} holds {got} bytes, {expected} expected for {columns}x{rows}",
                    got = frame.len()
                );
            }
            buffer.push(vec![widen_samples(
                &frame[..expected],
                bits_allocated,
                is_signed,
            )]);
        }

        let uid = elements
            .str_value(tags::SOP_INSTANCE_UID)
            .unwrap_or_default()
            .to_string();
        let mut image = Image::new(geometry, buffer, vec![uid]);

        if image.number_of_components() != usize::from(samples_per_pixel) {
            bail!(
                "buffer yields {got} component(s), SamplesPerPixel declares {samples_per_pixel}",
                got = image.number_of_components()
            );
        }

        image.set_photometric_interpretation(photometric_interpretation);
        image.set_planar_configuration(planar_configuration);

        let slope = elements.f64_value(tags::RESCALE_SLOPE).unwrap_or(1.0);
        let intercept = elements.f64_value(tags::RESCALE_INTERCEPT).unwrap_or(0.0);
        image.set_rescale_slope_and_intercept(
            RescaleSlopeAndIntercept::new(slope, intercept),
            0,
        );

        let mut meta = ImageMeta {
            modality: elements.str_value(tags::MODALITY).map(str::to_string),
            sop_class_uid: elements.str_value(tags::SOP_CLASS_UID).map(str::to_string),
            bits_stored,
            is_signed,
            frame_rate: elements.f64_value(tags::RECOMMENDED_DISPLAY_FRAME_RATE),
            window_presets: Default::default(),
        };
        collect_window_presets(elements, &mut meta);
        image.set_meta(meta);

        Ok(image)
    }
}

/// Pixel module consistency checks.
fn validate_pixel_module(
    photometric_interpretation: &PhotometricInterpretation,
    samples_per_pixel: u16,
    planar_configuration: u16,
    bits_allocated: u16,
) -> Result<()> {
    if usize::from(samples_per_pixel) != photometric_interpretation.components() {
        bail!(
            "inconsistent photometric interpretation {photometric_interpretation} \
             with samples per pixel {samples_per_pixel}"
        );
    }
    if planar_configuration != 0 && samples_per_pixel == 1 {
        bail!("planar configuration is only meaningful for multi-component data");
    }
    if !matches!(bits_allocated, 8 | 16) {
        bail!("unsupported bits allocated: {bits_allocated} (expected 8 or 16)");
    }
    Ok(())
}

/// Geometry from the spatial elements, with identity defaults.
fn derive_geometry(elements: &DicomElements, columns: u16, rows: u16) -> Geometry {
    let origin = elements
        .f64_values(tags::IMAGE_POSITION_PATIENT)
        .and_then(|v| <[f64; 3]>::try_from(v).ok())
        .unwrap_or([0.0, 0.0, 0.0]);
    let orientation = elements
        .f64_values(tags::IMAGE_ORIENTATION_PATIENT)
        .and_then(|v| <[f64; 6]>::try_from(v).ok())
        .map(Orientation::new)
        .unwrap_or_default();
    // PixelSpacing is (row spacing, column spacing)
    let (row_spacing, column_spacing) = elements
        .f64_values(tags::PIXEL_SPACING)
        .and_then(|v| (v.len() == 2).then(|| (v[0], v[1])))
        .unwrap_or((1.0, 1.0));
    let slice_spacing = elements
        .f64_value(tags::SPACING_BETWEEN_SLICES)
        .or_else(|| elements.f64_value(tags::SLICE_THICKNESS))
        .unwrap_or(1.0);
    Geometry::new(
        origin,
        orientation,
        Spacing::new(column_spacing, row_spacing, slice_spacing),
        u32::from(columns),
        u32::from(rows),
    )
}

/// Widen raw little-endian bytes into i32 samples.
pub(crate) fn widen_samples(bytes: &[u8], bits_allocated: u16, is_signed: bool) -> SliceBuffer {
    match (bits_allocated, is_signed) {
        (8, false) => bytes.iter().map(|&b| i32::from(b)).collect(),
        (8, true) => bytes.iter().map(|&b| i32::from(b as i8)).collect(),
        (16, false) => bytes
            .chunks_exact(2)
            .map(|c| i32::from(u16::from_le_bytes([c[0], c[1]])))
            .collect(),
        (16, true) => bytes
            .chunks_exact(2)
            .map(|c| i32::from(i16::from_le_bytes([c[0], c[1]])))
            .collect(),
        _ => unreachable!("bits allocated validated earlier"),
    }
}

/// Window presets from WindowCenter/WindowWidth, one preset per pair,
/// named from the explanation element when present.
fn collect_window_presets(elements: &DicomElements, meta: &mut ImageMeta) {
    let Some(centers) = elements.f64_values(tags::WINDOW_CENTER) else {
        return;
    };
    let Some(widths) = elements.f64_values(tags::WINDOW_WIDTH) else {
        return;
    };
    let names = elements.string_values(tags::WINDOW_CENTER_WIDTH_EXPLANATION);
    for (index, (&center, &width)) in centers.iter().zip(widths.iter()).enumerate() {
        if width < 1.0 {
            warn!("dropping window preset {index} with width {width}");
            continue;
        }
        let name = names
            .and_then(|n| n.get(index))
            .filter(|n| !n.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("Default{index}", index = index + 1));
        meta.window_presets
            .insert(name, WindowPreset::single(WindowLevel::new(center, width)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::DicomParser;
    use crate::testutil::{DatasetBuilder, monochrome_builder, monochrome_dataset};

    fn parse(buffer: &[u8]) -> DicomElements {
        DicomElements::new(DicomParser::new().parse(buffer).unwrap())
    }

    fn create(buffer: &[u8]) -> Result<Image> {
        let elements = parse(buffer);
        let frames = elements.pixel_frames().unwrap().to_vec();
        ImageFactory::create(&elements, &frames)
    }

    #[test]
    fn test_create_monochrome_image() {
        let image = create(&monochrome_dataset(2, 2, &[0, 1, 2, 1024], 12.5)).unwrap();
        assert_eq!(image.geometry().size().slices(), 1);
        assert_eq!(image.geometry().size().slice_size(), 4);
        assert_eq!(image.number_of_components(), 1);
        assert_eq!(
            image.photometric_interpretation(),
            &PhotometricInterpretation::Monochrome2
        );
        assert_eq!(image.value(1, 1, 0, 0), 1024);
        // slope 1, intercept -1024
        assert_eq!(image.rescaled_value(1, 1, 0, 0), 0.0);
        assert_eq!(image.meta().bits_stored, 16);
        assert_eq!(image.meta().modality.as_deref(), Some("CT"));
        assert_eq!(image.geometry().origin(0), [0.0, 0.0, 12.5]);
        assert_eq!(image.geometry().spacing().column, 0.5);
    }

    #[test]
    fn test_create_collects_window_presets() {
        let image = create(&monochrome_dataset(1, 1, &[0], 0.0)).unwrap();
        let presets = &image.meta().window_presets;
        assert_eq!(presets.len(), 1);
        let preset = presets.values().next().unwrap();
        assert_eq!(preset.levels[0].center(), 40.0);
        assert_eq!(preset.levels[0].width(), 400.0);
    }

    #[test]
    fn test_create_rgb_image_component_count() {
        let buffer = DatasetBuilder::new("1.2.840.10008.1.2.1")
            .string(tags::PHOTOMETRIC_INTERPRETATION, "CS", "RGB")
            .u16s(tags::SAMPLES_PER_PIXEL, &[3])
            .u16s(tags::PLANAR_CONFIGURATION, &[0])
            .u16s(tags::ROWS, &[1])
            .u16s(tags::COLUMNS, &[2])
            .u16s(tags::BITS_ALLOCATED, &[8])
            .u16s(tags::BITS_STORED, &[8])
            .u16s(tags::PIXEL_REPRESENTATION, &[0])
            .pixel_data_native_bytes(&[255, 0, 0, 0, 255, 0])
            .build();
        let image = create(&buffer).unwrap();
        assert_eq!(image.number_of_components(), 3);
        assert_eq!(image.planar_configuration(), 0);
        assert_eq!(image.frame_slice(0, 0), &[255, 0, 0, 0, 255, 0]);
    }

    #[test]
    fn test_create_signed_samples() {
        let buffer = monochrome_builder(1, 2, &[0xFFFF, 0x8000], 0.0)
            .u16s(tags::PIXEL_REPRESENTATION, &[1])
            .build();
        let image = create(&buffer).unwrap();
        assert_eq!(image.frame_slice(0, 0), &[-1, -32768]);
        assert!(image.meta().is_signed);
    }

    #[test]
    fn test_create_rejects_inconsistent_samples() {
        let buffer = monochrome_builder(1, 1, &[0], 0.0)
            .u16s(tags::SAMPLES_PER_PIXEL, &[3])
            .build();
        assert!(create(&buffer).is_err());
    }

    #[test]
    fn test_create_rejects_wrong_frame_size() {
        let elements = parse(&monochrome_dataset(2, 2, &[0, 1, 2, 3], 0.0));
        let frames = vec![vec![0u8; 3]];
        assert!(ImageFactory::create(&elements, &frames).is_err());
    }

    #[test]
    fn test_create_rejects_missing_rows() {
        let buffer = DatasetBuilder::new("1.2.840.10008.1.2.1")
            .u16s(tags::COLUMNS, &[2])
            .u16s(tags::BITS_ALLOCATED, &[8])
            .pixel_data_native_bytes(&[0, 0])
            .build();
        assert!(create(&buffer).is_err());
    }
}
