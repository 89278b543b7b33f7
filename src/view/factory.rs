//! View construction from elements and an image

use super::colourmap::ColourMap;
use super::view::View;
use crate::dicom::{DicomElements, Tag, tags};
use crate::image::{Image, WindowPreset};
use anyhow::{Context, Result, bail};

/// Builds the display [`View`] for a freshly created image.
#[derive(Debug, Default)]
pub struct ViewFactory;

impl ViewFactory {
    /// Wire up colour map, presets and the initial window level.
    ///
    /// MONOCHROME1 data gets the inverted grey ramp, PALETTE COLOR data
    /// the palette read from the lookup-table elements. The first named
    /// preset becomes active, minmax when none exists.
    pub fn create(elements: &DicomElements, image: Image) -> Result<View> {
        let photometric = image.photometric_interpretation().clone();
        let mut presets = image.meta().window_presets.clone();
        presets
            .entry("minmax".to_string())
            .or_insert_with(|| WindowPreset {
                perslice: false,
                levels: Vec::new(),
            });

        let mut view = View::new(image);
        view.set_window_presets(presets);

        if photometric.uses_inverted_map() {
            view.set_default_colour_map(ColourMap::inv_plain());
        } else if photometric.is_palette() {
            view.set_default_colour_map(palette_colour_map(elements)?);
        }

        let initial = view
            .window_presets()
            .keys()
            .find(|name| name.as_str() != "minmax")
            .cloned()
            .unwrap_or_else(|| "minmax".to_string());
        view.set_window_level_preset(&initial)?;

        Ok(view)
    }
}

/// Palette colour map from the lookup-table descriptor/data elements.
///
/// The descriptor is (entry count, first mapped value, bits per entry);
/// an entry count of zero means 65536.
fn palette_colour_map(elements: &DicomElements) -> Result<ColourMap> {
    let descriptor = elements
        .u16_values(tags::RED_PALETTE_DESCRIPTOR)
        .context("missing palette colour lookup table descriptor")?;
    if descriptor.len() != 3 {
        bail!(
            "palette descriptor has {len} value(s), 3 expected",
            len = descriptor.len()
        );
    }
    let entries = if descriptor[0] == 0 {
        65536
    } else {
        usize::from(descriptor[0])
    };
    let bits = descriptor[2];
    if !matches!(bits, 8 | 16) {
        bail!("unsupported palette entry width: {bits} bits");
    }

    let channel = |tag: Tag| -> Result<Vec<u16>> {
        let element = elements.element(tag).with_context(|| {
            format!("missing palette colour lookup table data {tag}")
        })?;
        let data = match &element.value {
            crate::dicom::Value::Bytes(bytes) if bits == 8 => {
                bytes.iter().map(|&b| u16::from(b)).collect()
            }
            crate::dicom::Value::Bytes(bytes) => bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect::<Vec<u16>>(),
            _ => bail!("palette colour lookup table data {tag} is not byte-valued"),
        };
        if data.len() != entries {
            bail!(
                "palette channel {tag} holds {got} entries, {entries} declared",
                got = data.len()
            );
        }
        Ok(data)
    };

    Ok(ColourMap::new(
        channel(tags::RED_PALETTE_DATA)?,
        channel(tags::GREEN_PALETTE_DATA)?,
        channel(tags::BLUE_PALETTE_DATA)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::DicomParser;
    use crate::image::ImageFactory;
    use crate::testutil::{DatasetBuilder, monochrome_builder, monochrome_dataset};

    fn view_from(buffer: &[u8]) -> Result<View> {
        let elements = DicomElements::new(DicomParser::new().parse(buffer).unwrap());
        let frames = elements.pixel_frames().unwrap().to_vec();
        let image = ImageFactory::create(&elements, &frames)?;
        ViewFactory::create(&elements, image)
    }

    #[test]
    fn test_create_applies_dataset_window_preset() {
        let mut view = view_from(&monochrome_dataset(2, 2, &[0, 500, 1024, 2000], 0.0)).unwrap();
        // the dataset carries center 40 / width 400
        let lut = view.current_window_lut();
        assert_eq!(lut.window_level().center(), 40.0);
        assert_eq!(lut.window_level().width(), 400.0);
        // the CT scenario: raw 1024 rescales to 0 and displays at 102
        assert_eq!(lut.value(1024), 102);
    }

    #[test]
    fn test_create_without_presets_falls_back_to_minmax() {
        let buffer = DatasetBuilder::new("1.2.840.10008.1.2.1")
            .string(tags::PHOTOMETRIC_INTERPRETATION, "CS", "MONOCHROME2")
            .u16s(tags::SAMPLES_PER_PIXEL, &[1])
            .u16s(tags::ROWS, &[1])
            .u16s(tags::COLUMNS, &[2])
            .u16s(tags::BITS_ALLOCATED, &[16])
            .u16s(tags::BITS_STORED, &[12])
            .u16s(tags::PIXEL_REPRESENTATION, &[0])
            .pixel_data_native(&[0, 200])
            .build();
        let mut view = view_from(&buffer).unwrap();
        let lut = view.current_window_lut();
        assert_eq!(lut.window_level().width(), 200.0);
        assert_eq!(lut.window_level().center(), 100.0);
    }

    #[test]
    fn test_create_monochrome1_gets_inverted_map() {
        let buffer = monochrome_builder(1, 2, &[0, 100], 0.0)
            .string(tags::PHOTOMETRIC_INTERPRETATION, "CS", "MONOCHROME1")
            .build();
        let view = view_from(&buffer).unwrap();
        assert_eq!(view.colour_map().red[0], 255);
        assert_eq!(view.colour_map().red[255], 0);
    }

    #[test]
    fn test_create_palette_reads_lookup_tables() {
        let buffer = DatasetBuilder::new("1.2.840.10008.1.2.1")
            .string(tags::PHOTOMETRIC_INTERPRETATION, "CS", "PALETTE COLOR")
            .u16s(tags::SAMPLES_PER_PIXEL, &[1])
            .u16s(tags::ROWS, &[1])
            .u16s(tags::COLUMNS, &[2])
            .u16s(tags::BITS_ALLOCATED, &[8])
            .u16s(tags::BITS_STORED, &[8])
            .u16s(tags::PIXEL_REPRESENTATION, &[0])
            .u16s(tags::RED_PALETTE_DESCRIPTOR, &[4, 0, 8])
            .u16s(tags::GREEN_PALETTE_DESCRIPTOR, &[4, 0, 8])
            .u16s(tags::BLUE_PALETTE_DESCRIPTOR, &[4, 0, 8])
            .bytes(tags::RED_PALETTE_DATA, "OW", &[10, 11, 12, 13])
            .bytes(tags::GREEN_PALETTE_DATA, "OW", &[20, 21, 22, 23])
            .bytes(tags::BLUE_PALETTE_DATA, "OW", &[30, 31, 32, 33])
            .pixel_data_native_bytes(&[0, 3])
            .build();
        let mut view = view_from(&buffer).unwrap();
        assert_eq!(view.colour_map().red, vec![10, 11, 12, 13]);
        let mut target = vec![0u8; 2 * 4];
        view.generate_image_data(&mut target).unwrap();
        assert_eq!(&target[..4], &[10, 20, 30, 255]);
        assert_eq!(&target[4..], &[13, 23, 33, 255]);
    }

    #[test]
    fn test_create_palette_rejects_missing_data() {
        let buffer = DatasetBuilder::new("1.2.840.10008.1.2.1")
            .string(tags::PHOTOMETRIC_INTERPRETATION, "CS", "PALETTE COLOR")
            .u16s(tags::SAMPLES_PER_PIXEL, &[1])
            .u16s(tags::ROWS, &[1])
            .u16s(tags::COLUMNS, &[1])
            .u16s(tags::BITS_ALLOCATED, &[8])
            .u16s(tags::RED_PALETTE_DESCRIPTOR, &[4, 0, 8])
            .pixel_data_native_bytes(&[0])
            .build();
        assert!(view_from(&buffer).is_err());
    }
}
