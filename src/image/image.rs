//! The in-memory image entity
//!
//! A multi-frame, multi-slice sample store with per-slice rescale
//! parameters, photometric metadata and lazily computed statistics.

use super::geometry::Geometry;
use crate::dicom::PhotometricInterpretation;
use crate::types::{DataRange, RescaleSlopeAndIntercept, WindowLevel};
use std::cell::OnceCell;
use std::collections::BTreeMap;
use thiserror::Error;

/// Samples of one slice of one frame, widened to i32.
pub type SliceBuffer = Vec<i32>;

/// Orientation comparisons tolerate this much per-cosine drift.
const ORIENTATION_TOLERANCE: f64 = 0.0001;

/// A named window/level preset. Per-slice presets carry one level per
/// slice index; plain presets carry exactly one.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPreset {
    pub perslice: bool,
    pub levels: Vec<WindowLevel>,
}

impl WindowPreset {
    #[must_use]
    pub fn single(level: WindowLevel) -> Self {
        Self {
            perslice: false,
            levels: vec![level],
        }
    }

    #[must_use]
    pub fn per_slice(levels: Vec<WindowLevel>) -> Self {
        Self {
            perslice: true,
            levels,
        }
    }

    #[must_use]
    pub fn level_for_slice(&self, k: usize) -> WindowLevel {
        if self.perslice { self.levels[k] } else { self.levels[0] }
    }
}

/// Typed image metadata. Every field except `window_presets` must match
/// when appending slices from another file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMeta {
    pub modality: Option<String>,
    pub sop_class_uid: Option<String>,
    pub bits_stored: u16,
    pub is_signed: bool,
    pub frame_rate: Option<f64>,
    pub window_presets: BTreeMap<String, WindowPreset>,
}

impl ImageMeta {
    /// Name of the first non-preset field differing from `other`, if any.
    #[must_use]
    fn mismatching_field(&self, other: &Self) -> Option<&'static str> {
        if self.modality != other.modality {
            return Some("modality");
        }
        if self.sop_class_uid != other.sop_class_uid {
            return Some("SOP class UID");
        }
        if self.bits_stored != other.bits_stored {
            return Some("bits stored");
        }
        if self.is_signed != other.is_signed {
            return Some("pixel representation");
        }
        if self.frame_rate != other.frame_rate {
            return Some("frame rate");
        }
        None
    }
}

/// Errors raised by the multi-file slice append; the target image is left
/// unchanged when one is returned.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("cannot append more than one slice")]
    NotSingleSlice,

    #[error("cannot append a slice with different number of columns")]
    ColumnsMismatch,

    #[error("cannot append a slice with different number of rows")]
    RowsMismatch,

    #[error("cannot append a slice with different orientation")]
    OrientationMismatch,

    #[error("cannot append a slice with different photometric interpretation")]
    PhotometricMismatch,

    #[error("cannot append a slice with different {field}")]
    MetaMismatch { field: &'static str },

    #[error("cannot append into frame {frame}: image has {frames} frame(s)")]
    FrameOutOfBounds { frame: usize, frames: usize },
}

/// The image entity: `buffer[frame][slice]` sample arrays plus metadata.
#[derive(Debug)]
pub struct Image {
    geometry: Geometry,
    buffer: Vec<Vec<SliceBuffer>>,
    uids: Vec<String>,
    rsis: Vec<RescaleSlopeAndIntercept>,
    is_identity_rsi: bool,
    is_constant_rsi: bool,
    photometric_interpretation: PhotometricInterpretation,
    planar_configuration: u16,
    number_of_components: usize,
    meta: ImageMeta,
    // Computed once on first access and kept for the lifetime of the
    // instance; in-place RSI mutation does not invalidate them.
    data_range: OnceCell<DataRange>,
    rescaled_data_range: OnceCell<DataRange>,
    histogram: OnceCell<Vec<(i64, u64)>>,
}

impl Image {
    /// Build an image over per-frame, per-slice sample buffers. RSIs start
    /// as identity; photometric interpretation defaults to MONOCHROME2.
    #[must_use]
    pub fn new(geometry: Geometry, buffer: Vec<Vec<SliceBuffer>>, uids: Vec<String>) -> Self {
        let slices = geometry.size().slices() as usize;
        let number_of_components = buffer
            .first()
            .and_then(|frame| frame.first())
            .map_or(1, |slice| slice.len() / geometry.size().slice_size().max(1));
        Self {
            geometry,
            buffer,
            uids,
            rsis: vec![RescaleSlopeAndIntercept::identity(); slices],
            is_identity_rsi: true,
            is_constant_rsi: true,
            photometric_interpretation: PhotometricInterpretation::Monochrome2,
            planar_configuration: 0,
            number_of_components,
            meta: ImageMeta::default(),
            data_range: OnceCell::new(),
            rescaled_data_range: OnceCell::new(),
            histogram: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[must_use]
    pub fn number_of_frames(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn number_of_components(&self) -> usize {
        self.number_of_components
    }

    #[must_use]
    pub fn photometric_interpretation(&self) -> &PhotometricInterpretation {
        &self.photometric_interpretation
    }

    pub fn set_photometric_interpretation(&mut self, interpretation: PhotometricInterpretation) {
        self.photometric_interpretation = interpretation;
    }

    #[must_use]
    pub fn planar_configuration(&self) -> u16 {
        self.planar_configuration
    }

    pub fn set_planar_configuration(&mut self, configuration: u16) {
        self.planar_configuration = configuration;
    }

    #[must_use]
    pub fn meta(&self) -> &ImageMeta {
        &self.meta
    }

    #[must_use]
    pub fn meta_mut(&mut self) -> &mut ImageMeta {
        &mut self.meta
    }

    pub fn set_meta(&mut self, meta: ImageMeta) {
        self.meta = meta;
    }

    /// SOP instance UIDs indexed by slice.
    #[must_use]
    pub fn uids(&self) -> &[String] {
        &self.uids
    }

    /// Samples of one slice of one frame.
    #[must_use]
    pub fn frame_slice(&self, frame: usize, slice: usize) -> &[i32] {
        &self.buffer[frame][slice]
    }

    /// Value at a slice-buffer offset. No bounds check beyond the slice.
    #[inline]
    #[must_use]
    pub fn value_at(&self, offset: usize, slice: usize, frame: usize) -> i32 {
        self.buffer[frame][slice][offset]
    }

    /// Value at an (i, j, k) position (first component).
    #[must_use]
    pub fn value(&self, i: u32, j: u32, k: u32, frame: usize) -> i32 {
        let offset = self.geometry.index_to_slice_offset(i, j);
        self.value_at(offset, k as usize, frame)
    }

    /// Rescaled value at an (i, j, k) position.
    #[must_use]
    pub fn rescaled_value(&self, i: u32, j: u32, k: u32, frame: usize) -> f64 {
        let value = f64::from(self.value(i, j, k, frame));
        if self.is_identity_rsi {
            value
        } else {
            self.rsis[k as usize].apply(value)
        }
    }

    #[must_use]
    pub fn rescale_slope_and_intercept(&self, k: usize) -> RescaleSlopeAndIntercept {
        self.rsis[k]
    }

    /// Replace the RSI of one slice and refresh the identity/constant
    /// flags. Cached statistics are deliberately not invalidated: first
    /// access wins for the lifetime of the image.
    pub fn set_rescale_slope_and_intercept(&mut self, rsi: RescaleSlopeAndIntercept, k: usize) {
        self.rsis[k] = rsi;
        self.refresh_rsi_flags();
    }

    fn refresh_rsi_flags(&mut self) {
        self.is_identity_rsi = self.rsis.iter().all(RescaleSlopeAndIntercept::is_identity);
        self.is_constant_rsi = self.rsis.windows(2).all(|pair| pair[0] == pair[1]);
    }

    #[must_use]
    pub fn is_identity_rsi(&self) -> bool {
        self.is_identity_rsi
    }

    #[must_use]
    pub fn is_constant_rsi(&self) -> bool {
        self.is_constant_rsi
    }

    /// Append a single-slice image, keeping slices origin-ordered.
    /// Returns the inserted slice index. `self` is unchanged on error.
    pub fn append_slice(&mut self, rhs: &Image, frame: usize) -> Result<usize, MergeError> {
        let size = self.geometry.size();
        let rhs_size = rhs.geometry.size();
        if frame >= self.buffer.len() {
            return Err(MergeError::FrameOutOfBounds {
                frame,
                frames: self.buffer.len(),
            });
        }
        if rhs_size.slices() != 1 {
            return Err(MergeError::NotSingleSlice);
        }
        if size.columns() != rhs_size.columns() {
            return Err(MergeError::ColumnsMismatch);
        }
        if size.rows() != rhs_size.rows() {
            return Err(MergeError::RowsMismatch);
        }
        if !self
            .geometry
            .orientation()
            .approx_eq(&rhs.geometry.orientation(), ORIENTATION_TOLERANCE)
        {
            return Err(MergeError::OrientationMismatch);
        }
        if self.photometric_interpretation != rhs.photometric_interpretation {
            return Err(MergeError::PhotometricMismatch);
        }
        if let Some(field) = self.meta.mismatching_field(&rhs.meta) {
            return Err(MergeError::MetaMismatch { field });
        }

        let origin = rhs.geometry.origin(0);
        let index = self.geometry.slice_index(origin);

        self.buffer[frame].insert(index, rhs.buffer[0][0].clone());
        self.geometry.append_origin(origin, index);
        self.rsis.insert(index, rhs.rescale_slope_and_intercept(0));
        self.uids.insert(index, rhs.uids[0].clone());
        self.refresh_rsi_flags();

        // merge window presets: per-slice presets grow by one entry,
        // plain ones are replaced by the newcomer
        for (name, rhs_preset) in &rhs.meta.window_presets {
            match self.meta.window_presets.get_mut(name) {
                Some(preset) if preset.perslice => {
                    preset.levels.insert(index, rhs_preset.levels[0]);
                }
                _ => {
                    self.meta
                        .window_presets
                        .insert(name.clone(), rhs_preset.clone());
                }
            }
        }

        Ok(index)
    }

    /// Append a single-slice frame buffer (streaming multi-frame load).
    pub fn append_frame_buffer(&mut self, buffer: SliceBuffer) {
        self.buffer.push(vec![buffer]);
    }

    /// Replace the buffer of one frame, growing the frame list with empty
    /// placeholders as needed (out-of-order decode reassembly).
    pub fn set_frame_buffer(&mut self, frame: usize, buffer: SliceBuffer) {
        while self.buffer.len() <= frame {
            self.buffer.push(vec![Vec::new()]);
        }
        self.buffer[frame] = vec![buffer];
    }

    /// Raw sample range, first frame only, cached after the first call.
    #[must_use]
    pub fn data_range(&self) -> DataRange {
        *self.data_range.get_or_init(|| self.calculate_data_range())
    }

    fn calculate_data_range(&self) -> DataRange {
        let mut min = self.value_at(0, 0, 0);
        let mut max = min;
        for slice in &self.buffer[0] {
            for &value in slice {
                if value > max {
                    max = value;
                }
                if value < min {
                    min = value;
                }
            }
        }
        DataRange::new(f64::from(min), f64::from(max))
    }

    /// Rescaled sample range, cached after the first call. Identity RSI
    /// short-circuits to the raw range, constant RSI to a single apply.
    #[must_use]
    pub fn rescaled_data_range(&self) -> DataRange {
        *self
            .rescaled_data_range
            .get_or_init(|| self.calculate_rescaled_data_range())
    }

    fn calculate_rescaled_data_range(&self) -> DataRange {
        if self.is_identity_rsi {
            self.data_range()
        } else if self.is_constant_rsi {
            let range = self.data_range();
            let a = self.rsis[0].apply(range.min);
            let b = self.rsis[0].apply(range.max);
            DataRange::new(a.min(b), a.max(b))
        } else {
            let mut min = self.rescaled_value(0, 0, 0, 0);
            let mut max = min;
            for (k, slice) in self.buffer[0].iter().enumerate() {
                let rsi = self.rsis[k];
                for &value in slice {
                    let rescaled = rsi.apply(f64::from(value));
                    if rescaled > max {
                        max = rescaled;
                    }
                    if rescaled < min {
                        min = rescaled;
                    }
                }
            }
            DataRange::new(min, max)
        }
    }

    /// Histogram of rescaled values over all frames, binned by rounded
    /// value from floor(min) to ceil(max); cached after the first call.
    /// The same pass seeds the range caches when still empty.
    #[must_use]
    pub fn histogram(&self) -> &[(i64, u64)] {
        self.histogram.get_or_init(|| {
            let size = self.geometry.size();
            let slice_size = size.slice_size();
            let mut min = self.value_at(0, 0, 0);
            let mut max = min;
            let mut rmin = f64::INFINITY;
            let mut rmax = f64::NEG_INFINITY;
            let mut counts: BTreeMap<i64, u64> = BTreeMap::new();
            for frame in 0..self.buffer.len() {
                for (k, slice) in self.buffer[frame].iter().enumerate() {
                    let rsi = self.rsis[k];
                    for &value in slice.iter().take(slice_size) {
                        if value > max {
                            max = value;
                        }
                        if value < min {
                            min = value;
                        }
                        let rescaled = rsi.apply(f64::from(value));
                        if rescaled > rmax {
                            rmax = rescaled;
                        }
                        if rescaled < rmin {
                            rmin = rescaled;
                        }
                        *counts.entry(rescaled.round() as i64).or_insert(0) += 1;
                    }
                }
            }
            let _ = self
                .data_range
                .set(DataRange::new(f64::from(min), f64::from(max)));
            let _ = self.rescaled_data_range.set(DataRange::new(rmin, rmax));

            let lo = rmin.floor() as i64;
            let hi = rmax.ceil() as i64;
            (lo..=hi)
                .map(|bin| (bin, counts.get(&bin).copied().unwrap_or(0)))
                .collect()
        })
    }

    /// Copy of this image with the same samples and metadata but empty
    /// statistic caches.
    #[must_use]
    pub fn clone_image(&self) -> Image {
        let mut copy = Image::new(self.geometry.clone(), self.buffer.clone(), self.uids.clone());
        copy.rsis = self.rsis.clone();
        copy.is_identity_rsi = self.is_identity_rsi;
        copy.is_constant_rsi = self.is_constant_rsi;
        copy.photometric_interpretation = self.photometric_interpretation.clone();
        copy.planar_configuration = self.planar_configuration;
        copy.number_of_components = self.number_of_components;
        copy.meta = self.meta.clone();
        copy
    }

    /// Apply an operator to every raw sample, returning a new image.
    #[must_use]
    pub fn transform(&self, operator: impl Fn(i32) -> i32) -> Image {
        let mut out = self.clone_image();
        for frame in &mut out.buffer {
            for slice in frame {
                for value in slice.iter_mut() {
                    *value = operator(*value);
                }
            }
        }
        out
    }

    /// Combine with another image sample-wise, returning a new image.
    /// Buffers are assumed to have matching shapes.
    #[must_use]
    pub fn compose(&self, rhs: &Image, operator: impl Fn(i32, i32) -> i32) -> Image {
        let mut out = self.clone_image();
        for (frame_index, frame) in out.buffer.iter_mut().enumerate() {
            for (slice_index, slice) in frame.iter_mut().enumerate() {
                let other = &rhs.buffer[frame_index][slice_index];
                for (offset, value) in slice.iter_mut().enumerate() {
                    *value = operator(*value, other[offset]);
                }
            }
        }
        out
    }

    /// Convolve every slice with a 3x3 kernel, returning a new image.
    ///
    /// Borders are edge-extended: border pixels reuse the nearest interior
    /// offset pattern instead of zero padding. Striding is component- and
    /// planar-configuration-aware.
    #[must_use]
    pub fn convolute2d(&self, weights: &[f64; 9]) -> Image {
        let mut out = self.clone_image();

        let size = self.geometry.size();
        let ncols = size.columns() as i64;
        let nrows = size.rows() as i64;
        let slice_size = size.slice_size() as i64;

        // striding: interleaved components sit `factor` apart, planar
        // components one plane apart
        let (factor, component_start) = if self.number_of_components == 3 {
            if self.planar_configuration == 0 {
                (3i64, 1i64)
            } else {
                (1i64, slice_size)
            }
        } else {
            (1i64, 0i64)
        };

        // default weight offset matrix
        let off = [
            (-ncols - 1) * factor,
            -ncols * factor,
            (-ncols + 1) * factor,
            -factor,
            0,
            factor,
            (ncols - 1) * factor,
            ncols * factor,
            (ncols + 1) * factor,
        ];
        // border matrices are edge-extended from `off`
        let pick = |indices: [usize; 9]| indices.map(|i| off[i]);
        let off00 = pick([4, 4, 5, 4, 4, 5, 7, 7, 8]);
        let off0x = pick([1, 1, 2, 4, 4, 5, 7, 7, 8]);
        let off0n = pick([1, 1, 2, 4, 4, 5, 4, 4, 5]);
        let offx0 = pick([3, 4, 5, 3, 4, 5, 6, 7, 8]);
        let offxn = pick([0, 1, 2, 3, 4, 5, 3, 4, 5]);
        let offn0 = pick([3, 4, 4, 3, 4, 4, 6, 7, 7]);
        let offnx = pick([0, 1, 1, 3, 4, 4, 6, 7, 7]);
        let offnn = pick([0, 1, 1, 3, 4, 4, 3, 4, 4]);

        for (frame_index, frame) in out.buffer.iter_mut().enumerate() {
            for (slice_index, slice) in frame.iter_mut().enumerate() {
                let src = &self.buffer[frame_index][slice_index];
                for component in 0..self.number_of_components as i64 {
                    let mut pixel_offset = if factor == 3 {
                        // interleaved: start at the component's lane
                        component
                    } else {
                        component * component_start
                    };
                    for j in 0..nrows {
                        for i in 0..ncols {
                            let offsets: &[i64; 9] = match (i, j) {
                                (0, 0) => &off00,
                                (0, j) if j == nrows - 1 => &off0n,
                                (0, _) => &off0x,
                                (i, 0) if i == ncols - 1 => &offn0,
                                (i, j) if i == ncols - 1 && j == nrows - 1 => &offnn,
                                (i, _) if i == ncols - 1 => &offnx,
                                (_, 0) => &offx0,
                                (_, j) if j == nrows - 1 => &offxn,
                                _ => &off,
                            };
                            let mut value = 0.0;
                            for (w, &o) in weights.iter().zip(offsets.iter()) {
                                value += f64::from(src[(pixel_offset + o) as usize]) * w;
                            }
                            slice[pixel_offset as usize] = value.round() as i32;
                            pixel_offset += factor;
                        }
                    }
                }
            }
        }
        out
    }
}
