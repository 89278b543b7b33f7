//! Image entity, geometry and construction

pub mod factory;
pub mod geometry;
#[allow(clippy::module_inception)]
pub mod image;

pub use factory::ImageFactory;
pub use geometry::{Geometry, Orientation, Size, Spacing};
pub use image::{Image, ImageMeta, MergeError, SliceBuffer, WindowPreset};
