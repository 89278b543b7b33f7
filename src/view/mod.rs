//! Display view, lookup tables and colour maps

pub mod colourmap;
pub mod factory;
pub mod lut;
#[allow(clippy::module_inception)]
pub mod view;

pub use colourmap::ColourMap;
pub use factory::ViewFactory;
pub use lut::{RescaleLut, WindowLut};
pub use view::{Position, View, ViewEvent};
