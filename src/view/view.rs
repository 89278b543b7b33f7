//! The display view over an image
//!
//! Holds the window LUT cache (one LUT per RSI signature), the colour map,
//! the cursor (position and frame) and the per-photometric-interpretation
//! display buffer generator. State changes notify typed listeners.

use super::colourmap::ColourMap;
use super::lut::{RescaleLut, WindowLut};
use crate::image::{Image, MergeError, WindowPreset};
use crate::types::WindowLevel;
use anyhow::{Result, anyhow, bail};
use log::warn;
use std::collections::{BTreeMap, HashMap};

/// Cursor position in volume indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub i: u32,
    pub j: u32,
    pub k: u32,
}

/// Typed view notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    WindowWidthChange {
        center: f64,
        width: f64,
        /// Set when a per-slice preset swapped levels during LUT
        /// resolution; regeneration would be redundant.
        skip_generate: bool,
    },
    WindowCenterChange {
        center: f64,
        width: f64,
        skip_generate: bool,
    },
    WindowPresetAdd {
        name: String,
    },
    ColourChange,
    PositionChange {
        i: u32,
        j: u32,
        k: u32,
        /// Rescaled sample value, for monochrome data only.
        value: Option<f64>,
    },
    SliceChange {
        k: u32,
        uid: String,
    },
    FrameChange {
        frame: usize,
    },
}

type Listener = Box<dyn FnMut(&ViewEvent)>;

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("window_presets", &self.window_presets)
            .field("current_preset", &self.current_preset)
            .field("current_wl", &self.current_wl)
            .field("position", &self.position)
            .field("frame", &self.frame)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

/// Display state over one image.
pub struct View {
    image: Image,
    window_luts: HashMap<String, WindowLut>,
    window_presets: BTreeMap<String, WindowPreset>,
    current_preset: Option<String>,
    current_wl: Option<WindowLevel>,
    colour_map: ColourMap,
    position: Position,
    frame: usize,
    listeners: Vec<Option<Listener>>,
}

impl View {
    /// A view starts with the plain colour map, the cursor at the volume
    /// origin and a lone (empty) minmax preset.
    #[must_use]
    pub fn new(image: Image) -> Self {
        let mut window_presets = BTreeMap::new();
        window_presets.insert(
            "minmax".to_string(),
            WindowPreset {
                perslice: false,
                levels: Vec::new(),
            },
        );
        Self {
            image,
            window_luts: HashMap::new(),
            window_presets,
            current_preset: None,
            current_wl: None,
            colour_map: ColourMap::plain(),
            position: Position::default(),
            frame: 0,
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub fn image(&self) -> &Image {
        &self.image
    }

    #[must_use]
    pub fn image_mut(&mut self) -> &mut Image {
        &mut self.image
    }

    pub fn add_event_listener(&mut self, listener: Listener) -> usize {
        self.listeners.push(Some(listener));
        self.listeners.len() - 1
    }

    pub fn remove_event_listener(&mut self, id: usize) {
        if let Some(slot) = self.listeners.get_mut(id) {
            *slot = None;
        }
    }

    fn fire(&mut self, event: &ViewEvent) {
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in listeners.iter_mut().flatten() {
            listener(event);
        }
        // keep listeners registered during callbacks
        let mut added = std::mem::take(&mut self.listeners);
        self.listeners = listeners;
        self.listeners.append(&mut added);
    }

    #[must_use]
    pub fn window_presets(&self) -> &BTreeMap<String, WindowPreset> {
        &self.window_presets
    }

    pub fn set_window_presets(&mut self, presets: BTreeMap<String, WindowPreset>) {
        self.window_presets = presets;
    }

    /// Merge presets coming from an appended slice at index `k`:
    /// per-slice presets grow by one level, others are replaced; new names
    /// are announced.
    pub fn add_window_presets(&mut self, presets: BTreeMap<String, WindowPreset>, k: usize) {
        let mut added = Vec::new();
        for (name, preset) in presets {
            match self.window_presets.get_mut(&name) {
                Some(existing) if existing.perslice => {
                    existing.levels.insert(k, preset.levels[0]);
                }
                Some(existing) => {
                    *existing = preset;
                }
                None => {
                    self.window_presets.insert(name.clone(), preset);
                    added.push(name);
                }
            }
        }
        for name in added {
            self.fire(&ViewEvent::WindowPresetAdd { name });
        }
    }

    #[must_use]
    pub fn colour_map(&self) -> &ColourMap {
        &self.colour_map
    }

    pub fn set_colour_map(&mut self, map: ColourMap) {
        self.colour_map = map;
        self.fire(&ViewEvent::ColourChange);
    }

    /// Set the colour map without notifying (initial wiring).
    pub fn set_default_colour_map(&mut self, map: ColourMap) {
        self.colour_map = map;
    }

    #[must_use]
    pub fn current_position(&self) -> Position {
        self.position
    }

    /// Move the cursor. Returns false and changes nothing when out of
    /// bounds. A successful move always notifies the position (with the
    /// rescaled value for monochrome data); the slice change notification
    /// is suppressed when `silent`.
    pub fn set_current_position(&mut self, position: Position, silent: bool) -> bool {
        let size = self.image.geometry().size();
        if !size.is_in_bounds(position.i, position.j, position.k) {
            return false;
        }
        let previous = self.position;
        self.position = position;

        let value = self
            .image
            .photometric_interpretation()
            .is_grayscale()
            .then(|| {
                self.image
                    .rescaled_value(position.i, position.j, position.k, self.frame)
            });
        self.fire(&ViewEvent::PositionChange {
            i: position.i,
            j: position.j,
            k: position.k,
            value,
        });

        if !silent && previous.k != position.k {
            let uid = self
                .image
                .uids()
                .get(position.k as usize)
                .cloned()
                .unwrap_or_default();
            self.fire(&ViewEvent::SliceChange { k: position.k, uid });
        }
        true
    }

    #[must_use]
    pub fn current_frame(&self) -> usize {
        self.frame
    }

    /// Change the current frame. Returns false and changes nothing when
    /// out of bounds; notifies only on an actual change of a multi-frame
    /// image, then refreshes the position silently.
    pub fn set_current_frame(&mut self, frame: usize) -> bool {
        let frames = self.image.number_of_frames();
        if frame >= frames {
            return false;
        }
        let previous = self.frame;
        self.frame = frame;
        if previous != frame && frames != 1 {
            self.fire(&ViewEvent::FrameChange { frame });
            self.set_current_position(self.position, true);
        }
        true
    }

    /// Milliseconds per frame for cine playback, from the recommended
    /// display frame rate (default 10 fps).
    #[must_use]
    pub fn playback_milliseconds(&self) -> u64 {
        let rate = self.image.meta().frame_rate.unwrap_or(10.0);
        (1000.0 / rate).round() as u64
    }

    /// Window level covering the full rescaled data range; degenerate
    /// ranges default to a width of one.
    #[must_use]
    pub fn window_level_min_max(&self) -> WindowLevel {
        let range = self.image.rescaled_data_range();
        let mut width = range.max - range.min;
        if width < 1.0 {
            warn!("zero or negative window width, defaulting to one");
            width = 1.0;
        }
        WindowLevel::new(range.min + width / 2.0, width)
    }

    pub fn set_window_level_min_max(&mut self) {
        let wl = self.window_level_min_max();
        self.set_window_level(wl.center(), wl.width(), "minmax");
    }

    /// Set the window level on every registered LUT. Widths below one are
    /// silently ignored. Notifies only the dimensions that changed against
    /// the previously active LUT.
    pub fn set_window_level(&mut self, center: f64, width: f64, name: &str) {
        if width < 1.0 {
            return;
        }

        let previous = {
            let rsi = self
                .image
                .rescale_slope_and_intercept(self.position.k as usize);
            self.window_luts
                .get(&rsi.signature())
                .map(WindowLut::window_level)
        };

        self.current_preset = Some(name.to_string());
        let wl = WindowLevel::new(center, width);
        self.current_wl = Some(wl);

        // create the first lut if none exists
        if self.window_luts.is_empty() {
            let rsi = self.image.rescale_slope_and_intercept(0);
            let meta = self.image.meta();
            let rescale = RescaleLut::new(rsi, meta.bits_stored, meta.is_signed);
            self.window_luts
                .insert(rsi.signature(), WindowLut::new(rescale, wl));
        }
        for lut in self.window_luts.values_mut() {
            lut.set_window_level(wl);
        }

        match previous {
            Some(previous) => {
                if previous.width() != width {
                    self.fire(&ViewEvent::WindowWidthChange {
                        center,
                        width,
                        skip_generate: false,
                    });
                }
                if previous.center() != center {
                    self.fire(&ViewEvent::WindowCenterChange {
                        center,
                        width,
                        skip_generate: false,
                    });
                }
            }
            None => {
                self.fire(&ViewEvent::WindowWidthChange {
                    center,
                    width,
                    skip_generate: false,
                });
                self.fire(&ViewEvent::WindowCenterChange {
                    center,
                    width,
                    skip_generate: false,
                });
            }
        }
    }

    /// Activate a named preset. The minmax preset computes its level on
    /// first use; per-slice presets use the current slice's level.
    pub fn set_window_level_preset(&mut self, name: &str) -> Result<()> {
        let preset = self
            .window_presets
            .get(name)
            .ok_or_else(|| anyhow!("unknown window level preset '{name}'"))?
            .clone();
        let wl = if preset.levels.is_empty() {
            let wl = self.window_level_min_max();
            if let Some(stored) = self.window_presets.get_mut(name) {
                stored.levels.push(wl);
            }
            wl
        } else {
            preset.level_for_slice(self.position.k as usize)
        };
        self.set_window_level(wl.center(), wl.width(), name);
        Ok(())
    }

    pub fn set_window_level_preset_by_id(&mut self, id: usize) -> Result<()> {
        let name = self
            .window_presets
            .keys()
            .nth(id)
            .ok_or_else(|| anyhow!("no window level preset with id {id}"))?
            .clone();
        self.set_window_level_preset(&name)
    }

    /// Append another view's image as a slice: the underlying image grows,
    /// the cursor follows slices shifted past it, presets merge.
    pub fn append(&mut self, rhs: &View) -> Result<usize, MergeError> {
        let index = self.image.append_slice(&rhs.image, 0)?;
        if index as u32 <= self.position.k {
            let position = Position {
                k: self.position.k + 1,
                ..self.position
            };
            self.set_current_position(position, true);
        }
        self.add_window_presets(rhs.window_presets.clone(), index);
        Ok(index)
    }

    /// Resolve (building lazily) and update the window LUT of the current
    /// slice's RSI signature, handling per-slice preset swaps. Returns the
    /// LUT cache key.
    fn prepare_current_lut(&mut self) -> String {
        let k = self.position.k as usize;
        let rsi = self.image.rescale_slope_and_intercept(k);
        let key = rsi.signature();

        if !self.window_luts.contains_key(&key) {
            let wl = self
                .current_wl
                .unwrap_or_else(|| self.window_level_min_max());
            let meta = self.image.meta();
            let rescale = RescaleLut::new(rsi, meta.bits_stored, meta.is_signed);
            self.window_luts
                .insert(key.clone(), WindowLut::new(rescale, wl));
        }

        // per-slice presets swap the level in when it differs from the
        // previous one, re-notifying with the regeneration-suppressing flag
        let mut events = Vec::new();
        if let Some(name) = &self.current_preset
            && let Some(preset) = self.window_presets.get(name)
            && preset.perslice
        {
            let wl = preset.level_for_slice(k);
            let lut = self.window_luts.get_mut(&key).expect("lut just ensured");
            let previous = lut.window_level();
            if previous != wl {
                lut.set_window_level(wl);
                if previous.width() != wl.width() {
                    events.push(ViewEvent::WindowWidthChange {
                        center: wl.center(),
                        width: wl.width(),
                        skip_generate: true,
                    });
                }
                if previous.center() != wl.center() {
                    events.push(ViewEvent::WindowCenterChange {
                        center: wl.center(),
                        width: wl.width(),
                        skip_generate: true,
                    });
                }
            }
        }
        for event in &events {
            self.fire(event);
        }

        self.window_luts
            .get_mut(&key)
            .expect("lut just ensured")
            .update();
        key
    }

    /// Resolve the window LUT for the current slice, building and
    /// updating it as needed.
    pub fn current_window_lut(&mut self) -> &WindowLut {
        let key = self.prepare_current_lut();
        &self.window_luts[&key]
    }

    /// Fill `target` (RGBA, 4 bytes per pixel) with the windowed,
    /// colour-mapped current slice/frame.
    ///
    /// # Errors
    ///
    /// Fails on a mis-sized target, an unsupported planar configuration or
    /// an unsupported photometric interpretation.
    pub fn generate_image_data(&mut self, target: &mut [u8]) -> Result<()> {
        let key = self.prepare_current_lut();

        let image = &self.image;
        let colour_map = &self.colour_map;
        let lut = &self.window_luts[&key];
        let slice_size = image.geometry().size().slice_size();
        if target.len() != slice_size * 4 {
            bail!(
                "target buffer is {got} bytes, {expected} expected",
                got = target.len(),
                expected = slice_size * 4
            );
        }

        // multi-frame data displays the current frame, multi-slice data
        // the current slice
        let buffer = if image.number_of_frames() > 1 {
            image.frame_slice(self.frame, 0)
        } else {
            image.frame_slice(0, self.position.k as usize)
        };

        use crate::dicom::PhotometricInterpretation as Pi;
        match image.photometric_interpretation() {
            Pi::Monochrome1 | Pi::Monochrome2 => {
                for (pixel, out) in buffer
                    .iter()
                    .take(slice_size)
                    .zip(target.chunks_exact_mut(4))
                {
                    let index = usize::from(lut.value(*pixel));
                    out[0] = colour_map.red[index] as u8;
                    out[1] = colour_map.green[index] as u8;
                    out[2] = colour_map.blue[index] as u8;
                    out[3] = 0xFF;
                }
            }
            Pi::Palette => {
                let scale_16 = image.meta().bits_stored == 16;
                for (pixel, out) in buffer
                    .iter()
                    .take(slice_size)
                    .zip(target.chunks_exact_mut(4))
                {
                    let index = ((*pixel).max(0) as usize).min(colour_map.len() - 1);
                    let (r, g, b) = (
                        colour_map.red[index],
                        colour_map.green[index],
                        colour_map.blue[index],
                    );
                    if scale_16 {
                        out[0] = (r >> 8) as u8;
                        out[1] = (g >> 8) as u8;
                        out[2] = (b >> 8) as u8;
                    } else {
                        out[0] = r as u8;
                        out[1] = g as u8;
                        out[2] = b as u8;
                    }
                    out[3] = 0xFF;
                }
            }
            Pi::Rgb => {
                let (mut pos_r, mut pos_g, mut pos_b, step) =
                    component_striding(image.planar_configuration(), slice_size)?;
                for out in target.chunks_exact_mut(4).take(slice_size) {
                    out[0] = lut.value(buffer[pos_r]);
                    out[1] = lut.value(buffer[pos_g]);
                    out[2] = lut.value(buffer[pos_b]);
                    out[3] = 0xFF;
                    pos_r += step;
                    pos_g += step;
                    pos_b += step;
                }
            }
            Pi::YbrFull => {
                let (mut pos_y, mut pos_cb, mut pos_cr, step) =
                    component_striding(image.planar_configuration(), slice_size)?;
                for out in target.chunks_exact_mut(4).take(slice_size) {
                    let y = f64::from(buffer[pos_y]);
                    let cb = f64::from(buffer[pos_cb]);
                    let cr = f64::from(buffer[pos_cr]);
                    let r = y + 1.402 * (cr - 128.0);
                    let g = y - 0.34414 * (cb - 128.0) - 0.71414 * (cr - 128.0);
                    let b = y + 1.772 * (cb - 128.0);
                    out[0] = lut.value(r.round() as i32);
                    out[1] = lut.value(g.round() as i32);
                    out[2] = lut.value(b.round() as i32);
                    out[3] = 0xFF;
                    pos_y += step;
                    pos_cb += step;
                    pos_cr += step;
                }
            }
            other => bail!("Unsupported photometric interpretation: {other}"),
        }
        Ok(())
    }
}

/// Start offsets and step for the three components of one pixel.
fn component_striding(
    planar_configuration: u16,
    slice_size: usize,
) -> Result<(usize, usize, usize, usize)> {
    match planar_configuration {
        // interleaved: RGBRGB...
        0 => Ok((0, 1, 2, 3)),
        // planar: RRR...GGG...BBB...
        1 => Ok((0, slice_size, 2 * slice_size, 1)),
        other => bail!("Unsupported planar configuration: {other}"),
    }
}
