//! Buffer-to-view conversion pipeline
//!
//! Orchestrates parsing, pixel decompression and image/view construction,
//! reporting progress through a load event sequence. Every path, success
//! or not, ends with a load-end notification so callers can release
//! resources.

use crate::decode::{DecodePool, PixelBufferDecoder, PixelMeta, PoolMessage};
use crate::dicom::{DicomElements, DicomParser, tags};
use crate::image::ImageFactory;
use crate::image::factory::widen_samples;
use crate::view::{View, ViewFactory};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Load lifecycle notifications. Item references borrow pipeline state;
/// the final view is returned by [`DicomBufferToView::convert`].
#[derive(Debug)]
pub enum LoadEvent<'a> {
    LoadStart,
    Progress { loaded: usize, total: usize },
    /// First displayable view is ready (progressive reveal).
    LoadItem {
        view: &'a View,
        elements: &'a DicomElements,
    },
    Load,
    Error { message: String },
    Abort,
    LoadEnd,
}

/// Successful conversion output.
pub struct LoadResult {
    pub view: View,
    pub elements: DicomElements,
}

/// Conversion outcome; failure and abort details were also delivered as
/// events.
pub enum LoadOutcome {
    Loaded(Box<LoadResult>),
    Aborted,
    Failed(String),
}

/// Cancels a running conversion: queued decode tasks drop immediately,
/// in-flight ones finish but their results are discarded.
#[derive(Clone)]
pub struct LoadAbortHandle {
    requested: Arc<AtomicBool>,
    pool: Arc<Mutex<Option<crate::decode::AbortHandle>>>,
}

impl LoadAbortHandle {
    pub fn abort(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if let Some(handle) = self.pool.lock().unwrap().as_ref() {
            handle.abort();
        }
    }
}

/// Converts one DICOM buffer into a displayable view.
pub struct DicomBufferToView {
    default_character_set: Option<String>,
    pool_size: usize,
    requested_abort: Arc<AtomicBool>,
    pool_abort: Arc<Mutex<Option<crate::decode::AbortHandle>>>,
}

impl Default for DicomBufferToView {
    fn default() -> Self {
        Self::new()
    }
}

impl DicomBufferToView {
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_character_set: None,
            pool_size: DecodePool::DEFAULT_SIZE,
            requested_abort: Arc::new(AtomicBool::new(false)),
            pool_abort: Arc::new(Mutex::new(None)),
        }
    }

    /// Character set for text elements of datasets that declare none.
    pub fn set_default_character_set(&mut self, character_set: &str) {
        self.default_character_set = Some(character_set.to_string());
    }

    /// Number of decode workers (clamped to the pool's supported range).
    pub fn set_pool_size(&mut self, size: usize) {
        self.pool_size = size;
    }

    #[must_use]
    pub fn abort_handle(&self) -> LoadAbortHandle {
        LoadAbortHandle {
            requested: Arc::clone(&self.requested_abort),
            pool: Arc::clone(&self.pool_abort),
        }
    }

    /// Run the conversion, emitting load events along the way.
    pub fn convert(&self, buffer: &[u8], on_event: &mut dyn FnMut(LoadEvent)) -> LoadOutcome {
        on_event(LoadEvent::LoadStart);

        if self.requested_abort.load(Ordering::SeqCst) {
            on_event(LoadEvent::Abort);
            on_event(LoadEvent::LoadEnd);
            return LoadOutcome::Aborted;
        }

        let mut parser = DicomParser::new();
        if let Some(character_set) = &self.default_character_set {
            parser.set_default_character_set(character_set);
        }
        let dataset = match parser.parse(buffer) {
            Ok(dataset) => dataset,
            Err(error) => return fail(error.to_string(), on_event),
        };
        let elements = DicomElements::new(dataset);

        let syntax = match elements.transfer_syntax() {
            Ok(syntax) => syntax,
            Err(error) => return fail(error.to_string(), on_event),
        };
        let frames = match elements.pixel_frames() {
            Ok(frames) => frames.to_vec(),
            Err(error) => return fail(error.to_string(), on_event),
        };
        if frames.is_empty() {
            return fail("pixel data holds no frames".to_string(), on_event);
        }

        match syntax.decompression_name() {
            None => convert_native(&elements, &frames, on_event),
            Some(algorithm) => {
                debug!(
                    "decompressing {count} frame(s) with {algorithm}",
                    count = frames.len()
                );
                self.convert_encapsulated(&elements, frames, algorithm, on_event)
            }
        }
    }

    /// Compressed path: fan decode tasks out to the pool, reveal the view
    /// at frame 0, reassemble the rest by carried frame index.
    fn convert_encapsulated(
        &self,
        elements: &DicomElements,
        frames: Vec<Vec<u8>>,
        algorithm: &str,
        on_event: &mut dyn FnMut(LoadEvent),
    ) -> LoadOutcome {
        let meta = match pixel_meta(elements) {
            Ok(meta) => meta,
            Err(message) => return fail(message, on_event),
        };
        let total = frames.len();

        let decoder = match PixelBufferDecoder::new(algorithm, total, self.pool_size) {
            Ok(decoder) => decoder,
            Err(error) => return fail(error.to_string(), on_event),
        };
        *self.pool_abort.lock().unwrap() = Some(decoder.abort_handle());
        if self.requested_abort.load(Ordering::SeqCst) {
            decoder.abort_handle().abort();
        }

        for (index, bytes) in frames.into_iter().enumerate() {
            decoder.decode(bytes, meta, index);
        }

        let bits = meta.bits_allocated;
        let signed = meta.is_signed;
        let mut early: Vec<Option<Vec<u8>>> = vec![None; total];
        let mut result: Option<LoadResult> = None;
        let mut completed = 0usize;

        while completed < total {
            let message = match decoder.messages().recv() {
                Ok(message) => message,
                Err(_) => return fail("decode pool stopped unexpectedly".to_string(), on_event),
            };
            match message {
                PoolMessage::Item(item) => {
                    completed += 1;
                    on_event(LoadEvent::Progress {
                        loaded: completed,
                        total,
                    });
                    if let Some(load) = &mut result {
                        load.view
                            .image_mut()
                            .set_frame_buffer(item.frame_index, widen_samples(&item.bytes, bits, signed));
                    } else {
                        let index = item.frame_index;
                        early[index] = Some(item.bytes);
                        // frame 0 triggers the first displayable view
                        if index == 0 {
                            let buffers: Vec<Vec<u8>> = early
                                .iter()
                                .map(|slot| {
                                    slot.clone().unwrap_or_else(|| vec![0u8; meta.frame_bytes()])
                                })
                                .collect();
                            let view = ImageFactory::create(elements, &buffers)
                                .and_then(|image| ViewFactory::create(elements, image));
                            match view {
                                Ok(view) => {
                                    let load = LoadResult {
                                        view,
                                        elements: elements.clone(),
                                    };
                                    on_event(LoadEvent::LoadItem {
                                        view: &load.view,
                                        elements: &load.elements,
                                    });
                                    result = Some(load);
                                }
                                Err(error) => {
                                    decoder.abort_handle().abort();
                                    return fail(error.to_string(), on_event);
                                }
                            }
                        }
                    }
                }
                PoolMessage::Error { frame_index, error } => {
                    decoder.abort_handle().abort();
                    return fail(
                        format!("frame {frame_index}: {error}"),
                        on_event,
                    );
                }
                PoolMessage::Aborted => {
                    on_event(LoadEvent::Abort);
                    on_event(LoadEvent::LoadEnd);
                    return LoadOutcome::Aborted;
                }
            }
        }

        on_event(LoadEvent::Load);
        on_event(LoadEvent::LoadEnd);
        match result {
            Some(load) => LoadOutcome::Loaded(Box::new(load)),
            None => LoadOutcome::Failed("no frame completed".to_string()),
        }
    }
}

/// Uncompressed path: everything is already in place.
fn convert_native(
    elements: &DicomElements,
    frames: &[Vec<u8>],
    on_event: &mut dyn FnMut(LoadEvent),
) -> LoadOutcome {
    let total = frames.len();
    on_event(LoadEvent::Progress {
        loaded: total,
        total,
    });
    let view = ImageFactory::create(elements, frames)
        .and_then(|image| ViewFactory::create(elements, image));
    match view {
        Ok(view) => {
            let load = LoadResult {
                view,
                elements: elements.clone(),
            };
            on_event(LoadEvent::LoadItem {
                view: &load.view,
                elements: &load.elements,
            });
            on_event(LoadEvent::Load);
            on_event(LoadEvent::LoadEnd);
            LoadOutcome::Loaded(Box::new(load))
        }
        Err(error) => fail(error.to_string(), on_event),
    }
}

/// Decode-task metadata gathered from the pixel-driving elements.
fn pixel_meta(elements: &DicomElements) -> Result<PixelMeta, String> {
    let rows = elements
        .u16_value(tags::ROWS)
        .ok_or_else(|| "missing Rows for pixel decompression".to_string())?;
    let columns = elements
        .u16_value(tags::COLUMNS)
        .ok_or_else(|| "missing Columns for pixel decompression".to_string())?;
    let bits_allocated = elements
        .u16_value(tags::BITS_ALLOCATED)
        .ok_or_else(|| "missing BitsAllocated for pixel decompression".to_string())?;
    Ok(PixelMeta {
        bits_allocated,
        is_signed: elements.u16_value(tags::PIXEL_REPRESENTATION).unwrap_or(0) == 1,
        slice_size: usize::from(rows) * usize::from(columns),
        samples_per_pixel: elements.u16_value(tags::SAMPLES_PER_PIXEL).unwrap_or(1),
        planar_configuration: elements.u16_value(tags::PLANAR_CONFIGURATION),
    })
}

fn fail(message: String, on_event: &mut dyn FnMut(LoadEvent)) -> LoadOutcome {
    on_event(LoadEvent::Error {
        message: message.clone(),
    });
    on_event(LoadEvent::LoadEnd);
    LoadOutcome::Failed(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::tags;
    use crate::testutil::{DatasetBuilder, monochrome_dataset};

    /// Compact event trace for order assertions.
    fn run(converter: &DicomBufferToView, buffer: &[u8]) -> (Vec<String>, LoadOutcome) {
        let mut trace = Vec::new();
        let outcome = converter.convert(buffer, &mut |event| {
            trace.push(match event {
                LoadEvent::LoadStart => "start".to_string(),
                LoadEvent::Progress { loaded, total } => format!("progress {loaded}/{total}"),
                LoadEvent::LoadItem { .. } => "item".to_string(),
                LoadEvent::Load => "load".to_string(),
                LoadEvent::Error { .. } => "error".to_string(),
                LoadEvent::Abort => "abort".to_string(),
                LoadEvent::LoadEnd => "end".to_string(),
            });
        });
        (trace, outcome)
    }

    /// RLE-encode 8-bit samples as a single literal-run segment.
    fn rle_frame(samples: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; 64];
        out[..4].copy_from_slice(&1u32.to_le_bytes());
        out[4..8].copy_from_slice(&64u32.to_le_bytes());
        out.push((samples.len() - 1) as u8);
        out.extend_from_slice(samples);
        if out.len() % 2 != 0 {
            out.push(0);
        }
        out
    }

    fn rle_multiframe(frames: usize, cols: u16) -> Vec<u8> {
        let fragments: Vec<Vec<u8>> = (0..frames)
            .map(|i| rle_frame(&vec![i as u8 * 10; usize::from(cols)]))
            .collect();
        DatasetBuilder::new("1.2.840.10008.1.2.5")
            .string(tags::PHOTOMETRIC_INTERPRETATION, "CS", "MONOCHROME2")
            .u16s(tags::SAMPLES_PER_PIXEL, &[1])
            .u16s(tags::ROWS, &[1])
            .u16s(tags::COLUMNS, &[cols])
            .u16s(tags::BITS_ALLOCATED, &[8])
            .u16s(tags::BITS_STORED, &[8])
            .u16s(tags::PIXEL_REPRESENTATION, &[0])
            .string(tags::NUMBER_OF_FRAMES, "IS", &frames.to_string())
            .pixel_data_encapsulated(&fragments, None)
            .build()
    }

    #[test]
    fn test_native_event_sequence() {
        let converter = DicomBufferToView::new();
        let (trace, outcome) = run(&converter, &monochrome_dataset(2, 2, &[0, 1, 2, 3], 0.0));
        assert_eq!(trace, vec!["start", "progress 1/1", "item", "load", "end"]);
        let LoadOutcome::Loaded(result) = outcome else {
            panic!("expected loaded outcome");
        };
        assert_eq!(result.view.image().geometry().size().slice_size(), 4);
    }

    #[test]
    fn test_parse_error_reaches_load_end() {
        let converter = DicomBufferToView::new();
        let (trace, outcome) = run(&converter, &[0u8; 200]);
        assert_eq!(trace, vec!["start", "error", "end"]);
        assert!(matches!(outcome, LoadOutcome::Failed(_)));
    }

    #[test]
    fn test_encapsulated_five_frames_progressive() {
        let mut converter = DicomBufferToView::new();
        // one worker makes completion order deterministic: frame 0 first
        converter.set_pool_size(1);
        let (trace, outcome) = run(&converter, &rle_multiframe(5, 4));

        assert_eq!(trace.first().map(String::as_str), Some("start"));
        assert_eq!(trace.last().map(String::as_str), Some("end"));
        let item_at = trace.iter().position(|e| e == "item").unwrap();
        let last_progress = trace.iter().rposition(|e| e.starts_with("progress")).unwrap();
        // the first view is revealed strictly before the last frame lands
        assert!(item_at < last_progress);
        assert_eq!(trace.iter().filter(|e| e.starts_with("progress")).count(), 5);
        assert_eq!(trace.iter().filter(|e| *e == "load").count(), 1);

        let LoadOutcome::Loaded(result) = outcome else {
            panic!("expected loaded outcome");
        };
        let image = result.view.image();
        assert_eq!(image.number_of_frames(), 5);
        for frame in 0..5 {
            assert_eq!(image.frame_slice(frame, 0), &[frame as i32 * 10; 4]);
        }
    }

    #[test]
    fn test_abort_before_start_yields_abort_then_end() {
        let converter = DicomBufferToView::new();
        converter.abort_handle().abort();
        let (trace, outcome) = run(&converter, &rle_multiframe(3, 4));
        assert_eq!(trace, vec!["start", "abort", "end"]);
        assert!(matches!(outcome, LoadOutcome::Aborted));
    }

    #[test]
    fn test_decode_error_reaches_load_end() {
        let mut converter = DicomBufferToView::new();
        converter.set_pool_size(1);
        // fragments are not valid RLE streams
        let fragments: Vec<Vec<u8>> = vec![vec![0u8; 8], vec![0u8; 8]];
        let buffer = DatasetBuilder::new("1.2.840.10008.1.2.5")
            .string(tags::PHOTOMETRIC_INTERPRETATION, "CS", "MONOCHROME2")
            .u16s(tags::SAMPLES_PER_PIXEL, &[1])
            .u16s(tags::ROWS, &[1])
            .u16s(tags::COLUMNS, &[4])
            .u16s(tags::BITS_ALLOCATED, &[8])
            .string(tags::NUMBER_OF_FRAMES, "IS", "2")
            .pixel_data_encapsulated(&fragments, None)
            .build();
        let (trace, outcome) = run(&converter, &buffer);
        assert!(trace.contains(&"error".to_string()));
        assert_eq!(trace.last().map(String::as_str), Some("end"));
        assert!(!trace.contains(&"load".to_string()));
        assert!(matches!(outcome, LoadOutcome::Failed(_)));
    }

    #[test]
    fn test_unsupported_lossless_jpeg_fails_cleanly() {
        let mut converter = DicomBufferToView::new();
        converter.set_pool_size(1);
        let fragments: Vec<Vec<u8>> = vec![vec![0u8; 8]];
        let buffer = DatasetBuilder::new("1.2.840.10008.1.2.4.57")
            .string(tags::PHOTOMETRIC_INTERPRETATION, "CS", "MONOCHROME2")
            .u16s(tags::SAMPLES_PER_PIXEL, &[1])
            .u16s(tags::ROWS, &[1])
            .u16s(tags::COLUMNS, &[4])
            .u16s(tags::BITS_ALLOCATED, &[16])
            .pixel_data_encapsulated(&fragments, None)
            .build();
        let (trace, outcome) = run(&converter, &buffer);
        assert!(trace.contains(&"error".to_string()));
        assert_eq!(trace.last().map(String::as_str), Some("end"));
        let LoadOutcome::Failed(message) = outcome else {
            panic!("expected failed outcome");
        };
        assert!(message.contains("jpeg-lossless"));
    }
}
