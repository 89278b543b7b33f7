use criterion::{Criterion, criterion_group, criterion_main};
use dicomview::dicom::{DicomElements, DicomParser, Tag};
use dicomview::image::ImageFactory;
use dicomview::pipeline::{DicomBufferToView, LoadOutcome};
use dicomview::view::{View, ViewFactory};
use std::hint::black_box;

// ============================================================================
// SYNTHETIC DATASET
// ============================================================================

/// Explicit-VR little-endian CT-like dataset, 512x512, 16-bit.
fn synthetic_ct(rows: u16, cols: u16) -> Vec<u8> {
    let mut body = Vec::new();
    let mut push_short = |tag: Tag, vr: &[u8; 2], value: &[u8]| {
        body.extend_from_slice(&tag.group.to_le_bytes());
        body.extend_from_slice(&tag.element.to_le_bytes());
        body.extend_from_slice(vr);
        body.extend_from_slice(&(value.len() as u16).to_le_bytes());
        body.extend_from_slice(value);
    };

    push_short(Tag::new(0x0008, 0x0060), b"CS", b"CT");
    push_short(Tag::new(0x0028, 0x0004), b"CS", b"MONOCHROME2 ");
    push_short(Tag::new(0x0028, 0x0002), b"US", &1u16.to_le_bytes());
    push_short(Tag::new(0x0028, 0x0010), b"US", &rows.to_le_bytes());
    push_short(Tag::new(0x0028, 0x0011), b"US", &cols.to_le_bytes());
    push_short(Tag::new(0x0028, 0x0100), b"US", &16u16.to_le_bytes());
    push_short(Tag::new(0x0028, 0x0101), b"US", &16u16.to_le_bytes());
    push_short(Tag::new(0x0028, 0x0103), b"US", &0u16.to_le_bytes());
    push_short(Tag::new(0x0028, 0x1050), b"DS", b"40");
    push_short(Tag::new(0x0028, 0x1051), b"DS", b"400 ");
    push_short(Tag::new(0x0028, 0x1052), b"DS", b"-1024");
    push_short(Tag::new(0x0028, 0x1053), b"DS", b"1 ");

    // pixel data: a smooth gradient exercising the full LUT domain
    let mut pixels = Vec::with_capacity(usize::from(rows) * usize::from(cols) * 2);
    for index in 0..(u32::from(rows) * u32::from(cols)) {
        pixels.extend_from_slice(&((index % 4096) as u16).to_le_bytes());
    }
    body.extend_from_slice(&0x7FE0u16.to_le_bytes());
    body.extend_from_slice(&0x0010u16.to_le_bytes());
    body.extend_from_slice(b"OW");
    body.extend_from_slice(&[0, 0]);
    body.extend_from_slice(&(pixels.len() as u32).to_le_bytes());
    body.extend_from_slice(&pixels);

    // preamble, magic and file meta group
    let uid = b"1.2.840.10008.1.2.1\0";
    let mut meta = Vec::new();
    meta.extend_from_slice(&[0x02, 0x00, 0x10, 0x00]);
    meta.extend_from_slice(b"UI");
    meta.extend_from_slice(&(uid.len() as u16).to_le_bytes());
    meta.extend_from_slice(uid);

    let mut out = vec![0u8; 128];
    out.extend_from_slice(b"DICM");
    out.extend_from_slice(&[0x02, 0x00, 0x00, 0x00]);
    out.extend_from_slice(b"UL");
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
    out.extend_from_slice(&meta);
    out.extend_from_slice(&body);
    out
}

fn build_view(buffer: &[u8]) -> View {
    let elements = DicomElements::new(DicomParser::new().parse(buffer).unwrap());
    let frames = elements.pixel_frames().unwrap().to_vec();
    let image = ImageFactory::create(&elements, &frames).unwrap();
    ViewFactory::create(&elements, image).unwrap()
}

// ============================================================================
// TIER 1: FULL PIPELINE BENCHMARK
// ============================================================================

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pipeline");
    let buffer = synthetic_ct(512, 512);

    group.bench_function("ct_512", |b| {
        b.iter(|| {
            let converter = DicomBufferToView::new();
            let outcome = converter.convert(black_box(&buffer), &mut |_| {});
            assert!(matches!(outcome, LoadOutcome::Loaded(_)));
        });
    });

    group.finish();
}

// ============================================================================
// TIER 2: COMPONENT-LEVEL BENCHMARKS
// ============================================================================

/// DICOM stream parsing and element decoding
fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");
    let buffer = synthetic_ct(512, 512);

    group.bench_function("parse_ct_512", |b| {
        b.iter(|| DicomParser::new().parse(black_box(&buffer)).unwrap());
    });

    group.finish();
}

/// Window LUT regeneration after a window/level change
fn bench_lut_regeneration(c: &mut Criterion) {
    let mut group = c.benchmark_group("lut_regeneration");
    let buffer = synthetic_ct(512, 512);
    let mut view = build_view(&buffer);
    let mut toggle = false;

    group.bench_function("set_window_level_16bit", |b| {
        b.iter(|| {
            // alternate levels so every iteration regenerates the table
            toggle = !toggle;
            let center = if toggle { 40.0 } else { 50.0 };
            view.set_window_level(center, 400.0, "manual");
            black_box(view.current_window_lut().value(1024));
        });
    });

    group.finish();
}

/// RGBA display buffer generation
fn bench_generate_image_data(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_image_data");
    let buffer = synthetic_ct(512, 512);
    let mut view = build_view(&buffer);
    let mut target = vec![0u8; 512 * 512 * 4];

    group.bench_function("monochrome_512", |b| {
        b.iter(|| {
            view.generate_image_data(black_box(&mut target)).unwrap();
            black_box(target[0]);
        });
    });

    group.finish();
}

// ============================================================================
// BENCHMARK REGISTRATION
// ============================================================================

criterion_group!(
    benches,
    bench_full_pipeline,
    bench_parsing,
    bench_lut_regeneration,
    bench_generate_image_data,
);

criterion_main!(benches);
