use clap::{CommandFactory, Parser};
use dicomview::cli::Args;
use dicomview::display;
use dicomview::pipeline::{DicomBufferToView, LoadEvent, LoadOutcome};
use dicomview::view::Position;
use log::debug;
use std::fmt;

fn main() {
    env_logger::init();
    let args = Args::parse();

    if args.files.is_empty() {
        let _ = Args::command().print_help();
        println!();
        return;
    }

    let multiple_files = args.files.len() > 1;
    let mut any_failed = false;

    for (idx, file_path) in args.files.iter().enumerate() {
        if multiple_files {
            println!("{}", file_path.display());
        }

        if let Err(e) = process_file(file_path, &args) {
            println!("Error: {e}");
            any_failed = true;
        }

        if multiple_files && idx < args.files.len() - 1 {
            println!();
        }
    }

    if any_failed {
        std::process::exit(1);
    }
}

/// Per-file error, staged by pipeline step.
#[derive(Debug)]
enum ProcessError {
    Read(std::io::Error),
    Load(String),
    Aborted,
    Render(anyhow::Error),
    Display(anyhow::Error),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::Read(e) => write!(f, "{e}"),
            ProcessError::Load(msg) => write!(f, "{msg}"),
            ProcessError::Aborted => write!(f, "load aborted"),
            ProcessError::Render(e) => write!(f, "{e}"),
            ProcessError::Display(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ProcessError {}

/// Process a single DICOM file
fn process_file(file_path: &std::path::Path, args: &Args) -> Result<(), ProcessError> {
    // Stage 1: read and convert through the pipeline
    let buffer = std::fs::read(file_path).map_err(ProcessError::Read)?;

    let mut converter = DicomBufferToView::new();
    if let Some(charset) = &args.character_set {
        converter.set_default_character_set(charset);
    }
    let outcome = converter.convert(&buffer, &mut |event| match event {
        LoadEvent::Progress { loaded, total } => debug!("decoded {loaded}/{total}"),
        LoadEvent::LoadItem { .. } => debug!("first frame displayable"),
        _ => {}
    });
    let result = match outcome {
        LoadOutcome::Loaded(result) => result,
        LoadOutcome::Aborted => return Err(ProcessError::Aborted),
        LoadOutcome::Failed(message) => return Err(ProcessError::Load(message)),
    };

    // Stage 2: verbose element dump
    if args.verbose {
        dicomview::print_metadata(&result.elements);
    }

    let mut view = result.view;

    // Stage 3: apply CLI cursor and window overrides
    if let Some(frame) = args.frame
        && !view.set_current_frame(frame)
    {
        return Err(ProcessError::Load(format!(
            "frame {frame} out of bounds (file has {count})",
            count = view.image().number_of_frames()
        )));
    }
    if let Some(window) = &args.window {
        let (center, width) = parse_window(window).map_err(ProcessError::Load)?;
        view.set_window_level(center, width, "manual");
    }
    // keep the cursor on the first slice, the only one a single file has
    view.set_current_position(Position::default(), true);

    // Stage 4: generate the display buffer
    let size = view.image().geometry().size();
    let mut rgba = vec![0u8; size.slice_size() * 4];
    view.generate_image_data(&mut rgba)
        .map_err(ProcessError::Render)?;
    let rendered = image::RgbaImage::from_raw(size.columns(), size.rows(), rgba)
        .map(image::DynamicImage::ImageRgba8)
        .ok_or_else(|| ProcessError::Render(anyhow::anyhow!("display buffer size mismatch")))?;

    // Stage 5: display
    let spacing = view.image().geometry().spacing();
    display::print_image(&rendered, spacing, args).map_err(ProcessError::Display)?;

    Ok(())
}

/// Parse a CENTER,WIDTH window override.
fn parse_window(value: &str) -> Result<(f64, f64), String> {
    let invalid = || format!("invalid window '{value}', expected CENTER,WIDTH");
    let (center, width) = value.split_once(',').ok_or_else(invalid)?;
    let center: f64 = center.trim().parse().map_err(|_| invalid())?;
    let width: f64 = width.trim().parse().map_err(|_| invalid())?;
    if width < 1.0 {
        return Err(format!("window width must be >= 1, got {width}"));
    }
    Ok((center, width))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_window() {
        assert_eq!(parse_window("40,400").unwrap(), (40.0, 400.0));
        assert_eq!(parse_window(" -600 , 1500 ").unwrap(), (-600.0, 1500.0));
        assert!(parse_window("40").is_err());
        assert!(parse_window("a,b").is_err());
        assert!(parse_window("40,0.5").is_err());
    }
}
