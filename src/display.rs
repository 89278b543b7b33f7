use crate::cli::Args;
use crate::image::Spacing;
// leading :: picks the raster crate over this crate's image module
use ::image::DynamicImage;
use anyhow::{Result, anyhow};
use std::io::{IsTerminal, Write};
use viuer::{Config as ViuerConfig, print};

/// Print a rendered frame to the terminal.
///
/// Non-square pixels are compensated through the requested height, like
/// the row/column spacing declares them.
pub fn print_image(image: &DynamicImage, spacing: Spacing, args: &Args) -> Result<()> {
    let is_tty = std::io::stdout().is_terminal();

    // (row, column) spacing ratio: 2.0 means pixels twice as tall as wide
    let ratio = if spacing.column > 0.0 {
        spacing.row / spacing.column
    } else {
        1.0
    };

    let (config_width, config_height) = match (args.width, args.height) {
        (Some(w), ..) => (Some(w), None),
        (None, Some(h)) => (None, Some((f64::from(h) * ratio).round() as u32)),
        (None, None) => (Some(24), None),
    };

    let config = ViuerConfig {
        width: config_width,
        height: config_height,
        absolute_offset: false,
        use_kitty: is_tty,
        use_iterm: is_tty,
        use_sixel: is_tty,
        ..Default::default()
    };

    std::io::stdout()
        .flush()
        .map_err(|e| anyhow!("Failed to flush stdout: {e}"))?;

    print(image, &config).map_err(|e| anyhow!("Failed to display image: {e}"))?;

    Ok(())
}
