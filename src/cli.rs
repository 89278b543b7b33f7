use clap::Parser;
use std::path::PathBuf;

/// A terminal-based DICOM image viewer
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// DICOM file path(s) to display
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Output width in terminal columns
    #[arg(short = 'W', long)]
    pub width: Option<u32>,

    /// Output height in terminal rows
    #[arg(short = 'H', long)]
    pub height: Option<u32>,

    /// Frame to display for multi-frame files (zero based)
    #[arg(short, long)]
    pub frame: Option<usize>,

    /// Window level override as CENTER,WIDTH (e.g. 40,400)
    #[arg(short = 'w', long, value_name = "CENTER,WIDTH")]
    pub window: Option<String>,

    /// Default character set for files that declare none
    #[arg(long, value_name = "CHARSET")]
    pub character_set: Option<String>,

    /// Dump DICOM elements
    #[arg(short, long)]
    pub verbose: bool,
}
