use std::path::PathBuf;

use clap::Parser;

/// Turn a sketch into a 3D model with a ComfyUI backend.
#[derive(Debug, Clone, Parser)]
#[command(name = "sketch3d", version, about)]
pub struct Args {
    /// Sketch image (PNG, JPEG or WebP).
    #[arg(long)]
    pub image: PathBuf,

    /// Text guidance for the generator.
    #[arg(long, default_value = "")]
    pub guidance: String,

    /// Compressed voice recording whose transcription replaces `--guidance`.
    #[arg(long)]
    pub voice: Option<PathBuf>,

    /// Directory the generated model is written to.
    #[arg(long, default_value = "generated")]
    pub output_dir: PathBuf,
}
