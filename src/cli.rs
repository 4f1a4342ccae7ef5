use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "unfrag")]
#[command(
    author,
    version,
    about = "Flatten fragmented MP4 streams into a progressive MP4 file"
)]
pub struct Cli {
    /// Input segments in decode order (init segment plus fragments)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output file path
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Print a JSON summary of the result
    #[arg(long)]
    pub json: bool,

    /// Keep each input file's original timestamps instead of
    /// concatenating the files on one timeline
    #[arg(long)]
    pub no_normalize: bool,

    /// Synthesize a data start for track runs that omit data_offset
    #[arg(long)]
    pub allow_missing_data_offset: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
