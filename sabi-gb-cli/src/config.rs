use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
pub struct Config {
    #[arg(long = "rom-path")]
    pub rom_path: PathBuf,
    /// Stop after this many completed frames.
    #[arg(default_value = "60", long = "frames")]
    pub frames: usize,
    /// Print the final framebuffer as ASCII shades on exit.
    #[arg(long = "dump-last-frame")]
    pub dump_last_frame: bool,
}
