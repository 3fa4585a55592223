use clap::Parser;
use std::path::PathBuf;

// Audio backend info (compile-time)
#[cfg(feature = "audio")]
const AUDIO_BACKEND: &str = "cpal 0.15";
#[cfg(not(feature = "audio"))]
const AUDIO_BACKEND: &str = "none (log only)";

// Build version with backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Audio:  ", AUDIO_BACKEND, "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Paginated image viewer with timed auto-advance
///
/// Keys are read from stdin, one per line: z/m prev/next, +/- zoom, r reset,
/// o/p top/bottom, x/c scroll, s auto-advance, [ ] dwell, g N jump, q quit.
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Image file or directory of images to view
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Start page (1-based)
    #[arg(long = "page", value_name = "N")]
    pub start_page: Option<i64>,

    /// Start zoom factor
    #[arg(short = 'z', long = "zoom", value_name = "FACTOR")]
    pub zoom: Option<f32>,

    /// Start with auto-advance on
    #[arg(short = 'a', long = "auto")]
    pub auto_advance: bool,

    /// Seconds per page for auto-advance (1-60)
    #[arg(short = 'd', long = "dwell", value_name = "SECS")]
    pub dwell: Option<u32>,

    /// No tone on auto-advance
    #[arg(short = 'm', long = "mute")]
    pub mute: bool,

    /// Viewport height for in-page auto scroll
    #[arg(long = "viewport", value_name = "HEIGHT")]
    pub viewport_height: Option<f32>,

    /// Write every painted page as PNG into this directory
    #[arg(short = 'o', long = "out", value_name = "DIR")]
    pub snapshot_dir: Option<PathBuf>,

    /// Exit after N seconds (headless runs)
    #[arg(long = "run-for", value_name = "SECS")]
    pub run_for: Option<u64>,

    /// Enable debug logging to file (default: folio.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}
