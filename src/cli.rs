use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::core::pacing::PacingPolicy;
use crate::entities::effects::EffectKind;
use crate::output::colorlight::ControlPacket;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Decode: image 0.25 (GIF, WebP, APNG)\n",
    "Output: Colorlight over AF_PACKET\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Animated image player for Colorlight LED panels
///
/// `-h` sets the display height; use `--help` for this text.
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None, disable_help_flag = true)]
pub struct Args {
    /// Ethernet interface connected to the receiver card (e.g. eth0)
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: String,

    /// Display width in pixels
    #[arg(short = 'w', long = "width", value_name = "WIDTH")]
    pub width: usize,

    /// Display height in pixels
    #[arg(short = 'h', long = "height", value_name = "HEIGHT")]
    pub height: usize,

    /// Display brightness (0-255)
    #[arg(short = 'b', long = "brightness", value_name = "BRIGHTNESS", default_value_t = 255)]
    pub brightness: u8,

    /// Frame mixing percentage (0-99): share of the previous frame kept
    #[arg(short = 'm', long = "mix", value_name = "MIX", default_value_t = 0)]
    pub mix: u32,

    /// Override source frame rate (0 = use source timing)
    #[arg(short = 'r', long = "rate", value_name = "RATE", default_value_t = 0)]
    pub rate: u32,

    /// Load extension from shared library
    #[arg(short = 'e', long = "extension", value_name = "EXTENSION", conflicts_with = "effect")]
    pub extension: Option<PathBuf>,

    /// Use a built-in effect instead of an extension library
    #[arg(long = "effect", value_name = "EFFECT")]
    pub effect: Option<EffectKind>,

    /// Serial device of the ambient strip controller
    #[arg(long = "ambient-device", value_name = "DEVICE", default_value = "/dev/ttyACM0")]
    pub ambient_device: PathBuf,

    /// Control packet sent after each frame
    #[arg(long = "control", value_name = "PACKET", default_value = "update")]
    pub control: ControlPacket,

    /// What to do with the schedule when a frame is late
    #[arg(long = "pacing", value_name = "POLICY", default_value = "anchored")]
    pub pacing: PacingPolicy,

    /// Shuffle sources (plays forever)
    #[arg(short = 's', long = "shuffle")]
    pub shuffle: bool,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbosity: u8,

    /// Log to file instead of stderr (default: panelplayer.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Print help
    #[arg(long = "help", action = ArgAction::Help)]
    pub help: Option<bool>,

    /// Animated images to play, in order
    #[arg(value_name = "SOURCES", required = true, num_args = 1..)]
    pub sources: Vec<PathBuf>,
}
