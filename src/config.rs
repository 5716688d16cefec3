//! Validated runtime configuration.
//!
//! [`Args`] is the raw command line; [`PlayerConfig`] is what the rest of the
//! program consumes. Every range check happens here, before any resource is
//! acquired.

use std::num::NonZeroU32;
use std::path::PathBuf;

use crate::cli::Args;
use crate::core::pacing::PacingPolicy;
use crate::entities::compositor::MIX_MAXIMUM;
use crate::entities::effects::{EffectKind, ExtensionSource};
use crate::output::colorlight::ControlPacket;

/// Sources kept in flight ahead of the one playing.
pub const QUEUE_SIZE: usize = 4;

/// Default log file name for `--log` without a path.
pub const DEFAULT_LOG_FILE: &str = "panelplayer.log";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Width and height must be specified as positive integers!")]
    Dimensions,
    #[error("Width and height must not exceed {}!", u16::MAX)]
    DimensionsTooLarge,
    #[error("Mix must be an integer between 0 and {}!", MIX_MAXIMUM - 1)]
    Mix,
    #[error("At least one source must be specified!")]
    NoSources,
    #[error("Port must be specified!")]
    NoPort,
}

/// Settings the player consults per source and per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSettings {
    pub brightness: u8,
    pub mix: u32,
    pub rate: Option<NonZeroU32>,
    pub control: ControlPacket,
    pub pacing: PacingPolicy,
    pub shuffle: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            brightness: 255,
            mix: 0,
            rate: None,
            control: ControlPacket::Update,
            pacing: PacingPolicy::Anchored,
            shuffle: false,
        }
    }
}

/// Complete configuration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerConfig {
    pub port: String,
    pub width: usize,
    pub height: usize,
    pub playback: PlaybackSettings,
    pub extension: ExtensionSource,
    pub sources: Vec<PathBuf>,
}

impl TryFrom<&Args> for PlayerConfig {
    type Error = ConfigError;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        if args.port.is_empty() {
            return Err(ConfigError::NoPort);
        }
        if args.width < 1 || args.height < 1 {
            return Err(ConfigError::Dimensions);
        }
        if args.width > u16::MAX as usize || args.height > u16::MAX as usize {
            return Err(ConfigError::DimensionsTooLarge);
        }
        if args.mix >= MIX_MAXIMUM {
            return Err(ConfigError::Mix);
        }
        if args.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let extension = match (&args.extension, args.effect) {
            (Some(path), _) => ExtensionSource::Library(path.clone()),
            (None, Some(EffectKind::Grayscale)) => ExtensionSource::Grayscale,
            (None, Some(EffectKind::Ambient)) => ExtensionSource::Ambient(args.ambient_device.clone()),
            (None, None) => ExtensionSource::None,
        };

        Ok(Self {
            port: args.port.clone(),
            width: args.width,
            height: args.height,
            playback: PlaybackSettings {
                brightness: args.brightness,
                mix: args.mix,
                rate: NonZeroU32::new(args.rate),
                control: args.control,
                pacing: args.pacing,
                shuffle: args.shuffle,
            },
            extension,
            sources: args.sources.clone(),
        })
    }
}
