//! Frame hooks - post-processing applied to the display buffer.
//!
//! A hook runs once per composited frame, after mixing and before
//! transmission, on the player thread. It mutates the BGR buffer in place and
//! must return well within one frame period.
//!
//! # Architecture
//!
//! ```text
//! Hook (lifecycle: init once, update per frame, destroy on drop)
//!   └── Extension (selected once at startup)
//!         ├── Passthrough            no-op
//!         ├── Grayscale              built-in luma conversion
//!         ├── Ambient                built-in serial LED strip mirror
//!         └── DynamicExtension       shared library with C entry points
//! ```
//!
//! # Effect Types
//!
//! | Variant | CLI | Description |
//! |---------|-----|-------------|
//! | **Passthrough** | (default) | Buffer goes out unchanged |
//! | **Grayscale** | `--effect grayscale` | Luma with Rec. 709 weights |
//! | **Ambient** | `--effect ambient` | Top edge sampled to an RGBW strip |
//! | **Dynamic** | `-e <lib.so>` | `init` / `update` / `destroy` symbols |
//!
//! # Adding New Effects
//!
//! 1. Create implementation file with a type implementing [`FrameHook`]
//! 2. Add it as a variant of [`Extension`]
//! 3. Add a matching [`EffectKind`] for the CLI

pub mod ambient;
pub mod dynamic;
pub mod grayscale;

use enum_dispatch::enum_dispatch;
use log::{debug, info};
use std::path::PathBuf;

pub use ambient::Ambient;
pub use dynamic::DynamicExtension;
pub use grayscale::Grayscale;

#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("failed to load extension {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("failed to initialise extension {0}")]
    Init(String),
    #[error("failed to open device {path}: {source}")]
    Device {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Built-in effects selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EffectKind {
    Grayscale,
    Ambient,
}

/// Per-frame post-processing capability.
#[enum_dispatch]
pub trait FrameHook {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Called once before the first frame. An error aborts startup.
    fn init(&mut self) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Process one frame of `width * height` BGR pixels in place.
    fn update(&mut self, width: usize, height: usize, buffer: &mut [u8]);

    /// Called once at shutdown.
    fn destroy(&mut self) {}
}

/// No post-processing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl FrameHook for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn update(&mut self, _width: usize, _height: usize, _buffer: &mut [u8]) {}
}

/// The hook chosen at startup.
#[enum_dispatch(FrameHook)]
pub enum Extension {
    Passthrough,
    Grayscale,
    Ambient,
    DynamicExtension,
}

impl Default for Extension {
    fn default() -> Self {
        Passthrough.into()
    }
}

/// Where the extension of a run comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExtensionSource {
    #[default]
    None,
    Grayscale,
    /// Ambient strip on the given serial device.
    Ambient(PathBuf),
    /// Shared library path.
    Library(PathBuf),
}

impl Extension {
    /// Build the extension described by `source`. Does not call `init`.
    pub fn load(source: &ExtensionSource) -> Result<Self, ExtensionError> {
        Ok(match source {
            ExtensionSource::None => Passthrough.into(),
            ExtensionSource::Grayscale => Grayscale.into(),
            ExtensionSource::Ambient(device) => Ambient::open(device)?.into(),
            ExtensionSource::Library(path) => DynamicExtension::load(path)?.into(),
        })
    }
}

/// Owns an [`Extension`] for one playback session and enforces its
/// lifecycle: `destroy` runs exactly once, on drop.
pub struct Hook {
    extension: Extension,
    destroyed: bool,
}

impl Hook {
    /// Wrap `extension` and run its `init`.
    ///
    /// On failure the extension is still destroyed before the error returns.
    pub fn init(extension: Extension) -> Result<Self, ExtensionError> {
        let mut hook = Self {
            extension,
            destroyed: false,
        };
        hook.extension.init()?;
        info!("Extension '{}' initialised", hook.extension.name());
        Ok(hook)
    }

    pub fn name(&self) -> &str {
        self.extension.name()
    }

    pub fn update(&mut self, width: usize, height: usize, buffer: &mut [u8]) {
        self.extension.update(width, height, buffer);
    }

    /// Run `destroy` now instead of on drop. Idempotent.
    pub fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.extension.destroy();
            debug!("Extension '{}' destroyed", self.extension.name());
        }
    }
}

impl Default for Hook {
    fn default() -> Self {
        Self {
            extension: Extension::default(),
            destroyed: false,
        }
    }
}

impl Drop for Hook {
    fn drop(&mut self) {
        self.destroy();
    }
}
