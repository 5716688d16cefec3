//! Extensions loaded from a shared library at runtime.
//!
//! The library may export any of three C entry points:
//!
//! ```c
//! bool init(void);                                    // true = failure
//! void update(int width, int height, uint8_t *frame); // BGR, in place
//! void destroy(void);
//! ```
//!
//! A library without `update` is a pass-through. The library stays loaded
//! until the extension is dropped, after `destroy` has run.

use libloading::Library;
use log::{debug, info};
use std::os::raw::c_int;
use std::path::{Path, PathBuf};

use super::{ExtensionError, FrameHook};

type InitFn = unsafe extern "C" fn() -> bool;
type UpdateFn = unsafe extern "C" fn(c_int, c_int, *mut u8);
type DestroyFn = unsafe extern "C" fn();

pub struct DynamicExtension {
    name: String,
    path: PathBuf,
    init: Option<InitFn>,
    update: Option<UpdateFn>,
    destroy: Option<DestroyFn>,
    // Declared last: unloaded after every entry point above is unreachable
    _library: Library,
}

impl DynamicExtension {
    /// Load the library at `path` and resolve its entry points.
    pub fn load(path: &Path) -> Result<Self, ExtensionError> {
        // SAFETY: loading runs the library's initialisers; the path comes from
        // the operator and is trusted like the executable itself.
        let library = unsafe { Library::new(path) }.map_err(|source| ExtensionError::Load {
            path: path.to_path_buf(),
            source,
        })?;

        // SAFETY: the symbol types match the documented extension ABI. The
        // copied function pointers are only called while `library` is alive.
        let (init, update, destroy) = unsafe {
            (
                library.get::<InitFn>(b"init\0").ok().map(|s| *s),
                library.get::<UpdateFn>(b"update\0").ok().map(|s| *s),
                library.get::<DestroyFn>(b"destroy\0").ok().map(|s| *s),
            )
        };

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        info!(
            "Loaded extension {} (init: {}, update: {}, destroy: {})",
            path.display(),
            init.is_some(),
            update.is_some(),
            destroy.is_some()
        );
        if update.is_none() {
            debug!("Extension {} has no update function, frames pass through", name);
        }

        Ok(Self {
            name,
            path: path.to_path_buf(),
            init,
            update,
            destroy,
            _library: library,
        })
    }
}

impl FrameHook for DynamicExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) -> Result<(), ExtensionError> {
        if let Some(init) = self.init {
            // SAFETY: resolved from the still-loaded library, ABI as documented.
            if unsafe { init() } {
                return Err(ExtensionError::Init(self.path.display().to_string()));
            }
        }
        Ok(())
    }

    fn update(&mut self, width: usize, height: usize, buffer: &mut [u8]) {
        let Some(update) = self.update else {
            return;
        };
        debug_assert!(buffer.len() >= width * height * 3);
        // SAFETY: `buffer` holds width * height * 3 bytes for the duration of
        // the call; the extension must not keep the pointer.
        unsafe { update(width as c_int, height as c_int, buffer.as_mut_ptr()) }
    }

    fn destroy(&mut self) {
        if let Some(destroy) = self.destroy {
            // SAFETY: resolved from the still-loaded library, ABI as documented.
            unsafe { destroy() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::effects::{Extension, Hook};
    use std::process::Command;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Present on every glibc system, exports none of the entry points.
    const LIBM: &str = "libm.so.6";

    /// Extension backed by a real loaded library but with entry points
    /// defined here.
    fn extension(init: Option<InitFn>, update: Option<UpdateFn>, destroy: Option<DestroyFn>) -> DynamicExtension {
        let library = unsafe { Library::new(LIBM) }.unwrap();
        DynamicExtension {
            name: "local".to_string(),
            path: PathBuf::from(LIBM),
            init,
            update,
            destroy,
            _library: library,
        }
    }

    extern "C" fn init_fails() -> bool {
        true
    }

    extern "C" fn init_succeeds() -> bool {
        false
    }

    extern "C" fn invert(width: c_int, height: c_int, frame: *mut u8) {
        let len = (width * height * 3) as usize;
        let frame = unsafe { std::slice::from_raw_parts_mut(frame, len) };
        for value in frame {
            *value = 255 - *value;
        }
    }

    static DESTROYED_AFTER_FAILED_INIT: AtomicUsize = AtomicUsize::new(0);
    extern "C" fn count_failed_init_destroy() {
        DESTROYED_AFTER_FAILED_INIT.fetch_add(1, Ordering::SeqCst);
    }

    static DESTROYED_AFTER_PLAYBACK: AtomicUsize = AtomicUsize::new(0);
    extern "C" fn count_playback_destroy() {
        DESTROYED_AFTER_PLAYBACK.fetch_add(1, Ordering::SeqCst);
    }

    /// Compile `source` into a shared library with the system C compiler.
    /// `None` when no compiler is installed.
    fn build_library(dir: &Path, source: &str) -> Option<PathBuf> {
        let c_file = dir.join("extension.c");
        let library = dir.join("libextension.so");
        std::fs::write(&c_file, source).unwrap();

        let status = Command::new("cc")
            .args(["-shared", "-fPIC", "-o"])
            .arg(&library)
            .arg(&c_file)
            .status()
            .ok()?;
        assert!(status.success(), "cc failed to build the test extension");
        Some(library)
    }

    const C_EXTENSION: &str = r#"
#include <stdbool.h>
#include <stdint.h>
#include <stdio.h>

static int ready = 0;

bool init(void) {
    ready = 1;
    return INIT_RESULT;
}

void update(int width, int height, uint8_t *frame) {
    if (!ready) return;
    for (int i = 0; i < width * height * 3; i++) frame[i] = 255 - frame[i];
}

void destroy(void) {
    FILE *f = fopen("MARKER_PATH", "a");
    if (f) {
        fputc('d', f);
        fclose(f);
    }
}
"#;

    fn c_extension(marker: &Path, fail_init: bool) -> String {
        C_EXTENSION
            .replace("INIT_RESULT", if fail_init { "true" } else { "false" })
            .replace("MARKER_PATH", &marker.display().to_string())
    }

    #[test]
    fn test_missing_library_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.so");

        match DynamicExtension::load(&path) {
            Err(ExtensionError::Load { path: p, .. }) => assert_eq!(p, path),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("loaded a missing library"),
        }
    }

    #[test]
    fn test_non_library_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.so");
        std::fs::write(&path, b"not an elf").unwrap();

        assert!(matches!(
            DynamicExtension::load(&path),
            Err(ExtensionError::Load { .. })
        ));
    }

    #[test]
    fn test_library_without_entry_points_passes_frames_through() {
        let loaded = DynamicExtension::load(Path::new(LIBM)).unwrap();
        assert!(loaded.init.is_none() && loaded.update.is_none() && loaded.destroy.is_none());
        assert_eq!(loaded.name(), "libm.so");

        let mut hook = Hook::init(loaded.into()).unwrap();
        let mut buffer = vec![1, 2, 3, 4, 5, 6];
        hook.update(2, 1, &mut buffer);
        assert_eq!(buffer, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_failed_init_aborts_and_still_destroys() {
        let failing = extension(Some(init_fails), Some(invert), Some(count_failed_init_destroy));

        let result = Hook::init(Extension::from(failing));
        assert!(matches!(result, Err(ExtensionError::Init(_))));
        assert_eq!(DESTROYED_AFTER_FAILED_INIT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_update_runs_in_place_and_destroy_runs_once() {
        let ext = extension(Some(init_succeeds), Some(invert), Some(count_playback_destroy));
        let mut hook = Hook::init(ext.into()).unwrap();

        let mut buffer = vec![0, 10, 255, 100, 200, 55];
        hook.update(2, 1, &mut buffer);
        assert_eq!(buffer, vec![255, 245, 0, 155, 55, 200]);

        hook.destroy();
        drop(hook);
        assert_eq!(DESTROYED_AFTER_PLAYBACK.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_compiled_extension_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("destroyed");
        let Some(path) = build_library(dir.path(), &c_extension(&marker, false)) else {
            eprintln!("skipping: no C compiler available");
            return;
        };

        let loaded = DynamicExtension::load(&path).unwrap();
        assert!(loaded.init.is_some() && loaded.update.is_some() && loaded.destroy.is_some());

        let mut hook = Hook::init(loaded.into()).unwrap();
        let mut buffer = vec![0, 1, 2, 253, 254, 255];
        hook.update(2, 1, &mut buffer);
        assert_eq!(buffer, vec![255, 254, 253, 2, 1, 0]);
        assert!(!marker.exists());

        drop(hook);
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "d");
    }

    #[test]
    fn test_compiled_extension_failing_init() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("destroyed");
        let Some(path) = build_library(dir.path(), &c_extension(&marker, true)) else {
            eprintln!("skipping: no C compiler available");
            return;
        };

        let loaded = DynamicExtension::load(&path).unwrap();
        assert!(matches!(Hook::init(loaded.into()), Err(ExtensionError::Init(_))));
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "d");
    }
}
