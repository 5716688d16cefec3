//! Prefetch queue - reads upcoming sources into memory on a background thread.
//!
//! **Why**: Disk reads are the only slow operation in the playback loop. The
//! player keeps a few sources in flight so that decoding the next animation
//! never waits on I/O while the current one is still on the panel.
//!
//! # Ring Layout
//!
//! `capacity + 1` slots addressed by a head/tail pair; `head == tail` means
//! empty, `head + 1 == tail` means full. The player writes at `head`
//! ([`Loader::submit`]), consumes at `tail` ([`Loader::take`]), and the single
//! worker walks the ring behind `head`, resolving each slot exactly once.
//!
//! # Synchronization
//!
//! One mutex guards indices, slots and the destroyed flag. One condition
//! variable is broadcast on every state change; every waiter re-checks its own
//! predicate. The worker only looks at the destroyed flag between files, so a
//! read in progress always runs to completion.

use log::{debug, trace, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Reads one source into memory. Runs on the worker thread.
pub type ReadFn = Box<dyn Fn(&Path) -> io::Result<Vec<u8>> + Send + 'static>;

/// Caller-visible refusal of a [`Loader::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LoaderError {
    #[error("queue is full")]
    Full,
    #[error("loader has been shut down")]
    ShutDown,
}

/// Source bytes handed over by [`Loader::take`].
#[derive(Debug)]
pub struct Payload {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
enum SlotStatus {
    #[default]
    Empty,
    Loading,
    Ready(Vec<u8>),
    Failed,
}

#[derive(Debug, Default)]
struct Slot {
    path: PathBuf,
    status: SlotStatus,
}

#[derive(Debug)]
struct Ring {
    slots: Vec<Slot>,
    head: usize,
    tail: usize,
    destroyed: bool,
}

impl Ring {
    fn next(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }
}

struct Shared {
    ring: Mutex<Ring>,
    condition: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bounded FIFO of in-flight file loads with one dedicated reader thread.
///
/// Shareable across threads; [`Loader::shutdown`] may be called while another
/// thread is blocked in [`Loader::take`].
pub struct Loader {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
}

impl Loader {
    /// Create a queue holding up to `capacity` outstanding loads, reading files
    /// from disk.
    pub fn new(capacity: usize) -> io::Result<Self> {
        Self::with_reader(capacity, Box::new(|path: &Path| std::fs::read(path)))
    }

    /// Create a queue with a custom read function (used by tests to control
    /// load timing).
    pub fn with_reader(capacity: usize, read: ReadFn) -> io::Result<Self> {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity + 1);
        slots.resize_with(capacity + 1, Slot::default);

        let shared = Arc::new(Shared {
            ring: Mutex::new(Ring {
                slots,
                head: 0,
                tail: 0,
                destroyed: false,
            }),
            condition: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("panelplayer-loader".to_string())
            .spawn(move || process(&worker_shared, read))?;

        trace!("Loader initialized: capacity {}", capacity);

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
            capacity,
        })
    }

    /// Number of loads that may be outstanding at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue `path` for loading. Never blocks.
    ///
    /// Submitting to a full queue is a caller error: it is logged, refused with
    /// [`LoaderError::Full`] and leaves the queue untouched.
    pub fn submit(&self, path: impl Into<PathBuf>) -> Result<(), LoaderError> {
        let mut ring = self.shared.lock();

        if ring.destroyed {
            return Err(LoaderError::ShutDown);
        }

        let next = ring.next(ring.head);
        if next == ring.tail {
            warn!("Queue is full!");
            return Err(LoaderError::Full);
        }

        let head = ring.head;
        ring.slots[head] = Slot {
            path: path.into(),
            status: SlotStatus::Loading,
        };
        ring.head = next;

        self.shared.condition.notify_all();
        Ok(())
    }

    /// Wait for the oldest outstanding load and take ownership of its bytes.
    ///
    /// Returns `None` when the load failed, when the queue is empty (caller
    /// error, returns immediately) or when the loader is shut down while
    /// waiting.
    pub fn take(&self) -> Option<Payload> {
        let mut ring = self.shared.lock();

        if ring.head == ring.tail {
            warn!("No files in queue!");
            return None;
        }

        let tail = ring.tail;
        ring = self
            .shared
            .condition
            .wait_while(ring, |ring| {
                !ring.destroyed && matches!(ring.slots[tail].status, SlotStatus::Loading)
            })
            .unwrap_or_else(PoisonError::into_inner);

        if ring.destroyed {
            return None;
        }

        let slot = std::mem::take(&mut ring.slots[tail]);
        ring.tail = ring.next(tail);
        self.shared.condition.notify_all();

        match slot.status {
            SlotStatus::Ready(bytes) => Some(Payload {
                path: slot.path,
                bytes,
            }),
            _ => None,
        }
    }

    /// Stop the worker, wake every waiter and drop unconsumed payloads.
    ///
    /// Idempotent. Blocks until the worker has finished the file it is
    /// currently reading.
    pub fn shutdown(&self) {
        {
            let mut ring = self.shared.lock();
            ring.destroyed = true;
            self.shared.condition.notify_all();
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(handle) = handle else {
            return;
        };

        if handle.join().is_err() {
            warn!("Loader thread panicked");
        }

        let mut ring = self.shared.lock();
        let mut dropped = 0;
        while ring.head != ring.tail {
            let tail = ring.tail;
            ring.slots[tail] = Slot::default();
            ring.tail = ring.next(tail);
            dropped += 1;
        }

        debug!("Loader stopped, {} unconsumed slot(s) released", dropped);
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker loop: resolve slots in ring order until the loader is destroyed.
fn process(shared: &Shared, read: ReadFn) {
    let mut index = 0;
    let mut ring = shared.lock();

    loop {
        ring = shared
            .condition
            .wait_while(ring, |ring| !ring.destroyed && index == ring.head)
            .unwrap_or_else(PoisonError::into_inner);

        if ring.destroyed {
            break;
        }

        let path = ring.slots[index].path.clone();
        drop(ring);

        let status = match read(&path) {
            Ok(bytes) if bytes.is_empty() => {
                warn!("Failed to read {}: file is empty", path.display());
                SlotStatus::Failed
            }
            Ok(bytes) => {
                trace!("Loaded {} ({} bytes)", path.display(), bytes.len());
                SlotStatus::Ready(bytes)
            }
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                SlotStatus::Failed
            }
        };

        ring = shared.lock();
        ring.slots[index].status = status;
        shared.condition.notify_all();
        index = ring.next(index);
    }

    trace!("Loader thread stopped");
}
