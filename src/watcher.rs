//! Filesystem watcher with debounced, coalesced update events.
//!
//! Events within a debounce window are collected, de-duplicated per path,
//! sorted lexicographically and classified against the live filesystem:
//! an existing file emits `FileUpdated`, a missing one `FileRemoved`.
//! Delivery is FIFO over a bounded channel; when the channel is full,
//! older pending events for the same path coalesce to the newest.
//! `IndexError` events are never dropped.

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::validation;

/// Minimum debounce the watcher will accept.
pub const MIN_DEBOUNCE_MS: u64 = 50;

/// One durable index update, emitted in the order it became durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UpdateEvent {
    FileUpdated(PathBuf),
    FileRemoved(PathBuf),
    IndexError { path: PathBuf, message: String },
}

impl UpdateEvent {
    pub fn path(&self) -> &Path {
        match self {
            UpdateEvent::FileUpdated(path) => path,
            UpdateEvent::FileRemoved(path) => path,
            UpdateEvent::IndexError { path, .. } => path,
        }
    }
}

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Root directory for path validation
    pub root_path: PathBuf,
    /// Debounce delay in milliseconds; clamped to `MIN_DEBOUNCE_MS`
    pub debounce_ms: u64,
    /// Bounded channel capacity
    pub channel_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("."),
            debounce_ms: 200,
            channel_capacity: 1024,
        }
    }
}

/// Filesystem watcher emitting [`UpdateEvent`]s on a bounded channel.
pub struct SourceWatcher {
    watcher_thread: Option<thread::JoinHandle<()>>,
    receiver: async_channel::Receiver<UpdateEvent>,
    shutdown: Arc<AtomicBool>,
}

impl SourceWatcher {
    /// Watch `path` recursively. The returned watcher owns a background
    /// thread that runs until `shutdown()` or drop.
    pub fn new(path: PathBuf, config: WatcherConfig) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = async_channel::bounded(config.channel_capacity.max(1));

        let config = WatcherConfig { root_path: path.clone(), ..config };
        let thread_shutdown = Arc::clone(&shutdown);
        let thread = thread::spawn(move || {
            if let Err(e) = run_watcher(path, tx, config, thread_shutdown) {
                eprintln!("Watcher error: {e:?}");
            }
        });

        Ok(Self {
            watcher_thread: Some(thread),
            receiver: rx,
            shutdown,
        })
    }

    /// Channel of update events, usable from sync (`recv_blocking`) and
    /// async (`recv`) consumers alike.
    pub fn events(&self) -> async_channel::Receiver<UpdateEvent> {
        self.receiver.clone()
    }

    /// Blocking receive with a timeout; `Ok(None)` when the watcher has
    /// terminated.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<UpdateEvent>, ()> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Ok(Some(event)),
                Err(async_channel::TryRecvError::Closed) => return Ok(None),
                Err(async_channel::TryRecvError::Empty) => {
                    if std::time::Instant::now() >= deadline {
                        return Err(());
                    }
                    thread::sleep(Duration::from_millis(10));
                }
            }
        }
    }

    /// Signal the watcher thread to stop and join it.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.watcher_thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SourceWatcher {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Shared queue of pending events; newest event per path wins, errors are
/// queued separately so they can never be displaced.
#[derive(Default)]
struct PendingEvents {
    files: BTreeMap<PathBuf, UpdateEvent>,
    errors: Vec<UpdateEvent>,
}

fn run_watcher(
    path: PathBuf,
    tx: async_channel::Sender<UpdateEvent>,
    config: WatcherConfig,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let debounce = Duration::from_millis(config.debounce_ms.max(MIN_DEBOUNCE_MS));
    let root = config.root_path.clone();

    let pending = Arc::new(Mutex::new(PendingEvents::default()));
    let callback_pending = Arc::clone(&pending);
    let callback_tx = tx.clone();
    let callback_root = root.clone();

    let mut debouncer = new_debouncer(
        debounce,
        move |result: notify_debouncer_mini::DebounceEventResult| match result {
            Ok(events) => {
                {
                    let mut pending = callback_pending.lock().unwrap();
                    for event in &events {
                        if let Some(update) = classify_event(&event.path, &callback_root) {
                            match &update {
                                UpdateEvent::IndexError { .. } => pending.errors.push(update),
                                other => {
                                    pending
                                        .files
                                        .insert(other.path().to_path_buf(), update.clone());
                                }
                            }
                        }
                    }
                }
                drain_pending(&callback_pending, &callback_tx);
            }
            Err(error) => {
                eprintln!("Watcher error: {error:?}");
            }
        },
    )?;

    debouncer.watcher().watch(&path, RecursiveMode::Recursive)?;

    // Keep the thread alive, retrying any events left behind by a full
    // channel, until shutdown is signaled.
    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(250));
        drain_pending(&pending, &tx);
    }

    Ok(())
}

/// Classify a raw filesystem event against the live filesystem state.
///
/// The debouncer does not preserve event types, so existence decides:
/// present means updated, absent means removed. Paths outside the root
/// and context/cache artifacts are discarded.
fn classify_event(path: &Path, root: &Path) -> Option<UpdateEvent> {
    if path.is_dir() {
        return None;
    }
    let path_str = path.to_string_lossy();
    if is_context_artifact(&path_str) {
        return None;
    }

    if path.exists() {
        match validation::validate_path_within_root(path, root) {
            Ok(canonical) => Some(UpdateEvent::FileUpdated(canonical)),
            Err(validation::PathValidationError::CannotCanonicalize(_)) => None,
            Err(err) => {
                eprintln!("WARNING: watcher rejected path: {err}");
                None
            }
        }
    } else {
        // Removed files cannot be canonicalized; the traversal pre-check
        // still applies.
        if validation::has_suspicious_traversal(&path_str) {
            eprintln!("WARNING: watcher rejected suspicious path: {path_str}");
            return None;
        }
        Some(UpdateEvent::FileRemoved(path.to_path_buf()))
    }
}

/// Flush pending events FIFO; file events stop at a full channel (they
/// stay coalesced in the map), error events block until delivered.
fn drain_pending(pending: &Arc<Mutex<PendingEvents>>, tx: &async_channel::Sender<UpdateEvent>) {
    let mut pending = pending.lock().unwrap();

    for error in pending.errors.drain(..) {
        // IndexError events are never dropped.
        let _ = tx.send_blocking(error);
    }

    while let Some(key) = pending.files.keys().next().cloned() {
        let event = pending.files.remove(&key).expect("key just observed");
        match tx.try_send(event) {
            Ok(()) => {}
            Err(async_channel::TrySendError::Full(event)) => {
                // Put it back; newer events for the same path will replace
                // it while we wait for capacity.
                pending.files.insert(key, event);
                break;
            }
            Err(async_channel::TrySendError::Closed(_)) => return,
        }
    }
}

/// Engine-owned context and cache artifacts must not feed back into the
/// watcher.
fn is_context_artifact(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    normalized.contains("_context/") || normalized.ends_with(".scip")
}
