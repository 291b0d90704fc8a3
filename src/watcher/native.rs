//! The native monitoring facility behind a session.
//!
//! [`NativeFacility`] is the minimal capability a session needs from the OS:
//! register a set of paths with a callback, then stop, invalidate and release
//! that registration. [`NotifyFacility`] is the real backend; tests swap in
//! recording doubles.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{CreateKind, MetadataKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::flags::EventFlags;
use crate::config::WatchConfig;
use crate::error::NativeError;

/// One entry of a native callback invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeEvent {
    pub id: u64,
    pub path: PathBuf,
    pub flags: u32,
}

/// What the facility hands to the sink.
#[derive(Debug)]
pub enum NativeMessage {
    Event(NativeEvent),
    Error(NativeError),
}

/// Callback invoked by the facility on its own delivery thread.
///
/// Must not block: it runs on the thread that delivers every other event too.
pub type EventSink = Arc<dyn Fn(NativeMessage) + Send + Sync>;

/// Capability interface over an OS-level change notification source.
///
/// A session calls `register` once, and on teardown calls `stop`,
/// `invalidate` and `release` once each, in that order.
pub trait NativeFacility: Send + Sync + 'static {
    type Handle: Send + 'static;

    /// Start delivering events for `paths` to `sink`.
    fn register(
        &self,
        paths: &[PathBuf],
        config: &WatchConfig,
        sink: EventSink,
    ) -> Result<Self::Handle, NativeError>;

    /// Stop event delivery.
    fn stop(&self, handle: &mut Self::Handle);

    /// Detach the sink. Once this returns the facility must not call it again.
    fn invalidate(&self, handle: &mut Self::Handle);

    /// Free every resource held by the registration.
    fn release(&self, handle: Self::Handle);
}

/// Backend built on the `notify` crate: the platform's recommended watcher
/// (FSEvents, inotify, kqueue, ReadDirectoryChangesW), or polling when a poll
/// interval is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyFacility;

/// Live `notify` registration.
pub struct NotifyHandle {
    /// Dropping the watcher shuts its delivery thread down.
    watcher: Box<dyn Watcher + Send>,
    paths: Vec<PathBuf>,
    sink: Arc<Mutex<Option<EventSink>>>,
}

impl NativeFacility for NotifyFacility {
    type Handle = NotifyHandle;

    fn register(
        &self,
        paths: &[PathBuf],
        config: &WatchConfig,
        sink: EventSink,
    ) -> Result<NotifyHandle, NativeError> {
        let slot = Arc::new(Mutex::new(Some(sink)));
        let handler_slot = Arc::clone(&slot);
        let mut translator = Translator::default();

        let handler = move |res: notify::Result<Event>| {
            // Held for the whole dispatch so `invalidate` waits out an
            // in-flight callback.
            let guard = handler_slot.lock();
            let Some(sink) = guard.as_ref() else {
                trace!("callback after invalidation, dropped");
                return;
            };
            match res {
                Ok(event) => {
                    for entry in translator.entries(&event) {
                        sink(NativeMessage::Event(entry));
                    }
                }
                Err(err) => sink(NativeMessage::Error(err.into())),
            }
        };

        let mut watcher: Box<dyn Watcher + Send> = match config.poll_interval {
            Some(interval) => {
                let notify_config = notify::Config::default()
                    .with_poll_interval(interval)
                    .with_follow_symlinks(config.follow_symlinks);
                Box::new(PollWatcher::new(handler, notify_config)?)
            }
            None => {
                let watcher = RecommendedWatcher::new(handler, notify::Config::default())?;
                Box::new(watcher)
            }
        };

        let mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        for path in paths {
            watcher.watch(path, mode)?;
        }

        Ok(NotifyHandle {
            watcher,
            paths: paths.to_vec(),
            sink: slot,
        })
    }

    fn stop(&self, handle: &mut NotifyHandle) {
        for path in &handle.paths {
            // The path may have been deleted, which already removed the watch.
            if let Err(err) = handle.watcher.unwatch(path) {
                debug!(path = %path.display(), error = %err, "unwatch failed");
            }
        }
    }

    fn invalidate(&self, handle: &mut NotifyHandle) {
        handle.sink.lock().take();
    }

    fn release(&self, handle: NotifyHandle) {
        drop(handle);
    }
}

/// Per-registration state turning `notify` events into native entries.
#[derive(Debug)]
struct Translator {
    next_id: u64,
    /// Tracker of the last rename half (`From` or `To`) already reported.
    rename_tracker: Option<usize>,
}

impl Default for Translator {
    fn default() -> Self {
        Self {
            next_id: 1,
            rename_tracker: None,
        }
    }
}

impl Translator {
    /// Entries for one `notify` event, with ids continuing the registration's
    /// sequence.
    ///
    /// inotify reports a rename as a `From` half, a `To` half and then a
    /// `Both` pair sharing their tracker. The halves already name both paths
    /// once each, so the pair is skipped.
    fn entries(&mut self, event: &Event) -> Vec<NativeEvent> {
        if let EventKind::Modify(ModifyKind::Name(mode)) = &event.kind {
            let tracker = event.tracker();
            match mode {
                RenameMode::From | RenameMode::To => self.rename_tracker = tracker,
                RenameMode::Both if tracker.is_some() && tracker == self.rename_tracker => {
                    trace!("rename pair already reported by its halves");
                    return Vec::new();
                }
                _ => {}
            }
        }

        translate(event)
            .into_iter()
            .map(|(path, flags)| {
                let id = self.next_id;
                self.next_id += 1;
                NativeEvent {
                    id,
                    path,
                    flags: flags.bits(),
                }
            })
            .collect()
    }
}

/// Translate a `notify` event into one `(path, flags)` entry per path, using
/// the FSEvents bit layout.
///
/// Access events are not changes and produce no entries. The source half of a
/// rename reported on its own usually has no item bit: nothing is left at the
/// old path to inspect.
pub(crate) fn translate(event: &Event) -> Vec<(PathBuf, EventFlags)> {
    let change = match &event.kind {
        EventKind::Access(_) => return Vec::new(),
        EventKind::Create(_) => EventFlags::ITEM_CREATED,
        EventKind::Remove(_) => EventFlags::ITEM_REMOVED,
        EventKind::Modify(ModifyKind::Name(_)) => EventFlags::ITEM_RENAMED,
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::Ownership)) => {
            EventFlags::ITEM_CHANGE_OWNER
        }
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::Extended)) => {
            EventFlags::ITEM_XATTR_MOD
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => EventFlags::ITEM_INODE_META_MOD,
        EventKind::Modify(_) => EventFlags::ITEM_MODIFIED,
        EventKind::Any | EventKind::Other => EventFlags::empty(),
    };

    let rescan = if event.need_rescan() {
        EventFlags::MUST_SCAN_SUB_DIRS
    } else {
        EventFlags::empty()
    };

    let declared = match &event.kind {
        EventKind::Create(CreateKind::File) | EventKind::Remove(RemoveKind::File) => {
            Some(EventFlags::ITEM_IS_FILE)
        }
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {
            Some(EventFlags::ITEM_IS_DIR)
        }
        _ => None,
    };

    // Both ends of a rename are the same item; only the destination can be stat'ed.
    let renamed = match (&event.kind, event.paths.as_slice()) {
        (EventKind::Modify(ModifyKind::Name(RenameMode::Both)), [_, to]) => item_flags(to),
        _ => None,
    };

    event
        .paths
        .iter()
        .map(|path| {
            let item = declared
                .or(renamed)
                .or_else(|| item_flags(path))
                .unwrap_or(EventFlags::empty());
            (path.clone(), change | item | rescan)
        })
        .collect()
}

/// Item-kind bit for whatever currently sits at `path`, without following symlinks.
fn item_flags(path: &Path) -> Option<EventFlags> {
    let file_type = std::fs::symlink_metadata(path).ok()?.file_type();
    if file_type.is_symlink() {
        Some(EventFlags::ITEM_IS_SYMLINK)
    } else if file_type.is_dir() {
        Some(EventFlags::ITEM_IS_DIR)
    } else if file_type.is_file() {
        Some(EventFlags::ITEM_IS_FILE)
    } else {
        None
    }
}
