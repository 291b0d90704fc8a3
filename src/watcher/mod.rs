pub mod event;
pub mod flags;
pub mod native;

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context as TaskContext, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::WatchConfig;
use crate::error::{RuntimeError, SetupError};
use event::{ChangeEvent, absolutize, decode};
use native::{EventSink, NativeFacility, NativeMessage, NotifyFacility};

type Item = Result<ChangeEvent, RuntimeError>;

/// A validated set of paths, ready to be watched.
///
/// Constructing a session has no effect on the native facility; registration
/// happens when the stream returned by [`WatchSession::into_stream`] is first
/// polled.
pub struct WatchSession<F: NativeFacility = NotifyFacility> {
    paths: Vec<PathBuf>,
    config: WatchConfig,
    facility: F,
}

impl WatchSession {
    /// Validate `paths` for watching with the platform's native facility.
    ///
    /// Fails with [`SetupError::MissingPaths`] listing every path that does
    /// not exist right now.
    pub fn new<I, P>(paths: I) -> Result<Self, SetupError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::with_config(paths, WatchConfig::default())
    }

    pub fn with_config<I, P>(paths: I, config: WatchConfig) -> Result<Self, SetupError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::with_facility(paths, config, NotifyFacility)
    }
}

impl<F: NativeFacility> WatchSession<F> {
    /// Validate `paths` for watching with an explicit facility.
    pub fn with_facility<I, P>(
        paths: I,
        config: WatchConfig,
        facility: F,
    ) -> Result<Self, SetupError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths = validate_paths(paths)?;
        Ok(Self {
            paths,
            config,
            facility,
        })
    }

    /// Absolute forms of the watched paths, in the order they were given.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Options the stream will register with.
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Turn the session into its event stream. Nothing is registered yet.
    pub fn into_stream(self) -> EventStream<F> {
        EventStream {
            shared: Arc::new(Shared {
                facility: self.facility,
                paths: self.paths,
                config: self.config,
                lifecycle: Mutex::new(Lifecycle::NotStarted),
            }),
            rx: None,
            finished: false,
        }
    }
}

fn validate_paths<I, P>(paths: I) -> Result<Vec<PathBuf>, SetupError>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let mut valid = Vec::new();
    let mut missing = Vec::new();
    for path in paths {
        let path = path.into();
        let absolute = absolutize(path.clone());
        if absolute.exists() {
            valid.push(absolute);
        } else {
            missing.push(path);
        }
    }

    if !missing.is_empty() {
        return Err(SetupError::MissingPaths { paths: missing });
    }
    if valid.is_empty() {
        return Err(SetupError::NoPaths);
    }
    Ok(valid)
}

/// Observable lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Running,
    Stopped,
}

enum Lifecycle<H> {
    NotStarted,
    /// The only state holding a native handle.
    Running {
        handle: H,
        /// The one strong reference to the callback context. Dropping it is
        /// what makes late callbacks no-ops.
        context: Arc<CallbackContext>,
    },
    Stopped,
}

/// State shared between the stream and its cancel handles.
struct Shared<F: NativeFacility> {
    facility: F,
    paths: Vec<PathBuf>,
    config: WatchConfig,
    lifecycle: Mutex<Lifecycle<F::Handle>>,
}

impl<F: NativeFacility> Shared<F> {
    /// Register with the facility. `Ok(None)` means the session was already
    /// stopped (cancelled before the first poll).
    fn start(&self) -> Result<Option<mpsc::UnboundedReceiver<Item>>, RuntimeError> {
        let mut lifecycle = self.lifecycle.lock();
        if !matches!(*lifecycle, Lifecycle::NotStarted) {
            return Ok(None);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let context = Arc::new(CallbackContext {
            tx,
            failed: AtomicBool::new(false),
        });
        let sink = CallbackContext::sink(Arc::downgrade(&context));

        match self.facility.register(&self.paths, &self.config, sink) {
            Ok(handle) => {
                info!(paths = ?self.paths, "watching");
                *lifecycle = Lifecycle::Running { handle, context };
                Ok(Some(rx))
            }
            Err(err) => {
                warn!(error = %err, "native registration failed");
                *lifecycle = Lifecycle::Stopped;
                Err(RuntimeError::SetupFailure(err))
            }
        }
    }

    /// Stop, invalidate and release the registration. Runs at most once; any
    /// later or concurrent call is a no-op.
    fn teardown(&self) {
        let mut lifecycle = self.lifecycle.lock();
        match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running {
                mut handle,
                context,
            } => {
                self.facility.stop(&mut handle);
                self.facility.invalidate(&mut handle);
                self.facility.release(handle);
                drop(context);
                debug!(paths = ?self.paths, "watch session torn down");
            }
            Lifecycle::NotStarted | Lifecycle::Stopped => {}
        }
    }

    fn state(&self) -> SessionState {
        match *self.lifecycle.lock() {
            Lifecycle::NotStarted => SessionState::NotStarted,
            Lifecycle::Running { .. } => SessionState::Running,
            Lifecycle::Stopped => SessionState::Stopped,
        }
    }
}

/// What the native callback reaches through its back-reference.
struct CallbackContext {
    tx: mpsc::UnboundedSender<Item>,
    /// Set after a native error; the session is ending, later entries are dropped.
    failed: AtomicBool,
}

impl CallbackContext {
    /// Build the sink handed to the facility. It holds only a weak reference,
    /// so it neither keeps the session alive nor reaches it after teardown.
    fn sink(context: Weak<CallbackContext>) -> EventSink {
        Arc::new(move |message: NativeMessage| match context.upgrade() {
            Some(context) => context.deliver(message),
            None => trace!("callback after teardown, dropped"),
        })
    }

    fn deliver(&self, message: NativeMessage) {
        if self.failed.load(Ordering::Acquire) {
            return;
        }
        let item = match message {
            NativeMessage::Event(native) => Ok(decode(native.id, native.path, native.flags)),
            NativeMessage::Error(err) => {
                warn!(error = %err, "native watch error, ending session");
                self.failed.store(true, Ordering::Release);
                Err(RuntimeError::Native(err))
            }
        };
        // Unbounded: never blocks the delivery thread.
        if self.tx.send(item).is_err() {
            trace!("consumer gone, event dropped");
        }
    }
}

/// Live sequence of [`ChangeEvent`]s for one session.
///
/// The first poll registers with the native facility. The stream ends after
/// yielding an error, or once it has been cancelled and the events buffered
/// before cancellation are drained. Dropping it cancels the session.
pub struct EventStream<F: NativeFacility = NotifyFacility> {
    shared: Arc<Shared<F>>,
    rx: Option<mpsc::UnboundedReceiver<Item>>,
    finished: bool,
}

impl<F: NativeFacility> EventStream<F> {
    /// A handle that can cancel this stream from another task or thread.
    pub fn cancel_handle(&self) -> CancelHandle<F> {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Tear the session down. Buffered events are still yielded afterwards.
    pub fn cancel(&self) {
        self.shared.teardown();
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// The session's watched paths, as reported by [`WatchSession::paths`].
    pub fn paths(&self) -> &[PathBuf] {
        &self.shared.paths
    }

    fn finish(&mut self) {
        self.finished = true;
        self.rx = None;
        self.shared.teardown();
    }
}

impl<F: NativeFacility> Stream for EventStream<F> {
    type Item = Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        if this.rx.is_none() {
            match this.shared.start() {
                Ok(Some(rx)) => this.rx = Some(rx),
                Ok(None) => {
                    this.finish();
                    return Poll::Ready(None);
                }
                Err(err) => {
                    this.finish();
                    return Poll::Ready(Some(Err(err)));
                }
            }
        }

        let Some(rx) = this.rx.as_mut() else {
            return Poll::Ready(None);
        };
        match rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(event))) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(Some(Err(err))) => {
                this.finish();
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F: NativeFacility> Drop for EventStream<F> {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

/// Cancels an [`EventStream`] from anywhere. Cancelling twice, or after the
/// stream ended, does nothing.
pub struct CancelHandle<F: NativeFacility = NotifyFacility> {
    shared: Arc<Shared<F>>,
}

impl<F: NativeFacility> CancelHandle<F> {
    pub fn cancel(&self) {
        self.shared.teardown();
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }
}

impl<F: NativeFacility> Clone for CancelHandle<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}
