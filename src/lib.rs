//! Watch files and directories and consume their change notifications as an
//! async [`Stream`](futures::Stream).
//!
//! ```no_run
//! use fswatch_stream::WatchSession;
//! use futures::StreamExt;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut events = WatchSession::new(["/tmp"])?.into_stream();
//! while let Some(event) = events.next().await {
//!     println!("{}", event?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod watcher;

pub use config::WatchConfig;
pub use error::{NativeError, RuntimeError, SetupError};
pub use watcher::event::{ChangeEvent, ChangeKind, Classification, ItemKind, classify, decode};
pub use watcher::flags::EventFlags;
pub use watcher::native::{NativeFacility, NotifyFacility};
pub use watcher::{CancelHandle, EventStream, SessionState, WatchSession};
