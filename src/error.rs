use std::path::PathBuf;

/// Errors raised while constructing a [`WatchSession`](crate::WatchSession).
///
/// These never touch the native facility; fix the input and retry.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SetupError {
    #[error("no paths to watch")]
    NoPaths,

    #[error("paths do not exist: {}", display_paths(.paths))]
    MissingPaths { paths: Vec<PathBuf> },
}

/// Errors surfaced on the event stream. Each one ends the stream.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RuntimeError {
    #[error("failed to start watching: {0}")]
    SetupFailure(#[source] NativeError),

    #[error("watch failed: {0}")]
    Native(#[source] NativeError),
}

/// Opaque failure reported by the native facility.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum NativeError {
    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error("{0}")]
    Other(String),
}

impl NativeError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
