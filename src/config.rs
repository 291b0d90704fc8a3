use std::time::Duration;

use serde::Deserialize;

/// Options applied when a session registers with the native facility.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Watch directories recursively (default `true`).
    pub recursive: bool,
    /// When set, poll at this interval instead of using the OS facility.
    /// Useful on network and virtual file systems that emit no notifications.
    #[serde(rename = "poll_interval_ms", deserialize_with = "millis::deserialize")]
    pub poll_interval: Option<Duration>,
    /// Follow symbolic links while polling. Ignored by the OS facility.
    pub follow_symlinks: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            poll_interval: None,
            follow_symlinks: true,
        }
    }
}

impl WatchConfig {
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WatchConfig::default();
        assert!(config.recursive);
        assert!(config.follow_symlinks);
        assert_eq!(config.poll_interval, None);
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{"recursive": false, "poll_interval_ms": 250}"#;
        let config: WatchConfig = serde_json::from_str(json).unwrap();
        assert!(!config.recursive);
        assert!(config.follow_symlinks, "defaults fill missing fields");
        assert_eq!(config.poll_interval, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_builder() {
        let config = WatchConfig::default()
            .recursive(false)
            .poll_interval(Duration::from_secs(1))
            .follow_symlinks(false);
        assert_eq!(
            config,
            WatchConfig {
                recursive: false,
                poll_interval: Some(Duration::from_secs(1)),
                follow_symlinks: false,
            }
        );
    }
}
