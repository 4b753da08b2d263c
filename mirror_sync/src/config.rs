use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine settings.
///
/// Every field has a default, so an empty `[engine]` table (or none at all)
/// is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MirrorConfig {
    /// Upper bound for a single blob fetch. `0` disables the timeout.
    pub fetch_timeout_ms: u64,
    /// Number of memoized transform results kept before LRU eviction.
    pub memo_capacity: usize,
    /// Maximum number of cached blobs. Unbounded when absent.
    pub blob_cache_capacity: Option<usize>,
    /// Release fan-out children when their parent subscription goes away.
    pub cascade_unsubscribe: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 30_000,
            memo_capacity: 1024,
            blob_cache_capacity: None,
            cascade_unsubscribe: false,
        }
    }
}

impl MirrorConfig {
    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_ms > 0).then(|| Duration::from_millis(self.fetch_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: MirrorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, MirrorConfig::default());
        assert_eq!(config.fetch_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let config: MirrorConfig =
            serde_json::from_str(r#"{"fetch_timeout_ms": 0, "blob_cache_capacity": 8}"#).unwrap();
        assert_eq!(config.fetch_timeout(), None);
        assert_eq!(config.blob_cache_capacity, Some(8));
        assert!(!config.cascade_unsubscribe);
    }
}
