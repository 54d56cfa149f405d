use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for [`LedgerService`](super::LedgerService).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Upper bound on how long a mutation waits for its user's lock.
    /// `None` waits indefinitely.
    pub lock_timeout_ms: Option<u64>,
}

impl LedgerConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = Some(timeout.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_waits_forever() {
        assert_eq!(LedgerConfig::default().lock_timeout(), None);
    }

    #[test]
    fn test_with_lock_timeout() {
        let config = LedgerConfig::default().with_lock_timeout(Duration::from_millis(250));
        assert_eq!(config.lock_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_deserialize() {
        let config: LedgerConfig = serde_json::from_str(r#"{"lock_timeout_ms": 500}"#).unwrap();
        assert_eq!(config.lock_timeout(), Some(Duration::from_millis(500)));

        let empty: LedgerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, LedgerConfig::default());

        assert!(serde_json::from_str::<LedgerConfig>(r#"{"timeout": 1}"#).is_err());
    }
}
