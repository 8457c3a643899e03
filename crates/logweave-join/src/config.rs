//! Join engine configuration.

use serde::{Deserialize, Serialize};

use crate::binlog::MultiChangePolicy;

/// Tunables for the join engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JoinConfig {
    /// How many candidate rows the session-affinity backward scan inspects.
    pub session_scan_limit: usize,
    /// Maximum age, in seconds, of a session-affinity candidate.
    pub session_window_secs: f64,
    /// How as-of queries resolve multiple changes inside one bracket.
    pub multi_change: MultiChangePolicy,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            session_scan_limit: 20,
            session_window_secs: 600.0,
            multi_change: MultiChangePolicy::default(),
        }
    }
}

impl JoinConfig {
    /// Sets the backward-scan candidate limit.
    #[must_use]
    pub fn with_session_scan_limit(mut self, limit: usize) -> Self {
        self.session_scan_limit = limit;
        self
    }

    /// Sets the session window in seconds.
    #[must_use]
    pub fn with_session_window_secs(mut self, secs: f64) -> Self {
        self.session_window_secs = secs;
        self
    }

    /// Sets the multiple-change resolution policy.
    #[must_use]
    pub fn with_multi_change(mut self, policy: MultiChangePolicy) -> Self {
        self.multi_change = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = JoinConfig::default();
        assert_eq!(config.session_scan_limit, 20);
        assert!((config.session_window_secs - 600.0).abs() < f64::EPSILON);
        assert_eq!(config.multi_change, MultiChangePolicy::TakeFirst);
    }

    #[test]
    fn test_builders() {
        let config = JoinConfig::default()
            .with_session_scan_limit(5)
            .with_session_window_secs(60.0)
            .with_multi_change(MultiChangePolicy::Fail);
        assert_eq!(config.session_scan_limit, 5);
        assert_eq!(config.multi_change, MultiChangePolicy::Fail);
    }
}
