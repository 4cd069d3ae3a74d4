use serde::Deserialize;
use std::time::Duration;

/// Tunables of one session engine.
///
/// Deserializable so hosts can read it from their own config files; every
/// field falls back to its default when absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lifetime of a raised hand that is never lowered.
    pub hand_raise_ttl_ms: u64,
    /// How long ICE candidates for an unknown peer are kept.
    pub orphan_candidate_ttl_ms: u64,
    /// Wait after `request-state` before the projection counts as settled.
    pub reconcile_timeout_ms: u64,
    /// Frames held while the relay is unreachable.
    pub outbox_capacity: usize,
    pub command_capacity: usize,
    pub event_capacity: usize,
    /// Queue between peer links and the session loop.
    pub link_event_capacity: usize,
    /// Hold initial offers until local media has been declared.
    pub require_local_media: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hand_raise_ttl_ms: 50_000,
            orphan_candidate_ttl_ms: 10_000,
            reconcile_timeout_ms: 3_000,
            outbox_capacity: 256,
            command_capacity: 64,
            event_capacity: 128,
            link_event_capacity: 256,
            require_local_media: true,
        }
    }
}

impl SessionConfig {
    pub fn hand_raise_ttl(&self) -> Duration {
        Duration::from_millis(self.hand_raise_ttl_ms)
    }

    pub fn orphan_candidate_ttl(&self) -> Duration {
        Duration::from_millis(self.orphan_candidate_ttl_ms)
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_millis(self.reconcile_timeout_ms)
    }
}
