//! Pooled script sessions

use std::sync::atomic::{AtomicU64, Ordering};

use vs_core::time::current_time_millis;
use vs_core::types::SessionId;

/// An execution context checked out by one caller at a time.
///
/// Sessions are plain values: checking one out moves it out of the idle
/// list, so two callers can never hold the same session.
#[derive(Debug)]
pub struct ScriptSession {
    /// Session identifier
    pub id: SessionId,
    /// Creation time in Unix milliseconds
    pub created_at: u64,
    /// Invocations served so far
    pub calls: u64,
}

impl ScriptSession {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            created_at: current_time_millis(),
            calls: 0,
        }
    }
}

/// Allocates monotonically increasing session IDs
pub struct SessionFactory {
    next_id: AtomicU64,
    created: AtomicU64,
    discarded: AtomicU64,
}

impl SessionFactory {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            created: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Create a fresh session
    pub fn create(&self) -> ScriptSession {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.created.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Created script {}", id);
        ScriptSession::new(id)
    }

    /// Record that a session was thrown away
    pub fn discard(&self, session: ScriptSession, reason: &str) {
        self.discarded.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            "Discarding script {} after {} calls: {}",
            session.id,
            session.calls,
            reason
        );
    }

    /// Sessions created since startup
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    /// Sessions discarded since startup
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::SeqCst)
    }
}

impl Default for SessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let factory = SessionFactory::new();
        let a = factory.create();
        let b = factory.create();
        assert_ne!(a.id, b.id);
        assert_eq!(factory.created(), 2);

        factory.discard(a, "test");
        assert_eq!(factory.discarded(), 1);
    }
}
