//! Log observers
//!
//! Components report state transitions and task boundaries through a
//! [`LogObservers`] registry handed to them at construction. Every message is
//! mirrored to `tracing` and then delivered synchronously to each subscriber.
//! There is no global dispatcher: whoever owns the registry decides who
//! listens.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Handle returned by [`LogObservers::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber callback: `(message, level)`
pub type LogCallback = Arc<dyn Fn(&str, LogLevel) + Send + Sync>;

/// Registry of log subscribers
pub struct LogObservers {
    next_id: AtomicU64,
    subscribers: DashMap<SubscriptionId, LogCallback>,
}

impl LogObservers {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: DashMap::new(),
        }
    }

    /// Register a callback invoked for every subsequent message
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str, LogLevel) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers.insert(id, Arc::new(callback));
        id
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Emit a message at the given level
    pub fn emit(&self, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        match level {
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }

        // Snapshot first so a callback may (un)subscribe without deadlocking the map
        let callbacks: Vec<LogCallback> = self
            .subscribers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for callback in callbacks {
            callback(message, level);
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Error, message);
    }
}

impl Default for LogObservers {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LogObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogObservers")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
