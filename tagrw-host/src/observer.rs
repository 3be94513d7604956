//! Observer sinks for session notifications
//!
//! The session never renders anything itself. It hands every notification
//! to a [`SessionObserver`], and presentation layers decide what to do with
//! it. A few stock sinks cover tests, logs and channel-based UIs.

use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::sync::{Mutex, RwLock};
use tagrw_api::Notification;
use thiserror::Error;
use tokio::sync::mpsc;

/// A notification stamped with the time it was emitted
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    /// RFC 3339 timestamp
    pub timestamp: String,

    #[serde(flatten)]
    pub notification: Notification,
}

impl SessionEvent {
    pub fn new(notification: Notification) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            notification,
        }
    }
}

/// Error type for observer operations
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("Failed to write notification: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize notification: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Observer channel closed")]
    Closed,
}

/// Trait for notification sinks
///
/// # Example
///
/// ```rust
/// use tagrw_host::observer::{ObserverError, SessionEvent, SessionObserver};
///
/// struct StatusLine;
///
/// impl SessionObserver for StatusLine {
///     fn notify(&self, event: SessionEvent) -> Result<(), ObserverError> {
///         eprintln!("{}", event.notification.name());
///         Ok(())
///     }
/// }
/// ```
pub trait SessionObserver: Send + Sync {
    /// Receive one notification
    fn notify(&self, event: SessionEvent) -> Result<(), ObserverError>;

    /// Flush any buffered output
    fn flush(&self) -> Result<(), ObserverError> {
        Ok(())
    }
}

// ============================================================================
// Memory Observer
// ============================================================================

/// Bounded in-memory observer, mostly for tests
pub struct MemoryObserver {
    events: RwLock<Vec<SessionEvent>>,
    max_events: usize,
}

impl MemoryObserver {
    /// Observer keeping the last 1000 events
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: RwLock::new(Vec::with_capacity(max_events.min(1000))),
            max_events: max_events.max(1),
        }
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Recorded notifications without timestamps
    pub fn notifications(&self) -> Vec<Notification> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|e| e.notification.clone())
            .collect()
    }

    /// Most recent notification
    pub fn last(&self) -> Option<Notification> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .map(|e| e.notification.clone())
    }

    pub fn count(&self) -> usize {
        self.events.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Notifications with the given wire name
    pub fn find_by_name(&self, name: &str) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(|n| n.name() == name)
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for MemoryObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionObserver for MemoryObserver {
    fn notify(&self, event: SessionEvent) -> Result<(), ObserverError> {
        let mut events = self.events.write().unwrap_or_else(|e| e.into_inner());
        if events.len() >= self.max_events {
            events.remove(0);
        }
        events.push(event);
        Ok(())
    }
}

impl fmt::Debug for MemoryObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryObserver")
            .field("count", &self.count())
            .field("max_events", &self.max_events)
            .finish()
    }
}

// ============================================================================
// Null Observer
// ============================================================================

/// Discards everything
#[derive(Debug, Default)]
pub struct NullObserver;

impl NullObserver {
    pub fn new() -> Self {
        Self
    }
}

impl SessionObserver for NullObserver {
    fn notify(&self, _event: SessionEvent) -> Result<(), ObserverError> {
        Ok(())
    }
}

// ============================================================================
// JSON Lines Observer
// ============================================================================

/// Writes one JSON object per notification
pub struct JsonLinesObserver<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesObserver<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> SessionObserver for JsonLinesObserver<W> {
    fn notify(&self, event: SessionEvent) -> Result<(), ObserverError> {
        let json = serde_json::to_string(&event)?;
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        Ok(())
    }

    fn flush(&self) -> Result<(), ObserverError> {
        self.writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .flush()?;
        Ok(())
    }
}

impl<W: Write + Send> fmt::Debug for JsonLinesObserver<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesObserver").finish_non_exhaustive()
    }
}

// ============================================================================
// Channel Observer
// ============================================================================

/// Forwards notifications into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SessionObserver for ChannelObserver {
    fn notify(&self, event: SessionEvent) -> Result<(), ObserverError> {
        self.tx.send(event).map_err(|_| ObserverError::Closed)
    }
}

// ============================================================================
// Composite Observer
// ============================================================================

/// Fans notifications out to several observers
///
/// Every sink sees every event; the first error is returned after all
/// sinks have been tried.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Box<dyn SessionObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl SessionObserver for CompositeObserver {
    fn notify(&self, event: SessionEvent) -> Result<(), ObserverError> {
        let mut first_error = None;
        for observer in &self.observers {
            if let Err(e) = observer.notify(event.clone()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn flush(&self) -> Result<(), ObserverError> {
        for observer in &self.observers {
            observer.flush()?;
        }
        Ok(())
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observer_count", &self.observers.len())
            .finish()
    }
}
