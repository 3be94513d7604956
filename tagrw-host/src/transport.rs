//! Tag transport seam
//!
//! The radio itself is a host capability. The session only needs a few
//! primitives from it: start and stop continuous scanning, and write a
//! request to the tag at hand. Detections flow the other way, through a
//! [`ReaderSink`](crate::driver::ReaderSink) into the session driver.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tagrw_api::{Detection, WriteRequest};
use thiserror::Error;

use crate::driver::ReaderSink;

/// Errors reported by a tag transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// The host or the user refused the request
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Reader unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Abstract tag reader/writer
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use tagrw_api::WriteRequest;
/// use tagrw_host::transport::{TagTransport, TransportError};
///
/// struct ReadOnlyReader;
///
/// #[async_trait]
/// impl TagTransport for ReadOnlyReader {
///     async fn scan(&self) -> Result<(), TransportError> {
///         Ok(())
///     }
///
///     async fn write(&self, _request: &WriteRequest) -> Result<(), TransportError> {
///         Err(TransportError::Unavailable("reader is read-only".into()))
///     }
/// }
/// ```
#[async_trait]
pub trait TagTransport: Send + Sync {
    /// Begin continuous detection
    ///
    /// May fail when the user declines the host's consent prompt.
    async fn scan(&self) -> Result<(), TransportError>;

    /// Stop delivering detections
    ///
    /// Readers that cannot stop (the host ties scanning to the page
    /// lifetime) keep the default.
    async fn stop(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Write `request` to the tag currently presented
    async fn write(&self, request: &WriteRequest) -> Result<(), TransportError>;
}

/// Events a reader delivers while scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    /// A tag was presented
    Reading(Detection),
    /// A tag was presented but could not be read
    Error(String),
}

// ============================================================================
// Simulated Reader
// ============================================================================

/// In-process reader for tests and the CLI
///
/// Detections are only delivered while a scan is active, and only when a
/// sink is attached.
#[derive(Debug, Default)]
pub struct SimulatedReader {
    sink: Option<ReaderSink>,
    scanning: AtomicBool,
    reject_scans: AtomicBool,
    failing_writes: AtomicUsize,
    write_attempts: AtomicUsize,
    written: Mutex<Vec<WriteRequest>>,
}

impl SimulatedReader {
    /// Reader with no sink; presenting tags is a no-op
    pub fn new() -> Self {
        Self::default()
    }

    /// Reader delivering detections to a session driver
    pub fn with_sink(sink: ReaderSink) -> Self {
        Self {
            sink: Some(sink),
            ..Self::default()
        }
    }

    /// Make subsequent scan requests fail (or succeed again)
    pub fn reject_scans(&self, reject: bool) {
        self.reject_scans.store(reject, Ordering::SeqCst);
    }

    /// Fail the next `count` write attempts
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Number of write attempts, successful or not
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Requests that were written successfully, oldest first
    pub fn written(&self) -> Vec<WriteRequest> {
        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Present a tag to the reader
    ///
    /// Returns false when nothing was delivered (not scanning, no sink, or
    /// the driver has stopped).
    pub async fn present(&self, detection: Detection) -> bool {
        self.deliver(ReaderEvent::Reading(detection)).await
    }

    /// Present a tag the reader fails to read
    pub async fn present_unreadable(&self, reason: impl Into<String>) -> bool {
        self.deliver(ReaderEvent::Error(reason.into())).await
    }

    async fn deliver(&self, event: ReaderEvent) -> bool {
        if !self.is_scanning() {
            tracing::debug!("Reader is not scanning, dropping tag");
            return false;
        }
        match &self.sink {
            Some(sink) => sink.deliver(event).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl TagTransport for SimulatedReader {
    async fn scan(&self) -> Result<(), TransportError> {
        if self.reject_scans.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("scan request declined".into()));
        }
        self.scanning.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.scanning.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, request: &WriteRequest) -> Result<(), TransportError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Rejected("tag write failed".into()));
        }

        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        Ok(())
    }
}
