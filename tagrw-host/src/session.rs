//! Tag interaction session
//!
//! [`TagSession`] is the single owner of the session mode and the pending
//! write. Callers never touch either directly; they go through the entry
//! points below, each of which runs to completion before returning.
//!
//! ```text
//!          start / enable            arm_write
//!   Idle ─────────────────▶ Scanning ─────────▶ WriteArmed
//!    ▲                        ▲  ▲                  │
//!    │ permission lost        │  └── cancel_write ──┤
//!    └────────────────────────┘  └── write ok ──────┘
//! ```
//!
//! A failed write keeps the session armed so the next tag retries the same
//! payload.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tagrw_api::{
    Detection, Notification, PermissionState, ReadOutcome, SessionMode, WritePayload,
    WriteRequest,
};

use crate::codec::RecordCodec;
use crate::error::SessionError;
use crate::observer::{SessionEvent, SessionObserver};
use crate::permission::{ConsentHandler, PermissionGate};
use crate::transport::TagTransport;

/// A write armed by the user, waiting for the next tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    payload: WritePayload,
    request: WriteRequest,
}

impl PendingWrite {
    /// What the user typed
    pub fn payload(&self) -> &WritePayload {
        &self.payload
    }

    /// What will be handed to the transport
    pub fn request(&self) -> &WriteRequest {
        &self.request
    }
}

// The pending write lives inside the armed state, so it exists exactly
// when the session is armed.
#[derive(Debug)]
enum State {
    Idle,
    Scanning,
    WriteArmed(PendingWrite),
}

impl State {
    fn mode(&self) -> SessionMode {
        match self {
            Self::Idle => SessionMode::Idle,
            Self::Scanning => SessionMode::Scanning,
            Self::WriteArmed(_) => SessionMode::WriteArmed,
        }
    }
}

/// What a detection turned into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionOutcome {
    Read(ReadOutcome),
    Written,
    /// Delivered while idle
    Ignored,
}

/// Read-only view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub mode: SessionMode,
    pub permission: PermissionState,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<WritePayload>,
}

/// The read/write state machine
pub struct TagSession {
    gate: PermissionGate,
    transport: Arc<dyn TagTransport>,
    observer: Arc<dyn SessionObserver>,
    consent: Option<Arc<dyn ConsentHandler>>,
    codec: RecordCodec,
    state: State,
}

impl TagSession {
    pub fn new(
        gate: PermissionGate,
        transport: Arc<dyn TagTransport>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            gate,
            transport,
            observer,
            consent: None,
            codec: RecordCodec::new(),
            state: State::Idle,
        }
    }

    /// Use a specific record codec
    pub fn with_codec(mut self, codec: RecordCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Ask `handler` before enabling access from the `prompt` state
    pub fn with_consent(mut self, handler: Arc<dyn ConsentHandler>) -> Self {
        self.consent = Some(handler);
        self
    }

    pub fn mode(&self) -> SessionMode {
        self.state.mode()
    }

    pub fn permission(&self) -> PermissionState {
        self.gate.current_state()
    }

    pub fn pending_write(&self) -> Option<&PendingWrite> {
        match &self.state {
            State::WriteArmed(pending) => Some(pending),
            _ => None,
        }
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            mode: self.mode(),
            permission: self.permission(),
            status: self.permission().status_message(),
            pending: self.pending_write().map(|p| p.payload.clone()),
        }
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Begin continuous scanning
    ///
    /// Requires granted permission. Does nothing when already scanning.
    /// A rejected scan request leaves the session idle so the user can
    /// retry.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        let permission = self.permission();
        if !permission.is_granted() {
            return Err(SessionError::Permission(permission));
        }
        self.begin_scan().await
    }

    /// The explicit "Enable NFC" action
    ///
    /// From `prompt`, asks the consent handler (when one is set) and then
    /// requests scanning; the host's scan request may show its own consent
    /// dialog as well.
    pub async fn enable(&mut self) -> Result<(), SessionError> {
        match self.permission() {
            PermissionState::Granted => {}
            PermissionState::Prompt => {
                if let Some(consent) = &self.consent {
                    let decision = consent.request_consent(self.gate.topic())?;
                    if !decision.is_allowed() {
                        tracing::info!("User declined to enable tag access");
                        self.emit(Notification::ScanFailed {
                            error: SessionError::ConsentDeclined.to_string(),
                        });
                        return Err(SessionError::ConsentDeclined);
                    }
                }
            }
            other => return Err(SessionError::Permission(other)),
        }
        self.begin_scan().await
    }

    /// Handle a tag presented to the reader
    ///
    /// Armed: the message content is ignored and the pending write is
    /// attempted against this tag. Scanning: the first record is decoded
    /// and reported; further records are never looked at.
    pub async fn on_detection(
        &mut self,
        detection: Detection,
    ) -> Result<DetectionOutcome, SessionError> {
        match &self.state {
            State::Idle => {
                tracing::warn!("Tag detected while idle, ignoring");
                Ok(DetectionOutcome::Ignored)
            }
            State::Scanning => Ok(DetectionOutcome::Read(self.report_read(&detection))),
            State::WriteArmed(pending) => {
                let request = pending.request.clone();
                self.write_pending(request, detection.serial_number.as_deref())
                    .await
            }
        }
    }

    /// Handle a tag the reader failed to read
    ///
    /// Reported exactly like a detection without records; the mode does
    /// not change, so an armed write stays armed. Ignored while idle,
    /// returning `None`.
    pub fn on_detection_error(&mut self, error: &str) -> Option<ReadOutcome> {
        if let State::Idle = self.state {
            tracing::warn!(error, "Reader error while idle, ignoring");
            return None;
        }
        tracing::warn!(error, "Cannot read data from the tag");
        Some(self.report_read(&Detection::blank()))
    }

    /// Arm a write for the next detected tag
    ///
    /// Re-arming while armed replaces the pending payload.
    pub fn arm_write(&mut self, payload: WritePayload) -> Result<(), SessionError> {
        if let State::Idle = self.state {
            return Err(SessionError::InvalidTransition {
                operation: "arm a write",
                mode: SessionMode::Idle,
            });
        }

        let request = self.codec.encode(&payload);
        tracing::info!(payload = ?payload, request = ?request, "Write armed");
        self.state = State::WriteArmed(PendingWrite {
            payload: payload.clone(),
            request,
        });
        self.emit(Notification::WriteArmed { payload });
        Ok(())
    }

    /// Drop the pending write
    ///
    /// Returns false (and does nothing) when no write was armed. A write
    /// already handed to the transport cannot be recalled.
    pub fn cancel_write(&mut self) -> bool {
        if !matches!(self.state, State::WriteArmed(_)) {
            return false;
        }
        self.state = State::Scanning;
        tracing::info!("Write cancelled");
        self.emit(Notification::WriteCancelled);
        true
    }

    /// React to a host-reported permission change
    ///
    /// Entering `granted` while idle starts scanning; losing it while
    /// active stops the reader, drops back to idle and discards any
    /// pending write.
    pub async fn on_permission_changed(
        &mut self,
        state: PermissionState,
    ) -> Result<(), SessionError> {
        if !self.gate.apply(state) {
            return Ok(());
        }
        self.emit(Notification::PermissionChanged { state });

        if state.is_granted() {
            return self.begin_scan().await;
        }
        if !matches!(self.state, State::Idle) {
            tracing::warn!(permission = %state, mode = %self.mode(), "Permission lost, stopping");
            self.state = State::Idle;
            if let Err(e) = self.transport.stop().await {
                tracing::warn!(error = %e, "Failed to stop reader");
            }
        }
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn begin_scan(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, State::Idle) {
            tracing::debug!(mode = %self.mode(), "Already scanning");
            return Ok(());
        }

        match self.transport.scan().await {
            Ok(()) => {
                tracing::info!("Scanning started");
                self.state = State::Scanning;
                self.emit(Notification::ScanStarted);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error initializing reader");
                self.emit(Notification::ScanFailed {
                    error: e.to_string(),
                });
                Err(SessionError::ScanStart(e))
            }
        }
    }

    fn report_read(&self, detection: &Detection) -> ReadOutcome {
        let outcome = self.codec.decode_message(detection);
        tracing::info!(
            kind = %outcome.kind,
            serial = outcome.serial_number.as_deref().unwrap_or("-"),
            "Tag read"
        );
        self.emit(Notification::ReadComplete(outcome.clone()));
        outcome
    }

    async fn write_pending(
        &mut self,
        request: WriteRequest,
        serial: Option<&str>,
    ) -> Result<DetectionOutcome, SessionError> {
        tracing::debug!(serial = serial.unwrap_or("-"), "Writing pending request");
        match self.transport.write(&request).await {
            Ok(()) => {
                tracing::info!("Message written");
                self.state = State::Scanning;
                self.emit(Notification::WriteComplete);
                Ok(DetectionOutcome::Written)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Write failed, waiting for the next tag");
                self.emit(Notification::WriteFailed {
                    error: e.to_string(),
                });
                Err(SessionError::Write(e))
            }
        }
    }

    fn emit(&self, notification: Notification) {
        let name = notification.name();
        if let Err(e) = self.observer.notify(SessionEvent::new(notification)) {
            tracing::warn!(notification = name, error = %e, "Observer rejected notification");
        }
    }
}

impl fmt::Debug for TagSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagSession")
            .field("gate", &self.gate)
            .field("state", &self.state)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::MemoryObserver;
    use crate::permission::{ConsentDecision, RecordingConsentHandler};
    use crate::transport::SimulatedReader;
    use tagrw_api::{NdefMessage, RecordKind, TagRecord};

    struct Fixture {
        session: TagSession,
        reader: Arc<SimulatedReader>,
        observer: Arc<MemoryObserver>,
    }

    fn fixture(permission: PermissionState) -> Fixture {
        let reader = Arc::new(SimulatedReader::new());
        let observer = Arc::new(MemoryObserver::new());
        let session = TagSession::new(
            PermissionGate::new("nfc", permission),
            reader.clone(),
            observer.clone(),
        );
        Fixture {
            session,
            reader,
            observer,
        }
    }

    async fn scanning() -> Fixture {
        let mut fx = fixture(PermissionState::Granted);
        fx.session.start().await.unwrap();
        fx.observer.clear();
        fx
    }

    fn text_detection(text: &str) -> Detection {
        Detection::new(NdefMessage::single(
            TagRecord::new("text", text.as_bytes().to_vec()).with_encoding("utf-8"),
        ))
    }

    #[tokio::test]
    async fn test_start_requires_grant() {
        let mut fx = fixture(PermissionState::Denied);
        let err = fx.session.start().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Permission(PermissionState::Denied)
        ));
        assert_eq!(fx.session.mode(), SessionMode::Idle);
        assert!(!fx.reader.is_scanning());
    }

    #[tokio::test]
    async fn test_start_failure_stays_idle_and_can_retry() {
        let mut fx = fixture(PermissionState::Granted);
        fx.reader.reject_scans(true);

        let err = fx.session.start().await.unwrap_err();
        assert!(matches!(err, SessionError::ScanStart(_)));
        assert_eq!(fx.session.mode(), SessionMode::Idle);
        assert_eq!(fx.observer.find_by_name("scan-failed").len(), 1);

        fx.reader.reject_scans(false);
        fx.session.start().await.unwrap();
        assert_eq!(fx.session.mode(), SessionMode::Scanning);
        assert_eq!(fx.observer.last(), Some(Notification::ScanStarted));
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let mut fx = scanning().await;
        fx.session.start().await.unwrap();
        assert_eq!(fx.session.mode(), SessionMode::Scanning);
        assert_eq!(fx.observer.count(), 0);
    }

    #[tokio::test]
    async fn test_read_text_record() {
        let mut fx = scanning().await;
        let outcome = fx.session.on_detection(text_detection("hi")).await.unwrap();

        let expected = ReadOutcome {
            kind: RecordKind::Text,
            text: Some("hi".into()),
            serial_number: None,
        };
        assert_eq!(outcome, DetectionOutcome::Read(expected.clone()));
        assert_eq!(fx.observer.last(), Some(Notification::ReadComplete(expected)));
        assert_eq!(fx.session.mode(), SessionMode::Scanning);
    }

    #[tokio::test]
    async fn test_read_without_records_is_unknown() {
        let mut fx = scanning().await;
        fx.session.on_detection(Detection::blank()).await.unwrap();
        assert_eq!(
            fx.observer.last(),
            Some(Notification::ReadComplete(ReadOutcome::unknown()))
        );
    }

    #[tokio::test]
    async fn test_read_only_first_record() {
        let mut fx = scanning().await;
        let detection = Detection::new(NdefMessage::new(vec![
            TagRecord::empty(),
            TagRecord::text("ignored"),
        ]));
        let outcome = fx.session.on_detection(detection).await.unwrap();
        match outcome {
            DetectionOutcome::Read(read) => {
                assert_eq!(read.kind, RecordKind::Empty);
                assert_eq!(read.text, Some(String::new()));
            }
            other => panic!("Expected a read, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detection_while_idle_is_ignored() {
        let mut fx = fixture(PermissionState::Granted);
        let outcome = fx.session.on_detection(text_detection("x")).await.unwrap();
        assert_eq!(outcome, DetectionOutcome::Ignored);
        assert_eq!(fx.observer.count(), 0);
    }

    #[tokio::test]
    async fn test_armed_write_then_success() {
        let mut fx = scanning().await;
        fx.session.arm_write(WritePayload::text("hello")).unwrap();
        assert_eq!(fx.session.mode(), SessionMode::WriteArmed);

        let outcome = fx
            .session
            .on_detection(text_detection("old content"))
            .await
            .unwrap();
        assert_eq!(outcome, DetectionOutcome::Written);
        assert_eq!(fx.reader.written(), vec![WriteRequest::Text("hello".into())]);
        assert_eq!(fx.session.mode(), SessionMode::Scanning);
        assert!(fx.session.pending_write().is_none());
        assert!(fx.observer.find_by_name("read-complete").is_empty());
        assert_eq!(fx.observer.last(), Some(Notification::WriteComplete));
    }

    #[tokio::test]
    async fn test_url_write_is_normalized() {
        let mut fx = scanning().await;
        fx.session.arm_write(WritePayload::url("example.com")).unwrap();
        assert_eq!(
            fx.session.pending_write().unwrap().request(),
            &WriteRequest::Record(TagRecord::url("https://example.com"))
        );
    }

    #[tokio::test]
    async fn test_write_failure_keeps_armed_and_retries() {
        let mut fx = scanning().await;
        fx.reader.fail_next_writes(1);
        fx.session.arm_write(WritePayload::text("again")).unwrap();
        let before = fx.session.pending_write().cloned();

        let err = fx
            .session
            .on_detection(Detection::blank())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Write(_)));
        assert_eq!(fx.session.mode(), SessionMode::WriteArmed);
        assert_eq!(fx.session.pending_write().cloned(), before);
        assert_eq!(fx.observer.find_by_name("write-failed").len(), 1);

        let outcome = fx.session.on_detection(Detection::blank()).await.unwrap();
        assert_eq!(outcome, DetectionOutcome::Written);
        assert_eq!(fx.reader.write_attempts(), 2);
        assert_eq!(fx.reader.written(), vec![WriteRequest::Text("again".into())]);
    }

    #[tokio::test]
    async fn test_cancel_write_returns_to_reading() {
        let mut fx = scanning().await;
        fx.session.arm_write(WritePayload::text("nope")).unwrap();
        assert!(fx.session.cancel_write());
        assert_eq!(fx.session.mode(), SessionMode::Scanning);
        assert!(fx.session.pending_write().is_none());

        let outcome = fx.session.on_detection(text_detection("kept")).await.unwrap();
        assert!(matches!(outcome, DetectionOutcome::Read(_)));
        assert_eq!(fx.reader.write_attempts(), 0);
    }

    #[tokio::test]
    async fn test_cancel_write_is_idempotent() {
        let mut fx = scanning().await;
        assert!(!fx.session.cancel_write());
        assert_eq!(fx.session.mode(), SessionMode::Scanning);
        assert_eq!(fx.observer.count(), 0);
    }

    #[tokio::test]
    async fn test_rearm_replaces_payload() {
        let mut fx = scanning().await;
        fx.session.arm_write(WritePayload::text("first")).unwrap();
        fx.session.arm_write(WritePayload::text("second")).unwrap();
        assert_eq!(
            fx.session.pending_write().unwrap().payload(),
            &WritePayload::text("second")
        );
    }

    #[tokio::test]
    async fn test_arm_while_idle_rejected() {
        let mut fx = fixture(PermissionState::Granted);
        let err = fx.session.arm_write(WritePayload::text("x")).unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
        assert_eq!(fx.session.mode(), SessionMode::Idle);
    }

    #[tokio::test]
    async fn test_detection_error_reads_unknown_without_mode_change() {
        let mut fx = scanning().await;
        fx.session.arm_write(WritePayload::text("x")).unwrap();
        let outcome = fx.session.on_detection_error("NotReadableError");

        assert_eq!(outcome, Some(ReadOutcome::unknown()));
        assert_eq!(fx.session.mode(), SessionMode::WriteArmed);
        assert_eq!(
            fx.observer.last(),
            Some(Notification::ReadComplete(ReadOutcome::unknown()))
        );
    }

    #[tokio::test]
    async fn test_grant_starts_scanning() {
        let mut fx = fixture(PermissionState::Prompt);
        fx.session
            .on_permission_changed(PermissionState::Granted)
            .await
            .unwrap();

        assert_eq!(fx.session.mode(), SessionMode::Scanning);
        assert_eq!(
            fx.observer.notifications(),
            vec![
                Notification::PermissionChanged {
                    state: PermissionState::Granted
                },
                Notification::ScanStarted,
            ]
        );
    }

    #[tokio::test]
    async fn test_revocation_drops_to_idle() {
        let mut fx = scanning().await;
        fx.session.arm_write(WritePayload::text("x")).unwrap();
        fx.session
            .on_permission_changed(PermissionState::Denied)
            .await
            .unwrap();

        assert_eq!(fx.session.mode(), SessionMode::Idle);
        assert!(fx.session.pending_write().is_none());
        assert_eq!(fx.session.snapshot().status, "NFC permission denied");
        assert!(!fx.reader.is_scanning());
    }

    #[tokio::test]
    async fn test_reader_error_after_revocation_is_ignored() {
        let mut fx = scanning().await;
        fx.session
            .on_permission_changed(PermissionState::Denied)
            .await
            .unwrap();
        fx.observer.clear();

        assert_eq!(fx.session.on_detection_error("NotReadableError"), None);
        assert_eq!(fx.observer.count(), 0);
        assert_eq!(fx.session.mode(), SessionMode::Idle);
    }

    #[tokio::test]
    async fn test_enable_from_prompt_asks_consent() {
        let consent = Arc::new(RecordingConsentHandler::new(ConsentDecision::Allow));
        let mut fx = fixture(PermissionState::Prompt);
        fx.session = fx.session.with_consent(consent.clone());

        fx.session.enable().await.unwrap();
        assert_eq!(fx.session.mode(), SessionMode::Scanning);
        assert_eq!(consent.requests(), vec!["nfc"]);
    }

    #[tokio::test]
    async fn test_enable_declined() {
        let consent = Arc::new(RecordingConsentHandler::new(ConsentDecision::Deny));
        let mut fx = fixture(PermissionState::Prompt);
        fx.session = fx.session.with_consent(consent);

        let err = fx.session.enable().await.unwrap_err();
        assert!(matches!(err, SessionError::ConsentDeclined));
        assert_eq!(fx.session.mode(), SessionMode::Idle);
        assert!(!fx.reader.is_scanning());
    }

    #[tokio::test]
    async fn test_enable_when_unsupported() {
        let mut fx = fixture(PermissionState::Unsupported);
        let err = fx.session.enable().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Permission(PermissionState::Unsupported)
        ));
    }

    #[tokio::test]
    async fn test_snapshot() {
        let mut fx = scanning().await;
        fx.session.arm_write(WritePayload::url("a.b")).unwrap();
        let snapshot = fx.session.snapshot();
        assert_eq!(snapshot.mode, SessionMode::WriteArmed);
        assert_eq!(snapshot.permission, PermissionState::Granted);
        assert_eq!(snapshot.pending, Some(WritePayload::url("a.b")));
    }
}
