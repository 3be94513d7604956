//! Single-consumer session driver
//!
//! User commands, reader events and host permission changes all end up in
//! one tokio task that owns the [`TagSession`]. Inputs are taken one at a
//! time and each handler runs to completion before the next one starts, so
//! the session never sees interleaved operations.
//!
//! ```text
//!   SessionSender ──┐
//!                   ├──▶ SessionInbox ──┐
//!   ReaderSink ─────┘                   ├──▶ driver task ──▶ TagSession
//!   permission watch ───────────────────┘      (biased: permission first)
//! ```

use tagrw_api::{PermissionState, WritePayload};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::session::{SessionSnapshot, TagSession};
use crate::transport::ReaderEvent;

/// Error type for driver handles
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Session driver has stopped")]
    Closed,
}

/// User-issued commands
#[derive(Debug)]
pub enum SessionCommand {
    Enable,
    Start,
    ArmWrite(WritePayload),
    CancelWrite,
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

/// Everything that can arrive in the inbox
#[derive(Debug)]
pub enum SessionInput {
    Command(SessionCommand),
    Reader(ReaderEvent),
}

/// Create a driver inbox and the handle that feeds it
pub fn channel(capacity: usize) -> (SessionSender, SessionInbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (SessionSender { tx }, SessionInbox { rx })
}

// ============================================================================
// Handles
// ============================================================================

/// Command handle for a running session
#[derive(Debug, Clone)]
pub struct SessionSender {
    tx: mpsc::Sender<SessionInput>,
}

impl SessionSender {
    pub async fn enable(&self) -> Result<(), DriverError> {
        self.command(SessionCommand::Enable).await
    }

    pub async fn start(&self) -> Result<(), DriverError> {
        self.command(SessionCommand::Start).await
    }

    pub async fn arm_write(&self, payload: WritePayload) -> Result<(), DriverError> {
        self.command(SessionCommand::ArmWrite(payload)).await
    }

    pub async fn cancel_write(&self) -> Result<(), DriverError> {
        self.command(SessionCommand::CancelWrite).await
    }

    /// Snapshot taken after every input queued before this call
    pub async fn snapshot(&self) -> Result<SessionSnapshot, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCommand::Snapshot(reply)).await?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    pub async fn shutdown(&self) -> Result<(), DriverError> {
        self.command(SessionCommand::Shutdown).await
    }

    /// Sink for a transport to deliver detections through
    pub fn reader_sink(&self) -> ReaderSink {
        ReaderSink {
            tx: self.tx.clone(),
        }
    }

    async fn command(&self, command: SessionCommand) -> Result<(), DriverError> {
        self.tx
            .send(SessionInput::Command(command))
            .await
            .map_err(|_| DriverError::Closed)
    }
}

/// Reader side of the inbox
#[derive(Debug, Clone)]
pub struct ReaderSink {
    tx: mpsc::Sender<SessionInput>,
}

impl ReaderSink {
    pub async fn deliver(&self, event: ReaderEvent) -> Result<(), DriverError> {
        self.tx
            .send(SessionInput::Reader(event))
            .await
            .map_err(|_| DriverError::Closed)
    }
}

/// Receiving end consumed by the driver task
#[derive(Debug)]
pub struct SessionInbox {
    rx: mpsc::Receiver<SessionInput>,
}

impl SessionInbox {
    pub async fn recv(&mut self) -> Option<SessionInput> {
        self.rx.recv().await
    }
}

// ============================================================================
// Driver loop
// ============================================================================

/// Run the session on its own task
///
/// The task ends on [`SessionCommand::Shutdown`] or once every sender is
/// gone, and hands the session back.
pub fn spawn(
    session: TagSession,
    inbox: SessionInbox,
    permission_changes: Option<watch::Receiver<PermissionState>>,
) -> JoinHandle<TagSession> {
    tokio::spawn(run(session, inbox, permission_changes))
}

/// Drive the session on the current task
pub async fn run(
    mut session: TagSession,
    mut inbox: SessionInbox,
    mut permission_changes: Option<watch::Receiver<PermissionState>>,
) -> TagSession {
    tracing::debug!(mode = %session.mode(), "Session driver started");

    loop {
        tokio::select! {
            biased;

            state = next_permission(&mut permission_changes) => {
                if let Err(e) = session.on_permission_changed(state).await {
                    tracing::warn!(error = %e, "Permission change not applied");
                }
            }

            input = inbox.recv() => {
                let Some(input) = input else {
                    tracing::debug!("All session handles dropped");
                    break;
                };
                if !handle(&mut session, input).await {
                    break;
                }
            }
        }
    }

    tracing::info!(mode = %session.mode(), "Session driver stopped");
    session
}

/// Wait for the next host permission state
///
/// Never resolves once the host stream is gone.
async fn next_permission(
    changes: &mut Option<watch::Receiver<PermissionState>>,
) -> PermissionState {
    if let Some(rx) = changes {
        if rx.changed().await.is_ok() {
            return *rx.borrow_and_update();
        }
        tracing::debug!("Permission change stream closed");
    }
    *changes = None;
    std::future::pending().await
}

/// Returns false when the driver should stop
async fn handle(session: &mut TagSession, input: SessionInput) -> bool {
    let result = match input {
        SessionInput::Reader(ReaderEvent::Reading(detection)) => {
            session.on_detection(detection).await.map(|_| ())
        }
        SessionInput::Reader(ReaderEvent::Error(error)) => {
            session.on_detection_error(&error);
            Ok(())
        }
        SessionInput::Command(SessionCommand::Enable) => session.enable().await,
        SessionInput::Command(SessionCommand::Start) => session.start().await,
        SessionInput::Command(SessionCommand::ArmWrite(payload)) => session.arm_write(payload),
        SessionInput::Command(SessionCommand::CancelWrite) => {
            session.cancel_write();
            Ok(())
        }
        SessionInput::Command(SessionCommand::Snapshot(reply)) => {
            // The caller may have given up waiting
            let _ = reply.send(session.snapshot());
            Ok(())
        }
        SessionInput::Command(SessionCommand::Shutdown) => return false,
    };

    if let Err(e) = result {
        tracing::warn!(error = %e, retryable = e.is_retryable(), "Session operation failed");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::MemoryObserver;
    use crate::permission::{PermissionGate, SimulatedPermissions};
    use crate::transport::SimulatedReader;
    use std::sync::Arc;
    use tagrw_api::{Detection, Notification, SessionMode, TagRecord};

    async fn running(
        initial: PermissionState,
    ) -> (
        SessionSender,
        Arc<SimulatedReader>,
        Arc<MemoryObserver>,
        SimulatedPermissions,
        JoinHandle<TagSession>,
    ) {
        let host = SimulatedPermissions::new(initial);
        let (sender, inbox) = channel(16);
        let reader = Arc::new(SimulatedReader::with_sink(sender.reader_sink()));
        let observer = Arc::new(MemoryObserver::new());

        let mut gate = PermissionGate::from_host(Some(&host), "nfc", true).await;
        let changes = gate.take_changes();
        let session = TagSession::new(gate, reader.clone(), observer.clone());
        let handle = spawn(session, inbox, changes);
        (sender, reader, observer, host, handle)
    }

    #[tokio::test]
    async fn test_commands_run_in_order() {
        let (sender, reader, observer, _host, handle) = running(PermissionState::Granted).await;

        sender.start().await.unwrap();
        sender.arm_write(WritePayload::url("example.com")).await.unwrap();
        let snapshot = sender.snapshot().await.unwrap();
        assert_eq!(snapshot.mode, SessionMode::WriteArmed);

        assert!(reader.present(Detection::blank()).await);
        let snapshot = sender.snapshot().await.unwrap();
        assert_eq!(snapshot.mode, SessionMode::Scanning);
        assert_eq!(
            reader.written(),
            vec![tagrw_api::WriteRequest::Record(TagRecord::url(
                "https://example.com"
            ))]
        );

        sender.shutdown().await.unwrap();
        let session = handle.await.unwrap();
        assert_eq!(session.mode(), SessionMode::Scanning);
        assert_eq!(
            observer.notifications(),
            vec![
                Notification::ScanStarted,
                Notification::WriteArmed {
                    payload: WritePayload::url("example.com")
                },
                Notification::WriteComplete,
            ]
        );
    }

    #[tokio::test]
    async fn test_permission_grant_starts_scanning() {
        let (sender, reader, _observer, host, handle) = running(PermissionState::Prompt).await;

        host.set(PermissionState::Granted);
        // Permission changes are polled before the inbox
        let snapshot = sender.snapshot().await.unwrap();
        assert_eq!(snapshot.permission, PermissionState::Granted);
        assert_eq!(snapshot.mode, SessionMode::Scanning);
        assert!(reader.is_scanning());

        host.set(PermissionState::Denied);
        let snapshot = sender.snapshot().await.unwrap();
        assert_eq!(snapshot.mode, SessionMode::Idle);

        sender.shutdown().await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_reader_error_is_reported_as_unknown() {
        let (sender, reader, observer, _host, handle) = running(PermissionState::Granted).await;

        sender.start().await.unwrap();
        sender.snapshot().await.unwrap();
        assert!(reader.present_unreadable("NotReadableError").await);
        sender.snapshot().await.unwrap();

        assert_eq!(
            observer.last(),
            Some(Notification::ReadComplete(tagrw_api::ReadOutcome::unknown()))
        );

        sender.shutdown().await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_operation_keeps_driver_running() {
        let (sender, _reader, _observer, _host, handle) = running(PermissionState::Denied).await;

        sender.start().await.unwrap();
        sender.arm_write(WritePayload::text("x")).await.unwrap();
        let snapshot = sender.snapshot().await.unwrap();
        assert_eq!(snapshot.mode, SessionMode::Idle);
        assert_eq!(snapshot.pending, None);

        sender.shutdown().await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_driver() {
        let (sender, _reader, _observer, _host, handle) = running(PermissionState::Granted).await;
        sender.shutdown().await.unwrap();
        handle.await.unwrap();

        assert!(matches!(sender.start().await, Err(DriverError::Closed)));
        assert!(matches!(sender.snapshot().await, Err(DriverError::Closed)));
    }

    #[tokio::test]
    async fn test_driver_stops_when_senders_drop() {
        let (sender, inbox) = channel(4);
        let session = TagSession::new(
            PermissionGate::unsupported("nfc"),
            Arc::new(SimulatedReader::new()),
            Arc::new(MemoryObserver::new()),
        );
        let handle = spawn(session, inbox, None);
        drop(sender);

        let session = handle.await.unwrap();
        assert_eq!(session.permission(), PermissionState::Unsupported);
    }
}
