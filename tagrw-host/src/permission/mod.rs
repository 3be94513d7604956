//! Permission gate for tag access
//!
//! The host owns the authorization state; this module only observes it.
//!
//! ```text
//! ┌──────────────────┐  query(topic)   ┌──────────────────┐
//! │ PermissionSource │ ──────────────▶ │  PermissionGate  │
//! │  (host)          │  state+changes  │                  │
//! └──────────────────┘                 │ current_state()  │
//!                                      │ on_change(cb)    │
//!          ┌────────────────────────── │ take_changes()   │
//!          ▼                           └──────────────────┘
//!   session driver ──▶ TagSession::on_permission_changed
//! ```
//!
//! When the host exposes no permission query, the query fails, or the tag
//! capability itself is missing, the gate reports
//! [`PermissionState::Unsupported`] and never changes again.
//!
//! ## Consent
//!
//! The `prompt` state needs an explicit user action. [`ConsentHandler`]
//! implementations decide how that action is collected:
//!
//! - `TerminalConsentHandler`: interactive terminal prompt
//! - `AutoConsentHandler`: fixed answer
//! - `RecordingConsentHandler`: records requests (testing)

pub mod prompt;

pub use prompt::{AutoConsentHandler, RecordingConsentHandler, TerminalConsentHandler};
pub use prompt::{ConsentDecision, ConsentError, ConsentHandler};

use async_trait::async_trait;
use std::fmt;
use tagrw_api::PermissionState;
use thiserror::Error;
use tokio::sync::watch;

/// Error type for permission queries
#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("Permission query for '{topic}' failed: {reason}")]
    QueryFailed { topic: String, reason: String },

    #[error("Unknown permission topic: {0}")]
    UnknownTopic(String),
}

/// Answer to a permission query
#[derive(Debug)]
pub struct PermissionStatus {
    pub state: PermissionState,

    /// Later host-driven changes, if the host reports them
    pub changes: Option<watch::Receiver<PermissionState>>,
}

/// Host permission capability
#[async_trait]
pub trait PermissionSource: Send + Sync {
    async fn query(&self, topic: &str) -> Result<PermissionStatus, PermissionError>;
}

/// Listener invoked on every state change
pub type ChangeListener = Box<dyn Fn(PermissionState) + Send + Sync>;

/// Tracks the host-reported permission state
pub struct PermissionGate {
    topic: String,
    state: PermissionState,
    changes: Option<watch::Receiver<PermissionState>>,
    listeners: Vec<ChangeListener>,
}

impl PermissionGate {
    /// Gate with a fixed starting state and no host change stream
    pub fn new(topic: impl Into<String>, state: PermissionState) -> Self {
        Self {
            topic: topic.into(),
            state,
            changes: None,
            listeners: Vec::new(),
        }
    }

    /// Gate for a host without tag support
    pub fn unsupported(topic: impl Into<String>) -> Self {
        Self::new(topic, PermissionState::Unsupported)
    }

    /// Query the host once and build a gate from the answer
    ///
    /// No retries: a missing source, a failed query or a missing tag
    /// capability all end in `Unsupported`.
    pub async fn from_host(
        source: Option<&dyn PermissionSource>,
        topic: &str,
        tag_capability: bool,
    ) -> Self {
        let Some(source) = source else {
            tracing::info!(topic, "Host exposes no permission query");
            return Self::unsupported(topic);
        };

        let status = match source.query(topic).await {
            Ok(status) => status,
            Err(e) => {
                tracing::info!(topic, error = %e, "Permission query failed");
                return Self::unsupported(topic);
            }
        };

        if !tag_capability {
            tracing::info!(topic, "Host has no tag reader/writer");
            return Self::unsupported(topic);
        }

        tracing::info!(topic, state = %status.state, "Permission state");
        Self {
            topic: topic.to_string(),
            state: status.state,
            changes: status.changes,
            listeners: Vec::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn current_state(&self) -> PermissionState {
        self.state
    }

    /// User-facing status line for the current state
    pub fn status_message(&self) -> &'static str {
        self.state.status_message()
    }

    /// Register a listener for state changes
    pub fn on_change(&mut self, listener: impl Fn(PermissionState) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Record a host-reported state
    ///
    /// Returns true when the state actually changed; listeners only fire
    /// in that case. An unsupported gate ignores everything.
    pub fn apply(&mut self, state: PermissionState) -> bool {
        if self.state == PermissionState::Unsupported || self.state == state {
            return false;
        }

        tracing::debug!(from = %self.state, to = %state, "Permission changed");
        self.state = state;
        for listener in &self.listeners {
            listener(state);
        }
        true
    }

    /// Hand the host change stream to whoever drives the session
    pub fn take_changes(&mut self) -> Option<watch::Receiver<PermissionState>> {
        self.changes.take()
    }
}

impl fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionGate")
            .field("topic", &self.topic)
            .field("state", &self.state)
            .field("listener_count", &self.listeners.len())
            .finish()
    }
}

// ============================================================================
// Simulated Host Permissions
// ============================================================================

/// In-process permission source whose state can be changed at will
#[derive(Debug)]
pub struct SimulatedPermissions {
    topic: String,
    tx: watch::Sender<PermissionState>,
}

impl SimulatedPermissions {
    /// Source answering for the default `nfc` topic
    pub fn new(initial: PermissionState) -> Self {
        Self::for_topic(tagrw_api::DEFAULT_PERMISSION_TOPIC, initial)
    }

    pub fn for_topic(topic: impl Into<String>, initial: PermissionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            topic: topic.into(),
            tx,
        }
    }

    /// Change the host state; subscribers see it on their next poll
    pub fn set(&self, state: PermissionState) {
        self.tx.send_replace(state);
    }

    pub fn current(&self) -> PermissionState {
        *self.tx.borrow()
    }
}

#[async_trait]
impl PermissionSource for SimulatedPermissions {
    async fn query(&self, topic: &str) -> Result<PermissionStatus, PermissionError> {
        if topic != self.topic {
            return Err(PermissionError::UnknownTopic(topic.to_string()));
        }
        Ok(PermissionStatus {
            state: self.current(),
            changes: Some(self.tx.subscribe()),
        })
    }
}
