//! Consent prompts for the `prompt` permission state
//!
//! When the host answers `prompt`, tag access needs an explicit user action
//! ("Enable NFC"). The session asks a [`ConsentHandler`] before it requests
//! scanning, so applications can collect that action however their UI
//! works.

use std::io::{self, BufRead, Write};
use thiserror::Error;

/// Error type for consent prompts
#[derive(Debug, Error)]
pub enum ConsentError {
    #[error("Prompt cancelled by user")]
    Cancelled,

    #[error("Non-interactive environment")]
    NonInteractive,

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

/// User's answer to a consent prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsentDecision {
    Allow,
    #[default]
    Deny,
}

impl ConsentDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Trait for collecting the user's consent to enable tag access
///
/// # Example
///
/// ```rust
/// use tagrw_host::permission::{ConsentDecision, ConsentError, ConsentHandler};
///
/// struct ButtonHandler;
///
/// impl ConsentHandler for ButtonHandler {
///     fn request_consent(&self, _topic: &str) -> Result<ConsentDecision, ConsentError> {
///         // Wait for the "Enable NFC" button
///         Ok(ConsentDecision::Allow)
///     }
///
///     fn is_interactive(&self) -> bool {
///         true
///     }
/// }
/// ```
pub trait ConsentHandler: Send + Sync {
    /// Ask the user whether tag access for `topic` may be enabled
    fn request_consent(&self, topic: &str) -> Result<ConsentDecision, ConsentError>;

    /// Whether this handler actually talks to a user
    fn is_interactive(&self) -> bool;
}

// ============================================================================
// Terminal Consent Handler
// ============================================================================

/// Asks on the terminal
#[derive(Debug, Default)]
pub struct TerminalConsentHandler;

impl TerminalConsentHandler {
    pub fn new() -> Self {
        Self
    }

    fn read_decision(input: &str) -> ConsentDecision {
        match input.trim().to_lowercase().as_str() {
            "y" | "yes" | "e" | "enable" => ConsentDecision::Allow,
            _ => ConsentDecision::Deny,
        }
    }
}

impl ConsentHandler for TerminalConsentHandler {
    fn request_consent(&self, topic: &str) -> Result<ConsentDecision, ConsentError> {
        if !atty_check() {
            return Err(ConsentError::NonInteractive);
        }

        let mut stderr = io::stderr();
        writeln!(stderr)?;
        write!(
            stderr,
            "Allow this session to use {} tags? [y]es / [n]o: ",
            topic.to_uppercase()
        )?;
        stderr.flush()?;

        let mut input = String::new();
        if io::stdin().lock().read_line(&mut input)? == 0 {
            return Err(ConsentError::Cancelled);
        }
        Ok(Self::read_decision(&input))
    }

    fn is_interactive(&self) -> bool {
        atty_check()
    }
}

// ============================================================================
// Auto Consent Handler
// ============================================================================

/// Always gives the same answer
#[derive(Debug)]
pub struct AutoConsentHandler {
    decision: ConsentDecision,
}

impl AutoConsentHandler {
    pub fn always_allow() -> Self {
        Self {
            decision: ConsentDecision::Allow,
        }
    }

    pub fn always_deny() -> Self {
        Self {
            decision: ConsentDecision::Deny,
        }
    }
}

impl ConsentHandler for AutoConsentHandler {
    fn request_consent(&self, _topic: &str) -> Result<ConsentDecision, ConsentError> {
        Ok(self.decision)
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

// ============================================================================
// Recording Consent Handler (for testing)
// ============================================================================

/// Records every request and answers with a fixed decision
#[derive(Debug, Default)]
pub struct RecordingConsentHandler {
    topics: std::sync::Mutex<Vec<String>>,
    decision: ConsentDecision,
}

impl RecordingConsentHandler {
    pub fn new(decision: ConsentDecision) -> Self {
        Self {
            topics: std::sync::Mutex::new(Vec::new()),
            decision,
        }
    }

    /// Topics consent was requested for, in order
    pub fn requests(&self) -> Vec<String> {
        self.topics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.topics.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl ConsentHandler for RecordingConsentHandler {
    fn request_consent(&self, topic: &str) -> Result<ConsentDecision, ConsentError> {
        self.topics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(topic.to_string());
        Ok(self.decision)
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Check whether stdin is attached to a terminal
fn atty_check() -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: isatty only inspects the descriptor
        unsafe { libc::isatty(io::stdin().as_raw_fd()) != 0 }
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::System::Console::{GetConsoleMode, CONSOLE_MODE};
        let handle = io::stdin().as_raw_handle();
        let mut mode: CONSOLE_MODE = 0;
        // SAFETY: GetConsoleMode only writes to `mode`
        unsafe { GetConsoleMode(handle as _, &mut mode) != 0 }
    }

    #[cfg(not(any(unix, windows)))]
    {
        std::env::var("TERM").is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_default_is_deny() {
        assert_eq!(ConsentDecision::default(), ConsentDecision::Deny);
        assert!(ConsentDecision::Allow.is_allowed());
    }

    #[test]
    fn test_auto_handler() {
        let allow = AutoConsentHandler::always_allow();
        assert_eq!(
            allow.request_consent("nfc").unwrap(),
            ConsentDecision::Allow
        );
        let deny = AutoConsentHandler::always_deny();
        assert_eq!(deny.request_consent("nfc").unwrap(), ConsentDecision::Deny);
        assert!(!deny.is_interactive());
    }

    #[test]
    fn test_recording_handler() {
        let handler = RecordingConsentHandler::new(ConsentDecision::Allow);
        handler.request_consent("nfc").unwrap();
        handler.request_consent("nfc").unwrap();
        assert_eq!(handler.request_count(), 2);
        assert_eq!(handler.requests(), vec!["nfc", "nfc"]);
    }

    #[test]
    fn test_terminal_input_parsing() {
        assert_eq!(
            TerminalConsentHandler::read_decision("Y\n"),
            ConsentDecision::Allow
        );
        assert_eq!(
            TerminalConsentHandler::read_decision("enable"),
            ConsentDecision::Allow
        );
        assert_eq!(
            TerminalConsentHandler::read_decision(""),
            ConsentDecision::Deny
        );
        assert_eq!(
            TerminalConsentHandler::read_decision("later"),
            ConsentDecision::Deny
        );
    }
}
