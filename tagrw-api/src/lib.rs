//! tagrw-api: Shared types for the tagrw tag session
//!
//! This crate defines the data exchanged between the session runtime, the
//! tag transport and whatever presents the session to a user. Everything
//! here is plain data and serializes with serde.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Permission topic queried from the host by default
pub const DEFAULT_PERMISSION_TOPIC: &str = "nfc";

// ============================================================================
// Permission
// ============================================================================

/// Host authorization state for tag access
///
/// The host owns this value; the session only reacts to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionState {
    /// No permission query or no tag capability on this host
    #[serde(alias = "not-supported")]
    Unsupported,
    /// The user or host refused access
    Denied,
    /// Access requires an explicit user action
    Prompt,
    /// Access granted
    Granted,
}

impl PermissionState {
    /// Status line shown to the user for this state
    pub fn status_message(&self) -> &'static str {
        match self {
            Self::Unsupported => "NFC not supported",
            Self::Denied => "NFC permission denied",
            Self::Prompt => "Enable NFC",
            Self::Granted => "Scanning",
        }
    }

    /// Whether the status is an action the user has to trigger
    pub fn needs_user_action(&self) -> bool {
        matches!(self, Self::Prompt)
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }

    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::Denied => "denied",
            Self::Prompt => "prompt",
            Self::Granted => "granted",
        }
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unsupported" | "not-supported" => Ok(Self::Unsupported),
            "denied" => Ok(Self::Denied),
            "prompt" => Ok(Self::Prompt),
            "granted" => Ok(Self::Granted),
            other => Err(ParseError::new("permission state", other)),
        }
    }
}

/// Error returned when parsing one of the enums in this crate from text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    what: &'static str,
    value: String,
}

impl ParseError {
    fn new(what: &'static str, value: impl Into<String>) -> Self {
        Self {
            what,
            value: value.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: '{}'", self.what, self.value)
    }
}

impl std::error::Error for ParseError {}

// ============================================================================
// Records
// ============================================================================

/// Record kinds the session knows how to present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Text,
    Url,
    Empty,
    /// Any other record type, or no record at all
    Unknown,
}

impl RecordKind {
    /// Classify a host record type string
    ///
    /// Only `text`, `url` and `empty` are interpreted; mime, smart poster,
    /// absolute URL and external types all fall into `Unknown`.
    pub fn from_record_type(record_type: &str) -> Self {
        match record_type {
            "text" => Self::Text,
            "url" => Self::Url,
            "empty" => Self::Empty,
            _ => Self::Unknown,
        }
    }

    /// Title shown above a read result
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Url => "URL",
            Self::Empty => "Empty",
            Self::Unknown => "Unknown",
        }
    }

    /// Host record type string for this kind
    pub fn record_type(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Url => "url",
            Self::Empty => "empty",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RecordKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "url" => Ok(Self::Url),
            "empty" => Ok(Self::Empty),
            "unknown" => Ok(Self::Unknown),
            other => Err(ParseError::new("record kind", other)),
        }
    }
}

/// A single record read from (or written to) a tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    /// Interpreted kind
    pub kind: RecordKind,

    /// Record type as reported by the host (e.g. "text", "mime")
    pub record_type: String,

    /// Raw payload bytes
    #[serde(default)]
    pub data: Vec<u8>,

    /// Text encoding label, only meaningful for text records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl TagRecord {
    /// Create a record from a host record type string and raw bytes
    pub fn new(record_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let record_type = record_type.into();
        Self {
            kind: RecordKind::from_record_type(&record_type),
            record_type,
            data: data.into(),
            encoding: None,
        }
    }

    /// UTF-8 text record
    pub fn text(text: impl Into<String>) -> Self {
        Self::new("text", text.into().into_bytes()).with_encoding("utf-8")
    }

    /// URL record
    pub fn url(url: impl Into<String>) -> Self {
        Self::new("url", url.into().into_bytes())
    }

    /// Empty record
    pub fn empty() -> Self {
        Self::new("empty", Vec::new())
    }

    /// Set the text encoding label
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }
}

/// Ordered records stored on a tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NdefMessage {
    #[serde(default)]
    pub records: Vec<TagRecord>,
}

impl NdefMessage {
    pub fn new(records: Vec<TagRecord>) -> Self {
        Self { records }
    }

    /// Message with a single record
    pub fn single(record: TagRecord) -> Self {
        Self {
            records: vec![record],
        }
    }

    /// The only record the session ever interprets
    pub fn first(&self) -> Option<&TagRecord> {
        self.records.first()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A tag presented to an active scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub message: NdefMessage,

    /// Tag serial number, when the host exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

impl Detection {
    pub fn new(message: NdefMessage) -> Self {
        Self {
            message,
            serial_number: None,
        }
    }

    /// Detection carrying no records at all
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }
}

/// Result of reading a tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOutcome {
    pub kind: RecordKind,

    /// Decoded content; `Some("")` is a valid value, `None` means nothing
    /// could be decoded
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

impl ReadOutcome {
    /// Outcome of a read that yielded no records
    pub fn unknown() -> Self {
        Self {
            kind: RecordKind::Unknown,
            text: None,
            serial_number: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.kind.label()
    }

    /// Text worth displaying; empty strings count as nothing to show
    pub fn display_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

// ============================================================================
// Writes
// ============================================================================

/// What the user asked to write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum WritePayload {
    Text(String),
    Url(String),
}

impl WritePayload {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn url(value: impl Into<String>) -> Self {
        Self::Url(value.into())
    }
}

/// What is handed to the transport's write primitive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum WriteRequest {
    /// Plain string, written by the host as a single text record
    Text(String),
    /// Single-record descriptor
    Record(TagRecord),
}

impl WriteRequest {
    /// Records the host ends up putting on the tag
    pub fn to_message(&self) -> NdefMessage {
        match self {
            Self::Text(text) => NdefMessage::single(TagRecord::text(text.clone())),
            Self::Record(record) => NdefMessage::single(record.clone()),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Mode of a tag session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    /// Before scanning starts
    Idle,
    /// Detections are read and reported
    Scanning,
    /// The next detection is overwritten
    WriteArmed,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::WriteArmed => "write-armed",
        };
        f.write_str(name)
    }
}

/// Notifications emitted by the session for presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Notification {
    PermissionChanged { state: PermissionState },
    ScanStarted,
    ScanFailed { error: String },
    ReadComplete(ReadOutcome),
    WriteArmed { payload: WritePayload },
    WriteCancelled,
    /// Also closes any transient read display
    WriteComplete,
    /// The session stays armed; the next tag retries the same payload
    WriteFailed { error: String },
}

impl Notification {
    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::PermissionChanged { .. } => "permission-changed",
            Self::ScanStarted => "scan-started",
            Self::ScanFailed { .. } => "scan-failed",
            Self::ReadComplete(_) => "read-complete",
            Self::WriteArmed { .. } => "write-armed",
            Self::WriteCancelled => "write-cancelled",
            Self::WriteComplete => "write-complete",
            Self::WriteFailed { .. } => "write-failed",
        }
    }
}
