//! Record codec
//!
//! Decodes raw tag records into display strings and turns user input into
//! write requests. Decoding is permissive: malformed bytes become U+FFFD
//! instead of an error, the same way a browser `TextDecoder` behaves.

use encoding_rs::{Encoding, UTF_8};
use tagrw_api::{Detection, ReadOutcome, RecordKind, TagRecord, WritePayload, WriteRequest};

use crate::url;

/// Decoder/encoder for tag records
#[derive(Debug, Clone, Copy)]
pub struct RecordCodec {
    /// Used for text records with an absent, empty or unknown encoding label
    default_encoding: &'static Encoding,
}

impl RecordCodec {
    /// Codec defaulting to UTF-8
    pub fn new() -> Self {
        Self {
            default_encoding: UTF_8,
        }
    }

    /// Codec with a different default text encoding
    ///
    /// Unknown labels keep UTF-8 as the default.
    pub fn with_default_encoding(label: &str) -> Self {
        match Encoding::for_label(label.trim().as_bytes()) {
            Some(encoding) => Self {
                default_encoding: encoding,
            },
            None => {
                tracing::warn!(label, "Unknown default text encoding, using UTF-8");
                Self::new()
            }
        }
    }

    /// Name of the default text encoding
    pub fn default_encoding(&self) -> &'static str {
        self.default_encoding.name()
    }

    /// Decode one record
    ///
    /// Returns `Some("")` for empty records and `None` for kinds that have
    /// no textual meaning.
    pub fn decode(&self, record: &TagRecord) -> Option<String> {
        match record.kind {
            RecordKind::Text => {
                let encoding = self.text_encoding(record.encoding.as_deref());
                let (text, had_errors) = encoding.decode_with_bom_removal(&record.data);
                if had_errors {
                    tracing::debug!(
                        encoding = encoding.name(),
                        "Text record contained malformed bytes"
                    );
                }
                Some(text.into_owned())
            }
            RecordKind::Url => {
                let (text, _) = UTF_8.decode_with_bom_removal(&record.data);
                Some(text.into_owned())
            }
            RecordKind::Empty => Some(String::new()),
            RecordKind::Unknown => None,
        }
    }

    /// Decode a detection into a read outcome
    ///
    /// Only the first record is consulted; the rest of the message is
    /// ignored. A message without records reads as `Unknown`.
    pub fn decode_message(&self, detection: &Detection) -> ReadOutcome {
        let mut outcome = match detection.message.first() {
            Some(record) => ReadOutcome {
                kind: record.kind,
                text: self.decode(record),
                serial_number: None,
            },
            None => ReadOutcome::unknown(),
        };
        outcome.serial_number = detection.serial_number.clone();
        outcome
    }

    /// Turn user input into a write request
    ///
    /// URLs go through [`url::normalize`] first.
    pub fn encode(&self, payload: &WritePayload) -> WriteRequest {
        match payload {
            WritePayload::Text(text) => WriteRequest::Text(text.clone()),
            WritePayload::Url(raw) => WriteRequest::Record(TagRecord::url(url::normalize(raw))),
        }
    }

    fn text_encoding(&self, label: Option<&str>) -> &'static Encoding {
        let Some(label) = label.map(str::trim).filter(|l| !l.is_empty()) else {
            return self.default_encoding;
        };
        Encoding::for_label(label.as_bytes()).unwrap_or_else(|| {
            tracing::debug!(label, "Unknown text encoding label, using default");
            self.default_encoding
        })
    }
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new()
    }
}
