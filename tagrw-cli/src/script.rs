//! Line commands for `tagrw simulate`
//!
//! One command per line; blank lines and `#` comments are skipped.
//!
//! ```text
//! tag text hello        present a tag holding a text record
//! tag url example.com   ... a URL record
//! tag empty             ... an empty record
//! tag mime x            ... a record of an unsupported type
//! tag none              ... a tag without records
//! tag error [reason]    ... a tag the reader cannot read
//! arm text|url <value>  arm a write for the next tag
//! cancel                drop the armed write
//! enable | start        request scanning
//! permission <state>    change the host permission state
//! fail-writes <n>       fail the next n writes
//! status                print a session snapshot
//! quit                  stop
//! ```

use tagrw_api::{Detection, NdefMessage, PermissionState, TagRecord, WritePayload};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("line {line}: unknown command '{command}'")]
    UnknownCommand { line: usize, command: String },

    #[error("line {line}: '{command}' needs {expected}")]
    MissingArgument {
        line: usize,
        command: String,
        expected: &'static str,
    },

    #[error("line {line}: invalid value '{value}' ({reason})")]
    InvalidValue {
        line: usize,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCommand {
    Tag(Detection),
    TagError(String),
    Arm(WritePayload),
    Cancel,
    Enable,
    Start,
    Permission(PermissionState),
    FailWrites(usize),
    Status,
    Quit,
}

/// Parse one script line; `Ok(None)` for blank lines and comments
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<ScriptCommand>, ScriptError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (command, rest) = split_word(line);
    let missing = |expected| ScriptError::MissingArgument {
        line: line_no,
        command: command.to_string(),
        expected,
    };

    let parsed = match command {
        "tag" => parse_tag(line_no, rest).ok_or_else(|| missing("a record kind"))??,
        "arm" => {
            let (kind, value) = split_word(rest);
            match kind {
                "text" => ScriptCommand::Arm(WritePayload::text(value)),
                "url" => ScriptCommand::Arm(WritePayload::url(value)),
                "" => return Err(missing("'text' or 'url'")),
                other => return Err(invalid(line_no, other, "expected 'text' or 'url'")),
            }
        }
        "cancel" => ScriptCommand::Cancel,
        "enable" => ScriptCommand::Enable,
        "start" => ScriptCommand::Start,
        "permission" => {
            if rest.is_empty() {
                return Err(missing("a permission state"));
            }
            let state = rest
                .parse::<PermissionState>()
                .map_err(|e| invalid(line_no, rest, &e.to_string()))?;
            ScriptCommand::Permission(state)
        }
        "fail-writes" => {
            if rest.is_empty() {
                return Err(missing("a count"));
            }
            let count = rest
                .parse::<usize>()
                .map_err(|e| invalid(line_no, rest, &e.to_string()))?;
            ScriptCommand::FailWrites(count)
        }
        "status" => ScriptCommand::Status,
        "quit" | "exit" => ScriptCommand::Quit,
        other => {
            return Err(ScriptError::UnknownCommand {
                line: line_no,
                command: other.to_string(),
            })
        }
    };
    Ok(Some(parsed))
}

// None when no record kind was given
fn parse_tag(line_no: usize, rest: &str) -> Option<Result<ScriptCommand, ScriptError>> {
    let (kind, value) = split_word(rest);
    let record = match kind {
        "" => return None,
        "none" => return Some(Ok(ScriptCommand::Tag(Detection::blank()))),
        "error" => {
            let reason = if value.is_empty() {
                "NotReadableError"
            } else {
                value
            };
            return Some(Ok(ScriptCommand::TagError(reason.to_string())));
        }
        "text" => TagRecord::text(value),
        "url" => TagRecord::url(value),
        "empty" => TagRecord::empty(),
        "mime" | "unknown" | "absolute-url" | "smart-poster" => {
            TagRecord::new(kind, value.as_bytes().to_vec())
        }
        other => {
            return Some(Err(invalid(
                line_no,
                other,
                "expected text, url, empty, mime, none or error",
            )))
        }
    };
    Some(Ok(ScriptCommand::Tag(Detection::new(NdefMessage::single(
        record,
    )))))
}

fn split_word(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

fn invalid(line: usize, value: &str, reason: &str) -> ScriptError {
    ScriptError::InvalidValue {
        line,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagrw_api::RecordKind;

    fn parse(line: &str) -> ScriptCommand {
        parse_line(1, line).unwrap().unwrap()
    }

    #[test]
    fn test_skips_blank_and_comments() {
        assert_eq!(parse_line(1, "").unwrap(), None);
        assert_eq!(parse_line(1, "   # arm text x").unwrap(), None);
    }

    #[test]
    fn test_tag_commands() {
        match parse("tag text hello world") {
            ScriptCommand::Tag(detection) => {
                let record = detection.message.first().unwrap();
                assert_eq!(record.kind, RecordKind::Text);
                assert_eq!(record.data, b"hello world");
            }
            other => panic!("unexpected {:?}", other),
        }
        match parse("tag mime abc") {
            ScriptCommand::Tag(detection) => {
                assert_eq!(detection.message.first().unwrap().kind, RecordKind::Unknown)
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(parse("tag none"), ScriptCommand::Tag(Detection::blank()));
        assert_eq!(
            parse("tag error"),
            ScriptCommand::TagError("NotReadableError".into())
        );
    }

    #[test]
    fn test_arm_commands() {
        assert_eq!(
            parse("arm url  example.com"),
            ScriptCommand::Arm(WritePayload::url("example.com"))
        );
        assert_eq!(
            parse("arm text two words"),
            ScriptCommand::Arm(WritePayload::text("two words"))
        );
        assert!(matches!(
            parse_line(4, "arm"),
            Err(ScriptError::MissingArgument { line: 4, .. })
        ));
        assert!(matches!(
            parse_line(1, "arm mime x"),
            Err(ScriptError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_control_commands() {
        assert_eq!(parse("cancel"), ScriptCommand::Cancel);
        assert_eq!(parse("enable"), ScriptCommand::Enable);
        assert_eq!(
            parse("permission granted"),
            ScriptCommand::Permission(PermissionState::Granted)
        );
        assert_eq!(parse("fail-writes 2"), ScriptCommand::FailWrites(2));
        assert_eq!(parse("quit"), ScriptCommand::Quit);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse_line(7, "dance"),
            Err(ScriptError::UnknownCommand {
                line: 7,
                command: "dance".into()
            })
        );
        assert!(matches!(
            parse_line(1, "tag"),
            Err(ScriptError::MissingArgument { .. })
        ));
        assert!(matches!(
            parse_line(1, "permission maybe"),
            Err(ScriptError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_line(1, "fail-writes many"),
            Err(ScriptError::InvalidValue { .. })
        ));
    }
}
