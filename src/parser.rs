//! Log line parser
//!
//! Two grammars are tried in order. First, a line may embed a terminal
//! notification escape sequence (`OSC 9` or `OSC 777 notify`, terminated by
//! BEL or ST) anywhere in its body. Second, the structured shell-hook record
//! `timestamp|TAG|payload`. Anything else is dropped; a malformed line never
//! aborts a batch.

use crate::events::{LineType, ParsedLogEntry};
use chrono::{DateTime, Utc};

const ESC: char = '\u{1b}';
const BEL: char = '\u{07}';
const OSC_9_PREFIX: &str = "\u{1b}]9;";
const OSC_777_PREFIX: &str = "\u{1b}]777;notify;";

/// Stateless parser turning one raw line into a typed record.
pub struct LogLineParser;

impl LogLineParser {
    /// Parse a single line. Returns `None` for anything unparsable.
    pub fn parse(line: &str) -> Option<ParsedLogEntry> {
        if let Some(entry) = Self::parse_terminal_notification(line) {
            return Some(entry);
        }
        Self::parse_structured(line)
    }

    /// Extract an OSC 9 or OSC 777 notification embedded in the line.
    ///
    /// These sequences carry no timestamp; the entry is stamped "now".
    fn parse_terminal_notification(line: &str) -> Option<ParsedLogEntry> {
        let body = Self::osc_body(line, OSC_9_PREFIX)
            .or_else(|| Self::osc_body(line, OSC_777_PREFIX))?;

        // Body is `<title>;<message>`; the message may itself contain `;`
        let (title, message) = match body.split_once(';') {
            Some((title, message)) => (title, message),
            None => (body, ""),
        };

        Some(ParsedLogEntry {
            timestamp: Utc::now(),
            line_type: LineType::TerminalNotification,
            session_id: None,
            command: None,
            exit_code: None,
            payload: format!("{}|{}", title, message),
        })
    }

    /// Return the text between `prefix` and the sequence terminator
    /// (BEL or ST), or `None` if the prefix is absent. An unterminated
    /// sequence runs to end of line; hook writers are line-buffered so this
    /// only happens with sloppy producers.
    fn osc_body<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
        let start = line.find(prefix)? + prefix.len();
        let rest = &line[start..];
        let end = rest
            .find(BEL)
            .or_else(|| rest.find(&format!("{}\\", ESC)))
            .unwrap_or(rest.len());
        Some(&rest[..end])
    }

    /// Parse a `timestamp|TAG|payload` record. At most two splits, so the
    /// payload may itself contain `|`.
    fn parse_structured(line: &str) -> Option<ParsedLogEntry> {
        let mut fields = line.splitn(3, '|');
        let timestamp_field = fields.next()?;
        let tag_field = fields.next()?;
        let payload = fields.next().unwrap_or("").to_string();

        let timestamp = Self::parse_timestamp(timestamp_field)?;
        let line_type = LineType::from_tag(tag_field)?;

        let (session_id, command, exit_code) = match line_type {
            LineType::CommandStart => {
                let (session, command) = split_session_payload(&payload);
                (session, command, None)
            }
            LineType::CommandEnd => {
                let (session, rest) = split_session_payload(&payload);
                // Non-integer payload means exit code absent, not an error
                let exit_code = rest.and_then(|r| r.trim().parse::<i32>().ok());
                (session, None, exit_code)
            }
            _ => (None, None, None),
        };

        Some(ParsedLogEntry {
            timestamp,
            line_type,
            session_id,
            command,
            exit_code,
            payload,
        })
    }

    /// ISO-8601 instant, tried with fractional seconds first, then without.
    fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%:z")
            .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%:z"))
            .or_else(|_| DateTime::parse_from_rfc3339(value))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Split a CMD_START / CMD_END payload into `(session_id, remainder)`.
fn split_session_payload(payload: &str) -> (Option<String>, Option<String>) {
    if payload.is_empty() {
        return (None, None);
    }
    match payload.split_once('|') {
        Some((session, rest)) => (Some(session.to_string()), Some(rest.to_string())),
        None => (Some(payload.to_string()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_command_start_with_command_text() {
        let entry =
            LogLineParser::parse("2026-02-09T10:30:00+08:00|CMD_START|sess1|echo hi").unwrap();
        assert_eq!(entry.line_type, LineType::CommandStart);
        assert_eq!(entry.session_id.as_deref(), Some("sess1"));
        assert_eq!(entry.command.as_deref(), Some("echo hi"));
        assert_eq!(
            entry.timestamp,
            Utc.with_ymd_and_hms(2026, 2, 9, 2, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_command_end_with_exit_code() {
        let entry = LogLineParser::parse("2026-02-09T10:30:01+08:00|CMD_END|sess1|127").unwrap();
        assert_eq!(entry.line_type, LineType::CommandEnd);
        assert_eq!(entry.session_id.as_deref(), Some("sess1"));
        assert_eq!(entry.exit_code, Some(127));
    }

    #[test]
    fn test_command_end_non_integer_exit_code() {
        let entry =
            LogLineParser::parse("2026-02-09T10:30:01+08:00|CMD_END|sess1|oops").unwrap();
        assert_eq!(entry.exit_code, None);
        assert_eq!(entry.session_id.as_deref(), Some("sess1"));
    }

    #[test]
    fn test_fractional_seconds_accepted() {
        let entry =
            LogLineParser::parse("2026-02-09T10:30:00.123+00:00|OUTPUT|hello world").unwrap();
        assert_eq!(entry.line_type, LineType::Output);
        assert_eq!(entry.payload, "hello world");
    }

    #[test]
    fn test_payload_may_contain_pipes() {
        let entry =
            LogLineParser::parse("2026-02-09T10:30:00+00:00|OUTPUT|a|b|c").unwrap();
        assert_eq!(entry.payload, "a|b|c");
    }

    #[test]
    fn test_wire_round_trip_preserves_tag_and_payload() {
        let line = "2026-02-09T10:30:00+00:00|TASK_COMPLETE|deploy finished ok";
        let entry = LogLineParser::parse(line).unwrap();
        let rewired = entry.to_wire();
        let reparsed = LogLineParser::parse(&rewired).unwrap();
        assert_eq!(reparsed.line_type, entry.line_type);
        assert_eq!(reparsed.payload, entry.payload);
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        assert!(LogLineParser::parse("not-a-time|OUTPUT|hello").is_none());
        assert!(LogLineParser::parse("2026-13-45T99:99:99+00:00|OUTPUT|x").is_none());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert!(LogLineParser::parse("2026-02-09T10:30:00+00:00|FUTURE_TAG|x").is_none());
    }

    #[test]
    fn test_too_few_fields_rejected() {
        assert!(LogLineParser::parse("just some words").is_none());
        assert!(LogLineParser::parse("").is_none());
    }

    #[test]
    fn test_osc9_notification_bel_terminated() {
        let line = "prefix \u{1b}]9;Build;compile finished\u{07} suffix";
        let entry = LogLineParser::parse(line).unwrap();
        assert_eq!(entry.line_type, LineType::TerminalNotification);
        assert_eq!(entry.payload, "Build|compile finished");
    }

    #[test]
    fn test_osc777_notification_st_terminated() {
        let line = "\u{1b}]777;notify;Tests;all green\u{1b}\\";
        let entry = LogLineParser::parse(line).unwrap();
        assert_eq!(entry.line_type, LineType::TerminalNotification);
        assert_eq!(entry.payload, "Tests|all green");
    }

    #[test]
    fn test_notification_message_may_contain_semicolons() {
        let line = "\u{1b}]9;Title;part one; part two\u{07}";
        let entry = LogLineParser::parse(line).unwrap();
        assert_eq!(entry.payload, "Title|part one; part two");
    }

    #[test]
    fn test_escape_sequence_wins_over_structured_grammar() {
        // A line carrying both forms parses as a terminal notification
        let line = "2026-02-09T10:30:00+00:00|OUTPUT|\u{1b}]9;T;m\u{07}";
        let entry = LogLineParser::parse(line).unwrap();
        assert_eq!(entry.line_type, LineType::TerminalNotification);
    }
}
