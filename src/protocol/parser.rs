//! Inbound message classification
//!
//! The DSP mixes asynchronous push notifications with replies to `$e`
//! commands, often several per burst. Each complete line is matched against a
//! fixed, ordered set of patterns; anything unrecognised is dropped. Parsing
//! never fails as a whole: a bad number only skips the occurrence it is in.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use super::framing::LineBuffer;
use crate::state::ControlId;

/// `#<control>=<value>` push notification
static PUSH_UPDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([0-9]+)=([0-9]+)").expect("valid push regex"));

/// `{GS <control>} <value>` reply to a single value query
static GS_REPLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{GS\s([0-9]+)\}\s+([0-9]+)").expect("valid GS regex"));

/// `{<VERB> <number>} ACK` acknowledgement of an `$e` set command
static COMMAND_ACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Z]+)\s([0-9]+)\}\sACK").expect("valid ack regex"));

/// `{GPU} <list>` revised push-enabled enumeration
static GPU_REPLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{GPU\}(.*)").expect("valid GPU regex"));

/// `{<VERB>( <number>)?} <payload>` reply to an `$e` get command
static QUERY_REPLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Z]+)(?:\s([0-9]+))?\}\s([a-zA-Z0-9]+)").expect("valid query regex")
});

/// Header of the legacy (verbose) push-enabled enumeration
pub const PUSH_ENABLED_HEADER: &str = "controllers in range 1 to 10000 enabled for push";

/// Classified inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Plain `ACK`, carries nothing
    Ack,
    /// Unsolicited value change of a push-enabled control
    PushUpdate { control: ControlId, value: u16 },
    /// Value reported in reply to `$e GS`
    InitialPushValue { control: ControlId, value: u16 },
    /// `LP`/`LPG` acknowledged
    PresetLoaded { preset: u32, global: bool },
    /// Reply to `$e GPR`
    LatestPreset(u32),
    /// Controls the device reports as push-enabled, in device order
    PushEnabledList(Vec<ControlId>),
}

fn parse_control(text: &str) -> Option<ControlId> {
    text.parse::<u32>().ok().and_then(ControlId::new)
}

/// Parses the inbound stream into messages
#[derive(Debug, Default)]
pub struct MessageParser {
    lines: LineBuffer,
    /// Open push-enabled enumeration collecting one id per line
    enumeration: Option<Vec<ControlId>>,
}

impl MessageParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one received chunk, returning the messages of every line it completed
    ///
    /// An enumeration stays open across chunks until a blank or non-numeric
    /// line ends it, or until [`flush`](Self::flush) is called.
    pub fn feed(&mut self, chunk: &str) -> Vec<Message> {
        let mut out = Vec::new();
        for line in self.lines.push(chunk) {
            self.parse_line(&line, &mut out);
        }
        out
    }

    /// Whether an enumeration is still collecting ids
    pub fn has_open_enumeration(&self) -> bool {
        self.enumeration.is_some()
    }

    /// Close an open enumeration whose terminator never arrived
    pub fn flush(&mut self) -> Option<Message> {
        let mut out = Vec::new();
        self.close_enumeration(&mut out);
        out.pop()
    }

    /// Forget buffered text and any open enumeration
    pub fn reset(&mut self) {
        self.lines.clear();
        self.enumeration = None;
    }

    fn close_enumeration(&mut self, out: &mut Vec<Message>) {
        if let Some(ids) = self.enumeration.take() {
            if !ids.is_empty() {
                debug!(count = ids.len(), "Push-enabled enumeration parsed");
                out.push(Message::PushEnabledList(ids));
            }
        }
    }

    fn parse_line(&mut self, line: &str, out: &mut Vec<Message>) {
        let text = line.trim();
        trace!(line = text, "RX");

        if let Some(ids) = self.enumeration.as_mut() {
            if text.is_empty() {
                self.close_enumeration(out);
                return;
            }
            if text.bytes().all(|b| b.is_ascii_digit()) {
                match parse_control(text) {
                    Some(id) => ids.push(id),
                    None => debug!(line = text, "Skipping invalid control in enumeration"),
                }
                return;
            }
            self.close_enumeration(out);
        }

        if text.is_empty() {
            return;
        }

        if text == "ACK" {
            out.push(Message::Ack);
            return;
        }

        if self.parse_values(text, out) {
            return;
        }

        if let Some(caps) = COMMAND_ACK.captures(text) {
            let global = match &caps[1] {
                "LP" => false,
                "LPG" => true,
                verb => {
                    trace!(verb, "Ignoring acknowledgement");
                    return;
                },
            };
            match caps[2].parse::<u32>() {
                Ok(preset) => out.push(Message::PresetLoaded { preset, global }),
                Err(e) => debug!(line = text, error = %e, "Skipping preset acknowledgement"),
            }
            return;
        }

        if text.contains(PUSH_ENABLED_HEADER) {
            self.enumeration = Some(Vec::new());
            return;
        }

        if let Some(caps) = GPU_REPLY.captures(text) {
            let ids = caps[1]
                .split_whitespace()
                .filter_map(|item| {
                    let id = parse_control(item);
                    if id.is_none() {
                        debug!(item, "Skipping invalid control in GPU reply");
                    }
                    id
                })
                .collect();
            self.enumeration = Some(ids);
            return;
        }

        if let Some(caps) = QUERY_REPLY.captures(text) {
            if &caps[1] == "GPR" {
                match caps[3].parse::<u32>() {
                    Ok(preset) => out.push(Message::LatestPreset(preset)),
                    Err(e) => debug!(line = text, error = %e, "Skipping GPR reply"),
                }
            } else {
                trace!(verb = &caps[1], "Ignoring query reply");
            }
            return;
        }

        debug!(line = text, "Dropping unrecognised line");
    }

    /// Extract every push update and GS reply on the line
    ///
    /// Returns true when at least one pattern occurrence was present, even if
    /// all of them were skipped for bad numbers.
    fn parse_values(&self, text: &str, out: &mut Vec<Message>) -> bool {
        let mut matched = false;

        for caps in PUSH_UPDATE.captures_iter(text) {
            matched = true;
            match (parse_control(&caps[1]), caps[2].parse::<u16>()) {
                (Some(control), Ok(value)) => out.push(Message::PushUpdate { control, value }),
                _ => debug!(item = &caps[0], "Skipping malformed push update"),
            }
        }

        for caps in GS_REPLY.captures_iter(text) {
            matched = true;
            match (parse_control(&caps[1]), caps[2].parse::<u16>()) {
                (Some(control), Ok(value)) => {
                    out.push(Message::InitialPushValue { control, value })
                },
                _ => debug!(item = &caps[0], "Skipping malformed GS reply"),
            }
        }

        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;

    fn id(n: u32) -> ControlId {
        ControlId::new(n).unwrap()
    }

    /// Parse a complete burst, closing any enumeration left open
    fn parse(text: &str) -> Vec<Message> {
        let mut parser = MessageParser::new();
        let mut out = parser.feed(text);
        out.extend(parser.flush());
        out
    }

    #[test]
    fn test_ack_is_recognised() {
        assert_eq!(parse("ACK\r\n"), vec![Message::Ack]);
    }

    #[test]
    fn test_push_update_decodes() {
        assert_eq!(
            parse("#5=1234\r\n"),
            vec![Message::PushUpdate { control: id(5), value: 1234 }]
        );
    }

    #[test]
    fn test_push_burst_extracts_all() {
        let messages = parse("#1=10\r\n#2=20 #3=30\r\n");
        assert_eq!(
            messages,
            vec![
                Message::PushUpdate { control: id(1), value: 10 },
                Message::PushUpdate { control: id(2), value: 20 },
                Message::PushUpdate { control: id(3), value: 30 },
            ]
        );
    }

    #[test]
    fn test_bad_number_skips_only_that_update() {
        let messages = parse("#1=99999 #0=5 #2=20\r\n");
        assert_eq!(messages, vec![Message::PushUpdate { control: id(2), value: 20 }]);
    }

    #[test]
    fn test_gs_reply() {
        assert_eq!(
            parse("{GS 42} 65535\r\n"),
            vec![Message::InitialPushValue { control: id(42), value: 65535 }]
        );
    }

    #[test]
    fn test_preset_acks() {
        assert_eq!(
            parse("{LP 3} ACK\r\n{LPG 7} ACK\r\n{CS 1} ACK\r\n"),
            vec![
                Message::PresetLoaded { preset: 3, global: false },
                Message::PresetLoaded { preset: 7, global: true },
            ]
        );
    }

    #[test]
    fn test_latest_preset_reply() {
        assert_eq!(parse("{GPR} 12\r\n"), vec![Message::LatestPreset(12)]);
        assert!(parse("{GPR} abc\r\n").is_empty());
        assert!(parse("{XYZ 1} foo\r\n").is_empty());
    }

    #[test]
    fn test_legacy_enumeration() {
        let text = "3 controllers in range 1 to 10000 enabled for push\r\n10\r\n20\r\n30\r\n\r\n";
        assert_eq!(
            parse(text),
            vec![Message::PushEnabledList(vec![id(10), id(20), id(30)])]
        );
    }

    #[test]
    fn test_legacy_enumeration_followed_by_other_line() {
        let text = "controllers in range 1 to 10000 enabled for push\r\n10\r\n#10=5\r\n";
        assert_eq!(
            parse(text),
            vec![
                Message::PushEnabledList(vec![id(10)]),
                Message::PushUpdate { control: id(10), value: 5 },
            ]
        );
    }

    #[test]
    fn test_revised_enumeration() {
        assert_eq!(
            parse("{GPU} 10\r20\r30\r\n"),
            vec![Message::PushEnabledList(vec![id(10), id(20), id(30)])]
        );
    }

    #[test]
    fn test_revised_enumeration_over_lines() {
        assert_eq!(
            parse("{GPU} 10\r\n20\r\n30\r\n\r\n"),
            vec![Message::PushEnabledList(vec![id(10), id(20), id(30)])]
        );
    }

    #[test]
    fn test_empty_enumeration_emits_nothing() {
        assert!(parse("{GPU}\r\n\r\n").is_empty());
    }

    #[test]
    fn test_garbage_is_dropped() {
        assert!(parse("###garbage{{{").is_empty());
        assert!(parse("###garbage{{{\r\n").is_empty());
        assert!(parse("\u{0}\u{7f}{{}}}#=\r\n").is_empty());
    }

    #[test]
    fn test_message_split_across_chunks() {
        let mut parser = MessageParser::new();
        assert!(parser.feed("#5=12").is_empty());
        assert_eq!(
            parser.feed("34\r\n"),
            vec![Message::PushUpdate { control: id(5), value: 1234 }]
        );
    }

    #[test]
    fn test_encoded_command_is_not_a_message() {
        let line = Command::SetValue { control: id(5), value: 1234 }.encode().unwrap();
        assert!(parse(&line).is_empty());
        // The device's push for the same control decodes back
        assert_eq!(
            parse("#5=1234\r\n"),
            vec![Message::PushUpdate { control: id(5), value: 1234 }]
        );
    }

    #[test]
    fn test_reset_drops_partial_line() {
        let mut parser = MessageParser::new();
        parser.feed("#5=");
        parser.reset();
        assert!(parser.feed("1\r\n").is_empty());
    }

    #[test]
    fn test_legacy_enumeration_header_in_earlier_chunk() {
        let mut parser = MessageParser::new();
        assert!(parser
            .feed("3 controllers in range 1 to 10000 enabled for push\r\n")
            .is_empty());
        assert!(parser.has_open_enumeration());
        assert_eq!(
            parser.feed("10\r\n20\r\n30\r\n\r\n"),
            vec![Message::PushEnabledList(vec![id(10), id(20), id(30)])]
        );
        assert!(!parser.has_open_enumeration());
    }

    #[test]
    fn test_revised_enumeration_continues_in_next_chunk() {
        let mut parser = MessageParser::new();
        assert!(parser.feed("{GPU} 10\r\n20\r\n").is_empty());
        assert_eq!(
            parser.feed("30\r\n\r\n"),
            vec![Message::PushEnabledList(vec![id(10), id(20), id(30)])]
        );
    }

    #[test]
    fn test_flush_closes_unterminated_enumeration() {
        let mut parser = MessageParser::new();
        assert!(parser.feed("{GPU} 4\r\n5\r\n").is_empty());
        assert_eq!(parser.flush(), Some(Message::PushEnabledList(vec![id(4), id(5)])));
        assert_eq!(parser.flush(), None);
        // Nothing is open any more, so a stray id is dropped
        assert!(parser.feed("6\r\n").is_empty());
    }
}
