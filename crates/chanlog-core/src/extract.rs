//! Channel message extraction.
//!
//! Expected shape: `:nick!user@host PRIVMSG #channel :text`. Anything that
//! does not fit is skipped as a whole; a record is never built from a
//! partially parsed line.

use crate::{
    classify::MESSAGE_KEYWORD,
    domain::{ExtractedMessage, TargetChannel},
    framing::ProtocolLine,
};

const ORIGIN_MARKER: char = ':';
const IDENTITY_SEPARATOR: char = '!';
const BODY_MARKER: char = ':';

#[derive(Clone, Debug)]
pub struct MessageExtractor {
    channel: TargetChannel,
}

impl MessageExtractor {
    pub fn new(channel: TargetChannel) -> Self {
        Self { channel }
    }

    pub fn extract(&self, line: &ProtocolLine) -> Option<ExtractedMessage> {
        let raw = line.as_str();
        let raw = raw.strip_prefix(ORIGIN_MARKER).unwrap_or(raw);

        let (sender, _) = raw.split_once(IDENTITY_SEPARATOR)?;
        if sender.is_empty() || sender.contains(char::is_whitespace) {
            return None;
        }

        let after_keyword = raw[keyword_end(raw, MESSAGE_KEYWORD)?..].trim_start();
        let channel_end = after_keyword
            .find(char::is_whitespace)
            .unwrap_or(after_keyword.len());
        let (channel, after_channel) = after_keyword.split_at(channel_end);
        if !self.channel.matches(channel) {
            return None;
        }

        // Body marker is only looked for past the target field.
        let (_, body) = after_channel.split_once(BODY_MARKER)?;
        let text = body.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'));

        Some(ExtractedMessage {
            sender: sender.to_string(),
            channel: channel.to_string(),
            text: text.to_string(),
        })
    }
}

/// Byte offset just past the first space-delimited field equal to `keyword`.
fn keyword_end(haystack: &str, keyword: &str) -> Option<usize> {
    let mut offset = 0;
    for field in haystack.split(' ') {
        if field == keyword {
            return Some(offset + field.len());
        }
        offset += field.len() + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> MessageExtractor {
        MessageExtractor::new(TargetChannel::new("#gstreamer").unwrap())
    }

    fn extract(s: &str) -> Option<ExtractedMessage> {
        extractor().extract(&ProtocolLine::new(s))
    }

    #[test]
    fn extracts_sender_channel_and_text() {
        let m = extract(":alice!a@b PRIVMSG #gstreamer :hello world").unwrap();
        assert_eq!(m.sender, "alice");
        assert_eq!(m.channel, "#gstreamer");
        assert_eq!(m.text, "hello world");
    }

    #[test]
    fn trims_surrounding_whitespace_and_terminators() {
        let m = extract(":nick!user@host PRIVMSG #gstreamer :  \ttext \r\n").unwrap();
        assert_eq!(m.sender, "nick");
        assert_eq!(m.text, "text");
    }

    #[test]
    fn keeps_colons_inside_the_body() {
        let m = extract(":bob!b@c PRIVMSG #gstreamer :see http://example.com: now").unwrap();
        assert_eq!(m.text, "see http://example.com: now");
    }

    #[test]
    fn empty_body_is_allowed() {
        let m = extract(":bob!b@c PRIVMSG #gstreamer :").unwrap();
        assert_eq!(m.text, "");
    }

    #[test]
    fn channel_compare_ignores_ascii_case() {
        let m = extract(":bob!b@c PRIVMSG #GStreamer :hi").unwrap();
        assert_eq!(m.channel, "#GStreamer");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        // no identity separator
        assert!(extract(":irc.example.net PRIVMSG #gstreamer :notice").is_none());
        // no body marker
        assert!(extract(":alice!a@b PRIVMSG #gstreamer hello").is_none());
        // no keyword
        assert!(extract(":alice!a@b NOTICE #gstreamer :hello").is_none());
        // empty sender
        assert!(extract(":!a@b PRIVMSG #gstreamer :hello").is_none());
        // server line where the first '!' sits in the text
        assert!(extract(":irc.example.net PRIVMSG #gstreamer :hi!").is_none());
    }

    #[test]
    fn other_targets_are_skipped() {
        assert!(extract(":alice!a@b PRIVMSG #gstreamer-devel :hi").is_none());
        assert!(extract(":alice!a@b PRIVMSG bot :about #gstreamer").is_none());
    }

    #[test]
    fn body_starts_after_the_target_field() {
        assert!(extract(":alice!a@b PRIVMSG #gstreamer:x :hello").is_none());

        let m = extract(":alice!a@b PRIVMSG  #gstreamer   :hello").unwrap();
        assert_eq!(m.channel, "#gstreamer");
        assert_eq!(m.text, "hello");
    }

    #[test]
    fn same_input_same_output() {
        let x = extractor();
        let line = ProtocolLine::new(":alice!a@b PRIVMSG #gstreamer :hello world");
        assert_eq!(x.extract(&line), x.extract(&line));
    }
}
