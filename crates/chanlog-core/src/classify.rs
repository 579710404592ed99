//! Line classification: liveness probe, channel message, or anything else.

use crate::{domain::TargetChannel, framing::ProtocolLine};

pub const PROBE_KEYWORD: &str = "PING";
pub const MESSAGE_KEYWORD: &str = "PRIVMSG";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassifiedLine {
    Probe { token: String },
    ChannelMessage(ProtocolLine),
    Other(ProtocolLine),
}

#[derive(Clone, Debug)]
pub struct LineClassifier {
    channel: TargetChannel,
}

impl LineClassifier {
    pub fn new(channel: TargetChannel) -> Self {
        Self { channel }
    }

    /// Tag a line. Probes are checked first so a line that also looks like a
    /// channel message still gets its PONG.
    ///
    /// Both checks are plain substring tests. A channel name that happens to
    /// occur elsewhere in a PRIVMSG line (another channel with a longer name,
    /// a private message quoting it) is classified as a channel message; the
    /// extractor then drops it because the target field does not match.
    pub fn classify(&self, line: ProtocolLine) -> ClassifiedLine {
        let text = line.as_str();

        if text.contains(PROBE_KEYWORD) {
            if let Some(token) = text.split_whitespace().nth(1) {
                return ClassifiedLine::Probe {
                    token: token.to_string(),
                };
            }
            return ClassifiedLine::Other(line);
        }

        if text.contains(MESSAGE_KEYWORD) && text.contains(self.channel.as_str()) {
            return ClassifiedLine::ChannelMessage(line);
        }

        ClassifiedLine::Other(line)
    }
}
