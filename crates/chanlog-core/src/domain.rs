use std::fmt;

use crate::{errors::Error, Result};

/// Relay endpoint address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl ServerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Auth token sent to NickServ when none is configured.
pub const DEFAULT_NICKSERV_PASSWORD: &str = "iNOOPE";

/// Who the bot says it is during the handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub nick: String,
    pub realname: String,
    /// Sent to NickServ right after registration, on every connection.
    pub nickserv_password: String,
}

impl BotIdentity {
    pub fn new(nick: impl Into<String>, realname: impl Into<String>) -> Result<Self> {
        let nick = nick.into();
        if nick.is_empty() || nick.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::Config(format!("invalid nick: {nick:?}")));
        }
        Ok(Self {
            nick,
            realname: realname.into(),
            nickserv_password: DEFAULT_NICKSERV_PASSWORD.to_string(),
        })
    }

    pub fn with_nickserv_password(mut self, password: impl Into<String>) -> Self {
        self.nickserv_password = password.into();
        self
    }
}

// Keep the password out of debug output.
impl fmt::Debug for BotIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotIdentity")
            .field("nick", &self.nick)
            .field("realname", &self.realname)
            .field("nickserv_password", &"<redacted>")
            .finish()
    }
}

/// The one channel this process joins and records.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TargetChannel(String);

impl TargetChannel {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let bad = name.is_empty()
            || name
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ',' | ':'));
        if bad {
            return Err(Error::Config(format!("invalid channel name: {name:?}")));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Channel names compare case-insensitively on IRC.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for TargetChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chat line addressed to the target channel, reduced to what gets recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedMessage {
    pub sender: String,
    pub channel: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_addr_display() {
        assert_eq!(ServerAddr::new("irc.example.net", 8001).to_string(), "irc.example.net:8001");
    }

    #[test]
    fn channel_validation() {
        assert!(TargetChannel::new("#gstreamer").is_ok());
        assert!(TargetChannel::new("").is_err());
        assert!(TargetChannel::new("#a b").is_err());
        assert!(TargetChannel::new("#a,#b").is_err());
        assert!(TargetChannel::new("#a\r").is_err());
        assert!(TargetChannel::new("#a:b").is_err());
    }

    #[test]
    fn channel_matches_ignoring_ascii_case() {
        let ch = TargetChannel::new("#GStreamer").unwrap();
        assert!(ch.matches("#gstreamer"));
        assert!(!ch.matches("#gstreamer-devel"));
    }

    #[test]
    fn identity_debug_redacts_password() {
        let id = BotIdentity::new("bot", "Bot")
            .unwrap()
            .with_nickserv_password("hunter2");
        let dbg = format!("{id:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn identity_defaults_nickserv_password() {
        let id = BotIdentity::new("bot", "Bot").unwrap();
        assert_eq!(id.nickserv_password, DEFAULT_NICKSERV_PASSWORD);
    }

    #[test]
    fn identity_rejects_bad_nick() {
        assert!(BotIdentity::new("", "x").is_err());
        assert!(BotIdentity::new("a b", "x").is_err());
    }
}
