//! Outbound IRC commands and their wire encoding.

use std::fmt;

use crate::domain::{BotIdentity, TargetChannel};

const NICKSERV: &str = "nickserv";

/// Every line this client ever writes to the relay.
#[derive(Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    User { nick: String, realname: String },
    Nick(String),
    Privmsg { target: String, text: String },
    Join(String),
    Pong(String),
    Quit(String),
}

impl OutboundCommand {
    /// Wire form, CR-LF terminated. Embedded CR/LF/NUL are removed so a
    /// parameter can never smuggle a second command onto the wire.
    pub fn to_wire(&self) -> String {
        let mut out = match self {
            OutboundCommand::User { nick, realname } => {
                let nick = clean(nick);
                format!("USER {nick} {nick} {nick} :{}", clean(realname))
            }
            OutboundCommand::Nick(nick) => format!("NICK {}", clean(nick)),
            OutboundCommand::Privmsg { target, text } => {
                format!("PRIVMSG {} :{}", clean(target), clean(text))
            }
            OutboundCommand::Join(channel) => format!("JOIN {}", clean(channel)),
            OutboundCommand::Pong(token) => format!("PONG {}", clean(token)),
            OutboundCommand::Quit(reason) => format!("QUIT :{}", clean(reason)),
        };
        out.push_str("\r\n");
        out
    }

    /// Log-safe rendering: NickServ credentials are masked.
    pub fn redacted(&self) -> String {
        match self {
            OutboundCommand::Privmsg { target, .. } if target.eq_ignore_ascii_case(NICKSERV) => {
                format!("PRIVMSG {target} :<redacted>")
            }
            other => other.to_wire().trim_end().to_string(),
        }
    }
}

impl fmt::Debug for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

fn clean(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '\r' | '\n' | '\0')).collect()
}

/// Canonical reply to a liveness probe, echoing its token.
pub fn respond_to_probe(token: &str) -> OutboundCommand {
    OutboundCommand::Pong(token.to_string())
}

/// Registration, NickServ auth and join, in the order they must be sent.
pub fn handshake(identity: &BotIdentity, channel: &TargetChannel) -> Vec<OutboundCommand> {
    vec![
        OutboundCommand::User {
            nick: identity.nick.clone(),
            realname: identity.realname.clone(),
        },
        OutboundCommand::Nick(identity.nick.clone()),
        OutboundCommand::Privmsg {
            target: NICKSERV.to_string(),
            text: identity.nickserv_password.clone(),
        },
        OutboundCommand::Join(channel.as_str().to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> BotIdentity {
        BotIdentity::new("gstbot", "This a fun bot!").unwrap()
    }

    #[test]
    fn pong_echoes_token() {
        assert_eq!(respond_to_probe(":server123").to_wire(), "PONG :server123\r\n");
    }

    #[test]
    fn handshake_order_and_format() {
        let ch = TargetChannel::new("#gstreamer").unwrap();
        let wire: Vec<String> = handshake(&identity().with_nickserv_password("secret"), &ch)
            .iter()
            .map(OutboundCommand::to_wire)
            .collect();
        assert_eq!(
            wire,
            vec![
                "USER gstbot gstbot gstbot :This a fun bot!\r\n",
                "NICK gstbot\r\n",
                "PRIVMSG nickserv :secret\r\n",
                "JOIN #gstreamer\r\n",
            ]
        );
    }

    #[test]
    fn default_identity_still_authenticates() {
        let ch = TargetChannel::new("#gstreamer").unwrap();
        let wire: Vec<String> = handshake(&identity(), &ch)
            .iter()
            .map(OutboundCommand::to_wire)
            .collect();
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[2], "PRIVMSG nickserv :iNOOPE\r\n");
        assert_eq!(wire[3], "JOIN #gstreamer\r\n");
    }

    #[test]
    fn parameters_cannot_inject_lines() {
        let cmd = OutboundCommand::Quit("bye\r\nJOIN #evil".to_string());
        assert_eq!(cmd.to_wire(), "QUIT :byeJOIN #evil\r\n");
    }

    #[test]
    fn redacts_nickserv_password() {
        let cmd = OutboundCommand::Privmsg {
            target: "NickServ".to_string(),
            text: "identify hunter2".to_string(),
        };
        assert!(!cmd.redacted().contains("hunter2"));
        assert!(!format!("{cmd:?}").contains("hunter2"));
        assert_eq!(OutboundCommand::Nick("x".into()).redacted(), "NICK x");
    }
}
