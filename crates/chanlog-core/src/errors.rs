use crate::framing::FramingError;

/// Core error type for the channel logger.
///
/// Adapter crates (transports) map their failures into this type so the
/// session controller can tell a recoverable transport blip from a
/// configuration problem.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    #[error("cannot connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Failures that end the current connection but warrant a reconnect.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Resolve { .. } | Error::Connect { .. } | Error::Transport(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kinds_are_recoverable() {
        assert!(Error::Transport("reset".into()).is_transport());
        assert!(Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset)).is_transport());
        assert!(Error::Connect {
            addr: "a:1".into(),
            reason: "refused".into()
        }
        .is_transport());
        assert!(!Error::Config("missing".into()).is_transport());
        assert!(!Error::Framing(FramingError::LineTooLong { len: 9, max: 8 }).is_transport());
    }
}
