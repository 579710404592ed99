use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{domain::ServerAddr, Result};

/// A connected byte stream to the relay.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

pub type BoxedTransport = Box<dyn Transport>;

/// Hexagonal port for opening the transport.
///
/// Plain TCP lives in the `chanlog-tcp` adapter; a TLS connector would be a
/// second implementation behind the same trait.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Short label for logs ("tcp", "tls", ...).
    fn describe(&self) -> &'static str;

    async fn connect(&self, addr: &ServerAddr) -> Result<BoxedTransport>;
}
