//! Plain TCP transport.
//!
//! This crate implements the `chanlog-core` Connector port over `tokio::net`.

use std::net::SocketAddr;

use anyhow::Context;
use async_trait::async_trait;
use tokio::net::{lookup_host, TcpStream};

use chanlog_core::{
    domain::ServerAddr,
    errors::Error,
    ports::{BoxedTransport, Connector},
    Result,
};

#[derive(Clone, Debug)]
pub struct TcpConnector {
    nodelay: bool,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpConnector {
    pub fn new() -> Self {
        Self { nodelay: true }
    }

    async fn resolve(addr: &ServerAddr) -> anyhow::Result<Vec<SocketAddr>> {
        let found: Vec<SocketAddr> = lookup_host((addr.host.as_str(), addr.port))
            .await
            .with_context(|| format!("lookup of {} failed", addr.host))?
            .collect();
        if found.is_empty() {
            anyhow::bail!("{} has no addresses", addr.host);
        }
        Ok(found)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    fn describe(&self) -> &'static str {
        "tcp"
    }

    async fn connect(&self, addr: &ServerAddr) -> Result<BoxedTransport> {
        let candidates = Self::resolve(addr).await.map_err(|e| Error::Resolve {
            host: addr.host.clone(),
            reason: format!("{e:#}"),
        })?;

        // Try every resolved address in order, keep the last failure for the report.
        let mut last_err = None;
        for sa in candidates {
            match TcpStream::connect(sa).await {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(self.nodelay) {
                        tracing::debug!("set_nodelay on {sa} failed: {e}");
                    }
                    tracing::info!("TCP connected to {sa}");
                    return Ok(Box::new(stream));
                }
                Err(e) => {
                    tracing::debug!("TCP connect to {sa} failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        Err(Error::Connect {
            addr: addr.to_string(),
            reason: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no usable address".to_string()),
        })
    }
}
