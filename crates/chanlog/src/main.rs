use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use chanlog_core::{config::Config, session::SessionController};
use chanlog_tcp::TcpConnector;

#[tokio::main]
async fn main() -> Result<(), chanlog_core::Error> {
    chanlog_core::logging::init("chanlog")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        "chanlog starting: {} as {} -> {}",
        cfg.channel,
        cfg.identity.nick,
        cfg.log_path.display()
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(forward_signals(shutdown.clone()));

    let controller = SessionController::new(cfg, Arc::new(TcpConnector::new()), shutdown);
    controller.run().await?;

    Ok(())
}

/// Turn SIGINT / SIGTERM into a cancelled token.
async fn forward_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("SIGINT: shutting down nicely...");
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("SIGINT: shutting down nicely..."),
            _ = term.recv() => tracing::info!("SIGTERM: shutting down nicely..."),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("interrupt: shutting down nicely...");
    }

    shutdown.cancel();
}
