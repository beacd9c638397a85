//! Signal-driven cancellation for the tagpub CLI

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Install signal handlers that cancel the returned token.
///
/// SIGTERM and SIGINT on unix, Ctrl+C on other platforms. A run that is
/// cancelled after its credential was issued drops the credential unused.
pub fn install_signal_handlers() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(term), Ok(int)) => (term, int),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!(error = %e, "Failed to install signal handlers");
                        return;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, cancelling release run");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, cancelling release run");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                return;
            }
            info!("Received Ctrl+C, cancelling release run");
        }

        trigger.cancel();
    });

    token
}
