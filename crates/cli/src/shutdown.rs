use std::process;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit code reported when the pipeline is interrupted by a signal.
pub const INTERRUPT_EXIT_CODE: i32 = 130;

/// Wires SIGINT/SIGTERM into the pipeline's drain sequence. The first
/// signal cancels the root token: ingestors stop cutting batches, queue
/// workers finish their in-flight job, and the supervisor flushes the final
/// progress snapshot. A second signal skips the drain and exits on the
/// spot, for runs stuck on an unresponsive remote.
pub fn listen_for_shutdown(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received, draining ingestors and queue workers");
        cancel.cancel();

        wait_for_signal().await;
        warn!("second shutdown signal, exiting without draining");
        process::exit(INTERRUPT_EXIT_CODE);
    });
}

async fn wait_for_signal() {
    let interrupt = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
