//! TCP accept loop: spawns one connection task per accepted socket.

use std::time::Duration;

use tokio::net::TcpListener;

use crate::pool::WorkerPool;

/// Accepts connections on `listener` until it errors, spawning a detached
/// [`crate::connection::handle`] task per socket so one slow or stuck client never holds up
/// accepting the next.
pub async fn run(
    listener: TcpListener,
    pool: WorkerPool,
    script_path: String,
    conn_keepalive: Option<Duration>,
) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };
        tracing::debug!(%peer, "accepted connection");

        let pool = pool.clone();
        let script_path = script_path.clone();
        tokio::spawn(async move {
            crate::connection::handle(socket, pool, script_path, conn_keepalive).await;
        });
    }
}
