//! Per-connection task: frames one SCGI request off the socket, then hands off to the
//! worker pool. Connections are single-request; after dispatch this task's job is done.

use std::time::Duration;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::pool::WorkerPool;
use crate::protocol::ScgiDecoder;
use crate::worker;

/// Reads one request off `socket`, racing each read against `conn_keepalive` (when set),
/// and on success hands the raw socket plus parsed headers/body to a leased worker.
/// Returns once the request has been dispatched (or the connection was abandoned).
pub async fn handle(
    socket: TcpStream,
    pool: WorkerPool,
    script_path: String,
    conn_keepalive: Option<Duration>,
) {
    let mut framed = Framed::new(socket, ScgiDecoder::new());

    let request = loop {
        let next = framed.next();
        let decoded = match conn_keepalive {
            Some(timeout) => match tokio::time::timeout(timeout, next).await {
                Ok(item) => item,
                Err(_) => {
                    tracing::debug!("connection idle timeout; closing");
                    return;
                }
            },
            None => next.await,
        };

        match decoded {
            Some(Ok(req)) => break req,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "malformed SCGI request; closing connection");
                return;
            }
            None => {
                tracing::debug!("connection closed before a complete request arrived");
                return;
            }
        }
    };

    let socket = framed.into_inner();
    let lease = pool.acquire().await;
    worker::handle_request(lease, socket, request.headers, request.body, script_path).await;
}
