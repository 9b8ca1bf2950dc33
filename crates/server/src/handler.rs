use tokio::sync::broadcast;
use tracing::debug;

use squall_cluster::{RpcService, malformed_request};
use squall_common::ConnectionError;
use squall_protocol::{Connection, Request};

/// Loop de uma conexão RPC: uma requisição, uma resposta, em ordem.
pub async fn handle_connection(
    mut conn: Connection,
    service: RpcService,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ConnectionError> {
    loop {
        let frame = tokio::select! {
            result = conn.read_frame() => result?,
            _ = shutdown.recv() => {
                return Ok(());
            }
        };

        let frame = match frame {
            Some(f) => f,
            None => return Ok(()), // EOF
        };

        let response = match Request::from_frame(frame) {
            Ok(request) => service.handle(request).await,
            Err(e) => {
                debug!(error = %e, "requisição malformada");
                malformed_request(&e)
            }
        };

        conn.write_frame(&response.to_frame()).await?;
    }
}
