use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tracing::{debug, error, info, warn};

use squall_cluster::{Coordinator, RpcService};
use squall_common::ConnectionError;
use squall_protocol::Connection;

use crate::coordinator::handle_coordinator;
use crate::handler::handle_connection;

/// Aceita conexões até receber o sinal de `shutdown`, limitando quantas ficam
/// abertas ao mesmo tempo.
async fn accept_loop<F, Fut>(
    surface: &'static str,
    listener: TcpListener,
    max_connections: usize,
    shutdown: broadcast::Sender<()>,
    handle: F,
) where
    F: Fn(Connection, broadcast::Receiver<()>) -> Fut,
    Fut: Future<Output = Result<(), ConnectionError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_connections));
    let mut stop = shutdown.subscribe();
    if let Ok(addr) = listener.local_addr() {
        info!(surface, %addr, "escutando");
    }

    loop {
        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = stop.recv() => break,
        };

        let (socket, addr) = tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok(v) => v,
                    Err(e) => {
                        error!(surface, error = %e, "erro ao aceitar conexão");
                        continue;
                    }
                }
            }
            _ = stop.recv() => break,
        };

        debug!(surface, %addr, "nova conexão");
        if let Err(e) = socket.set_nodelay(true) {
            warn!(surface, %addr, error = %e, "falha ao ajustar TCP_NODELAY");
        }
        let task = handle(Connection::new(socket), shutdown.subscribe());
        tokio::spawn(async move {
            if let Err(e) = task.await {
                warn!(surface, %addr, error = %e, "erro na conexão");
            }
            debug!(surface, %addr, "conexão encerrada");
            drop(permit);
        });
    }
    info!(surface, "accept loop encerrado");
}

/// Serve a superfície RPC entre peers.
pub async fn serve_rpc(
    listener: TcpListener,
    service: RpcService,
    max_connections: usize,
    shutdown: broadcast::Sender<()>,
) {
    accept_loop("rpc", listener, max_connections, shutdown, move |conn, rx| {
        handle_connection(conn, service.clone(), rx)
    })
    .await
}

/// Serve `coordinator` para nós de outros processos.
pub async fn serve_coordinator(
    listener: TcpListener,
    coordinator: Arc<dyn Coordinator>,
    max_connections: usize,
    shutdown: broadcast::Sender<()>,
) {
    accept_loop(
        "coordinator",
        listener,
        max_connections,
        shutdown,
        move |conn, rx| handle_coordinator(conn, coordinator.clone(), rx),
    )
    .await
}
