//! Hospeda um serviço de coordenação para nós em outros processos.
//!
//! Comandos unários recebem uma resposta cada. `WATCH` e `OBSERVE` passam a
//! conexão para modo streaming; `CAMPAIGN` segura a resposta até o candidato
//! ser eleito ou a conexão cair.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{UnboundedReceiverStream, WatchStream};
use tracing::debug;

use squall_cluster::Coordinator;
use squall_common::{ClusterError, ConnectionError};
use squall_protocol::coord::{leader_frame, pairs_frame};
use squall_protocol::{Connection, CoordCommand, Frame};

fn ok() -> Frame {
    Frame::Simple("OK".into())
}

fn error_frame(err: &ClusterError) -> Frame {
    Frame::Error(format!("ERR {err}"))
}

/// Loop de uma conexão com o serviço de coordenação.
pub async fn handle_coordinator(
    mut conn: Connection,
    coordinator: Arc<dyn Coordinator>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ConnectionError> {
    loop {
        let frame = tokio::select! {
            result = conn.read_frame() => result?,
            _ = shutdown.recv() => return Ok(()),
        };
        let Some(frame) = frame else {
            return Ok(());
        };

        let cmd = match CoordCommand::from_frame(frame) {
            Ok(cmd) => cmd,
            Err(e) => {
                conn.write_frame(&Frame::Error(format!("ERR {e}"))).await?;
                continue;
            }
        };
        debug!(?cmd, "comando de coordenação");

        match cmd {
            CoordCommand::Watch { prefix } => {
                return stream_watch(conn, coordinator.as_ref(), &prefix, shutdown).await;
            }
            CoordCommand::Observe { election } => {
                return stream_leader(conn, coordinator.as_ref(), &election, shutdown).await;
            }
            CoordCommand::Campaign {
                election,
                candidate,
                lease,
            } => {
                let won = tokio::select! {
                    won = coordinator.campaign(&election, &candidate, lease) => won,
                    // cliente desistiu da campanha
                    _ = conn.read_frame() => return Ok(()),
                    _ = shutdown.recv() => return Ok(()),
                };
                let reply = match won {
                    Ok(()) => ok(),
                    Err(e) => error_frame(&e),
                };
                conn.write_frame(&reply).await?;
            }
            unary => {
                let reply = execute(coordinator.as_ref(), unary).await;
                conn.write_frame(&reply).await?;
            }
        }
    }
}

async fn execute(coordinator: &dyn Coordinator, cmd: CoordCommand) -> Frame {
    let result = match cmd {
        CoordCommand::Grant { ttl_ms } => coordinator
            .grant(Duration::from_millis(ttl_ms))
            .await
            .map(Frame::Integer),
        CoordCommand::KeepAlive { lease } => coordinator.keep_alive(lease).await.map(|_| ok()),
        CoordCommand::Revoke { lease } => coordinator.revoke(lease).await.map(|_| ok()),
        CoordCommand::Put { key, value, lease } => {
            coordinator.put(&key, &value, lease).await.map(|_| ok())
        }
        CoordCommand::GetPrefix { prefix } => coordinator
            .get_prefix(&prefix)
            .await
            .map(|pairs| pairs_frame(&pairs)),
        other => Err(ClusterError::Coordinator(format!(
            "comando fora de contexto: {other:?}"
        ))),
    };
    result.unwrap_or_else(|e| error_frame(&e))
}

async fn stream_watch(
    mut conn: Connection,
    coordinator: &dyn Coordinator,
    prefix: &str,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ConnectionError> {
    let events = match coordinator.watch_prefix(prefix).await {
        Ok(events) => events,
        Err(e) => return conn.write_frame(&error_frame(&e)).await,
    };
    conn.write_frame(&ok()).await?;
    debug!(prefix, "conexão em modo watch");

    let mut events = UnboundedReceiverStream::new(events);
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => conn.write_frame(&event.to_frame()).await?,
                None => return Ok(()),
            },
            frame = conn.read_frame() => {
                if frame?.is_none() {
                    return Ok(());
                }
                conn.write_frame(&Frame::Error("ERR conexão em modo watch".into())).await?;
            }
            _ = shutdown.recv() => return Ok(()),
        }
    }
}

async fn stream_leader(
    mut conn: Connection,
    coordinator: &dyn Coordinator,
    election: &str,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ConnectionError> {
    let leader = match coordinator.observe(election).await {
        Ok(leader) => leader,
        Err(e) => return conn.write_frame(&error_frame(&e)).await,
    };
    debug!(election, "conexão em modo observe");

    // o primeiro item é o líder atual
    let mut leaders = WatchStream::new(leader);
    loop {
        tokio::select! {
            leader = leaders.next() => match leader {
                Some(leader) => conn.write_frame(&leader_frame(leader.as_deref())).await?,
                None => return Ok(()),
            },
            frame = conn.read_frame() => {
                if frame?.is_none() {
                    return Ok(());
                }
                conn.write_frame(&Frame::Error("ERR conexão em modo observe".into())).await?;
            }
            _ = shutdown.recv() => return Ok(()),
        }
    }
}
