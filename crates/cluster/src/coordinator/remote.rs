use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, warn};

use squall_common::{ClusterError, ConnectionError};
use squall_protocol::coord::{leader_from_frame, pairs_from_frame};
use squall_protocol::{Connection, CoordCommand, Frame, LeaseId, WatchEvent};

use super::Coordinator;

/// Cliente TCP de um serviço de coordenação hospedado por outro processo
/// (`squall-server --serve-coordinator`).
///
/// Comandos unários compartilham uma conexão; watch, observe e campaign usam
/// conexões dedicadas, que ficam em modo streaming.
pub struct RemoteCoordinator {
    addr: String,
    timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl RemoteCoordinator {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            conn: Mutex::new(None),
        }
    }

    fn unreachable(&self, err: ConnectionError) -> ClusterError {
        ClusterError::Unreachable(format!("coordenador {}: {err}", self.addr))
    }

    async fn request(&self, cmd: CoordCommand) -> Result<Frame, ClusterError> {
        let mut slot = self.conn.lock().await;
        if slot.is_none() {
            let conn = Connection::connect(&self.addr, self.timeout)
                .await
                .map_err(|e| self.unreachable(e))?;
            *slot = Some(conn);
        }
        let Some(conn) = slot.as_mut() else {
            return Err(ClusterError::Closed);
        };

        match conn.call(&cmd.to_frame(), self.timeout).await {
            Ok(Frame::Error(message)) => Err(ClusterError::Coordinator(message)),
            Ok(frame) => Ok(frame),
            Err(e) => {
                *slot = None;
                Err(self.unreachable(e))
            }
        }
    }

    async fn expect_ok(&self, cmd: CoordCommand) -> Result<(), ClusterError> {
        match self.request(cmd).await? {
            Frame::Simple(_) => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Abre uma conexão dedicada e envia `cmd`.
    async fn open(&self, cmd: CoordCommand) -> Result<Connection, ClusterError> {
        let mut conn = Connection::connect(&self.addr, self.timeout)
            .await
            .map_err(|e| self.unreachable(e))?;
        conn.write_frame(&cmd.to_frame())
            .await
            .map_err(|e| self.unreachable(e))?;
        Ok(conn)
    }

    /// Lê um frame de uma conexão dedicada, tratando erro remoto e EOF.
    async fn next_frame(&self, conn: &mut Connection) -> Result<Frame, ClusterError> {
        match conn.read_frame().await {
            Ok(Some(Frame::Error(message))) => Err(ClusterError::Coordinator(message)),
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(self.unreachable(ConnectionError::ConnectionReset)),
            Err(e) => Err(self.unreachable(e)),
        }
    }
}

fn unexpected(frame: &Frame) -> ClusterError {
    ClusterError::Coordinator(format!("resposta inesperada: {frame:?}"))
}

fn malformed(err: impl std::fmt::Display) -> ClusterError {
    ClusterError::Coordinator(format!("resposta malformada: {err}"))
}

#[async_trait]
impl Coordinator for RemoteCoordinator {
    async fn grant(&self, ttl: Duration) -> Result<LeaseId, ClusterError> {
        let ttl_ms = ttl.as_millis().max(1) as u64;
        match self.request(CoordCommand::Grant { ttl_ms }).await? {
            Frame::Integer(lease) => Ok(lease),
            other => Err(unexpected(&other)),
        }
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<(), ClusterError> {
        self.expect_ok(CoordCommand::KeepAlive { lease }).await
    }

    async fn revoke(&self, lease: LeaseId) -> Result<(), ClusterError> {
        self.expect_ok(CoordCommand::Revoke { lease }).await
    }

    async fn put(&self, key: &str, value: &str, lease: LeaseId) -> Result<(), ClusterError> {
        self.expect_ok(CoordCommand::Put {
            key: key.to_string(),
            value: value.to_string(),
            lease,
        })
        .await
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, ClusterError> {
        let frame = self
            .request(CoordCommand::GetPrefix {
                prefix: prefix.to_string(),
            })
            .await?;
        pairs_from_frame(frame).map_err(malformed)
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<mpsc::UnboundedReceiver<WatchEvent>, ClusterError> {
        let mut conn = self
            .open(CoordCommand::Watch {
                prefix: prefix.to_string(),
            })
            .await?;
        // o host confirma o registro do watch antes de qualquer evento
        match self.next_frame(&mut conn).await? {
            Frame::Simple(_) => {}
            other => return Err(unexpected(&other)),
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = tx.closed() => return,
                    frame = conn.read_frame() => frame,
                };
                let frame = match frame {
                    Ok(Some(frame)) => frame,
                    Ok(None) => return,
                    Err(e) => {
                        warn!(error = %e, "stream de watch interrompido");
                        return;
                    }
                };
                match WatchEvent::from_frame(frame) {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "evento de watch inválido");
                        return;
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn campaign(
        &self,
        election: &str,
        candidate: &str,
        lease: LeaseId,
    ) -> Result<(), ClusterError> {
        let mut conn = self
            .open(CoordCommand::Campaign {
                election: election.to_string(),
                candidate: candidate.to_string(),
                lease,
            })
            .await?;
        match self.next_frame(&mut conn).await? {
            Frame::Simple(_) => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn observe(&self, election: &str) -> Result<watch::Receiver<Option<String>>, ClusterError> {
        let mut conn = self
            .open(CoordCommand::Observe {
                election: election.to_string(),
            })
            .await?;
        let current = leader_from_frame(self.next_frame(&mut conn).await?).map_err(malformed)?;

        let (tx, rx) = watch::channel(current);
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = tx.closed() => return,
                    frame = conn.read_frame() => frame,
                };
                let leader = match frame {
                    Ok(Some(frame)) => leader_from_frame(frame),
                    _ => {
                        debug!("stream de observação encerrado");
                        return;
                    }
                };
                match leader {
                    Ok(leader) => {
                        if tx.send(leader).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "evento de líder inválido");
                        return;
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn close(&self) {
        self.conn.lock().await.take();
    }
}
