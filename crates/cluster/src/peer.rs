use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use squall_common::ClusterError;
use squall_protocol::{Connection, Credentials, Frame, Mutation, Request, Response, Status};

use crate::config::ClusterConfig;

/// Parâmetros de discagem e chamada usados com todos os peers.
#[derive(Debug, Clone)]
pub struct DialSettings {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
    pub rpc_timeout: Duration,
    pub credentials: Option<Credentials>,
}

impl DialSettings {
    pub fn from_config(config: &ClusterConfig) -> Self {
        Self {
            timeout: config.dial_timeout,
            retries: config.dial_retries,
            backoff: config.dial_backoff,
            rpc_timeout: config.rpc_timeout,
            credentials: config.credentials(),
        }
    }
}

struct Link {
    addr: String,
    settings: DialSettings,
    conn: Mutex<Option<Connection>>,
    /// Ligado quando as tentativas de discagem se esgotam. Só um novo evento
    /// de descoberta religa o peer.
    unreachable: AtomicBool,
}

impl Link {
    async fn dial(&self) -> Result<Connection, ClusterError> {
        let attempts = self.settings.retries.max(1);
        for attempt in 1..=attempts {
            match Connection::connect(&self.addr, self.settings.timeout).await {
                Ok(conn) => {
                    self.unreachable.store(false, Ordering::Release);
                    debug!(peer = %self.addr, attempt, "conectado ao peer");
                    return Ok(conn);
                }
                Err(e) => {
                    warn!(peer = %self.addr, attempt, error = %e, "falha ao conectar no peer");
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.backoff).await;
                    }
                }
            }
        }
        self.unreachable.store(true, Ordering::Release);
        Err(ClusterError::Unreachable(self.addr.clone()))
    }

    async fn connect(&self) -> Result<(), ClusterError> {
        let mut slot = self.conn.lock().await;
        if slot.is_none() {
            *slot = Some(self.dial().await?);
        }
        Ok(())
    }

    async fn call(&self, request: &Request) -> Result<Response, ClusterError> {
        if self.unreachable.load(Ordering::Acquire) {
            return Err(ClusterError::Unreachable(format!(
                "{} marcado como inacessível",
                self.addr
            )));
        }

        let mut slot = self.conn.lock().await;
        if slot.is_none() {
            *slot = Some(self.dial().await?);
        }
        let Some(conn) = slot.as_mut() else {
            return Err(ClusterError::Closed);
        };

        let frame = match conn.call(&request.to_frame(), self.settings.rpc_timeout).await {
            Ok(frame) => frame,
            Err(e) => {
                *slot = None;
                return Err(ClusterError::Unreachable(format!("{}: {e}", self.addr)));
            }
        };
        match frame {
            Frame::Error(message) => Ok(Response::error(Status::BadArgument, message)),
            frame => Response::from_frame(frame).map_err(|e| ClusterError::Remote {
                code: Status::Internal.code(),
                message: format!("resposta malformada de {}: {e}", self.addr),
            }),
        }
    }
}

/// Cliente RPC de um peer, identificado pela sua chave de descoberta.
///
/// Chamadas `SLAVE` enviadas com [`PeerClient::replicate`] passam por uma fila
/// própria do peer: saem na ordem em que foram enfileiradas, sem espera por
/// confirmação e sem retry. A fila morre junto com o cliente.
pub struct PeerClient {
    key: String,
    link: Arc<Link>,
    outbox: mpsc::UnboundedSender<Mutation>,
}

impl PeerClient {
    pub fn new(key: impl Into<String>, addr: impl Into<String>, settings: DialSettings) -> Self {
        let link = Arc::new(Link {
            addr: addr.into(),
            settings,
            conn: Mutex::new(None),
            unreachable: AtomicBool::new(false),
        });
        let (outbox, queue) = mpsc::unbounded_channel();
        tokio::spawn(deliver(link.clone(), queue));
        Self {
            key: key.into(),
            link,
            outbox,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn addr(&self) -> &str {
        &self.link.addr
    }

    pub fn is_reachable(&self) -> bool {
        !self.link.unreachable.load(Ordering::Acquire)
    }

    /// Disca com retries limitados. Esgotados, o peer fica inacessível.
    pub async fn connect(&self) -> Result<(), ClusterError> {
        self.link.connect().await
    }

    /// Volta a aceitar chamadas depois de um evento de descoberta.
    pub(crate) fn revive(&self) {
        self.link.unreachable.store(false, Ordering::Release);
    }

    pub async fn call(&self, request: &Request) -> Result<Response, ClusterError> {
        self.link.call(request).await
    }

    pub async fn ping(&self) -> Result<(), ClusterError> {
        let credentials = self.link.settings.credentials.clone();
        let response = self.call(&Request::ping(credentials)).await?;
        if response.is_ok() {
            Ok(())
        } else {
            Err(ClusterError::Remote {
                code: response.status.code(),
                message: response.value,
            })
        }
    }

    /// Enfileira um `SLAVE` para o peer e retorna imediatamente.
    pub fn replicate(&self, mutation: Mutation) {
        if self.outbox.send(mutation).is_err() {
            warn!(peer = %self.key, "fila de replicação fechada");
        }
    }

    /// Derruba a conexão atual; a próxima chamada disca de novo.
    pub async fn close(&self) {
        self.link.conn.lock().await.take();
    }
}

impl std::fmt::Debug for PeerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerClient")
            .field("key", &self.key)
            .field("addr", &self.link.addr)
            .finish()
    }
}

async fn deliver(link: Arc<Link>, mut queue: mpsc::UnboundedReceiver<Mutation>) {
    while let Some(mutation) = queue.recv().await {
        let action = mutation.action;
        let request = Request::slave(link.settings.credentials.clone(), mutation);
        match link.call(&request).await {
            Ok(response) if response.is_ok() || response.status == Status::NotFound => {
                debug!(peer = %link.addr, %action, "replicado");
            }
            Ok(response) => {
                warn!(
                    peer = %link.addr,
                    %action,
                    status = ?response.status,
                    message = %response.value,
                    "seguidor recusou a replicação"
                );
            }
            Err(e) => warn!(peer = %link.addr, %action, error = %e, "replicação descartada"),
        }
    }
}
