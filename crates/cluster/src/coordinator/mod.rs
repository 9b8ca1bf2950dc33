//! Contrato do serviço de coordenação: leases, chaves presas a leases,
//! listagem e watch por prefixo, e a primitiva de eleição.

mod memory;
mod remote;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use squall_common::ClusterError;
use squall_protocol::{LeaseId, WatchEvent};

pub use memory::MemoryCoordinator;
pub use remote::RemoteCoordinator;

#[async_trait]
pub trait Coordinator: Send + Sync + 'static {
    /// Concede um lease que expira se não for renovado dentro de `ttl`.
    async fn grant(&self, ttl: Duration) -> Result<LeaseId, ClusterError>;

    /// Renova o lease. Falha se ele já expirou ou foi revogado.
    async fn keep_alive(&self, lease: LeaseId) -> Result<(), ClusterError>;

    /// Revoga o lease, apagando as chaves e candidaturas presas a ele.
    async fn revoke(&self, lease: LeaseId) -> Result<(), ClusterError>;

    async fn put(&self, key: &str, value: &str, lease: LeaseId) -> Result<(), ClusterError>;

    /// Pares chave/valor sob `prefix`, em ordem de chave.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, ClusterError>;

    /// Eventos futuros sob `prefix`. O canal fecha se o watch for perdido.
    async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<mpsc::UnboundedReceiver<WatchEvent>, ClusterError>;

    /// Registra `candidate` na eleição e resolve quando ele for o líder. Falha
    /// se o lease morrer antes disso.
    async fn campaign(
        &self,
        election: &str,
        candidate: &str,
        lease: LeaseId,
    ) -> Result<(), ClusterError>;

    /// Líder atual da eleição e suas mudanças. O canal fecha se a observação
    /// for perdida.
    async fn observe(&self, election: &str) -> Result<watch::Receiver<Option<String>>, ClusterError>;

    /// Libera conexões mantidas com o serviço.
    async fn close(&self) {}
}
