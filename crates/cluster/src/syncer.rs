use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use squall_common::{ClusterError, SquallResult, StoreError};
use squall_protocol::{Credentials, LeaseId, Mutation, Request, WatchEvent};
use squall_storage::Store;

use crate::config::ClusterConfig;
use crate::coordinator::Coordinator;
use crate::dispatch;
use crate::peer::DialSettings;
use crate::service::into_result;
use crate::task::spawn_supervised;
use crate::topology::{Role, RoleActor, RoleEvent, Topology};

/// Estado resumido de um nó.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncerStatus {
    pub node_id: String,
    pub role: Role,
    /// Id do líder observado, se houver.
    pub leader: Option<String>,
    /// Ids dos peers conhecidos.
    pub peers: Vec<String>,
}

struct Inner {
    config: ClusterConfig,
    node_id: String,
    self_key: String,
    store: Store,
    coordinator: Arc<dyn Coordinator>,
    shutdown: CancellationToken,
    events: mpsc::UnboundedSender<RoleEvent>,
    topology: watch::Receiver<Arc<Topology>>,
    /// Lease do registro atual; `None` enquanto o nó não está registrado.
    lease: watch::Sender<Option<LeaseId>>,
}

impl Inner {
    fn emit(&self, event: RoleEvent) {
        // só falha depois do shutdown, quando o ator já saiu
        let _ = self.events.send(event);
    }

    fn id_of<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(&self.config.discovery_prefix())
            .unwrap_or(key)
    }
}

/// Sincronizador do cluster: registro, descoberta, eleição e caminho de
/// escrita entre líder e seguidores.
#[derive(Clone)]
pub struct Syncer {
    inner: Arc<Inner>,
}

impl Syncer {
    /// Valida a configuração e sobe as tarefas de fundo. Precisa de um
    /// runtime tokio.
    pub async fn start(
        config: ClusterConfig,
        store: Store,
        coordinator: Arc<dyn Coordinator>,
    ) -> Result<Syncer, ClusterError> {
        config.validate()?;

        let node_id = config
            .node_id
            .clone()
            .unwrap_or_else(|| format!("{}-{:08x}", config.host, rand::random::<u32>()));
        let self_key = config.discovery_key(&node_id);
        let shutdown = CancellationToken::new();
        let (events, topology) = RoleActor::spawn(
            self_key.clone(),
            DialSettings::from_config(&config),
            shutdown.clone(),
        );

        let inner = Arc::new(Inner {
            config,
            node_id,
            self_key,
            store,
            coordinator,
            shutdown,
            events,
            topology,
            lease: watch::channel(None).0,
        });

        macro_rules! supervise {
            ($name:literal, $task:ident) => {{
                let inner = inner.clone();
                let (shutdown, delay) = (inner.shutdown.clone(), inner.config.retry_delay);
                spawn_supervised($name, shutdown, delay, move || $task(inner.clone()));
            }};
        }
        supervise!("registration", register);
        supervise!("discovery", discover);
        supervise!("election", elect);
        supervise!("observer", observe);

        info!(
            node = %inner.node_id,
            address = %inner.config.address(),
            cluster = %inner.config.prefix,
            "syncer iniciado"
        );
        Ok(Syncer { inner })
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn role(&self) -> Role {
        self.inner.topology.borrow().role
    }

    pub fn is_leader(&self) -> bool {
        self.role() == Role::Leader
    }

    /// Última topologia publicada.
    pub fn topology(&self) -> Arc<Topology> {
        self.inner.topology.borrow().clone()
    }

    /// Acompanha mudanças de papel e de peers.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Topology>> {
        self.inner.topology.clone()
    }

    pub fn status(&self) -> SyncerStatus {
        let topology = self.topology();
        let inner = &self.inner;
        let mut peers: Vec<String> = topology
            .followers
            .iter()
            .chain(topology.leader.iter())
            .map(|peer| inner.id_of(peer.key()).to_string())
            .collect();
        peers.sort();
        SyncerStatus {
            node_id: inner.node_id.clone(),
            role: topology.role,
            leader: topology
                .leader_key
                .as_deref()
                .map(|key| inner.id_of(key).to_string()),
            peers,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Confere as credenciais de uma chamada contra as configuradas. Sem
    /// usuário configurado, qualquer chamada passa.
    pub fn authenticate(&self, credentials: Option<&Credentials>) -> Result<(), ClusterError> {
        match self.inner.config.credentials() {
            None => Ok(()),
            Some(expected) if credentials == Some(&expected) => Ok(()),
            Some(_) => Err(ClusterError::Unauthenticated),
        }
    }

    /// Porta de entrada de toda mutação de uma store com cluster: o líder
    /// aplica e replica; um seguidor encaminha ao líder via `MASTER`.
    pub async fn submit(&self, ctx: &CancellationToken, mutation: Mutation) -> SquallResult<String> {
        if self.is_closed() {
            return Err(ClusterError::Closed.into());
        }
        if ctx.is_cancelled() {
            return Err(StoreError::Canceled.into());
        }

        let topology = self.topology();
        match topology.role {
            Role::Leader => self.apply_and_fan_out(ctx, mutation).await,
            Role::Follower => {
                let leader = topology.leader.clone().ok_or(ClusterError::NoLeader)?;
                debug!(leader = %leader.key(), action = %mutation.action, "encaminhando ao líder");
                let credentials = self.inner.config.credentials();
                let response = leader.call(&Request::master(credentials, mutation)).await?;
                into_result(response)
            }
        }
    }

    /// Aplica localmente e, se deu certo, enfileira a mutação para cada
    /// seguidor sem esperar resposta.
    pub(crate) async fn apply_and_fan_out(
        &self,
        ctx: &CancellationToken,
        mutation: Mutation,
    ) -> SquallResult<String> {
        let value = dispatch::apply(&self.inner.store, ctx, &mutation).await?;
        let topology = self.topology();
        for follower in &topology.followers {
            follower.replicate(mutation.clone());
        }
        Ok(value)
    }

    /// Aplica localmente sem replicar (chamadas `SLAVE`).
    pub(crate) async fn apply_local(
        &self,
        ctx: &CancellationToken,
        mutation: &Mutation,
    ) -> SquallResult<String> {
        dispatch::apply(&self.inner.store, ctx, mutation).await
    }

    /// Para as tarefas de fundo, revoga o registro e fecha as conexões.
    pub async fn close(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();

        let lease = self.inner.lease.send_replace(None);
        if let Some(lease) = lease {
            if let Err(e) = self.inner.coordinator.revoke(lease).await {
                warn!(lease, error = %e, "falha ao revogar o registro");
            }
        }
        self.inner.coordinator.close().await;
        info!(node = %self.inner.node_id, "syncer encerrado");
    }
}

/// Registra o endereço do nó sob um lease e o renova até falhar.
async fn register(inner: Arc<Inner>) -> Result<(), ClusterError> {
    let ttl = inner.config.lease_ttl;
    let address = inner.config.address();
    let lease = inner.coordinator.grant(ttl).await?;
    inner.coordinator.put(&inner.self_key, &address, lease).await?;
    inner.lease.send_replace(Some(lease));
    info!(key = %inner.self_key, %address, lease, "nó registrado");

    let mut renew = tokio::time::interval((ttl / 3).max(Duration::from_millis(1)));
    renew.tick().await;
    loop {
        renew.tick().await;
        if let Err(e) = inner.coordinator.keep_alive(lease).await {
            inner.lease.send_replace(None);
            return Err(e);
        }
    }
}

/// Acompanha entradas e saídas de peers. O watch é aberto antes da listagem
/// para que nenhum evento se perca entre as duas.
async fn discover(inner: Arc<Inner>) -> Result<(), ClusterError> {
    let prefix = inner.config.discovery_prefix();
    let mut events = inner.coordinator.watch_prefix(&prefix).await?;
    let peers = inner.coordinator.get_prefix(&prefix).await?;
    debug!(count = peers.len(), "peers listados");
    inner.emit(RoleEvent::Resync(peers));

    while let Some(event) = events.recv().await {
        match event {
            WatchEvent::Put { key, value } => inner.emit(RoleEvent::PeerUp { key, addr: value }),
            WatchEvent::Delete { key } => inner.emit(RoleEvent::PeerDown { key }),
        }
    }
    Err(ClusterError::Coordinator("watch de descoberta perdido".into()))
}

/// Faz campanha com o lease atual. Um novo lease reinicia a candidatura.
async fn elect(inner: Arc<Inner>) -> Result<(), ClusterError> {
    let election = inner.config.election_key();
    let mut lease_rx = inner.lease.subscribe();
    loop {
        let lease = loop {
            if let Some(lease) = *lease_rx.borrow_and_update() {
                break lease;
            }
            lease_rx.changed().await.map_err(|_| ClusterError::Closed)?;
        };

        tokio::select! {
            won = inner.coordinator.campaign(&election, &inner.self_key, lease) => {
                won?;
                info!(node = %inner.node_id, "eleito líder");
                inner.emit(RoleEvent::Elected);
            }
            changed = lease_rx.changed() => {
                changed.map_err(|_| ClusterError::Closed)?;
                continue;
            }
        }

        // a liderança dura enquanto o lease durar
        lease_rx.changed().await.map_err(|_| ClusterError::Closed)?;
    }
}

/// Repassa ao ator cada mudança de líder vista pelo coordenador.
async fn observe(inner: Arc<Inner>) -> Result<(), ClusterError> {
    let mut leader = inner.coordinator.observe(&inner.config.election_key()).await?;
    loop {
        let current = leader.borrow_and_update().clone();
        debug!(leader = ?current, "líder observado");
        inner.emit(RoleEvent::LeaderObserved(current));
        if leader.changed().await.is_err() {
            return Err(ClusterError::Coordinator("observação do líder perdida".into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::MemoryCoordinator;
    use squall_protocol::Action;
    use squall_storage::Strings;

    fn config(node: &str, port: u16) -> ClusterConfig {
        ClusterConfig {
            prefix: "c1".into(),
            port,
            node_id: Some(node.into()),
            lease_ttl: Duration::from_millis(500),
            dial_timeout: Duration::from_millis(100),
            dial_retries: 1,
            retry_delay: Duration::from_millis(50),
            ..Default::default()
        }
    }

    async fn wait_role(syncer: &Syncer, role: Role) {
        let mut topology = syncer.subscribe();
        tokio::time::timeout(Duration::from_secs(5), topology.wait_for(|t| t.role == role))
            .await
            .expect("papel não mudou a tempo")
            .unwrap();
    }

    fn set(key: &str, value: &str) -> Mutation {
        Mutation::new(Action::Set, vec![key.into(), value.into(), String::new()])
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let result = Syncer::start(ClusterConfig::default(), Store::default(), coordinator).await;
        assert!(matches!(result, Err(ClusterError::Config(_))));
    }

    #[tokio::test]
    async fn lone_node_leads_and_applies_locally() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let syncer = Syncer::start(config("a", 7001), Store::default(), coordinator.clone())
            .await
            .unwrap();
        wait_role(&syncer, Role::Leader).await;

        let ctx = CancellationToken::new();
        assert_eq!(syncer.submit(&ctx, set("k", "v")).await.unwrap(), "OK");
        assert_eq!(syncer.store().get(&ctx, "k").await.unwrap(), "v");

        let status = syncer.status();
        assert_eq!(status.node_id, "a");
        assert_eq!(status.leader.as_deref(), Some("a"));
        assert!(status.peers.is_empty());

        let registered = coordinator.get_prefix("squall/c1/server/").await.unwrap();
        assert_eq!(
            registered,
            vec![("squall/c1/server/a".to_string(), "127.0.0.1:7001".to_string())]
        );

        syncer.close().await;
        assert!(coordinator.get_prefix("squall/c1/server/").await.unwrap().is_empty());
        assert!(matches!(
            syncer.submit(&ctx, set("k", "w")).await,
            Err(squall_common::SquallError::Cluster(ClusterError::Closed))
        ));
    }

    #[tokio::test]
    async fn second_node_follows_and_needs_a_reachable_leader() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let leader = Syncer::start(config("a", 7002), Store::default(), coordinator.clone())
            .await
            .unwrap();
        wait_role(&leader, Role::Leader).await;

        let follower = Syncer::start(config("b", 7003), Store::default(), coordinator.clone())
            .await
            .unwrap();
        let mut topology = follower.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            topology.wait_for(|t| t.leader.is_some()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(follower.role(), Role::Follower);
        assert_eq!(follower.status().leader.as_deref(), Some("a"));

        // ninguém escuta na porta do líder
        let ctx = CancellationToken::new();
        let err = follower.submit(&ctx, set("k", "v")).await.unwrap_err();
        assert!(matches!(
            err,
            squall_common::SquallError::Cluster(ClusterError::Unreachable(_))
        ));
        assert!(follower.store().get(&ctx, "k").await.unwrap_err().is_no_value());

        leader.close().await;
        wait_role(&follower, Role::Leader).await;
        follower.close().await;
    }

    #[tokio::test]
    async fn canceled_context_is_checked_first() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let syncer = Syncer::start(config("a", 7004), Store::default(), coordinator)
            .await
            .unwrap();
        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = syncer.submit(&ctx, set("k", "v")).await.unwrap_err();
        assert!(matches!(
            err,
            squall_common::SquallError::Store(StoreError::Canceled)
        ));
        syncer.close().await;
    }

    #[tokio::test]
    async fn credentials_must_match_when_configured() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let mut cfg = config("a", 7005);
        cfg.username = Some("admin".into());
        cfg.password = Some("s3cret".into());
        let syncer = Syncer::start(cfg, Store::default(), coordinator).await.unwrap();

        let good = Credentials {
            username: "admin".into(),
            password: "s3cret".into(),
        };
        let bad = Credentials {
            username: "admin".into(),
            password: "errada".into(),
        };
        assert!(syncer.authenticate(Some(&good)).is_ok());
        assert!(matches!(
            syncer.authenticate(Some(&bad)),
            Err(ClusterError::Unauthenticated)
        ));
        assert!(syncer.authenticate(None).is_err());
        syncer.close().await;
    }
}
