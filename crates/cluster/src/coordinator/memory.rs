use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use squall_common::ClusterError;
use squall_protocol::{LeaseId, WatchEvent};
use squall_storage::spawn_periodic;

use super::Coordinator;

/// Frequência com que leases vencidos são recolhidos.
const REAP_INTERVAL: Duration = Duration::from_millis(100);

struct Lease {
    ttl: Duration,
    deadline: Instant,
}

struct Candidate {
    value: String,
    lease: LeaseId,
}

/// Candidatos em ordem de chegada; o primeiro é o líder.
struct Election {
    candidates: Vec<Candidate>,
    leader: watch::Sender<Option<String>>,
    changed: Arc<Notify>,
}

impl Election {
    fn new() -> Self {
        Self {
            candidates: Vec::new(),
            leader: watch::channel(None).0,
            changed: Arc::new(Notify::new()),
        }
    }

    fn position(&self, candidate: &str, lease: LeaseId) -> Option<usize> {
        self.candidates
            .iter()
            .position(|c| c.value == candidate && c.lease == lease)
    }

    /// Publica o líder (se mudou) e acorda quem está em campanha.
    fn publish(&self) {
        let leader = self.candidates.first().map(|c| c.value.clone());
        self.leader.send_if_modified(|current| {
            if *current == leader {
                return false;
            }
            *current = leader;
            true
        });
        self.changed.notify_waiters();
    }
}

#[derive(Default)]
struct State {
    next_lease: LeaseId,
    leases: HashMap<LeaseId, Lease>,
    kv: BTreeMap<String, (String, LeaseId)>,
    watchers: Vec<(String, mpsc::UnboundedSender<WatchEvent>)>,
    elections: HashMap<String, Election>,
}

impl State {
    fn notify(&mut self, event: WatchEvent) {
        self.watchers.retain(|(prefix, tx)| {
            !event.key().starts_with(prefix.as_str()) || tx.send(event.clone()).is_ok()
        });
    }

    fn is_live(&self, lease: LeaseId) -> bool {
        self.leases
            .get(&lease)
            .is_some_and(|l| Instant::now() < l.deadline)
    }

    /// Remove o lease e tudo o que depende dele.
    fn drop_lease(&mut self, lease: LeaseId) {
        self.leases.remove(&lease);

        let dead: Vec<String> = self
            .kv
            .iter()
            .filter(|(_, (_, owner))| *owner == lease)
            .map(|(key, _)| key.clone())
            .collect();
        for key in dead {
            self.kv.remove(&key);
            self.notify(WatchEvent::Delete { key });
        }

        for election in self.elections.values_mut() {
            let before = election.candidates.len();
            election.candidates.retain(|c| c.lease != lease);
            if election.candidates.len() != before {
                election.publish();
            }
        }
    }

    fn reap(&mut self) {
        let now = Instant::now();
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, l)| now >= l.deadline)
            .map(|(id, _)| *id)
            .collect();
        for lease in expired {
            info!(lease, "lease expirou");
            self.drop_lease(lease);
        }
    }

    fn election(&mut self, name: &str) -> &mut Election {
        self.elections
            .entry(name.to_string())
            .or_insert_with(Election::new)
    }
}

struct Inner {
    state: Mutex<State>,
}

/// Serviço de coordenação in-process. Pode ser compartilhado por vários nós no
/// mesmo processo ou hospedado para outros processos pelo servidor.
///
/// O líder de uma eleição é o candidato vivo mais antigo.
#[derive(Clone)]
pub struct MemoryCoordinator {
    inner: Arc<Inner>,
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                next_lease: 1,
                ..Default::default()
            }),
        });
        spawn_periodic(
            "coordinator-reaper",
            REAP_INTERVAL,
            Arc::downgrade(&inner),
            |inner: &Inner| inner.state.lock().reap(),
        );
        Self { inner }
    }
}

fn unknown_lease(lease: LeaseId) -> ClusterError {
    ClusterError::Coordinator(format!("lease {lease} desconhecido ou expirado"))
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn grant(&self, ttl: Duration) -> Result<LeaseId, ClusterError> {
        if ttl.is_zero() {
            return Err(ClusterError::Coordinator("ttl do lease deve ser positivo".into()));
        }
        let mut state = self.inner.state.lock();
        let id = state.next_lease;
        state.next_lease += 1;
        state.leases.insert(
            id,
            Lease {
                ttl,
                deadline: Instant::now() + ttl,
            },
        );
        debug!(lease = id, ?ttl, "lease concedido");
        Ok(id)
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<(), ClusterError> {
        let mut state = self.inner.state.lock();
        if !state.is_live(lease) {
            state.drop_lease(lease);
            return Err(unknown_lease(lease));
        }
        if let Some(l) = state.leases.get_mut(&lease) {
            l.deadline = Instant::now() + l.ttl;
        }
        Ok(())
    }

    async fn revoke(&self, lease: LeaseId) -> Result<(), ClusterError> {
        let mut state = self.inner.state.lock();
        if !state.leases.contains_key(&lease) {
            return Err(unknown_lease(lease));
        }
        state.drop_lease(lease);
        debug!(lease, "lease revogado");
        Ok(())
    }

    async fn put(&self, key: &str, value: &str, lease: LeaseId) -> Result<(), ClusterError> {
        let mut state = self.inner.state.lock();
        if !state.is_live(lease) {
            return Err(unknown_lease(lease));
        }
        state
            .kv
            .insert(key.to_string(), (value.to_string(), lease));
        state.notify(WatchEvent::Put {
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, ClusterError> {
        let state = self.inner.state.lock();
        Ok(state
            .kv
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, (_, lease))| state.is_live(*lease))
            .map(|(key, (value, _))| (key.clone(), value.clone()))
            .collect())
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<mpsc::UnboundedReceiver<WatchEvent>, ClusterError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.state.lock().watchers.push((prefix.to_string(), tx));
        Ok(rx)
    }

    async fn campaign(
        &self,
        election: &str,
        candidate: &str,
        lease: LeaseId,
    ) -> Result<(), ClusterError> {
        let changed = {
            let mut state = self.inner.state.lock();
            if !state.is_live(lease) {
                return Err(unknown_lease(lease));
            }
            let race = state.election(election);
            if race.position(candidate, lease).is_none() {
                race.candidates.retain(|c| c.value != candidate);
                race.candidates.push(Candidate {
                    value: candidate.to_string(),
                    lease,
                });
                race.publish();
            }
            race.changed.clone()
        };

        loop {
            let notified = changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.inner.state.lock();
                match state
                    .elections
                    .get(election)
                    .and_then(|race| race.position(candidate, lease))
                {
                    Some(0) => return Ok(()),
                    Some(_) => {}
                    None => {
                        return Err(ClusterError::Coordinator(
                            "candidatura perdida: lease expirou ou foi revogado".into(),
                        ));
                    }
                }
            }

            notified.await;
        }
    }

    async fn observe(&self, election: &str) -> Result<watch::Receiver<Option<String>>, ClusterError> {
        Ok(self.inner.state.lock().election(election).leader.subscribe())
    }
}
