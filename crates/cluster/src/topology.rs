//! Papel do nó e visão dos peers.
//!
//! Um único ator é dono do papel, do ponteiro de líder e do conjunto de peers.
//! Registro, descoberta, eleição e observação só enviam eventos; quem precisa
//! do estado lê o último [`Topology`] publicado.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::peer::{DialSettings, PeerClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Follower,
    Leader,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Follower => "follower",
            Role::Leader => "leader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fotografia do cluster vista por este nó.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub role: Role,
    /// Chave de descoberta do líder observado (pode ser a deste nó).
    pub leader_key: Option<String>,
    /// Cliente do líder, quando ele é outro nó já descoberto.
    pub leader: Option<Arc<PeerClient>>,
    /// Todos os peers conhecidos exceto o líder.
    pub followers: Vec<Arc<PeerClient>>,
}

#[derive(Debug)]
pub(crate) enum RoleEvent {
    PeerUp { key: String, addr: String },
    PeerDown { key: String },
    /// Lista completa de peers vivos; substitui o conjunto atual.
    Resync(Vec<(String, String)>),
    Elected,
    LeaderObserved(Option<String>),
}

pub(crate) struct RoleActor {
    self_key: String,
    settings: DialSettings,
    peers: BTreeMap<String, Arc<PeerClient>>,
    leader_key: Option<String>,
    published: watch::Sender<Arc<Topology>>,
}

impl RoleActor {
    /// Sobe o ator. Ele para no `shutdown` ou quando todos os emissores de
    /// eventos somem, publicando uma topologia vazia na saída.
    pub(crate) fn spawn(
        self_key: String,
        settings: DialSettings,
        shutdown: CancellationToken,
    ) -> (
        mpsc::UnboundedSender<RoleEvent>,
        watch::Receiver<Arc<Topology>>,
    ) {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (published, topology) = watch::channel(Arc::new(Topology::default()));
        let mut actor = RoleActor {
            self_key,
            settings,
            peers: BTreeMap::new(),
            leader_key: None,
            published,
        };

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                actor.handle(event);
            }
            actor.peers.clear();
            actor.leader_key = None;
            actor.publish();
            debug!("ator de papel encerrado");
        });

        (events_tx, topology)
    }

    fn handle(&mut self, event: RoleEvent) {
        debug!(?event, "evento de topologia");
        match event {
            RoleEvent::PeerUp { key, addr } => self.track(key, addr),
            RoleEvent::PeerDown { key } => self.forget(&key),
            RoleEvent::Resync(pairs) => {
                let live: HashSet<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
                let gone: Vec<String> = self
                    .peers
                    .keys()
                    .filter(|k| !live.contains(k.as_str()))
                    .cloned()
                    .collect();
                for key in gone {
                    self.forget(&key);
                }
                for (key, addr) in pairs {
                    self.track(key, addr);
                }
            }
            RoleEvent::Elected => self.leader_key = Some(self.self_key.clone()),
            RoleEvent::LeaderObserved(leader) => self.leader_key = leader,
        }
        self.publish();
    }

    fn track(&mut self, key: String, addr: String) {
        if key == self.self_key {
            return;
        }
        if let Some(peer) = self.peers.get(&key) {
            if peer.addr() == addr {
                if !peer.is_reachable() {
                    peer.revive();
                    warm(peer.clone());
                }
                return;
            }
        }

        info!(peer = %key, %addr, "peer entrou no cluster");
        let peer = Arc::new(PeerClient::new(key.clone(), addr, self.settings.clone()));
        warm(peer.clone());
        self.peers.insert(key, peer);
    }

    fn forget(&mut self, key: &str) {
        if self.peers.remove(key).is_some() {
            info!(peer = %key, "peer saiu do cluster");
        }
        if self.leader_key.as_deref() == Some(key) {
            warn!(peer = %key, "líder saiu do cluster");
            self.leader_key = None;
        }
    }

    fn publish(&self) {
        let role = if self.leader_key.as_deref() == Some(self.self_key.as_str()) {
            Role::Leader
        } else {
            Role::Follower
        };
        let leader = self
            .leader_key
            .as_ref()
            .and_then(|key| self.peers.get(key))
            .cloned();
        let followers = self
            .peers
            .iter()
            .filter(|(key, _)| self.leader_key.as_ref() != Some(*key))
            .map(|(_, peer)| peer.clone())
            .collect();

        let previous = self.published.borrow().role;
        if previous != role {
            info!(from = %previous, to = %role, "papel mudou");
        }
        self.published.send_replace(Arc::new(Topology {
            role,
            leader_key: self.leader_key.clone(),
            leader,
            followers,
        }));
    }
}

/// Disca o peer em segundo plano para que a primeira chamada já o encontre.
fn warm(peer: Arc<PeerClient>) {
    tokio::spawn(async move {
        if let Err(e) = peer.connect().await {
            warn!(peer = %peer.key(), error = %e, "peer inacessível");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SELF: &str = "squall/c1/server/a";

    fn settings() -> DialSettings {
        DialSettings {
            timeout: Duration::from_millis(100),
            retries: 1,
            backoff: Duration::from_millis(1),
            rpc_timeout: Duration::from_millis(100),
            credentials: None,
        }
    }

    async fn settle(
        topology: &mut watch::Receiver<Arc<Topology>>,
        ready: impl FnMut(&Arc<Topology>) -> bool,
    ) -> Arc<Topology> {
        tokio::time::timeout(Duration::from_secs(2), topology.wait_for(ready))
            .await
            .expect("topologia não convergiu")
            .unwrap()
            .clone()
    }

    fn keys(peers: &[Arc<PeerClient>]) -> Vec<&str> {
        peers.iter().map(|p| p.key()).collect()
    }

    #[tokio::test]
    async fn observed_leader_leaves_the_follower_set() {
        let shutdown = CancellationToken::new();
        let (events, mut topology) = RoleActor::spawn(SELF.into(), settings(), shutdown.clone());

        events
            .send(RoleEvent::Resync(vec![
                ("squall/c1/server/b".into(), "127.0.0.1:1".into()),
                ("squall/c1/server/c".into(), "127.0.0.1:2".into()),
                (SELF.into(), "127.0.0.1:3".into()),
            ]))
            .unwrap();
        events
            .send(RoleEvent::LeaderObserved(Some("squall/c1/server/b".into())))
            .unwrap();

        let view = settle(&mut topology, |t| t.leader.is_some()).await;
        assert_eq!(view.role, Role::Follower);
        assert_eq!(view.leader.as_ref().unwrap().key(), "squall/c1/server/b");
        assert_eq!(keys(&view.followers), vec!["squall/c1/server/c"]);

        events
            .send(RoleEvent::PeerDown {
                key: "squall/c1/server/b".into(),
            })
            .unwrap();
        let view = settle(&mut topology, |t| t.leader_key.is_none()).await;
        assert!(view.leader.is_none());
        assert_eq!(keys(&view.followers), vec!["squall/c1/server/c"]);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn winning_the_election_makes_every_peer_a_follower() {
        let shutdown = CancellationToken::new();
        let (events, mut topology) = RoleActor::spawn(SELF.into(), settings(), shutdown.clone());

        events
            .send(RoleEvent::PeerUp {
                key: "squall/c1/server/b".into(),
                addr: "127.0.0.1:1".into(),
            })
            .unwrap();
        events.send(RoleEvent::Elected).unwrap();

        let view = settle(&mut topology, |t| t.role == Role::Leader).await;
        assert!(view.leader.is_none());
        assert_eq!(view.leader_key.as_deref(), Some(SELF));
        assert_eq!(keys(&view.followers), vec!["squall/c1/server/b"]);

        events
            .send(RoleEvent::LeaderObserved(Some("squall/c1/server/b".into())))
            .unwrap();
        let view = settle(&mut topology, |t| t.role == Role::Follower).await;
        assert!(view.followers.is_empty());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn resync_drops_vanished_peers() {
        let shutdown = CancellationToken::new();
        let (events, mut topology) = RoleActor::spawn(SELF.into(), settings(), shutdown.clone());

        events
            .send(RoleEvent::Resync(vec![
                ("b".into(), "127.0.0.1:1".into()),
                ("c".into(), "127.0.0.1:2".into()),
            ]))
            .unwrap();
        settle(&mut topology, |t| t.followers.len() == 2).await;

        events
            .send(RoleEvent::Resync(vec![("c".into(), "127.0.0.1:2".into())]))
            .unwrap();
        let view = settle(&mut topology, |t| t.followers.len() == 1).await;
        assert_eq!(keys(&view.followers), vec!["c"]);

        shutdown.cancel();
        let view = settle(&mut topology, |t| t.followers.is_empty()).await;
        assert_eq!(view.role, Role::Follower);
    }
}
