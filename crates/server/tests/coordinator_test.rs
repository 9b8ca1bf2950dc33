use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use squall_cluster::{Coordinator, MemoryCoordinator, RemoteCoordinator};
use squall_common::ClusterError;
use squall_protocol::WatchEvent;
use squall_server::serve_coordinator;

const TTL: Duration = Duration::from_secs(2);

/// Hospeda um `MemoryCoordinator` em loopback e devolve um cliente para ele.
async fn hosted() -> (Arc<RemoteCoordinator>, broadcast::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (shutdown, _) = broadcast::channel(1);
    tokio::spawn(serve_coordinator(
        listener,
        Arc::new(MemoryCoordinator::new()),
        16,
        shutdown.clone(),
    ));
    let client = RemoteCoordinator::new(addr, Duration::from_secs(1));
    (Arc::new(client), shutdown)
}

#[tokio::test]
async fn test_leases_and_prefix_listing() {
    let (coord, _shutdown) = hosted().await;

    let lease = coord.grant(TTL).await.unwrap();
    coord.put("svc/a", "127.0.0.1:1", lease).await.unwrap();
    coord.put("svc/b", "127.0.0.1:2", lease).await.unwrap();
    coord.put("outro/c", "x", lease).await.unwrap();
    coord.keep_alive(lease).await.unwrap();

    let pairs = coord.get_prefix("svc/").await.unwrap();
    assert_eq!(
        pairs,
        vec![
            ("svc/a".to_string(), "127.0.0.1:1".to_string()),
            ("svc/b".to_string(), "127.0.0.1:2".to_string()),
        ]
    );

    coord.revoke(lease).await.unwrap();
    assert!(coord.get_prefix("svc/").await.unwrap().is_empty());
    assert!(matches!(
        coord.keep_alive(lease).await,
        Err(ClusterError::Coordinator(_))
    ));
}

#[tokio::test]
async fn test_put_without_live_lease_is_an_error() {
    let (coord, _shutdown) = hosted().await;
    assert!(matches!(
        coord.put("svc/a", "x", 404).await,
        Err(ClusterError::Coordinator(_))
    ));
    // a conexão compartilhada segue de pé depois de um erro remoto
    assert!(coord.grant(TTL).await.is_ok());
}

#[tokio::test]
async fn test_watch_streams_puts_and_deletes() {
    let (coord, _shutdown) = hosted().await;
    let mut events = coord.watch_prefix("svc/").await.unwrap();

    let lease = coord.grant(TTL).await.unwrap();
    coord.put("svc/a", "127.0.0.1:1", lease).await.unwrap();
    coord.put("fora/b", "x", lease).await.unwrap();
    coord.revoke(lease).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        first,
        WatchEvent::Put {
            key: "svc/a".into(),
            value: "127.0.0.1:1".into()
        }
    );
    let second = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        second,
        WatchEvent::Delete {
            key: "svc/a".into()
        }
    );
}

#[tokio::test]
async fn test_campaign_waits_for_the_leader_to_go() {
    let (coord, _shutdown) = hosted().await;
    let first = coord.grant(TTL).await.unwrap();
    let second = coord.grant(TTL).await.unwrap();

    coord.campaign("eleicao", "node-a", first).await.unwrap();
    let mut leader = coord.observe("eleicao").await.unwrap();
    assert_eq!(leader.borrow().as_deref(), Some("node-a"));

    let challenger = {
        let coord = coord.clone();
        tokio::spawn(async move { coord.campaign("eleicao", "node-b", second).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!challenger.is_finished());

    coord.revoke(first).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), challenger)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    tokio::time::timeout(
        Duration::from_secs(2),
        leader.wait_for(|l| l.as_deref() == Some("node-b")),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn test_host_shutdown_ends_streams() {
    let (coord, shutdown) = hosted().await;
    let mut events = coord.watch_prefix("svc/").await.unwrap();

    shutdown.send(()).unwrap();
    let closed = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap();
    assert!(closed.is_none());
}
