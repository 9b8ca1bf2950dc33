use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use squall_cluster::{
    ClusterConfig, DialSettings, MemoryCoordinator, PeerClient, Role, RpcService, Syncer,
};
use squall_common::ClusterError;
use squall_protocol::{Action, Connection, Credentials, Frame, Mutation, Request, Response, Status};
use squall_server::serve_rpc;
use squall_storage::{Store, Strings};

struct Node {
    syncer: Syncer,
    addr: String,
    shutdown: broadcast::Sender<()>,
}

/// Sobe um nó sozinho no cluster, com a superfície RPC em loopback.
async fn lone_node(credentials: Option<(&str, &str)>) -> Node {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = ClusterConfig {
        prefix: "rpc".into(),
        port: addr.port(),
        node_id: Some("solo".into()),
        username: credentials.map(|(u, _)| u.to_string()),
        password: credentials.map(|(_, p)| p.to_string()),
        lease_ttl: Duration::from_secs(1),
        retry_delay: Duration::from_millis(50),
        ..Default::default()
    };
    let syncer = Syncer::start(config, Store::default(), Arc::new(MemoryCoordinator::new()))
        .await
        .unwrap();

    let (shutdown, _) = broadcast::channel(1);
    tokio::spawn(serve_rpc(
        listener,
        RpcService::new(syncer.clone()),
        16,
        shutdown.clone(),
    ));

    let mut topology = syncer.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        topology.wait_for(|t| t.role == Role::Leader),
    )
    .await
    .expect("nó não virou líder")
    .unwrap();

    Node {
        syncer,
        addr: addr.to_string(),
        shutdown,
    }
}

fn client(node: &Node, credentials: Option<Credentials>) -> PeerClient {
    PeerClient::new(
        "rpc/client",
        node.addr.clone(),
        DialSettings {
            timeout: Duration::from_secs(1),
            retries: 2,
            backoff: Duration::from_millis(20),
            rpc_timeout: Duration::from_secs(2),
            credentials,
        },
    )
}

fn set(key: &str, value: &str) -> Mutation {
    Mutation::new(Action::Set, vec![key.into(), value.into(), String::new()])
}

#[tokio::test]
async fn test_ping_pong() {
    let node = lone_node(None).await;
    let peer = client(&node, None);
    peer.ping().await.unwrap();
    node.syncer.close().await;
}

#[tokio::test]
async fn test_master_writes_land_in_the_store() {
    let node = lone_node(None).await;
    let peer = client(&node, None);

    let response = peer.call(&Request::master(None, set("k", "v"))).await.unwrap();
    assert_eq!(response, Response::ok("OK"));

    let ctx = CancellationToken::new();
    assert_eq!(node.syncer.store().get(&ctx, "k").await.unwrap(), "v");

    let push = Mutation::new(Action::Push, vec!["l".into(), "0".into(), "1".into()]);
    let response = peer.call(&Request::master(None, push)).await.unwrap();
    assert_eq!(response, Response::ok("2"));

    let pop = Mutation::new(Action::Pop, vec!["vazia".into()]);
    let response = peer.call(&Request::master(None, pop)).await.unwrap();
    assert_eq!(response.status, Status::NotFound);

    node.syncer.close().await;
}

#[tokio::test]
async fn test_slave_is_refused_by_the_leader() {
    let node = lone_node(None).await;
    let peer = client(&node, None);

    let response = peer.call(&Request::slave(None, set("k", "v"))).await.unwrap();
    assert_eq!(response.status, Status::RoleMismatch);

    let ctx = CancellationToken::new();
    assert!(node.syncer.store().get(&ctx, "k").await.unwrap_err().is_no_value());
    node.syncer.close().await;
}

#[tokio::test]
async fn test_credentials_are_checked_before_dispatch() {
    let node = lone_node(Some(("admin", "s3cret"))).await;

    let anonymous = client(&node, None);
    match anonymous.ping().await {
        Err(ClusterError::Remote { code, .. }) => {
            assert_eq!(code, Status::Unauthenticated.code())
        }
        other => panic!("esperado unauthenticated, veio {other:?}"),
    }

    let wrong = Credentials {
        username: "admin".into(),
        password: "errada".into(),
    };
    let response = anonymous
        .call(&Request::master(Some(wrong), set("k", "v")))
        .await
        .unwrap();
    assert_eq!(response.status, Status::Unauthenticated);
    let ctx = CancellationToken::new();
    assert!(node.syncer.store().get(&ctx, "k").await.is_err());

    let admin = client(&node, admin_credentials());
    admin.ping().await.unwrap();
    let response = admin
        .call(&Request::master(admin_credentials(), set("k", "v")))
        .await
        .unwrap();
    assert!(response.is_ok());

    node.syncer.close().await;
}

fn admin_credentials() -> Option<Credentials> {
    Some(Credentials {
        username: "admin".into(),
        password: "s3cret".into(),
    })
}

#[tokio::test]
async fn test_malformed_frames_get_an_error_response() {
    let node = lone_node(None).await;
    let mut conn = Connection::connect(node.addr.as_str(), Duration::from_secs(1))
        .await
        .unwrap();

    let reply = conn
        .call(&Frame::array_from_strs(&["VOTE", "", ""]), Duration::from_secs(1))
        .await
        .unwrap();
    let response = Response::from_frame(reply).unwrap();
    assert_eq!(response.status, Status::BadArgument);

    // a conexão continua utilizável
    let reply = conn
        .call(&Request::ping(None).to_frame(), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(Response::from_frame(reply).unwrap(), Response::ok("PONG"));

    node.syncer.close().await;
}

#[tokio::test]
async fn test_shutdown_closes_open_connections() {
    let node = lone_node(None).await;
    let mut conn = Connection::connect(node.addr.as_str(), Duration::from_secs(1))
        .await
        .unwrap();
    conn.call(&Request::ping(None).to_frame(), Duration::from_secs(1))
        .await
        .unwrap();

    node.shutdown.send(()).unwrap();
    let eof = tokio::time::timeout(Duration::from_secs(2), conn.read_frame())
        .await
        .unwrap()
        .unwrap();
    assert!(eof.is_none());

    node.syncer.close().await;
}
