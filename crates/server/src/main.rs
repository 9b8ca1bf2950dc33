use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use squall_cluster::{
    ClusterConfig, Coordinator, MemoryCoordinator, RemoteCoordinator, RpcService, Syncer,
};
use squall_common::{DEFAULT_HOST, DEFAULT_NAMESPACE, DEFAULT_PORT, MAX_CONNECTIONS};
use squall_server::{serve_coordinator, serve_rpc};
use squall_storage::{Store, StoreConfig};

#[derive(Parser, Debug)]
#[command(name = "squall-server", about = "Squall: cache em memória com replicação líder/seguidor")]
struct Args {
    /// Host anunciado aos peers e usado no bind da superfície RPC.
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Nome do cluster.
    #[arg(long)]
    prefix: String,
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,
    #[arg(long)]
    node_id: Option<String>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long, requires = "user")]
    password: Option<String>,
    /// Endereço de um serviço de coordenação remoto.
    #[arg(long, value_name = "ADDR", conflicts_with = "serve_coordinator")]
    coordinator: Option<String>,
    /// Hospeda o serviço de coordenação neste processo, escutando em ADDR.
    #[arg(long, value_name = "ADDR")]
    serve_coordinator: Option<String>,
    #[arg(long, default_value_t = 5000)]
    lease_ttl_ms: u64,
    #[arg(long, default_value_t = 10)]
    sweep_interval_secs: u64,
    #[arg(long, default_value_t = MAX_CONNECTIONS)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "squall_server=info,squall_cluster=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = ClusterConfig {
        namespace: args.namespace,
        prefix: args.prefix,
        host: args.host,
        port: args.port,
        node_id: args.node_id,
        username: args.user,
        password: args.password,
        lease_ttl: Duration::from_millis(args.lease_ttl_ms),
        ..Default::default()
    };
    config.validate()?;

    let store = Store::new(StoreConfig {
        sweep_interval: Duration::from_secs(args.sweep_interval_secs.max(1)),
        ..Default::default()
    });

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut tasks = Vec::new();

    let coordinator: Arc<dyn Coordinator> = match (args.serve_coordinator, args.coordinator) {
        (Some(addr), _) => {
            let hosted: Arc<dyn Coordinator> = Arc::new(MemoryCoordinator::new());
            let listener = TcpListener::bind(&addr).await?;
            tasks.push(tokio::spawn(serve_coordinator(
                listener,
                hosted.clone(),
                args.max_connections,
                shutdown_tx.clone(),
            )));
            hosted
        }
        (None, Some(addr)) => Arc::new(RemoteCoordinator::new(addr, config.dial_timeout)),
        (None, None) => bail!("informe --coordinator ou --serve-coordinator"),
    };

    // o endereço só é anunciado depois que o listener existe
    let listener = TcpListener::bind(config.address()).await?;
    let syncer = Syncer::start(config, store, coordinator).await?;
    tasks.push(tokio::spawn(serve_rpc(
        listener,
        RpcService::new(syncer.clone()),
        args.max_connections,
        shutdown_tx.clone(),
    )));

    signal::ctrl_c().await?;
    info!("shutdown signal recebido");

    let _ = shutdown_tx.send(());
    syncer.close().await;
    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "tarefa do servidor falhou");
        }
    }

    Ok(())
}
