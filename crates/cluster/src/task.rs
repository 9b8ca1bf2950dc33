use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use squall_common::ClusterError;

/// Roda `make()` até o `shutdown` disparar. Saídas inesperadas (erro, retorno
/// antes do shutdown ou pânico) são logadas e a tarefa é recriada após
/// `retry_delay`.
pub(crate) fn spawn_supervised<F, Fut>(
    name: &'static str,
    shutdown: CancellationToken,
    retry_delay: Duration,
    mut make: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ClusterError>> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let mut run = tokio::spawn(make());
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => {
                    run.abort();
                    return;
                }
                outcome = &mut run => outcome,
            };

            match outcome {
                Ok(Ok(())) => warn!(task = name, "tarefa terminou sem shutdown, reiniciando"),
                Ok(Err(e)) => warn!(task = name, error = %e, "tarefa falhou, reiniciando"),
                Err(e) if e.is_panic() => {
                    error!(task = name, "tarefa entrou em pânico, reiniciando")
                }
                Err(_) => return,
            }

            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(retry_delay) => {}
            }
        }
    })
}
