use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, warn};

/// Menor período aceito; `interval` entra em pânico com zero.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Agenda `work` a cada `period` enquanto `target` estiver vivo.
///
/// O laço roda numa task filha supervisionada: um pânico é logado e a task é
/// recriada. O supervisor termina sozinho quando o alvo é descartado.
/// Fora de um runtime Tokio nada é agendado e `None` é retornado.
pub fn spawn_periodic<T, F>(
    name: &'static str,
    period: Duration,
    target: Weak<T>,
    work: F,
) -> Option<JoinHandle<()>>
where
    T: Send + Sync + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    let Ok(runtime) = Handle::try_current() else {
        warn!(task = name, "sem runtime Tokio: varredura periódica desativada");
        return None;
    };
    let period = period.max(MIN_PERIOD);
    let work = Arc::new(work);

    Some(runtime.spawn(async move {
        loop {
            let target = target.clone();
            let work = work.clone();
            let run = tokio::spawn(async move {
                let mut tick = interval(period);
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                tick.tick().await;
                loop {
                    tick.tick().await;
                    let Some(target) = target.upgrade() else {
                        return;
                    };
                    work(&target);
                }
            });

            match run.await {
                Ok(()) => return,
                Err(e) if e.is_panic() => {
                    error!(task = name, "tarefa periódica entrou em pânico, reiniciando");
                }
                Err(_) => return,
            }
        }
    }))
}
