use std::time::Duration;

use squall_common::{MAX_LIFETIME, SWEEP_INTERVAL};

/// Parâmetros das stores in-process.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Intervalo da varredura de chaves expiradas.
    pub sweep_interval: Duration,
    /// Teto de vida de qualquer valor.
    pub max_lifetime: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval: SWEEP_INTERVAL,
            max_lifetime: MAX_LIFETIME,
        }
    }
}
