#![forbid(unsafe_code)]

mod category;
mod error;

use std::time::Duration;

pub use category::Category;
pub use error::*;

pub const DEFAULT_PORT: u16 = 6420;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_NAMESPACE: &str = "squall";
pub const MAX_CONNECTIONS: usize = 1024;
pub const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024; // 4 KB
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024; // 64 MB

/// Teto de vida de qualquer valor armazenado.
pub const MAX_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Intervalo padrão da varredura de chaves expiradas.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10);
