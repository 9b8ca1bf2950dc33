use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use squall_common::{Category, StoreError};

use crate::expire::Expirable;
use crate::task::spawn_periodic;

pub(crate) type Entries<V> = HashMap<String, V>;

/// Falha rápido se o sinal de cancelamento já disparou.
pub(crate) fn check(ctx: &CancellationToken) -> Result<(), StoreError> {
    if ctx.is_cancelled() {
        return Err(StoreError::Canceled);
    }
    Ok(())
}

/// Valor vivo sob `key`, ignorando entradas expiradas.
pub(crate) fn live<'a, V: Expirable>(entries: &'a Entries<V>, key: &str) -> Option<&'a V> {
    entries.get(key).filter(|v| !v.is_expired())
}

/// Como `live`, mas remove a entrada se ela já expirou.
pub(crate) fn live_mut<'a, V: Expirable>(
    entries: &'a mut Entries<V>,
    key: &str,
) -> Option<&'a mut V> {
    if entries.get(key)?.is_expired() {
        entries.remove(key);
        return None;
    }
    entries.get_mut(key)
}

/// Valor vivo sob `key`, criado com `make` se ausente ou expirado.
pub(crate) fn live_or_insert<'a, V: Expirable>(
    entries: &'a mut Entries<V>,
    key: &str,
    make: impl FnOnce() -> V,
) -> &'a mut V {
    if entries.get(key).is_some_and(|v| v.is_expired()) {
        entries.remove(key);
    }
    entries.entry(key.to_string()).or_insert_with(make)
}

/// Mapa chave → valor de uma categoria, protegido por um único RwLock.
///
/// Concentra as operações comuns a todas as stores tipadas (del, exists,
/// expire, expire_at, persist, ttl) e a varredura de expirados.
pub(crate) struct Keyspace<V> {
    category: Category,
    entries: RwLock<Entries<V>>,
    max_lifetime: Duration,
}

impl<V: Expirable + Send + Sync + 'static> Keyspace<V> {
    /// Cria o keyspace e agenda a varredura periódica. A varredura termina
    /// quando o último handle é descartado.
    pub fn spawn(
        category: Category,
        max_lifetime: Duration,
        sweep_interval: Duration,
    ) -> Arc<Self> {
        let space = Arc::new(Keyspace {
            category,
            entries: RwLock::new(HashMap::new()),
            max_lifetime,
        });
        spawn_periodic(
            category.as_str(),
            sweep_interval,
            Arc::downgrade(&space),
            |space: &Keyspace<V>| {
                space.sweep();
            },
        );
        space
    }
}

impl<V: Expirable> Keyspace<V> {
    pub fn max_lifetime(&self) -> Duration {
        self.max_lifetime
    }

    pub fn read(&self, ctx: &CancellationToken) -> Result<RwLockReadGuard<'_, Entries<V>>, StoreError> {
        check(ctx)?;
        Ok(self.entries.read())
    }

    pub fn write(
        &self,
        ctx: &CancellationToken,
    ) -> Result<RwLockWriteGuard<'_, Entries<V>>, StoreError> {
        check(ctx)?;
        Ok(self.entries.write())
    }

    /// Existência sem sinal de cancelamento, usada pela fachada.
    pub fn contains(&self, key: &str) -> bool {
        live(&self.entries.read(), key).is_some()
    }

    /// Conta apenas as chaves vivas removidas.
    pub fn del(&self, ctx: &CancellationToken, keys: &[&str]) -> Result<usize, StoreError> {
        let mut entries = self.write(ctx)?;
        Ok(keys
            .iter()
            .filter(|key| {
                entries
                    .remove(**key)
                    .is_some_and(|v| !v.is_expired())
            })
            .count())
    }

    /// Chaves repetidas contam uma vez por ocorrência.
    pub fn exists(&self, ctx: &CancellationToken, keys: &[&str]) -> Result<usize, StoreError> {
        let entries = self.read(ctx)?;
        Ok(keys
            .iter()
            .filter(|key| live(&entries, key).is_some())
            .count())
    }

    pub fn expire(
        &self,
        ctx: &CancellationToken,
        key: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut entries = self.write(ctx)?;
        let max = self.max_lifetime;
        Ok(match live_mut(&mut entries, key) {
            Some(value) => {
                value.expiration_mut().set_ttl(ttl, max);
                true
            }
            None => false,
        })
    }

    pub fn expire_at(
        &self,
        ctx: &CancellationToken,
        key: &str,
        at: Option<SystemTime>,
    ) -> Result<bool, StoreError> {
        let mut entries = self.write(ctx)?;
        let max = self.max_lifetime;
        Ok(match live_mut(&mut entries, key) {
            Some(value) => {
                value.expiration_mut().set_deadline(at, max);
                true
            }
            None => false,
        })
    }

    /// Devolve a chave ao horizonte máximo de vida.
    pub fn persist(&self, ctx: &CancellationToken, key: &str) -> Result<bool, StoreError> {
        self.expire_at(ctx, key, None)
    }

    pub fn ttl(&self, ctx: &CancellationToken, key: &str) -> Result<Duration, StoreError> {
        let entries = self.read(ctx)?;
        live(&entries, key)
            .map(|v| v.expiration().remaining())
            .ok_or(StoreError::NoValue)
    }

    /// Remove todas as entradas expiradas. Retorna quantas saíram.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, v| !v.is_expired());
        let removed = before - entries.len();
        if removed > 0 {
            debug!(category = %self.category, removed, "chaves expiradas removidas");
        }
        removed
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Gera, para uma store tipada com campo `space`, as operações comuns.
macro_rules! common_ops {
    ($store:ty) => {
        impl $store {
            pub fn del(
                &self,
                ctx: &::tokio_util::sync::CancellationToken,
                keys: &[&str],
            ) -> Result<usize, ::squall_common::StoreError> {
                self.space.del(ctx, keys)
            }

            pub fn exists(
                &self,
                ctx: &::tokio_util::sync::CancellationToken,
                keys: &[&str],
            ) -> Result<usize, ::squall_common::StoreError> {
                self.space.exists(ctx, keys)
            }

            /// `None` mantém o prazo atual.
            pub fn expire(
                &self,
                ctx: &::tokio_util::sync::CancellationToken,
                key: &str,
                ttl: Option<::std::time::Duration>,
            ) -> Result<bool, ::squall_common::StoreError> {
                self.space.expire(ctx, key, ttl)
            }

            /// `None` devolve a chave ao horizonte máximo.
            pub fn expire_at(
                &self,
                ctx: &::tokio_util::sync::CancellationToken,
                key: &str,
                at: Option<::std::time::SystemTime>,
            ) -> Result<bool, ::squall_common::StoreError> {
                self.space.expire_at(ctx, key, at)
            }

            pub fn persist(
                &self,
                ctx: &::tokio_util::sync::CancellationToken,
                key: &str,
            ) -> Result<bool, ::squall_common::StoreError> {
                self.space.persist(ctx, key)
            }

            pub fn ttl(
                &self,
                ctx: &::tokio_util::sync::CancellationToken,
                key: &str,
            ) -> Result<::std::time::Duration, ::squall_common::StoreError> {
                self.space.ttl(ctx, key)
            }

            pub(crate) fn contains(&self, key: &str) -> bool {
                self.space.contains(key)
            }
        }
    };
}

pub(crate) use common_ops;
