use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use squall_common::{Category, StoreError};

use crate::config::StoreConfig;
use crate::expire::{Expirable, Expiration};
use crate::keyspace::{Entries, Keyspace, common_ops, live, live_mut};
use crate::marshal::Marshal;

/// Valor escalar já serializado na forma canônica.
#[derive(Debug)]
pub struct StringValue {
    data: String,
    expiration: Expiration,
}

impl Expirable for StringValue {
    fn expiration(&self) -> &Expiration {
        &self.expiration
    }

    fn expiration_mut(&mut self) -> &mut Expiration {
        &mut self.expiration
    }
}

/// Store de valores escalares.
#[derive(Clone)]
pub struct StringStore {
    space: Arc<Keyspace<StringValue>>,
}

common_ops!(StringStore);

impl StringStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            space: Keyspace::spawn(Category::String, config.max_lifetime, config.sweep_interval),
        }
    }

    /// Grava `value` serializado. `ttl = None` mantém o prazo de um valor
    /// existente (ou o horizonte, para chave nova).
    pub fn set<V: Marshal + ?Sized>(
        &self,
        ctx: &CancellationToken,
        key: &str,
        value: &V,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let data = value.marshal()?;
        let max = self.space.max_lifetime();
        let mut entries = self.space.write(ctx)?;
        Self::put(&mut entries, key, data, ttl, max);
        Ok(())
    }

    /// Grava só se a chave estiver ausente. Checagem e escrita acontecem sob o
    /// mesmo write lock.
    pub fn set_nx<V: Marshal + ?Sized>(
        &self,
        ctx: &CancellationToken,
        key: &str,
        value: &V,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let data = value.marshal()?;
        let max = self.space.max_lifetime();
        let mut entries = self.space.write(ctx)?;
        if live_mut(&mut entries, key).is_some() {
            return Ok(false);
        }
        Self::put(&mut entries, key, data, ttl, max);
        Ok(true)
    }

    pub fn get(&self, ctx: &CancellationToken, key: &str) -> Result<String, StoreError> {
        let entries = self.space.read(ctx)?;
        live(&entries, key)
            .map(|v| v.data.clone())
            .ok_or(StoreError::NoValue)
    }

    /// Nunca falha por ausência: uma posição por chave, `None` onde faltar.
    pub fn mget(
        &self,
        ctx: &CancellationToken,
        keys: &[&str],
    ) -> Result<Vec<Option<String>>, StoreError> {
        let entries = self.space.read(ctx)?;
        Ok(keys
            .iter()
            .map(|key| live(&entries, key).map(|v| v.data.clone()))
            .collect())
    }

    fn put(
        entries: &mut Entries<StringValue>,
        key: &str,
        data: String,
        ttl: Option<Duration>,
        max: Duration,
    ) {
        match live_mut(entries, key) {
            Some(existing) => {
                existing.data = data;
                existing.expiration.set_ttl(ttl, max);
            }
            None => {
                let mut expiration = Expiration::new(max);
                expiration.set_ttl(ttl, max);
                entries.insert(key.to_string(), StringValue { data, expiration });
            }
        }
    }
}
