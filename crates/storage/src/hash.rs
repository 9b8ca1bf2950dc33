use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use squall_common::{Category, StoreError};

use crate::config::StoreConfig;
use crate::expire::{Expirable, Expiration};
use crate::keyspace::{Keyspace, common_ops, live, live_mut, live_or_insert};

/// Mapa campo → valor. A ordem dos campos não é preservada.
#[derive(Debug)]
pub struct HashValue {
    fields: HashMap<String, String>,
    expiration: Expiration,
}

impl HashValue {
    fn new(max: std::time::Duration) -> Self {
        Self {
            fields: HashMap::new(),
            expiration: Expiration::new(max),
        }
    }
}

impl Expirable for HashValue {
    fn expiration(&self) -> &Expiration {
        &self.expiration
    }

    fn expiration_mut(&mut self) -> &mut Expiration {
        &mut self.expiration
    }
}

/// Store de hashes.
#[derive(Clone)]
pub struct HashStore {
    space: Arc<Keyspace<HashValue>>,
}

common_ops!(HashStore);

impl HashStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            space: Keyspace::spawn(Category::Hash, config.max_lifetime, config.sweep_interval),
        }
    }

    /// `pairs` = `[campo, valor, campo, valor, ...]`. Retorna quantos campos
    /// foram criados; sobrescritas não contam.
    pub fn hset(
        &self,
        ctx: &CancellationToken,
        key: &str,
        pairs: &[&str],
    ) -> Result<usize, StoreError> {
        if pairs.is_empty() || pairs.len() % 2 != 0 {
            return Err(StoreError::BadArgument(
                "hset exige pares campo/valor".into(),
            ));
        }
        let max = self.space.max_lifetime();
        let mut entries = self.space.write(ctx)?;
        let hash = live_or_insert(&mut entries, key, || HashValue::new(max));
        Ok(pairs
            .chunks_exact(2)
            .filter(|pair| {
                hash.fields
                    .insert(pair[0].to_string(), pair[1].to_string())
                    .is_none()
            })
            .count())
    }

    pub fn hset_nx(
        &self,
        ctx: &CancellationToken,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let max = self.space.max_lifetime();
        let mut entries = self.space.write(ctx)?;
        let hash = live_or_insert(&mut entries, key, || HashValue::new(max));
        if hash.fields.contains_key(field) {
            return Ok(false);
        }
        hash.fields.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    pub fn hexists(
        &self,
        ctx: &CancellationToken,
        key: &str,
        field: &str,
    ) -> Result<bool, StoreError> {
        let entries = self.space.read(ctx)?;
        Ok(live(&entries, key).is_some_and(|h| h.fields.contains_key(field)))
    }

    /// Remove a chave inteira quando o último campo sai. Chave ausente → 0.
    pub fn hdel(
        &self,
        ctx: &CancellationToken,
        key: &str,
        fields: &[&str],
    ) -> Result<usize, StoreError> {
        let mut entries = self.space.write(ctx)?;
        let Some(hash) = live_mut(&mut entries, key) else {
            return Ok(0);
        };
        let removed = fields
            .iter()
            .filter(|f| hash.fields.remove(**f).is_some())
            .count();
        if hash.fields.is_empty() {
            entries.remove(key);
        }
        Ok(removed)
    }

    pub fn hget(
        &self,
        ctx: &CancellationToken,
        key: &str,
        field: &str,
    ) -> Result<String, StoreError> {
        let entries = self.space.read(ctx)?;
        live(&entries, key)
            .and_then(|h| h.fields.get(field).cloned())
            .ok_or(StoreError::NoValue)
    }

    /// Resultado posicional, com `None` para campos ausentes.
    pub fn hmget(
        &self,
        ctx: &CancellationToken,
        key: &str,
        fields: &[&str],
    ) -> Result<Vec<Option<String>>, StoreError> {
        let entries = self.space.read(ctx)?;
        let hash = live(&entries, key);
        Ok(fields
            .iter()
            .map(|f| hash.and_then(|h| h.fields.get(*f).cloned()))
            .collect())
    }

    pub fn hkeys(&self, ctx: &CancellationToken, key: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.space.read(ctx)?;
        Ok(live(&entries, key)
            .map(|h| h.fields.keys().cloned().collect())
            .unwrap_or_default())
    }

    pub fn hvals(&self, ctx: &CancellationToken, key: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.space.read(ctx)?;
        Ok(live(&entries, key)
            .map(|h| h.fields.values().cloned().collect())
            .unwrap_or_default())
    }

    pub fn hgetall(
        &self,
        ctx: &CancellationToken,
        key: &str,
    ) -> Result<HashMap<String, String>, StoreError> {
        let entries = self.space.read(ctx)?;
        Ok(live(&entries, key)
            .map(|h| h.fields.clone())
            .unwrap_or_default())
    }

    pub fn hlen(&self, ctx: &CancellationToken, key: &str) -> Result<usize, StoreError> {
        let entries = self.space.read(ctx)?;
        Ok(live(&entries, key).map_or(0, |h| h.fields.len()))
    }
}
