use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use squall_common::{Category, SquallError, SquallResult, StoreError};

use crate::api::{Common, Hashes, Lists, SortedSets, Strings};
use crate::config::StoreConfig;
use crate::hash::HashStore;
use crate::keyspace::check;
use crate::list::ListStore;
use crate::marshal::Marshal;
use crate::string::StringStore;
use crate::task::spawn_periodic;
use crate::zset::{ScoredMember, SortedSetStore};

/// Encaminha uma chamada para a store tipada da categoria.
macro_rules! route {
    ($shared:expr, $category:expr, $store:ident => $call:expr) => {
        match $category {
            Category::String => {
                let $store = &$shared.strings;
                $call
            }
            Category::Hash => {
                let $store = &$shared.hashes;
                $call
            }
            Category::List => {
                let $store = &$shared.lists;
                $call
            }
            Category::SortedSet => {
                let $store = &$shared.zsets;
                $call
            }
        }
    };
}

struct Shared {
    strings: StringStore,
    hashes: HashStore,
    lists: ListStore,
    zsets: SortedSetStore,
    /// Categoria a que cada chave viva está presa.
    bindings: DashMap<String, Category>,
}

impl Shared {
    fn holds(&self, category: Category, key: &str) -> bool {
        route!(self, category, store => store.contains(key))
    }

    /// Solta vínculos cujas chaves já não existem (expiradas e varridas).
    fn prune(&self) {
        let before = self.bindings.len();
        self.bindings.retain(|key, category| self.holds(*category, key));
        let removed = before.saturating_sub(self.bindings.len());
        if removed > 0 {
            debug!(removed, "vínculos de chave liberados");
        }
    }
}

/// Fachada sobre as quatro stores tipadas.
///
/// Garante que uma chave só é usada por uma categoria de cada vez. A ordem de
/// locks é sempre vínculos → store tipada.
#[derive(Clone)]
pub struct Store {
    shared: Arc<Shared>,
}

impl Default for Store {
    fn default() -> Self {
        Store::new(StoreConfig::default())
    }
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        let shared = Arc::new(Shared {
            strings: StringStore::new(&config),
            hashes: HashStore::new(&config),
            lists: ListStore::new(&config),
            zsets: SortedSetStore::new(&config),
            bindings: DashMap::new(),
        });
        spawn_periodic(
            "bindings",
            config.sweep_interval,
            Arc::downgrade(&shared),
            Shared::prune,
        );
        Store { shared }
    }

    /// Categoria à qual a chave está presa.
    pub fn type_of(&self, ctx: &CancellationToken, key: &str) -> SquallResult<Category> {
        check(ctx)?;
        self.shared
            .bindings
            .get(key)
            .map(|c| *c)
            .filter(|c| self.shared.holds(*c, key))
            .ok_or_else(|| StoreError::NoValue.into())
    }

    /// Executa uma escrita de `category` sobre `key`, recusando chaves vivas de
    /// outra categoria. O vínculo é atualizado conforme o resultado.
    fn bind<T>(
        &self,
        ctx: &CancellationToken,
        key: &str,
        category: Category,
        op: impl FnOnce() -> Result<T, StoreError>,
    ) -> SquallResult<T> {
        check(ctx)?;
        let shared = &self.shared;
        match shared.bindings.entry(key.to_string()) {
            Entry::Occupied(mut bound) => {
                let existing = *bound.get();
                if existing != category && shared.holds(existing, key) {
                    return Err(conflict(key, existing, category));
                }
                let out = op();
                if shared.holds(category, key) {
                    bound.insert(category);
                } else {
                    bound.remove();
                }
                Ok(out?)
            }
            Entry::Vacant(slot) => {
                let out = op();
                if shared.holds(category, key) {
                    slot.insert(category);
                }
                Ok(out?)
            }
        }
    }

    /// Leitura tipada: só falha por conflito se a chave estiver viva em outra
    /// categoria.
    fn guard_read<T>(
        &self,
        ctx: &CancellationToken,
        key: &str,
        category: Category,
        op: impl FnOnce() -> Result<T, StoreError>,
    ) -> SquallResult<T> {
        check(ctx)?;
        if let Some(bound) = self.shared.bindings.get(key) {
            let existing = *bound;
            if existing != category && self.shared.holds(existing, key) {
                return Err(conflict(key, existing, category));
            }
        }
        Ok(op()?)
    }

    fn bound(&self, key: &str) -> Option<Category> {
        self.shared.bindings.get(key).map(|c| *c)
    }
}

fn conflict(key: &str, existing: Category, requested: Category) -> SquallError {
    StoreError::TypeConflict {
        key: key.to_string(),
        existing,
        requested,
    }
    .into()
}

#[async_trait]
impl Common for Store {
    async fn del(&self, ctx: &CancellationToken, keys: &[&str]) -> SquallResult<usize> {
        check(ctx)?;
        let mut removed = 0;
        for key in keys {
            if let Entry::Occupied(bound) = self.shared.bindings.entry(key.to_string()) {
                removed += route!(self.shared, *bound.get(), store => store.del(ctx, &[*key])?);
                bound.remove();
            }
        }
        Ok(removed)
    }

    async fn exists(&self, ctx: &CancellationToken, keys: &[&str]) -> SquallResult<usize> {
        check(ctx)?;
        let mut found = 0;
        for key in keys {
            if let Some(category) = self.bound(key) {
                found += route!(self.shared, category, store => store.exists(ctx, &[*key])?);
            }
        }
        Ok(found)
    }

    async fn expire(
        &self,
        ctx: &CancellationToken,
        key: &str,
        ttl: Option<Duration>,
    ) -> SquallResult<bool> {
        check(ctx)?;
        match self.bound(key) {
            Some(category) => Ok(route!(self.shared, category, store => store.expire(ctx, key, ttl)?)),
            None => Ok(false),
        }
    }

    async fn expire_at(
        &self,
        ctx: &CancellationToken,
        key: &str,
        at: Option<SystemTime>,
    ) -> SquallResult<bool> {
        check(ctx)?;
        match self.bound(key) {
            Some(category) => {
                Ok(route!(self.shared, category, store => store.expire_at(ctx, key, at)?))
            }
            None => Ok(false),
        }
    }

    async fn persist(&self, ctx: &CancellationToken, key: &str) -> SquallResult<bool> {
        check(ctx)?;
        match self.bound(key) {
            Some(category) => Ok(route!(self.shared, category, store => store.persist(ctx, key)?)),
            None => Ok(false),
        }
    }

    async fn ttl(&self, ctx: &CancellationToken, key: &str) -> SquallResult<Duration> {
        check(ctx)?;
        match self.bound(key) {
            Some(category) => Ok(route!(self.shared, category, store => store.ttl(ctx, key)?)),
            None => Err(StoreError::NoValue.into()),
        }
    }
}

#[async_trait]
impl Strings for Store {
    async fn set<V>(
        &self,
        ctx: &CancellationToken,
        key: &str,
        value: &V,
        ttl: Option<Duration>,
    ) -> SquallResult<()>
    where
        V: Marshal + Sync + ?Sized,
    {
        self.bind(ctx, key, Category::String, || {
            self.shared.strings.set(ctx, key, value, ttl)
        })
    }

    async fn set_nx<V>(
        &self,
        ctx: &CancellationToken,
        key: &str,
        value: &V,
        ttl: Option<Duration>,
    ) -> SquallResult<bool>
    where
        V: Marshal + Sync + ?Sized,
    {
        self.bind(ctx, key, Category::String, || {
            self.shared.strings.set_nx(ctx, key, value, ttl)
        })
    }

    async fn get(&self, ctx: &CancellationToken, key: &str) -> SquallResult<String> {
        self.guard_read(ctx, key, Category::String, || {
            self.shared.strings.get(ctx, key)
        })
    }

    /// Chaves de outras categorias aparecem como ausentes.
    async fn mget(
        &self,
        ctx: &CancellationToken,
        keys: &[&str],
    ) -> SquallResult<Vec<Option<String>>> {
        check(ctx)?;
        Ok(self.shared.strings.mget(ctx, keys)?)
    }
}

#[async_trait]
impl Hashes for Store {
    async fn hset(&self, ctx: &CancellationToken, key: &str, pairs: &[&str]) -> SquallResult<usize> {
        self.bind(ctx, key, Category::Hash, || {
            self.shared.hashes.hset(ctx, key, pairs)
        })
    }

    async fn hset_nx(
        &self,
        ctx: &CancellationToken,
        key: &str,
        field: &str,
        value: &str,
    ) -> SquallResult<bool> {
        self.bind(ctx, key, Category::Hash, || {
            self.shared.hashes.hset_nx(ctx, key, field, value)
        })
    }

    async fn hexists(&self, ctx: &CancellationToken, key: &str, field: &str) -> SquallResult<bool> {
        self.guard_read(ctx, key, Category::Hash, || {
            self.shared.hashes.hexists(ctx, key, field)
        })
    }

    async fn hdel(
        &self,
        ctx: &CancellationToken,
        key: &str,
        fields: &[&str],
    ) -> SquallResult<usize> {
        self.bind(ctx, key, Category::Hash, || {
            self.shared.hashes.hdel(ctx, key, fields)
        })
    }

    async fn hget(&self, ctx: &CancellationToken, key: &str, field: &str) -> SquallResult<String> {
        self.guard_read(ctx, key, Category::Hash, || {
            self.shared.hashes.hget(ctx, key, field)
        })
    }

    async fn hmget(
        &self,
        ctx: &CancellationToken,
        key: &str,
        fields: &[&str],
    ) -> SquallResult<Vec<Option<String>>> {
        self.guard_read(ctx, key, Category::Hash, || {
            self.shared.hashes.hmget(ctx, key, fields)
        })
    }

    async fn hkeys(&self, ctx: &CancellationToken, key: &str) -> SquallResult<Vec<String>> {
        self.guard_read(ctx, key, Category::Hash, || {
            self.shared.hashes.hkeys(ctx, key)
        })
    }

    async fn hvals(&self, ctx: &CancellationToken, key: &str) -> SquallResult<Vec<String>> {
        self.guard_read(ctx, key, Category::Hash, || {
            self.shared.hashes.hvals(ctx, key)
        })
    }

    async fn hgetall(
        &self,
        ctx: &CancellationToken,
        key: &str,
    ) -> SquallResult<HashMap<String, String>> {
        self.guard_read(ctx, key, Category::Hash, || {
            self.shared.hashes.hgetall(ctx, key)
        })
    }

    async fn hlen(&self, ctx: &CancellationToken, key: &str) -> SquallResult<usize> {
        self.guard_read(ctx, key, Category::Hash, || {
            self.shared.hashes.hlen(ctx, key)
        })
    }
}

#[async_trait]
impl Lists for Store {
    async fn push(
        &self,
        ctx: &CancellationToken,
        key: &str,
        values: &[&str],
    ) -> SquallResult<usize> {
        self.bind(ctx, key, Category::List, || {
            self.shared.lists.push(ctx, key, values)
        })
    }

    async fn pop(&self, ctx: &CancellationToken, key: &str) -> SquallResult<String> {
        self.bind(ctx, key, Category::List, || self.shared.lists.pop(ctx, key))
    }

    async fn shift(&self, ctx: &CancellationToken, key: &str) -> SquallResult<String> {
        self.bind(ctx, key, Category::List, || self.shared.lists.shift(ctx, key))
    }

    async fn lrange(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<String>> {
        self.guard_read(ctx, key, Category::List, || {
            self.shared.lists.lrange(ctx, key, start, stop)
        })
    }

    async fn ltrim(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<()> {
        self.bind(ctx, key, Category::List, || {
            self.shared.lists.ltrim(ctx, key, start, stop)
        })
    }

    async fn llen(&self, ctx: &CancellationToken, key: &str) -> SquallResult<usize> {
        self.guard_read(ctx, key, Category::List, || self.shared.lists.llen(ctx, key))
    }
}

#[async_trait]
impl SortedSets for Store {
    async fn zadd(
        &self,
        ctx: &CancellationToken,
        key: &str,
        members: &[(&str, f64)],
    ) -> SquallResult<usize> {
        self.bind(ctx, key, Category::SortedSet, || {
            self.shared.zsets.zadd(ctx, key, members)
        })
    }

    async fn zcard(&self, ctx: &CancellationToken, key: &str) -> SquallResult<usize> {
        self.guard_read(ctx, key, Category::SortedSet, || {
            self.shared.zsets.zcard(ctx, key)
        })
    }

    async fn zscore(&self, ctx: &CancellationToken, key: &str, member: &str) -> SquallResult<f64> {
        self.guard_read(ctx, key, Category::SortedSet, || {
            self.shared.zsets.zscore(ctx, key, member)
        })
    }

    async fn zrank(
        &self,
        ctx: &CancellationToken,
        key: &str,
        member: &str,
    ) -> SquallResult<usize> {
        self.guard_read(ctx, key, Category::SortedSet, || {
            self.shared.zsets.zrank(ctx, key, member)
        })
    }

    async fn zrevrank(
        &self,
        ctx: &CancellationToken,
        key: &str,
        member: &str,
    ) -> SquallResult<usize> {
        self.guard_read(ctx, key, Category::SortedSet, || {
            self.shared.zsets.zrevrank(ctx, key, member)
        })
    }

    async fn zincrby(
        &self,
        ctx: &CancellationToken,
        key: &str,
        delta: f64,
        member: &str,
    ) -> SquallResult<f64> {
        self.bind(ctx, key, Category::SortedSet, || {
            self.shared.zsets.zincrby(ctx, key, delta, member)
        })
    }

    async fn zrange(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<String>> {
        self.guard_read(ctx, key, Category::SortedSet, || {
            self.shared.zsets.zrange(ctx, key, start, stop)
        })
    }

    async fn zrevrange(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<String>> {
        self.guard_read(ctx, key, Category::SortedSet, || {
            self.shared.zsets.zrevrange(ctx, key, start, stop)
        })
    }

    async fn zrange_with_scores(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<ScoredMember>> {
        self.guard_read(ctx, key, Category::SortedSet, || {
            self.shared.zsets.zrange_with_scores(ctx, key, start, stop)
        })
    }

    async fn zrevrange_with_scores(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<ScoredMember>> {
        self.guard_read(ctx, key, Category::SortedSet, || {
            self.shared.zsets.zrevrange_with_scores(ctx, key, start, stop)
        })
    }

    async fn zrange_by_score(
        &self,
        ctx: &CancellationToken,
        key: &str,
        min: &str,
        max: &str,
        offset: i64,
        count: i64,
    ) -> SquallResult<Vec<String>> {
        self.guard_read(ctx, key, Category::SortedSet, || {
            self.shared
                .zsets
                .zrange_by_score(ctx, key, min, max, offset, count)
        })
    }

    async fn zcount(
        &self,
        ctx: &CancellationToken,
        key: &str,
        min: &str,
        max: &str,
    ) -> SquallResult<usize> {
        self.guard_read(ctx, key, Category::SortedSet, || {
            self.shared.zsets.zcount(ctx, key, min, max)
        })
    }

    async fn zrem(
        &self,
        ctx: &CancellationToken,
        key: &str,
        members: &[&str],
    ) -> SquallResult<usize> {
        self.bind(ctx, key, Category::SortedSet, || {
            self.shared.zsets.zrem(ctx, key, members)
        })
    }

    async fn zrem_range_by_rank(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<usize> {
        self.bind(ctx, key, Category::SortedSet, || {
            self.shared.zsets.zrem_range_by_rank(ctx, key, start, stop)
        })
    }

    async fn zrem_range_by_score(
        &self,
        ctx: &CancellationToken,
        key: &str,
        min: &str,
        max: &str,
    ) -> SquallResult<usize> {
        self.bind(ctx, key, Category::SortedSet, || {
            self.shared.zsets.zrem_range_by_score(ctx, key, min, max)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn key_is_bound_to_one_category() {
        let store = Store::default();
        let ctx = CancellationToken::new();
        store.set(&ctx, "k", "v", None).await.unwrap();

        let err = store.push(&ctx, "k", &["x"]).await.unwrap_err();
        match err {
            SquallError::Store(StoreError::TypeConflict {
                existing,
                requested,
                ..
            }) => {
                assert_eq!(existing, Category::String);
                assert_eq!(requested, Category::List);
            }
            other => panic!("esperado TypeConflict, veio {other:?}"),
        }
        assert!(store.hget(&ctx, "k", "f").await.is_err());
        assert_eq!(store.llen(&ctx, "nada").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deleting_releases_the_binding() {
        let store = Store::default();
        let ctx = CancellationToken::new();
        store.hset(&ctx, "k", &["f", "v"]).await.unwrap();
        assert_eq!(store.type_of(&ctx, "k").unwrap(), Category::Hash);

        assert_eq!(store.del(&ctx, &["k", "ausente"]).await.unwrap(), 1);
        assert!(store.type_of(&ctx, "k").unwrap_err().is_no_value());

        store.push(&ctx, "k", &["a"]).await.unwrap();
        assert_eq!(store.type_of(&ctx, "k").unwrap(), Category::List);
    }

    #[tokio::test]
    async fn draining_a_list_releases_the_binding() {
        let store = Store::default();
        let ctx = CancellationToken::new();
        store.push(&ctx, "k", &["a"]).await.unwrap();
        assert_eq!(store.pop(&ctx, "k").await.unwrap(), "a");
        store.zadd(&ctx, "k", &[("m", 1.0)]).await.unwrap();
        assert_eq!(store.zscore(&ctx, "k", "m").await.unwrap(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_key_can_change_category() {
        let store = Store::default();
        let ctx = CancellationToken::new();
        store
            .set(&ctx, "k", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(20)).await;

        assert_eq!(store.hset(&ctx, "k", &["f", "v"]).await.unwrap(), 1);
        assert_eq!(store.type_of(&ctx, "k").unwrap(), Category::Hash);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_sweep_interval_is_accepted() {
        let store = Store::new(StoreConfig {
            sweep_interval: Duration::ZERO,
            ..Default::default()
        });
        let ctx = CancellationToken::new();
        store
            .set(&ctx, "k", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.exists(&ctx, &["k"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_binding() {
        let store = Store::default();
        let ctx = CancellationToken::new();
        assert!(store.hset(&ctx, "h", &["f1", "v1", "f2"]).await.is_err());
        assert!(store.type_of(&ctx, "h").is_err());
        store.set(&ctx, "h", &1u8, None).await.unwrap();
    }

    #[tokio::test]
    async fn common_ops_route_by_category() {
        let store = Store::default();
        let ctx = CancellationToken::new();
        store.set(&ctx, "s", "v", None).await.unwrap();
        store.zadd(&ctx, "z", &[("m", 1.0)]).await.unwrap();

        assert_eq!(store.exists(&ctx, &["s", "z", "x", "s"]).await.unwrap(), 3);
        assert!(store.expire(&ctx, "z", Some(Duration::from_secs(5))).await.unwrap());
        assert!(store.ttl(&ctx, "z").await.unwrap() <= Duration::from_secs(5));
        assert!(store.persist(&ctx, "z").await.unwrap());
        assert!(!store.expire(&ctx, "x", None).await.unwrap());
        assert!(store.ttl(&ctx, "x").await.unwrap_err().is_no_value());
    }

    #[tokio::test]
    async fn canceled_context_fails_before_binding() {
        let store = Store::default();
        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = store.set(&ctx, "k", "v", None).await.unwrap_err();
        assert!(matches!(err, SquallError::Store(StoreError::Canceled)));
        assert!(store.del(&ctx, &["k"]).await.is_err());
    }
}
