use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use squall_common::{Category, SquallResult};
use squall_protocol::{Action, Mutation};
use squall_storage::{Common, Hashes, Lists, Marshal, ScoredMember, SortedSets, Store, Strings};

use crate::dispatch::{decode_count, decode_flag, decode_score, encode_instant, encode_ttl};
use crate::syncer::Syncer;

/// Store com cluster: leituras vão à store local, mutações passam pelo
/// [`Syncer`] (aplicadas no líder e replicadas aos seguidores).
///
/// Num seguidor a escrita só aparece localmente quando a replicação do líder
/// chega.
#[derive(Clone)]
pub struct ClusterStore {
    syncer: Syncer,
}

impl ClusterStore {
    pub fn new(syncer: Syncer) -> Self {
        Self { syncer }
    }

    pub fn syncer(&self) -> &Syncer {
        &self.syncer
    }

    fn local(&self) -> &Store {
        self.syncer.store()
    }

    pub fn type_of(&self, ctx: &CancellationToken, key: &str) -> SquallResult<Category> {
        self.local().type_of(ctx, key)
    }

    async fn submit(
        &self,
        ctx: &CancellationToken,
        action: Action,
        values: Vec<String>,
    ) -> SquallResult<String> {
        self.syncer.submit(ctx, Mutation::new(action, values)).await
    }
}

fn owned(key: &str, rest: &[&str]) -> Vec<String> {
    std::iter::once(key)
        .chain(rest.iter().copied())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl Common for ClusterStore {
    async fn del(&self, ctx: &CancellationToken, keys: &[&str]) -> SquallResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let values = keys.iter().map(|k| k.to_string()).collect();
        decode_count(&self.submit(ctx, Action::Del, values).await?)
    }

    async fn exists(&self, ctx: &CancellationToken, keys: &[&str]) -> SquallResult<usize> {
        self.local().exists(ctx, keys).await
    }

    async fn expire(
        &self,
        ctx: &CancellationToken,
        key: &str,
        ttl: Option<Duration>,
    ) -> SquallResult<bool> {
        let values = vec![key.to_string(), encode_ttl(ttl)];
        decode_flag(&self.submit(ctx, Action::Expire, values).await?)
    }

    async fn expire_at(
        &self,
        ctx: &CancellationToken,
        key: &str,
        at: Option<SystemTime>,
    ) -> SquallResult<bool> {
        let values = vec![key.to_string(), encode_instant(at)];
        decode_flag(&self.submit(ctx, Action::ExpireAt, values).await?)
    }

    async fn persist(&self, ctx: &CancellationToken, key: &str) -> SquallResult<bool> {
        decode_flag(&self.submit(ctx, Action::Persist, vec![key.to_string()]).await?)
    }

    async fn ttl(&self, ctx: &CancellationToken, key: &str) -> SquallResult<Duration> {
        self.local().ttl(ctx, key).await
    }
}

#[async_trait]
impl Strings for ClusterStore {
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
        let values = vec![key.to_string(), value.marshal()?, encode_ttl(ttl)];
        self.submit(ctx, Action::Set, values).await?;
        Ok(())
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
        let values = vec![key.to_string(), value.marshal()?, encode_ttl(ttl)];
        decode_flag(&self.submit(ctx, Action::SetNx, values).await?)
    }

    async fn get(&self, ctx: &CancellationToken, key: &str) -> SquallResult<String> {
        self.local().get(ctx, key).await
    }

    async fn mget(
        &self,
        ctx: &CancellationToken,
        keys: &[&str],
    ) -> SquallResult<Vec<Option<String>>> {
        self.local().mget(ctx, keys).await
    }
}

#[async_trait]
impl Hashes for ClusterStore {
    async fn hset(&self, ctx: &CancellationToken, key: &str, pairs: &[&str]) -> SquallResult<usize> {
        decode_count(&self.submit(ctx, Action::HSet, owned(key, pairs)).await?)
    }

    async fn hset_nx(
        &self,
        ctx: &CancellationToken,
        key: &str,
        field: &str,
        value: &str,
    ) -> SquallResult<bool> {
        let values = owned(key, &[field, value]);
        decode_flag(&self.submit(ctx, Action::HSetNx, values).await?)
    }

    async fn hexists(&self, ctx: &CancellationToken, key: &str, field: &str) -> SquallResult<bool> {
        self.local().hexists(ctx, key, field).await
    }

    async fn hdel(
        &self,
        ctx: &CancellationToken,
        key: &str,
        fields: &[&str],
    ) -> SquallResult<usize> {
        decode_count(&self.submit(ctx, Action::HDel, owned(key, fields)).await?)
    }

    async fn hget(&self, ctx: &CancellationToken, key: &str, field: &str) -> SquallResult<String> {
        self.local().hget(ctx, key, field).await
    }

    async fn hmget(
        &self,
        ctx: &CancellationToken,
        key: &str,
        fields: &[&str],
    ) -> SquallResult<Vec<Option<String>>> {
        self.local().hmget(ctx, key, fields).await
    }

    async fn hkeys(&self, ctx: &CancellationToken, key: &str) -> SquallResult<Vec<String>> {
        self.local().hkeys(ctx, key).await
    }

    async fn hvals(&self, ctx: &CancellationToken, key: &str) -> SquallResult<Vec<String>> {
        self.local().hvals(ctx, key).await
    }

    async fn hgetall(
        &self,
        ctx: &CancellationToken,
        key: &str,
    ) -> SquallResult<HashMap<String, String>> {
        self.local().hgetall(ctx, key).await
    }

    async fn hlen(&self, ctx: &CancellationToken, key: &str) -> SquallResult<usize> {
        self.local().hlen(ctx, key).await
    }
}

#[async_trait]
impl Lists for ClusterStore {
    async fn push(
        &self,
        ctx: &CancellationToken,
        key: &str,
        values: &[&str],
    ) -> SquallResult<usize> {
        decode_count(&self.submit(ctx, Action::Push, owned(key, values)).await?)
    }

    async fn pop(&self, ctx: &CancellationToken, key: &str) -> SquallResult<String> {
        self.submit(ctx, Action::Pop, vec![key.to_string()]).await
    }

    async fn shift(&self, ctx: &CancellationToken, key: &str) -> SquallResult<String> {
        self.submit(ctx, Action::Shift, vec![key.to_string()]).await
    }

    async fn lrange(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<String>> {
        self.local().lrange(ctx, key, start, stop).await
    }

    async fn ltrim(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<()> {
        let values = vec![key.to_string(), start.to_string(), stop.to_string()];
        self.submit(ctx, Action::Trim, values).await?;
        Ok(())
    }

    async fn llen(&self, ctx: &CancellationToken, key: &str) -> SquallResult<usize> {
        self.local().llen(ctx, key).await
    }
}

#[async_trait]
impl SortedSets for ClusterStore {
    async fn zadd(
        &self,
        ctx: &CancellationToken,
        key: &str,
        members: &[(&str, f64)],
    ) -> SquallResult<usize> {
        let mut values = Vec::with_capacity(1 + members.len() * 2);
        values.push(key.to_string());
        for (member, score) in members {
            values.push(member.to_string());
            values.push(score.to_string());
        }
        decode_count(&self.submit(ctx, Action::ZAdd, values).await?)
    }

    async fn zcard(&self, ctx: &CancellationToken, key: &str) -> SquallResult<usize> {
        self.local().zcard(ctx, key).await
    }

    async fn zscore(&self, ctx: &CancellationToken, key: &str, member: &str) -> SquallResult<f64> {
        self.local().zscore(ctx, key, member).await
    }

    async fn zrank(&self, ctx: &CancellationToken, key: &str, member: &str) -> SquallResult<usize> {
        self.local().zrank(ctx, key, member).await
    }

    async fn zrevrank(
        &self,
        ctx: &CancellationToken,
        key: &str,
        member: &str,
    ) -> SquallResult<usize> {
        self.local().zrevrank(ctx, key, member).await
    }

    async fn zincrby(
        &self,
        ctx: &CancellationToken,
        key: &str,
        delta: f64,
        member: &str,
    ) -> SquallResult<f64> {
        let values = vec![key.to_string(), delta.to_string(), member.to_string()];
        decode_score(&self.submit(ctx, Action::ZIncrBy, values).await?)
    }

    async fn zrange(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<String>> {
        self.local().zrange(ctx, key, start, stop).await
    }

    async fn zrevrange(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<String>> {
        self.local().zrevrange(ctx, key, start, stop).await
    }

    async fn zrange_with_scores(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<ScoredMember>> {
        self.local().zrange_with_scores(ctx, key, start, stop).await
    }

    async fn zrevrange_with_scores(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<ScoredMember>> {
        self.local().zrevrange_with_scores(ctx, key, start, stop).await
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
        self.local()
            .zrange_by_score(ctx, key, min, max, offset, count)
            .await
    }

    async fn zcount(
        &self,
        ctx: &CancellationToken,
        key: &str,
        min: &str,
        max: &str,
    ) -> SquallResult<usize> {
        self.local().zcount(ctx, key, min, max).await
    }

    async fn zrem(
        &self,
        ctx: &CancellationToken,
        key: &str,
        members: &[&str],
    ) -> SquallResult<usize> {
        decode_count(&self.submit(ctx, Action::ZRem, owned(key, members)).await?)
    }

    async fn zrem_range_by_rank(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<usize> {
        let values = vec![key.to_string(), start.to_string(), stop.to_string()];
        decode_count(&self.submit(ctx, Action::ZRemRangeByRank, values).await?)
    }

    async fn zrem_range_by_score(
        &self,
        ctx: &CancellationToken,
        key: &str,
        min: &str,
        max: &str,
    ) -> SquallResult<usize> {
        let values = owned(key, &[min, max]);
        decode_count(&self.submit(ctx, Action::ZRemRangeByScore, values).await?)
    }
}
