//! Interfaces de capacidade implementadas por qualquer backend.
//!
//! Toda operação recebe um `CancellationToken`; se ele já disparou, a operação
//! falha com `StoreError::Canceled` antes de tocar em qualquer estado.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use squall_common::SquallResult;

use crate::marshal::Marshal;
use crate::zset::ScoredMember;

#[async_trait]
pub trait Common: Send + Sync {
    async fn del(&self, ctx: &CancellationToken, keys: &[&str]) -> SquallResult<usize>;

    async fn exists(&self, ctx: &CancellationToken, keys: &[&str]) -> SquallResult<usize>;

    /// `ttl = None` mantém o prazo atual.
    async fn expire(
        &self,
        ctx: &CancellationToken,
        key: &str,
        ttl: Option<Duration>,
    ) -> SquallResult<bool>;

    /// `at = None` devolve a chave ao horizonte máximo.
    async fn expire_at(
        &self,
        ctx: &CancellationToken,
        key: &str,
        at: Option<SystemTime>,
    ) -> SquallResult<bool>;

    async fn persist(&self, ctx: &CancellationToken, key: &str) -> SquallResult<bool>;

    async fn ttl(&self, ctx: &CancellationToken, key: &str) -> SquallResult<Duration>;
}

#[async_trait]
pub trait Strings: Common {
    async fn set<V>(
        &self,
        ctx: &CancellationToken,
        key: &str,
        value: &V,
        ttl: Option<Duration>,
    ) -> SquallResult<()>
    where
        V: Marshal + Sync + ?Sized;

    async fn set_nx<V>(
        &self,
        ctx: &CancellationToken,
        key: &str,
        value: &V,
        ttl: Option<Duration>,
    ) -> SquallResult<bool>
    where
        V: Marshal + Sync + ?Sized;

    async fn get(&self, ctx: &CancellationToken, key: &str) -> SquallResult<String>;

    async fn mget(
        &self,
        ctx: &CancellationToken,
        keys: &[&str],
    ) -> SquallResult<Vec<Option<String>>>;
}

#[async_trait]
pub trait Hashes: Common {
    async fn hset(&self, ctx: &CancellationToken, key: &str, pairs: &[&str]) -> SquallResult<usize>;

    async fn hset_nx(
        &self,
        ctx: &CancellationToken,
        key: &str,
        field: &str,
        value: &str,
    ) -> SquallResult<bool>;

    async fn hexists(&self, ctx: &CancellationToken, key: &str, field: &str) -> SquallResult<bool>;

    async fn hdel(&self, ctx: &CancellationToken, key: &str, fields: &[&str])
    -> SquallResult<usize>;

    async fn hget(&self, ctx: &CancellationToken, key: &str, field: &str) -> SquallResult<String>;

    async fn hmget(
        &self,
        ctx: &CancellationToken,
        key: &str,
        fields: &[&str],
    ) -> SquallResult<Vec<Option<String>>>;

    async fn hkeys(&self, ctx: &CancellationToken, key: &str) -> SquallResult<Vec<String>>;

    async fn hvals(&self, ctx: &CancellationToken, key: &str) -> SquallResult<Vec<String>>;

    async fn hgetall(
        &self,
        ctx: &CancellationToken,
        key: &str,
    ) -> SquallResult<HashMap<String, String>>;

    async fn hlen(&self, ctx: &CancellationToken, key: &str) -> SquallResult<usize>;
}

#[async_trait]
pub trait Lists: Common {
    async fn push(&self, ctx: &CancellationToken, key: &str, values: &[&str])
    -> SquallResult<usize>;

    async fn pop(&self, ctx: &CancellationToken, key: &str) -> SquallResult<String>;

    async fn shift(&self, ctx: &CancellationToken, key: &str) -> SquallResult<String>;

    async fn lrange(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<String>>;

    async fn ltrim(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<()>;

    async fn llen(&self, ctx: &CancellationToken, key: &str) -> SquallResult<usize>;
}

#[async_trait]
pub trait SortedSets: Common {
    async fn zadd(
        &self,
        ctx: &CancellationToken,
        key: &str,
        members: &[(&str, f64)],
    ) -> SquallResult<usize>;

    async fn zcard(&self, ctx: &CancellationToken, key: &str) -> SquallResult<usize>;

    async fn zscore(&self, ctx: &CancellationToken, key: &str, member: &str) -> SquallResult<f64>;

    async fn zrank(&self, ctx: &CancellationToken, key: &str, member: &str)
    -> SquallResult<usize>;

    async fn zrevrank(
        &self,
        ctx: &CancellationToken,
        key: &str,
        member: &str,
    ) -> SquallResult<usize>;

    async fn zincrby(
        &self,
        ctx: &CancellationToken,
        key: &str,
        delta: f64,
        member: &str,
    ) -> SquallResult<f64>;

    async fn zrange(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<String>>;

    async fn zrevrange(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<String>>;

    async fn zrange_with_scores(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<ScoredMember>>;

    async fn zrevrange_with_scores(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<Vec<ScoredMember>>;

    async fn zrange_by_score(
        &self,
        ctx: &CancellationToken,
        key: &str,
        min: &str,
        max: &str,
        offset: i64,
        count: i64,
    ) -> SquallResult<Vec<String>>;

    async fn zcount(
        &self,
        ctx: &CancellationToken,
        key: &str,
        min: &str,
        max: &str,
    ) -> SquallResult<usize>;

    async fn zrem(&self, ctx: &CancellationToken, key: &str, members: &[&str])
    -> SquallResult<usize>;

    async fn zrem_range_by_rank(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> SquallResult<usize>;

    async fn zrem_range_by_score(
        &self,
        ctx: &CancellationToken,
        key: &str,
        min: &str,
        max: &str,
    ) -> SquallResult<usize>;
}
