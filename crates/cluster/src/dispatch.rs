//! Tabela única de despacho das mutações replicáveis.
//!
//! Os argumentos chegam como texto: TTLs em milissegundos (`""` mantém o prazo
//! atual), instantes em milissegundos Unix (`""` volta ao horizonte) e scores
//! como floats decimais.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use squall_common::{SquallResult, StoreError};
use squall_protocol::{Action, Mutation};
use squall_storage::{Common, Hashes, Lists, SortedSets, Store, Strings};

/// Aplica `mutation` na store local e devolve o resultado em texto.
pub(crate) async fn apply(
    store: &Store,
    ctx: &CancellationToken,
    mutation: &Mutation,
) -> SquallResult<String> {
    let values = &mutation.values;
    let key = arg(mutation, 0)?;
    debug!(action = %mutation.action, key, "aplicando mutação");

    let result = match mutation.action {
        Action::Del => {
            let keys: Vec<&str> = values.iter().map(String::as_str).collect();
            store.del(ctx, &keys).await?.to_string()
        }
        Action::Expire => {
            let ttl = decode_ttl(arg(mutation, 1)?)?;
            flag(store.expire(ctx, key, ttl).await?)
        }
        Action::ExpireAt => {
            let at = decode_instant(arg(mutation, 1)?)?;
            flag(store.expire_at(ctx, key, at).await?)
        }
        Action::Persist => flag(store.persist(ctx, key).await?),
        Action::Set => {
            let ttl = decode_ttl(arg(mutation, 2)?)?;
            store.set(ctx, key, arg(mutation, 1)?, ttl).await?;
            "OK".to_string()
        }
        Action::SetNx => {
            let ttl = decode_ttl(arg(mutation, 2)?)?;
            flag(store.set_nx(ctx, key, arg(mutation, 1)?, ttl).await?)
        }
        Action::HDel => store.hdel(ctx, key, &rest(mutation)).await?.to_string(),
        Action::HSet => store.hset(ctx, key, &rest(mutation)).await?.to_string(),
        Action::HSetNx => {
            let (field, value) = (arg(mutation, 1)?, arg(mutation, 2)?);
            flag(store.hset_nx(ctx, key, field, value).await?)
        }
        Action::Push => store.push(ctx, key, &rest(mutation)).await?.to_string(),
        Action::Pop => store.pop(ctx, key).await?,
        Action::Shift => store.shift(ctx, key).await?,
        Action::Trim => {
            let (start, stop) = (int(arg(mutation, 1)?)?, int(arg(mutation, 2)?)?);
            store.ltrim(ctx, key, start, stop).await?;
            "OK".to_string()
        }
        Action::ZAdd => {
            let pairs = rest(mutation);
            if pairs.is_empty() || pairs.len() % 2 != 0 {
                return Err(bad("zadd espera pares membro/score").into());
            }
            let members = pairs
                .chunks(2)
                .map(|pair| Ok((pair[0], float(pair[1])?)))
                .collect::<Result<Vec<_>, StoreError>>()?;
            store.zadd(ctx, key, &members).await?.to_string()
        }
        Action::ZIncrBy => {
            let delta = float(arg(mutation, 1)?)?;
            store
                .zincrby(ctx, key, delta, arg(mutation, 2)?)
                .await?
                .to_string()
        }
        Action::ZRem => store.zrem(ctx, key, &rest(mutation)).await?.to_string(),
        Action::ZRemRangeByRank => {
            let (start, stop) = (int(arg(mutation, 1)?)?, int(arg(mutation, 2)?)?);
            store
                .zrem_range_by_rank(ctx, key, start, stop)
                .await?
                .to_string()
        }
        Action::ZRemRangeByScore => {
            let (min, max) = (arg(mutation, 1)?, arg(mutation, 2)?);
            store
                .zrem_range_by_score(ctx, key, min, max)
                .await?
                .to_string()
        }
    };
    Ok(result)
}

fn bad(message: impl Into<String>) -> StoreError {
    StoreError::BadArgument(message.into())
}

fn arg(mutation: &Mutation, index: usize) -> Result<&str, StoreError> {
    mutation
        .values
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| bad(format!("{}: argumento {index} ausente", mutation.action)))
}

fn rest(mutation: &Mutation) -> Vec<&str> {
    mutation.values.iter().skip(1).map(String::as_str).collect()
}

fn int(raw: &str) -> Result<i64, StoreError> {
    raw.parse()
        .map_err(|_| bad(format!("inteiro inválido: {raw:?}")))
}

fn float(raw: &str) -> Result<f64, StoreError> {
    raw.parse()
        .map_err(|_| bad(format!("score inválido: {raw:?}")))
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn decode_ttl(raw: &str) -> Result<Option<Duration>, StoreError> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<u64>()
        .map(|ms| Some(Duration::from_millis(ms)))
        .map_err(|_| bad(format!("ttl inválido: {raw:?}")))
}

fn decode_instant(raw: &str) -> Result<Option<SystemTime>, StoreError> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<u64>()
        .ok()
        .and_then(|ms| UNIX_EPOCH.checked_add(Duration::from_millis(ms)))
        .map(Some)
        .ok_or_else(|| bad(format!("instante inválido: {raw:?}")))
}

/// TTL em milissegundos; frações abaixo de 1 ms arredondam para 1 e valores
/// além de `u64::MAX` ms saturam (a store corta no tempo de vida máximo).
pub(crate) fn encode_ttl(ttl: Option<Duration>) -> String {
    match ttl {
        None => String::new(),
        Some(ttl) if !ttl.is_zero() && ttl < Duration::from_millis(1) => "1".to_string(),
        Some(ttl) => saturating_millis(ttl).to_string(),
    }
}

fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Instantes anteriores à época Unix viram 0.
pub(crate) fn encode_instant(at: Option<SystemTime>) -> String {
    match at {
        None => String::new(),
        Some(at) => at
            .duration_since(UNIX_EPOCH)
            .map(saturating_millis)
            .unwrap_or(0)
            .to_string(),
    }
}

pub(crate) fn decode_flag(raw: &str) -> SquallResult<bool> {
    match raw {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(bad(format!("flag inválida: {other:?}")).into()),
    }
}

pub(crate) fn decode_count(raw: &str) -> SquallResult<usize> {
    raw.parse()
        .map_err(|_| bad(format!("contagem inválida: {raw:?}")).into())
}

pub(crate) fn decode_score(raw: &str) -> SquallResult<f64> {
    Ok(float(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use squall_common::SquallError;

    fn mutation(action: Action, values: &[&str]) -> Mutation {
        Mutation::new(action, values.iter().map(|v| v.to_string()).collect())
    }

    #[tokio::test]
    async fn applies_each_category() {
        let store = Store::default();
        let ctx = CancellationToken::new();

        let ok = apply(&store, &ctx, &mutation(Action::Set, &["s", "v", ""])).await;
        assert_eq!(ok.unwrap(), "OK");
        assert_eq!(store.get(&ctx, "s").await.unwrap(), "v");

        let hset = mutation(Action::HSet, &["h", "f1", "v1", "f2", "v2"]);
        assert_eq!(apply(&store, &ctx, &hset).await.unwrap(), "2");

        apply(&store, &ctx, &mutation(Action::Push, &["l", "0", "1", "2"]))
            .await
            .unwrap();
        let shifted = apply(&store, &ctx, &mutation(Action::Shift, &["l"])).await;
        assert_eq!(shifted.unwrap(), "2");
        let popped = apply(&store, &ctx, &mutation(Action::Pop, &["l"])).await;
        assert_eq!(popped.unwrap(), "0");

        let zadd = mutation(Action::ZAdd, &["z", "a", "2", "b", "1"]);
        assert_eq!(apply(&store, &ctx, &zadd).await.unwrap(), "2");
        let score = apply(&store, &ctx, &mutation(Action::ZIncrBy, &["z", "1.5", "b"])).await;
        assert_eq!(score.unwrap(), "2.5");
        assert_eq!(store.zrange(&ctx, "z", 0, -1).await.unwrap(), vec!["a", "b"]);

        let removed = apply(&store, &ctx, &mutation(Action::Del, &["s", "h", "missing"])).await;
        assert_eq!(removed.unwrap(), "2");
    }

    #[tokio::test]
    async fn set_nx_and_expire_report_flags() {
        let store = Store::default();
        let ctx = CancellationToken::new();

        let first = apply(&store, &ctx, &mutation(Action::SetNx, &["k", "a", "5000"])).await;
        assert_eq!(first.unwrap(), "1");
        let second = apply(&store, &ctx, &mutation(Action::SetNx, &["k", "b", ""])).await;
        assert_eq!(second.unwrap(), "0");

        let missing = apply(&store, &ctx, &mutation(Action::Expire, &["nope", "100"])).await;
        assert_eq!(missing.unwrap(), "0");
        let persisted = apply(&store, &ctx, &mutation(Action::Persist, &["k"])).await;
        assert_eq!(persisted.unwrap(), "1");
    }

    #[tokio::test]
    async fn malformed_arguments_are_rejected() {
        let store = Store::default();
        let ctx = CancellationToken::new();

        let odd = apply(&store, &ctx, &mutation(Action::ZAdd, &["z", "a", "1", "b"])).await;
        assert!(matches!(
            odd,
            Err(SquallError::Store(StoreError::BadArgument(_)))
        ));

        let score = apply(&store, &ctx, &mutation(Action::ZAdd, &["z", "a", "alto"])).await;
        assert!(matches!(
            score,
            Err(SquallError::Store(StoreError::BadArgument(_)))
        ));

        let ttl = apply(&store, &ctx, &mutation(Action::Set, &["k", "v", "-5"])).await;
        assert!(ttl.is_err());
        assert_eq!(store.exists(&ctx, &["k", "z"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn misses_surface_as_no_value() {
        let store = Store::default();
        let ctx = CancellationToken::new();
        let err = apply(&store, &ctx, &mutation(Action::Pop, &["vazia"]))
            .await
            .unwrap_err();
        assert!(err.is_no_value());
    }

    #[test]
    fn ttl_encoding_rounds_sub_millisecond_up() {
        assert_eq!(encode_ttl(None), "");
        assert_eq!(encode_ttl(Some(Duration::ZERO)), "0");
        assert_eq!(encode_ttl(Some(Duration::from_micros(10))), "1");
        assert_eq!(encode_ttl(Some(Duration::from_secs(2))), "2000");
        assert_eq!(decode_ttl("2000").unwrap(), Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn huge_ttls_saturate_and_are_capped_by_the_store() {
        let store = Store::default();
        let ctx = CancellationToken::new();
        assert_eq!(encode_ttl(Some(Duration::MAX)), u64::MAX.to_string());
        apply(&store, &ctx, &mutation(Action::Set, &["k", "v", ""]))
            .await
            .unwrap();

        let raw = encode_ttl(Some(Duration::MAX));
        let expired = apply(&store, &ctx, &mutation(Action::Expire, &["k", &raw])).await;
        assert_eq!(expired.unwrap(), "1");
        assert!(store.ttl(&ctx, "k").await.unwrap() <= squall_common::MAX_LIFETIME);

        let raw = encode_instant(Some(UNIX_EPOCH + Duration::from_secs(u64::MAX / 4)));
        let at = apply(&store, &ctx, &mutation(Action::ExpireAt, &["k", &raw])).await;
        assert_eq!(at.unwrap(), "1");
    }

    #[test]
    fn instants_out_of_range_are_rejected() {
        assert!(decode_instant("99999999999999999999999").is_err());
        assert!(decode_instant("-1").is_err());
    }

    #[test]
    fn instants_travel_as_unix_millis() {
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let raw = encode_instant(Some(at));
        assert_eq!(raw, "1700000000123");
        assert_eq!(decode_instant(&raw).unwrap(), Some(at));
        assert_eq!(decode_instant("").unwrap(), None);
    }
}
