use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use squall_common::{Category, StoreError};

use crate::config::StoreConfig;
use crate::expire::{Expirable, Expiration};
use crate::keyspace::{Keyspace, common_ops, live, live_mut, live_or_insert};
use crate::range::{ScoreBound, normalize};

/// Membro de um sorted set com seu score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

/// Ordem total: score crescente, empate desfeito pelo membro.
fn by_score_then_member(a: &ScoredMember, b: &ScoredMember) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| a.member.cmp(&b.member))
}

/// Sorted set: `ranked` guarda os membros já ordenados e `ranks` mapeia
/// membro → posição em `ranked`.
///
/// Invariante após qualquer mutação: `ranks[ranked[i].member] == i` e
/// `ranked` está ordenado por (score, membro).
#[derive(Debug)]
pub struct SortedSetValue {
    ranked: Vec<ScoredMember>,
    ranks: HashMap<String, usize>,
    expiration: Expiration,
}

impl Expirable for SortedSetValue {
    fn expiration(&self) -> &Expiration {
        &self.expiration
    }

    fn expiration_mut(&mut self) -> &mut Expiration {
        &mut self.expiration
    }
}

impl SortedSetValue {
    fn new(max: Duration) -> Self {
        Self {
            ranked: Vec::new(),
            ranks: HashMap::new(),
            expiration: Expiration::new(max),
        }
    }

    fn len(&self) -> usize {
        self.ranked.len()
    }

    fn rank(&self, member: &str) -> Option<usize> {
        self.ranks.get(member).copied()
    }

    fn score(&self, member: &str) -> Option<f64> {
        self.rank(member).map(|r| self.ranked[r].score)
    }

    /// Atualiza ou anexa sem reordenar. Retorna `true` se o membro é novo.
    fn upsert(&mut self, member: &str, score: f64) -> bool {
        let score = unsigned_zero(score);
        match self.rank(member) {
            Some(rank) => {
                self.ranked[rank].score = score;
                false
            }
            None => {
                self.ranks.insert(member.to_string(), self.ranked.len());
                self.ranked.push(ScoredMember {
                    member: member.to_string(),
                    score,
                });
                true
            }
        }
    }

    /// Reordena tudo e reatribui as posições 0..n-1.
    fn resort(&mut self) {
        self.ranked.sort_by(by_score_then_member);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.ranks.clear();
        for (rank, entry) in self.ranked.iter().enumerate() {
            self.ranks.insert(entry.member.clone(), rank);
        }
    }

    /// Posições cujo score cabe em `[min, max]`.
    fn score_window(&self, min: &ScoreBound, max: &ScoreBound) -> Range<usize> {
        let lo = self.ranked.partition_point(|e| !min.admits_above(e.score));
        let hi = self.ranked.partition_point(|e| max.admits_below(e.score));
        lo..hi.max(lo)
    }

    /// Remove um trecho contíguo de posições. A ordem relativa dos demais
    /// não muda, então basta reindexar.
    fn remove_window(&mut self, window: Range<usize>) -> usize {
        let removed = self.ranked.drain(window).count();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    fn slice(&self, start: i64, stop: i64) -> &[ScoredMember] {
        match normalize(self.len(), start, stop) {
            Some((start, stop)) => &self.ranked[start..=stop],
            None => &[],
        }
    }

    /// Mesmo que `slice`, com índices contados do maior score.
    fn rev_slice(&self, start: i64, stop: i64) -> impl Iterator<Item = &ScoredMember> {
        let len = self.len();
        let picked = normalize(len, start, stop)
            .map(|(start, stop)| &self.ranked[len - 1 - stop..=len - 1 - start])
            .unwrap_or(&[]);
        picked.iter().rev()
    }
}

/// `-0.0` e `0.0` empatam; guardar só o zero positivo mantém `total_cmp`
/// coerente com o desempate pelo membro.
fn unsigned_zero(score: f64) -> f64 {
    if score == 0.0 { 0.0 } else { score }
}

fn check_score(score: f64) -> Result<(), StoreError> {
    if score.is_nan() {
        return Err(StoreError::BadArgument("score não pode ser NaN".into()));
    }
    Ok(())
}

/// Store de sorted sets.
#[derive(Clone)]
pub struct SortedSetStore {
    space: Arc<Keyspace<SortedSetValue>>,
}

common_ops!(SortedSetStore);

impl SortedSetStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            space: Keyspace::spawn(
                Category::SortedSet,
                config.max_lifetime,
                config.sweep_interval,
            ),
        }
    }

    /// Membros existentes têm o score sobrescrito; novos são anexados. O set é
    /// reordenado uma única vez no fim. Retorna quantos membros são novos.
    pub fn zadd(
        &self,
        ctx: &CancellationToken,
        key: &str,
        members: &[(&str, f64)],
    ) -> Result<usize, StoreError> {
        if members.is_empty() {
            return Err(StoreError::BadArgument("zadd exige ao menos um membro".into()));
        }
        for (_, score) in members {
            check_score(*score)?;
        }
        let max = self.space.max_lifetime();
        let mut entries = self.space.write(ctx)?;
        let set = live_or_insert(&mut entries, key, || SortedSetValue::new(max));
        let added = members
            .iter()
            .filter(|(member, score)| set.upsert(member, *score))
            .count();
        set.resort();
        Ok(added)
    }

    pub fn zcard(&self, ctx: &CancellationToken, key: &str) -> Result<usize, StoreError> {
        let entries = self.space.read(ctx)?;
        Ok(live(&entries, key).map_or(0, SortedSetValue::len))
    }

    pub fn zscore(
        &self,
        ctx: &CancellationToken,
        key: &str,
        member: &str,
    ) -> Result<f64, StoreError> {
        let entries = self.space.read(ctx)?;
        live(&entries, key)
            .and_then(|set| set.score(member))
            .ok_or(StoreError::NoValue)
    }

    pub fn zrank(
        &self,
        ctx: &CancellationToken,
        key: &str,
        member: &str,
    ) -> Result<usize, StoreError> {
        let entries = self.space.read(ctx)?;
        live(&entries, key)
            .and_then(|set| set.rank(member))
            .ok_or(StoreError::NoValue)
    }

    /// Calculado a partir do rank: `maior_rank - rank`.
    pub fn zrevrank(
        &self,
        ctx: &CancellationToken,
        key: &str,
        member: &str,
    ) -> Result<usize, StoreError> {
        let entries = self.space.read(ctx)?;
        live(&entries, key)
            .and_then(|set| set.rank(member).map(|rank| set.len() - 1 - rank))
            .ok_or(StoreError::NoValue)
    }

    /// Cria o membro com score 0 se ausente. Retorna o novo score.
    pub fn zincrby(
        &self,
        ctx: &CancellationToken,
        key: &str,
        delta: f64,
        member: &str,
    ) -> Result<f64, StoreError> {
        check_score(delta)?;
        let max = self.space.max_lifetime();
        let mut entries = self.space.write(ctx)?;
        let current = live(&entries, key).and_then(|set| set.score(member));
        let score = unsigned_zero(current.unwrap_or(0.0) + delta);
        check_score(score)?;

        let set = live_or_insert(&mut entries, key, || SortedSetValue::new(max));
        set.upsert(member, score);
        set.resort();
        Ok(score)
    }

    pub fn zrange(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, StoreError> {
        self.read_set(ctx, key, |set| {
            set.slice(start, stop)
                .iter()
                .map(|e| e.member.clone())
                .collect()
        })
    }

    pub fn zrevrange(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, StoreError> {
        self.read_set(ctx, key, |set| {
            set.rev_slice(start, stop).map(|e| e.member.clone()).collect()
        })
    }

    pub fn zrange_with_scores(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<ScoredMember>, StoreError> {
        self.read_set(ctx, key, |set| set.slice(start, stop).to_vec())
    }

    pub fn zrevrange_with_scores(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<ScoredMember>, StoreError> {
        self.read_set(ctx, key, |set| set.rev_slice(start, stop).cloned().collect())
    }

    /// `offset` pula membros qualificados; `count <= 0` significa sem limite,
    /// exceto `count == 0` com `offset != 0`, que não devolve nada.
    pub fn zrange_by_score(
        &self,
        ctx: &CancellationToken,
        key: &str,
        min: &str,
        max: &str,
        offset: i64,
        count: i64,
    ) -> Result<Vec<String>, StoreError> {
        let (min, max) = (ScoreBound::parse(min)?, ScoreBound::parse(max)?);
        if offset < 0 {
            return Err(StoreError::BadArgument("offset negativo".into()));
        }
        if count == 0 && offset != 0 {
            return Ok(Vec::new());
        }
        let limit = if count > 0 { count as usize } else { usize::MAX };
        self.read_set(ctx, key, |set| {
            set.ranked[set.score_window(&min, &max)]
                .iter()
                .skip(offset as usize)
                .take(limit)
                .map(|e| e.member.clone())
                .collect()
        })
    }

    pub fn zcount(
        &self,
        ctx: &CancellationToken,
        key: &str,
        min: &str,
        max: &str,
    ) -> Result<usize, StoreError> {
        let (min, max) = (ScoreBound::parse(min)?, ScoreBound::parse(max)?);
        let entries = self.space.read(ctx)?;
        Ok(live(&entries, key).map_or(0, |set| set.score_window(&min, &max).len()))
    }

    pub fn zrem(
        &self,
        ctx: &CancellationToken,
        key: &str,
        members: &[&str],
    ) -> Result<usize, StoreError> {
        self.write_set(ctx, key, |set| {
            let before = set.len();
            set.ranked.retain(|e| !members.contains(&e.member.as_str()));
            let removed = before - set.len();
            if removed > 0 {
                set.reindex();
            }
            removed
        })
    }

    pub fn zrem_range_by_rank(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<usize, StoreError> {
        self.write_set(ctx, key, |set| match normalize(set.len(), start, stop) {
            Some((start, stop)) => set.remove_window(start..stop + 1),
            None => 0,
        })
    }

    pub fn zrem_range_by_score(
        &self,
        ctx: &CancellationToken,
        key: &str,
        min: &str,
        max: &str,
    ) -> Result<usize, StoreError> {
        let (min, max) = (ScoreBound::parse(min)?, ScoreBound::parse(max)?);
        self.write_set(ctx, key, |set| {
            let window = set.score_window(&min, &max);
            set.remove_window(window)
        })
    }

    fn read_set<T: Default>(
        &self,
        ctx: &CancellationToken,
        key: &str,
        read: impl FnOnce(&SortedSetValue) -> T,
    ) -> Result<T, StoreError> {
        let entries = self.space.read(ctx)?;
        Ok(live(&entries, key).map(read).unwrap_or_default())
    }

    /// Aplica uma remoção e apaga a chave se o set ficar vazio.
    fn write_set(
        &self,
        ctx: &CancellationToken,
        key: &str,
        remove: impl FnOnce(&mut SortedSetValue) -> usize,
    ) -> Result<usize, StoreError> {
        let mut entries = self.space.write(ctx)?;
        let Some(set) = live_mut(&mut entries, key) else {
            return Ok(0);
        };
        let removed = remove(set);
        if set.ranked.is_empty() {
            entries.remove(key);
        }
        Ok(removed)
    }

    #[cfg(test)]
    fn assert_invariants(&self, key: &str) {
        let entries = self.space.read(&CancellationToken::new()).unwrap();
        let Some(set) = entries.get(key) else {
            return;
        };
        assert_eq!(set.ranked.len(), set.ranks.len());
        for (i, entry) in set.ranked.iter().enumerate() {
            assert_eq!(set.ranks[&entry.member], i);
        }
        for pair in set.ranked.windows(2) {
            assert_eq!(by_score_then_member(&pair[0], &pair[1]), Ordering::Less);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn store() -> SortedSetStore {
        SortedSetStore::new(&StoreConfig::default())
    }

    fn seeded(store: &SortedSetStore, ctx: &CancellationToken) {
        store
            .zadd(
                ctx,
                "s",
                &[("A", 2.0), ("B", 1.0), ("C", 3.0), ("D", 4.0), ("E", 5.0)],
            )
            .unwrap();
    }

    #[tokio::test]
    async fn zrange_follows_score_order() {
        let store = store();
        let ctx = CancellationToken::new();
        seeded(&store, &ctx);
        assert_eq!(
            store.zrange(&ctx, "s", 0, -1).unwrap(),
            vec!["B", "A", "C", "D", "E"]
        );
        assert_eq!(store.zrevrange(&ctx, "s", 0, 1).unwrap(), vec!["E", "D"]);
        store.assert_invariants("s");
    }

    #[tokio::test]
    async fn negative_zero_ties_with_zero() {
        let store = store();
        let ctx = CancellationToken::new();
        store
            .zadd(&ctx, "s", &[("a", 0.0), ("b", -0.0)])
            .unwrap();
        assert_eq!(store.zrange(&ctx, "s", 0, -1).unwrap(), vec!["a", "b"]);

        store.zadd(&ctx, "s", &[("c", -0.0)]).unwrap();
        assert_eq!(store.zrange(&ctx, "s", 0, -1).unwrap(), vec!["a", "b", "c"]);
        assert!(store.zscore(&ctx, "s", "b").unwrap().is_sign_positive());
        store.assert_invariants("s");
    }

    #[tokio::test]
    async fn ties_break_by_member() {
        let store = store();
        let ctx = CancellationToken::new();
        store
            .zadd(&ctx, "s", &[("b", 1.0), ("c", 1.0), ("a", 1.0)])
            .unwrap();
        assert_eq!(store.zrange(&ctx, "s", 0, -1).unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn zadd_counts_new_members_and_overwrites_scores() {
        let store = store();
        let ctx = CancellationToken::new();
        seeded(&store, &ctx);
        assert_eq!(store.zadd(&ctx, "s", &[("A", 10.0), ("F", 0.5)]).unwrap(), 1);
        assert_eq!(store.zscore(&ctx, "s", "A").unwrap(), 10.0);
        assert_eq!(store.zrank(&ctx, "s", "F").unwrap(), 0);
        assert_eq!(store.zrank(&ctx, "s", "A").unwrap(), 5);
        assert_eq!(store.zrevrank(&ctx, "s", "A").unwrap(), 0);
        assert_eq!(store.zcard(&ctx, "s").unwrap(), 6);
        store.assert_invariants("s");
    }

    #[tokio::test]
    async fn missing_members_are_no_value() {
        let store = store();
        let ctx = CancellationToken::new();
        seeded(&store, &ctx);
        assert_eq!(store.zscore(&ctx, "s", "Z"), Err(StoreError::NoValue));
        assert_eq!(store.zrank(&ctx, "s", "Z"), Err(StoreError::NoValue));
        assert_eq!(store.zrevrank(&ctx, "nada", "A"), Err(StoreError::NoValue));
    }

    #[tokio::test]
    async fn zincrby_creates_and_moves_members() {
        let store = store();
        let ctx = CancellationToken::new();
        seeded(&store, &ctx);
        assert_eq!(store.zincrby(&ctx, "s", 2.5, "Z").unwrap(), 2.5);
        assert_eq!(store.zincrby(&ctx, "s", 10.0, "B").unwrap(), 11.0);
        assert_eq!(
            store.zrange(&ctx, "s", 0, -1).unwrap(),
            vec!["A", "Z", "C", "D", "E", "B"]
        );
        store.assert_invariants("s");
    }

    #[tokio::test]
    async fn nan_scores_are_rejected() {
        let store = store();
        let ctx = CancellationToken::new();
        assert!(matches!(
            store.zadd(&ctx, "s", &[("a", f64::NAN)]),
            Err(StoreError::BadArgument(_))
        ));
        store.zadd(&ctx, "s", &[("a", f64::INFINITY)]).unwrap();
        assert!(matches!(
            store.zincrby(&ctx, "s", f64::NEG_INFINITY, "a"),
            Err(StoreError::BadArgument(_))
        ));
        assert_eq!(store.zscore(&ctx, "s", "a").unwrap(), f64::INFINITY);
    }

    #[tokio::test]
    async fn range_by_score_with_bounds_offset_and_count() {
        let store = store();
        let ctx = CancellationToken::new();
        seeded(&store, &ctx);
        assert_eq!(
            store.zrange_by_score(&ctx, "s", "-inf", "+inf", 0, 0).unwrap(),
            vec!["B", "A", "C", "D", "E"]
        );
        assert_eq!(
            store.zrange_by_score(&ctx, "s", "(2", "4", 0, -1).unwrap(),
            vec!["C", "D"]
        );
        assert_eq!(
            store.zrange_by_score(&ctx, "s", "1", "5", 1, 2).unwrap(),
            vec!["A", "C"]
        );
        assert!(
            store
                .zrange_by_score(&ctx, "s", "1", "5", 2, 0)
                .unwrap()
                .is_empty()
        );
        assert!(matches!(
            store.zrange_by_score(&ctx, "s", "1", "5", -1, 1),
            Err(StoreError::BadArgument(_))
        ));
        assert!(matches!(
            store.zrange_by_score(&ctx, "s", "x", "5", 0, 1),
            Err(StoreError::BadArgument(_))
        ));
        assert_eq!(store.zcount(&ctx, "s", "(1", "(5").unwrap(), 3);
        assert_eq!(store.zcount(&ctx, "s", "4", "2").unwrap(), 0);
    }

    #[tokio::test]
    async fn with_scores_variants() {
        let store = store();
        let ctx = CancellationToken::new();
        seeded(&store, &ctx);
        let first = store.zrange_with_scores(&ctx, "s", 0, 0).unwrap();
        assert_eq!(
            first,
            vec![ScoredMember {
                member: "B".into(),
                score: 1.0
            }]
        );
        let last = store.zrevrange_with_scores(&ctx, "s", 0, 0).unwrap();
        assert_eq!(last[0].member, "E");
        assert_eq!(last[0].score, 5.0);
    }

    #[tokio::test]
    async fn removals_reindex_and_drop_empty_sets() {
        let store = store();
        let ctx = CancellationToken::new();
        seeded(&store, &ctx);

        assert_eq!(store.zrem(&ctx, "s", &["A", "Z"]).unwrap(), 1);
        assert_eq!(store.zrank(&ctx, "s", "C").unwrap(), 1);
        store.assert_invariants("s");

        assert_eq!(store.zrem_range_by_rank(&ctx, "s", 0, 1).unwrap(), 2);
        assert_eq!(store.zrange(&ctx, "s", 0, -1).unwrap(), vec!["D", "E"]);
        store.assert_invariants("s");

        assert_eq!(store.zrem_range_by_score(&ctx, "s", "-inf", "(5").unwrap(), 1);
        assert_eq!(store.zrem_range_by_score(&ctx, "s", "5", "5").unwrap(), 1);
        assert_eq!(store.exists(&ctx, &["s"]).unwrap(), 0);
        assert_eq!(store.zrem(&ctx, "s", &["E"]).unwrap(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(String, i32),
        Incr(String, i32),
        Rem(String),
        RemRank(i64, i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        let member = "[a-f]";
        prop_oneof![
            (member, -50i32..50).prop_map(|(m, s)| Op::Add(m, s)),
            (member, -5i32..5).prop_map(|(m, d)| Op::Incr(m, d)),
            member.prop_map(Op::Rem),
            (-4i64..4, -4i64..4).prop_map(|(a, b)| Op::RemRank(a, b)),
        ]
    }

    proptest! {
        #[test]
        fn order_and_ranks_hold_after_any_mutation(ops in prop::collection::vec(op(), 1..40)) {
            let store = store();
            let ctx = CancellationToken::new();
            for op in ops {
                match op {
                    Op::Add(m, s) => { store.zadd(&ctx, "s", &[(m.as_str(), s as f64)]).unwrap(); }
                    Op::Incr(m, d) => { store.zincrby(&ctx, "s", d as f64, &m).unwrap(); }
                    Op::Rem(m) => { store.zrem(&ctx, "s", &[m.as_str()]).unwrap(); }
                    Op::RemRank(a, b) => { store.zrem_range_by_rank(&ctx, "s", a, b).unwrap(); }
                }
                store.assert_invariants("s");

                let members = store.zrange(&ctx, "s", 0, -1).unwrap();
                for (i, member) in members.iter().enumerate() {
                    prop_assert_eq!(store.zrank(&ctx, "s", member).unwrap(), i);
                }
            }
        }
    }
}
