use std::collections::VecDeque;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use squall_common::{Category, StoreError};

use crate::config::StoreConfig;
use crate::expire::{Expirable, Expiration};
use crate::keyspace::{Keyspace, common_ops, live, live_mut, live_or_insert};
use crate::range::normalize;

/// Lista onde o índice lógico 0 (a cabeça) é sempre o elemento empilhado por
/// último. A frente do deque é a cabeça.
#[derive(Debug)]
pub struct ListValue {
    items: VecDeque<String>,
    expiration: Expiration,
}

impl Expirable for ListValue {
    fn expiration(&self) -> &Expiration {
        &self.expiration
    }

    fn expiration_mut(&mut self) -> &mut Expiration {
        &mut self.expiration
    }
}

/// Store de listas.
#[derive(Clone)]
pub struct ListStore {
    space: Arc<Keyspace<ListValue>>,
}

common_ops!(ListStore);

impl ListStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            space: Keyspace::spawn(Category::List, config.max_lifetime, config.sweep_interval),
        }
    }

    /// Empilha na cabeça, na ordem recebida. Retorna o novo tamanho.
    pub fn push(
        &self,
        ctx: &CancellationToken,
        key: &str,
        values: &[&str],
    ) -> Result<usize, StoreError> {
        if values.is_empty() {
            return Err(StoreError::BadArgument("push exige ao menos um valor".into()));
        }
        let max = self.space.max_lifetime();
        let mut entries = self.space.write(ctx)?;
        let list = live_or_insert(&mut entries, key, || ListValue {
            items: VecDeque::with_capacity(values.len()),
            expiration: Expiration::new(max),
        });
        for value in values {
            list.items.push_front(value.to_string());
        }
        Ok(list.items.len())
    }

    /// Remove o elemento mais antigo (a cauda lógica).
    pub fn pop(&self, ctx: &CancellationToken, key: &str) -> Result<String, StoreError> {
        self.take(ctx, key, VecDeque::pop_back)
    }

    /// Remove o elemento mais recente (a cabeça lógica).
    pub fn shift(&self, ctx: &CancellationToken, key: &str) -> Result<String, StoreError> {
        self.take(ctx, key, VecDeque::pop_front)
    }

    /// Índices lógicos inclusivos; negativos contam da cauda.
    pub fn lrange(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, StoreError> {
        let entries = self.space.read(ctx)?;
        let Some(list) = live(&entries, key) else {
            return Ok(Vec::new());
        };
        Ok(match normalize(list.items.len(), start, stop) {
            Some((start, stop)) => list.items.range(start..=stop).cloned().collect(),
            None => Vec::new(),
        })
    }

    /// Mantém só o trecho selecionado; a chave some se o trecho for vazio.
    pub fn ltrim(
        &self,
        ctx: &CancellationToken,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<(), StoreError> {
        let mut entries = self.space.write(ctx)?;
        let Some(list) = live_mut(&mut entries, key) else {
            return Ok(());
        };
        match normalize(list.items.len(), start, stop) {
            Some((start, stop)) => {
                list.items.truncate(stop + 1);
                list.items.drain(..start);
            }
            None => {
                entries.remove(key);
            }
        }
        Ok(())
    }

    pub fn llen(&self, ctx: &CancellationToken, key: &str) -> Result<usize, StoreError> {
        let entries = self.space.read(ctx)?;
        Ok(live(&entries, key).map_or(0, |l| l.items.len()))
    }

    fn take(
        &self,
        ctx: &CancellationToken,
        key: &str,
        pick: fn(&mut VecDeque<String>) -> Option<String>,
    ) -> Result<String, StoreError> {
        let mut entries = self.space.write(ctx)?;
        let list = live_mut(&mut entries, key).ok_or(StoreError::NoValue)?;
        let value = pick(&mut list.items).ok_or(StoreError::NoValue)?;
        if list.items.is_empty() {
            entries.remove(key);
        }
        Ok(value)
    }
}
