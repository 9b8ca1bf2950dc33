use squall_common::StoreError;

/// Converte índices lógicos (negativos contam do fim) num intervalo fechado
/// `[start, stop]` válido para uma sequência de tamanho `len`.
/// Intervalos vazios ou invertidos após o clamp viram `None`.
pub(crate) fn normalize(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Limite de score: `-inf`, `+inf`, `1.5` ou `(1.5` (exclusivo).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBound {
    pub value: f64,
    pub exclusive: bool,
}

impl ScoreBound {
    pub fn parse(raw: &str) -> Result<ScoreBound, StoreError> {
        let (exclusive, text) = match raw.strip_prefix('(') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let value = match text.to_ascii_lowercase().as_str() {
            "-inf" => f64::NEG_INFINITY,
            "+inf" | "inf" => f64::INFINITY,
            other => other
                .parse::<f64>()
                .map_err(|_| StoreError::BadArgument(format!("limite de score inválido: {raw}")))?,
        };
        if value.is_nan() {
            return Err(StoreError::BadArgument(format!("limite de score inválido: {raw}")));
        }
        Ok(ScoreBound { value, exclusive })
    }

    /// `score` satisfaz este limite como mínimo.
    pub fn admits_above(&self, score: f64) -> bool {
        if self.exclusive {
            score > self.value
        } else {
            score >= self.value
        }
    }

    /// `score` satisfaz este limite como máximo.
    pub fn admits_below(&self, score: f64) -> bool {
        if self.exclusive {
            score < self.value
        } else {
            score <= self.value
        }
    }
}
