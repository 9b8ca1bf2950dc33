use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use tokio::time::Instant;

/// Prazo de vida de um valor armazenado.
///
/// Todo valor nasce com o prazo no teto (`max`) a partir da criação; nenhum
/// valor vive para sempre. O flag `expired`, uma vez ligado, só é desligado por
/// `set_ttl`/`set_deadline`.
#[derive(Debug)]
pub struct Expiration {
    expire_at: Instant,
    expired: AtomicBool,
}

impl Expiration {
    pub fn new(max: Duration) -> Self {
        Self {
            expire_at: Instant::now() + max,
            expired: AtomicBool::new(false),
        }
    }

    /// Consulta o prazo. Não altera o instante de expiração.
    pub fn is_expired(&self) -> bool {
        if self.expired.load(Ordering::Relaxed) {
            return true;
        }
        if Instant::now() >= self.expire_at {
            self.expired.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// `None` mantém o prazo atual; `Some(ZERO)` volta ao teto; qualquer outro
    /// valor é limitado ao teto e conta a partir de agora.
    pub fn set_ttl(&mut self, ttl: Option<Duration>, max: Duration) {
        if let Some(ttl) = ttl {
            let ttl = if ttl.is_zero() { max } else { ttl.min(max) };
            self.expire_at = Instant::now() + ttl;
        }
        *self.expired.get_mut() = false;
    }

    /// `None` volta ao teto (persist). Instantes além do teto são rebaixados.
    pub fn set_deadline(&mut self, at: Option<SystemTime>, max: Duration) {
        let now = Instant::now();
        self.expire_at = match at {
            None => now + max,
            Some(at) => match at.duration_since(SystemTime::now()) {
                Ok(ahead) => now + ahead.min(max),
                Err(_) => now,
            },
        };
        *self.expired.get_mut() = false;
    }

    pub fn remaining(&self) -> Duration {
        self.expire_at.saturating_duration_since(Instant::now())
    }

    pub fn deadline(&self) -> Instant {
        self.expire_at
    }
}

/// Qualquer valor com prazo de vida.
pub trait Expirable {
    fn expiration(&self) -> &Expiration;
    fn expiration_mut(&mut self) -> &mut Expiration;

    fn is_expired(&self) -> bool {
        self.expiration().is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn fresh_value_is_capped_at_max() {
        let exp = Expiration::new(MAX);
        assert!(!exp.is_expired());
        assert!(exp.remaining() <= MAX);
        assert!(exp.remaining() > MAX - Duration::from_secs(1));
    }

    #[tokio::test]
    async fn keep_leaves_deadline_untouched() {
        let mut exp = Expiration::new(MAX);
        exp.set_ttl(Some(Duration::from_secs(5)), MAX);
        let before = exp.deadline();
        exp.set_ttl(None, MAX);
        assert_eq!(exp.deadline(), before);
    }

    #[tokio::test]
    async fn ttl_is_clamped_to_max() {
        let mut exp = Expiration::new(MAX);
        exp.set_ttl(Some(Duration::from_secs(3600)), MAX);
        assert!(exp.remaining() <= MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_is_sticky_until_reset() {
        let mut exp = Expiration::new(MAX);
        exp.set_ttl(Some(Duration::from_millis(10)), MAX);
        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(exp.is_expired());
        assert!(exp.is_expired());

        exp.set_ttl(Some(Duration::from_secs(1)), MAX);
        assert!(!exp.is_expired());
    }

    #[tokio::test]
    async fn deadline_in_the_past_expires_immediately() {
        let mut exp = Expiration::new(MAX);
        exp.set_deadline(Some(SystemTime::now() - Duration::from_secs(1)), MAX);
        assert!(exp.is_expired());
    }

    #[tokio::test]
    async fn deadline_beyond_max_is_clamped() {
        let mut exp = Expiration::new(MAX);
        exp.set_deadline(Some(SystemTime::now() + Duration::from_secs(86_400)), MAX);
        assert!(exp.remaining() <= MAX);
        assert!(!exp.is_expired());
    }

    #[tokio::test]
    async fn persist_resets_to_horizon() {
        let mut exp = Expiration::new(MAX);
        exp.set_ttl(Some(Duration::from_secs(1)), MAX);
        exp.set_deadline(None, MAX);
        assert!(exp.remaining() > Duration::from_secs(30));
    }
}
