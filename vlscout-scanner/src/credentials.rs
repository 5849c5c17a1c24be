//! Rotating pool of API tokens, each with its own throttle window.

use reqwest::header::HeaderMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::debug;

/// A token handed out by [`CredentialPool::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub index: usize,
    pub token: String,
}

#[derive(Debug)]
struct Slot {
    token: String,
    reset_at: Instant,
}

#[derive(Debug)]
pub struct CredentialPool {
    slots: Mutex<Vec<Slot>>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Instant::now();
        let slots = tokens
            .into_iter()
            .map(Into::into)
            .map(|t: String| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(|token| Slot { token, reset_at: now })
            .collect();

        Self {
            slots: Mutex::new(slots),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::<String>::new())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick the next credential whose throttle window has passed, round-robin.
    ///
    /// When every credential is throttled the one that resets first is returned
    /// anyway, so the next throttling response refreshes its reset time.
    pub fn acquire(&self) -> Option<Credential> {
        let slots = self.lock();
        let n = slots.len();
        if n == 0 {
            return None;
        }

        let now = Instant::now();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % n;

        for offset in 0..n {
            let index = (start + offset) % n;
            if slots[index].reset_at <= now {
                return Some(Credential {
                    index,
                    token: slots[index].token.clone(),
                });
            }
        }

        let (index, slot) = slots
            .iter()
            .enumerate()
            .min_by_key(|(_, slot)| slot.reset_at)?;
        debug!("All {} credentials throttled, reusing #{}", n, index);
        Some(Credential {
            index,
            token: slot.token.clone(),
        })
    }

    /// Exclude `credential` from selection for `cooldown`.
    pub fn mark_throttled(&self, credential: &Credential, cooldown: Duration) {
        let mut slots = self.lock();
        if let Some(slot) = slots.get_mut(credential.index) {
            let reset_at = Instant::now() + cooldown;
            if reset_at > slot.reset_at {
                slot.reset_at = reset_at;
            }
            debug!("Credential #{} throttled for {:?}", credential.index, cooldown);
        }
    }

    /// Number of credentials usable right now.
    pub fn available(&self) -> usize {
        let now = Instant::now();
        self.lock().iter().filter(|s| s.reset_at <= now).count()
    }

    /// Time until the earliest credential becomes usable (zero if one already is).
    pub fn next_reset(&self) -> Option<Duration> {
        let now = Instant::now();
        self.lock()
            .iter()
            .map(|s| s.reset_at.saturating_duration_since(now))
            .min()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for CredentialPool {
    fn default() -> Self {
        Self::empty()
    }
}

/// Cooldown advertised by a throttling response.
///
/// Reads `Retry-After` (seconds) first, then `X-RateLimit-Reset` (epoch
/// seconds), and falls back to `default`. The result is capped at `max`.
pub fn cooldown_from_headers(headers: &HeaderMap, default: Duration, max: Duration) -> Duration {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };

    let cooldown = if let Some(secs) = header("retry-after") {
        Duration::from_secs(secs)
    } else if let Some(reset_epoch) = header("x-ratelimit-reset") {
        let now_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Duration::from_secs(reset_epoch.saturating_sub(now_epoch))
    } else {
        default
    };

    cooldown.min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_acquire_round_robin() {
        let pool = CredentialPool::new(["a", "b", "c"]);
        let picked: Vec<String> = (0..3).map(|_| pool.acquire().unwrap().token).collect();
        assert_eq!(picked, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_pool() {
        let pool = CredentialPool::new(["", "  "]);
        assert!(pool.is_empty());
        assert!(pool.acquire().is_none());
        assert!(pool.next_reset().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_credential_excluded_until_reset() {
        let pool = CredentialPool::new(["a", "b"]);
        let a = Credential {
            index: 0,
            token: "a".to_string(),
        };
        pool.mark_throttled(&a, Duration::from_secs(30));

        assert_eq!(pool.available(), 1);
        for _ in 0..4 {
            assert_eq!(pool.acquire().unwrap().token, "b");
        }

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(pool.available(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(pool.available(), 2);
        let picked: Vec<String> = (0..2).map(|_| pool.acquire().unwrap().token).collect();
        assert!(picked.contains(&"a".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_throttled_returns_earliest_reset() {
        let pool = CredentialPool::new(["a", "b"]);
        pool.mark_throttled(&Credential { index: 0, token: "a".into() }, Duration::from_secs(60));
        pool.mark_throttled(&Credential { index: 1, token: "b".into() }, Duration::from_secs(10));

        assert_eq!(pool.available(), 0);
        assert_eq!(pool.acquire().unwrap().token, "b");
        assert_eq!(pool.next_reset(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_cooldown_from_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("30"));
        let cooldown = cooldown_from_headers(&headers, Duration::from_secs(60), Duration::from_secs(900));
        assert_eq!(cooldown, Duration::from_secs(30));
    }

    #[test]
    fn test_cooldown_from_reset_epoch_and_cap() {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&(now + 5000).to_string()).unwrap(),
        );
        let cooldown = cooldown_from_headers(&headers, Duration::from_secs(60), Duration::from_secs(900));
        assert_eq!(cooldown, Duration::from_secs(900));
    }

    #[test]
    fn test_cooldown_default() {
        let cooldown =
            cooldown_from_headers(&HeaderMap::new(), Duration::from_secs(60), Duration::from_secs(900));
        assert_eq!(cooldown, Duration::from_secs(60));
    }
}
