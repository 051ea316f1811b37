//! Time-bounded cache of the identity provider's signing keys.
//!
//! The cache holds one immutable [`KeySetSnapshot`] at a time. A refresh builds
//! a complete new snapshot outside the lock and swaps it in, so readers never
//! observe keys from one fetch paired with the timestamp of another. Concurrent
//! refreshes are allowed; the snapshot fetched last wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{OidcConfig, DEFAULT_JWKS_TTL};
use crate::error::{AuthError, AuthResult};
use crate::jwks::{JwksFetcher, KeySetSource, SigningKey};

/// Monotonic time source, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Keys from a single fetch together with the time of that fetch.
#[derive(Debug)]
pub struct KeySetSnapshot {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Instant,
}

impl KeySetSnapshot {
    fn new(keys: Vec<SigningKey>, fetched_at: Instant) -> Self {
        let keys = keys
            .into_iter()
            .map(|key| (key.kid().to_string(), Arc::new(key)))
            .collect();
        Self { keys, fetched_at }
    }

    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) <= ttl
    }
}

/// A snapshot plus whether obtaining it required a network fetch.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub snapshot: Arc<KeySetSnapshot>,
    pub fetched: bool,
}

pub struct KeySetCache {
    source: Option<Arc<dyn KeySetSource>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    min_forced_refresh_interval: Option<Duration>,
    current: RwLock<Option<Arc<KeySetSnapshot>>>,
    last_forced_refresh: Mutex<Option<Instant>>,
}

impl KeySetCache {
    pub fn new(source: Arc<dyn KeySetSource>, ttl: Duration) -> Self {
        Self {
            source: Some(source),
            clock: Arc::new(SystemClock),
            ttl,
            min_forced_refresh_interval: None,
            current: RwLock::new(None),
            last_forced_refresh: Mutex::new(None),
        }
    }

    /// A cache with no key set location. Every lookup fails with [`AuthError::Config`].
    pub fn unconfigured() -> Self {
        Self {
            source: None,
            clock: Arc::new(SystemClock),
            ttl: DEFAULT_JWKS_TTL,
            min_forced_refresh_interval: None,
            current: RwLock::new(None),
            last_forced_refresh: Mutex::new(None),
        }
    }

    /// Build the cache described by `config`, fetching from `OIDC_JWKS_URL` when set.
    pub fn from_config(config: &OidcConfig) -> AuthResult<Self> {
        let cache = match config.jwks_url.as_deref() {
            Some(url) => {
                info!(jwks_url = %url, ttl_secs = config.jwks_ttl.as_secs(), "configuring JWKS cache");
                let fetcher = JwksFetcher::new(url, config.fetch_timeout)?;
                Self::new(Arc::new(fetcher), config.jwks_ttl)
            }
            None => {
                warn!("OIDC_JWKS_URL not set; bearer tokens cannot be verified");
                Self::unconfigured()
            }
        };
        Ok(match config.min_forced_refresh_interval {
            Some(interval) => cache.with_min_forced_refresh_interval(interval),
            None => cache,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Rate-limit [`force_refresh`](Self::force_refresh). Within the interval the
    /// current snapshot is reused instead of hitting the provider again.
    pub fn with_min_forced_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_forced_refresh_interval = Some(interval);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    /// The cached snapshot, fetching a new one when the cache is empty or older than the TTL.
    pub async fn get_keys(&self) -> AuthResult<Arc<KeySetSnapshot>> {
        Ok(self.lookup().await?.snapshot)
    }

    /// Like [`get_keys`](Self::get_keys) but also reports whether a fetch happened.
    pub async fn lookup(&self) -> AuthResult<CacheLookup> {
        let source = self.source()?;
        let now = self.clock.now();
        if let Some(snapshot) = self.current() {
            if snapshot.is_fresh(now, self.ttl) {
                return Ok(CacheLookup {
                    snapshot,
                    fetched: false,
                });
            }
            debug!(jwks_url = %source.location(), "JWKS cache expired");
        }

        let snapshot = self.fetch_and_store(source.as_ref()).await?;
        Ok(CacheLookup {
            snapshot,
            fetched: true,
        })
    }

    /// Replace the cached snapshot with a freshly fetched one, regardless of age.
    ///
    /// When the fetch fails the cached snapshot is dropped as well, so stale keys
    /// are never served after a failed refresh.
    pub async fn force_refresh(&self) -> AuthResult<Arc<KeySetSnapshot>> {
        let source = self.source()?;

        if let Some(interval) = self.min_forced_refresh_interval {
            let now = self.clock.now();
            // Check and stamp atomically.
            let mut last = self
                .last_forced_refresh
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let (Some(previous), Some(snapshot)) = (*last, self.current()) {
                if now.saturating_duration_since(previous) < interval {
                    warn!(jwks_url = %source.location(), "forced JWKS refresh rate limited; reusing cached keys");
                    return Ok(snapshot);
                }
            }
            *last = Some(now);
        }

        info!(jwks_url = %source.location(), "forcing JWKS refresh");
        match self.fetch_and_store(source.as_ref()).await {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => {
                self.invalidate();
                Err(err)
            }
        }
    }

    /// Forget the cached snapshot; the next lookup fetches.
    pub fn invalidate(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn source(&self) -> AuthResult<Arc<dyn KeySetSource>> {
        self.source
            .clone()
            .ok_or_else(|| AuthError::Config("JWKS URL not configured".into()))
    }

    fn current(&self) -> Option<Arc<KeySetSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn fetch_and_store(&self, source: &dyn KeySetSource) -> AuthResult<Arc<KeySetSnapshot>> {
        let keys = match source.fetch().await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(jwks_url = %source.location(), error = %err, "JWKS fetch failed");
                return Err(err);
            }
        };
        let snapshot = Arc::new(KeySetSnapshot::new(keys, self.clock.now()));

        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            // A concurrent refresh finished later than ours; keep the newer set.
            Some(existing) if existing.fetched_at > snapshot.fetched_at => {
                return Ok(existing.clone());
            }
            _ => *guard = Some(snapshot.clone()),
        }
        drop(guard);

        debug!(jwks_url = %source.location(), count = snapshot.len(), "JWKS cache refreshed");
        Ok(snapshot)
    }
}
