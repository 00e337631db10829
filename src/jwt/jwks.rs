//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! Keys are cached with a TTL so repeat validations do not hammer the
//! issuer's endpoint, refreshes are rate-limited, and a replaced key set
//! fires the realm's cache-invalidation hook: cached authentications minted
//! under rotated keys must not outlive the rotation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::realm::RefreshHook;

/// Minimum delay between forced refreshes, to protect the issuer endpoint.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Timeout for JWKS fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct CachedJwks {
    jwks: JwkSet,
    fetched_at: Instant,
}

impl CachedJwks {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Client for one JWKS endpoint, with TTL caching and rotation detection.
pub struct JwksClient {
    jwks_uri: String,
    cache: RwLock<Option<CachedJwks>>,
    http_client: reqwest::Client,
    cache_ttl: Duration,
    last_refresh: RwLock<Option<Instant>>,
    on_rotation: Option<RefreshHook>,
    closed: AtomicBool,
}

impl JwksClient {
    /// Create a client for `jwks_uri`.
    ///
    /// `on_rotation` is invoked exactly once per observed key-set change; the
    /// realm passes its `expire_all` here.
    pub fn new(jwks_uri: String, cache_ttl: Duration, on_rotation: Option<RefreshHook>) -> Self {
        Self {
            jwks_uri,
            cache: RwLock::new(None),
            http_client: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .expect("failed to build JWKS HTTP client"),
            cache_ttl,
            last_refresh: RwLock::new(None),
            on_rotation,
            closed: AtomicBool::new(false),
        }
    }

    /// Get the key set, from cache or by fetching.
    ///
    /// # Errors
    ///
    /// [`AuthError::KeySource`] when the endpoint is unreachable, returns a
    /// non-success status, serves something that is not a JWKS document, or
    /// the client has been closed.
    pub async fn get_jwks(&self) -> Result<JwkSet, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_fresh(self.cache_ttl) {
                    debug!(jwks_uri = %self.jwks_uri, "using cached JWKS");
                    return Ok(cached.jwks.clone());
                }
            }
        }
        self.fetch_and_cache().await
    }

    /// Force a refresh, ignoring the cache.
    ///
    /// Used when validation fails: the key may have rotated. Refreshes are
    /// rate-limited; inside the window the cached value is served instead.
    pub async fn refresh(&self) -> Result<JwkSet, AuthError> {
        {
            let last_refresh = self.last_refresh.read().await;
            if let Some(last) = *last_refresh {
                if last.elapsed() < MIN_REFRESH_INTERVAL {
                    warn!(
                        jwks_uri = %self.jwks_uri,
                        since_last_ms = last.elapsed().as_millis() as u64,
                        "JWKS refresh rate limited, serving cache"
                    );
                    return self.get_jwks().await;
                }
            }
        }
        self.fetch_and_cache().await
    }

    async fn fetch_and_cache(&self) -> Result<JwkSet, AuthError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AuthError::KeySource("JWKS client is closed".to_string()));
        }
        if !self.jwks_uri.starts_with("https://")
            && !self.jwks_uri.starts_with("http://localhost")
            && !self.jwks_uri.starts_with("http://127.0.0.1")
        {
            return Err(AuthError::KeySource(
                "JWKS endpoint must use HTTPS (plain HTTP is only allowed for loopback)"
                    .to_string(),
            ));
        }

        info!(jwks_uri = %self.jwks_uri, "fetching JWKS");
        let response = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::KeySource(format!("JWKS fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AuthError::KeySource(format!(
                "JWKS endpoint returned status {}",
                response.status()
            )));
        }
        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::KeySource(format!("invalid JWKS document: {e}")))?;
        debug!(
            jwks_uri = %self.jwks_uri,
            key_count = jwks.keys.len(),
            "fetched JWKS"
        );

        let rotated = {
            let mut cache = self.cache.write().await;
            let rotated = match cache.as_ref() {
                Some(previous) => key_sets_differ(&previous.jwks, &jwks),
                None => false,
            };
            *cache = Some(CachedJwks {
                jwks: jwks.clone(),
                fetched_at: Instant::now(),
            });
            rotated
        };
        {
            let mut last_refresh = self.last_refresh.write().await;
            *last_refresh = Some(Instant::now());
        }
        if rotated {
            info!(jwks_uri = %self.jwks_uri, "JWKS key material changed");
            if let Some(hook) = &self.on_rotation {
                hook();
            }
        }
        Ok(jwks)
    }

    /// The JWKS endpoint URI.
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Shut the client down: further fetches fail and the cached key set is
    /// dropped (best-effort if a fetch is concurrently in flight).
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut cache) = self.cache.try_write() {
            *cache = None;
        }
    }
}

impl std::fmt::Debug for JwksClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksClient")
            .field("jwks_uri", &self.jwks_uri)
            .field("cache_ttl", &self.cache_ttl)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

fn key_sets_differ(previous: &JwkSet, current: &JwkSet) -> bool {
    serde_json::to_value(previous).ok() != serde_json::to_value(current).ok()
}
