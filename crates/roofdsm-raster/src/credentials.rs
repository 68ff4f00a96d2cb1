//! Credentials for authenticated raster endpoints.
//!
//! Credentials are an injected capability rather than process-wide state:
//! a fetcher holds an `Arc<dyn CredentialProvider>` and asks it for a
//! credential per request. [`TokenCache`] wraps a token issuer and reuses
//! the issued token until shortly before it expires.

use crate::{RasterError, Result};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default interval before expiry at which a cached token is refreshed.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// A credential attached to an outgoing request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// API key passed as the `key` query parameter.
    ApiKey(String),
    /// OAuth-style bearer token passed in the `Authorization` header.
    BearerToken(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Credential::BearerToken(_) => f.write_str("BearerToken(<redacted>)"),
        }
    }
}

impl Credential {
    /// Attach this credential to an outgoing request.
    pub fn apply(
        self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match self {
            Credential::ApiKey(key) => request.query(&[("key", key)]),
            Credential::BearerToken(token) => request.bearer_auth(token),
        }
    }
}

/// Supplies a credential for each request.
pub trait CredentialProvider: Send + Sync {
    /// Current credential.
    fn credential(&self) -> Result<Credential>;
}

/// A fixed API key.
#[derive(Clone)]
pub struct StaticApiKey(String);

impl StaticApiKey {
    /// Wrap an API key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl std::fmt::Debug for StaticApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticApiKey(<redacted>)")
    }
}

impl CredentialProvider for StaticApiKey {
    fn credential(&self) -> Result<Credential> {
        if self.0.is_empty() {
            return Err(RasterError::Credentials("API key is empty".to_string()));
        }
        Ok(Credential::ApiKey(self.0.clone()))
    }
}

/// A freshly issued token and its lifetime.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Bearer token value.
    pub token: String,
    /// Time until the token expires, measured from issue.
    pub expires_in: Duration,
}

/// Issues bearer tokens (e.g. an OAuth client-credentials exchange).
pub trait TokenSource: Send + Sync {
    /// Request a new token from the issuer.
    fn issue_token(&self) -> Result<IssuedToken>;
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Expiry-aware cache in front of a [`TokenSource`].
///
/// Thread-safe: concurrent callers share one cached token, and only one of
/// them performs a refresh at a time.
pub struct TokenCache<S: TokenSource> {
    source: S,
    refresh_margin: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl<S: TokenSource> std::fmt::Debug for TokenCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("refresh_margin", &self.refresh_margin)
            .finish()
    }
}

impl<S: TokenSource> TokenCache<S> {
    /// Create a cache with the default refresh margin.
    pub fn new(source: S) -> Self {
        Self::with_refresh_margin(source, DEFAULT_REFRESH_MARGIN)
    }

    /// Create a cache that refreshes `margin` before the token expires.
    pub fn with_refresh_margin(source: S, margin: Duration) -> Self {
        Self {
            source,
            refresh_margin: margin,
            cached: Mutex::new(None),
        }
    }

    /// Return the cached token, issuing a new one if absent or about to expire.
    pub fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().map_err(|_| RasterError::CacheLockPoisoned)?;

        let now = Instant::now();
        if let Some(entry) = cached.as_ref() {
            if now < entry.refresh_at {
                return Ok(entry.token.clone());
            }
        }

        let issued = self.source.issue_token()?;
        let lifetime = issued.expires_in.saturating_sub(self.refresh_margin);
        debug!(lifetime_secs = lifetime.as_secs(), "Issued new access token");

        let token = issued.token.clone();
        *cached = Some(CachedToken {
            token: issued.token,
            refresh_at: now + lifetime,
        });
        Ok(token)
    }

    /// Drop the cached token so the next call issues a new one.
    pub fn invalidate(&self) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = None;
        }
    }
}

impl<S: TokenSource> CredentialProvider for TokenCache<S> {
    fn credential(&self) -> Result<Credential> {
        self.token().map(Credential::BearerToken)
    }
}

/// Replace the value of any `key=` query parameter with `REDACTED`.
pub fn redact_url(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let query: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if name == "key" || name == "access_token" => {
                format!("{}=REDACTED", name)
            }
            _ => pair.to_string(),
        })
        .collect();

    format!("{}?{}", base, query.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        issued: AtomicUsize,
        expires_in: Duration,
    }

    impl TokenSource for Arc<CountingSource> {
        fn issue_token(&self) -> Result<IssuedToken> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(IssuedToken {
                token: format!("token-{}", n),
                expires_in: self.expires_in,
            })
        }
    }

    fn source(expires_in: Duration) -> Arc<CountingSource> {
        Arc::new(CountingSource {
            issued: AtomicUsize::new(0),
            expires_in,
        })
    }

    #[test]
    fn test_token_reused_until_expiry() {
        let src = source(Duration::from_secs(3600));
        let cache = TokenCache::new(src.clone());

        assert_eq!(cache.token().unwrap(), "token-1");
        assert_eq!(cache.token().unwrap(), "token-1");
        assert_eq!(src.issued.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_token_inside_margin_is_refreshed() {
        // Lifetime shorter than the margin: every call refreshes
        let src = source(Duration::from_secs(30));
        let cache = TokenCache::new(src.clone());

        assert_eq!(cache.token().unwrap(), "token-1");
        assert_eq!(cache.token().unwrap(), "token-2");
        assert_eq!(src.issued.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalidate_forces_refresh() {
        let src = source(Duration::from_secs(3600));
        let cache = TokenCache::new(src.clone());

        cache.token().unwrap();
        cache.invalidate();
        assert_eq!(cache.token().unwrap(), "token-2");
    }

    #[test]
    fn test_cache_as_credential_provider() {
        let cache = TokenCache::new(source(Duration::from_secs(3600)));
        let provider: &dyn CredentialProvider = &cache;
        assert_eq!(
            provider.credential().unwrap(),
            Credential::BearerToken("token-1".to_string())
        );
    }

    #[test]
    fn test_shared_across_threads() {
        let src = source(Duration::from_secs(3600));
        let cache = TokenCache::new(src.clone());

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| cache.token().unwrap());
            }
        });
        assert_eq!(src.issued.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_api_key_rejected() {
        assert!(StaticApiKey::new("").credential().is_err());
        assert_eq!(
            StaticApiKey::new("abc").credential().unwrap(),
            Credential::ApiKey("abc".to_string())
        );
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("https://solar.googleapis.com/v1/geoTiff:get?id=abc&key=SECRET"),
            "https://solar.googleapis.com/v1/geoTiff:get?id=abc&key=REDACTED"
        );
        assert_eq!(redact_url("https://example.com/dsm.tif"), "https://example.com/dsm.tif");
    }

    #[test]
    fn test_credential_debug_hides_secret() {
        let rendered = format!("{:?}", Credential::ApiKey("SECRET".to_string()));
        assert!(!rendered.contains("SECRET"));
    }
}
