//! Signature verification
//!
//! HMAC tokens are checked against a configured client secret. RSA tokens
//! are checked against the certificate published under the token's `kid` in
//! a remote JWKS document.
//!
//! Key resolution never fails because of the network: a fetch that errors,
//! returns a non-2xx status, or returns an unparseable body is treated as an
//! empty key set, which surfaces as
//! [`BadSignatureMissingKid`][InvalidTokenError::BadSignatureMissingKid].

use std::{fmt, sync::Arc, time::Duration};

use serde_json::Value;

use crate::{
    error::InvalidTokenError,
    jwa::{Algorithm, AlgorithmFamily},
    jwks::{self, JwksFetcher, JwksLocation, KeySet, KeySetCache},
    key::{self, CertificateKey},
    Headers,
};

/// Default lifetime of a cached key set
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Verifies token signatures
///
/// Configure once and reuse for many tokens.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use tessera::{Algorithm, InMemoryKeySetCache, Parser, Verifier};
/// # fn main() -> Result<(), tessera::InvalidTokenError> {
/// let verifier = Verifier::new()
///     .with_algorithm(Algorithm::RS256)
///     .with_jwks_uri("https://tenant.example.com/.well-known/jwks.json")
///     .with_cache(Arc::new(InMemoryKeySetCache::new()));
///
/// # let jwt = "";
/// Parser::parse(jwt)?.verify(&verifier)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
#[must_use]
pub struct Verifier {
    algorithm: Option<Algorithm>,
    jwks_uri: Option<String>,
    domain: Option<String>,
    client_secret: Option<String>,
    cache_ttl: Duration,
    cache: Option<Arc<dyn KeySetCache>>,
    fetcher: Option<Arc<dyn JwksFetcher>>,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier {
    /// A verifier that accepts any supported algorithm, with no keys
    /// configured
    pub fn new() -> Self {
        Self {
            algorithm: None,
            jwks_uri: None,
            domain: None,
            client_secret: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: None,
            fetcher: None,
        }
    }

    /// Only accepts tokens signed with `algorithm`
    #[inline]
    pub fn with_algorithm(self, algorithm: Algorithm) -> Self {
        Self {
            algorithm: Some(algorithm),
            ..self
        }
    }

    /// Resolves RSA keys from the JWKS document at `jwks_uri`
    #[inline]
    pub fn with_jwks_uri(self, jwks_uri: impl Into<String>) -> Self {
        Self {
            jwks_uri: Some(jwks_uri.into()),
            ..self
        }
    }

    /// The host used when the JWKS URI does not name one
    #[inline]
    pub fn with_domain(self, domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            ..self
        }
    }

    /// Verifies HMAC tokens with `secret`
    #[inline]
    pub fn with_client_secret(self, secret: impl Into<String>) -> Self {
        Self {
            client_secret: Some(secret.into()),
            ..self
        }
    }

    /// How long fetched key sets are cached
    #[inline]
    pub fn with_cache_ttl(self, cache_ttl: Duration) -> Self {
        Self { cache_ttl, ..self }
    }

    /// Caches fetched key sets in `cache`
    #[inline]
    pub fn with_cache(self, cache: Arc<dyn KeySetCache>) -> Self {
        Self {
            cache: Some(cache),
            ..self
        }
    }

    /// Fetches JWKS documents with `fetcher`
    ///
    /// Without one, a shared [`ReqwestFetcher`][crate::ReqwestFetcher] is
    /// used when the `reqwest` feature is enabled. Otherwise key sets can
    /// only come from the cache.
    ///
    /// The shared fetcher wraps a blocking `reqwest` client, which panics if
    /// it is first used or dropped inside an async runtime. From async code,
    /// supply a fetcher here and call [`verify()`][Self::verify] from a
    /// blocking context such as `tokio::task::spawn_blocking`.
    #[inline]
    pub fn with_fetcher(self, fetcher: Arc<dyn JwksFetcher>) -> Self {
        Self {
            fetcher: Some(fetcher),
            ..self
        }
    }

    /// The configured cache lifetime
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Verifies `signature` over `payload` (`header.claims`, still encoded)
    ///
    /// # Errors
    ///
    /// The `alg` header is missing, unexpected or unsupported, the key
    /// needed for the algorithm is not configured or cannot be found, or
    /// the signature does not match.
    pub fn verify(
        &self,
        payload: &str,
        signature: &[u8],
        headers: &Headers,
    ) -> Result<(), InvalidTokenError> {
        let alg = match headers.get("alg") {
            Some(Value::String(alg)) => alg.clone(),
            Some(other) => other.to_string(),
            None => return Err(InvalidTokenError::MissingAlgHeader),
        };

        if let Some(expected) = self.algorithm {
            if alg != expected.as_str() {
                return Err(InvalidTokenError::UnexpectedSigningAlgorithm {
                    expected: expected.to_string(),
                    found: alg,
                });
            }
        }

        let algorithm: Algorithm = alg
            .parse()
            .map_err(|_| InvalidTokenError::UnsupportedSigningAlgorithm { found: alg })?;

        match algorithm.family() {
            AlgorithmFamily::Hmac => {
                let secret = self
                    .client_secret
                    .as_deref()
                    .ok_or(InvalidTokenError::RequiresClientSecret { algorithm })?;

                key::verify_hmac(algorithm, secret, payload.as_bytes(), signature)
            }
            AlgorithmFamily::Rsa => {
                let kid = headers
                    .get("kid")
                    .and_then(Value::as_str)
                    .ok_or(InvalidTokenError::MissingKidHeader { algorithm })?;

                self.verify_rsa(algorithm, kid, payload.as_bytes(), signature)
            }
        }
    }

    fn verify_rsa(
        &self,
        algorithm: Algorithm,
        kid: &str,
        payload: &[u8],
        signature: &[u8],
    ) -> Result<(), InvalidTokenError> {
        let keys = self.key_set(algorithm, Some(kid))?;

        let certificate = keys
            .get(kid)
            .and_then(|record| record.certificate())
            .ok_or_else(|| InvalidTokenError::BadSignatureMissingKid {
                kid: kid.to_owned(),
            })?;

        let key = CertificateKey::from_x5c(certificate).map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::debug!(jwk.kid = kid, error, "unable to read JWK certificate");
            InvalidTokenError::BadSignature
        })?;

        match key {
            CertificateKey::Rsa(public) => public.verify(algorithm, payload, signature),
            CertificateKey::Other(key_type) => {
                Err(InvalidTokenError::BadSignatureIncompatibleAlgorithm {
                    kid: kid.to_owned(),
                    key_type,
                })
            }
        }
    }

    /// Resolves the key set from the cache, fetching on a miss
    ///
    /// A cached set that lacks `kid` counts as a miss; the whole set is
    /// fetched again and replaces the cached one.
    fn key_set(&self, algorithm: Algorithm, kid: Option<&str>) -> Result<KeySet, InvalidTokenError> {
        let jwks_uri = self
            .jwks_uri
            .as_deref()
            .ok_or(InvalidTokenError::RequiresJwksUri { algorithm })?;

        let location = JwksLocation::resolve(jwks_uri, self.domain.as_deref())
            .ok_or(InvalidTokenError::RequiresJwksUri { algorithm })?;

        let url = location.url();
        let cache_key = jwks::cache_key(&url);

        if let Some(cache) = &self.cache {
            match cache.get(&cache_key) {
                Ok(Some(keys)) if kid.map_or(true, |kid| keys.contains(kid)) => {
                    tracing::debug!(jwks.cache_key = %cache_key, "JWKS cache hit");
                    return Ok(keys);
                }
                Ok(Some(_)) => {
                    tracing::debug!(
                        jwks.cache_key = %cache_key,
                        jwk.kid = ?kid,
                        "cached JWKS does not contain key; refetching",
                    );
                }
                Ok(None) => {
                    tracing::debug!(jwks.cache_key = %cache_key, "JWKS cache miss");
                }
                Err(err) => {
                    let error: &(dyn std::error::Error + 'static) = &*err;
                    tracing::debug!(jwks.cache_key = %cache_key, error, "JWKS cache read failed");
                }
            }
        }

        let keys = self.fetch(&location);

        if !keys.is_empty() {
            if let Some(cache) = &self.cache {
                if let Err(err) = cache.set(&cache_key, &keys, self.cache_ttl) {
                    let error: &(dyn std::error::Error + 'static) = &*err;
                    tracing::warn!(jwks.cache_key = %cache_key, error, "JWKS cache write failed");
                }
            }
        }

        Ok(keys)
    }

    fn fetch(&self, location: &JwksLocation) -> KeySet {
        let url = location.url();

        let Some(fetcher) = self.fetcher() else {
            tracing::debug!(jwks.url = %url, "no JWKS fetcher available");
            return KeySet::new();
        };

        tracing::debug!(jwks.url = %url, "fetching JWKS");

        match fetcher.get(&url) {
            Ok(response) if response.is_success() => match KeySet::from_document(&response.body) {
                Ok(keys) => {
                    tracing::debug!(jwks.url = %url, jwks.len = keys.len(), "JWKS fetched");
                    keys
                }
                Err(err) => {
                    let error: &dyn std::error::Error = &err;
                    tracing::warn!(jwks.url = %url, error, "unable to parse JWKS");
                    KeySet::new()
                }
            },
            Ok(response) => {
                tracing::debug!(
                    jwks.url = %url,
                    http.status_code = response.status,
                    "JWKS fetch failed; unexpected response status",
                );
                KeySet::new()
            }
            Err(err) => {
                let error: &(dyn std::error::Error + 'static) = &*err;
                tracing::debug!(jwks.url = %url, error, "JWKS fetch failed");
                KeySet::new()
            }
        }
    }

    fn fetcher(&self) -> Option<&dyn JwksFetcher> {
        match &self.fetcher {
            Some(fetcher) => Some(fetcher.as_ref()),
            None => default_fetcher(),
        }
    }
}

#[cfg(feature = "reqwest")]
fn default_fetcher() -> Option<&'static dyn JwksFetcher> {
    let fetcher: &'static dyn JwksFetcher = crate::remote::shared()?;
    Some(fetcher)
}

#[cfg(not(feature = "reqwest"))]
fn default_fetcher() -> Option<&'static dyn JwksFetcher> {
    None
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("algorithm", &self.algorithm)
            .field("jwks_uri", &self.jwks_uri)
            .field("domain", &self.domain)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("cache_ttl", &self.cache_ttl)
            .field("cache", &self.cache.is_some())
            .field("fetcher", &self.fetcher.is_some())
            .finish()
    }
}
