//! JSON Web Key Sets and the collaborators used to obtain them
//!
//! A [`Verifier`][crate::Verifier] resolves RSA verification keys from a
//! remote JWKS document. Fetching is delegated to a [`JwksFetcher`] and
//! results are kept in a [`KeySetCache`] under [`cache_key()`].

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Mutex,
    time::Duration,
};

use aliri_base64::Base64Url;
use aliri_clock::{Clock, System, UnixTime};
use once_cell::sync::Lazy;
use regex::Regex;
use ring::digest;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BoxError;

/// Path used when a JWKS URI does not name one
pub const DEFAULT_JWKS_PATH: &str = "/.well-known/jwks.json";

const DEFAULT_SCHEME: &str = "https";
const CACHE_KEY_PREFIX: &str = "jwks.";

static URI_PARTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*):)?(?://(?P<host>[^/?#]*))?(?P<path>[^?#]*)")
        .expect("JWKS URI pattern is valid")
});

/// A single key from a JWKS document
///
/// Only the members needed for verification are typed; everything else is
/// kept as-is so a cached set can be written back out unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JwkRecord {
    kid: String,
    x5c: Vec<String>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

impl JwkRecord {
    /// Builds a record from its key id and certificate chain
    pub fn new(kid: impl Into<String>, x5c: Vec<String>) -> Self {
        Self {
            kid: kid.into(),
            x5c,
            other: Map::new(),
        }
    }

    /// The key id
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The certificate chain, leaf first
    #[must_use]
    pub fn x5c(&self) -> &[String] {
        &self.x5c
    }

    /// The leaf certificate, used to derive the verification key
    #[must_use]
    pub fn certificate(&self) -> Option<&str> {
        self.x5c.first().map(String::as_str)
    }

    /// Any other JWK member, such as `kty` or `use`
    #[must_use]
    pub fn member(&self, name: &str) -> Option<&Value> {
        self.other.get(name)
    }
}

/// Keys from a JWKS document, indexed by key id
///
/// Only keys with a non-empty `x5c` chain are indexed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeySet {
    keys: BTreeMap<String, JwkRecord>,
}

#[derive(Deserialize)]
struct JwksDocument {
    #[serde(default)]
    keys: Vec<Value>,
}

impl KeySet {
    /// An empty key set
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes the keys of a JWKS document (`{"keys": [...]}`)
    ///
    /// Entries without a `kid` or without certificates are skipped.
    ///
    /// # Errors
    ///
    /// The body is not a JSON object.
    pub fn from_document(body: &[u8]) -> Result<Self, serde_json::Error> {
        let document: JwksDocument = serde_json::from_slice(body)?;
        let mut set = Self::new();

        for (index, key) in document.keys.into_iter().enumerate() {
            match serde_json::from_value::<JwkRecord>(key) {
                Ok(record) if !record.x5c.is_empty() => set.insert(record),
                Ok(record) => {
                    tracing::trace!(jwks.idx = index, jwk.kid = %record.kid, "ignoring JWK without x5c");
                }
                Err(error) => {
                    let error: &dyn std::error::Error = &error;
                    tracing::trace!(jwks.idx = index, error, "ignoring unusable JWK");
                }
            }
        }

        Ok(set)
    }

    /// Adds a key, replacing any key with the same id
    pub fn insert(&mut self, record: JwkRecord) {
        self.keys.insert(record.kid.clone(), record);
    }

    /// The key with id `kid`
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&JwkRecord> {
        self.keys.get(kid)
    }

    /// Whether a key with id `kid` is present
    #[must_use]
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    /// The ids of every key in the set
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// The number of keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<JwkRecord> for KeySet {
    fn from_iter<T: IntoIterator<Item = JwkRecord>>(iter: T) -> Self {
        let mut set = Self::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

/// The cache key under which the key set fetched from `url` is stored
///
/// Verifiers pass the fully resolved URL, so relative URIs on different
/// domains never share an entry. The key is `jwks.` followed by the
/// unpadded base64url SHA-256 of the URL.
#[must_use]
pub fn cache_key(url: &str) -> String {
    let hash = digest::digest(&digest::SHA256, url.as_bytes());
    format!("{CACHE_KEY_PREFIX}{}", Base64Url::from(hash.as_ref()))
}

/// Storage for fetched key sets
///
/// Implementations must tolerate concurrent callers. Two verifiers may
/// miss at the same time and both write the same set.
pub trait KeySetCache: Send + Sync {
    /// Looks up a live entry
    ///
    /// # Errors
    ///
    /// The backing store failed. Callers treat this as a miss.
    fn get(&self, key: &str) -> Result<Option<KeySet>, BoxError>;

    /// Stores `value` for `ttl`
    ///
    /// # Errors
    ///
    /// The backing store failed.
    fn set(&self, key: &str, value: &KeySet, ttl: Duration) -> Result<(), BoxError>;

    /// Whether a live entry exists
    fn has(&self, key: &str) -> bool {
        matches!(self.get(key), Ok(Some(_)))
    }
}

/// A process-local [`KeySetCache`]
pub struct InMemoryKeySetCache<C = System> {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: C,
}

#[derive(Debug)]
struct CacheEntry {
    value: KeySet,
    expires: UnixTime,
}

impl InMemoryKeySetCache {
    /// An empty cache using the system clock
    pub fn new() -> Self {
        Self::with_clock(System)
    }
}

impl Default for InMemoryKeySetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryKeySetCache<C> {
    /// An empty cache that reads expiry times from `clock`
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Drops every entry
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl<C> fmt::Debug for InMemoryKeySetCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let len = self.entries.lock().map(|e| e.len()).unwrap_or_default();
        f.debug_struct("InMemoryKeySetCache")
            .field("entries", &len)
            .finish()
    }
}

impl<C: Clock + Send + Sync> KeySetCache for InMemoryKeySetCache<C> {
    fn get(&self, key: &str) -> Result<Option<KeySet>, BoxError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().map_err(|_| "key set cache lock poisoned")?;

        let live = entries
            .get(key)
            .map(|entry| (now < entry.expires).then(|| entry.value.clone()));

        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &KeySet, ttl: Duration) -> Result<(), BoxError> {
        let expires = UnixTime(self.clock.now().0.saturating_add(ttl.as_secs()));
        let mut entries = self.entries.lock().map_err(|_| "key set cache lock poisoned")?;

        entries.insert(
            key.to_owned(),
            CacheEntry {
                value: value.clone(),
                expires,
            },
        );

        Ok(())
    }
}

/// The outcome of an HTTP GET
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResponse {
    /// The HTTP status code
    pub status: u16,
    /// The response body
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Whether the status code is in the 2xx range
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs the HTTP GET used to retrieve a JWKS document
///
/// Retries and timeouts are the implementation's concern.
pub trait JwksFetcher: Send + Sync {
    /// Fetches `url`
    ///
    /// # Errors
    ///
    /// The request could not be completed. Non-2xx statuses are returned
    /// as responses, not errors.
    fn get(&self, url: &str) -> Result<FetchResponse, BoxError>;
}

/// Where a JWKS document is fetched from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JwksLocation {
    scheme: String,
    host: String,
    path: String,
}

impl JwksLocation {
    /// Splits `jwks_uri` into scheme, host and path, filling gaps
    ///
    /// The scheme defaults to `https`, the host to `domain`, and the path to
    /// [`DEFAULT_JWKS_PATH`]. A host is only recognized after `//`, so a
    /// bare `/keys.json` is a path on `domain`. Query and fragment are
    /// dropped.
    ///
    /// Returns `None` when no host can be determined.
    #[must_use]
    pub fn resolve(jwks_uri: &str, domain: Option<&str>) -> Option<Self> {
        let captures = URI_PARTS.captures(jwks_uri.trim())?;
        let part = |name| {
            captures
                .name(name)
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
        };

        let host = part("host").or(domain).map(trim_domain)?;
        if host.is_empty() {
            return None;
        }

        let path = match part("path") {
            Some(path) if path.starts_with('/') => path.to_owned(),
            Some(path) => format!("/{path}"),
            None => DEFAULT_JWKS_PATH.to_owned(),
        };

        Some(Self {
            scheme: part("scheme").unwrap_or(DEFAULT_SCHEME).to_owned(),
            host: host.to_owned(),
            path,
        })
    }

    /// The URL scheme
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The host, possibly with a port
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The URL to fetch
    #[must_use]
    pub fn url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for JwksLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.host, self.path)
    }
}

/// Accepts a configured domain written either bare or as a URL
fn trim_domain(domain: &str) -> &str {
    let domain = domain
        .split_once("://")
        .map_or(domain, |(_, rest)| rest);
    domain.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    };

    use color_eyre::{eyre::eyre, Result};
    use serde_json::json;

    use super::*;
    use crate::test;

    #[derive(Clone, Debug, Default)]
    struct ManualClock(Arc<AtomicU64>);

    impl ManualClock {
        fn advance(&self, secs: u64) {
            self.0.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> UnixTime {
            UnixTime(self.0.load(Ordering::SeqCst))
        }
    }

    #[test]
    fn indexes_keys_with_certificates() -> Result<()> {
        let body = json!({
            "keys": [
                { "kid": "a", "kty": "RSA", "x5c": ["MIIC"] },
                { "kid": "b", "kty": "RSA", "x5c": [] },
                { "kty": "RSA", "x5c": ["MIIC"] },
                { "kid": "c", "kty": "oct", "k": "c2VjcmV0" },
                "not a key",
            ]
        });

        let set = KeySet::from_document(body.to_string().as_bytes())?;

        assert_eq!(set.len(), 1);
        let a = set.get("a").expect("key a");
        assert_eq!(a.certificate(), Some("MIIC"));
        assert_eq!(a.member("kty"), Some(&json!("RSA")));
        assert!(!set.contains("b"));

        Ok(())
    }

    #[test]
    fn tolerates_documents_without_keys() -> Result<()> {
        assert!(KeySet::from_document(b"{}")?.is_empty());
        assert!(KeySet::from_document(b"<html>").is_err());
        Ok(())
    }

    #[test]
    fn key_set_serializes_by_kid() -> Result<()> {
        let set: KeySet = [JwkRecord::new("k1", vec!["MIIC".to_owned()])]
            .into_iter()
            .collect();

        let json = serde_json::to_value(&set)?;
        assert_eq!(json, json!({ "k1": { "kid": "k1", "x5c": ["MIIC"] } }));

        let back: KeySet = serde_json::from_value(json)?;
        assert_eq!(back, set);
        Ok(())
    }

    #[test]
    fn cache_key_is_stable_and_url_safe() {
        let key = cache_key(test::JWKS_URI);
        assert_eq!(key, cache_key(test::JWKS_URI));
        assert_ne!(key, cache_key("https://other.example.com/.well-known/jwks.json"));
        assert!(key.starts_with("jwks."));
        assert!(!key.contains(&['+', '/', '='][..]));
        // 32 byte digest, unpadded
        assert_eq!(key.len(), "jwks.".len() + 43);
    }

    #[test]
    fn in_memory_cache_expires_entries() -> Result<()> {
        let clock = ManualClock::default();
        clock.advance(1_000);
        let cache = InMemoryKeySetCache::with_clock(clock.clone());
        let set: KeySet = [JwkRecord::new("k1", vec!["MIIC".to_owned()])]
            .into_iter()
            .collect();

        assert!(!cache.has("jwks.x"));
        cache
            .set("jwks.x", &set, Duration::from_secs(60))
            .map_err(|e| eyre!(e))?;
        assert_eq!(cache.get("jwks.x").map_err(|e| eyre!(e))?, Some(set));

        clock.advance(59);
        assert!(cache.has("jwks.x"));

        clock.advance(1);
        assert!(!cache.has("jwks.x"));
        assert_eq!(cache.get("jwks.x").map_err(|e| eyre!(e))?, None);

        Ok(())
    }

    #[test]
    fn resolves_full_uri() {
        let location = JwksLocation::resolve("http://localhost:8080/keys?x=1#frag", None).unwrap();
        assert_eq!(location.scheme(), "http");
        assert_eq!(location.host(), "localhost:8080");
        assert_eq!(location.path(), "/keys");
        assert_eq!(location.url(), "http://localhost:8080/keys");
    }

    #[test]
    fn fills_defaults() {
        let location = JwksLocation::resolve("https://tenant.example.com", None).unwrap();
        assert_eq!(location.url(), test::JWKS_URI);

        let location = JwksLocation::resolve("/custom/jwks.json", Some("tenant.example.com")).unwrap();
        assert_eq!(location.url(), "https://tenant.example.com/custom/jwks.json");

        let location = JwksLocation::resolve("", Some("https://tenant.example.com/")).unwrap();
        assert_eq!(location.url(), test::JWKS_URI);
    }

    #[test]
    fn requires_a_host() {
        assert_eq!(JwksLocation::resolve("/keys.json", None), None);
        assert_eq!(JwksLocation::resolve("https:///keys.json", None), None);
    }

    #[test]
    fn fetch_response_success_range() {
        let ok = FetchResponse {
            status: 204,
            body: Vec::new(),
        };
        let redirect = FetchResponse {
            status: 302,
            body: Vec::new(),
        };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
    }
}
