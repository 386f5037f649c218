//! Signed client assertions for `private_key_jwt` client authentication

use std::time::{Duration, SystemTime};

use aliri_clock::{Clock, System};
use ring::{
    digest,
    rand::{SecureRandom, SystemRandom},
};
use serde_json::Value;

use crate::{
    error::{self, TokenGenerationError},
    generator::Generator,
    jwa::Algorithm,
    key::SigningKey,
    Claims,
};

/// How long an assertion remains valid
pub const ASSERTION_LIFETIME: Duration = Duration::from_secs(180);

/// Algorithms accepted for client assertions
pub const ASSERTION_ALGORITHMS: [Algorithm; 2] = [Algorithm::RS256, Algorithm::RS384];

const JTI_ENTROPY_LEN: usize = 32;

/// Mints short-lived assertions that authenticate a client to the
/// authorization server
#[derive(Debug, Clone, Copy)]
pub struct ClientAssertionGenerator;

impl ClientAssertionGenerator {
    /// Creates an assertion for `client_id`, addressed to `domain`
    ///
    /// # Errors
    ///
    /// `algorithm` is not `RS256` or `RS384`, or the key cannot sign with it.
    pub fn create(
        domain: &str,
        client_id: &str,
        key: impl Into<SigningKey>,
        algorithm: impl AsRef<str>,
    ) -> Result<Generator, TokenGenerationError> {
        Self::create_with_clock(domain, client_id, key, algorithm, &System)
    }

    /// Creates an assertion, reading the issue time from `clock`
    ///
    /// # Errors
    ///
    /// See [`create()`][Self::create].
    pub fn create_with_clock<C: Clock>(
        domain: &str,
        client_id: &str,
        key: impl Into<SigningKey>,
        algorithm: impl AsRef<str>,
        clock: &C,
    ) -> Result<Generator, TokenGenerationError> {
        let algorithm = algorithm.as_ref();
        let supported = algorithm
            .parse::<Algorithm>()
            .ok()
            .filter(|alg| ASSERTION_ALGORITHMS.contains(alg))
            .ok_or_else(|| TokenGenerationError::UnsupportedAlgorithm {
                algorithm: algorithm.to_owned(),
            })?;

        let now = clock.now().0;

        let mut claims = Claims::new();
        claims.insert("iss".to_owned(), Value::from(client_id));
        claims.insert("sub".to_owned(), Value::from(client_id));
        claims.insert("aud".to_owned(), Value::from(domain));
        claims.insert("iat".to_owned(), Value::from(now));
        claims.insert(
            "exp".to_owned(),
            Value::from(now.saturating_add(ASSERTION_LIFETIME.as_secs())),
        );
        claims.insert("jti".to_owned(), Value::from(unique_id()?));

        Generator::create(key, supported, claims)
    }
}

/// Hex SHA-256 over a nanosecond timestamp and fresh random bytes
fn unique_id() -> Result<String, TokenGenerationError> {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let mut entropy = [0_u8; JTI_ENTROPY_LEN];
    SystemRandom::new()
        .fill(&mut entropy)
        .map_err(|_| error::unable_to_sign("unable to generate random jti"))?;

    let mut ctx = digest::Context::new(&digest::SHA256);
    ctx.update(&nanos.to_be_bytes());
    ctx.update(&entropy);

    Ok(ctx
        .finish()
        .as_ref()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use aliri_clock::{TestClock, UnixTime};
    use color_eyre::Result;
    use serde_json::json;

    use super::*;
    use crate::{
        test::{self, MockFetcher, JWKS_URI},
        Parser, Verifier,
    };

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn builds_assertion_claims() -> Result<()> {
        let clock = TestClock::new(UnixTime(NOW));
        let assertion = ClientAssertionGenerator::create_with_clock(
            "tenant.example.com",
            "client1",
            test::rsa_key().clone(),
            "RS256",
            &clock,
        )?;

        let claims = assertion.claims();
        assert_eq!(claims.get("iss"), Some(&json!("client1")));
        assert_eq!(claims.get("sub"), Some(&json!("client1")));
        assert_eq!(claims.get("aud"), Some(&json!("tenant.example.com")));
        assert_eq!(claims.get("iat"), Some(&json!(NOW)));
        assert_eq!(claims.get("exp"), Some(&json!(NOW + 180)));

        let jti = claims["jti"].as_str().expect("jti is a string");
        assert_eq!(jti.len(), 64);
        assert!(jti.chars().all(|c| c.is_ascii_hexdigit()));

        Ok(())
    }

    #[test]
    fn jti_is_unique() -> Result<()> {
        let ids: HashSet<String> = (0..32).map(|_| unique_id()).collect::<Result<_, _>>()?;
        assert_eq!(ids.len(), 32);
        Ok(())
    }

    #[test]
    fn only_accepts_rs256_and_rs384() -> Result<()> {
        ClientAssertionGenerator::create("d", "c", test::rsa_key().clone(), "RS384")?;

        for alg in ["RS512", "HS256", "none"] {
            let err = ClientAssertionGenerator::create("d", "c", test::rsa_key().clone(), alg)
                .unwrap_err();
            assert!(err.is_unsupported_algorithm(), "{alg}");
        }

        let err = ClientAssertionGenerator::create("d", "c", "s3cret", "HS256").unwrap_err();
        assert!(err.is_unsupported_algorithm());

        Ok(())
    }

    #[test]
    fn assertion_passes_claim_checks_but_has_no_kid() -> Result<()> {
        let assertion = ClientAssertionGenerator::create(
            "tenant.example.com",
            "client1",
            test::rsa_private_pem(),
            "RS256",
        )?;

        let parsed = Parser::parse(assertion.into_string())?;
        parsed
            .validate()
            .issuer("client1")?
            .audience(&["tenant.example.com"])?
            .issued()?
            .expiration()?;

        let err = parsed
            .verify(
                &Verifier::new()
                    .with_jwks_uri(JWKS_URI)
                    .with_fetcher(Arc::new(MockFetcher::new())),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            crate::InvalidTokenError::MissingKidHeader { .. }
        ));

        Ok(())
    }
}
