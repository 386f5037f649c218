//! Token minting
//!
//! A [`Generator`] signs eagerly: once built, the encoded token is fixed and
//! every output method is infallible.
//!
//! ```
//! # use serde_json::json;
//! # use tessera::Generator;
//! # fn main() -> Result<(), tessera::TokenGenerationError> {
//! let claims = json!({ "sub": "user1" }).as_object().cloned().unwrap_or_default();
//! let token = Generator::create("s3cret", "HS256", claims)?;
//!
//! assert_eq!(token.as_str().split('.').count(), 3);
//! # Ok(())
//! # }
//! ```

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::{
    encoding,
    error::TokenGenerationError,
    jwa::Algorithm,
    key::{LoadedKey, SigningKey},
    Claims, Headers,
};

/// Algorithm used when none is given
pub const DEFAULT_ALGORITHM: Algorithm = Algorithm::RS256;

/// A signed token
pub struct Generator {
    algorithm: Algorithm,
    headers: Headers,
    claims: Claims,
    parts: [String; 3],
    token: String,
}

/// Header, claims and signature of a generated token, before the header and
/// claims are encoded
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RawParts {
    /// The final header set, including `typ` and `alg`
    pub headers: Headers,
    /// The claims
    pub claims: Claims,
    /// The base64url encoded signature
    pub signature: String,
}

/// Configures a [`Generator`]
#[must_use]
pub struct GeneratorBuilder {
    key: SigningKey,
    algorithm: String,
    claims: Claims,
    headers: Headers,
    passphrase: Option<String>,
}

impl Generator {
    /// Starts configuring a token signed with `key`
    pub fn builder(key: impl Into<SigningKey>) -> GeneratorBuilder {
        GeneratorBuilder {
            key: key.into(),
            algorithm: DEFAULT_ALGORITHM.as_str().to_owned(),
            claims: Claims::new(),
            headers: Headers::new(),
            passphrase: None,
        }
    }

    /// Signs `claims` with `key` using `algorithm`
    ///
    /// # Errors
    ///
    /// See [`GeneratorBuilder::build()`].
    pub fn create(
        key: impl Into<SigningKey>,
        algorithm: impl AsRef<str>,
        claims: Claims,
    ) -> Result<Self, TokenGenerationError> {
        Self::builder(key).algorithm(algorithm).claims(claims).build()
    }

    /// The signing algorithm
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The final header set
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The signed claims
    #[must_use]
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// The encoded header, claims and signature segments
    #[must_use]
    pub fn to_parts(&self) -> [String; 3] {
        self.parts.clone()
    }

    /// The header and claims as JSON, with the encoded signature
    ///
    /// The signature is the one computed over the encoded segments, so it
    /// matches [`to_parts()`][Generator::to_parts].
    pub fn to_raw_parts(&self) -> RawParts {
        RawParts {
            headers: self.headers.clone(),
            claims: self.claims.clone(),
            signature: self.parts[2].clone(),
        }
    }

    /// The compact token
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// The compact token
    #[must_use]
    pub fn into_string(self) -> String {
        self.token
    }
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.token)
    }
}

impl AsRef<str> for Generator {
    fn as_ref(&self) -> &str {
        &self.token
    }
}

impl From<Generator> for String {
    fn from(generator: Generator) -> Self {
        generator.token
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Generator")
            .field("algorithm", &self.algorithm)
            .field("headers", &self.headers)
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

impl GeneratorBuilder {
    /// The signing algorithm, by JOSE name (default `RS256`)
    pub fn algorithm(self, algorithm: impl AsRef<str>) -> Self {
        Self {
            algorithm: algorithm.as_ref().to_owned(),
            ..self
        }
    }

    /// Replaces the claims
    pub fn claims(self, claims: Claims) -> Self {
        Self { claims, ..self }
    }

    /// Sets a single claim
    pub fn claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    /// Sets a single header
    ///
    /// `alg` is always overwritten with the signing algorithm.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Merges additional headers
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers);
        self
    }

    /// The passphrase protecting a PEM private key
    pub fn passphrase(self, passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Some(passphrase.into()),
            ..self
        }
    }

    /// Validates the configuration and signs the token
    ///
    /// # Errors
    ///
    /// The algorithm is unsupported, the key does not suit the algorithm or
    /// cannot be loaded, a segment cannot be serialized, or signing fails.
    pub fn build(self) -> Result<Generator, TokenGenerationError> {
        let algorithm: Algorithm = self.algorithm.parse()?;

        let mut headers = Headers::new();
        headers.insert("typ".to_owned(), Value::String("JWT".to_owned()));
        headers.extend(self.headers);
        headers.insert(
            "alg".to_owned(),
            Value::String(algorithm.as_str().to_owned()),
        );

        let key = LoadedKey::load(&self.key, algorithm, self.passphrase.as_deref())?;

        let header_segment = encoding::encode_json(&headers).map_err(|source| {
            TokenGenerationError::UnableToEncodeSegment {
                segment: "header",
                source,
            }
        })?;
        let claims_segment = encoding::encode_json(&self.claims).map_err(|source| {
            TokenGenerationError::UnableToEncodeSegment {
                segment: "claims",
                source,
            }
        })?;

        let payload = format!("{header_segment}.{claims_segment}");
        let signature = encoding::encode_raw(&key.sign(algorithm, payload.as_bytes())?);
        let token = format!("{payload}.{signature}");

        Ok(Generator {
            algorithm,
            headers,
            claims: self.claims,
            parts: [header_segment, claims_segment, signature],
            token,
        })
    }
}

impl fmt::Debug for GeneratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("GeneratorBuilder")
            .field("key", &self.key)
            .field("algorithm", &self.algorithm)
            .field("claims", &self.claims)
            .field("headers", &self.headers)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
