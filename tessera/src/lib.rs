//! JSON Web Token (JWT) handling for identity platform clients
//!
//! * Parse compact tokens with [`Parser`]
//! * Check claims with [`Validator`], or all at once per token kind with
//!   [`Token`]
//! * Verify HMAC signatures against a client secret, and RSA signatures
//!   against keys published in a remote JSON Web Key Set, with [`Verifier`]
//! * Mint tokens with [`Generator`] and client assertions with
//!   [`ClientAssertionGenerator`]
//!
//! Supported algorithms are `HS256`, `HS384`, `HS512`, `RS256`, `RS384` and
//! `RS512`.
//!
//! # Example
//!
//! ```
//! use aliri_clock::UnixTime;
//! use serde_json::json;
//! use tessera::{Algorithm, Generator, Parser, Verifier};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let claims = json!({
//!     "iss": "https://t.example/",
//!     "sub": "user1",
//!     "aud": "client1",
//!     "exp": 1_700_001_000,
//!     "iat": 1_699_999_000,
//!     "nonce": "n1",
//! });
//! let claims = claims.as_object().cloned().unwrap_or_default();
//!
//! let token = Generator::create("s3cret", "HS256", claims)?.to_string();
//!
//! let verifier = Verifier::new()
//!     .with_algorithm(Algorithm::HS256)
//!     .with_client_secret("s3cret");
//!
//! let parsed = Parser::parse(token)?;
//! parsed
//!     .verify(&verifier)?
//!     .validate()
//!     .at(UnixTime(1_700_000_000))
//!     .issuer("https://t.example/")?
//!     .audience(&["client1"])?
//!     .nonce("n1")?
//!     .expiration()?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod client_assertion;
pub mod encoding;
pub mod error;
pub mod generator;
pub mod jwa;
pub mod jwks;
mod key;
pub mod parser;
#[cfg(feature = "reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
pub mod remote;
pub mod token;
pub mod validator;
pub mod verifier;


/// A decoded JOSE header
pub type Headers = serde_json::Map<String, serde_json::Value>;

/// A decoded claims set
pub type Claims = serde_json::Map<String, serde_json::Value>;

#[doc(inline)]
pub use client_assertion::ClientAssertionGenerator;
#[doc(inline)]
pub use error::{InvalidTokenError, TokenGenerationError};
#[doc(inline)]
pub use generator::Generator;
#[doc(inline)]
pub use jwa::Algorithm;
#[doc(inline)]
pub use jwks::{FetchResponse, InMemoryKeySetCache, JwksFetcher, KeySet, KeySetCache};
#[doc(inline)]
pub use key::SigningKey;
#[doc(inline)]
pub use parser::Parser;
#[cfg(feature = "reqwest")]
#[doc(inline)]
pub use remote::ReqwestFetcher;
#[doc(inline)]
pub use token::{Expectations, Token, TokenKind};
#[doc(inline)]
pub use validator::Validator;
#[doc(inline)]
pub use verifier::Verifier;
