//! Token errors
//!
//! Failures while reading or checking a token surface as an
//! [`InvalidTokenError`]. Failures while minting a token surface as a
//! [`TokenGenerationError`]. Every variant carries the values needed to
//! explain the failure without re-running the operation.

#![allow(missing_copy_implementations)]

use std::error::Error as StdError;

use aliri_base64::InvalidBase64Data;
use thiserror::Error;

use crate::jwa::Algorithm;

/// A boxed error produced by an injected collaborator
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A token segment could not be decoded
#[derive(Debug, Error)]
pub enum SegmentError {
    /// The segment is not valid unpadded base64url
    #[error("segment is not valid base64url")]
    Base64(#[from] InvalidBase64Data),

    /// The decoded segment is not the expected JSON structure
    #[error("segment does not contain a valid JSON object")]
    Json(#[from] serde_json::Error),
}

/// A token was rejected while parsing, verifying, or validating it
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InvalidTokenError {
    /// The token does not have exactly three `.`-separated segments
    #[error("token must consist of exactly three period-delimited segments")]
    BadSeparators,

    /// The header segment could not be decoded
    #[error("malformed token header")]
    MalformedHeader(#[source] SegmentError),

    /// The claims segment could not be decoded
    #[error("malformed token claims")]
    MalformedClaims(#[source] SegmentError),

    /// The signature segment could not be decoded
    #[error("malformed token signature")]
    MalformedSignature(#[source] SegmentError),

    /// The `alg` header is absent
    #[error("token header is missing the signing algorithm (alg)")]
    MissingAlgHeader,

    /// The `kid` header is absent on an asymmetrically signed token
    #[error("token header is missing the key id (kid) required for {algorithm}")]
    MissingKidHeader {
        /// The algorithm that required a key id
        algorithm: Algorithm,
    },

    /// The token was signed with an algorithm other than the one expected
    #[error("expected token to be signed with \"{expected}\", found \"{found}\"")]
    UnexpectedSigningAlgorithm {
        /// The configured algorithm
        expected: String,
        /// The algorithm named in the token header
        found: String,
    },

    /// The token names an algorithm that cannot be verified
    #[error("signing algorithm \"{found}\" is not supported")]
    UnsupportedSigningAlgorithm {
        /// The algorithm named in the token header
        found: String,
    },

    /// An HMAC token was presented but no client secret was configured
    #[error("a client secret is required to verify tokens signed with {algorithm}")]
    RequiresClientSecret {
        /// The HMAC algorithm named in the token header
        algorithm: Algorithm,
    },

    /// An RSA token was presented but no JWKS URI was configured
    #[error("a JWKS URI is required to verify tokens signed with {algorithm}")]
    RequiresJwksUri {
        /// The RSA algorithm named in the token header
        algorithm: Algorithm,
    },

    /// The signature does not match the token contents
    #[error("token signature could not be verified")]
    BadSignature,

    /// No key with the token's `kid` could be found in the key set
    #[error("token signature could not be verified: no key found for kid \"{kid}\"")]
    BadSignatureMissingKid {
        /// The requested key id
        kid: String,
    },

    /// The key found for the token's `kid` is not an RSA key
    #[error("token signature could not be verified: key \"{kid}\" is {key_type}, not RSA")]
    BadSignatureIncompatibleAlgorithm {
        /// The key id that resolved to the incompatible key
        kid: String,
        /// The type of the key that was found
        key_type: String,
    },

    /// The `aud` claim is absent
    #[error("missing audience (aud) claim")]
    MissingAudienceClaim,

    /// None of the `aud` values are expected
    #[error("audience (aud) claim mismatch: expected one of \"{expected}\", found \"{found}\"")]
    MismatchedAudClaim {
        /// The accepted audiences, comma-joined
        expected: String,
        /// The audiences in the token, comma-joined
        found: String,
    },

    /// The `auth_time` claim is absent
    #[error("missing authentication time (auth_time) claim")]
    MissingAuthTimeClaim,

    /// Too much time has passed since the end-user authenticated
    #[error(
        "authentication time (auth_time) claim indicates that too much time has passed since \
         the last end-user authentication: current time {now} is after last auth at {valid_until}"
    )]
    MismatchedAuthTimeClaim {
        /// The time used for the check
        now: u64,
        /// `auth_time + max_age + leeway`
        valid_until: u64,
    },

    /// A multi-audience token lacks an `azp` claim
    #[error("missing authorized party (azp) claim on a token with multiple audiences")]
    MissingAzpClaim,

    /// The `azp` claim is not an expected party
    #[error("authorized party (azp) claim mismatch: expected one of \"{expected}\", found \"{found}\"")]
    MismatchedAzpClaim {
        /// The accepted parties, comma-joined
        expected: String,
        /// The party in the token
        found: String,
    },

    /// The `exp` claim is absent
    #[error("missing expiration time (exp) claim")]
    MissingExpClaim,

    /// The token has expired
    #[error(
        "expiration time (exp) claim error: current time {now} is after expiration time {expires}"
    )]
    MismatchedExpClaim {
        /// The time used for the check
        now: u64,
        /// `exp + leeway`
        expires: u64,
    },

    /// The `iat` claim is absent
    #[error("missing issued at (iat) claim")]
    MissingIatClaim,

    /// The `iss` claim is absent
    #[error("missing issuer (iss) claim")]
    MissingIssClaim,

    /// The `iss` claim is not the expected issuer
    #[error("issuer (iss) claim mismatch: expected \"{expected}\", found \"{found}\"")]
    MismatchedIssClaim {
        /// The expected issuer
        expected: String,
        /// The issuer in the token
        found: String,
    },

    /// The `nonce` claim is absent
    #[error("missing nonce claim")]
    MissingNonceClaim,

    /// The `nonce` claim does not match
    #[error("nonce claim mismatch: expected \"{expected}\", found \"{found}\"")]
    MismatchedNonceClaim {
        /// The expected nonce
        expected: String,
        /// The nonce in the token
        found: String,
    },

    /// The `org_id` claim is absent
    #[error("missing organization (org_id) claim")]
    MissingOrgIdClaim,

    /// The `org_id` claim is not an expected organization
    #[error("organization (org_id) claim mismatch: expected one of \"{expected}\", found \"{found}\"")]
    MismatchedOrgIdClaim {
        /// The accepted organizations, comma-joined
        expected: String,
        /// The organization in the token
        found: String,
    },

    /// The `sub` claim is absent
    #[error("missing subject (sub) claim")]
    MissingSubClaim,

    /// The `nbf` claim is absent
    #[error("missing not before (nbf) claim")]
    MissingNbfClaim,

    /// The token is not valid yet
    #[error("not before (nbf) claim error: current time {now} is before {not_before}")]
    MismatchedNbfClaim {
        /// The time used for the check
        now: u64,
        /// `nbf - leeway`
        not_before: u64,
    },

    /// The `events` claim of a logout token is absent
    #[error("missing events claim")]
    MissingEventsClaim,

    /// The `events` claim of a logout token lacks the expected event
    #[error("events claim must contain the \"{expected}\" event")]
    MismatchedEventsClaim {
        /// The event that was required
        expected: &'static str,
    },

    /// A `nonce` claim was present where one is prohibited
    #[error("nonce claim must not be present on a logout token")]
    UnexpectedNonceClaim,

    /// A logout token carries neither `sid` nor `sub`
    #[error("logout token must contain a session id (sid) or subject (sub) claim")]
    MissingSidOrSubClaim,
}

impl InvalidTokenError {
    /// Whether the token was rejected by signature verification
    #[must_use]
    pub fn is_bad_signature(&self) -> bool {
        matches!(
            self,
            Self::BadSignature
                | Self::BadSignatureMissingKid { .. }
                | Self::BadSignatureIncompatibleAlgorithm { .. }
        )
    }

    /// Whether the token is structurally malformed
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::BadSeparators
                | Self::MalformedHeader(_)
                | Self::MalformedClaims(_)
                | Self::MalformedSignature(_)
        )
    }

    /// Whether a required claim was absent
    #[must_use]
    pub fn is_missing_claim(&self) -> bool {
        matches!(
            self,
            Self::MissingAudienceClaim
                | Self::MissingAuthTimeClaim
                | Self::MissingAzpClaim
                | Self::MissingExpClaim
                | Self::MissingIatClaim
                | Self::MissingIssClaim
                | Self::MissingNonceClaim
                | Self::MissingOrgIdClaim
                | Self::MissingSubClaim
                | Self::MissingNbfClaim
                | Self::MissingEventsClaim
                | Self::MissingSidOrSubClaim
        )
    }

    /// Whether a claim was present but held an unacceptable value
    #[must_use]
    pub fn is_mismatched_claim(&self) -> bool {
        matches!(
            self,
            Self::MismatchedAudClaim { .. }
                | Self::MismatchedAuthTimeClaim { .. }
                | Self::MismatchedAzpClaim { .. }
                | Self::MismatchedExpClaim { .. }
                | Self::MismatchedIssClaim { .. }
                | Self::MismatchedNonceClaim { .. }
                | Self::MismatchedOrgIdClaim { .. }
                | Self::MismatchedNbfClaim { .. }
                | Self::MismatchedEventsClaim { .. }
                | Self::UnexpectedNonceClaim
        )
    }

    /// The claim that this error concerns, if any
    #[must_use]
    pub fn claim(&self) -> Option<&'static str> {
        let claim = match self {
            Self::MissingAudienceClaim | Self::MismatchedAudClaim { .. } => "aud",
            Self::MissingAuthTimeClaim | Self::MismatchedAuthTimeClaim { .. } => "auth_time",
            Self::MissingAzpClaim | Self::MismatchedAzpClaim { .. } => "azp",
            Self::MissingExpClaim | Self::MismatchedExpClaim { .. } => "exp",
            Self::MissingIatClaim => "iat",
            Self::MissingIssClaim | Self::MismatchedIssClaim { .. } => "iss",
            Self::MissingNonceClaim
            | Self::MismatchedNonceClaim { .. }
            | Self::UnexpectedNonceClaim => "nonce",
            Self::MissingOrgIdClaim | Self::MismatchedOrgIdClaim { .. } => "org_id",
            Self::MissingSubClaim => "sub",
            Self::MissingNbfClaim | Self::MismatchedNbfClaim { .. } => "nbf",
            Self::MissingEventsClaim | Self::MismatchedEventsClaim { .. } => "events",
            Self::MissingSidOrSubClaim => "sid",
            _ => return None,
        };

        Some(claim)
    }
}

/// A token could not be generated
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenGenerationError {
    /// The requested algorithm is not supported here
    #[error("algorithm \"{algorithm}\" is not supported")]
    UnsupportedAlgorithm {
        /// The requested algorithm name
        algorithm: String,
    },

    /// An HMAC algorithm was requested with a structured key
    #[error("{algorithm} requires the signing key to be provided as a string secret")]
    RequireKeyAsString {
        /// The requested HMAC algorithm
        algorithm: Algorithm,
    },

    /// The signing key is of the wrong type for the algorithm
    #[error("signing key type mismatch: expected {expected}, found {found}")]
    KeyTypeMismatch {
        /// The key type the algorithm requires
        expected: &'static str,
        /// The key type that was provided
        found: String,
    },

    /// The type of the signing key could not be determined
    #[error("unable to identify the type of the signing key")]
    UnidentifiableKeyType,

    /// The signing key could not be loaded
    #[error("unable to process signing key: {reason}")]
    UnableToProcessSigningKey {
        /// The underlying engine's explanation
        reason: String,
    },

    /// The cryptographic engine failed to produce a signature
    #[error("unable to sign data: {reason}")]
    UnableToSignData {
        /// The underlying engine's explanation
        reason: String,
    },

    /// A header or claims segment could not be serialized
    #[error("unable to encode {segment} segment")]
    UnableToEncodeSegment {
        /// Which segment failed
        segment: &'static str,
        /// The serialization failure
        #[source]
        source: serde_json::Error,
    },
}

impl TokenGenerationError {
    /// Whether the error is due to an unsupported algorithm
    #[must_use]
    pub fn is_unsupported_algorithm(&self) -> bool {
        matches!(self, Self::UnsupportedAlgorithm { .. })
    }

    /// Whether the error is due to a problem with the signing key
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::RequireKeyAsString { .. }
                | Self::KeyTypeMismatch { .. }
                | Self::UnidentifiableKeyType
                | Self::UnableToProcessSigningKey { .. }
        )
    }
}

#[inline]
pub(crate) fn unable_to_process_key(source: impl ToString) -> TokenGenerationError {
    TokenGenerationError::UnableToProcessSigningKey {
        reason: source.to_string(),
    }
}

#[inline]
pub(crate) fn unable_to_sign(source: impl ToString) -> TokenGenerationError {
    TokenGenerationError::UnableToSignData {
        reason: source.to_string(),
    }
}
