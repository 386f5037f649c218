//! JSON Web Algorithms supported for signing and verification
//!
//! Only the HMAC (`HS*`) and RSA PKCS #1 v1.5 (`RS*`) families are
//! supported. The lookup tables from an algorithm to its `ring` primitives
//! are plain `match` expressions.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::TokenGenerationError;

/// A JWS signing algorithm
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(clippy::upper_case_acronyms)]
pub enum Algorithm {
    /// HMAC using SHA-256
    HS256,
    /// HMAC using SHA-384
    HS384,
    /// HMAC using SHA-512
    HS512,
    /// RSASSA-PKCS1-v1_5 using SHA-256
    RS256,
    /// RSASSA-PKCS1-v1_5 using SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 using SHA-512
    RS512,
}

/// The key family an algorithm belongs to
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum AlgorithmFamily {
    /// Symmetric keyed hashing with a shared secret
    Hmac,
    /// Asymmetric signatures with an RSA key pair
    Rsa,
}

impl Algorithm {
    /// Every supported algorithm
    pub const ALL: [Algorithm; 6] = [
        Self::HS256,
        Self::HS384,
        Self::HS512,
        Self::RS256,
        Self::RS384,
        Self::RS512,
    ];

    /// The JOSE name of the algorithm
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
        }
    }

    /// The key family used by the algorithm
    #[must_use]
    pub const fn family(self) -> AlgorithmFamily {
        match self {
            Self::HS256 | Self::HS384 | Self::HS512 => AlgorithmFamily::Hmac,
            Self::RS256 | Self::RS384 | Self::RS512 => AlgorithmFamily::Rsa,
        }
    }

    /// Whether the algorithm uses a shared secret
    #[must_use]
    pub const fn is_hmac(self) -> bool {
        matches!(self.family(), AlgorithmFamily::Hmac)
    }

    /// Whether the algorithm uses an RSA key pair
    #[must_use]
    pub const fn is_rsa(self) -> bool {
        matches!(self.family(), AlgorithmFamily::Rsa)
    }

    /// The name of the digest paired with the algorithm
    #[must_use]
    pub const fn digest_name(self) -> &'static str {
        match self {
            Self::HS256 | Self::RS256 => "sha256",
            Self::HS384 | Self::RS384 => "sha384",
            Self::HS512 | Self::RS512 => "sha512",
        }
    }

    pub(crate) fn hmac_algorithm(self) -> Option<ring::hmac::Algorithm> {
        match self {
            Self::HS256 => Some(ring::hmac::HMAC_SHA256),
            Self::HS384 => Some(ring::hmac::HMAC_SHA384),
            Self::HS512 => Some(ring::hmac::HMAC_SHA512),
            _ => None,
        }
    }

    pub(crate) fn rsa_verification_params(
        self,
    ) -> Option<&'static ring::signature::RsaParameters> {
        match self {
            Self::RS256 => Some(&ring::signature::RSA_PKCS1_2048_8192_SHA256),
            Self::RS384 => Some(&ring::signature::RSA_PKCS1_2048_8192_SHA384),
            Self::RS512 => Some(&ring::signature::RSA_PKCS1_2048_8192_SHA512),
            _ => None,
        }
    }

    pub(crate) fn rsa_signing_params(self) -> Option<&'static dyn ring::signature::RsaEncoding> {
        match self {
            Self::RS256 => Some(&ring::signature::RSA_PKCS1_SHA256),
            Self::RS384 => Some(&ring::signature::RSA_PKCS1_SHA384),
            Self::RS512 => Some(&ring::signature::RSA_PKCS1_SHA512),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for Algorithm {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl FromStr for Algorithm {
    type Err = TokenGenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| TokenGenerationError::UnsupportedAlgorithm {
                algorithm: s.to_owned(),
            })
    }
}

impl TryFrom<&'_ str> for Algorithm {
    type Error = TokenGenerationError;

    #[inline]
    fn try_from(value: &'_ str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_supported_name() {
        for alg in Algorithm::ALL {
            assert_eq!(alg.as_str().parse::<Algorithm>().unwrap(), alg);
        }
    }

    #[test]
    fn rejects_unknown_names() {
        for name in ["none", "ES256", "PS256", "hs256", ""] {
            let err = name.parse::<Algorithm>().unwrap_err();
            assert!(err.is_unsupported_algorithm(), "{name} was accepted");
        }
    }

    #[test]
    fn maps_to_digest() {
        assert_eq!(Algorithm::HS384.digest_name(), "sha384");
        assert_eq!(Algorithm::RS512.digest_name(), "sha512");
        assert!(Algorithm::HS256.hmac_algorithm().is_some());
        assert!(Algorithm::HS256.rsa_verification_params().is_none());
        assert!(Algorithm::RS256.rsa_signing_params().is_some());
        assert!(Algorithm::RS256.hmac_algorithm().is_none());
    }

    #[test]
    fn serializes_as_jose_name() {
        let json = serde_json::to_string(&Algorithm::RS384).unwrap();
        assert_eq!(json, "\"RS384\"");
        let alg: Algorithm = serde_json::from_str("\"HS512\"").unwrap();
        assert_eq!(alg, Algorithm::HS512);
    }
}
