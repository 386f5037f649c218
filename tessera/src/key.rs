//! Signing and verification keys
//!
//! HMAC algorithms take a shared secret string. RSA algorithms take a
//! structured private key, either already loaded or imported from PEM text
//! with an optional passphrase. Mixing the two is an error.

use std::{fmt, sync::Arc};

use openssl::{
    pkey::{Id, PKey, Private},
    x509::X509,
};
use ring::{
    rand::SystemRandom,
    signature::{RsaKeyPair, RsaPublicKeyComponents},
};

use crate::{
    encoding,
    error::{self, InvalidTokenError, TokenGenerationError},
    jwa::{Algorithm, AlgorithmFamily},
};

const RSA: &str = "RSA";

/// A key used to sign tokens
#[must_use]
pub enum SigningKey {
    /// Text key material
    ///
    /// Used verbatim as the secret for HMAC algorithms, or parsed as a PEM
    /// private key for RSA algorithms.
    Secret(String),

    /// A structured private key
    Private(PKey<Private>),
}

impl SigningKey {
    /// Wraps a shared secret or PEM document
    pub fn secret(secret: impl Into<String>) -> Self {
        Self::Secret(secret.into())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Secret(_) => f.write_str("SigningKey::Secret(<redacted>)"),
            Self::Private(k) => f
                .debug_struct("SigningKey::Private")
                .field("type", &key_type_name(k.id()).unwrap_or("unknown"))
                .field("bits", &k.bits())
                .finish(),
        }
    }
}

impl From<String> for SigningKey {
    fn from(secret: String) -> Self {
        Self::Secret(secret)
    }
}

impl From<&'_ str> for SigningKey {
    fn from(secret: &str) -> Self {
        Self::Secret(secret.to_owned())
    }
}

impl From<PKey<Private>> for SigningKey {
    fn from(key: PKey<Private>) -> Self {
        Self::Private(key)
    }
}

/// Key material prepared for a single algorithm
pub(crate) enum LoadedKey {
    Hmac(ring::hmac::Key),
    Rsa(Arc<RsaKeyPair>),
}

impl fmt::Debug for LoadedKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Hmac(_) => f.write_str("Hmac { secret }"),
            Self::Rsa(k) => f
                .debug_struct("Rsa")
                .field("modulus_len", &k.public().modulus_len())
                .field("private_key", &"<redacted>")
                .finish(),
        }
    }
}

impl LoadedKey {
    /// Validates `key` against `alg` and prepares it for signing
    pub(crate) fn load(
        key: &SigningKey,
        alg: Algorithm,
        passphrase: Option<&str>,
    ) -> Result<Self, TokenGenerationError> {
        match alg.family() {
            AlgorithmFamily::Hmac => match key {
                SigningKey::Secret(secret) => {
                    let hmac = alg
                        .hmac_algorithm()
                        .ok_or(TokenGenerationError::UnsupportedAlgorithm {
                            algorithm: alg.to_string(),
                        })?;
                    Ok(Self::Hmac(ring::hmac::Key::new(hmac, secret.as_bytes())))
                }
                SigningKey::Private(_) => {
                    Err(TokenGenerationError::RequireKeyAsString { algorithm: alg })
                }
            },
            AlgorithmFamily::Rsa => Self::load_rsa(key, passphrase),
        }
    }

    fn load_rsa(key: &SigningKey, passphrase: Option<&str>) -> Result<Self, TokenGenerationError> {
        let pkey = match key {
            SigningKey::Secret(pem) => match passphrase {
                Some(p) => PKey::private_key_from_pem_passphrase(pem.as_bytes(), p.as_bytes()),
                None => PKey::private_key_from_pem(pem.as_bytes()),
            }
            .map_err(error::unable_to_process_key)?,
            SigningKey::Private(pkey) => pkey.clone(),
        };

        match key_type_name(pkey.id()) {
            Some(RSA) => {}
            Some(found) => {
                return Err(TokenGenerationError::KeyTypeMismatch {
                    expected: RSA,
                    found: found.to_owned(),
                })
            }
            None => return Err(TokenGenerationError::UnidentifiableKeyType),
        }

        let der = pkey
            .rsa()
            .and_then(|rsa| rsa.private_key_to_der())
            .map_err(error::unable_to_process_key)?;

        let pair = RsaKeyPair::from_der(&der).map_err(error::unable_to_process_key)?;

        Ok(Self::Rsa(Arc::new(pair)))
    }

    /// Signs `data` using the digest paired with `alg`
    pub(crate) fn sign(&self, alg: Algorithm, data: &[u8]) -> Result<Vec<u8>, TokenGenerationError> {
        match self {
            Self::Hmac(key) => Ok(ring::hmac::sign(key, data).as_ref().to_owned()),
            Self::Rsa(pair) => {
                let params = alg
                    .rsa_signing_params()
                    .ok_or_else(|| error::unable_to_sign(format!("{alg} is not an RSA algorithm")))?;

                let mut buf = vec![0; pair.public().modulus_len()];
                pair.sign(params, &SystemRandom::new(), data, &mut buf)
                    .map_err(error::unable_to_sign)?;
                Ok(buf)
            }
        }
    }
}

/// Verifies an HMAC signature in constant time
pub(crate) fn verify_hmac(
    alg: Algorithm,
    secret: &str,
    data: &[u8],
    signature: &[u8],
) -> Result<(), InvalidTokenError> {
    let hmac = alg
        .hmac_algorithm()
        .ok_or(InvalidTokenError::UnsupportedSigningAlgorithm {
            found: alg.to_string(),
        })?;
    let key = ring::hmac::Key::new(hmac, secret.as_bytes());
    ring::hmac::verify(&key, data, signature).map_err(|_| InvalidTokenError::BadSignature)
}

/// The public key carried by a JWKS certificate
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum CertificateKey {
    Rsa(RsaPublicKey),
    Other(String),
}

/// RSA public key components
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RsaPublicKey {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
}

impl RsaPublicKey {
    pub(crate) fn verify(
        &self,
        alg: Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), InvalidTokenError> {
        let params =
            alg.rsa_verification_params()
                .ok_or(InvalidTokenError::UnsupportedSigningAlgorithm {
                    found: alg.to_string(),
                })?;

        let pk = RsaPublicKeyComponents {
            n: self.modulus.as_slice(),
            e: self.exponent.as_slice(),
        };

        pk.verify(params, data, signature)
            .map_err(|_| InvalidTokenError::BadSignature)
    }
}

impl CertificateKey {
    /// Extracts the public key from the leading `x5c` certificate
    pub(crate) fn from_x5c(x5c_entry: &str) -> Result<Self, openssl::error::ErrorStack> {
        let pem = encoding::pem_certificate(x5c_entry);
        let cert = X509::from_pem(pem.as_bytes())?;
        let pkey = cert.public_key()?;

        match key_type_name(pkey.id()) {
            Some(RSA) => {
                let rsa = pkey.rsa()?;
                Ok(Self::Rsa(RsaPublicKey {
                    modulus: rsa.n().to_vec(),
                    exponent: rsa.e().to_vec(),
                }))
            }
            Some(other) => Ok(Self::Other(other.to_owned())),
            None => Ok(Self::Other("an unknown key type".to_owned())),
        }
    }
}

fn key_type_name(id: Id) -> Option<&'static str> {
    if id == Id::RSA {
        Some(RSA)
    } else if id == Id::EC {
        Some("EC")
    } else if id == Id::DSA {
        Some("DSA")
    } else if id == Id::DH {
        Some("DH")
    } else if id == Id::HMAC {
        Some("HMAC")
    } else {
        None
    }
}
