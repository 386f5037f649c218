//! Splitting and decoding of compact JWTs

use std::fmt;

use serde_json::Value;

use crate::{
    encoding,
    error::InvalidTokenError,
    validator::Validator,
    verifier::Verifier,
    Claims, Headers,
};

const SEPARATOR: char = '.';
const DEFAULT_TYP: &str = "JWT";

/// A decoded, but not yet trusted, JWT
///
/// Parsing only proves that the token is well-formed. Call
/// [`verify()`][Parser::verify] to check the signature and
/// [`validate()`][Parser::validate] to check the claims.
pub struct Parser {
    raw: String,
    parts: [String; 3],
    headers: Headers,
    claims: Claims,
    signature: Vec<u8>,
}

impl Parser {
    /// Parses a compact `header.claims.signature` token
    ///
    /// A missing `typ` header is filled in as `"JWT"`. The raw token is
    /// kept exactly as given.
    ///
    /// # Errors
    ///
    /// The token does not have exactly three segments, or one of the
    /// segments fails to decode.
    pub fn parse(jwt: impl Into<String>) -> Result<Self, InvalidTokenError> {
        let raw = jwt.into();

        let mut segments = raw.split(SEPARATOR);
        let parts = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(h), Some(c), Some(s), None) => [h.to_owned(), c.to_owned(), s.to_owned()],
            _ => return Err(InvalidTokenError::BadSeparators),
        };

        let mut headers: Headers =
            encoding::decode_json(&parts[0]).map_err(InvalidTokenError::MalformedHeader)?;
        let claims: Claims =
            encoding::decode_json(&parts[1]).map_err(InvalidTokenError::MalformedClaims)?;
        let signature =
            encoding::decode(&parts[2]).map_err(InvalidTokenError::MalformedSignature)?;

        headers
            .entry("typ")
            .or_insert_with(|| Value::String(DEFAULT_TYP.to_owned()));

        Ok(Self {
            raw,
            parts,
            headers,
            claims,
            signature,
        })
    }

    /// A single claim
    #[must_use]
    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.claims.get(key)
    }

    /// Whether the claim is present
    #[must_use]
    pub fn has_claim(&self, key: &str) -> bool {
        self.claims.contains_key(key)
    }

    /// All claims
    #[must_use]
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// A single header
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&Value> {
        self.headers.get(key)
    }

    /// Whether the header is present
    #[must_use]
    pub fn has_header(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    /// All headers, including a defaulted `typ`
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The token exactly as it was given
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The three encoded segments
    #[must_use]
    pub fn parts(&self) -> &[String; 3] {
        &self.parts
    }

    /// The signed portion of the token: the encoded header and claims
    /// joined by `.`
    #[must_use]
    pub fn payload(&self) -> String {
        format!("{}{SEPARATOR}{}", self.parts[0], self.parts[1])
    }

    /// The decoded signature bytes
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Starts a chain of claim checks against this token
    pub fn validate(&self) -> Validator<'_> {
        Validator::new(&self.claims)
    }

    /// Checks the token's signature
    ///
    /// Returns `self` so that validation can follow directly.
    ///
    /// # Errors
    ///
    /// Any failure reported by [`Verifier::verify()`].
    pub fn verify(&self, verifier: &Verifier) -> Result<&Self, InvalidTokenError> {
        verifier.verify(&self.payload(), &self.signature, &self.headers)?;
        Ok(self)
    }
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Parser")
            .field("headers", &self.headers)
            .field("claims", &self.claims)
            .field("signature", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use serde_json::json;

    use super::*;
    use crate::{encoding::encode_json, encoding::encode_raw, error::SegmentError};

    fn token(headers: &Value, claims: &Value, signature: &[u8]) -> String {
        format!(
            "{}.{}.{}",
            encode_json(headers).unwrap(),
            encode_json(claims).unwrap(),
            encode_raw(signature)
        )
    }

    #[test]
    fn parses_segments() -> Result<()> {
        let raw = token(
            &json!({ "alg": "HS256", "typ": "at+jwt" }),
            &json!({ "sub": "user1", "aud": ["a", "b"] }),
            b"sig",
        );

        let parser = Parser::parse(raw.clone())?;

        assert_eq!(parser.raw(), raw);
        assert_eq!(parser.header("typ"), Some(&json!("at+jwt")));
        assert_eq!(parser.claim("sub"), Some(&json!("user1")));
        assert!(parser.has_claim("aud"));
        assert!(!parser.has_claim("iss"));
        assert!(parser.has_header("alg"));
        assert_eq!(parser.signature(), b"sig");
        assert_eq!(
            parser.payload(),
            format!("{}.{}", parser.parts()[0], parser.parts()[1])
        );

        Ok(())
    }

    #[test]
    fn defaults_typ_header() -> Result<()> {
        let raw = token(&json!({ "alg": "HS256" }), &json!({}), b"");
        let parser = Parser::parse(raw.clone())?;

        assert_eq!(parser.header("typ"), Some(&json!("JWT")));
        assert_eq!(parser.raw(), raw);
        assert_eq!(parser.headers().len(), 2);

        Ok(())
    }

    #[test]
    fn rejects_wrong_segment_count() {
        for raw in ["not.a.valid.jwt.with.six.parts", "onepart", "two.parts", ""] {
            let err = Parser::parse(raw).unwrap_err();
            assert!(
                matches!(err, InvalidTokenError::BadSeparators),
                "{raw}: {err}"
            );
        }
    }

    #[test]
    fn rejects_undecodable_segments() {
        let err = Parser::parse("a.b.c").unwrap_err();
        assert!(matches!(err, InvalidTokenError::MalformedHeader(_)));

        let err = Parser::parse("bm90IGpzb24.e30.").unwrap_err();
        assert!(matches!(
            err,
            InvalidTokenError::MalformedHeader(SegmentError::Json(_))
        ));

        let err = Parser::parse("!!.e30.").unwrap_err();
        assert!(matches!(
            err,
            InvalidTokenError::MalformedHeader(SegmentError::Base64(_))
        ));

        let header = encode_json(&json!({ "alg": "HS256" })).unwrap();
        let err = Parser::parse(format!("{header}.bm90IGpzb24.")).unwrap_err();
        assert!(matches!(err, InvalidTokenError::MalformedClaims(_)));

        let err = Parser::parse(format!("{header}.e30.++")).unwrap_err();
        assert!(matches!(err, InvalidTokenError::MalformedSignature(_)));
        assert!(err.is_malformed());
    }

    #[test]
    fn rejects_non_object_claims() {
        let header = encode_json(&json!({ "alg": "HS256" })).unwrap();
        let claims = encode_json(&json!("just a string")).unwrap();
        let err = Parser::parse(format!("{header}.{claims}.")).unwrap_err();
        assert!(matches!(err, InvalidTokenError::MalformedClaims(_)));
    }

    #[test]
    fn accepts_padded_signature() -> Result<()> {
        let raw = format!("{}=", token(&json!({ "alg": "HS256" }), &json!({}), b"\x01\x02"));
        let parser = Parser::parse(raw.clone())?;

        assert_eq!(parser.signature(), b"\x01\x02");
        assert_eq!(parser.raw(), raw);
        Ok(())
    }

    #[test]
    fn debug_redacts_signature() -> Result<()> {
        let parser = Parser::parse(token(&json!({ "alg": "HS256" }), &json!({}), b"\x01\x02"))?;
        let debug = format!("{parser:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(&parser.parts()[2]));
        Ok(())
    }
}
