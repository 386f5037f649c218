//! Base64url segment encoding
//!
//! Token segments are unpadded URL-safe base64. Header and claims segments
//! hold JSON; the signature segment holds raw bytes.

use aliri_base64::Base64Url;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::SegmentError;

const PEM_LINE_LEN: usize = 64;

/// Serializes `value` as JSON and encodes the bytes as base64url
///
/// `serde_json` does not escape forward slashes, so URLs in claims are
/// encoded exactly as written.
///
/// # Errors
///
/// The value could not be serialized as JSON.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64Url::from_raw(json).to_string())
}

/// Encodes raw bytes as base64url
#[must_use]
pub fn encode_raw(data: &[u8]) -> String {
    Base64Url::from(data).to_string()
}

/// Decodes a base64url segment into raw bytes
///
/// Trailing `=` padding is accepted and ignored.
///
/// # Errors
///
/// The segment is not valid base64url.
pub fn decode(segment: &str) -> Result<Vec<u8>, SegmentError> {
    let unpadded = segment.trim_end_matches('=');
    Ok(Base64Url::from_encoded(unpadded)?.into_inner())
}

/// Decodes a base64url segment and deserializes the JSON it holds
///
/// # Errors
///
/// The segment is not valid base64url, or does not hold JSON matching `T`.
pub fn decode_json<T: DeserializeOwned>(segment: &str) -> Result<T, SegmentError> {
    let raw = decode(segment)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Wraps one base64 DER entry of an `x5c` chain in PEM armor
#[must_use]
pub fn pem_certificate(x5c_entry: &str) -> String {
    let body = x5c_entry.trim();
    let mut pem = String::with_capacity(body.len() + body.len() / PEM_LINE_LEN + 60);
    pem.push_str("-----BEGIN CERTIFICATE-----\n");

    let chars: Vec<char> = body.chars().collect();
    for line in chars.chunks(PEM_LINE_LEN) {
        pem.extend(line);
        pem.push('\n');
    }

    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::*;

    #[test]
    fn encodes_json_without_padding_or_escaped_slashes() {
        let segment = encode_json(&json!({ "iss": "https://t.example/" })).unwrap();
        assert!(!segment.contains('='));

        let raw = decode(&segment).unwrap();
        assert_eq!(raw, br#"{"iss":"https://t.example/"}"#);
    }

    #[test]
    fn uses_url_safe_alphabet() {
        assert_eq!(encode_raw(&[0xfb, 0xff, 0xbf]), "-_-_");
        assert_eq!(decode("-_-_").unwrap(), vec![0xfb, 0xff, 0xbf]);
    }

    #[test]
    fn accepts_padded_segments() {
        assert_eq!(decode("AQI=").unwrap(), vec![0x01, 0x02]);
        assert_eq!(decode("AQ==").unwrap(), vec![0x01]);
        assert_eq!(decode("AQI").unwrap(), decode("AQI=").unwrap());
    }

    #[test]
    fn rejects_standard_alphabet() {
        assert!(matches!(decode("+/+/"), Err(SegmentError::Base64(_))));
    }

    #[test]
    fn rejects_non_json_payload() {
        let segment = encode_raw(b"not json");
        let err = decode_json::<Map<String, Value>>(&segment).unwrap_err();
        assert!(matches!(err, SegmentError::Json(_)));
    }

    #[test]
    fn rejects_json_that_is_not_an_object() {
        let segment = encode_json(&json!(["a", "b"])).unwrap();
        assert!(decode_json::<Map<String, Value>>(&segment).is_err());
    }

    #[test]
    fn wraps_certificates_at_sixty_four_columns() {
        let body = "A".repeat(130);
        let pem = pem_certificate(&body);
        let lines: Vec<&str> = pem.lines().collect();

        assert_eq!(lines.first(), Some(&"-----BEGIN CERTIFICATE-----"));
        assert_eq!(lines[1].len(), 64);
        assert_eq!(lines[2].len(), 64);
        assert_eq!(lines[3].len(), 2);
        assert_eq!(lines.last(), Some(&"-----END CERTIFICATE-----"));
    }
}
