//! Claim-by-claim checks over a decoded claims set
//!
//! Every check inspects exactly one claim (or one small group of claims)
//! and returns the validator again on success, so checks chain with `?`
//! and stop at the first failure.
//!
//! ```
//! # use tessera::{Claims, Validator};
//! # use aliri_clock::UnixTime;
//! # fn main() -> Result<(), tessera::InvalidTokenError> {
//! let claims: Claims = serde_json::from_str(
//!     r#"{"iss": "https://t.example/", "aud": "client1", "exp": 2000}"#,
//! ).unwrap();
//!
//! Validator::new(&claims)
//!     .at(UnixTime(1000))
//!     .issuer("https://t.example/")?
//!     .audience(&["client1"])?
//!     .expiration()?;
//! # Ok(())
//! # }
//! ```

use std::{borrow::Cow, time::Duration};

use aliri_clock::{Clock, System, TestClock, UnixTime};
use serde_json::Value;

use crate::{error::InvalidTokenError, Claims};

/// Default grace period applied to time-based claims
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(60);

/// The event a back-channel logout token must carry in its `events` claim
pub const BACKCHANNEL_LOGOUT_EVENT: &str = "http://schemas.openid.net/event/backchannel-logout";

/// Fluent checks over a borrowed claims set
#[derive(Debug, Clone)]
pub struct Validator<'a, C = System> {
    claims: &'a Claims,
    leeway: Duration,
    clock: C,
}

impl<'a> Validator<'a> {
    /// Validates `claims` against the system clock, with the default leeway
    pub fn new(claims: &'a Claims) -> Self {
        Self {
            claims,
            leeway: DEFAULT_LEEWAY,
            clock: System,
        }
    }
}

impl<'a, C: Clock> Validator<'a, C> {
    /// Allows a grace period for time-based claims
    #[inline]
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// Allows a grace period (in seconds) for time-based claims
    #[inline]
    pub fn with_leeway_secs(self, leeway: u64) -> Self {
        self.with_leeway(Duration::from_secs(leeway))
    }

    /// Uses `clock` to determine the current time
    #[inline]
    pub fn with_clock<D: Clock>(self, clock: D) -> Validator<'a, D> {
        Validator {
            claims: self.claims,
            leeway: self.leeway,
            clock,
        }
    }

    /// Performs time-based checks as though the current time were `now`
    #[inline]
    pub fn at(self, now: UnixTime) -> Validator<'a, TestClock> {
        self.with_clock(TestClock::new(now))
    }

    /// The configured leeway
    #[must_use]
    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// The claims being checked
    #[must_use]
    pub fn claims(&self) -> &'a Claims {
        self.claims
    }

    /// Requires `aud` to share at least one value with `expected`
    ///
    /// A single string audience is treated as a one-element list.
    ///
    /// # Errors
    ///
    /// `MissingAudienceClaim` when absent, `MismatchedAudClaim` when no
    /// audience matches.
    pub fn audience<S: AsRef<str>>(&self, expected: &[S]) -> Result<&Self, InvalidTokenError> {
        let found = self
            .audiences()
            .ok_or(InvalidTokenError::MissingAudienceClaim)?;

        if found
            .iter()
            .any(|aud| expected.iter().any(|e| e.as_ref() == *aud))
        {
            Ok(self)
        } else {
            Err(InvalidTokenError::MismatchedAudClaim {
                expected: join(expected),
                found: found.join(", "),
            })
        }
    }

    /// Requires an expected `azp` when `aud` is an array
    ///
    /// Tokens whose `aud` is a single string pass without inspecting `azp`.
    ///
    /// # Errors
    ///
    /// `MissingAzpClaim` when an array-audience token has no `azp`,
    /// `MismatchedAzpClaim` when `azp` is not one of `expected`.
    pub fn authorized_party<S: AsRef<str>>(
        &self,
        expected: &[S],
    ) -> Result<&Self, InvalidTokenError> {
        if !matches!(self.claims.get("aud"), Some(Value::Array(_))) {
            return Ok(self);
        }

        let azp = self
            .claims
            .get("azp")
            .ok_or(InvalidTokenError::MissingAzpClaim)?;
        let azp = text(azp);

        if expected.iter().any(|e| e.as_ref() == azp) {
            Ok(self)
        } else {
            Err(InvalidTokenError::MismatchedAzpClaim {
                expected: join(expected),
                found: azp.into_owned(),
            })
        }
    }

    /// Requires the end-user to have authenticated within `max_age`
    ///
    /// # Errors
    ///
    /// `MissingAuthTimeClaim` when absent, `MismatchedAuthTimeClaim` when
    /// `auth_time + max_age + leeway` has passed.
    pub fn auth_time(&self, max_age: Duration) -> Result<&Self, InvalidTokenError> {
        let auth_time = self
            .time_claim("auth_time")
            .ok_or(InvalidTokenError::MissingAuthTimeClaim)?;

        let now = self.clock.now().0;
        let valid_until = auth_time
            .saturating_add(max_age.as_secs())
            .saturating_add(self.leeway.as_secs());

        if now > valid_until {
            return Err(InvalidTokenError::MismatchedAuthTimeClaim { now, valid_until });
        }

        Ok(self)
    }

    /// Requires the token not to have expired
    ///
    /// # Errors
    ///
    /// `MissingExpClaim` when absent, `MismatchedExpClaim` when
    /// `exp + leeway` has passed.
    pub fn expiration(&self) -> Result<&Self, InvalidTokenError> {
        let exp = self
            .time_claim("exp")
            .ok_or(InvalidTokenError::MissingExpClaim)?;

        let now = self.clock.now().0;
        let expires = exp.saturating_add(self.leeway.as_secs());

        if now > expires {
            return Err(InvalidTokenError::MismatchedExpClaim { now, expires });
        }

        Ok(self)
    }

    /// Requires the token to be valid already
    ///
    /// # Errors
    ///
    /// `MissingNbfClaim` when absent, `MismatchedNbfClaim` when
    /// `nbf - leeway` is still in the future.
    pub fn not_before(&self) -> Result<&Self, InvalidTokenError> {
        let nbf = self
            .time_claim("nbf")
            .ok_or(InvalidTokenError::MissingNbfClaim)?;

        let now = self.clock.now().0;
        let not_before = nbf.saturating_sub(self.leeway.as_secs());

        if now < not_before {
            return Err(InvalidTokenError::MismatchedNbfClaim { now, not_before });
        }

        Ok(self)
    }

    /// Requires an `iat` claim
    ///
    /// # Errors
    ///
    /// `MissingIatClaim` when absent.
    pub fn issued(&self) -> Result<&Self, InvalidTokenError> {
        if !self.claims.contains_key("iat") {
            return Err(InvalidTokenError::MissingIatClaim);
        }

        Ok(self)
    }

    /// Requires `iss` to equal `expected` exactly
    ///
    /// # Errors
    ///
    /// `MissingIssClaim` when absent, `MismatchedIssClaim` otherwise.
    pub fn issuer(&self, expected: &str) -> Result<&Self, InvalidTokenError> {
        let iss = self
            .claims
            .get("iss")
            .ok_or(InvalidTokenError::MissingIssClaim)?;
        let iss = text(iss);

        if iss != expected {
            return Err(InvalidTokenError::MismatchedIssClaim {
                expected: expected.to_owned(),
                found: iss.into_owned(),
            });
        }

        Ok(self)
    }

    /// Requires `nonce` to equal `expected` exactly
    ///
    /// # Errors
    ///
    /// `MissingNonceClaim` when absent, `MismatchedNonceClaim` otherwise.
    pub fn nonce(&self, expected: &str) -> Result<&Self, InvalidTokenError> {
        let nonce = self
            .claims
            .get("nonce")
            .ok_or(InvalidTokenError::MissingNonceClaim)?;
        let nonce = text(nonce);

        if nonce != expected {
            return Err(InvalidTokenError::MismatchedNonceClaim {
                expected: expected.to_owned(),
                found: nonce.into_owned(),
            });
        }

        Ok(self)
    }

    /// Requires `org_id` to be one of `expected`
    ///
    /// # Errors
    ///
    /// `MissingOrgIdClaim` when absent, `MismatchedOrgIdClaim` otherwise.
    pub fn organization<S: AsRef<str>>(&self, expected: &[S]) -> Result<&Self, InvalidTokenError> {
        let org = self
            .claims
            .get("org_id")
            .ok_or(InvalidTokenError::MissingOrgIdClaim)?;
        let org = text(org);

        if expected.iter().any(|e| e.as_ref() == org) {
            Ok(self)
        } else {
            Err(InvalidTokenError::MismatchedOrgIdClaim {
                expected: join(expected),
                found: org.into_owned(),
            })
        }
    }

    /// Requires a `sub` claim
    ///
    /// # Errors
    ///
    /// `MissingSubClaim` when absent.
    pub fn subject(&self) -> Result<&Self, InvalidTokenError> {
        if !self.claims.contains_key("sub") {
            return Err(InvalidTokenError::MissingSubClaim);
        }

        Ok(self)
    }

    /// Requires the back-channel logout event in the `events` claim
    ///
    /// # Errors
    ///
    /// `MissingEventsClaim` when absent, `MismatchedEventsClaim` when the
    /// claim is not an object holding the logout event.
    pub fn backchannel_logout_event(&self) -> Result<&Self, InvalidTokenError> {
        let events = self
            .claims
            .get("events")
            .ok_or(InvalidTokenError::MissingEventsClaim)?;

        match events {
            Value::Object(events) if events.contains_key(BACKCHANNEL_LOGOUT_EVENT) => Ok(self),
            _ => Err(InvalidTokenError::MismatchedEventsClaim {
                expected: BACKCHANNEL_LOGOUT_EVENT,
            }),
        }
    }

    /// Requires that no `nonce` claim is present
    ///
    /// # Errors
    ///
    /// `UnexpectedNonceClaim` when a nonce is present.
    pub fn no_nonce(&self) -> Result<&Self, InvalidTokenError> {
        if self.claims.contains_key("nonce") {
            return Err(InvalidTokenError::UnexpectedNonceClaim);
        }

        Ok(self)
    }

    /// Requires a `sid` or `sub` claim
    ///
    /// # Errors
    ///
    /// `MissingSidOrSubClaim` when both are absent.
    pub fn session_or_subject(&self) -> Result<&Self, InvalidTokenError> {
        if !self.claims.contains_key("sid") && !self.claims.contains_key("sub") {
            return Err(InvalidTokenError::MissingSidOrSubClaim);
        }

        Ok(self)
    }

    fn audiences(&self) -> Option<Vec<&'a str>> {
        match self.claims.get("aud")? {
            Value::String(aud) => Some(vec![aud.as_str()]),
            Value::Array(auds) => Some(auds.iter().filter_map(Value::as_str).collect()),
            _ => None,
        }
    }

    /// A seconds-since-epoch claim; non-numeric values count as absent
    fn time_claim(&self, key: &str) -> Option<u64> {
        let value = self.claims.get(key)?;
        value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|t| t.is_finite() && *t >= 0.0)
                .map(|t| t as u64)
        })
    }
}

fn text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

fn join<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use serde_json::json;

    use super::*;
    use crate::test;

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn chains_until_first_failure() -> Result<()> {
        let claims = test::claims(json!({
            "iss": "https://t.example/",
            "sub": "user1",
            "aud": "client1",
            "exp": NOW + 1000,
            "iat": NOW - 1000,
            "nonce": "n1",
        }));

        Validator::new(&claims)
            .at(UnixTime(NOW))
            .issuer("https://t.example/")?
            .audience(&["client1"])?
            .nonce("n1")?
            .expiration()?
            .issued()?
            .subject()?;

        let err = Validator::new(&claims)
            .issuer("https://other.example/")
            .and_then(|v| v.nonce("wrong"))
            .unwrap_err();
        assert!(matches!(err, InvalidTokenError::MismatchedIssClaim { .. }));

        Ok(())
    }

    #[test]
    fn checks_only_the_named_claim() -> Result<()> {
        let claims = test::claims(json!({ "aud": ["a", "b"], "exp": NOW - 10 }));
        let validator = Validator::new(&claims).at(UnixTime(NOW)).with_leeway_secs(0);

        validator.audience(&["b", "c"])?;

        let err = validator.expiration().unwrap_err();
        match err {
            InvalidTokenError::MismatchedExpClaim { now, expires } => {
                assert_eq!(now, NOW);
                assert_eq!(expires, NOW - 10);
            }
            other => panic!("unexpected error: {other}"),
        }

        Ok(())
    }

    #[test]
    fn audience_reports_both_sides() {
        let claims = test::claims(json!({ "aud": ["a", "b"] }));
        let err = Validator::new(&claims).audience(&["x", "y"]).unwrap_err();

        assert_eq!(err.claim(), Some("aud"));
        let message = err.to_string();
        assert!(message.contains("x, y"), "{message}");
        assert!(message.contains("a, b"), "{message}");

        let empty = test::claims(json!({}));
        assert!(matches!(
            Validator::new(&empty).audience(&["x"]),
            Err(InvalidTokenError::MissingAudienceClaim)
        ));
    }

    #[test]
    fn authorized_party_only_applies_to_audience_arrays() -> Result<()> {
        let single = test::claims(json!({ "aud": "client1" }));
        Validator::new(&single).authorized_party(&["someone-else"])?;

        let one_element = test::claims(json!({ "aud": ["client1"] }));
        assert!(matches!(
            Validator::new(&one_element).authorized_party(&["client1"]),
            Err(InvalidTokenError::MissingAzpClaim)
        ));

        let multiple = test::claims(json!({ "aud": ["client1", "api"] }));
        assert!(matches!(
            Validator::new(&multiple).authorized_party(&["client1"]),
            Err(InvalidTokenError::MissingAzpClaim)
        ));

        let with_azp = test::claims(json!({ "aud": ["client1", "api"], "azp": "client1" }));
        Validator::new(&with_azp).authorized_party(&["client1"])?;
        assert!(matches!(
            Validator::new(&with_azp).authorized_party(&["client2"]),
            Err(InvalidTokenError::MismatchedAzpClaim { .. })
        ));

        Ok(())
    }

    #[test]
    fn auth_time_includes_max_age_and_leeway() -> Result<()> {
        let claims = test::claims(json!({ "auth_time": NOW - 330 }));
        let max_age = Duration::from_secs(300);

        Validator::new(&claims)
            .at(UnixTime(NOW))
            .auth_time(max_age)?;

        let err = Validator::new(&claims)
            .at(UnixTime(NOW))
            .with_leeway_secs(0)
            .auth_time(max_age)
            .unwrap_err();
        match err {
            InvalidTokenError::MismatchedAuthTimeClaim { now, valid_until } => {
                assert_eq!(now, NOW);
                assert_eq!(valid_until, NOW - 30);
            }
            other => panic!("unexpected error: {other}"),
        }

        let missing = test::claims(json!({}));
        assert!(matches!(
            Validator::new(&missing).auth_time(max_age),
            Err(InvalidTokenError::MissingAuthTimeClaim)
        ));

        Ok(())
    }

    #[test]
    fn expiration_respects_leeway() -> Result<()> {
        let claims = test::claims(json!({ "exp": NOW - 30 }));
        Validator::new(&claims).at(UnixTime(NOW)).expiration()?;

        assert!(Validator::new(&claims)
            .at(UnixTime(NOW + 31))
            .expiration()
            .is_err());

        let string_exp = test::claims(json!({ "exp": "tomorrow" }));
        assert!(matches!(
            Validator::new(&string_exp).expiration(),
            Err(InvalidTokenError::MissingExpClaim)
        ));

        Ok(())
    }

    #[test]
    fn not_before_respects_leeway() -> Result<()> {
        let claims = test::claims(json!({ "nbf": NOW + 30 }));
        Validator::new(&claims).at(UnixTime(NOW)).not_before()?;

        let err = Validator::new(&claims)
            .at(UnixTime(NOW))
            .with_leeway_secs(10)
            .not_before()
            .unwrap_err();
        match err {
            InvalidTokenError::MismatchedNbfClaim { now, not_before } => {
                assert_eq!(now, NOW);
                assert_eq!(not_before, NOW + 20);
            }
            other => panic!("unexpected error: {other}"),
        }

        Ok(())
    }

    #[test]
    fn string_claims_must_match_exactly() {
        let claims = test::claims(json!({
            "iss": "https://t.example",
            "nonce": "n1",
            "org_id": "org_1",
        }));
        let validator = Validator::new(&claims);

        assert!(validator.issuer("https://t.example/").is_err());
        assert!(validator.nonce("N1").is_err());
        assert!(validator.organization(&["org_1", "org_2"]).is_ok());

        let err = validator.organization(&["org_2"]).unwrap_err();
        assert!(err.is_mismatched_claim());
        assert_eq!(err.claim(), Some("org_id"));

        let empty = test::claims(json!({}));
        let validator = Validator::new(&empty);
        assert!(matches!(
            validator.issuer("x"),
            Err(InvalidTokenError::MissingIssClaim)
        ));
        assert!(matches!(
            validator.nonce("x"),
            Err(InvalidTokenError::MissingNonceClaim)
        ));
        assert!(matches!(
            validator.organization(&["x"]),
            Err(InvalidTokenError::MissingOrgIdClaim)
        ));
        assert!(matches!(
            validator.subject(),
            Err(InvalidTokenError::MissingSubClaim)
        ));
        assert!(matches!(
            validator.issued(),
            Err(InvalidTokenError::MissingIatClaim)
        ));
    }

    #[test]
    fn logout_checks() -> Result<()> {
        let claims = test::claims(json!({
            "sid": "session1",
            "events": { BACKCHANNEL_LOGOUT_EVENT: {} },
        }));
        Validator::new(&claims)
            .backchannel_logout_event()?
            .no_nonce()?
            .session_or_subject()?;

        let wrong_event = test::claims(json!({ "events": { "other": {} }, "nonce": "n" }));
        let validator = Validator::new(&wrong_event);
        assert!(matches!(
            validator.backchannel_logout_event(),
            Err(InvalidTokenError::MismatchedEventsClaim { .. })
        ));
        assert!(matches!(
            validator.no_nonce(),
            Err(InvalidTokenError::UnexpectedNonceClaim)
        ));
        assert!(matches!(
            validator.session_or_subject(),
            Err(InvalidTokenError::MissingSidOrSubClaim)
        ));

        let empty = test::claims(json!({}));
        assert!(matches!(
            Validator::new(&empty).backchannel_logout_event(),
            Err(InvalidTokenError::MissingEventsClaim)
        ));

        Ok(())
    }
}
