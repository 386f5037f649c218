//! Parse, verify and validate in one place
//!
//! OpenID Connect clients handle three kinds of tokens, each with its own set
//! of required claims. [`Token`] pairs a parsed token with its kind and
//! applies the matching checks.

use std::{fmt, time::Duration};

use aliri_clock::{Clock, System};

use crate::{
    error::InvalidTokenError,
    parser::Parser,
    validator::{Validator, DEFAULT_LEEWAY},
    verifier::Verifier,
    Claims,
};

/// The role a token plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// An OpenID Connect ID token
    IdToken,
    /// An OAuth2 access token in JWT form
    AccessToken,
    /// An OpenID Connect back-channel logout token
    LogoutToken,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::IdToken => "ID token",
            Self::AccessToken => "access token",
            Self::LogoutToken => "logout token",
        })
    }
}

/// The values a token's claims are checked against
#[derive(Debug, Clone)]
#[must_use]
pub struct Expectations<C = System> {
    issuer: String,
    audience: Vec<String>,
    nonce: Option<String>,
    max_age: Option<Duration>,
    organizations: Vec<String>,
    leeway: Duration,
    clock: C,
}

impl Expectations {
    /// Expects tokens from `issuer` addressed to one of `audience`
    pub fn new<I, S>(issuer: impl Into<String>, audience: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            issuer: issuer.into(),
            audience: audience.into_iter().map(Into::into).collect(),
            nonce: None,
            max_age: None,
            organizations: Vec::new(),
            leeway: DEFAULT_LEEWAY,
            clock: System,
        }
    }
}

impl<C: Clock + Clone> Expectations<C> {
    /// Requires ID tokens to carry `nonce`
    #[inline]
    pub fn with_nonce(self, nonce: impl Into<String>) -> Self {
        Self {
            nonce: Some(nonce.into()),
            ..self
        }
    }

    /// Requires ID tokens to show an authentication within `max_age`
    #[inline]
    pub fn with_max_age(self, max_age: Duration) -> Self {
        Self {
            max_age: Some(max_age),
            ..self
        }
    }

    /// Requires `org_id` to be one of `organizations`
    pub fn with_organizations<I, S>(self, organizations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            organizations: organizations.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    /// Allows a grace period for time-based claims
    #[inline]
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// Uses `clock` to determine the current time
    pub fn with_clock<D: Clock + Clone>(self, clock: D) -> Expectations<D> {
        Expectations {
            issuer: self.issuer,
            audience: self.audience,
            nonce: self.nonce,
            max_age: self.max_age,
            organizations: self.organizations,
            leeway: self.leeway,
            clock,
        }
    }

    fn validator<'a>(&self, claims: &'a Claims) -> Validator<'a, C> {
        Validator::new(claims)
            .with_leeway(self.leeway)
            .with_clock(self.clock.clone())
    }
}

/// A parsed token of a known kind
#[derive(Debug)]
pub struct Token {
    kind: TokenKind,
    parser: Parser,
}

impl Token {
    /// Parses `jwt` as a token of `kind`
    ///
    /// # Errors
    ///
    /// The token is malformed.
    pub fn new(jwt: impl Into<String>, kind: TokenKind) -> Result<Self, InvalidTokenError> {
        Ok(Self {
            kind,
            parser: Parser::parse(jwt)?,
        })
    }

    /// The kind of token
    #[must_use]
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// The underlying parsed token
    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    /// The token's claims
    #[must_use]
    pub fn claims(&self) -> &Claims {
        self.parser.claims()
    }

    /// Checks the signature
    ///
    /// # Errors
    ///
    /// See [`Verifier::verify()`].
    pub fn verify(&self, verifier: &Verifier) -> Result<&Self, InvalidTokenError> {
        self.parser.verify(verifier)?;
        Ok(self)
    }

    /// Applies the claim checks required for this kind of token
    ///
    /// # Errors
    ///
    /// The first claim check that fails.
    pub fn validate<C: Clock + Clone>(
        &self,
        expectations: &Expectations<C>,
    ) -> Result<&Self, InvalidTokenError> {
        let v = expectations.validator(self.parser.claims());

        match self.kind {
            TokenKind::IdToken => {
                v.issuer(&expectations.issuer)?
                    .subject()?
                    .audience(&expectations.audience)?
                    .issued()?
                    .expiration()?
                    .authorized_party(&expectations.audience)?;

                if let Some(nonce) = &expectations.nonce {
                    v.nonce(nonce)?;
                }

                if let Some(max_age) = expectations.max_age {
                    v.auth_time(max_age)?;
                }

                if !expectations.organizations.is_empty() {
                    v.organization(&expectations.organizations)?;
                }
            }
            TokenKind::AccessToken => {
                v.issuer(&expectations.issuer)?
                    .audience(&expectations.audience)?
                    .issued()?
                    .expiration()?;

                if !expectations.organizations.is_empty() {
                    v.organization(&expectations.organizations)?;
                }
            }
            TokenKind::LogoutToken => {
                v.issuer(&expectations.issuer)?
                    .audience(&expectations.audience)?
                    .issued()?
                    .backchannel_logout_event()?
                    .session_or_subject()?
                    .no_nonce()?;
            }
        }

        Ok(self)
    }

    /// Gives up the kind and returns the parsed token
    pub fn into_parser(self) -> Parser {
        self.parser
    }
}
