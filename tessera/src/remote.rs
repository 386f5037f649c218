//! JWKS retrieval over HTTP with `reqwest`

use std::{io::Read, time::Duration};

use once_cell::sync::Lazy;
use reqwest::blocking::Client;

use crate::{
    error::BoxError,
    jwks::{FetchResponse, JwksFetcher},
};

/// Time allowed for a single JWKS request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest JWKS document that will be read
pub const MAX_BODY_SIZE: u64 = 1024 * 1024;

static SHARED: Lazy<Option<ReqwestFetcher>> = Lazy::new(|| match ReqwestFetcher::new() {
    Ok(fetcher) => Some(fetcher),
    Err(err) => {
        let error: &dyn std::error::Error = &err;
        tracing::warn!(error, "unable to build default JWKS client");
        None
    }
});

/// The fetcher used by verifiers that were not given one
pub(crate) fn shared() -> Option<&'static ReqwestFetcher> {
    SHARED.as_ref()
}

/// A [`JwksFetcher`] backed by a blocking `reqwest` client
///
/// Redirects are not followed. Bodies larger than [`MAX_BODY_SIZE`] are
/// rejected.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    /// Builds a fetcher with the default timeout
    ///
    /// # Errors
    ///
    /// The TLS backend could not be initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Builds a fetcher that gives up on a request after `timeout`
    ///
    /// # Errors
    ///
    /// The TLS backend could not be initialized.
    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("tessera/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client })
    }

    /// Wraps an already configured client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl JwksFetcher for ReqwestFetcher {
    fn get(&self, url: &str) -> Result<FetchResponse, BoxError> {
        let response = self.client.get(url).send()?;
        let status = response.status().as_u16();

        let mut body = Vec::new();
        response.take(MAX_BODY_SIZE + 1).read_to_end(&mut body)?;

        if body.len() as u64 > MAX_BODY_SIZE {
            return Err(format!("JWKS response exceeds {MAX_BODY_SIZE} bytes").into());
        }

        Ok(FetchResponse { status, body })
    }
}
