//! FHIR REST client.
//!
//! Provides an async HTTP client with:
//! - Connection pooling via reqwest, shared by every session
//! - Bearer-token reads and searches against a per-session base URL
//! - OAuth endpoint discovery (SMART configuration, then CapabilityStatement)

use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use url::Url;

use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::models::{Bundle, CapabilityStatement, OAuthEndpoints, SmartConfiguration};

/// Accept header sent with every FHIR request.
const FHIR_ACCEPT: &str = "application/fhir+json, application/json+fhir;q=0.9, application/json;q=0.8";

/// FHIR REST client.
///
/// Holds no server or token of its own; callers pass the base URL and bearer
/// token of the session they act for.
#[derive(Clone)]
pub struct FhirClient {
    /// HTTP client.
    client: Client,
}

impl FhirClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(FHIR_ACCEPT));

        let mut builder = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .gzip(true);

        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self { client: builder.build()? })
    }

    /// Underlying HTTP client, for non-FHIR calls such as the token endpoint.
    #[must_use]
    pub const fn http(&self) -> &Client {
        &self.client
    }

    /// Read a resource by relative path (e.g. `Patient/123`) as raw JSON.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or non-success status.
    pub async fn read_json(
        &self,
        base: &Url,
        path: &str,
        bearer: Option<&str>,
    ) -> ClientResult<serde_json::Value> {
        let url = base.join(path)?;
        self.get(url, bearer).await
    }

    /// Read a resource by relative path and decode it.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, non-success status, or a body
    /// that does not fit `T`.
    pub async fn read<T>(&self, base: &Url, path: &str, bearer: Option<&str>) -> ClientResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let value = self.read_json(base, path, bearer).await?;
        serde_json::from_value(value).map_err(ClientError::from)
    }

    /// Search a resource type.
    ///
    /// # Errors
    ///
    /// Returns error on API failure.
    pub async fn search(
        &self,
        base: &Url,
        resource_type: &str,
        params: &[(&str, &str)],
        bearer: Option<&str>,
    ) -> ClientResult<Bundle> {
        let mut url = base.join(resource_type)?;
        {
            let mut query = url.query_pairs_mut();
            for (k, v) in params {
                query.append_pair(k, v);
            }
        }

        let value = self.get(url, bearer).await?;
        serde_json::from_value(value).map_err(ClientError::from)
    }

    /// Discover the OAuth endpoints of the server at `base`.
    ///
    /// Tries `.well-known/smart-configuration` first and falls back to the
    /// CapabilityStatement's security extension. A server that advertises
    /// neither is reported as open (no authorize endpoint).
    ///
    /// # Errors
    ///
    /// Returns error if the `metadata` fallback fails.
    pub async fn discover(&self, base: &Url) -> ClientResult<OAuthEndpoints> {
        let well_known = base.join(".well-known/smart-configuration")?;
        match self.get(well_known, None).await {
            Ok(value) => match serde_json::from_value::<SmartConfiguration>(value) {
                Ok(conf) if conf.authorization_endpoint.is_some() => {
                    tracing::debug!(base = %base, "Discovered endpoints from smart-configuration");
                    return Ok(conf.into());
                }
                Ok(_) => tracing::debug!(base = %base, "smart-configuration has no endpoints"),
                Err(e) => tracing::debug!(base = %base, error = %e, "Unreadable smart-configuration"),
            },
            Err(e) => tracing::debug!(base = %base, error = %e, "No smart-configuration"),
        }

        let capability: CapabilityStatement = self.read(base, "metadata", None).await?;
        let endpoints = capability.oauth_endpoints();
        tracing::debug!(
            base = %base,
            fhir_version = ?capability.fhir_version,
            open = endpoints.is_open(),
            "Discovered endpoints from metadata"
        );
        Ok(endpoints)
    }

    /// Make a GET request.
    async fn get(&self, url: Url, bearer: Option<&str>) -> ClientResult<serde_json::Value> {
        tracing::debug!(url = %url, "FHIR GET");

        let mut request = self.client.get(url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let response = Self::handle_response(response).await?;
        Ok(response.json().await?)
    }

    /// Handle API response status codes.
    async fn handle_response(response: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(ClientError::unauthorized(status.as_u16(), text)),
            404 => Err(ClientError::not_found(text)),
            400 => Err(ClientError::bad_request(text)),
            500..=599 => Err(ClientError::server(status.as_u16(), text)),
            _ => Err(ClientError::UnexpectedStatus { status: status.as_u16(), message: text }),
        }
    }
}

impl std::fmt::Debug for FhirClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FhirClient").finish()
    }
}
