//! The SMART client: one session's view of a FHIR server.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use url::Url;

use super::pkce;
use super::state::{ClientState, PendingAuthorization, TokenSet};
use crate::client::FhirClient;
use crate::config::SmartSettings;
use crate::error::{AuthError, AuthResult, ClientResult};
use crate::models::{Bundle, OAuthEndpoints, Patient};

/// Successful completion of the authorization-code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized {
    /// Patient the token is bound to, if the server supplied one.
    pub patient_id: Option<String>,
    /// Scopes actually granted.
    pub scope: Option<String>,
}

/// Token endpoint response (RFC 6749 §5.1 plus SMART launch context).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    patient: Option<String>,
}

/// SMART-on-FHIR client bound to one session's state.
///
/// Built per request by [`SmartClient::from_session`]; handlers save
/// [`SmartClient::state`] back to the session when
/// [`SmartClient::has_changed`] reports a mutation.
pub struct SmartClient {
    state: ClientState,
    base: Url,
    fhir: FhirClient,
    client_secret: Option<String>,
    changed: bool,
    patient: Option<Patient>,
}

impl SmartClient {
    /// Open a fresh, unauthenticated client.
    ///
    /// # Errors
    ///
    /// Returns error if the API base is not an absolute URL.
    pub fn new(
        settings: SmartSettings,
        fhir: FhirClient,
        client_secret: Option<String>,
    ) -> ClientResult<Self> {
        Self::resume(ClientState::new(settings), fhir, client_secret)
    }

    /// Rebuild a client from saved state.
    ///
    /// # Errors
    ///
    /// Returns error if the stored API base is not an absolute URL.
    pub fn resume(
        state: ClientState,
        fhir: FhirClient,
        client_secret: Option<String>,
    ) -> ClientResult<Self> {
        let base = Url::parse(&state.settings.api_base)?;
        Ok(Self { state, base, fhir, client_secret, changed: false, patient: None })
    }

    /// Resume from the session's state if there is one, else start from defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the API base is not an absolute URL.
    pub fn from_session(
        saved: Option<ClientState>,
        defaults: &SmartSettings,
        fhir: FhirClient,
        client_secret: Option<String>,
    ) -> ClientResult<Self> {
        match saved {
            Some(state) => Self::resume(state, fhir, client_secret),
            None => Self::new(defaults.clone(), fhir, client_secret),
        }
    }

    /// Current state, for saving.
    #[must_use]
    pub const fn state(&self) -> &ClientState {
        &self.state
    }

    /// Whether the state changed since the client was built.
    #[must_use]
    pub const fn has_changed(&self) -> bool {
        self.changed
    }

    /// FHIR base URL this client talks to.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.state.settings.api_base
    }

    /// True once an access token has been obtained.
    ///
    /// The token may still have expired; use [`SmartClient::patient`] to find out.
    #[must_use]
    pub const fn ready(&self) -> bool {
        self.state.token.is_some()
    }

    /// Patient id granted with the token.
    #[must_use]
    pub fn patient_id(&self) -> Option<&str> {
        self.state.patient_id.as_deref()
    }

    fn access_token(&self) -> Option<&str> {
        self.state.token.as_ref().map(|t| t.access_token.as_str())
    }

    /// Resolve the patient in context.
    ///
    /// Returns `None` when not authorized, when no patient was granted, or
    /// when the access token has expired or is refused by the server.
    ///
    /// # Errors
    ///
    /// Returns error on transport failures other than 401/403.
    pub async fn patient(&mut self) -> ClientResult<Option<Patient>> {
        if let Some(ref patient) = self.patient {
            return Ok(Some(patient.clone()));
        }

        let (Some(token), Some(patient_id)) =
            (self.state.token.as_ref(), self.state.patient_id.as_deref())
        else {
            return Ok(None);
        };

        if token.is_expired() {
            tracing::info!(patient_id, "Access token expired, patient unresolved");
            return Ok(None);
        }

        let path = format!("Patient/{patient_id}");
        let result =
            self.fhir.read::<Patient>(&self.base, &path, Some(token.access_token.as_str())).await;

        match result {
            Ok(patient) => {
                self.patient = Some(patient.clone());
                Ok(Some(patient))
            }
            Err(e) if e.is_unauthorized() => {
                tracing::warn!(error = %e, "Patient read refused, treating as unauthorized");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Build the authorize URL and remember the pending request.
    ///
    /// Returns `None` for servers that advertise no authorization endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if discovery fails or the endpoint is not a URL.
    pub async fn authorize_url(&mut self) -> ClientResult<Option<String>> {
        let Some(authorize) = self.endpoints().await?.authorize.clone() else {
            return Ok(None);
        };

        let pending = PendingAuthorization {
            state: uuid::Uuid::new_v4().simple().to_string(),
            code_verifier: pkce::generate_verifier(),
        };

        let settings = &self.state.settings;
        let mut url = Url::parse(&authorize)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &settings.app_id)
                .append_pair("redirect_uri", &settings.redirect_uri)
                .append_pair("scope", &settings.scope)
                .append_pair("state", &pending.state)
                .append_pair("aud", &settings.api_base);
            if let Some(ref launch) = settings.launch_token {
                query.append_pair("launch", launch);
            }
            query
                .append_pair("code_challenge", &pkce::challenge_s256(&pending.code_verifier))
                .append_pair("code_challenge_method", "S256");
        }

        tracing::info!(
            api_base = %settings.api_base,
            launch = settings.launch_token.is_some(),
            "Issued authorize URL"
        );

        self.state.pending = Some(pending);
        self.changed = true;
        Ok(Some(url.into()))
    }

    /// Complete the authorization-code exchange from the redirected-back URL.
    ///
    /// `callback_url` may be absolute or relative to the redirect URI. On
    /// failure the client state is left as it was.
    pub async fn handle_callback(&mut self, callback_url: &str) -> AuthResult<Authorized> {
        let url = match Url::parse(callback_url) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse(&self.state.settings.redirect_uri)?.join(callback_url)?
            }
            Err(e) => return Err(e.into()),
        };
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        if let Some(error) = params.get("error") {
            return Err(AuthError::Denied {
                error: error.clone(),
                description: params.get("error_description").cloned().unwrap_or_default(),
            });
        }
        let code = params.get("code").ok_or(AuthError::MissingCode)?;
        let received = params.get("state").ok_or(AuthError::MissingState)?;
        let pending = self.state.pending.clone().ok_or(AuthError::NotPending)?;
        if pending.state != *received {
            return Err(AuthError::StateMismatch {
                expected: pending.state,
                actual: received.clone(),
            });
        }

        let Some(token_url) = self.endpoints().await?.token.clone() else {
            return Err(AuthError::NoTokenEndpoint { api_base: self.api_base().to_string() });
        };

        let settings = &self.state.settings;
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "authorization_code")
            .append_pair("code", code)
            .append_pair("redirect_uri", &settings.redirect_uri)
            .append_pair("client_id", &settings.app_id)
            .append_pair("code_verifier", &pending.code_verifier)
            .finish();

        let mut request = self
            .fhir
            .http()
            .post(&token_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .body(form);
        if let Some(ref secret) = self.client_secret {
            request = request.basic_auth(&settings.app_id, Some(secret));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Token exchange rejected");
            return Err(AuthError::TokenRejected { status: status.as_u16(), message });
        }

        let body: TokenResponse = response.json().await?;
        let access_token =
            body.access_token.filter(|t| !t.is_empty()).ok_or(AuthError::NoAccessToken)?;

        self.state.token = Some(TokenSet {
            access_token,
            refresh_token: body.refresh_token,
            id_token: body.id_token,
            scope: body.scope.clone(),
            expires_at: body.expires_in.and_then(|secs| expiry_from(Utc::now(), secs)),
        });
        self.state.patient_id = body.patient.clone();
        self.state.pending = None;
        self.patient = None;
        self.changed = true;

        tracing::info!(patient_id = ?body.patient, "Token exchange succeeded");

        Ok(Authorized { patient_id: body.patient, scope: body.scope })
    }

    /// Drop the patient binding: launch token, patient context, and the
    /// tokens issued for it. Server settings and endpoints are kept.
    pub fn reset_patient(&mut self) {
        self.state.settings.launch_token = None;
        self.state.patient_id = None;
        self.state.token = None;
        self.state.pending = None;
        self.patient = None;
        self.changed = true;
    }

    /// Search a resource type with this session's token.
    ///
    /// # Errors
    ///
    /// Returns error on API failure.
    pub async fn search(&self, resource_type: &str, params: &[(&str, &str)]) -> ClientResult<Bundle> {
        self.fhir.search(&self.base, resource_type, params, self.access_token()).await
    }

    /// Read a resource as raw JSON with this session's token.
    ///
    /// # Errors
    ///
    /// Returns error on API failure.
    pub async fn read_json(&self, path: &str) -> ClientResult<serde_json::Value> {
        self.fhir.read_json(&self.base, path, self.access_token()).await
    }

    /// Discovered endpoints, running discovery on first use.
    async fn endpoints(&mut self) -> ClientResult<&OAuthEndpoints> {
        let endpoints = match self.state.endpoints.take() {
            Some(endpoints) => endpoints,
            None => {
                let discovered = self.fhir.discover(&self.base).await?;
                self.changed = true;
                discovered
            }
        };
        let endpoints: &OAuthEndpoints = self.state.endpoints.insert(endpoints);
        Ok(endpoints)
    }
}

/// Absolute expiry for an `expires_in` lifetime.
///
/// Lifetimes chrono cannot represent yield no expiry.
fn expiry_from(now: DateTime<Utc>, expires_in: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_seconds(expires_in).and_then(|lifetime| now.checked_add_signed(lifetime))
}

impl std::fmt::Debug for SmartClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartClient")
            .field("api_base", &self.state.settings.api_base)
            .field("ready", &self.ready())
            .field("patient_id", &self.state.patient_id)
            .field("changed", &self.changed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn endpoints() -> OAuthEndpoints {
        OAuthEndpoints {
            authorize: Some("https://auth.example.org/authorize".into()),
            token: Some("https://auth.example.org/token".into()),
            register: None,
        }
    }

    fn client_with(state: ClientState) -> SmartClient {
        let fhir = FhirClient::new(&Config::default()).unwrap();
        SmartClient::resume(state, fhir, None).unwrap()
    }

    fn discovered_state() -> ClientState {
        let settings =
            SmartSettings::default().for_launch("https://example.org/fhir", Some("abc123".into()));
        let mut state = ClientState::new(settings);
        state.endpoints = Some(endpoints());
        state
    }

    #[test]
    fn test_fresh_client_is_not_ready() {
        let fhir = FhirClient::new(&Config::default()).unwrap();
        let client = SmartClient::from_session(None, &SmartSettings::default(), fhir, None).unwrap();
        assert!(!client.ready());
        assert!(!client.has_changed());
        assert!(client.patient_id().is_none());
    }

    #[test]
    fn test_relative_api_base_is_rejected() {
        let fhir = FhirClient::new(&Config::default()).unwrap();
        let settings = SmartSettings { api_base: "not a url/".into(), ..SmartSettings::default() };
        assert!(SmartClient::new(settings, fhir, None).is_err());
    }

    #[tokio::test]
    async fn test_authorize_url_carries_launch_parameters() {
        let mut client = client_with(discovered_state());

        let url = client.authorize_url().await.unwrap().unwrap();
        let url = Url::parse(&url).unwrap();
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/authorize");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["aud"], "https://example.org/fhir/");
        assert_eq!(params["launch"], "abc123");
        assert_eq!(params["code_challenge_method"], "S256");

        let pending = client.state().pending.clone().unwrap();
        assert_eq!(params["state"], pending.state);
        assert!(pkce::verify_s256(&pending.code_verifier, &params["code_challenge"]));
        assert!(client.has_changed());
    }

    #[tokio::test]
    async fn test_open_server_has_no_authorize_url() {
        let mut state = discovered_state();
        state.endpoints = Some(OAuthEndpoints::default());
        let mut client = client_with(state);

        assert!(client.authorize_url().await.unwrap().is_none());
        assert!(client.state().pending.is_none());
    }

    #[tokio::test]
    async fn test_callback_without_code_fails() {
        let mut client = client_with(discovered_state());
        client.authorize_url().await.unwrap();
        let before = client.state().clone();

        let err = client.handle_callback("/fhir-app/?state=whatever").await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCode));
        assert_eq!(client.state(), &before);
    }

    #[tokio::test]
    async fn test_callback_error_parameter() {
        let mut client = client_with(discovered_state());
        let err = client
            .handle_callback(
                "http://localhost:8000/fhir-app/?error=access_denied&error_description=nope",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Denied { ref error, .. } if error == "access_denied"));
    }

    #[tokio::test]
    async fn test_callback_state_checks() {
        let mut client = client_with(discovered_state());
        let err = client.handle_callback("/fhir-app/?code=c&state=s").await.unwrap_err();
        assert!(matches!(err, AuthError::NotPending));

        client.authorize_url().await.unwrap();
        let err = client.handle_callback("/fhir-app/?code=c&state=forged").await.unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch { .. }));

        let err = client.handle_callback("/fhir-app/?code=c").await.unwrap_err();
        assert!(matches!(err, AuthError::MissingState));
    }

    #[tokio::test]
    async fn test_unauthorized_client_has_no_patient() {
        let mut client = client_with(discovered_state());
        assert!(client.patient().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_token_resolves_no_patient() {
        let mut state = discovered_state();
        state.token = Some(TokenSet {
            access_token: "at".into(),
            refresh_token: None,
            id_token: None,
            scope: None,
            expires_at: Some(Utc::now() - TimeDelta::seconds(60)),
        });
        state.patient_id = Some("123".into());
        let mut client = client_with(state);

        assert!(client.ready());
        assert!(client.patient().await.unwrap().is_none());
    }

    #[test]
    fn test_expiry_from_lifetime() {
        let now = Utc::now();
        assert_eq!(expiry_from(now, 3600), Some(now + TimeDelta::seconds(3600)));
        assert!(expiry_from(now, i64::MAX).is_none());
        assert!(expiry_from(now, i64::MIN).is_none());
    }

    #[test]
    fn test_reset_patient_keeps_server() {
        let mut state = discovered_state();
        state.token = Some(TokenSet {
            access_token: "at".into(),
            refresh_token: None,
            id_token: None,
            scope: None,
            expires_at: None,
        });
        state.patient_id = Some("123".into());
        let mut client = client_with(state);

        client.reset_patient();

        assert!(!client.ready());
        assert!(client.patient_id().is_none());
        assert!(client.state().settings.launch_token.is_none());
        assert_eq!(client.api_base(), "https://example.org/fhir/");
        assert_eq!(client.state().endpoints, Some(endpoints()));
        assert!(client.has_changed());
    }
}
