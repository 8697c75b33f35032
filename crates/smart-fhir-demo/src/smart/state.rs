//! Serializable SMART client state.
//!
//! This is the blob kept in the session store. It is only ever produced by
//! [`ClientState::to_bytes`] and consumed by [`ClientState::from_bytes`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SmartSettings;
use crate::error::SessionError;
use crate::models::OAuthEndpoints;

/// Everything needed to resume a SMART client across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    /// Settings this client was opened with (per launch).
    pub settings: SmartSettings,

    /// Discovered OAuth endpoints; `None` until discovery ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<OAuthEndpoints>,

    /// Authorize request awaiting its callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingAuthorization>,

    /// Tokens from the last successful exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenSet>,

    /// Patient in context, from the token response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
}

/// The `state` and PKCE verifier of an outstanding authorize request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: String,
    pub code_verifier: String,
}

/// Tokens granted by the authorization server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Scopes actually granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Check if the access token is past its expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Check if the access token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl ClientState {
    /// Fresh, unauthenticated state.
    #[must_use]
    pub const fn new(settings: SmartSettings) -> Self {
        Self { settings, endpoints: None, pending: None, token: None, patient_id: None }
    }

    /// Serialize for the session store.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SessionError> {
        serde_json::to_vec(self).map_err(SessionError::Serialize)
    }

    /// Deserialize a blob produced by [`ClientState::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns error if the blob is not a valid state.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SessionError> {
        serde_json::from_slice(bytes).map_err(SessionError::Corrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn authorized_state() -> ClientState {
        let mut state = ClientState::new(
            SmartSettings::default().for_launch("https://example.org/fhir", Some("abc".into())),
        );
        state.endpoints = Some(OAuthEndpoints {
            authorize: Some("https://example.org/auth/authorize".into()),
            token: Some("https://example.org/auth/token".into()),
            register: None,
        });
        state.token = Some(TokenSet {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            id_token: None,
            scope: Some("patient/Patient.read".into()),
            expires_at: Some(Utc::now() + TimeDelta::seconds(300)),
        });
        state.patient_id = Some("123".into());
        state
    }

    #[test]
    fn test_bytes_roundtrip_keeps_every_field() {
        let state = authorized_state();
        let restored = ClientState::from_bytes(&state.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_corrupt_blob_is_rejected() {
        let err = ClientState::from_bytes(b"{not json").unwrap_err();
        assert!(matches!(err, SessionError::Corrupt(_)));

        let err = ClientState::from_bytes(br#"{"endpoints": null}"#).unwrap_err();
        assert!(matches!(err, SessionError::Corrupt(_)));
    }

    #[test]
    fn test_token_expiry() {
        let now = Utc::now();
        let mut token = authorized_state().token.unwrap();
        assert!(!token.is_expired_at(now));

        token.expires_at = Some(now - TimeDelta::seconds(1));
        assert!(token.is_expired_at(now));

        token.expires_at = None;
        assert!(!token.is_expired_at(now));
    }

    #[test]
    fn test_token_debug_hides_secrets() {
        let token = authorized_state().token.unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains("\"at\""));
        assert!(debug.contains("has_refresh_token"));
    }
}
