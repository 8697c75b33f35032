//! Server discovery documents: `.well-known/smart-configuration` and the
//! CapabilityStatement's OAuth URI extension.

use serde::{Deserialize, Serialize};

/// Extension URL carrying the OAuth endpoints in a CapabilityStatement.
pub const OAUTH_URIS_EXTENSION: &str =
    "http://fhir-registry.smarthealthit.org/StructureDefinition/oauth-uris";

/// OAuth endpoints advertised by a FHIR server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthEndpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorize: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register: Option<String>,
}

impl OAuthEndpoints {
    /// A server without an authorize endpoint runs without auth.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.authorize.is_none()
    }
}

/// `GET {base}.well-known/smart-configuration`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmartConfiguration {
    #[serde(default)]
    pub authorization_endpoint: Option<String>,

    #[serde(default)]
    pub token_endpoint: Option<String>,

    #[serde(default)]
    pub registration_endpoint: Option<String>,
}

impl From<SmartConfiguration> for OAuthEndpoints {
    fn from(c: SmartConfiguration) -> Self {
        Self {
            authorize: c.authorization_endpoint,
            token: c.token_endpoint,
            register: c.registration_endpoint,
        }
    }
}

/// `GET {base}metadata` (Conformance in DSTU2, CapabilityStatement later).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityStatement {
    #[serde(default)]
    pub resource_type: String,

    #[serde(default)]
    pub fhir_version: Option<String>,

    #[serde(default)]
    pub rest: Vec<RestComponent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RestComponent {
    #[serde(default)]
    pub security: Option<SecurityComponent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityComponent {
    #[serde(default)]
    pub extension: Vec<Extension>,
}

/// A (possibly nested) FHIR extension with a URI value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub value_uri: Option<String>,

    #[serde(default)]
    pub extension: Vec<Extension>,
}

impl CapabilityStatement {
    /// Read the OAuth URIs from the first REST block that carries them.
    #[must_use]
    pub fn oauth_endpoints(&self) -> OAuthEndpoints {
        let Some(oauth) = self
            .rest
            .iter()
            .filter_map(|r| r.security.as_ref())
            .flat_map(|s| s.extension.iter())
            .find(|e| e.url == OAUTH_URIS_EXTENSION)
        else {
            return OAuthEndpoints::default();
        };

        let lookup = |name: &str| {
            oauth.extension.iter().find(|e| e.url == name).and_then(|e| e.value_uri.clone())
        };

        OAuthEndpoints {
            authorize: lookup("authorize"),
            token: lookup("token"),
            register: lookup("register"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capability_oauth_uris() {
        let cap: CapabilityStatement = serde_json::from_value(json!({
            "resourceType": "CapabilityStatement",
            "rest": [{
                "mode": "server",
                "security": {
                    "extension": [{
                        "url": OAUTH_URIS_EXTENSION,
                        "extension": [
                            {"url": "authorize", "valueUri": "https://auth/authorize"},
                            {"url": "token", "valueUri": "https://auth/token"}
                        ]
                    }]
                }
            }]
        }))
        .unwrap();

        let endpoints = cap.oauth_endpoints();
        assert_eq!(endpoints.authorize.as_deref(), Some("https://auth/authorize"));
        assert_eq!(endpoints.token.as_deref(), Some("https://auth/token"));
        assert!(endpoints.register.is_none());
        assert!(!endpoints.is_open());
    }

    #[test]
    fn test_capability_without_security_is_open() {
        let cap: CapabilityStatement = serde_json::from_value(json!({
            "resourceType": "Conformance",
            "rest": [{"mode": "server"}]
        }))
        .unwrap();
        assert!(cap.oauth_endpoints().is_open());
    }

    #[test]
    fn test_smart_configuration_into_endpoints() {
        let conf: SmartConfiguration = serde_json::from_value(json!({
            "authorization_endpoint": "https://a/authorize",
            "token_endpoint": "https://a/token",
            "capabilities": ["launch-ehr", "client-public"]
        }))
        .unwrap();
        let endpoints = OAuthEndpoints::from(conf);
        assert_eq!(endpoints.authorize.as_deref(), Some("https://a/authorize"));
        assert_eq!(endpoints.token.as_deref(), Some("https://a/token"));
    }
}
