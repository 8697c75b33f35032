//! Configuration for the SMART-on-FHIR demo client.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default launch configuration constants.
pub mod defaults {
    use std::time::Duration;

    /// Registered client identifier.
    pub const APP_ID: &str = "8157653e-edb9-420c-aeea-24d5f77a4539";

    /// FHIR server used for standalone launches.
    pub const API_BASE: &str = "http://localhost:8080/fhir/";

    /// Where the authorization server sends the browser back to.
    pub const REDIRECT_URI: &str = "http://localhost:8000/fhir-app/";

    /// Requested OAuth scopes.
    pub const SCOPE: &str = "patient/DocumentReference.read patient/Patient.read \
                             patient/Binary.read user/DocumentReference.read launch profile openid";

    /// HTTP listen port.
    pub const PORT: u16 = 8000;

    /// Idle time after which a session is dropped from the store.
    pub const SESSION_TTL: Duration = Duration::from_secs(8 * 3600);

    /// Maximum number of live sessions held in memory.
    pub const SESSION_MAX_CAPACITY: u64 = 10_000;

    /// Connection timeout for outbound requests.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
}

/// LOINC code for "Summary of episode note".
pub const SUMMARY_OF_EPISODE_NOTE: &str = "http://loinc.org|34133-9";

/// Settings a SMART client is opened with.
///
/// The process keeps one immutable default copy; launches derive their own
/// copy with [`SmartSettings::for_launch`] so concurrent launches never see
/// each other's issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartSettings {
    /// OAuth client identifier.
    pub app_id: String,

    /// FHIR base URL, always ending with `/`.
    pub api_base: String,

    /// Redirect URI registered with the authorization server.
    pub redirect_uri: String,

    /// Space separated scope list.
    pub scope: String,

    /// Opaque EHR launch token (absent for standalone launch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_token: Option<String>,
}

impl SmartSettings {
    /// Create settings, normalizing the API base.
    #[must_use]
    pub fn new(
        app_id: impl Into<String>,
        api_base: &str,
        redirect_uri: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            api_base: normalize_issuer(api_base),
            redirect_uri: redirect_uri.into(),
            scope: scope.into(),
            launch_token: None,
        }
    }

    /// Derive per-launch settings from these defaults.
    #[must_use]
    pub fn for_launch(&self, iss: &str, launch_token: Option<String>) -> Self {
        Self {
            api_base: normalize_issuer(iss),
            launch_token,
            ..self.clone()
        }
    }
}

impl Default for SmartSettings {
    fn default() -> Self {
        Self::new(defaults::APP_ID, defaults::API_BASE, defaults::REDIRECT_URI, defaults::SCOPE)
    }
}

/// Append the trailing `/` downstream endpoint construction relies on.
#[must_use]
pub fn normalize_issuer(iss: &str) -> String {
    if iss.ends_with('/') {
        iss.to_string()
    } else {
        format!("{iss}/")
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default SMART settings for standalone launches.
    pub settings: SmartSettings,

    /// Client secret for confidential clients (optional).
    pub client_secret: Option<String>,

    /// Directory attachments are written to.
    pub download_dir: PathBuf,

    /// Session idle lifetime.
    pub session_ttl: Duration,

    /// Maximum number of sessions kept.
    pub session_max_capacity: u64,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Request timeout; `None` leaves reqwest's default (no timeout).
    pub request_timeout: Option<Duration>,
}

impl Config {
    /// Create a new configuration from SMART settings.
    #[must_use]
    pub fn new(settings: SmartSettings, client_secret: Option<String>) -> Self {
        Self {
            settings,
            client_secret,
            download_dir: PathBuf::from("."),
            session_ttl: defaults::SESSION_TTL,
            session_max_capacity: defaults::SESSION_MAX_CAPACITY,
            connect_timeout: defaults::CONNECT_TIMEOUT,
            request_timeout: None,
        }
    }

    /// Create a test configuration pointing at a mock FHIR server.
    #[must_use]
    pub fn for_testing(api_base: &str, download_dir: impl Into<PathBuf>) -> Self {
        let settings = SmartSettings::new(
            "test-app",
            api_base,
            "http://localhost:8000/fhir-app/",
            defaults::SCOPE,
        );
        Self {
            download_dir: download_dir.into(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Some(Duration::from_secs(5)),
            ..Self::new(settings, None)
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if environment variables are invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        let var = |key: &str, fallback: &str| {
            std::env::var(key).unwrap_or_else(|_| fallback.to_string())
        };

        let settings = SmartSettings::new(
            var("SMART_APP_ID", defaults::APP_ID),
            &var("SMART_API_BASE", defaults::API_BASE),
            var("SMART_REDIRECT_URI", defaults::REDIRECT_URI),
            var("SMART_SCOPE", defaults::SCOPE),
        );

        let mut config = Self::new(settings, std::env::var("SMART_CLIENT_SECRET").ok());
        if let Ok(dir) = std::env::var("DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(dir);
        }
        if let Ok(secs) = std::env::var("SESSION_TTL_SECS") {
            config.session_ttl = Duration::from_secs(secs.parse()?);
        }
        Ok(config)
    }

    /// Check if a client secret is configured.
    #[must_use]
    pub const fn is_confidential(&self) -> bool {
        self.client_secret.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(SmartSettings::default(), None)
    }
}
