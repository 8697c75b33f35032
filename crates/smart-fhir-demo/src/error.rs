//! Error types for the SMART-on-FHIR demo client.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors from the FHIR HTTP client layer.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// HTTP transport error (connection, DNS, TLS, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Access token rejected or missing (401/403 response)
    #[error("Unauthorized ({status}): {message}")]
    Unauthorized {
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
    },

    /// Resource not found (404 response)
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Description of the missing resource
        resource: String,
    },

    /// Invalid request parameters (400 response)
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message from the server
        message: String,
    },

    /// JSON parsing error
    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// A base or resource URL could not be built
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Server error (5xx response)
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// Unexpected HTTP status
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
    },
}

impl ClientError {
    /// Create an unauthorized error.
    #[must_use]
    pub fn unauthorized(status: u16, message: impl Into<String>) -> Self {
        Self::Unauthorized { status, message: message.into() }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into() }
    }

    /// Create a server error.
    #[must_use]
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server { status, message: message.into() }
    }

    /// Returns true if the server refused our credentials.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Reasons an OAuth2 authorization attempt did not produce a usable token.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    /// The authorization server redirected back with an `error` parameter
    #[error("Authorization server returned '{error}': {description}")]
    Denied {
        /// OAuth2 error code
        error: String,
        /// Optional human readable description
        description: String,
    },

    /// The callback URL carried no `code`
    #[error("No authorization code in callback URL")]
    MissingCode,

    /// The callback URL carried no `state`
    #[error("No state parameter in callback URL")]
    MissingState,

    /// Nothing was pending in this session
    #[error("No authorization is pending for this session")]
    NotPending,

    /// The `state` did not match the one we issued
    #[error("State mismatch: expected '{expected}', got '{actual}'")]
    StateMismatch {
        /// State we issued with the authorize request
        expected: String,
        /// State received on the callback
        actual: String,
    },

    /// The callback URL itself could not be parsed
    #[error("Invalid callback URL: {0}")]
    InvalidCallback(#[from] url::ParseError),

    /// The server advertises no token endpoint
    #[error("Server at {api_base} has no token endpoint")]
    NoTokenEndpoint {
        /// Base URL that was discovered
        api_base: String,
    },

    /// The token endpoint answered with a non-success status
    #[error("Token endpoint rejected the request ({status}): {message}")]
    TokenRejected {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// The token response had no `access_token`
    #[error("Token response did not include an access token")]
    NoAccessToken,

    /// Transport or parse failure talking to the authorization server
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Client(ClientError::Http(err))
    }
}

/// Errors from reading or writing session state.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// Stored blob is not a valid client state
    #[error("Corrupt session state: {0}")]
    Corrupt(#[source] serde_json::Error),

    /// Client state could not be serialized
    #[error("Failed to serialize session state: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Errors surfaced at the HTTP handler boundary.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Error from the FHIR client
    #[error("FHIR error: {0}")]
    Client(#[from] ClientError),

    /// Session state error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Attachment could not be written to disk
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary payload is not valid base64
    #[error("Invalid binary payload: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Caller supplied unusable query parameters
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        (status, self.to_string()).into_response()
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type alias for authorization operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Result type alias for handler operations.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_unauthorized() {
        assert!(ClientError::unauthorized(401, "expired").is_unauthorized());
        assert!(ClientError::unauthorized(403, "forbidden").is_unauthorized());

        assert!(!ClientError::not_found("Patient/1").is_unauthorized());
        assert!(!ClientError::server(500, "boom").is_unauthorized());
    }

    #[test]
    fn test_auth_error_messages_carry_reason() {
        let err = AuthError::Denied {
            error: "access_denied".into(),
            description: "user said no".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("access_denied"));
        assert!(msg.contains("user said no"));

        assert!(AuthError::MissingCode.to_string().contains("code"));
    }

    #[test]
    fn test_app_error_status() {
        let resp = AppError::bad_request("missing iss").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = AppError::from(ClientError::server(502, "gateway")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
