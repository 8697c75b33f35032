//! SMART-on-FHIR Demo Client
//!
//! A small web application that performs a SMART App Launch against a FHIR
//! server, exchanges the authorization code for an access token, and then
//! downloads the current patient's summary-of-episode documents.
//!
//! # Features
//!
//! - **EHR and standalone launch**: `iss`/`launch` handling with per-launch settings
//! - **OAuth2 with PKCE**: authorization-code grant, S256 challenge, optional client secret
//! - **Server discovery**: `.well-known/smart-configuration` with CapabilityStatement fallback
//! - **Server-side sessions**: cookie-keyed, idle-expiring client state
//!
//! # Example
//!
//! ```no_run
//! use smart_fhir_demo::{config::Config, server::SmartApp};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     SmartApp::new(config)?.run_http(8000).await
//! }
//! ```

pub mod client;
pub mod config;
pub mod documents;
pub mod error;
pub mod models;
pub mod server;
pub mod session;
pub mod smart;

pub use client::FhirClient;
pub use config::{Config, SmartSettings};
pub use error::{AppError, AuthError, ClientError, SessionError};
pub use server::SmartApp;
pub use smart::{ClientState, SmartClient};
