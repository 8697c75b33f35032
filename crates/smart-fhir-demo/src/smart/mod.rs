//! SMART App Launch client.
//!
//! Covers the client side of the SMART authorization flow:
//! - Server discovery (smart-configuration / CapabilityStatement)
//! - Authorize URL with `launch`, `aud` and PKCE (RFC 7636, S256)
//! - Authorization-code exchange (RFC 6749 §4.1)
//! - Patient context resolution and reset
//!
//! State lives in [`ClientState`], serialized into the session between requests.

mod client;
pub mod pkce;
mod state;

pub use client::{Authorized, SmartClient};
pub use state::{ClientState, PendingAuthorization, TokenSet};
