//! Data models for the FHIR resources this client reads.
//!
//! Only the fields the app uses are modeled. Everything is `#[serde(default)]`
//! and camelCase to match FHIR JSON; DSTU2 and R4 shapes are both accepted
//! where they differ.

mod conformance;
mod resources;

pub use conformance::{
    CapabilityStatement, Extension, OAUTH_URIS_EXTENSION, OAuthEndpoints, RestComponent,
    SecurityComponent, SmartConfiguration,
};
pub use resources::{
    Attachment, Binary, Bundle, BundleEntry, DocumentContent, DocumentReference, HumanName,
    Patient, StringOrList,
};
