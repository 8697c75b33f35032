//! Document retrieval: DocumentReference search and Binary download.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::SUMMARY_OF_EPISODE_NOTE;
use crate::error::{AppResult, ClientError, ClientResult};
use crate::models::{Binary, DocumentReference};
use crate::smart::SmartClient;

/// Marker rendered for a document without a usable attachment URL.
pub const NOT_ENOUGH_INFO: &str = "not enough info for attachment";

/// What happened to one document's attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentOutcome {
    /// Payload decoded and written to disk.
    Saved {
        binary_id: String,
        path: PathBuf,
        bytes: usize,
        /// The Binary resource as JSON.
        json: String,
    },
    /// The Binary carried no payload; nothing was written.
    Empty { binary_id: String, json: String },
    /// The document has no first attachment URL; nothing was fetched.
    NotEnoughInfo,
}

/// Downloads the attachments of a patient's documents.
#[derive(Debug, Clone)]
pub struct DocumentFetcher {
    download_dir: PathBuf,
}

impl DocumentFetcher {
    #[must_use]
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self { download_dir: download_dir.into() }
    }

    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Summary-of-episode documents for the patient, in bundle order.
    ///
    /// # Errors
    ///
    /// Returns error on API failure or a malformed bundle.
    pub async fn documents(
        &self,
        client: &SmartClient,
        patient_id: &str,
    ) -> ClientResult<Vec<DocumentReference>> {
        let bundle = client
            .search(
                "DocumentReference",
                &[("patient", patient_id), ("type", SUMMARY_OF_EPISODE_NOTE)],
            )
            .await?;
        let docs = bundle.resources_of("DocumentReference")?;
        tracing::info!(patient_id, count = docs.len(), "Fetched document references");
        Ok(docs)
    }

    /// Download and save one document's attachment.
    ///
    /// # Errors
    ///
    /// Returns error on API failure, invalid base64, or a failed file write.
    pub async fn attachment(
        &self,
        client: &SmartClient,
        doc: &DocumentReference,
    ) -> AppResult<AttachmentOutcome> {
        let Some(binary_id) = doc.first_attachment_url().and_then(binary_id_from_url) else {
            tracing::info!(document = ?doc.id, "Document has no attachment URL");
            return Ok(AttachmentOutcome::NotEnoughInfo);
        };
        let binary_id = binary_id.to_string();

        let raw = client.read_json(&format!("Binary/{binary_id}")).await?;
        let json = serde_json::to_string(&raw).map_err(ClientError::from)?;
        let binary: Binary = serde_json::from_value(raw).map_err(ClientError::from)?;

        let Some(content) = binary.content.as_deref() else {
            tracing::warn!(binary_id = %binary_id, "Binary has no content");
            return Ok(AttachmentOutcome::Empty { binary_id, json });
        };

        let bytes = decode_content(content)?;
        let path = self.download_dir.join(format!("{binary_id}.pdf"));
        tokio::fs::write(&path, &bytes).await?;

        tracing::info!(
            binary_id = %binary_id,
            path = %path.display(),
            bytes = bytes.len(),
            content_type = ?binary.content_type,
            declared_type = ?doc.first_attachment_content_type(),
            "Saved attachment"
        );

        Ok(AttachmentOutcome::Saved { binary_id, path, bytes: bytes.len(), json })
    }

    /// Fetch every document and its attachment, in bundle order.
    ///
    /// Returns an empty list when the patient has no documents.
    ///
    /// # Errors
    ///
    /// Returns the first API, decode, or file error encountered.
    pub async fn fetch_all(
        &self,
        client: &SmartClient,
        patient_id: &str,
    ) -> AppResult<Vec<AttachmentOutcome>> {
        let docs = self.documents(client, patient_id).await?;
        let mut outcomes = Vec::with_capacity(docs.len());
        for doc in &docs {
            outcomes.push(self.attachment(client, doc).await?);
        }
        Ok(outcomes)
    }
}

/// The final path segment of an attachment URL, ignoring query and fragment.
#[must_use]
pub fn binary_id_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|id| !id.is_empty() && *id != "." && *id != "..")
}

/// Decode a base64 payload, tolerating embedded line breaks.
///
/// # Errors
///
/// Returns error if the payload is not valid base64.
pub fn decode_content(content: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_id_from_url() {
        assert_eq!(binary_id_from_url("https://fhir.example.org/dstu2/Binary/TR-123"), Some("TR-123"));
        assert_eq!(binary_id_from_url("Binary/abc"), Some("abc"));
        assert_eq!(binary_id_from_url("abc"), Some("abc"));
        assert_eq!(binary_id_from_url("https://x/Binary/abc?_format=json"), Some("abc"));
        assert_eq!(binary_id_from_url("https://x/Binary/"), None);
        assert_eq!(binary_id_from_url("https://x/Binary/.."), None);
    }

    #[test]
    fn test_decode_content_with_line_breaks() {
        assert_eq!(decode_content("JVBE\nRi0x\r\nLjQ=").unwrap(), b"%PDF-1.4");
        assert!(decode_content("not*base64").is_err());
    }

    #[test]
    fn test_fetcher_download_dir() {
        let fetcher = DocumentFetcher::new("/tmp/docs");
        assert_eq!(fetcher.download_dir(), Path::new("/tmp/docs"));
    }
}
