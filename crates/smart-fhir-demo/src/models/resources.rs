//! Clinical resource models: Patient, DocumentReference, Binary, Bundle.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A search result bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Always `"Bundle"`.
    #[serde(default)]
    pub resource_type: String,

    /// Entries in server order. Absent when nothing matched.
    #[serde(default)]
    pub entry: Option<Vec<BundleEntry>>,
}

/// A single bundle entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    /// The raw resource; entries may mix resource types.
    #[serde(default)]
    pub resource: Option<serde_json::Value>,
}

impl Bundle {
    /// Extract every entry resource of the given type, preserving order.
    ///
    /// Entries of other types (e.g. an `OperationOutcome` included with
    /// `search.mode = outcome`) are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if a matching resource does not fit `T`.
    pub fn resources_of<T>(&self, resource_type: &str) -> Result<Vec<T>, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        self.entry
            .iter()
            .flatten()
            .filter_map(|e| e.resource.as_ref())
            .filter(|r| r.get("resourceType").and_then(|t| t.as_str()) == Some(resource_type))
            .map(|r| serde_json::from_value(r.clone()))
            .collect()
    }
}

/// Metadata about a clinical document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReference {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub content: Vec<DocumentContent>,
}

/// `DocumentReference.content`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentContent {
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

/// Pointer to the document payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub content_type: Option<String>,

    #[serde(default)]
    pub url: Option<String>,
}

impl DocumentReference {
    /// URL of the first content entry's attachment, if all of it is present.
    #[must_use]
    pub fn first_attachment_url(&self) -> Option<&str> {
        self.content
            .first()
            .and_then(|c| c.attachment.as_ref())
            .and_then(|a| a.url.as_deref())
            .filter(|u| !u.is_empty())
    }

    /// Content type of the first attachment.
    #[must_use]
    pub fn first_attachment_content_type(&self) -> Option<&str> {
        self.content
            .first()
            .and_then(|c| c.attachment.as_ref())
            .and_then(|a| a.content_type.as_deref())
    }
}

/// Raw binary payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binary {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub content_type: Option<String>,

    /// Base64 payload: `content` in DSTU2, `data` in STU3 and later.
    #[serde(default, alias = "data")]
    pub content: Option<String>,
}

/// A patient.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Vec<HumanName>,
}

impl Patient {
    /// Display name from the first `name` entry, or `Unknown`.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .first()
            .map(HumanName::display)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// A value that is a single string in one FHIR version and a list in another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn parts(&self) -> Vec<&str> {
        match self {
            Self::One(s) => vec![s.as_str()],
            Self::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// A person's name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanName {
    #[serde(default)]
    pub text: Option<String>,

    /// A string in R4, a list in DSTU2.
    #[serde(default)]
    pub family: Option<StringOrList>,

    #[serde(default)]
    pub given: Vec<String>,

    #[serde(default)]
    pub prefix: Vec<String>,

    #[serde(default)]
    pub suffix: Vec<String>,
}

impl HumanName {
    /// Render as "Prefix Given Family, Suffix", preferring `text` when set.
    #[must_use]
    pub fn display(&self) -> String {
        if let Some(text) = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return text.to_string();
        }

        let family = self.family.as_ref().map(StringOrList::parts).unwrap_or_default();
        let mut name = self
            .prefix
            .iter()
            .map(String::as_str)
            .chain(self.given.iter().map(String::as_str))
            .chain(family)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if !self.suffix.is_empty() {
            name.push_str(", ");
            name.push_str(&self.suffix.join(" "));
        }
        name
    }
}
