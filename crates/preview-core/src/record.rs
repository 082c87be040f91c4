use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("preview record is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("failed parsing preview record: {0}")]
    Parse(#[source] serde_yaml::Error),
    #[error("failed serializing preview record: {0}")]
    Serialize(#[source] serde_yaml::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewRecord {
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    #[serde(
        rename = "commitSha",
        alias = "image_tag",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ServiceMetadata>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_pr_number"
    )]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_run_url: Option<String>,
}

impl PreviewRecord {
    pub fn from_yaml_slice(content: &[u8]) -> Result<Self, RecordError> {
        let text = std::str::from_utf8(content)?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(RecordError::Parse)
    }

    /// Renders the record with keys in declaration order, not sorted.
    pub fn to_yaml_string(&self) -> Result<String, RecordError> {
        serde_yaml::to_string(self).map_err(RecordError::Serialize)
    }

    pub fn entry(&self, name: &str) -> Option<&ServiceEntry> {
        self.services.iter().find(|entry| entry.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }
}

impl ServiceEntry {
    pub fn tracking_default(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            metadata: None,
            extra: Mapping::new(),
        }
    }

    pub fn pinned(name: impl Into<String>, version: &str, metadata: ServiceMetadata) -> Self {
        Self {
            name: name.into(),
            version: Some(version.to_string()),
            metadata: Some(metadata),
            extra: Mapping::new(),
        }
    }
}

impl ServiceMetadata {
    pub fn stamped(timestamp: &str) -> Self {
        Self {
            created_at: Some(timestamp.to_string()),
            updated_at: Some(timestamp.to_string()),
            ..Self::default()
        }
    }
}

// Older records carry the PR number as a quoted string.
fn deserialize_pr_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_u64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid pr-number: {number}"))),
        Some(Value::String(raw)) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid pr-number: '{raw}'"))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid pr-number: {other:?}"
        ))),
    }
}
