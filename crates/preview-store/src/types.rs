use std::fmt;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionHandle(String);

impl VersionHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub content: Vec<u8>,
    pub handle: VersionHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Absent,
    Present(RemoteRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRef {
    pub sha: String,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Committed(CommitRef),
    /// The handle was stale, or a create raced with another writer.
    Conflict,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid repository location '{0}': expected 'owner/repo'")]
    InvalidLocation(String),
    #[error("access denied for '{path}' (HTTP {status}): {message}")]
    Forbidden {
        path: String,
        status: u16,
        message: String,
    },
    #[error("unexpected response for '{path}' (HTTP {status}): {message}")]
    Status {
        path: String,
        status: u16,
        message: String,
    },
    #[error("request for '{path}' failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: BoxError,
    },
    #[error("could not decode response for '{path}': {reason}")]
    Decode { path: String, reason: String },
}

impl StoreError {
    pub fn transport(path: &str, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            path: path.to_string(),
            source: source.into(),
        }
    }

    pub fn decode(path: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

pub trait RecordStore {
    fn fetch(&self, path: &str) -> Result<FetchOutcome, StoreError>;

    /// Creates `path`; reports `Conflict` if the file exists by now.
    fn create(&self, path: &str, content: &[u8], message: &str) -> Result<WriteOutcome, StoreError>;

    /// Replaces `path` only if it still matches `handle`.
    fn update(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        handle: &VersionHandle,
    ) -> Result<WriteOutcome, StoreError>;
}

impl<T: RecordStore + ?Sized> RecordStore for &T {
    fn fetch(&self, path: &str) -> Result<FetchOutcome, StoreError> {
        (**self).fetch(path)
    }

    fn create(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<WriteOutcome, StoreError> {
        (**self).create(path, content, message)
    }

    fn update(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        handle: &VersionHandle,
    ) -> Result<WriteOutcome, StoreError> {
        (**self).update(path, content, message, handle)
    }
}
