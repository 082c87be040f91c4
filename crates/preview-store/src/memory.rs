use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};

use crate::{
    CommitRef, FetchOutcome, RecordStore, RemoteRecord, StoreError, VersionHandle, WriteOutcome,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCommit {
    pub path: String,
    pub message: String,
    pub sha: String,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, Vec<u8>>,
    commits: Vec<MemoryCommit>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.put(path, content, "seed");
        self
    }

    pub fn put(&self, path: &str, content: impl Into<Vec<u8>>, message: &str) -> CommitRef {
        let mut state = self.lock();
        state.commit(path, content.into(), message)
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    pub fn read_to_string(&self, path: &str) -> Option<String> {
        self.read(path)
            .map(|content| String::from_utf8_lossy(&content).into_owned())
    }

    pub fn commits(&self) -> Vec<MemoryCommit> {
        self.lock().commits.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    fn commit(&mut self, path: &str, content: Vec<u8>, message: &str) -> CommitRef {
        let mut hasher = Sha256::new();
        hasher.update((self.commits.len() as u64).to_be_bytes());
        hasher.update(path.as_bytes());
        hasher.update(&content);
        let sha = hex::encode(hasher.finalize());

        self.files.insert(path.to_string(), content);
        self.commits.push(MemoryCommit {
            path: path.to_string(),
            message: message.to_string(),
            sha: sha.clone(),
        });

        CommitRef {
            sha,
            html_url: None,
        }
    }
}

pub(crate) fn content_handle(content: &[u8]) -> VersionHandle {
    VersionHandle::new(hex::encode(Sha256::digest(content)))
}

impl RecordStore for MemoryStore {
    fn fetch(&self, path: &str) -> Result<FetchOutcome, StoreError> {
        let state = self.lock();
        Ok(match state.files.get(path) {
            Some(content) => FetchOutcome::Present(RemoteRecord {
                content: content.clone(),
                handle: content_handle(content),
            }),
            None => FetchOutcome::Absent,
        })
    }

    fn create(&self, path: &str, content: &[u8], message: &str) -> Result<WriteOutcome, StoreError> {
        let mut state = self.lock();
        if state.files.contains_key(path) {
            return Ok(WriteOutcome::Conflict);
        }
        Ok(WriteOutcome::Committed(state.commit(
            path,
            content.to_vec(),
            message,
        )))
    }

    fn update(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        handle: &VersionHandle,
    ) -> Result<WriteOutcome, StoreError> {
        let mut state = self.lock();
        let current = state.files.get(path).map(|existing| content_handle(existing));
        if current.as_ref() != Some(handle) {
            return Ok(WriteOutcome::Conflict);
        }
        Ok(WriteOutcome::Committed(state.commit(
            path,
            content.to_vec(),
            message,
        )))
    }
}
