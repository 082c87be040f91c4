mod github;
mod memory;
mod types;

pub use github::{GithubContentsStore, RepoLocation, DEFAULT_API_URL};
pub use memory::{MemoryCommit, MemoryStore};
pub use types::{
    CommitRef, FetchOutcome, RecordStore, RemoteRecord, StoreError, VersionHandle, WriteOutcome,
};
