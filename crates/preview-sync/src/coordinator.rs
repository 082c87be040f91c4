use chrono::{SecondsFormat, Utc};
use preview_core::{
    build_record, resolve_catalog, slugify, update_record, PreviewRecord, ServiceMetadata,
};
use preview_store::{
    CommitRef, FetchOutcome, RecordStore, StoreError, VersionHandle, WriteOutcome,
};
use tracing::{debug, info};

use crate::error::DeployError;
use crate::retry::{retry_on_conflict, Attempt, RetryError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub max_attempts: u32,
    pub previews_dir: String,
    pub record_file: String,
    pub registry_path: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            previews_dir: "previews".to_string(),
            record_file: "values.yaml".to_string(),
            registry_path: "services.yaml".to_string(),
        }
    }
}

impl DeployConfig {
    pub fn record_path(&self, slug: &str) -> String {
        format!(
            "{}/{slug}/{}",
            self.previews_dir.trim_end_matches('/'),
            self.record_file
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribution {
    pub author: Option<String>,
    pub pr_url: Option<String>,
    pub pr_number: Option<u64>,
    pub workflow_run_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub service: String,
    pub branch: String,
    pub version: String,
    pub attribution: Attribution,
    pub timestamp: Option<String>,
}

impl DeployRequest {
    fn metadata(&self, timestamp: &str) -> ServiceMetadata {
        ServiceMetadata {
            pr_author: self.attribution.author.clone(),
            pr_url: self.attribution.pr_url.clone(),
            pr_number: self.attribution.pr_number,
            branch: Some(self.branch.clone()),
            workflow_run_url: self.attribution.workflow_run_url.clone(),
            ..ServiceMetadata::stamped(timestamp)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeployOutcome {
    pub slug: String,
    pub path: String,
    pub previous: Option<String>,
    pub content: String,
    pub record: PreviewRecord,
    pub commit: CommitRef,
    pub attempts: u32,
    pub created: bool,
}

#[derive(Debug)]
pub struct Coordinator<S> {
    store: S,
    config: DeployConfig,
}

struct CurrentRecord {
    record: PreviewRecord,
    content: String,
    handle: VersionHandle,
}

impl<S: RecordStore> Coordinator<S> {
    pub fn new(store: S, config: DeployConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn deploy(&self, request: &DeployRequest) -> Result<DeployOutcome, DeployError> {
        let slug = slugify(&request.branch);
        if slug.is_empty() {
            return Err(DeployError::EmptySlug {
                branch: request.branch.clone(),
            });
        }

        let path = self.config.record_path(&slug);
        let timestamp = request.timestamp.clone().unwrap_or_else(current_timestamp);
        let mut catalog = None;
        info!(
            service = %request.service,
            branch = %request.branch,
            slug = %slug,
            path = %path,
            "deploying preview"
        );

        let result = retry_on_conflict(self.config.max_attempts, |attempt| {
            info!(attempt, max_attempts = self.config.max_attempts, "attempt");
            self.attempt(attempt, &slug, &path, request, &timestamp, &mut catalog)
        });

        match result {
            Ok(outcome) => Ok(outcome),
            Err(RetryError::Exhausted { attempts }) => {
                Err(DeployError::RetriesExhausted { path, attempts })
            }
            Err(RetryError::Fatal(err)) => Err(err),
        }
    }

    fn attempt(
        &self,
        attempt: u32,
        slug: &str,
        path: &str,
        request: &DeployRequest,
        timestamp: &str,
        catalog: &mut Option<Vec<String>>,
    ) -> Result<Attempt<DeployOutcome>, DeployError> {
        let fetched = self.fetch_record(path)?;
        let service = request.service.as_str();
        let metadata = || request.metadata(timestamp);

        let (record, previous) = match fetched {
            None => {
                let catalog = self.catalog(catalog)?;
                if !catalog.iter().any(|name| name == service) {
                    return Err(DeployError::not_in_catalog(service, catalog));
                }
                (build_record(catalog, service, &request.version, metadata), None)
            }
            Some(CurrentRecord {
                record: existing,
                content,
                handle,
            }) => {
                if !existing.contains(service) {
                    let catalog = self.catalog(catalog)?;
                    if !catalog.iter().any(|name| name == service) {
                        return Err(DeployError::not_in_catalog(service, catalog));
                    }
                }
                let merged = update_record(existing, service, &request.version, metadata);
                (merged, Some((content, handle)))
            }
        };

        let content = record
            .to_yaml_string()
            .map_err(|source| DeployError::EncodeRecord {
                path: path.to_string(),
                source,
            })?;

        let written = match &previous {
            None => self
                .store
                .create(path, content.as_bytes(), &create_message(slug)),
            Some((_, handle)) => self.store.update(
                path,
                content.as_bytes(),
                &update_message(service, slug),
                handle,
            ),
        }
        .map_err(DeployError::from_store)?;

        let commit = match written {
            WriteOutcome::Committed(commit) => commit,
            WriteOutcome::Conflict => return Ok(Attempt::Conflict),
        };

        info!(attempt, commit = %commit.sha, "committed preview record");
        Ok(Attempt::Done(DeployOutcome {
            slug: slug.to_string(),
            path: path.to_string(),
            created: previous.is_none(),
            previous: previous.map(|(content, _)| content),
            content,
            record,
            commit,
            attempts: attempt,
        }))
    }

    fn fetch_record(&self, path: &str) -> Result<Option<CurrentRecord>, DeployError> {
        match self.store.fetch(path).map_err(DeployError::from_store)? {
            FetchOutcome::Absent => {
                info!(path, "no existing preview record");
                Ok(None)
            }
            FetchOutcome::Present(remote) => {
                debug!(path, handle = %remote.handle, "fetched preview record");
                let record = PreviewRecord::from_yaml_slice(&remote.content).map_err(|source| {
                    DeployError::MalformedRecord {
                        path: path.to_string(),
                        source,
                    }
                })?;
                let content = String::from_utf8_lossy(&remote.content).into_owned();
                Ok(Some(CurrentRecord {
                    record,
                    content,
                    handle: remote.handle,
                }))
            }
        }
    }

    fn catalog<'c>(
        &self,
        cache: &'c mut Option<Vec<String>>,
    ) -> Result<&'c [String], DeployError> {
        let catalog = match cache.take() {
            Some(catalog) => catalog,
            None => self.fetch_catalog()?,
        };
        Ok(cache.insert(catalog).as_slice())
    }

    fn fetch_catalog(&self) -> Result<Vec<String>, DeployError> {
        let path = self.config.registry_path.as_str();
        let remote = match self.store.fetch(path) {
            Ok(FetchOutcome::Present(remote)) => remote,
            Ok(FetchOutcome::Absent) => {
                return Err(DeployError::CatalogNotFound {
                    path: path.to_string(),
                })
            }
            Err(err @ StoreError::Forbidden { .. }) => {
                return Err(DeployError::Forbidden { source: err })
            }
            Err(source) => {
                return Err(DeployError::CatalogUnavailable {
                    path: path.to_string(),
                    source,
                })
            }
        };

        let catalog =
            resolve_catalog(&remote.content).map_err(|source| DeployError::MalformedCatalog {
                path: path.to_string(),
                source,
            })?;
        info!(path, services = catalog.len(), "resolved service catalog");
        Ok(catalog)
    }
}

pub(crate) fn create_message(slug: &str) -> String {
    format!("chore(preview): create {slug} preview")
}

pub(crate) fn update_message(service: &str, slug: &str) -> String {
    format!("chore(preview): update {service} in {slug}")
}

fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
