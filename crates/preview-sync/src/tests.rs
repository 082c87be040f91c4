use std::cell::Cell;

use preview_core::PreviewRecord;
use preview_store::{
    FetchOutcome, MemoryStore, RecordStore, StoreError, VersionHandle, WriteOutcome,
};

use super::*;

const REGISTRY: &str = "\
serviceRepos:
  api:
    repo: acme/api
  web:
    repo: acme/web
  worker:
    repo: acme/worker
";
const RECORD_PATH: &str = "previews/feature-login/values.yaml";

fn request(service: &str, version: &str, timestamp: &str) -> DeployRequest {
    DeployRequest {
        service: service.to_string(),
        branch: "Feature/Login".to_string(),
        version: version.to_string(),
        attribution: Attribution {
            author: Some("octocat".to_string()),
            pr_url: Some("https://github.com/acme/api/pull/12".to_string()),
            pr_number: Some(12),
            workflow_run_url: Some("https://github.com/acme/api/actions/runs/99".to_string()),
        },
        timestamp: Some(timestamp.to_string()),
    }
}

fn seeded_store() -> MemoryStore {
    MemoryStore::new().with_file("services.yaml", REGISTRY)
}

fn stored_record(store: &MemoryStore, path: &str) -> PreviewRecord {
    let content = store.read(path).expect("record must exist");
    PreviewRecord::from_yaml_slice(&content).expect("record must parse")
}

/// Lets a concurrent writer commit `concurrent` right before the first write.
struct RacingStore {
    inner: MemoryStore,
    concurrent: String,
    raced: Cell<bool>,
}

impl RacingStore {
    fn new(inner: MemoryStore, concurrent: &str) -> Self {
        Self {
            inner,
            concurrent: concurrent.to_string(),
            raced: Cell::new(false),
        }
    }

    fn race(&self, path: &str) {
        if !self.raced.replace(true) {
            self.inner
                .put(path, self.concurrent.as_str(), "concurrent deploy");
        }
    }
}

impl RecordStore for RacingStore {
    fn fetch(&self, path: &str) -> Result<FetchOutcome, StoreError> {
        self.inner.fetch(path)
    }

    fn create(&self, path: &str, content: &[u8], message: &str) -> Result<WriteOutcome, StoreError> {
        self.race(path);
        self.inner.create(path, content, message)
    }

    fn update(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        handle: &VersionHandle,
    ) -> Result<WriteOutcome, StoreError> {
        self.race(path);
        self.inner.update(path, content, message, handle)
    }
}

/// Every write loses; counts how often the coordinator comes back.
#[derive(Default)]
struct AlwaysConflictStore {
    inner: MemoryStore,
    fetches: Cell<u32>,
    writes: Cell<u32>,
}

impl RecordStore for AlwaysConflictStore {
    fn fetch(&self, path: &str) -> Result<FetchOutcome, StoreError> {
        if path == RECORD_PATH {
            self.fetches.set(self.fetches.get() + 1);
        }
        self.inner.fetch(path)
    }

    fn create(&self, _: &str, _: &[u8], _: &str) -> Result<WriteOutcome, StoreError> {
        self.writes.set(self.writes.get() + 1);
        Ok(WriteOutcome::Conflict)
    }

    fn update(
        &self,
        _: &str,
        _: &[u8],
        _: &str,
        _: &VersionHandle,
    ) -> Result<WriteOutcome, StoreError> {
        self.writes.set(self.writes.get() + 1);
        Ok(WriteOutcome::Conflict)
    }
}

/// Fails writes (or reads of `fail_fetch_path`) with an error built by `make_error`.
struct FailingStore {
    inner: MemoryStore,
    fail_fetch_path: Option<&'static str>,
    make_error: fn(&str) -> StoreError,
    writes: Cell<u32>,
}

impl FailingStore {
    fn on_write(inner: MemoryStore, make_error: fn(&str) -> StoreError) -> Self {
        Self {
            inner,
            fail_fetch_path: None,
            make_error,
            writes: Cell::new(0),
        }
    }

    fn on_fetch(
        inner: MemoryStore,
        path: &'static str,
        make_error: fn(&str) -> StoreError,
    ) -> Self {
        Self {
            inner,
            fail_fetch_path: Some(path),
            make_error,
            writes: Cell::new(0),
        }
    }

    fn write(&self, path: &str) -> Result<WriteOutcome, StoreError> {
        self.writes.set(self.writes.get() + 1);
        if self.fail_fetch_path.is_none() {
            return Err((self.make_error)(path));
        }
        Ok(WriteOutcome::Conflict)
    }
}

impl RecordStore for FailingStore {
    fn fetch(&self, path: &str) -> Result<FetchOutcome, StoreError> {
        if self.fail_fetch_path == Some(path) {
            return Err((self.make_error)(path));
        }
        self.inner.fetch(path)
    }

    fn create(&self, path: &str, _: &[u8], _: &str) -> Result<WriteOutcome, StoreError> {
        self.write(path)
    }

    fn update(
        &self,
        path: &str,
        _: &[u8],
        _: &str,
        _: &VersionHandle,
    ) -> Result<WriteOutcome, StoreError> {
        self.write(path)
    }
}

fn forbidden(path: &str) -> StoreError {
    StoreError::Forbidden {
        path: path.to_string(),
        status: 403,
        message: "Resource not accessible by integration".to_string(),
    }
}

fn server_error(path: &str) -> StoreError {
    StoreError::Status {
        path: path.to_string(),
        status: 502,
        message: "Bad Gateway".to_string(),
    }
}

#[test]
fn record_path_is_derived_from_slug() {
    let config = DeployConfig::default();
    assert_eq!(config.record_path("feature-login"), RECORD_PATH);

    let config = DeployConfig {
        previews_dir: "envs/previews/".to_string(),
        record_file: "apps.yaml".to_string(),
        ..DeployConfig::default()
    };
    assert_eq!(
        config.record_path("feature-login"),
        "envs/previews/feature-login/apps.yaml"
    );
}

#[test]
fn retry_on_conflict_returns_after_conflicts_clear() {
    let mut calls = Vec::new();
    let value = retry_on_conflict::<_, (), _>(3, |attempt| {
        calls.push(attempt);
        Ok(if attempt < 3 {
            Attempt::Conflict
        } else {
            Attempt::Done("written")
        })
    })
    .expect("third attempt must succeed");

    assert_eq!(value, "written");
    assert_eq!(calls, vec![1, 2, 3]);
}

#[test]
fn retry_on_conflict_stops_at_bound() {
    let mut calls = 0;
    let err = retry_on_conflict::<(), (), _>(3, |_| {
        calls += 1;
        Ok(Attempt::Conflict)
    })
    .expect_err("must exhaust");

    assert_eq!(err, RetryError::Exhausted { attempts: 3 });
    assert_eq!(calls, 3);
}

#[test]
fn retry_on_conflict_does_not_retry_fatal_errors() {
    let mut calls = 0;
    let err = retry_on_conflict::<(), _, _>(3, |_| {
        calls += 1;
        Err("boom")
    })
    .expect_err("must fail");

    assert_eq!(err, RetryError::Fatal("boom"));
    assert_eq!(calls, 1);
}

#[test]
fn deploy_builds_new_record_from_catalog() {
    let coordinator = Coordinator::new(seeded_store(), DeployConfig::default());

    let outcome = coordinator
        .deploy(&request("api", "abc123", "2024-01-01T00:00:00Z"))
        .expect("deploy must succeed");

    assert_eq!(outcome.slug, "feature-login");
    assert_eq!(outcome.path, RECORD_PATH);
    assert!(outcome.created);
    assert_eq!(outcome.previous, None);
    assert_eq!(outcome.attempts, 1);

    let record = stored_record(coordinator.store(), RECORD_PATH);
    assert_eq!(record, outcome.record);
    let names: Vec<&str> = record.services.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, vec!["api", "web", "worker"]);

    let api = record.entry("api").expect("api entry must exist");
    assert_eq!(api.version.as_deref(), Some("abc123"));
    let metadata = api.metadata.as_ref().expect("metadata must exist");
    assert_eq!(metadata.pr_author.as_deref(), Some("octocat"));
    assert_eq!(metadata.pr_number, Some(12));
    assert_eq!(metadata.branch.as_deref(), Some("Feature/Login"));
    assert_eq!(metadata.created_at.as_deref(), Some("2024-01-01T00:00:00Z"));
    assert_eq!(metadata.updated_at.as_deref(), Some("2024-01-01T00:00:00Z"));

    for name in ["web", "worker"] {
        let entry = record.entry(name).expect("entry must exist");
        assert!(entry.version.is_none());
        assert!(entry.metadata.is_none());
    }

    let commits = coordinator.store().commits();
    let last = commits.last().expect("must have committed");
    assert_eq!(last.message, "chore(preview): create feature-login preview");
    assert_eq!(last.sha, outcome.commit.sha);
}

#[test]
fn redeploy_keeps_created_at_and_moves_updated_at() {
    let existing = "\
services:
- name: api
  commitSha: abc123
  metadata:
    pr-author: octocat
    created-at: '2024-01-01T00:00:00Z'
    updated-at: '2024-01-01T00:00:00Z'
- name: web
";
    let store = MemoryStore::new().with_file(RECORD_PATH, existing);
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let outcome = coordinator
        .deploy(&request("api", "def456", "2024-06-01T08:30:00Z"))
        .expect("deploy must succeed");

    assert!(!outcome.created);
    assert_eq!(outcome.previous.as_deref(), Some(existing));

    let record = stored_record(coordinator.store(), RECORD_PATH);
    let api = record.entry("api").expect("api entry must exist");
    let metadata = api.metadata.as_ref().expect("metadata must exist");
    assert_eq!(api.version.as_deref(), Some("def456"));
    assert_eq!(metadata.created_at.as_deref(), Some("2024-01-01T00:00:00Z"));
    assert_eq!(metadata.updated_at.as_deref(), Some("2024-06-01T08:30:00Z"));
    assert_eq!(record.services[1].name, "web");
    assert!(record.services[1].version.is_none());

    let commits = coordinator.store().commits();
    let last = commits.last().expect("must have committed");
    assert_eq!(last.message, "chore(preview): update api in feature-login");
}

#[test]
fn updating_existing_entry_does_not_need_the_catalog() {
    let store = MemoryStore::new().with_file(RECORD_PATH, "services:\n- name: api\n");
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let outcome = coordinator
        .deploy(&request("api", "abc123", "2024-01-01T00:00:00Z"))
        .expect("deploy must succeed without services.yaml");
    assert_eq!(outcome.record.services.len(), 1);
}

#[test]
fn deploy_appends_catalog_service_missing_from_record() {
    let store = seeded_store().with_file(RECORD_PATH, "services:\n- name: api\n- name: web\n");
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let outcome = coordinator
        .deploy(&request("worker", "w0rk3r", "2024-01-01T00:00:00Z"))
        .expect("deploy must succeed");

    let names: Vec<&str> = outcome
        .record
        .services
        .iter()
        .map(|entry| entry.name.as_str())
        .collect();
    assert_eq!(names, vec!["api", "web", "worker"]);
}

#[test]
fn deploy_rejects_service_missing_from_catalog_when_appending() {
    let store = seeded_store().with_file(RECORD_PATH, "services:\n- name: api\n");
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let err = coordinator
        .deploy(&request("wroker", "abc123", "2024-01-01T00:00:00Z"))
        .expect_err("typo must be rejected");
    assert!(matches!(err, DeployError::ServiceNotInCatalog { .. }));
    assert!(err.to_string().contains("api, web, worker"));
    assert_eq!(coordinator.store().commits().len(), 2);
}

#[test]
fn deploy_rejects_service_missing_from_catalog_when_building() {
    let coordinator = Coordinator::new(seeded_store(), DeployConfig::default());

    let err = coordinator
        .deploy(&request("billing", "abc123", "2024-01-01T00:00:00Z"))
        .expect_err("unknown service must be rejected");
    assert!(matches!(err, DeployError::ServiceNotInCatalog { ref service, .. } if service == "billing"));
    assert!(coordinator.store().read(RECORD_PATH).is_none());
}

#[test]
fn deploy_retries_update_on_top_of_concurrent_write() {
    let initial = "services:\n- name: api\n- name: web\n";
    let concurrent = "\
services:
- name: api
- name: web
  commitSha: web999
  metadata:
    pr-author: hubot
    created-at: '2024-01-01T09:00:00Z'
    updated-at: '2024-01-01T09:00:00Z'
";
    let store = RacingStore::new(
        seeded_store().with_file(RECORD_PATH, initial),
        concurrent,
    );
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let outcome = coordinator
        .deploy(&request("api", "abc123", "2024-01-01T10:00:00Z"))
        .expect("deploy must converge");

    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.previous.as_deref(), Some(concurrent));

    let record = stored_record(&coordinator.store().inner, RECORD_PATH);
    let api = record.entry("api").expect("api entry must exist");
    let web = record.entry("web").expect("web entry must exist");
    assert_eq!(api.version.as_deref(), Some("abc123"));
    assert_eq!(web.version.as_deref(), Some("web999"));
    assert_eq!(
        web.metadata.as_ref().and_then(|meta| meta.pr_author.as_deref()),
        Some("hubot")
    );
}

#[test]
fn deploy_rebases_lost_create_onto_existing_record() {
    let concurrent = "\
services:
- name: api
- name: web
  commitSha: web999
- name: worker
";
    let store = RacingStore::new(seeded_store(), concurrent);
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let outcome = coordinator
        .deploy(&request("api", "abc123", "2024-01-01T10:00:00Z"))
        .expect("deploy must converge");

    assert_eq!(outcome.attempts, 2);
    assert!(!outcome.created);

    let record = stored_record(&coordinator.store().inner, RECORD_PATH);
    assert_eq!(
        record.entry("api").and_then(|entry| entry.version.as_deref()),
        Some("abc123")
    );
    assert_eq!(
        record.entry("web").and_then(|entry| entry.version.as_deref()),
        Some("web999")
    );

    let commits = coordinator.store().inner.commits();
    let last = commits.last().expect("must have committed");
    assert_eq!(last.message, "chore(preview): update api in feature-login");
}

#[test]
fn deploy_gives_up_after_max_attempts_of_conflicts() {
    let store = AlwaysConflictStore {
        inner: seeded_store().with_file(RECORD_PATH, "services:\n- name: api\n"),
        ..AlwaysConflictStore::default()
    };
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let err = coordinator
        .deploy(&request("api", "abc123", "2024-01-01T00:00:00Z"))
        .expect_err("must exhaust retries");

    assert!(matches!(
        err,
        DeployError::RetriesExhausted { attempts: 3, ref path } if path == RECORD_PATH
    ));
    assert_eq!(coordinator.store().fetches.get(), 3);
    assert_eq!(coordinator.store().writes.get(), 3);
}

#[test]
fn deploy_honours_configured_attempt_bound() {
    let store = AlwaysConflictStore {
        inner: seeded_store(),
        ..AlwaysConflictStore::default()
    };
    let config = DeployConfig {
        max_attempts: 5,
        ..DeployConfig::default()
    };
    let coordinator = Coordinator::new(store, config);

    let err = coordinator
        .deploy(&request("api", "abc123", "2024-01-01T00:00:00Z"))
        .expect_err("must exhaust retries");

    assert!(matches!(err, DeployError::RetriesExhausted { attempts: 5, .. }));
    assert_eq!(coordinator.store().writes.get(), 5);
}

#[test]
fn deploy_fails_fast_when_write_is_forbidden() {
    let store = FailingStore::on_write(seeded_store(), forbidden);
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let err = coordinator
        .deploy(&request("api", "abc123", "2024-01-01T00:00:00Z"))
        .expect_err("forbidden must fail");

    assert!(matches!(err, DeployError::Forbidden { .. }));
    assert!(err.to_string().contains("read and write access"));
    assert_eq!(coordinator.store().writes.get(), 1);
}

#[test]
fn deploy_propagates_transport_errors_without_retry() {
    let store = FailingStore::on_write(seeded_store(), server_error);
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let err = coordinator
        .deploy(&request("api", "abc123", "2024-01-01T00:00:00Z"))
        .expect_err("server error must fail");

    assert!(matches!(err, DeployError::Store(StoreError::Status { status: 502, .. })));
    assert_eq!(coordinator.store().writes.get(), 1);
}

#[test]
fn deploy_propagates_record_fetch_errors() {
    let store = FailingStore::on_fetch(seeded_store(), RECORD_PATH, server_error);
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let err = coordinator
        .deploy(&request("api", "abc123", "2024-01-01T00:00:00Z"))
        .expect_err("fetch error must fail");

    assert!(matches!(err, DeployError::Store(StoreError::Status { .. })));
    assert_eq!(coordinator.store().writes.get(), 0);
}

#[test]
fn deploy_reports_catalog_fetch_failure() {
    let store = FailingStore::on_fetch(MemoryStore::new(), "services.yaml", server_error);
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let err = coordinator
        .deploy(&request("api", "abc123", "2024-01-01T00:00:00Z"))
        .expect_err("catalog error must fail");

    assert!(matches!(err, DeployError::CatalogUnavailable { ref path, .. } if path == "services.yaml"));
    assert_eq!(coordinator.store().writes.get(), 0);
}

#[test]
fn deploy_shows_credential_hint_when_catalog_is_forbidden() {
    let store = FailingStore::on_fetch(MemoryStore::new(), "services.yaml", forbidden);
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let err = coordinator
        .deploy(&request("api", "abc123", "2024-01-01T00:00:00Z"))
        .expect_err("forbidden catalog must fail");

    assert!(matches!(
        err,
        DeployError::Forbidden {
            source: StoreError::Forbidden { status: 403, .. }
        }
    ));
    assert!(err.to_string().contains("read and write access"));
    assert_eq!(coordinator.store().writes.get(), 0);
}

#[test]
fn deploy_reports_missing_catalog() {
    let coordinator = Coordinator::new(MemoryStore::new(), DeployConfig::default());

    let err = coordinator
        .deploy(&request("api", "abc123", "2024-01-01T00:00:00Z"))
        .expect_err("missing catalog must fail");

    assert!(matches!(err, DeployError::CatalogNotFound { .. }));
    assert!(err.to_string().contains("services.yaml"));
}

#[test]
fn deploy_reports_malformed_catalog() {
    let store = MemoryStore::new().with_file("services.yaml", "services:\n  api: {}\n");
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let err = coordinator
        .deploy(&request("api", "abc123", "2024-01-01T00:00:00Z"))
        .expect_err("malformed catalog must fail");

    assert!(matches!(err, DeployError::MalformedCatalog { .. }));
}

#[test]
fn deploy_rejects_malformed_record_without_writing() {
    let store = seeded_store().with_file(RECORD_PATH, "services: [unclosed\n");
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let err = coordinator
        .deploy(&request("api", "abc123", "2024-01-01T00:00:00Z"))
        .expect_err("malformed record must fail");

    assert!(matches!(err, DeployError::MalformedRecord { .. }));
    assert_eq!(coordinator.store().commits().len(), 2);
}

#[test]
fn deploy_rejects_branch_without_slug_characters() {
    let store = AlwaysConflictStore::default();
    let coordinator = Coordinator::new(store, DeployConfig::default());

    let mut request = request("api", "abc123", "2024-01-01T00:00:00Z");
    request.branch = "///".to_string();
    let err = coordinator.deploy(&request).expect_err("empty slug must fail");

    assert!(matches!(err, DeployError::EmptySlug { .. }));
    assert_eq!(coordinator.store().fetches.get(), 0);
}

#[test]
fn deploy_stamps_current_time_when_no_timestamp_given() {
    let coordinator = Coordinator::new(seeded_store(), DeployConfig::default());

    let mut request = request("api", "abc123", "unused");
    request.timestamp = None;
    let outcome = coordinator.deploy(&request).expect("deploy must succeed");

    let metadata = outcome
        .record
        .entry("api")
        .and_then(|entry| entry.metadata.as_ref())
        .expect("metadata must exist");
    let created_at = metadata.created_at.as_deref().expect("created-at must be set");
    assert!(created_at.ends_with('Z'), "unexpected timestamp {created_at}");
    assert_eq!(metadata.created_at, metadata.updated_at);
}
