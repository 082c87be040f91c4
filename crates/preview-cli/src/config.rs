use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::DateTime;
use preview_store::{RepoLocation, DEFAULT_API_URL};
use preview_sync::{Attribution, DeployConfig, DeployRequest};
use serde::Deserialize;

use crate::DeployArgs;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub(crate) repo: Option<String>,
    pub(crate) api_url: Option<String>,
    pub(crate) git_ref: Option<String>,
    pub(crate) max_attempts: Option<u32>,
    pub(crate) previews_dir: Option<String>,
    pub(crate) record_file: Option<String>,
    pub(crate) registry_path: Option<String>,
}

pub(crate) struct Settings {
    pub(crate) location: RepoLocation,
    pub(crate) token: String,
    pub(crate) api_url: String,
    pub(crate) git_ref: Option<String>,
    pub(crate) deploy: DeployConfig,
    pub(crate) request: DeployRequest,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("location", &self.location)
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("git_ref", &self.git_ref)
            .field("deploy", &self.deploy)
            .field("request", &self.request)
            .finish()
    }
}

pub(crate) fn load_file_config(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed reading config file: {}", path.display()))?;
    parse_file_config(&content)
        .with_context(|| format!("failed parsing config file: {}", path.display()))
}

pub(crate) fn parse_file_config(content: &str) -> Result<FileConfig> {
    Ok(toml::from_str(content)?)
}

pub(crate) fn resolve_settings(args: &DeployArgs, file: FileConfig) -> Result<Settings> {
    let repo = non_blank(&args.repo).or_else(|| non_blank(&file.repo));
    let token = non_blank(&args.token);
    let service = non_blank(&args.service);
    let branch = non_blank(&args.branch);
    let version = non_blank(&args.commit_sha);

    let missing: Vec<&str> = [
        (repo.is_none(), "GITOPS_REPO (--repo)"),
        (token.is_none(), "GITOPS_TOKEN (--token)"),
        (service.is_none(), "SERVICE_NAME (--service)"),
        (branch.is_none(), "HEAD_REF (--branch)"),
        (version.is_none(), "COMMIT_SHA (--commit-sha)"),
    ]
    .into_iter()
    .filter_map(|(is_missing, name)| is_missing.then_some(name))
    .collect();
    let (Some(repo), Some(token), Some(service), Some(branch), Some(version)) =
        (repo, token, service, branch, version)
    else {
        anyhow::bail!("missing required inputs: {}", missing.join(", "));
    };

    let location = RepoLocation::parse(&repo).context("invalid GITOPS_REPO (--repo)")?;

    let max_attempts = args
        .max_attempts
        .or(file.max_attempts)
        .unwrap_or(preview_sync::DEFAULT_MAX_ATTEMPTS);
    if max_attempts == 0 {
        anyhow::bail!("invalid max_attempts: must be at least 1");
    }

    let defaults = DeployConfig::default();
    let deploy = DeployConfig {
        max_attempts,
        previews_dir: repo_path("previews_dir", file.previews_dir, defaults.previews_dir)?,
        record_file: repo_path("record_file", file.record_file, defaults.record_file)?,
        registry_path: repo_path("registry_path", file.registry_path, defaults.registry_path)?,
    };

    let pr_number = non_blank(&args.pr_number)
        .map(|raw| parse_pr_number(&raw))
        .transpose()?;
    let timestamp = non_blank(&args.timestamp)
        .map(|raw| validate_timestamp(&raw).map(|()| raw))
        .transpose()?;

    let request = DeployRequest {
        service,
        branch,
        version,
        attribution: Attribution {
            author: non_blank(&args.pr_author),
            pr_url: non_blank(&args.pr_url),
            pr_number,
            workflow_run_url: non_blank(&args.workflow_run_url),
        },
        timestamp,
    };

    Ok(Settings {
        location,
        token,
        api_url: non_blank(&args.api_url)
            .or_else(|| non_blank(&file.api_url))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        git_ref: non_blank(&args.git_ref).or_else(|| non_blank(&file.git_ref)),
        deploy,
        request,
    })
}

// CI systems pass unset inputs through as empty strings.
fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_string)
}

fn repo_path(name: &str, value: Option<String>, default: String) -> Result<String> {
    let value = non_blank(&value).unwrap_or(default);
    let has_bad_segment = value
        .split('/')
        .any(|segment| segment == ".." || segment == ".");
    if value.starts_with('/') || has_bad_segment || value.chars().any(char::is_whitespace) {
        anyhow::bail!("invalid {name} '{value}': must be a relative path inside the repository");
    }
    Ok(value)
}

fn parse_pr_number(raw: &str) -> Result<u64> {
    match raw.trim_start_matches('#').parse::<u64>() {
        Ok(number) if number > 0 => Ok(number),
        _ => anyhow::bail!("invalid PR_NUMBER (--pr-number): expected a positive integer, got '{raw}'"),
    }
}

fn validate_timestamp(raw: &str) -> Result<()> {
    DateTime::parse_from_rfc3339(raw)
        .map(|_| ())
        .with_context(|| format!("invalid DEPLOY_TIMESTAMP (--timestamp): '{raw}' is not RFC 3339"))
}
