use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    CommitRef, FetchOutcome, RecordStore, RemoteRecord, StoreError, VersionHandle, WriteOutcome,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const MISSING_SHA_MESSAGE: &str = "\"sha\" wasn't supplied";
const USER_AGENT: &str = concat!("deploy-preview/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    pub owner: String,
    pub repo: String,
}

impl RepoLocation {
    pub fn parse(value: &str) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidLocation(value.to_string());
        let (owner, repo) = value.trim().split_once('/').ok_or_else(invalid)?;
        if !is_valid_segment(owner) || !is_valid_segment(repo) {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

impl fmt::Display for RepoLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.')
}

pub struct GithubContentsStore {
    client: Client,
    api_url: String,
    location: RepoLocation,
    token: String,
    git_ref: Option<String>,
}

impl fmt::Debug for GithubContentsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubContentsStore")
            .field("api_url", &self.api_url)
            .field("location", &self.location)
            .field("token", &"<redacted>")
            .field("git_ref", &self.git_ref)
            .finish()
    }
}

impl GithubContentsStore {
    pub fn new(location: RepoLocation, token: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| StoreError::transport(DEFAULT_API_URL, err))?;
        Ok(Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            location,
            token: token.into(),
            git_ref: None,
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_git_ref(mut self, git_ref: Option<String>) -> Self {
        self.git_ref = git_ref;
        self
    }

    fn contents_url(&self, path: &str) -> String {
        contents_url(&self.api_url, &self.location, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn put_contents(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        handle: Option<&VersionHandle>,
    ) -> Result<WriteOutcome, StoreError> {
        let body = PutContentsRequest {
            message,
            content: STANDARD.encode(content),
            sha: handle.map(VersionHandle::as_str),
            branch: self.git_ref.as_deref(),
        };
        let response = self
            .request(Method::PUT, &self.contents_url(path))
            .json(&body)
            .send()
            .map_err(|err| StoreError::transport(path, err))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|err| StoreError::transport(path, err))?;
        debug!(path, status, creating = handle.is_none(), "put contents");
        write_outcome(path, status, &text, handle.is_none())
    }
}

impl RecordStore for GithubContentsStore {
    fn fetch(&self, path: &str) -> Result<FetchOutcome, StoreError> {
        let mut request = self.request(Method::GET, &self.contents_url(path));
        if let Some(git_ref) = &self.git_ref {
            request = request.query(&[("ref", git_ref.as_str())]);
        }
        let response = request
            .send()
            .map_err(|err| StoreError::transport(path, err))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|err| StoreError::transport(path, err))?;
        debug!(path, status, "get contents");
        fetch_outcome(path, status, &text)
    }

    fn create(&self, path: &str, content: &[u8], message: &str) -> Result<WriteOutcome, StoreError> {
        self.put_contents(path, content, message, None)
    }

    fn update(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        handle: &VersionHandle,
    ) -> Result<WriteOutcome, StoreError> {
        self.put_contents(path, content, message, Some(handle))
    }
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    commit: CommitBody,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    sha: String,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

pub(crate) fn contents_url(api_url: &str, location: &RepoLocation, path: &str) -> String {
    format!(
        "{}/repos/{}/{}/contents/{}",
        api_url.trim_end_matches('/'),
        location.owner,
        location.repo,
        path.trim_start_matches('/')
    )
}

pub(crate) fn fetch_outcome(
    path: &str,
    status: u16,
    body: &str,
) -> Result<FetchOutcome, StoreError> {
    match status {
        200 => {
            let parsed: ContentsResponse = serde_json::from_str(body).map_err(|err| {
                StoreError::decode(path, format!("expected a file entry: {err}"))
            })?;
            if let Some(encoding) = parsed.encoding.as_deref() {
                if encoding != "base64" {
                    return Err(StoreError::decode(
                        path,
                        format!("unsupported content encoding '{encoding}'"),
                    ));
                }
            }
            let compact: String = parsed
                .content
                .chars()
                .filter(|ch| !ch.is_ascii_whitespace())
                .collect();
            let content = STANDARD
                .decode(compact)
                .map_err(|err| StoreError::decode(path, format!("invalid base64 content: {err}")))?;
            Ok(FetchOutcome::Present(RemoteRecord {
                content,
                handle: VersionHandle::new(parsed.sha),
            }))
        }
        404 => Ok(FetchOutcome::Absent),
        _ => Err(status_error(path, status, body)),
    }
}

pub(crate) fn write_outcome(
    path: &str,
    status: u16,
    body: &str,
    creating: bool,
) -> Result<WriteOutcome, StoreError> {
    match status {
        200 | 201 => {
            let parsed: PutContentsResponse = serde_json::from_str(body)
                .map_err(|err| StoreError::decode(path, format!("missing commit details: {err}")))?;
            Ok(WriteOutcome::Committed(CommitRef {
                sha: parsed.commit.sha,
                html_url: parsed.commit.html_url,
            }))
        }
        409 => Ok(WriteOutcome::Conflict),
        // GitHub rejects a create without `sha` once the file exists.
        422 if creating && api_message(body).contains(MISSING_SHA_MESSAGE) => {
            Ok(WriteOutcome::Conflict)
        }
        _ => Err(status_error(path, status, body)),
    }
}

fn status_error(path: &str, status: u16, body: &str) -> StoreError {
    let message = api_message(body);
    match status {
        401 | 403 => StoreError::Forbidden {
            path: path.to_string(),
            status,
            message,
        },
        _ => StoreError::Status {
            path: path.to_string(),
            status,
            message,
        },
    }
}

fn api_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        return parsed.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty response body>".to_string();
    }
    trimmed.chars().take(200).collect()
}
