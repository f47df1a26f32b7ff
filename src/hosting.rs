//! Typed hosting API operations: repository metadata, issues, pull requests,
//! and clone.
//!
//! Workflow for the list operations:
//! 1. Build the endpoint path and base query from the filter.
//! 2. Drive a [`Pages`] cursor strictly sequentially (each page request
//!    depends on the previous page's position; no concurrent fetches).
//! 3. Decode wire records, apply client-side filtering, and stop as soon as
//!    `filter.limit` is satisfied so a small limit never burns quota on
//!    pages that would be discarded.
//!
//! Accumulation preserves the API's own ordering (most recent first).

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{
    IssueRecord, PullRequestRecord, RecordState, RepoMetadata, RepositoryRef,
};
use crate::transport::{ApiRequest, Transport};

/// Filter for issue and pull request listings.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub state: StateFilter,
    /// Required labels; a record must carry all of them.
    pub labels: BTreeSet<String>,
    /// Maximum records to return. `None` fetches every page.
    pub limit: Option<usize>,
}

impl RecordFilter {
    /// Human-readable description used in digest note summaries.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("state={}", self.state.as_param())];
        if !self.labels.is_empty() {
            let labels: Vec<&str> = self.labels.iter().map(String::as_str).collect();
            parts.push(format!("labels={}", labels.join(",")));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("limit={}", limit));
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StateFilter {
    #[default]
    Open,
    Closed,
    All,
}

impl StateFilter {
    pub fn as_param(&self) -> &'static str {
        match self {
            StateFilter::Open => "open",
            StateFilter::Closed => "closed",
            StateFilter::All => "all",
        }
    }
}

impl std::str::FromStr for StateFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(StateFilter::Open),
            "closed" => Ok(StateFilter::Closed),
            "all" => Ok(StateFilter::All),
            other => Err(format!(
                "unknown state '{}': must be open, closed, or all",
                other
            )),
        }
    }
}

/// A resolved cross-reference target: either an issue or a pull request.
#[derive(Debug, Clone)]
pub struct ReferenceRecord {
    pub number: u64,
    pub kind: ReferenceKind,
    pub state: RecordState,
    pub title: String,
    pub html_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Issue,
    PullRequest,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceKind::Issue => f.write_str("issue"),
            ReferenceKind::PullRequest => f.write_str("pull request"),
        }
    }
}

// ============ Wire format ============

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    number: u64,
    state: String,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    user: ApiUser,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    html_url: String,
    /// Present when the record is actually a pull request; the issues
    /// endpoint mixes both.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiBranchRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiPull {
    number: u64,
    state: String,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    user: ApiUser,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    html_url: String,
    head: ApiBranchRef,
    base: ApiBranchRef,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
}

fn label_set(labels: Vec<ApiLabel>) -> BTreeSet<String> {
    labels.into_iter().map(|l| l.name).collect()
}

fn parse_state(raw: &str, merged_at: Option<DateTime<Utc>>) -> RecordState {
    // The API reports merged pull requests as closed with a merge timestamp.
    if merged_at.is_some() {
        return RecordState::Merged;
    }
    match raw {
        "open" => RecordState::Open,
        _ => RecordState::Closed,
    }
}

impl ApiIssue {
    fn into_record(self) -> IssueRecord {
        IssueRecord {
            number: self.number,
            state: parse_state(&self.state, None),
            title: self.title,
            body: self.body.unwrap_or_default(),
            labels: label_set(self.labels),
            author: self.user.login,
            created_at: self.created_at,
            updated_at: self.updated_at,
            html_url: self.html_url,
        }
    }
}

impl ApiPull {
    fn into_record(self) -> PullRequestRecord {
        let state = parse_state(&self.state, self.merged_at);
        PullRequestRecord {
            number: self.number,
            state,
            title: self.title,
            body: self.body.unwrap_or_default(),
            labels: label_set(self.labels),
            author: self.user.login,
            created_at: self.created_at,
            updated_at: self.updated_at,
            html_url: self.html_url,
            head_ref: self.head.name,
            base_ref: self.base.name,
            draft: self.draft,
            merged_at: self.merged_at,
        }
    }
}

// ============ Pagination ============

/// Finite, restartable cursor over one paginated endpoint.
///
/// Each call to [`Pages::next`] fetches exactly one page; the cursor is done
/// once a short or empty page comes back. Callers stop early when their limit
/// is met, leaving the remaining pages unfetched.
struct Pages {
    path: String,
    base_query: Vec<(String, String)>,
    per_page: u32,
    page: u32,
    done: bool,
}

impl Pages {
    fn new(path: String, base_query: Vec<(String, String)>, per_page: u32) -> Self {
        Self {
            path,
            base_query,
            per_page,
            page: 1,
            done: false,
        }
    }

    async fn next<T: Transport>(
        &mut self,
        transport: &mut T,
    ) -> Result<Option<Vec<serde_json::Value>>> {
        if self.done {
            return Ok(None);
        }

        let mut request = ApiRequest::new(self.path.clone())
            .with_query("per_page", self.per_page.to_string())
            .with_query("page", self.page.to_string());
        for (key, value) in &self.base_query {
            request = request.with_query(key.clone(), value.clone());
        }

        let response = transport.send(&request).await?;
        let items = match response.body.as_array() {
            Some(items) => items.clone(),
            None => {
                return Err(Error::HostingApi {
                    status: response.status,
                    body: "expected a JSON array page".to_string(),
                })
            }
        };

        debug!(path = %self.path, page = self.page, count = items.len(), "fetched page");

        if items.len() < self.per_page as usize {
            self.done = true;
        }
        self.page += 1;

        if items.is_empty() {
            Ok(None)
        } else {
            Ok(Some(items))
        }
    }
}

// ============ Client ============

/// Typed operations against the hosting API, built atop a [`Transport`].
pub struct HostingClient<T: Transport> {
    transport: T,
    per_page: u32,
}

impl<T: Transport> HostingClient<T> {
    pub fn new(transport: T, per_page: u32) -> Self {
        Self {
            transport,
            per_page: per_page.clamp(1, 100),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch repository metadata from `GET /repos/{owner}/{name}`.
    pub async fn repository_metadata(&mut self, repo: &RepositoryRef) -> Result<RepoMetadata> {
        let request = ApiRequest::new(format!("/repos/{}/{}", repo.owner, repo.name));
        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| map_not_found(e, repo))?;
        serde_json::from_value(response.body).map_err(|e| Error::HostingApi {
            status: response.status,
            body: format!("unexpected repository payload: {}", e),
        })
    }

    /// List issues matching the filter, most recent first.
    ///
    /// Entries that are pull requests in disguise are skipped; label
    /// filtering is applied both server-side (query param) and client-side
    /// so the returned set is exact regardless of adapter behavior.
    pub async fn list_issues(
        &mut self,
        repo: &RepositoryRef,
        filter: &RecordFilter,
    ) -> Result<Vec<IssueRecord>> {
        let path = format!("/repos/{}/{}/issues", repo.owner, repo.name);
        let mut base_query = vec![("state".to_string(), filter.state.as_param().to_string())];
        if !filter.labels.is_empty() {
            let labels: Vec<&str> = filter.labels.iter().map(String::as_str).collect();
            base_query.push(("labels".to_string(), labels.join(",")));
        }

        let mut pages = Pages::new(path, base_query, self.per_page);
        let mut records = Vec::new();

        while let Some(items) = pages
            .next(&mut self.transport)
            .await
            .map_err(|e| map_not_found(e, repo))?
        {
            for item in items {
                let wire: ApiIssue = decode(item)?;
                if wire.pull_request.is_some() {
                    continue;
                }
                let record = wire.into_record();
                if !has_labels(&record.labels, &filter.labels) {
                    continue;
                }
                records.push(record);
                if filter.limit.is_some_and(|limit| records.len() >= limit) {
                    return Ok(records);
                }
            }
        }

        Ok(records)
    }

    /// List pull requests matching the filter, most recent first.
    ///
    /// The pulls endpoint takes no label parameter, so labels are filtered
    /// client-side only.
    pub async fn list_pull_requests(
        &mut self,
        repo: &RepositoryRef,
        filter: &RecordFilter,
    ) -> Result<Vec<PullRequestRecord>> {
        let path = format!("/repos/{}/{}/pulls", repo.owner, repo.name);
        let base_query = vec![("state".to_string(), filter.state.as_param().to_string())];

        let mut pages = Pages::new(path, base_query, self.per_page);
        let mut records = Vec::new();

        while let Some(items) = pages
            .next(&mut self.transport)
            .await
            .map_err(|e| map_not_found(e, repo))?
        {
            for item in items {
                let wire: ApiPull = decode(item)?;
                let record = wire.into_record();
                if !has_labels(&record.labels, &filter.labels) {
                    continue;
                }
                records.push(record);
                if filter.limit.is_some_and(|limit| records.len() >= limit) {
                    return Ok(records);
                }
            }
        }

        Ok(records)
    }

    /// Resolve one `#NNN` reference via `GET /repos/{owner}/{name}/issues/{n}`,
    /// which covers both issues and pull requests.
    pub async fn lookup_reference(
        &mut self,
        repo: &RepositoryRef,
        number: u64,
    ) -> Result<ReferenceRecord> {
        let request = ApiRequest::new(format!(
            "/repos/{}/{}/issues/{}",
            repo.owner, repo.name, number
        ));
        let response = self.transport.send(&request).await?;
        let wire: ApiIssue = decode(response.body)?;
        let kind = if wire.pull_request.is_some() {
            ReferenceKind::PullRequest
        } else {
            ReferenceKind::Issue
        };
        Ok(ReferenceRecord {
            number: wire.number,
            kind,
            state: parse_state(&wire.state, None),
            title: wire.title,
            html_url: wire.html_url,
        })
    }
}

fn decode<R: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<R> {
    serde_json::from_value(value).map_err(|e| Error::HostingApi {
        status: 200,
        body: format!("unexpected record payload: {}", e),
    })
}

fn has_labels(record_labels: &BTreeSet<String>, required: &BTreeSet<String>) -> bool {
    required.iter().all(|label| record_labels.contains(label))
}

fn map_not_found(err: Error, repo: &RepositoryRef) -> Error {
    match err {
        Error::HostingApi { status: 404, .. } => Error::RepositoryNotFound {
            host: repo.host.clone(),
            owner: repo.owner.clone(),
            name: repo.name.clone(),
        },
        other => other,
    }
}

/// Clone a repository via the git engine.
///
/// Fails with [`Error::CloneFailed`] when the destination already contains an
/// initialized working copy or git exits non-zero.
pub fn clone_repository(url: &str, dest: &Path) -> Result<()> {
    if dest.join(".git").exists() {
        return Err(Error::CloneFailed {
            reason: format!(
                "destination {} already contains a git working copy",
                dest.display()
            ),
        });
    }

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| Error::CloneFailed {
                reason: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }
    }

    let output = Command::new("git")
        .arg("clone")
        .arg(url)
        .arg(dest)
        .output()
        .map_err(|e| Error::CloneFailed {
            reason: format!("failed to execute git: {}", e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::CloneFailed {
            reason: stderr.trim().to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::RateBudget;
    use crate::transport::ApiResponse;
    use async_trait::async_trait;
    use serde_json::json;

    /// Replays a queue of canned responses and records every request sent.
    pub(crate) struct ScriptedTransport {
        responses: Vec<Result<ApiResponse>>,
        pub requests: Vec<ApiRequest>,
        budget: RateBudget,
    }

    impl ScriptedTransport {
        pub(crate) fn new(responses: Vec<Result<ApiResponse>>) -> Self {
            Self {
                responses,
                requests: Vec::new(),
                budget: RateBudget::default(),
            }
        }

        pub(crate) fn ok(status: u16, body: serde_json::Value) -> Result<ApiResponse> {
            Ok(ApiResponse { status, body })
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, request: &ApiRequest) -> Result<ApiResponse> {
            self.requests.push(request.clone());
            if self.responses.is_empty() {
                panic!("scripted transport ran out of responses");
            }
            self.responses.remove(0)
        }

        fn budget(&self) -> &RateBudget {
            &self.budget
        }
    }

    pub(crate) fn issue_json(number: u64, state: &str, labels: &[&str]) -> serde_json::Value {
        json!({
            "number": number,
            "state": state,
            "title": format!("Issue {}", number),
            "body": "body text",
            "labels": labels.iter().map(|l| json!({"name": l})).collect::<Vec<_>>(),
            "user": {"login": "octocat"},
            "created_at": "2026-01-10T08:00:00Z",
            "updated_at": "2026-01-11T08:00:00Z",
            "html_url": format!("https://github.com/octocat/hello-world/issues/{}", number),
        })
    }

    pub(crate) fn pull_json(number: u64, state: &str, merged_at: Option<&str>) -> serde_json::Value {
        json!({
            "number": number,
            "state": state,
            "title": format!("PR {}", number),
            "body": "pr body",
            "labels": [],
            "user": {"login": "octocat"},
            "created_at": "2026-01-10T08:00:00Z",
            "updated_at": "2026-01-11T08:00:00Z",
            "html_url": format!("https://github.com/octocat/hello-world/pull/{}", number),
            "head": {"ref": "feature-x"},
            "base": {"ref": "main"},
            "draft": false,
            "merged_at": merged_at,
        })
    }

    fn repo() -> RepositoryRef {
        RepositoryRef::parse("octocat/hello-world").unwrap()
    }

    #[tokio::test]
    async fn test_pagination_accumulates_in_order() {
        // Two full pages of 2, then a short page of 1.
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::ok(200, json!([issue_json(5, "open", &[]), issue_json(4, "open", &[])])),
            ScriptedTransport::ok(200, json!([issue_json(3, "open", &[]), issue_json(2, "open", &[])])),
            ScriptedTransport::ok(200, json!([issue_json(1, "open", &[])])),
        ]);
        let mut client = HostingClient::new(transport, 2);

        let issues = client
            .list_issues(&repo(), &RecordFilter::default())
            .await
            .unwrap();
        let numbers: Vec<u64> = issues.iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![5, 4, 3, 2, 1]);
        assert_eq!(client.transport().requests.len(), 3);
    }

    #[tokio::test]
    async fn test_repeated_listing_yields_identical_sequences() {
        // Unchanged remote state is modeled as the same page script replayed
        // for a second client; both listings must agree element for element.
        let script = || {
            ScriptedTransport::new(vec![
                ScriptedTransport::ok(
                    200,
                    json!([issue_json(5, "open", &["bug"]), issue_json(4, "open", &[])]),
                ),
                ScriptedTransport::ok(200, json!([issue_json(3, "closed", &[])])),
            ])
        };
        let mut first = HostingClient::new(script(), 2);
        let mut second = HostingClient::new(script(), 2);

        let filter = RecordFilter {
            state: StateFilter::All,
            ..RecordFilter::default()
        };
        let a = first.list_issues(&repo(), &filter).await.unwrap();
        let b = second.list_issues(&repo(), &filter).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(
            first.transport().requests.len(),
            second.transport().requests.len()
        );
    }

    #[tokio::test]
    async fn test_limit_short_circuits_pagination() {
        let transport = ScriptedTransport::new(vec![ScriptedTransport::ok(
            200,
            json!([issue_json(5, "open", &[]), issue_json(4, "open", &[])]),
        )]);
        let mut client = HostingClient::new(transport, 2);

        let filter = RecordFilter {
            limit: Some(2),
            ..RecordFilter::default()
        };
        let issues = client.list_issues(&repo(), &filter).await.unwrap();
        assert_eq!(issues.len(), 2);
        // The limit was met on page one; page two is never requested.
        assert_eq!(client.transport().requests.len(), 1);
    }

    #[tokio::test]
    async fn test_issues_skip_pull_request_entries() {
        let mut pr_entry = issue_json(7, "open", &[]);
        pr_entry["pull_request"] = json!({"url": "https://api.github.com/..."});
        let transport = ScriptedTransport::new(vec![ScriptedTransport::ok(
            200,
            json!([pr_entry, issue_json(6, "open", &[])]),
        )]);
        let mut client = HostingClient::new(transport, 50);

        let issues = client
            .list_issues(&repo(), &RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].number, 6);
    }

    #[tokio::test]
    async fn test_label_filter_is_exact() {
        let transport = ScriptedTransport::new(vec![ScriptedTransport::ok(
            200,
            json!([
                issue_json(1, "open", &["bug"]),
                issue_json(2, "open", &["feature"]),
                issue_json(3, "open", &["bug", "urgent"]),
                issue_json(4, "open", &[]),
            ]),
        )]);
        let mut client = HostingClient::new(transport, 50);

        let filter = RecordFilter {
            labels: BTreeSet::from(["bug".to_string()]),
            ..RecordFilter::default()
        };
        let issues = client.list_issues(&repo(), &filter).await.unwrap();
        let numbers: Vec<u64> = issues.iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert!(issues.iter().all(|i| i.labels.contains("bug")));
    }

    #[tokio::test]
    async fn test_not_found_maps_to_repository_not_found() {
        let transport = ScriptedTransport::new(vec![Err(Error::HostingApi {
            status: 404,
            body: "Not Found".to_string(),
        })]);
        let mut client = HostingClient::new(transport, 50);

        let err = client
            .list_issues(&repo(), &RecordFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RepositoryNotFound { .. }));
    }

    #[tokio::test]
    async fn test_merged_pull_request_state_normalized() {
        let transport = ScriptedTransport::new(vec![ScriptedTransport::ok(
            200,
            json!([pull_json(9, "closed", Some("2026-02-01T10:00:00Z"))]),
        )]);
        let mut client = HostingClient::new(transport, 50);

        let pulls = client
            .list_pull_requests(&repo(), &RecordFilter { state: StateFilter::All, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(pulls[0].state, RecordState::Merged);
    }

    #[tokio::test]
    async fn test_lookup_reference_distinguishes_kind() {
        let mut pr_entry = issue_json(42, "closed", &[]);
        pr_entry["pull_request"] = json!({"url": "https://api.github.com/..."});
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::ok(200, issue_json(41, "open", &[])),
            ScriptedTransport::ok(200, pr_entry),
        ]);
        let mut client = HostingClient::new(transport, 50);

        let issue = client.lookup_reference(&repo(), 41).await.unwrap();
        assert_eq!(issue.kind, ReferenceKind::Issue);
        let pr = client.lookup_reference(&repo(), 42).await.unwrap();
        assert_eq!(pr.kind, ReferenceKind::PullRequest);
    }

    #[test]
    fn test_clone_rejects_existing_working_copy() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
        let err = clone_repository("https://github.com/octocat/hello-world", tmp.path())
            .unwrap_err();
        assert!(matches!(err, Error::CloneFailed { .. }));
    }
}
