//! Core data models shared across the pipeline.
//!
//! These types represent the repository views that flow between the local
//! inspector, the hosting client, and the reconciler. Hosting records are
//! immutable snapshots at fetch time; branch state is recomputed on every
//! comparison because branch heads move.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Identifies one logical repository across the local and remote views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    pub host: String,
    pub owner: String,
    pub name: String,
    /// When set, points to an initialized working copy of this repository.
    pub local_path: Option<PathBuf>,
}

impl RepositoryRef {
    /// Parse a repository reference from a URL or an `owner/name` pair.
    ///
    /// Accepted forms:
    /// - `https://github.com/owner/name` (optional `.git` suffix)
    /// - `git@github.com:owner/name.git`
    /// - `owner/name` (host defaults to `github.com`)
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || Error::InvalidRepositoryRef {
            input: input.to_string(),
        };

        if let Some(rest) = input.strip_prefix("git@") {
            // git@host:owner/name.git
            let (host, path) = rest.split_once(':').ok_or_else(invalid)?;
            return Self::from_parts(host, path).ok_or_else(invalid);
        }

        if let Some(idx) = input.find("://") {
            // scheme://host/owner/name
            let rest = &input[idx + 3..];
            let (host, path) = rest.split_once('/').ok_or_else(invalid)?;
            return Self::from_parts(host, path).ok_or_else(invalid);
        }

        Self::from_parts("github.com", input).ok_or_else(invalid)
    }

    fn from_parts(host: &str, path: &str) -> Option<Self> {
        let mut segments = path.trim_matches('/').split('/');
        let owner = segments.next()?.to_string();
        let name = segments.next()?.trim_end_matches(".git").to_string();
        if host.is_empty() || owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(RepositoryRef {
            host: host.to_string(),
            owner,
            name,
            local_path: None,
        })
    }

    /// `owner/name` label used in tags and frontmatter.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Browsable web URL for the repository.
    pub fn web_url(&self) -> String {
        format!("https://{}/{}/{}", self.host, self.owner, self.name)
    }
}

/// One commit read from version-control history. Never mutated after parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Parent SHAs in order; at most two for typical merges.
    pub parents: Vec<String>,
}

impl CommitInfo {
    /// Abbreviated SHA for human-facing output.
    pub fn short_sha(&self) -> &str {
        &self.sha[..self.sha.len().min(8)]
    }
}

/// Snapshot of one branch relative to a comparison target.
///
/// Recomputed on every request; never cached across calls.
#[derive(Debug, Clone)]
pub struct BranchState {
    pub name: String,
    pub head: String,
    /// Commits on this branch not reachable from the comparison target.
    pub ahead: usize,
    /// Commits on the comparison target not reachable from this branch.
    pub behind: usize,
    /// The commits counted by `ahead`, most recent first.
    pub commits: Vec<CommitInfo>,
}

/// Result of comparing two branches. `head.ahead == base.behind` and
/// vice versa by construction.
#[derive(Debug, Clone)]
pub struct BranchDiff {
    pub base: BranchState,
    pub head: BranchState,
}

impl BranchDiff {
    /// Commits in head not reachable from base.
    pub fn ahead(&self) -> usize {
        self.head.ahead
    }

    /// Commits in base not reachable from head.
    pub fn behind(&self) -> usize {
        self.head.behind
    }
}

/// Working-copy status: current branch plus porcelain change lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoStatus {
    pub branch: String,
    pub changes: Vec<String>,
}

impl RepoStatus {
    pub fn is_clean(&self) -> bool {
        self.changes.is_empty()
    }
}

/// State of an issue or pull request at fetch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Open,
    Closed,
    /// Pull requests only; normalized from `closed` plus a merge timestamp.
    Merged,
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordState::Open => "open",
            RecordState::Closed => "closed",
            RecordState::Merged => "merged",
        };
        f.write_str(s)
    }
}

/// Issue snapshot from the hosting API. Never assumed to stay fresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRecord {
    pub number: u64,
    pub state: RecordState,
    pub title: String,
    pub body: String,
    pub labels: BTreeSet<String>,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub html_url: String,
}

/// Pull request snapshot from the hosting API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRecord {
    pub number: u64,
    pub state: RecordState,
    pub title: String,
    pub body: String,
    pub labels: BTreeSet<String>,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub html_url: String,
    pub head_ref: String,
    pub base_ref: String,
    pub draft: bool,
    pub merged_at: Option<DateTime<Utc>>,
}

/// Repository metadata from the hosting API.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoMetadata {
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub default_branch: String,
    #[serde(rename = "stargazers_count")]
    pub stars: u64,
    #[serde(rename = "forks_count")]
    pub forks: u64,
    #[serde(rename = "open_issues_count")]
    pub open_issues: u64,
}

/// Rate quota state for one (host, credential) pair.
///
/// Owned and exclusively mutated by the transport. A fresh instance starts
/// with everything unknown until the first response is observed; the state is
/// never persisted across restarts.
#[derive(Debug, Clone, Default)]
pub struct RateBudget {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateBudget {
    /// Check whether another call may be attempted right now.
    ///
    /// Fails with [`Error::RateLimitExceeded`] when the budget is known to be
    /// exhausted and the reset time has not passed. Called before any network
    /// attempt, so an exhausted budget never costs a request.
    pub fn authorize(&self, now: DateTime<Utc>) -> Result<()> {
        if self.remaining == Some(0) {
            match self.reset_at {
                Some(reset) if reset > now => {
                    return Err(Error::RateLimitExceeded {
                        reset_at: Some(reset),
                    })
                }
                None => return Err(Error::RateLimitExceeded { reset_at: None }),
                _ => {}
            }
        }
        Ok(())
    }

    /// Fold observed response metadata into the budget.
    ///
    /// `remaining` never increases except when the observed reset time moves
    /// forward (an explicit reset); a stale or reordered header can therefore
    /// never inflate the budget.
    pub fn observe(
        &mut self,
        limit: Option<u32>,
        remaining: Option<u32>,
        reset_at: Option<DateTime<Utc>>,
    ) {
        if limit.is_some() {
            self.limit = limit;
        }

        let reset_advanced = match (reset_at, self.reset_at) {
            (Some(new), Some(old)) => new > old,
            (Some(_), None) => true,
            _ => false,
        };

        if let Some(new_remaining) = remaining {
            match self.remaining {
                Some(current) if new_remaining > current && !reset_advanced => {
                    // Stale header without a reset: keep the tighter value.
                }
                _ => self.remaining = Some(new_remaining),
            }
        }

        if reset_at.is_some() {
            self.reset_at = reset_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_parse_https_url() {
        let r = RepositoryRef::parse("https://github.com/octocat/hello-world").unwrap();
        assert_eq!(r.host, "github.com");
        assert_eq!(r.owner, "octocat");
        assert_eq!(r.name, "hello-world");
    }

    #[test]
    fn test_parse_https_url_with_git_suffix() {
        let r = RepositoryRef::parse("https://github.com/octocat/hello-world.git").unwrap();
        assert_eq!(r.slug(), "octocat/hello-world");
    }

    #[test]
    fn test_parse_ssh_url() {
        let r = RepositoryRef::parse("git@github.com:octocat/hello-world.git").unwrap();
        assert_eq!(r.host, "github.com");
        assert_eq!(r.slug(), "octocat/hello-world");
    }

    #[test]
    fn test_parse_shorthand() {
        let r = RepositoryRef::parse("octocat/hello-world").unwrap();
        assert_eq!(r.host, "github.com");
        assert_eq!(r.slug(), "octocat/hello-world");
    }

    #[test]
    fn test_parse_rejects_bare_name() {
        assert!(RepositoryRef::parse("hello-world").is_err());
        assert!(RepositoryRef::parse("").is_err());
    }

    #[test]
    fn test_budget_starts_unknown_and_authorized() {
        let budget = RateBudget::default();
        assert!(budget.authorize(Utc::now()).is_ok());
    }

    #[test]
    fn test_budget_exhausted_with_future_reset_denies() {
        let now = Utc::now();
        let budget = RateBudget {
            limit: Some(60),
            remaining: Some(0),
            reset_at: Some(now + Duration::minutes(10)),
        };
        assert!(matches!(
            budget.authorize(now),
            Err(Error::RateLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_budget_exhausted_with_past_reset_allows() {
        let now = Utc::now();
        let budget = RateBudget {
            limit: Some(60),
            remaining: Some(0),
            reset_at: Some(now - Duration::minutes(1)),
        };
        assert!(budget.authorize(now).is_ok());
    }

    #[test]
    fn test_budget_never_increases_without_reset() {
        let reset = Utc::now() + Duration::hours(1);
        let mut budget = RateBudget::default();
        budget.observe(Some(60), Some(5), Some(reset));
        // A stale header with a higher remaining and the same reset is ignored.
        budget.observe(Some(60), Some(30), Some(reset));
        assert_eq!(budget.remaining, Some(5));
    }

    #[test]
    fn test_budget_increases_when_reset_advances() {
        let reset = Utc::now() + Duration::hours(1);
        let mut budget = RateBudget::default();
        budget.observe(Some(60), Some(0), Some(reset));
        budget.observe(Some(60), Some(60), Some(reset + Duration::hours(1)));
        assert_eq!(budget.remaining, Some(60));
    }

    #[test]
    fn test_budget_decreases_normally() {
        let reset = Utc::now() + Duration::hours(1);
        let mut budget = RateBudget::default();
        budget.observe(Some(60), Some(10), Some(reset));
        budget.observe(Some(60), Some(9), Some(reset));
        assert_eq!(budget.remaining, Some(9));
    }
}
