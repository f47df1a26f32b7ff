//! Reconciliation of local repository state with hosting API records.
//!
//! The reconciler composes the inspector and the hosting client into report
//! structures. Branch comparisons are annotated with cross-references: commit
//! subjects are scanned for `#NNN` patterns and each referenced id is looked
//! up on the hosting API. A failed lookup (deleted issue, API error, missing
//! credential) never fails the report; the commit stays in with an explicit
//! unresolved-reference marker, because partial results beat total failure.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;
use crate::hosting::{
    clone_repository, HostingClient, RecordFilter, ReferenceRecord,
};
use crate::inspector::{GitEngine, LocalRepositoryInspector};
use crate::models::{
    BranchDiff, CommitInfo, IssueRecord, PullRequestRecord, RepoMetadata, RepoStatus,
    RepositoryRef,
};
use crate::transport::Transport;

/// Tagged report variant handed to the exporter. All kinds share one
/// rendering contract (title, tags, stable body sections).
#[derive(Debug, Clone)]
pub enum Report {
    Overview(OverviewReport),
    BranchComparison(ComparisonReport),
    IssueDigest(IssueDigestReport),
    PullRequestDigest(PullRequestDigestReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Overview,
    BranchComparison,
    IssueDigest,
    PullRequestDigest,
}

impl ReportKind {
    /// Tag recorded in note frontmatter.
    pub fn tag(&self) -> &'static str {
        match self {
            ReportKind::Overview => "repo-overview",
            ReportKind::BranchComparison => "branch-comparison",
            ReportKind::IssueDigest => "issue-digest",
            ReportKind::PullRequestDigest => "pull-request-digest",
        }
    }
}

impl Report {
    pub fn kind(&self) -> ReportKind {
        match self {
            Report::Overview(_) => ReportKind::Overview,
            Report::BranchComparison(_) => ReportKind::BranchComparison,
            Report::IssueDigest(_) => ReportKind::IssueDigest,
            Report::PullRequestDigest(_) => ReportKind::PullRequestDigest,
        }
    }

    pub fn repo(&self) -> &RepositoryRef {
        match self {
            Report::Overview(r) => &r.repo,
            Report::BranchComparison(r) => &r.repo,
            Report::IssueDigest(r) => &r.repo,
            Report::PullRequestDigest(r) => &r.repo,
        }
    }

    pub fn title(&self) -> String {
        match self {
            Report::Overview(r) => format!("Repository overview {}", r.repo.slug()),
            Report::BranchComparison(r) => format!(
                "Branch comparison {} vs {}",
                r.diff.base.name, r.diff.head.name
            ),
            Report::IssueDigest(r) => format!("Issue digest {}", r.repo.slug()),
            Report::PullRequestDigest(r) => format!("Pull request digest {}", r.repo.slug()),
        }
    }
}

/// Clone-and-analyze output: working-copy state plus remote metadata.
#[derive(Debug, Clone)]
pub struct OverviewReport {
    pub repo: RepositoryRef,
    /// `None` when the metadata fetch failed; recorded, not fatal.
    pub metadata: Option<RepoMetadata>,
    pub status: RepoStatus,
    pub recent: Vec<CommitInfo>,
}

/// Branch-vs-branch diff annotated with hosting cross-references.
#[derive(Debug, Clone)]
pub struct ComparisonReport {
    pub repo: RepositoryRef,
    pub diff: BranchDiff,
    /// In commit order, deduplicated by referenced id.
    pub cross_refs: Vec<CrossReference>,
}

/// One `#NNN` reference discovered in a commit subject.
#[derive(Debug, Clone)]
pub struct CrossReference {
    pub number: u64,
    /// SHA of the first commit that mentioned the id.
    pub commit_sha: String,
    /// `None` marks an unresolved reference (deleted, inaccessible, or the
    /// lookup failed).
    pub resolved: Option<ReferenceRecord>,
}

#[derive(Debug, Clone)]
pub struct IssueDigestReport {
    pub repo: RepositoryRef,
    pub filter: String,
    pub issues: Vec<IssueRecord>,
}

#[derive(Debug, Clone)]
pub struct PullRequestDigestReport {
    pub repo: RepositoryRef,
    pub filter: String,
    pub pulls: Vec<PullRequestRecord>,
}

/// Extract referenced issue/PR ids (`#` followed by digits) from a commit
/// message, in order of appearance.
pub fn extract_reference_numbers(message: &str) -> Vec<u64> {
    let mut numbers = Vec::new();
    let bytes = message.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'#' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if end > start {
                if let Ok(number) = message[start..end].parse() {
                    numbers.push(number);
                }
            }
            i = end;
        } else {
            i += 1;
        }
    }

    numbers
}

/// Composes inspector and hosting client outputs into reports.
pub struct Reconciler<T: Transport, E: GitEngine> {
    inspector: LocalRepositoryInspector<E>,
    hosting: HostingClient<T>,
}

impl<T: Transport, E: GitEngine> Reconciler<T, E> {
    pub fn new(inspector: LocalRepositoryInspector<E>, hosting: HostingClient<T>) -> Self {
        Self { inspector, hosting }
    }

    /// Compare two branches and annotate the diff with hosting records for
    /// every id referenced from a commit subject.
    pub async fn compare_branches(
        &mut self,
        path: &Path,
        repo: &RepositoryRef,
        base: &str,
        head: &str,
    ) -> Result<ComparisonReport> {
        let diff = self.inspector.diff_branches(path, base, head)?;
        info!(
            base,
            head,
            ahead = diff.ahead(),
            behind = diff.behind(),
            "compared branches"
        );

        // Collect references in commit order (ahead first, then behind),
        // deduplicated on the referenced id.
        let mut seen = BTreeSet::new();
        let mut pending = Vec::new();
        for commit in diff.head.commits.iter().chain(diff.base.commits.iter()) {
            for number in extract_reference_numbers(&commit.message) {
                if seen.insert(number) {
                    pending.push((number, commit.sha.clone()));
                }
            }
        }

        let mut cross_refs = Vec::with_capacity(pending.len());
        for (number, commit_sha) in pending {
            let resolved = match self.hosting.lookup_reference(repo, number).await {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(number, error = %err, "cross-reference lookup failed");
                    None
                }
            };
            cross_refs.push(CrossReference {
                number,
                commit_sha,
                resolved,
            });
        }

        Ok(ComparisonReport {
            repo: repo.clone(),
            diff,
            cross_refs,
        })
    }

    /// Snapshot the repository's issues under a filter.
    pub async fn digest_issues(
        &mut self,
        repo: &RepositoryRef,
        filter: &RecordFilter,
    ) -> Result<IssueDigestReport> {
        let issues = self.hosting.list_issues(repo, filter).await?;
        Ok(IssueDigestReport {
            repo: repo.clone(),
            filter: filter.describe(),
            issues,
        })
    }

    /// Snapshot the repository's pull requests under a filter.
    pub async fn digest_pull_requests(
        &mut self,
        repo: &RepositoryRef,
        filter: &RecordFilter,
    ) -> Result<PullRequestDigestReport> {
        let pulls = self.hosting.list_pull_requests(repo, filter).await?;
        Ok(PullRequestDigestReport {
            repo: repo.clone(),
            filter: filter.describe(),
            pulls,
        })
    }

    /// Clone a repository and produce an overview: status, recent history,
    /// and (best effort) remote metadata.
    pub async fn clone_and_analyze(
        &mut self,
        url: &str,
        dest: &Path,
        log_limit: usize,
    ) -> Result<OverviewReport> {
        let mut repo = RepositoryRef::parse(url)?;
        clone_repository(url, dest)?;
        repo.local_path = Some(dest.to_path_buf());
        info!(url, dest = %dest.display(), "cloned repository");

        let status = self.inspector.status(dest)?;
        let recent = self.inspector.log(dest, None, log_limit)?;

        let metadata = match self.hosting.repository_metadata(&repo).await {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                warn!(error = %err, "metadata fetch failed, overview continues without it");
                None
            }
        };

        Ok(OverviewReport {
            repo,
            metadata,
            status,
            recent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::hosting::tests::{issue_json, ScriptedTransport};
    use crate::inspector::tests::CannedGit;
    use serde_json::json;

    #[test]
    fn test_extract_single_reference() {
        assert_eq!(extract_reference_numbers("fixes #42"), vec![42]);
    }

    #[test]
    fn test_extract_multiple_in_order() {
        assert_eq!(
            extract_reference_numbers("see #7, closes #3 and #19"),
            vec![7, 3, 19]
        );
    }

    #[test]
    fn test_extract_ignores_bare_hash_and_text() {
        assert!(extract_reference_numbers("no refs here # none #x").is_empty());
    }

    #[test]
    fn test_extract_hash_at_end() {
        assert!(extract_reference_numbers("trailing #").is_empty());
        assert_eq!(extract_reference_numbers("#5"), vec![5]);
    }

    fn record(sha: &str, subject: &str) -> String {
        format!(
            "{}\x1fAlice\x1f2026-03-01T10:00:00+00:00\x1fp0\x1f{}\x1e",
            sha, subject
        )
    }

    fn log_format() -> String {
        "--pretty=format:%H%x1f%an%x1f%aI%x1f%P%x1f%s%x1e".to_string()
    }

    fn comparison_engine() -> CannedGit {
        let ahead = format!(
            "{}{}{}",
            record("a3", "fixes #42"),
            record("a2", "refactor parser"),
            record("a1", "closes #7")
        );
        let behind = record("b1", "hotfix");
        CannedGit::new()
            .respond("rev-parse main", "basesha\n")
            .respond("rev-parse feature-x", "headsha\n")
            .respond(&format!("log {} main..feature-x", log_format()), &ahead)
            .respond(&format!("log {} feature-x..main", log_format()), &behind)
    }

    #[tokio::test]
    async fn test_compare_attaches_resolved_and_unresolved_refs() {
        // #42 resolves; #7 was deleted on the host.
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::ok(200, issue_json(42, "closed", &["bug"])),
            Err(Error::HostingApi {
                status: 404,
                body: "Not Found".to_string(),
            }),
        ]);
        let mut reconciler = Reconciler::new(
            LocalRepositoryInspector::new(comparison_engine()),
            HostingClient::new(transport, 50),
        );

        let repo = RepositoryRef::parse("octocat/hello-world").unwrap();
        let report = reconciler
            .compare_branches(Path::new("/repo"), &repo, "main", "feature-x")
            .await
            .unwrap();

        assert_eq!(report.diff.ahead(), 3);
        assert_eq!(report.diff.behind(), 1);
        assert_eq!(
            report.diff.head.commits.len() + report.diff.base.commits.len(),
            4
        );

        // Cross-references in commit order, the failed lookup kept as a marker.
        assert_eq!(report.cross_refs.len(), 2);
        assert_eq!(report.cross_refs[0].number, 42);
        assert!(report.cross_refs[0].resolved.is_some());
        assert_eq!(report.cross_refs[1].number, 7);
        assert!(report.cross_refs[1].resolved.is_none());
    }

    #[tokio::test]
    async fn test_compare_without_refs_makes_no_hosting_calls() {
        let ahead = record("a1", "plain subject");
        let engine = CannedGit::new()
            .respond("rev-parse main", "basesha\n")
            .respond("rev-parse dev", "headsha\n")
            .respond(&format!("log {} main..dev", log_format()), &ahead)
            .respond(&format!("log {} dev..main", log_format()), "");
        let mut reconciler = Reconciler::new(
            LocalRepositoryInspector::new(engine),
            HostingClient::new(ScriptedTransport::new(vec![]), 50),
        );

        let repo = RepositoryRef::parse("octocat/hello-world").unwrap();
        let report = reconciler
            .compare_branches(Path::new("/repo"), &repo, "main", "dev")
            .await
            .unwrap();
        assert!(report.cross_refs.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_refs_looked_up_once() {
        let ahead = format!("{}{}", record("a2", "fixes #42"), record("a1", "see #42"));
        let engine = CannedGit::new()
            .respond("rev-parse main", "basesha\n")
            .respond("rev-parse dev", "headsha\n")
            .respond(&format!("log {} main..dev", log_format()), &ahead)
            .respond(&format!("log {} dev..main", log_format()), "");
        let transport = ScriptedTransport::new(vec![ScriptedTransport::ok(
            200,
            issue_json(42, "open", &[]),
        )]);
        let mut reconciler = Reconciler::new(
            LocalRepositoryInspector::new(engine),
            HostingClient::new(transport, 50),
        );

        let repo = RepositoryRef::parse("octocat/hello-world").unwrap();
        let report = reconciler
            .compare_branches(Path::new("/repo"), &repo, "main", "dev")
            .await
            .unwrap();
        assert_eq!(report.cross_refs.len(), 1);
        // The marker records the first commit that mentioned the id.
        assert_eq!(report.cross_refs[0].commit_sha, "a2");
    }

    #[tokio::test]
    async fn test_digest_issues_carries_filter_description() {
        let transport = ScriptedTransport::new(vec![ScriptedTransport::ok(
            200,
            json!([issue_json(1, "open", &["bug"])]),
        )]);
        let mut reconciler = Reconciler::new(
            LocalRepositoryInspector::new(CannedGit::new()),
            HostingClient::new(transport, 50),
        );

        let repo = RepositoryRef::parse("octocat/hello-world").unwrap();
        let filter = RecordFilter {
            labels: std::collections::BTreeSet::from(["bug".to_string()]),
            ..RecordFilter::default()
        };
        let digest = reconciler.digest_issues(&repo, &filter).await.unwrap();
        assert_eq!(digest.issues.len(), 1);
        assert!(digest.filter.contains("labels=bug"));
    }
}
