//! Top-level operation surface consumed by the command-dispatch layer.
//!
//! One [`Pipeline`] wires the production components together: the system git
//! engine, the rate-limited transport, the reconciler, and the note exporter.
//! Each method is one coarse-grained synchronous-from-the-caller operation;
//! nothing runs in the background and only one operation is in flight at a
//! time, which is what keeps the shared rate budget single-writer.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;
use crate::export::{NoteCategory, NoteExporter};
use crate::hosting::{HostingClient, RecordFilter};
use crate::inspector::{LocalRepositoryInspector, SystemGit};
use crate::models::{CommitInfo, RepoStatus, RepositoryRef};
use crate::reconcile::{Reconciler, Report};
use crate::transport::RateLimitedTransport;

pub struct Pipeline {
    inspector: LocalRepositoryInspector<SystemGit>,
    reconciler: Reconciler<RateLimitedTransport, SystemGit>,
    exporter: NoteExporter,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport = RateLimitedTransport::from_config(config)?;
        let hosting = HostingClient::new(transport, config.hosting.per_page);
        let reconciler = Reconciler::new(LocalRepositoryInspector::system(), hosting);

        Ok(Self {
            inspector: LocalRepositoryInspector::system(),
            reconciler,
            exporter: NoteExporter::new(config.vault.clone()),
        })
    }

    pub fn inspect_status(&self, path: &Path) -> Result<RepoStatus> {
        self.inspector.status(path)
    }

    pub fn get_log(
        &self,
        path: &Path,
        branch: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitInfo>> {
        self.inspector.log(path, branch, limit)
    }

    pub fn file_history(&self, path: &Path, file: &str) -> Result<Vec<CommitInfo>> {
        self.inspector.file_history(path, file)
    }

    /// Repository reference from the working copy's `origin` remote, when
    /// one is configured and parseable.
    pub fn repo_from_remote(&self, path: &Path) -> Result<Option<RepositoryRef>> {
        Ok(self
            .inspector
            .remote_url(path)?
            .and_then(|url| RepositoryRef::parse(&url).ok()))
    }

    pub async fn compare_branches(
        &mut self,
        path: &Path,
        repo: &RepositoryRef,
        base: &str,
        head: &str,
    ) -> Result<Report> {
        let report = self
            .reconciler
            .compare_branches(path, repo, base, head)
            .await?;
        Ok(Report::BranchComparison(report))
    }

    pub async fn list_issues(
        &mut self,
        repo: &RepositoryRef,
        filter: &RecordFilter,
    ) -> Result<Report> {
        let digest = self.reconciler.digest_issues(repo, filter).await?;
        Ok(Report::IssueDigest(digest))
    }

    pub async fn list_pull_requests(
        &mut self,
        repo: &RepositoryRef,
        filter: &RecordFilter,
    ) -> Result<Report> {
        let digest = self.reconciler.digest_pull_requests(repo, filter).await?;
        Ok(Report::PullRequestDigest(digest))
    }

    pub async fn clone_and_analyze(
        &mut self,
        url: &str,
        dest: &Path,
        log_limit: usize,
    ) -> Result<Report> {
        let overview = self
            .reconciler
            .clone_and_analyze(url, dest, log_limit)
            .await?;
        Ok(Report::Overview(overview))
    }

    pub fn export_report(
        &self,
        report: &Report,
        category: Option<NoteCategory>,
        title: Option<&str>,
    ) -> Result<PathBuf> {
        self.exporter.export(report, category, title)
    }
}
