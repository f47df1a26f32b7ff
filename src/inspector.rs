//! Read-only queries against a local git working copy.
//!
//! The inspector never commits, stages, or checks out; every operation is a
//! read of existing state. Git itself sits behind the [`GitEngine`] capability
//! trait ("can produce output for a git invocation at a path") with
//! [`SystemGit`] as the installed-engine implementation, so tests can
//! substitute an engine that returns canned history.

use std::path::Path;
use std::process::Command;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{BranchDiff, BranchState, CommitInfo, RepoStatus};

/// Log format: SHA, author, strict ISO timestamp, parents, subject.
/// Fields are separated by the unit separator and records by the record
/// separator, so free-text subjects cannot break parsing.
const LOG_FORMAT: &str = "%H%x1f%an%x1f%aI%x1f%P%x1f%s%x1e";

/// Capability seam to the version-control engine.
pub trait GitEngine: Send + Sync {
    /// Run one git invocation in `workdir` and return its stdout.
    fn run(&self, workdir: &Path, args: &[&str]) -> Result<String>;
}

/// Engine backed by the installed `git` binary.
pub struct SystemGit;

impl GitEngine for SystemGit {
    fn run(&self, workdir: &Path, args: &[&str]) -> Result<String> {
        debug!(workdir = %workdir.display(), ?args, "running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(workdir)
            .output()
            .map_err(|e| Error::GitCommandFailed {
                reason: format!("failed to execute git: {}. Is git installed?", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::GitCommandFailed {
                reason: format!(
                    "git {} failed: {}",
                    args.first().unwrap_or(&""),
                    stderr.trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Read-only view over local working copies.
pub struct LocalRepositoryInspector<E: GitEngine = SystemGit> {
    engine: E,
}

impl LocalRepositoryInspector<SystemGit> {
    /// Inspector backed by the installed git binary.
    pub fn system() -> Self {
        Self { engine: SystemGit }
    }
}

impl<E: GitEngine> LocalRepositoryInspector<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Verify `path` references an initialized working copy.
    fn ensure_repository(&self, path: &Path) -> Result<()> {
        self.engine
            .run(path, &["rev-parse", "--git-dir"])
            .map_err(|_| Error::NotAGitRepository {
                path: path.to_path_buf(),
            })?;
        Ok(())
    }

    /// Current branch plus porcelain change lines.
    pub fn status(&self, path: &Path) -> Result<RepoStatus> {
        self.ensure_repository(path)?;

        let branch = self
            .engine
            .run(path, &["rev-parse", "--abbrev-ref", "HEAD"])?
            .trim()
            .to_string();

        let porcelain = self.engine.run(path, &["status", "--porcelain"])?;
        let changes = porcelain
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.to_string())
            .collect();

        Ok(RepoStatus { branch, changes })
    }

    /// Recent commits on a branch (HEAD when `branch` is `None`), most
    /// recent first.
    pub fn log(&self, path: &Path, branch: Option<&str>, limit: usize) -> Result<Vec<CommitInfo>> {
        self.ensure_repository(path)?;

        let limit_arg = limit.to_string();
        let format_arg = format!("--pretty=format:{}", LOG_FORMAT);
        let mut args = vec!["log", "-n", &limit_arg, &format_arg];
        if let Some(branch) = branch {
            args.push(branch);
        }

        let raw = self.engine.run(path, &args)?;
        parse_log(&raw)
    }

    /// Compare two branches: commits in head not reachable from base (ahead)
    /// and vice versa (behind), using the engine's merge-base semantics via
    /// range selection.
    pub fn diff_branches(&self, path: &Path, base: &str, head: &str) -> Result<BranchDiff> {
        self.ensure_repository(path)?;

        let base_sha = self.engine.run(path, &["rev-parse", base])?.trim().to_string();
        let head_sha = self.engine.run(path, &["rev-parse", head])?.trim().to_string();

        let ahead_commits = self.range_log(path, base, head)?;
        let behind_commits = self.range_log(path, head, base)?;
        let (ahead, behind) = (ahead_commits.len(), behind_commits.len());

        Ok(BranchDiff {
            base: BranchState {
                name: base.to_string(),
                head: base_sha,
                ahead: behind,
                behind: ahead,
                commits: behind_commits,
            },
            head: BranchState {
                name: head.to_string(),
                head: head_sha,
                ahead,
                behind,
                commits: ahead_commits,
            },
        })
    }

    /// Commits touching one file, following renames, most recent first.
    pub fn file_history(&self, path: &Path, file: &str) -> Result<Vec<CommitInfo>> {
        self.ensure_repository(path)?;

        let format_arg = format!("--pretty=format:{}", LOG_FORMAT);
        let raw = self
            .engine
            .run(path, &["log", "--follow", &format_arg, "--", file])?;
        parse_log(&raw)
    }

    /// URL of the `origin` remote, if one is configured.
    pub fn remote_url(&self, path: &Path) -> Result<Option<String>> {
        self.ensure_repository(path)?;

        match self.engine.run(path, &["remote", "get-url", "origin"]) {
            Ok(url) => {
                let url = url.trim().to_string();
                Ok((!url.is_empty()).then_some(url))
            }
            Err(_) => Ok(None),
        }
    }

    fn range_log(&self, path: &Path, exclude: &str, include: &str) -> Result<Vec<CommitInfo>> {
        let format_arg = format!("--pretty=format:{}", LOG_FORMAT);
        let range = format!("{}..{}", exclude, include);
        let raw = self.engine.run(path, &["log", &format_arg, &range])?;
        parse_log(&raw)
    }
}

/// Parse `LOG_FORMAT` output into commits.
fn parse_log(raw: &str) -> Result<Vec<CommitInfo>> {
    let mut commits = Vec::new();

    for record in raw.split('\x1e') {
        let record = record.trim_matches(|c: char| c == '\n' || c == '\r');
        if record.is_empty() {
            continue;
        }

        let fields: Vec<&str> = record.split('\x1f').collect();
        if fields.len() != 5 {
            return Err(Error::GitCommandFailed {
                reason: format!("malformed log record: {:?}", record),
            });
        }

        let timestamp = DateTime::parse_from_rfc3339(fields[2])
            .map_err(|e| Error::GitCommandFailed {
                reason: format!("unparseable commit timestamp '{}': {}", fields[2], e),
            })?
            .with_timezone(&Utc);

        commits.push(CommitInfo {
            sha: fields[0].to_string(),
            author: fields[1].to_string(),
            timestamp,
            message: fields[4].to_string(),
            parents: fields[3].split_whitespace().map(str::to_string).collect(),
        });
    }

    Ok(commits)
}
