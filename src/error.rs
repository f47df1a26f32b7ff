//! Error taxonomy for the repository intelligence pipeline.
//!
//! Every pipeline operation returns one of these kinds. Transient network
//! failures are retried inside the transport and only surface here after the
//! retry budget is exhausted; all other kinds propagate unchanged with enough
//! structured context to render a precise user-facing message via [`Error::hint`].
//!
//! Configuration and startup failures use `anyhow` instead; this enum covers
//! the operation surface only.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds surfaced by pipeline operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The given path is not an initialized git working copy.
    #[error("not a git repository: {path}")]
    NotAGitRepository { path: PathBuf },

    /// The hosting API returned a not-found status for the repository.
    /// Distinct from [`Error::HostingApi`] because it implies a user-facing
    /// hint: check the URL or your access rights.
    #[error("repository {owner}/{name} not found on {host}")]
    RepositoryNotFound {
        host: String,
        owner: String,
        name: String,
    },

    /// The rate budget is exhausted and the reset time has not passed.
    /// Raised before any network call is attempted.
    #[error("hosting API rate limit exceeded")]
    RateLimitExceeded { reset_at: Option<DateTime<Utc>> },

    /// Connection-level failure that persisted through all retry attempts.
    #[error("network failure after {attempts} attempts: {reason}")]
    TransientNetwork { attempts: u32, reason: String },

    /// The hosting API answered with a non-success status.
    #[error("hosting API error {status}: {body}")]
    HostingApi { status: u16, body: String },

    /// `git clone` failed or the destination already holds a working copy.
    #[error("clone failed: {reason}")]
    CloneFailed { reason: String },

    /// A note could not be written into the vault.
    #[error("cannot write note to {path}: {reason}")]
    ExportWrite { path: PathBuf, reason: String },

    /// A git invocation failed for a reason other than a missing repository
    /// (unknown branch, unreadable object, git not installed).
    #[error("git command failed: {reason}")]
    GitCommandFailed { reason: String },

    /// The repository URL or `owner/name` shorthand could not be parsed.
    #[error("invalid repository reference: {input}")]
    InvalidRepositoryRef { input: String },
}

impl Error {
    /// Actionable advice for the user, one line per error kind.
    pub fn hint(&self) -> String {
        match self {
            Error::NotAGitRepository { path } => format!(
                "'{}' is not an initialized repository; run `git init` or point at an existing checkout",
                path.display()
            ),
            Error::RepositoryNotFound { owner, name, .. } => format!(
                "repository '{}/{}' was not found; check the URL and your access rights",
                owner, name
            ),
            Error::RateLimitExceeded { reset_at } => match reset_at {
                Some(at) => format!(
                    "rate limit resets at {}; wait, or add an API credential for a higher quota",
                    at.to_rfc3339()
                ),
                None => "add or check an API credential to raise the rate limit".to_string(),
            },
            Error::TransientNetwork { .. } => {
                "check your network connection and retry".to_string()
            }
            Error::HostingApi { status, .. } => {
                format!("the hosting API returned status {}; retry later or check the request", status)
            }
            Error::CloneFailed { .. } => {
                "check the repository URL and that the destination path is empty".to_string()
            }
            Error::ExportWrite { path, .. } => format!(
                "check that the vault folder '{}' exists and is writable",
                path.display()
            ),
            Error::GitCommandFailed { .. } => {
                "check that git is installed and the branch or file exists".to_string()
            }
            Error::InvalidRepositoryRef { .. } => {
                "use an https://github.com/owner/name URL or an owner/name pair".to_string()
            }
        }
    }
}
