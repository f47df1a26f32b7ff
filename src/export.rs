//! Render reports into vault notes.
//!
//! A note is frontmatter plus markdown body, written once into a category
//! folder under the vault root at a deterministic, collision-free path:
//! `<folder>/<YYYY-MM-DD-HHMMSS>-<slug>.md`. Body sections always render in
//! the same order (summary, detail list, cross-references), so two exports of
//! equivalent data differ only in the timestamp-derived fields, which makes
//! notes diffable over time. Writes go through a temporary file in the target
//! folder and are renamed into place; a failed export leaves nothing behind.

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::info;

use crate::config::VaultConfig;
use crate::error::{Error, Result};
use crate::models::CommitInfo;
use crate::reconcile::{Report, ReportKind};

/// Vault category folders. The vault root and these three folders are the
/// exporter's whole view of the filesystem; it creates note files, never
/// deletes or modifies anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteCategory {
    GitAnalysis,
    BranchAnalysis,
    HostingDigest,
}

impl NoteCategory {
    /// Default category for a report kind.
    pub fn for_kind(kind: ReportKind) -> Self {
        match kind {
            ReportKind::Overview => NoteCategory::GitAnalysis,
            ReportKind::BranchComparison => NoteCategory::BranchAnalysis,
            ReportKind::IssueDigest | ReportKind::PullRequestDigest => {
                NoteCategory::HostingDigest
            }
        }
    }

    fn folder<'a>(&self, vault: &'a VaultConfig) -> &'a str {
        match self {
            NoteCategory::GitAnalysis => &vault.git_folder,
            NoteCategory::BranchAnalysis => &vault.branch_folder,
            NoteCategory::HostingDigest => &vault.digest_folder,
        }
    }
}

impl std::str::FromStr for NoteCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "git" => Ok(NoteCategory::GitAnalysis),
            "branch" => Ok(NoteCategory::BranchAnalysis),
            "digest" => Ok(NoteCategory::HostingDigest),
            other => Err(format!(
                "unknown category '{}': must be git, branch, or digest",
                other
            )),
        }
    }
}

/// A rendered note ready to be written. Written once, never edited in place.
#[derive(Debug, Clone)]
pub struct ReportNote {
    pub title: String,
    pub body: String,
    /// Ordered key/value frontmatter; rendering preserves this order.
    pub frontmatter: Vec<(String, String)>,
    pub folder: PathBuf,
}

impl ReportNote {
    /// Full note content: frontmatter block, title heading, body.
    pub fn render(&self) -> String {
        let mut out = String::from("---\n");
        for (key, value) in &self.frontmatter {
            let _ = writeln!(out, "{}: {}", key, value);
        }
        out.push_str("---\n\n");
        let _ = writeln!(out, "# {}\n", self.title);
        out.push_str(&self.body);
        out
    }
}

/// Turns reports into notes and persists them into the vault.
pub struct NoteExporter {
    vault: VaultConfig,
}

impl NoteExporter {
    pub fn new(vault: VaultConfig) -> Self {
        Self { vault }
    }

    /// Export a report as a new timestamped note; returns the written path.
    ///
    /// `category` defaults per report kind; `title` defaults to the report's
    /// own title. Each export creates a new note, preserving history.
    pub fn export(
        &self,
        report: &Report,
        category: Option<NoteCategory>,
        title: Option<&str>,
    ) -> Result<PathBuf> {
        let generated = Utc::now();
        let note = self.build_note(report, category, title, generated);
        let path = self.write_note(&note, generated)?;
        info!(path = %path.display(), "exported note");
        Ok(path)
    }

    /// Pure note construction; deterministic for a fixed `generated` instant.
    pub fn build_note(
        &self,
        report: &Report,
        category: Option<NoteCategory>,
        title: Option<&str>,
        generated: DateTime<Utc>,
    ) -> ReportNote {
        let category = category.unwrap_or_else(|| NoteCategory::for_kind(report.kind()));
        let title = title.map(str::to_string).unwrap_or_else(|| report.title());
        let repo = report.repo();

        let frontmatter = vec![
            (
                "generated".to_string(),
                generated.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("repository".to_string(), repo.slug()),
            (
                "tags".to_string(),
                format!("[{}, repo:{}]", report.kind().tag(), repo.slug()),
            ),
        ];

        ReportNote {
            title,
            body: render_markdown(report),
            frontmatter,
            folder: self.vault.root.join(category.folder(&self.vault)),
        }
    }

    fn write_note(&self, note: &ReportNote, generated: DateTime<Utc>) -> Result<PathBuf> {
        if !self.vault.root.is_dir() {
            return Err(Error::ExportWrite {
                path: self.vault.root.clone(),
                reason: "vault root does not exist".to_string(),
            });
        }

        std::fs::create_dir_all(&note.folder).map_err(|e| Error::ExportWrite {
            path: note.folder.clone(),
            reason: e.to_string(),
        })?;

        let filename = format!(
            "{}-{}.md",
            generated.format("%Y-%m-%d-%H%M%S"),
            sanitize_title(&note.title)
        );
        let final_path = note.folder.join(&filename);
        let tmp_path = note.folder.join(format!(".{}.tmp", filename));

        std::fs::write(&tmp_path, note.render()).map_err(|e| Error::ExportWrite {
            path: tmp_path.clone(),
            reason: e.to_string(),
        })?;

        if let Err(e) = std::fs::rename(&tmp_path, &final_path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(Error::ExportWrite {
                path: final_path,
                reason: e.to_string(),
            });
        }

        Ok(final_path)
    }
}

/// Strip filesystem-unsafe characters and collapse whitespace runs to single
/// dashes. Never returns an empty slug.
pub fn sanitize_title(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else if ch.is_whitespace() || ch == '-' {
            pending_dash = true;
        }
        // Everything else is stripped.
    }

    if slug.is_empty() {
        slug.push_str("note");
    }
    slug
}

/// Render report fields into markdown sections with stable heading order:
/// summary, then detail list, then cross-references. Also used directly for
/// terminal output, so exported notes and printed reports stay identical.
pub fn render_markdown(report: &Report) -> String {
    let mut out = String::new();

    match report {
        Report::Overview(r) => {
            out.push_str("## Summary\n\n");
            let _ = writeln!(out, "Repository: [{}]({})", r.repo.slug(), r.repo.web_url());
            match &r.metadata {
                Some(m) => {
                    if let Some(description) = &m.description {
                        let _ = writeln!(out, "\n> {}", description);
                    }
                    let _ = writeln!(
                        out,
                        "\nDefault branch `{}` | {} stars | {} forks | {} open issues",
                        m.default_branch, m.stars, m.forks, m.open_issues
                    );
                }
                None => out.push_str("\nRemote metadata unavailable.\n"),
            }
            let _ = writeln!(
                out,
                "\nWorking copy on `{}` with {} local change(s).",
                r.status.branch,
                r.status.changes.len()
            );

            out.push_str("\n## Recent commits\n\n");
            render_commit_list(&mut out, &r.recent);
        }
        Report::BranchComparison(r) => {
            out.push_str("## Summary\n\n");
            let _ = writeln!(
                out,
                "`{}` is {} commit(s) ahead and {} behind `{}`.",
                r.diff.head.name,
                r.diff.ahead(),
                r.diff.behind(),
                r.diff.base.name
            );

            let _ = write!(out, "\n## Commits only on `{}`\n\n", r.diff.head.name);
            render_commit_list(&mut out, &r.diff.head.commits);
            let _ = write!(out, "\n## Commits only on `{}`\n\n", r.diff.base.name);
            render_commit_list(&mut out, &r.diff.base.commits);

            out.push_str("\n## Cross-references\n\n");
            if r.cross_refs.is_empty() {
                out.push_str("No issue or pull request references found.\n");
            }
            for cross_ref in &r.cross_refs {
                match &cross_ref.resolved {
                    Some(record) => {
                        let _ = writeln!(
                            out,
                            "- [#{}]({}) {} ({}, {}), referenced by `{}`",
                            record.number,
                            record.html_url,
                            record.title,
                            record.kind,
                            record.state,
                            &cross_ref.commit_sha[..cross_ref.commit_sha.len().min(8)]
                        );
                    }
                    None => {
                        let _ = writeln!(
                            out,
                            "- unresolved reference: #{}, referenced by `{}`",
                            cross_ref.number,
                            &cross_ref.commit_sha[..cross_ref.commit_sha.len().min(8)]
                        );
                    }
                }
            }
        }
        Report::IssueDigest(r) => {
            out.push_str("## Summary\n\n");
            let _ = writeln!(out, "{} issue(s) matching {}.", r.issues.len(), r.filter);

            out.push_str("\n## Issues\n\n");
            if r.issues.is_empty() {
                out.push_str("No issues found.\n");
            }
            for issue in &r.issues {
                let labels: Vec<&str> = issue.labels.iter().map(String::as_str).collect();
                let _ = writeln!(
                    out,
                    "- [#{}]({}) {} ({}) by {}{}",
                    issue.number,
                    issue.html_url,
                    issue.title,
                    issue.state,
                    issue.author,
                    if labels.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", labels.join(", "))
                    }
                );
            }
        }
        Report::PullRequestDigest(r) => {
            out.push_str("## Summary\n\n");
            let _ = writeln!(out, "{} pull request(s) matching {}.", r.pulls.len(), r.filter);

            out.push_str("\n## Pull requests\n\n");
            if r.pulls.is_empty() {
                out.push_str("No pull requests found.\n");
            }
            for pull in &r.pulls {
                let _ = writeln!(
                    out,
                    "- [#{}]({}) {} ({}) {} -> {}{}",
                    pull.number,
                    pull.html_url,
                    pull.title,
                    pull.state,
                    pull.head_ref,
                    pull.base_ref,
                    if pull.draft { " [draft]" } else { "" }
                );
            }
        }
    }

    out
}

fn render_commit_list(out: &mut String, commits: &[CommitInfo]) {
    if commits.is_empty() {
        out.push_str("None.\n");
        return;
    }
    for commit in commits {
        let _ = writeln!(
            out,
            "- `{}` ({}) {}: {}",
            commit.short_sha(),
            commit.timestamp.format("%Y-%m-%d"),
            commit.author,
            commit.message
        );
    }
}
