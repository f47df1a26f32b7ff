//! # Repo Scout CLI (`rscout`)
//!
//! Thin dispatch shell over the pipeline library: parse arguments, load the
//! TOML configuration, call one top-level operation, print the result. All
//! real behavior lives in the library crate.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rscout status <path>` | Working-copy branch and pending changes |
//! | `rscout log <path>` | Recent commits on a branch |
//! | `rscout history <path> <file>` | Commits touching one file |
//! | `rscout compare <path> <base> <head>` | Branch diff with issue/PR cross-references |
//! | `rscout issues <repo>` | Issue digest from the hosting API |
//! | `rscout prs <repo>` | Pull request digest from the hosting API |
//! | `rscout clone <url>` | Clone and produce a repository overview |
//!
//! Report-producing commands accept `--export` to persist the result as a
//! timestamped note in the configured vault. Set the `GITHUB_TOKEN`
//! environment variable (or the variable named in `hosting.token_env`) for
//! the higher authenticated rate quota.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use repo_scout::config::{self, Config};
use repo_scout::export::{render_markdown, NoteCategory};
use repo_scout::hosting::{RecordFilter, StateFilter};
use repo_scout::models::RepositoryRef;
use repo_scout::reconcile::Report;
use repo_scout::Pipeline;

/// Repo Scout: repository intelligence for git working copies, hosting
/// APIs, and knowledge vaults.
#[derive(Parser)]
#[command(
    name = "rscout",
    about = "Inspect local git state, query hosting APIs, and export vault notes",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when absent.
    #[arg(long, global = true, default_value = "./config/scout.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show working-copy status: current branch and pending changes.
    Status {
        /// Path to the working copy.
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show recent commits, most recent first.
    Log {
        /// Path to the working copy.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Branch to read. Defaults to HEAD.
        #[arg(long)]
        branch: Option<String>,

        /// Maximum number of commits.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show commits touching one file, following renames.
    History {
        /// Path to the working copy.
        path: PathBuf,

        /// File path relative to the repository root.
        file: String,
    },

    /// Compare two branches and cross-reference commit messages against
    /// issues and pull requests.
    Compare {
        /// Path to the working copy.
        path: PathBuf,

        /// Base branch.
        base: String,

        /// Head branch.
        head: String,

        /// Repository as `owner/name` or a URL. Defaults to the working
        /// copy's `origin` remote.
        #[arg(long)]
        repo: Option<String>,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// List issues from the hosting API.
    Issues {
        /// Repository as `owner/name` or a URL.
        repo: String,

        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// List pull requests from the hosting API.
    Prs {
        /// Repository as `owner/name` or a URL.
        repo: String,

        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Clone a repository and produce an overview report.
    Clone {
        /// Repository URL.
        url: String,

        /// Destination path. Defaults to `./<name>`.
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Number of recent commits to include.
        #[arg(long, default_value_t = 10)]
        limit: usize,

        #[command(flatten)]
        export: ExportArgs,
    },
}

/// Shared filter flags for issue and pull request listings.
#[derive(clap::Args)]
struct FilterArgs {
    /// Record state: open, closed, or all.
    #[arg(long, default_value = "open")]
    state: StateFilter,

    /// Required label; may be repeated.
    #[arg(long = "label")]
    labels: Vec<String>,

    /// Maximum number of records.
    #[arg(long)]
    limit: Option<usize>,
}

impl FilterArgs {
    fn into_filter(self) -> RecordFilter {
        RecordFilter {
            state: self.state,
            labels: self.labels.into_iter().collect(),
            limit: self.limit,
        }
    }
}

/// Shared export flags for report-producing commands.
#[derive(clap::Args)]
struct ExportArgs {
    /// Write the report as a note into the vault.
    #[arg(long)]
    export: bool,

    /// Vault category: git, branch, or digest. Defaults per report kind.
    #[arg(long)]
    category: Option<NoteCategory>,

    /// Note title. Defaults to the report's own title.
    #[arg(long)]
    title: Option<String>,
}

fn load(path: &PathBuf) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

/// Attach the per-kind hint to a pipeline error before surfacing it.
fn with_hint(err: repo_scout::Error) -> anyhow::Error {
    anyhow::anyhow!("{}\n  hint: {}", err, err.hint())
}

fn print_report(pipeline: &Pipeline, report: &Report, export: ExportArgs) -> Result<()> {
    println!("# {}\n", report.title());
    print!("{}", render_markdown(report));

    if export.export {
        let path = pipeline
            .export_report(report, export.category, export.title.as_deref())
            .map_err(with_hint)?;
        eprintln!("exported note: {}", path.display());
    }
    Ok(())
}

fn resolve_repo(pipeline: &Pipeline, path: &PathBuf, repo: Option<&str>) -> Result<RepositoryRef> {
    if let Some(repo) = repo {
        return RepositoryRef::parse(repo).map_err(with_hint);
    }
    pipeline
        .repo_from_remote(path)
        .map_err(with_hint)?
        .ok_or_else(|| {
            anyhow::anyhow!("no parseable 'origin' remote found; pass --repo owner/name")
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load(&cli.config)?;
    let mut pipeline = Pipeline::from_config(&cfg)?;

    match cli.command {
        Commands::Status { path } => {
            let status = pipeline.inspect_status(&path).map_err(with_hint)?;
            println!("On branch {}", status.branch);
            if status.is_clean() {
                println!("Working tree clean.");
            } else {
                println!("Changes:");
                for change in &status.changes {
                    println!("  {}", change);
                }
            }
        }
        Commands::Log {
            path,
            branch,
            limit,
        } => {
            let commits = pipeline
                .get_log(&path, branch.as_deref(), limit)
                .map_err(with_hint)?;
            for commit in &commits {
                println!(
                    "{} ({}) {}: {}",
                    commit.short_sha(),
                    commit.timestamp.format("%Y-%m-%d"),
                    commit.author,
                    commit.message
                );
            }
        }
        Commands::History { path, file } => {
            let commits = pipeline.file_history(&path, &file).map_err(with_hint)?;
            for commit in &commits {
                println!(
                    "{} ({}) {}: {}",
                    commit.short_sha(),
                    commit.timestamp.format("%Y-%m-%d"),
                    commit.author,
                    commit.message
                );
            }
        }
        Commands::Compare {
            path,
            base,
            head,
            repo,
            export,
        } => {
            let repo = resolve_repo(&pipeline, &path, repo.as_deref())?;
            let report = pipeline
                .compare_branches(&path, &repo, &base, &head)
                .await
                .map_err(with_hint)?;
            print_report(&pipeline, &report, export)?;
        }
        Commands::Issues {
            repo,
            filter,
            export,
        } => {
            let repo = RepositoryRef::parse(&repo).map_err(with_hint)?;
            let report = pipeline
                .list_issues(&repo, &filter.into_filter())
                .await
                .map_err(with_hint)?;
            print_report(&pipeline, &report, export)?;
        }
        Commands::Prs {
            repo,
            filter,
            export,
        } => {
            let repo = RepositoryRef::parse(&repo).map_err(with_hint)?;
            let report = pipeline
                .list_pull_requests(&repo, &filter.into_filter())
                .await
                .map_err(with_hint)?;
            print_report(&pipeline, &report, export)?;
        }
        Commands::Clone {
            url,
            dest,
            limit,
            export,
        } => {
            let dest = match dest {
                Some(dest) => dest,
                None => {
                    let repo = RepositoryRef::parse(&url).map_err(with_hint)?;
                    PathBuf::from(repo.name)
                }
            };
            let report = pipeline
                .clone_and_analyze(&url, &dest, limit)
                .await
                .map_err(with_hint)?;
            print_report(&pipeline, &report, export)?;
        }
    }

    Ok(())
}
