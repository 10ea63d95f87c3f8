// src/main.rs

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use serde_json::json;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use templedb::cancel::CancelToken;
use templedb::db::models::Branch;
use templedb::workspace::{CommitOutcome, CommitStrategy};
use templedb::{backup, blob, db, paths, query, workspace, Error};
use tracing::info;

#[derive(Parser)]
#[command(name = "templedb")]
#[command(author, version, about = "Database-native source control for multi-agent editing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the templedb store
    Init,
    /// Project registry and the checkout / commit loop
    #[command(subcommand)]
    Project(ProjectCommands),
    /// Version-control queries
    #[command(subcommand)]
    Vcs(VcsCommands),
    /// Checkout bookkeeping
    #[command(subcommand)]
    Checkouts(CheckoutCommands),
    /// Copy the store to a backup file
    Backup {
        /// Destination path (default: timestamped file in the backups directory)
        path: Option<PathBuf>,
    },
    /// Replace the store from a backup file
    Restore {
        /// Backup file to restore from
        path: PathBuf,
    },
    /// Delete content blobs nothing references any more
    Gc,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Scan a directory tree into the store as a new project
    Import {
        /// Directory to import
        path: PathBuf,
        /// Project slug (default: derived from the directory name)
        #[arg(long)]
        slug: Option<String>,
    },
    /// List projects
    List,
    /// Materialize a project's default branch head into a directory
    Checkout {
        /// Project slug
        project: String,
        /// Target directory
        dir: PathBuf,
        /// Overwrite the target directory if it exists
        #[arg(long)]
        force: bool,
    },
    /// Rescan a checkout directory and commit its changes
    Commit {
        /// Project slug
        project: String,
        /// Checkout directory
        dir: PathBuf,
        /// Commit message
        #[arg(short, long)]
        message: String,
        /// Conflict strategy: abort or force
        #[arg(long, default_value = "abort")]
        strategy: String,
        /// Shorthand for --strategy force
        #[arg(long)]
        force: bool,
        /// Restrict the commit to these paths (repeatable)
        #[arg(long = "path")]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum VcsCommands {
    /// Show commit history
    Log {
        /// Project slug
        project: String,
        /// Maximum number of commits
        #[arg(short = 'n', long)]
        limit: Option<i64>,
        /// Branch to follow (default: whole project)
        #[arg(long)]
        branch: Option<String>,
    },
    /// Show working-state status
    Status {
        /// Project slug
        project: String,
        /// Branch (default: the default branch)
        #[arg(long)]
        branch: Option<String>,
    },
    /// List branches, or create one
    Branch {
        /// Project slug
        project: String,
        /// Branch name to create (lists branches if omitted)
        name: Option<String>,
    },
    /// Show a commit by hash prefix
    Show {
        /// Project slug
        project: String,
        /// Commit hash or unique prefix
        hash_prefix: String,
    },
}

#[derive(Subcommand)]
enum CheckoutCommands {
    /// List (and with --force remove) checkouts whose directory is gone
    Cleanup {
        /// Actually remove the stale rows
        #[arg(long)]
        force: bool,
    },
}

/// Human one-liner plus the machine-readable reason on stderr.
fn report_failure(err: &Error) {
    eprintln!("error: {}", err);

    let reason = match err {
        Error::CommitConflict(paths) => json!({
            "error": "commit_conflict",
            "message": err.to_string(),
            "conflicts": paths,
        }),
        Error::AmbiguousHash(prefix) => json!({
            "error": "ambiguous_hash",
            "message": err.to_string(),
            "prefix": prefix,
        }),
        _ => json!({
            "error": error_kind(err),
            "message": err.to_string(),
        }),
    };
    eprintln!("{}", reason);
}

fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::NotFound(_) => "not_found",
        Error::AlreadyExists(_) => "already_exists",
        Error::IntegrityViolation(_) => "integrity_violation",
        Error::VersionConflict { .. } => "version_conflict",
        Error::CommitConflict(_) => "commit_conflict",
        Error::AmbiguousHash(_) => "ambiguous_hash",
        Error::PathExists(_) => "path_exists",
        Error::DatabaseLocked => "database_locked",
        Error::DatabaseNotFound(_) => "database_not_found",
        Error::InitError(_) => "init_error",
        Error::Corruption(_) => "corruption",
        Error::Cancelled => "cancelled",
        Error::UsageError(_) => "usage_error",
        Error::Io(_) => "io_error",
        Error::Database(_) => "database_error",
    }
}

fn fail(err: Error) -> u8 {
    report_failure(&err);
    err.exit_code() as u8
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("TEMPLEDB_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_to_file = std::env::var("TEMPLEDB_LOG_FILE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if log_to_file {
        let _ = std::fs::create_dir_all(paths::data_dir());
        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(paths::data_dir().join("templedb.log"))
        {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file)
                .with_ansi(false)
                .init();
            return;
        }
    }

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: Cli) -> u8 {
    match cli.command {
        Commands::Init => match db::open_default() {
            Ok(conn) => {
                drop(conn);
                println!(
                    "Store initialized at: {}",
                    paths::database_path().display()
                );
                0
            }
            Err(e) => fail(e),
        },

        Commands::Project(ProjectCommands::Import { path, slug }) => {
            if !path.is_dir() {
                let err = Error::UsageError(format!("not a directory: {}", path.display()));
                report_failure(&err);
                return 3;
            }

            let result = db::open_default().and_then(|conn| {
                db::with_retry(|| {
                    workspace::import(&conn, &path, slug.as_deref(), &CancelToken::new())
                })
            });

            match result {
                Ok(summary) => {
                    println!(
                        "Imported project '{}' ({} files)",
                        summary.slug, summary.files
                    );
                    if let Some(hash) = &summary.commit_hash {
                        println!("  Initial commit: {}", &hash[..12.min(hash.len())]);
                    }
                    0
                }
                Err(e) => fail(e),
            }
        }

        Commands::Project(ProjectCommands::List) => {
            let result = db::open_default().and_then(|conn| query::list_projects(&conn));
            match result {
                Ok(projects) => {
                    if projects.is_empty() {
                        println!("No projects.");
                    } else {
                        println!("Projects:");
                        for p in &projects {
                            println!(
                                "  {} ({} files, {} commits, {} branches)",
                                p.slug, p.file_count, p.commit_count, p.branch_count
                            );
                        }
                        println!("\nTotal: {} project(s)", projects.len());
                    }
                    0
                }
                Err(e) => fail(e),
            }
        }

        Commands::Project(ProjectCommands::Checkout {
            project,
            dir,
            force,
        }) => {
            let result = db::open_default()
                .and_then(|conn| workspace::checkout(&conn, &project, &dir, force, &CancelToken::new()));

            match result {
                Ok(summary) => {
                    println!(
                        "Checked out '{}' ({} files, branch '{}') to {}",
                        project,
                        summary.files,
                        summary.branch,
                        dir.display()
                    );
                    0
                }
                Err(e @ Error::PathExists(_)) => {
                    report_failure(&e);
                    4
                }
                Err(e @ Error::NotFound(_)) => {
                    report_failure(&e);
                    5
                }
                Err(e) => fail(e),
            }
        }

        Commands::Project(ProjectCommands::Commit {
            project,
            dir,
            message,
            strategy,
            force,
            paths,
        }) => {
            let strategy = if force {
                CommitStrategy::Force
            } else {
                match strategy.parse::<CommitStrategy>() {
                    Ok(s) => s,
                    Err(msg) => {
                        report_failure(&Error::UsageError(msg));
                        return 2;
                    }
                }
            };
            let filter = if paths.is_empty() {
                None
            } else {
                Some(paths.as_slice())
            };

            let result = db::open_default().and_then(|conn| {
                db::with_retry(|| {
                    workspace::commit(
                        &conn,
                        &project,
                        &dir,
                        &message,
                        strategy,
                        filter,
                        &CancelToken::new(),
                    )
                })
            });

            match result {
                Ok(CommitOutcome::Committed(commit)) => {
                    println!(
                        "Committed {} on '{}' ({} files, +{} -{})",
                        &commit.commit_hash[..12],
                        project,
                        commit.files_changed,
                        commit.lines_added,
                        commit.lines_removed
                    );
                    0
                }
                Ok(CommitOutcome::NothingToCommit) => {
                    println!("Nothing to commit for '{}'", project);
                    7
                }
                Err(e @ Error::CommitConflict(_)) => {
                    report_failure(&e);
                    6
                }
                Err(e @ Error::NotFound(_)) => {
                    report_failure(&e);
                    5
                }
                Err(e) => fail(e),
            }
        }

        Commands::Vcs(VcsCommands::Log {
            project,
            limit,
            branch,
        }) => {
            let result = db::open_default()
                .and_then(|conn| query::log(&conn, &project, branch.as_deref(), limit));
            match result {
                Ok(commits) => {
                    if commits.is_empty() {
                        println!("No commits.");
                    } else {
                        for c in &commits {
                            println!(
                                "{} {} {} ({} files, +{} -{})",
                                &c.commit_hash[..12.min(c.commit_hash.len())],
                                c.committed_at,
                                c.author,
                                c.files_changed,
                                c.lines_added,
                                c.lines_removed
                            );
                            println!("    {}", c.message);
                        }
                    }
                    0
                }
                Err(e) => fail(e),
            }
        }

        Commands::Vcs(VcsCommands::Status { project, branch }) => {
            let result = db::open_default()
                .and_then(|conn| query::status(&conn, &project, branch.as_deref()));
            match result {
                Ok(entries) => {
                    if entries.is_empty() {
                        println!("Working tree clean for '{}'", project);
                    } else {
                        for entry in &entries {
                            match entry {
                                query::StatusEntry::Modified { path, staged } => {
                                    println!("  modified{}: {}", staged_tag(*staged), path)
                                }
                                query::StatusEntry::Added { path, staged } => {
                                    println!("  added{}: {}", staged_tag(*staged), path)
                                }
                                query::StatusEntry::Deleted { path, staged } => {
                                    println!("  deleted{}: {}", staged_tag(*staged), path)
                                }
                                query::StatusEntry::Conflicted {
                                    path,
                                    conflict_type,
                                } => println!("  conflict ({}): {}", conflict_type, path),
                            }
                        }
                    }
                    0
                }
                Err(e) => fail(e),
            }
        }

        Commands::Vcs(VcsCommands::Branch { project, name }) => {
            let result = db::open_default().and_then(|conn| match name {
                Some(name) => {
                    let row = templedb::db::models::Project::get_by_slug(&conn, &project)?;
                    let branch =
                        Branch::get_or_create(&conn, row.id.unwrap(), &name, None)?;
                    Ok(vec![branch])
                }
                None => query::list_branches(&conn, &project),
            });

            match result {
                Ok(branches) => {
                    for b in &branches {
                        let default_mark = if b.is_default { "*" } else { " " };
                        let head = b
                            .head_commit_id
                            .map(|id| format!("head commit id {}", id))
                            .unwrap_or_else(|| "no commits".to_string());
                        println!("{} {} ({})", default_mark, b.name, head);
                    }
                    0
                }
                Err(e) => fail(e),
            }
        }

        Commands::Vcs(VcsCommands::Show {
            project,
            hash_prefix,
        }) => {
            let result =
                db::open_default().and_then(|conn| query::show_commit(&conn, &project, &hash_prefix));
            match result {
                Ok(detail) => {
                    let c = &detail.commit;
                    println!("commit {}", c.commit_hash);
                    println!("Author: {} <{}>", c.author, c.author_email);
                    println!("Date:   {}", c.committed_at);
                    println!("\n    {}\n", c.message);
                    for (path, state) in &detail.files {
                        println!("  {} {}", state.change_type.as_str(), path);
                    }
                    0
                }
                Err(e @ Error::AmbiguousHash(_)) => {
                    report_failure(&e);
                    8
                }
                Err(e @ Error::NotFound(_)) => {
                    report_failure(&e);
                    9
                }
                Err(e) => fail(e),
            }
        }

        Commands::Checkouts(CheckoutCommands::Cleanup { force }) => {
            let result =
                db::open_default().and_then(|conn| workspace::cleanup_stale(&conn, force));
            match result {
                Ok(stale) => {
                    if stale.is_empty() {
                        println!("No stale checkouts.");
                    } else {
                        for checkout in &stale {
                            println!("  stale: {}", checkout.checkout_path);
                        }
                        if force {
                            println!("Removed {} stale checkout(s)", stale.len());
                        } else {
                            println!(
                                "{} stale checkout(s); rerun with --force to remove",
                                stale.len()
                            );
                        }
                    }
                    0
                }
                Err(e) => fail(e),
            }
        }

        Commands::Backup { path } => {
            let result =
                db::open_default().and_then(|conn| backup::backup(&conn, path.as_deref()));
            match result {
                Ok(dest) => {
                    println!("Backup written to {}", dest.display());
                    0
                }
                Err(e) => fail(e),
            }
        }

        Commands::Restore { path } => match backup::restore(&path) {
            Ok(db_path) => {
                println!("Store restored to {}", db_path.display());
                0
            }
            Err(e) => fail(e),
        },

        Commands::Gc => {
            let result = db::open_default().and_then(|conn| blob::collect_garbage(&conn));
            match result {
                Ok(removed) => {
                    println!("Removed {} unreferenced blob(s)", removed);
                    0
                }
                Err(e) => fail(e),
            }
        }

        Commands::Completions { shell } => {
            info!("Generating shell completions for {:?}", shell);
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "templedb", &mut io::stdout());
            0
        }
    }
}

fn staged_tag(staged: bool) -> &'static str {
    if staged {
        " (staged)"
    } else {
        ""
    }
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    ExitCode::from(run(cli))
}
