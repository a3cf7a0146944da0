//! # FactGap CLI (`factgap`)
//!
//! The `factgap` binary indexes a repository, its pull requests and
//! exported Notion pages into a local SQLite vector store, and answers
//! questions over them with citations.
//!
//! ## Usage
//!
//! ```bash
//! factgap --config ./config/factgap.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `factgap init` | Create the SQLite database and schema |
//! | `factgap discover` | Show which files of a checkout would be indexed |
//! | `factgap index repo` | Index a checkout's code and docs |
//! | `factgap index diff <file>` | Index a PR diff and its changed files |
//! | `factgap index page <file>` | Index an exported Notion page |
//! | `factgap classify "<query>"` | Show the routed intent for a query |
//! | `factgap ask "<question>"` | Answer a question with citations |
//! | `factgap analyze` | Review a PR against its evidence |
//! | `factgap eval "<query>"` | Print the retrieval report for a query |
//! | `factgap purge` | Delete indexed chunks by scope |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use factgap::ask::{self, QueryScope};
use factgap::{config, ingest, migrate};
use factgap_core::index::NotionPage;
use factgap_core::SourceType;

/// FactGap: retrieval-augmented answers over code, PR diffs, repository
/// docs and Notion pages.
///
/// All commands except `classify` read a TOML configuration file given
/// with `--config`. See `config/factgap.example.toml`.
#[derive(Parser)]
#[command(
    name = "factgap",
    about = "FactGap: cited answers over code, PR diffs, repo docs and Notion pages",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/factgap.toml")]
    config: PathBuf,

    /// Debug-level logging (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `rag_chunks` table.
    /// Running it again is safe.
    Init,

    /// List discovery results for a checkout without indexing.
    Discover {
        /// Repository root.
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Print every included path.
        #[arg(long)]
        list: bool,
    },

    /// Index content into the vector store.
    Index {
        #[command(subcommand)]
        target: IndexCommand,
    },

    /// Classify a query's intent and show its scope weights.
    Classify {
        query: String,

        #[arg(long)]
        json: bool,
    },

    /// Answer a question from indexed evidence.
    Ask {
        question: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Print the answer and retrieval report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Analyze a pull request against its diff and the repository context.
    Analyze {
        #[command(flatten)]
        scope: ScopeArgs,

        /// PR title.
        #[arg(long)]
        title: String,

        /// PR description.
        #[arg(long, default_value = "")]
        body: String,
    },

    /// Run retrieval and rerank for a query and print the report.
    Eval {
        query: String,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Delete indexed chunks for the configured user.
    Purge {
        #[arg(long)]
        repo: Option<String>,

        /// `code`, `diff`, `repo_doc` or `notion`.
        #[arg(long, value_parser = parse_source_type)]
        source_type: Option<SourceType>,

        /// Notion page id.
        #[arg(long)]
        source_id: Option<String>,
    },
}

#[derive(Subcommand)]
enum IndexCommand {
    /// Index a repository checkout.
    Repo {
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Repository name (defaults to `scope.repo`).
        #[arg(long)]
        repo: Option<String>,
    },

    /// Index a pull request's unified diff.
    ///
    /// Changed files named in the diff are indexed at the PR head when
    /// `--root` points at a checkout of it.
    Diff {
        /// Path to the diff file.
        diff: PathBuf,

        #[arg(long)]
        repo: Option<String>,

        #[arg(long)]
        pr: u64,

        /// PR head commit SHA.
        #[arg(long)]
        sha: String,

        /// Checkout of the PR head.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Index an exported Notion page.
    Page {
        /// Path to the page's plain text or markdown.
        file: PathBuf,

        #[arg(long)]
        page_id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        url: Option<String>,

        /// ISO-8601 timestamp of the last edit.
        #[arg(long)]
        last_edited: Option<String>,
    },
}

/// Repo and PR coordinates for query commands.
#[derive(clap::Args)]
struct ScopeArgs {
    /// Repository (defaults to `scope.repo`).
    #[arg(long)]
    repo: Option<String>,

    /// Pull request number; adds the PR's diff scope.
    #[arg(long)]
    pr: Option<u64>,

    /// PR head commit SHA.
    #[arg(long)]
    sha: Option<String>,
}

impl From<ScopeArgs> for QueryScope {
    fn from(args: ScopeArgs) -> Self {
        QueryScope {
            repo: args.repo,
            pr_number: args.pr,
            head_sha: args.sha,
        }
    }
}

fn parse_source_type(s: &str) -> Result<SourceType, String> {
    s.parse::<SourceType>().map_err(|e| e.to_string())
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "factgap=debug,factgap_core=debug"
    } else {
        "factgap=info,factgap_core=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't require config
    if let Commands::Classify { query, json } = &cli.command {
        return ask::run_classify(query, *json);
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Discover { root, list } => {
            ask::run_discover(&cfg, &root, list)?;
        }
        Commands::Index { target } => match target {
            IndexCommand::Repo { root, repo } => {
                ingest::run_index_repo(&cfg, &root, repo.as_deref()).await?;
            }
            IndexCommand::Diff {
                diff,
                repo,
                pr,
                sha,
                root,
            } => {
                ingest::run_index_diff(&cfg, &diff, repo.as_deref(), pr, &sha, root.as_deref())
                    .await?;
            }
            IndexCommand::Page {
                file,
                page_id,
                title,
                url,
                last_edited,
            } => {
                let page = NotionPage {
                    page_id,
                    title,
                    url,
                    last_edited_time: last_edited,
                    content: String::new(),
                };
                ingest::run_index_page(&cfg, &file, page).await?;
            }
        },
        Commands::Ask {
            question,
            scope,
            json,
        } => {
            ask::run_ask(&cfg, &question, &scope.into(), json).await?;
        }
        Commands::Analyze { scope, title, body } => {
            ask::run_analyze(&cfg, &scope.into(), &title, &body).await?;
        }
        Commands::Eval { query, scope } => {
            ask::run_eval(&cfg, &query, &scope.into()).await?;
        }
        Commands::Purge {
            repo,
            source_type,
            source_id,
        } => {
            ask::run_purge(&cfg, repo, source_type, source_id).await?;
        }
        Commands::Classify { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
