//! Indexing commands.
//!
//! Wires the configured store and embedding provider into
//! [`factgap_core::index::Indexer`] for three kinds of input:
//!
//! - **repo**: a checkout, narrowed by [`crate::discovery`]
//! - **diff**: a PR's unified diff, plus the changed files it names
//! - **page**: one exported Notion page
//!
//! Per-file failures are counted and logged; they never abort a run.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use factgap_core::embedding::Embedder;
use factgap_core::index::{split_diff_by_file, ChangedFile, IndexStats, IndexTarget, Indexer, NotionPage};
use factgap_core::store::VectorStore;

use crate::config::Config;
use crate::db;
use crate::discovery::{self, DiscoveryStats, IgnoreMatcher};
use crate::embedding::create_embedder;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepoIndexReport {
    pub discovery: DiscoveryStats,
    pub files_indexed: usize,
    pub files_failed: usize,
    pub chunks: IndexStats,
}

/// Index every discovered file under `root` into `target`.
///
/// The run's chunk cap is `discovery.max_chunks`.
pub async fn index_repo_files<S: VectorStore + ?Sized>(
    store: &S,
    embedder: &dyn Embedder,
    config: &Config,
    root: &Path,
    target: &IndexTarget,
) -> Result<RepoIndexReport> {
    let (files, discovery) = discovery::discover_files(root, &config.discovery)?;

    let mut settings = config.index_settings();
    settings.max_total_chunks_per_run = config.discovery.max_chunks;
    let mut indexer = Indexer::new(store, embedder, settings);

    let mut report = RepoIndexReport {
        discovery,
        ..RepoIndexReport::default()
    };

    for rel in &files {
        if indexer.cap_reached() {
            tracing::warn!(
                "Chunk cap of {} reached; stopping repo indexing",
                config.discovery.max_chunks
            );
            break;
        }
        let path = rel.to_string_lossy().replace('\\', "/");
        let content = match std::fs::read_to_string(root.join(rel)) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path, e);
                report.files_failed += 1;
                continue;
            }
        };

        let stats = if discovery::is_document(&path) {
            indexer.index_repo_doc(target, &path, &content).await
        } else {
            indexer.index_code_file(target, &path, &content).await
        };
        tracing::debug!(
            "{}: {} indexed, {} skipped, {} errors",
            path,
            stats.indexed,
            stats.skipped,
            stats.errors
        );
        if stats.errors > 0 {
            report.files_failed += 1;
        } else if stats.indexed + stats.skipped > 0 {
            report.files_indexed += 1;
        }
    }

    report.chunks = indexer.totals();
    Ok(report)
}

/// Changed files named by a unified diff, with status taken from the
/// section headers. Content is read from `root` when given.
pub fn changed_files_from_diff(diff: &str, root: Option<&Path>) -> Vec<ChangedFile> {
    split_diff_by_file(diff)
        .into_iter()
        .filter_map(|(path, section)| {
            let path = path?;
            let header = section
                .lines()
                .take_while(|l| !l.starts_with("@@"))
                .collect::<Vec<_>>();
            let status = if header.iter().any(|l| l.starts_with("deleted file mode")) {
                "removed"
            } else if header.iter().any(|l| l.starts_with("new file mode")) {
                "added"
            } else if header.iter().any(|l| l.starts_with("rename to")) {
                "renamed"
            } else {
                "modified"
            };

            let (size, content) = match root {
                Some(root) if status != "removed" => {
                    let full = root.join(&path);
                    let size = std::fs::metadata(&full).map(|m| m.len()).unwrap_or(0);
                    (size, std::fs::read_to_string(&full).ok())
                }
                _ => (0, None),
            };

            Some(ChangedFile {
                path,
                status: status.to_string(),
                size,
                content,
            })
        })
        .collect()
}

/// Index a PR diff and the head content of its changed files.
pub async fn index_pull_request<S: VectorStore + ?Sized>(
    store: &S,
    embedder: &dyn Embedder,
    config: &Config,
    target: &IndexTarget,
    diff: &str,
    root: Option<&Path>,
) -> Result<(IndexStats, IndexStats)> {
    let ignore = IgnoreMatcher::new(&config.discovery.ignore_globs)?;
    let mut indexer = Indexer::new(store, embedder, config.index_settings());

    let diff_stats = indexer.index_diff(target, diff).await;
    let files = changed_files_from_diff(diff, root);
    let file_stats = indexer
        .index_pr_files(target, files, |p| ignore.is_ignored(p))
        .await;
    Ok((diff_stats, file_stats))
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    let pool = db::connect(config).await?;
    migrate::create_schema(&pool).await?;
    Ok(SqliteStore::new(pool))
}

fn require_embedder(config: &Config) -> Result<Box<dyn Embedder>> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in the config to index content.");
    }
    create_embedder(&config.embedding)
}

fn print_chunk_stats(stats: &IndexStats) {
    println!("  chunks indexed: {}", stats.indexed);
    println!("  chunks skipped (unchanged): {}", stats.skipped);
    println!("  errors: {}", stats.errors);
    if stats.cap_reached {
        println!("  cap reached: yes");
    }
}

pub async fn run_index_repo(config: &Config, root: &Path, repo: Option<&str>) -> Result<()> {
    let repo = repo
        .map(String::from)
        .or_else(|| config.scope.repo.clone())
        .ok_or_else(|| anyhow::anyhow!("No repo given; pass --repo or set scope.repo"))?;
    let embedder = require_embedder(config)?;
    let store = open_store(config).await?;

    let target = IndexTarget::repo(&config.scope.user_id, &repo);
    let report = index_repo_files(&store, embedder.as_ref(), config, root, &target).await?;

    println!("index repo {}", repo);
    println!("  files discovered: {}", report.discovery.files_included);
    println!("  files skipped: {}", report.discovery.total_skipped());
    println!("  files indexed: {}", report.files_indexed);
    println!("  files failed: {}", report.files_failed);
    print_chunk_stats(&report.chunks);
    println!("ok");
    Ok(())
}

pub async fn run_index_diff(
    config: &Config,
    diff_path: &Path,
    repo: Option<&str>,
    pr_number: u64,
    head_sha: &str,
    root: Option<&Path>,
) -> Result<()> {
    let repo = repo
        .map(String::from)
        .or_else(|| config.scope.repo.clone())
        .ok_or_else(|| anyhow::anyhow!("No repo given; pass --repo or set scope.repo"))?;
    let diff = std::fs::read_to_string(diff_path)
        .with_context(|| format!("Failed to read diff: {}", diff_path.display()))?;
    let embedder = require_embedder(config)?;
    let store = open_store(config).await?;

    let target = IndexTarget::pull_request(&config.scope.user_id, &repo, pr_number, head_sha);
    let (diff_stats, file_stats) =
        index_pull_request(&store, embedder.as_ref(), config, &target, &diff, root).await?;

    println!("index diff {} #{} @ {}", repo, pr_number, factgap_core::answer::short_sha(head_sha));
    println!("diff:");
    print_chunk_stats(&diff_stats);
    println!("changed files:");
    print_chunk_stats(&file_stats);
    println!("ok");
    Ok(())
}

pub async fn run_index_page(config: &Config, file: &Path, page: NotionPage) -> Result<()> {
    if page.page_id.trim().is_empty() {
        bail!("--page-id must not be empty");
    }
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read page: {}", file.display()))?;
    let page = NotionPage { content, ..page };
    let embedder = require_embedder(config)?;
    let store = open_store(config).await?;

    let mut indexer = Indexer::new(&store, embedder.as_ref(), config.index_settings());
    let stats = indexer
        .index_notion_page(&config.scope.user_id, &page)
        .await;

    println!("index page {}", page.page_id);
    print_chunk_stats(&stats);
    println!("ok");
    Ok(())
}
