//! Indexing pipeline: chunk, enrich, hash, embed what is new, upsert.
//!
//! An [`Indexer`] owns one run. Every `index_*` method handles one item (a
//! file, a diff, a Notion page) and returns [`IndexStats`] for it; the
//! indexer also keeps a running total so the per-run chunk cap holds
//! across items.
//!
//! Per-chunk failures (a rejected upsert) and per-item failures (the
//! embedding provider erroring for that item) are counted in `errors` and
//! never abort the run. Re-indexing unchanged content is a no-op: every
//! chunk's original-content hash is checked against the store at the
//! item's exact scope before anything is embedded.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::chunk::{chunk_code, chunk_diff, chunk_document, ChunkerConfig, Language, TextChunk};
use crate::embedding::{BatchEmbedder, Embedder, StoreHashes, DEFAULT_BATCH_SIZE};
use crate::enrich::{enrich_code, enrich_diff, enrich_notion, enrich_repo_doc, extract_diff_path, CodeContext};
use crate::hash::compute_content_hash;
use crate::models::{Chunk, SourceType};
use crate::store::{UpsertOutcome, VectorStore};
use crate::symbol::extract_symbol;

/// Repository name recorded on Notion chunks.
pub const NOTION_REPO: &str = "notion";

const CODE_EXTENSIONS: &[&str] = &[".py", ".js", ".ts", ".tsx", ".jsx", ".go", ".java", ".rs"];
const IMPORTANT_DIRS: &[&str] = &["src/", "app/", "server/", "lib/"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Embed enriched text (header + chunk) instead of the bare chunk.
    pub enrichment: bool,
    pub code: ChunkerConfig,
    pub diff: ChunkerConfig,
    pub document: ChunkerConfig,
    /// Chunks considered per run before the indexer stops.
    pub max_total_chunks_per_run: usize,
    /// Changed files kept by [`prioritize_changed_files`] for a PR.
    pub max_changed_files_indexed: usize,
    pub batch_size: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            enrichment: true,
            code: ChunkerConfig::CODE,
            diff: ChunkerConfig::DIFF,
            document: ChunkerConfig::DOCUMENT,
            max_total_chunks_per_run: 1500,
            max_changed_files_indexed: 50,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Where indexed repository content belongs. `pr_number` and `head_sha`
/// are set for PR overlay content and unset for the base repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexTarget {
    pub user_id: String,
    pub repo: String,
    pub pr_number: Option<u64>,
    pub head_sha: Option<String>,
}

impl IndexTarget {
    pub fn repo(user_id: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            repo: repo.into(),
            pr_number: None,
            head_sha: None,
        }
    }

    pub fn pull_request(
        user_id: impl Into<String>,
        repo: impl Into<String>,
        pr_number: u64,
        head_sha: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            repo: repo.into(),
            pr_number: Some(pr_number),
            head_sha: Some(head_sha.into()),
        }
    }

    fn base_chunk(&self, source_type: SourceType, path: Option<String>) -> Chunk {
        Chunk {
            user_id: self.user_id.clone(),
            repo: self.repo.clone(),
            source_type,
            path,
            pr_number: self.pr_number,
            head_sha: self.head_sha.clone(),
            source_id: None,
            language: None,
            symbol: None,
            start_line: None,
            end_line: None,
            url: None,
            last_edited_time: None,
            content: String::new(),
            content_hash: String::new(),
            embedding: Vec::new(),
            embedding_model: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub indexed: usize,
    pub skipped: usize,
    pub errors: usize,
    /// The run's chunk cap stopped work before this item was finished.
    pub cap_reached: bool,
}

impl AddAssign for IndexStats {
    fn add_assign(&mut self, other: Self) {
        self.indexed += other.indexed;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.cap_reached |= other.cap_reached;
    }
}

/// A file touched by a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    /// `added`, `modified`, `renamed` or `removed`.
    pub status: String,
    /// Size in bytes, `0` when unknown.
    #[serde(default)]
    pub size: u64,
    /// Content at the PR head, if it could be read.
    #[serde(default)]
    pub content: Option<String>,
}

impl ChangedFile {
    pub fn is_removed(&self) -> bool {
        self.status == "removed"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotionPage {
    pub page_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub last_edited_time: Option<String>,
    pub content: String,
}

fn file_priority(file: &ChangedFile) -> f64 {
    let mut score = 0.0;
    if file.size > 0 {
        score += (10_000.0 / file.size as f64).min(100.0);
    }
    if CODE_EXTENSIONS.iter().any(|ext| file.path.ends_with(ext)) {
        score += 50.0;
    }
    if IMPORTANT_DIRS.iter().any(|dir| file.path.contains(dir)) {
        score += 30.0;
    }
    score
}

/// Pick the changed files worth indexing for a PR.
///
/// Removed and ignored files are dropped, as is anything that scores zero.
/// The rest are ordered by score (smaller files, code extensions and
/// source directories rank higher; ties keep their input order) and the
/// first `max_files` are returned.
pub fn prioritize_changed_files(
    files: Vec<ChangedFile>,
    max_files: usize,
    is_ignored: impl Fn(&str) -> bool,
) -> Vec<ChangedFile> {
    let mut scored: Vec<(f64, ChangedFile)> = files
        .into_iter()
        .filter(|f| !f.is_removed() && !is_ignored(&f.path))
        .map(|f| (file_priority(&f), f))
        .filter(|(score, _)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(max_files).map(|(_, f)| f).collect()
}

/// Split a multi-file unified diff into per-file sections.
///
/// Sections start at each `diff --git` line. Text without such headers is
/// returned as a single section.
pub fn split_diff_by_file(diff: &str) -> Vec<(Option<String>, &str)> {
    let mut starts: Vec<usize> = diff
        .match_indices("diff --git ")
        .map(|(i, _)| i)
        .filter(|&i| i == 0 || diff.as_bytes()[i - 1] == b'\n')
        .collect();
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }

    let mut sections = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(diff.len());
        let section = &diff[start..end];
        if section.trim().is_empty() {
            continue;
        }
        sections.push((extract_diff_path(section), section));
    }
    sections
}

/// One chunk ready for hashing and embedding.
struct Pending {
    chunk: TextChunk,
    enriched: String,
    symbol: Option<String>,
}

/// Runs indexing against one store with one embedding provider.
pub struct Indexer<'a, S: VectorStore + ?Sized> {
    store: &'a S,
    embedder: BatchEmbedder<'a>,
    settings: IndexSettings,
    chunks_seen: usize,
    totals: IndexStats,
}

impl<'a, S: VectorStore + ?Sized> Indexer<'a, S> {
    pub fn new(store: &'a S, embedder: &'a dyn Embedder, settings: IndexSettings) -> Self {
        let embedder = BatchEmbedder::with_batch_size(embedder, settings.batch_size);
        Self {
            store,
            embedder,
            settings,
            chunks_seen: 0,
            totals: IndexStats::default(),
        }
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// Stats accumulated over every item indexed so far.
    pub fn totals(&self) -> IndexStats {
        self.totals
    }

    pub fn cap_reached(&self) -> bool {
        self.totals.cap_reached
    }

    pub async fn index_code_file(&mut self, target: &IndexTarget, path: &str, content: &str) -> IndexStats {
        if content.trim().is_empty() {
            return IndexStats::default();
        }
        let language = Language::from_path(path);
        let lang_name = language.map(|l| l.as_str().to_string()).or_else(|| {
            path.rsplit('/')
                .next()
                .and_then(|f| f.rsplit_once('.'))
                .map(|(_, ext)| ext.to_ascii_lowercase())
        });

        let enrichment = self.settings.enrichment;
        let pending = chunk_code(content, language, &self.settings.code)
            .into_iter()
            .map(|chunk| {
                let symbol = extract_symbol(&chunk.text, lang_name.as_deref());
                let enriched = if enrichment {
                    let ctx = CodeContext {
                        language: lang_name.as_deref(),
                        start_line: chunk.start_line,
                        end_line: chunk.end_line,
                        full_file: Some(content),
                        symbol: symbol.as_deref(),
                    };
                    enrich_code(&chunk.text, path, &ctx).enriched_content
                } else {
                    chunk.text.clone()
                };
                Pending { chunk, enriched, symbol }
            })
            .collect();

        let mut base = target.base_chunk(SourceType::Code, Some(path.to_string()));
        base.language = lang_name;
        self.index_pending(base, pending).await
    }

    pub async fn index_repo_doc(&mut self, target: &IndexTarget, path: &str, content: &str) -> IndexStats {
        if content.trim().is_empty() {
            return IndexStats::default();
        }
        let enrichment = self.settings.enrichment;
        let pending = chunk_document(content, &self.settings.document)
            .into_iter()
            .map(|chunk| {
                let enriched = if enrichment {
                    enrich_repo_doc(&chunk.text, path).enriched_content
                } else {
                    chunk.text.clone()
                };
                Pending { chunk, enriched, symbol: None }
            })
            .collect();

        let base = target.base_chunk(SourceType::RepoDoc, Some(path.to_string()));
        self.index_pending(base, pending).await
    }

    /// Index a unified diff, one scope per file section.
    pub async fn index_diff(&mut self, target: &IndexTarget, diff: &str) -> IndexStats {
        let mut stats = IndexStats::default();
        for (path, section) in split_diff_by_file(diff) {
            if self.totals.cap_reached {
                stats.cap_reached = true;
                break;
            }
            let enrichment = self.settings.enrichment;
            let pending = chunk_diff(section, &self.settings.diff)
                .into_iter()
                .map(|chunk| {
                    let enriched = if enrichment {
                        enrich_diff(&chunk.text, path.as_deref(), None).enriched_content
                    } else {
                        chunk.text.clone()
                    };
                    Pending { chunk, enriched, symbol: None }
                })
                .collect();
            let base = target.base_chunk(SourceType::Diff, path);
            stats += self.index_pending(base, pending).await;
        }
        stats
    }

    /// Index the contents of a PR's changed files at the PR head.
    ///
    /// Files are first narrowed with [`prioritize_changed_files`]; files
    /// without content are skipped silently.
    pub async fn index_pr_files(
        &mut self,
        target: &IndexTarget,
        files: Vec<ChangedFile>,
        is_ignored: impl Fn(&str) -> bool,
    ) -> IndexStats {
        let total = files.len();
        let eligible = files
            .iter()
            .filter(|f| !f.is_removed() && !is_ignored(&f.path) && file_priority(f) > 0.0)
            .count();
        let selected =
            prioritize_changed_files(files, self.settings.max_changed_files_indexed, &is_ignored);
        tracing::info!(
            "Indexing {} of {} changed files for {} #{}",
            selected.len(),
            total,
            target.repo,
            target.pr_number.unwrap_or_default()
        );

        let mut stats = IndexStats::default();
        if selected.len() < eligible {
            tracing::warn!(
                "Changed-file cap ({}) reached, {} eligible files left unindexed",
                self.settings.max_changed_files_indexed,
                eligible - selected.len()
            );
            stats.cap_reached = true;
        }
        for file in &selected {
            if self.totals.cap_reached {
                stats.cap_reached = true;
                break;
            }
            if let Some(content) = file.content.as_deref() {
                stats += self.index_code_file(target, &file.path, content).await;
            }
        }
        stats
    }

    pub async fn index_notion_page(&mut self, user_id: &str, page: &NotionPage) -> IndexStats {
        if page.content.trim().is_empty() {
            return IndexStats::default();
        }
        let enrichment = self.settings.enrichment;
        let pending = chunk_document(&page.content, &self.settings.document)
            .into_iter()
            .map(|chunk| {
                let enriched = if enrichment {
                    enrich_notion(
                        &chunk.text,
                        page.title.as_deref(),
                        page.url.as_deref(),
                        page.last_edited_time.as_deref(),
                    )
                    .enriched_content
                } else {
                    chunk.text.clone()
                };
                Pending { chunk, enriched, symbol: None }
            })
            .collect();

        let target = IndexTarget::repo(user_id, NOTION_REPO);
        let mut base = target.base_chunk(SourceType::Notion, None);
        base.source_id = Some(page.page_id.clone());
        base.url = page.url.clone();
        base.last_edited_time = page.last_edited_time.clone();
        self.index_pending(base, pending).await
    }

    async fn index_pending(&mut self, base: Chunk, mut pending: Vec<Pending>) -> IndexStats {
        let mut stats = IndexStats::default();
        if pending.is_empty() {
            return stats;
        }

        let budget = self
            .settings
            .max_total_chunks_per_run
            .saturating_sub(self.chunks_seen);
        if pending.len() > budget {
            tracing::warn!(
                "Chunk cap ({}) reached, indexing {} of {} chunks for {}",
                self.settings.max_total_chunks_per_run,
                budget,
                pending.len(),
                base.locator().unwrap_or(&base.repo)
            );
            pending.truncate(budget);
            stats.cap_reached = true;
        }
        self.chunks_seen += pending.len();

        if !pending.is_empty() {
            self.store_pending(&base, pending, &mut stats).await;
        }

        tracing::debug!(
            source_type = %base.source_type,
            locator = base.locator().unwrap_or(""),
            indexed = stats.indexed,
            skipped = stats.skipped,
            errors = stats.errors,
            "Indexed item"
        );
        self.totals += stats;
        stats
    }

    async fn store_pending(&self, base: &Chunk, pending: Vec<Pending>, stats: &mut IndexStats) {
        let hashes: Vec<String> = pending
            .iter()
            .map(|p| compute_content_hash(&p.chunk.text))
            .collect();
        let texts: Vec<String> = pending.iter().map(|p| p.enriched.clone()).collect();
        let existing = StoreHashes::new(self.store, base.scope());

        let outcome = match self
            .embedder
            .embed_with_skip(&texts, Some(&hashes), &existing)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    "Embedding failed for {}: {e:#}",
                    base.locator().unwrap_or(&base.repo)
                );
                stats.errors += pending.len();
                return;
            }
        };

        let model = self.embedder.model_name().to_string();
        for ((p, hash), embedding) in pending.into_iter().zip(hashes).zip(outcome.embeddings) {
            let Some(embedding) = embedding else {
                stats.skipped += 1;
                continue;
            };
            let chunk = Chunk {
                symbol: p.symbol,
                start_line: p.chunk.start_line,
                end_line: p.chunk.end_line,
                content: p.enriched,
                content_hash: hash,
                embedding,
                embedding_model: model.clone(),
                ..base.clone()
            };
            match self.store.upsert(&chunk).await {
                Ok(UpsertOutcome::Inserted(_)) => stats.indexed += 1,
                Ok(UpsertOutcome::Duplicate) => stats.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        "Failed to store chunk of {} (lines {:?}-{:?}): {e:#}",
                        chunk.locator().unwrap_or(&chunk.repo),
                        chunk.start_line,
                        chunk.end_line
                    );
                    stats.errors += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;
    use crate::embedding::IndexedEmbedding;
    use crate::store::memory::InMemoryStore;

    struct CountingEmbedder {
        calls: AtomicUsize,
        texts: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                texts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "fake-embed"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<IndexedEmbedding>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts
                .iter()
                .enumerate()
                .map(|(index, t)| IndexedEmbedding {
                    index,
                    vector: vec![t.len() as f32, 1.0, 0.5],
                })
                .collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }
        fn dims(&self) -> usize {
            0
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<IndexedEmbedding>> {
            anyhow::bail!("provider unavailable")
        }
    }

    const PY: &str = "import os\n\ndef charge(amount):\n    return amount * 2\n";

    fn changed(path: &str, status: &str, size: u64) -> ChangedFile {
        ChangedFile {
            path: path.into(),
            status: status.into(),
            size,
            content: Some(format!("// {path}\nfn main() {{}}\n")),
        }
    }

    #[tokio::test]
    async fn test_code_file_indexed_with_metadata() {
        let store = InMemoryStore::new();
        let embedder = CountingEmbedder::new();
        let mut indexer = Indexer::new(&store, &embedder, IndexSettings::default());

        let stats = indexer
            .index_code_file(&IndexTarget::repo("u1", "acme/api"), "src/billing.py", PY)
            .await;
        assert_eq!(stats, IndexStats { indexed: 1, ..Default::default() });

        let chunk = &store.chunks()[0];
        assert_eq!(chunk.source_type, SourceType::Code);
        assert_eq!(chunk.language.as_deref(), Some("python"));
        assert_eq!(chunk.symbol.as_deref(), Some("charge"));
        assert_eq!(chunk.start_line, Some(1));
        assert_eq!(chunk.end_line, Some(4));
        assert_eq!(chunk.content_hash, compute_content_hash(PY.trim()));
        assert!(chunk.content.starts_with("File: src/billing.py\nLanguage: python"));
        assert_eq!(chunk.embedding_model, "fake-embed");
    }

    #[tokio::test]
    async fn test_reindex_is_noop() {
        let store = InMemoryStore::new();
        let embedder = CountingEmbedder::new();
        let target = IndexTarget::repo("u1", "acme/api");

        let mut first = Indexer::new(&store, &embedder, IndexSettings::default());
        first.index_code_file(&target, "src/billing.py", PY).await;
        let calls = embedder.calls.load(Ordering::SeqCst);

        let mut second = Indexer::new(&store, &embedder, IndexSettings::default());
        let stats = second.index_code_file(&target, "src/billing.py", PY).await;
        assert_eq!(stats, IndexStats { skipped: 1, ..Default::default() });
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_pr_overlay_is_separate_scope() {
        let store = InMemoryStore::new();
        let embedder = CountingEmbedder::new();
        let mut indexer = Indexer::new(&store, &embedder, IndexSettings::default());

        indexer
            .index_code_file(&IndexTarget::repo("u1", "acme/api"), "src/billing.py", PY)
            .await;
        let stats = indexer
            .index_code_file(
                &IndexTarget::pull_request("u1", "acme/api", 7, "abc123"),
                "src/billing.py",
                PY,
            )
            .await;
        assert_eq!(stats.indexed, 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_enrichment_disabled_embeds_raw_text() {
        let store = InMemoryStore::new();
        let embedder = CountingEmbedder::new();
        let settings = IndexSettings {
            enrichment: false,
            ..Default::default()
        };
        let mut indexer = Indexer::new(&store, &embedder, settings);
        indexer
            .index_repo_doc(&IndexTarget::repo("u1", "acme/api"), "README.md", "# Acme\n\nHello.")
            .await;
        assert_eq!(store.chunks()[0].content, "# Acme\n\nHello.");
    }

    #[tokio::test]
    async fn test_chunk_cap_stops_run() {
        let store = InMemoryStore::new();
        let embedder = CountingEmbedder::new();
        let settings = IndexSettings {
            max_total_chunks_per_run: 1,
            ..Default::default()
        };
        let mut indexer = Indexer::new(&store, &embedder, settings);
        let target = IndexTarget::repo("u1", "acme/api");

        let a = indexer.index_repo_doc(&target, "a.md", "alpha").await;
        assert!(!a.cap_reached);
        let b = indexer.index_repo_doc(&target, "b.md", "beta").await;
        assert!(b.cap_reached);
        assert_eq!(b.indexed, 0);
        assert!(indexer.cap_reached());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_counts_errors() {
        let store = InMemoryStore::new();
        let mut indexer = Indexer::new(&store, &BrokenEmbedder, IndexSettings::default());
        let stats = indexer
            .index_repo_doc(&IndexTarget::repo("u1", "acme/api"), "a.md", "alpha")
            .await;
        assert_eq!(stats.errors, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_notion_page() {
        let store = InMemoryStore::new();
        let embedder = CountingEmbedder::new();
        let mut indexer = Indexer::new(&store, &embedder, IndexSettings::default());
        let page = NotionPage {
            page_id: "page-1".into(),
            title: Some("Deploy runbook".into()),
            url: Some("https://notion.so/page-1".into()),
            last_edited_time: None,
            content: "Run the deploy script.".into(),
        };
        let stats = indexer.index_notion_page("u1", &page).await;
        assert_eq!(stats.indexed, 1);

        let chunk = &store.chunks()[0];
        assert_eq!(chunk.repo, NOTION_REPO);
        assert_eq!(chunk.source_id.as_deref(), Some("page-1"));
        assert!(chunk.content.starts_with("Notion: Deploy runbook\nURL: https://notion.so/page-1"));
    }

    #[tokio::test]
    async fn test_diff_split_per_file() {
        let diff = "diff --git a/src/a.py b/src/a.py\n@@ -1,1 +1,1 @@\n-x = 1\n+x = 2\n\
                    diff --git a/src/b.py b/src/b.py\n@@ -3,1 +3,1 @@\n-y = 1\n+y = 3\n";
        let store = InMemoryStore::new();
        let embedder = CountingEmbedder::new();
        let mut indexer = Indexer::new(&store, &embedder, IndexSettings::default());
        let stats = indexer
            .index_diff(&IndexTarget::pull_request("u1", "acme/api", 7, "abc123"), diff)
            .await;
        assert_eq!(stats.indexed, 2);

        let paths: Vec<_> = store.chunks().into_iter().filter_map(|c| c.path).collect();
        assert_eq!(paths, vec!["src/a.py", "src/b.py"]);
    }

    #[test]
    fn test_split_diff_without_headers() {
        let sections = split_diff_by_file("@@ -1 +1 @@\n-a\n+b\n");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].0, None);
    }

    #[test]
    fn test_prioritize_changed_files() {
        let files = vec![
            changed("docs/big.txt", "modified", 100_000),
            changed("src/small.rs", "modified", 100),
            changed("src/gone.rs", "removed", 100),
            changed("vendor/lib.rs", "added", 100),
            changed("empty.cfg", "added", 0),
            changed("tool.py", "modified", 1_000),
        ];
        let picked = prioritize_changed_files(files, 3, |p| p.starts_with("vendor/"));
        let paths: Vec<_> = picked.iter().map(|f| f.path.as_str()).collect();
        // 100 + 50 + 30, then 10 + 50, then 0.1
        assert_eq!(paths, vec!["src/small.rs", "tool.py", "docs/big.txt"]);
    }

    #[tokio::test]
    async fn test_pr_files_respect_limit() {
        let store = InMemoryStore::new();
        let embedder = CountingEmbedder::new();
        let settings = IndexSettings {
            max_changed_files_indexed: 1,
            ..Default::default()
        };
        let mut indexer = Indexer::new(&store, &embedder, settings);
        let files = vec![changed("src/a.rs", "modified", 10), changed("src/b.rs", "modified", 5000)];
        let stats = indexer
            .index_pr_files(&IndexTarget::pull_request("u1", "acme/api", 7, "abc"), files, |_| false)
            .await;
        assert_eq!(stats.indexed, 1);
        assert_eq!(store.chunks()[0].path.as_deref(), Some("src/a.rs"));
    }

    #[tokio::test]
    async fn test_pr_file_cap_sets_flag() {
        let store = InMemoryStore::new();
        let embedder = CountingEmbedder::new();
        let settings = IndexSettings {
            max_changed_files_indexed: 1,
            ..Default::default()
        };
        let mut indexer = Indexer::new(&store, &embedder, settings);
        let files = vec![
            changed("src/a.rs", "modified", 10),
            changed("src/b.rs", "modified", 20),
            changed("src/c.rs", "added", 30),
        ];
        let stats = indexer
            .index_pr_files(&IndexTarget::pull_request("u1", "acme/api", 7, "abc"), files, |_| false)
            .await;
        assert_eq!(stats.indexed, 1);
        assert!(stats.cap_reached);
    }

    #[tokio::test]
    async fn test_pr_files_under_cap_leave_flag_clear() {
        let store = InMemoryStore::new();
        let embedder = CountingEmbedder::new();
        let settings = IndexSettings {
            max_changed_files_indexed: 2,
            ..Default::default()
        };
        let mut indexer = Indexer::new(&store, &embedder, settings);
        let files = vec![
            changed("src/a.rs", "modified", 10),
            changed("src/gone.rs", "removed", 10),
            changed("vendor/x.rs", "modified", 10),
        ];
        let stats = indexer
            .index_pr_files(
                &IndexTarget::pull_request("u1", "acme/api", 7, "abc"),
                files,
                |p| p.starts_with("vendor/"),
            )
            .await;
        assert_eq!(stats.indexed, 1);
        assert!(!stats.cap_reached);
    }
}
