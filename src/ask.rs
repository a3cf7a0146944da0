//! Query-side commands: `ask`, `analyze`, `eval`, `classify`, `purge`
//! and `discover`.
//!
//! `ask` and `analyze` run the full query pipeline against the SQLite
//! store: scoped retrieval, rerank cascade with diversity, then a cited
//! answer (generated when a chat model is configured, templated
//! otherwise). `eval` stops after rerank and prints the retrieval report.

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;

use factgap_core::answer::{Answer, AnswerComposer};
use factgap_core::embedding::Embedder;
use factgap_core::models::SourceType;
use factgap_core::report::{build_report, format_eval, log_report, RetrievalReport};
use factgap_core::rerank::{RerankOutcome, RerankProvider, Reranker, TextGenerator};
use factgap_core::retrieval::{RetrievalContext, RetrievalOutcome, ScopedRetriever};
use factgap_core::store::{DeleteScope, VectorStore};
use factgap_core::{classify_intent, ScoredChunk};

use crate::config::Config;
use crate::db;
use crate::discovery;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::rerank::create_rerank_provider;
use crate::sqlite_store::SqliteStore;

/// Who is asking: repo and PR coordinates from the command line, falling
/// back to `[scope]`.
#[derive(Debug, Clone, Default)]
pub struct QueryScope {
    pub repo: Option<String>,
    pub pr_number: Option<u64>,
    pub head_sha: Option<String>,
}

impl QueryScope {
    fn context(&self, config: &Config) -> RetrievalContext {
        RetrievalContext {
            user_id: config.scope.user_id.clone(),
            repo: self.repo.clone().or_else(|| config.scope.repo.clone()),
            pr_number: self.pr_number,
            head_sha: self.head_sha.clone(),
        }
    }
}

pub struct QueryResult {
    pub retrieval: RetrievalOutcome,
    pub rerank: RerankOutcome,
    pub report: RetrievalReport,
}

impl QueryResult {
    pub fn evidence(&self) -> &[ScoredChunk] {
        &self.rerank.chunks
    }
}

/// Retrieve, rerank and report one query.
pub async fn run_query<S: VectorStore + ?Sized>(
    store: &S,
    embedder: &dyn Embedder,
    provider: Option<&dyn RerankProvider>,
    generator: Option<&dyn TextGenerator>,
    config: &Config,
    query: &str,
    ctx: &RetrievalContext,
) -> Result<QueryResult> {
    let started = Instant::now();

    let retriever = ScopedRetriever::new(store, embedder, config.retrieval_settings());
    let retrieval = retriever.retrieve(query, ctx).await?;

    let llm = if config.rerank.llm_fallback {
        generator
    } else {
        None
    };
    let reranker = Reranker::new(provider, llm, config.rerank_settings());
    let rerank = reranker
        .rerank(query, retrieval.candidates.clone(), config.retrieval.final_k)
        .await;

    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    let report = build_report(query, &retrieval.stats, &rerank, Some(latency_ms));
    log_report(&report);

    Ok(QueryResult {
        retrieval,
        rerank,
        report,
    })
}

/// Providers for one command invocation.
struct Backends {
    store: SqliteStore,
    embedder: Box<dyn Embedder>,
    provider: Option<Box<dyn RerankProvider>>,
    generator: Option<Box<dyn TextGenerator>>,
}

impl Backends {
    async fn open(config: &Config) -> Result<Self> {
        if !config.embedding.is_enabled() {
            anyhow::bail!(
                "Embedding provider is disabled. Set [embedding] provider in the config to query."
            );
        }
        let pool = db::connect(config).await?;
        Ok(Self {
            store: SqliteStore::new(pool),
            embedder: create_embedder(&config.embedding)?,
            provider: create_rerank_provider(&config.rerank)?,
            generator: create_generator(&config.generation)?,
        })
    }

    async fn query(
        &self,
        config: &Config,
        query: &str,
        ctx: &RetrievalContext,
    ) -> Result<QueryResult> {
        run_query(
            &self.store,
            self.embedder.as_ref(),
            self.provider.as_deref(),
            self.generator.as_deref(),
            config,
            query,
            ctx,
        )
        .await
    }

    fn composer(&self) -> AnswerComposer<'_> {
        AnswerComposer::new(self.generator.as_deref())
    }
}

#[derive(Serialize)]
struct AskOutput<'a> {
    answer: &'a Answer,
    report: &'a RetrievalReport,
}

pub async fn run_ask(config: &Config, question: &str, scope: &QueryScope, json: bool) -> Result<()> {
    let backends = Backends::open(config).await?;
    let ctx = scope.context(config);
    let result = backends.query(config, question, &ctx).await?;
    let answer = backends
        .composer()
        .answer(question, ctx.head_sha.as_deref(), result.evidence())
        .await;

    if json {
        let out = AskOutput {
            answer: &answer,
            report: &result.report,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", answer.text);
    }
    Ok(())
}

/// Analyze a pull request against its own diff plus repository and
/// Notion context.
pub async fn run_analyze(
    config: &Config,
    scope: &QueryScope,
    title: &str,
    body: &str,
) -> Result<()> {
    let head_sha = scope
        .head_sha
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--sha is required for analyze"))?;
    if scope.pr_number.is_none() {
        anyhow::bail!("--pr is required for analyze");
    }

    let backends = Backends::open(config).await?;
    let ctx = scope.context(config);
    let query = if body.trim().is_empty() {
        title.to_string()
    } else {
        format!("{}\n\n{}", title, body)
    };
    let result = backends.query(config, &query, &ctx).await?;
    let analysis = backends
        .composer()
        .analyze(title, body, head_sha, result.evidence())
        .await;

    println!("{}", analysis.text);
    Ok(())
}

pub async fn run_eval(config: &Config, query: &str, scope: &QueryScope) -> Result<()> {
    let backends = Backends::open(config).await?;
    let result = backends.query(config, query, &scope.context(config)).await?;

    println!("{}", format_eval(&result.report));
    if let Some(warning) = &result.rerank.stats.diversity_warning {
        println!("warning: {}", warning);
    }
    Ok(())
}

pub fn run_classify(query: &str, json: bool) -> Result<()> {
    let result = classify_intent(query);
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("intent: {}", result.intent.as_str());
    println!("confidence: {:.2}", result.confidence);
    if !result.matched_keywords.is_empty() {
        let keywords: Vec<&str> = result.matched_keywords.iter().map(String::as_str).collect();
        println!("keywords: {}", keywords.join(", "));
    }
    for (source_type, weight) in &result.scope_weights.0 {
        println!("  {:10} x{:.1}", source_type.as_str(), weight);
    }
    Ok(())
}

pub async fn run_purge(
    config: &Config,
    repo: Option<String>,
    source_type: Option<SourceType>,
    source_id: Option<String>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let scope = DeleteScope {
        user_id: config.scope.user_id.clone(),
        repo,
        source_type,
        source_id,
    };
    let deleted = store.delete(&scope).await?;
    let remaining = store.count_chunks(&config.scope.user_id).await?;

    println!("purge {}", config.scope.user_id);
    println!("  chunks deleted: {}", deleted);
    println!("  chunks remaining: {}", remaining);
    println!("ok");
    Ok(())
}

pub fn run_discover(config: &Config, root: &Path, list: bool) -> Result<()> {
    let (files, stats) = discovery::discover_files(root, &config.discovery)?;

    if list {
        for file in &files {
            println!("{}", file.display());
        }
    }

    println!("discover {}", root.display());
    println!("  dirs visited: {}", stats.dirs_visited);
    println!("  files seen: {}", stats.files_seen);
    println!("  files included: {}", stats.files_included);
    println!("  skipped: {}", stats.total_skipped());
    for (label, count) in [
        ("ignored dirs pruned", stats.ignored_dir_pruned),
        ("hidden dirs pruned", stats.hidden_dir_pruned),
        ("ignored paths", stats.ignored_path),
        ("test files", stats.test_file),
        ("unsupported extension", stats.unsupported_ext),
        ("too large", stats.too_large),
        ("binary", stats.binary),
        ("unreadable", stats.unreadable),
        ("outside include roots", stats.outside_include_roots),
    ] {
        if count > 0 {
            println!("    {}: {}", label, count);
        }
    }
    if stats.cap_reached {
        println!("  cap reached: yes ({} files)", config.discovery.max_files);
    }
    println!("ok");
    Ok(())
}
