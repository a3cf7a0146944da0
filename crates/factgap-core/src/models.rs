//! Core data types shared by the indexing and query pipelines.
//!
//! Store rows are always converted into these typed records. Optional
//! coordinates are `Option` fields; nothing downstream reads a chunk
//! through string keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::hash::hash_parts;

/// The kind of content a chunk was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Code,
    Diff,
    RepoDoc,
    Notion,
}

impl SourceType {
    pub const ALL: [SourceType; 4] = [
        SourceType::Code,
        SourceType::Diff,
        SourceType::RepoDoc,
        SourceType::Notion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Code => "code",
            SourceType::Diff => "diff",
            SourceType::RepoDoc => "repo_doc",
            SourceType::Notion => "notion",
        }
    }

    /// Whether chunks of this type are addressed by a repository path.
    pub fn is_file_scoped(&self) -> bool {
        matches!(
            self,
            SourceType::Code | SourceType::Diff | SourceType::RepoDoc
        )
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(SourceType::Code),
            "diff" => Ok(SourceType::Diff),
            "repo_doc" => Ok(SourceType::RepoDoc),
            "notion" => Ok(SourceType::Notion),
            other => Err(PipelineError::UnknownSourceType(other.to_string())),
        }
    }
}

/// One unit of indexed content.
///
/// `content` is the enriched text that was embedded; `content_hash` is the
/// hash of the original, unenriched chunk text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Owner of the chunk; every filter and bulk delete is scoped by it.
    pub user_id: String,
    pub repo: String,
    pub source_type: SourceType,
    pub path: Option<String>,
    pub pr_number: Option<u64>,
    pub head_sha: Option<String>,
    /// External identifier for non-file sources (e.g. a Notion page id).
    pub source_id: Option<String>,
    pub language: Option<String>,
    pub symbol: Option<String>,
    /// 1-based inclusive line span in the source text.
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub url: Option<String>,
    pub last_edited_time: Option<String>,
    pub content: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    pub embedding_model: String,
}

impl Chunk {
    /// The scope coordinates of this chunk (identity key minus the hash).
    pub fn scope(&self) -> ChunkScope {
        ChunkScope {
            user_id: self.user_id.clone(),
            repo: self.repo.clone(),
            source_type: self.source_type,
            locator: self.locator().map(str::to_string),
            pr_number: self.pr_number,
            head_sha: self.head_sha.clone(),
        }
    }

    /// `path` for file-scoped types, `source_id` otherwise.
    pub fn locator(&self) -> Option<&str> {
        if self.source_type.is_file_scoped() {
            self.path.as_deref()
        } else {
            self.source_id.as_deref()
        }
    }

    /// Deduplication digest; two chunks with the same digest are the same
    /// content at the same coordinates.
    pub fn identity(&self) -> String {
        self.scope().identity(&self.content_hash)
    }
}

/// Exact scope coordinates shared by all chunks of one indexed item.
///
/// Unlike [`ScopeFilters`], a `None` here is a value: a repository-level
/// chunk (`pr_number: None`) and a PR-overlay chunk of the same file are
/// different scopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkScope {
    pub user_id: String,
    pub repo: String,
    pub source_type: SourceType,
    pub locator: Option<String>,
    pub pr_number: Option<u64>,
    pub head_sha: Option<String>,
}

impl ChunkScope {
    /// Digest of the full identity key for `content_hash` in this scope.
    pub fn identity(&self, content_hash: &str) -> String {
        let pr = self.pr_number.map(|n| n.to_string()).unwrap_or_default();
        hash_parts([
            self.user_id.as_str(),
            self.repo.as_str(),
            self.source_type.as_str(),
            self.locator.as_deref().unwrap_or(""),
            pr.as_str(),
            self.head_sha.as_deref().unwrap_or(""),
            content_hash,
        ])
    }
}

/// Exact-match filters for a vector search. Unset fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScopeFilters {
    pub user_id: String,
    pub repo: Option<String>,
    pub pr_number: Option<u64>,
    pub head_sha: Option<String>,
}

impl ScopeFilters {
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if chunk.user_id != self.user_id {
            return false;
        }
        if let Some(repo) = &self.repo {
            if &chunk.repo != repo {
                return false;
            }
        }
        if let Some(pr) = self.pr_number {
            if chunk.pr_number != Some(pr) {
                return false;
            }
        }
        if let Some(sha) = &self.head_sha {
            if chunk.head_sha.as_deref() != Some(sha.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Which retrieval partition a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    PrOverlay,
    RepoDocs,
    Notion,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::PrOverlay => "pr_overlay",
            ScopeType::RepoDocs => "repo_docs",
            ScopeType::Notion => "notion",
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrieved chunk annotated with its scores.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    /// Store-assigned chunk id.
    pub id: String,
    pub chunk: Chunk,
    /// Similarity reported by the vector store.
    pub raw_score: f64,
    /// Min-max rescaled within the originating scope's result set.
    pub normalized_score: f64,
    /// `normalized_score × intent weight[source_type]`.
    pub weighted_score: f64,
    pub scope_type: ScopeType,
}

impl ScoredChunk {
    pub fn source_type(&self) -> SourceType {
        self.chunk.source_type
    }

    /// Key used to group chunks of the same document for diversity.
    pub fn doc_key(&self) -> &str {
        let chunk = &self.chunk;
        match chunk.source_type {
            SourceType::Code | SourceType::Diff | SourceType::RepoDoc => {
                chunk.path.as_deref().unwrap_or("unknown")
            }
            SourceType::Notion => chunk
                .url
                .as_deref()
                .filter(|u| !u.is_empty())
                .or(chunk.source_id.as_deref())
                .unwrap_or("unknown"),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A minimal chunk for tests; callers override the fields they care about.
    pub fn chunk(source_type: SourceType, path: &str, content: &str) -> Chunk {
        Chunk {
            user_id: "u1".to_string(),
            repo: "acme/api".to_string(),
            source_type,
            path: source_type.is_file_scoped().then(|| path.to_string()),
            pr_number: None,
            head_sha: None,
            source_id: (!source_type.is_file_scoped()).then(|| path.to_string()),
            language: None,
            symbol: None,
            start_line: None,
            end_line: None,
            url: None,
            last_edited_time: None,
            content: content.to_string(),
            content_hash: crate::hash::compute_content_hash(content),
            embedding: Vec::new(),
            embedding_model: "test".to_string(),
        }
    }

    pub fn scored(id: &str, chunk: Chunk, weighted: f64) -> ScoredChunk {
        ScoredChunk {
            id: id.to_string(),
            chunk,
            raw_score: weighted,
            normalized_score: weighted,
            weighted_score: weighted,
            scope_type: ScopeType::RepoDocs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::chunk;
    use super::*;

    #[test]
    fn test_source_type_roundtrip_str() {
        for st in SourceType::ALL {
            assert_eq!(st.as_str().parse::<SourceType>().unwrap(), st);
        }
        assert!("wiki".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_identity_differs_by_pr_scope() {
        let repo_level = chunk(SourceType::Code, "src/lib.rs", "fn a() {}");
        let mut pr_level = repo_level.clone();
        pr_level.pr_number = Some(7);
        pr_level.head_sha = Some("abc123".to_string());
        assert_ne!(repo_level.identity(), pr_level.identity());
    }

    #[test]
    fn test_identity_ignores_enriched_content() {
        let a = chunk(SourceType::Code, "src/lib.rs", "fn a() {}");
        let mut b = a.clone();
        b.content = "File: src/lib.rs\n\nfn a() {}".to_string();
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_doc_key_per_source_type() {
        let code = ScoredChunk {
            id: "1".into(),
            chunk: chunk(SourceType::Code, "src/auth.rs", "x"),
            raw_score: 0.0,
            normalized_score: 0.0,
            weighted_score: 0.0,
            scope_type: ScopeType::RepoDocs,
        };
        assert_eq!(code.doc_key(), "src/auth.rs");

        let mut page = chunk(SourceType::Notion, "page-1", "x");
        let mut notion = ScoredChunk {
            chunk: page.clone(),
            ..code.clone()
        };
        assert_eq!(notion.doc_key(), "page-1");

        page.url = Some("https://notion.so/page-1".to_string());
        notion.chunk = page;
        assert_eq!(notion.doc_key(), "https://notion.so/page-1");
    }

    #[test]
    fn test_filters_unset_fields_do_not_constrain() {
        let mut c = chunk(SourceType::Code, "a.py", "x");
        c.pr_number = Some(3);
        let filters = ScopeFilters {
            user_id: "u1".into(),
            repo: Some("acme/api".into()),
            ..Default::default()
        };
        assert!(filters.matches(&c));

        let pr_filters = ScopeFilters {
            pr_number: Some(4),
            ..filters.clone()
        };
        assert!(!pr_filters.matches(&c));

        let other_user = ScopeFilters {
            user_id: "u2".into(),
            ..filters
        };
        assert!(!other_user.matches(&c));
    }
}
