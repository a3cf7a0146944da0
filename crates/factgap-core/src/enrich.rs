//! Deterministic chunk enrichment.
//!
//! Each chunk is embedded with a short header describing where it came
//! from (`File:`, `Diff for:`, `Doc:`, `Notion:`), joined to the chunk by a
//! blank line. Headers are derived from metadata and simple pattern
//! extraction only, so the same input always produces the same enriched
//! text. The content hash is always taken from
//! [`EnrichedChunk::original_content`], never from the enriched text.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Header lines kept when a prefix grows too long.
pub const MAX_PREFIX_LINES: usize = 20;
/// Import lines collected into a `Context:` block.
pub const MAX_IMPORT_LINES: usize = 10;
/// Only chunks starting at or before this line get a `Context:` block.
pub const CONTEXT_MAX_START_LINE: usize = 30;
/// Non-blank lines scanned for imports.
const IMPORT_SCAN_LINES: usize = 50;
const MAX_HUNK_HEADER_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedChunk {
    pub original_content: String,
    /// `prefix + "\n\n" + original_content`.
    pub enriched_content: String,
    pub prefix: String,
    /// Inputs the header was built from, for logging.
    pub metadata: BTreeMap<&'static str, String>,
}

impl EnrichedChunk {
    fn new(content: &str, prefix: String, metadata: BTreeMap<&'static str, String>) -> Self {
        Self {
            original_content: content.to_string(),
            enriched_content: format!("{prefix}\n\n{content}"),
            prefix,
            metadata,
        }
    }
}

fn meta<const N: usize>(pairs: [(&'static str, Option<String>); N]) -> BTreeMap<&'static str, String> {
    pairs
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
}

/// Location details for a code chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeContext<'a> {
    pub language: Option<&'a str>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    /// Whole file text, used to pull import lines for early chunks.
    pub full_file: Option<&'a str>,
    pub symbol: Option<&'a str>,
}

/// Header: `File:`, optional `Language:` and `Symbol:`, and for chunks that
/// start within the first 30 lines a `Context:` block of the file's imports.
pub fn enrich_code(content: &str, path: &str, ctx: &CodeContext<'_>) -> EnrichedChunk {
    let mut lines = vec![format!("File: {path}")];
    if let Some(lang) = ctx.language {
        lines.push(format!("Language: {lang}"));
    }
    if let Some(sym) = ctx.symbol {
        lines.push(format!("Symbol: {sym}"));
    }

    let early = matches!(ctx.start_line, Some(s) if s >= 1 && s <= CONTEXT_MAX_START_LINE);
    if let (true, Some(full)) = (early, ctx.full_file) {
        let imports = extract_imports(full, ctx.language);
        if !imports.is_empty() {
            lines.push("Context:".to_string());
            lines.extend(imports);
        }
    }

    lines.truncate(MAX_PREFIX_LINES);
    let prefix = lines.join("\n");

    EnrichedChunk::new(
        content,
        prefix,
        meta([
            ("path", Some(path.to_string())),
            ("language", ctx.language.map(str::to_string)),
            ("start_line", ctx.start_line.map(|n| n.to_string())),
            ("end_line", ctx.end_line.map(|n| n.to_string())),
            ("symbol", ctx.symbol.map(str::to_string)),
        ]),
    )
}

/// Header: `Diff for:` and `Hunk:`, each extracted from the diff text when
/// not supplied. Falls back to the bare prefix `Diff:`.
pub fn enrich_diff(content: &str, path: Option<&str>, hunk_header: Option<&str>) -> EnrichedChunk {
    let mut lines = Vec::new();

    if let Some(p) = path.map(str::to_string).or_else(|| extract_diff_path(content)) {
        lines.push(format!("Diff for: {p}"));
    }
    if let Some(h) = hunk_header
        .map(str::to_string)
        .or_else(|| extract_hunk_header(content))
    {
        lines.push(format!("Hunk: {h}"));
    }

    let prefix = if lines.is_empty() {
        "Diff:".to_string()
    } else {
        lines.join("\n")
    };

    EnrichedChunk::new(
        content,
        prefix,
        meta([
            ("path", path.map(str::to_string)),
            ("hunk_header", hunk_header.map(str::to_string)),
        ]),
    )
}

/// Header: `Doc: {path}`.
pub fn enrich_repo_doc(content: &str, path: &str) -> EnrichedChunk {
    EnrichedChunk::new(
        content,
        format!("Doc: {path}"),
        meta([("path", Some(path.to_string()))]),
    )
}

/// Header: `Notion: {title}` (or `Untitled`), optional `URL:` and
/// `Last edited:`.
pub fn enrich_notion(
    content: &str,
    title: Option<&str>,
    url: Option<&str>,
    last_edited: Option<&str>,
) -> EnrichedChunk {
    let mut lines = vec![format!(
        "Notion: {}",
        title.filter(|t| !t.is_empty()).unwrap_or("Untitled")
    )];
    if let Some(u) = url {
        lines.push(format!("URL: {u}"));
    }
    if let Some(t) = last_edited {
        lines.push(format!("Last edited: {t}"));
    }

    EnrichedChunk::new(
        content,
        lines.join("\n"),
        meta([
            ("title", title.map(str::to_string)),
            ("url", url.map(str::to_string)),
            ("last_edited_time", last_edited.map(str::to_string)),
        ]),
    )
}

fn import_patterns(language: Option<&str>) -> &'static [Regex] {
    static PYTHON: OnceLock<Vec<Regex>> = OnceLock::new();
    static JS: OnceLock<Vec<Regex>> = OnceLock::new();
    static RUST: OnceLock<Vec<Regex>> = OnceLock::new();
    static DEFAULT: OnceLock<Vec<Regex>> = OnceLock::new();

    let compile = |pats: &[&str]| -> Vec<Regex> {
        pats.iter()
            .map(|p| Regex::new(p).expect("static import pattern"))
            .collect()
    };

    match language.map(str::to_ascii_lowercase).as_deref() {
        Some("python" | "py") => {
            PYTHON.get_or_init(|| compile(&[r"^import\s+", r"^from\s+\S+\s+import"]))
        }
        Some("js" | "ts" | "javascript" | "typescript") => {
            JS.get_or_init(|| compile(&[r"^import\s+", r"^const\s+\w+\s*=\s*require\("]))
        }
        Some("rust" | "rs") => RUST.get_or_init(|| compile(&[r"^use\s+"])),
        _ => DEFAULT.get_or_init(|| compile(&[r"^import\s+"])),
    }
}

/// Up to [`MAX_IMPORT_LINES`] import lines (trimmed) from the first 50
/// non-blank lines of `full_file`.
pub fn extract_imports(full_file: &str, language: Option<&str>) -> Vec<String> {
    let patterns = import_patterns(language);
    full_file
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(IMPORT_SCAN_LINES)
        .filter(|l| patterns.iter().any(|p| p.is_match(l)))
        .take(MAX_IMPORT_LINES)
        .map(str::to_string)
        .collect()
}

/// File path from a `diff --git a/X b/...` or `+++ b/X` line.
pub fn extract_diff_path(diff: &str) -> Option<String> {
    static GIT: OnceLock<Regex> = OnceLock::new();
    static PLUS: OnceLock<Regex> = OnceLock::new();
    let git = GIT.get_or_init(|| Regex::new(r"diff --git a/(.+?) b/").expect("static diff pattern"));
    let plus = PLUS.get_or_init(|| Regex::new(r"\+\+\+ b/(.+)").expect("static diff pattern"));

    git.captures(diff)
        .or_else(|| plus.captures(diff))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end().to_string())
}

/// First `@@ -a,b +c,d @@ context` header, truncated to 100 characters.
pub fn extract_hunk_header(diff: &str) -> Option<String> {
    static HUNK: OnceLock<Regex> = OnceLock::new();
    let re = HUNK.get_or_init(|| {
        Regex::new(r"@@\s*-\d+(?:,\d+)?\s*\+\d+(?:,\d+)?\s*@@[^\n]*").expect("static hunk pattern")
    });
    re.find(diff)
        .map(|m| m.as_str().trim_end().chars().take(MAX_HUNK_HEADER_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PY_FILE: &str = "\"\"\"Billing.\"\"\"\n\nimport os\nfrom app.db import session\n\ndef charge():\n    pass\n";

    #[test]
    fn test_code_header_with_context() {
        let ctx = CodeContext {
            language: Some("python"),
            start_line: Some(1),
            end_line: Some(7),
            full_file: Some(PY_FILE),
            symbol: Some("charge"),
        };
        let e = enrich_code("def charge():\n    pass", "app/billing.py", &ctx);
        assert_eq!(
            e.prefix,
            "File: app/billing.py\nLanguage: python\nSymbol: charge\nContext:\nimport os\nfrom app.db import session"
        );
        assert_eq!(e.enriched_content, format!("{}\n\ndef charge():\n    pass", e.prefix));
        assert_eq!(e.original_content, "def charge():\n    pass");
    }

    #[test]
    fn test_code_header_late_chunk_has_no_context() {
        let ctx = CodeContext {
            language: Some("python"),
            start_line: Some(31),
            full_file: Some(PY_FILE),
            ..Default::default()
        };
        let e = enrich_code("x = 1", "a.py", &ctx);
        assert_eq!(e.prefix, "File: a.py\nLanguage: python");
    }

    #[test]
    fn test_code_prefix_capped() {
        let full: String = (0..30).map(|i| format!("import mod{i}\n")).collect();
        let ctx = CodeContext {
            language: Some("go"),
            start_line: Some(1),
            full_file: Some(&full),
            symbol: Some("main"),
            ..Default::default()
        };
        let e = enrich_code("x", "main.go", &ctx);
        // File, Language, Symbol, Context: + 10 imports
        assert_eq!(e.prefix.lines().count(), 14);
        assert!(e.prefix.lines().count() <= MAX_PREFIX_LINES);
    }

    #[test]
    fn test_rust_imports() {
        let src = "//! crate docs\nuse std::fmt;\nuse crate::models::Chunk;\nfn f() {}";
        assert_eq!(
            extract_imports(src, Some("rust")),
            vec!["use std::fmt;", "use crate::models::Chunk;"]
        );
    }

    #[test]
    fn test_diff_header_extracted() {
        let diff = "diff --git a/src/auth.py b/src/auth.py\n@@ -10,6 +10,9 @@ def login(user):\n+    audit(user)";
        let e = enrich_diff(diff, None, None);
        assert_eq!(
            e.prefix,
            "Diff for: src/auth.py\nHunk: @@ -10,6 +10,9 @@ def login(user):"
        );
    }

    #[test]
    fn test_diff_plus_path_and_bare_prefix() {
        assert_eq!(
            extract_diff_path("--- a/x.go\n+++ b/x.go\n").as_deref(),
            Some("x.go")
        );
        assert_eq!(enrich_diff("+ added line", None, None).prefix, "Diff:");
    }

    #[test]
    fn test_hunk_header_truncated() {
        let long = format!("@@ -1,2 +1,3 @@ {}", "z".repeat(200));
        assert_eq!(extract_hunk_header(&long).unwrap().chars().count(), 100);
    }

    #[test]
    fn test_repo_doc_and_notion() {
        assert_eq!(enrich_repo_doc("body", "docs/A.md").enriched_content, "Doc: docs/A.md\n\nbody");
        let n = enrich_notion("body", None, Some("https://notion.so/p"), Some("2024-01-01"));
        assert_eq!(
            n.prefix,
            "Notion: Untitled\nURL: https://notion.so/p\nLast edited: 2024-01-01"
        );
    }

    #[test]
    fn test_enrichment_is_deterministic() {
        let ctx = CodeContext {
            language: Some("python"),
            start_line: Some(3),
            full_file: Some(PY_FILE),
            ..Default::default()
        };
        assert_eq!(enrich_code("x", "a.py", &ctx), enrich_code("x", "a.py", &ctx));
    }
}
