//! Best-effort symbol extraction.
//!
//! Finds the first function/class/type declaration in a chunk with a small
//! per-language regex table. No parsing; a chunk that opens mid-body simply
//! reports whatever declaration appears first, or nothing.

use std::sync::OnceLock;

use regex::Regex;

/// Canonical language keys that have a pattern table.
fn canonical(language: &str) -> Option<&'static str> {
    match language.to_ascii_lowercase().as_str() {
        "python" | "py" => Some("python"),
        "js" | "jsx" | "javascript" => Some("js"),
        "ts" | "tsx" | "typescript" => Some("ts"),
        "go" => Some("go"),
        "java" => Some("java"),
        "rust" | "rs" => Some("rust"),
        _ => None,
    }
}

fn pattern_table() -> &'static [(&'static str, Vec<Regex>)] {
    static TABLE: OnceLock<Vec<(&'static str, Vec<Regex>)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let build = |pats: &[&str]| -> Vec<Regex> {
            pats.iter()
                .map(|p| Regex::new(p).expect("static symbol pattern"))
                .collect()
        };
        vec![
            (
                "python",
                build(&[r"^(?:async\s+)?def\s+(\w+)", r"^class\s+(\w+)"]),
            ),
            (
                "js",
                build(&[
                    r"^(?:export\s+)?(?:default\s+)?(?:async\s+)?function\*?\s+(\w+)",
                    r"^(?:export\s+)?(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s+)?(?:\(|function)",
                    r"^(?:export\s+)?(?:default\s+)?class\s+(\w+)",
                ]),
            ),
            (
                "ts",
                build(&[
                    r"^(?:export\s+)?(?:default\s+)?(?:async\s+)?function\*?\s+(\w+)",
                    r"^(?:export\s+)?(?:const|let|var)\s+(\w+)\s*(?::[^=]+)?=",
                    r"^(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(\w+)",
                    r"^(?:export\s+)?interface\s+(\w+)",
                    r"^(?:export\s+)?type\s+(\w+)\s*(?:<[^>]*>)?\s*=",
                ]),
            ),
            (
                "go",
                build(&[
                    r"^func\s+(?:\([^)]+\)\s+)?(\w+)",
                    r"^type\s+(\w+)\s+struct",
                    r"^type\s+(\w+)\s+interface",
                ]),
            ),
            (
                "java",
                build(&[
                    r"^(?:public|private|protected)\s+(?:(?:static|final|abstract|synchronized)\s+)*(?:<[^>]+>\s+)?[\w<>\[\],.?]+\s+(\w+)\s*\(",
                    r"^(?:public\s+)?(?:(?:abstract|final|static)\s+)*class\s+(\w+)",
                    r"^(?:public\s+)?interface\s+(\w+)",
                    r"^(?:public\s+)?enum\s+(\w+)",
                ]),
            ),
            (
                "rust",
                build(&[
                    r#"^(?:pub(?:\([^)]*\))?\s+)?(?:(?:const|async|unsafe)\s+)*(?:extern\s+"[^"]*"\s+)?fn\s+(\w+)"#,
                    r"^(?:pub(?:\([^)]*\))?\s+)?struct\s+(\w+)",
                    r"^(?:pub(?:\([^)]*\))?\s+)?enum\s+(\w+)",
                    r"^(?:pub(?:\([^)]*\))?\s+)?(?:unsafe\s+)?trait\s+(\w+)",
                ]),
            ),
        ]
    })
}

/// Return the first declared symbol name in `content`, if the language is
/// supported and any line (trimmed) matches one of its patterns.
pub fn extract_symbol(content: &str, language: Option<&str>) -> Option<String> {
    let key = canonical(language?)?;
    let patterns = pattern_table()
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, p)| p)?;

    content.lines().map(str::trim).find_map(|line| {
        patterns
            .iter()
            .find_map(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_def_and_class() {
        let src = "    # helper\n    async def load_user(id):\n        pass\n";
        assert_eq!(extract_symbol(src, Some("python")).as_deref(), Some("load_user"));
        assert_eq!(
            extract_symbol("class Repo(Base):\n    pass", Some("py")).as_deref(),
            Some("Repo")
        );
    }

    #[test]
    fn test_typescript_exports() {
        let src = "import x from 'y'\nexport interface Props {\n  a: string\n}";
        assert_eq!(extract_symbol(src, Some("tsx")).as_deref(), Some("Props"));
        let arrow = "export const handler = async (req) => {}";
        assert_eq!(extract_symbol(arrow, Some("ts")).as_deref(), Some("handler"));
    }

    #[test]
    fn test_go_method_receiver() {
        let src = "func (s *Server) Serve(l net.Listener) error {";
        assert_eq!(extract_symbol(src, Some("go")).as_deref(), Some("Serve"));
    }

    #[test]
    fn test_java_ignores_call_statements() {
        let src = "return compute(x);\npublic static int compute(int x) {";
        assert_eq!(extract_symbol(src, Some("java")).as_deref(), Some("compute"));
        assert_eq!(
            extract_symbol("public final class Billing {", Some("java")).as_deref(),
            Some("Billing")
        );
        assert_eq!(extract_symbol("foo.bar(1);", Some("java")), None);
    }

    #[test]
    fn test_rust_visibility_and_qualifiers() {
        assert_eq!(
            extract_symbol("pub(crate) async fn fetch() {}", Some("rust")).as_deref(),
            Some("fetch")
        );
        assert_eq!(
            extract_symbol("pub unsafe trait Raw {}", Some("rs")).as_deref(),
            Some("Raw")
        );
    }

    #[test]
    fn test_unsupported_or_missing_language() {
        assert_eq!(extract_symbol("def f(): pass", None), None);
        assert_eq!(extract_symbol("def f(): pass", Some("ruby")), None);
        assert_eq!(extract_symbol("x = 1", Some("python")), None);
    }
}
