//! Source languages known to the chunker and their split boundaries.

use std::fmt;

/// Fallback boundaries: paragraphs, lines, words, characters.
pub const GENERIC_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Diff boundaries: hunks first, then lines.
pub const DIFF_SEPARATORS: &[&str] = &["\n@@ ", "\n", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Js,
    Ts,
    Go,
    Rust,
    Java,
    Ruby,
    Php,
    C,
    Cpp,
    CSharp,
    Kotlin,
    Swift,
    Scala,
    Markdown,
}

impl Language {
    /// Map a file extension (without the dot, any case) to a language.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let lang = match ext.to_ascii_lowercase().as_str() {
            "py" | "pyi" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::Js,
            "ts" | "tsx" | "mts" | "cts" => Language::Ts,
            "go" => Language::Go,
            "rs" => Language::Rust,
            "java" => Language::Java,
            "rb" => Language::Ruby,
            "php" => Language::Php,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" => Language::Cpp,
            "cs" => Language::CSharp,
            "kt" | "kts" => Language::Kotlin,
            "swift" => Language::Swift,
            "scala" => Language::Scala,
            "md" | "markdown" | "mdx" => Language::Markdown,
            _ => return None,
        };
        Some(lang)
    }

    /// Language of a repository path, judged by its extension.
    pub fn from_path(path: &str) -> Option<Self> {
        let file = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = file.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// Parse a language name as stored on chunks (`as_str` output) or a
    /// common alias.
    pub fn from_name(name: &str) -> Option<Self> {
        let lang = match name.to_ascii_lowercase().as_str() {
            "python" | "py" => Language::Python,
            "js" | "javascript" | "jsx" => Language::Js,
            "ts" | "typescript" | "tsx" => Language::Ts,
            "go" | "golang" => Language::Go,
            "rust" | "rs" => Language::Rust,
            "java" => Language::Java,
            "ruby" | "rb" => Language::Ruby,
            "php" => Language::Php,
            "c" => Language::C,
            "cpp" | "c++" => Language::Cpp,
            "csharp" | "c#" | "cs" => Language::CSharp,
            "kotlin" | "kt" => Language::Kotlin,
            "swift" => Language::Swift,
            "scala" => Language::Scala,
            "markdown" | "md" => Language::Markdown,
            _ => return None,
        };
        Some(lang)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Js => "js",
            Language::Ts => "ts",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Java => "java",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Kotlin => "kotlin",
            Language::Swift => "swift",
            Language::Scala => "scala",
            Language::Markdown => "markdown",
        }
    }

    /// Split boundaries in priority order, ending with the generic ones.
    pub fn separators(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["\nclass ", "\ndef ", "\n\tdef ", "\n\n", "\n", " ", ""],
            Language::Js => &[
                "\nfunction ", "\nconst ", "\nlet ", "\nvar ", "\nclass ", "\nif ", "\nfor ",
                "\nwhile ", "\nswitch ", "\ncase ", "\ndefault ", "\n\n", "\n", " ", "",
            ],
            Language::Ts => &[
                "\nenum ", "\ninterface ", "\nnamespace ", "\ntype ", "\nclass ", "\nfunction ",
                "\nconst ", "\nlet ", "\nvar ", "\nif ", "\nfor ", "\nwhile ", "\nswitch ",
                "\ncase ", "\ndefault ", "\n\n", "\n", " ", "",
            ],
            Language::Go => &[
                "\nfunc ", "\nvar ", "\nconst ", "\ntype ", "\nif ", "\nfor ", "\nswitch ",
                "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::Rust => &[
                "\nfn ", "\nconst ", "\nlet ", "\nif ", "\nwhile ", "\nfor ", "\nloop ",
                "\nmatch ", "\n\n", "\n", " ", "",
            ],
            Language::Java => &[
                "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\nstatic ", "\nif ",
                "\nfor ", "\nwhile ", "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::Ruby => &[
                "\ndef ", "\nclass ", "\nif ", "\nunless ", "\nwhile ", "\nfor ", "\ndo ",
                "\nbegin ", "\nrescue ", "\n\n", "\n", " ", "",
            ],
            Language::Php => &[
                "\nfunction ", "\nclass ", "\nif ", "\nforeach ", "\nwhile ", "\ndo ",
                "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::C | Language::Cpp => &[
                "\nclass ", "\nvoid ", "\nint ", "\nfloat ", "\ndouble ", "\nif ", "\nfor ",
                "\nwhile ", "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::CSharp => &[
                "\ninterface ", "\nenum ", "\nimplements ", "\ndelegate ", "\nevent ",
                "\nclass ", "\nabstract ", "\npublic ", "\nprotected ", "\nprivate ",
                "\nstatic ", "\nreturn ", "\nif ", "\ncontinue ", "\nfor ", "\nforeach ",
                "\nwhile ", "\nswitch ", "\nbreak ", "\ncase ", "\nelse ", "\ntry ",
                "\nthrow ", "\nfinally ", "\ncatch ", "\n\n", "\n", " ", "",
            ],
            Language::Kotlin => &[
                "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\ninternal ",
                "\ncompanion ", "\nfun ", "\nval ", "\nvar ", "\nif ", "\nfor ", "\nwhile ",
                "\nwhen ", "\ncase ", "\nelse ", "\n\n", "\n", " ", "",
            ],
            Language::Swift => &[
                "\nfunc ", "\nclass ", "\nstruct ", "\nenum ", "\nif ", "\nfor ", "\nwhile ",
                "\ndo ", "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::Scala => &[
                "\nclass ", "\nobject ", "\ndef ", "\nval ", "\nvar ", "\nif ", "\nfor ",
                "\nwhile ", "\nmatch ", "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::Markdown => &[
                "\n# ", "\n## ", "\n### ", "\n#### ", "\n##### ", "\n###### ", "```\n",
                "\n***\n", "\n---\n", "\n___\n", "\n\n", "\n", " ", "",
            ],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        assert_eq!(Language::from_path("src/app/main.PY"), Some(Language::Python));
        assert_eq!(Language::from_path("web/App.tsx"), Some(Language::Ts));
        assert_eq!(Language::from_path("Makefile"), None);
        assert_eq!(Language::from_path("v1.2/README"), None);
    }

    #[test]
    fn test_name_roundtrip() {
        for lang in [Language::Python, Language::CSharp, Language::Markdown] {
            assert_eq!(Language::from_name(lang.as_str()), Some(lang));
        }
    }

    #[test]
    fn test_separators_end_generic() {
        for lang in [Language::Go, Language::Scala, Language::Markdown] {
            let seps = lang.separators();
            assert_eq!(&seps[seps.len() - 4..], GENERIC_SEPARATORS);
        }
    }
}
