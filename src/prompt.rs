//! Transformation catalogue
//!
//! Each kind pairs a system prompt with a rule for which loaded files go into
//! the user prompt. `Refactor` is the only kind whose answer replaces a file;
//! the rest produce a single text report over the batch.

use crate::util::truncate_for_context;
use crate::workspace::LoadedFile;
use regex::Regex;
use std::sync::OnceLock;

const REFACTOR_FILE_SYSTEM: &str = "You are a senior engineer. Refactor the following file. \
Return ONLY the updated file content. Do not wrap in markdown fences.";

/// What to ask the model for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformKind {
    Refactor,
    Analyze,
    Document,
    Format,
    Tests,
    Comments,
    Summarize,
    /// Free-form instruction from the user
    Custom(String),
}

impl TransformKind {
    /// Parse a kind name; `custom` takes its instruction separately.
    pub fn parse(name: &str, custom_prompt: Option<&str>) -> Option<Self> {
        let kind = match name.trim().to_lowercase().as_str() {
            "refactor" => TransformKind::Refactor,
            "analyze" | "analyse" => TransformKind::Analyze,
            "docs" | "document" | "docgen" => TransformKind::Document,
            "format" => TransformKind::Format,
            "tests" | "test" => TransformKind::Tests,
            "comments" => TransformKind::Comments,
            "summarize" | "summary" => TransformKind::Summarize,
            "custom" => TransformKind::Custom(custom_prompt.unwrap_or_default().to_string()),
            _ => return None,
        };
        Some(kind)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransformKind::Refactor => "refactor",
            TransformKind::Analyze => "analyze",
            TransformKind::Document => "document",
            TransformKind::Format => "format",
            TransformKind::Tests => "tests",
            TransformKind::Comments => "comments",
            TransformKind::Summarize => "summarize",
            TransformKind::Custom(_) => "custom",
        }
    }

    /// System prompt for a report over several files
    pub fn system_prompt(&self) -> &'static str {
        match self {
            TransformKind::Refactor => {
                "You are a senior engineer. Refactor the code for clarity, maintainability, and performance. Return updated code and rationale."
            }
            TransformKind::Analyze => {
                "You are a code analyst. Identify architecture, dependencies, risks, and improvement opportunities."
            }
            TransformKind::Document => {
                "You are a technical writer. Generate a README and API docs in markdown."
            }
            TransformKind::Format => {
                "You are a formatter. Apply idiomatic formatting and consistent style. Return only formatted code."
            }
            TransformKind::Tests => {
                "You are a test engineer. Propose unit tests with structure and edge cases."
            }
            TransformKind::Comments => {
                "You are a maintainer. Add concise, high-signal comments and docstrings."
            }
            TransformKind::Summarize => "You summarize projects for clarity and actionability.",
            TransformKind::Custom(_) => "You are a helpful code assistant.",
        }
    }

    /// How many of the loaded files a report includes, `None` for all
    pub fn file_limit(&self) -> Option<usize> {
        match self {
            TransformKind::Refactor
            | TransformKind::Format
            | TransformKind::Tests
            | TransformKind::Comments => Some(5),
            TransformKind::Analyze | TransformKind::Document => Some(8),
            TransformKind::Summarize | TransformKind::Custom(_) => None,
        }
    }

    /// User prompt for a report over `files`, each truncated to `limit`
    /// characters.
    pub fn report_prompt(&self, files: &[LoadedFile], limit: usize) -> String {
        let take = self.file_limit().unwrap_or(files.len());
        let context = build_context(&files[..take.min(files.len())], limit);
        match self {
            TransformKind::Summarize => format!("Summarize this project:\n\n{context}"),
            TransformKind::Custom(prompt) => {
                format!("{}\n\nProject Context:\n{context}", prompt.trim())
            }
            _ => context,
        }
    }
}

/// `"{name}:\n{content}"` blocks separated by a blank line.
pub fn build_context(files: &[LoadedFile], limit: usize) -> String {
    files
        .iter()
        .map(|f| format!("{}:\n{}", f.name, truncate_for_context(&f.content, limit)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System and user prompt asking for a rewritten version of one file.
pub fn refactor_file_prompt(file: &LoadedFile) -> (&'static str, String) {
    (REFACTOR_FILE_SYSTEM, format!("{}:\n{}", file.name, file.content))
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)\A```[^\n]*\n(.*?)\n?```\s*\z").expect("fence pattern is valid")
    })
}

/// Unwrap an answer that arrived inside a single markdown code fence despite
/// being asked not to. Anything else is returned unchanged.
pub fn strip_code_fence(answer: &str) -> &str {
    match fence_regex().captures(answer.trim()) {
        Some(caps) => caps.get(1).map_or(answer, |m| m.as_str()),
        None => answer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::TRUNCATION_MARKER;

    fn file(name: &str, content: &str) -> LoadedFile {
        LoadedFile {
            name: name.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!(TransformKind::parse("Analyze", None), Some(TransformKind::Analyze));
        assert_eq!(TransformKind::parse("docs", None), Some(TransformKind::Document));
        assert_eq!(
            TransformKind::parse("custom", Some("find bugs")),
            Some(TransformKind::Custom("find bugs".into()))
        );
        assert_eq!(TransformKind::parse("deploy", None), None);
    }

    #[test]
    fn test_context_format() {
        let files = [file("a.rs", "fn a() {}"), file("b.rs", "fn b() {}")];
        assert_eq!(build_context(&files, 100), "a.rs:\nfn a() {}\n\nb.rs:\nfn b() {}");
    }

    #[test]
    fn test_report_respects_file_limit() {
        let files: Vec<_> = (0..10).map(|i| file(&format!("f{i}.rs"), "x")).collect();
        let prompt = TransformKind::Tests.report_prompt(&files, 100);
        assert!(prompt.contains("f4.rs:"));
        assert!(!prompt.contains("f5.rs:"));

        let prompt = TransformKind::Analyze.report_prompt(&files, 100);
        assert!(prompt.contains("f7.rs:"));
        assert!(!prompt.contains("f8.rs:"));

        let prompt = TransformKind::Summarize.report_prompt(&files, 100);
        assert!(prompt.starts_with("Summarize this project:\n\nf0.rs:"));
        assert!(prompt.contains("f9.rs:"));
    }

    #[test]
    fn test_custom_prompt_layout() {
        let prompt = TransformKind::Custom("  explain  ".into()).report_prompt(&[file("a", "b")], 100);
        assert_eq!(prompt, "explain\n\nProject Context:\na:\nb");
    }

    #[test]
    fn test_context_truncates_each_file() {
        let big = "y".repeat(70_000);
        let prompt = build_context(&[file("big.txt", &big)], 60_000);
        assert_eq!(
            prompt,
            format!("big.txt:\n{}{}", "y".repeat(60_000), TRUNCATION_MARKER)
        );
    }

    #[test]
    fn test_refactor_file_prompt() {
        let (system, user) = refactor_file_prompt(&file("src/a.rs", "fn a() {}"));
        assert!(system.contains("Return ONLY the updated file content"));
        assert_eq!(user, "src/a.rs:\nfn a() {}");
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```rust\nfn a() {}\n```"), "fn a() {}");
        assert_eq!(strip_code_fence("```\nline1\nline2\n```\n"), "line1\nline2");
        assert_eq!(strip_code_fence("fn a() {}"), "fn a() {}");
        // Fences in the middle of an answer are left alone
        let mixed = "text\n```\ncode\n```";
        assert_eq!(strip_code_fence(mixed), mixed);
    }
}
