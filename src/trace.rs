//! Failure-trace parsing.
//!
//! A [`TraceParser`] holds an ordered table of [`Dialect`]s. Parsing tries
//! each dialect in registration order and returns the first extraction that
//! succeeds, so an earlier dialect wins whenever two patterns would match
//! the same text. New dialects are appended with [`TraceParser::register`]
//! and never change the precedence of the ones already present.
//!
//! # Built-in dialects
//!
//! | Order | Name | Language | Shape |
//! |-------|------|----------|-------|
//! | 1 | `python` | python | `File "app.py", line 42` |
//! | 2 | `node-frame` | javascript | `at fn (/src/app.js:42:10)` |
//! | 3 | `node-bare` | javascript | `at /src/app.js:42:10` |
//! | 4 | `java` | java | `at com.x.Main.run(Main.java:42)` |
//!
//! Line numbers are 1-based; one too large for `u32` is reported as
//! `u32::MAX` rather than rejected, so it cannot hand the trace to a later
//! dialect.
//!
//! The generic `node-bare` pattern can also match text that belongs to other
//! runtimes; table order decides, and no attempt is made to second-guess it.
//!
//! Parsing must run on the unredacted trace: redaction may rewrite path
//! prefixes that the extraction relies on.

use regex::{Captures, Regex};
use std::num::IntErrorKind;

use crate::models::{Language, ParsedTrace, SourceLocation};

/// Pulls a location out of a successful pattern match.
///
/// Returning `None` rejects the match and lets the next dialect try.
pub type Extractor = fn(&Captures<'_>) -> Option<SourceLocation>;

/// One entry in the dialect table: a matcher plus its extractor.
pub struct Dialect {
    name: &'static str,
    language: Language,
    pattern: Regex,
    extract: Extractor,
}

impl Dialect {
    pub fn new(
        name: &'static str,
        language: Language,
        pattern: &str,
        extract: Extractor,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            language,
            pattern: Regex::new(pattern)?,
            extract,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Only the first match of the pattern is considered.
    fn apply(&self, trace: &str) -> Option<SourceLocation> {
        let caps = self.pattern.captures(trace)?;
        (self.extract)(&caps)
    }
}

impl std::fmt::Debug for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialect")
            .field("name", &self.name)
            .field("language", &self.language)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

/// Parse a 1-based line number. Non-ASCII digits and zero are rejected; a
/// value too large for `u32` saturates to `u32::MAX`.
fn parse_line(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let line = match digits.parse::<u32>() {
        Ok(n) => n,
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => u32::MAX,
        Err(_) => return None,
    };
    (line > 0).then_some(line)
}

/// Extracts path from group 1 and a positive line number from group 2.
pub fn path_and_line(caps: &Captures<'_>) -> Option<SourceLocation> {
    let path = caps.get(1)?.as_str();
    let line = parse_line(caps.get(2)?.as_str())?;
    if path.is_empty() {
        return None;
    }
    Some(SourceLocation {
        path: path.to_string(),
        line,
    })
}

/// Like [`path_and_line`] but rejects `Object.<method>` pseudo-paths that
/// Node prints for anonymous frames.
fn node_bare_frame(caps: &Captures<'_>) -> Option<SourceLocation> {
    let loc = path_and_line(caps)?;
    if loc.path.starts_with("Object.") {
        return None;
    }
    Some(loc)
}

const BUILTIN_DIALECTS: &[(&str, Language, &str, Extractor)] = &[
    (
        "python",
        Language::Python,
        r#"File "([^"]+)", line (\d+)"#,
        path_and_line,
    ),
    (
        "node-frame",
        Language::Javascript,
        r"at .+ \(([^:]+):(\d+):\d+\)",
        path_and_line,
    ),
    (
        "node-bare",
        Language::Javascript,
        r"at ([^:]+):(\d+):\d+",
        node_bare_frame,
    ),
    (
        "java",
        Language::Java,
        r"at .+\(([^:]+):(\d+)\)",
        path_and_line,
    ),
];

/// Ordered, extensible dialect table.
#[derive(Debug)]
pub struct TraceParser {
    dialects: Vec<Dialect>,
}

impl TraceParser {
    /// Parser preloaded with the built-in dialects.
    pub fn new() -> Self {
        let mut parser = Self::empty();
        for (name, language, pattern, extract) in BUILTIN_DIALECTS {
            let dialect = Dialect::new(name, *language, pattern, *extract)
                .expect("built-in dialect patterns are valid regexes");
            parser.register(dialect);
        }
        parser
    }

    /// Parser with no dialects; every trace parses as unknown.
    pub fn empty() -> Self {
        Self {
            dialects: Vec::new(),
        }
    }

    /// Append a dialect after all existing ones.
    pub fn register(&mut self, dialect: Dialect) {
        self.dialects.push(dialect);
    }

    pub fn dialects(&self) -> impl Iterator<Item = &Dialect> {
        self.dialects.iter()
    }

    /// Return the first dialect extraction that succeeds, or an unknown
    /// result when none does. A trace with no actionable location is a
    /// normal outcome, not an error.
    pub fn parse(&self, trace: &str) -> ParsedTrace {
        for dialect in &self.dialects {
            if let Some(location) = dialect.apply(trace) {
                tracing::debug!(
                    dialect = dialect.name,
                    path = %location.path,
                    line = location.line,
                    "trace location extracted"
                );
                return ParsedTrace {
                    location: Some(location),
                    language: dialect.language,
                };
            }
        }
        ParsedTrace::unknown()
    }
}

impl Default for TraceParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(path: &str, line: u32) -> Option<SourceLocation> {
        Some(SourceLocation {
            path: path.to_string(),
            line,
        })
    }

    #[test]
    fn test_python_traceback() {
        let trace = "Traceback (most recent call last):\n  File \"app.py\", line 42, in <module>\n    main()\nNameError: name 'x' is not defined";
        let parsed = TraceParser::new().parse(trace);
        assert_eq!(parsed.location, loc("app.py", 42));
        assert_eq!(parsed.language, Language::Python);
    }

    #[test]
    fn test_python_first_frame_wins() {
        let trace = "  File \"/srv/a.py\", line 3, in f\n  File \"/srv/b.py\", line 9, in g\n";
        let parsed = TraceParser::new().parse(trace);
        assert_eq!(parsed.location, loc("/srv/a.py", 3));
    }

    #[test]
    fn test_node_named_frame() {
        let trace = "TypeError: x is not a function\n    at run (/home/dev/app/index.js:17:5)\n    at Module._compile (node:internal/modules/cjs/loader:1105:14)";
        let parsed = TraceParser::new().parse(trace);
        assert_eq!(parsed.location, loc("/home/dev/app/index.js", 17));
        assert_eq!(parsed.language, Language::Javascript);
    }

    #[test]
    fn test_node_bare_frame() {
        let trace = "Error: boom\n    at /srv/app/server.js:88:13";
        let parsed = TraceParser::new().parse(trace);
        assert_eq!(parsed.location, loc("/srv/app/server.js", 88));
        assert_eq!(parsed.language, Language::Javascript);
    }

    #[test]
    fn test_node_bare_rejects_object_pseudo_path() {
        let trace = "    at Object.<anonymous>:4:1";
        let parsed = TraceParser::new().parse(trace);
        assert_eq!(parsed, ParsedTrace::unknown());
    }

    #[test]
    fn test_java_frame() {
        let trace = "Exception in thread \"main\" java.lang.NullPointerException\n\tat com.example.Main.run(Main.java:27)\n\tat com.example.Main.main(Main.java:10)";
        let parsed = TraceParser::new().parse(trace);
        assert_eq!(parsed.location, loc("Main.java", 27));
        assert_eq!(parsed.language, Language::Java);
    }

    #[test]
    fn test_no_match_is_unknown() {
        let parsed = TraceParser::new().parse("make: *** [all] Error 2");
        assert_eq!(parsed.location, None);
        assert_eq!(parsed.language, Language::Unknown);
    }

    #[test]
    fn test_line_zero_never_matches() {
        let parsed = TraceParser::new().parse("File \"app.py\", line 0, in <module>");
        assert_eq!(parsed, ParsedTrace::unknown());
    }

    #[test]
    fn test_overlong_line_saturates_instead_of_falling_through() {
        let trace = "  File \"gen.py\", line 99999999999, in <module>\n    at run (/srv/app.js:3:1)";
        let parsed = TraceParser::new().parse(trace);
        assert_eq!(parsed.language, Language::Python);
        assert_eq!(parsed.location, loc("gen.py", u32::MAX));
    }

    #[test]
    fn test_line_number_parsing() {
        assert_eq!(parse_line("42"), Some(42));
        assert_eq!(parse_line("0042"), Some(42));
        assert_eq!(parse_line("000"), None);
        assert_eq!(parse_line("4294967296"), Some(u32::MAX));
        assert_eq!(parse_line("\u{0664}\u{0662}"), None);
        assert_eq!(parse_line(""), None);
    }

    #[test]
    fn test_earlier_dialect_wins_on_overlap() {
        // node-bare also matches here, with the mangled path "handler (/srv/app.js".
        let trace = "    at handler (/srv/app.js:12:7)";
        let parsed = TraceParser::new().parse(trace);
        assert_eq!(parsed.language, Language::Javascript);
        assert_eq!(parsed.location, loc("/srv/app.js", 12));
    }

    #[test]
    fn test_python_beats_later_dialects_in_same_trace() {
        let trace = "    at run (/srv/app.js:1:1)\n  File \"tool.py\", line 5, in <module>";
        let parsed = TraceParser::new().parse(trace);
        assert_eq!(parsed.language, Language::Python);
        assert_eq!(parsed.location, loc("tool.py", 5));
    }

    #[test]
    fn test_registered_dialect_appends_without_reordering() {
        let mut parser = TraceParser::new();
        let go_frame = Dialect::new(
            "go-frame",
            Language::Unknown,
            r"(?m)^\s+(\S+\.go):(\d+)",
            path_and_line,
        )
        .unwrap();
        parser.register(go_frame);

        let names: Vec<&str> = parser.dialects().map(|d| d.name()).collect();
        assert_eq!(names, ["python", "node-frame", "node-bare", "java", "go-frame"]);

        let parsed = parser.parse("panic: boom\n\nmain.main()\n\t/tmp/app/main.go:12 +0x1d");
        assert_eq!(parsed.location, loc("/tmp/app/main.go", 12));

        // An existing dialect still takes precedence when both match.
        let parsed = parser.parse("File \"a.py\", line 2\n\t/tmp/app/main.go:12 +0x1d");
        assert_eq!(parsed.language, Language::Python);
    }

    #[test]
    fn test_generic_node_pattern_claims_rust_panics() {
        // Known misclassification: the bare "at path:line:col" shape is shared.
        let mut parser = TraceParser::new();
        parser.register(
            Dialect::new(
                "rust-panic",
                Language::Unknown,
                r"panicked at ([^:]+):(\d+):\d+",
                path_and_line,
            )
            .unwrap(),
        );
        let parsed = parser.parse("thread 'main' panicked at src/main.rs:4:5:\nboom");
        assert_eq!(parsed.language, Language::Javascript);
        assert_eq!(parsed.location, loc("src/main.rs", 4));
    }

    #[test]
    fn test_empty_parser_returns_unknown() {
        let parsed = TraceParser::empty().parse("File \"app.py\", line 42");
        assert_eq!(parsed, ParsedTrace::unknown());
    }
}
