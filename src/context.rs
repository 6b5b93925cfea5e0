//! Source snippet extraction around the line a trace points at.
//!
//! Extraction fails soft: a missing or unreadable file, a non-UTF-8 file,
//! or a line number outside the file yields `None`, never an error.

use std::path::Path;

use crate::config::ContextConfig;
use crate::models::CodeContext;

const MARKER: &str = ">>> ";
const NO_MARKER: &str = "    ";

pub struct ContextExtractor {
    lines: usize,
}

impl ContextExtractor {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            lines: config.lines,
        }
    }

    /// Read `path` and render the `±lines` window around `line_number`
    /// (1-based), clamped to the file's bounds.
    pub fn extract(&self, path: &str, line_number: u32) -> Option<CodeContext> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(path, error = %e, "code context unavailable");
                return None;
            }
        };

        let snippet = render_window(&content, line_number as usize, self.lines)?;

        Some(CodeContext {
            file_path: path.to_string(),
            line_number,
            code_snippet: snippet,
            language: detect_language(path).to_string(),
        })
    }
}

/// Render lines `[line - radius, line + radius]` of `content`, marking
/// `line`. Returns `None` when `line` is not within `[1, total]`.
pub fn render_window(content: &str, line: usize, radius: usize) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    if line == 0 || line > lines.len() {
        return None;
    }

    let start = line.saturating_sub(radius).max(1);
    let end = (line + radius).min(lines.len());

    let rendered: Vec<String> = (start..=end)
        .map(|n| {
            let prefix = if n == line { MARKER } else { NO_MARKER };
            format!("{}{:>4} | {}", prefix, n, lines[n - 1].trim_end())
        })
        .collect();

    Some(rendered.join("\n"))
}

/// Language name from the file extension; `text` when unrecognized.
pub fn detect_language(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "py" => "python",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        "go" => "go",
        "rs" => "rust",
        "cpp" => "cpp",
        "c" => "c",
        "rb" => "ruby",
        "php" => "php",
        _ => "text",
    }
}
