//! Sensitive-data redaction for text that leaves the local machine.
//!
//! Rules run in a fixed order:
//!
//! 1. `api_key` / `token` / `password` / `secret` assignments (any case,
//!    `_` or `-` separators) → `key=***`
//! 2. `UPPER_SNAKE=value` where `UPPER_SNAKE` is set in the environment
//!    snapshot → `UPPER_SNAKE=***`
//! 3. IPv4 literals → `xxx.xxx.xxx.xxx`
//! 4. Every occurrence of the home directory that ends on a path component
//!    boundary → `~`
//!
//! Every rule is idempotent, so `redact(redact(x)) == redact(x)`. File paths
//! stay path-shaped and line numbers stay numeric, but parsing should still
//! happen on the original text.

use regex::{Captures, Regex};
use std::collections::HashSet;
use std::path::PathBuf;

pub const MASK: &str = "***";
pub const IP_PLACEHOLDER: &str = "xxx.xxx.xxx.xxx";

/// Characters that continue a path component. Used to keep the home
/// directory rule from matching a longer sibling directory.
fn is_component_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '~')
}

pub struct Redactor {
    secret_assignment: Regex,
    env_assignment: Regex,
    ipv4: Regex,
    home: Option<Regex>,
    live_env: HashSet<String>,
}

impl Redactor {
    /// Snapshot the current process environment and home directory.
    pub fn new() -> Self {
        Self::with_environment(std::env::vars(), dirs::home_dir())
    }

    /// Build a redactor from an explicit environment and home directory.
    ///
    /// Only variables with non-empty values count as live.
    pub fn with_environment<I>(vars: I, home: Option<PathBuf>) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let live_env = vars
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, _)| name)
            .collect();

        let home = home
            .and_then(|h| h.to_str().map(|s| s.trim_end_matches('/').to_string()))
            .filter(|h| !h.is_empty() && !h.contains('~'))
            .map(|h| {
                Regex::new(&regex::escape(&h)).expect("escaped home path is a valid regex")
            });

        Self {
            secret_assignment: Regex::new(
                r#"(?i)(api[_-]?key|token|password|secret)["\s]*[=:]["\s]*([^\s"']+)"#,
            )
            .expect("secret assignment regex is valid"),
            env_assignment: Regex::new(r#"\b([A-Z][A-Z0-9_]*)["\s]*=["\s]*([^\s"']+)"#)
                .expect("env assignment regex is valid"),
            ipv4: Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b")
                .expect("ipv4 regex is valid"),
            home,
            live_env,
        }
    }

    pub fn redact(&self, text: &str) -> String {
        let masked = self
            .secret_assignment
            .replace_all(text, |caps: &Captures<'_>| format!("{}={}", &caps[1], MASK));

        let masked = self
            .env_assignment
            .replace_all(&masked, |caps: &Captures<'_>| {
                let name = &caps[1];
                if self.live_env.contains(name) {
                    format!("{}={}", name, MASK)
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();

        let masked = self.ipv4.replace_all(&masked, IP_PLACEHOLDER).into_owned();

        match &self.home {
            Some(home) => collapse_home(home, &masked),
            None => masked,
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace the home directory with `~` wherever it occurs, including after
/// a scheme (`file:///home/u/...`) or nested in another path, but not when
/// the next character continues the last component (`/home/al` must not
/// match `/home/alice`).
fn collapse_home(home: &Regex, text: &str) -> String {
    home.replace_all(text, |caps: &Captures<'_>| {
        let end = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let continues = text[end..].chars().next().is_some_and(is_component_char);
        if continues {
            caps[0].to_string()
        } else {
            "~".to_string()
        }
    })
    .into_owned()
}
