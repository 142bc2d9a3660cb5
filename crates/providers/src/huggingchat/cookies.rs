use chat_core::{llm::ChatError, CookieSource};
use std::{collections::HashMap, fs, path::PathBuf};
use tracing::debug;

/// Cookies read from a TOML file with one table per domain:
///
/// ```toml
/// [".huggingface.co"]
/// hf-chat = "..."
/// token = "..."
/// ```
///
/// The file is read on every lookup so refreshed cookies are picked up
/// without a restart. A missing file means no cookies.
#[derive(Clone, Debug)]
pub struct CookieFile {
    path: Option<PathBuf>,
}

impl CookieFile {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl CookieSource for CookieFile {
    fn cookies_for(&self, domain: &str) -> Result<HashMap<String, String>, ChatError> {
        let Some(path) = &self.path else {
            return Ok(HashMap::new());
        };
        if !path.exists() {
            debug!(target:"providers::huggingchat","no cookie file at {}", path.display());
            return Ok(HashMap::new());
        }
        let text = fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("read {}: {}", path.display(), e)))?;
        let mut all: HashMap<String, HashMap<String, String>> = toml::from_str(&text)
            .map_err(|e| ChatError::Config(format!("parse {}: {}", path.display(), e)))?;
        Ok(all.remove(domain).unwrap_or_default())
    }
}

/// Renders a cookie map as a single `Cookie` header value, sorted by name.
pub fn cookie_header(cookies: &HashMap<String, String>) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    let mut pairs: Vec<_> = cookies.iter().collect();
    pairs.sort();
    Some(
        pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; "),
    )
}
