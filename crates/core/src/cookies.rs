use std::collections::HashMap;

use crate::llm::ChatError;

/// Supplies pre-obtained session cookies for a domain such as
/// `.huggingface.co`.
pub trait CookieSource: Send + Sync {
    fn cookies_for(&self, domain: &str) -> Result<HashMap<String, String>, ChatError>;
}

/// In-memory cookies keyed by domain.
#[derive(Clone, Debug, Default)]
pub struct StaticCookies {
    domains: HashMap<String, HashMap<String, String>>,
}

impl StaticCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<D, N, V>(mut self, domain: D, name: N, value: V) -> Self
    where
        D: Into<String>,
        N: Into<String>,
        V: Into<String>,
    {
        self.domains
            .entry(domain.into())
            .or_default()
            .insert(name.into(), value.into());
        self
    }
}

impl CookieSource for StaticCookies {
    fn cookies_for(&self, domain: &str) -> Result<HashMap<String, String>, ChatError> {
        Ok(self.domains.get(domain).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_per_domain() {
        let c = StaticCookies::new()
            .with(".huggingface.co", "hf-chat", "abc")
            .with(".example.com", "sid", "zzz");
        let hf = c.cookies_for(".huggingface.co").unwrap();
        assert_eq!(hf.len(), 1);
        assert_eq!(hf["hf-chat"], "abc");
        assert!(c.cookies_for(".nowhere.org").unwrap().is_empty());
    }
}
