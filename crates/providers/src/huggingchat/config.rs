use anyhow::Context;
use chat_core::ParamOverrides;
use directories::BaseDirs;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_BASE_URL: &str = "https://huggingface.co/chat";
pub const DEFAULT_MODEL: &str = "OpenAssistant/oasst-sft-6-llama-30b-xor";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36";
/// Domain the session cookies are looked up under.
pub const COOKIE_DOMAIN: &str = ".huggingface.co";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HuggingChatFileConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub timeout_ms: Option<u64>,
    pub cookie_file: Option<PathBuf>,
    pub options: Option<FileOptions>,
    pub parameters: Option<ParamOverrides>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileOptions {
    pub id: Option<String>,
    pub response_id: Option<String>,
    pub web_search_id: Option<String>,
}

/// Fixed values sent in the `options` object of every generation call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestOptions {
    pub id: String,
    pub response_id: String,
    pub web_search_id: String,
}

impl Default for RequestOptions {
    fn default() -> Self {
        // Placeholder ids; the service has not been seen to require
        // per-request values.
        Self {
            id: "9e9b8bc4-6604-40c6-994e-8eb78fa32e37".to_string(),
            response_id: "04ce2602-3bea-45e8-8efc-cef00680376a".to_string(),
            web_search_id: String::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HuggingChatConfig {
    pub base_url: String,
    pub model: String,
    pub user_agent: String,
    pub proxy: Option<String>,
    /// Whole-request deadline applied to each HTTP call. `None` leaves
    /// timing to the caller.
    pub timeout: Option<Duration>,
    pub cookie_file: Option<PathBuf>,
    pub options: RequestOptions,
    /// Parameter overrides applied before per-request ones.
    pub params: ParamOverrides,
}

impl Default for HuggingChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            timeout: None,
            cookie_file: None,
            options: RequestOptions::default(),
            params: ParamOverrides::default(),
        }
    }
}

impl HuggingChatConfig {
    pub fn from_env_and_file() -> anyhow::Result<Self> {
        Self::load(Self::config_path().as_deref())
    }

    /// Defaults, then the TOML file at `path` if it exists, then environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Self::default();
        if let Some(path) = path {
            if path.exists() {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("read config file: {}", path.display()))?;
                let file = toml::from_str::<HuggingChatFileConfig>(&text)
                    .with_context(|| format!("parse config file: {}", path.display()))?;
                cfg.apply_file(file);
            }
        }
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn apply_file(&mut self, file: HuggingChatFileConfig) {
        if let Some(u) = file.base_url {
            self.base_url = u;
        }
        if let Some(m) = file.model {
            self.model = m;
        }
        if let Some(ua) = file.user_agent {
            self.user_agent = ua;
        }
        if let Some(p) = file.proxy {
            self.proxy = Some(p);
        }
        if let Some(t) = file.timeout_ms {
            self.timeout = Some(Duration::from_millis(t));
        }
        if let Some(c) = file.cookie_file {
            self.cookie_file = Some(c);
        }
        if let Some(o) = file.options {
            if let Some(id) = o.id {
                self.options.id = id;
            }
            if let Some(id) = o.response_id {
                self.options.response_id = id;
            }
            if let Some(id) = o.web_search_id {
                self.options.web_search_id = id;
            }
        }
        if let Some(p) = file.parameters {
            self.params = self.params.overlay(&p);
        }
    }

    fn apply_env(&mut self) {
        if let Ok(u) = env::var("HUGGINGCHAT_BASE_URL") {
            self.base_url = u;
        }
        if let Ok(m) = env::var("HUGGINGCHAT_MODEL") {
            self.model = m;
        }
        if let Ok(p) = env::var("HUGGINGCHAT_PROXY") {
            self.proxy = Some(p);
        } else if self.proxy.is_none() {
            self.proxy = env::var("HTTPS_PROXY")
                .ok()
                .or_else(|| env::var("HTTP_PROXY").ok());
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        Some(Self::config_dir()?.join("config.toml"))
    }

    /// Cookie file named in the config, or `cookies.toml` next to it.
    pub fn cookie_path(&self) -> Option<PathBuf> {
        self.cookie_file
            .clone()
            .or_else(|| Some(Self::config_dir()?.join("cookies.toml")))
    }

    fn config_dir() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        let p = if cfg!(target_os = "windows") {
            base.home_dir().join(".hfchat")
        } else {
            base.config_dir().join("hfchat")
        };
        Some(p)
    }
}
