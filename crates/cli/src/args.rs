use std::{collections::HashMap, path::PathBuf, time::Duration};

use anyhow::{bail, Result};
use chat_core::llm::{ChatRequest, Message};
use chat_core::ParamOverrides;
use clap::Parser;

/// Chat with HuggingChat from the terminal
///
/// With a prompt, sends one request and prints the reply. Without one,
/// starts an interactive session; Ctrl-C stops the current reply.
#[derive(Parser, Debug)]
#[command(name = "hfchat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Prompt to send
    pub prompt: Vec<String>,

    /// Model id (defaults to the configured model)
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// HTTP proxy; `host:port` is read as `http://host:port`
    #[arg(short = 'x', long, value_name = "URL")]
    pub proxy: Option<String>,

    /// Wait for the whole reply instead of streaming tokens
    #[arg(long)]
    pub no_stream: bool,

    /// System message placed before the conversation
    #[arg(short = 's', long, value_name = "TEXT")]
    pub system: Option<String>,

    /// Session cookie, repeatable; replaces the cookie file lookup
    #[arg(short = 'c', long = "cookie", value_name = "NAME=VALUE")]
    pub cookies: Vec<String>,

    /// Generation parameter override, repeatable (e.g. temperature=0.7)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Configuration file
    #[arg(long, env = "HFCHAT_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Give up on a reply after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Log to stderr instead of the log file
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Args {
    pub fn prompt_text(&self) -> Option<String> {
        let p = self.prompt.join(" ");
        let p = p.trim();
        (!p.is_empty()).then(|| p.to_string())
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    fn cookie_map(&self) -> Result<Option<HashMap<String, String>>> {
        if self.cookies.is_empty() {
            return Ok(None);
        }
        let mut out = HashMap::new();
        for c in &self.cookies {
            let Some((name, value)) = c.split_once('=') else {
                bail!("cookie must be NAME=VALUE, got '{}'", c);
            };
            if name.trim().is_empty() {
                bail!("cookie name is empty in '{}'", c);
            }
            out.insert(name.trim().to_string(), value.trim().to_string());
        }
        Ok(Some(out))
    }

    fn overrides(&self) -> Result<ParamOverrides> {
        let mut o = ParamOverrides::default();
        for p in &self.params {
            o.set_pair(p)?;
        }
        Ok(o)
    }

    /// Request settings shared by every turn; messages are filled per turn.
    pub fn request_template(&self) -> Result<ChatRequest> {
        let mut req = ChatRequest::new(self.model.clone().unwrap_or_default(), Vec::new())
            .stream(!self.no_stream)
            .params(self.overrides()?);
        if let Some(p) = &self.proxy {
            req = req.proxy(p.clone());
        }
        if let Some(c) = self.cookie_map()? {
            req = req.cookies(c);
        }
        Ok(req)
    }

    pub fn initial_history(&self) -> Vec<Message> {
        self.system.iter().map(Message::system).collect()
    }
}
