use chat_core::llm::{ChatError, ChatRequest, ChatStream, ModelClient};
use chat_core::{CookieSource, GenerationParameters, PromptFormatter, RolePrefixFormatter};
use futures::StreamExt;
use std::{collections::HashMap, sync::Arc};
use tracing::{error, info};

use super::config::{HuggingChatConfig, COOKIE_DOMAIN};
use super::conversation::{ConversationGuard, PendingCleanups};
use super::cookies::CookieFile;
use super::session::{normalize_proxy, Session};
use super::sse::token_stream;
use super::wire::{SendBody, SendOptions};

/// Streams generations from HuggingChat. Every call to
/// [`ModelClient::create`] opens its own session and conversation.
#[derive(Clone)]
pub struct HuggingChatClient {
    cfg: Arc<HuggingChatConfig>,
    cookies: Arc<dyn CookieSource>,
    formatter: Arc<dyn PromptFormatter>,
    pending: PendingCleanups,
}

/// Request inputs with defaults and collaborators resolved.
struct Prepared {
    model: String,
    prompt: String,
    stream: bool,
    proxy: Option<String>,
    cookies: HashMap<String, String>,
    params: GenerationParameters,
}

impl HuggingChatClient {
    pub fn new(cfg: HuggingChatConfig) -> Self {
        let cookies = CookieFile::new(cfg.cookie_path());
        Self {
            cfg: Arc::new(cfg),
            cookies: Arc::new(cookies),
            formatter: Arc::new(RolePrefixFormatter),
            pending: PendingCleanups::default(),
        }
    }

    pub fn with_cookie_source<C: CookieSource + 'static>(mut self, cookies: C) -> Self {
        self.cookies = Arc::new(cookies);
        self
    }

    pub fn with_formatter<F: PromptFormatter + 'static>(mut self, formatter: F) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    /// Waits for deletes of conversations whose streams were dropped early.
    /// Call before shutting the runtime down.
    pub async fn wait_for_cleanups(&self) {
        self.pending.wait().await;
    }

    fn prepare(&self, req: ChatRequest) -> Result<Prepared, ChatError> {
        let model = if req.model.trim().is_empty() {
            self.cfg.model.clone()
        } else {
            req.model
        };
        let proxy = req
            .proxy
            .or_else(|| self.cfg.proxy.clone())
            .filter(|p| !p.trim().is_empty())
            .map(|p| normalize_proxy(p.trim()));
        // An empty map counts as absent.
        let cookies = match req.cookies.filter(|c| !c.is_empty()) {
            Some(c) => c,
            None => self.cookies.cookies_for(COOKIE_DOMAIN)?,
        };
        let params = GenerationParameters::default().merged(&self.cfg.params.overlay(&req.params));
        Ok(Prepared {
            model,
            prompt: self.formatter.format(&req.messages),
            stream: req.stream,
            proxy,
            cookies,
            params,
        })
    }
}

impl ModelClient for HuggingChatClient {
    fn create(&self, request: ChatRequest) -> ChatStream<'static> {
        let this = self.clone();
        let s = async_stream::stream! {
            let plan = match this.prepare(request) {
                Ok(p) => p,
                Err(e) => { yield Err(e); return; }
            };
            let session = match Session::open(&this.cfg, plan.proxy.as_deref(), &plan.cookies) {
                Ok(s) => s,
                Err(e) => { yield Err(e); return; }
            };
            info!(target:"providers::huggingchat","start conversation model={} stream={} cookies={}", plan.model, plan.stream, plan.cookies.len());
            let id = match session.create_conversation(&plan.model).await {
                Ok(id) => id,
                Err(e) => {
                    error!(target:"providers::huggingchat","create conversation failed: {}", e);
                    yield Err(e);
                    return;
                }
            };
            let conversation = ConversationGuard::new(session.clone(), id, this.pending.clone());
            let body = SendBody {
                inputs: plan.prompt,
                parameters: plan.params,
                stream: plan.stream,
                options: SendOptions::from(&this.cfg.options),
            };

            let mut failure = None;
            if plan.stream {
                match session.generate_stream(conversation.id(), &body).await {
                    Ok(bytes) => {
                        let mut tokens = Box::pin(token_stream(bytes));
                        while let Some(item) = tokens.next().await {
                            match item {
                                Ok(text) => yield Ok(text),
                                Err(e) => { failure = Some(e); break; }
                            }
                        }
                    }
                    Err(e) => failure = Some(e),
                }
            } else {
                match session.generate(conversation.id(), &body).await {
                    Ok(text) => yield Ok(text),
                    Err(e) => failure = Some(e),
                }
            }

            let cleanup = conversation.release().await;
            if let Some(e) = failure {
                error!(target:"providers::huggingchat","generation failed: {}", e);
                yield Err(e);
            }
            if let Err(e) = cleanup {
                error!(target:"providers::huggingchat","{}", e);
                yield Err(e);
            }
        };
        Box::pin(s)
    }
}
