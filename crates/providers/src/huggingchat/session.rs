use bytes::Bytes;
use chat_core::llm::ChatError;
use futures::{stream::BoxStream, StreamExt};
use reqwest::{header, Client, Response, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, error};
use url::Url;

use super::config::HuggingChatConfig;
use super::cookies::cookie_header;
use super::wire::{self, NewConversation, SendBody};

/// One HTTP session: shared cookies, user agent and proxy for the three calls
/// of a request.
#[derive(Clone)]
pub struct Session {
    http: Client,
    base_url: String,
}

impl Session {
    pub fn open(
        cfg: &HuggingChatConfig,
        proxy: Option<&str>,
        cookies: &HashMap<String, String>,
    ) -> Result<Self, ChatError> {
        let base = Url::parse(&cfg.base_url)
            .map_err(|e| ChatError::Config(format!("base url {}: {}", cfg.base_url, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ChatError::Config(format!("base url {}: not http(s)", cfg.base_url)));
        }
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&cfg.user_agent)
                .map_err(|e| ChatError::Config(format!("user agent: {}", e)))?,
        );
        if let Some(c) = cookie_header(cookies) {
            headers.insert(
                header::COOKIE,
                header::HeaderValue::from_str(&c)
                    .map_err(|e| ChatError::Config(format!("cookie header: {}", e)))?,
            );
        }
        let mut builder = Client::builder().default_headers(headers).use_rustls_tls();
        if let Some(t) = cfg.timeout {
            builder = builder.timeout(t);
        }
        builder = match proxy {
            Some(p) => {
                let p = normalize_proxy(p);
                let proxy = reqwest::Proxy::all(&p)
                    .map_err(|e| ChatError::Config(format!("proxy {}: {}", p, e)))?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };
        let http = builder
            .build()
            .map_err(|e| ChatError::Connection(format!("build http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn conversations_url(&self) -> String {
        format!("{}/conversation", self.base_url)
    }

    fn conversation_url(&self, id: &str) -> String {
        format!("{}/conversation/{}", self.base_url, id)
    }

    pub async fn create_conversation(&self, model: &str) -> Result<String, ChatError> {
        let resp = self
            .http
            .post(self.conversations_url())
            .json(&NewConversation { model })
            .send()
            .await
            .map_err(map_reqwest_err)?;
        let v = read_json(resp).await?;
        wire::conversation_id(&v)
    }

    pub async fn generate(&self, id: &str, body: &SendBody<'_>) -> Result<String, ChatError> {
        let resp = self
            .http
            .post(self.conversation_url(id))
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        let v = read_json(resp).await?;
        wire::generated_text(&v)
    }

    pub async fn generate_stream(
        &self,
        id: &str,
        body: &SendBody<'_>,
    ) -> Result<BoxStream<'static, Result<Bytes, ChatError>>, ChatError> {
        let resp = self
            .http
            .post(self.conversation_url(id))
            .header(header::ACCEPT, "text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(target:"providers::huggingchat","stream non-200 status={} body={:?}", status, text);
            if let Some(e) = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| wire::upstream_error(&v))
            {
                return Err(e);
            }
            return Err(status_err(status, &text));
        }
        Ok(resp
            .bytes_stream()
            .map(|r| r.map_err(map_reqwest_err))
            .boxed())
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<(), ChatError> {
        let cleanup = |reason: String| ChatError::Cleanup {
            conversation_id: id.to_string(),
            reason,
        };
        let resp = self
            .http
            .delete(self.conversation_url(id))
            .send()
            .await
            .map_err(|e| cleanup(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(cleanup(format!("{} {}", status.as_u16(), text)));
        }
        debug!(target:"providers::huggingchat","deleted conversation {}", id);
        Ok(())
    }
}

/// Completes a scheme-less proxy address with `http://`.
pub fn normalize_proxy(proxy: &str) -> String {
    if proxy.contains("://") {
        proxy.to_string()
    } else {
        format!("http://{}", proxy)
    }
}

async fn read_json(resp: Response) -> Result<Value, ChatError> {
    let status = resp.status();
    let text = resp.text().await.map_err(map_reqwest_err)?;
    match serde_json::from_str::<Value>(&text) {
        Ok(v) => Ok(v),
        Err(_) if !status.is_success() => Err(status_err(status, &text)),
        Err(e) => Err(ChatError::Protocol(format!("invalid JSON ({}): {}", e, text))),
    }
}

fn map_reqwest_err(e: reqwest::Error) -> ChatError {
    if e.is_decode() {
        ChatError::Protocol(e.to_string())
    } else {
        ChatError::Connection(e.to_string())
    }
}

fn status_err(status: StatusCode, body: &str) -> ChatError {
    ChatError::Protocol(format!("unexpected status {} {}", status.as_u16(), body))
}
