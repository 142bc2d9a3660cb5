pub mod cookies;
pub mod params;
pub mod prompt;

pub use cookies::{CookieSource, StaticCookies};
pub use params::{GenerationParameters, ParamOverrides};
pub use prompt::{PromptFormatter, RolePrefixFormatter};

pub mod llm {
    use std::collections::HashMap;
    use std::pin::Pin;

    use futures::{Stream, StreamExt};
    use serde::{Deserialize, Serialize};
    use thiserror::Error;
    use tracing::warn;

    use crate::params::ParamOverrides;

    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        User,
        Assistant,
        System,
    }

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Message {
        pub role: Role,
        pub content: String,
    }

    impl Message {
        pub fn user<S: Into<String>>(s: S) -> Self {
            Self {
                role: Role::User,
                content: s.into(),
            }
        }
        pub fn assistant<S: Into<String>>(s: S) -> Self {
            Self {
                role: Role::Assistant,
                content: s.into(),
            }
        }
        pub fn system<S: Into<String>>(s: S) -> Self {
            Self {
                role: Role::System,
                content: s.into(),
            }
        }
    }

    /// One logical generation request.
    ///
    /// An empty `model` selects the provider's default model. When `cookies`
    /// is `None` the provider asks its cookie source instead.
    #[derive(Clone, Debug)]
    pub struct ChatRequest {
        pub model: String,
        pub messages: Vec<Message>,
        pub stream: bool,
        pub proxy: Option<String>,
        pub cookies: Option<HashMap<String, String>>,
        pub params: ParamOverrides,
    }

    impl ChatRequest {
        pub fn new<S: Into<String>>(model: S, messages: Vec<Message>) -> Self {
            Self {
                model: model.into(),
                messages,
                stream: true,
                proxy: None,
                cookies: None,
                params: ParamOverrides::default(),
            }
        }

        pub fn stream(mut self, stream: bool) -> Self {
            self.stream = stream;
            self
        }

        pub fn proxy<S: Into<String>>(mut self, proxy: S) -> Self {
            self.proxy = Some(proxy.into());
            self
        }

        pub fn cookies(mut self, cookies: HashMap<String, String>) -> Self {
            self.cookies = Some(cookies);
            self
        }

        pub fn params(mut self, params: ParamOverrides) -> Self {
            self.params = params;
            self
        }
    }

    #[derive(Error, Debug)]
    pub enum ChatError {
        #[error("connection: {0}")] Connection(String),
        #[error("protocol: {0}")] Protocol(String),
        #[error("upstream: {0}")] Upstream(String),
        #[error("cleanup of conversation {conversation_id} failed: {reason}")]
        Cleanup {
            conversation_id: String,
            reason: String,
        },
        #[error("invalid parameter: {0}")] InvalidParameter(String),
        #[error("config: {0}")] Config(String),
    }

    impl ChatError {
        /// Cleanup failures are reported next to a generation result, never
        /// in place of one.
        pub fn is_cleanup(&self) -> bool {
            matches!(self, ChatError::Cleanup { .. })
        }
    }

    /// Lazy, forward-only sequence of generated text fragments.
    pub type ChatStream<'a> = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send + 'a>>;

    #[derive(Debug)]
    pub struct Completion {
        pub text: String,
        pub cleanup_error: Option<ChatError>,
    }

    #[allow(async_fn_in_trait)]
    pub trait ModelClient: Send + Sync {
        fn create(&self, request: ChatRequest) -> ChatStream<'static>;

        /// Drains [`ModelClient::create`] into a single string.
        async fn complete(&self, request: ChatRequest) -> Result<Completion, ChatError> {
            let mut stream = self.create(request);
            let mut text = String::new();
            let mut cleanup_error = None;
            while let Some(item) = stream.next().await {
                match item {
                    Ok(fragment) => text.push_str(&fragment),
                    Err(e) if e.is_cleanup() => {
                        warn!(target: "chat_core", "{}", e);
                        cleanup_error = Some(e);
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(Completion {
                text,
                cleanup_error,
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use futures::stream;

        struct Canned(fn() -> Vec<Result<String, ChatError>>);

        impl ModelClient for Canned {
            fn create(&self, _request: ChatRequest) -> ChatStream<'static> {
                Box::pin(stream::iter((self.0)()))
            }
        }

        fn req() -> ChatRequest {
            ChatRequest::new("", vec![Message::user("hi")])
        }

        #[tokio::test]
        async fn complete_concatenates_fragments() {
            let client = Canned(|| vec![Ok("Hello".to_string()), Ok(" world".to_string())]);
            let done = client.complete(req()).await.unwrap();
            assert_eq!(done.text, "Hello world");
            assert!(done.cleanup_error.is_none());
        }

        #[tokio::test]
        async fn cleanup_failure_keeps_generated_text() {
            let client = Canned(|| {
                vec![
                    Ok("answer".to_string()),
                    Err(ChatError::Cleanup {
                        conversation_id: "c1".into(),
                        reason: "500".into(),
                    }),
                ]
            });
            let done = client.complete(req()).await.unwrap();
            assert_eq!(done.text, "answer");
            assert!(matches!(done.cleanup_error, Some(ChatError::Cleanup { .. })));
        }

        #[tokio::test]
        async fn generation_error_fails_the_call() {
            let client = Canned(|| {
                vec![
                    Ok("partial".to_string()),
                    Err(ChatError::Upstream("Model is overloaded".into())),
                ]
            });
            let err = client.complete(req()).await.unwrap_err();
            assert!(matches!(err, ChatError::Upstream(m) if m == "Model is overloaded"));
        }

        #[test]
        fn request_defaults_to_streaming() {
            let r = req();
            assert!(r.stream);
            assert!(r.cookies.is_none());
            assert!(!r.stream(false).stream);
        }

        #[test]
        fn roles_serialize_lowercase() {
            let v = serde_json::to_value(Message::system("be brief")).unwrap();
            assert_eq!(v["role"], "system");
        }
    }
}
