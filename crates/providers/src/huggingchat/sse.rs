use bytes::{Bytes, BytesMut};
use chat_core::llm::ChatError;
use futures::{Stream, StreamExt};
use tracing::debug;

use super::wire::{decode_line, TokenChunk};

/// Splits a byte stream into `\n` terminated lines.
#[derive(Default)]
pub struct LineBuffer {
    buf: BytesMut,
    closed: bool,
}

impl LineBuffer {
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Marks end of input; a trailing unterminated line becomes available.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Next complete line without its `\n` or `\r\n` terminator.
    pub fn next_line(&mut self) -> Option<Result<String, ChatError>> {
        let raw = if let Some(pos) = twoway::find_bytes(&self.buf, b"\n") {
            let mut line = self.buf.split_to(pos + 1);
            line.truncate(pos);
            line.freeze()
        } else if self.closed && !self.buf.is_empty() {
            self.buf.split().freeze()
        } else {
            return None;
        };
        Some(to_line(raw))
    }
}

fn to_line(raw: Bytes) -> Result<String, ChatError> {
    let mut s = String::from_utf8(raw.to_vec())
        .map_err(|e| ChatError::Protocol(format!("invalid utf-8 in event stream: {}", e)))?;
    if s.ends_with('\r') {
        s.pop();
    }
    Ok(s)
}

/// Suppresses special tokens and left-trims the first visible one.
#[derive(Debug)]
pub struct TokenFilter {
    first: bool,
}

impl Default for TokenFilter {
    fn default() -> Self {
        Self { first: true }
    }
}

impl TokenFilter {
    pub fn accept(&mut self, chunk: TokenChunk) -> Option<String> {
        if chunk.special {
            return None;
        }
        if self.first {
            self.first = false;
            Some(chunk.text.trim_start().to_string())
        } else {
            Some(chunk.text)
        }
    }
}

/// Turns a raw event-stream body into visible text fragments. The first
/// error ends the stream.
pub fn token_stream<S>(mut body: S) -> impl Stream<Item = Result<String, ChatError>>
where
    S: Stream<Item = Result<Bytes, ChatError>> + Unpin,
{
    async_stream::stream! {
        let mut lines = LineBuffer::default();
        let mut filter = TokenFilter::default();
        let mut emitted = 0usize;
        loop {
            let finished = match body.next().await {
                Some(Ok(b)) => { lines.extend(&b); false }
                Some(Err(e)) => { yield Err(e); return; }
                None => { lines.close(); true }
            };
            while let Some(line) = lines.next_line() {
                let chunk = match line.and_then(|l| decode_line(&l)) {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) => continue,
                    Err(e) => { yield Err(e); return; }
                };
                if let Some(text) = filter.accept(chunk) {
                    emitted += 1;
                    yield Ok(text);
                }
            }
            if finished {
                debug!(target:"providers::huggingchat","event stream closed after {} tokens", emitted);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn body(parts: Vec<String>) -> impl Stream<Item = Result<Bytes, ChatError>> + Unpin {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
    }

    fn tok(text: &str, special: bool) -> String {
        format!(
            "data:{{\"token\":{{\"id\":1,\"text\":{},\"logprob\":0.0,\"special\":{}}}}}\n",
            serde_json::to_string(text).unwrap(),
            special
        )
    }

    async fn collect(parts: Vec<String>) -> Vec<Result<String, ChatError>> {
        token_stream(body(parts)).collect().await
    }

    #[tokio::test]
    async fn first_token_is_left_trimmed_only() {
        let out = collect(vec![tok(" Hello", false), tok(" world", false)]).await;
        let text: Vec<_> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(text, vec!["Hello", " world"]);
    }

    #[tokio::test]
    async fn special_tokens_are_dropped_and_do_not_count_as_first() {
        let out = collect(vec![
            tok("<s>", true),
            tok("  Hi", false),
            tok("</s>", true),
            tok(" there", false),
            tok("</s>", true),
        ])
        .await;
        let text: Vec<_> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(text, vec!["Hi", " there"]);
    }

    #[tokio::test]
    async fn lines_split_across_chunks_are_reassembled() {
        let whole = format!("{}\r\n: ping\n{}", tok(" a", false).trim_end(), tok("b", false));
        let (left, right) = whole.split_at(17);
        let out = collect(vec![left.to_string(), right.to_string()]).await;
        let text: Vec<_> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(text, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unterminated_final_line_is_processed() {
        let last = tok(" end", false);
        let out = collect(vec![last.trim_end().to_string()]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_deref().unwrap(), "end");
    }

    #[tokio::test]
    async fn missing_token_stops_the_stream() {
        let bad = "data:{\"generated_text\":\"x\"}\n".to_string();
        let out = collect(vec![tok("ok", false), bad, tok("never", false)]).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_deref().unwrap(), "ok");
        match &out[1] {
            Err(ChatError::Protocol(m)) => assert!(m.contains("{\"generated_text\":\"x\"}")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn transport_error_is_forwarded() {
        let body = stream::iter(vec![
            Ok(Bytes::from(tok("x", false))),
            Err(ChatError::Connection("reset".into())),
        ]);
        let out: Vec<_> = token_stream(body).collect().await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Err(ChatError::Connection(_))));
    }

    #[test]
    fn line_buffer_strips_terminators() {
        let mut lb = LineBuffer::default();
        lb.extend(b"one\r\ntwo\nthr");
        assert_eq!(lb.next_line().unwrap().unwrap(), "one");
        assert_eq!(lb.next_line().unwrap().unwrap(), "two");
        assert!(lb.next_line().is_none());
        lb.close();
        assert_eq!(lb.next_line().unwrap().unwrap(), "thr");
        assert!(lb.next_line().is_none());
    }
}
