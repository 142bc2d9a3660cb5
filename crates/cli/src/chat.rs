use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chat_core::llm::{ChatError, ChatRequest, ChatStream, Message, ModelClient};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Text of one finished reply, plus a failed delete if there was one.
#[derive(Debug)]
pub struct Reply {
    pub text: String,
    pub cleanup_error: Option<ChatError>,
}

#[derive(Debug)]
pub enum TurnEnd {
    Finished(Reply),
    Interrupted,
    TimedOut,
    /// Stdout stopped accepting text (for example a closed pipe).
    OutputClosed,
}

/// Prints fragments as they arrive. A generation error still lets the stream
/// finish so its cleanup result is not lost. A failed write ends the turn and
/// drops the stream.
async fn pump<W: Write>(mut stream: ChatStream<'_>, out: &mut W) -> Result<TurnEnd, ChatError> {
    let mut text = String::new();
    let mut failure = None;
    let mut cleanup_error = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                if let Err(e) = write!(out, "{}", fragment).and_then(|_| out.flush()) {
                    warn!("stdout closed: {}", e);
                    return Ok(TurnEnd::OutputClosed);
                }
                text.push_str(&fragment);
            }
            Err(e) if e.is_cleanup() => cleanup_error = Some(e),
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }
    match failure {
        Some(e) => {
            if let Some(c) = cleanup_error {
                warn!("{}", c);
            }
            Err(e)
        }
        None => Ok(TurnEnd::Finished(Reply {
            text,
            cleanup_error,
        })),
    }
}

/// Races the reply against `interrupt` and the optional deadline. Losing the
/// race drops the stream, which deletes the conversation in the background.
pub async fn run_turn<W, I>(
    stream: ChatStream<'_>,
    out: &mut W,
    deadline: Option<Duration>,
    interrupt: I,
) -> Result<TurnEnd, ChatError>
where
    W: Write,
    I: Future<Output = ()>,
{
    let timer = async {
        match deadline {
            Some(d) => tokio::time::sleep(d).await,
            None => futures::future::pending::<()>().await,
        }
    };
    tokio::select! {
        r = pump(stream, out) => r,
        _ = interrupt => Ok(TurnEnd::Interrupted),
        _ = timer => Ok(TurnEnd::TimedOut),
    }
}

async fn ctrl_c() {
    let _ = tokio::signal::ctrl_c().await;
}

fn report_cleanup(reply: &Reply) {
    if let Some(e) = &reply.cleanup_error {
        eprintln!("warning: {}", e);
    }
}

/// Sends one prompt and prints the reply. Returns the process exit status.
pub async fn one_shot<C: ModelClient>(
    client: &C,
    template: ChatRequest,
    mut history: Vec<Message>,
    prompt: String,
    deadline: Option<Duration>,
) -> Result<u8> {
    history.push(Message::user(prompt));
    let req = ChatRequest {
        messages: history,
        ..template
    };
    let mut out = std::io::stdout();
    match run_turn(client.create(req), &mut out, deadline, ctrl_c()).await? {
        TurnEnd::Finished(reply) => {
            println!();
            report_cleanup(&reply);
            Ok(0)
        }
        TurnEnd::Interrupted => {
            println!();
            info!("interrupted");
            Ok(130)
        }
        TurnEnd::OutputClosed => Ok(0),
        TurnEnd::TimedOut => Err(anyhow!(
            "no complete reply within {}s",
            deadline.map(|d| d.as_secs()).unwrap_or_default()
        )),
    }
}

/// Line-oriented chat. The history grows with each finished exchange;
/// `/reset` drops it back to the system message and `/exit` quits.
pub async fn interactive<C: ModelClient>(
    client: &C,
    template: ChatRequest,
    initial: Vec<Message>,
    deadline: Option<Duration>,
) -> Result<u8> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history = initial.clone();
    let mut out = std::io::stdout();
    loop {
        print!("> ");
        let _ = out.flush();
        let line = tokio::select! {
            l = lines.next_line() => l?,
            _ = ctrl_c() => { println!(); break; }
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/exit" | "/quit" => break,
            "/reset" => {
                history = initial.clone();
                continue;
            }
            _ => {}
        }

        history.push(Message::user(line));
        let req = ChatRequest {
            messages: history.clone(),
            ..template.clone()
        };
        match run_turn(client.create(req), &mut out, deadline, ctrl_c()).await {
            Ok(TurnEnd::Finished(reply)) => {
                println!();
                report_cleanup(&reply);
                history.push(Message::assistant(reply.text));
            }
            Ok(TurnEnd::Interrupted) => {
                println!("\n[interrupted]");
                history.pop();
            }
            Ok(TurnEnd::OutputClosed) => break,
            Ok(TurnEnd::TimedOut) => {
                println!();
                eprintln!("error: no complete reply in time");
                history.pop();
            }
            Err(e) => {
                println!();
                eprintln!("error: {}", e);
                history.pop();
            }
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn canned(items: Vec<Result<String, ChatError>>) -> ChatStream<'static> {
        Box::pin(stream::iter(items))
    }

    fn cleanup_err() -> ChatError {
        ChatError::Cleanup {
            conversation_id: "c1".into(),
            reason: "500".into(),
        }
    }

    #[tokio::test]
    async fn fragments_are_printed_and_collected() {
        let mut out = Vec::new();
        let end = run_turn(
            canned(vec![Ok("Hel".into()), Ok("lo".into())]),
            &mut out,
            None,
            futures::future::pending(),
        )
        .await
        .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Hello");
        match end {
            TurnEnd::Finished(r) => {
                assert_eq!(r.text, "Hello");
                assert!(r.cleanup_error.is_none());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn cleanup_failure_keeps_the_reply() {
        let mut out = Vec::new();
        let end = run_turn(
            canned(vec![Ok("done".into()), Err(cleanup_err())]),
            &mut out,
            None,
            futures::future::pending(),
        )
        .await
        .unwrap();
        match end {
            TurnEnd::Finished(r) => {
                assert_eq!(r.text, "done");
                assert!(r.cleanup_error.unwrap().is_cleanup());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn generation_error_wins_over_cleanup() {
        let mut out = Vec::new();
        let err = run_turn(
            canned(vec![
                Ok("par".into()),
                Err(ChatError::Protocol("bad line".into())),
                Err(cleanup_err()),
            ]),
            &mut out,
            None,
            futures::future::pending(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChatError::Protocol(_)));
        assert_eq!(String::from_utf8(out).unwrap(), "par");
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn closed_output_ends_the_turn() {
        // Never finishes on its own; only the write failure can end the turn.
        let endless = stream::iter(vec![Ok("first".to_string())])
            .chain(stream::pending::<Result<String, ChatError>>());
        let end = run_turn(
            Box::pin(endless),
            &mut ClosedPipe,
            None,
            futures::future::pending(),
        )
        .await
        .unwrap();
        assert!(matches!(end, TurnEnd::OutputClosed));
    }

    #[tokio::test]
    async fn interrupt_stops_a_stalled_reply() {
        let mut out = Vec::new();
        let end = run_turn(Box::pin(stream::pending::<Result<String, ChatError>>()), &mut out, None, async {})
            .await
            .unwrap();
        assert!(matches!(end, TurnEnd::Interrupted));
    }

    #[tokio::test]
    async fn deadline_stops_a_stalled_reply() {
        let mut out = Vec::new();
        let end = run_turn(
            Box::pin(stream::pending::<Result<String, ChatError>>()),
            &mut out,
            Some(Duration::from_millis(20)),
            futures::future::pending(),
        )
        .await
        .unwrap();
        assert!(matches!(end, TurnEnd::TimedOut));
    }
}
