mod args;
mod chat;
mod logging;

use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::Parser;
use providers::{HuggingChatClient, HuggingChatConfig};
use tracing::{error, info};

use args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("hfchat: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<u8> {
    let _log = logging::init(args.verbose)?;

    let cfg = match &args.config {
        Some(path) if !path.exists() => bail!("config file not found: {}", path.display()),
        Some(path) => HuggingChatConfig::load(Some(path))?,
        None => HuggingChatConfig::from_env_and_file()?,
    };
    info!("base_url={} model={}", cfg.base_url, cfg.model);

    let client = HuggingChatClient::new(cfg);
    let template = args.request_template()?;
    let history = args.initial_history();

    let code = match args.prompt_text() {
        Some(prompt) => chat::one_shot(&client, template, history, prompt, args.deadline()).await,
        None => chat::interactive(&client, template, history, args.deadline()).await,
    };
    client.wait_for_cleanups().await;
    code
}
