use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

/// Keeps the file writer flushing until dropped.
pub struct LogGuard {
    _writer: Option<WorkerGuard>,
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` when verbose. Verbose logs
/// go to stderr, everything else to a daily file so stdout stays the reply.
pub fn init(verbose: bool) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    if verbose {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!("init logging: {}", e))?;
        return Ok(LogGuard { _writer: None });
    }

    let Some(dir) = log_dir() else {
        return Ok(LogGuard { _writer: None });
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("create log dir: {}", dir.display()))?;
    let appender = tracing_appender::rolling::daily(&dir, "hfchat.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("init logging: {}", e))?;
    Ok(LogGuard {
        _writer: Some(guard),
    })
}

fn log_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "hfchat").map(|d| d.data_dir().join("logs"))
}
