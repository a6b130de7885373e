pub mod aggregate;
pub mod build_version;
pub mod codec;
pub mod config;
pub mod damage;
pub mod error;
pub mod event;
pub mod game_data;
pub mod ingest;
pub mod log_event;
pub mod on_rails;
pub mod pipeline;
pub mod player_state;
pub mod specs;
pub mod stats;
pub mod store;

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;

/// Set up file logging under `log_dir` and route panics through tracing.
///
/// Files rotate daily. `RUST_LOG` is honoured; `directive` is layered on top
/// of it. The returned guard flushes on drop, so hold it for the life of the
/// process.
pub fn init_logging(log_dir: &Path, directive: &str) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "ledger.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let directive = directive
        .parse::<tracing_subscriber::filter::Directive>()
        .map_err(|e| anyhow::anyhow!("Log directive parse error ({}): {}", directive, e))?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(non_blocking)
        .with_ansi(false) // log files should not contain ANSI colour codes
        .try_init()
        .map_err(|e| anyhow::anyhow!("Logging init error: {}", e))?;

    // Without this, panic messages only reach stderr.
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        tracing::error!("PANIC at {}: {}", location, message);
    }));

    tracing::info!("prescience-ledger {} logging to {}", env!("CARGO_PKG_VERSION"), log_dir.display());
    Ok(guard)
}
