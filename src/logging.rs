use crate::config::EngineConfig;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn filter_for(config: &EngineConfig) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    let level = config.log_level.trim();
    EnvFilter::try_new(if level.is_empty() { "info" } else { level })
      .unwrap_or_else(|_| EnvFilter::new("info"))
  })
}

/// Installs the global subscriber. With a log dir, output goes to a daily
/// rolling `bracket.log` and the returned guard must be held until exit.
pub fn init_logging(config: &EngineConfig) -> Result<Option<WorkerGuard>, String> {
  let log_dir = config.log_dir.trim();
  if log_dir.is_empty() {
    tracing_subscriber::fmt()
      .with_env_filter(filter_for(config))
      .with_writer(std::io::stderr)
      .try_init()
      .map_err(|e| format!("init logging: {e}"))?;
    return Ok(None);
  }

  fs::create_dir_all(log_dir).map_err(|e| format!("create log dir {log_dir}: {e}"))?;
  let file_appender = tracing_appender::rolling::daily(log_dir, "bracket.log");
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
  tracing_subscriber::fmt()
    .with_env_filter(filter_for(config))
    .with_writer(non_blocking)
    .with_ansi(false)
    .try_init()
    .map_err(|e| format!("init logging: {e}"))?;
  Ok(Some(guard))
}
