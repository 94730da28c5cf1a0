use std::io;
use std::str::FromStr;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config_loader::LogConfig;

/// Initialise tracing with a non-blocking hourly log file
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the writer thread.
pub fn init(app_name: &str, log_dir: &str, default_level: Level) -> WorkerGuard {
    let (non_blocking, guard) = file_writer(app_name, log_dir);

    let file_layer = fmt::layer().with_writer(non_blocking).with_target(true).with_thread_ids(true).with_line_number(true).with_ansi(false).compact();

    tracing_subscriber::registry().with(env_filter(default_level)).with(file_layer).init();

    guard
}

/// Initialise tracing to both the log file and stdout
pub fn init_with_stdout(app_name: &str, log_dir: &str, default_level: Level) -> WorkerGuard {
    let (non_blocking, guard) = file_writer(app_name, log_dir);

    let file_layer = fmt::layer().with_writer(non_blocking).with_target(true).with_thread_ids(true).with_line_number(true).with_ansi(false).compact();
    let stdout_layer = fmt::layer().with_writer(io::stdout).with_target(true).with_line_number(true).with_ansi(true).compact();

    tracing_subscriber::registry().with(env_filter(default_level)).with(file_layer).with(stdout_layer).init();

    guard
}

/// Initialise from the `[logging]` section of a config file
pub fn init_from_config(app_name: &str, config: &LogConfig) -> WorkerGuard {
    let level = parse_level(&config.level);
    if config.stdout { init_with_stdout(app_name, &config.dir, level) } else { init(app_name, &config.dir, level) }
}

/// Unknown level names fall back to INFO
pub fn parse_level(level: &str) -> Level {
    Level::from_str(level.trim()).unwrap_or(Level::INFO)
}

fn file_writer(app_name: &str, log_dir: &str) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard) {
    let _ = std::fs::create_dir_all(log_dir);
    let file_appender = tracing_appender::rolling::hourly(log_dir, format!("{app_name}.log"));
    tracing_appender::non_blocking(file_appender)
}

/// `RUST_LOG` wins over `default_level`
fn env_filter(default_level: Level) -> EnvFilter {
    EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level(" WARN "), Level::WARN);
        assert_eq!(parse_level("chatty"), Level::INFO);
    }
}
