//! Logging configuration using the tracing ecosystem.
//!
//! Two outputs:
//! - a daily rotating file with full detail, for after-the-fact debugging
//! - compact messages on stderr, whose level follows `-v`
//!
//! `RUST_LOG` overrides both.

use std::path::PathBuf;

use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Default file log filter if RUST_LOG is not set.
const DEFAULT_LOG_FILTER: &str = "atlas_cli=info,warn";

/// Stderr level for a `-v` count: warnings by default, then info, debug, trace.
pub fn stderr_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Initialize the logging system.
///
/// Logs are stored in the platform-specific local data directory, e.g.
/// `~/.local/share/atlas-cli/logs/` on Linux. If that directory cannot be
/// created, only the stderr output is installed.
///
/// # Errors
///
/// Returns an error if the tracing subscriber cannot be set.
pub fn init(verbosity: u8) -> anyhow::Result<()> {
    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let stderr_filter = match std::env::var("RUST_LOG") {
        Ok(spec) => EnvFilter::new(spec),
        Err(_) => EnvFilter::default()
            .add_directive(stderr_level(verbosity).into())
            .add_directive("hyper=warn".parse()?)
            .add_directive("reqwest=warn".parse()?),
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact()
        .with_filter(stderr_filter);

    let file_layer = match get_log_directory().and_then(|dir| {
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }) {
        Ok(dir) => Some(
            fmt::layer()
                .with_writer(RollingFileAppender::new(Rotation::DAILY, &dir, "atlas-cli.log"))
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(file_filter),
        ),
        Err(_) => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "atlas-cli starting up");
    Ok(())
}

/// Get the log directory path.
fn get_log_directory() -> anyhow::Result<PathBuf> {
    let base_dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine local data directory"))?;

    Ok(base_dir.join("atlas-cli").join("logs"))
}

/// Get the path where logs are stored.
pub fn log_directory() -> Option<PathBuf> {
    get_log_directory().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_has_expected_structure() {
        let dir = get_log_directory().unwrap();
        assert!(dir.ends_with("atlas-cli/logs"));
    }

    #[test]
    fn test_log_directory_public_function() {
        assert!(log_directory().is_some());
    }

    #[test]
    fn test_stderr_level_follows_verbosity() {
        assert_eq!(stderr_level(0), LevelFilter::WARN);
        assert_eq!(stderr_level(1), LevelFilter::INFO);
        assert_eq!(stderr_level(2), LevelFilter::DEBUG);
        assert_eq!(stderr_level(9), LevelFilter::TRACE);
    }
}
