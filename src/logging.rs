use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

use anyhow::{Context, Result};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::options::Verbosity;

/// Logger configuration.
///
/// `RUST_LOG`, when set, replaces the level derived from `verbosity`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub verbosity: Verbosity,
    /// Also write the log stream to this file (created with its parent).
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Info,
            log_file: None,
        }
    }
}

static INIT: Once = Once::new();

/// Installs the global subscriber once. Later calls are ignored, but a log
/// file that cannot be opened is still reported.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let log_file = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create log directory {}", parent.display())
                })?;
            }
            let file = File::create(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(file)
        }
        None => None,
    };

    let verbosity = config.verbosity;
    INIT.call_once(move || {
        let filter = EnvFilter::builder()
            .with_default_directive(verbosity.level_filter().into())
            .from_env_lossy();

        let file_layer = log_file.map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
        });

        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .with(file_layer)
            .try_init();

        // Another subscriber (e.g. a test harness) may already be active.
        if installed.is_ok() {
            tracing::debug!(?verbosity, "logging initialized");
        }
    });
    Ok(())
}

/// `<log_dir>/<script stem>.log`.
pub fn log_file_for(log_dir: &Path, script: Option<&Path>) -> PathBuf {
    let stem = script
        .and_then(|script| script.file_stem())
        .and_then(|stem| stem.to_str())
        .unwrap_or("scenecast");
    log_dir.join(format!("{stem}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_named_after_script() {
        assert_eq!(
            log_file_for(Path::new("media/logs"), Some(Path::new("talks/intro.yaml"))),
            PathBuf::from("media/logs/intro.log")
        );
        assert_eq!(
            log_file_for(Path::new("logs"), None),
            PathBuf::from("logs/scenecast.log")
        );
    }

    #[test]
    fn log_file_directory_is_created() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_file = temp.path().join("nested/logs/run.log");
        init_logging(&LoggingConfig {
            verbosity: Verbosity::Warning,
            log_file: Some(log_file.clone()),
        })
        .expect("logging initializes");
        assert!(log_file.exists());
    }
}
