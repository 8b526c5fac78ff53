// SPDX-License-Identifier: Apache-2.0

// Subscriber bootstrap for embedders that do not bring their own.
// Libraries only emit through `tracing`; installing a global subscriber
// stays the application's call.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::LoggingError;

pub const LOG_ENV: &str = "NSSTORE_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive used when `NSSTORE_LOG` is unset, e.g. `info` or
    /// `nsstore=debug`.
    pub level: String,
    /// Write to daily rolling files in this directory instead of stdout.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "nsstore.log".to_string(),
        }
    }
}

impl LogConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        match EnvFilter::try_from_env(LOG_ENV) {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.level)
                .map_err(|e| LoggingError::Directive(format!("{}: {}", self.level, e))),
        }
    }
}

/// Installs the global subscriber. Keep the returned guard alive for as
/// long as logs should be flushed to file; it is `None` for stdout.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = config.filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .try_init()
                .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            registry
                .with(fmt::layer())
                .try_init()
                .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))?;
            Ok(None)
        }
    }
}
