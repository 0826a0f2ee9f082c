// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use tracing_core::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::try_create_layers;
use crate::ok;

/// Default log file used by [`TracingConfig::new_file()`] when no path is given.
pub const DEFAULT_LOG_FILE: &str = "r3bl_worker.log";

/// Configure the tracing logging for a worker process. You can display the logs to:
/// 1. a file,
/// 2. stdout or stderr,
/// 3. both.
///
/// This configuration also sets the log level. Expected transport errors (peer reset,
/// broken pipe) are only visible at [`LevelFilter::DEBUG`], so a production worker
/// running at `INFO` stays quiet when clients go away.
///
/// Fields:
/// - `writer_config`: [`WriterConfig`] to choose where to write the logs.
/// - `level_filter`: [`LevelFilter`] - The most verbose level that is recorded.
#[derive(Debug)]
pub struct TracingConfig {
    pub writer_config: WriterConfig,
    pub level_filter: LevelFilter,
}

/// - `String` is the log file path. Eg: `/tmp/line_worker.log` or `line_worker.log`.
/// - [`DisplayPreference`] is the preferred display to use for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterConfig {
    None,
    Display(DisplayPreference),
    File(String /* log file path */),
    DisplayAndFile(DisplayPreference, String /* log file path */),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPreference {
    Stdout,
    Stderr,
}

impl TracingConfig {
    /// Log to both the given [`DisplayPreference`] and a file.
    #[must_use]
    pub fn new_file_and_display(
        filename: Option<String>,
        preferred_display: DisplayPreference,
        level_filter: LevelFilter,
    ) -> Self {
        Self {
            writer_config: WriterConfig::DisplayAndFile(
                preferred_display,
                filename.unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
            ),
            level_filter,
        }
    }

    #[must_use]
    pub fn new_display(preferred_display: DisplayPreference, level_filter: LevelFilter) -> Self {
        Self {
            writer_config: WriterConfig::Display(preferred_display),
            level_filter,
        }
    }

    #[must_use]
    pub fn new_file(filename: Option<String>, level_filter: LevelFilter) -> Self {
        Self {
            writer_config: WriterConfig::File(
                filename.unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
            ),
            level_filter,
        }
    }

    #[must_use]
    pub fn get_writer_config(&self) -> WriterConfig { self.writer_config.clone() }

    #[must_use]
    pub fn get_level_filter(&self) -> LevelFilter { self.level_filter }

    /// Installs the layers as the process-wide default subscriber. Call this once, early
    /// in `main()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file can't be created, or if a global subscriber has
    /// already been installed.
    pub fn install_global(self) -> miette::Result<()> {
        let Some(layers) = try_create_layers(self)? else {
            return ok!();
        };
        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .map_err(|error| miette::miette!("Can't install global tracing subscriber: {error}"))?;
        ok!()
    }

    /// Installs the layers as the default subscriber for the current thread only, until
    /// the returned guard is dropped. Meant for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file can't be created.
    pub fn install_thread_local(self) -> miette::Result<tracing::subscriber::DefaultGuard> {
        let layers = try_create_layers(self)?.unwrap_or_default();
        let subscriber = tracing_subscriber::registry().with(layers);
        ok!(tracing::subscriber::set_default(subscriber))
    }
}
