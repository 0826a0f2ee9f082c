// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use tracing_core::LevelFilter;
use tracing_subscriber::{Layer, registry::LookupSpan};

use super::{DisplayPreference, TracingConfig, WriterConfig, log_file_appender_impl};

/// Avoid gnarly type annotations by using a macro to create the `fmt` layer. Every layer
/// records the target (module path) and the span context, so a log line carries the
/// `connection{id peer}` span it was emitted from.
macro_rules! create_fmt {
    () => {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
    };
}

/// Type alias for a boxed layer.
pub type DynLayer<S> = dyn Layer<S> + Send + Sync + 'static;

/// Returns the layers. This does not initialize the tracing system. Use
/// [`TracingConfig::install_global()`] or [`TracingConfig::install_thread_local()`] for
/// that.
///
/// Returns [`None`] when the [`WriterConfig`] is [`WriterConfig::None`], ie, logging is
/// switched off.
///
/// # Errors
///
/// Returns an error if the log file can't be created.
pub fn try_create_layers(
    tracing_config: TracingConfig,
) -> miette::Result<Option<Vec<Box<DynLayer<tracing_subscriber::Registry>>>>> {
    if tracing_config.get_writer_config() == WriterConfig::None {
        return Ok(None);
    }

    let mut return_it: Vec<Box<DynLayer<tracing_subscriber::Registry>>> = vec![];

    // Global level filter, so layers added later (without a filter of their own) still
    // respect the configured level.
    return_it.push(Box::new(tracing_config.get_level_filter()));

    if let Some(layer) = try_create_display_layer(
        tracing_config.get_level_filter(),
        tracing_config.get_writer_config(),
    )? {
        return_it.push(layer);
    }

    if let Some(layer) = try_create_file_layer(
        tracing_config.get_level_filter(),
        tracing_config.get_writer_config(),
    )? {
        return_it.push(layer);
    }

    Ok(Some(return_it))
}

/// This erases the concrete type of the writer, and returns a boxed layer.
///
/// This is useful for composition of layers. There's more info in the docs
/// [here](https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/index.html#runtime-configuration-with-layers).
///
/// # Errors
///
/// Infallible today; the signature matches [`try_create_file_layer()`] so both compose
/// the same way.
pub fn try_create_display_layer<S>(
    level_filter: LevelFilter,
    writer_config: WriterConfig,
) -> miette::Result<Option<Box<DynLayer<S>>>>
where
    S: tracing_core::Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let fmt_layer = create_fmt!();

    Ok(match writer_config {
        WriterConfig::DisplayAndFile(display_pref, _)
        | WriterConfig::Display(display_pref) => match display_pref {
            DisplayPreference::Stdout => Some(Box::new(
                fmt_layer
                    .with_writer(std::io::stdout)
                    .with_filter(level_filter),
            )),
            DisplayPreference::Stderr => Some(Box::new(
                fmt_layer
                    .with_writer(std::io::stderr)
                    .with_filter(level_filter),
            )),
        },
        WriterConfig::None | WriterConfig::File(_) => None,
    })
}

/// This erases the concrete type of the writer, and returns a boxed layer. ANSI escape
/// sequences are disabled, since log files are read with pagers and shipped to log
/// collectors.
///
/// # Errors
///
/// Returns an error if the log file's parent folder or file name can't be resolved.
pub fn try_create_file_layer<S>(
    level_filter: LevelFilter,
    writer_config: WriterConfig,
) -> miette::Result<Option<Box<DynLayer<S>>>>
where
    S: tracing_core::Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let fmt_layer = create_fmt!();

    Ok(match writer_config {
        WriterConfig::DisplayAndFile(_, log_file_path)
        | WriterConfig::File(log_file_path) => {
            let file = log_file_appender_impl::try_create(log_file_path.as_str())?;
            Some(Box::new(
                fmt_layer
                    .with_ansi(false)
                    .with_writer(file)
                    .with_filter(level_filter),
            ))
        }
        WriterConfig::None | WriterConfig::Display(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_create_display_layer() {
        let layer: Option<Box<DynLayer<tracing_subscriber::Registry>>> =
            try_create_display_layer(
                LevelFilter::DEBUG,
                WriterConfig::Display(DisplayPreference::Stderr),
            )
            .unwrap();
        assert!(layer.is_some());
    }

    #[test]
    fn test_try_create_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("worker.log");
        let file_path = file_path.to_str().unwrap().to_string();

        let layer: Option<Box<DynLayer<tracing_subscriber::Registry>>> =
            try_create_file_layer(LevelFilter::DEBUG, WriterConfig::File(file_path.clone()))
                .unwrap();

        assert!(layer.is_some());
        assert!(std::path::Path::new(&file_path).exists());
    }

    #[test]
    fn test_try_create_both_layers() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("worker.log");
        let file_path = file_path.to_str().unwrap().to_string();

        let tracing_config = TracingConfig::new_file_and_display(
            Some(file_path.clone()),
            DisplayPreference::Stdout,
            LevelFilter::DEBUG,
        );

        // Level filter + display + file.
        let layers = try_create_layers(tracing_config).unwrap().unwrap();
        assert_eq!(layers.len(), 3);
        assert!(std::path::Path::new(&file_path).exists());
    }

    #[test]
    fn test_no_layers_when_logging_is_off() {
        let tracing_config = TracingConfig {
            writer_config: WriterConfig::None,
            level_filter: LevelFilter::INFO,
        };
        assert!(try_create_layers(tracing_config).unwrap().is_none());
    }

    #[test]
    fn test_thread_local_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("worker.log");

        let guard = TracingConfig::new_file(
            Some(file_path.to_str().unwrap().to_string()),
            LevelFilter::INFO,
        )
        .install_thread_local()
        .unwrap();

        tracing::info!(requests_served = 3, "Autorestarting worker after current request");
        tracing::debug!("Ignoring connection reset");
        drop(guard);

        let output = std::fs::read_to_string(&file_path).unwrap();
        assert!(output.contains("Autorestarting worker"));
        assert!(output.contains("requests_served=3"));
        assert!(!output.contains("Ignoring connection reset"));
    }
}
