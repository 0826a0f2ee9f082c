// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::path::Path;

use miette::IntoDiagnostic;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

/// Creates an appender that writes every record to `path_str`, never rotating. Rotation
/// is left to the process supervisor (or `logrotate`), which is how a worker fleet
/// normally handles it.
///
/// A bare file name (eg: `worker.log`) is created in the current directory.
///
/// Note that if you wrap this up in a non blocking writer, records logged just before
/// the worker exits can be lost, so it is handed to the `fmt` layer as-is.
///
/// # Errors
///
/// Returns an error if the path has no file name (eg: it ends with `..` or is empty), or
/// if the file can't be opened for appending.
pub fn try_create(path_str: &str) -> miette::Result<RollingFileAppender> {
    let path = Path::new(path_str);

    let file_name = path.file_name().ok_or_else(|| {
        miette::miette!(
            "Log file path '{}' does not name a file. Pass a path like /tmp/worker.log",
            path.display()
        )
    })?;

    let folder = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy().into_owned())
        .build(folder)
        .into_diagnostic()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_path_without_file_name() {
        assert!(try_create("").is_err());
        assert!(try_create("/tmp/..").is_err());
    }

    #[test]
    fn test_creates_file_in_folder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.log");
        let _appender = try_create(path.to_str().unwrap()).unwrap();
        assert!(path.exists());
    }
}
