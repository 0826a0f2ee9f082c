// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::{fs::{File, OpenOptions},
          path::{Path, PathBuf},
          time::SystemTime};

use miette::{Context, IntoDiagnostic};

/// Liveness feed to the external supervisor. Beaten on every iteration of the
/// [lifecycle controller](crate::WorkerLifecycle) loop and once more when it stops. A
/// supervisor that stops seeing beats for longer than its own timeout is expected to
/// kill and replace the worker.
pub trait WorkerHeartbeat: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the beat could not be delivered. The controller logs it and
    /// keeps going.
    fn notify(&self) -> miette::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHeartbeat;

impl WorkerHeartbeat for NoopHeartbeat {
    fn notify(&self) -> miette::Result<()> { Ok(()) }
}

/// Beats by bumping the modification time of a file the supervisor watches.
#[derive(Debug)]
pub struct FileHeartbeat {
    file: File,
    path: PathBuf,
}

impl FileHeartbeat {
    /// Opens (creating if needed) the heartbeat file. Its contents are never touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be opened for writing.
    pub fn create(path: impl Into<PathBuf>) -> miette::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Can't open heartbeat file {}", path.display()))?;
        Ok(Self { file, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path { &self.path }
}

impl WorkerHeartbeat for FileHeartbeat {
    fn notify(&self) -> miette::Result<()> {
        self.file
            .set_modified(SystemTime::now())
            .into_diagnostic()
            .wrap_err_with(|| format!("Can't touch heartbeat file {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    #[test]
    fn test_file_heartbeat_bumps_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let heartbeat = FileHeartbeat::create(dir.path().join("worker.beat")).unwrap();

        let long_ago = UNIX_EPOCH + Duration::from_secs(1_000);
        heartbeat.file.set_modified(long_ago).unwrap();

        heartbeat.notify().unwrap();

        let modified = std::fs::metadata(heartbeat.path()).unwrap().modified().unwrap();
        assert!(modified > long_ago);
    }

    #[test]
    fn test_file_heartbeat_reports_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileHeartbeat::create(dir.path().join("missing").join("worker.beat"));
        assert!(result.is_err());
    }
}
