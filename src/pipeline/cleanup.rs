use std::io;
use std::path::PathBuf;

/// Outcome of a best-effort cleanup pass
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Files that were removed
    pub removed: Vec<PathBuf>,

    /// Files that existed but could not be removed
    pub failures: Vec<(PathBuf, io::Error)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Remove every present path that still exists
///
/// Never fails: errors are logged and collected in the report. Paths that are
/// already gone count as neither removed nor failed, so calling this twice
/// with the same paths is harmless.
pub fn release(paths: &[Option<PathBuf>]) -> CleanupReport {
    let mut report = CleanupReport::default();

    for path in paths.iter().flatten() {
        if report.removed.contains(path) || !path.exists() {
            continue;
        }

        match fs_err::remove_file(path) {
            Ok(()) => {
                tracing::info!("Removed file: {}", path.display());
                report.removed.push(path.clone());
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!("Failed to remove {}: {}", path.display(), err);
                report.failures.push((path.clone(), err));
            }
        }
    }

    report
}
