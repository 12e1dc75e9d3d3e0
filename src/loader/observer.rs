use std::error::Error as StdError;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::HarmonizeError;

/// Severity classification used for observer callbacks and alert thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (operation failed).
    Error,
    /// Critical error (typically I/O or other infrastructure failures).
    Critical,
}

/// Context about a load attempt.
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    /// Requested dataset id, if any.
    pub dataset: Option<String>,
    /// Raw file paths involved (empty if the failure precedes location).
    pub paths: Vec<PathBuf>,
}

impl LoadContext {
    fn dataset_label(&self) -> &str {
        self.dataset.as_deref().unwrap_or("-")
    }
}

/// Minimal stats reported on a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    /// Rows in the processed table.
    pub rows: usize,
    /// Columns in the processed table.
    pub columns: usize,
}

/// Observer interface for load outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait LoadObserver: Send + Sync {
    /// Called when a load succeeds.
    fn on_success(&self, _ctx: &LoadContext, _stats: LoadStats) {}

    /// Called when a load fails.
    fn on_failure(&self, _ctx: &LoadContext, _severity: Severity, _error: &HarmonizeError) {}

    /// Called when a load failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &LoadContext, severity: Severity, error: &HarmonizeError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn LoadObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn LoadObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl LoadObserver for CompositeObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &LoadContext, severity: Severity, error: &HarmonizeError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &LoadContext, severity: Severity, error: &HarmonizeError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Logs load events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl LoadObserver for StdErrObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        eprintln!(
            "[load][ok] dataset={} files={} rows={} columns={}",
            ctx.dataset_label(),
            ctx.paths.len(),
            stats.rows,
            stats.columns
        );
    }

    fn on_failure(&self, ctx: &LoadContext, severity: Severity, error: &HarmonizeError) {
        eprintln!(
            "[load][{:?}] dataset={} files={} err={}",
            severity,
            ctx.dataset_label(),
            ctx.paths.len(),
            error
        );
    }

    fn on_alert(&self, ctx: &LoadContext, severity: Severity, error: &HarmonizeError) {
        eprintln!(
            "[ALERT][load][{:?}] dataset={} files={} err={}",
            severity,
            ctx.dataset_label(),
            ctx.paths.len(),
            error
        );
    }
}

/// Appends load events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are
    /// ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl LoadObserver for FileObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        self.append_line(&format!(
            "{} ok dataset={} files={} rows={} columns={}",
            unix_ts(),
            ctx.dataset_label(),
            ctx.paths.len(),
            stats.rows,
            stats.columns
        ));
    }

    fn on_failure(&self, ctx: &LoadContext, severity: Severity, error: &HarmonizeError) {
        self.append_line(&format!(
            "{} fail severity={:?} dataset={} files={} err={}",
            unix_ts(),
            severity,
            ctx.dataset_label(),
            ctx.paths.len(),
            error
        ));
    }

    fn on_alert(&self, ctx: &LoadContext, severity: Severity, error: &HarmonizeError) {
        self.append_line(&format!(
            "{} ALERT severity={:?} dataset={} files={} err={}",
            unix_ts(),
            severity,
            ctx.dataset_label(),
            ctx.paths.len(),
            error
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Classify an error for alerting: I/O-rooted failures are infrastructure
/// problems, everything else is an ordinary error.
pub fn severity_for_error(e: &HarmonizeError) -> Severity {
    match e {
        HarmonizeError::Io(_) => Severity::Critical,
        HarmonizeError::Csv(err) => match err.kind() {
            csv::ErrorKind::Io(_) => Severity::Critical,
            _ => Severity::Error,
        },
        HarmonizeError::Parquet(err) => {
            // Parquet errors often wrap IO, but not always in a structured
            // way; walk the source chain.
            if error_chain_contains_io(err) {
                Severity::Critical
            } else {
                Severity::Error
            }
        }
        HarmonizeError::Yaml(_)
        | HarmonizeError::Config { .. }
        | HarmonizeError::Resolution { .. }
        | HarmonizeError::Translation { .. }
        | HarmonizeError::Parse { .. }
        | HarmonizeError::SchemaMismatch { .. } => Severity::Error,
    }
}

fn error_chain_contains_io(e: &(dyn StdError + 'static)) -> bool {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if err.is::<std::io::Error>() {
            return true;
        }
        cur = err.source();
    }
    false
}
