use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, SystemTime};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::catalog::CatalogClient;
use crate::config::DownloadSpec;
use crate::domain::{MatchEntry, MatchSet};
use crate::error::DepotError;
use crate::fs_util;

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub concurrency: usize,
    pub fetch_timeout: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            fetch_timeout: Duration::from_secs(60),
        }
    }
}

/// Shared cancellation signal. Cancelling stops the scheduling of new
/// fetches; in-flight fetches are bounded by the configured timeout and the
/// atomic-write discipline keeps destinations intact.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct FileError {
    pub destination: Utf8PathBuf,
    pub error: DepotError,
}

#[derive(Debug, Default)]
pub struct DownloadOutcome {
    pub fetched: usize,
    pub skipped: usize,
    pub errors: Vec<FileError>,
    pub cancelled: bool,
}

/// Local destination for a matched file. The hierarchical layout keeps
/// same-named files from different projects or versions apart; with
/// `filename-only` they collapse onto one path.
pub fn destination(spec: &DownloadSpec, entry: &MatchEntry) -> Utf8PathBuf {
    if spec.filename_only {
        spec.path.join(sanitize(&entry.file.name))
    } else {
        spec.path
            .join(sanitize(&entry.project))
            .join(sanitize(&entry.distribution))
            .join(sanitize(&entry.version))
            .join(sanitize(&entry.file.name))
    }
}

// Depot names may contain path separators; they must not introduce extra
// directory levels.
fn sanitize(component: &str) -> String {
    component.replace(['/', '\\'], "-")
}

/// Downloads every file in the match set according to `spec`. Failures are
/// recorded per file and never abort the remaining files. Jobs that target
/// the same destination path run sequentially in match-set order; distinct
/// destinations are fetched concurrently up to `options.concurrency`.
pub fn reconcile(
    catalog: &dyn CatalogClient,
    set: &MatchSet,
    spec: &DownloadSpec,
    options: &DownloadOptions,
    cancel: &CancelFlag,
) -> DownloadOutcome {
    let mut order: Vec<Utf8PathBuf> = Vec::new();
    let mut groups: HashMap<Utf8PathBuf, Vec<&MatchEntry>> = HashMap::new();
    for entry in set.iter() {
        let dest = destination(spec, entry);
        if !groups.contains_key(&dest) {
            order.push(dest.clone());
        }
        groups.entry(dest).or_default().push(entry);
    }
    let jobs: Vec<(Utf8PathBuf, Vec<&MatchEntry>)> = order
        .into_iter()
        .map(|dest| {
            let group = groups.remove(&dest).unwrap_or_default();
            (dest, group)
        })
        .collect();

    let next = AtomicUsize::new(0);
    let outcome = Mutex::new(DownloadOutcome::default());
    let workers = options.concurrency.clamp(1, jobs.len().max(1));

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    if cancel.is_cancelled() {
                        lock_outcome(&outcome).cancelled = true;
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(job) = jobs.get(index) else {
                        break;
                    };
                    let (dest, group) = job;
                    for entry in group {
                        if cancel.is_cancelled() {
                            lock_outcome(&outcome).cancelled = true;
                            return;
                        }
                        match fetch_one(catalog, entry, dest, spec, options.fetch_timeout) {
                            Ok(FetchAction::Fetched) => lock_outcome(&outcome).fetched += 1,
                            Ok(FetchAction::SkippedFresh) => lock_outcome(&outcome).skipped += 1,
                            Err(error) => lock_outcome(&outcome).errors.push(FileError {
                                destination: dest.clone(),
                                error,
                            }),
                        }
                    }
                }
            });
        }
    });

    outcome
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

// A worker that panics while holding the lock must not take the summary of
// the surviving workers down with it.
fn lock_outcome(outcome: &Mutex<DownloadOutcome>) -> MutexGuard<'_, DownloadOutcome> {
    outcome.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum FetchAction {
    Fetched,
    SkippedFresh,
}

fn fetch_one(
    catalog: &dyn CatalogClient,
    entry: &MatchEntry,
    dest: &Utf8Path,
    spec: &DownloadSpec,
    timeout: Duration,
) -> Result<FetchAction, DepotError> {
    if spec.mkdir {
        fs_util::ensure_parent(dest)?;
    } else {
        fs_util::require_parent(dest)?;
    }

    if spec.newer_only && dest.as_std_path().exists() {
        if let Some(local) = local_mtime(dest) {
            let remote: SystemTime = entry.file.modified_at.into();
            if local >= remote {
                debug!(dest = %dest, "local copy up to date, skipping");
                return Ok(FetchAction::SkippedFresh);
            }
        }
    }

    let bytes = catalog.fetch(&entry.file.url, timeout)?;
    fs_util::write_bytes_atomic(dest, &bytes)?;
    debug!(dest = %dest, size = bytes.len(), "fetched");
    Ok(FetchAction::Fetched)
}

fn local_mtime(path: &Utf8Path) -> Option<SystemTime> {
    fs::metadata(path.as_std_path())
        .ok()
        .and_then(|meta| meta.modified().ok())
}
