use std::fs;
use std::sync::Mutex;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::{TimeZone, Utc};

use depot_mirror::catalog::CatalogClient;
use depot_mirror::config::DownloadSpec;
use depot_mirror::domain::{
    DistRef, FileMeta, MatchEntry, MatchSet, ProjectRef, VersionRef,
};
use depot_mirror::download::{reconcile, CancelFlag, DownloadOptions};
use depot_mirror::error::{DepotError, ErrorClass};

/// The reconciler only uses `fetch`; listings are not part of its contract.
#[derive(Default)]
struct FetchCatalog {
    calls: Mutex<usize>,
}

impl FetchCatalog {
    fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl CatalogClient for FetchCatalog {
    fn list_projects(&self) -> Result<Vec<ProjectRef>, DepotError> {
        Err(DepotError::CatalogHttp("not used".to_string()))
    }

    fn list_distributions(&self, _project: &ProjectRef) -> Result<Vec<DistRef>, DepotError> {
        Err(DepotError::CatalogHttp("not used".to_string()))
    }

    fn list_versions(&self, _distribution: &DistRef) -> Result<Vec<VersionRef>, DepotError> {
        Err(DepotError::CatalogHttp("not used".to_string()))
    }

    fn list_files(&self, _version: &VersionRef) -> Result<Vec<FileMeta>, DepotError> {
        Err(DepotError::CatalogHttp("not used".to_string()))
    }

    fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, DepotError> {
        *self.calls.lock().unwrap() += 1;
        Ok(url.as_bytes().to_vec())
    }
}

fn entry(project: &str, version: &str, name: &str, url: &str) -> MatchEntry {
    MatchEntry {
        project: project.to_string(),
        distribution: "dist".to_string(),
        version: version.to_string(),
        file: FileMeta {
            name: name.to_string(),
            url: url.to_string(),
            modified_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            size_bytes: 1,
        },
    }
}

fn spec(root: &Utf8PathBuf, filename_only: bool, mkdir: bool, newer_only: bool) -> DownloadSpec {
    DownloadSpec {
        path: root.clone(),
        filename_only,
        mkdir,
        newer_only,
    }
}

fn root(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join("mirror")).unwrap()
}

#[test]
fn hierarchical_layout_keeps_same_names_distinct() {
    let temp = tempfile::tempdir().unwrap();
    let root = root(&temp);
    let catalog = FetchCatalog::default();
    let set = MatchSet {
        entries: vec![
            entry("ACG-8", "1.0", "issue-report.pdf", "mock://a"),
            entry("ACG-8", "2.0", "issue-report.pdf", "mock://b"),
        ],
    };

    let outcome = reconcile(
        &catalog,
        &set,
        &spec(&root, false, true, false),
        &DownloadOptions::default(),
        &CancelFlag::new(),
    );

    assert_eq!(outcome.fetched, 2);
    assert!(outcome.errors.is_empty());
    let first = root.join("ACG-8/dist/1.0/issue-report.pdf");
    let second = root.join("ACG-8/dist/2.0/issue-report.pdf");
    assert_eq!(fs::read(first.as_std_path()).unwrap(), b"mock://a");
    assert_eq!(fs::read(second.as_std_path()).unwrap(), b"mock://b");
}

#[test]
fn filename_only_collision_is_last_writer_wins() {
    let temp = tempfile::tempdir().unwrap();
    let root = root(&temp);
    let catalog = FetchCatalog::default();
    let set = MatchSet {
        entries: vec![
            entry("ACG-8", "1.0", "issue-report.pdf", "mock://a"),
            entry("ACG-8", "2.0", "issue-report.pdf", "mock://b"),
        ],
    };

    let outcome = reconcile(
        &catalog,
        &set,
        &spec(&root, true, true, false),
        &DownloadOptions::default(),
        &CancelFlag::new(),
    );

    assert_eq!(outcome.fetched, 2);
    let dest = root.join("issue-report.pdf");
    assert_eq!(fs::read(dest.as_std_path()).unwrap(), b"mock://b");
    assert_eq!(fs::read_dir(root.as_std_path()).unwrap().count(), 1);
}

#[test]
fn newer_only_skips_fresh_local_file_without_fetching() {
    let temp = tempfile::tempdir().unwrap();
    let root = root(&temp);
    fs::create_dir_all(root.as_std_path()).unwrap();
    // remote modified in 2020, local written now
    fs::write(root.join("issue-report.pdf").as_std_path(), b"local").unwrap();

    let catalog = FetchCatalog::default();
    let set = MatchSet {
        entries: vec![entry("ACG-8", "1.0", "issue-report.pdf", "mock://a")],
    };

    let outcome = reconcile(
        &catalog,
        &set,
        &spec(&root, true, false, true),
        &DownloadOptions::default(),
        &CancelFlag::new(),
    );

    assert_eq!(outcome.fetched, 0);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(catalog.call_count(), 0);
    assert_eq!(
        fs::read(root.join("issue-report.pdf").as_std_path()).unwrap(),
        b"local"
    );
}

#[test]
fn newer_only_refetches_stale_local_file() {
    let temp = tempfile::tempdir().unwrap();
    let root = root(&temp);
    fs::create_dir_all(root.as_std_path()).unwrap();
    fs::write(root.join("issue-report.pdf").as_std_path(), b"stale").unwrap();

    let catalog = FetchCatalog::default();
    let mut stale = entry("ACG-8", "1.0", "issue-report.pdf", "mock://a");
    stale.file.modified_at = Utc::now() + chrono::Duration::hours(1);
    let set = MatchSet {
        entries: vec![stale],
    };

    let outcome = reconcile(
        &catalog,
        &set,
        &spec(&root, true, false, true),
        &DownloadOptions::default(),
        &CancelFlag::new(),
    );

    assert_eq!(outcome.fetched, 1);
    assert_eq!(outcome.skipped, 0);
    assert_eq!(
        fs::read(root.join("issue-report.pdf").as_std_path()).unwrap(),
        b"mock://a"
    );
}

#[test]
fn without_newer_only_existing_files_are_refetched() {
    let temp = tempfile::tempdir().unwrap();
    let root = root(&temp);
    fs::create_dir_all(root.as_std_path()).unwrap();
    fs::write(root.join("issue-report.pdf").as_std_path(), b"old").unwrap();

    let catalog = FetchCatalog::default();
    let set = MatchSet {
        entries: vec![entry("ACG-8", "1.0", "issue-report.pdf", "mock://a")],
    };

    let outcome = reconcile(
        &catalog,
        &set,
        &spec(&root, true, false, false),
        &DownloadOptions::default(),
        &CancelFlag::new(),
    );

    assert_eq!(outcome.fetched, 1);
    assert_eq!(catalog.call_count(), 1);
    assert_eq!(
        fs::read(root.join("issue-report.pdf").as_std_path()).unwrap(),
        b"mock://a"
    );
}

#[test]
fn missing_directory_without_mkdir_fails_that_file_only() {
    let temp = tempfile::tempdir().unwrap();
    let root = root(&temp);
    // pre-create the directory for the second entry only
    fs::create_dir_all(root.join("ACG-8/dist/2.0").as_std_path()).unwrap();

    let catalog = FetchCatalog::default();
    let set = MatchSet {
        entries: vec![
            entry("ACG-8", "1.0", "issue-report.pdf", "mock://a"),
            entry("ACG-8", "2.0", "issue-report.pdf", "mock://b"),
        ],
    };

    let outcome = reconcile(
        &catalog,
        &set,
        &spec(&root, false, false, false),
        &DownloadOptions::default(),
        &CancelFlag::new(),
    );

    assert_eq!(outcome.fetched, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].error.class(), ErrorClass::Path);
    assert!(outcome.errors[0]
        .destination
        .as_str()
        .contains("ACG-8/dist/1.0"));
    assert!(root
        .join("ACG-8/dist/2.0/issue-report.pdf")
        .as_std_path()
        .exists());
}

#[test]
fn transport_failure_is_isolated_per_file() {
    struct FlakyCatalog {
        inner: FetchCatalog,
    }

    impl CatalogClient for FlakyCatalog {
        fn list_projects(&self) -> Result<Vec<ProjectRef>, DepotError> {
            Err(DepotError::CatalogHttp("not used".to_string()))
        }

        fn list_distributions(&self, project: &ProjectRef) -> Result<Vec<DistRef>, DepotError> {
            self.inner.list_distributions(project)
        }

        fn list_versions(&self, distribution: &DistRef) -> Result<Vec<VersionRef>, DepotError> {
            self.inner.list_versions(distribution)
        }

        fn list_files(&self, version: &VersionRef) -> Result<Vec<FileMeta>, DepotError> {
            self.inner.list_files(version)
        }

        fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, DepotError> {
            if url.ends_with("broken") {
                return Err(DepotError::CatalogStatus {
                    status: 404,
                    message: "not found".to_string(),
                });
            }
            self.inner.fetch(url, timeout)
        }
    }

    let temp = tempfile::tempdir().unwrap();
    let root = root(&temp);
    let catalog = FlakyCatalog {
        inner: FetchCatalog::default(),
    };
    let set = MatchSet {
        entries: vec![
            entry("ACG-8", "1.0", "a.pdf", "mock://broken"),
            entry("ACG-8", "1.0", "b.pdf", "mock://ok"),
        ],
    };

    let outcome = reconcile(
        &catalog,
        &set,
        &spec(&root, false, true, false),
        &DownloadOptions::default(),
        &CancelFlag::new(),
    );

    assert_eq!(outcome.fetched, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].error.class(), ErrorClass::Transport);
    assert!(root.join("ACG-8/dist/1.0/b.pdf").as_std_path().exists());
    assert!(!root.join("ACG-8/dist/1.0/a.pdf").as_std_path().exists());
}

#[test]
fn cancelled_run_schedules_no_fetches() {
    let temp = tempfile::tempdir().unwrap();
    let root = root(&temp);
    let catalog = FetchCatalog::default();
    let set = MatchSet {
        entries: vec![entry("ACG-8", "1.0", "issue-report.pdf", "mock://a")],
    };

    let cancel = CancelFlag::new();
    cancel.cancel();
    let outcome = reconcile(
        &catalog,
        &set,
        &spec(&root, false, true, false),
        &DownloadOptions::default(),
        &cancel,
    );

    assert!(outcome.cancelled);
    assert_eq!(outcome.fetched, 0);
    assert_eq!(catalog.call_count(), 0);
}

#[test]
fn empty_set_is_a_no_op() {
    let temp = tempfile::tempdir().unwrap();
    let root = root(&temp);
    let catalog = FetchCatalog::default();

    let outcome = reconcile(
        &catalog,
        &MatchSet::default(),
        &spec(&root, false, false, false),
        &DownloadOptions::default(),
        &CancelFlag::new(),
    );

    assert_eq!(outcome.fetched, 0);
    assert_eq!(outcome.skipped, 0);
    assert!(outcome.errors.is_empty());
    assert!(!outcome.cancelled);
}
