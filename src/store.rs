//! Append-only, per-test result storage
//!
//! Layout: `<root>/<test_name>/<sequence>-<run_date>.json`, one file per
//! result. Every record is written to a hidden temporary sibling, synced
//! and renamed into place, so a crash leaves either the previous record
//! set or the previous set plus one complete record. Tests never share a
//! directory, so appends for different tests do not contend.

use crate::error::{HarnessError, Result};
use crate::naming::TestName;
use crate::result::{ResultHistory, TestResult};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const RECORD_EXT: &str = "json";

/// Directory-backed result store
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| HarnessError::StoreWrite {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn test_dir(&self, name: &TestName) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Append a terminal result and return the path of the new record
    pub fn append(&self, result: &TestResult) -> Result<PathBuf> {
        if !result.is_terminal() {
            return Err(HarnessError::NonTerminal(result.name.to_string()));
        }

        let dir = self.test_dir(&result.name);
        fs::create_dir_all(&dir).map_err(|source| HarnessError::StoreWrite {
            path: dir.clone(),
            source,
        })?;

        let sequence = next_sequence(&dir).map_err(|source| HarnessError::StoreWrite {
            path: dir.clone(),
            source,
        })?;

        let mut record = result.clone();
        record.sequence = sequence;
        let path = dir.join(format!("{:08}-{}.{}", sequence, record.run_date, RECORD_EXT));

        let bytes = serde_json::to_vec_pretty(&record).map_err(|e| HarnessError::StoreWrite {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        atomic_write(&path, &bytes).map_err(|source| HarnessError::StoreWrite {
            path: path.clone(),
            source,
        })?;

        tracing::info!(test = %record.name, status = %record.status, path = %path.display(), "Stored result");
        Ok(path)
    }

    /// All terminal results of `name` in append order
    ///
    /// A test that never ran has an empty history. Record files that cannot
    /// be read or parsed are skipped with a warning.
    pub fn history(&self, name: &TestName) -> Result<ResultHistory> {
        let dir = self.test_dir(name);
        let mut records = Vec::new();

        for path in record_files(&dir)? {
            match read_record(&path) {
                Ok(mut record) => {
                    if record.name != *name {
                        tracing::warn!(path = %path.display(), "Skipping record of another test");
                        continue;
                    }
                    if record.sequence == 0 {
                        record.sequence = sequence_of(&path).unwrap_or(0);
                    }
                    records.push(record);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Skipping unreadable record: {}", e);
                }
            }
        }

        Ok(ResultHistory::new(records))
    }

    pub fn latest(&self, name: &TestName) -> Result<Option<TestResult>> {
        Ok(self.history(name)?.latest().cloned())
    }

    /// Names of every test with a storage directory
    pub fn test_names(&self) -> Result<Vec<TestName>> {
        let entries = fs::read_dir(&self.root).map_err(|source| HarnessError::StoreRead {
            path: self.root.clone(),
            source,
        })?;

        let mut names = Vec::new();
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(name) = TestName::new(name) {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Run date of the most recent record of `name`
    pub fn last_run_date(&self, name: &TestName) -> Result<Option<String>> {
        Ok(self.latest(name)?.map(|r| r.run_date))
    }
}

fn record_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(HarnessError::StoreRead {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| is_record_file(p))
        .collect();
    files.sort();
    Ok(files)
}

fn is_record_file(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !file_name.starts_with('.') && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXT)
}

fn sequence_of(path: &Path) -> Option<u64> {
    let file_name = path.file_name()?.to_str()?;
    let (prefix, _) = file_name.split_once('-')?;
    prefix.parse().ok()
}

fn next_sequence(dir: &Path) -> io::Result<u64> {
    let mut max = 0;
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if is_record_file(&path) {
            max = max.max(sequence_of(&path).unwrap_or(0));
        }
    }
    Ok(max + 1)
}

fn read_record(path: &Path) -> anyhow::Result<TestResult> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write `bytes` to `path` through a synced temporary sibling and a rename
fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", path.display()),
        ));
    }

    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("record");
    let tmp = path.with_file_name(format!(".{}.tmp.{}", file_name, std::process::id()));

    let write = || -> io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// A path equal to `path`, or with `-2`, `-3`, ... appended to its stem if taken
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut i = 2;
    loop {
        let candidate = path.with_file_name(format!("{}-{}{}", stem, i, ext));
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Status;
    use crate::revision::Revision;

    fn done(name: &str, date: &str) -> TestResult {
        let mut r = TestResult::new(
            TestName::new(name).unwrap(),
            &Revision::new("abc123", "lib 1.0"),
            date,
            1,
        );
        r.set_status(Status::Done);
        r
    }

    #[test]
    fn test_append_rejects_running() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path()).unwrap();
        let mut r = done("t1", "2024-01-01-00:00:00");
        r.set_status(Status::Running);
        assert!(matches!(store.append(&r), Err(HarnessError::NonTerminal(_))));
        assert!(store.history(&r.name).unwrap().is_empty());
    }

    #[test]
    fn test_sequence_increments() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path()).unwrap();
        let first = store.append(&done("t1", "2024-01-01-00:00:00")).unwrap();
        let second = store.append(&done("t1", "2024-01-01-00:00:00")).unwrap();
        assert_ne!(first, second);
        assert_eq!(sequence_of(&first), Some(1));
        assert_eq!(sequence_of(&second), Some(2));
    }

    #[test]
    fn test_temporary_and_corrupt_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path()).unwrap();
        store.append(&done("t1", "2024-01-01-00:00:00")).unwrap();

        let test_dir = dir.path().join("t1");
        fs::write(test_dir.join(".00000002-x.json.tmp.1"), b"{\"name\":").unwrap();
        fs::write(test_dir.join("00000003-2024-01-03-00:00:00.json"), b"{\"name\":").unwrap();

        let history = store.history(&TestName::new("t1").unwrap()).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_test_names_lists_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path()).unwrap();
        store.append(&done("beta", "2024-01-01-00:00:00")).unwrap();
        store.append(&done("alpha", "2024-01-01-00:00:00")).unwrap();
        fs::write(dir.path().join("README"), b"notes").unwrap();

        let names: Vec<String> = store
            .test_names()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_unique_path_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t1-2024.log");
        assert_eq!(unique_path(&path), path);
        fs::write(&path, b"").unwrap();
        assert_eq!(unique_path(&path), dir.path().join("t1-2024-2.log"));
        fs::write(dir.path().join("t1-2024-2.log"), b"").unwrap();
        assert_eq!(unique_path(&path), dir.path().join("t1-2024-3.log"));
    }
}
