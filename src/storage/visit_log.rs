use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{error, trace};

use crate::data_capture::types::VisitRecord;
use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::VisitLog;

/// Line-oriented visit log, opened in append mode for every record.
///
/// Reader tasks of different captures share one instance; the mutex keeps
/// their lines from interleaving.
pub struct FileVisitLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileVisitLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }
}

impl VisitLog for FileVisitLog {
    fn append(&self, record: &VisitRecord) -> Result<(), StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::WriteFailed("visit log lock poisoned".to_string()))?;

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                error!("Open append failed {}: {}", self.path.display(), e);
                StorageError::WriteFailed(format!("{}: {}", self.path.display(), e))
            })?;
        writeln!(f, "{}", record).map_err(|e| {
            error!("Write failed {}: {}", self.path.display(), e);
            StorageError::WriteFailed(format!("{}: {}", self.path.display(), e))
        })?;

        trace!("Appended visit to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn record(destination: &str) -> VisitRecord {
        VisitRecord {
            timestamp: Local.with_ymd_and_hms(2026, 10, 19, 12, 30, 5).unwrap(),
            session_id: Uuid::nil(),
            virtual_address: "10.8.0.2".into(),
            real_address: "203.0.113.5".into(),
            destination: destination.into(),
            hostname: None,
        }
    }

    #[test]
    fn test_appends_one_line_per_visit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("traffic.log");
        let log = FileVisitLog::new(&path);

        log.append(&record("93.184.216.34")).unwrap();
        log.append(&record("140.82.112.3")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "[2026-10-19 12:30:05] 00000000-0000-0000-0000-000000000000 (10.8.0.2/203.0.113.5) visited the site 93.184.216.34",
                "[2026-10-19 12:30:05] 00000000-0000-0000-0000-000000000000 (10.8.0.2/203.0.113.5) visited the site 140.82.112.3",
            ]
        );
    }

    #[test]
    fn test_unwritable_log_is_an_error() {
        let dir = TempDir::new().unwrap();
        let log = FileVisitLog::new(dir.path().join("missing").join("traffic.log"));
        assert!(matches!(
            log.append(&record("93.184.216.34")),
            Err(StorageError::WriteFailed(_))
        ));
    }
}
