//! The job being followed, persisted so `run --resume` can re-attach after a restart.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snabbt_core::JobId;
use snabbt_engine::{JobMode, StartedJob};
use sync_logging::{sync_info, sync_warn};
use tempfile::NamedTempFile;
use thiserror::Error;

const SESSION_FILENAME: &str = ".snabbt_session.ron";

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("state directory {0:?} is not usable: {1}")]
    StateDir(PathBuf, String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode session: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub job_id: String,
    pub base_url: String,
    pub started_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(job_id: &JobId, base_url: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.as_str().to_string(),
            base_url: base_url.to_string(),
            started_at,
        }
    }

    pub fn started_job(&self) -> StartedJob {
        let job_id = JobId::new(self.job_id.clone());
        let mode = if job_id.is_local() {
            JobMode::Fallback
        } else {
            JobMode::Live
        };
        StartedJob { job_id, mode }
    }
}

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILENAME)
    }

    /// Unreadable or corrupt files are logged and treated as absent.
    pub fn load(&self) -> Option<SessionRecord> {
        let path = self.path();
        let content = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                sync_warn!("Failed to read session from {:?}: {}", path, err);
                return None;
            }
        };
        match ron::from_str(&content) {
            Ok(record) => Some(record),
            Err(err) => {
                sync_warn!("Failed to parse session from {:?}: {}", path, err);
                None
            }
        }
    }

    /// Writes to a temp file in the same directory, then renames over the target.
    pub fn save(&self, record: &SessionRecord) -> Result<PathBuf, SessionStoreError> {
        ensure_dir(&self.dir)?;
        let content = ron::ser::to_string_pretty(record, ron::ser::PrettyConfig::new())
            .map_err(|err| SessionStoreError::Encode(err.to_string()))?;

        let target = self.path();
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|err| SessionStoreError::Io(err.error))?;
        sync_info!("Saved session for job {} to {:?}", record.job_id, target);
        Ok(target)
    }

    pub fn clear(&self) -> Result<(), SessionStoreError> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn ensure_dir(dir: &Path) -> Result<(), SessionStoreError> {
    if dir.exists() {
        let meta =
            fs::metadata(dir).map_err(|e| SessionStoreError::StateDir(dir.into(), e.to_string()))?;
        if !meta.is_dir() {
            return Err(SessionStoreError::StateDir(
                dir.into(),
                "path is not a directory".into(),
            ));
        }
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| SessionStoreError::StateDir(dir.into(), e.to_string()))
}
