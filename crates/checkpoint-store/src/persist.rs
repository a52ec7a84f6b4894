use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::errors::{CheckpointErrKind, CheckpointError};
use crate::model::CheckpointRecord;

const FILE_SUFFIX: &str = "checkpoint.json";

/// `<dir>/<job_key>.checkpoint.json`
pub fn record_path(dir: &Path, job_key: &str) -> Result<PathBuf, CheckpointError> {
    let key = job_key.trim();
    if key.is_empty() {
        return Err(CheckpointErrKind::InvalidKey("empty job key".into()).into());
    }
    let safe: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    Ok(dir.join(format!("{}.{}", safe, FILE_SUFFIX)))
}

pub fn load(path: &Path) -> Result<Option<CheckpointRecord>, CheckpointError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read(path)?;
    let record = serde_json::from_slice(&raw)
        .map_err(|err| CheckpointErrKind::Corrupt(format!("{}: {}", path.display(), err)))?;
    Ok(Some(record))
}

pub fn store(path: &Path, record: &CheckpointRecord) -> Result<(), CheckpointError> {
    let data = serde_json::to_vec_pretty(record)
        .map_err(|err| CheckpointErrKind::Corrupt(err.to_string()))?;
    write_atomic(path, &data)?;
    Ok(())
}

pub fn remove(path: &Path) -> Result<bool, CheckpointError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_keys_are_sanitized() {
        let path = record_path(Path::new("/state"), "batch 7/../x").unwrap();
        assert_eq!(path, Path::new("/state/batch_7____x.checkpoint.json"));
        assert!(record_path(Path::new("/state"), "  ").is_err());
    }

    #[test]
    fn corrupt_file_is_reported_not_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.checkpoint.json");
        fs::write(&path, b"{not json").unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err.kind(), CheckpointErrKind::Corrupt(_)));
    }

    #[test]
    fn remove_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!remove(&dir.path().join("none.checkpoint.json")).unwrap());
    }
}
