// Timestamped registry snapshots

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::error::StoreError;

/// File name format of a snapshot, e.g. `06-05-2024 07-08-09.xlsx`.
pub const BACKUP_NAME_FORMAT: &str = "%d-%m-%Y %H-%M-%S";

/// Copy `source` into `backup_dir` under a timestamped name.
///
/// Two snapshots within the same second get a numeric suffix instead of
/// overwriting each other.
pub fn snapshot(source: &Path, backup_dir: &Path, now: NaiveDateTime) -> Result<PathBuf, StoreError> {
    fs::create_dir_all(backup_dir).map_err(|e| StoreError::io(backup_dir, e))?;

    let stem = now.format(BACKUP_NAME_FORMAT).to_string();
    let mut dest = backup_dir.join(format!("{stem}.xlsx"));
    let mut n = 1;
    while dest.exists() {
        dest = backup_dir.join(format!("{stem} ({n}).xlsx"));
        n += 1;
    }

    fs::copy(source, &dest).map_err(|e| StoreError::io(&dest, e))?;
    Ok(dest)
}
