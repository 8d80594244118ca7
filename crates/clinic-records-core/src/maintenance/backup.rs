//! Store file backups.

use std::fs;
use std::path::{Path, PathBuf};

use crate::db::{Database, DbError, DbResult};

/// Default backup file name for the current local time,
/// `backup_clinic_<YYYYMMDD_HHMMSS>.db`.
pub fn backup_file_name() -> String {
    format!(
        "backup_clinic_{}.db",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    )
}

impl Database {
    /// Copy the store file to `destination`, or to a timestamped file beside
    /// the store when none is given. Returns the path written.
    ///
    /// Unlike reads, a failed backup is always an error.
    pub fn backup(&self, destination: Option<&Path>) -> DbResult<PathBuf> {
        let source = self.backing_file()?;
        let target = match destination {
            Some(path) => path.to_path_buf(),
            None => {
                let dir = source
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                dir.join(backup_file_name())
            }
        };
        copy_store(source, &target)?;
        Ok(target)
    }

    /// Copy the store file into `dir` under the timestamped default name.
    pub fn backup_to_dir(&self, dir: &Path) -> DbResult<PathBuf> {
        let source = self.backing_file()?;
        fs::create_dir_all(dir)?;
        let target = dir.join(backup_file_name());
        copy_store(source, &target)?;
        Ok(target)
    }

    fn backing_file(&self) -> DbResult<&Path> {
        self.path().ok_or_else(|| {
            DbError::InvalidArgument("an in-memory store has no file to back up".into())
        })
    }
}

fn copy_store(source: &Path, target: &Path) -> DbResult<()> {
    if target.exists() && fs::canonicalize(target)? == fs::canonicalize(source)? {
        return Err(DbError::InvalidArgument(format!(
            "backup destination {} is the store itself",
            target.display()
        )));
    }
    let bytes = fs::copy(source, target)?;
    tracing::info!(
        source = %source.display(),
        target = %target.display(),
        bytes,
        "Backed up store"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatientInput;

    #[test]
    fn test_backup_file_name_format() {
        let name = backup_file_name();
        assert!(name.starts_with("backup_clinic_"));
        assert!(name.ends_with(".db"));
        // backup_clinic_ + YYYYMMDD_HHMMSS + .db
        assert_eq!(name.len(), "backup_clinic_".len() + 15 + 3);
    }

    #[test]
    fn test_backup_default_location() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("clinic.db")).unwrap();
        db.create_patient(&PatientInput::new("Cruz", "Juan")).unwrap();

        let path = db.backup(None).unwrap();
        assert_eq!(path.parent(), Some(dir.path()));

        let copy = Database::open(&path).unwrap();
        assert_eq!(copy.patient_count().unwrap(), 1);
    }

    #[test]
    fn test_backup_to_dir_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("clinic.db")).unwrap();

        let backups = dir.path().join("backups").join("daily");
        let path = db.backup_to_dir(&backups).unwrap();
        assert!(path.starts_with(&backups));
        assert!(path.is_file());
    }

    #[test]
    fn test_backup_errors_are_surfaced() {
        let memory = Database::open_in_memory().unwrap();
        assert!(matches!(
            memory.backup(None).unwrap_err(),
            DbError::InvalidArgument(_)
        ));

        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("clinic.db");
        let db = Database::open(&store).unwrap();
        assert!(matches!(
            db.backup(Some(&store)).unwrap_err(),
            DbError::InvalidArgument(_)
        ));

        let missing_dir = dir.path().join("nope").join("backup.db");
        assert!(matches!(
            db.backup(Some(&missing_dir)).unwrap_err(),
            DbError::Io(_)
        ));
    }
}
