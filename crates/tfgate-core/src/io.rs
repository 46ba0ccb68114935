use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting state files.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Copy `path` to its sibling backup location (`<path>_backup`),
/// replacing any previous backup. Returns the backup path.
pub fn backup_copy(path: &Path) -> Result<std::path::PathBuf> {
    let backup = backup_path(path);
    std::fs::copy(path, &backup)?;
    Ok(backup)
}

/// The sibling backup location for `path`.
pub fn backup_path(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str("_backup");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("terraform.tfstate");
        atomic_write(&path, b"{\"serial\": 1}").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"serial\": 1}"
        );
    }

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/terraform.tfstate");
        atomic_write(&path, b"data").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn backup_copy_preserves_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("terraform.tfstate");
        std::fs::write(&path, b"original").unwrap();

        let backup = backup_copy(&path).unwrap();
        assert_eq!(backup, dir.path().join("terraform.tfstate_backup"));
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "original");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn backup_copy_replaces_stale_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("terraform.tfstate");
        std::fs::write(&path, b"fresh").unwrap();
        std::fs::write(dir.path().join("terraform.tfstate_backup"), b"stale").unwrap();

        backup_copy(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("terraform.tfstate_backup")).unwrap(),
            "fresh"
        );
    }

    #[test]
    fn backup_copy_fails_when_source_missing() {
        let dir = TempDir::new().unwrap();
        assert!(backup_copy(&dir.path().join("missing.tfstate")).is_err());
    }
}
