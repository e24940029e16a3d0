//! Atomic file replacement.

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn parent_dir_or_dot(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Write `dest` through a temporary file in the same directory.
///
/// The temporary file is flushed, synced and renamed over `dest` only when `write_fn`
/// succeeds. On any error it is removed and `dest` is left untouched.
pub(crate) fn atomic_write<T>(
    dest: impl AsRef<Path>,
    write_fn: impl FnOnce(&mut File) -> Result<T>,
) -> Result<T> {
    let dest = dest.as_ref();
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    let out = write_fn(tmp.as_file_mut())?;

    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| Error::Io(e.error))?;

    // The file is already in place; directory sync is best-effort.
    let _ = sync_parent_dir(dest);

    Ok(out)
}

fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    File::open(parent_dir_or_dot(path))?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        fs::write(&path, b"old").unwrap();

        atomic_write(&path, |f| Ok(f.write_all(b"new")?)).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_atomic_write_failure_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        fs::write(&path, b"old").unwrap();

        let result: Result<()> = atomic_write(&path, |f| {
            f.write_all(b"partial")?;
            Err(Error::InvalidData("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(fs::read(&path).unwrap(), b"old");

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
