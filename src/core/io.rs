//! Disk I/O for backing archive files

use crate::error::Result;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Real file an archive is loaded from and flushed to
///
/// Archives are always written whole. A new image goes to a temporary file
/// in the same directory and replaces the old one only once it is complete,
/// so a failed write leaves the previous contents in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    path: PathBuf,
}

impl ArchiveFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        ArchiveFile {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Get file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if a regular file exists at the path
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the complete file
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        let mut buffer = Vec::with_capacity(file.metadata().map(|m| m.len() as usize).unwrap_or(0));
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Replace the file contents with `bytes`
    pub fn write_all(&self, bytes: &[u8]) -> Result<()> {
        self.write_with(|writer| {
            writer.write_all(bytes)?;
            Ok(bytes.len() as u64)
        })?;
        Ok(())
    }

    /// Stream new contents through `emit` and swap them in
    ///
    /// Returns what `emit` reports as written. The data is synced to disk
    /// before the rename. If `emit` or any write fails, the temporary file is
    /// removed and the existing file is untouched.
    pub fn write_with<F>(&self, emit: F) -> Result<u64>
    where
        F: FnOnce(&mut BufWriter<NamedTempFile>) -> Result<u64>,
    {
        // Write through filesystem symlinks instead of replacing them
        let target = fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let temp = NamedTempFile::new_in(dir)?;
        if let Ok(metadata) = fs::metadata(&target) {
            temp.as_file().set_permissions(metadata.permissions())?;
        }

        let mut writer = BufWriter::new(temp);
        let written = emit(&mut writer)?;
        writer.flush()?;

        let temp = writer.into_inner().map_err(|e| e.into_error())?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| e.error)?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DciError;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_back() {
        let temp = TempDir::new().unwrap();
        let file = ArchiveFile::new(temp.path().join("a.dci"));
        assert!(!file.exists());

        file.write_all(b"first contents").unwrap();
        assert!(file.exists());
        assert_eq!(file.read_all().unwrap(), b"first contents");
    }

    #[test]
    fn test_write_truncates() {
        let temp = TempDir::new().unwrap();
        let file = ArchiveFile::new(temp.path().join("a.dci"));

        file.write_all(b"a much longer first image").unwrap();
        file.write_all(b"short").unwrap();
        assert_eq!(file.read_all().unwrap(), b"short");
    }

    #[test]
    fn test_read_missing_file() {
        let temp = TempDir::new().unwrap();
        let file = ArchiveFile::new(temp.path().join("missing.dci"));
        assert!(file.read_all().is_err());
    }

    #[test]
    fn test_directory_is_not_an_archive_file() {
        let temp = TempDir::new().unwrap();
        let file = ArchiveFile::new(temp.path());
        assert!(!file.exists());
    }

    #[test]
    fn test_failed_write_keeps_old_contents() {
        let temp = TempDir::new().unwrap();
        let file = ArchiveFile::new(temp.path().join("a.dci"));
        file.write_all(b"previous image").unwrap();

        let result = file.write_with(|writer| {
            writer.write_all(b"half of a new ")?;
            Err(DciError::TooManyRootEntries(0x0100_0000))
        });
        assert!(result.is_err());

        assert_eq!(file.read_all().unwrap(), b"previous image");
        // No temporary file is left behind
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_keeps_permissions_and_symlinks() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let real = temp.path().join("a.dci");
        std::fs::write(&real, b"old").unwrap();
        std::fs::set_permissions(&real, std::fs::Permissions::from_mode(0o644)).unwrap();
        let alias = temp.path().join("alias.dci");
        std::os::unix::fs::symlink(&real, &alias).unwrap();

        ArchiveFile::new(&alias).write_all(b"new").unwrap();

        assert!(std::fs::symlink_metadata(&alias).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read(&real).unwrap(), b"new");
        let mode = std::fs::metadata(&real).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
