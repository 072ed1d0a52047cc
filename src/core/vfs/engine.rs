//! File engine abstraction
//!
//! A host file layer asks an [`EngineRegistry`] for the engine that serves a
//! path. Registered [`EngineHandler`]s are consulted in order; a handler
//! declines paths it does not recognize, and paths nobody claims are served
//! by [`NativeFileEngine`].

use super::iterator::{DirEntry, DirFilter};
use crate::catalog::EntryKind;
use crate::error::DciError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// How a file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenMode {
    pub read: bool,
    pub write: bool,
    /// Every write goes to the end of the file
    pub append: bool,
    /// Discard existing contents on open
    pub truncate: bool,
    /// Fail if the file already exists
    pub new_only: bool,
    /// Fail if the file does not exist
    pub existing_only: bool,
    /// Newline translation; not supported by archive engines
    pub text: bool,
}

impl OpenMode {
    pub fn read_only() -> Self {
        OpenMode {
            read: true,
            ..Default::default()
        }
    }

    pub fn write_only() -> Self {
        OpenMode {
            write: true,
            ..Default::default()
        }
    }

    pub fn read_write() -> Self {
        OpenMode {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    pub fn append(mut self) -> Self {
        self.write = true;
        self.append = true;
        self
    }

    pub fn truncate(mut self) -> Self {
        self.truncate = true;
        self
    }

    pub fn new_only(mut self) -> Self {
        self.new_only = true;
        self
    }

    pub fn existing_only(mut self) -> Self {
        self.existing_only = true;
        self
    }

    pub fn text(mut self) -> Self {
        self.text = true;
        self
    }

    /// True if opening discards the current contents
    ///
    /// Write-only opens truncate unless they append.
    pub fn truncates(&self) -> bool {
        self.truncate || (self.write && !self.read && !self.append)
    }
}

/// What exists at an engine's path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags {
    pub exists: bool,
    /// A file, or a symlink resolving to one
    pub file: bool,
    pub directory: bool,
    pub symlink: bool,
}

/// Which form of the engine's name to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileNamePart {
    /// The name as given
    Default,
    /// Last path segment
    BaseName,
    /// Everything before the last segment
    PathName,
    /// Normalized full name
    AbsoluteName,
    /// Full name of the symlink target; empty if not a symlink
    LinkName,
}

/// File operations a host file layer needs from a backend
///
/// An engine is bound to one file name. Operations that take a name
/// (`rename`, `copy`, `link`, `mkdir`, `rmdir`) interpret it in the
/// engine's own namespace.
pub trait FileEngine {
    fn file_name(&self, part: FileNamePart) -> String;

    /// Rebind the engine to another name; closes an open session first
    fn set_file_name(&mut self, name: &str) -> io::Result<()>;

    fn open(&mut self, mode: OpenMode) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    fn is_open(&self) -> bool;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn seek(&mut self, pos: u64) -> io::Result<()>;
    fn pos(&self) -> u64;
    fn size(&self) -> u64;
    fn set_size(&mut self, size: u64) -> io::Result<()>;
    fn at_end(&self) -> bool;

    fn exists(&self) -> bool {
        self.flags().exists
    }
    fn flags(&self) -> EntryFlags;

    fn remove(&mut self) -> io::Result<()>;
    fn rename(&mut self, new_name: &str) -> io::Result<()>;
    fn rename_overwrite(&mut self, new_name: &str) -> io::Result<()>;
    fn copy(&mut self, new_name: &str) -> io::Result<()>;
    /// Create a symlink at `new_name` pointing to this file
    fn link(&mut self, new_name: &str) -> io::Result<()>;
    fn mkdir(&self, dir: &str, create_parents: bool) -> io::Result<()>;
    fn rmdir(&self, dir: &str) -> io::Result<()>;

    /// Children of this directory, filtered, yielded one at a time
    fn iterate(&self, filter: DirFilter) -> io::Result<Box<dyn Iterator<Item = DirEntry>>>;

    /// Names of this directory's children
    fn entry_list(&self, filter: DirFilter) -> io::Result<Vec<String>> {
        Ok(self.iterate(filter)?.map(|entry| entry.name).collect())
    }

    fn case_sensitive(&self) -> bool {
        true
    }

    fn is_relative_path(&self) -> bool {
        false
    }
}

/// Decides whether it serves a path and builds the engine if so
pub trait EngineHandler {
    fn create(&self, file_name: &str) -> Option<Box<dyn FileEngine>>;
}

/// Ordered list of handlers with a native fallback
#[derive(Default)]
pub struct EngineRegistry {
    handlers: Vec<Box<dyn EngineHandler>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: EngineHandler + 'static>(&mut self, handler: H) {
        self.handlers.push(Box::new(handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Engine for `file_name`: the first handler that accepts it, or native
    pub fn engine_for(&self, file_name: &str) -> Box<dyn FileEngine> {
        self.handlers
            .iter()
            .find_map(|handler| handler.create(file_name))
            .unwrap_or_else(|| Box::new(NativeFileEngine::new(file_name)))
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Engine over the host file system
#[derive(Debug)]
pub struct NativeFileEngine {
    path: PathBuf,
    file: Option<File>,
    append: bool,
}

impl NativeFileEngine {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        NativeFileEngine {
            path: path.as_ref().to_path_buf(),
            file: None,
            append: false,
        }
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file.as_mut().ok_or_else(|| DciError::NotOpen.into())
    }

    fn kind_of(metadata: &fs::Metadata) -> EntryKind {
        if metadata.file_type().is_symlink() {
            EntryKind::Symlink
        } else if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

impl FileEngine for NativeFileEngine {
    fn file_name(&self, part: FileNamePart) -> String {
        match part {
            FileNamePart::Default => self.path.display().to_string(),
            FileNamePart::BaseName => self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            FileNamePart::PathName => self
                .path
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            FileNamePart::AbsoluteName => fs::canonicalize(&self.path)
                .unwrap_or_else(|_| self.path.clone())
                .display()
                .to_string(),
            FileNamePart::LinkName => fs::read_link(&self.path)
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    fn set_file_name(&mut self, name: &str) -> io::Result<()> {
        self.close()?;
        self.path = PathBuf::from(name);
        Ok(())
    }

    fn open(&mut self, mode: OpenMode) -> io::Result<()> {
        if self.file.is_some() {
            return Err(DciError::AlreadyOpen.into());
        }
        let file = OpenOptions::new()
            .read(mode.read)
            .write(mode.write && !mode.append)
            .append(mode.append)
            .truncate(mode.truncates() && !mode.append)
            .create(mode.write && !mode.existing_only && !mode.new_only)
            .create_new(mode.write && mode.new_only)
            .open(&self.path)?;

        debug!("Opened native file {}", self.path.display());
        self.file = Some(file);
        self.append = mode.append;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file_mut()?.flush()
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file_mut()?.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file_mut()?.write(buf)
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.file_mut()?.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn pos(&self) -> u64 {
        // `Seek` is implemented for `&File`
        match &self.file {
            Some(file) => {
                let mut file: &File = file;
                file.stream_position().unwrap_or(0)
            }
            None => 0,
        }
    }

    fn size(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    fn set_size(&mut self, size: u64) -> io::Result<()> {
        match &self.file {
            Some(file) => file.set_len(size),
            None => OpenOptions::new().write(true).open(&self.path)?.set_len(size),
        }
    }

    fn at_end(&self) -> bool {
        self.pos() >= self.size()
    }

    fn flags(&self) -> EntryFlags {
        let Ok(link) = fs::symlink_metadata(&self.path) else {
            return EntryFlags::default();
        };
        let target = fs::metadata(&self.path).ok();
        EntryFlags {
            exists: true,
            file: target.as_ref().map_or(false, |m| m.is_file()),
            directory: target.as_ref().map_or(false, |m| m.is_dir()),
            symlink: link.file_type().is_symlink(),
        }
    }

    fn remove(&mut self) -> io::Result<()> {
        fs::remove_file(&self.path)
    }

    fn rename(&mut self, new_name: &str) -> io::Result<()> {
        if Path::new(new_name).exists() {
            return Err(DciError::AlreadyExists(new_name.to_string()).into());
        }
        self.rename_overwrite(new_name)
    }

    fn rename_overwrite(&mut self, new_name: &str) -> io::Result<()> {
        fs::rename(&self.path, new_name)?;
        self.path = PathBuf::from(new_name);
        Ok(())
    }

    fn copy(&mut self, new_name: &str) -> io::Result<()> {
        fs::copy(&self.path, new_name)?;
        Ok(())
    }

    #[cfg(unix)]
    fn link(&mut self, new_name: &str) -> io::Result<()> {
        std::os::unix::fs::symlink(&self.path, new_name)
    }

    #[cfg(not(unix))]
    fn link(&mut self, new_name: &str) -> io::Result<()> {
        Err(DciError::UnsupportedMode(format!("symlink {}", new_name)).into())
    }

    fn mkdir(&self, dir: &str, create_parents: bool) -> io::Result<()> {
        if create_parents {
            fs::create_dir_all(dir)
        } else {
            fs::create_dir(dir)
        }
    }

    fn rmdir(&self, dir: &str) -> io::Result<()> {
        fs::remove_dir_all(dir)
    }

    fn iterate(&self, filter: DirFilter) -> io::Result<Box<dyn Iterator<Item = DirEntry>>> {
        let entries = fs::read_dir(&self.path)?;
        Ok(Box::new(entries.filter_map(move |entry| {
            let entry = entry.ok()?;
            let kind = Self::kind_of(&fs::symlink_metadata(entry.path()).ok()?);
            let name = entry.file_name().to_string_lossy().into_owned();
            if !filter.accepts(&name, kind) {
                return None;
            }
            Some(DirEntry {
                name,
                path: entry.path().display().to_string(),
                kind,
            })
        })))
    }
}

impl Drop for NativeFileEngine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Failed to close {}: {}", self.path.display(), e);
        }
    }
}
