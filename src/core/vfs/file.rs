//! Archive-backed file engine
//!
//! A [`DciFileEngine`] is bound to one scheme-qualified name such as
//! `dci:/usr/share/icons/app.dci/256/normal.png`. Opening it copies the
//! entry into a private buffer; reads, writes and seeks act on that buffer,
//! and close or flush writes it back and rewrites the whole backing file.
//! Structural operations go straight to the shared archive and flush the
//! same way.

use super::engine::{EngineHandler, EntryFlags, FileEngine, FileNamePart, OpenMode};
use super::iterator::{DirEntry, DirFilter, DirIterator};
use crate::archive::Archive;
use crate::catalog::EntryKind;
use crate::config::VfsConfig;
use crate::error::{DciError, Result};
use crate::io::ArchiveFile;
use crate::path;
use crate::registry::{ArchiveHandle, ArchiveRegistry};
use crate::validation::{self, Resolve, SchemePath};
use std::io::{self, SeekFrom};
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, error};

/// Serves every name qualified with the configured scheme
#[derive(Debug, Clone)]
pub struct DciEngineHandler {
    config: Rc<VfsConfig>,
    registry: ArchiveRegistry,
}

impl DciEngineHandler {
    /// Handler with its own archive registry
    pub fn new(config: VfsConfig) -> Result<Self> {
        let registry = ArchiveRegistry::new(config.flush_policy);
        Self::with_registry(config, registry)
    }

    /// Handler sharing an existing registry
    pub fn with_registry(config: VfsConfig, registry: ArchiveRegistry) -> Result<Self> {
        config.validate()?;
        Ok(DciEngineHandler {
            config: Rc::new(config),
            registry,
        })
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    pub fn registry(&self) -> &ArchiveRegistry {
        &self.registry
    }

    /// Engine for a qualified name, without going through the trait object
    pub fn engine(&self, file_name: &str) -> Result<DciFileEngine> {
        DciFileEngine::new(file_name, Rc::clone(&self.config), self.registry.clone())
    }
}

impl EngineHandler for DciEngineHandler {
    fn create(&self, file_name: &str) -> Option<Box<dyn FileEngine>> {
        validation::split_scheme(file_name, &self.config.scheme)?;
        let engine = self.engine(file_name).ok()?;
        Some(Box::new(engine))
    }
}

/// Open state of an engine
#[derive(Debug)]
struct Session {
    handle: ArchiveHandle,
    internal: String,
    buffer: Vec<u8>,
    pos: usize,
    mode: OpenMode,
    /// Buffer differs from the stored entry
    dirty: bool,
}

/// File engine over an entry of a DCI archive
#[derive(Debug)]
pub struct DciFileEngine {
    name: String,
    config: Rc<VfsConfig>,
    registry: ArchiveRegistry,
    session: Option<Session>,
}

impl DciFileEngine {
    pub fn new(name: &str, config: Rc<VfsConfig>, registry: ArchiveRegistry) -> Result<Self> {
        if validation::split_scheme(name, &config.scheme).is_none() {
            return Err(DciError::NotSchemePath {
                scheme: config.scheme.clone(),
                path: name.to_string(),
            });
        }
        Ok(DciFileEngine {
            name: name.to_string(),
            config,
            registry,
            session: None,
        })
    }

    /// Split a qualified name into backing file and internal path
    ///
    /// Archives that are live in the registry count as existing even before
    /// their backing file is first written.
    fn locate(&self, name: &str, mode: Resolve) -> Result<SchemePath> {
        validation::resolve_scheme_path_with(
            name,
            &self.config.scheme,
            &self.config.suffix,
            mode,
            |candidate| self.registry.is_open(candidate),
        )
        .ok_or_else(|| DciError::Unresolved(name.to_string()))
    }

    /// Qualified name for an internal path of `real`
    fn qualify(&self, real: &Path, internal: &str) -> String {
        if internal == path::ROOT {
            format!("{}{}", self.config.prefix(), real.display())
        } else {
            format!("{}{}{}", self.config.prefix(), real.display(), internal)
        }
    }

    fn open_archive(&self, real: &Path) -> Result<ArchiveHandle> {
        let handle = self.registry.get_or_open(real)?;
        let archive = handle.archive();
        if !archive.is_valid() {
            let message = archive.last_error().unwrap_or("load failed").to_string();
            return Err(DciError::InvalidArchive(message));
        }
        drop(archive);
        Ok(handle)
    }

    /// Run a query against the archive holding `name`
    ///
    /// A live instance is used if there is one; otherwise the backing file is
    /// read into a throwaway archive, so queries never trigger a flush.
    fn inspect<T>(&self, name: &str, query: impl FnOnce(&Archive, &str) -> T) -> Result<T> {
        let located = self.locate(name, Resolve::Existing)?;

        if let Some(handle) = self.registry.get(&located.real) {
            let archive = handle.archive();
            return Ok(query(&*archive, &located.internal));
        }

        let archive = Archive::from_bytes(ArchiveFile::new(&located.real).read_all()?)?;
        Ok(query(&archive, &located.internal))
    }

    /// Apply a mutation to the archive holding `name`, then flush it
    fn mutate<T>(
        &self,
        name: &str,
        mode: Resolve,
        change: impl FnOnce(&mut Archive, &str) -> Result<T>,
    ) -> Result<T> {
        let located = self.locate(name, mode)?;
        let handle = self.open_archive(&located.real)?;
        let value = {
            let mut archive = handle.archive_mut();
            change(&mut *archive, &located.internal)?
        };
        handle.flush()?;
        Ok(value)
    }

    /// Like `mutate`, for operations between this engine's entry and `other`
    fn mutate_pair<T>(
        &self,
        other: &str,
        change: impl FnOnce(&mut Archive, &str, &str) -> Result<T>,
    ) -> Result<T> {
        let from = self.locate(&self.name, Resolve::Existing)?;
        let to = self.locate(other, Resolve::Create)?;
        if from.real != to.real {
            return Err(DciError::CrossArchive {
                from: self.name.clone(),
                to: other.to_string(),
            });
        }

        let handle = self.open_archive(&from.real)?;
        let value = {
            let mut archive = handle.archive_mut();
            change(&mut *archive, &from.internal, &to.internal)?
        };
        handle.flush()?;
        Ok(value)
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(DciError::NotOpen)
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or(DciError::NotOpen)
    }

    fn open_session(&mut self, mode: OpenMode) -> Result<()> {
        if self.session.is_some() {
            return Err(DciError::AlreadyOpen);
        }
        if mode.text {
            return Err(DciError::UnsupportedMode("text".to_string()));
        }
        if !mode.read && !mode.write {
            return Err(DciError::UnsupportedMode(
                "neither read nor write".to_string(),
            ));
        }

        let resolve = if mode.write {
            Resolve::Create
        } else {
            Resolve::Existing
        };
        let located = self.locate(&self.name, resolve)?;
        let handle = self.open_archive(&located.real)?;
        let internal = located.internal;

        let (buffer, dirty) = {
            let mut archive = handle.archive_mut();
            let kind = archive.kind(&internal);
            if kind.is_some() && mode.new_only {
                return Err(DciError::AlreadyExists(internal));
            }
            if kind == Some(EntryKind::Directory) {
                return Err(DciError::IsADirectory(internal));
            }

            let target = archive.resolve(&internal)?;
            match archive.kind(&target) {
                Some(EntryKind::File) if mode.truncates() => (Vec::new(), true),
                Some(EntryKind::File) => (archive.read(&target)?.to_vec(), false),
                Some(_) => return Err(DciError::IsADirectory(target)),
                None => {
                    if !mode.write || mode.existing_only {
                        return Err(DciError::NotFound(internal));
                    }
                    archive.write_file(&internal, &[], true)?;
                    (Vec::new(), false)
                }
            }
        };

        debug!("Opened {} ({} bytes)", self.name, buffer.len());
        let pos = if mode.append { buffer.len() } else { 0 };
        self.session = Some(Session {
            handle,
            internal,
            buffer,
            pos,
            mode,
            dirty,
        });
        Ok(())
    }

    /// Write the buffer back if needed and flush the archive
    fn sync(session: &mut Session) -> Result<()> {
        if session.dirty {
            session
                .handle
                .archive_mut()
                .write_file(&session.internal, &session.buffer, true)?;
            session.dirty = false;
        }
        session.handle.flush()?;
        Ok(())
    }

    /// Write the session back and end it
    ///
    /// On failure the session stays open with its buffer intact, so the
    /// caller can fix the cause and close again.
    fn close_session(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        Self::sync(session)?;
        self.session = None;
        debug!("Closed {}", self.name);
        Ok(())
    }

    fn read_buffer(&mut self, buf: &mut [u8]) -> Result<usize> {
        let session = self.session_mut()?;
        if !session.mode.read {
            return Err(DciError::UnsupportedMode("not open for reading".to_string()));
        }
        if session.pos >= session.buffer.len() {
            return Ok(0);
        }

        let available = &session.buffer[session.pos..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        session.pos += n;
        Ok(n)
    }

    fn write_buffer(&mut self, buf: &[u8]) -> Result<usize> {
        let session = self.session_mut()?;
        if !session.mode.write {
            return Err(DciError::UnsupportedMode("not open for writing".to_string()));
        }
        if session.mode.append {
            session.pos = session.buffer.len();
        }

        let end = session
            .pos
            .checked_add(buf.len())
            .ok_or(DciError::FileTooLarge(u64::MAX))?;
        if session.buffer.len() < end {
            grow(&mut session.buffer, end)?;
        }
        session.buffer[session.pos..end].copy_from_slice(buf);
        session.pos = end;
        session.dirty = true;
        Ok(buf.len())
    }

    fn resize(&mut self, size: u64) -> Result<()> {
        let size = usize::try_from(size).map_err(|_| DciError::FileTooLarge(size))?;

        if let Some(session) = self.session.as_mut() {
            if !session.mode.write {
                return Err(DciError::UnsupportedMode("not open for writing".to_string()));
            }
            if size > session.buffer.len() {
                grow(&mut session.buffer, size)?;
            } else {
                session.buffer.truncate(size);
            }
            session.dirty = true;
            return Ok(());
        }

        self.mutate(&self.name, Resolve::Existing, |archive, internal| {
            let mut data = archive.read(internal)?.to_vec();
            if size > data.len() {
                grow(&mut data, size)?;
            } else {
                data.truncate(size);
            }
            archive.write_file(internal, &data, true)
        })
    }

    fn rename_to(&mut self, new_name: &str, overwrite: bool) -> Result<()> {
        let to = self.mutate_pair(new_name, |archive, from, to| {
            archive.rename(from, to, overwrite)?;
            Ok(to.to_string())
        })?;

        if let Some(session) = self.session.as_mut() {
            session.internal = to;
        }
        self.name = new_name.to_string();
        Ok(())
    }

    fn iterator(&self, filter: DirFilter) -> Result<DirIterator> {
        let located = self.locate(&self.name, Resolve::Existing)?;
        let handle = self.open_archive(&located.real)?;
        if handle.archive().kind(&located.internal) != Some(EntryKind::Directory) {
            return Err(DciError::NotADirectory(located.internal));
        }

        let prefix = self.qualify(&located.real, path::ROOT);
        Ok(DirIterator::new(handle, located.internal, prefix, filter))
    }

    /// Name text split at its last separator, for names that do not resolve
    fn split_name(&self) -> (&str, &str) {
        match self.name.rfind(path::SEPARATOR) {
            Some(idx) => (&self.name[..idx], &self.name[idx + 1..]),
            None => ("", self.name.as_str()),
        }
    }
}

impl FileEngine for DciFileEngine {
    fn file_name(&self, part: FileNamePart) -> String {
        let located = self.locate(&self.name, Resolve::Create).ok();

        match (part, located) {
            (FileNamePart::Default, _) => self.name.clone(),
            (FileNamePart::AbsoluteName, Some(l)) => self.qualify(&l.real, &l.internal),
            (FileNamePart::AbsoluteName, None) => self.name.clone(),
            (FileNamePart::BaseName, Some(l)) if l.internal != path::ROOT => {
                path::file_name(&l.internal).to_string()
            }
            (FileNamePart::BaseName, Some(l)) => l
                .real
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            (FileNamePart::BaseName, None) => self.split_name().1.to_string(),
            (FileNamePart::PathName, Some(l)) => match path::parent(&l.internal) {
                Some(parent) => self.qualify(&l.real, parent),
                None => l
                    .real
                    .parent()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            },
            (FileNamePart::PathName, None) => self.split_name().0.to_string(),
            (FileNamePart::LinkName, Some(l)) => self
                .inspect(&self.name, |archive, internal| archive.symlink_target(internal))
                .ok()
                .and_then(|target| target.ok())
                .map(|target| self.qualify(&l.real, &target))
                .unwrap_or_default(),
            (FileNamePart::LinkName, None) => String::new(),
        }
    }

    fn set_file_name(&mut self, name: &str) -> io::Result<()> {
        if validation::split_scheme(name, &self.config.scheme).is_none() {
            return Err(DciError::NotSchemePath {
                scheme: self.config.scheme.clone(),
                path: name.to_string(),
            }
            .into());
        }
        self.close_session()?;
        self.name = name.to_string();
        Ok(())
    }

    fn open(&mut self, mode: OpenMode) -> io::Result<()> {
        Ok(self.open_session(mode)?)
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(self.close_session()?)
    }

    fn flush(&mut self) -> io::Result<()> {
        let session = self.session_mut()?;
        Ok(Self::sync(session)?)
    }

    fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_buffer(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_buffer(buf)?)
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        let pos = usize::try_from(pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek position out of range"))?;
        self.session_mut()?.pos = pos;
        Ok(())
    }

    fn pos(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.pos as u64)
    }

    fn size(&self) -> u64 {
        if let Ok(session) = self.session() {
            return session.buffer.len() as u64;
        }
        self.inspect(&self.name, |archive, internal| archive.size(internal))
            .ok()
            .and_then(|size| size.ok())
            .unwrap_or(0)
    }

    fn set_size(&mut self, size: u64) -> io::Result<()> {
        Ok(self.resize(size)?)
    }

    fn at_end(&self) -> bool {
        self.session
            .as_ref()
            .map_or(true, |s| s.pos >= s.buffer.len())
    }

    fn flags(&self) -> EntryFlags {
        self.inspect(&self.name, |archive, internal| {
            let Some(kind) = archive.kind(internal) else {
                return EntryFlags::default();
            };
            let resolves_to_file = archive
                .resolve(internal)
                .ok()
                .and_then(|target| archive.kind(&target))
                == Some(EntryKind::File);

            EntryFlags {
                exists: true,
                file: resolves_to_file,
                directory: kind.is_directory(),
                symlink: kind.is_symlink(),
            }
        })
        .unwrap_or_default()
    }

    fn remove(&mut self) -> io::Result<()> {
        Ok(self.mutate(&self.name, Resolve::Existing, |archive, internal| {
            archive.remove(internal)
        })?)
    }

    fn rename(&mut self, new_name: &str) -> io::Result<()> {
        Ok(self.rename_to(new_name, false)?)
    }

    fn rename_overwrite(&mut self, new_name: &str) -> io::Result<()> {
        Ok(self.rename_to(new_name, true)?)
    }

    fn copy(&mut self, new_name: &str) -> io::Result<()> {
        Ok(self.mutate_pair(new_name, |archive, from, to| archive.copy(from, to))?)
    }

    fn link(&mut self, new_name: &str) -> io::Result<()> {
        Ok(self.mutate_pair(new_name, |archive, from, to| archive.link(from, to))?)
    }

    fn mkdir(&self, dir: &str, create_parents: bool) -> io::Result<()> {
        Ok(self.mutate(dir, Resolve::Create, |archive, internal| {
            if create_parents {
                archive.mkdir_all(internal)
            } else {
                archive.mkdir(internal)
            }
        })?)
    }

    fn rmdir(&self, dir: &str) -> io::Result<()> {
        Ok(self.mutate(dir, Resolve::Existing, |archive, internal| {
            if internal == path::ROOT {
                return Err(DciError::RootOperation("removed"));
            }
            match archive.kind(internal) {
                Some(EntryKind::Directory) => archive.remove(internal),
                Some(_) => Err(DciError::NotADirectory(internal.to_string())),
                None => Err(DciError::NotFound(internal.to_string())),
            }
        })?)
    }

    fn iterate(&self, filter: DirFilter) -> io::Result<Box<dyn Iterator<Item = DirEntry>>> {
        Ok(Box::new(self.iterator(filter)?))
    }
}

impl io::Read for DciFileEngine {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_buffer(buf)?)
    }
}

impl io::Write for DciFileEngine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_buffer(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        FileEngine::flush(self)
    }
}

impl io::Seek for DciFileEngine {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let session = self.session_mut()?;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => (session.buffer.len() as u64).checked_add_signed(delta),
            SeekFrom::Current(delta) => (session.pos as u64).checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;

        FileEngine::seek(self, target)?;
        Ok(target)
    }
}

/// Zero-extend `buffer` to `len`, failing instead of aborting when the
/// allocation cannot be made
fn grow(buffer: &mut Vec<u8>, len: usize) -> Result<()> {
    buffer
        .try_reserve_exact(len - buffer.len())
        .map_err(|_| DciError::FileTooLarge(len as u64))?;
    buffer.resize(len, 0);
    Ok(())
}

impl Drop for DciFileEngine {
    fn drop(&mut self) {
        if let Err(e) = self.close_session() {
            error!("Failed to close {}: {}", self.name, e);
        }
    }
}
