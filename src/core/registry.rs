//! Shared archive registry
//!
//! Every session that touches the same backing file must see the same
//! in-memory archive. The registry maps real paths to weak references of
//! live archives: [`ArchiveRegistry::get_or_open`] returns the live instance
//! or loads a new one, and when the last [`ArchiveHandle`] goes away the
//! archive is flushed to its backing file and dropped.
//!
//! Registries are `Rc`-based and therefore stay on the thread that created
//! them. Two registries never share instances, even for the same file; the
//! last one to flush wins.

use crate::archive::Archive;
use crate::config::FlushPolicy;
use crate::error::Result;
use crate::io::ArchiveFile;
use ahash::AHashMap;
use std::cell::{Ref, RefCell, RefMut};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use tracing::{debug, error, info, warn};

type Entries = RefCell<AHashMap<PathBuf, Weak<SharedArchive>>>;

/// Key an archive is registered under
///
/// Existing files are canonicalized, so different spellings of one file (or
/// names reached through filesystem symlinks) share an instance. A file that
/// does not exist yet is keyed by its canonical parent and file name, which
/// is what canonicalization gives once it has been created.
fn real_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }

    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            fs::canonicalize(parent)
                .map(|parent| parent.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

/// One live archive together with its backing file
#[derive(Debug)]
struct SharedArchive {
    file: ArchiveFile,
    archive: RefCell<Archive>,
    policy: FlushPolicy,
    /// Registry map, for removing the entry on drop
    entries: Weak<Entries>,
}

impl SharedArchive {
    /// Rewrite the backing file if the policy asks for it
    ///
    /// Returns `true` when the file was written.
    fn flush(&self) -> Result<bool> {
        let mut archive = self.archive.borrow_mut();

        if !archive.is_valid() {
            warn!(
                "Not flushing invalid archive {}",
                self.file.path().display()
            );
            return Ok(false);
        }

        if self.policy == FlushPolicy::Modified && !archive.is_modified() {
            return Ok(false);
        }

        let written = self
            .file
            .write_with(|writer| archive.write_to(writer))?;
        archive.mark_saved();

        info!(
            "Flushed archive {} ({} bytes)",
            self.file.path().display(),
            written
        );
        Ok(true)
    }
}

impl Drop for SharedArchive {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!(
                "Failed to flush archive {} on release: {}",
                self.file.path().display(),
                e
            );
        }

        if let Some(entries) = self.entries.upgrade() {
            if let Ok(mut entries) = entries.try_borrow_mut() {
                let path = self.file.path();
                if entries.get(path).map_or(false, |weak| weak.strong_count() == 0) {
                    entries.remove(path);
                }
            }
        }
        debug!("Released archive {}", self.file.path().display());
    }
}

/// Counted reference to a registry-managed archive
///
/// Cloning the handle shares the archive. Dropping the last handle flushes
/// the archive according to the registry's [`FlushPolicy`].
#[derive(Debug, Clone)]
pub struct ArchiveHandle {
    shared: Rc<SharedArchive>,
}

impl ArchiveHandle {
    /// Real path of the backing file
    pub fn path(&self) -> &Path {
        self.shared.file.path()
    }

    /// Borrow the archive for reading
    ///
    /// Panics if the archive is mutably borrowed at the same time.
    pub fn archive(&self) -> Ref<'_, Archive> {
        self.shared.archive.borrow()
    }

    /// Borrow the archive for mutation
    ///
    /// Panics if the archive is borrowed at the same time.
    pub fn archive_mut(&self) -> RefMut<'_, Archive> {
        self.shared.archive.borrow_mut()
    }

    /// Rewrite the backing file now, subject to the flush policy
    pub fn flush(&self) -> Result<bool> {
        self.shared.flush()
    }

    /// True if both handles refer to the same archive instance
    pub fn ptr_eq(&self, other: &ArchiveHandle) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Number of live handles to this archive
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.shared)
    }
}

/// Maps real archive paths to their live in-memory instances
///
/// Cloning the registry shares the same map.
#[derive(Debug, Clone)]
pub struct ArchiveRegistry {
    entries: Rc<Entries>,
    policy: FlushPolicy,
}

impl ArchiveRegistry {
    pub fn new(policy: FlushPolicy) -> Self {
        ArchiveRegistry {
            entries: Rc::new(RefCell::new(AHashMap::new())),
            policy,
        }
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        self.policy
    }

    /// Return the live archive for `path`, loading it if needed
    ///
    /// A missing backing file yields an empty archive; the file is only
    /// created when that archive is flushed. A backing file that fails to
    /// decode yields an invalid archive that is never flushed.
    pub fn get_or_open<P: AsRef<Path>>(&self, path: P) -> Result<ArchiveHandle> {
        let key = real_path(path.as_ref());
        let path = key.as_path();

        if let Some(shared) = self.entries.borrow().get(path).and_then(Weak::upgrade) {
            return Ok(ArchiveHandle { shared });
        }

        let file = ArchiveFile::new(path);
        let mut archive = Archive::new();
        if file.exists() {
            let bytes = file.read_all()?;
            match archive.load(bytes) {
                Ok(()) => info!(
                    "Loaded archive {} ({} entries)",
                    path.display(),
                    archive.tree().len()
                ),
                Err(e) => warn!("Archive {} is invalid: {}", path.display(), e),
            }
        } else {
            debug!("New empty archive for {}", path.display());
        }

        let shared = Rc::new(SharedArchive {
            file,
            archive: RefCell::new(archive),
            policy: self.policy,
            entries: Rc::downgrade(&self.entries),
        });
        self.entries
            .borrow_mut()
            .insert(key, Rc::downgrade(&shared));

        Ok(ArchiveHandle { shared })
    }

    /// Live archive for `path`, without loading
    pub fn get<P: AsRef<Path>>(&self, path: P) -> Option<ArchiveHandle> {
        self.entries
            .borrow()
            .get(&real_path(path.as_ref()))
            .and_then(Weak::upgrade)
            .map(|shared| ArchiveHandle { shared })
    }

    /// True if an archive for `path` is currently alive
    pub fn is_open<P: AsRef<Path>>(&self, path: P) -> bool {
        self.get(path).is_some()
    }

    /// Number of live archives
    pub fn len(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ArchiveRegistry {
    fn default() -> Self {
        Self::new(FlushPolicy::default())
    }
}
