//! Virtual file-system adapter
//!
//! Makes entries of DCI archives addressable as ordinary files through
//! scheme-qualified names (`dci:<real path><internal path>`).
//!
//! - [`engine`] - The [`FileEngine`] capability trait, handler dispatch and
//!   the native fallback
//! - [`file`] - The archive-backed engine
//! - [`iterator`] - Filtered, lazy directory iteration
//! - [`pattern`] - Name globs for directory filters

pub mod engine;
pub mod file;
pub mod iterator;
pub mod pattern;


pub use engine::{
    EngineHandler, EngineRegistry, EntryFlags, FileEngine, FileNamePart, NativeFileEngine,
    OpenMode,
};
pub use file::{DciEngineHandler, DciFileEngine};
pub use iterator::{DirEntry, DirFilter, DirIterator};
pub use pattern::NamePattern;
