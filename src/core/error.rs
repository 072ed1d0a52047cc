use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DciError {
    // Format errors: any of these makes the whole load fail.
    #[error("Invalid magic number in header")]
    InvalidMagic,

    #[error("Unsupported format version: {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("Truncated archive: need {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Invalid entry kind tag {tag} at offset {offset}")]
    InvalidKind { offset: usize, tag: u8 },

    #[error("Invalid entry name at offset {offset}: {reason}")]
    InvalidRecordName { offset: usize, reason: String },

    #[error("Entry at offset {offset} overruns its parent: payload ends at {end}, parent ends at {limit}")]
    PayloadOverrun {
        offset: usize,
        end: usize,
        limit: usize,
    },

    #[error("Root child count mismatch: header declares {declared}, found {actual}")]
    ChildCountMismatch { declared: u32, actual: u32 },

    #[error("Duplicate entry in archive: {0}")]
    DuplicateEntry(String),

    #[error("Symlink target at offset {0} is not valid UTF-8")]
    InvalidLinkText(usize),

    #[error("Root has too many children to encode: {0}")]
    TooManyRootEntries(usize),

    // Mutation errors: the tree is left untouched.
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Parent directory does not exist: {0}")]
    ParentNotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Not a symlink: {0}")]
    NotASymlink(String),

    #[error("Name too long: '{name}' is {len} bytes (max {max})")]
    NameTooLong { name: String, len: usize, max: usize },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Symlink {link} would point to directory {target}")]
    SymlinkToDirectory { link: String, target: String },

    #[error("Too many levels of symbolic links: {0}")]
    SymlinkLoop(String),

    #[error("Symlink target of {link} escapes the archive root: {target}")]
    SymlinkEscapesRoot { link: String, target: String },

    #[error("Source and destination are the same: {0}")]
    SamePath(String),

    #[error("Cannot move {from} into its own subtree at {to}")]
    MoveIntoSelf { from: String, to: String },

    #[error("Cannot replace {to}: it contains {from}")]
    ReplaceAncestor { from: String, to: String },

    #[error("The root directory cannot be {0}")]
    RootOperation(&'static str),

    #[error("Archive is not valid: {0}")]
    InvalidArchive(String),

    // Session and configuration errors.
    #[error("Unsupported open mode: {0}")]
    UnsupportedMode(String),

    #[error("Not a {scheme}: path: {path}")]
    NotSchemePath { scheme: String, path: String },

    #[error("Cannot resolve an archive for path: {0}")]
    Unresolved(String),

    #[error("Operation crosses archives: {from} -> {to}")]
    CrossArchive { from: String, to: String },

    #[error("File too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("File is not open")]
    NotOpen,

    #[error("File is already open")]
    AlreadyOpen,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DciError {
    /// True for errors raised while decoding archive bytes
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            DciError::InvalidMagic
                | DciError::UnsupportedVersion { .. }
                | DciError::Truncated { .. }
                | DciError::InvalidKind { .. }
                | DciError::InvalidRecordName { .. }
                | DciError::PayloadOverrun { .. }
                | DciError::ChildCountMismatch { .. }
                | DciError::DuplicateEntry(_)
                | DciError::InvalidLinkText(_)
        )
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            DciError::NotFound(_) | DciError::ParentNotFound(_) | DciError::Unresolved(_) => {
                io::ErrorKind::NotFound
            }
            DciError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            DciError::UnsupportedMode(_) | DciError::CrossArchive { .. } => {
                io::ErrorKind::Unsupported
            }
            DciError::NameTooLong { .. }
            | DciError::InvalidPath(_)
            | DciError::SamePath(_)
            | DciError::MoveIntoSelf { .. }
            | DciError::ReplaceAncestor { .. }
            | DciError::RootOperation(_)
            | DciError::NotSchemePath { .. }
            | DciError::InvalidConfig(_)
            | DciError::FileTooLarge(_)
            | DciError::Config(_) => io::ErrorKind::InvalidInput,
            DciError::NotOpen | DciError::AlreadyOpen => io::ErrorKind::Other,
            DciError::Io(e) => e.kind(),
            e if e.is_format_error() => io::ErrorKind::InvalidData,
            DciError::InvalidArchive(_) | DciError::TooManyRootEntries(_) => {
                io::ErrorKind::InvalidData
            }
            _ => io::ErrorKind::Other,
        }
    }
}

impl From<DciError> for io::Error {
    fn from(err: DciError) -> Self {
        match err {
            DciError::Io(e) => e,
            other => io::Error::new(other.io_kind(), other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DciError>;
