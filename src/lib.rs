//! # dci-rs - DCI Container Archives
//!
//! `dci-rs` reads, edits and writes DCI archives: a small binary container
//! holding a tree of files, directories and symlinks, used to bundle icon
//! variants. It also makes archive entries reachable as ordinary files through
//! scheme-qualified names such as `dci:/usr/share/icons/app.dci/256/normal.png`.
//!
//! - **Bit-exact format**: 8-byte header, 72-byte entry records, natural-sorted
//!   children
//! - **Atomic mutations**: a failed operation leaves the tree untouched
//! - **Shared instances**: every session on a backing file sees the same
//!   archive, flushed when the last one lets go
//!
//! ## Quick Start
//!
//! ```rust
//! use dci_rs::{Archive, Result};
//!
//! # fn main() -> Result<()> {
//! let mut archive = Archive::new();
//! archive.mkdir("/256")?;
//! archive.write_file("/256/normal.png", b"\x89PNG", false)?;
//! archive.link("normal.png", "/256/hover.png")?;
//!
//! let bytes = archive.to_bytes()?;
//! let reloaded = Archive::from_bytes(bytes)?;
//! assert_eq!(reloaded.read("/256/hover.png")?, b"\x89PNG");
//! # Ok(())
//! # }
//! ```
//!
//! ## File Engines
//!
//! ```rust,no_run
//! use dci_rs::config::VfsConfig;
//! use dci_rs::vfs::{DciEngineHandler, EngineRegistry, FileEngine, OpenMode};
//!
//! # fn main() -> std::io::Result<()> {
//! let mut engines = EngineRegistry::new();
//! engines.register(DciEngineHandler::new(VfsConfig::default())?);
//!
//! let mut file = engines.engine_for("dci:/tmp/app.dci/256/normal.png");
//! file.open(OpenMode::read_only())?;
//! let mut buf = vec![0u8; file.size() as usize];
//! file.read(&mut buf)?;
//! file.close()?;
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{
    archive, catalog, codec, config, error, header, io, path, registry, validation, vfs,
};

// Re-export the types most callers need
pub use crate::core::{
    archive::{Archive, MAX_SYMLINK_HOPS},
    catalog::{EntryInfo, EntryKind, NodeId, Tree},
    config::{FlushPolicy, VfsConfig},
    error::{DciError, Result},
    header::Version,
    registry::{ArchiveHandle, ArchiveRegistry},
};
