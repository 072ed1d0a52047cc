//! DCI archive format and virtual file-system adapter
//!
//! - [`error`] - Error types for archive and session operations
//! - [`header`] - Fixed-size archive header and entry record layouts
//! - [`catalog`] - In-memory entry tree with natural ordering and path index
//! - [`path`] - Internal path normalization and symlink text resolution
//! - [`codec`] - Two-pass encoder and single-pass decoder
//! - [`archive`] - The [`Archive`] object: load, query, mutate, save
//! - [`validation`] - Name, scheme and qualified-path validation
//! - [`io`] - Backing file access
//! - [`config`] - Adapter configuration
//! - [`registry`] - One shared archive instance per backing file
//! - [`vfs`] - File engines over archives

pub mod archive;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod header;
pub mod io;
pub mod path;
pub mod registry;
pub mod validation;
pub mod vfs;

pub use archive::Archive;
