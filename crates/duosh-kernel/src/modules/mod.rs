//! Modules: `use spec` evaluates a chunk once, in a fresh frame, and binds
//! the resulting namespace.
//!
//! ```text
//! use a:b  ──normalize──▶ a/b.duo ──ModuleSource::resolve──▶ key
//!                                                         │
//!                          ModuleCache[key] ◀── evaluate ─┘ (once)
//! ```
//!
//! The source is pluggable: [`FsModuleSource`] reads files under a root
//! directory, [`MemoryModuleSource`] serves chunks held in memory.

mod loader;
mod source;

pub use loader::{ModuleCache, ModuleLoader};
pub use source::{
    normalize_spec, ChunkParser, FsModuleSource, JsonChunkParser, MemoryModuleSource,
    ModuleError, ModuleSource,
};
