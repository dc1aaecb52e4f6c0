//! Parsed-chunk types handed to the core by an external parser.
//!
//! The core never tokenizes text. A parser (in-process or not) produces a
//! [`Chunk`], usually as JSON, and the compiler takes it from there.

mod types;

pub use types::*;
