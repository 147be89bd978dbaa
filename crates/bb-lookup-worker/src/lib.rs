//! BetterBlocker Reverse Lookup Worker
//!
//! A background context for `bb-lookup` that runs on its own OS thread.
//! It keeps the text of every primed filter list and answers reverse
//! lookups by scanning it.
//!
//! # Modules
//!
//! - `store`: primed list storage and the line scanning lookups
//! - `thread`: thread-backed context and its spawner

pub mod store;
pub mod thread;

pub use store::ListStore;
pub use thread::{ThreadContext, ThreadSpawner};
