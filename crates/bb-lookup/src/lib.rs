//! BetterBlocker Reverse Lookup
//!
//! This crate coordinates reverse filter lookups ("which enabled filter lists
//! contain this filter?") that run inside an isolated background context.
//! The lookup algorithm itself lives on the far side of a message channel;
//! this crate owns everything around it.
//!
//! # Architecture
//!
//! A [`ReverseLookup`] lazily creates the background context on the first
//! lookup, primes it with the content of every enabled filter list exactly
//! once, and tears it down again after an idle period. Requests are tagged
//! with a correlation ID so responses can arrive in any order.
//!
//! # Modules
//!
//! - `lifecycle`: context creation, priming state, idle teardown
//! - `correlator`: correlation IDs and pending response callbacks
//! - `priming`: enabled-list enumeration and the countdown join
//! - `message`: channel protocol shared with the background context
//! - `context`: background context and response sink seams
//! - `sources`: filter list registry and content source seams
//! - `domain`: hostname to registrable domain resolution
//! - `timer`: idle timer scheduling
//! - `config`: coordinator settings
//! - `error`: error type for the fallible edges

pub mod config;
pub mod context;
pub mod correlator;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod priming;
pub mod sources;
pub mod timer;

// Re-export commonly used types
pub use config::LookupConfig;
pub use context::{BackgroundContext, ContextSpawner, InboundHandler, ResponseSink};
pub use domain::{DomainResolver, HeuristicResolver, PslResolver};
pub use error::LookupError;
pub use lifecycle::{Collaborators, ReverseLookup};
pub use message::{ContextMessage, ListMatch, LookupRequest, LookupResponse, Response};
pub use priming::{ListEntries, ListEntry};
pub use sources::{
    FileContentSource, ListContent, ListContentSource, ListMeta, ListRegistry,
    MemoryContentSource, StaticRegistry,
};
pub use timer::{ManualScheduler, Scheduler, TimerHandle, TokioScheduler};
