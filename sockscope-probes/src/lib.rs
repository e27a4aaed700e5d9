//! Correlation engine of the sockscope tracer.
//!
//! [`Probes`] owns every bounded map and exposes one method per probe
//! attach point. Everything that would read kernel memory or talk to the
//! span building stage goes through the [`Helpers`] trait, so the engine
//! can be driven by a live loader or by a recorded event stream.

pub mod error;
pub mod helpers;
pub mod maps;
pub mod probes;

pub use helpers::Helpers;
pub use maps::{LruMap, Maps, SendKey, SendTable};
pub use probes::Probes;
