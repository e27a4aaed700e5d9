//! Fixed-size records shared by the sockscope probe handlers and the
//! userland replay tooling.
//!
//! Everything in here is `Copy` and heap free so that a record can be
//! stored in a bounded map, copied out of it and handed to a collaborator
//! without any allocation on the event path.

pub mod buffer;
pub mod config;
pub mod consts;
pub mod errors;
pub mod http;
pub mod net;
pub mod pid;
pub mod tcp;
pub mod trace;
