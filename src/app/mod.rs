//! The ambient stack around the wire-protocol core: CLI parsing,
//! configuration loading, logging, TLS-negotiation policy, and the
//! Acceptor that ties them to [`crate::dispatcher::Dispatcher`].
//!
//! None of this is part of the core's own contract (spec §1 names these
//! as external collaborators); it exists so the crate builds into a
//! runnable binary.

pub mod args;
pub mod config;
pub mod logger;
pub mod server;
pub mod tls;

pub use args::{parse, Args, LogFormat};
pub use config::init_config;
pub use logger::init_logging;
pub use server::run_server;
