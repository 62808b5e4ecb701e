//! # Runtime
//!
//! Process-level plumbing around the reconciler: startup, the controller
//! watch loop, and the error policy that maps failed passes to requeues.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use error_policy::{handle_reconciliation_error, handle_watch_stream_error, WatchErrorClass};
pub use initialization::{initialize, InitializationResult};
pub use watch_loop::run_watch_loop;
