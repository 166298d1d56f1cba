//! Background Tasks Module
//!
//! Supervised loops that run for the lifetime of the process. Each takes a
//! `CancellationToken` and returns its `JoinHandle` so shutdown can await it.
//!
//! # Tasks
//! - Cache cleanup: expired entry sweep plus deferred persistence flush
//! - Optimizer: periodic smart-cache optimization cycle

mod cleanup;
mod optimizer;

pub use cleanup::spawn_cleanup_task;
pub use optimizer::spawn_optimizer_task;
