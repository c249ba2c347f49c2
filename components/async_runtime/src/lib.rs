//! Single-threaded cooperative task/scheduler abstraction (spec §5).
//!
//! This crate is deliberately generic over `T`: it knows nothing about
//! `Value` or the bytecode interpreter. The interpreter crate specialises
//! [`Task`] to `Task<Result<Value, ExceptionValue>>` for `exec_async`, and
//! the library API specialises it to `Task<Result<Value, Value>>` for
//! host-supplied async functions and constants (spec §6). Keeping the
//! suspension/scheduling machinery independent of the value model mirrors
//! how the teacher keeps its event loop and task queue free of engine
//! value types beyond the call boundary.

mod scheduler;
mod task;

pub use scheduler::{await_task, drive_inline, Continuation, Scheduler};
pub use task::{Poll, Task};
