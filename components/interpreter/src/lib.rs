//! The bytecode VM (spec §4.7): fetch/decode loop, exception-table search,
//! call dispatch through a [`library_api::Library`], and the two execution
//! surfaces a host embeds the engine through.
//!
//! `exec_sync` and `exec_async` are the only public entry points; everything
//! else in this crate (`vm`, `context`) is dispatch-loop plumbing private to
//! how those two surfaces are implemented.

#![warn(missing_docs)]

mod async_exec;
mod context;
mod vm;
mod sync_exec;

pub use async_exec::exec_async;
pub use sync_exec::exec_sync;
