//! The value heap: GC-managed entities, mark-and-sweep collection, and the
//! container semantics (array/object/iterator) built on top of them.
//!
//! See spec §3 ("Data Model") and §4.1 ("Value & Heap"). This crate owns
//! every heap-managed entity `core_types::Value` can point at; nothing
//! outside `Heap` ever reconstructs entity content from a handle.

pub mod arena;
pub mod gc;
pub mod heap;
pub mod object;
pub mod utf;

pub use gc::{RootSet, TempGuard};
pub use heap::{Heap, DEFAULT_GC_THRESHOLD};
pub use object::{
    GcArray, GcBinary, GcException, GcIterator, GcObject, GcString, IterMode, IterSource,
    ObjectCursor, ObjectEntry, StrEncoding,
};
