//! `ExecutionContext`, the view a library callee gets of the call it was
//! invoked for (spec §6, "ExecutionContext contract").

use std::any::Any;
use std::rc::Rc;

use core_types::Value;
use memory_manager::Heap;

/// The opaque pointer a host supplies to `exec_sync`/`exec_async` and that
/// is threaded unmodified to every callee. The engine never inspects it;
/// callees downcast it with [`Any`] to recover their own host type.
pub type Attach = Rc<dyn Any>;

/// A persistent `Undefined` a context implementation can hand back a
/// reference to for out-of-range [`ExecutionContext::arg_value`] reads,
/// since the trait returns a borrow rather than an owned `Value`.
pub static UNDEFINED: Value = Value::Undefined;

/// Everything a library callee needs (spec §6): the runtime (for heap
/// access), the host's root value, its opaque attach pointer, and its call
/// arguments. Implemented by the interpreter's call-frame type; callees
/// only ever see it as `&mut dyn ExecutionContext`, so they cannot observe
/// interpreter-internal state beyond this surface.
///
/// All borrows this trait hands out are valid only for the duration of the
/// callee; a `Value` copied out of it is a shallow handle, same as
/// everywhere else in the engine.
pub trait ExecutionContext {
    /// Mutable heap access, for callees that allocate (strings, arrays,
    /// objects, exceptions) while producing their result.
    fn heap_mut(&mut self) -> &mut Heap;

    /// The host-supplied root value passed to `exec_sync`/`exec_async`.
    fn root(&self) -> &Value;

    /// The opaque attach pointer, unmodified since the call began.
    fn attach(&self) -> &Attach;

    /// Number of arguments this call was made with.
    fn arg_count(&self) -> usize;

    /// Borrow argument `i`, or `Value::Undefined` if `i >= arg_count()`
    /// (matching the interpreter's own out-of-range argument reads).
    fn arg_value(&self, i: usize) -> &Value;
}
