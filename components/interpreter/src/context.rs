//! The `ExecutionContext` a call frame presents to a library callee (spec
//! §6, §4.7 "Call dispatch").

use library_api::{Attach, ExecutionContext, UNDEFINED};
use memory_manager::Heap;

use core_types::Value;

/// Borrowed view of one call's arguments plus the ambient root/attach/heap,
/// built fresh for the duration of a single `Function`/`Constant` call and
/// dropped the instant it returns. Never stored past the call.
pub struct CallCtx<'a> {
    pub heap: &'a mut Heap,
    pub root: &'a Value,
    pub attach: &'a Attach,
    pub args: &'a [Value],
}

impl<'a> ExecutionContext for CallCtx<'a> {
    fn heap_mut(&mut self) -> &mut Heap {
        self.heap
    }

    fn root(&self) -> &Value {
        self.root
    }

    fn attach(&self) -> &Attach {
        self.attach
    }

    fn arg_count(&self) -> usize {
        self.args.len()
    }

    fn arg_value(&self, i: usize) -> &Value {
        self.args.get(i).unwrap_or(&UNDEFINED)
    }
}
