//! The embeddable scripting engine's public surface (spec §2's data flow:
//! source text → tokens → AST → optimised AST → `Compiled` → `Script`
//! result).
//!
//! Everything upstream of this crate (`script_parser`, `compiler`,
//! `bytecode_system`, `interpreter`, `memory_manager`, `json_codec`,
//! `value_ops`) is plumbing a host never touches directly. A host embeds
//! the engine by implementing [`library_api::Library`], constructing a
//! [`ScriptRuntime`], and driving it through [`ScriptRuntime::compile`]
//! plus either [`ScriptRuntime::exec_sync`] or
//! [`ScriptRuntime::exec_async`] — mirroring how the teacher's `js_cli`
//! crate wraps its parser/VM pair behind one `Runtime` facade, minus the
//! CLI surface itself (out of scope per spec §1).

#![warn(missing_docs)]

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use core_types::{EngineError, Value};
use library_api::{Attach, Library};
use memory_manager::{Heap, DEFAULT_GC_THRESHOLD};

pub use async_runtime::{await_task, drive_inline, Continuation, Poll, Scheduler, Task};
pub use bytecode_system::Compiled;
pub use core_types::{ExceptionKind, ParseError, SourcePosition};
pub use json_codec::{encode_value, parse as parse_json, EncodeOptions, GenError, ParseStatus, StreamParser};
pub use library_api::{AsyncConstant, AsyncFunction, Constant, DirectiveDef, ExecutionContext, Function};
pub use memory_manager::{GcArray, GcObject, IterMode, StrEncoding};
pub use value_ops::{BinaryOp, UnaryOp};

/// The result of running a script to completion: success carries a value,
/// failure carries an exception value produced in-heap (spec §2, §7 "User
/// visible failure").
pub type Script = Result<Value, Value>;

/// Parse and lower `source` into a [`Compiled`] program, resolving every
/// name against `library` as the parser goes (spec §4.5, §4.6). No partial
/// program is ever returned alongside a parse error (spec §7).
pub fn compile(source: &str, library: &dyn Library) -> Result<Compiled, EngineError> {
    let block = script_parser::parse_and_optimize(source, library)?;
    let program = compiler::compile(&block)?;
    Ok(program)
}

/// Owner of the value heap a host drives one or more [`Compiled`] programs
/// against. Wraps the heap in `Rc<RefCell<_>>` so the same runtime serves
/// both the borrowing [`ScriptRuntime::exec_sync`] surface and the
/// `'static` task returned by [`ScriptRuntime::exec_async`], which must
/// hold its own heap handle across suspensions (spec §5).
pub struct ScriptRuntime {
    heap: Rc<RefCell<Heap>>,
}

impl Default for ScriptRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptRuntime {
    /// A runtime with a fresh heap at the default GC threshold.
    pub fn new() -> Self {
        Self::with_gc_threshold(DEFAULT_GC_THRESHOLD)
    }

    /// A runtime whose heap collects once `bytes_used` crosses
    /// `gc_threshold` (spec §4.1).
    pub fn with_gc_threshold(gc_threshold: usize) -> Self {
        ScriptRuntime {
            heap: Rc::new(RefCell::new(Heap::with_gc_threshold(gc_threshold))),
        }
    }

    /// Borrow the heap immutably, e.g. to read back a result value's
    /// string content after execution.
    pub fn heap(&self) -> Ref<'_, Heap> {
        self.heap.borrow()
    }

    /// Borrow the heap mutably, e.g. to register a host value as a global
    /// root before a run.
    pub fn heap_mut(&self) -> RefMut<'_, Heap> {
        self.heap.borrow_mut()
    }

    /// Bytes currently live on the heap (for host-side memory accounting,
    /// not consulted by the engine itself beyond the GC threshold check).
    pub fn bytes_used(&self) -> usize {
        self.heap.borrow().bytes_used()
    }

    /// Run `compiled` to completion on the calling thread (spec §4.7's
    /// `exec_sync`). Rejects a program whose `contains_async` flag is set
    /// before ever starting the dispatch loop.
    pub fn exec_sync(
        &self,
        compiled: &Compiled,
        root: Value,
        attach: Attach,
        library: &dyn Library,
    ) -> Script {
        let mut heap = self.heap.borrow_mut();
        interpreter::exec_sync(compiled, root, attach, &mut heap, library)
    }

    /// Begin (but do not drive) an asynchronous run of `compiled` (spec
    /// §4.7's `exec_async`). The caller composes the returned [`Task`]
    /// with [`await_task`] (scheduler-driven) or [`drive_inline`]
    /// (blocking) depending on whether it has a cooperative event loop.
    pub fn exec_async(
        &self,
        compiled: Rc<Compiled>,
        root: Value,
        attach: Attach,
        library: Rc<dyn Library>,
    ) -> Task<Script> {
        interpreter::exec_async(compiled, root, attach, self.heap.clone(), library)
    }

    /// Parse, compile and synchronously run `source` in one call — the
    /// shape a simple embedding (no persisted `Compiled`, no async) wants.
    pub fn run(&self, source: &str, root: Value, attach: Attach, library: &dyn Library) -> Result<Script, EngineError> {
        let compiled = compile(source, library)?;
        Ok(self.exec_sync(&compiled, root, attach, library))
    }

    /// Decode a JSON document straight onto this runtime's heap (spec
    /// §4.4's one-shot decoder).
    pub fn parse_json(&self, bytes: &[u8]) -> Result<Value, ParseError> {
        let mut heap = self.heap.borrow_mut();
        json_codec::parse(&mut heap, bytes)
    }

    /// Encode a heap value back to JSON text with the given options (spec
    /// §4.4's encoder).
    pub fn encode_json(&self, value: &Value, options: EncodeOptions) -> Result<String, GenError> {
        let heap = self.heap.borrow();
        json_codec::encode_value(&heap, value, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecode_system::ConstValue;
    use library_api::{AsyncConstant, AsyncFunction, Constant, DirectiveDef, Function};

    struct NoopLibrary;
    impl Library for NoopLibrary {
        fn find_func(&self, _name: &str) -> Option<&dyn Function> {
            None
        }
        fn find_async_func(&self, _name: &str) -> Option<&dyn AsyncFunction> {
            None
        }
        fn find_constant(&self, _ns: &str, _key: &str) -> Option<&dyn Constant> {
            None
        }
        fn find_async_constant(&self, _ns: &str, _key: &str) -> Option<&dyn AsyncConstant> {
            None
        }
        fn find_directive_def(
            &self,
            _directive_type: &str,
            _name: &str,
            _literals: &[ConstValue],
        ) -> Option<&dyn DirectiveDef> {
            None
        }
    }

    fn attach() -> Attach {
        Rc::new(())
    }

    /// Spec §8 scenario 2: `return 1 + 2 * 3;` yields `Integer 7`.
    #[test]
    fn run_compiles_and_executes_an_arithmetic_script() {
        let runtime = ScriptRuntime::new();
        let result = runtime
            .run("return 1 + 2 * 3;", Value::Undefined, attach(), &NoopLibrary)
            .unwrap()
            .unwrap();
        assert!(matches!(result, Value::Integer(7)));
    }

    /// Spec §8 scenario 3: `try { throw "oops"; } catch (e) { return e; }`
    /// yields the heap string "oops".
    #[test]
    fn run_catches_a_thrown_string() {
        let runtime = ScriptRuntime::new();
        let result = runtime
            .run(
                "try { throw \"oops\"; } catch (e) { return e; }",
                Value::Undefined,
                attach(),
                &NoopLibrary,
            )
            .unwrap()
            .unwrap();
        match result {
            Value::HeapString(r) => assert_eq!(runtime.heap().string_content(r), "oops"),
            other => panic!("expected the raw thrown string, got {:?}", other),
        }
    }

    /// Spec §8 scenario 4: the `for (let i,v of arr)` loop sums to 6.
    #[test]
    fn run_executes_a_for_of_loop_over_an_array_literal() {
        let runtime = ScriptRuntime::new();
        let result = runtime
            .run(
                "let arr=[1,2,3]; let s=0; for (let i,v of arr){ s = s + v; } return s;",
                Value::Undefined,
                attach(),
                &NoopLibrary,
            )
            .unwrap()
            .unwrap();
        assert!(matches!(result, Value::Integer(6)));
    }

    /// A compiled program can be reused across several `exec_sync` calls
    /// against the same runtime without re-parsing.
    #[test]
    fn compiled_program_can_be_executed_more_than_once() {
        let runtime = ScriptRuntime::new();
        let compiled = compile("return 21 * 2;", &NoopLibrary).unwrap();
        for _ in 0..3 {
            let result = runtime
                .exec_sync(&compiled, Value::Undefined, attach(), &NoopLibrary)
                .unwrap();
            assert!(matches!(result, Value::Integer(42)));
        }
    }

    /// Spec §8 scenario 1: decoding a JSON document through the runtime's
    /// heap, then re-encoding it, round-trips to a canonical form.
    #[test]
    fn json_round_trips_through_the_runtime_heap() {
        let runtime = ScriptRuntime::new();
        let value = runtime
            .parse_json(br#"{"name":"fiber","nums":[1,2.5,true,null]}"#)
            .unwrap();
        let text = runtime.encode_json(&value, EncodeOptions::default()).unwrap();
        let reparsed = runtime.parse_json(text.as_bytes()).unwrap();
        let text_again = runtime.encode_json(&reparsed, EncodeOptions::default()).unwrap();
        assert_eq!(text, text_again);
    }

    /// A parse error never produces a partial `Compiled` (spec §7): `run`
    /// surfaces it as `Err` rather than `Ok(Err(..))`.
    #[test]
    fn parse_error_surfaces_before_any_execution() {
        let runtime = ScriptRuntime::new();
        let err = runtime
            .run("let x = ;", Value::Undefined, attach(), &NoopLibrary)
            .unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }
}
