//! The fetch/decode loop itself (spec §4.7): opcode dispatch, the
//! exception-table search, and the stack/variable-table bookkeeping shared
//! by `exec_sync` and `exec_async`.
//!
//! GC rooting: every live operand-stack slot and variable-table slot can
//! hold a heap handle, so they all have to be visible to `Heap::collect`'s
//! mark pass. Rather than thread a push/pop through every individual stack
//! push (which would need careful bookkeeping to avoid leaking or
//! under-rooting across jumps), this loop re-snapshots the whole stack plus
//! variable table into the heap's temp roots once per instruction, right
//! before dispatching it, and releases the snapshot once the instruction
//! has run. Coarser than the teacher's per-operator `push_temp`/
//! `truncate_temps` scoping, but correct by construction and easy to audit.

use bytecode_system::{Compiled, ConstValue, OpCode};
use core_types::{ExceptionKind, SourcePosition, Value};
use library_api::{Attach, Library};
use memory_manager::{Heap, IterMode, IterSource};
use value_ops::{BinaryOp, UnaryOp};

use async_runtime::Task;

use crate::context::CallCtx;

/// What one call to [`run`] produced: either the program is finished (a
/// value or a thrown exception survived to the top), or it hit one of the
/// three async suspension points and needs the caller to await a `Task`
/// before resuming.
pub(crate) enum StepOutcome {
    Done(Result<Value, Value>),
    Await(Task<Result<Value, Value>>),
}

/// The interpreter's mutable working state for one execution: the operand
/// stack, the local variable table, the instruction pointer, and a cache of
/// constant-pool entries already materialized onto the heap (spec
/// `Compiled::const_pool` doc: string literals are interned "once, the
/// first time the program runs").
pub(crate) struct VmState {
    pub stack: Vec<Value>,
    pub vars: Vec<Value>,
    pub ip: usize,
    const_cache: Vec<Option<Value>>,
}

impl VmState {
    pub fn new(compiled: &Compiled) -> Self {
        VmState {
            stack: Vec::with_capacity(compiled.stack_size.max(4)),
            vars: vec![Value::Undefined; compiled.var_table_size],
            ip: 0,
            const_cache: vec![None; compiled.const_pool.len()],
        }
    }
}

/// Re-root every value the VM currently has live (stack, vars, the host
/// root) as heap temps, returning the mark to release them back to once
/// the current instruction has finished.
fn resync_roots(heap: &mut Heap, root: &Value, state: &VmState) -> usize {
    let mark = heap.roots.temp_mark();
    heap.roots.push_temp(root.clone());
    for v in &state.vars {
        heap.roots.push_temp(v.clone());
    }
    for v in &state.stack {
        heap.roots.push_temp(v.clone());
    }
    mark
}

/// Build a heap exception value from one of the VM's own well-known
/// failure kinds. Falls back to `Null` if the heap can't even allocate the
/// exception itself — a degenerate case far outside normal budgets.
fn make_exception(heap: &mut Heap, kind: ExceptionKind, message: &str, position: SourcePosition) -> Value {
    heap.new_exception_from_kind(kind, message, position)
        .map(Value::Exception)
        .unwrap_or(Value::Null)
}

fn type_error(heap: &mut Heap, message: impl AsRef<str>, position: SourcePosition) -> Value {
    make_exception(heap, ExceptionKind::TypeError, message.as_ref(), position)
}

fn oom(heap: &mut Heap, position: SourcePosition) -> Value {
    make_exception(heap, ExceptionKind::OutOfMemory, "heap allocation failed", position)
}

/// Materialize `const_pool[idx]` into a `Value`, interning string literals
/// into the heap the first time they're loaded and caching the result for
/// every later `LoadConst` of the same index.
fn load_const(
    heap: &mut Heap,
    const_cache: &mut [Option<Value>],
    const_pool: &[ConstValue],
    idx: usize,
    position: SourcePosition,
) -> Result<Value, Value> {
    if let Some(v) = &const_cache[idx] {
        return Ok(v.clone());
    }
    let materialized = match &const_pool[idx] {
        ConstValue::Undefined => Value::Undefined,
        ConstValue::Null => Value::Null,
        ConstValue::Boolean(b) => Value::Boolean(*b),
        ConstValue::Integer(n) => Value::Integer(*n),
        ConstValue::Float(f) => Value::Float(*f),
        ConstValue::Str(s) => match heap.new_string_from_str(s) {
            Some(r) => Value::HeapString(r),
            None => return Err(oom(heap, position)),
        },
    };
    const_cache[idx] = Some(materialized.clone());
    Ok(materialized)
}

/// Coerce a value to an object/array property key. The spec is silent on
/// the exact coercion; this mirrors `value_ops`'s own numeric/string
/// coercion rules (stringify scalars, reject heap containers) rather than
/// inventing a new one.
fn to_property_key(heap: &Heap, v: &Value) -> Option<String> {
    match v {
        Value::NativeString(s) => Some(s.to_string()),
        Value::HeapString(r) => Some(heap.string_content(*r)),
        Value::Integer(n) => Some(n.to_string()),
        Value::Float(f) => Some(format_float(*f)),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Undefined => Some("undefined".to_string()),
        _ => None,
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

fn to_array_index(v: &Value) -> Option<usize> {
    match v {
        Value::Integer(n) if *n >= 0 => Some(*n as usize),
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 && *f >= 0.0 => Some(*f as usize),
        _ => None,
    }
}

fn idx_get(heap: &mut Heap, base: &Value, index: &Value, position: SourcePosition) -> Result<Value, Value> {
    match base {
        Value::Array(r) => match to_array_index(index) {
            Some(i) => Ok(heap.array(*r).map(|a| a.get(i)).unwrap_or(Value::Undefined)),
            None => Err(type_error(heap, "array index must be a non-negative integer", position)),
        },
        Value::Object(r) => match to_property_key(heap, index) {
            Some(k) => Ok(heap.object_get(*r, &k).unwrap_or(Value::Undefined)),
            None => Err(type_error(
                heap,
                "object key must be a string, number, boolean, null or undefined",
                position,
            )),
        },
        other => Err(type_error(heap, format!("cannot index into {}", value_ops::type_of(other)), position)),
    }
}

fn idx_set(heap: &mut Heap, base: &Value, index: &Value, value: Value, position: SourcePosition) -> Result<(), Value> {
    match base {
        Value::Array(r) => match to_array_index(index) {
            Some(i) => {
                heap.array_mut(*r).expect("array handle always valid while rooted").set(i, value);
                Ok(())
            }
            None => Err(type_error(heap, "array index must be a non-negative integer", position)),
        },
        Value::Object(r) => match to_property_key(heap, index) {
            Some(k) => match heap.object_set(*r, &k, value) {
                Some(()) => Ok(()),
                None => Err(oom(heap, position)),
            },
            None => Err(type_error(
                heap,
                "object key must be a string, number, boolean, null or undefined",
                position,
            )),
        },
        other => Err(type_error(heap, format!("cannot index into {}", value_ops::type_of(other)), position)),
    }
}

fn prop_get(heap: &mut Heap, base: &Value, prop: &str, position: SourcePosition) -> Result<Value, Value> {
    match base {
        Value::Object(r) => Ok(heap.object_get(*r, prop).unwrap_or(Value::Undefined)),
        other => Err(type_error(
            heap,
            format!("cannot read property '{}' of {}", prop, value_ops::type_of(other)),
            position,
        )),
    }
}

fn prop_set(heap: &mut Heap, base: &Value, prop: &str, value: Value, position: SourcePosition) -> Result<(), Value> {
    match base {
        Value::Object(r) => match heap.object_set(*r, prop, value) {
            Some(()) => Ok(()),
            None => Err(oom(heap, position)),
        },
        other => Err(type_error(
            heap,
            format!("cannot set property '{}' on {}", prop, value_ops::type_of(other)),
            position,
        )),
    }
}

fn exp_object(heap: &mut Heap, base: &Value, spread_src: Value, position: SourcePosition) -> Result<(), Value> {
    let base_ref = match base {
        Value::Object(r) => *r,
        other => return Err(type_error(heap, format!("spread target must be an object, got {}", value_ops::type_of(other)), position)),
    };
    match spread_src {
        Value::Object(src_ref) => {
            let entries: Vec<(String, Value)> = heap
                .object(src_ref)
                .map(|o| o.iter_occupied().map(|e| (e.key_content.clone(), e.value.clone())).collect())
                .unwrap_or_default();
            for (k, v) in entries {
                if heap.object_set(base_ref, &k, v).is_none() {
                    return Err(oom(heap, position));
                }
            }
            Ok(())
        }
        other => Err(type_error(heap, format!("cannot spread {} into an object", value_ops::type_of(&other)), position)),
    }
}

fn exp_array(heap: &mut Heap, base: &Value, spread_src: Value, position: SourcePosition) -> Result<(), Value> {
    let base_ref = match base {
        Value::Array(r) => *r,
        other => return Err(type_error(heap, format!("spread target must be an array, got {}", value_ops::type_of(other)), position)),
    };
    match spread_src {
        Value::Array(src_ref) => {
            let elems: Vec<Value> = heap.array(src_ref).map(|a| a.data.clone()).unwrap_or_default();
            let arr = heap.array_mut(base_ref).expect("array handle always valid while rooted");
            for v in elems {
                arr.push(v);
            }
            Ok(())
        }
        other => Err(type_error(heap, format!("cannot spread {} into an array", value_ops::type_of(&other)), position)),
    }
}

fn push_array(heap: &mut Heap, base: &Value, value: Value, position: SourcePosition) -> Result<(), Value> {
    match base {
        Value::Array(r) => {
            heap.array_mut(*r).expect("array handle always valid while rooted").push(value);
            Ok(())
        }
        other => Err(type_error(heap, format!("cannot append to {}", value_ops::type_of(other)), position)),
    }
}

fn binary_op_code_to_op(op: &OpCode) -> Option<BinaryOp> {
    Some(match op {
        OpCode::BopPlus => BinaryOp::Add,
        OpCode::BopMinus => BinaryOp::Sub,
        OpCode::BopMultiply => BinaryOp::Mul,
        OpCode::BopDivide => BinaryOp::Div,
        OpCode::BopMod => BinaryOp::Mod,
        OpCode::BopMatch => BinaryOp::Match,
        OpCode::BopLt => BinaryOp::Lt,
        OpCode::BopLte => BinaryOp::Le,
        OpCode::BopGt => BinaryOp::Gt,
        OpCode::BopGte => BinaryOp::Ge,
        OpCode::BopEq => BinaryOp::Eq,
        OpCode::BopSeq => BinaryOp::StrictEq,
        OpCode::BopNe => BinaryOp::Ne,
        OpCode::BopSne => BinaryOp::StrictNe,
        OpCode::BopIn => BinaryOp::In,
        _ => return None,
    })
}

fn unary_op_code_to_op(op: &OpCode) -> Option<UnaryOp> {
    Some(match op {
        OpCode::UnaryPlus => UnaryOp::Plus,
        OpCode::UnaryMinus => UnaryOp::Negate,
        OpCode::UnaryNeg => UnaryOp::LogicalNot,
        OpCode::UnaryTypeof => UnaryOp::Typeof,
        _ => return None,
    })
}

/// Search the exception table for a handler covering `ip`. On a hit, push
/// the exception value and jump to `catch_begin` (`IntoCatch` at that
/// address binds it into the catch variable); on a miss, the program is
/// done with a failure result (spec §4.7's "Exception handling").
fn dispatch_throw(compiled: &Compiled, state: &mut VmState, exception: Value) -> Option<Value> {
    match compiled.find_handler(state.ip as u32) {
        Some(entry) => {
            state.stack.push(exception);
            state.ip = entry.catch_begin as usize;
            None
        }
        None => Some(exception),
    }
}

fn callee_name(compiled: &Compiled, fn_idx: u32) -> &str {
    compiled
        .string_pool
        .get(fn_idx as usize)
        .map(|s| s.as_str())
        .unwrap_or("")
}

/// Call a plain (non-directive) synchronous library function.
fn call_sync_function(
    library: &dyn Library,
    name: &str,
    args: &[Value],
    heap: &mut Heap,
    root: &Value,
    attach: &Attach,
    position: SourcePosition,
) -> Result<Value, Value> {
    match library.find_func(name) {
        Some(f) => {
            let mut ctx = CallCtx { heap, root, attach, args };
            f.call(&mut ctx)
        }
        None => Err(type_error(heap, format!("unknown function '{}'", name), position)),
    }
}

/// Call a `NAME.METHOD(args)` directive dispatch (spec §4.5).
fn call_sync_directive(
    library: &dyn Library,
    directive_type: &str,
    directive_name: &str,
    method: &str,
    literals: &[ConstValue],
    args: &[Value],
    heap: &mut Heap,
    root: &Value,
    attach: &Attach,
    position: SourcePosition,
) -> Result<Value, Value> {
    let def = match library.find_directive_def(directive_type, directive_name, literals) {
        Some(def) => def,
        None => return Err(type_error(heap, format!("unknown directive '{}'", directive_name), position)),
    };
    match def.find_func(directive_name, method) {
        Some(f) => {
            let mut ctx = CallCtx { heap, root, attach, args };
            f.call(&mut ctx)
        }
        None => Err(type_error(
            heap,
            format!("unknown directive function '{}.{}'", directive_name, method),
            position,
        )),
    }
}

fn spread_args(heap: &Heap, value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(r) => heap.array(*r).map(|a| a.data.clone()),
        _ => None,
    }
}

/// Run from `state.ip` until the program finishes or hits one of the three
/// async suspension points. `allow_async` is false for `exec_sync`: an
/// async opcode there is synthesized as a thrown `EXEC_ASYNC_ERROR`
/// exception rather than ever producing a `StepOutcome::Await` (spec §4.7:
/// "async opcodes, if encountered, are an execution error").
pub(crate) fn run(
    state: &mut VmState,
    compiled: &Compiled,
    heap: &mut Heap,
    library: &dyn Library,
    root: &Value,
    attach: &Attach,
    allow_async: bool,
) -> StepOutcome {
    loop {
        if state.ip >= compiled.codes.len() {
            return StepOutcome::Done(Ok(Value::Undefined));
        }

        let root_mark = resync_roots(heap, root, state);
        let op = compiled.codes[state.ip].clone();
        let position = compiled.positions[state.ip];

        macro_rules! throw_now {
            ($exc:expr) => {{
                let exc = $exc;
                heap.roots.truncate_temps(root_mark);
                match dispatch_throw(compiled, state, exc) {
                    Some(final_result) => return StepOutcome::Done(Err(final_result)),
                    None => continue,
                }
            }};
        }

        match &op {
            OpCode::Noop => {
                state.ip += 1;
            }
            OpCode::LoadConst(idx) => match load_const(heap, &mut state.const_cache, &compiled.const_pool, *idx as usize, position) {
                Ok(v) => {
                    state.stack.push(v);
                    state.ip += 1;
                }
                Err(e) => throw_now!(e),
            },
            OpCode::LoadRoot => {
                state.stack.push(root.clone());
                state.ip += 1;
            }
            OpCode::Dump => {
                let top = state.stack.last().cloned().unwrap_or(Value::Undefined);
                state.stack.push(top);
                state.ip += 1;
            }
            OpCode::Pop => {
                state.stack.pop();
                state.ip += 1;
            }
            OpCode::LoadVar(idx) => {
                let v = state.vars.get(*idx as usize).cloned().unwrap_or(Value::Undefined);
                state.stack.push(v);
                state.ip += 1;
            }
            OpCode::StoreVar(idx) => {
                let v = state.stack.pop().unwrap_or(Value::Undefined);
                if let Some(slot) = state.vars.get_mut(*idx as usize) {
                    *slot = v;
                }
                state.ip += 1;
            }
            OpCode::NewObject(cap) => match heap.new_object(*cap as usize) {
                Some(r) => {
                    state.stack.push(Value::Object(r));
                    state.ip += 1;
                }
                None => throw_now!(oom(heap, position)),
            },
            OpCode::NewArray(cap) => match heap.new_array(*cap as usize) {
                Some(r) => {
                    state.stack.push(Value::Array(r));
                    state.ip += 1;
                }
                None => throw_now!(oom(heap, position)),
            },
            OpCode::ExpObject => {
                let spread_src = state.stack.pop().unwrap_or(Value::Undefined);
                let base = state.stack.last().cloned().unwrap_or(Value::Undefined);
                match exp_object(heap, &base, spread_src, position) {
                    Ok(()) => state.ip += 1,
                    Err(e) => throw_now!(e),
                }
            }
            OpCode::ExpArray => {
                let spread_src = state.stack.pop().unwrap_or(Value::Undefined);
                let base = state.stack.last().cloned().unwrap_or(Value::Undefined);
                match exp_array(heap, &base, spread_src, position) {
                    Ok(()) => state.ip += 1,
                    Err(e) => throw_now!(e),
                }
            }
            OpCode::PushArray => {
                let value = state.stack.pop().unwrap_or(Value::Undefined);
                let base = state.stack.last().cloned().unwrap_or(Value::Undefined);
                match push_array(heap, &base, value, position) {
                    Ok(()) => state.ip += 1,
                    Err(e) => throw_now!(e),
                }
            }
            OpCode::IdxGet => {
                let index = state.stack.pop().unwrap_or(Value::Undefined);
                let base = state.stack.pop().unwrap_or(Value::Undefined);
                match idx_get(heap, &base, &index, position) {
                    Ok(v) => {
                        state.stack.push(v);
                        state.ip += 1;
                    }
                    Err(e) => throw_now!(e),
                }
            }
            OpCode::IdxSet => {
                let value = state.stack.pop().unwrap_or(Value::Undefined);
                let index = state.stack.pop().unwrap_or(Value::Undefined);
                let base = state.stack.pop().unwrap_or(Value::Undefined);
                match idx_set(heap, &base, &index, value, position) {
                    Ok(()) => state.ip += 1,
                    Err(e) => throw_now!(e),
                }
            }
            OpCode::IdxSet1 => {
                // Not emitted by this compiler (object/array literals use
                // `PropSet1`/`PushArray` instead); kept for opcode-set
                // completeness. Mirrors `PropSet1`: consumes index and
                // value, leaves the base on the stack.
                let value = state.stack.pop().unwrap_or(Value::Undefined);
                let index = state.stack.pop().unwrap_or(Value::Undefined);
                let base = state.stack.last().cloned().unwrap_or(Value::Undefined);
                match idx_set(heap, &base, &index, value, position) {
                    Ok(()) => state.ip += 1,
                    Err(e) => throw_now!(e),
                }
            }
            OpCode::PropGet(idx) => {
                let prop = compiled.string_pool.get(*idx as usize).cloned().unwrap_or_default();
                let base = state.stack.pop().unwrap_or(Value::Undefined);
                match prop_get(heap, &base, &prop, position) {
                    Ok(v) => {
                        state.stack.push(v);
                        state.ip += 1;
                    }
                    Err(e) => throw_now!(e),
                }
            }
            OpCode::PropSet(idx) => {
                let prop = compiled.string_pool.get(*idx as usize).cloned().unwrap_or_default();
                let value = state.stack.pop().unwrap_or(Value::Undefined);
                let base = state.stack.pop().unwrap_or(Value::Undefined);
                match prop_set(heap, &base, &prop, value, position) {
                    Ok(()) => state.ip += 1,
                    Err(e) => throw_now!(e),
                }
            }
            OpCode::PropSet1(idx) => {
                let prop = compiled.string_pool.get(*idx as usize).cloned().unwrap_or_default();
                let value = state.stack.pop().unwrap_or(Value::Undefined);
                let base = state.stack.last().cloned().unwrap_or(Value::Undefined);
                match prop_set(heap, &base, &prop, value, position) {
                    Ok(()) => state.ip += 1,
                    Err(e) => throw_now!(e),
                }
            }
            OpCode::BopPlus
            | OpCode::BopMinus
            | OpCode::BopMultiply
            | OpCode::BopDivide
            | OpCode::BopMod
            | OpCode::BopMatch
            | OpCode::BopLt
            | OpCode::BopLte
            | OpCode::BopGt
            | OpCode::BopGte
            | OpCode::BopEq
            | OpCode::BopSeq
            | OpCode::BopNe
            | OpCode::BopSne
            | OpCode::BopIn => {
                let bop = binary_op_code_to_op(&op).expect("matched above");
                let rhs = state.stack.pop().unwrap_or(Value::Undefined);
                let lhs = state.stack.pop().unwrap_or(Value::Undefined);
                match value_ops::binary_op(bop, &lhs, &rhs, heap) {
                    Ok(v) => {
                        state.stack.push(v);
                        state.ip += 1;
                    }
                    Err(e) => throw_now!(make_exception(heap, e.kind(), &e.message(), position)),
                }
            }
            OpCode::UnaryPlus | OpCode::UnaryMinus | OpCode::UnaryNeg | OpCode::UnaryTypeof => {
                let uop = unary_op_code_to_op(&op).expect("matched above");
                let operand = state.stack.pop().unwrap_or(Value::Undefined);
                match value_ops::unary_op(uop, &operand, heap) {
                    Ok(v) => {
                        state.stack.push(v);
                        state.ip += 1;
                    }
                    Err(e) => throw_now!(make_exception(heap, e.kind(), &e.message(), position)),
                }
            }
            OpCode::CallFunc { argc, fn_idx } => {
                let n = *argc as usize;
                let start = state.stack.len().saturating_sub(n);
                let args = state.stack.split_off(start);
                let result = dispatch_sync_call(compiled, library, *fn_idx, &args, heap, root, attach, position);
                match result {
                    Ok(v) => {
                        state.stack.push(v);
                        state.ip += 1;
                    }
                    Err(e) => throw_now!(e),
                }
            }
            OpCode::CallFuncSpread { fn_idx } => {
                let spread = state.stack.pop().unwrap_or(Value::Undefined);
                match spread_args(heap, &spread) {
                    Some(args) => {
                        let result = dispatch_sync_call(compiled, library, *fn_idx, &args, heap, root, attach, position);
                        match result {
                            Ok(v) => {
                                state.stack.push(v);
                                state.ip += 1;
                            }
                            Err(e) => throw_now!(e),
                        }
                    }
                    None => throw_now!(type_error(heap, "spread call argument must be an array", position)),
                }
            }
            OpCode::CallAsyncFunc { argc, fn_idx } => {
                if !allow_async {
                    throw_now!(make_exception(heap, ExceptionKind::AsyncError, "async call used in synchronous execution", position));
                }
                let n = *argc as usize;
                let start = state.stack.len().saturating_sub(n);
                let args = state.stack.split_off(start);
                match dispatch_async_call(compiled, library, *fn_idx, &args, heap, root, attach, position) {
                    Ok(task) => {
                        state.ip += 1;
                        heap.roots.truncate_temps(root_mark);
                        return StepOutcome::Await(task);
                    }
                    Err(e) => throw_now!(e),
                }
            }
            OpCode::CallAsyncFuncSpread { fn_idx } => {
                if !allow_async {
                    throw_now!(make_exception(heap, ExceptionKind::AsyncError, "async call used in synchronous execution", position));
                }
                let spread = state.stack.pop().unwrap_or(Value::Undefined);
                match spread_args(heap, &spread) {
                    Some(args) => match dispatch_async_call(compiled, library, *fn_idx, &args, heap, root, attach, position) {
                        Ok(task) => {
                            state.ip += 1;
                            heap.roots.truncate_temps(root_mark);
                            return StepOutcome::Await(task);
                        }
                        Err(e) => throw_now!(e),
                    },
                    None => throw_now!(type_error(heap, "spread call argument must be an array", position)),
                }
            }
            OpCode::CallConst(idx) => {
                let key = callee_name(compiled, *idx).to_string();
                let (ns, k) = key.split_once('.').unwrap_or((key.as_str(), ""));
                let result = match library.find_constant(ns, k) {
                    Some(c) => {
                        let mut ctx = CallCtx { heap, root, attach, args: &[] };
                        c.get(&mut ctx)
                    }
                    None => Err(type_error(heap, format!("unknown constant '{}'", key), position)),
                };
                match result {
                    Ok(v) => {
                        state.stack.push(v);
                        state.ip += 1;
                    }
                    Err(e) => throw_now!(e),
                }
            }
            OpCode::CallAsyncConst(idx) => {
                if !allow_async {
                    throw_now!(make_exception(heap, ExceptionKind::AsyncError, "async call used in synchronous execution", position));
                }
                let key = callee_name(compiled, *idx).to_string();
                let (ns, k) = key.split_once('.').unwrap_or((key.as_str(), ""));
                match library.find_async_constant(ns, k) {
                    Some(c) => {
                        let mut ctx = CallCtx { heap, root, attach, args: &[] };
                        let task = c.get(&mut ctx);
                        state.ip += 1;
                        heap.roots.truncate_temps(root_mark);
                        return StepOutcome::Await(task);
                    }
                    None => throw_now!(type_error(heap, format!("unknown async constant '{}'", key), position)),
                }
            }
            OpCode::Jump(addr) => {
                state.ip = *addr as usize;
            }
            OpCode::JumpIfFalse(addr) => {
                let v = state.stack.pop().unwrap_or(Value::Undefined);
                state.ip = if value_ops::is_truthy(heap, &v) { state.ip + 1 } else { *addr as usize };
            }
            OpCode::JumpIfTrue(addr) => {
                let v = state.stack.pop().unwrap_or(Value::Undefined);
                state.ip = if value_ops::is_truthy(heap, &v) { *addr as usize } else { state.ip + 1 };
            }
            OpCode::IterateInto(var) => {
                let container = state.stack.pop().unwrap_or(Value::Undefined);
                let source = match &container {
                    Value::Array(r) => Some(IterSource::Array(*r)),
                    Value::Object(r) => Some(IterSource::Object(*r)),
                    _ => None,
                };
                match source {
                    Some(src) => match heap.new_iterator(src, IterMode::Entries) {
                        Some(iter_ref) => {
                            if let Some(slot) = state.vars.get_mut(*var as usize) {
                                *slot = Value::Iterator(iter_ref);
                            }
                            state.ip += 1;
                        }
                        None => throw_now!(oom(heap, position)),
                    },
                    None => throw_now!(type_error(heap, format!("cannot iterate over {}", value_ops::type_of(&container)), position)),
                }
            }
            OpCode::IterateNext(var) => {
                let iter_val = state.vars.get(*var as usize).cloned().unwrap_or(Value::Undefined);
                match iter_val {
                    Value::Iterator(r) => {
                        let has_next = heap.iterator_next(r);
                        state.stack.push(Value::Boolean(has_next));
                        state.ip += 1;
                    }
                    other => throw_now!(type_error(heap, format!("iterate-next on {}", value_ops::type_of(&other)), position)),
                }
            }
            OpCode::IterateKey { key_var, iter_var } => {
                let iter_val = state.vars.get(*iter_var as usize).cloned().unwrap_or(Value::Undefined);
                match iter_val {
                    Value::Iterator(r) => {
                        let key = heap.iterator_current_key(r);
                        if let Some(slot) = state.vars.get_mut(*key_var as usize) {
                            *slot = key;
                        }
                        state.ip += 1;
                    }
                    other => throw_now!(type_error(heap, format!("iterate-key on {}", value_ops::type_of(&other)), position)),
                }
            }
            OpCode::IterateValue { val_var, iter_var } => {
                let iter_val = state.vars.get(*iter_var as usize).cloned().unwrap_or(Value::Undefined);
                match iter_val {
                    Value::Iterator(r) => {
                        let value = heap.iterator_current_value(r);
                        if let Some(slot) = state.vars.get_mut(*val_var as usize) {
                            *slot = value;
                        }
                        state.ip += 1;
                    }
                    other => throw_now!(type_error(heap, format!("iterate-value on {}", value_ops::type_of(&other)), position)),
                }
            }
            OpCode::IntoCatch(var) => {
                let exc = state.stack.pop().unwrap_or(Value::Undefined);
                if let Some(slot) = state.vars.get_mut(*var as usize) {
                    *slot = exc;
                }
                state.ip += 1;
            }
            OpCode::ThrowExp => {
                let exc = state.stack.pop().unwrap_or(Value::Undefined);
                throw_now!(exc);
            }
            OpCode::EndReturn => {
                let v = state.stack.pop().unwrap_or(Value::Undefined);
                heap.roots.truncate_temps(root_mark);
                return StepOutcome::Done(Ok(v));
            }
        }

        heap.roots.truncate_temps(root_mark);
    }
}

/// Resume a suspended `run()` after its awaited task settled (spec §5: "once
/// the host/scheduler produces the task's result, execution resumes exactly
/// at the suspension point"). A successful result is pushed where the
/// `CALL_ASYNC_*` opcode's result would have gone; a failed one is thrown at
/// the (already advanced) current instruction, same as `ThrowExp` would.
#[allow(clippy::too_many_arguments)]
pub(crate) fn resume_after_await(
    state: &mut VmState,
    compiled: &Compiled,
    heap: &mut Heap,
    library: &dyn Library,
    root: &Value,
    attach: &Attach,
    result: Result<Value, Value>,
) -> StepOutcome {
    match result {
        Ok(v) => {
            state.stack.push(v);
            run(state, compiled, heap, library, root, attach, true)
        }
        Err(e) => match dispatch_throw(compiled, state, e) {
            Some(final_result) => StepOutcome::Done(Err(final_result)),
            None => run(state, compiled, heap, library, root, attach, true),
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch_sync_call(
    compiled: &Compiled,
    library: &dyn Library,
    fn_idx: u32,
    args: &[Value],
    heap: &mut Heap,
    root: &Value,
    attach: &Attach,
    position: SourcePosition,
) -> Result<Value, Value> {
    if let Some(site) = compiled.directive_sites.get(&fn_idx) {
        call_sync_directive(
            library,
            &site.directive_type,
            &site.directive_name,
            &site.method,
            &site.literals,
            args,
            heap,
            root,
            attach,
            position,
        )
    } else {
        let name = callee_name(compiled, fn_idx).to_string();
        call_sync_function(library, &name, args, heap, root, attach, position)
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch_async_call(
    compiled: &Compiled,
    library: &dyn Library,
    fn_idx: u32,
    args: &[Value],
    heap: &mut Heap,
    root: &Value,
    attach: &Attach,
    position: SourcePosition,
) -> Result<Task<Result<Value, Value>>, Value> {
    if let Some(site) = compiled.directive_sites.get(&fn_idx) {
        let def = match library.find_directive_def(&site.directive_type, &site.directive_name, &site.literals) {
            Some(def) => def,
            None => return Err(type_error(heap, format!("unknown directive '{}'", site.directive_name), position)),
        };
        match def.find_async_func(&site.directive_name, &site.method) {
            Some(f) => {
                let mut ctx = CallCtx { heap, root, attach, args };
                Ok(f.call(&mut ctx))
            }
            None => Err(type_error(
                heap,
                format!("unknown async directive function '{}.{}'", site.directive_name, site.method),
                position,
            )),
        }
    } else {
        let name = callee_name(compiled, fn_idx).to_string();
        match library.find_async_func(&name) {
            Some(f) => {
                let mut ctx = CallCtx { heap, root, attach, args };
                Ok(f.call(&mut ctx))
            }
            None => Err(type_error(heap, format!("unknown async function '{}'", name), position)),
        }
    }
}
