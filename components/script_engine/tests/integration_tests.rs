//! End-to-end scenarios from spec §8, run through the public
//! `script_engine` facade exactly the way a host would: one `ScriptRuntime`,
//! a `Library` implementation, `run`/`compile`+`exec_sync`.

use std::rc::Rc;

use bytecode_system::ConstValue;
use core_types::Value;
use library_api::{AsyncConstant, AsyncFunction, Constant, DirectiveDef, ExecutionContext, Function, Library};
use script_engine::{compile, EncodeOptions, ScriptRuntime};

struct Add;
impl Function for Add {
    fn call(&self, ctx: &mut dyn ExecutionContext) -> Result<Value, Value> {
        let lhs = ctx.arg_value(0).clone();
        let rhs = ctx.arg_value(1).clone();
        match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a + b)),
            _ => {
                let heap = ctx.heap_mut();
                let exc = heap
                    .new_exception_from_kind(
                        core_types::ExceptionKind::TypeError,
                        "add arg must be number",
                        core_types::SourcePosition::UNKNOWN,
                    )
                    .expect("test allocation must succeed");
                Err(Value::Exception(exc))
            }
        }
    }
}

struct HostLibrary {
    add: Add,
}

impl Library for HostLibrary {
    fn find_func(&self, name: &str) -> Option<&dyn Function> {
        (name == "add").then_some(&self.add as &dyn Function)
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

fn attach() -> library_api::Attach {
    Rc::new(())
}

/// Scenario 1: decoding a JSON document yields an object with the expected
/// shape and value types.
#[test]
fn scenario_1_json_decode_produces_the_expected_shape() {
    let runtime = ScriptRuntime::new();
    let value = runtime
        .parse_json(br#"{"name":"fiber","nums":[1,2.5,true,null]}"#)
        .unwrap();
    let heap = runtime.heap();
    let obj_ref = match value {
        Value::Object(r) => r,
        other => panic!("expected an object, got {:?}", other),
    };
    let name = heap.object_get(obj_ref, "name").expect("name key present");
    match name {
        Value::HeapString(r) => assert_eq!(heap.string_content(r), "fiber"),
        other => panic!("expected a string, got {:?}", other),
    }
    let nums = heap.object_get(obj_ref, "nums").expect("nums key present");
    let arr_ref = match nums {
        Value::Array(r) => r,
        other => panic!("expected an array, got {:?}", other),
    };
    let elems = &heap.array(arr_ref).expect("array entity present").data;
    assert!(matches!(elems[0], Value::Integer(1)));
    assert!(matches!(elems[1], Value::Float(f) if f == 2.5));
    assert!(matches!(elems[2], Value::Boolean(true)));
    assert!(matches!(elems[3], Value::Null));
}

/// Scenario 2: `return 1 + 2 * 3;` yields `Integer 7` and never exceeds a
/// simulated stack depth of 2.
#[test]
fn scenario_2_arithmetic_precedence_and_stack_bound() {
    let library = HostLibrary { add: Add };
    let program = compile("return 1 + 2 * 3;", &library).unwrap();
    assert!(program.stack_size <= 2);

    let runtime = ScriptRuntime::new();
    let result = runtime
        .exec_sync(&program, Value::Undefined, attach(), &library)
        .unwrap();
    assert!(matches!(result, Value::Integer(7)));
}

/// Scenario 3: a thrown string literal is caught and returned unwrapped.
#[test]
fn scenario_3_throw_and_catch_returns_the_thrown_value() {
    let library = HostLibrary { add: Add };
    let runtime = ScriptRuntime::new();
    let result = runtime
        .run(
            "try { throw \"oops\"; } catch (e) { return e; }",
            Value::Undefined,
            attach(),
            &library,
        )
        .unwrap()
        .unwrap();
    match result {
        Value::HeapString(r) => assert_eq!(runtime.heap().string_content(r), "oops"),
        other => panic!("expected the raw thrown string, got {:?}", other),
    }
}

/// Scenario 4: `for (let i,v of arr)` over `[1,2,3]` sums to 6.
#[test]
fn scenario_4_for_of_loop_sums_an_array_literal() {
    let library = HostLibrary { add: Add };
    let runtime = ScriptRuntime::new();
    let result = runtime
        .run(
            "let arr=[1,2,3]; let s=0; for (let i,v of arr){ s = s + v; } return s;",
            Value::Undefined,
            attach(),
            &library,
        )
        .unwrap()
        .unwrap();
    assert!(matches!(result, Value::Integer(6)));
}

/// Scenario 5: `add(1, 2)` succeeds; `add("x", 1)` throws the library's own
/// error value and the VM surfaces it as `Err`.
#[test]
fn scenario_5_library_function_success_and_error_value() {
    let library = HostLibrary { add: Add };
    let runtime = ScriptRuntime::new();

    let ok = runtime
        .run("return add(1, 2);", Value::Undefined, attach(), &library)
        .unwrap()
        .unwrap();
    assert!(matches!(ok, Value::Integer(3)));

    let err = runtime
        .run("return add(\"x\", 1);", Value::Undefined, attach(), &library)
        .unwrap()
        .unwrap_err();
    match err {
        Value::Exception(r) => {
            let heap = runtime.heap();
            let exc = heap.exception(r).unwrap();
            assert_eq!(heap.string_content(exc.message), "add arg must be number");
        }
        other => panic!("expected an exception value, got {:?}", other),
    }
}

/// Scenario 6: an object built with keys inserted `a, b, a` encodes to
/// exactly `{"a":3,"b":2}` — overwrite updates in place without reordering.
#[test]
fn scenario_6_object_overwrite_preserves_insertion_order_when_encoded() {
    let runtime = ScriptRuntime::new();
    let mut heap = runtime.heap_mut();
    let obj = heap.new_object(4).unwrap();
    heap.object_set(obj, "a", Value::Integer(1)).unwrap();
    heap.object_set(obj, "b", Value::Integer(2)).unwrap();
    heap.object_set(obj, "a", Value::Integer(3)).unwrap();
    drop(heap);

    let text = runtime
        .encode_json(&Value::Object(obj), EncodeOptions::default())
        .unwrap();
    assert_eq!(text, r#"{"a":3,"b":2}"#);
}
