//! Operator semantics over `Value` (spec §4.3): arithmetic, comparison,
//! membership, coercion, and the JavaScript-flavored truthiness rules the
//! interpreter's binary/unary opcodes delegate to.

use core_types::{ExceptionKind, Value};
use memory_manager::Heap;

/// Binary operators the VM can dispatch to this module. `&&`/`||` are
/// *not* here: the parser's `LogicRelationalExpression` short-circuits,
/// so the compiler lowers it straight to `JumpIfFalse`/`JumpIfTrue`
/// sequences and never reaches an operator opcode at all (spec §4.6's
/// opcode table has no `BOP_AND`/`BOP_OR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// `~`, spec §9: "reserved but not exercised by the test suite; treat
    /// as parse-only until further specified". Parses and compiles, but
    /// evaluating it is a type error until the engine's semantics for it
    /// are specified.
    Match,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Negate,
    LogicalNot,
    Typeof,
}

/// A well-defined operator failure (spec §8 "Operator total definition":
/// every `(op, lhs-type, rhs-type)` triple yields a value or one of these).
#[derive(Debug, Clone, PartialEq)]
pub enum OpError {
    TypeError(String),
    DivisionByZero,
}

impl OpError {
    pub fn kind(&self) -> ExceptionKind {
        match self {
            OpError::TypeError(_) => ExceptionKind::TypeError,
            OpError::DivisionByZero => ExceptionKind::DivisionByZero,
        }
    }

    pub fn message(&self) -> String {
        match self {
            OpError::TypeError(m) => m.clone(),
            OpError::DivisionByZero => "division by zero".to_string(),
        }
    }
}

/// A numeric value coerced from any operand, before the op decides whether
/// to keep it integral or widen to float.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

/// Truthiness, extended to heap strings/binaries which need the heap to
/// know their length (spec §4.3).
pub fn is_truthy(heap: &Heap, v: &Value) -> bool {
    if let Some(b) = v.is_truthy_primitive() {
        return b;
    }
    match v {
        Value::HeapString(r) => heap.string(*r).map(|s| s.len != 0).unwrap_or(false),
        Value::HeapBinary(r) => heap.binary(*r).map(|b| !b.bytes.is_empty()).unwrap_or(false),
        _ => true,
    }
}

/// `typeof` result string.
pub fn type_of(v: &Value) -> &'static str {
    match v {
        Value::Undefined => "undefined",
        Value::Null => "object",
        Value::Boolean(_) => "boolean",
        Value::Integer(_) | Value::Float(_) => "number",
        Value::NativeString(_) | Value::HeapString(_) => "string",
        Value::NativeBinary(_) | Value::HeapBinary(_) => "object",
        Value::Array(_) => "object",
        Value::Object(_) => "object",
        Value::Iterator(_) => "object",
        Value::Exception(_) => "object",
    }
}

fn is_string(v: &Value) -> bool {
    matches!(v, Value::NativeString(_) | Value::HeapString(_))
}

fn string_content(heap: &Heap, v: &Value) -> Option<String> {
    match v {
        Value::NativeString(s) => Some(s.to_string()),
        Value::HeapString(r) => Some(heap.string_content(*r)),
        _ => None,
    }
}

/// Parse a JS-style numeric string: trim whitespace, empty string is `0`,
/// otherwise a failed parse becomes NaN (spec §4.3's loose-equality rule).
fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Coerce a non-string value to a number per spec: booleans and null map to
/// 0/1/0; integers/floats pass through; anything else (heap containers) is
/// a type error for arithmetic contexts.
fn to_number(heap: &Heap, v: &Value) -> Result<Num, OpError> {
    match v {
        Value::Integer(n) => Ok(Num::Int(*n)),
        Value::Float(f) => Ok(Num::Float(*f)),
        Value::Boolean(b) => Ok(Num::Int(if *b { 1 } else { 0 })),
        Value::Null => Ok(Num::Int(0)),
        Value::Undefined => Ok(Num::Float(f64::NAN)),
        _ if is_string(v) => {
            let content = string_content(heap, v).unwrap_or_default();
            Ok(Num::Float(string_to_number(&content)))
        }
        other => Err(OpError::TypeError(format!(
            "value of type {} is not numeric",
            type_of(other)
        ))),
    }
}

fn is_numeric_ish(v: &Value) -> bool {
    matches!(
        v,
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Null | Value::Undefined
    )
}

/// `Add`: numeric addition (checked, widening to float on overflow) or
/// string concatenation; mixed string/number is a type error.
fn add(heap: &mut Heap, lhs: &Value, rhs: &Value) -> Result<Value, OpError> {
    if is_string(lhs) && is_string(rhs) {
        let a = string_content(heap, lhs).unwrap_or_default();
        let b = string_content(heap, rhs).unwrap_or_default();
        let concatenated = a + &b;
        let mark = heap.roots.temp_mark();
        let result = heap
            .new_string_from_str(&concatenated)
            .ok_or_else(|| OpError::TypeError("allocation failed".to_string()))?;
        heap.roots.truncate_temps(mark);
        return Ok(Value::HeapString(result));
    }
    if is_string(lhs) != is_string(rhs) {
        return Err(OpError::TypeError(
            "cannot add string and number".to_string(),
        ));
    }
    numeric_add_sub_mul(heap, lhs, rhs, |a, b| a.checked_add(b), |a, b| a + b)
}

fn numeric_add_sub_mul(
    heap: &Heap,
    lhs: &Value,
    rhs: &Value,
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, OpError> {
    let l = to_number(heap, lhs)?;
    let r = to_number(heap, rhs)?;
    match (l, r) {
        (Num::Int(a), Num::Int(b)) => match int_op(a, b) {
            Some(v) => Ok(Value::Integer(v)),
            None => Ok(Value::Float(float_op(a as f64, b as f64))),
        },
        (a, b) => Ok(Value::Float(float_op(a.as_f64(), b.as_f64()))),
    }
}

fn div(heap: &Heap, lhs: &Value, rhs: &Value) -> Result<Value, OpError> {
    let l = to_number(heap, lhs)?.as_f64();
    let r = to_number(heap, rhs)?.as_f64();
    if r == 0.0 {
        return Err(OpError::DivisionByZero);
    }
    Ok(Value::Float(l / r))
}

fn modulo(heap: &Heap, lhs: &Value, rhs: &Value) -> Result<Value, OpError> {
    let l = to_number(heap, lhs)?;
    let r = to_number(heap, rhs)?;
    match (l, r) {
        (Num::Int(a), Num::Int(b)) => {
            if b == 0 {
                return Err(OpError::DivisionByZero);
            }
            Ok(Value::Integer(a.wrapping_rem(b)))
        }
        (a, b) => {
            let bf = b.as_f64();
            if bf == 0.0 {
                return Err(OpError::DivisionByZero);
            }
            Ok(Value::Float(a.as_f64() % bf))
        }
    }
}

/// String ordering by code-unit content; shorter-is-less on a common
/// prefix (spec §4.3).
fn compare_strings(a: &str, b: &str) -> std::cmp::Ordering {
    let au: Vec<u32> = a.chars().map(|c| c as u32).collect();
    let bu: Vec<u32> = b.chars().map(|c| c as u32).collect();
    au.cmp(&bu)
}

fn numeric_compare(heap: &Heap, lhs: &Value, rhs: &Value) -> Result<Option<std::cmp::Ordering>, OpError> {
    let l = to_number(heap, lhs)?.as_f64();
    let r = to_number(heap, rhs)?.as_f64();
    if l.is_nan() || r.is_nan() {
        return Ok(None);
    }
    Ok(l.partial_cmp(&r))
}

fn relational(heap: &Heap, lhs: &Value, rhs: &Value, want: impl Fn(std::cmp::Ordering) -> bool) -> Result<Value, OpError> {
    if is_string(lhs) && is_string(rhs) {
        let a = string_content(heap, lhs).unwrap_or_default();
        let b = string_content(heap, rhs).unwrap_or_default();
        return Ok(Value::Boolean(want(compare_strings(&a, &b))));
    }
    match numeric_compare(heap, lhs, rhs)? {
        None => Ok(Value::Boolean(false)),
        Some(ord) => Ok(Value::Boolean(want(ord))),
    }
}

fn handles_equal(lhs: &Value, rhs: &Value) -> Option<bool> {
    use Value::*;
    match (lhs, rhs) {
        (HeapString(a), HeapString(b)) => Some(a == b),
        (HeapBinary(a), HeapBinary(b)) => Some(a == b),
        (Array(a), Array(b)) => Some(a == b),
        (Object(a), Object(b)) => Some(a == b),
        (Iterator(a), Iterator(b)) => Some(a == b),
        (Exception(a), Exception(b)) => Some(a == b),
        _ => None,
    }
}

/// Loose equality (spec §4.3): `null == undefined`; numeric-to-string
/// compares by parsing; same-type heap handles compare by identity.
fn loose_eq(heap: &Heap, lhs: &Value, rhs: &Value) -> Result<bool, OpError> {
    use Value::*;
    match (lhs, rhs) {
        (Undefined, Undefined) | (Null, Null) | (Undefined, Null) | (Null, Undefined) => Ok(true),
        (Boolean(a), Boolean(b)) => Ok(a == b),
        (Boolean(b), other) | (other, Boolean(b)) if !matches!(other, Boolean(_)) => {
            let coerced = Value::Integer(if *b { 1 } else { 0 });
            let (l, r) = if matches!(lhs, Boolean(_)) {
                (&coerced, other)
            } else {
                (other, &coerced)
            };
            loose_eq(heap, l, r)
        }
        (a, b) if is_numeric_ish(a) && is_numeric_ish(b) => {
            let l = to_number(heap, a)?.as_f64();
            let r = to_number(heap, b)?.as_f64();
            Ok(!l.is_nan() && !r.is_nan() && l == r)
        }
        (a, b) if is_string(a) && is_string(b) => {
            Ok(string_content(heap, a) == string_content(heap, b))
        }
        (a, b) if is_string(a) && is_numeric_ish(b) => {
            let l = string_to_number(&string_content(heap, a).unwrap_or_default());
            let r = to_number(heap, b)?.as_f64();
            Ok(!l.is_nan() && !r.is_nan() && l == r)
        }
        (a, b) if is_numeric_ish(a) && is_string(b) => loose_eq(heap, b, a),
        (a, b) => Ok(handles_equal(a, b).unwrap_or(false)),
    }
}

/// Strict equality (spec §4.3): numbers compare across `Integer`/`Float`
/// representation, strings compare by content, everything else requires
/// matching handle identity (or matching primitive kind).
fn strict_eq(heap: &Heap, lhs: &Value, rhs: &Value) -> bool {
    use Value::*;
    match (lhs, rhs) {
        (Undefined, Undefined) | (Null, Null) => true,
        (Boolean(a), Boolean(b)) => a == b,
        (Integer(a), Integer(b)) => a == b,
        (Integer(a), Float(b)) | (Float(b), Integer(a)) => *a as f64 == *b,
        (Float(a), Float(b)) => a == b,
        (a, b) if is_string(a) && is_string(b) => string_content(heap, a) == string_content(heap, b),
        (a, b) => handles_equal(a, b).unwrap_or(false),
    }
}

/// `in`: array membership is index-in-bounds, object membership is
/// occupied-key presence.
fn op_in(heap: &Heap, key: &Value, container: &Value) -> Result<bool, OpError> {
    match container {
        Value::Array(r) => {
            let idx = to_number(heap, key)?.as_f64();
            if idx.fract() != 0.0 || idx < 0.0 {
                return Ok(false);
            }
            let idx = idx as usize;
            Ok(heap.array(*r).map(|a| idx < a.size()).unwrap_or(false))
        }
        Value::Object(r) => {
            let key_str = string_content(heap, key)
                .or_else(|| Some(format!("{:?}", key)))
                .unwrap_or_default();
            Ok(heap
                .object(*r)
                .map(|o| o.find_slot(&key_str).is_some())
                .unwrap_or(false))
        }
        other => Err(OpError::TypeError(format!(
            "cannot use 'in' on {}",
            type_of(other)
        ))),
    }
}

/// Evaluate a binary operator. `heap` is mutable only because `Add` may
/// allocate a concatenated string; every other operator only reads it.
pub fn binary_op(op: BinaryOp, lhs: &Value, rhs: &Value, heap: &mut Heap) -> Result<Value, OpError> {
    match op {
        BinaryOp::Add => add(heap, lhs, rhs),
        BinaryOp::Sub => numeric_add_sub_mul(heap, lhs, rhs, |a, b| a.checked_sub(b), |a, b| a - b),
        BinaryOp::Mul => numeric_add_sub_mul(heap, lhs, rhs, |a, b| a.checked_mul(b), |a, b| a * b),
        BinaryOp::Div => div(heap, lhs, rhs),
        BinaryOp::Mod => modulo(heap, lhs, rhs),
        BinaryOp::Lt => relational(heap, lhs, rhs, |o| o == std::cmp::Ordering::Less),
        BinaryOp::Le => relational(heap, lhs, rhs, |o| o != std::cmp::Ordering::Greater),
        BinaryOp::Gt => relational(heap, lhs, rhs, |o| o == std::cmp::Ordering::Greater),
        BinaryOp::Ge => relational(heap, lhs, rhs, |o| o != std::cmp::Ordering::Less),
        BinaryOp::Eq => Ok(Value::Boolean(loose_eq(heap, lhs, rhs)?)),
        BinaryOp::Ne => Ok(Value::Boolean(!loose_eq(heap, lhs, rhs)?)),
        BinaryOp::StrictEq => Ok(Value::Boolean(strict_eq(heap, lhs, rhs))),
        BinaryOp::StrictNe => Ok(Value::Boolean(!strict_eq(heap, lhs, rhs))),
        BinaryOp::In => Ok(Value::Boolean(op_in(heap, lhs, rhs)?)),
        BinaryOp::Match => Err(OpError::TypeError(
            "the '~' match operator has no defined runtime semantics yet".to_string(),
        )),
    }
}

/// Evaluate a unary operator.
pub fn unary_op(op: UnaryOp, operand: &Value, heap: &Heap) -> Result<Value, OpError> {
    match op {
        UnaryOp::Plus => match to_number(heap, operand)? {
            Num::Int(n) => Ok(Value::Integer(n)),
            Num::Float(f) => Ok(Value::Float(f)),
        },
        UnaryOp::Negate => match to_number(heap, operand)? {
            Num::Int(n) => match n.checked_neg() {
                Some(v) => Ok(Value::Integer(v)),
                None => Ok(Value::Float(-(n as f64))),
            },
            Num::Float(f) => Ok(Value::Float(-f)),
        },
        UnaryOp::LogicalNot => Ok(Value::Boolean(!is_truthy(heap, operand))),
        UnaryOp::Typeof => {
            let s = type_of(operand);
            Ok(Value::NativeString(std::rc::Rc::from(s)))
        }
    }
}
