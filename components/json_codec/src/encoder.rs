//! Heap-value → JSON-text encoding (spec §4.4). Modeled on the yajl-style
//! generator the original engine embedded: a small container-state stack
//! (empty/non-empty array, empty/awaiting-value/non-empty object) rather
//! than recursion over the *output*, so one `Generator` can be fed values
//! incrementally from any traversal order. `encode_value` is the
//! recursive convenience wrapper every caller outside this crate actually
//! reaches for.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use core_types::Value;
use memory_manager::Heap;
use thiserror::Error;

/// A sink the generator streams output chunks through when `print_callback`
/// is configured, instead of accumulating them in an internal buffer (spec
/// §4.4's `PrintCallback` option).
pub type PrintSink = Rc<RefCell<dyn FnMut(&str)>>;

/// Generator configuration (spec §4.4's named encoder options).
#[derive(Clone)]
pub struct EncodeOptions {
    /// Pretty-print with newlines and indentation.
    pub beauty: bool,
    /// Indent unit used when `beauty` is set.
    pub indent: String,
    /// Reject non-UTF-8 string content instead of emitting it lossily.
    pub validate_utf8: bool,
    /// Escape `/` as `\/` (some embedders avoid `</script>` breakage).
    pub escape_solidus: bool,
    /// Stream every output chunk through this sink rather than an internal
    /// buffer (spec §4.4). When set, `Generator::into_output`/`encode_value`
    /// fail with `GenError::NoBuf` instead of returning text.
    pub print_callback: Option<PrintSink>,
}

impl fmt::Debug for EncodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodeOptions")
            .field("beauty", &self.beauty)
            .field("indent", &self.indent)
            .field("validate_utf8", &self.validate_utf8)
            .field("escape_solidus", &self.escape_solidus)
            .field("print_callback", &self.print_callback.is_some())
            .finish()
    }
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            beauty: false,
            indent: "  ".to_string(),
            validate_utf8: true,
            escape_solidus: false,
            print_callback: None,
        }
    }
}

/// Maximum container nesting depth the generator will track (spec §4.4).
pub const MAX_DEPTH: usize = 128;

/// Failure produced while generating JSON text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenError {
    #[error("object keys must be strings")]
    KeysMustBeString,
    #[error("maximum nesting depth ({0}) exceeded")]
    MaxDepthExceeded(usize),
    #[error("generator is not in a state that accepts this call")]
    ErrorState,
    #[error("the generated document is already complete")]
    GenerateComplete,
    #[error("value is not encodable as JSON (heap handle dangled)")]
    InvalidValue,
    #[error("string is not valid UTF-8")]
    InvalidString,
    #[error("no internal buffer to return: a print callback sink is configured")]
    NoBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerState {
    ArrayEmpty,
    ArrayNonEmpty,
    ObjectEmpty,
    ObjectAwaitingValue,
    ObjectNonEmpty,
}

/// A stateful JSON text generator: `open_array`/`open_object`, `key`,
/// and one method per scalar shape. Every token it produces is routed
/// through `emit`/`emit_char`, which either appends to the internal
/// buffer or forwards straight to the configured `print_callback` sink
/// (spec §4.4). `encode_value` below drives one of these recursively;
/// embedders that want to stream a value's fields as they're produced
/// (rather than handing over a fully-materialized `Value`) can drive it
/// directly.
pub struct Generator {
    options: EncodeOptions,
    stack: Vec<ContainerState>,
    out: String,
    complete: bool,
    errored: bool,
}

impl Generator {
    pub fn new(options: EncodeOptions) -> Self {
        Generator {
            options,
            stack: Vec::new(),
            out: String::new(),
            complete: false,
            errored: false,
        }
    }

    /// Consume the generator, returning the text produced so far.
    ///
    /// Fails with `NoBuf` if `print_callback` is configured: output was
    /// streamed through the sink as it was produced, so there is no
    /// internal buffer left to hand back (spec §4.4).
    pub fn into_output(self) -> Result<String, GenError> {
        if self.options.print_callback.is_some() {
            return Err(GenError::NoBuf);
        }
        Ok(self.out)
    }

    /// Write one output chunk: to the callback sink if configured, else
    /// appended to the internal buffer.
    fn emit(&mut self, s: &str) {
        if let Some(sink) = &self.options.print_callback {
            (sink.borrow_mut())(s);
        } else {
            self.out.push_str(s);
        }
    }

    fn emit_char(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.emit(c.encode_utf8(&mut buf));
    }

    fn guard_writable(&self) -> Result<(), GenError> {
        if self.errored {
            return Err(GenError::ErrorState);
        }
        if self.complete {
            return Err(GenError::GenerateComplete);
        }
        Ok(())
    }

    /// Insert the separator/newline/indent a new token needs given the
    /// innermost container's state, then update that state for "one token
    /// has now been written".
    fn before_scalar_or_open(&mut self) -> Result<(), GenError> {
        match self.stack.last().copied() {
            None => {}
            Some(ContainerState::ArrayEmpty) => {
                *self.stack.last_mut().unwrap() = ContainerState::ArrayNonEmpty;
                self.newline_indent();
            }
            Some(ContainerState::ArrayNonEmpty) => {
                self.emit_char(',');
                self.newline_indent();
            }
            Some(ContainerState::ObjectAwaitingValue) => {
                self.emit_char(':');
                if self.options.beauty {
                    self.emit_char(' ');
                }
                *self.stack.last_mut().unwrap() = ContainerState::ObjectNonEmpty;
            }
            Some(ContainerState::ObjectEmpty) | Some(ContainerState::ObjectNonEmpty) => {
                return Err(GenError::KeysMustBeString);
            }
        }
        Ok(())
    }

    fn newline_indent(&mut self) {
        if self.options.beauty {
            self.emit_char('\n');
            for _ in 0..self.stack.len() {
                let indent = self.options.indent.clone();
                self.emit(&indent);
            }
        }
    }

    fn after_top_level_token(&mut self) {
        if self.stack.is_empty() {
            self.complete = true;
        }
    }

    pub fn open_array(&mut self) -> Result<(), GenError> {
        self.guard_writable()?;
        if self.stack.len() >= MAX_DEPTH {
            self.errored = true;
            return Err(GenError::MaxDepthExceeded(MAX_DEPTH));
        }
        self.before_scalar_or_open()?;
        self.emit_char('[');
        self.stack.push(ContainerState::ArrayEmpty);
        Ok(())
    }

    pub fn close_array(&mut self) -> Result<(), GenError> {
        self.guard_writable()?;
        match self.stack.pop() {
            Some(ContainerState::ArrayEmpty) => {
                self.emit_char(']');
            }
            Some(ContainerState::ArrayNonEmpty) => {
                if self.options.beauty {
                    self.emit_char('\n');
                    for _ in 0..self.stack.len() {
                        let indent = self.options.indent.clone();
                        self.emit(&indent);
                    }
                }
                self.emit_char(']');
            }
            _ => {
                self.errored = true;
                return Err(GenError::ErrorState);
            }
        }
        self.after_top_level_token();
        Ok(())
    }

    pub fn open_object(&mut self) -> Result<(), GenError> {
        self.guard_writable()?;
        if self.stack.len() >= MAX_DEPTH {
            self.errored = true;
            return Err(GenError::MaxDepthExceeded(MAX_DEPTH));
        }
        self.before_scalar_or_open()?;
        self.emit_char('{');
        self.stack.push(ContainerState::ObjectEmpty);
        Ok(())
    }

    pub fn close_object(&mut self) -> Result<(), GenError> {
        self.guard_writable()?;
        match self.stack.pop() {
            Some(ContainerState::ObjectEmpty) => {
                self.emit_char('}');
            }
            Some(ContainerState::ObjectNonEmpty) => {
                if self.options.beauty {
                    self.emit_char('\n');
                    for _ in 0..self.stack.len() {
                        let indent = self.options.indent.clone();
                        self.emit(&indent);
                    }
                }
                self.emit_char('}');
            }
            _ => {
                self.errored = true;
                return Err(GenError::ErrorState);
            }
        }
        self.after_top_level_token();
        Ok(())
    }

    /// Write an object key. Only valid when the innermost container is an
    /// object awaiting its next key.
    pub fn key(&mut self, k: &str) -> Result<(), GenError> {
        self.guard_writable()?;
        match self.stack.last().copied() {
            Some(ContainerState::ObjectEmpty) => {
                *self.stack.last_mut().unwrap() = ContainerState::ObjectAwaitingValue;
                self.newline_indent();
            }
            Some(ContainerState::ObjectNonEmpty) => {
                self.emit_char(',');
                self.newline_indent();
                *self.stack.last_mut().unwrap() = ContainerState::ObjectAwaitingValue;
            }
            _ => {
                self.errored = true;
                return Err(GenError::KeysMustBeString);
            }
        }
        self.write_json_string(k)?;
        Ok(())
    }

    pub fn write_null(&mut self) -> Result<(), GenError> {
        self.guard_writable()?;
        self.before_scalar_or_open()?;
        self.emit("null");
        self.after_top_level_token();
        Ok(())
    }

    pub fn write_bool(&mut self, b: bool) -> Result<(), GenError> {
        self.guard_writable()?;
        self.before_scalar_or_open()?;
        self.emit(if b { "true" } else { "false" });
        self.after_top_level_token();
        Ok(())
    }

    pub fn write_integer(&mut self, n: i64) -> Result<(), GenError> {
        self.guard_writable()?;
        self.before_scalar_or_open()?;
        self.emit(&n.to_string());
        self.after_top_level_token();
        Ok(())
    }

    /// Non-finite floats (`NaN`, `±Infinity`) have no JSON literal: spec
    /// §4.4's error taxonomy lists `InvalidValue` for exactly this case,
    /// so this drives the generator into terminal `Error` state rather
    /// than emitting a lossy `null` stand-in.
    pub fn write_float(&mut self, f: f64) -> Result<(), GenError> {
        self.guard_writable()?;
        if !f.is_finite() {
            self.errored = true;
            return Err(GenError::InvalidValue);
        }
        self.before_scalar_or_open()?;
        let text = format_finite_float(f);
        self.emit(&text);
        self.after_top_level_token();
        Ok(())
    }

    pub fn write_string(&mut self, s: &str) -> Result<(), GenError> {
        self.guard_writable()?;
        self.before_scalar_or_open()?;
        self.write_json_string(s)?;
        self.after_top_level_token();
        Ok(())
    }

    fn write_json_string(&mut self, s: &str) -> Result<(), GenError> {
        if self.options.validate_utf8 && std::str::from_utf8(s.as_bytes()).is_err() {
            self.errored = true;
            return Err(GenError::InvalidString);
        }
        self.emit_char('"');
        for c in s.chars() {
            match c {
                '"' => self.emit("\\\""),
                '\\' => self.emit("\\\\"),
                '\n' => self.emit("\\n"),
                '\r' => self.emit("\\r"),
                '\t' => self.emit("\\t"),
                '\u{8}' => self.emit("\\b"),
                '\u{c}' => self.emit("\\f"),
                '/' if self.options.escape_solidus => self.emit("\\/"),
                c if (c as u32) < 0x20 => {
                    let escaped = format!("\\u{:04x}", c as u32);
                    self.emit(&escaped);
                }
                c => self.emit_char(c),
            }
        }
        self.emit_char('"');
        Ok(())
    }
}

fn format_finite_float(f: f64) -> String {
    if f == f.trunc() && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// Encode a heap `Value` to a JSON string in one call (spec §4.4). Fails
/// on heap handles that are neither array nor object (functions, exotic
/// runtime-only values never reach this codec), on a dangled handle, or
/// with `NoBuf` if `options.print_callback` is set (there is then no
/// buffer to return — the caller already received the text via the sink).
pub fn encode_value(heap: &Heap, value: &Value, options: EncodeOptions) -> Result<String, GenError> {
    let mut gen = Generator::new(options);
    encode_into(heap, value, &mut gen)?;
    gen.into_output()
}

fn encode_into(heap: &Heap, value: &Value, gen: &mut Generator) -> Result<(), GenError> {
    match value {
        Value::Undefined | Value::Null => gen.write_null(),
        Value::Boolean(b) => gen.write_bool(*b),
        Value::Integer(n) => gen.write_integer(*n),
        Value::Float(f) => gen.write_float(*f),
        Value::NativeString(s) => gen.write_string(s),
        Value::HeapString(r) => {
            let content = heap.string_content(*r);
            gen.write_string(&content)
        }
        Value::Array(r) => {
            let arr = heap.array(*r).ok_or(GenError::InvalidValue)?;
            gen.open_array()?;
            for i in 0..arr.size() {
                let elem = arr.get(i);
                encode_into(heap, &elem, gen)?;
            }
            gen.close_array()
        }
        Value::Object(r) => {
            let obj = heap.object(*r).ok_or(GenError::InvalidValue)?;
            gen.open_object()?;
            let entries: Vec<(String, Value)> = obj
                .iter_occupied()
                .map(|e| (e.key_content.clone(), e.value.clone()))
                .collect();
            for (k, v) in &entries {
                gen.key(k)?;
                encode_into(heap, v, gen)?;
            }
            gen.close_object()
        }
        Value::NativeBinary(_) | Value::HeapBinary(_) => Err(GenError::InvalidValue),
        Value::Iterator(_) | Value::Exception(_) => Err(GenError::InvalidValue),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_manager::Heap;

    #[test]
    fn encodes_scalars() {
        let heap = Heap::new();
        assert_eq!(encode_value(&heap, &Value::Null, EncodeOptions::default()).unwrap(), "null");
        assert_eq!(encode_value(&heap, &Value::Boolean(true), EncodeOptions::default()).unwrap(), "true");
        assert_eq!(encode_value(&heap, &Value::Integer(42), EncodeOptions::default()).unwrap(), "42");
    }

    #[test]
    fn object_encodes_in_insertion_order_last_write_wins() {
        let mut heap = Heap::new();
        let obj = heap.new_object(4).unwrap();
        heap.object_set(obj, "a", Value::Integer(1)).unwrap();
        heap.object_set(obj, "b", Value::Integer(2)).unwrap();
        heap.object_set(obj, "a", Value::Integer(3)).unwrap();
        let out = encode_value(&heap, &Value::Object(obj), EncodeOptions::default()).unwrap();
        assert_eq!(out, r#"{"a":3,"b":2}"#);
    }

    #[test]
    fn array_round_trips_through_encode_and_decode() {
        let mut heap = Heap::new();
        let arr = heap.new_array(4).unwrap();
        heap.array_mut(arr).unwrap().push(Value::Integer(1));
        heap.array_mut(arr).unwrap().push(Value::Boolean(false));
        let s = heap.new_string_from_str("hi").unwrap();
        heap.array_mut(arr).unwrap().push(Value::HeapString(s));
        let text = encode_value(&heap, &Value::Array(arr), EncodeOptions::default()).unwrap();
        assert_eq!(text, r#"[1,false,"hi"]"#);

        let decoded = crate::decoder::parse(&mut heap, text.as_bytes()).unwrap();
        let Value::Array(r2) = decoded else { panic!("expected array") };
        let a2 = heap.array(r2).unwrap();
        assert_eq!(a2.size(), 3);
    }

    #[test]
    fn beauty_mode_indents() {
        let mut heap = Heap::new();
        let obj = heap.new_object(4).unwrap();
        heap.object_set(obj, "a", Value::Integer(1)).unwrap();
        let opts = EncodeOptions {
            beauty: true,
            ..EncodeOptions::default()
        };
        let out = encode_value(&heap, &Value::Object(obj), opts).unwrap();
        assert_eq!(out, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn escapes_control_characters_and_quotes() {
        let heap = Heap::new();
        let out = encode_value(&heap, &Value::NativeString("a\"\n\tb".into()), EncodeOptions::default()).unwrap();
        assert_eq!(out, r#""a\"\n\tb""#);
    }

    #[test]
    fn max_depth_is_enforced() {
        let mut gen = Generator::new(EncodeOptions::default());
        for _ in 0..MAX_DEPTH {
            gen.open_array().unwrap();
        }
        assert_eq!(gen.open_array().unwrap_err(), GenError::MaxDepthExceeded(MAX_DEPTH));
    }

    /// Spec §4.4's error taxonomy: a non-finite float is `InvalidValue`,
    /// not a lossy `null` substitution, and puts the generator into
    /// terminal `Error` state.
    #[test]
    fn non_finite_float_is_an_invalid_value_error_not_null() {
        let heap = Heap::new();
        let err = encode_value(&heap, &Value::Float(f64::NAN), EncodeOptions::default()).unwrap_err();
        assert_eq!(err, GenError::InvalidValue);

        let mut gen = Generator::new(EncodeOptions::default());
        assert_eq!(gen.write_float(f64::INFINITY).unwrap_err(), GenError::InvalidValue);
        assert_eq!(gen.write_null().unwrap_err(), GenError::ErrorState);
    }

    /// `print_callback` streams every chunk through the sink instead of
    /// the internal buffer; `into_output`/`encode_value` then have
    /// nothing to return and fail with `NoBuf`.
    #[test]
    fn print_callback_streams_output_and_into_output_fails_with_nobuf() {
        let heap = Heap::new();
        let collected = Rc::new(RefCell::new(String::new()));
        let sink = collected.clone();
        let opts = EncodeOptions {
            print_callback: Some(Rc::new(RefCell::new(move |chunk: &str| {
                sink.borrow_mut().push_str(chunk);
            }))),
            ..EncodeOptions::default()
        };

        let err = encode_value(&heap, &Value::Integer(7), opts).unwrap_err();
        assert_eq!(err, GenError::NoBuf);
        assert_eq!(*collected.borrow(), "7");
    }

    #[test]
    fn print_callback_streams_a_nested_object() {
        let mut heap = Heap::new();
        let obj = heap.new_object(2).unwrap();
        heap.object_set(obj, "a", Value::Integer(1)).unwrap();
        heap.object_set(obj, "b", Value::Boolean(true)).unwrap();

        let collected = Rc::new(RefCell::new(String::new()));
        let sink = collected.clone();
        let opts = EncodeOptions {
            print_callback: Some(Rc::new(RefCell::new(move |chunk: &str| {
                sink.borrow_mut().push_str(chunk);
            }))),
            ..EncodeOptions::default()
        };

        let err = encode_value(&heap, &Value::Object(obj), opts).unwrap_err();
        assert_eq!(err, GenError::NoBuf);
        assert_eq!(*collected.borrow(), r#"{"a":1,"b":true}"#);
    }
}
