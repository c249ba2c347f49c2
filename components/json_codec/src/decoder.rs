//! JSON-text → heap-value decoding, one-shot and incremental (spec §4.4).
//!
//! The streaming parser keeps exactly the state the spec names: a parser
//! state stack (`Start, MapStart, MapNeedKey, MapSep, MapNeedVal,
//! MapGotVal, ArrayStart, ArrayNeedVal, ArrayGotVal, ParseComplete,
//! ParseError`), a container stack of open arrays/objects with a pending
//! key buffer, and an incremental byte buffer that is compacted after
//! every successful token. Unlike the teacher's C++ source (which folds
//! `true`/`false` into `Integer 1`/`0`), booleans and `null` are decoded as
//! their own explicit values, per the spec's deliberate deviation from
//! that original behaviour.

use core_types::{ArrayRef, ObjectRef, ParseError, Value};
use memory_manager::Heap;

/// Result of feeding one chunk to a [`StreamParser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// The chunk was consumed but no complete top-level value exists yet.
    NeedMore,
    /// A complete top-level value has been decoded (trailing whitespace
    /// only may still follow; any other trailing byte is an error).
    Complete,
}

/// Which side of a `MapStart`/`ArrayStart` a container is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    MapStart,
    MapNeedKey,
    MapSep,
    MapNeedVal,
    MapGotVal,
    ArrayStart,
    ArrayNeedVal,
    ArrayGotVal,
}

enum Container {
    Array(ArrayRef),
    Object {
        obj: ObjectRef,
        pending_key: Option<String>,
    },
}

/// An incremental JSON decoder bound to one [`Heap`] session.
///
/// Every container allocated while parsing is rooted as a heap temp for
/// the lifetime of the parser (spec §4.1's "Root guards": an operation
/// that allocates must keep its in-progress results rooted across further
/// allocations). The temps are released in one shot when the parse either
/// completes or errors, matching the discipline `value_ops` uses for its
/// own multi-step allocating operators.
pub struct StreamParser {
    root_mark: usize,
    states: Vec<ParseState>,
    containers: Vec<Container>,
    buf: Vec<u8>,
    pos: usize,
    base_offset: usize,
    root: Value,
    has_result: bool,
    errored: bool,
}

impl StreamParser {
    pub fn new(heap: &mut Heap) -> Self {
        StreamParser {
            root_mark: heap.roots.temp_mark(),
            states: Vec::new(),
            containers: Vec::new(),
            buf: Vec::new(),
            pos: 0,
            base_offset: 0,
            root: Value::Undefined,
            has_result: false,
            errored: false,
        }
    }

    /// Start decoding a fresh document with the same parser, releasing any
    /// roots the previous document accumulated.
    pub fn reset(&mut self, heap: &mut Heap) {
        heap.roots.truncate_temps(self.root_mark);
        self.states.clear();
        self.containers.clear();
        self.buf.clear();
        self.pos = 0;
        self.base_offset = 0;
        self.root = Value::Undefined;
        self.has_result = false;
        self.errored = false;
    }

    fn err(&mut self, message: impl Into<String>, local_offset: usize) -> ParseError {
        self.errored = true;
        ParseError::new(message, self.base_offset + local_offset)
    }

    fn root_temp(&mut self, heap: &mut Heap, v: Value) {
        heap.roots.push_temp(v);
    }

    /// Compact the consumed prefix out of the buffer so it never grows
    /// unboundedly across many small chunks (spec §4.4).
    fn compact(&mut self) {
        if self.pos > 0 {
            self.buf.drain(0..self.pos);
            self.base_offset += self.pos;
            self.pos = 0;
        }
    }

    fn skip_ws(&self, mut i: usize) -> usize {
        while i < self.buf.len() && matches!(self.buf[i], b' ' | b'\t' | b'\n' | b'\r') {
            i += 1;
        }
        i
    }

    /// Feed one chunk of input. Returns `NeedMore` until a complete
    /// top-level value (plus only whitespace afterwards) has been seen.
    pub fn parse(&mut self, heap: &mut Heap, chunk: &[u8]) -> Result<ParseStatus, ParseError> {
        if self.errored {
            return Err(self.err("parser is already in an error state", 0));
        }
        self.buf.extend_from_slice(chunk);
        let status = self.drive(heap, false)?;
        self.compact();
        Ok(status)
    }

    /// Close the stream: flush any trailing number/literal sitting right
    /// at end-of-input, then require a complete, unterminated-container-free
    /// result. Reports an error on premature EOF (spec §4.4).
    pub fn finish(&mut self, heap: &mut Heap) -> Result<Value, ParseError> {
        if self.errored {
            return Err(self.err("parser is already in an error state", 0));
        }
        self.drive(heap, true)?;
        if !self.containers.is_empty() || !self.has_result {
            return Err(self.err("unexpected end of input", self.buf.len()));
        }
        let result = self.root.clone();
        heap.roots.truncate_temps(self.root_mark);
        Ok(result)
    }

    /// Drive the state machine as far as the current buffer allows.
    /// `final_chunk` tells scalar scanners that end-of-buffer really means
    /// end-of-input (so a bare trailing number/literal can be finalized
    /// instead of waiting for more bytes that will never come).
    fn drive(&mut self, heap: &mut Heap, final_chunk: bool) -> Result<ParseStatus, ParseError> {
        loop {
            self.pos = self.skip_ws(self.pos);

            if self.containers.is_empty() {
                if self.has_result {
                    if self.pos < self.buf.len() {
                        return Err(self.err("trailing garbage after JSON value", self.pos));
                    }
                    return Ok(ParseStatus::Complete);
                }
                if self.pos >= self.buf.len() {
                    return Ok(ParseStatus::NeedMore);
                }
                match self.try_value(heap, final_chunk)? {
                    None => return Ok(ParseStatus::NeedMore),
                    Some(Outcome::Scalar(v)) => {
                        self.has_result = true;
                        self.root = v;
                    }
                    Some(Outcome::Opened) => {}
                }
                continue;
            }

            // Inside a container: dispatch on the state of the innermost one.
            match self.states.last().copied().unwrap() {
                ParseState::ArrayStart | ParseState::ArrayNeedVal => {
                    if self.pos >= self.buf.len() {
                        return Ok(ParseStatus::NeedMore);
                    }
                    if self.buf[self.pos] == b']'
                        && matches!(self.states.last(), Some(ParseState::ArrayStart))
                    {
                        self.pos += 1;
                        self.close_array(heap)?;
                        continue;
                    }
                    match self.try_value(heap, final_chunk)? {
                        None => return Ok(ParseStatus::NeedMore),
                        Some(Outcome::Scalar(v)) => self.attach_value(heap, v)?,
                        Some(Outcome::Opened) => {}
                    }
                }
                ParseState::ArrayGotVal => {
                    if self.pos >= self.buf.len() {
                        return Ok(ParseStatus::NeedMore);
                    }
                    match self.buf[self.pos] {
                        b',' => {
                            self.pos += 1;
                            *self.states.last_mut().unwrap() = ParseState::ArrayNeedVal;
                        }
                        b']' => {
                            self.pos += 1;
                            self.close_array(heap)?;
                        }
                        _ => return Err(self.err("expected ',' or ']'", self.pos)),
                    }
                }
                ParseState::MapStart | ParseState::MapNeedKey => {
                    if self.pos >= self.buf.len() {
                        return Ok(ParseStatus::NeedMore);
                    }
                    if self.buf[self.pos] == b'}'
                        && matches!(self.states.last(), Some(ParseState::MapStart))
                    {
                        self.pos += 1;
                        self.close_object(heap)?;
                        continue;
                    }
                    if self.buf[self.pos] != b'"' {
                        return Err(self.err("expected a string key", self.pos));
                    }
                    match scan_string(&self.buf, self.pos) {
                        Ok(None) => return Ok(ParseStatus::NeedMore),
                        Ok(Some((key, consumed))) => {
                            self.pos += consumed;
                            if let Some(Container::Object { pending_key, .. }) =
                                self.containers.last_mut()
                            {
                                *pending_key = Some(key);
                            }
                            *self.states.last_mut().unwrap() = ParseState::MapSep;
                        }
                        Err((msg, at)) => return Err(self.err(msg, at)),
                    }
                }
                ParseState::MapSep => {
                    if self.pos >= self.buf.len() {
                        return Ok(ParseStatus::NeedMore);
                    }
                    if self.buf[self.pos] != b':' {
                        return Err(self.err("expected ':'", self.pos));
                    }
                    self.pos += 1;
                    *self.states.last_mut().unwrap() = ParseState::MapNeedVal;
                }
                ParseState::MapNeedVal => {
                    if self.pos >= self.buf.len() {
                        return Ok(ParseStatus::NeedMore);
                    }
                    match self.try_value(heap, final_chunk)? {
                        None => return Ok(ParseStatus::NeedMore),
                        Some(Outcome::Scalar(v)) => self.attach_value(heap, v)?,
                        Some(Outcome::Opened) => {}
                    }
                }
                ParseState::MapGotVal => {
                    if self.pos >= self.buf.len() {
                        return Ok(ParseStatus::NeedMore);
                    }
                    match self.buf[self.pos] {
                        b',' => {
                            self.pos += 1;
                            *self.states.last_mut().unwrap() = ParseState::MapNeedKey;
                        }
                        b'}' => {
                            self.pos += 1;
                            self.close_object(heap)?;
                        }
                        _ => return Err(self.err("expected ',' or '}'", self.pos)),
                    }
                }
            }
        }
    }

    fn try_value(&mut self, heap: &mut Heap, final_chunk: bool) -> Result<Option<Outcome>, ParseError> {
        let b = self.buf[self.pos];
        match b {
            b'"' => match scan_string(&self.buf, self.pos) {
                Ok(None) => Ok(None),
                Ok(Some((s, consumed))) => {
                    self.pos += consumed;
                    let r = heap
                        .new_string_from_str(&s)
                        .ok_or_else(|| ParseError::new("out of memory", self.base_offset + self.pos))?;
                    let v = Value::HeapString(r);
                    self.root_temp(heap, v.clone());
                    Ok(Some(Outcome::Scalar(v)))
                }
                Err((msg, at)) => Err(self.err(msg, at)),
            },
            b'-' | b'0'..=b'9' => match scan_number(&self.buf, self.pos, final_chunk) {
                Ok(None) => Ok(None),
                Ok(Some((v, consumed))) => {
                    self.pos += consumed;
                    Ok(Some(Outcome::Scalar(v)))
                }
                Err((msg, at)) => Err(self.err(msg, at)),
            },
            b't' => match scan_literal(&self.buf, self.pos, b"true", final_chunk) {
                Ok(None) => Ok(None),
                Ok(Some(consumed)) => {
                    self.pos += consumed;
                    Ok(Some(Outcome::Scalar(Value::Boolean(true))))
                }
                Err((msg, at)) => Err(self.err(msg, at)),
            },
            b'f' => match scan_literal(&self.buf, self.pos, b"false", final_chunk) {
                Ok(None) => Ok(None),
                Ok(Some(consumed)) => {
                    self.pos += consumed;
                    Ok(Some(Outcome::Scalar(Value::Boolean(false))))
                }
                Err((msg, at)) => Err(self.err(msg, at)),
            },
            b'n' => match scan_literal(&self.buf, self.pos, b"null", final_chunk) {
                Ok(None) => Ok(None),
                Ok(Some(consumed)) => {
                    self.pos += consumed;
                    Ok(Some(Outcome::Scalar(Value::Null)))
                }
                Err((msg, at)) => Err(self.err(msg, at)),
            },
            b'[' => {
                self.pos += 1;
                let r = heap
                    .new_array(4)
                    .ok_or_else(|| ParseError::new("out of memory", self.base_offset + self.pos))?;
                self.root_temp(heap, Value::Array(r));
                self.containers.push(Container::Array(r));
                self.states.push(ParseState::ArrayStart);
                Ok(Some(Outcome::Opened))
            }
            b'{' => {
                self.pos += 1;
                let r = heap
                    .new_object(4)
                    .ok_or_else(|| ParseError::new("out of memory", self.base_offset + self.pos))?;
                self.root_temp(heap, Value::Object(r));
                self.containers.push(Container::Object {
                    obj: r,
                    pending_key: None,
                });
                self.states.push(ParseState::MapStart);
                Ok(Some(Outcome::Opened))
            }
            other => Err(self.err(format!("unexpected character '{}'", other as char), self.pos)),
        }
    }

    /// Attach a fully-formed value to whatever is innermost: the active
    /// array (append) or the active object (consuming its pending key).
    fn attach_value(&mut self, heap: &mut Heap, v: Value) -> Result<(), ParseError> {
        match self.containers.last_mut().expect("attach_value called with an empty container stack") {
            Container::Array(r) => {
                heap.array_mut(*r)
                    .expect("array handle just allocated by this parser")
                    .push(v);
                *self.states.last_mut().unwrap() = ParseState::ArrayGotVal;
            }
            Container::Object { obj, pending_key } => {
                let key = pending_key.take().expect("object value attached without a pending key");
                let obj = *obj;
                heap.object_set(obj, &key, v);
                *self.states.last_mut().unwrap() = ParseState::MapGotVal;
            }
        }
        Ok(())
    }

    fn close_array(&mut self, heap: &mut Heap) -> Result<(), ParseError> {
        self.states.pop();
        let r = match self.containers.pop().unwrap() {
            Container::Array(r) => r,
            _ => unreachable!(),
        };
        self.finish_container(heap, Value::Array(r))
    }

    fn close_object(&mut self, heap: &mut Heap) -> Result<(), ParseError> {
        self.states.pop();
        let r = match self.containers.pop().unwrap() {
            Container::Object { obj, .. } => obj,
            _ => unreachable!(),
        };
        self.finish_container(heap, Value::Object(r))
    }

    fn finish_container(&mut self, heap: &mut Heap, v: Value) -> Result<(), ParseError> {
        if self.containers.is_empty() {
            self.has_result = true;
            self.root = v;
        } else {
            self.attach_value(heap, v)?;
        }
        Ok(())
    }
}

enum Outcome {
    Scalar(Value),
    Opened,
}

fn scan_literal(
    buf: &[u8],
    start: usize,
    lit: &'static [u8],
    final_chunk: bool,
) -> Result<Option<usize>, (String, usize)> {
    let avail = buf.len() - start;
    if avail < lit.len() {
        if buf[start..].iter().zip(lit.iter()).all(|(a, b)| a == b) {
            if final_chunk {
                return Err(("unexpected end of input".to_string(), start));
            }
            return Ok(None);
        }
        return Err(("invalid literal".to_string(), start));
    }
    if &buf[start..start + lit.len()] == lit {
        Ok(Some(lit.len()))
    } else {
        Err(("invalid literal".to_string(), start))
    }
}

fn utf8_char_len(b0: u8) -> Option<usize> {
    if b0 & 0x80 == 0 {
        Some(1)
    } else if b0 & 0xE0 == 0xC0 {
        Some(2)
    } else if b0 & 0xF0 == 0xE0 {
        Some(3)
    } else if b0 & 0xF8 == 0xF0 {
        Some(4)
    } else {
        None
    }
}

fn parse_hex4(bytes: &[u8]) -> Option<u32> {
    if bytes.len() != 4 {
        return None;
    }
    let s = std::str::from_utf8(bytes).ok()?;
    u32::from_str_radix(s, 16).ok()
}

/// Scan a `"..."` JSON string starting at `buf[start]` (must be `"`).
/// Returns the decoded content and total bytes consumed (quotes included),
/// `Ok(None)` if the buffer runs out mid-string, or `Err((message, offset))`.
fn scan_string(buf: &[u8], start: usize) -> Result<Option<(String, usize)>, (String, usize)> {
    debug_assert_eq!(buf[start], b'"');
    let mut i = start + 1;
    let mut out = String::new();
    loop {
        if i >= buf.len() {
            return Ok(None);
        }
        let b = buf[i];
        if b == b'"' {
            return Ok(Some((out, i + 1 - start)));
        }
        if b == b'\\' {
            if i + 1 >= buf.len() {
                return Ok(None);
            }
            match buf[i + 1] {
                b'"' => {
                    out.push('"');
                    i += 2;
                }
                b'\\' => {
                    out.push('\\');
                    i += 2;
                }
                b'/' => {
                    out.push('/');
                    i += 2;
                }
                b'b' => {
                    out.push('\u{8}');
                    i += 2;
                }
                b'f' => {
                    out.push('\u{c}');
                    i += 2;
                }
                b'n' => {
                    out.push('\n');
                    i += 2;
                }
                b'r' => {
                    out.push('\r');
                    i += 2;
                }
                b't' => {
                    out.push('\t');
                    i += 2;
                }
                b'u' => {
                    if i + 6 > buf.len() {
                        return Ok(None);
                    }
                    let cp = parse_hex4(&buf[i + 2..i + 6])
                        .ok_or_else(|| ("invalid \\u escape".to_string(), i))?;
                    if (0xD800..=0xDBFF).contains(&cp) {
                        if i + 12 > buf.len() {
                            return Ok(None);
                        }
                        if buf[i + 6] != b'\\' || buf[i + 7] != b'u' {
                            return Err(("lone surrogate in string".to_string(), i));
                        }
                        let low = parse_hex4(&buf[i + 8..i + 12])
                            .ok_or_else(|| ("invalid \\u escape".to_string(), i + 6))?;
                        if !(0xDC00..=0xDFFF).contains(&low) {
                            return Err(("invalid surrogate pair".to_string(), i));
                        }
                        let c = 0x10000 + ((cp - 0xD800) << 10) + (low - 0xDC00);
                        out.push(char::from_u32(c).ok_or(("invalid surrogate pair".to_string(), i))?);
                        i += 12;
                    } else if (0xDC00..=0xDFFF).contains(&cp) {
                        return Err(("lone surrogate in string".to_string(), i));
                    } else {
                        out.push(char::from_u32(cp).ok_or(("invalid \\u escape".to_string(), i))?);
                        i += 6;
                    }
                }
                other => {
                    return Err((format!("invalid escape character '\\{}'", other as char), i));
                }
            }
        } else if b < 0x20 {
            return Err(("control character in string".to_string(), i));
        } else {
            let len = utf8_char_len(b).ok_or_else(|| ("invalid UTF-8 in string".to_string(), i))?;
            if i + len > buf.len() {
                return Ok(None);
            }
            match std::str::from_utf8(&buf[i..i + len]) {
                Ok(s) => {
                    out.push_str(s);
                    i += len;
                }
                Err(_) => return Err(("invalid UTF-8 in string".to_string(), i)),
            }
        }
    }
}

/// Scan a JSON number. Integers with no fraction/exponent parse as
/// `Integer` (overflow is an error, never a float fallback); anything with
/// `.`/`e`/`E` parses as `Float`. Leading zeros on non-zero integers are
/// rejected (spec §4.4).
fn scan_number(buf: &[u8], start: usize, final_chunk: bool) -> Result<Option<(Value, usize)>, (String, usize)> {
    let mut i = start;
    if buf[i] == b'-' {
        i += 1;
    }
    if i >= buf.len() {
        return if final_chunk {
            Err(("invalid number: missing digits".to_string(), start))
        } else {
            Ok(None)
        };
    }
    if !buf[i].is_ascii_digit() {
        return Err(("invalid number".to_string(), start));
    }
    let first_digit = buf[i];
    i += 1;
    if first_digit != b'0' {
        while i < buf.len() && buf[i].is_ascii_digit() {
            i += 1;
        }
        if i >= buf.len() && !final_chunk {
            return Ok(None);
        }
    } else if i < buf.len() && buf[i].is_ascii_digit() {
        return Err(("leading zero in number".to_string(), start));
    } else if i >= buf.len() && !final_chunk {
        // Could still turn out to be a leading-zero violation once more
        // digits arrive; wait for a disambiguating byte.
        return Ok(None);
    }

    let mut is_float = false;
    if i < buf.len() && buf[i] == b'.' {
        is_float = true;
        i += 1;
        if i >= buf.len() {
            return if final_chunk {
                Err(("invalid number: missing fraction digits".to_string(), start))
            } else {
                Ok(None)
            };
        }
        if !buf[i].is_ascii_digit() {
            return Err(("invalid number: missing fraction digits".to_string(), start));
        }
        while i < buf.len() && buf[i].is_ascii_digit() {
            i += 1;
        }
        if i >= buf.len() && !final_chunk {
            return Ok(None);
        }
    }
    if i < buf.len() && (buf[i] == b'e' || buf[i] == b'E') {
        is_float = true;
        let mut j = i + 1;
        if j < buf.len() && (buf[j] == b'+' || buf[j] == b'-') {
            j += 1;
        }
        if j >= buf.len() {
            return if final_chunk {
                Err(("invalid number: missing exponent digits".to_string(), start))
            } else {
                Ok(None)
            };
        }
        if !buf[j].is_ascii_digit() {
            return Err(("invalid number: missing exponent digits".to_string(), start));
        }
        while j < buf.len() && buf[j].is_ascii_digit() {
            j += 1;
        }
        if j >= buf.len() && !final_chunk {
            return Ok(None);
        }
        i = j;
    }

    let text = std::str::from_utf8(&buf[start..i]).expect("scanned bytes are ASCII digits/./-/e/+");
    let value = if is_float {
        text.parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ("invalid number".to_string(), start))?
    } else {
        text.parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| ("integer literal out of range".to_string(), start))?
    };
    Ok(Some((value, i - start)))
}

/// Parse a complete JSON text in one call; convenience wrapper around
/// [`StreamParser`] for callers that already have the whole document.
pub fn parse(heap: &mut Heap, bytes: &[u8]) -> Result<Value, ParseError> {
    let mut parser = StreamParser::new(heap);
    parser.parse(heap, bytes)?;
    parser.finish(heap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Value;

    #[test]
    fn decodes_a_flat_object() {
        let mut heap = Heap::new();
        let v = parse(&mut heap, br#"{"name":"fiber","nums":[1,2.5,true,null]}"#).unwrap();
        let Value::Object(obj) = v else { panic!("expected object") };
        let name = heap.object_get(obj, "name").unwrap();
        let Value::HeapString(s) = name else { panic!("expected string") };
        assert_eq!(heap.string_content(s), "fiber");

        let nums = heap.object_get(obj, "nums").unwrap();
        let Value::Array(arr) = nums else { panic!("expected array") };
        let a = heap.array(arr).unwrap();
        assert_eq!(a.size(), 4);
        assert!(matches!(a.get(0), Value::Integer(1)));
        assert!(matches!(a.get(1), Value::Float(f) if f == 2.5));
        assert!(matches!(a.get(2), Value::Boolean(true)));
        assert!(matches!(a.get(3), Value::Null));
    }

    #[test]
    fn rejects_leading_zero() {
        let mut heap = Heap::new();
        assert!(parse(&mut heap, b"01").is_err());
        assert!(parse(&mut heap, b"0").is_ok());
        assert!(parse(&mut heap, b"0.5").is_ok());
    }

    #[test]
    fn rejects_trailing_garbage() {
        let mut heap = Heap::new();
        let err = parse(&mut heap, b"1 2").unwrap_err();
        assert!(err.message.contains("trailing garbage"));
    }

    #[test]
    fn rejects_control_characters_in_strings() {
        let mut heap = Heap::new();
        let err = parse(&mut heap, b"\"a\x01b\"").unwrap_err();
        assert!(err.message.contains("control character"));
    }

    #[test]
    fn decodes_surrogate_pairs() {
        let mut heap = Heap::new();
        let v = parse(&mut heap, br#""😀""#).unwrap();
        let Value::HeapString(s) = v else { panic!("expected string") };
        assert_eq!(heap.string_content(s), "\u{1F600}");
    }

    #[test]
    fn rejects_lone_surrogate() {
        let mut heap = Heap::new();
        let err = parse(&mut heap, br#""\ud83d""#).unwrap_err();
        assert!(err.message.contains("surrogate"));
    }

    #[test]
    fn incremental_feed_byte_by_byte_matches_one_shot() {
        let mut heap = Heap::new();
        let text = br#"{"a":[1,2,3],"b":"hi"}"#;
        let mut parser = StreamParser::new(&mut heap);
        let mut status = ParseStatus::NeedMore;
        for &b in text {
            status = parser.parse(&mut heap, &[b]).unwrap();
        }
        assert_eq!(status, ParseStatus::Complete);
        let v = parser.finish(&mut heap).unwrap();
        let Value::Object(obj) = v else { panic!("expected object") };
        assert!(heap.object_get(obj, "a").is_some());
    }

    #[test]
    fn premature_eof_is_an_error() {
        let mut heap = Heap::new();
        let mut parser = StreamParser::new(&mut heap);
        parser.parse(&mut heap, b"{\"a\":1").unwrap();
        assert!(parser.finish(&mut heap).is_err());
    }

    #[test]
    fn integer_overflow_is_an_error_not_a_float_demotion() {
        let mut heap = Heap::new();
        let err = parse(&mut heap, b"99999999999999999999999").unwrap_err();
        assert!(err.message.contains("out of range"));
    }
}
