//! Streaming JSON decoder and stateful JSON encoder over the value heap
//! (spec §4.4).
//!
//! Decoding and encoding both operate directly on `memory_manager::Heap`
//! values rather than an intermediate DOM: a decoded document is built
//! straight out of `Heap::new_array`/`new_object`/`new_string_from_str`,
//! and an encoded one is produced by walking those same containers. This
//! mirrors the value model the rest of the engine shares, so a script
//! that calls a JSON-decoding library function gets back exactly the kind
//! of `Value` any other operator would hand it.
//!
//! Deliberate deviation from the original C++ JSON codec this crate is
//! grounded on: `true`/`false`/`null` decode to their own `Value::Boolean`
//! and `Value::Null` variants, not `Integer(1)`/`Integer(0)` (spec's
//! explicit redesign note).

mod decoder;
mod encoder;

pub use decoder::{parse, ParseStatus, StreamParser};
pub use encoder::{encode_value, EncodeOptions, GenError, Generator, PrintSink, MAX_DEPTH};
