//! Source positions shared by the tokenizer, parser, compiler and VM.

/// A byte offset into the original source text.
///
/// `-1` means "no position available" (e.g. a synthesized node or an
/// exception raised by a library callee with no source context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePosition(pub i64);

impl SourcePosition {
    /// Sentinel for "unknown position".
    pub const UNKNOWN: SourcePosition = SourcePosition(-1);

    /// Build a position from a known byte offset.
    pub fn at(offset: usize) -> Self {
        SourcePosition(offset as i64)
    }

    /// Whether this position carries real information.
    pub fn is_known(&self) -> bool {
        self.0 >= 0
    }
}

impl Default for SourcePosition {
    fn default() -> Self {
        SourcePosition::UNKNOWN
    }
}
