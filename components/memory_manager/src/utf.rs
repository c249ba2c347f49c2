//! UTF-8 / UTF-16 scanning and transcoding (spec §4.2).
//!
//! Rust's `str::from_utf8` already enforces RFC 3629 exactly the way the
//! spec wants (it rejects overlong encodings and lone surrogate halves), so
//! validation itself is a thin wrapper; this module's own job is the
//! encoding-choice questions the heap needs when allocating strings.

/// Whether every code point in `s` fits in a single byte (0..=0xFF), i.e.
/// whether a `HeapString` built from it can use the byte encoding.
pub fn is_byte_encodable(s: &str) -> bool {
    s.chars().all(|c| (c as u32) <= 0xFF)
}

/// Whether every code unit in a byte buffer (already known to be
/// byte-encoded) fits the byte encoding; trivially true, kept for symmetry
/// with `is_byte_encodable` at call sites that don't know which buffer kind
/// they have yet.
pub fn bytes_are_byte_encodable(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b <= 0xFF)
}

/// Number of UTF-16 code units `s` would occupy.
pub fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

/// Transcode a string already known to be byte-encodable into a byte
/// buffer, one code unit per byte.
///
/// Panics if called on a string containing a code point above `0xFF`;
/// callers must check `is_byte_encodable` first (this mirrors the heap's
/// allocation-time encoding choice in spec §3).
pub fn to_byte_buffer(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| {
            debug_assert!((c as u32) <= 0xFF);
            c as u8
        })
        .collect()
}

/// Transcode a string into UTF-16 code units.
pub fn to_utf16_buffer(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

/// Decode a byte-encoded buffer (one code unit per byte, Latin-1 style)
/// back into a UTF-8 `String` for display/concatenation purposes.
pub fn byte_buffer_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Decode a UTF-16 buffer into a UTF-8 `String`, substituting the Unicode
/// replacement character for unpaired surrogates.
pub fn utf16_buffer_to_string(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}

/// Validate a UTF-8 byte slice, rejecting overlong encodings and lone
/// surrogate halves (both already rejected by `str::from_utf8`).
pub fn validate_utf8(bytes: &[u8]) -> Result<&str, std::str::Utf8Error> {
    std::str::from_utf8(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_byte_encodable() {
        assert!(is_byte_encodable("hello"));
        assert!(is_byte_encodable("\u{00FF}"));
        assert!(!is_byte_encodable("\u{0100}"));
        assert!(!is_byte_encodable("héllo\u{1F600}"));
    }

    #[test]
    fn utf16_len_counts_surrogate_pairs() {
        assert_eq!(utf16_len("abc"), 3);
        assert_eq!(utf16_len("\u{1F600}"), 2);
    }

    #[test]
    fn overlong_and_surrogates_rejected() {
        // Overlong encoding of '/' (0x2F) as two bytes.
        assert!(validate_utf8(&[0xC0, 0xAF]).is_err());
        // Encoded surrogate half (lone), invalid in UTF-8.
        assert!(validate_utf8(&[0xED, 0xA0, 0x80]).is_err());
    }

    #[test]
    fn roundtrip_byte_buffer() {
        let s = "Latin-1 only!";
        assert!(is_byte_encodable(s));
        let buf = to_byte_buffer(s);
        assert_eq!(byte_buffer_to_string(&buf), s);
    }
}
