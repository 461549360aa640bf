//! Byte-level helpers for walking UTF-8 text
//!
//! Node text is always valid UTF-8, but iterators move over it by byte offsets, so we regularly
//! need to find the character boundaries around an arbitrary offset without decoding the whole
//! node. Everything here operates on single bytes of already-validated text.

/// Returns the width of the character starting with the given byte
///
/// Returns `None` if the byte can't start a character, either because it's a continuation byte
/// or because it never appears in valid UTF-8.
pub fn char_width(first: u8) -> Option<usize> {
    const INVALID: u8 = 5;
    const CONT: u8 = 0;

    match UTF8_CHAR_WIDTH[first as usize] {
        INVALID | CONT => None,
        w => Some(w as usize),
    }
}

/// Returns whether the byte continues a multi-byte character
pub fn is_continuation_byte(b: u8) -> bool {
    // continuation bytes start '10'
    b & CONT_MASK == 0b1000_0000
}

/// Returns the nearest character boundary at or after `idx`
///
/// `text.len()` is always a boundary, so the result never exceeds it.
pub fn ceil_boundary(text: &str, idx: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = idx.min(bytes.len());
    while i < bytes.len() && is_continuation_byte(bytes[i]) {
        i += 1;
    }
    i
}

/// Returns the nearest character boundary at or before `idx`
pub fn floor_boundary(text: &str, idx: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = idx.min(bytes.len());
    while i > 0 && i < bytes.len() && is_continuation_byte(bytes[i]) {
        i -= 1;
    }
    i
}

/// Returns the width of the character ending at `end`
///
/// ## Panics
///
/// Panics if `end` is zero.
pub fn width_before(text: &str, end: usize) -> usize {
    assert!(end > 0, "no character before the start of the text");
    end - floor_boundary(text, end - 1)
}

// Slightly modified version of a similar array in the rust source, at
//   src/core/str/mod.rs
//
// Where the the file above gives both continuation bytes and invalid bytes a
// value of 0, we're instead giving invalid bytes an expected length of 5,
// which is not possible in utf-8.
#[rustfmt::skip]
static UTF8_CHAR_WIDTH: [u8; 256] = [
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    5, 5, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
];

const CONT_MASK: u8 = 0b1100_0000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(char_width(b'a'), Some(1));
        assert_eq!("é".as_bytes()[0], 0xC3);
        assert_eq!(char_width(0xC3), Some(2));
        assert_eq!(char_width("€".as_bytes()[0]), Some(3));
        assert_eq!(char_width("🦀".as_bytes()[0]), Some(4));
        assert_eq!(char_width(0x80), None);
        assert_eq!(char_width(0xFF), None);
    }

    #[test]
    fn boundaries() {
        // 'a' at 0, '€' at 1..4, 'b' at 4
        let s = "a€b";

        assert_eq!(ceil_boundary(s, 2), 4);
        assert_eq!(floor_boundary(s, 2), 1);
        assert_eq!(ceil_boundary(s, 1), 1);
        assert_eq!(floor_boundary(s, 4), 4);
        assert_eq!(ceil_boundary(s, 10), 5);
        assert_eq!(floor_boundary(s, 10), 5);

        assert_eq!(width_before(s, 4), 3);
        assert_eq!(width_before(s, 1), 1);
        assert_eq!(width_before(s, 5), 1);
    }
}
