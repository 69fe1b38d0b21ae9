//! Character-level view of raw text runs.
//!
//! Matching compares the decoded character value of a text run against an
//! annotation's anchor strings, but highlight boundaries must land on raw
//! byte offsets so the renderer can splice span tags into the original
//! markup without re-encoding it. [`DecodedChars`] walks a raw run one
//! logical character at a time, decoding entity references on the fly and
//! reporting the raw byte range each character came from.

/// One logical character of a text run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedChar {
    /// The decoded character value.
    pub ch: char,
    /// Start of the raw bytes this character occupies.
    pub start: usize,
    /// End (exclusive) of the raw bytes this character occupies.
    pub end: usize,
}

/// Longest entity reference we try to decode, including `&` and `;`.
/// `&CounterClockwiseContourIntegral;` is the longest named reference in the
/// HTML spec at 33 bytes.
const MAX_ENTITY_LEN: usize = 33;

/// Iterator over the decoded characters of a raw text run.
pub struct DecodedChars<'a> {
    raw: &'a str,
    pos: usize,
}

impl<'a> DecodedChars<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self { raw, pos: 0 }
    }

    /// Try to decode an entity reference starting at `pos` (which holds `&`).
    /// Only references that decode to exactly one character count; anything
    /// else is left as literal text.
    fn decode_entity(&self) -> Option<DecodedChar> {
        let rest = &self.raw[self.pos..];
        // The window end must not split a multi-byte character.
        let mut window = rest.len().min(MAX_ENTITY_LEN);
        while !rest.is_char_boundary(window) {
            window -= 1;
        }
        let semi = rest[..window].find(';')?;
        let candidate = &rest[..semi + 1];
        let decoded = html_escape::decode_html_entities(candidate);
        if decoded == candidate {
            return None;
        }
        let mut chars = decoded.chars();
        let ch = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        Some(DecodedChar {
            ch,
            start: self.pos,
            end: self.pos + semi + 1,
        })
    }
}

impl<'a> Iterator for DecodedChars<'a> {
    type Item = DecodedChar;

    fn next(&mut self) -> Option<DecodedChar> {
        let rest = &self.raw[self.pos..];
        let first = rest.chars().next()?;
        if first == '&' {
            if let Some(decoded) = self.decode_entity() {
                self.pos = decoded.end;
                return Some(decoded);
            }
        }
        let start = self.pos;
        self.pos += first.len_utf8();
        Some(DecodedChar {
            ch: first,
            start,
            end: self.pos,
        })
    }
}
