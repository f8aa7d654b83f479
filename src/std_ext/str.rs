// ascii whitespace
// ref: https://infra.spec.whatwg.org/#ascii-whitespace
//
// ASCII whitespace is U+0009 TAB, U+000A LF, U+000C FF, U+000D CR, or U+0020 SPACE.

pub const ASCII_WHITESPACE: [u8; 5] = [0x9, 0xa, 0xC, 0xd, 0x20];

/// number of non-empty lines in `bytes`
#[must_use]
pub fn line_count(bytes: &[u8]) -> usize {
    bytes
        .split(|byte| byte == &b'\n')
        .filter(|s| !s.is_empty())
        .count()
}

/// number of whitespace-separated words in `bytes`
#[must_use]
pub fn word_count(bytes: &[u8]) -> usize {
    bytes
        .split(|byte| ASCII_WHITESPACE.contains(byte))
        .filter(|s| !s.is_empty())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_ignore_empty_segments() {
        let body = b"first line\n\nsecond  line here\n";

        assert_eq!(line_count(body), 2);
        assert_eq!(word_count(body), 5);
        assert_eq!(line_count(b""), 0);
        assert_eq!(word_count(b""), 0);
    }
}
