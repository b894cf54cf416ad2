//! Incremental UTF-8 decoding with replacement, ported from
//! `codecs.getincrementaldecoder('UTF-8')(errors='replace')` in
//! `read_utf8()` (`lib/aio/util.py`). The log must never fail to
//! accept bytes just because a multi-byte sequence straddles two
//! reads of the container's output pipe.

/// Decodes byte chunks as they arrive, holding back any trailing
/// incomplete sequence until the next chunk (or [`Self::finish`])
/// completes it. Invalid sequences are replaced with U+FFFD, matching
/// Python's `errors='replace'`.
#[derive(Default)]
pub struct Utf8StreamDecoder {
    leftover: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.leftover.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.leftover) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.leftover.clear();
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.leftover[..valid_up_to]).unwrap());
                    match err.error_len() {
                        Some(len) => {
                            out.push('\u{FFFD}');
                            self.leftover.drain(..valid_up_to + len);
                        }
                        None => {
                            // Incomplete sequence at the end of the buffer: keep
                            // it for the next chunk.
                            self.leftover.drain(..valid_up_to);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flushes whatever incomplete sequence remains at EOF, replacing
    /// it rather than discarding it silently.
    pub fn finish(self) -> String {
        if self.leftover.is_empty() {
            return String::new();
        }
        String::from_utf8_lossy(&self.leftover).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ascii_in_one_shot() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.decode(b"hello\n"), "hello\n");
    }

    #[test]
    fn reassembles_a_multibyte_character_split_across_chunks() {
        let snowman = "\u{2603}".as_bytes().to_vec(); // 3 bytes
        let mut decoder = Utf8StreamDecoder::new();
        let first = decoder.decode(&snowman[..1]);
        assert_eq!(first, "");
        let second = decoder.decode(&snowman[1..]);
        assert_eq!(second, "\u{2603}");
    }

    #[test]
    fn replaces_invalid_bytes() {
        let mut decoder = Utf8StreamDecoder::new();
        let decoded = decoder.decode(&[b'a', 0xff, b'b']);
        assert_eq!(decoded, "a\u{FFFD}b");
    }

    #[test]
    fn finish_flushes_a_trailing_incomplete_sequence() {
        let snowman = "\u{2603}".as_bytes().to_vec();
        let mut decoder = Utf8StreamDecoder::new();
        decoder.decode(&snowman[..2]);
        let tail = decoder.finish();
        assert_eq!(tail, "\u{FFFD}");
    }

    #[test]
    fn finish_on_a_clean_stream_is_empty() {
        let mut decoder = Utf8StreamDecoder::new();
        decoder.decode(b"done");
        assert_eq!(decoder.finish(), "");
    }
}
