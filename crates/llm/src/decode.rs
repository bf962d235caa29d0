/// Incremental UTF-8 decoder for raw reply chunks.
///
/// A multi-byte character split across two network chunks is held back until the rest
/// of it arrives. Invalid sequences decode to U+FFFD instead of failing the stream.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes as much of `chunk` (plus held-back bytes) as forms complete characters.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut cursor = 0;

        while cursor < self.pending.len() {
            match std::str::from_utf8(&self.pending[cursor..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    cursor = self.pending.len();
                }
                Err(error) => {
                    let valid_end = cursor + error.valid_up_to();
                    // valid_up_to marks a char boundary, so this slice is valid UTF-8.
                    if let Ok(valid) = std::str::from_utf8(&self.pending[cursor..valid_end]) {
                        out.push_str(valid);
                    }

                    match error.error_len() {
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            cursor = valid_end + invalid_len;
                        }
                        None => {
                            // Truncated sequence at the end: wait for the next chunk.
                            cursor = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..cursor);
        out
    }

    /// Flushes bytes still held back once the stream has ended.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }

        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
