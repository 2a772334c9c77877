use crate::models::Charset;

const REPLACEMENT: char = '\u{FFFD}';

/// Incremental decoder for bytes that arrive in arbitrary chunks.
///
/// A UTF-8 sequence cut in half by a chunk boundary is held back until the
/// rest arrives. Invalid bytes decode to U+FFFD, as does an incomplete
/// sequence still pending at [`finish`](Self::finish).
#[derive(Debug, Clone)]
pub struct TextDecoder {
    charset: Charset,
    pending: Vec<u8>,
}

impl TextDecoder {
    pub fn new(charset: Charset) -> Self {
        Self {
            charset,
            pending: Vec::new(),
        }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Decode `bytes` and append the text to `out`.
    pub fn decode(&mut self, bytes: &[u8], out: &mut String) {
        match self.charset {
            Charset::Utf8 => self.decode_utf8(bytes, out),
            Charset::Latin1 => out.extend(bytes.iter().copied().map(char::from)),
            Charset::Ascii => out.extend(bytes.iter().map(|&byte| {
                if byte.is_ascii() {
                    char::from(byte)
                } else {
                    REPLACEMENT
                }
            })),
        }
    }

    /// Flush whatever is still held back.
    pub fn finish(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            out.push(REPLACEMENT);
            self.pending.clear();
        }
    }

    fn decode_utf8(&mut self, bytes: &[u8], out: &mut String) {
        self.pending.extend_from_slice(bytes);
        let buffered = std::mem::take(&mut self.pending);
        let mut rest = buffered.as_slice();

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    return;
                }
                Err(error) => {
                    let (valid, invalid) = rest.split_at(error.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        out.push_str(text);
                    }
                    match error.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT);
                            rest = &invalid[len..];
                        }
                        // Truncated sequence at the end: wait for more bytes
                        None => {
                            self.pending = invalid.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Decoded text for one stream, built up chunk by chunk.
#[derive(Debug)]
pub(crate) struct TextAccumulator {
    decoder: TextDecoder,
    text: String,
}

impl TextAccumulator {
    pub(crate) fn new(charset: Charset) -> Self {
        Self {
            decoder: TextDecoder::new(charset),
            text: String::new(),
        }
    }

    pub(crate) fn append(&mut self, bytes: &[u8]) {
        self.decoder.decode(bytes, &mut self.text);
    }

    pub(crate) fn finish(mut self) -> String {
        self.decoder.finish(&mut self.text);
        self.text
    }
}
