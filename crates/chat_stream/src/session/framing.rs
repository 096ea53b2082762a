/// Splits a byte stream into complete lines.
///
/// Bytes after the last newline stay buffered until the next chunk, so
/// neither a line nor a multi-byte UTF-8 sequence is ever decoded half-way.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completed, without newlines.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Drain whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode_line(&std::mem::take(&mut self.pending));
        Some(line)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_across_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"{\"a\":").is_empty());
        assert_eq!(framer.push(b"1}\n{\"b\""), vec!["{\"a\":1}"]);
        assert_eq!(framer.push(b":2}\r\n\n"), vec!["{\"b\":2}", ""]);
        assert!(!framer.has_pending());
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_split_utf8_sequence() {
        let text = "olá 👋\n".as_bytes();
        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        for byte in text {
            lines.extend(framer.push(std::slice::from_ref(byte)));
        }
        assert_eq!(lines, vec!["olá 👋"]);
    }

    #[test]
    fn test_finish_flushes_partial_line() {
        let mut framer = LineFramer::new();
        framer.push(b"first\nsecond");
        assert!(framer.has_pending());
        assert_eq!(framer.finish().as_deref(), Some("second"));
        assert_eq!(framer.finish(), None);
    }
}
