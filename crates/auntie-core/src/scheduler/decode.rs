//! Incremental splitting of subprocess output into lines.
//!
//! get_iplayer rewrites progress lines with bare carriage returns, so both
//! `\r` and `\n` (and the `\r\n` pair) terminate a line, and a trailing
//! partial line is flushed at EOF.

#[derive(Default)]
pub(crate) struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Feed a chunk of raw bytes; returns the lines completed by this chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n' || b == b'\r') else {
                break;
            };
            let delimiter = self.buf[pos];
            let line: Vec<u8> = self.buf.drain(..=pos).take(pos).collect();
            if delimiter == b'\r' && self.buf.first() == Some(&b'\n') {
                self.buf.remove(0);
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Flush whatever remains as a final line (EOF).
    pub fn finish(self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.buf).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newline() {
        let mut decoder = LineDecoder::default();
        assert_eq!(decoder.push(b"one\ntwo\n"), vec!["one", "two"]);
    }

    #[test]
    fn splits_on_carriage_return() {
        let mut decoder = LineDecoder::default();
        assert_eq!(decoder.push(b"10%\r20%\r"), vec!["10%", "20%"]);
    }

    #[test]
    fn crlf_is_one_delimiter() {
        let mut decoder = LineDecoder::default();
        assert_eq!(decoder.push(b"one\r\ntwo\r\n"), vec!["one", "two"]);
    }

    #[test]
    fn partial_line_waits_for_delimiter() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push(b"par").is_empty());
        assert_eq!(decoder.push(b"tial\n"), vec!["partial"]);
    }

    #[test]
    fn finish_flushes_trailing_line() {
        let mut decoder = LineDecoder::default();
        decoder.push(b"done\nleft over");
        assert_eq!(decoder.finish().as_deref(), Some("left over"));
    }

    #[test]
    fn finish_on_empty_buffer_is_none() {
        assert!(LineDecoder::default().finish().is_none());
    }
}
