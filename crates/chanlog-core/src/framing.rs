//! Byte stream to protocol lines.
//!
//! The relay sends `\n`-terminated lines (usually `\r\n`). Reads from the
//! socket land on arbitrary boundaries, so the framer keeps the unterminated
//! tail of every read and stitches it onto the next one.

use std::fmt;

/// Upper bound for a single line, terminator excluded. IRC lines are 512 bytes
/// plus up to 8191 bytes of message tags; this leaves headroom for both.
pub const DEFAULT_MAX_LINE_LEN: usize = 16 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("framing error: line of {len} bytes exceeds limit of {max}")]
    LineTooLong { len: usize, max: usize },
}

/// One decoded line of server output, without its terminator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolLine(String);

impl ProtocolLine {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ProtocolLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    /// Offset of the first byte not yet handed out as a line.
    start: usize,
    max_line_len: usize,
    /// Set after an oversized tail was dropped; bytes are skipped up to the next `\n`.
    discarding: bool,
    overflow: Option<FramingError>,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineFramer {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            start: 0,
            max_line_len,
            discarding: false,
            overflow: None,
        }
    }

    /// Append `bytes` and iterate the lines that are now complete.
    ///
    /// Lines are drained lazily; any left unconsumed when the iterator is
    /// dropped are returned by the next `feed`.
    pub fn feed(&mut self, bytes: &[u8]) -> Lines<'_> {
        self.append(bytes);
        Lines { framer: self }
    }

    /// Bytes held back waiting for a terminator (plus undrained lines).
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.start
    }

    fn append(&mut self, mut bytes: &[u8]) {
        if self.discarding {
            match bytes.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    self.discarding = false;
                    bytes = &bytes[i + 1..];
                }
                None => return,
            }
        }

        self.buf.extend_from_slice(bytes);

        let tail_start = self.buf[self.start..]
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|i| self.start + i + 1)
            .unwrap_or(self.start);
        let tail_len = self.buf.len() - tail_start;
        if tail_len > self.max_line_len {
            self.buf.truncate(tail_start);
            self.discarding = true;
            self.overflow = Some(FramingError::LineTooLong {
                len: tail_len,
                max: self.max_line_len,
            });
        }
    }

    fn next_line(&mut self) -> Option<Result<ProtocolLine, FramingError>> {
        loop {
            let Some(nl) = self.buf[self.start..].iter().position(|&b| b == b'\n') else {
                return self.overflow.take().map(Err);
            };
            let line_start = self.start;
            let line_end = self.start + nl;
            self.start = line_end + 1;

            let raw = &self.buf[line_start..line_end];
            if raw.len() > self.max_line_len {
                return Some(Err(FramingError::LineTooLong {
                    len: raw.len(),
                    max: self.max_line_len,
                }));
            }
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }
            return Some(Ok(ProtocolLine(String::from_utf8_lossy(raw).into_owned())));
        }
    }

    fn compact(&mut self) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
    }
}

/// Lazy iterator over the complete lines of a [`LineFramer`].
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = Result<ProtocolLine, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_line()
    }
}

impl Drop for Lines<'_> {
    fn drop(&mut self) {
        self.framer.compact();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &[u8] = b":irc.example.net 001 bot :Welcome\r\n\
PING :server123\r\n\
:alice!a@b PRIVMSG #gstreamer :hello world\r\n\
\r\n\
:bob!b@c PRIVMSG #gstreamer :unix newline\n";

    fn collect(framer: &mut LineFramer, bytes: &[u8]) -> Vec<Result<ProtocolLine, FramingError>> {
        framer.feed(bytes).collect()
    }

    fn ok_lines(items: Vec<Result<ProtocolLine, FramingError>>) -> Vec<String> {
        items
            .into_iter()
            .map(|r| r.unwrap().into_string())
            .collect()
    }

    #[test]
    fn splits_whole_buffer_and_strips_terminators() {
        let mut f = LineFramer::default();
        let lines = ok_lines(collect(&mut f, STREAM));
        assert_eq!(
            lines,
            vec![
                ":irc.example.net 001 bot :Welcome",
                "PING :server123",
                ":alice!a@b PRIVMSG #gstreamer :hello world",
                ":bob!b@c PRIVMSG #gstreamer :unix newline",
            ]
        );
        assert!(lines.iter().all(|l| !l.contains('\r') && !l.contains('\n')));
        assert_eq!(f.buffered(), 0);
    }

    #[test]
    fn chunk_boundaries_do_not_change_output() {
        let mut whole = LineFramer::default();
        let expected = ok_lines(collect(&mut whole, STREAM));

        for split_a in 0..STREAM.len() {
            for split_b in split_a..STREAM.len() {
                let mut f = LineFramer::default();
                let mut got = Vec::new();
                got.extend(ok_lines(collect(&mut f, &STREAM[..split_a])));
                got.extend(ok_lines(collect(&mut f, &STREAM[split_a..split_b])));
                got.extend(ok_lines(collect(&mut f, &STREAM[split_b..])));
                assert_eq!(got, expected, "split at {split_a}/{split_b}");
            }
        }
    }

    #[test]
    fn byte_at_a_time() {
        let mut f = LineFramer::default();
        let mut got = Vec::new();
        for b in STREAM {
            got.extend(ok_lines(collect(&mut f, std::slice::from_ref(b))));
        }
        assert_eq!(got.len(), 4);
        assert_eq!(got[1], "PING :server123");
    }

    #[test]
    fn unterminated_input_is_held() {
        let mut f = LineFramer::default();
        assert!(collect(&mut f, b"PING :par").is_empty());
        assert_eq!(f.buffered(), 9);
        assert!(collect(&mut f, b"").is_empty());
        assert_eq!(ok_lines(collect(&mut f, b"tial\r\n")), vec!["PING :partial"]);
    }

    #[test]
    fn undrained_lines_survive_to_next_feed() {
        let mut f = LineFramer::default();
        {
            let mut it = f.feed(b"one\r\ntwo\r\nthr");
            assert_eq!(it.next().unwrap().unwrap().as_str(), "one");
        }
        assert_eq!(ok_lines(collect(&mut f, b"ee\r\n")), vec!["two", "three"]);
    }

    #[test]
    fn oversized_tail_is_reported_once_and_skipped() {
        let mut f = LineFramer::new(8);
        let first = collect(&mut f, b"ok\r\n0123456789");
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].as_ref().unwrap().as_str(), "ok");
        assert!(matches!(
            first[1],
            Err(FramingError::LineTooLong { len: 10, max: 8 })
        ));

        // Rest of the oversized line is dropped, framing resumes after it.
        assert!(collect(&mut f, b"abcdef").is_empty());
        assert_eq!(ok_lines(collect(&mut f, b"ghi\r\nnext\r\n")), vec!["next"]);
    }

    #[test]
    fn oversized_complete_line_is_an_error_not_a_line() {
        let mut f = LineFramer::new(4);
        let out = collect(&mut f, b"toolong\nok\n");
        assert!(out[0].is_err());
        assert_eq!(out[1].as_ref().unwrap().as_str(), "ok");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut f = LineFramer::default();
        let lines = ok_lines(collect(&mut f, b"caf\xe9\r\n"));
        assert_eq!(lines, vec!["caf\u{fffd}"]);
    }
}
