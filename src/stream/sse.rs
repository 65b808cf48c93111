//! Bounded server-sent-events frame decoder.
//!
//! Converts raw bytes from the subscription into `SseFrame` values. Handles
//! partial frames, `\n` and `\r\n` line endings, comment lines and multi-line
//! `data:` fields. The decoder never holds more than `max_frame_len` bytes of
//! an incomplete frame: a frame that does not fit is reported as
//! `SseError::FrameTooLarge` so the caller can grow the capacity and resubscribe.

use bytes::{Buf, BytesMut};

/// One dispatched SSE event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseFrame {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SseError {
    FrameTooLarge { limit: usize },
    InvalidUtf8,
}

impl std::fmt::Display for SseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SseError::FrameTooLarge { limit } => {
                write!(f, "SSE frame exceeds read buffer capacity of {} bytes", limit)
            }
            SseError::InvalidUtf8 => write!(f, "SSE frame is not valid UTF-8"),
        }
    }
}

impl std::error::Error for SseError {}

#[derive(Debug)]
pub struct SseDecoder {
    buffer: BytesMut,
    max_frame_len: usize,
    /// Start of the first line not yet known to be complete.
    line_start: usize,
    /// Bytes already searched for a newline.
    scanned: usize,
}

impl SseDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_frame_len.min(64 * 1024)),
            max_frame_len,
            line_start: 0,
            scanned: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes buffered but not yet returned as a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the next complete frame, `Ok(None)` if more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<SseFrame>, SseError> {
        let Some((body_end, consumed)) = self.find_frame_end() else {
            if self.buffer.len() > self.max_frame_len {
                return Err(SseError::FrameTooLarge {
                    limit: self.max_frame_len,
                });
            }
            return Ok(None);
        };

        self.line_start = 0;
        self.scanned = 0;
        if body_end > self.max_frame_len {
            self.buffer.advance(consumed);
            return Err(SseError::FrameTooLarge {
                limit: self.max_frame_len,
            });
        }

        let body = self.buffer.split_to(consumed);
        let text = std::str::from_utf8(&body[..body_end]).map_err(|_| SseError::InvalidUtf8)?;
        Ok(Some(parse_frame(text)))
    }

    /// Locates the blank line terminating the first frame.
    ///
    /// Returns the length of the frame body and the number of bytes to consume.
    fn find_frame_end(&mut self) -> Option<(usize, usize)> {
        let mut line_start = self.line_start;
        let mut pos = self.scanned;

        while let Some(offset) = self.buffer[pos..].iter().position(|b| *b == b'\n') {
            let newline = pos + offset;
            let mut line = &self.buffer[line_start..newline];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            if line.is_empty() {
                return Some((line_start, newline + 1));
            }
            line_start = newline + 1;
            pos = line_start;
        }

        self.line_start = line_start;
        self.scanned = self.buffer.len();
        None
    }
}

fn parse_frame(text: &str) -> SseFrame {
    let mut frame = SseFrame::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => data_lines.push(value),
            "id" if !value.contains('\0') => frame.id = Some(value.to_string()),
            "event" => frame.event = Some(value.to_string()),
            // "retry" and unknown fields
            _ => {}
        }
    }

    frame.data = data_lines.join("\n");
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_single_frame() {
        let mut decoder = SseDecoder::new(1024);
        decoder.push(b"event: message\nid: [{\"offset\":1}]\ndata: {\"a\":1}\n\n");

        let frame = decoder.next_frame().unwrap().unwrap();

        assert_eq!(frame.event.as_deref(), Some("message"));
        assert_eq!(frame.id.as_deref(), Some("[{\"offset\":1}]"));
        assert_eq!(frame.data, "{\"a\":1}");
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = SseDecoder::new(1024);

        decoder.push(b"id: 7\nda");
        assert_eq!(decoder.next_frame().unwrap(), None);
        decoder.push(b"ta: hello\r\n");
        assert_eq!(decoder.next_frame().unwrap(), None);
        decoder.push(b"\r\nid: 8\n");

        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.id.as_deref(), Some("7"));
        assert_eq!(frame.data, "hello");
        assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new(1024);
        decoder.push(b": keepalive\ndata: a\ndata: b\nretry: 100\n\n");

        let frame = decoder.next_frame().unwrap().unwrap();

        assert_eq!(frame.data, "a\nb");
        assert_eq!(frame.id, None);
    }

    #[test]
    fn test_incomplete_frame_over_capacity_is_rejected() {
        let mut decoder = SseDecoder::new(16);
        decoder.push(b"data: 0123456789abcdef");

        assert_eq!(
            decoder.next_frame(),
            Err(SseError::FrameTooLarge { limit: 16 })
        );
    }

    #[test]
    fn test_complete_frame_over_capacity_is_rejected() {
        let mut decoder = SseDecoder::new(16);
        decoder.push(b"data: 0123456789abcdef\n\ndata: ok\n\n");

        assert_eq!(
            decoder.next_frame(),
            Err(SseError::FrameTooLarge { limit: 16 })
        );
    }

    #[test]
    fn test_invalid_utf8_frame_is_dropped() {
        let mut decoder = SseDecoder::new(64);
        decoder.push(b"data: \xff\xfe\n\ndata: ok\n\n");

        assert_eq!(decoder.next_frame(), Err(SseError::InvalidUtf8));
        assert_eq!(decoder.next_frame().unwrap().unwrap().data, "ok");
    }

    #[test]
    fn test_partial_line_is_not_rescanned() {
        let mut decoder = SseDecoder::new(1 << 20);
        decoder.push(b"id: 1\ndata: ");

        for _ in 0..1000 {
            decoder.push(&[b'x'; 64]);
            assert_eq!(decoder.next_frame().unwrap(), None);
            assert_eq!(decoder.scanned, decoder.pending());
            assert_eq!(decoder.line_start, 6);
        }

        decoder.push(b"\r");
        assert_eq!(decoder.next_frame().unwrap(), None);
        decoder.push(b"\n\r\n");

        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.id.as_deref(), Some("1"));
        assert_eq!(frame.data.len(), 64_000);
        assert_eq!(decoder.pending(), 0);
    }
}
