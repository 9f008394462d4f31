//! Incremental decoder for the search event stream.
//!
//! Bytes arrive in arbitrary chunks. They are appended to a buffer which is
//! scanned for blank-line delimiters; each complete frame is decoded into a
//! [`StreamEvent`] and the trailing partial frame stays buffered for the next
//! read. Frames that cannot be decoded are logged and dropped so one bad
//! frame never ends the stream.

use crate::protocol::StreamEvent;
use log::{debug, warn};

/// Buffers raw bytes and yields complete events.
///
/// Operates on bytes rather than text so a chunk boundary falling inside a
/// multi-byte UTF-8 sequence is harmless: delimiters are ASCII and a frame is
/// only converted to text once it is complete.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Everything before this offset is known to hold no delimiter.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every event completed by it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        loop {
            match find_delimiter(&self.buffer, self.scanned) {
                Ok((end, consumed)) => {
                    let frame: Vec<u8> = self.buffer.drain(..consumed).collect();
                    self.scanned = 0;
                    if let Some(event) = decode_frame(&frame[..end]) {
                        events.push(event);
                    }
                }
                Err(resume) => {
                    self.scanned = resume;
                    break;
                }
            }
        }
        events
    }

    /// Decode whatever is left once the connection has closed.
    ///
    /// A server that hangs up right after its last frame may omit the final
    /// blank line.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if rest.iter().all(|b| b.is_ascii_whitespace()) {
            return None;
        }
        debug!("Decoding {} trailing bytes after close", rest.len());
        decode_frame(&rest)
    }

    /// Bytes held back waiting for a delimiter.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

/// Look for a blank line starting at `from`.
///
/// A blank line is `\n`, an optional `\r`, then `\n`, which covers LF, CRLF
/// and mixed line endings. Returns `(frame_end, consumed)` on success, or the
/// offset to resume from once more bytes arrive.
fn find_delimiter(buffer: &[u8], from: usize) -> Result<(usize, usize), usize> {
    let mut pos = from;
    while let Some(offset) = buffer[pos..].iter().position(|&b| b == b'\n') {
        let lf = pos + offset;
        let mut next = lf + 1;
        if buffer.get(next) == Some(&b'\r') {
            next += 1;
        }
        match buffer.get(next) {
            Some(b'\n') => {
                let end = if lf > 0 && buffer[lf - 1] == b'\r' {
                    lf - 1
                } else {
                    lf
                };
                return Ok((end, next + 1));
            }
            Some(_) => pos = lf + 1,
            None => return Err(lf),
        }
    }
    Err(buffer.len())
}

/// Decode one frame. `None` means the frame was dropped.
pub fn decode_frame(raw: &[u8]) -> Option<StreamEvent> {
    let text = String::from_utf8_lossy(raw);

    let mut name: Option<&str> = None;
    let mut data: Option<String> = None;

    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            name = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("data:") {
            let value = value.trim();
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }

    let (name, data) = match (name, data) {
        (Some(name), Some(data)) if !name.is_empty() && !data.is_empty() => (name, data),
        _ => {
            debug!("Dropping frame without event name or data");
            return None;
        }
    };

    match StreamEvent::decode(name, &data) {
        Ok(Some(event)) => Some(event),
        Ok(None) => {
            warn!("Ignoring unrecognized stream event: {}", name);
            None
        }
        Err(e) => {
            warn!("Dropping malformed '{}' frame: {}", name, e);
            None
        }
    }
}
