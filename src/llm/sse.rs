//! Server-sent event framing

use super::LlmError;
use futures::{Stream, StreamExt};

/// Position and delimiter length of the first blank-line event boundary.
fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n");
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a <= b { (a, 2) } else { (b, 4) }),
        (Some(a), None) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

/// Remove and return the next complete event from the buffer.
fn drain_next_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (pos, delim_len) = find_event_boundary(buffer)?;
    let event: Vec<u8> = buffer.drain(..pos + delim_len).take(pos).collect();
    Some(event)
}

/// Join the `data:` lines of one event.
fn extract_data(event: &str) -> Option<String> {
    let mut data = String::new();
    let mut found = false;

    for line in event.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            if found {
                data.push('\n');
            }
            data.push_str(rest);
            found = true;
        }
    }

    found.then_some(data)
}

/// Pulls `data:` payloads out of a chunked event-stream body.
pub(super) struct SseReader<S> {
    body: S,
    buffer: Vec<u8>,
}

impl<S, B, E> SseReader<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    pub(super) fn new(body: S) -> Self {
        Self {
            body,
            buffer: Vec::new(),
        }
    }

    /// Next payload, or `None` at end of body or a `[DONE]` marker.
    pub(super) async fn next_data(&mut self) -> Option<Result<String, LlmError>> {
        loop {
            while let Some(event) = drain_next_event(&mut self.buffer) {
                let event = String::from_utf8_lossy(&event);
                if let Some(data) = extract_data(&event) {
                    if data == "[DONE]" {
                        return None;
                    }
                    return Some(Ok(data));
                }
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    return Some(Err(LlmError::network(format!("Stream read failed: {e}"))))
                }
                None => return None,
            }
        }
    }
}
