use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::{LineStream, UpstreamError};

/// Longest line accepted before the upstream is treated as faulty
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Reassembles newline-terminated lines from arbitrarily split chunks
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
    /// Bytes of `buf` already known to hold no newline
    scanned: usize,
}

impl LineDecoder {
    /// Feed a chunk, returning every line it completed (without the terminator).
    /// Fails once a pending line grows past [`MAX_LINE_BYTES`].
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, UpstreamError> {
        self.buf.extend_from_slice(chunk);

        let last_newline = self.buf.iter().skip(self.scanned).rposition(|b| *b == b'\n');
        let mut lines = Vec::new();
        if let Some(offset) = last_newline {
            let mut complete: Vec<u8> = self.buf.drain(..=self.scanned + offset).collect();
            complete.pop();
            // Lines are split on bytes, so multi-byte characters are never cut
            lines.extend(complete.split(|b| *b == b'\n').map(decode_line));
        }
        self.scanned = self.buf.len();

        if self.buf.len() > MAX_LINE_BYTES {
            return Err(UpstreamError::Transport(format!(
                "upstream line exceeds {} bytes",
                MAX_LINE_BYTES
            )));
        }
        Ok(lines)
    }

    /// Whatever is left once the input ends
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        self.scanned = 0;
        let rest = std::mem::take(&mut self.buf);
        Some(decode_line(&rest))
    }
}

fn decode_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Adapt a body byte stream into a [`LineStream`]. A read fault ends the stream
/// after one `Err` item.
pub fn lines<S, E>(bytes: S) -> LineStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut decoder = LineDecoder::default();
        let mut bytes = Box::pin(bytes);
        let mut faulted = false;

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => match decoder.push(&chunk) {
                    Ok(complete) => {
                        for line in complete {
                            yield Ok(line);
                        }
                    }
                    Err(e) => {
                        faulted = true;
                        yield Err(e);
                        break;
                    }
                },
                Err(e) => {
                    faulted = true;
                    yield Err(UpstreamError::Transport(format!("upstream read failed: {}", e)));
                    break;
                }
            }
        }

        if !faulted {
            if let Some(rest) = decoder.finish() {
                yield Ok(rest);
            }
        }
    })
}
