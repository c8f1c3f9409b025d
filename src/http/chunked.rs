//! Chunked transfer coding
//!
//! Wire layout: `<hex-size>[;ext]\r\n<data>\r\n`, repeated, then `0\r\n`,
//! optional trailer fields and an empty line. Size and trailer lines may end
//! in a bare `\n`.

use super::{Error, Result, CRLF};
use std::io::Write;

/// Longest chunk-size or trailer line accepted
const MAX_LINE: usize = 1024;

/// Writes payload as chunks onto any `Write`
pub struct ChunkedEncoder<W: Write> {
    writer: W,
}

impl<W: Write> ChunkedEncoder<W> {
    pub fn new(writer: W) -> Self {
        ChunkedEncoder { writer }
    }

    /// Emit `data` as one chunk. A zero-length slice is skipped because an
    /// empty chunk would end the body.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        if !data.is_empty() {
            let mut frame = Vec::with_capacity(data.len() + 12);
            write!(frame, "{:x}{}", data.len(), CRLF)?;
            frame.extend_from_slice(data);
            frame.extend_from_slice(CRLF.as_bytes());
            self.writer.write_all(&frame)?;
        }
        Ok(())
    }

    /// Emit the last-chunk marker and flush
    pub fn finish(&mut self) -> Result<()> {
        self.writer.write_all(b"0\r\n\r\n")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Expecting a size line
    Size,
    /// Inside a chunk with this many payload bytes left
    Data(usize),
    /// Expecting the CRLF that closes a chunk
    DataEnd,
    /// After the last chunk, skipping trailer fields
    Trailers,
    Done,
}

/// Incremental chunked body decoder
///
/// Feed it whatever bytes are available; it reports how many it used.
/// Nothing past the final empty line is ever consumed, so a pipelined
/// message that follows stays with the caller.
#[derive(Debug)]
pub struct ChunkedDecoder {
    stage: Stage,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        ChunkedDecoder { stage: Stage::Size }
    }

    /// Decode from `input`, appending payload to `output`
    ///
    /// Returns `(consumed, done)`. `consumed == 0` with `done == false` means
    /// the input holds no complete token and more bytes are needed.
    pub fn decode(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(usize, bool)> {
        let mut pos = 0;

        while self.stage != Stage::Done && pos < input.len() {
            let rest = &input[pos..];
            let used = match self.stage {
                Stage::Size => {
                    let Some((line, used)) = next_line(rest)? else { break };
                    let size = chunk_size(line)?;
                    self.stage = if size == 0 { Stage::Trailers } else { Stage::Data(size) };
                    used
                }
                Stage::Data(left) => {
                    let n = left.min(rest.len());
                    output.extend_from_slice(&rest[..n]);
                    self.stage = if n == left { Stage::DataEnd } else { Stage::Data(left - n) };
                    n
                }
                Stage::DataEnd => match rest {
                    [b'\r', b'\n', ..] => {
                        self.stage = Stage::Size;
                        2
                    }
                    [b'\n', ..] => {
                        self.stage = Stage::Size;
                        1
                    }
                    [b'\r'] => break,
                    _ => return Err(Error::Protocol("missing CRLF after chunk data".to_string())),
                },
                Stage::Trailers => {
                    let Some((line, used)) = next_line(rest)? else { break };
                    if line.is_empty() {
                        self.stage = Stage::Done;
                    }
                    used
                }
                Stage::Done => 0,
            };
            pos += used;
        }

        Ok((pos, self.is_complete()))
    }

    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Done
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Split one line off `buf`, returning it without its terminator and the
/// number of bytes it occupied
fn next_line(buf: &[u8]) -> Result<Option<(&[u8], usize)>> {
    match buf.iter().position(|&b| b == b'\n') {
        Some(lf) => {
            let line = &buf[..lf];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            Ok(Some((line, lf + 1)))
        }
        None if buf.len() > MAX_LINE => Err(Error::InvalidChunkSize("line too long".to_string())),
        None => Ok(None),
    }
}

fn chunk_size(line: &[u8]) -> Result<usize> {
    let digits = line.split(|&b| b == b';').next().unwrap_or_default();
    let digits = String::from_utf8_lossy(digits);
    let digits = digits.trim();

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidChunkSize(digits.to_string()));
    }
    usize::from_str_radix(digits, 16).map_err(|_| Error::InvalidChunkSize(digits.to_string()))
}

/// Decode a body that is entirely in memory
pub fn decode_chunked_body(input: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ChunkedDecoder::new();
    let mut body = Vec::with_capacity(input.len());

    match decoder.decode(input, &mut body)? {
        (_, true) => Ok(body),
        _ => Err(Error::Parse("chunked body ends before last chunk".to_string())),
    }
}

/// Encode `data` with chunks of at most `chunk_size` bytes
pub fn encode_chunked_body(data: &[u8], chunk_size: usize) -> Result<Vec<u8>> {
    let mut encoder = ChunkedEncoder::new(Vec::with_capacity(data.len() + 16));
    data.chunks(chunk_size.max(1))
        .try_for_each(|piece| encoder.write_chunk(piece))?;
    encoder.finish()?;
    Ok(encoder.into_inner())
}
