//! Resumable decoder for the HTTP/1.1 chunked transfer coding (RFC 9112 Section 7.1).
//!
//! The decoder borrows nothing between calls: the caller hands it whatever
//! bytes arrived, it advances the slice past what it consumed and returns
//! payload sub-slices of that input. Feeding a stream in one call or split at
//! arbitrary points yields the same concatenated payload and the same end
//! signal.

use crate::error::{Error, Result};

/// One decoder output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk<'a> {
    /// Payload bytes, never empty.
    Data(&'a [u8]),
    /// The zero-size chunk was seen (and the trailer skipped, if requested).
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Reading hex digits of a chunk-size line.
    Size { size: u64, digits: u32 },
    /// Past the digits: skipping extensions until CRLF.
    SizeLineTail { size: u64, cr: bool },
    /// Inside a chunk; `remaining` counts payload plus its trailing CRLF.
    Payload { remaining: u64 },
    /// After the last chunk, discarding trailer fields until an empty line.
    Trailer { line_len: usize },
    Done,
    /// Unrecoverable framing error.
    Error,
}

/// Chunked transfer decoder state.
#[derive(Debug, Clone)]
pub struct ChunkDecoder {
    state: State,
    skip_trailers: bool,
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkDecoder {
    /// Decoder that stops right after the `0\r\n` size line.
    pub fn new() -> Self {
        Self {
            state: State::Size { size: 0, digits: 0 },
            skip_trailers: false,
        }
    }

    /// Decoder that also consumes the trailer section and final CRLF, leaving
    /// the input positioned at the next message.
    pub fn with_trailers() -> Self {
        Self {
            skip_trailers: true,
            ..Self::new()
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    pub fn is_error(&self) -> bool {
        self.state == State::Error
    }

    /// Advance over `input`.
    ///
    /// - `Ok(Some(Chunk::Data(_)))`: payload; call again with the rest.
    /// - `Ok(Some(Chunk::End))`: finished; later calls keep returning `End`.
    /// - `Ok(None)`: input exhausted, feed more.
    /// - `Err(MalformedChunk)`: permanent; every later call fails too.
    pub fn decode<'a>(&mut self, input: &mut &'a [u8]) -> Result<Option<Chunk<'a>>> {
        loop {
            match self.state {
                State::Error => return Err(Error::MalformedChunk),
                State::Done => return Ok(Some(Chunk::End)),

                State::Size { size, digits } => {
                    let Some(&b) = input.first() else {
                        return Ok(None);
                    };
                    match hex_value(b) {
                        Some(d) => {
                            let Some(size) = size.checked_mul(16).and_then(|s| s.checked_add(d)) else {
                                return self.fail();
                            };
                            *input = &input[1..];
                            self.state = State::Size { size, digits: digits + 1 };
                        }
                        None if digits > 0 && matches!(b, b'\r' | b';' | b' ' | b'\t') => {
                            self.state = State::SizeLineTail { size, cr: false };
                        }
                        None => return self.fail(),
                    }
                }

                State::SizeLineTail { size, cr } => {
                    let Some(&b) = input.first() else {
                        return Ok(None);
                    };
                    *input = &input[1..];
                    match (cr, b) {
                        (true, b'\n') => {
                            if size == 0 {
                                if self.skip_trailers {
                                    self.state = State::Trailer { line_len: 0 };
                                } else {
                                    self.state = State::Done;
                                    return Ok(Some(Chunk::End));
                                }
                            } else {
                                let Some(remaining) = size.checked_add(2) else {
                                    return self.fail();
                                };
                                self.state = State::Payload { remaining };
                            }
                        }
                        (false, b'\r') => self.state = State::SizeLineTail { size, cr: true },
                        (true, _) | (false, b'\n') => return self.fail(),
                        // chunk extensions are ignored
                        (false, _) => {}
                    }
                }

                State::Payload { remaining } => {
                    if input.is_empty() {
                        return Ok(None);
                    }
                    let take = usize::try_from(remaining).unwrap_or(usize::MAX).min(input.len());
                    let payload_len = usize::try_from(remaining.saturating_sub(2))
                        .unwrap_or(usize::MAX)
                        .min(take);
                    let (consumed, rest) = input.split_at(take);
                    *input = rest;

                    let left = remaining - take as u64;
                    self.state = if left == 0 {
                        State::Size { size: 0, digits: 0 }
                    } else {
                        State::Payload { remaining: left }
                    };

                    // the trailing CRLF is dropped without inspection
                    if payload_len > 0 {
                        return Ok(Some(Chunk::Data(&consumed[..payload_len])));
                    }
                }

                State::Trailer { line_len } => {
                    let Some(&b) = input.first() else {
                        return Ok(None);
                    };
                    *input = &input[1..];
                    match b {
                        b'\n' if line_len == 0 => {
                            self.state = State::Done;
                            return Ok(Some(Chunk::End));
                        }
                        b'\n' => self.state = State::Trailer { line_len: 0 },
                        b'\r' => {}
                        _ => self.state = State::Trailer { line_len: line_len + 1 },
                    }
                }
            }
        }
    }

    /// Iterate over everything decodable from `input` without more data.
    pub fn feed<'d, 'a>(&'d mut self, input: &'a [u8]) -> Chunks<'d, 'a> {
        Chunks {
            decoder: self,
            input,
            finished: false,
        }
    }

    fn fail<T>(&mut self) -> Result<T> {
        self.state = State::Error;
        Err(Error::MalformedChunk)
    }
}

/// Iterator returned by [`ChunkDecoder::feed`].
///
/// Stops when input runs out, after `End`, or after the first error.
pub struct Chunks<'d, 'a> {
    decoder: &'d mut ChunkDecoder,
    input: &'a [u8],
    finished: bool,
}

impl<'a> Chunks<'_, 'a> {
    /// Input not consumed yet.
    pub fn remaining(&self) -> &'a [u8] {
        self.input
    }
}

impl<'a> Iterator for Chunks<'_, 'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.decoder.decode(&mut self.input) {
            Ok(Some(Chunk::End)) => {
                self.finished = true;
                Some(Ok(Chunk::End))
            }
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn hex_value(b: u8) -> Option<u64> {
    match b {
        b'0'..=b'9' => Some(u64::from(b - b'0')),
        b'a'..=b'f' => Some(u64::from(b - b'a' + 10)),
        b'A'..=b'F' => Some(u64::from(b - b'A' + 10)),
        _ => None,
    }
}
