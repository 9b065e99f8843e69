//! # Frame Decoding
//!
//! Splits a chunked byte stream into blank-line delimited frames. Chunk
//! boundaries are arbitrary: a frame, a line or a UTF-8 sequence may be cut
//! anywhere. Both `\n` and `\r\n` line endings are accepted.

use std::collections::VecDeque;
use std::mem;

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::Result;

const DATA_PREFIX: &str = "data:";

/// One frame: the non-empty lines between two blank lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    lines: Vec<String>,
}

impl Frame {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Payload of the frame's `data:` lines joined by newlines, or `None`
    /// when the frame carries no data (comments, keep-alives).
    pub fn data(&self) -> Option<String> {
        let data: Vec<&str> = self
            .lines
            .iter()
            .filter_map(|line| line.strip_prefix(DATA_PREFIX))
            .map(|value| value.strip_prefix(' ').unwrap_or(value))
            .collect();

        if data.is_empty() {
            None
        } else {
            Some(data.join("\n"))
        }
    }
}

/// Incremental decoder state
#[derive(Debug, Default)]
pub struct FrameDecoder {
    partial_line: Vec<u8>,
    lines: Vec<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();

        for &byte in chunk {
            if byte != b'\n' {
                self.partial_line.push(byte);
                continue;
            }

            if self.partial_line.last() == Some(&b'\r') {
                self.partial_line.pop();
            }

            if self.partial_line.is_empty() {
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
            } else {
                let line = mem::take(&mut self.partial_line);
                self.lines.push(String::from_utf8_lossy(&line).into_owned());
            }
        }

        frames
    }

    /// Flushes a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.partial_line.last() == Some(&b'\r') {
            self.partial_line.pop();
        }
        if !self.partial_line.is_empty() {
            let line = mem::take(&mut self.partial_line);
            self.lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        self.take_frame()
    }

    fn take_frame(&mut self) -> Option<Frame> {
        if self.lines.is_empty() {
            None
        } else {
            Some(Frame::new(mem::take(&mut self.lines)))
        }
    }
}

struct FrameStreamState<S> {
    body: S,
    decoder: FrameDecoder,
    ready: VecDeque<Frame>,
    done: bool,
}

/// Lazily turns a byte stream into a stream of frames.
///
/// A transport error is yielded once and ends the stream.
pub fn frames<S>(body: S) -> BoxStream<'static, Result<Frame>>
where
    S: Stream<Item = bridge_traits::error::Result<Bytes>> + Unpin + Send + 'static,
{
    let state = FrameStreamState {
        body,
        decoder: FrameDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.ready.pop_front() {
                return Some((Ok(frame), state));
            }
            if state.done {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let completed = state.decoder.push(&chunk);
                    state.ready.extend(completed);
                }
                Some(Err(err)) => {
                    state.done = true;
                    return Some((Err(err.into()), state));
                }
                None => {
                    state.done = true;
                    let trailing = state.decoder.finish();
                    state.ready.extend(trailing);
                }
            }
        }
    })
    .boxed()
}
