//! Splitting a byte stream into lines as they arrive.

use crate::error::{Error, Result};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

const READ_SIZE: usize = 8192;

/// A stream of lines read from `R`.
///
/// Each line is yielded as soon as its separator has been read, without the
/// separator. With the default `"\n"` separator a trailing `'\r'` is removed
/// too. When the reader reaches end of stream, a final unterminated line is
/// yielded if there is one.
///
/// A line that is not valid UTF-8 is yielded as [`Error::Utf8`]; the stream
/// carries on with the next line.
pub struct Lines<R> {
    reader: R,
    separator: Vec<u8>,
    buffer: Vec<u8>,
    /// Start of the first line not yet yielded. Everything before it is spent.
    start: usize,
    /// Bytes at the front of `buffer` already searched without finding a separator.
    searched: usize,
    read_buf: Box<[u8]>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> Lines<R> {
    pub fn new(reader: R) -> Self {
        Self::build(reader, b"\n".to_vec())
    }

    /// Splits on `separator` instead of `"\n"`. The separator may be several bytes long.
    pub fn with_separator(reader: R, separator: impl Into<Vec<u8>>) -> Result<Self> {
        let separator = separator.into();
        if separator.is_empty() {
            return Err(Error::InvalidSeparator);
        }
        Ok(Self::build(reader, separator))
    }

    fn build(reader: R, separator: Vec<u8>) -> Self {
        Self {
            reader,
            separator,
            buffer: Vec::new(),
            start: 0,
            searched: 0,
            read_buf: vec![0; READ_SIZE].into_boxed_slice(),
            eof: false,
        }
    }

    /// Returns the underlying reader. Buffered bytes of an unfinished line are lost.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Takes the next complete line from the buffer, if there is one.
    ///
    /// The bytes stay in the buffer until [`compact`](Self::compact).
    fn take_line(&mut self) -> Option<Result<String>> {
        let from = self.searched.max(self.start);
        let Some(pos) = find(&self.buffer[from..], &self.separator) else {
            // A separator may straddle what we have and what comes next.
            self.searched = self
                .buffer
                .len()
                .saturating_sub(self.separator.len() - 1)
                .max(self.start);
            return None;
        };

        let end = from + pos;
        let line = self.buffer[self.start..end].to_vec();
        self.start = end + self.separator.len();
        self.searched = self.start;
        Some(self.decode(line))
    }

    /// Drops the lines already yielded from the front of the buffer.
    fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.buffer.drain(..self.start);
        self.searched -= self.start;
        self.start = 0;
    }

    fn decode(&self, mut line: Vec<u8>) -> Result<String> {
        if self.separator == b"\n" && line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(String::from_utf8(line)?)
    }
}

impl<R: AsyncRead + Unpin> Stream for Lines<R> {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(line) = this.take_line() {
                return Poll::Ready(Some(line));
            }

            if this.eof {
                this.compact();
                if this.buffer.is_empty() {
                    return Poll::Ready(None);
                }
                let last = std::mem::take(&mut this.buffer);
                this.searched = 0;
                return Poll::Ready(Some(this.decode(last)));
            }

            this.compact();
            let mut buf = ReadBuf::new(&mut this.read_buf);
            match Pin::new(&mut this.reader).poll_read(cx, &mut buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e.into()))),
                Poll::Ready(Ok(())) if buf.filled().is_empty() => this.eof = true,
                Poll::Ready(Ok(())) => this.buffer.extend_from_slice(buf.filled()),
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() == 1 {
        return haystack.iter().position(|&b| b == needle[0]);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
