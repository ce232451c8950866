use std::io;

use bytes::{Bytes, BytesMut};
use itertools::Itertools;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A fixed-length block read by [`LineReader::read_body`].
#[derive(Debug, Eq, PartialEq)]
pub enum Body {
    /// The block, with its trailing CRLF removed.
    Complete(Bytes),
    /// The expected number of bytes arrived, but the two after them weren't
    /// CRLF. Those bytes are consumed regardless.
    MissingCrlf,
}

/// Provides a facility to read CRLF-terminated lines, and fixed-size blocks
/// such as job payloads, from a stream.
pub struct LineReader<T: AsyncRead + Unpin> {
    /// Stores data that's been read in but not yet handed out.
    buf: BytesMut,
    /// Index in buf from which a valid CRLF pair may appear (and before which
    /// a CRLF sequence hasn't been seen).
    maybe_crlf_from: usize,
    /// Data source
    reader: T,
    /// On a reading error, this field is set and its value returned once the
    /// buffer is drained of pending lines.
    pending_error: Option<io::Error>,
}

impl<T: AsyncRead + Unpin> LineReader<T> {
    /// Reads a line from the internal buffer and/or reader. On an end-of-stream
    /// condition, returns a None result, discarding any partly-read line in the
    /// internal buffer.
    ///
    /// This function is cancel-safe: its only async operation is a `read_buf`
    /// against the internal `reader`, and so it has the same guarantees:
    /// either a complete read occurs and is processed, or this is cancelled.
    ///
    /// On a read error, the error value is returned after processing all
    /// pending lines in the internal buffer, but calling `read_line` again will
    /// attempt a new read safely.
    pub async fn read_line(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            // Scan only from one byte before the newest data, keeping this
            // O(bytes_read); the extra byte catches a \r\n split across reads.
            if let Some(eoc) = self
                .buf
                .iter()
                .skip(self.maybe_crlf_from)
                .tuple_windows::<(_, _)>()
                .position(|x| x == (&b'\r', &b'\n'))
            {
                let line =
                    self.buf.split_to(self.maybe_crlf_from + eoc + 2).freeze();
                self.maybe_crlf_from = 0;

                // Drop trailing b"\r\n".
                return Ok(Some(line.slice(0..line.len() - 2)));
            }

            let n_bytes_read = self.fill().await;

            // Set maybe_crlf_from to the byte before the first byte returned
            // by the read (and 0 if buf is empty).
            self.maybe_crlf_from =
                self.buf.len().saturating_sub(n_bytes_read + 1);

            if n_bytes_read == 0 {
                return self.end_of_stream();
            }
        }
    }

    /// Reads exactly `n_bytes` bytes followed by CRLF. Bytes already buffered
    /// after the last line are used first. Returns None if the stream ends
    /// before the whole block arrives.
    ///
    /// Cancel-safe in the same way as `read_line`: nothing is consumed from
    /// the buffer until the whole block is present.
    pub async fn read_body(&mut self, n_bytes: usize) -> io::Result<Option<Body>> {
        let want = n_bytes + 2;

        while self.buf.len() < want {
            if self.fill().await == 0 {
                return self.end_of_stream();
            }
        }

        let block = self.buf.split_to(want).freeze();
        self.maybe_crlf_from = 0;

        Ok(Some(if block.ends_with(b"\r\n") {
            Body::Complete(block.slice(0..n_bytes))
        } else {
            Body::MissingCrlf
        }))
    }

    /// Reads once from the underlying reader into the buffer, returning the
    /// number of bytes received. An error is stashed and reported as 0 bytes.
    async fn fill(&mut self) -> usize {
        match self.reader.read_buf(&mut self.buf).await {
            Ok(n) => n,
            Err(e) => {
                self.pending_error = Some(e);
                0
            },
        }
    }

    /// Having read 0 bytes, assume end-of-stream. Returns any pending error:
    /// nothing more can be parsed out.
    fn end_of_stream<R>(&mut self) -> io::Result<Option<R>> {
        match self.pending_error.take() {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

impl<T: AsyncRead + Unpin> From<T> for LineReader<T> {
    fn from(value: T) -> Self {
        Self {
            buf: BytesMut::new(),
            maybe_crlf_from: 0,
            reader: value,
            pending_error: None,
        }
    }
}
