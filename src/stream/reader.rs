//! Read half of a serial stream.

use super::protocol::StreamShared;
use std::cell::RefCell;
use std::future::{poll_fn, Future};
use std::io;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};

/// Buffered reader over a serial connection.
///
/// Every inherent read honours the port's read timeout: when it expires the
/// call fails with [`io::ErrorKind::TimedOut`] and the connection stays up.
/// The [`AsyncRead`] impl waits without a deadline.
pub struct SerialReader {
    shared: Rc<RefCell<StreamShared>>,
    timeout: Option<Duration>,
}

impl SerialReader {
    pub(crate) fn new(shared: Rc<RefCell<StreamShared>>, timeout: Option<Duration>) -> Self {
        Self { shared, timeout }
    }

    /// Read up to `n` bytes, waiting until at least one is available.
    ///
    /// Returns an empty vector once the connection has ended and the buffer
    /// is exhausted.
    pub async fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.wait(|state| {
            if !state.buffer.is_empty() {
                return Some(Ok(state.consume(n)));
            }
            if state.eof {
                return Some(state.error().map_or(Ok(Vec::new()), Err));
            }
            None
        })
        .await
    }

    /// Read exactly `n` bytes.
    ///
    /// Fails with [`io::ErrorKind::UnexpectedEof`] if the connection ends
    /// first; the partial bytes stay buffered.
    pub async fn read_exact(&mut self, n: usize) -> io::Result<Vec<u8>> {
        self.wait(|state| {
            if state.buffer.len() >= n {
                return Some(Ok(state.consume(n)));
            }
            if state.eof {
                return Some(Err(state.error().unwrap_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("{} bytes read on a total of {n} expected bytes", state.buffer.len()),
                    )
                })));
            }
            None
        })
        .await
    }

    /// Read up to and including `separator`.
    ///
    /// Fails with [`io::ErrorKind::InvalidData`] when the separator is not
    /// within the stream limit (nothing is consumed), and with
    /// [`io::ErrorKind::UnexpectedEof`] when the connection ends first.
    pub async fn read_until(&mut self, separator: &[u8]) -> io::Result<Vec<u8>> {
        if separator.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "separator should be at least one-byte string",
            ));
        }
        let finder = memchr::memmem::Finder::new(separator);
        self.wait(|state| {
            if let Some(pos) = finder.find(&state.buffer) {
                let end = pos + separator.len();
                if end > state.limit {
                    return Some(Err(limit_overrun()));
                }
                return Some(Ok(state.consume(end)));
            }
            if state.buffer.len() > state.limit {
                return Some(Err(limit_overrun()));
            }
            if state.eof {
                return Some(Err(state.error().unwrap_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed before separator was found",
                    )
                })));
            }
            None
        })
        .await
    }

    /// Read one `\n`-terminated line.
    ///
    /// At the end of the connection the remaining bytes are returned without
    /// a terminator, then empty vectors.
    pub async fn read_line(&mut self) -> io::Result<Vec<u8>> {
        match self.read_until(b"\n").await {
            Ok(line) => Ok(line),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                let mut state = self.shared.borrow_mut();
                let len = state.buffer.len();
                Ok(state.consume(len))
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the connection has ended and every buffered byte was read.
    pub fn at_eof(&self) -> bool {
        let state = self.shared.borrow();
        state.eof && state.buffer.is_empty()
    }

    /// Bytes received but not yet read.
    pub fn buffered(&self) -> usize {
        self.shared.borrow().buffer.len()
    }

    async fn wait<T, F>(&mut self, mut ready: F) -> io::Result<T>
    where
        F: FnMut(&mut StreamShared) -> Option<io::Result<T>>,
    {
        let shared = Rc::clone(&self.shared);
        let wait = poll_fn(move |cx| {
            let mut state = shared.borrow_mut();
            match ready(&mut *state) {
                Some(result) => Poll::Ready(result),
                None => {
                    state.park_reader(cx.waker());
                    Poll::Pending
                }
            }
        });
        with_deadline(self.timeout, wait).await
    }
}

fn limit_overrun() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        "separator is not found, and chunk exceed the limit",
    )
}

pub(crate) async fn with_deadline<T, F>(deadline: Option<Duration>, future: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match deadline {
        Some(duration) => tokio::time::timeout(duration, future)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "serial operation timed out"))?,
        None => future.await,
    }
}

impl AsyncRead for SerialReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = self.shared.borrow_mut();
        if !state.buffer.is_empty() {
            let data = state.consume(buf.remaining());
            buf.put_slice(&data);
            return Poll::Ready(Ok(()));
        }
        if state.eof {
            return Poll::Ready(state.error().map_or(Ok(()), Err));
        }
        state.park_reader(cx.waker());
        Poll::Pending
    }
}

impl std::fmt::Debug for SerialReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.borrow();
        f.debug_struct("SerialReader")
            .field("buffered", &state.buffer.len())
            .field("eof", &state.eof)
            .field("timeout", &self.timeout)
            .finish()
    }
}
