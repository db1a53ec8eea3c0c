//! Write half of a serial stream.

use super::protocol::StreamShared;
use super::reader::with_deadline;
use crate::transport::SerialTransport;
use std::cell::RefCell;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;

/// Writer over a serial connection.
///
/// `write` only queues bytes on the transport; [`drain`](Self::drain) is the
/// flow-control point that waits while the transport's write buffer sits
/// above its high-water mark.
#[derive(Clone)]
pub struct SerialWriter {
    transport: SerialTransport,
    shared: Rc<RefCell<StreamShared>>,
    write_timeout: Option<Duration>,
}

impl SerialWriter {
    pub(crate) fn new(
        transport: SerialTransport,
        shared: Rc<RefCell<StreamShared>>,
        write_timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            shared,
            write_timeout,
        }
    }

    pub fn write(&self, data: &[u8]) {
        self.transport.write(data);
    }

    pub fn write_lines<I, B>(&self, lines: I)
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        self.transport.write_lines(lines);
    }

    /// Wait until it is appropriate to write more.
    ///
    /// Returns immediately unless the transport paused the writer. Fails with
    /// the connection's error once it ended with one, with
    /// [`io::ErrorKind::TimedOut`] when the write timeout expires, and with
    /// [`io::ErrorKind::BrokenPipe`] when the connection is gone.
    pub async fn drain(&self) -> io::Result<()> {
        let shared = Rc::clone(&self.shared);
        let wait = poll_fn(move |cx| shared.borrow_mut().poll_writable(cx));
        with_deadline(self.write_timeout, wait).await
    }

    /// Close once buffered bytes are written.
    pub fn close(&self) {
        self.transport.close();
    }

    /// Wait for the connection to finish closing.
    pub async fn wait_closed(&self) -> io::Result<()> {
        let shared = Rc::clone(&self.shared);
        poll_fn(move |cx| {
            let mut state = shared.borrow_mut();
            if state.connection_lost {
                return Poll::Ready(state.error().map_or(Ok(()), Err));
            }
            state.park_closer(cx.waker());
            Poll::Pending
        })
        .await
    }

    pub fn is_closing(&self) -> bool {
        self.transport.is_closing()
    }

    /// The underlying transport.
    pub fn transport(&self) -> &SerialTransport {
        &self.transport
    }

    pub fn can_write_eof(&self) -> bool {
        self.transport.can_write_eof()
    }
}

impl StreamShared {
    fn poll_writable(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Some(error) = self.error() {
            return Poll::Ready(Err(error));
        }
        if self.connection_lost {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "serial connection lost",
            )));
        }
        if !self.writing_paused {
            return Poll::Ready(Ok(()));
        }
        self.park_writer(cx.waker());
        Poll::Pending
    }
}

impl AsyncWrite for SerialWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.transport.is_closing() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "serial transport is closing",
            )));
        }
        match self.shared.borrow_mut().poll_writable(cx) {
            Poll::Ready(Ok(())) => {}
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => return Poll::Pending,
        }
        self.transport.write(buf);
        Poll::Ready(Ok(buf.len()))
    }

    /// Waits out a paused writer, the same as [`SerialWriter::drain`]
    /// without the deadline.
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shared.borrow_mut().poll_writable(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.transport.close();
        let mut state = self.shared.borrow_mut();
        if state.connection_lost {
            return Poll::Ready(state.error().map_or(Ok(()), Err));
        }
        state.park_closer(cx.waker());
        Poll::Pending
    }
}

impl std::fmt::Debug for SerialWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialWriter")
            .field("transport", &self.transport)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}
