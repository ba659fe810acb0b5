//! Ordered byte stream handed to download callers.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::DropGuard;

use crate::error::{TransferError, TransferResult};

/// The bytes of a download, in order.
///
/// Yields `Ok` chunks until the requested range is complete, or a single
/// `Err` followed by the end of the stream. A stream that ends early
/// without an error from the producer yields a terminal error rather than
/// a silent short read.
///
/// Dropping the stream cancels the transfer behind it.
#[derive(Debug)]
pub struct RangeStream {
    rx: mpsc::Receiver<TransferResult<Bytes>>,
    expected_len: u64,
    received: u64,
    done: bool,
    _cancel_on_drop: Option<DropGuard>,
}

impl RangeStream {
    pub(crate) fn new(
        rx: mpsc::Receiver<TransferResult<Bytes>>,
        expected_len: u64,
        cancel_on_drop: Option<DropGuard>,
    ) -> Self {
        Self {
            rx,
            expected_len,
            received: 0,
            done: false,
            _cancel_on_drop: cancel_on_drop,
        }
    }

    /// A stream with no bytes, for empty objects.
    pub fn empty() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self::new(rx, 0, None)
    }

    /// Bytes the stream yields when it completes.
    pub fn expected_len(&self) -> u64 {
        self.expected_len
    }

    /// Bytes yielded so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Adapt to [`tokio::io::AsyncRead`]. Errors surface as `io::Error`.
    pub fn into_async_read(self) -> StreamReader<Self, Bytes> {
        StreamReader::new(self)
    }

    /// Collect the whole stream into memory.
    pub async fn read_to_end(mut self) -> TransferResult<Vec<u8>> {
        let capacity = usize::try_from(self.expected_len).unwrap_or(0);
        let mut out = Vec::with_capacity(capacity);
        while let Some(chunk) = self.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

impl Stream for RangeStream {
    type Item = TransferResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(bytes))) => {
                self.received += bytes.len() as u64;
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(Err(error))) => {
                self.done = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                self.done = true;
                if self.received == self.expected_len {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Err(TransferError::TerminalStore(format!(
                        "stream ended after {} of {} bytes",
                        self.received, self.expected_len
                    )))))
                }
            }
        }
    }
}
