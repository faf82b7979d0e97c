use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use bytes::{Bytes, BytesMut};
use encoding_rs::{Encoding, UTF_8};
use futures_util::future;
use futures_util::stream::{Stream, StreamExt};
use http::HeaderMap;
#[cfg(feature = "json")]
use serde::de::DeserializeOwned;
use spin::mutex::SpinMutex;

use crate::state::SharedControl;

/// Read half of one demultiplexed segment: the preamble or a single part.
///
/// Body bytes arrive through the [`Stream`] impl in demultiplexing order;
/// [`headers`](Part::headers) resolves once the segment's header block is
/// complete. Dropping the handle counts as having drained it, so skipping a
/// part never stalls the producer or the terminal event.
#[derive(Debug)]
pub struct Part {
    shared: Arc<SpinMutex<PartShared>>,
    control: SharedControl,
    done: bool,
}

/// Write half, owned by the demultiplexer inside its state.
#[derive(Debug)]
pub(crate) struct PartWriter {
    shared: Arc<SpinMutex<PartShared>>,
    control: SharedControl,
}

#[derive(Debug)]
struct PartShared {
    headers: Option<HeaderMap>,
    headers_settled: bool,
    headers_waker: Option<Waker>,
    chunks: VecDeque<Bytes>,
    buffered: usize,
    buffer_size: usize,
    ended: bool,
    /// Counted in `Control::undrained_parts` until the reader drains or
    /// drops.
    counted: bool,
    reader_done: bool,
    read_waker: Option<Waker>,
}

impl PartWriter {
    pub(crate) fn open(buffer_size: usize, control: &SharedControl) -> (PartWriter, Part) {
        let shared = Arc::new(SpinMutex::new(PartShared {
            headers: None,
            headers_settled: false,
            headers_waker: None,
            chunks: VecDeque::new(),
            buffered: 0,
            buffer_size,
            ended: false,
            counted: false,
            reader_done: false,
            read_waker: None,
        }));
        let writer = PartWriter {
            shared: Arc::clone(&shared),
            control: Arc::clone(control),
        };
        let part = Part {
            shared,
            control: Arc::clone(control),
            done: false,
        };
        (writer, part)
    }

    /// Delivers the completed header block and wakes a waiting reader.
    pub(crate) fn set_headers(&self, headers: HeaderMap) {
        let mut shared = self.shared.lock();
        shared.headers = Some(headers);
        shared.headers_settled = true;
        if let Some(waker) = shared.headers_waker.take() {
            waker.wake();
        }
    }

    /// Appends body bytes. Returns `false` once the backlog reaches the
    /// buffer hint; the demultiplexer then owes its producer a pause.
    pub(crate) fn push(&self, data: Bytes) -> bool {
        let mut shared = self.shared.lock();
        if shared.reader_done {
            // The reader lost interest; swallow without buffering.
            return true;
        }
        shared.buffered += data.len();
        shared.chunks.push_back(data);
        if let Some(waker) = shared.read_waker.take() {
            waker.wake();
        }
        shared.buffered < shared.buffer_size
    }

    /// Closes the write half. A `counted` close gates the terminal event
    /// until the reader drains or drops.
    pub(crate) fn finish(self, counted: bool) {
        self.close(counted);
    }

    fn close(&self, counted: bool) {
        let mut shared = self.shared.lock();
        if shared.ended {
            return;
        }
        shared.ended = true;
        let track = counted && !shared.reader_done;
        if track {
            shared.counted = true;
        }
        if !shared.headers_settled {
            // Cut off before a blank line: the segment has no headers.
            shared.headers_settled = true;
            if let Some(waker) = shared.headers_waker.take() {
                waker.wake();
            }
        }
        if let Some(waker) = shared.read_waker.take() {
            waker.wake();
        }
        if track {
            self.control.lock().undrained_parts += 1;
        }
    }
}

impl Drop for PartWriter {
    fn drop(&mut self) {
        self.close(false);
    }
}

impl Part {
    /// Waits for the segment's header block: `Some` once the blank line
    /// completed it, `None` when the segment ended without one (a headerless
    /// preamble, or a part cut off early).
    pub async fn headers(&mut self) -> Option<HeaderMap> {
        future::poll_fn(|cx| {
            let mut shared = self.shared.lock();
            if shared.headers_settled {
                return Poll::Ready(shared.headers.clone());
            }
            shared.headers_waker = Some(cx.waker().clone());
            Poll::Pending
        })
        .await
    }

    /// Yields the next body chunk.
    pub async fn chunk(&mut self) -> Option<Bytes> {
        self.next().await
    }

    /// Collects the whole remaining body into one buffer.
    pub async fn bytes(mut self) -> Bytes {
        let mut buf = BytesMut::new();

        while let Some(bytes) = self.chunk().await {
            buf.extend_from_slice(&bytes);
        }

        buf.freeze()
    }

    /// Collects the remaining body and decodes it as UTF-8, lossily.
    pub async fn text(self) -> String {
        self.text_with_charset("utf-8").await
    }

    /// Collects the remaining body and decodes it with the given charset
    /// label, falling back to UTF-8 for labels `encoding_rs` doesn't know.
    /// Picking the label out of the part's headers is the caller's job.
    pub async fn text_with_charset(self, charset: &str) -> String {
        let encoding = Encoding::for_label(charset.as_bytes()).unwrap_or(UTF_8);

        let bytes = self.bytes().await;

        encoding.decode(&bytes).0.into_owned()
    }

    /// Collects the remaining body and deserializes it as JSON.
    #[cfg(feature = "json")]
    #[cfg_attr(nightly, doc(cfg(feature = "json")))]
    pub async fn json<T: DeserializeOwned>(self) -> crate::Result<T> {
        let bytes = self.bytes().await;
        serde_json::from_slice(&bytes).map_err(crate::Error::DecodeJson)
    }

    /// Marks the reader as gone: clears the backlog, releases a producer
    /// parked on it and, for a counted part, un-gates the terminal event.
    fn report_done(&mut self) {
        let mut shared = self.shared.lock();
        if shared.reader_done {
            return;
        }
        shared.reader_done = true;
        shared.chunks.clear();
        shared.buffered = 0;
        let counted = std::mem::replace(&mut shared.counted, false);

        let mut control = self.control.lock();
        if counted {
            control.undrained_parts -= 1;
            control.queue_finish_if_ready();
        }
        control.resume_producer();
    }
}

impl Stream for Part {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let mut shared = this.shared.lock();

        // A reader poll is the drain signal a parked producer waits for,
        // whether or not bytes are ready right now.
        this.control.lock().resume_producer();

        if let Some(bytes) = shared.chunks.pop_front() {
            shared.buffered -= bytes.len();
            return Poll::Ready(Some(bytes));
        }

        if shared.ended {
            drop(shared);
            this.done = true;
            this.report_done();
            return Poll::Ready(None);
        }

        shared.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for Part {
    fn drop(&mut self) {
        self.report_done();
    }
}
