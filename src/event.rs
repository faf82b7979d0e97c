use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};

use crate::part::Part;
use crate::state::SharedControl;

/// One demultiplexed occurrence, delivered in exact stream order.
#[derive(Debug)]
pub enum Event {
    /// The preamble segment opened: everything before the first boundary.
    /// At most one, always before any `Part`.
    Preamble(Part),
    /// A boundary-delimited part opened.
    Part(Part),
    /// Bytes that followed the final boundary marker. At most one, and only
    /// when such bytes exist.
    Trailer(Bytes),
    /// The stream completed: final boundary seen and every part drained.
    /// Always the last event.
    Finish,
}

/// Consumer half of the demultiplexer: an ordered stream of [`Event`]s.
///
/// The stream terminates after [`Event::Finish`] or, for truncated input,
/// once the producer half is dropped. A termination without `Finish` is how
/// truncation shows up.
#[derive(Debug)]
pub struct Events {
    control: SharedControl,
    terminated: bool,
}

impl Events {
    pub(crate) fn new(control: SharedControl) -> Self {
        Events {
            control,
            terminated: false,
        }
    }

    /// Yields the next event.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.next().await
    }

    /// Installs `boundary` for the rest of the stream, taking effect on the
    /// producer's next `consume` call. Meant for the header-first flow,
    /// where the boundary comes out of the preamble's own headers.
    pub fn set_boundary<B>(&self, boundary: B)
    where
        B: Into<String>,
    {
        self.control.lock().pending_boundary = Some(boundary.into());
    }
}

impl Stream for Events {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }

        let mut control = this.control.lock();

        if let Some(event) = control.events.pop_front() {
            if matches!(event, Event::Finish) {
                this.terminated = true;
            }
            return Poll::Ready(Some(event));
        }

        if control.finish_queued || (control.producer_gone && !control.finished) {
            this.terminated = true;
            return Poll::Ready(None);
        }

        control.events_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for Events {
    fn drop(&mut self) {
        // Take the backlog out before dropping it: dropping a queued part
        // handle takes locks of its own.
        let backlog: Vec<Event> = {
            let mut control = self.control.lock();
            control.events_gone = true;
            control.events.drain(..).collect()
        };
        drop(backlog);
    }
}
