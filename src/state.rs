use std::collections::VecDeque;
use std::sync::Arc;
use std::task::Waker;

use spin::mutex::SpinMutex;

use crate::event::Event;
use crate::part::PartWriter;

/// Where the demultiplexer currently is in the stream. The open writer, when
/// there is one, lives inside the variant, so routing body bytes with no
/// open part cannot be expressed.
#[derive(Debug)]
pub(crate) enum DemuxState {
    /// Before the first boundary. The writer appears once preamble content
    /// (or a header-first header block) shows up.
    Preamble(Option<PartWriter>),
    /// Between parts with no boundary decision pending. Reached through
    /// reconfiguration only; a regular part transition goes through
    /// `AwaitingDashes`.
    Idle,
    /// Right after a boundary match, counting leading dashes to decide
    /// whether that boundary was the final one. The count survives chunk
    /// boundaries.
    AwaitingDashes(u8),
    /// Feeding the open part's header block.
    InHeader(PartWriter),
    /// Feeding the open part's body.
    InBody(PartWriter),
    /// Final boundary seen; all further input is discarded.
    Finished,
}

/// State shared between the producer half, the consumer half and every part
/// handle. Locks around it are held for queue and flag updates only, never
/// across awaits, and always nest inside a part-state lock when both are
/// taken.
#[derive(Debug)]
pub(crate) struct Control {
    /// Demultiplexed events in resolution order.
    pub(crate) events: VecDeque<Event>,
    pub(crate) events_waker: Option<Waker>,
    /// The producer's acknowledgement is being withheld.
    pub(crate) paused: bool,
    pub(crate) producer_waker: Option<Waker>,
    /// Closed parts whose streams haven't been drained or dropped yet.
    /// Gates the terminal event; the preamble never counts.
    pub(crate) undrained_parts: usize,
    /// The final boundary marker was recognized.
    pub(crate) finished: bool,
    /// The terminal event has been queued (at most once).
    pub(crate) finish_queued: bool,
    /// The `Demux` half was dropped.
    pub(crate) producer_gone: bool,
    /// The `Events` half was dropped; events are discarded at push time.
    pub(crate) events_gone: bool,
    /// Boundary handed to `Events::set_boundary`, picked up by the producer
    /// on its next `consume` call.
    pub(crate) pending_boundary: Option<String>,
}

pub(crate) type SharedControl = Arc<SpinMutex<Control>>;

impl Control {
    pub(crate) fn new_shared() -> SharedControl {
        Arc::new(SpinMutex::new(Control {
            events: VecDeque::new(),
            events_waker: None,
            paused: false,
            producer_waker: None,
            undrained_parts: 0,
            finished: false,
            finish_queued: false,
            producer_gone: false,
            events_gone: false,
            pending_boundary: None,
        }))
    }

    /// Queues an event and wakes the consumer. When the consumer half is
    /// gone the event is handed back so the caller can drop it outside the
    /// lock: dropping a part handle takes locks of its own.
    #[must_use]
    pub(crate) fn push_event(&mut self, event: Event) -> Option<Event> {
        if self.events_gone {
            return Some(event);
        }
        self.events.push_back(event);
        self.wake_events();
        None
    }

    /// Queues the terminal event once both finish conditions hold: final
    /// boundary seen, no closed part left undrained.
    pub(crate) fn queue_finish_if_ready(&mut self) {
        if self.finished && self.undrained_parts == 0 && !self.finish_queued {
            self.finish_queued = true;
            // `Finish` carries no part handle, so a rejected one is safe to
            // drop right here.
            drop(self.push_event(Event::Finish));
        }
    }

    /// Clears a pending pause and wakes the producer.
    pub(crate) fn resume_producer(&mut self) {
        if self.paused {
            self.paused = false;
            if let Some(waker) = self.producer_waker.take() {
                waker.wake();
            }
        }
    }

    pub(crate) fn wake_events(&mut self) {
        if let Some(waker) = self.events_waker.take() {
            waker.wake();
        }
    }
}
