use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::task::Poll;

use bytes::{Bytes, BytesMut};
use futures_util::future;
use futures_util::pin_mut;
use futures_util::stream::{Stream, StreamExt};

use crate::config::Config;
use crate::constants;
use crate::error::Error;
use crate::event::{Event, Events};
use crate::header::HeaderParser;
use crate::part::PartWriter;
use crate::search::{Region, StreamSearch};
use crate::state::{Control, DemuxState, SharedControl};

/// Producer half of the demultiplexer: feed it the raw stream, chunked
/// however it arrives, and the matching [`Events`](crate::Events) half hands
/// out the preamble, the parts and the trailer.
///
/// [`consume`](Demux::consume) is the only required call; everything else is
/// convenience around it. The future it returns is the flow-control
/// acknowledgement: await it before fetching the next chunk, and a part
/// whose consumer has fallen behind slows the producer down instead of
/// buffering without bound.
///
/// # Examples
///
/// ```
/// use multisect::{Demux, Event};
///
/// # async fn run() {
/// let data = "\r\n--X-BOUNDARY\r\ncontent-type: text/plain\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
/// let (mut demux, mut events) = Demux::new("X-BOUNDARY");
///
/// let producer = async move { demux.consume(data).await };
/// let consumer = async move {
///     while let Some(event) = events.next_event().await {
///         match event {
///             Event::Part(part) => println!("part body: {:?}", part.text().await),
///             Event::Preamble(_) | Event::Trailer(_) => {}
///             Event::Finish => println!("done"),
///         }
///     }
/// };
///
/// tokio::join!(producer, consumer);
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(run());
/// ```
#[derive(Debug)]
pub struct Demux {
    control: SharedControl,
    state: DemuxState,
    search: Option<StreamSearch>,
    header_parser: HeaderParser,
    header_first: bool,
    preamble_headers_done: bool,
    part_buffer_size: usize,
    first_write: bool,
    /// Synthetic leading CRLF bytes still to swallow from preamble output.
    synthetic_left: usize,
    /// Bytes stashed while header-first mode runs without a boundary.
    held: BytesMut,
    /// Matcher output, reused across calls.
    regions: Vec<Region>,
    /// Work-list of spans pending routing within one region.
    spans: VecDeque<Bytes>,
}

impl Demux {
    /// Creates a demultiplexer for the given boundary token, returning it
    /// together with its event stream.
    pub fn new<B>(boundary: B) -> (Demux, Events)
    where
        B: Into<String>,
    {
        Demux::build(Config::new().boundary(boundary))
    }

    /// Creates a demultiplexer from a full [`Config`].
    ///
    /// Fails only when the configuration leaves no way to ever recognize a
    /// boundary: none given and header-first mode off.
    ///
    /// # Examples
    ///
    /// ```
    /// use multisect::{Config, Demux};
    ///
    /// let (demux, events) = Demux::with_config(Config::new().header_first(true)).unwrap();
    /// ```
    pub fn with_config(config: Config) -> crate::Result<(Demux, Events)> {
        if config.boundary.is_none() && !config.header_first {
            return Err(Error::BoundaryRequired);
        }
        Ok(Demux::build(config))
    }

    fn build(config: Config) -> (Demux, Events) {
        let control = Control::new_shared();
        let events = Events::new(Arc::clone(&control));

        let mut demux = Demux {
            control,
            state: DemuxState::Preamble(None),
            search: None,
            header_parser: HeaderParser::new(),
            header_first: config.header_first,
            preamble_headers_done: false,
            part_buffer_size: config.part_buffer_size,
            first_write: true,
            synthetic_left: 0,
            held: BytesMut::new(),
            regions: Vec::new(),
            spans: VecDeque::new(),
        };
        if let Some(boundary) = config.boundary {
            demux.install_boundary(&boundary);
        }

        (demux, events)
    }

    /// Hands the demultiplexer the next chunk of the stream.
    ///
    /// Chunks must arrive in order; how the stream is cut into them never
    /// affects the outcome. The returned future is the flow-control
    /// acknowledgement: it completes immediately unless an open part has
    /// buffered past its hint, and then completes once that part is read or
    /// dropped.
    pub async fn consume<C>(&mut self, chunk: C)
    where
        C: Into<Bytes>,
    {
        self.ingest(chunk.into());

        let control = &self.control;
        future::poll_fn(|cx| {
            let mut control = control.lock();
            if control.paused {
                control.producer_waker = Some(cx.waker().clone());
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .await;
    }

    /// Drives the demultiplexer from a fallible chunk stream, honoring flow
    /// control along the way. Stops at the first stream error.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::convert::Infallible;
    ///
    /// use futures_util::stream::iter;
    /// use multisect::{Demux, Event};
    ///
    /// # async fn run() {
    /// let chunks = vec!["\r\n--B\r\n\r\nhello", " world\r\n--B--\r\n"];
    /// let stream = iter(chunks.into_iter().map(Result::<_, Infallible>::Ok));
    ///
    /// let (mut demux, mut events) = Demux::new("B");
    /// let producer = async move { demux.feed(stream).await.unwrap() };
    /// let consumer = async move {
    ///     while let Some(event) = events.next_event().await {
    ///         if let Event::Part(part) = event {
    ///             assert_eq!(part.text().await, "hello world");
    ///         }
    ///     }
    /// };
    ///
    /// tokio::join!(producer, consumer);
    /// # }
    /// # tokio::runtime::Runtime::new().unwrap().block_on(run());
    /// ```
    pub async fn feed<S, C, E>(&mut self, stream: S) -> crate::Result<()>
    where
        S: Stream<Item = Result<C, E>>,
        C: Into<Bytes>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| Error::StreamReadFailed(err.into()))?;
            self.consume(chunk).await;
        }
        Ok(())
    }

    /// Drives the demultiplexer from an [`AsyncRead`](tokio::io::AsyncRead)
    /// source.
    ///
    /// # Optional
    ///
    /// This requires the optional `tokio-io` feature to be enabled.
    #[cfg(feature = "tokio-io")]
    #[cfg_attr(nightly, doc(cfg(feature = "tokio-io")))]
    pub async fn feed_reader<R>(&mut self, reader: R) -> crate::Result<()>
    where
        R: tokio::io::AsyncRead,
    {
        let stream = tokio_util::io::ReaderStream::new(reader);
        self.feed(stream).await
    }

    /// Replaces the boundary mid-stream.
    ///
    /// The header parser restarts and a part currently being demultiplexed
    /// is abandoned: its stream just ends. The preamble, including
    /// header-first headers already delivered, survives. Bytes stashed
    /// while no boundary was configured run through the new matcher right
    /// away. After the final boundary this is a no-op.
    pub fn set_boundary<B>(&mut self, boundary: B)
    where
        B: AsRef<str>,
    {
        if matches!(self.state, DemuxState::Finished) {
            return;
        }

        self.install_boundary(boundary.as_ref());
        self.header_parser.reset();

        match mem::replace(&mut self.state, DemuxState::Idle) {
            preamble @ DemuxState::Preamble(_) => self.state = preamble,
            DemuxState::InHeader(writer) | DemuxState::InBody(writer) => drop(writer),
            DemuxState::Idle | DemuxState::AwaitingDashes(_) | DemuxState::Finished => {}
        }

        self.flush_held();
    }

    fn install_boundary(&mut self, boundary: &str) {
        let needle = format!("{}{}{}", constants::CRLF, constants::BOUNDARY_EXT, boundary);
        self.search = Some(StreamSearch::new(needle.into_bytes()));
    }

    fn flush_held(&mut self) {
        if !self.held.is_empty() {
            let held = self.held.split().freeze();
            self.feed_search(held);
        }
    }

    fn ingest(&mut self, mut data: Bytes) {
        if matches!(self.state, DemuxState::Finished) {
            #[cfg(feature = "log")]
            log::trace!("discarding {} bytes past the final boundary", data.len());
            return;
        }

        // Boundary handed over on the consumer side since the last chunk.
        let pending = self.control.lock().pending_boundary.take();
        if let Some(boundary) = pending {
            self.set_boundary(boundary);
            if matches!(self.state, DemuxState::Finished) {
                return;
            }
        }

        if data.is_empty() {
            return;
        }

        if self.header_first && !self.preamble_headers_done {
            match self.push_preamble_headers(&data) {
                Some(offset) if offset < data.len() => data = data.slice(offset..),
                _ => return,
            }
        }

        if self.search.is_none() {
            // Header-first without a boundary yet: stash until one arrives.
            self.held.extend_from_slice(&data);
            return;
        }

        self.feed_search(data);
    }

    /// Header-first mode: the stream opens with the preamble's header block,
    /// routed to the header parser ahead of any boundary matching. Returns
    /// the offset where leftover bytes start once the block completes.
    fn push_preamble_headers(&mut self, data: &Bytes) -> Option<usize> {
        let slot = match &mut self.state {
            DemuxState::Preamble(slot) => slot,
            _ => return Some(0),
        };

        let writer = match slot {
            Some(writer) => writer,
            None => {
                let (writer, part) = PartWriter::open(self.part_buffer_size, &self.control);
                let rejected = self.control.lock().push_event(Event::Preamble(part));
                drop(rejected);
                slot.insert(writer)
            }
        };

        let (headers, offset) = self.header_parser.push(data)?;
        writer.set_headers(headers);
        self.preamble_headers_done = true;
        Some(offset)
    }

    fn feed_search(&mut self, data: Bytes) {
        if self.first_write {
            // The first boundary of a stream has no preceding CRLF, so the
            // matcher gets a synthetic one before real data. It is swallowed
            // again before preamble bytes surface.
            self.first_write = false;
            self.synthetic_left = constants::CRLF.len();
            self.run_search(Bytes::from_static(constants::CRLF.as_bytes()));
        }
        self.run_search(data);
    }

    fn run_search(&mut self, data: Bytes) {
        let mut regions = mem::take(&mut self.regions);
        regions.clear();
        if let Some(search) = self.search.as_mut() {
            search.push(&data, &mut regions);
        }
        for region in regions.drain(..) {
            if matches!(self.state, DemuxState::Finished) {
                break;
            }
            self.route(region);
        }
        self.regions = regions;
    }

    /// Routes one settled region. Structured as phases over an explicit
    /// work-list: dash accounting, segment creation, content routing, match
    /// transition.
    fn route(&mut self, region: Region) {
        let Region { data, is_match } = region;
        self.spans.clear();

        // Dash phase: right after a boundary match, leading dashes decide
        // whether that boundary was the final one.
        if let DemuxState::AwaitingDashes(seen) = self.state {
            let mut dashes = seen;
            let mut taken = 0;
            let mut dash_is_content = false;

            while dashes < 2 && taken < data.len() {
                if data[taken] == constants::DASH {
                    taken += 1;
                    dashes += 1;
                } else {
                    // A lone dash followed by anything else was content
                    // after all and gets re-injected below.
                    dash_is_content = dashes == 1;
                    dashes = 0;
                    break;
                }
            }

            if dashes == 2 {
                self.finish_stream(data.slice(taken..));
                return;
            }
            if dashes == 1 {
                if !is_match {
                    // Undecided; the next region carries the verdict.
                    self.state = DemuxState::AwaitingDashes(1);
                    return;
                }
                // A match straight after a lone dash: the dash is literal
                // content of the (empty) part this match closes.
                dash_is_content = true;
            }

            self.state = DemuxState::Idle;
            if dash_is_content {
                self.spans.push_back(Bytes::from_static(b"-"));
            }
            self.spans.push_back(data.slice(taken..));
        } else {
            self.spans.push_back(data);
        }

        // Segment creation: a region always opens one if none is open, even
        // with no data. Back-to-back boundaries still delimit an (empty)
        // part.
        match &self.state {
            DemuxState::Preamble(Some(_)) | DemuxState::InHeader(_) | DemuxState::InBody(_) => {}
            DemuxState::Preamble(None) => {
                let (writer, part) = PartWriter::open(self.part_buffer_size, &self.control);
                let rejected = self.control.lock().push_event(Event::Preamble(part));
                drop(rejected);
                self.state = DemuxState::Preamble(Some(writer));
            }
            DemuxState::Idle => {
                let (writer, part) = PartWriter::open(self.part_buffer_size, &self.control);
                let rejected = self.control.lock().push_event(Event::Part(part));
                drop(rejected);
                self.state = DemuxState::InHeader(writer);
            }
            DemuxState::AwaitingDashes(_) | DemuxState::Finished => {}
        }

        // Content phase.
        while let Some(span) = self.spans.pop_front() {
            if span.is_empty() {
                continue;
            }
            match &mut self.state {
                DemuxState::Preamble(Some(writer)) => {
                    let mut span = span;
                    if self.synthetic_left > 0 {
                        let strip = usize::min(self.synthetic_left, span.len());
                        self.synthetic_left -= strip;
                        span = span.slice(strip..);
                    }
                    if !span.is_empty() && !writer.push(span) {
                        self.control.lock().paused = true;
                    }
                }
                DemuxState::InHeader(_) => {
                    if let Some((headers, offset)) = self.header_parser.push(&span) {
                        if let DemuxState::InHeader(writer) =
                            mem::replace(&mut self.state, DemuxState::Idle)
                        {
                            writer.set_headers(headers);
                            self.state = DemuxState::InBody(writer);
                        }
                        if offset < span.len() {
                            // Body bytes that rode in behind the blank line
                            // go back to the front of the work-list.
                            self.spans.push_front(span.slice(offset..));
                        }
                    }
                }
                DemuxState::InBody(writer) => {
                    if !writer.push(span) {
                        self.control.lock().paused = true;
                    }
                }
                _ => {}
            }
        }

        // Match phase: explicit parser reset, close the open segment, next
        // bytes decide on finality.
        if is_match {
            self.header_parser.reset();
            self.synthetic_left = 0;
            match mem::replace(&mut self.state, DemuxState::AwaitingDashes(0)) {
                DemuxState::Preamble(Some(writer)) => writer.finish(false),
                DemuxState::InHeader(writer) | DemuxState::InBody(writer) => writer.finish(true),
                _ => {}
            }
        }
    }

    /// Final boundary confirmed: slice the trailer out of `rest` and settle
    /// the terminal bookkeeping.
    fn finish_stream(&mut self, rest: Bytes) {
        self.search = None;
        self.header_parser.reset();
        self.held.clear();
        self.state = DemuxState::Finished;

        // The final boundary line's own CRLF is framing, not trailer data.
        let trailer = if rest.starts_with(constants::CRLF.as_bytes()) {
            rest.slice(constants::CRLF.len()..)
        } else {
            rest
        };

        let mut control = self.control.lock();
        control.finished = true;
        if !trailer.is_empty() {
            // `Trailer` carries plain bytes, so a rejected event is safe to
            // drop under the lock.
            drop(control.push_event(Event::Trailer(trailer)));
        }
        control.queue_finish_if_ready();
    }
}

impl Drop for Demux {
    fn drop(&mut self) {
        // Dropping the state aborts any open writer before the consumer is
        // told the producer is gone.
        self.state = DemuxState::Idle;
        let mut control = self.control.lock();
        control.producer_gone = true;
        control.wake_events();
    }
}
