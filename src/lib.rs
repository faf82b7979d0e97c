//! An async demultiplexer for `multipart/*` byte streams.
//!
//! `multisect` takes a raw byte stream delimited by a repeating boundary
//! marker, in whatever chunks it happens to arrive, and splits it into a
//! preamble, a sequence of parts (each a header block plus a body stream)
//! and an optional trailer, without ever buffering the whole input. It is
//! content-type agnostic: any `multipart/*` framing works, and what header
//! values mean is left entirely to the caller.
//!
//! Construction returns two halves. The [`Demux`] half is fed by the
//! producer; awaiting [`consume`](Demux::consume) is the backpressure
//! signal. The [`Events`] half is an ordered stream of [`Event`]s carrying
//! [`Part`] handles whose bodies are themselves streams.
//!
//! # Examples
//!
//! ```
//! use multisect::{Demux, Event};
//!
//! # async fn run() {
//! // Chunk cuts, even inside the boundary itself, never change the outcome.
//! let chunks = [
//!     "preamble\r\n--X-BOU",
//!     "NDARY\r\ncontent-type: text/plain\r\n\r\nab",
//!     "cd\r\n--X-BOUNDARY--\r\nepilogue",
//! ];
//! let (mut demux, mut events) = Demux::new("X-BOUNDARY");
//!
//! let producer = async move {
//!     for chunk in chunks {
//!         demux.consume(chunk).await;
//!     }
//! };
//!
//! let consumer = async move {
//!     while let Some(event) = events.next_event().await {
//!         match event {
//!             Event::Preamble(part) => assert_eq!(part.text().await, "preamble"),
//!             Event::Part(mut part) => {
//!                 let headers = part.headers().await.unwrap();
//!                 assert_eq!(headers["content-type"], "text/plain");
//!                 assert_eq!(part.text().await, "abcd");
//!             }
//!             Event::Trailer(bytes) => assert_eq!(&bytes[..], b"epilogue"),
//!             Event::Finish => {}
//!         }
//!     }
//! };
//!
//! tokio::join!(producer, consumer);
//! # }
//! # tokio::runtime::Runtime::new().unwrap().block_on(run());
//! ```
//!
//! ## Header-first streams
//!
//! Some streams open with a header block that itself advertises the
//! boundary. Enable [`Config::header_first`] and construct without a
//! boundary; the block is delivered as the preamble's headers, and the
//! boundary extracted from them (see [`parse_boundary`]) is installed with
//! [`Events::set_boundary`].

#![cfg_attr(nightly, feature(doc_cfg))]
#![forbid(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub use config::Config;
pub use demux::Demux;
pub use error::Error;
pub use event::{Event, Events};
pub use part::Part;

mod config;
mod constants;
mod demux;
mod error;
mod event;
mod header;
mod helpers;
mod part;
mod search;
mod state;

/// A Result type often returned from methods that can have `multisect`
/// errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Parses the `Content-Type` header to extract the boundary value.
///
/// Any `multipart/*` subtype qualifies; the demultiplexer itself never
/// inspects content types, so this is a caller-side convenience.
///
/// # Examples
///
/// ```
/// let content_type = "multipart/mixed; boundary=ABCDEFG";
/// assert_eq!(multisect::parse_boundary(content_type), Ok("ABCDEFG".to_owned()));
/// ```
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> crate::Result<String> {
    let m = content_type
        .as_ref()
        .parse::<mime::Mime>()
        .map_err(crate::Error::DecodeContentType)?;

    if m.type_() != mime::MULTIPART {
        return Err(crate::Error::NoMultipart);
    }

    m.get_param(mime::BOUNDARY)
        .map(|name| name.as_str().to_owned())
        .ok_or(crate::Error::NoBoundary)
}
