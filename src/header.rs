use bytes::BytesMut;
use http::HeaderMap;
use memchr::memmem;

use crate::constants;
use crate::helpers;

/// Incremental parser for one header block.
///
/// Pushed bytes accumulate until the blank line that ends the block, then
/// the whole block is tokenized in one go. A single instance serves every
/// part of a stream; the demultiplexer resets it explicitly on each part
/// transition.
#[derive(Debug)]
pub(crate) struct HeaderParser {
    buf: BytesMut,
    done: bool,
}

impl HeaderParser {
    pub(crate) fn new() -> Self {
        HeaderParser {
            buf: BytesMut::new(),
            done: false,
        }
    }

    /// Accumulates `data`. Once the terminating blank line shows up, returns
    /// the parsed headers and the offset just past the terminator within
    /// `data`; bytes from that offset on belong to the body.
    pub(crate) fn push(&mut self, data: &[u8]) -> Option<(HeaderMap, usize)> {
        debug_assert!(!self.done);

        // The terminator may straddle the previous push, so rescan the last
        // three buffered bytes.
        let scan_from = self.buf.len().saturating_sub(constants::CRLF_CRLF.len() - 1);
        self.buf.extend_from_slice(data);

        let at = memmem::find(&self.buf[scan_from..], constants::CRLF_CRLF.as_bytes())?;
        let end = scan_from + at + constants::CRLF_CRLF.len();
        self.done = true;

        let offset = end - (self.buf.len() - data.len());
        Some((parse_block(&self.buf[..end]), offset))
    }

    /// Discards accumulated bytes, readying the parser for the next block.
    pub(crate) fn reset(&mut self) {
        self.buf.clear();
        self.done = false;
    }
}

/// Tokenizes a complete header block, terminator included. Blocks `httparse`
/// rejects yield an empty map: the part still flows, it just carries no
/// header values.
fn parse_block(block: &[u8]) -> HeaderMap {
    // The block may open with the CRLF that closed the boundary line.
    let block = if block.starts_with(constants::CRLF.as_bytes()) {
        &block[constants::CRLF.len()..]
    } else {
        block
    };

    let mut headers = [httparse::EMPTY_HEADER; constants::MAX_HEADERS];
    match httparse::parse_headers(block, &mut headers) {
        Ok(httparse::Status::Complete((_, raw))) => helpers::raw_headers_to_map(raw),
        Ok(httparse::Status::Partial) | Err(_) => {
            #[cfg(feature = "log")]
            log::debug!("discarding unparseable header block of {} bytes", block.len());
            HeaderMap::new()
        }
    }
}
