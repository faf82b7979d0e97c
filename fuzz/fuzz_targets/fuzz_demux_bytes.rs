#![no_main]

use std::convert::Infallible;

use bytes::Bytes;
use futures_util::future;
use futures_util::stream::iter;
use libfuzzer_sys::fuzz_target;
use multisect::{Demux, Event};
use tokio::runtime;

type Trace = Vec<(u8, Option<usize>, Vec<u8>)>;

async fn demux_chunked(data: &[u8], chunk_size: usize) -> Trace {
    let chunks: Vec<Result<Bytes, Infallible>> = data
        .chunks(chunk_size)
        .map(Bytes::copy_from_slice)
        .map(Ok)
        .collect();

    let (mut demux, mut events) = Demux::new("X-BOUNDARY");

    let producer = async move {
        demux.feed(iter(chunks)).await.expect("infallible stream");
    };

    let consumer = async move {
        let mut trace = Trace::new();
        while let Some(event) = events.next_event().await {
            match event {
                Event::Preamble(mut part) => {
                    let headers = part.headers().await.map(|map| map.len());
                    trace.push((0, headers, part.bytes().await.to_vec()));
                }
                Event::Part(mut part) => {
                    let headers = part.headers().await.map(|map| map.len());
                    trace.push((1, headers, part.bytes().await.to_vec()));
                }
                Event::Trailer(bytes) => trace.push((2, None, bytes.to_vec())),
                Event::Finish => trace.push((3, None, Vec::new())),
            }
        }
        trace
    };

    future::join(producer, consumer).await.1
}

fuzz_target!(|data: &[u8]| {
    let rt = runtime::Builder::new_current_thread().build().expect("runtime");
    rt.block_on(async {
        let whole = demux_chunked(data, data.len().max(1)).await;
        let tiny = demux_chunked(data, 1).await;

        // Trailer bytes ride in whatever chunk carries the closing dashes,
        // so the trailer is the one chunking-dependent output. Everything
        // else has to come out identical.
        let without_trailer =
            |trace: &Trace| -> Trace { trace.iter().filter(|entry| entry.0 != 2).cloned().collect() };
        assert_eq!(without_trailer(&whole), without_trailer(&tiny));
    });
});
