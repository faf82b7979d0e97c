use std::convert::Infallible;

use bytes::Bytes;
use futures_util::stream;
use futures_util::Stream;
use multisect::{Demux, Event};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Get the chunked byte stream and the boundary from somewhere e.g. a
    // server request body.
    let (stream, boundary) = get_byte_stream_from_somewhere().await;

    // Create the producer and consumer halves for that boundary.
    let (mut demux, mut events) = Demux::new(boundary);

    // Drive the producer half in its own task; `feed` honors flow control,
    // so a slow consumer slows the stream down instead of buffering it.
    let producer = tokio::spawn(async move { demux.feed(stream).await });

    // Iterate over the events as they are demultiplexed.
    while let Some(event) = events.next_event().await {
        match event {
            Event::Preamble(part) => {
                println!("Preamble: {:?}", part.text().await);
            }
            Event::Part(mut part) => {
                // Headers resolve once the part's blank line has been seen.
                println!("Part headers: {:?}", part.headers().await);
                println!("Part body: {:?}", part.text().await);
            }
            Event::Trailer(bytes) => println!("Trailer: {:?}", bytes),
            Event::Finish => println!("Stream complete"),
        }
    }

    producer.await??;

    Ok(())
}

// Generate a chunked byte stream and the boundary from somewhere e.g. a
// server request body.
async fn get_byte_stream_from_somewhere(
) -> (impl Stream<Item = Result<Bytes, Infallible>>, &'static str) {
    let data = "--X-BOUNDARY\r\nContent-Type: text/plain\r\n\r\nabcd\r\n--X-BOUNDARY\r\nContent-Type: application/json\r\n\r\n{\"name\": \"a.json\"}\r\n--X-BOUNDARY--\r\nepilogue";
    let chunks: Vec<Result<Bytes, Infallible>> = data
        .as_bytes()
        .chunks(16)
        .map(Bytes::copy_from_slice)
        .map(Ok)
        .collect();

    (stream::iter(chunks), "X-BOUNDARY")
}
