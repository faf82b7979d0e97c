use multisect::{Demux, Event};
use tokio::io::AsyncRead;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Get an `AsyncRead` and the boundary from somewhere e.g. a file.
    let (reader, boundary) = get_async_reader_from_somewhere().await;

    // Create the halves and feed the producer straight from the reader.
    let (mut demux, mut events) = Demux::new(boundary);
    let producer = tokio::spawn(async move { demux.feed_reader(reader).await });

    // Iterate over the events as they are demultiplexed.
    while let Some(event) = events.next_event().await {
        match event {
            Event::Part(mut part) => {
                println!("Headers: {:?}", part.headers().await);
                println!("Content: {:?}", part.text().await);
            }
            Event::Preamble(_) | Event::Trailer(_) => {}
            Event::Finish => println!("Stream complete"),
        }
    }

    producer.await??;

    Ok(())
}

// Generate an `AsyncRead` and the boundary from somewhere e.g. a file.
async fn get_async_reader_from_somewhere() -> (impl AsyncRead, &'static str) {
    let data = "--X-BOUNDARY\r\nContent-Type: text/plain\r\n\r\nabcd\r\n--X-BOUNDARY\r\nContent-Type: text/plain\r\n\r\nHello world\nHello\r\nWorld\rAgain\r\n--X-BOUNDARY--\r\n";

    (data.as_bytes(), "X-BOUNDARY")
}
