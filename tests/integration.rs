use bytes::Bytes;
use futures_util::stream;
use futures_util::FutureExt;
use http::HeaderMap;
use multisect::{Config, Demux, Error, Event, Events};

type Trace = Vec<(&'static str, Option<Vec<(String, String)>>, Bytes)>;

fn sorted_headers(headers: HeaderMap) -> Vec<(String, String)> {
    let mut flat: Vec<_> = headers
        .iter()
        .map(|(name, value)| {
            (name.to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned())
        })
        .collect();
    flat.sort();
    flat
}

async fn collect_trace(mut events: Events) -> Trace {
    let mut trace = Trace::new();
    while let Some(event) = events.next_event().await {
        match event {
            Event::Preamble(mut part) => {
                let headers = part.headers().await.map(sorted_headers);
                trace.push(("preamble", headers, part.bytes().await));
            }
            Event::Part(mut part) => {
                let headers = part.headers().await.map(sorted_headers);
                trace.push(("part", headers, part.bytes().await));
            }
            Event::Trailer(bytes) => trace.push(("trailer", None, bytes)),
            Event::Finish => trace.push(("finish", None, Bytes::new())),
        }
    }
    trace
}

fn hdrs(pairs: &[(&str, &str)]) -> Option<Vec<(String, String)>> {
    Some(pairs.iter().map(|(name, value)| (name.to_string(), value.to_string())).collect())
}

#[tokio::test]
async fn test_demux_basic() {
    let data = "\r\n--XYZ\r\nheader: val\r\n\r\nbody text\r\n--XYZ--\r\n";
    let stream = stream::iter(
        data.chars()
            .map(|ch| ch.to_string())
            .map(|part| multisect::Result::Ok(Bytes::copy_from_slice(part.as_bytes()))),
    );

    let (mut demux, mut events) = Demux::new("XYZ");

    let producer = async move { demux.feed(stream).await.unwrap() };
    let consumer = async move {
        let mut saw = Vec::new();
        while let Some(event) = events.next_event().await {
            match event {
                Event::Preamble(part) => {
                    assert_eq!(part.text().await, "");
                    saw.push("preamble");
                }
                Event::Part(mut part) => {
                    let headers = part.headers().await.unwrap();
                    assert_eq!(headers.len(), 1);
                    assert_eq!(headers["header"], "val");
                    assert_eq!(part.text().await, "body text");
                    saw.push("part");
                }
                Event::Trailer(_) => saw.push("trailer"),
                Event::Finish => saw.push("finish"),
            }
        }
        assert_eq!(saw, ["preamble", "part", "finish"]);
    };

    tokio::join!(producer, consumer);
}

#[tokio::test]
async fn test_demux_preamble() {
    let data = "junk\r\n--XYZ\r\nheader: val\r\n\r\nbody text\r\n--XYZ--\r\n";
    let stream = stream::iter(
        data.chars()
            .map(|ch| ch.to_string())
            .map(|part| multisect::Result::Ok(Bytes::copy_from_slice(part.as_bytes()))),
    );

    let (mut demux, events) = Demux::new("XYZ");

    let producer = async move { demux.feed(stream).await.unwrap() };
    let (_, trace) = tokio::join!(producer, collect_trace(events));

    assert_eq!(
        trace,
        vec![
            ("preamble", None, Bytes::from_static(b"junk")),
            ("part", hdrs(&[("header", "val")]), Bytes::from_static(b"body text")),
            ("finish", None, Bytes::new()),
        ]
    );
}

#[tokio::test]
async fn test_demux_empty_part() {
    // Back-to-back boundaries delimit a part with no header block and no
    // body; the part after it must come through untouched.
    let data = "\r\n--XYZ\r\n--XYZ\r\nh: v\r\n\r\nreal\r\n--XYZ--\r\n";
    let stream = stream::iter(
        data.chars()
            .map(|ch| ch.to_string())
            .map(|part| multisect::Result::Ok(Bytes::copy_from_slice(part.as_bytes()))),
    );

    let (mut demux, events) = Demux::new("XYZ");

    let producer = async move { demux.feed(stream).await.unwrap() };
    let (_, trace) = tokio::join!(producer, collect_trace(events));

    assert_eq!(
        trace,
        vec![
            ("preamble", None, Bytes::new()),
            ("part", None, Bytes::new()),
            ("part", hdrs(&[("h", "v")]), Bytes::from_static(b"real")),
            ("finish", None, Bytes::new()),
        ]
    );
}

#[tokio::test]
async fn test_demux_empty() {
    let data = "\r\n--XYZ--\r\n";
    let stream = stream::iter(
        data.chars()
            .map(|ch| ch.to_string())
            .map(|part| multisect::Result::Ok(Bytes::copy_from_slice(part.as_bytes()))),
    );

    let (mut demux, mut events) = Demux::new("XYZ");
    demux.feed(stream).await.unwrap();

    assert!(matches!(events.next_event().await, Some(Event::Preamble(_))));
    assert!(matches!(events.next_event().await, Some(Event::Finish)));
    assert!(events.next_event().await.is_none());
    assert!(events.next_event().await.is_none());
}

#[tokio::test]
async fn test_demux_chunked_arbitrarily() {
    // The same stream cut into chunks of any size produces the same events,
    // headers and bodies, even when cuts land inside the boundary, the
    // header terminator or the final dashes.
    let data = "pre\r\n--BOUND\r\na: 1\r\nb: 2\r\nb: 3\r\n\r\nfirst body\r\n--BOUND\r\n\r\nsecond\rbody\nwith-dash--es\r\n--BOUND\r\nc: 3\r\n\r\n\r\n--BOUND--\r\n";

    async fn run(data: &'static str, size: usize) -> Trace {
        let (mut demux, events) = Demux::new("BOUND");
        let producer = async move {
            let stream = stream::iter(
                data.as_bytes()
                    .chunks(size)
                    .map(|chunk| multisect::Result::Ok(Bytes::copy_from_slice(chunk))),
            );
            demux.feed(stream).await.unwrap();
        };
        let (_, trace) = tokio::join!(producer, collect_trace(events));
        trace
    }

    let whole = run(data, data.len()).await;
    assert_eq!(
        whole,
        vec![
            ("preamble", None, Bytes::from_static(b"pre")),
            (
                "part",
                hdrs(&[("a", "1"), ("b", "2"), ("b", "3")]),
                Bytes::from_static(b"first body"),
            ),
            ("part", hdrs(&[]), Bytes::from_static(b"second\rbody\nwith-dash--es")),
            ("part", hdrs(&[("c", "3")]), Bytes::new()),
            ("finish", None, Bytes::new()),
        ]
    );

    for size in [1, 2, 3, 4, 5, 7, 11, 13] {
        assert_eq!(run(data, size).await, whole, "chunk size {}", size);
    }
}

#[tokio::test]
async fn test_demux_trailer() {
    let (mut demux, events) = Demux::new("XYZ");
    demux.consume("\r\n--XYZ\r\nh: v\r\n\r\nbody").await;
    demux.consume("\r\n--XYZ--\r\nsome epilogue").await;

    let trace = collect_trace(events).await;
    assert_eq!(
        trace,
        vec![
            ("preamble", None, Bytes::new()),
            ("part", hdrs(&[("h", "v")]), Bytes::from_static(b"body")),
            ("trailer", None, Bytes::from_static(b"some epilogue")),
            ("finish", None, Bytes::new()),
        ]
    );
}

#[tokio::test]
async fn test_demux_trailer_on_marker_line() {
    let (mut demux, events) = Demux::new("XYZ");
    demux.consume("\r\n--XYZ\r\nh: v\r\n\r\nbody\r\n--XYZ--tail").await;

    let trace = collect_trace(events).await;
    assert_eq!(trace[2], ("trailer", None, Bytes::from_static(b"tail")));
    assert_eq!(trace[3], ("finish", None, Bytes::new()));
}

#[tokio::test]
async fn test_demux_finish_waits_for_part_drain() {
    let (mut demux, mut events) = Demux::new("XYZ");
    demux.consume("\r\n--XYZ\r\nh: v\r\n\r\nbody\r\n--XYZ--\r\n").await;

    let preamble = match events.next_event().await {
        Some(Event::Preamble(part)) => part,
        other => panic!("expected preamble, got {:?}", other),
    };
    drop(preamble);
    let part = match events.next_event().await {
        Some(Event::Part(part)) => part,
        other => panic!("expected part, got {:?}", other),
    };

    // The final marker is in, but the part is still undrained.
    assert!(events.next_event().now_or_never().is_none());

    assert_eq!(part.text().await, "body");
    assert!(matches!(events.next_event().await, Some(Event::Finish)));
    assert!(events.next_event().await.is_none());
}

#[tokio::test]
async fn test_demux_finish_after_late_marker() {
    let (mut demux, mut events) = Demux::new("XYZ");
    demux.consume("\r\n--XYZ\r\nh: v\r\n\r\nbody\r\n--XYZ").await;

    let _ = events.next_event().await; // preamble
    let part = match events.next_event().await {
        Some(Event::Part(part)) => part,
        other => panic!("expected part, got {:?}", other),
    };
    assert_eq!(part.text().await, "body");

    // Drained, but the final dashes haven't arrived yet.
    assert!(events.next_event().now_or_never().is_none());

    demux.consume("--\r\n").await;
    assert!(matches!(events.next_event().await, Some(Event::Finish)));
    assert!(events.next_event().await.is_none());
}

#[tokio::test]
async fn test_demux_lone_dash_is_content() {
    // One dash after a boundary, refuted by the next byte, is real content:
    // it must come back as the first byte of the following header block.
    let data = "\r\n--XYZ\r\nh: v\r\n\r\nx\r\n--XYZ-h2: v2\r\n\r\ny\r\n--XYZ--\r\n";
    let stream = stream::iter(
        data.chars()
            .map(|ch| ch.to_string())
            .map(|part| multisect::Result::Ok(Bytes::copy_from_slice(part.as_bytes()))),
    );

    let (mut demux, events) = Demux::new("XYZ");

    let producer = async move { demux.feed(stream).await.unwrap() };
    let (_, trace) = tokio::join!(producer, collect_trace(events));

    assert_eq!(
        trace,
        vec![
            ("preamble", None, Bytes::new()),
            ("part", hdrs(&[("h", "v")]), Bytes::from_static(b"x")),
            ("part", hdrs(&[("-h2", "v2")]), Bytes::from_static(b"y")),
            ("finish", None, Bytes::new()),
        ]
    );
}

#[tokio::test]
async fn test_demux_lone_dash_then_boundary() {
    // A dash that runs straight into the next boundary closes an empty
    // segment carrying that dash, not the end of the stream. The outcome
    // must not depend on where the chunks are cut.
    let data = "\r\n--XYZ\r\nh: v\r\n\r\nx\r\n--XYZ-\r\n--XYZ\r\nh2: v2\r\n\r\ny\r\n--XYZ--\r\n";

    async fn run(data: &'static str, size: usize) -> Trace {
        let (mut demux, events) = Demux::new("XYZ");
        let producer = async move {
            let stream = stream::iter(
                data.as_bytes()
                    .chunks(size)
                    .map(|chunk| multisect::Result::Ok(Bytes::copy_from_slice(chunk))),
            );
            demux.feed(stream).await.unwrap();
        };
        let (_, trace) = tokio::join!(producer, collect_trace(events));
        trace
    }

    let whole = run(data, data.len()).await;
    assert_eq!(
        whole,
        vec![
            ("preamble", None, Bytes::new()),
            ("part", hdrs(&[("h", "v")]), Bytes::from_static(b"x")),
            ("part", None, Bytes::new()),
            ("part", hdrs(&[("h2", "v2")]), Bytes::from_static(b"y")),
            ("finish", None, Bytes::new()),
        ]
    );
    for size in [1, 3, 8] {
        assert_eq!(run(data, size).await, whole, "chunk size {}", size);
    }
}

#[tokio::test]
async fn test_demux_header_first() {
    let config = Config::new().header_first(true);
    let (mut demux, mut events) = Demux::with_config(config).unwrap();

    demux.consume("content-type: multipart/mixed; boundary=Q\r\n\r\npre").await;

    let mut preamble = match events.next_event().await {
        Some(Event::Preamble(part)) => part,
        other => panic!("expected preamble, got {:?}", other),
    };
    let headers = preamble.headers().await.unwrap();
    let content_type = headers["content-type"].to_str().unwrap();
    let boundary = multisect::parse_boundary(content_type).unwrap();
    assert_eq!(boundary, "Q");
    events.set_boundary(boundary);

    demux.consume("amble\r\n--Q\r\nh: v\r\n\r\nbody\r\n--Q--\r\n").await;

    // The bytes stashed before the boundary arrived belong to the preamble.
    assert_eq!(preamble.text().await, "preamble");

    let mut part = match events.next_event().await {
        Some(Event::Part(part)) => part,
        other => panic!("expected part, got {:?}", other),
    };
    assert_eq!(part.headers().await.unwrap()["h"], "v");
    assert_eq!(part.text().await, "body");

    assert!(matches!(events.next_event().await, Some(Event::Finish)));
    assert!(events.next_event().await.is_none());
}

#[tokio::test]
async fn test_demux_set_boundary() {
    let (mut demux, events) = Demux::new("AAA");
    demux.consume("\r\n--AAA\r\nh: 1\r\n\r\nfirst\r\n--AAA\r\nh: 2\r\n\r\npartial").await;

    // Reconfiguring abandons the part being demultiplexed: its stream just
    // ends with whatever it already got.
    demux.set_boundary("BBB");
    demux.consume("\r\n--BBB\r\nh: 3\r\n\r\nthird\r\n--BBB--\r\n").await;
    drop(demux);

    let trace = collect_trace(events).await;
    assert_eq!(
        trace,
        vec![
            ("preamble", None, Bytes::new()),
            ("part", hdrs(&[("h", "1")]), Bytes::from_static(b"first")),
            ("part", hdrs(&[("h", "2")]), Bytes::from_static(b"partial")),
            // The reconfigured stream opens on a boundary, so an empty
            // segment precedes it.
            ("part", None, Bytes::new()),
            ("part", hdrs(&[("h", "3")]), Bytes::from_static(b"third")),
            ("finish", None, Bytes::new()),
        ]
    );
}

#[tokio::test]
async fn test_demux_backpressure() {
    let config = Config::new().boundary("XYZ").part_buffer_size(4);
    let (mut demux, mut events) = Demux::with_config(config).unwrap();

    // The body overshoots the buffer hint, so the acknowledgement is
    // withheld.
    assert!(demux.consume("\r\n--XYZ\r\nh: v\r\n\r\nbodybytes").now_or_never().is_none());

    let _ = events.next_event().await; // preamble
    let mut part = match events.next_event().await {
        Some(Event::Part(part)) => part,
        other => panic!("expected part, got {:?}", other),
    };
    assert_eq!(part.headers().await.unwrap()["h"], "v");
    assert_eq!(part.chunk().await.as_deref(), Some(&b"bodybytes"[..]));

    // Reading released the backlog; the next chunk is acknowledged at once.
    assert!(demux.consume("!\r\n--XYZ--\r\n").now_or_never().is_some());

    assert_eq!(part.chunk().await.as_deref(), Some(&b"!"[..]));
    assert!(part.chunk().await.is_none());
    assert!(matches!(events.next_event().await, Some(Event::Finish)));
}

#[tokio::test]
async fn test_demux_truncated() {
    let (mut demux, mut events) = Demux::new("XYZ");
    demux.consume("\r\n--XYZ\r\nh: v\r\n\r\npartial body").await;
    drop(demux);

    let _ = events.next_event().await; // preamble
    let part = match events.next_event().await {
        Some(Event::Part(part)) => part,
        other => panic!("expected part, got {:?}", other),
    };
    assert_eq!(part.text().await, "partial body");

    // No final marker ever arrived: the stream ends without a finish event.
    assert!(events.next_event().await.is_none());
}

#[tokio::test]
async fn test_demux_boundary_required() {
    let err = match Demux::with_config(Config::new()) {
        Err(err) => err,
        Ok(_) => panic!("expected a configuration error"),
    };
    assert_eq!(err, Error::BoundaryRequired);
    assert_eq!(
        err.to_string(),
        "a boundary is required unless header-first mode is enabled"
    );

    assert!(Demux::with_config(Config::new().header_first(true)).is_ok());
}

#[tokio::test]
async fn test_demux_multi_value_headers() {
    let (mut demux, mut events) = Demux::new("XYZ");
    demux
        .consume("\r\n--XYZ\r\nset-cookie: a=1\r\nset-cookie: b=2\r\nx-one: 1\r\n\r\n\r\n--XYZ--\r\n")
        .await;

    let _ = events.next_event().await; // preamble
    let mut part = match events.next_event().await {
        Some(Event::Part(part)) => part,
        other => panic!("expected part, got {:?}", other),
    };
    let headers = part.headers().await.unwrap();
    assert_eq!(headers.len(), 3);
    let cookies: Vec<_> = headers.get_all("set-cookie").iter().collect();
    assert_eq!(cookies, vec!["a=1", "b=2"]);
    assert_eq!(part.text().await, "");
}

#[tokio::test]
async fn test_demux_stream_error() {
    let stream = stream::iter(vec![
        Ok(Bytes::from_static(b"\r\n--XYZ\r\nh: v\r\n\r\n")),
        Err(std::io::Error::new(std::io::ErrorKind::Other, "read aborted")),
    ]);

    let (mut demux, _events) = Demux::new("XYZ");
    let err = demux.feed(stream).await.unwrap_err();
    assert!(matches!(err, Error::StreamReadFailed(_)));
    assert_eq!(err.to_string(), "stream read failed: read aborted");
}

#[cfg(feature = "json")]
#[tokio::test]
async fn test_demux_json() {
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Payload {
        name: String,
        size: u32,
    }

    let (mut demux, mut events) = Demux::new("XYZ");
    demux
        .consume(
            "\r\n--XYZ\r\ncontent-type: application/json\r\n\r\n{\"name\": \"a.json\", \"size\": 3}\r\n--XYZ--\r\n",
        )
        .await;

    let _ = events.next_event().await; // preamble
    let part = match events.next_event().await {
        Some(Event::Part(part)) => part,
        other => panic!("expected part, got {:?}", other),
    };
    assert_eq!(
        part.json::<Payload>().await,
        Ok(Payload { name: "a.json".to_owned(), size: 3 })
    );
}
