use std::{convert::Infallible, net::SocketAddr};

use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::{BodyStream, Full};
use hyper::{body::Incoming, header::CONTENT_TYPE, Request, Response, StatusCode};
use multisect::{Demux, Event};

// A handler for incoming requests.
async fn handle(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    // Extract the boundary from the `Content-Type` header.
    let boundary = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .and_then(|ct| multisect::parse_boundary(ct).ok());

    // Send `BAD_REQUEST` status if the content-type is not multipart.
    let boundary = match boundary {
        Some(boundary) => boundary,
        None => {
            return Ok(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(Full::from("BAD REQUEST"))
                .unwrap());
        }
    };

    // Demultiplex the body e.g. you can store the parts in files.
    if let Err(err) = demux_body(req.into_body(), boundary).await {
        return Ok(Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Full::from(format!("INTERNAL SERVER ERROR: {}", err)))
            .unwrap());
    }

    Ok(Response::new(Full::from("Success")))
}

// Demultiplex the request body.
async fn demux_body(body: Incoming, boundary: String) -> multisect::Result<()> {
    // Convert the body into a stream of data frames.
    let body_stream = BodyStream::new(body)
        .filter_map(|result| async move { result.map(|frame| frame.into_data().ok()).transpose() });

    let (mut demux, mut events) = Demux::new(boundary);

    let producer = async move { demux.feed(body_stream).await };
    let consumer = async move {
        while let Some(event) = events.next_event().await {
            match event {
                Event::Part(mut part) => {
                    println!("Part headers: {:?}", part.headers().await);

                    // Process the body chunks e.g. store them in a file.
                    let mut body_len = 0;
                    while let Some(chunk) = part.chunk().await {
                        body_len += chunk.len();
                    }
                    println!("Part body length: {}", body_len);
                }
                Event::Preamble(_) | Event::Trailer(_) => {}
                Event::Finish => println!("Body complete"),
            }
        }
    };

    let (fed, _) = tokio::join!(producer, consumer);
    fed
}

#[tokio::main]
async fn main() {
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    println!("Server running at: {}", addr);

    loop {
        let (socket, _remote_addr) = listener.accept().await.unwrap();
        let socket = hyper_util::rt::TokioIo::new(socket);
        tokio::spawn(async move {
            if let Err(e) = hyper::server::conn::http1::Builder::new()
                .serve_connection(socket, hyper::service::service_fn(handle))
                .await
            {
                eprintln!("server error: {}", e);
            }
        });
    }
}
