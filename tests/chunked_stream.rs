//! Scenario (b): a `Transfer-Encoding: chunked` response delivered as three
//! 4 KiB pieces, consumed one at a time by a subscriber pulling from the
//! returned stream.

mod support;

use conduit_http::Client;
use tokio_stream::StreamExt;

#[tokio::test]
async fn chunked_stream_delivers_chunks_in_order() {
    support::init_tracing();

    let first = vec![b'a'; 4096];
    let second = vec![b'b'; 4096];
    let third = vec![b'c'; 4096];

    let (f1, f2, f3) = (first.clone(), second.clone(), third.clone());
    let addr = support::spawn(move |mut stream| async move {
        let request = support::read_request(&mut stream).await;
        assert_eq!(request.method, "GET");

        support::write_response(
            &mut stream,
            "HTTP/1.1 200 OK",
            &[("Transfer-Encoding", "chunked")],
            &[],
        )
        .await;

        for piece in [&f1, &f2, &f3] {
            support::write_chunk(&mut stream, piece).await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        support::write_chunked_end(&mut stream).await;
    })
    .await;

    let client = Client::builder().build();
    let mut response = client
        .request(support::uri(addr, "/stream"), |_| {})
        .await
        .expect("request succeeds");

    let mut received = Vec::new();
    while let Some(item) = response.next().await {
        let chunk = item.expect("no transport error");
        received.push(chunk.to_bytes());
        chunk.release();
    }

    assert_eq!(received.len(), 3, "subscriber should see exactly 3 chunks");
    assert_eq!(received[0].as_ref(), first.as_slice());
    assert_eq!(received[1].as_ref(), second.as_slice());
    assert_eq!(received[2].as_ref(), third.as_slice());
}
