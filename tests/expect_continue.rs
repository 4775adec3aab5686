//! Coverage for `Expect: 100-continue` negotiation (§4.D step 3): a `100`
//! interim response lets the buffered body write proceed; any other status
//! preempts it and is delivered as the final response without the body ever
//! reaching the wire.

mod support;

use conduit_http::Client;
use http::{HeaderValue, Method};

#[tokio::test]
async fn continue_received_then_body_is_written() {
    support::init_tracing();

    let (addr, fixture) = support::spawn_joined(|mut stream| async move {
        let (head, leftover) = support::read_request_head(&mut stream).await;
        assert_eq!(head.method, "POST");
        assert_eq!(head.path, "/x");
        assert_eq!(head.content_length, 7);

        support::write_head_only(&mut stream, "HTTP/1.1 100 Continue", &[]).await;

        let body = support::read_body_bytes(&mut stream, leftover, head.content_length).await;
        assert_eq!(body, b"payload");

        support::write_response(
            &mut stream,
            "HTTP/1.1 200 OK",
            &[("Content-Length", "2")],
            b"ok",
        )
        .await;
    })
    .await;

    let client = Client::builder().build();
    let response = client
        .request(support::uri(addr, "/x"), |b| {
            b.method(Method::POST)
                .header(http::header::EXPECT, HeaderValue::from_static("100-continue"))
                .bytes(&b"payload"[..]);
        })
        .await
        .expect("request succeeds");

    assert_eq!(response.head().status().as_u16(), 200);
    let received = response.collect().await.expect("body collects");
    assert_eq!(received.body().as_ref(), b"ok");

    fixture.await.expect("fixture task panicked");
}

#[tokio::test]
async fn non_100_status_preempts_the_body_write() {
    support::init_tracing();

    let (addr, fixture) = support::spawn_joined(|mut stream| async move {
        let (head, _leftover) = support::read_request_head(&mut stream).await;
        assert_eq!(head.method, "POST");
        assert_eq!(head.content_length, 7);

        // Reject the request outright instead of continuing; the client
        // must never write the body after this.
        support::write_response(
            &mut stream,
            "HTTP/1.1 417 Expectation Failed",
            &[("Content-Length", "0")],
            &[],
        )
        .await;

        // The body would arrive here if the bug this guards against ever
        // came back: a generic head parse that discards a non-100 status
        // and writes the body anyway.
        let mut probe = [0u8; 1];
        let arrived = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            stream.peek(&mut probe),
        )
        .await;
        assert!(
            matches!(arrived, Err(_)) || matches!(arrived, Ok(Ok(0))),
            "body bytes arrived after a non-100 response; expect-continue was not honored"
        );
    })
    .await;

    let client = Client::builder().build();
    let response = client
        .request(support::uri(addr, "/x"), |b| {
            b.method(Method::POST)
                .header(http::header::EXPECT, HeaderValue::from_static("100-continue"))
                .bytes(&b"payload"[..])
                .read_timeout(std::time::Duration::from_millis(500));
        })
        .await
        .expect("request succeeds");

    assert_eq!(response.head().status().as_u16(), 417);

    fixture.await.expect("fixture task panicked");
}
