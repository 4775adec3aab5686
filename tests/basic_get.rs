//! Scenario (a): a plain buffered GET against a fixture that sends a
//! complete `Content-Length`-framed response in one shot.

mod support;

use conduit_http::Client;

#[tokio::test]
async fn basic_get_returns_buffered_body() {
    support::init_tracing();

    let addr = support::spawn(|mut stream| async move {
        let request = support::read_request(&mut stream).await;
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/x");

        support::write_response(
            &mut stream,
            "HTTP/1.1 200 OK",
            &[("Content-Length", "5")],
            b"hello",
        )
        .await;
    })
    .await;

    let client = Client::builder().build();
    let response = client
        .request(support::uri(addr, "/x"), |b| {
            b.max_content_length(1024);
        })
        .await
        .expect("request succeeds");

    assert_eq!(response.head().status().as_u16(), 200);
    let received = response.collect().await.expect("body collects");
    assert_eq!(received.body().as_ref(), b"hello");
}
