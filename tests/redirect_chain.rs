//! Scenario (c): a `302` to a POST is followed as a bodyless `GET` to the
//! resolved `Location`, on the same (keep-alive) connection.

mod support;

use conduit_http::Client;
use http::Method;

#[tokio::test]
async fn redirect_302_downgrades_post_to_get() {
    support::init_tracing();

    let addr = support::spawn(|mut stream| async move {
        let first = support::read_request(&mut stream).await;
        assert_eq!(first.method, "POST");
        assert_eq!(first.path, "/a");
        assert_eq!(first.body.as_slice(), b"payload");

        support::write_response(
            &mut stream,
            "HTTP/1.1 302 Found",
            &[("Location", "/b"), ("Content-Length", "0")],
            &[],
        )
        .await;

        let second = support::read_request(&mut stream).await;
        assert_eq!(second.method, "GET");
        assert_eq!(second.path, "/b");
        assert!(second.body.is_empty(), "redirected GET must carry no body");

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
        .request(support::uri(addr, "/a"), |b| {
            b.method(Method::POST).bytes(&b"payload"[..]);
        })
        .await
        .expect("request follows the redirect");

    assert_eq!(response.head().status().as_u16(), 200);
    let received = response.collect().await.expect("body collects");
    assert_eq!(received.body().as_ref(), b"ok");
}
