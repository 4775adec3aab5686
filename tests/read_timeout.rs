//! Scenario (e): the server sends a head declaring a body, then stalls
//! past `read_timeout`. The subscriber's stream must surface `ReadTimeout`
//! rather than hanging.

mod support;

use conduit_http::{ClientError, Client};
use std::time::Duration;
use tokio_stream::StreamExt;

#[tokio::test]
async fn read_timeout_mid_stream_surfaces_on_the_subscriber() {
    support::init_tracing();

    let addr = support::spawn(|mut stream| async move {
        let _ = support::read_request(&mut stream).await;
        support::write_head_only(
            &mut stream,
            "HTTP/1.1 200 OK",
            &[("Content-Length", "5")],
        )
        .await;
        // Never sends the 5 declared body bytes; hold the connection open
        // well past the client's read_timeout instead.
        tokio::time::sleep(Duration::from_secs(5)).await;
    })
    .await;

    let client = Client::builder().build();
    let mut response = client
        .request(support::uri(addr, "/stall"), |b| {
            b.read_timeout(Duration::from_millis(100));
        })
        .await
        .expect("head is delivered before the stall");

    let first = response.next().await.expect("stream yields the timeout error");
    let err = first.expect_err("a stalled body must not be reported as EOF");
    assert!(matches!(err.primary, ClientError::ReadTimeout));
}
