//! Connection-level tests: admission, in-flight caps, teardown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use graphdb_driver::transport::{Connection, Options};
use graphdb_driver::protocol::request::{Request, RequestOptions};
use graphdb_driver::{Error, RequestId};

use common::TestServer;

fn conn_options(server: &TestServer) -> Arc<Options> {
    Arc::new(Options {
        url: format!("ws://{}:{}/gremlin", server.host, server.port),
        username: String::new(),
        password: String::new(),
        pool_size: 1,
        pool_timeout: Duration::from_millis(200),
        alive_check_interval: None,
        write_timeout: Duration::from_millis(500),
        read_timeout: Duration::from_millis(500),
        ping_interval: Duration::from_secs(20),
        max_in_flight: 4,
        max_simultaneous_usage: 4,
    })
}

fn eval(script: &str) -> Request {
    Request::eval(script, &RequestOptions::default())
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_and_wait_for_response() {
    let server = TestServer::start().await;
    let conn = Connection::dial(conn_options(&server)).await.expect("dial");

    let future = conn.submit(eval("g.V().count()")).await.expect("submit");
    let response = future.get().await;
    assert_eq!(response.code, 200);
    assert_eq!(conn.pending_size(), 0);

    conn.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn response_with_fixed_request_id_round_trips() {
    let server = TestServer::start().await;
    let conn = Connection::dial(conn_options(&server)).await.expect("dial");

    let id = RequestId::generate();
    let mut options = RequestOptions::default();
    options.set_request_id(id.clone());

    let future = conn
        .submit(Request::eval("g.V().count()", &options))
        .await
        .expect("submit");
    let response = future.get().await;
    assert_eq!(response.request_id, id);
    assert_eq!(response.code, 200);

    conn.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn over_queue_rejects_fifth_submission() {
    let server = TestServer::start().await;
    server.set_delay(Duration::from_millis(100));
    let conn = Connection::dial(conn_options(&server)).await.expect("dial");

    let mut futures = Vec::new();
    for _ in 0..4 {
        futures.push(conn.submit(eval("g.V().count()")).await.expect("submit"));
    }
    assert_eq!(conn.pending_size(), 4);

    let err = conn.submit(eval("g.V().count()")).await.unwrap_err();
    assert!(matches!(err, Error::OverQueue));

    // a completed request frees its slot
    let response = futures[0].get().await;
    assert_eq!(response.code, 200);
    conn.submit(eval("g.V().count()")).await.expect("submit after slot freed");

    conn.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_request_id_on_one_connection() {
    let server = TestServer::start().await;
    server.set_delay(Duration::from_millis(100));
    let conn = Connection::dial(conn_options(&server)).await.expect("dial");

    let id = RequestId::generate();
    let mut options = RequestOptions::default();
    options.set_request_id(id.clone());

    let fa = conn
        .submit(Request::eval("g.V().count()", &options))
        .await
        .expect("first");
    let fb = conn
        .submit(Request::eval("g.E().count()", &options))
        .await
        .expect("second accepted");

    let rb = fb.get().await;
    assert_eq!(rb.code, 697);

    let ra = fa.get().await;
    assert_eq!(ra.code, 200);

    conn.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_after_close_is_rejected() {
    let server = TestServer::start().await;
    let conn = Connection::dial(conn_options(&server)).await.expect("dial");

    conn.close();
    let err = conn.submit(eval("g.V().count()")).await.unwrap_err();
    assert!(matches!(err, Error::ConnClosed));
}

#[tokio::test(flavor = "multi_thread")]
async fn close_drains_pending_with_deliver_error() {
    let server = TestServer::start().await;
    server.set_delay(Duration::from_millis(200));
    let conn = Connection::dial(conn_options(&server)).await.expect("dial");

    let f1 = conn.submit(eval("g.V().count()")).await.expect("submit");
    let f2 = conn.submit(eval("g.E().count()")).await.expect("submit");

    conn.close();
    conn.close(); // idempotent

    assert_eq!(f1.get().await.code, 697);
    assert_eq!(f2.get().await.code, 697);
    assert_eq!(conn.pending_size(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn get_or_timeout_is_local_only() {
    let server = TestServer::start().await;
    server.set_delay(Duration::from_millis(100));
    let conn = Connection::dial(conn_options(&server)).await.expect("dial");

    let future = conn.submit(eval("g.V().count()")).await.expect("submit");
    assert!(future.get_or_timeout(Duration::from_millis(10)).await.is_none());

    // the request itself still completes
    let response = future.get().await;
    assert_eq!(response.code, 200);

    conn.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn killed_socket_marks_connection_broken() {
    let server = TestServer::start().await;
    let conn = Connection::dial(conn_options(&server)).await.expect("dial");
    assert!(conn.is_live());

    server.kill_one_connection();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(conn.is_broken_or_closed());
    let err = conn.submit(eval("g.V().count()")).await.unwrap_err();
    assert!(matches!(err, Error::ConnClosed));

    conn.close();
}
