//! Session client tests: transaction envelope and session close.

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use graphdb_driver::{Error, SessionClient, Settings};

use common::{count_zero_frame, error_frame, TestServer};

fn session_settings(server: &TestServer) -> Settings {
    Settings::new()
        .with_host(server.host.clone())
        .with_port(server.port)
        .with_ping_interval(Duration::from_secs(20))
        .with_pool_timeout(Duration::from_millis(500))
        .with_write_timeout(Duration::from_millis(500))
}

/// Records every script the server sees; fails the ones listed in `fail`.
fn scripted_responder(
    server: &TestServer,
    fail: &'static [&'static str],
) -> Arc<Mutex<Vec<String>>> {
    let scripts: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&scripts);

    server.set_responder(Arc::new(move |request| {
        let id = request["requestId"].as_str().unwrap_or_default();
        let script = request["args"]["gremlin"].as_str().unwrap_or_default().to_string();

        // every session request must carry the session argument
        assert!(request["args"]["session"].is_string(), "missing session arg: {script}");
        log.lock().push(script.clone());

        if fail.iter().any(|f| script.contains(f)) {
            vec![error_frame(id, 597, "scripted failure")]
        } else {
            vec![count_zero_frame(id)]
        }
    }));

    scripts
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_submit_commits_on_success() {
    let server = TestServer::start().await;
    let scripts = scripted_responder(&server, &[]);

    let client = SessionClient::new("session-1", session_settings(&server)).expect("client");

    client
        .batch_submit(|shell| async move {
            shell.submit_script("g.addV('t').property('name', 'a')").await?;
            shell.submit_script("g.addV('t').property('name', 'b')").await?;
            Ok(())
        })
        .await
        .expect("batch commits");

    let seen = scripts.lock().clone();
    assert_eq!(
        seen,
        vec![
            "g.tx().open()",
            "g.addV('t').property('name', 'a')",
            "g.addV('t').property('name', 'b')",
            "g.tx().commit()",
        ]
    );

    client.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_submit_rolls_back_on_closure_error() {
    let server = TestServer::start().await;
    let scripts = scripted_responder(&server, &["duplicate-id"]);

    let client = SessionClient::new("session-2", session_settings(&server)).expect("client");

    let err = client
        .batch_submit(|shell| async move {
            shell.submit_script("g.addV('t').property(id,'1')").await?;
            // second insert collides server-side
            shell.submit_script("g.addV('t').property(id,'duplicate-id')").await?;
            Ok(())
        })
        .await
        .unwrap_err();

    match err {
        Error::Server { code, message, .. } => {
            assert_eq!(code, 597);
            assert_eq!(message, "scripted failure");
        }
        other => panic!("unexpected error: {other}"),
    }

    let seen = scripts.lock().clone();
    assert_eq!(seen.first().map(String::as_str), Some("g.tx().open()"));
    assert_eq!(seen.last().map(String::as_str), Some("g.tx().rollback()"));
    assert!(!seen.iter().any(|s| s == "g.tx().commit()"));

    client.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_submit_rolls_back_on_commit_failure() {
    let server = TestServer::start().await;
    let scripts = scripted_responder(&server, &["g.tx().commit()"]);

    let client = SessionClient::new("session-3", session_settings(&server)).expect("client");

    let err = client
        .batch_submit(|shell| async move {
            shell.submit_script("g.addV('t')").await?;
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Server { code: 597, .. }));

    let seen = scripts.lock().clone();
    assert_eq!(seen.last().map(String::as_str), Some("g.tx().rollback()"));

    client.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn rollback_failure_returns_original_error() {
    let server = TestServer::start().await;
    let scripts = scripted_responder(&server, &["boom", "g.tx().rollback()"]);

    let client = SessionClient::new("session-4", session_settings(&server)).expect("client");

    let err = client
        .batch_submit(|shell| async move {
            shell.submit_script("g.addV('boom')").await?;
            Ok(())
        })
        .await
        .unwrap_err();

    // the causing error wins even though rollback failed too
    match err {
        Error::Server { code, message, .. } => {
            assert_eq!(code, 597);
            assert_eq!(message, "scripted failure");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        scripts.lock().last().map(String::as_str),
        Some("g.tx().rollback()")
    );

    client.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn close_submits_session_close() {
    let server = TestServer::start().await;
    let scripts = scripted_responder(&server, &[]);

    let client = SessionClient::new("session-5", session_settings(&server)).expect("client");
    client
        .batch_submit(|shell| async move {
            shell.submit_script("g.V().count()").await.map(|_| ())
        })
        .await
        .expect("batch");

    client.close().await;

    let seen = scripts.lock().clone();
    assert_eq!(seen.last().map(String::as_str), Some("session.close()"));
}

#[tokio::test(flavor = "multi_thread")]
async fn fresh_batch_after_rollback_sees_clean_state() {
    let server = TestServer::start().await;
    let _scripts = scripted_responder(&server, &["duplicate-id"]);

    let client = SessionClient::new("session-6", session_settings(&server)).expect("client");

    let _ = client
        .batch_submit(|shell| async move {
            shell.submit_script("g.addV('t').property(id,'duplicate-id')").await?;
            Ok(())
        })
        .await;

    // the rolled-back write is gone; the echo server reports zero matches
    client
        .batch_submit(|shell| async move {
            let results = shell.submit_script("g.V('1').count()").await?;
            assert_eq!(results[0].get_int64(), 0);
            Ok(())
        })
        .await
        .expect("second batch");

    client.close().await;
}
