//! Container lifecycle, events, and connection loss.

mod common;

use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use common::{DISCONNECT_PATH, HANG_PREFIX, MockSandbox, next};
use remote_container::transport::ConnectionState;
use remote_container::{
    Container, ContainerConfig, ContainerEvent, ContainerEventKind, Error, PortEventKind,
    RemoteContainerFactory, WatchOptions,
};

#[tokio::test]
async fn test_boot_reports_workdir() {
    let sandbox = MockSandbox::start().await;

    let container = RemoteContainerFactory::builder()
        .url(sandbox.url())
        .workdir_name("todo-app")
        .boot()
        .await
        .expect("boot");

    assert_eq!(container.workdir(), "/home/todo-app");
    assert_eq!(container.state(), ConnectionState::Open);
    assert_eq!(sandbox.operations().first().map(String::as_str), Some("boot"));
}

#[tokio::test]
async fn test_boot_from_deserialized_config() {
    let sandbox = MockSandbox::start().await;
    let config: ContainerConfig =
        serde_json::from_value(json!({ "url": sandbox.url(), "workdirName": "from-json" }))
            .expect("config");

    let container = Container::boot(config).await.expect("boot");
    assert_eq!(container.workdir(), "/home/from-json");
}

#[tokio::test]
async fn test_server_ready_and_port_listeners() {
    let sandbox = MockSandbox::start().await;
    let container = sandbox.boot().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let ready_tx = tx.clone();
    container.on(ContainerEventKind::ServerReady, move |event| {
        let _ = ready_tx.send(event.clone());
    });
    let port_id = container.on(ContainerEventKind::Port, move |event| {
        let _ = tx.send(event.clone());
    });

    let url = "http://localhost:5173";
    sandbox.push_event("port", json!({ "port": 5173, "type": "open", "url": url }));
    sandbox.push_event("server-ready", json!({ "port": 5173, "url": url }));

    assert_eq!(
        next(&mut rx).await,
        ContainerEvent::Port {
            port: 5173,
            kind: PortEventKind::Open,
            url: "http://localhost:5173".into(),
        }
    );
    assert_eq!(
        next(&mut rx).await,
        ContainerEvent::ServerReady {
            port: 5173,
            url: "http://localhost:5173".into(),
        }
    );

    assert!(container.off(port_id));
    sandbox.push_event("port", json!({ "port": 5173, "type": "close", "url": "" }));
    sandbox.push_event("server-ready", json!({ "port": 3000, "url": "http://localhost:3000" }));
    assert!(matches!(next(&mut rx).await, ContainerEvent::ServerReady { port: 3000, .. }));
}

#[tokio::test]
async fn test_subscribe_sees_events_then_closed() {
    let sandbox = MockSandbox::start().await;
    let container = sandbox.boot().await;
    let mut events = container.subscribe();

    sandbox.push_event("error", json!({ "message": "out of memory" }));
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timely")
        .expect("event");
    assert_eq!(event.kind(), ContainerEventKind::Error);

    container.teardown();
    let closed = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timely");
    assert!(matches!(closed, Err(RecvError::Closed)));
}

#[tokio::test]
async fn test_every_pending_request_fails_once_on_disconnect() {
    let sandbox = MockSandbox::start().await;
    let container = sandbox.boot().await;
    let fs = container.fs();

    let (hang_a, hang_b) = (format!("{HANG_PREFIX}a"), format!("{HANG_PREFIX}b"));

    let (first, second, third) = tokio::join!(
        fs.read_file(&hang_a),
        fs.read_file(&hang_b),
        fs.read_file(DISCONNECT_PATH),
    );

    for result in [first, second, third] {
        let err = result.expect_err("connection lost");
        assert!(matches!(err, Error::ConnectionClosed), "{err}");
    }
    assert_eq!(container.pending_count(), 0);
    assert!(container.state().is_terminal());
}

#[tokio::test]
async fn test_pending_count_tracks_in_flight_requests() {
    let sandbox = MockSandbox::start().await;
    let container = sandbox.boot().await;
    assert_eq!(container.pending_count(), 0);

    let read = tokio::spawn({
        let container = container.clone();
        async move { container.fs().read_file(&format!("{HANG_PREFIX}held")).await }
    });
    while container.pending_count() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(container.pending_count(), 1);

    container.teardown();
    let err = read.await.expect("join").expect_err("torn down");
    assert!(matches!(err, Error::ConnectionClosed), "{err}");
    assert_eq!(container.pending_count(), 0);
    assert!(container.state().is_terminal());
}

#[tokio::test]
async fn test_request_timeout_ignores_late_reply() {
    let sandbox = MockSandbox::start().await;
    let container = Container::builder()
        .url(sandbox.url())
        .request_timeout(Duration::from_millis(200))
        .boot()
        .await
        .expect("boot");

    let err = container
        .fs()
        .read_file(&format!("{HANG_PREFIX}slow"))
        .await
        .expect_err("timeout");
    assert!(err.is_timeout(), "{err}");

    container.fs().write_file("after.txt", "ok").await.expect("still usable");
    assert_eq!(container.pending_count(), 0);
}

#[tokio::test]
async fn test_no_reconnect_after_disconnect() {
    let sandbox = MockSandbox::start().await;
    let container = sandbox.boot().await;
    container.fs().write_file("kept.txt", "survives").await.expect("write");

    let watcher = container
        .fs()
        .watch("*.txt", WatchOptions::default())
        .await
        .expect("watch");
    let process = container.spawn("sleep", ["60"]).await.expect("spawn");

    sandbox.disconnect_all();

    // Failure path: the old handle stays dead.
    let err = process.wait().await.expect_err("exit rejects");
    assert!(matches!(err, Error::ConnectionClosed), "{err}");
    assert!(!watcher.is_active());
    let err = container.fs().read_file("kept.txt").await.expect_err("closed");
    assert!(matches!(err, Error::ConnectionClosed), "{err}");
    assert!(container.state().is_terminal());
    assert_eq!(container.processes().running(), 0);

    // Success path: booting again gives a working container over the same sandbox.
    let rebooted = sandbox.boot().await;
    assert_eq!(
        rebooted.fs().read_to_string("kept.txt").await.expect("read"),
        "survives"
    );
    assert_eq!(rebooted.fs().watcher_count(), 0);
    assert!(container.state().is_terminal());
}

#[tokio::test]
async fn test_teardown_is_the_only_close() {
    let sandbox = MockSandbox::start().await;
    let container = sandbox.boot().await;
    let clone = container.clone();
    drop(container);

    clone.fs().write_file("x.txt", "x").await.expect("clone keeps connection open");

    clone.teardown();
    let err = clone.fs().write_file("x.txt", "y").await.expect_err("torn down");
    assert!(err.is_connection_error(), "{err}");
}
