//! In-process sandbox server for integration tests.
//!
//! Speaks the same JSON protocol as the real sandbox over a local WebSocket,
//! backed by an in-memory filesystem shared across connections.
//!
//! Scripted behaviour:
//! - `echo ARGS..` prints its arguments and exits 0
//! - `exit CODE` exits with `CODE` and no output
//! - `sleep` never exits until killed
//! - `readFile` of [`DISCONNECT_PATH`] drops the connection without replying
//! - `readFile` under [`HANG_PREFIX`] never replies
//! - shells echo their input and exit on `exit\n`

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

use remote_container::identifiers::{ProcessId, ShellId, WatcherId};
use remote_container::protocol::{Encoding, Operation, Response, WatchOptions, WatchPathsOptions};
use remote_container::{Container, RequestId};

pub const DISCONNECT_PATH: &str = ".disconnect";
pub const HANG_PREFIX: &str = ".hang/";

// ============================================================================
// Tracing
// ============================================================================

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MockSandbox
// ============================================================================

#[derive(Debug, Clone)]
enum Control {
    Push(Value),
    Disconnect,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    File(Vec<u8>),
    Directory,
}

#[derive(Default)]
struct State {
    files: Mutex<BTreeMap<String, Node>>,
    shell_inputs: Mutex<Vec<String>>,
    resizes: Mutex<Vec<(u16, u16)>>,
    operations: Mutex<Vec<String>>,
    hold_shell_ready: AtomicBool,
}

/// Handle to a running mock sandbox.
pub struct MockSandbox {
    url: String,
    state: Arc<State>,
    control: broadcast::Sender<Control>,
}

impl MockSandbox {
    pub async fn start() -> Self {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let state = Arc::new(State::default());
        let (control, _) = broadcast::channel(64);

        let accept_state = Arc::clone(&state);
        let accept_control = control.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                let session = Session {
                    state: Arc::clone(&accept_state),
                    watchers: Vec::new(),
                };
                tokio::spawn(session.run(ws, accept_control.subscribe()));
            }
        });

        Self {
            url: format!("ws://{addr}"),
            state,
            control,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn boot(&self) -> Container {
        Container::builder()
            .url(self.url.as_str())
            .workdir_name("project")
            .boot()
            .await
            .expect("boot")
    }

    /// Pushes a raw event frame to every live connection.
    pub fn push_event(&self, name: &str, params: Value) {
        let frame = json!({ "type": "event", "event": name, "params": params });
        let _ = self.control.send(Control::Push(frame));
    }

    /// Drops every live connection.
    pub fn disconnect_all(&self) {
        let _ = self.control.send(Control::Disconnect);
    }

    /// Stops shells from announcing readiness until [`MockSandbox::shell_ready`].
    pub fn hold_shell_ready(&self) {
        self.state.hold_shell_ready.store(true, Ordering::SeqCst);
    }

    pub fn shell_ready(&self, shell_id: ShellId) {
        self.push_event("shell.ready", json!({ "shellId": shell_id }));
    }

    pub fn shell_inputs(&self) -> Vec<String> {
        self.state.shell_inputs.lock().clone()
    }

    pub fn resizes(&self) -> Vec<(u16, u16)> {
        self.state.resizes.lock().clone()
    }

    /// Operation types received so far, in arrival order.
    pub fn operations(&self) -> Vec<String> {
        self.state.operations.lock().clone()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.files.lock().contains_key(path)
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Deserialize)]
struct Incoming {
    #[serde(default)]
    id: Option<RequestId>,
    operation: Operation,
}

enum Watcher {
    Single {
        id: WatcherId,
        path: String,
        options: WatchOptions,
    },
    Batch {
        id: WatcherId,
        options: WatchPathsOptions,
    },
}

enum Outcome {
    Reply(Response),
    Silent,
    Drop,
}

struct Session {
    state: Arc<State>,
    watchers: Vec<Watcher>,
}

type Failure = (&'static str, String);

impl Session {
    async fn run(
        mut self,
        ws: WebSocketStream<TcpStream>,
        mut control: broadcast::Receiver<Control>,
    ) {
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                frame = read.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text.to_string(),
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => continue,
                    };
                    let incoming: Incoming = serde_json::from_str(&text).expect("client frame");
                    self.state.operations.lock().push(incoming.operation.name().to_string());

                    let mut outbound = Vec::new();
                    let outcome = self.dispatch(incoming, &mut outbound);
                    match outcome {
                        Outcome::Drop => break,
                        Outcome::Silent => {}
                        Outcome::Reply(response) => {
                            outbound.insert(0, serde_json::to_value(response).expect("response"));
                        }
                    }
                    for value in outbound {
                        if write.send(Message::Text(value.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                }
                ctrl = control.recv() => match ctrl {
                    Ok(Control::Push(value)) => {
                        if write.send(Message::Text(value.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                    Ok(Control::Disconnect) | Err(_) => break,
                }
            }
        }

        let _ = write.close().await;
    }

    fn dispatch(&mut self, incoming: Incoming, events: &mut Vec<Value>) -> Outcome {
        let Some(id) = incoming.id else {
            self.notification(incoming.operation, events);
            return Outcome::Silent;
        };

        if let Operation::ReadFile { path, .. } = &incoming.operation {
            if path == DISCONNECT_PATH {
                return Outcome::Drop;
            }
            if path.starts_with(HANG_PREFIX) {
                return Outcome::Silent;
            }
        }

        match self.request(incoming.operation, events) {
            Ok(data) => Outcome::Reply(Response::success(id, data)),
            Err((code, message)) => Outcome::Reply(Response::failure(id, code, message)),
        }
    }

    fn request(&mut self, operation: Operation, events: &mut Vec<Value>) -> Result<Value, Failure> {
        match operation {
            Operation::Boot { workdir_name } => {
                Ok(json!({ "workdir": format!("/home/{workdir_name}") }))
            }

            Operation::ReadFile { path, encoding } => {
                let path = normalize(&path);
                match self.state.files.lock().get(&path) {
                    Some(Node::File(bytes)) => Ok(match encoding {
                        Some(Encoding::Base64) => Value::String(BASE64.encode(bytes)),
                        _ => Value::String(String::from_utf8_lossy(bytes).into_owned()),
                    }),
                    Some(Node::Directory) => Err((
                        "EISDIR",
                        format!("illegal operation on a directory, read '{path}'"),
                    )),
                    None => Err(enoent(&path)),
                }
            }

            Operation::WriteFile { path, content, encoding } => {
                let path = normalize(&path);
                let bytes = match encoding {
                    Encoding::Base64 => BASE64
                        .decode(content)
                        .map_err(|e| ("EINVAL", e.to_string()))?,
                    Encoding::Utf8 => content.into_bytes(),
                };
                let existed = {
                    let mut files = self.state.files.lock();
                    if !is_directory(&files, parent(&path)) {
                        return Err(enoent(&path));
                    }
                    if files.get(&path) == Some(&Node::Directory) {
                        let message = format!("illegal operation on a directory, open '{path}'");
                        return Err(("EISDIR", message));
                    }
                    files.insert(path.clone(), Node::File(bytes)).is_some()
                };
                let kind = if existed { "change" } else { "add" };
                self.notify_watchers(kind, &path, events);
                Ok(Value::Null)
            }

            Operation::Mkdir { path, recursive } => {
                let path = normalize(&path);
                let mut files = self.state.files.lock();
                if is_directory(&files, &path) {
                    return if recursive {
                        Ok(Value::Null)
                    } else {
                        Err(("EEXIST", format!("file already exists, mkdir '{path}'")))
                    };
                }
                if files.contains_key(&path) {
                    return Err(("EEXIST", format!("file already exists, mkdir '{path}'")));
                }
                if !recursive {
                    if !is_directory(&files, parent(&path)) {
                        return Err(enoent(&path));
                    }
                    files.insert(path, Node::Directory);
                    return Ok(Value::Null);
                }
                let mut current = String::new();
                for segment in path.split('/') {
                    current = join(&current, segment);
                    match files.get(&current) {
                        Some(Node::Directory) => {}
                        Some(Node::File(_)) => {
                            return Err(("ENOTDIR", format!("not a directory, mkdir '{path}'")));
                        }
                        None => {
                            files.insert(current.clone(), Node::Directory);
                        }
                    }
                }
                Ok(Value::Null)
            }

            Operation::Readdir { path } => {
                let path = normalize(&path);
                let files = self.state.files.lock();
                match files.get(&path) {
                    Some(Node::File(_)) => {
                        return Err(("ENOTDIR", format!("not a directory, scandir '{path}'")));
                    }
                    None if !path.is_empty() => return Err(enoent(&path)),
                    _ => {}
                }
                let entries: Vec<Value> = files
                    .iter()
                    .filter(|(key, _)| parent(key) == path && !key.is_empty())
                    .map(|(key, node)| {
                        let name = key.rsplit('/').next().unwrap_or(key);
                        let kind = match node {
                            Node::File(_) => "file",
                            Node::Directory => "directory",
                        };
                        json!({ "name": name, "type": kind })
                    })
                    .collect();
                Ok(Value::Array(entries))
            }

            Operation::Rm { path, recursive, force } => {
                let path = normalize(&path);
                let removed = {
                    let mut files = self.state.files.lock();
                    match files.get(&path) {
                        None if force => return Ok(Value::Null),
                        None => return Err(enoent(&path)),
                        Some(Node::Directory) => {
                            let prefix = format!("{path}/");
                            let has_children = files.keys().any(|key| key.starts_with(&prefix));
                            if has_children && !recursive {
                                let message = format!("directory not empty, rm '{path}'");
                                return Err(("ENOTEMPTY", message));
                            }
                            files.retain(|key, _| key != &path && !key.starts_with(&prefix));
                        }
                        Some(Node::File(_)) => {
                            files.remove(&path);
                        }
                    }
                    path
                };
                self.notify_watchers("unlink", &removed, events);
                Ok(Value::Null)
            }

            Operation::Watch { watcher_id, path, options } => {
                self.watchers.push(Watcher::Single {
                    id: watcher_id,
                    path,
                    options,
                });
                Ok(Value::Null)
            }

            Operation::WatchPaths { watcher_id, options } => {
                self.watchers.push(Watcher::Batch {
                    id: watcher_id,
                    options,
                });
                Ok(Value::Null)
            }

            Operation::Unwatch { watcher_id } => {
                self.watchers.retain(|watcher| match watcher {
                    Watcher::Single { id, .. } | Watcher::Batch { id, .. } => *id != watcher_id,
                });
                Ok(Value::Null)
            }

            Operation::Spawn { process_id, command, args, .. } => {
                script_process(process_id, &command, &args, events);
                Ok(Value::Null)
            }

            Operation::Kill { process_id } => {
                let params = json!({ "processId": process_id, "exitCode": 143 });
                events.push(event("process.exit", params));
                Ok(Value::Null)
            }

            Operation::SpawnShell { shell_id, .. } => {
                if !self.state.hold_shell_ready.load(Ordering::SeqCst) {
                    events.push(event("shell.ready", json!({ "shellId": shell_id })));
                }
                Ok(Value::Null)
            }

            other => Err(("EINVAL", format!("unexpected request: {}", other.name()))),
        }
    }

    fn notification(&mut self, operation: Operation, events: &mut Vec<Value>) {
        match operation {
            Operation::ShellInput { shell_id, data } => {
                self.state.shell_inputs.lock().push(data.clone());
                events.push(event("shell.output", json!({ "shellId": shell_id, "data": data })));
                if data.trim() == "exit" {
                    events.push(event("shell.exit", json!({ "shellId": shell_id, "exitCode": 0 })));
                }
            }
            Operation::ShellResize { size, .. } => {
                self.state.resizes.lock().push((size.cols, size.rows));
            }
            _ => {}
        }
    }

    /// Every live watcher hears about every write; filtering is the client's job.
    fn notify_watchers(&self, kind: &str, path: &str, events: &mut Vec<Value>) {
        for watcher in &self.watchers {
            match watcher {
                Watcher::Single { id, .. } => {
                    let params = json!({ "watcherId": id, "type": kind, "path": path });
                    events.push(event("watch", params));
                }
                Watcher::Batch { id, options } => {
                    let mut change = json!({ "type": kind, "path": path });
                    if options.include_content
                        && let Some(Node::File(bytes)) = self.state.files.lock().get(path)
                    {
                        let content = String::from_utf8_lossy(bytes).into_owned();
                        change["content"] = Value::String(content);
                    }
                    let params = json!({ "watcherId": id, "events": [change] });
                    events.push(event("watch-paths", params));
                }
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn script_process(process_id: ProcessId, command: &str, args: &[String], events: &mut Vec<Value>) {
    match command {
        "echo" => {
            let line = format!("{}\n", args.join(" "));
            events.push(event("process.output", json!({ "processId": process_id, "data": line })));
            events.push(event("process.exit", json!({ "processId": process_id, "exitCode": 0 })));
        }
        "exit" => {
            let code: i32 = args.first().and_then(|code| code.parse().ok()).unwrap_or(0);
            let params = json!({ "processId": process_id, "exitCode": code });
            events.push(event("process.exit", params));
        }
        "sleep" => {}
        other => {
            let message = format!("{other}: command not found\n");
            let params = json!({ "processId": process_id, "data": message });
            events.push(event("process.output", params));
            events.push(event("process.exit", json!({ "processId": process_id, "exitCode": 127 })));
        }
    }
}

fn event(name: &str, params: Value) -> Value {
    json!({ "type": "event", "event": name, "params": params })
}

fn enoent(path: &str) -> Failure {
    ("ENOENT", format!("no such file or directory, '{path}'"))
}

fn normalize(path: &str) -> String {
    path.trim_start_matches("./")
        .trim_start_matches('/')
        .trim_end_matches('/')
        .to_string()
}

fn parent(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}/{name}")
    }
}

fn is_directory(files: &BTreeMap<String, Node>, path: &str) -> bool {
    path.is_empty() || files.get(path) == Some(&Node::Directory)
}

/// Receives the next item or fails the test after five seconds.
pub async fn next<T>(rx: &mut tokio::sync::mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for delivery")
        .expect("channel closed")
}
