//! Simulated node for integration tests
//!
//! Answers framed commands over a local TCP listener. Replies are produced by
//! a handler keyed on the command name; a handler returning `None` leaves
//! the request unanswered.

#![allow(dead_code)]

use bytes::{Buf, BytesMut};
use docstore_wire::connection::{Endpoint, SocketProvider, TcpSocketProvider, Transport};
use docstore_wire::protocol::{decode_message, encode_message, Message};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub type Handler = Arc<dyn Fn(&str) -> Option<Value> + Send + Sync>;

/// Route client logs to the test writer; filter with `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Discovery reply for a writable node speaking `min..=max`
pub fn discovery(min: u32, max: u32) -> Value {
    json!({
        "ismaster": true,
        "maxBsonObjectSize": 16 * 1024 * 1024,
        "maxMessageSizeBytes": 48_000_000,
        "maxWriteBatchSize": 1000,
        "minWireVersion": min,
        "maxWireVersion": max,
        "ok": 1
    })
}

/// TCP provider that waits before every dial; the delay can change mid-test
#[derive(Debug, Default)]
pub struct DelayedProvider {
    delay_ms: AtomicU64,
}

impl DelayedProvider {
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl SocketProvider for DelayedProvider {
    fn open<'a>(
        &'a self,
        endpoint: &'a Endpoint,
    ) -> BoxFuture<'a, docstore_wire::Result<Transport>> {
        Box::pin(async move {
            let delay = Duration::from_millis(self.delay_ms.load(Ordering::SeqCst));
            tokio::time::sleep(delay).await;
            TcpSocketProvider.open(endpoint).await
        })
    }
}

pub struct MockNode {
    port: u16,
    accepted: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl MockNode {
    /// A node answering discovery with `reply` and ping with ok
    pub async fn start(reply: Value) -> Self {
        Self::start_with(Arc::new(move |name: &str| match name {
            "isMaster" => Some(reply.clone()),
            "ping" => Some(json!({"ok": 1})),
            _ => Some(json!({"ok": 0, "errmsg": "no such command", "code": 59})),
        }))
        .await
    }

    pub async fn start_with(handler: Handler) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let accepted = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let commands = Arc::new(Mutex::new(Vec::new()));
        let tasks: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        let accept_loop = {
            let accepted = accepted.clone();
            let active = active.clone();
            let commands = commands.clone();
            let tasks = tasks.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    active.fetch_add(1, Ordering::SeqCst);
                    let task = tokio::spawn(serve(
                        socket,
                        handler.clone(),
                        active.clone(),
                        commands.clone(),
                    ));
                    tasks.lock().unwrap().push(task);
                }
            })
        };
        tasks.lock().unwrap().push(accept_loop);

        Self {
            port,
            accepted,
            active,
            commands,
            tasks,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections currently open
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Command names received so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Stop accepting and drop every open connection
    pub fn shutdown(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

impl Drop for MockNode {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn serve(
    mut socket: TcpStream,
    handler: Handler,
    active: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
) {
    let _active = ActiveGuard(active);
    let mut buf = BytesMut::with_capacity(4096);
    let mut next_id = 1;

    loop {
        let request = loop {
            match decode_message(&mut buf) {
                Ok((msg, consumed)) => {
                    buf.advance(consumed);
                    break msg;
                }
                Err(_) => match socket.read_buf(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                },
            }
        };

        let name = request.command_name().unwrap_or_default().to_string();
        commands.lock().unwrap().push(name.clone());

        let Some(body) = handler(&name) else {
            continue;
        };
        next_id += 1;
        let reply = Message::reply(next_id, request.request_id, body);
        let frame = encode_message(&reply).unwrap();
        if socket.write_all(&frame).await.is_err() {
            return;
        }
    }
}
