//! Single-socket command exchange

use super::transport::Transport;
use crate::protocol::{decode_message, encode_message, Message, OpCode};
use crate::{Error, Result};
use bytes::{Buf, BytesMut};
use serde_json::Value;
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

// Request ids are unique per process so replies can be matched in logs
static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

fn next_request_id() -> i32 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// A socket to one node
///
/// Any I/O failure marks the connection broken; pools drop broken
/// connections on checkin instead of reusing them.
pub struct Connection {
    transport: Transport,
    address: String,
    read_buf: BytesMut,
    op_timeout: Option<Duration>,
    broken: bool,
    authenticated: HashSet<String>,
}

impl Connection {
    /// Wrap an open transport
    pub fn new(transport: Transport, address: impl Into<String>) -> Self {
        Self {
            transport,
            address: address.into(),
            read_buf: BytesMut::with_capacity(8192),
            op_timeout: None,
            broken: false,
            authenticated: HashSet::new(),
        }
    }

    /// Bound every command exchange by `timeout`
    pub fn with_op_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Address of the node
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Transport kind label
    pub fn transport_kind(&self) -> &'static str {
        self.transport.kind()
    }

    /// Whether an I/O failure or timeout left the socket unusable
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Whether a credential for `source` was already applied
    pub fn is_authenticated(&self, source: &str) -> bool {
        self.authenticated.contains(source)
    }

    /// Record that a credential for `source` was applied
    pub fn mark_authenticated(&mut self, source: impl Into<String>) {
        self.authenticated.insert(source.into());
    }

    /// Run one command and return the reply document
    ///
    /// # Errors
    ///
    /// - [`Error::OperationTimeout`] if the exchange exceeds the op timeout
    /// - [`Error::ConnectionFailure`] on socket-level failure
    /// - [`Error::Command`] if the node replies with `ok: 0`
    pub async fn command(&mut self, body: Value) -> Result<Value> {
        let name = command_name(&body);
        let request = Message::command(next_request_id(), body);

        let op_timeout = self.op_timeout;
        let exchange = self.exchange(&request);
        let result = match op_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, exchange).await {
                Ok(result) => result,
                Err(_) => Err(Error::OperationTimeout { timeout }),
            },
            None => exchange.await,
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                // A partial exchange leaves the stream unsynchronized
                self.broken = true;
                tracing::debug!(command = %name, address = %self.address, error = %e, "command failed");
                return Err(match e {
                    Error::Io(io_err) => Error::connection_failure(self.address.clone(), io_err),
                    other => other,
                });
            }
        };

        check_ok(reply)
    }

    async fn exchange(&mut self, request: &Message) -> Result<Value> {
        self.send_message(request).await?;
        let reply = self.receive_message().await?;

        if reply.op_code != OpCode::Reply {
            return Err(Error::Protocol(format!(
                "expected reply, got {:?}",
                reply.op_code
            )));
        }
        if reply.response_to != request.request_id {
            return Err(Error::Protocol(format!(
                "reply answers request {} but {} was sent",
                reply.response_to, request.request_id
            )));
        }
        Ok(reply.body)
    }

    /// Send a message
    async fn send_message(&mut self, msg: &Message) -> Result<()> {
        let buf = encode_message(msg)?;
        self.transport.write_all(&buf).await?;
        self.transport.flush().await?;
        Ok(())
    }

    /// Receive a message
    async fn receive_message(&mut self) -> Result<Message> {
        loop {
            match decode_message(&mut self.read_buf) {
                Ok((msg, consumed)) => {
                    self.read_buf.advance(consumed);
                    return Ok(msg);
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
                Err(e) => return Err(Error::Protocol(e.to_string())),
            }

            // Need more data
            let n = self.transport.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::connection_failure(
                    self.address.clone(),
                    "connection closed by peer",
                ));
            }
        }
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<()> {
        self.transport.shutdown().await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("transport", &self.transport.kind())
            .field("broken", &self.broken)
            .finish()
    }
}

fn command_name(body: &Value) -> String {
    body.as_object()
        .and_then(|map| map.keys().next())
        .cloned()
        .unwrap_or_else(|| "<unknown>".to_string())
}

/// Turn an `ok: 0` reply into [`Error::Command`]
fn check_ok(reply: Value) -> Result<Value> {
    let ok = match reply.get("ok") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|v| v == 1.0).unwrap_or(false),
        _ => false,
    };
    if ok {
        return Ok(reply);
    }

    let message = reply
        .get("errmsg")
        .and_then(Value::as_str)
        .unwrap_or("command failed")
        .to_string();
    let code = reply.get("code").and_then(Value::as_i64).unwrap_or(0);
    Err(Error::Command { code, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn connected_pair() -> (Connection, tokio::net::TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let transport = Transport::connect_tcp("127.0.0.1", port).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (
            Connection::new(transport, format!("127.0.0.1:{}", port)),
            server,
        )
    }

    async fn read_request(server: &mut tokio::net::TcpStream) -> Message {
        let mut buf = BytesMut::new();
        loop {
            if let Ok((msg, _)) = decode_message(&mut buf) {
                return msg;
            }
            server.read_buf(&mut buf).await.unwrap();
        }
    }

    #[test]
    fn test_check_ok() {
        assert!(check_ok(json!({"ok": 1})).is_ok());
        assert!(check_ok(json!({"ok": 1.0})).is_ok());
        assert!(check_ok(json!({"ok": true})).is_ok());

        let err = check_ok(json!({"ok": 0, "errmsg": "no such command", "code": 59})).unwrap_err();
        assert!(matches!(err, Error::Command { code: 59, ref message } if message == "no such command"));

        assert!(check_ok(json!({})).is_err());
    }

    #[tokio::test]
    async fn test_command_round_trip() {
        let (mut conn, mut server) = connected_pair().await;

        let server_task = tokio::spawn(async move {
            let request = read_request(&mut server).await;
            assert_eq!(request.command_name(), Some("ping"));
            let reply = Message::reply(1, request.request_id, json!({"ok": 1}));
            server
                .write_all(&encode_message(&reply).unwrap())
                .await
                .unwrap();
            server
        });

        let reply = conn.command(json!({"ping": 1})).await.unwrap();
        assert_eq!(reply["ok"], json!(1));
        assert!(!conn.is_broken());
        drop(server_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_command_times_out() {
        let (conn, _server) = connected_pair().await;
        let mut conn = conn.with_op_timeout(Some(Duration::from_millis(20)));

        let err = conn.command(json!({"ping": 1})).await.unwrap_err();
        assert!(matches!(err, Error::OperationTimeout { .. }));
        assert!(conn.is_broken());
    }

    #[tokio::test]
    async fn test_peer_close_is_connection_failure() {
        let (mut conn, server) = connected_pair().await;
        drop(server);

        let err = conn.command(json!({"ping": 1})).await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(conn.is_broken());
    }

    #[tokio::test]
    async fn test_mismatched_response_to() {
        let (mut conn, mut server) = connected_pair().await;

        tokio::spawn(async move {
            let request = read_request(&mut server).await;
            let reply = Message::reply(1, request.request_id + 1000, json!({"ok": 1}));
            server
                .write_all(&encode_message(&reply).unwrap())
                .await
                .unwrap();
            server
        });

        let err = conn.command(json!({"ping": 1})).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_command_name() {
        assert_eq!(command_name(&json!({"isMaster": 1})), "isMaster");
        assert_eq!(command_name(&json!([])), "<unknown>");
    }
}
