#![allow(dead_code)]
//! Test harness utilities for roster-net integration tests.

use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message as WsMessage, WebSocket};

use roster_net::{Broker, SharedState};

/// Start a broker on an ephemeral port. Returns its address and a handle
/// to the shared state for seeding and assertions.
pub fn start_broker() -> (String, SharedState) {
    let broker = Broker::bind("127.0.0.1:0").unwrap();
    let addr = broker.local_addr().unwrap().to_string();
    let state = broker.state();
    thread::spawn(move || broker.run());
    (addr, state)
}

/// Create a user with a password on the broker.
pub fn seed_user(state: &SharedState, name: &str, password: &str) {
    let mut state = state.lock().unwrap();
    state.new_user(name).unwrap();
    state.set_password(name, password).unwrap();
}

/// Poll until `cond` holds or the timeout elapses. Returns whether it held.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while Instant::now().duration_since(start) < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// A raw WebSocket client for protocol-level tests: sends literal JSON,
/// reads raw frames, no replica or correlation layer in the way.
pub struct RawClient {
    ws: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl RawClient {
    pub fn connect(addr: &str) -> Self {
        let (ws, _resp) = tungstenite::connect(format!("ws://{}/broker", addr)).unwrap();
        if let MaybeTlsStream::Plain(stream) = ws.get_ref() {
            stream
                .set_read_timeout(Some(Duration::from_millis(200)))
                .unwrap();
        }
        Self { ws }
    }

    pub fn send_json(&mut self, json: &str) {
        self.ws.send(WsMessage::Text(json.to_string())).unwrap();
    }

    /// Read the next text frame as JSON, or `None` if the read window
    /// passes with nothing arriving.
    pub fn recv_value(&mut self) -> Option<Value> {
        loop {
            match self.ws.read() {
                Ok(WsMessage::Text(json)) => return Some(serde_json::from_str(&json).unwrap()),
                Ok(WsMessage::Close(_)) => return None,
                Ok(_) => continue,
                Err(tungstenite::Error::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    return None
                }
                Err(e) => panic!("raw client read failed: {}", e),
            }
        }
    }

    /// Read frames until the reply to a request of `kind` shows up (event
    /// frames are collected, not skipped). Panics if it never arrives.
    pub fn recv_reply(&mut self, kind: u64) -> (Value, Vec<Value>) {
        let mut events = Vec::new();
        for _ in 0..50 {
            if let Some(value) = self.recv_value() {
                if value["Type"].as_u64() == Some(kind) {
                    return (value, events);
                }
                events.push(value);
            }
        }
        panic!("no reply of type {} arrived", kind);
    }

    /// Collect every frame that arrives inside the window.
    pub fn collect_frames(&mut self, window: Duration) -> Vec<Value> {
        let start = Instant::now();
        let mut frames = Vec::new();
        while Instant::now().duration_since(start) < window {
            if let Some(value) = self.recv_value() {
                frames.push(value);
            }
        }
        frames
    }

    /// Log in and drain the snapshot that follows the reply.
    pub fn login(&mut self, username: &str, password: &str) -> Value {
        self.send_json(&format!(
            r#"{{"Type":0,"Data":{{"username":"{}","password":"{}"}}}}"#,
            username, password
        ));
        let (reply, _events) = self.recv_reply(0);
        // Drain the snapshot burst.
        self.collect_frames(Duration::from_millis(250));
        reply
    }

    pub fn identify(&mut self, hostname: &str) -> Value {
        self.send_json(&format!(
            r#"{{"Type":4,"Data":{{"hostname":"{}"}}}}"#,
            hostname
        ));
        let (reply, _events) = self.recv_reply(4);
        reply
    }

    pub fn close(mut self) {
        let _ = self.ws.close(None);
    }
}
