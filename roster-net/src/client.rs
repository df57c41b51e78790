//! The instance: dials a broker, mirrors its directory, exposes RPC ops.
//!
//! A pump thread owns the WebSocket. Inbound replies to the session
//! operations (types 0..=6) go to the single outstanding RPC waiter;
//! everything else is a replication event applied to the local mirror.
//! RPC operations take `&mut self`, which serializes turns on the
//! connection as the positional correlation requires.

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use log::{error, info};

use roster_types::Directory;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::WebSocket;

use crate::emitter::{Emitter, OUTBOX_CAPACITY};
use crate::error::NetError;
use crate::framing;
use crate::protocol::{Message, MessageType};

/// A connected instance with a passive replica of the broker's directory.
pub struct Instance {
    emitter: Option<Emitter>,
    mirror: Arc<Mutex<Directory>>,
    failed: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl Instance {
    /// Dial a broker at `host:port` and start the connection pump.
    pub fn connect(addr: &str, secure: bool) -> Result<Self, NetError> {
        let ws = framing::connect_broker(addr, secure)?;
        info!("instance connected to {}", addr);

        let (out_tx, out_rx) = mpsc::sync_channel(OUTBOX_CAPACITY);
        let (reply_tx, reply_rx) = mpsc::channel();
        let mirror = Arc::new(Mutex::new(Directory::new()));
        let failed = Arc::new(AtomicBool::new(false));

        let pump = {
            let mirror = mirror.clone();
            let failed = failed.clone();
            thread::spawn(move || instance_pump(ws, out_rx, reply_tx, mirror, failed))
        };

        Ok(Self {
            emitter: Some(Emitter::new(out_tx, reply_rx)),
            mirror,
            failed,
            pump: Some(pump),
        })
    }

    /// The local directory mirror. Updated by the pump as events arrive.
    pub fn directory(&self) -> MutexGuard<'_, Directory> {
        self.mirror.lock().unwrap()
    }

    /// True once the connection or the replica is beyond recovery.
    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    // ── Session operations ──────────────────────────────────────────

    pub fn login(&mut self, username: &str, password: &str) -> Result<(), NetError> {
        self.request(
            Message::new(MessageType::Login)
                .with("username", username)
                .with("password", password),
        )
        .map(|_| ())
    }

    pub fn auth(&mut self, token: &str) -> Result<(), NetError> {
        self.request(Message::new(MessageType::Auth).with("token", token))
            .map(|_| ())
    }

    pub fn logoff(&mut self) -> Result<(), NetError> {
        self.request(Message::new(MessageType::Logoff)).map(|_| ())
    }

    pub fn deauth(&mut self) -> Result<(), NetError> {
        self.request(Message::new(MessageType::Deauth)).map(|_| ())
    }

    pub fn identify(&mut self, hostname: &str) -> Result<(), NetError> {
        self.request(Message::new(MessageType::Identify).with("hostname", hostname))
            .map(|_| ())
    }

    /// Mint a fresh auth token for the logged-in user.
    pub fn new_auth_token(&mut self) -> Result<String, NetError> {
        self.request(Message::new(MessageType::NewAuthToken))
            .map(|reply| reply.get("token").to_string())
    }

    pub fn delete_auth_token(&mut self, token: &str) -> Result<(), NetError> {
        self.request(Message::new(MessageType::DeleteAuthToken).with("token", token))
            .map(|_| ())
    }

    /// One RPC turn. A `Success=false` reply becomes `Rejected` with the
    /// broker's message string.
    fn request(&mut self, msg: Message) -> Result<Message, NetError> {
        let emitter = self.emitter.as_mut().ok_or(NetError::ConnectionLost)?;
        let reply = emitter.execute(msg)?;
        if reply.success {
            Ok(reply)
        } else {
            Err(NetError::Rejected(reply.get("message").to_string()))
        }
    }

    /// Close the connection and wait for the pump to wind down.
    pub fn disconnect(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the emitter closes the outbox; the pump sees that on
        // its next drain, closes the socket, and exits.
        self.emitter.take();
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The client-side connection loop: read, dispatch, drain outbox.
fn instance_pump(
    mut ws: WebSocket<MaybeTlsStream<TcpStream>>,
    out_rx: Receiver<Message>,
    reply_tx: Sender<Message>,
    mirror: Arc<Mutex<Directory>>,
    failed: Arc<AtomicBool>,
) {
    loop {
        match framing::read_message(&mut ws) {
            Ok(Some(msg)) => {
                if msg.reply && !msg.kind.is_event() {
                    // Reply to the single outstanding request.
                    let _ = reply_tx.send(msg);
                } else {
                    let mut dir = mirror.lock().unwrap();
                    if let Err(e) = crate::replica::apply_event(&mut dir, &msg) {
                        error!("instance: {}", e);
                        failed.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
            Ok(None) => {}
            Err(NetError::ConnectionLost) => {
                info!("instance: connection closed by broker");
                failed.store(true, Ordering::SeqCst);
                break;
            }
            Err(e) => {
                error!("instance: read failed: {}", e);
                failed.store(true, Ordering::SeqCst);
                break;
            }
        }

        let mut done = false;
        loop {
            match out_rx.try_recv() {
                Ok(msg) => {
                    if let Err(e) = framing::send_message(&mut ws, &msg) {
                        error!("instance: send failed: {}", e);
                        failed.store(true, Ordering::SeqCst);
                        done = true;
                        break;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // The instance was dropped: clean shutdown.
                    done = true;
                    break;
                }
            }
        }
        if done {
            break;
        }
    }
    let _ = ws.close(None);
    // reply_tx drops here, releasing any blocked `receive` with
    // connection-lost.
}
