//! The broker: accepts WebSocket peers and runs one session per connection.
//!
//! Each connection gets a pump thread that owns the socket and realizes
//! the reader/writer/dispatcher roles: block on the socket for a short
//! poll interval, dispatch anything that arrived, then drain the session's
//! outbox to the wire. Broadcasts from other sessions land in the outbox
//! and ride out on the next drain.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender, TryRecvError};
use std::thread;

use log::{error, info, warn};

use crate::emitter::{Emitter, OUTBOX_CAPACITY};
use crate::error::NetError;
use crate::framing;
use crate::protocol::Message;
use crate::session::Session;
use crate::state::{BrokerState, SharedState};

/// The broker server: one listener, one shared state, N sessions.
pub struct Broker {
    listener: TcpListener,
    state: SharedState,
    next_session: AtomicU64,
}

impl Broker {
    /// Bind the broker to an address with a fresh, empty directory.
    pub fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!("broker listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            state: BrokerState::shared(),
            next_session: AtomicU64::new(0),
        })
    }

    /// Handle to the shared state, for administrative operations and
    /// status snapshots.
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one session thread per peer.
    pub fn run(self) -> io::Result<()> {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let id = self.next_session.fetch_add(1, Ordering::Relaxed);
                    let state = self.state.clone();
                    thread::spawn(move || session_thread(id, state, stream));
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
        Ok(())
    }
}

/// Own one peer connection from handshake to teardown.
fn session_thread(id: u64, state: SharedState, stream: TcpStream) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".into());

    let mut ws = match framing::accept_broker(stream) {
        Ok(ws) => ws,
        Err(e) => {
            warn!("session {}: handshake with {} failed: {}", id, peer, e);
            return;
        }
    };
    info!("session {}: peer {} connected", id, peer);

    let (out_tx, out_rx) = mpsc::sync_channel(OUTBOX_CAPACITY);
    let (reply_tx, reply_rx) = mpsc::channel();
    let mut session = Session::new(id, state, Emitter::new(out_tx, reply_rx));

    match pump(&mut ws, &mut session, &out_rx, &reply_tx) {
        Err(NetError::ConnectionLost) => info!("session {}: peer {} disconnected", id, peer),
        Err(e) => warn!("session {}: lost connection ({})", id, e),
        Ok(()) => {}
    }

    session.close();
    let _ = ws.close(None);
}

/// The per-connection loop: read with timeout, dispatch, drain outbox.
fn pump(
    ws: &mut tungstenite::WebSocket<TcpStream>,
    session: &mut Session,
    out_rx: &mpsc::Receiver<Message>,
    reply_tx: &Sender<Message>,
) -> Result<(), NetError> {
    loop {
        match framing::read_message(ws)? {
            Some(msg) if msg.reply => {
                // Correlated reply to a broker-side RPC turn; nothing in
                // the core issues those, but the queue keeps the protocol
                // symmetric.
                let _ = reply_tx.send(msg);
            }
            Some(msg) => session.handle_request(msg)?,
            None => {}
        }
        loop {
            match out_rx.try_recv() {
                Ok(msg) => framing::send_message(ws, &msg)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Err(NetError::ConnectionLost),
            }
        }
    }
}
