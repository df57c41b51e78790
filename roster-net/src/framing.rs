//! WebSocket framing for protocol messages.
//!
//! Wire format: one JSON-encoded `Message` per text frame, on the HTTP
//! path `/broker`. Binary and control frames are not part of the protocol;
//! pings are answered by the WebSocket layer and otherwise skipped.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message as WsMessage, WebSocket};

use crate::error::NetError;
use crate::protocol::Message;

/// The only HTTP path the broker serves WebSocket upgrades on.
pub const BROKER_PATH: &str = "/broker";

/// How long a connection pump blocks on the socket before draining its
/// outbox.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Accept a broker connection: WebSocket handshake restricted to
/// [`BROKER_PATH`], then a read timeout so the session pump can poll.
pub fn accept_broker(stream: TcpStream) -> Result<WebSocket<TcpStream>, NetError> {
    let ws = tungstenite::accept_hdr(stream, |req: &Request, resp: Response| {
        if req.uri().path() == BROKER_PATH {
            Ok(resp)
        } else {
            let mut not_found = ErrorResponse::new(Some("resource unavailable".into()));
            *not_found.status_mut() = tungstenite::http::StatusCode::NOT_FOUND;
            Err(not_found)
        }
    })
    .map_err(|e| match e {
        tungstenite::handshake::HandshakeError::Failure(e) => NetError::from(e),
        tungstenite::handshake::HandshakeError::Interrupted(_) => NetError::ConnectionLost,
    })?;
    ws.get_ref().set_read_timeout(Some(POLL_INTERVAL))?;
    Ok(ws)
}

/// Dial a broker at `host:port`. `secure` selects `wss` (requires a TLS
/// feature on the websocket stack; plaintext `ws` otherwise).
pub fn connect_broker(
    addr: &str,
    secure: bool,
) -> Result<WebSocket<MaybeTlsStream<TcpStream>>, NetError> {
    let proto = if secure { "wss" } else { "ws" };
    if !secure {
        log::warn!("connecting to plaintext websocket at {}", addr);
    }
    let (ws, _resp) = tungstenite::connect(format!("{}://{}{}", proto, addr, BROKER_PATH))?;
    if let MaybeTlsStream::Plain(stream) = ws.get_ref() {
        stream.set_read_timeout(Some(POLL_INTERVAL))?;
    }
    Ok(ws)
}

/// Send one protocol message as a text frame (writes and flushes).
pub fn send_message<S: Read + Write>(
    ws: &mut WebSocket<S>,
    msg: &Message,
) -> Result<(), NetError> {
    let json = serde_json::to_string(msg)?;
    ws.send(WsMessage::Text(json)).map_err(classify)
}

/// Read the next protocol message.
///
/// Returns `Ok(None)` when the socket's read timeout elapsed with nothing
/// to read (the pump's cue to drain its outbox), `Err(ConnectionLost)` on
/// close, and skips non-text frames.
pub fn read_message<S: Read + Write>(
    ws: &mut WebSocket<S>,
) -> Result<Option<Message>, NetError> {
    loop {
        match ws.read() {
            Ok(WsMessage::Text(json)) => {
                return Ok(Some(serde_json::from_str(&json)?));
            }
            Ok(WsMessage::Close(_)) => return Err(NetError::ConnectionLost),
            Ok(_) => continue,
            Err(tungstenite::Error::Io(e))
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
            {
                return Ok(None);
            }
            Err(e) => return Err(classify(e)),
        }
    }
}

/// Fold the websocket layer's closed-connection errors into
/// `ConnectionLost` so callers branch on one value.
fn classify(e: tungstenite::Error) -> NetError {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            NetError::ConnectionLost
        }
        tungstenite::Error::Io(ref io)
            if io.kind() == ErrorKind::UnexpectedEof
                || io.kind() == ErrorKind::ConnectionReset
                || io.kind() == ErrorKind::BrokenPipe =>
        {
            NetError::ConnectionLost
        }
        other => NetError::from(other),
    }
}
