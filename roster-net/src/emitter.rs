//! Per-connection duplex message conduit with request/reply correlation.
//!
//! An `Emitter` pairs the connection's outbox (application → wire) with its
//! reply queue (wire → application). Correlation is positional: the
//! protocol has no request id, so at most one request may be outstanding
//! per emitter. `execute` takes `&mut self`, which enforces that rule at
//! compile time.

use std::sync::mpsc::{Receiver, SyncSender, TrySendError};

use crate::error::NetError;
use crate::protocol::Message;

/// Bound on a connection's outbox. Broadcasts to a full outbox are dropped
/// rather than blocking the mutator.
pub const OUTBOX_CAPACITY: usize = 1024;

/// The application side of one connection's queue pair.
pub struct Emitter {
    outbox: SyncSender<Message>,
    replies: Receiver<Message>,
}

impl Emitter {
    /// Bind an emitter over an outbox sender and a reply receiver. The
    /// connection pump owns the other end of both queues.
    pub fn new(outbox: SyncSender<Message>, replies: Receiver<Message>) -> Self {
        Self { outbox, replies }
    }

    /// Enqueue a message for the wire writer. Never blocks: a full or
    /// closed outbox means the connection is not keeping up or is gone,
    /// and either way this emitter is done.
    pub fn send(&self, msg: Message) -> Result<(), NetError> {
        self.outbox.try_send(msg).map_err(|_| NetError::ConnectionLost)
    }

    /// Block until the next correlated reply arrives. Surfaces
    /// `ConnectionLost` once the pump closes the reply queue.
    pub fn receive(&self) -> Result<Message, NetError> {
        self.replies.recv().map_err(|_| NetError::ConnectionLost)
    }

    /// One RPC turn: send the request, wait for its reply. `&mut self`
    /// serializes turns on this emitter.
    pub fn execute(&mut self, msg: Message) -> Result<Message, NetError> {
        self.send(msg)?;
        self.receive()
    }

    /// A cloneable sender-side handle, used to bind this connection's
    /// outbox to an endpoint for broadcast fan-out.
    pub fn handle(&self) -> EmitterHandle {
        EmitterHandle {
            outbox: self.outbox.clone(),
        }
    }
}

/// Sender-side handle to a connection's outbox.
#[derive(Clone)]
pub struct EmitterHandle {
    outbox: SyncSender<Message>,
}

impl EmitterHandle {
    /// Best-effort send for broadcast fan-out. Distinguishes a full outbox
    /// (recipient stalled, message droppable) from a closed one
    /// (recipient gone).
    pub fn send(&self, msg: Message) -> Result<(), TrySendError<Message>> {
        self.outbox.try_send(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageType;
    use std::sync::mpsc;

    #[test]
    fn execute_pairs_requests_with_replies_in_order() {
        let (out_tx, out_rx) = mpsc::sync_channel(OUTBOX_CAPACITY);
        let (reply_tx, reply_rx) = mpsc::channel();
        let mut emitter = Emitter::new(out_tx, reply_rx);

        // Fake pump: answer each request with a reply echoing a counter.
        let pump = std::thread::spawn(move || {
            for i in 0..3 {
                let req: Message = out_rx.recv().unwrap();
                let mut reply = req.clone();
                reply.reply = true;
                reply.set("seq", &i.to_string());
                reply_tx.send(reply).unwrap();
            }
        });

        for i in 0..3 {
            let reply = emitter.execute(Message::new(MessageType::Logoff)).unwrap();
            assert!(reply.reply);
            assert_eq!(reply.get("seq"), i.to_string());
        }
        pump.join().unwrap();
    }

    #[test]
    fn receive_surfaces_connection_lost_on_close() {
        let (out_tx, _out_rx) = mpsc::sync_channel(1);
        let (reply_tx, reply_rx) = mpsc::channel::<Message>();
        let emitter = Emitter::new(out_tx, reply_rx);
        drop(reply_tx);
        assert!(matches!(emitter.receive(), Err(NetError::ConnectionLost)));
    }

    #[test]
    fn handle_reports_full_outbox() {
        let (out_tx, _out_rx) = mpsc::sync_channel(1);
        let (_reply_tx, reply_rx) = mpsc::channel();
        let emitter = Emitter::new(out_tx, reply_rx);
        let handle = emitter.handle();
        handle.send(Message::event(MessageType::EventNewUser)).unwrap();
        assert!(matches!(
            handle.send(Message::event(MessageType::EventNewUser)),
            Err(TrySendError::Full(_))
        ));
    }
}
