//! In-process transport pair.
//!
//! Both ends share one link; calls still go through the frame codec so the
//! serialised form is exercised exactly as on TCP.  Single-threaded only.
//!
//! Like the TCP server, the server end keeps listening when its client
//! closes, and a re-opened client end attaches again.

use super::frame::{self, FrameDecoder};
use super::{Transport, TransportError, TransportEvent};
use crate::protocol::RemoteCall;
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Client,
    Server,
}

#[derive(Debug, Default)]
struct Link {
    to_client: VecDeque<Bytes>,
    to_server: VecDeque<Bytes>,
    listening: bool,
    client_attached: bool,
    closed_by: Option<&'static str>,
}

#[derive(Debug)]
pub struct MemoryTransport {
    side: Side,
    link: Rc<RefCell<Link>>,
    pending: VecDeque<TransportEvent>,
    connected: bool,
    decoder: FrameDecoder,
}

/// Create a connected `(client, server)` pair.  The server end must be
/// opened before the client end can connect.
pub fn pair() -> (MemoryTransport, MemoryTransport) {
    let link = Rc::new(RefCell::new(Link::default()));
    (
        MemoryTransport::new(Side::Client, link.clone()),
        MemoryTransport::new(Side::Server, link),
    )
}

impl MemoryTransport {
    fn new(side: Side, link: Rc<RefCell<Link>>) -> Self {
        Self {
            side,
            link,
            pending: VecDeque::new(),
            connected: false,
            decoder: FrameDecoder::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let mut link = self.link.borrow_mut();
        match self.side {
            Side::Server => {
                link.listening = true;
                link.closed_by = None;
            }
            Side::Client => {
                if link.listening {
                    link.client_attached = true;
                    link.closed_by = None;
                    self.connected = true;
                    self.pending.push_back(TransportEvent::Connected(None));
                } else {
                    self.pending
                        .push_back(TransportEvent::ConnectFailed("connection refused".into()));
                }
            }
        }
        Ok(())
    }

    fn send(&mut self, call: &RemoteCall) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let bytes = frame::encode(call)?;
        let mut link = self.link.borrow_mut();
        match self.side {
            Side::Client => link.to_server.push_back(bytes),
            Side::Server => link.to_client.push_back(bytes),
        }
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut out: Vec<TransportEvent> = self.pending.drain(..).collect();
        let mut link = self.link.borrow_mut();

        if self.side == Side::Server
            && !self.connected
            && link.listening
            && link.client_attached
            && link.closed_by.is_none()
        {
            self.connected = true;
            out.push(TransportEvent::Connected(None));
        }
        if !self.connected {
            return out;
        }

        let inbox = match self.side {
            Side::Client => &mut link.to_client,
            Side::Server => &mut link.to_server,
        };
        for bytes in inbox.drain(..) {
            self.decoder.extend(&bytes);
        }
        loop {
            match self.decoder.next_call() {
                Ok(Some(call)) => out.push(TransportEvent::Received(call)),
                Ok(None) => break,
                Err(e) => {
                    out.push(TransportEvent::Closed(e.to_string()));
                    self.connected = false;
                    return out;
                }
            }
        }

        if let Some(who) = link.closed_by {
            out.push(TransportEvent::Closed(format!("closed by {}", who)));
            self.connected = false;
        }
        out
    }

    fn close(&mut self) {
        let mut link = self.link.borrow_mut();
        if self.connected || link.client_attached {
            link.closed_by = Some(match self.side {
                Side::Client => "client",
                Side::Server => "server",
            });
        }
        if self.side == Side::Server {
            link.listening = false;
        }
        link.client_attached = false;
        self.connected = false;
        self.pending.clear();
    }
}
