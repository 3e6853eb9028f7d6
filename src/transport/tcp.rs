//! Non-blocking TCP transports over `mio` sockets.
//!
//! No call here ever waits on the network: connecting, accepting, reading
//! and writing all return at once and report progress through `poll`.
//!
//! | Side   | `open`                              | `poll`                                          |
//! |--------|-------------------------------------|-------------------------------------------------|
//! | client | starts a non-blocking connect       | settles the connect, then flushes and reads     |
//! | server | binds the listening socket          | accepts one peer, then flushes and reads        |
//!
//! The server keeps listening after its peer goes away, so the next
//! client can be accepted without reopening.

use super::frame::{self, FrameDecoder};
use super::{Transport, TransportError, TransportEvent};
use crate::protocol::RemoteCall;
use bytes::{Buf, BytesMut};
use log::{debug, warn};
use mio::net::{TcpListener, TcpStream};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::time::{Duration, Instant};

/// Upper bound on socket reads per poll, so one chatty peer cannot stall a tick.
const MAX_READS_PER_POLL: usize = 64;

const READ_CHUNK: usize = 4096;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Connection (shared by both sides)
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    decoder: FrameDecoder,
    outgoing: BytesMut,
}

impl Connection {
    fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            decoder: FrameDecoder::new(),
            outgoing: BytesMut::new(),
        })
    }

    fn queue(&mut self, call: &RemoteCall) -> Result<(), TransportError> {
        let bytes = frame::encode(call)?;
        self.outgoing.extend_from_slice(&bytes);
        self.flush()
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        while !self.outgoing.is_empty() {
            match self.stream.write(&self.outgoing) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "peer closed").into());
                }
                Ok(n) => self.outgoing.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Read what is available.  `Err` carries the reason the connection is
    /// no longer usable.
    fn receive(&mut self, out: &mut Vec<TransportEvent>) -> Result<(), String> {
        let mut chunk = [0u8; READ_CHUNK];
        for _ in 0..MAX_READS_PER_POLL {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err("peer closed the connection".into()),
                Ok(n) => self.decoder.extend(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(format!("read error: {}", e)),
            }
        }
        loop {
            match self.decoder.next_call() {
                Ok(Some(call)) => out.push(TransportEvent::Received(call)),
                Ok(None) => return Ok(()),
                Err(e) => return Err(e.to_string()),
            }
        }
    }

    /// Flush then read; on failure the connection is reported closed.
    fn step(&mut self, out: &mut Vec<TransportEvent>) -> bool {
        if let Err(e) = self.flush() {
            out.push(TransportEvent::Closed(e.to_string()));
            return false;
        }
        if let Err(reason) = self.receive(out) {
            out.push(TransportEvent::Closed(reason));
            return false;
        }
        true
    }

    fn shutdown(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Outcome of a non-blocking connect so far: `Ok(None)` while the
/// handshake is still in flight.
fn connect_progress(stream: &TcpStream) -> io::Result<Option<SocketAddr>> {
    if let Some(e) = stream.take_error()? {
        return Err(e);
    }
    match stream.peer_addr() {
        Ok(addr) => Ok(Some(addr)),
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(None),
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum ClientState {
    Idle,
    Connecting { stream: TcpStream, started: Instant },
    Connected(Connection),
}

/// One outbound connection to a server.
#[derive(Debug)]
pub struct TcpClientTransport {
    addr: SocketAddr,
    connect_timeout: Duration,
    state: ClientState,
    pending: VecDeque<TransportEvent>,
}

impl TcpClientTransport {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            state: ClientState::Idle,
            pending: VecDeque::new(),
        }
    }

    /// Give up on a connect that has not completed after `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self.state, ClientState::Connecting { .. })
    }

    fn settle_connect(
        &mut self,
        stream: TcpStream,
        started: Instant,
        out: &mut Vec<TransportEvent>,
    ) {
        match connect_progress(&stream) {
            Ok(Some(peer)) => match Connection::new(stream) {
                Ok(conn) => {
                    debug!("tcp connected to {}", peer);
                    self.state = ClientState::Connected(conn);
                    out.push(TransportEvent::Connected(Some(peer)));
                }
                Err(e) => {
                    out.push(TransportEvent::ConnectFailed(format!("{}: {}", self.addr, e)));
                }
            },
            Ok(None) if started.elapsed() >= self.connect_timeout => {
                out.push(TransportEvent::ConnectFailed(format!(
                    "{}: connect timed out after {:?}",
                    self.addr, self.connect_timeout
                )));
            }
            Ok(None) => self.state = ClientState::Connecting { stream, started },
            Err(e) => {
                out.push(TransportEvent::ConnectFailed(format!("{}: {}", self.addr, e)));
            }
        }
    }
}

impl Transport for TcpClientTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.close();
        match TcpStream::connect(self.addr) {
            Ok(stream) => {
                debug!("tcp connect to {} started", self.addr);
                self.state = ClientState::Connecting {
                    stream,
                    started: Instant::now(),
                };
            }
            Err(e) => {
                self.pending
                    .push_back(TransportEvent::ConnectFailed(format!("{}: {}", self.addr, e)));
            }
        }
        Ok(())
    }

    fn send(&mut self, call: &RemoteCall) -> Result<(), TransportError> {
        match &mut self.state {
            ClientState::Connected(conn) => conn.queue(call),
            _ => Err(TransportError::NotConnected),
        }
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut out: Vec<TransportEvent> = self.pending.drain(..).collect();
        match std::mem::replace(&mut self.state, ClientState::Idle) {
            ClientState::Idle => {}
            ClientState::Connecting { stream, started } => {
                self.settle_connect(stream, started, &mut out)
            }
            ClientState::Connected(mut conn) => {
                if conn.step(&mut out) {
                    self.state = ClientState::Connected(conn);
                }
            }
        }
        out
    }

    fn close(&mut self) {
        match std::mem::replace(&mut self.state, ClientState::Idle) {
            ClientState::Connected(conn) => conn.shutdown(),
            ClientState::Connecting { stream, .. } => {
                let _ = stream.shutdown(Shutdown::Both);
            }
            ClientState::Idle => {}
        }
        self.pending.clear();
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A listening socket serving at most one peer at a time.
#[derive(Debug)]
pub struct TcpServerTransport {
    addr: SocketAddr,
    listener: Option<TcpListener>,
    peer: Option<Connection>,
}

impl TcpServerTransport {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            listener: None,
            peer: None,
        }
    }

    /// Address actually bound (differs from the configured one for port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    fn accept(&mut self, out: &mut Vec<TransportEvent>) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if self.peer.is_some() {
                        warn!("refusing second peer {}", addr);
                        let _ = stream.shutdown(Shutdown::Both);
                        continue;
                    }
                    match Connection::new(stream) {
                        Ok(conn) => {
                            debug!("accepted peer {}", addr);
                            self.peer = Some(conn);
                            out.push(TransportEvent::Connected(Some(addr)));
                        }
                        Err(e) => warn!("unable to configure socket for {}: {}", addr, e),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    break;
                }
            }
        }
    }
}

impl Transport for TcpServerTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let listener = TcpListener::bind(self.addr)?;
        debug!("listening on {}", listener.local_addr()?);
        self.listener = Some(listener);
        Ok(())
    }

    fn send(&mut self, call: &RemoteCall) -> Result<(), TransportError> {
        let conn = self.peer.as_mut().ok_or(TransportError::NotConnected)?;
        conn.queue(call)
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        self.accept(&mut out);
        if let Some(conn) = self.peer.as_mut() {
            if !conn.step(&mut out) {
                self.peer = None;
            }
        }
        out
    }

    fn close(&mut self) {
        if let Some(conn) = self.peer.take() {
            conn.shutdown();
        }
        self.listener = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CopyEvent, ReceiverHandle};
    use std::thread;

    fn poll_until(
        transport: &mut impl Transport,
        mut done: impl FnMut(&TransportEvent) -> bool,
    ) -> Vec<TransportEvent> {
        let mut seen = Vec::new();
        for _ in 0..500 {
            let batch = transport.poll();
            let finished = batch.iter().any(&mut done);
            seen.extend(batch);
            if finished {
                return seen;
            }
            thread::sleep(Duration::from_millis(2));
        }
        seen
    }

    fn listening_server() -> (TcpServerTransport, SocketAddr) {
        let mut server = TcpServerTransport::new("127.0.0.1:0".parse().expect("addr"));
        server.open().expect("bind");
        let addr = server.local_addr().expect("bound");
        (server, addr)
    }

    #[test]
    fn open_returns_before_the_connect_completes() {
        let (mut server, addr) = listening_server();
        let mut client = TcpClientTransport::new(addr);
        client.open().expect("open");

        // Nothing is reported until the client is polled.
        assert!(client.is_connecting());
        assert!(matches!(
            client.send(&RemoteCall::SendEvent(CopyEvent::ProgramQuit)),
            Err(TransportError::NotConnected)
        ));

        let seen = poll_until(&mut client, |e| matches!(e, TransportEvent::Connected(_)));
        assert_eq!(seen, vec![TransportEvent::Connected(Some(addr))]);
        let accepted = poll_until(&mut server, |e| matches!(e, TransportEvent::Connected(_)));
        assert!(matches!(accepted[..], [TransportEvent::Connected(Some(_))]));
    }

    #[test]
    fn refused_connect_is_reported_by_poll() {
        let addr = {
            let (_server, addr) = listening_server();
            addr
        };
        let mut client = TcpClientTransport::new(addr);
        client.open().expect("open does not fail on refusal");
        let seen = poll_until(&mut client, |e| matches!(e, TransportEvent::ConnectFailed(_)));
        assert!(
            matches!(seen.last(), Some(TransportEvent::ConnectFailed(_))),
            "saw {:?}",
            seen
        );
        assert!(!client.is_connecting());
    }

    #[test]
    fn server_keeps_listening_after_its_peer_leaves() {
        let (mut server, addr) = listening_server();

        let mut first = TcpClientTransport::new(addr);
        first.open().expect("open");
        poll_until(&mut first, |e| matches!(e, TransportEvent::Connected(_)));
        poll_until(&mut server, |e| matches!(e, TransportEvent::Connected(_)));
        first.close();
        let lost = poll_until(&mut server, |e| matches!(e, TransportEvent::Closed(_)));
        assert!(matches!(lost.last(), Some(TransportEvent::Closed(_))));
        assert!(server.is_listening());

        let mut second = TcpClientTransport::new(addr);
        second.open().expect("open");
        poll_until(&mut second, |e| matches!(e, TransportEvent::Connected(_)));
        second
            .send(&RemoteCall::Announce(ReceiverHandle("second".into())))
            .expect("send");
        let seen = poll_until(&mut server, |e| matches!(e, TransportEvent::Received(_)));
        assert!(seen.contains(&TransportEvent::Received(RemoteCall::Announce(
            ReceiverHandle("second".into())
        ))));
    }
}
