//! Transport seam between a network endpoint and the wire.
//!
//! The endpoint never blocks on I/O: it calls [`Transport::poll`] once per
//! tick and reacts to whatever [`TransportEvent`]s come back.
//!
//! | Implementation            | Use                                   |
//! |---------------------------|---------------------------------------|
//! | [`tcp::TcpClientTransport`] | one outbound TCP connection         |
//! | [`tcp::TcpServerTransport`] | one listening socket, one peer      |
//! | [`memory::pair`]            | in-process client/server link       |

pub mod frame;
pub mod memory;
pub mod tcp;

use crate::protocol::RemoteCall;
use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Something that happened on the wire since the last poll.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection established (client) or peer accepted (server), with
    /// the remote address when the transport knows it.
    Connected(Option<SocketAddr>),
    /// The connection attempt could not be completed.
    ConnectFailed(String),
    /// A remote call arrived from the peer.
    Received(RemoteCall),
    /// An established connection was lost or closed by the peer.  A
    /// server transport keeps listening afterwards.
    Closed(String),
}

pub trait Transport {
    /// Start connecting (client) or listening (server).  The outcome is
    /// reported by a later [`poll`](Transport::poll).
    fn open(&mut self) -> Result<(), TransportError>;

    /// Queue `call` for the peer.  Best effort: no retry, no ack.
    fn send(&mut self, call: &RemoteCall) -> Result<(), TransportError>;

    /// One bounded, non-blocking I/O step.
    fn poll(&mut self) -> Vec<TransportEvent>;

    /// Stop the transport and drop any connection.  A server transport
    /// also stops listening.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn send(&mut self, call: &RemoteCall) -> Result<(), TransportError> {
        (**self).send(call)
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        (**self).poll()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
