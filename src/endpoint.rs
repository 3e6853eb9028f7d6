//! Network endpoint – mirrors allowed bus events to the remote peer.
//!
//! ## Connection state machine
//!
//! ```text
//!             tick                 success
//! Preparing ───────► Connecting ───────────► Connected
//!     ▲                  │   ▲                  │ quit / lost
//!     │ rearm()          │   └── peer lost ─────┤ (server)
//!     │                  │ failure              ▼
//!     └────────────── Disconnected ◄──── Disconnecting
//! ```
//!
//! A server that loses its peer goes back to `Connecting` and accepts the
//! next client on the same listener; only quit or a failed bind take it
//! down.  A client that loses the server ends `Disconnected`.
//!
//! | State                                     | On tick                        |
//! |-------------------------------------------|--------------------------------|
//! | `Preparing`                               | open the transport             |
//! | `Connecting`, `Connected`, `Disconnecting`| one non-blocking transport step|
//! | `Disconnected`                            | nothing (no automatic retry)   |
//!
//! ## Outbound rules
//!
//! A non-control event is forwarded only when all hold:
//! 1. its kind is flagged `send_over_network`,
//! 2. its copy kind is in the allow-list for this role's outbound direction,
//! 3. the copy registry has a converter for it,
//! 4. the endpoint is `Connected` with a live peer (server: the peer has
//!    announced its receiver).
//!
//! Anything else is dropped silently.  Delivery is at-most-once.

use crate::bus::EventBus;
use crate::copy::CopyRegistry;
use crate::event::{Event, Listener, ListenerError};
use crate::protocol::{AllowList, CopyEvent, CopyKind, NetDirection, ReceiverHandle, RemoteCall};
use crate::receiver::EventReceiver;
use crate::registry::ObjectRegistry;
use crate::transport::{Transport, TransportEvent};
use crate::types::ClientNumber;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// State + role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Preparing,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Preparing => "PREPARING",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnecting => "DISCONNECTING",
            ConnectionState::Disconnected => "DISCONNECTED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn outbound(&self) -> NetDirection {
        match self {
            Role::Client => NetDirection::ClientToServer,
            Role::Server => NetDirection::ServerToClient,
        }
    }

    pub fn inbound(&self) -> NetDirection {
        match self {
            Role::Client => NetDirection::ServerToClient,
            Role::Server => NetDirection::ClientToServer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote peer handle
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RemotePeer {
    /// Set on the server side only: which client this is.
    client_number: Option<ClientNumber>,
    addr: Option<SocketAddr>,
    calls: RefCell<VecDeque<RemoteCall>>,
    receiver: RefCell<Option<ReceiverHandle>>,
    alive: Cell<bool>,
}

/// Handle to the connected remote peer, carried by the connection events.
///
/// Calls made through it are queued and flushed by the owning endpoint on
/// its next transport step.  Once the connection goes away the handle is
/// dead and further calls are refused.
#[derive(Clone)]
pub struct PeerHandle(Rc<RemotePeer>);

impl PeerHandle {
    fn new(client_number: Option<ClientNumber>, addr: Option<SocketAddr>) -> Self {
        Self(Rc::new(RemotePeer {
            client_number,
            addr,
            calls: RefCell::new(VecDeque::new()),
            receiver: RefCell::new(None),
            alive: Cell::new(true),
        }))
    }

    /// Queue a remote call.  Returns `false` if the peer is gone.
    pub fn call_remote(&self, call: RemoteCall) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.0.calls.borrow_mut().push_back(call);
        true
    }

    pub fn is_alive(&self) -> bool {
        self.0.alive.get()
    }

    pub fn client_number(&self) -> Option<ClientNumber> {
        self.0.client_number
    }

    /// Remote socket address, when the transport reported one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.0.addr
    }

    /// The receiver the peer announced, if any.
    pub fn receiver(&self) -> Option<ReceiverHandle> {
        self.0.receiver.borrow().clone()
    }

    pub fn same_peer(&self, other: &PeerHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn take_calls(&self) -> Vec<RemoteCall> {
        self.0.calls.borrow_mut().drain(..).collect()
    }

    fn set_receiver(&self, handle: ReceiverHandle) {
        *self.0.receiver.borrow_mut() = Some(handle);
    }

    fn kill(&self) {
        self.0.alive.set(false);
        self.0.calls.borrow_mut().clear();
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle")
            .field("client_number", &self.0.client_number)
            .field("addr", &self.0.addr)
            .field("receiver", &self.0.receiver.borrow())
            .field("alive", &self.0.alive.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// NetworkEndpoint
// ---------------------------------------------------------------------------

/// One side of the client/server link, registered on the bus as a listener.
pub struct NetworkEndpoint<T: Transport> {
    role: Role,
    state: ConnectionState,
    transport: T,
    copies: CopyRegistry,
    allow: AllowList,
    objects: Rc<ObjectRegistry>,
    receiver: Option<Rc<RefCell<EventReceiver>>>,
    peer: Option<PeerHandle>,
    next_client: u32,
}

impl<T: Transport> NetworkEndpoint<T> {
    pub fn new(role: Role, transport: T, allow: AllowList, objects: Rc<ObjectRegistry>) -> Self {
        Self {
            role,
            state: ConnectionState::Preparing,
            transport,
            copies: CopyRegistry::with_defaults(),
            allow,
            objects,
            receiver: None,
            peer: None,
            next_client: 1,
        }
    }

    pub fn with_copies(mut self, copies: CopyRegistry) -> Self {
        self.copies = copies;
        self
    }

    /// Where inbound `SendEvent` / `DeliverEvent` calls are handed.
    pub fn with_receiver(mut self, receiver: Rc<RefCell<EventReceiver>>) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer(&self) -> Option<&PeerHandle> {
        self.peer.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    /// Re-arm a `Disconnected` endpoint so the next tick connects again.
    /// Returns `false` (and does nothing) in any other state.
    pub fn rearm(&mut self) -> bool {
        if self.state != ConnectionState::Disconnected {
            return false;
        }
        self.set_state(ConnectionState::Preparing);
        true
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            info!("{} endpoint: {} -> {}", self.role, self.state, next);
            self.state = next;
        }
    }

    fn attempt_connection(&mut self) {
        info!("{} endpoint: attempting connection...", self.role);
        self.set_state(ConnectionState::Connecting);
        if let Err(e) = self.transport.open() {
            warn!("{} endpoint: connection failed: {}", self.role, e);
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn disconnect(&mut self) {
        info!("{} endpoint: disconnecting...", self.role);
        self.set_state(ConnectionState::Disconnecting);
        self.transport.close();
        self.drop_peer();
        self.set_state(ConnectionState::Disconnected);
    }

    fn drop_peer(&mut self) {
        if let Some(peer) = self.peer.take() {
            peer.kill();
        }
    }

    /// One non-blocking transport step: flush queued peer calls, then react
    /// to whatever the transport reports.
    fn pump(&mut self, bus: &EventBus) {
        if let Some(peer) = self.peer.as_ref() {
            for call in peer.take_calls() {
                if let Err(e) = self.transport.send(&call) {
                    warn!("{} endpoint: {} not sent: {}", self.role, call.name(), e);
                }
            }
        }

        for event in self.transport.poll() {
            match event {
                TransportEvent::Connected(addr) => self.on_connected(addr, bus),
                TransportEvent::ConnectFailed(reason) => {
                    warn!("{} endpoint: connection failed: {}", self.role, reason);
                    self.set_state(ConnectionState::Disconnected);
                }
                TransportEvent::Received(call) => self.on_call(call, bus),
                TransportEvent::Closed(reason) => self.on_closed(&reason),
            }
        }
    }

    fn on_closed(&mut self, reason: &str) {
        if self.state != ConnectionState::Connected {
            return;
        }
        warn!("{} endpoint: connection lost: {}", self.role, reason);
        self.drop_peer();
        match self.role {
            Role::Server => {
                info!("server endpoint: accepting the next client");
                self.set_state(ConnectionState::Connecting);
            }
            Role::Client => {
                self.transport.close();
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    fn on_connected(&mut self, addr: Option<SocketAddr>, bus: &EventBus) {
        if self.state != ConnectionState::Connecting {
            debug!("{} endpoint: late connect ignored in {}", self.role, self.state);
            return;
        }
        info!("{} endpoint: ...connected!", self.role);
        self.set_state(ConnectionState::Connected);

        match self.role {
            Role::Client => {
                let peer = PeerHandle::new(None, addr);
                self.peer = Some(peer.clone());
                bus.post(Event::ServerConnected { peer });
            }
            Role::Server => {
                let client_number = ClientNumber(self.next_client);
                self.next_client = self.next_client.saturating_add(1);
                let peer = PeerHandle::new(Some(client_number), addr);
                self.peer = Some(peer.clone());
                bus.post(Event::ClientConnected { peer });
                bus.post(Event::NewClientConnected {
                    client_number,
                    client_ip: addr.map(|a| a.ip()),
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    fn on_call(&mut self, call: RemoteCall, bus: &EventBus) {
        let Some(peer) = self.peer.clone() else {
            debug!("{} endpoint: {} without a peer, dropped", self.role, call.name());
            return;
        };
        let copy = match (self.role, call) {
            (Role::Server, RemoteCall::Announce(handle)) => {
                debug!("server endpoint: peer announced receiver '{}'", handle.0);
                peer.set_receiver(handle);
                return;
            }
            (Role::Server, RemoteCall::SendEvent(copy)) => copy,
            (Role::Client, RemoteCall::DeliverEvent(copy)) => copy,
            (role, call) => {
                warn!("{} endpoint: unexpected remote call {}", role, call.name());
                return;
            }
        };
        if !self.allow.allows(self.role.inbound(), copy.kind()) {
            warn!("{} endpoint: {} not allowed inbound, dropped", self.role, copy.kind());
            return;
        }
        match self.receiver.as_ref() {
            Some(receiver) => match receiver.try_borrow_mut() {
                Ok(mut receiver) => receiver.receive(copy, peer.client_number(), bus),
                Err(_) => warn!("{} endpoint: receiver busy, {} dropped", self.role, copy.kind()),
            },
            None => debug!("{} endpoint: no receiver, {} dropped", self.role, copy.kind()),
        }
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    fn forward(&mut self, event: &Event) -> Result<(), ListenerError> {
        if !event.send_over_network() {
            return Ok(());
        }
        let Some(kind) = CopyKind::for_event(event.kind()) else {
            return Ok(());
        };
        if !self.allow.allows(self.role.outbound(), kind) {
            trace!("{} endpoint: {} not in allow-list", self.role, kind);
            return Ok(());
        }
        if self.state != ConnectionState::Connected {
            trace!("{} endpoint: {} dropped while {}", self.role, kind, self.state);
            return Ok(());
        }
        let Some(peer) = self.peer.as_ref().filter(|p| p.is_alive()) else {
            return Ok(());
        };
        if self.role == Role::Server && peer.receiver().is_none() {
            trace!("server endpoint: {} dropped, peer has not announced", kind);
            return Ok(());
        }
        let Some(copy) = self.copies.to_copy(event, &self.objects) else {
            return Ok(());
        };
        // Converters are keyed by local kind; guard against a custom one
        // producing a copy of another type.
        if !self.allow.allows(self.role.outbound(), copy.kind()) {
            return Ok(());
        }
        let call = self.wrap(copy);
        self.transport.send(&call)?;
        Ok(())
    }

    fn wrap(&self, copy: CopyEvent) -> RemoteCall {
        match self.role {
            Role::Client => RemoteCall::SendEvent(copy),
            Role::Server => RemoteCall::DeliverEvent(copy),
        }
    }
}

impl<T: Transport> Listener for NetworkEndpoint<T> {
    fn notify(&mut self, event: &Event, bus: &EventBus) -> Result<(), ListenerError> {
        match event {
            Event::Tick { .. } => {
                match self.state {
                    ConnectionState::Preparing => self.attempt_connection(),
                    ConnectionState::Connecting
                    | ConnectionState::Connected
                    | ConnectionState::Disconnecting => self.pump(bus),
                    ConnectionState::Disconnected => {}
                }
                Ok(())
            }
            Event::ProgramQuit => {
                self.disconnect();
                Ok(())
            }
            other if other.kind().is_control() => Ok(()),
            other => self.forward(other),
        }
    }
}

impl<T: Transport + fmt::Debug> fmt::Debug for NetworkEndpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkEndpoint")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("transport", &self.transport)
            .field("peer", &self.peer)
            .finish()
    }
}
