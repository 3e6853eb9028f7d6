//! Remote-callable event receiver.
//!
//! The endpoint hands every inbound `SendEvent` / `DeliverEvent` payload to
//! [`EventReceiver::receive`], which rebuilds the local event and posts it
//! straight onto the bus.  As a listener, the receiver also announces itself
//! to the server once the client connects, so the server knows where to
//! deliver its events.
//!
//! The receiver owns every [`RemoteObject`] proxy it creates.  Events only
//! borrow them, so later references to the same id resolve to the same
//! proxy until [`EventReceiver::forget_remote`] lets it go.

use crate::bus::EventBus;
use crate::event::{Event, Listener, ListenerError};
use crate::protocol::{CopyEvent, ReceiverHandle, RemoteCall};
use crate::registry::{ObjectRegistry, RemoteObject, SharedObject};
use crate::types::{ClientNumber, ObjectId};
use log::{debug, trace};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug)]
pub struct EventReceiver {
    handle: ReceiverHandle,
    objects: Rc<ObjectRegistry>,
    proxies: HashMap<ObjectId, SharedObject>,
    received: u64,
}

impl EventReceiver {
    pub fn new(handle: impl Into<String>, objects: Rc<ObjectRegistry>) -> Self {
        Self {
            handle: ReceiverHandle(handle.into()),
            objects,
            proxies: HashMap::new(),
            received: 0,
        }
    }

    pub fn handle(&self) -> &ReceiverHandle {
        &self.handle
    }

    /// Number of remote events posted so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Number of remote proxies currently kept alive.
    pub fn remote_objects(&self) -> usize {
        self.proxies.len()
    }

    /// Release the proxy held for `id`.  The next reference to `id`
    /// creates a fresh one once nothing else holds the old proxy.
    pub fn forget_remote(&mut self, id: ObjectId) -> bool {
        self.proxies.remove(&id).is_some()
    }

    /// Post an incoming copy onto the local bus, stamped with `origin`.
    pub fn receive(&mut self, copy: CopyEvent, origin: Option<ClientNumber>, bus: &EventBus) {
        let referenced = match &copy {
            CopyEvent::GameStarted { game_id } => Some(*game_id),
            _ => None,
        };
        let event = copy.into_event(origin, &self.objects);
        if let (Some(id), Event::GameStarted { game }) = (referenced, &event) {
            self.keep_proxy(id, game);
        }
        trace!("received {} from {:?}", event.name(), origin);
        self.received += 1;
        bus.post(event);
    }

    fn keep_proxy(&mut self, id: ObjectId, object: &SharedObject) {
        if object.is::<RemoteObject>() && !self.proxies.contains_key(&id) {
            trace!("holding remote proxy {}", id);
            self.proxies.insert(id, object.clone());
        }
    }
}

impl Listener for EventReceiver {
    fn notify(&mut self, event: &Event, _bus: &EventBus) -> Result<(), ListenerError> {
        if let Event::ServerConnected { peer } = event {
            debug!("announcing receiver '{}'", self.handle.0);
            if !peer.call_remote(RemoteCall::Announce(self.handle.clone())) {
                return Err(ListenerError::Failed(
                    "peer went away before the announce".into(),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
