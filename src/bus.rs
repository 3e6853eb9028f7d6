//! Event bus – the single connection point between all program parts.
//!
//! ## Dispatch model
//!
//! ```text
//! post(e)          → queue.push(e)
//! post(Tick)       → queue.push(Tick), then one dispatch pass:
//!   i = 0
//!   while i < queue.len()          (length re-read every step)
//!     for listener in snapshot     (insertion order, live only)
//!       listener.notify(queue[i])  (may post → appended to this pass)
//!     i += 1
//!   queue.clear()
//! ```
//!
//! Listeners are held by `Weak` reference.  A listener that fails (error,
//! panic, or re-entrant borrow) is logged and skipped; the pass always runs
//! to the end of the queue.

use crate::event::{Event, Listener};
use log::{trace, warn};
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

type ListenerRef = Weak<RefCell<dyn Listener>>;

#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<Vec<ListenerRef>>,
    queue: RefCell<Vec<Event>>,
    dispatching: Cell<bool>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Add `listener` to the active set.  Registering twice is a no-op.
    pub fn register<L: Listener + 'static>(&self, listener: &Rc<RefCell<L>>) {
        let listener: Rc<RefCell<dyn Listener>> = listener.clone();
        let mut listeners = self.listeners.borrow_mut();
        if listeners.iter().any(|w| same_listener(w, &listener)) {
            return;
        }
        listeners.push(Rc::downgrade(&listener));
    }

    /// Remove `listener`.  Safe to call for a listener that is not registered.
    pub fn unregister<L: Listener + 'static>(&self, listener: &Rc<RefCell<L>>) {
        let listener: Rc<RefCell<dyn Listener>> = listener.clone();
        self.listeners
            .borrow_mut()
            .retain(|w| !same_listener(w, &listener));
    }

    pub fn is_registered<L: Listener + 'static>(&self, listener: &Rc<RefCell<L>>) -> bool {
        let listener: Rc<RefCell<dyn Listener>> = listener.clone();
        self.listeners
            .borrow()
            .iter()
            .any(|w| same_listener(w, &listener))
    }

    /// Number of registered listeners that are still alive.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    // -----------------------------------------------------------------------
    // Posting
    // -----------------------------------------------------------------------

    /// Queue `event`.  A tick event triggers a dispatch pass before this
    /// returns; a tick posted from inside a pass joins the running pass.
    pub fn post(&self, event: Event) {
        let is_tick = matches!(event, Event::Tick { .. });
        self.queue.borrow_mut().push(event);
        if is_tick && !self.dispatching.get() {
            self.process_queue();
        }
    }

    /// Events waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_dispatching(&self) -> bool {
        self.dispatching.get()
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    fn process_queue(&self) {
        self.dispatching.set(true);
        self.listeners.borrow_mut().retain(|w| w.strong_count() > 0);

        let mut index = 0;
        loop {
            let event = match self.queue.borrow().get(index) {
                Some(event) => event.clone(),
                None => break,
            };
            index += 1;

            let snapshot: Vec<ListenerRef> = self.listeners.borrow().clone();
            for weak in snapshot {
                // Unregistered mid-pass, or dropped by its owner.
                if !self.listeners.borrow().iter().any(|w| w.ptr_eq(&weak)) {
                    continue;
                }
                let Some(listener) = weak.upgrade() else {
                    continue;
                };
                self.notify_one(&listener, &event);
            }
        }

        trace!("dispatch pass delivered {} event(s)", index);
        self.queue.borrow_mut().clear();
        self.dispatching.set(false);
    }

    fn notify_one(&self, listener: &Rc<RefCell<dyn Listener>>, event: &Event) {
        let Ok(mut guard) = listener.try_borrow_mut() else {
            warn!("listener busy, skipped {}", event.name());
            return;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| guard.notify(event, self)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("listener failed on {}: {}", event.name(), e),
            Err(_) => warn!("listener panicked on {}", event.name()),
        }
    }
}

fn same_listener(weak: &ListenerRef, listener: &Rc<RefCell<dyn Listener>>) -> bool {
    std::ptr::addr_eq(weak.as_ptr(), Rc::as_ptr(listener))
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .field("pending", &self.pending())
            .field("dispatching", &self.dispatching.get())
            .finish()
    }
}
