//! Defender event plumbing
//!
//! The event bus, event codec, copy/object registries and the client/server
//! network endpoints that connect the parts of a Defender game node.
//!
//! ## Architecture
//!
//! ```text
//! TickSpinner  (spinner.rs)          ← posts Tick / Render every frame
//!   └── EventBus  (bus.rs)           ← queue + weak listener set
//!         ├── game listeners          (UI, model, ...)
//!         ├── EventReceiver (receiver.rs) ← remote → local events
//!         └── NetworkEndpoint (endpoint.rs) ← local → remote events
//!               ├── CopyRegistry   (copy.rs)     event ↔ wire copy
//!               ├── ObjectRegistry (registry.rs) object ↔ id
//!               └── Transport      (transport/)  tcp / in-memory
//! ```
//!
//! Everything here is single-threaded: the bus, listeners and endpoints
//! share state through `Rc`/`RefCell` and are driven by one tick loop.

pub mod bus;
pub mod codec;
pub mod config;
pub mod copy;
pub mod endpoint;
pub mod event;
pub mod protocol;
pub mod receiver;
pub mod registry;
pub mod transport;
pub mod types;

// The tick loop needs a tokio runtime.
#[cfg(feature = "runtime")]
pub mod spinner;

// Convenience re-exports
pub use bus::EventBus;
pub use codec::{CodecError, EventCodec, WireRecord};
pub use config::{ConfigError, NodeConfig};
pub use copy::CopyRegistry;
pub use endpoint::{ConnectionState, NetworkEndpoint, PeerHandle, Role};
pub use event::{Event, EventKind, Listener, ListenerError};
pub use protocol::{AllowList, CopyEvent, CopyKind, NetDirection, RemoteCall};
pub use receiver::EventReceiver;
pub use registry::{ObjectRegistry, SharedObject};
#[cfg(feature = "runtime")]
pub use spinner::TickSpinner;
pub use transport::{Transport, TransportError, TransportEvent};
pub use types::{ClientNumber, Direction, GridPosition, ObjectId, ScreenPosition};
