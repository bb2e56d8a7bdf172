//! Sync hub
//!
//! Keeps every open wizard view in step: connection and group registry,
//! event fan-out, inbound message dispatch and the single Kometa run slot.

pub mod broadcaster;
pub mod dispatcher;
pub mod events;
pub mod execution;
pub mod socket;

pub use broadcaster::{EventReceiver, EventSink, SyncHub};
pub use dispatcher::HubService;
pub use events::{ClientMessage, ConfigSection, ConnectionId, Origin, Scope, ServerEvent, ServerStatus};
pub use execution::ExecutionControl;
pub use socket::hub_socket;
