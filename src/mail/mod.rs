//! Agent messaging
//!
//! Addressing, message envelopes, mailboxes, the process-local registry and
//! the router that decides between local dispatch and remote hand-off.
//!
//! # Overview
//!
//! - **Registry** maps canonical addresses to handles of agents running in
//!   this process
//! - **Router** consults the registry on every send: a hit dispatches straight
//!   into the recipient's mailbox, a miss goes to the sender's remote transport
//! - **Mailbox** is the per-agent queue that behaviours receive from
//!
//! # Addressing
//!
//! Addresses use the form `local@domain[/resource]`. The resource never
//! affects routing: `b@server/phone` is delivered to whichever agent is
//! registered as `b@server`.

mod address;
mod mailbox;
mod message;
mod registry;
mod remote;
mod router;
mod server;
mod template;
pub mod transport;

pub use address::{Address, AddressError};
pub use mailbox::{DispatchError, Mailbox, DEFAULT_MAILBOX_CAPACITY};
pub use message::{Message, MessageId, PERFORMATIVE_KEY};
pub use registry::{Dispatch, Registry, RegistryError};
pub use remote::HttpTransport;
pub use router::{Delivery, RouteError, Router};
pub use server::{RelayServer, ServerError, DEFAULT_MAX_BODY_SIZE};
pub use template::{FieldTemplate, Template};
pub use transport::{RemoteTransport, TransportError, UnroutableTransport};
