//! tether runtime - target discovery, launch, and connection plumbing.
//!
//! This crate turns "there is (or should be) a debuggable process somewhere"
//! into a live, correlated command/event connection:
//!
//! - **Locator**: tiered discovery/launch of the target for the active
//!   attach mode (web browser, native executable, OS-protocol launch, or
//!   plain attach)
//! - **Discovery**: polling the local HTTP endpoint until a websocket
//!   debugger URL (and, in web mode, the right page target) appears
//! - **Transport**: the websocket split into channel-bridged reader/writer
//!   tasks
//! - **Connection**: command-id correlation and the single event stream
//!
//! The domain logic (session initialization, interception, patching) lives
//! in the `tether` crate on top of this one.

pub mod connection;
pub mod discovery;
pub mod error;
pub mod locator;
pub mod transport;

pub use connection::{Connection, DEFAULT_COMMAND_TIMEOUT};
pub use discovery::{DebuggerEndpoint, EndpointWaiter, match_target};
pub use error::{Error, Result};
pub use locator::{AttachMode, LocatorConfig, ProcessLocator, first_existing, parse_devtools_line};
pub use transport::{TransportParts, connect};
