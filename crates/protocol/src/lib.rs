//! Wire types for the remote debugging protocol.
//!
//! This crate contains the serde-serializable types used for communication
//! with a Chrome DevTools Protocol endpoint. These types represent the
//! "protocol layer" - the shapes of data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization/deserialization
//! - **1:1 with protocol**: Match the DevTools JSON shapes exactly
//! - **Stable**: Changes only when the wire protocol changes
//!
//! Connection management and command correlation live in `tether-runtime`;
//! the ergonomic session API is built on top in `tether`.

pub mod discovery;
pub mod message;

pub use discovery::*;
pub use message::*;
