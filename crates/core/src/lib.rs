//! tether - attach to a browser-hosted application and graft a companion
//! runtime into it.
//!
//! The crate drives one session end to end:
//!
//! 1. **Locate**: obtain a debuggable target for the configured attach mode
//!    (launch a browser, spawn the application, ask the OS launcher, or
//!    attach to something already listening)
//! 2. **Initialize**: register the interception rule, disable caching,
//!    bypass CSP, subscribe to console/log events, enable the protocol
//!    domains
//! 3. **Intercept**: on every matching network response, run one patch
//!    cycle - detect the bootstrap assignment, evaluate the companion
//!    runtime into the engine, splice the handle alias into the body, and
//!    resume the exchange with the reassembled response
//! 4. **Evaluate**: downstream consumers reach the application root object
//!    through the lazily resolved [`handle::ContextHandle`], never a cached
//!    reference
//!
//! Failure posture: a broken patch cycle releases the original body (the
//! application loads, degraded); only exhausted discovery or a dead
//! connection end the run.

pub mod attach;
pub mod config;
pub mod handle;
pub mod inject;
pub mod intercept;
pub mod patch;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use attach::{AttachedSession, attach};
pub use config::{AttachConfig, BootstrapConfig, BundleConfig, InterceptConfig};
pub use handle::ContextHandle;
pub use inject::InjectionSpec;
pub use intercept::{CycleOutcome, CycleState, InterceptOps, InterceptionController};
pub use patch::{PatchOutcome, assemble_response, patch_body};
pub use session::{InterceptionRule, Session};
pub use tether_runtime::{AttachMode, DebuggerEndpoint, Error, Result};
