//! RtiLink - the middleware-facing layer of the federation coordinator
//!
//! Everything a federate needs to talk to an HLA run-time infrastructure:
//! logical time, attribute wire encoding, the synchronous client operation
//! vocabulary, the callback sink capability, an in-process loopback exchange
//! for tests and single-host runs, and the rtig coordination process
//! launcher.
//!
//! # Core Concepts
//!
//! - **One thread drives the protocol**: requests go out through
//!   [`RtiClient`] methods and callbacks come back only inside
//!   [`RtiClient::tick`]. No callback ever fires between ticks.
//! - **Callbacks are a capability**: federate-side state lives behind the
//!   [`FedEventSink`] trait, not in globals.
//! - **Wire values are tagged**: every payload decodes through an exhaustive
//!   match on [`DataType`], never a chain of type comparisons.
//!
//! # Modules
//!
//! - [`time`] - Logical federation time
//! - [`types`] - Handles assigned by the RTI
//! - [`wire`] - Attribute value and timed-envelope codecs
//! - [`client`] - RtiClient operation vocabulary and FedEventSink callbacks
//! - [`loopback`] - In-process exchange implementing the client vocabulary
//! - [`launch`] - Coordination process (rtig) lifecycle

pub mod client;
pub mod launch;
pub mod loopback;
pub mod time;
pub mod types;
pub mod wire;

// Re-export commonly used types
pub use client::{FedEventSink, RtiClient, RtiError};
pub use launch::{CoordinationLauncher, LaunchError, RtigHandle, RtigLauncher};
pub use loopback::{LoopbackExchange, LoopbackRti};
pub use time::{LogicalTime, TimeError};
pub use types::{AttributeHandle, ClassHandle, FederateHandle, ObjectHandle};
pub use wire::{AttrValue, DataType, TimedEnvelope, WireError};
