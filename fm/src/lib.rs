//! FedMgr - federation lifecycle and attribute exchange management
//!
//! # Core Concepts
//!
//! - **Session**: one federate's passage through a federation execution,
//!   from create/join through synchronized startup to resign/destroy
//! - **Bindings**: named attribute routes declared up front, resolved to
//!   RTI handles in one grouped pass at initialization
//! - **Coordinated time**: every operation carries logical time; the
//!   session only moves when the RTI grants an advance
//!
//! # Modules
//!
//! - `cli`: command-line interface definition
//! - `config`: YAML configuration with defaults and validation
//! - `errors`: error taxonomy for federation work
//! - `ports`: application-facing publish/subscribe traits
//! - `registry`: attribute binding registry and handle resolution
//! - `session`: session state machine, time coordination, barriers
//! - `trace`: structured JSONL run trace

pub mod cli;
pub mod config;
pub mod errors;
pub mod ports;
pub mod registry;
pub mod session;
pub mod trace;

pub use config::FederationConfig;
pub use errors::FedError;
pub use ports::{PendingEvent, PublisherPort, ReflectedValue, SubscriberPort};
pub use registry::{AttributeBinding, BindingSpec, Direction, ObjectRegistry};
pub use session::{Barrier, CallbackSink, FederationSession, SessionPhase, TimeCoordinator};
pub use trace::{FedEvent, TraceEntry, TraceLogger};
