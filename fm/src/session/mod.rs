//! Session state machine, time coordination, and barriers
//!
//! The session owns the RTI client and drives it from one thread. All
//! callbacks land in the [`CallbackSink`] during explicit tick pumps; the
//! session inspects the sink between pumps rather than reacting inline.

use std::time::Duration;

mod advance;
mod barrier;
mod core;
mod sink;

#[cfg(test)]
pub(crate) mod recording;

/// How long a single tick blocks waiting for callbacks
pub(crate) const PUMP_WAIT: Duration = Duration::from_millis(10);

pub use advance::TimeCoordinator;
pub use barrier::Barrier;
pub use self::core::{FederationSession, SessionPhase};
pub use sink::CallbackSink;
