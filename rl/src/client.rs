//! RtiClient operation vocabulary and the federate callback sink
//!
//! The client is strictly synchronous: one thread issues requests and the
//! same thread receives callbacks, but only inside [`RtiClient::tick`].
//! Anything a federate needs to observe from the RTI arrives through the
//! [`FedEventSink`] capability it passes to the pump.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::time::LogicalTime;
use crate::types::{AttributeHandle, ClassHandle, FederateHandle, ObjectHandle};

/// Errors surfaced by RTI client operations
#[derive(Debug, Error)]
pub enum RtiError {
    // === Expected lifecycle races ===
    #[error("Federation execution already exists")]
    FederationAlreadyExists,

    #[error("Federation execution does not exist")]
    FederationDoesNotExist,

    #[error("Federates are still joined to the federation execution")]
    FederatesCurrentlyJoined,

    #[error("Federate is not an execution member")]
    NotExecutionMember,

    // === Join lifecycle ===
    #[error("Federate is already an execution member")]
    AlreadyExecutionMember,

    #[error("Could not open federation description file: {0}")]
    CouldNotOpenFom(String),

    // === Declaration and object management ===
    #[error("Name not found: {0}")]
    NameNotFound(String),

    #[error("Object class {0} is not published")]
    ObjectClassNotPublished(ClassHandle),

    #[error("Object class {0} is not subscribed")]
    ObjectClassNotSubscribed(ClassHandle),

    #[error("Object instance name already in use: {0}")]
    ObjectNameInUse(String),

    #[error("Unknown object instance {0}")]
    UnknownObject(ObjectHandle),

    // === Time management ===
    #[error("Invalid lookahead: {0}")]
    InvalidLookahead(f64),

    #[error("Time regulation is already enabled")]
    TimeRegulationAlreadyEnabled,

    #[error("Time constrained is already enabled")]
    TimeConstrainedAlreadyEnabled,

    #[error("A time advance is already in progress")]
    TimeAdvanceAlreadyInProgress,

    #[error("Requested time is behind the granted time {0}")]
    FederationTimeAlreadyPassed(LogicalTime),

    #[error("Update timestamp {sent} is below the lookahead floor {floor}")]
    InvalidFederationTime { sent: LogicalTime, floor: LogicalTime },

    #[error("Plain timed request at zero lookahead, issue the available variant first")]
    ZeroLookaheadRequiresAvailable,

    #[error("No such element")]
    NoSuchElement,

    // === Synchronization points ===
    #[error("Synchronization point label not announced: {0}")]
    SyncPointLabelNotAnnounced(String),
}

impl RtiError {
    /// Races the best-effort teardown path swallows
    ///
    /// When several federates leave at once, create/destroy/resign can each
    /// lose a race that some peer already won. Those outcomes are part of
    /// normal shutdown, not failures.
    pub fn is_expected_race(&self) -> bool {
        matches!(
            self,
            RtiError::FederationAlreadyExists
                | RtiError::FederationDoesNotExist
                | RtiError::FederatesCurrentlyJoined
                | RtiError::NotExecutionMember
        )
    }
}

/// Callbacks a federate can receive from the RTI
///
/// [`RtiClient::tick`] dispatches queued callbacks into this sink on the
/// calling thread. Handlers record state for the protocol loop to inspect
/// afterwards; they must not block and they cannot fail.
pub trait FedEventSink {
    /// A remote object instance of a subscribed class became visible
    fn on_object_discovered(&mut self, object: ObjectHandle, class: ClassHandle, name: &str) {
        let _ = (object, class, name);
    }

    /// Attribute values of a discovered instance were updated
    ///
    /// `time` carries the federation timestamp for timestamp-order delivery
    /// and is `None` for receive-order delivery.
    fn on_attributes_reflected(
        &mut self,
        object: ObjectHandle,
        values: &[(AttributeHandle, Vec<u8>)],
        tag: &str,
        time: Option<LogicalTime>,
    ) {
        let _ = (object, values, tag, time);
    }

    /// Time regulation switched on, starting at `time`
    fn on_time_regulation_enabled(&mut self, time: LogicalTime) {
        let _ = time;
    }

    /// Time constraint switched on, starting at `time`
    fn on_time_constrained_enabled(&mut self, time: LogicalTime) {
        let _ = time;
    }

    /// An outstanding advance request was granted up to `time`
    fn on_time_advance_grant(&mut self, time: LogicalTime) {
        let _ = time;
    }

    /// Our synchronization point registration was accepted
    fn on_sync_registration_succeeded(&mut self, label: &str) {
        let _ = label;
    }

    /// Our synchronization point registration was rejected (label taken)
    fn on_sync_registration_failed(&mut self, label: &str) {
        let _ = label;
    }

    /// A synchronization point was announced to this federate
    fn on_sync_announced(&mut self, label: &str, tag: &str) {
        let _ = (label, tag);
    }

    /// Every announced federate achieved the point
    fn on_federation_synchronized(&mut self, label: &str) {
        let _ = label;
    }
}

/// Synchronous RTI client operation vocabulary
///
/// Implementations queue callbacks internally and deliver them only when
/// [`RtiClient::tick`] runs, so callers always know where reentrancy can
/// happen: nowhere else.
pub trait RtiClient {
    // === Federation management ===

    /// Create the named federation execution from a description file
    fn create_federation_execution(&mut self, federation: &str, fom_file: &Path) -> Result<(), RtiError>;

    /// Destroy the named federation execution
    fn destroy_federation_execution(&mut self, federation: &str) -> Result<(), RtiError>;

    /// Join the federation under the given federate name
    fn join_federation_execution(&mut self, federate: &str, federation: &str) -> Result<FederateHandle, RtiError>;

    /// Leave the federation
    fn resign_federation_execution(&mut self) -> Result<(), RtiError>;

    // === Declaration management ===

    /// Look up (or register) the handle for an object class name
    fn object_class_handle(&mut self, name: &str) -> Result<ClassHandle, RtiError>;

    /// Look up (or register) the handle for an attribute of a class
    fn attribute_handle(&mut self, class: ClassHandle, name: &str) -> Result<AttributeHandle, RtiError>;

    /// Declare intent to update the listed attributes of a class
    fn publish_object_class(&mut self, class: ClassHandle, attributes: &[AttributeHandle]) -> Result<(), RtiError>;

    /// Withdraw a publication
    fn unpublish_object_class(&mut self, class: ClassHandle) -> Result<(), RtiError>;

    /// Ask for reflections of the listed attributes of a class
    fn subscribe_object_class_attributes(
        &mut self,
        class: ClassHandle,
        attributes: &[AttributeHandle],
    ) -> Result<(), RtiError>;

    /// Withdraw a subscription
    fn unsubscribe_object_class(&mut self, class: ClassHandle) -> Result<(), RtiError>;

    // === Object management ===

    /// Register a named instance of a published class
    fn register_object_instance(&mut self, class: ClassHandle, name: &str) -> Result<ObjectHandle, RtiError>;

    /// Send timestamped attribute values for an owned instance
    fn update_attribute_values(
        &mut self,
        object: ObjectHandle,
        values: &[(AttributeHandle, Vec<u8>)],
        tag: &str,
        time: LogicalTime,
    ) -> Result<(), RtiError>;

    // === Time management ===

    /// Promise never to send below `now + lookahead`
    fn enable_time_regulation(&mut self, lookahead: f64) -> Result<(), RtiError>;

    /// Receive timestamp-order messages no earlier than their timestamps
    fn enable_time_constrained(&mut self) -> Result<(), RtiError>;

    /// Request an advance to exactly `to`
    fn time_advance_request(&mut self, to: LogicalTime) -> Result<(), RtiError>;

    /// Request an advance to `to`, still accepting messages at `to` afterwards
    fn time_advance_request_available(&mut self, to: LogicalTime) -> Result<(), RtiError>;

    /// Request an advance to the next event timestamp, capped at `to`
    fn next_event_request(&mut self, to: LogicalTime) -> Result<(), RtiError>;

    /// Next-event request that still accepts messages at the granted time
    fn next_event_request_available(&mut self, to: LogicalTime) -> Result<(), RtiError>;

    // === Synchronization points ===

    /// Register a federation-wide synchronization point
    ///
    /// The outcome arrives as a registration callback, not a return value;
    /// on success the point is then announced to every member.
    fn register_sync_point(&mut self, label: &str, tag: &str) -> Result<(), RtiError>;

    /// Signal that this federate reached the announced point
    fn sync_point_achieved(&mut self, label: &str) -> Result<(), RtiError>;

    // === Event pump ===

    /// Dispatch queued callbacks into `sink`
    ///
    /// Waits up to `wait` for the first callback when none are queued, then
    /// drains everything available. Returns the number dispatched.
    fn tick(&mut self, sink: &mut dyn FedEventSink, wait: Duration) -> Result<usize, RtiError>;
}
