//! Error taxonomy for federation work

use rtilink::{DataType, LaunchError, RtiError, WireError};
use thiserror::Error;

use crate::registry::Direction;

#[derive(Error, Debug)]
pub enum FedError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Binding '{name}' is already registered for {direction}")]
    DuplicateBinding { name: String, direction: Direction },

    #[error("Bindings cannot be registered after joining")]
    RegistrationClosed,

    #[error("No binding named '{0}'")]
    UnknownBinding(String),

    #[error("RTI rejected {op}: {source}")]
    Protocol {
        op: &'static str,
        #[source]
        source: RtiError,
    },

    #[error("Failed to decode '{binding}' as {data_type}: {source}")]
    Decoding {
        binding: String,
        data_type: DataType,
        #[source]
        source: WireError,
    },

    #[error("Binding '{binding}' carries {expected}, got {got}")]
    TypeMismatch {
        binding: String,
        expected: DataType,
        got: DataType,
    },

    #[error("A time advance is already in progress")]
    AdvanceInProgress,

    #[error("Synchronization point '{label}' could not be registered")]
    BarrierRegistrationFailed { label: String },

    #[error("Cannot {op} in the current session phase")]
    OutOfPhase { op: &'static str },

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

impl FedError {
    /// Teardown failures that mean another federate got there first
    pub fn is_expected_race(&self) -> bool {
        matches!(self, FedError::Protocol { source, .. } if source.is_expected_race())
    }
}

/// Maps an RTI rejection into [`FedError::Protocol`], tagging the operation
pub(crate) fn protocol(op: &'static str) -> impl FnOnce(RtiError) -> FedError {
    move |source| FedError::Protocol { op, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_race_classification() {
        let race = FedError::Protocol {
            op: "destroy federation execution",
            source: RtiError::FederationDoesNotExist,
        };
        assert!(race.is_expected_race());

        let hard = FedError::Protocol {
            op: "join federation execution",
            source: RtiError::AlreadyExecutionMember,
        };
        assert!(!hard.is_expected_race());

        assert!(!FedError::AdvanceInProgress.is_expected_race());
    }

    #[test]
    fn test_protocol_helper_tags_operation() {
        let err = protocol("enable time regulation")(RtiError::TimeRegulationAlreadyEnabled);
        let FedError::Protocol { op, .. } = err else {
            panic!("expected protocol error");
        };
        assert_eq!(op, "enable time regulation");
    }
}
