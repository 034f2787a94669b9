//! Time advance coordination
//!
//! Picks the request variant from the time policy and pumps callbacks
//! until the grant lands. Zero lookahead needs two grants per step: the
//! available variant moves the clock while messages at exactly the grant
//! time can still arrive, and the plain variant it arms closes the step.

use tracing::{debug, warn};

use rtilink::{LogicalTime, RtiClient, RtiError};

use crate::errors::{FedError, protocol};

use super::PUMP_WAIT;
use super::sink::CallbackSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdvanceState {
    Idle,
    Requested,
}

pub struct TimeCoordinator {
    event_driven: bool,
    lookahead: f64,
    state: AdvanceState,
}

impl TimeCoordinator {
    pub fn new(event_driven: bool, lookahead: f64) -> Self {
        Self {
            event_driven,
            lookahead,
            state: AdvanceState::Idle,
        }
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    /// Move logical time toward `to`, returning the granted time
    ///
    /// The grant never exceeds `to`; an event-driven request may be granted
    /// earlier, at the timestamp of the next delivered event.
    pub fn request_advance(
        &mut self,
        client: &mut dyn RtiClient,
        sink: &mut CallbackSink,
        to: LogicalTime,
    ) -> Result<LogicalTime, FedError> {
        if self.state == AdvanceState::Requested {
            return Err(FedError::AdvanceInProgress);
        }
        self.state = AdvanceState::Requested;
        let outcome = self.drive(client, sink, to);
        self.state = AdvanceState::Idle;
        outcome
    }

    fn drive(
        &mut self,
        client: &mut dyn RtiClient,
        sink: &mut CallbackSink,
        to: LogicalTime,
    ) -> Result<LogicalTime, FedError> {
        debug!(%to, event_driven = self.event_driven, lookahead = self.lookahead, "TimeCoordinator::drive: called");
        if self.lookahead == 0.0 {
            let reached = self.issue(client, sink, to, true)?;
            self.issue(client, sink, reached, false)
        } else {
            self.issue(client, sink, to, false)
        }
    }

    fn issue(
        &self,
        client: &mut dyn RtiClient,
        sink: &mut CallbackSink,
        to: LogicalTime,
        available: bool,
    ) -> Result<LogicalTime, FedError> {
        let (op, outcome) = match (self.event_driven, available) {
            (false, false) => ("time advance request", client.time_advance_request(to)),
            (false, true) => ("time advance request available", client.time_advance_request_available(to)),
            (true, false) => ("next event request", client.next_event_request(to)),
            (true, true) => ("next event request available", client.next_event_request_available(to)),
        };
        match outcome {
            Ok(()) => {}
            Err(RtiError::NoSuchElement) => {
                // some RTIs reject an event-driven request with nothing queued
                warn!(op, %to, "no pending event, treating the proposed time as granted");
                return Ok(to);
            }
            Err(source) => return Err(FedError::Protocol { op, source }),
        }
        pump_until_grant(client, sink)
    }
}

/// Tick until the sink holds a grant, surfacing any parked fault first
pub(super) fn pump_until_grant(client: &mut dyn RtiClient, sink: &mut CallbackSink) -> Result<LogicalTime, FedError> {
    loop {
        if let Some(fault) = sink.take_fault() {
            return Err(fault);
        }
        if let Some(granted) = sink.take_grant() {
            return Ok(granted);
        }
        client.tick(sink, PUMP_WAIT).map_err(protocol("evoke callbacks"))?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::recording::RecordingClient;
    use std::sync::{Arc, Mutex};

    use crate::session::recording::Script;

    fn t(secs: f64) -> LogicalTime {
        LogicalTime::new(secs).unwrap()
    }

    fn granted_run(event_driven: bool, lookahead: f64, to: f64) -> (Arc<Mutex<Script>>, LogicalTime) {
        let mut client = RecordingClient::new();
        let script = client.handle();
        script.lock().unwrap().grant_with_requested = true;
        let mut sink = CallbackSink::new();
        let mut coordinator = TimeCoordinator::new(event_driven, lookahead);
        let granted = coordinator.request_advance(&mut client, &mut sink, t(to)).unwrap();
        (script, granted)
    }

    #[test]
    fn test_time_stepped_positive_lookahead_is_one_request() {
        let (script, granted) = granted_run(false, 0.5, 5.0);
        assert_eq!(granted, t(5.0));
        assert_eq!(
            script.lock().unwrap().advance_calls,
            vec![("time_advance_request", t(5.0))]
        );
    }

    #[test]
    fn test_event_driven_positive_lookahead_is_one_request() {
        let (script, granted) = granted_run(true, 0.5, 5.0);
        assert_eq!(granted, t(5.0));
        assert_eq!(
            script.lock().unwrap().advance_calls,
            vec![("next_event_request", t(5.0))]
        );
    }

    #[test]
    fn test_zero_lookahead_issues_available_then_plain() {
        let (script, granted) = granted_run(false, 0.0, 5.0);
        assert_eq!(granted, t(5.0));
        assert_eq!(
            script.lock().unwrap().advance_calls,
            vec![
                ("time_advance_request_available", t(5.0)),
                ("time_advance_request", t(5.0)),
            ]
        );
    }

    #[test]
    fn test_event_driven_zero_lookahead_issues_available_then_plain() {
        let (script, granted) = granted_run(true, 0.0, 5.0);
        assert_eq!(granted, t(5.0));
        assert_eq!(
            script.lock().unwrap().advance_calls,
            vec![
                ("next_event_request_available", t(5.0)),
                ("next_event_request", t(5.0)),
            ]
        );
    }

    #[test]
    fn test_second_phase_targets_the_first_grant() {
        let mut client = RecordingClient::new();
        let script = client.handle();
        {
            let mut script = script.lock().unwrap();
            // the available request is granted early, at a held event
            script.grant_overrides.push_back(t(2.0));
            script.grant_with_requested = true;
        }
        let mut sink = CallbackSink::new();
        let mut coordinator = TimeCoordinator::new(true, 0.0);

        let granted = coordinator.request_advance(&mut client, &mut sink, t(5.0)).unwrap();
        assert_eq!(granted, t(2.0));
        assert_eq!(
            script.lock().unwrap().advance_calls,
            vec![
                ("next_event_request_available", t(5.0)),
                ("next_event_request", t(2.0)),
            ]
        );
    }

    #[test]
    fn test_no_pending_event_returns_proposed() {
        let mut client = RecordingClient::new();
        let script = client.handle();
        script.lock().unwrap().advance_errors.push_back(RtiError::NoSuchElement);
        let mut sink = CallbackSink::new();
        let mut coordinator = TimeCoordinator::new(true, 0.3);

        let granted = coordinator.request_advance(&mut client, &mut sink, t(7.0)).unwrap();
        assert_eq!(granted, t(7.0));
        assert_eq!(script.lock().unwrap().advance_calls, vec![("next_event_request", t(7.0))]);
    }

    #[test]
    fn test_hard_rejection_propagates_with_operation() {
        let mut client = RecordingClient::new();
        client
            .handle()
            .lock()
            .unwrap()
            .advance_errors
            .push_back(RtiError::TimeAdvanceAlreadyInProgress);
        let mut sink = CallbackSink::new();
        let mut coordinator = TimeCoordinator::new(false, 1.0);

        let err = coordinator.request_advance(&mut client, &mut sink, t(7.0)).unwrap_err();
        let FedError::Protocol { op, source } = err else {
            panic!("expected protocol error");
        };
        assert_eq!(op, "time advance request");
        assert!(matches!(source, RtiError::TimeAdvanceAlreadyInProgress));
    }

    #[test]
    fn test_parked_fault_beats_the_grant() {
        let mut client = RecordingClient::new();
        client.handle().lock().unwrap().grant_with_requested = true;
        let mut sink = CallbackSink::new();
        sink.record_fault(FedError::UnknownBinding("ghost".to_string()));
        let mut coordinator = TimeCoordinator::new(false, 1.0);

        let err = coordinator.request_advance(&mut client, &mut sink, t(1.0)).unwrap_err();
        assert!(matches!(err, FedError::UnknownBinding(name) if name == "ghost"));
    }
}
