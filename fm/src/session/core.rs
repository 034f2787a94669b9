//! Federation session state machine
//!
//! One session takes a federate through create/join, synchronized startup,
//! the publish/advance loop, and teardown. Every RTI interaction funnels
//! through here on the caller's thread; the session never spawns its own.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use rtilink::{AttrValue, CoordinationLauncher, LogicalTime, RtiClient, RtiError, RtigHandle, TimedEnvelope};

use crate::config::FederationConfig;
use crate::errors::{FedError, protocol};
use crate::ports::{PublisherPort, SubscriberPort};
use crate::registry::{BindingSpec, ObjectRegistry};
use crate::trace::{FedEvent, TraceLogger};

use super::PUMP_WAIT;
use super::advance::TimeCoordinator;
use super::barrier::Barrier;
use super::sink::CallbackSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Constructed, bindings still open
    Created,
    /// Execution member, time policy not yet active
    Joined,
    /// Past the startup barrier, exchanging data
    Ready,
    /// Resigned, only safe to drop
    Finished,
}

pub struct FederationSession {
    config: FederationConfig,
    client: Box<dyn RtiClient>,
    sink: CallbackSink,
    registry: ObjectRegistry,
    subscribers: BTreeMap<String, Box<dyn SubscriberPort>>,
    coordinator: TimeCoordinator,
    launcher: Option<Box<dyn CoordinationLauncher>>,
    rtig: Option<RtigHandle>,
    phase: SessionPhase,
    time: LogicalTime,
    trace: Option<TraceLogger>,
}

impl FederationSession {
    pub fn new(config: FederationConfig, client: Box<dyn RtiClient>) -> Result<Self, FedError> {
        config.validate().map_err(|e| FedError::Config(e.to_string()))?;
        let time = LogicalTime::new(config.federate.start_time)
            .map_err(|e| FedError::Config(format!("invalid start time: {}", e)))?;
        let coordinator = TimeCoordinator::new(config.federate.event_driven, config.federate.lookahead);
        let trace = if config.trace.enabled {
            let logger = TraceLogger::open(&config.trace.path).map_err(|e| {
                FedError::Config(format!("Failed to open trace file {}: {}", config.trace.path.display(), e))
            })?;
            Some(logger)
        } else {
            None
        };
        Ok(Self {
            config,
            client,
            sink: CallbackSink::new(),
            registry: ObjectRegistry::new(),
            subscribers: BTreeMap::new(),
            coordinator,
            launcher: None,
            rtig: None,
            phase: SessionPhase::Created,
            time,
            trace,
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Last granted logical time
    pub fn current_time(&self) -> LogicalTime {
        self.time
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Declare an attribute this application sends
    pub fn add_publisher(&mut self, port: &dyn PublisherPort) -> Result<(), FedError> {
        let mut spec = BindingSpec::new(port.bound_name(), port.class_name(), port.data_type());
        if port.timestamped() {
            spec = spec.timestamped();
        }
        self.registry.register_publication(spec)
    }

    /// Declare an attribute this application receives and the port that
    /// consumes its values
    pub fn add_subscriber(&mut self, port: Box<dyn SubscriberPort>) -> Result<(), FedError> {
        let mut spec = BindingSpec::new(port.bound_name(), port.class_name(), port.data_type());
        if port.timestamped() {
            spec = spec.timestamped();
        }
        self.registry.register_subscription(spec)?;
        self.subscribers.insert(port.bound_name().to_string(), port);
        Ok(())
    }

    /// Launch the coordination process if this federate manages it
    ///
    /// Losing the port race to a concurrently starting peer is normal: the
    /// redundant child is torn down and the surviving process is used.
    pub fn start_coordination(&mut self, launcher: Box<dyn CoordinationLauncher>) -> Result<(), FedError> {
        if !self.config.rtig.manage {
            debug!("coordination process not managed by this federate");
            return Ok(());
        }
        let working_dir = self.config.working_dir();
        let handle = launcher.launch(&working_dir, &self.config.rtig.env)?;
        if launcher.is_already_running(&handle) {
            info!(port = self.config.rtig.port, "coordination process already serving");
            launcher.terminate(handle)?;
        } else {
            info!(pid = ?handle.pid(), "coordination process started");
            self.rtig = Some(handle);
        }
        self.launcher = Some(launcher);
        Ok(())
    }

    /// Create the federation execution if needed and join it
    pub fn join(&mut self) -> Result<(), FedError> {
        if self.phase != SessionPhase::Created {
            return Err(FedError::OutOfPhase { op: "join" });
        }
        let federation = self.config.federation.name.clone();
        debug!(federation, federate = %self.config.federate.name, "FederationSession::join: called");
        match self.client.create_federation_execution(&federation, &self.config.federation.fom_file) {
            Ok(()) => debug!(federation, "federation created"),
            Err(RtiError::FederationAlreadyExists) => debug!(federation, "federation already exists"),
            Err(source) => {
                return Err(FedError::Protocol {
                    op: "create federation execution",
                    source,
                });
            }
        }
        self.client
            .join_federation_execution(&self.config.federate.name, &federation)
            .map_err(protocol("join federation execution"))?;
        self.registry.seal();
        self.phase = SessionPhase::Joined;
        self.record(FedEvent::Joined {
            federation,
            federate: self.config.federate.name.clone(),
        });
        Ok(())
    }

    /// Enable the time policy, resolve bindings, and cross the startup
    /// barrier
    pub fn initialize(&mut self) -> Result<(), FedError> {
        if self.phase != SessionPhase::Joined {
            return Err(FedError::OutOfPhase { op: "initialize" });
        }
        debug!("FederationSession::initialize: called");
        if self.config.federate.time_regulating {
            self.client
                .enable_time_regulation(self.config.federate.lookahead)
                .map_err(protocol("enable time regulation"))?;
            self.pump_until(|sink| sink.is_regulation_enabled())?;
        }
        if self.config.federate.time_constrained {
            self.client
                .enable_time_constrained()
                .map_err(protocol("enable time constrained"))?;
            self.pump_until(|sink| sink.is_constrained_enabled())?;
        }
        self.registry.resolve_handles(self.client.as_mut(), &self.config.federate.name)?;
        self.sink.install_routes(&self.registry);
        self.record(FedEvent::Initialized {
            regulating: self.config.federate.time_regulating,
            constrained: self.config.federate.time_constrained,
            lookahead: self.config.federate.lookahead,
        });
        if !self.config.federation.sync_point.is_empty() {
            let label = self.config.federation.sync_point.clone();
            let barrier = Barrier::new(label.clone(), self.config.federation.register_sync_point);
            barrier.cross(self.client.as_mut(), &mut self.sink)?;
            self.record(FedEvent::BarrierCrossed { label });
        }
        self.phase = SessionPhase::Ready;
        Ok(())
    }

    /// Send one value on a published binding, stamped `at` plus lookahead
    pub fn publish(&mut self, name: &str, value: AttrValue, at: LogicalTime) -> Result<(), FedError> {
        if self.phase != SessionPhase::Ready {
            return Err(FedError::OutOfPhase { op: "publish" });
        }
        let (attribute, instance, expected, timestamped) = {
            let binding = self
                .registry
                .publication(name)
                .ok_or_else(|| FedError::UnknownBinding(name.to_string()))?;
            (binding.attribute, binding.instance, binding.data_type, binding.timestamped)
        };
        let (Some(attribute), Some(instance)) = (attribute, instance) else {
            return Err(FedError::UnknownBinding(name.to_string()));
        };
        if value.data_type() != expected {
            return Err(FedError::TypeMismatch {
                binding: name.to_string(),
                expected,
                got: value.data_type(),
            });
        }
        let send_time = at.offset_by(self.coordinator.lookahead());
        let payload = if timestamped {
            TimedEnvelope {
                timestamp: send_time,
                microstep: 0,
                source_timestamp: at,
                payload: value,
            }
            .encode()
        } else {
            value.encode()
        };
        self.client
            .update_attribute_values(instance, &[(attribute, payload)], name, send_time)
            .map_err(protocol("update attribute values"))?;
        self.record(FedEvent::AttributeSent {
            binding: name.to_string(),
            time: send_time,
        });
        Ok(())
    }

    /// Advance logical time toward `to`, delivering matured events to
    /// subscriber ports before returning the granted time
    pub fn request_advance(&mut self, to: LogicalTime) -> Result<LogicalTime, FedError> {
        if self.phase != SessionPhase::Ready {
            debug!(%to, phase = ?self.phase, "advance outside the ready phase is a no-op");
            return Ok(to);
        }
        let proposed = to;
        let granted = self
            .coordinator
            .request_advance(self.client.as_mut(), &mut self.sink, to)?;
        self.time = granted;
        let events = self.sink.take_events_through(granted);
        let mut delivered = Vec::new();
        for event in events {
            let Some(port) = self.subscribers.get_mut(&event.binding) else {
                warn!(binding = %event.binding, "matured event has no subscriber port");
                continue;
            };
            delivered.push((event.binding.clone(), event.time));
            port.deliver(event);
        }
        for (binding, time) in delivered {
            self.record(FedEvent::EventDelivered { binding, time });
        }
        self.record(FedEvent::AdvanceGranted { proposed, granted });
        Ok(granted)
    }

    /// Tear everything down, tolerating races against other federates
    ///
    /// Safe to call more than once and from any phase.
    pub fn wrapup(&mut self) -> Result<(), FedError> {
        if self.phase == SessionPhase::Finished {
            return Ok(());
        }
        debug!(phase = ?self.phase, "FederationSession::wrapup: called");
        if matches!(self.phase, SessionPhase::Joined | SessionPhase::Ready) {
            for class in self.registry.subscribed_classes() {
                best_effort("unsubscribe object class", self.client.unsubscribe_object_class(class))?;
            }
            for class in self.registry.published_classes() {
                best_effort("unpublish object class", self.client.unpublish_object_class(class))?;
            }
            best_effort("resign federation execution", self.client.resign_federation_execution())?;
            let federation = self.config.federation.name.clone();
            best_effort(
                "destroy federation execution",
                self.client.destroy_federation_execution(&federation),
            )?;
        }
        if let (Some(launcher), Some(handle)) = (self.launcher.as_ref(), self.rtig.take()) {
            launcher.terminate(handle)?;
        }
        self.phase = SessionPhase::Finished;
        self.record(FedEvent::WrappedUp);
        Ok(())
    }

    fn pump_until(&mut self, done: impl Fn(&CallbackSink) -> bool) -> Result<(), FedError> {
        loop {
            if let Some(fault) = self.sink.take_fault() {
                return Err(fault);
            }
            if done(&self.sink) {
                return Ok(());
            }
            self.client.tick(&mut self.sink, PUMP_WAIT).map_err(protocol("evoke callbacks"))?;
        }
    }

    fn record(&mut self, event: FedEvent) {
        if let Some(trace) = self.trace.as_mut() {
            trace.record(event);
        }
    }
}

/// Swallow teardown rejections that mean a peer got there first
fn best_effort(op: &'static str, outcome: Result<(), RtiError>) -> Result<(), FedError> {
    match outcome {
        Ok(()) => Ok(()),
        Err(source) if source.is_expected_race() => {
            debug!(op, error = %source, "teardown race, continuing");
            Ok(())
        }
        Err(source) => Err(FedError::Protocol { op, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use rtilink::{AttributeHandle, ClassHandle, DataType, ObjectHandle};

    use crate::ports::PendingEvent;
    use crate::session::recording::{RecordingClient, Script};
    use crate::trace::TraceEntry;

    fn t(secs: f64) -> LogicalTime {
        LogicalTime::new(secs).unwrap()
    }

    struct DemoPublisher;

    impl PublisherPort for DemoPublisher {
        fn bound_name(&self) -> &str {
            "position"
        }

        fn data_type(&self) -> DataType {
            DataType::Double
        }

        fn class_name(&self) -> &str {
            "Vehicle"
        }
    }

    struct CollectingPort {
        received: Arc<Mutex<Vec<PendingEvent>>>,
    }

    impl SubscriberPort for CollectingPort {
        fn bound_name(&self) -> &str {
            "echo"
        }

        fn data_type(&self) -> DataType {
            DataType::Double
        }

        fn class_name(&self) -> &str {
            "Mirror"
        }

        fn deliver(&mut self, event: PendingEvent) {
            self.received.lock().unwrap().push(event);
        }
    }

    fn test_config() -> FederationConfig {
        let mut config = FederationConfig::default();
        config.federation.sync_point = String::new();
        config.federation.register_sync_point = false;
        config.federate.name = "alpha".to_string();
        config.federate.lookahead = 0.1;
        config
    }

    fn new_session(config: FederationConfig) -> (FederationSession, Arc<Mutex<Script>>) {
        let client = RecordingClient::new();
        let script = client.handle();
        script.lock().unwrap().grant_with_requested = true;
        let session = FederationSession::new(config, Box::new(client)).unwrap();
        (session, script)
    }

    /// A joined, initialized session with one publication and one
    /// subscription
    fn ready_session(config: FederationConfig) -> (FederationSession, Arc<Mutex<Script>>, Arc<Mutex<Vec<PendingEvent>>>) {
        let (mut session, script) = new_session(config);
        session.add_publisher(&DemoPublisher).unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        session
            .add_subscriber(Box::new(CollectingPort {
                received: Arc::clone(&received),
            }))
            .unwrap();
        session.join().unwrap();
        session.initialize().unwrap();
        assert_eq!(session.phase(), SessionPhase::Ready);
        (session, script, received)
    }

    #[test]
    fn test_join_swallows_existing_federation() {
        let (mut session, script) = new_session(test_config());
        script.lock().unwrap().create_error = Some(RtiError::FederationAlreadyExists);
        session.join().unwrap();
        assert_eq!(session.phase(), SessionPhase::Joined);

        let script = script.lock().unwrap();
        let created = script.position_of("create_federation_execution").unwrap();
        let joined = script.position_of("join_federation_execution").unwrap();
        assert!(created < joined);
    }

    #[test]
    fn test_join_propagates_hard_create_failure() {
        let (mut session, script) = new_session(test_config());
        script.lock().unwrap().create_error = Some(RtiError::CouldNotOpenFom("demo.fed".to_string()));
        let err = session.join().unwrap_err();
        let FedError::Protocol { op, .. } = err else {
            panic!("expected protocol error");
        };
        assert_eq!(op, "create federation execution");
        assert_eq!(session.phase(), SessionPhase::Created);
    }

    #[test]
    fn test_join_twice_is_out_of_phase() {
        let (mut session, _script) = new_session(test_config());
        session.join().unwrap();
        let err = session.join().unwrap_err();
        assert!(matches!(err, FedError::OutOfPhase { op: "join" }));
    }

    #[test]
    fn test_initialize_walks_policy_then_resolution() {
        let (_session, script, _received) = ready_session(test_config());
        let script = script.lock().unwrap();
        let regulation = script.position_of("enable_time_regulation").unwrap();
        let constrained = script.position_of("enable_time_constrained").unwrap();
        let subscribe = script.position_of("subscribe_object_class_attributes").unwrap();
        let publish = script.position_of("publish_object_class").unwrap();
        let instance = script.position_of("register_object_instance").unwrap();
        assert!(regulation < constrained);
        assert!(constrained < subscribe);
        assert!(subscribe < publish);
        assert!(publish < instance);
        assert_eq!(script.instances, vec![(ClassHandle(2), "Vehicle.alpha".to_string())]);
    }

    #[test]
    fn test_publish_applies_lookahead_to_wire_time() {
        let (mut session, script, _received) = ready_session(test_config());
        session.publish("position", AttrValue::Double(3.14), t(2.0)).unwrap();

        let script = script.lock().unwrap();
        let (_, values, tag, time) = &script.updates[0];
        assert_eq!(tag, "position");
        assert!((time.as_secs_f64() - 2.1).abs() < 1e-9);
        assert_eq!(values, &vec![(AttributeHandle(2), AttrValue::Double(3.14).encode())]);
    }

    #[test]
    fn test_publish_rejects_type_mismatch() {
        let (mut session, _script, _received) = ready_session(test_config());
        let err = session.publish("position", AttrValue::Long(7), t(1.0)).unwrap_err();
        assert!(matches!(
            err,
            FedError::TypeMismatch { expected: DataType::Double, got: DataType::Long, .. }
        ));

        let err = session.publish("velocity", AttrValue::Double(1.0), t(1.0)).unwrap_err();
        assert!(matches!(err, FedError::UnknownBinding(name) if name == "velocity"));
    }

    #[test]
    fn test_publish_before_ready_is_out_of_phase() {
        let (mut session, _script) = new_session(test_config());
        let err = session.publish("position", AttrValue::Double(1.0), t(0.0)).unwrap_err();
        assert!(matches!(err, FedError::OutOfPhase { op: "publish" }));
    }

    #[test]
    fn test_advance_delivers_matured_events_in_order() {
        let (mut session, script, received) = ready_session(test_config());
        {
            // subscription side resolves first: Mirror=class 1, echo=attr 1
            let mut script = script.lock().unwrap();
            script.reflect(
                ObjectHandle(7),
                ClassHandle(1),
                "Mirror.beta",
                vec![(AttributeHandle(1), AttrValue::Double(1.0).encode())],
                Some(t(0.5)),
            );
            script.reflect(
                ObjectHandle(7),
                ClassHandle(1),
                "Mirror.beta",
                vec![(AttributeHandle(1), AttrValue::Double(2.0).encode())],
                Some(t(0.9)),
            );
        }

        let granted = session.request_advance(t(1.0)).unwrap();
        assert_eq!(granted, t(1.0));
        assert_eq!(session.current_time(), t(1.0));

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].time, t(0.5));
        assert_eq!(received[0].value.value(), &AttrValue::Double(1.0));
        assert_eq!(received[1].time, t(0.9));
        assert_eq!(received[1].value.value(), &AttrValue::Double(2.0));
    }

    #[test]
    fn test_advance_outside_ready_returns_proposed() {
        let (mut session, script) = new_session(test_config());
        let granted = session.request_advance(t(5.0)).unwrap();
        assert_eq!(granted, t(5.0));
        assert!(script.lock().unwrap().advance_calls.is_empty());
    }

    #[test]
    fn test_wrapup_swallows_teardown_races() {
        let (mut session, script, _received) = ready_session(test_config());
        {
            let mut script = script.lock().unwrap();
            script.resign_error = Some(RtiError::NotExecutionMember);
            script.destroy_error = Some(RtiError::FederationDoesNotExist);
        }
        session.wrapup().unwrap();
        assert_eq!(session.phase(), SessionPhase::Finished);

        let script = script.lock().unwrap();
        let unsubscribe = script.position_of("unsubscribe_object_class").unwrap();
        let unpublish = script.position_of("unpublish_object_class").unwrap();
        let resign = script.position_of("resign_federation_execution").unwrap();
        let destroy = script.position_of("destroy_federation_execution").unwrap();
        assert!(unsubscribe < unpublish);
        assert!(unpublish < resign);
        assert!(resign < destroy);
    }

    #[test]
    fn test_wrapup_is_idempotent() {
        let (mut session, script, _received) = ready_session(test_config());
        session.wrapup().unwrap();
        let calls_after_first = script.lock().unwrap().calls.len();
        session.wrapup().unwrap();
        assert_eq!(script.lock().unwrap().calls.len(), calls_after_first);
    }

    #[test]
    fn test_wrapup_propagates_hard_failure() {
        let (mut session, script, _received) = ready_session(test_config());
        script.lock().unwrap().destroy_error = Some(RtiError::TimeAdvanceAlreadyInProgress);
        let err = session.wrapup().unwrap_err();
        let FedError::Protocol { op, .. } = err else {
            panic!("expected protocol error");
        };
        assert_eq!(op, "destroy federation execution");
        assert_eq!(session.phase(), SessionPhase::Ready);
    }

    #[test]
    fn test_trace_records_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let trace_path = dir.path().join("trace.jsonl");
        let mut config = test_config();
        config.trace.enabled = true;
        config.trace.path = trace_path.clone();

        let (mut session, _script, _received) = ready_session(config);
        session.publish("position", AttrValue::Double(1.0), t(0.0)).unwrap();
        session.request_advance(t(1.0)).unwrap();
        session.wrapup().unwrap();
        drop(session);

        let raw = std::fs::read_to_string(&trace_path).unwrap();
        let entries: Vec<TraceEntry> = raw.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        let types: Vec<&'static str> = entries.iter().map(|e| e.event.event_type()).collect();
        assert_eq!(types.first(), Some(&"joined"));
        assert_eq!(types.last(), Some(&"wrapped-up"));
        assert!(types.contains(&"initialized"));
        assert!(types.contains(&"attribute-sent"));
        assert!(types.contains(&"advance-granted"));
        let run_id = entries[0].run_id;
        assert!(entries.iter().all(|e| e.run_id == run_id));
    }
}
