//! Scripted RTI client for session tests
//!
//! Records every operation in call order and plays queued callbacks back
//! through `tick`, one per call. The script lives behind a shared handle
//! so tests keep access after the client moves into a session.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rtilink::{
    AttributeHandle, ClassHandle, FedEventSink, FederateHandle, LogicalTime, ObjectHandle, RtiClient, RtiError,
};

pub(crate) enum QueuedCallback {
    Discovered {
        object: ObjectHandle,
        class: ClassHandle,
        name: String,
    },
    Reflected {
        object: ObjectHandle,
        values: Vec<(AttributeHandle, Vec<u8>)>,
        tag: String,
        time: Option<LogicalTime>,
    },
    RegulationEnabled(LogicalTime),
    ConstrainedEnabled(LogicalTime),
    Grant(LogicalTime),
    SyncSucceeded(String),
    SyncFailed(String),
    Announced {
        label: String,
        tag: String,
    },
    Synchronized(String),
}

/// Scripted behavior plus everything the client has recorded
#[derive(Default)]
pub(crate) struct Script {
    pub calls: Vec<&'static str>,
    pub advance_calls: Vec<(&'static str, LogicalTime)>,
    pub updates: Vec<(ObjectHandle, Vec<(AttributeHandle, Vec<u8>)>, String, LogicalTime)>,
    pub instances: Vec<(ClassHandle, String)>,
    pub published: Vec<(ClassHandle, Vec<AttributeHandle>)>,
    pub subscribed: Vec<(ClassHandle, Vec<AttributeHandle>)>,
    pub queued: VecDeque<QueuedCallback>,
    /// Grant each advance request at its requested time
    pub grant_with_requested: bool,
    /// Grant times consumed before falling back to the requested time
    pub grant_overrides: VecDeque<LogicalTime>,
    /// Errors consumed by advance requests, one per call
    pub advance_errors: VecDeque<RtiError>,
    pub create_error: Option<RtiError>,
    pub resign_error: Option<RtiError>,
    pub destroy_error: Option<RtiError>,
    pub fail_registration: bool,
}

impl Script {
    /// Queue an announcement as if a peer registered the point
    pub fn announce(&mut self, label: &str) {
        self.queued.push_back(QueuedCallback::Announced {
            label: label.to_string(),
            tag: label.to_string(),
        });
    }

    /// Queue a discovery followed by a reflection for the same object
    pub fn reflect(
        &mut self,
        object: ObjectHandle,
        class: ClassHandle,
        name: &str,
        values: Vec<(AttributeHandle, Vec<u8>)>,
        time: Option<LogicalTime>,
    ) {
        self.queued.push_back(QueuedCallback::Discovered {
            object,
            class,
            name: name.to_string(),
        });
        self.queued.push_back(QueuedCallback::Reflected {
            object,
            values,
            tag: name.to_string(),
            time,
        });
    }

    pub fn position_of(&self, call: &'static str) -> Option<usize> {
        self.calls.iter().position(|&c| c == call)
    }
}

#[derive(Default)]
pub(crate) struct RecordingClient {
    shared: Arc<Mutex<Script>>,
    classes: BTreeMap<String, ClassHandle>,
    attributes: BTreeMap<(ClassHandle, String), AttributeHandle>,
    next_object: u32,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Arc<Mutex<Script>> {
        Arc::clone(&self.shared)
    }

    fn advance(&mut self, op: &'static str, to: LogicalTime) -> Result<(), RtiError> {
        let mut script = self.shared.lock().unwrap();
        script.advance_calls.push((op, to));
        if let Some(err) = script.advance_errors.pop_front() {
            return Err(err);
        }
        if let Some(granted) = script.grant_overrides.pop_front() {
            script.queued.push_back(QueuedCallback::Grant(granted));
        } else if script.grant_with_requested {
            script.queued.push_back(QueuedCallback::Grant(to));
        }
        Ok(())
    }
}

impl RtiClient for RecordingClient {
    fn create_federation_execution(&mut self, _federation: &str, _fom_file: &Path) -> Result<(), RtiError> {
        let mut script = self.shared.lock().unwrap();
        script.calls.push("create_federation_execution");
        match script.create_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn destroy_federation_execution(&mut self, _federation: &str) -> Result<(), RtiError> {
        let mut script = self.shared.lock().unwrap();
        script.calls.push("destroy_federation_execution");
        match script.destroy_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn join_federation_execution(&mut self, _federate: &str, _federation: &str) -> Result<FederateHandle, RtiError> {
        self.shared.lock().unwrap().calls.push("join_federation_execution");
        Ok(FederateHandle(1))
    }

    fn resign_federation_execution(&mut self) -> Result<(), RtiError> {
        let mut script = self.shared.lock().unwrap();
        script.calls.push("resign_federation_execution");
        match script.resign_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn object_class_handle(&mut self, name: &str) -> Result<ClassHandle, RtiError> {
        self.shared.lock().unwrap().calls.push("object_class_handle");
        let next = ClassHandle(self.classes.len() as u32 + 1);
        Ok(*self.classes.entry(name.to_string()).or_insert(next))
    }

    fn attribute_handle(&mut self, class: ClassHandle, name: &str) -> Result<AttributeHandle, RtiError> {
        self.shared.lock().unwrap().calls.push("attribute_handle");
        let next = AttributeHandle(self.attributes.len() as u32 + 1);
        Ok(*self.attributes.entry((class, name.to_string())).or_insert(next))
    }

    fn publish_object_class(&mut self, class: ClassHandle, attributes: &[AttributeHandle]) -> Result<(), RtiError> {
        let mut script = self.shared.lock().unwrap();
        script.calls.push("publish_object_class");
        script.published.push((class, attributes.to_vec()));
        Ok(())
    }

    fn unpublish_object_class(&mut self, _class: ClassHandle) -> Result<(), RtiError> {
        self.shared.lock().unwrap().calls.push("unpublish_object_class");
        Ok(())
    }

    fn subscribe_object_class_attributes(
        &mut self,
        class: ClassHandle,
        attributes: &[AttributeHandle],
    ) -> Result<(), RtiError> {
        let mut script = self.shared.lock().unwrap();
        script.calls.push("subscribe_object_class_attributes");
        script.subscribed.push((class, attributes.to_vec()));
        Ok(())
    }

    fn unsubscribe_object_class(&mut self, _class: ClassHandle) -> Result<(), RtiError> {
        self.shared.lock().unwrap().calls.push("unsubscribe_object_class");
        Ok(())
    }

    fn register_object_instance(&mut self, class: ClassHandle, name: &str) -> Result<ObjectHandle, RtiError> {
        let mut script = self.shared.lock().unwrap();
        script.calls.push("register_object_instance");
        self.next_object += 1;
        script.instances.push((class, name.to_string()));
        Ok(ObjectHandle(self.next_object))
    }

    fn update_attribute_values(
        &mut self,
        object: ObjectHandle,
        values: &[(AttributeHandle, Vec<u8>)],
        tag: &str,
        time: LogicalTime,
    ) -> Result<(), RtiError> {
        let mut script = self.shared.lock().unwrap();
        script.calls.push("update_attribute_values");
        script.updates.push((object, values.to_vec(), tag.to_string(), time));
        Ok(())
    }

    fn enable_time_regulation(&mut self, _lookahead: f64) -> Result<(), RtiError> {
        let mut script = self.shared.lock().unwrap();
        script.calls.push("enable_time_regulation");
        script.queued.push_back(QueuedCallback::RegulationEnabled(LogicalTime::ZERO));
        Ok(())
    }

    fn enable_time_constrained(&mut self) -> Result<(), RtiError> {
        let mut script = self.shared.lock().unwrap();
        script.calls.push("enable_time_constrained");
        script.queued.push_back(QueuedCallback::ConstrainedEnabled(LogicalTime::ZERO));
        Ok(())
    }

    fn time_advance_request(&mut self, to: LogicalTime) -> Result<(), RtiError> {
        self.advance("time_advance_request", to)
    }

    fn time_advance_request_available(&mut self, to: LogicalTime) -> Result<(), RtiError> {
        self.advance("time_advance_request_available", to)
    }

    fn next_event_request(&mut self, to: LogicalTime) -> Result<(), RtiError> {
        self.advance("next_event_request", to)
    }

    fn next_event_request_available(&mut self, to: LogicalTime) -> Result<(), RtiError> {
        self.advance("next_event_request_available", to)
    }

    fn register_sync_point(&mut self, label: &str, tag: &str) -> Result<(), RtiError> {
        let mut script = self.shared.lock().unwrap();
        script.calls.push("register_sync_point");
        if script.fail_registration {
            script.queued.push_back(QueuedCallback::SyncFailed(label.to_string()));
        } else {
            script.queued.push_back(QueuedCallback::SyncSucceeded(label.to_string()));
            script.queued.push_back(QueuedCallback::Announced {
                label: label.to_string(),
                tag: tag.to_string(),
            });
        }
        Ok(())
    }

    fn sync_point_achieved(&mut self, label: &str) -> Result<(), RtiError> {
        let mut script = self.shared.lock().unwrap();
        script.calls.push("sync_point_achieved");
        script.queued.push_back(QueuedCallback::Synchronized(label.to_string()));
        Ok(())
    }

    fn tick(&mut self, sink: &mut dyn FedEventSink, _wait: Duration) -> Result<usize, RtiError> {
        let callback = self.shared.lock().unwrap().queued.pop_front();
        let Some(callback) = callback else {
            return Ok(0);
        };
        match callback {
            QueuedCallback::Discovered { object, class, name } => sink.on_object_discovered(object, class, &name),
            QueuedCallback::Reflected {
                object,
                values,
                tag,
                time,
            } => sink.on_attributes_reflected(object, &values, &tag, time),
            QueuedCallback::RegulationEnabled(time) => sink.on_time_regulation_enabled(time),
            QueuedCallback::ConstrainedEnabled(time) => sink.on_time_constrained_enabled(time),
            QueuedCallback::Grant(time) => sink.on_time_advance_grant(time),
            QueuedCallback::SyncSucceeded(label) => sink.on_sync_registration_succeeded(&label),
            QueuedCallback::SyncFailed(label) => sink.on_sync_registration_failed(&label),
            QueuedCallback::Announced { label, tag } => sink.on_sync_announced(&label, &tag),
            QueuedCallback::Synchronized(label) => sink.on_federation_synchronized(&label),
        }
        Ok(1)
    }
}
