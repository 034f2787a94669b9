//! Callback sink
//!
//! The single mutable surface handed to [`rtilink::RtiClient::tick`].
//! Callbacks record state here; nothing re-enters the client from inside a
//! callback. Decode failures are parked as a fault and surface at the next
//! pump instead of unwinding through the RTI.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use rtilink::{
    AttrValue, AttributeHandle, ClassHandle, DataType, FedEventSink, LogicalTime, ObjectHandle, TimedEnvelope,
};

use crate::errors::FedError;
use crate::ports::{PendingEvent, ReflectedValue};
use crate::registry::ObjectRegistry;

struct Route {
    binding: String,
    data_type: DataType,
    timestamped: bool,
}

/// Everything the RTI told us that we have not consumed yet
#[derive(Default)]
pub struct CallbackSink {
    grant: Option<LogicalTime>,
    last_granted: LogicalTime,
    regulation_enabled: bool,
    constrained_enabled: bool,
    registration: HashMap<String, bool>,
    announced: HashSet<String>,
    synchronized: HashSet<String>,
    discovered: HashMap<ObjectHandle, ClassHandle>,
    routes: HashMap<(ClassHandle, AttributeHandle), Route>,
    /// Matured and unmatured events, one FIFO queue per binding
    events: BTreeMap<String, VecDeque<PendingEvent>>,
    fault: Option<FedError>,
}

impl CallbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn which (class, attribute) pairs feed which bindings
    pub fn install_routes(&mut self, registry: &ObjectRegistry) {
        for binding in registry.subscriptions() {
            let (Some(class), Some(attribute)) = (binding.class, binding.attribute) else {
                continue;
            };
            self.routes.insert(
                (class, attribute),
                Route {
                    binding: binding.name.clone(),
                    data_type: binding.data_type,
                    timestamped: binding.timestamped,
                },
            );
        }
        debug!(routes = self.routes.len(), "CallbackSink::install_routes: done");
    }

    pub fn is_regulation_enabled(&self) -> bool {
        self.regulation_enabled
    }

    pub fn is_constrained_enabled(&self) -> bool {
        self.constrained_enabled
    }

    pub fn registration_outcome(&self, label: &str) -> Option<bool> {
        self.registration.get(label).copied()
    }

    pub fn is_announced(&self, label: &str) -> bool {
        self.announced.contains(label)
    }

    pub fn is_synchronized(&self, label: &str) -> bool {
        self.synchronized.contains(label)
    }

    pub fn take_grant(&mut self) -> Option<LogicalTime> {
        self.grant.take()
    }

    /// The first recorded fault wins; later ones are collateral
    pub fn record_fault(&mut self, fault: FedError) {
        if self.fault.is_none() {
            self.fault = Some(fault);
        }
    }

    pub fn take_fault(&mut self) -> Option<FedError> {
        self.fault.take()
    }

    /// Drain every event with a timestamp at or before `through`
    ///
    /// Queues are FIFO per binding; the merged result is ordered by time,
    /// with arrival order breaking ties.
    pub fn take_events_through(&mut self, through: LogicalTime) -> Vec<PendingEvent> {
        let mut released = Vec::new();
        for queue in self.events.values_mut() {
            while let Some(event) = queue.pop_front() {
                if event.time <= through {
                    released.push(event);
                } else {
                    queue.push_front(event);
                    break;
                }
            }
        }
        released.sort_by(|a, b| a.time.cmp(&b.time));
        released
    }

    fn decode(&mut self, route_key: (ClassHandle, AttributeHandle), bytes: &[u8], callback_time: Option<LogicalTime>) {
        let Some(route) = self.routes.get(&route_key) else {
            warn!(class = %route_key.0, attribute = %route_key.1, "reflection without a matching subscription");
            return;
        };
        let (value, time) = if route.timestamped {
            match TimedEnvelope::decode(bytes) {
                Ok(envelope) => {
                    if envelope.payload.data_type() != route.data_type {
                        let fault = FedError::TypeMismatch {
                            binding: route.binding.clone(),
                            expected: route.data_type,
                            got: envelope.payload.data_type(),
                        };
                        self.record_fault(fault);
                        return;
                    }
                    let time = envelope.timestamp;
                    (ReflectedValue::Timed(envelope), time)
                }
                Err(source) => {
                    let fault = FedError::Decoding {
                        binding: route.binding.clone(),
                        data_type: route.data_type,
                        source,
                    };
                    self.record_fault(fault);
                    return;
                }
            }
        } else {
            match AttrValue::decode(route.data_type, bytes) {
                Ok(value) => (
                    ReflectedValue::Scalar(value),
                    callback_time.unwrap_or(self.last_granted),
                ),
                Err(source) => {
                    let fault = FedError::Decoding {
                        binding: route.binding.clone(),
                        data_type: route.data_type,
                        source,
                    };
                    self.record_fault(fault);
                    return;
                }
            }
        };
        let binding = route.binding.clone();
        self.events.entry(binding.clone()).or_default().push_back(PendingEvent {
            binding,
            time,
            value,
        });
    }
}

impl FedEventSink for CallbackSink {
    fn on_object_discovered(&mut self, object: ObjectHandle, class: ClassHandle, name: &str) {
        debug!(%object, %class, name, "object discovered");
        self.discovered.insert(object, class);
    }

    fn on_attributes_reflected(
        &mut self,
        object: ObjectHandle,
        values: &[(AttributeHandle, Vec<u8>)],
        tag: &str,
        time: Option<LogicalTime>,
    ) {
        let Some(&class) = self.discovered.get(&object) else {
            warn!(%object, tag, "reflection for an undiscovered object");
            return;
        };
        for (attribute, bytes) in values {
            self.decode((class, *attribute), bytes, time);
        }
    }

    fn on_time_regulation_enabled(&mut self, time: LogicalTime) {
        debug!(%time, "time regulation enabled");
        self.regulation_enabled = true;
    }

    fn on_time_constrained_enabled(&mut self, time: LogicalTime) {
        debug!(%time, "time constrained enabled");
        self.constrained_enabled = true;
    }

    fn on_time_advance_grant(&mut self, time: LogicalTime) {
        debug!(%time, "time advance grant");
        self.grant = Some(time);
        self.last_granted = time;
    }

    fn on_sync_registration_succeeded(&mut self, label: &str) {
        self.registration.insert(label.to_string(), true);
    }

    fn on_sync_registration_failed(&mut self, label: &str) {
        self.registration.insert(label.to_string(), false);
    }

    fn on_sync_announced(&mut self, label: &str, _tag: &str) {
        debug!(label, "sync point announced");
        self.announced.insert(label.to_string());
    }

    fn on_federation_synchronized(&mut self, label: &str) {
        debug!(label, "federation synchronized");
        self.synchronized.insert(label.to_string());
    }
}
