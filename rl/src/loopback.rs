//! In-process loopback exchange
//!
//! A single-host RTI stand-in implementing the full client vocabulary:
//! conservative lockstep time management, timestamp-order delivery to
//! constrained federates, synchronization points, and class-level
//! publish/subscribe routing. Federates may run on separate threads; each
//! endpoint still drives its own protocol from one thread and receives
//! callbacks only inside [`RtiClient::tick`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::client::{FedEventSink, RtiClient, RtiError};
use crate::time::LogicalTime;
use crate::types::{AttributeHandle, ClassHandle, FederateHandle, ObjectHandle};

/// A queued callback awaiting dispatch into a federate's sink
#[derive(Debug, Clone)]
enum Callback {
    ObjectDiscovered {
        object: ObjectHandle,
        class: ClassHandle,
        name: String,
    },
    AttributesReflected {
        object: ObjectHandle,
        values: Vec<(AttributeHandle, Vec<u8>)>,
        tag: String,
        time: Option<LogicalTime>,
    },
    TimeRegulationEnabled(LogicalTime),
    TimeConstrainedEnabled(LogicalTime),
    TimeAdvanceGrant(LogicalTime),
    SyncRegistrationSucceeded(String),
    SyncRegistrationFailed(String),
    SyncAnnounced { label: String, tag: String },
    FederationSynchronized(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdvanceKind {
    TimeAdvance,
    TimeAdvanceAvailable,
    NextEvent,
    NextEventAvailable,
}

impl AdvanceKind {
    fn is_available(self) -> bool {
        matches!(self, AdvanceKind::TimeAdvanceAvailable | AdvanceKind::NextEventAvailable)
    }

    fn is_next_event(self) -> bool {
        matches!(self, AdvanceKind::NextEvent | AdvanceKind::NextEventAvailable)
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingAdvance {
    kind: AdvanceKind,
    to: LogicalTime,
}

struct ClassDef {
    name: String,
    attributes: BTreeMap<String, AttributeHandle>,
}

struct Instance {
    name: String,
    class: ClassHandle,
    owner: usize,
}

struct SyncPoint {
    registrar: usize,
    /// Members announced to and not yet achieved
    waiting_on: BTreeSet<usize>,
}

/// Per-endpoint protocol state
struct FedState {
    name: String,
    joined: bool,
    federation: Option<String>,
    regulating: bool,
    lookahead: f64,
    constrained: bool,
    /// Last granted time
    time: LogicalTime,
    pending: Option<PendingAdvance>,
    /// Last grant came from an available-variant request, which licenses a
    /// plain request at zero lookahead
    armed_available: bool,
    /// Receive-order dispatch queue
    inbox: VecDeque<Callback>,
    /// Timestamp-order messages held until a grant covers them
    tso: BTreeMap<(LogicalTime, u64), Callback>,
    discovered: HashSet<ObjectHandle>,
    subscriptions: HashMap<ClassHandle, HashSet<AttributeHandle>>,
    publications: HashMap<ClassHandle, HashSet<AttributeHandle>>,
}

impl FedState {
    fn new() -> Self {
        Self {
            name: String::new(),
            joined: false,
            federation: None,
            regulating: false,
            lookahead: 0.0,
            constrained: false,
            time: LogicalTime::ZERO,
            pending: None,
            armed_available: false,
            inbox: VecDeque::new(),
            tso: BTreeMap::new(),
            discovered: HashSet::new(),
            subscriptions: HashMap::new(),
            publications: HashMap::new(),
        }
    }

    /// Per the conservative contract: no message from this federate will
    /// ever carry a timestamp below this
    fn promise(&self) -> LogicalTime {
        let base = match self.pending {
            Some(p) => self.time.max(p.to),
            None => self.time,
        };
        base.offset_by(self.lookahead)
    }
}

struct Federation {
    members: BTreeSet<usize>,
    sync_points: BTreeMap<String, SyncPoint>,
}

struct ExchangeState {
    federations: HashMap<String, Federation>,
    feds: Vec<FedState>,
    classes: Vec<ClassDef>,
    class_names: HashMap<String, ClassHandle>,
    instances: BTreeMap<ObjectHandle, Instance>,
    instance_names: HashSet<String>,
    next_attribute: u32,
    next_object: u32,
    /// Tie-break for timestamp-order held events
    seq: u64,
}

impl ExchangeState {
    fn new() -> Self {
        Self {
            federations: HashMap::new(),
            feds: Vec::new(),
            classes: Vec::new(),
            class_names: HashMap::new(),
            instances: BTreeMap::new(),
            instance_names: HashSet::new(),
            next_attribute: 0,
            next_object: 0,
            seq: 0,
        }
    }

    fn class_index(&self, class: ClassHandle) -> Result<usize, RtiError> {
        let idx = (class.0 as usize)
            .checked_sub(1)
            .filter(|&i| i < self.classes.len())
            .ok_or_else(|| RtiError::NameNotFound(class.to_string()))?;
        Ok(idx)
    }
}

/// Lower bound on the timestamp of any future message reaching `me`
///
/// `None` means unbounded: no other regulating member constrains us.
fn lbts(state: &ExchangeState, federation: &Federation, me: usize) -> Option<LogicalTime> {
    federation
        .members
        .iter()
        .filter(|&&i| i != me)
        .filter_map(|&i| {
            let f = &state.feds[i];
            f.regulating.then(|| f.promise())
        })
        .min()
}

/// Grant every pending request the current promises allow, to a fixpoint
///
/// Each grant raises the grantee's promise, which can unblock the next
/// federate, so the sweep repeats until a full pass grants nothing.
fn evaluate_grants(state: &mut ExchangeState, federation: &str) {
    loop {
        let members: Vec<usize> = match state.federations.get(federation) {
            Some(fed) => fed.members.iter().copied().collect(),
            None => return,
        };
        let mut granted_any = false;
        for m in members {
            let Some(pending) = state.feds[m].pending else { continue };
            // next-event requests cap at the earliest held event
            let target = if pending.kind.is_next_event() {
                match state.feds[m].tso.keys().next() {
                    Some(&(held, _)) if held < pending.to => held,
                    _ => pending.to,
                }
            } else {
                pending.to
            };
            let safe = if !state.feds[m].constrained {
                true
            } else {
                match state.federations.get(federation).and_then(|fed| lbts(state, fed, m)) {
                    None => true,
                    Some(bound) => target <= bound,
                }
            };
            if safe {
                grant_advance(state, m, target, pending.kind);
                granted_any = true;
            }
        }
        if !granted_any {
            return;
        }
    }
}

/// Release held events at or before the grant, then deliver the grant
fn grant_advance(state: &mut ExchangeState, m: usize, target: LogicalTime, kind: AdvanceKind) {
    debug!(fed = m, %target, ?kind, "advance granted");
    let f = &mut state.feds[m];
    while let Some((key, callback)) = f.tso.pop_first() {
        if key.0 <= target {
            f.inbox.push_back(callback);
        } else {
            f.tso.insert(key, callback);
            break;
        }
    }
    f.time = target;
    f.pending = None;
    f.armed_available = kind.is_available();
    f.inbox.push_back(Callback::TimeAdvanceGrant(target));
}

struct Shared {
    state: Mutex<ExchangeState>,
    wakeup: Condvar,
}

/// Shared in-process exchange
///
/// Clone handles are cheap; every endpoint created from the same exchange
/// lives in the same universe.
#[derive(Clone)]
pub struct LoopbackExchange {
    shared: Arc<Shared>,
}

impl LoopbackExchange {
    pub fn new() -> Self {
        debug!("LoopbackExchange::new: called");
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ExchangeState::new()),
                wakeup: Condvar::new(),
            }),
        }
    }

    /// Create a new federate endpoint
    pub fn endpoint(&self) -> LoopbackRti {
        let mut state = self.shared.state.lock().unwrap();
        let id = state.feds.len();
        state.feds.push(FedState::new());
        debug!(fed = id, "LoopbackExchange::endpoint: created");
        LoopbackRti {
            shared: Arc::clone(&self.shared),
            id,
        }
    }
}

impl Default for LoopbackExchange {
    fn default() -> Self {
        Self::new()
    }
}

/// One federate's endpoint into the loopback exchange
pub struct LoopbackRti {
    shared: Arc<Shared>,
    id: usize,
}

impl LoopbackRti {
    fn lock(&self) -> MutexGuard<'_, ExchangeState> {
        self.shared.state.lock().unwrap()
    }

    /// The federation this endpoint is joined to, or the usual error
    fn joined_federation(state: &ExchangeState, id: usize) -> Result<String, RtiError> {
        match &state.feds[id].federation {
            Some(name) if state.feds[id].joined => Ok(name.clone()),
            _ => Err(RtiError::NotExecutionMember),
        }
    }

    fn advance_request(&mut self, kind: AdvanceKind, to: LogicalTime) -> Result<(), RtiError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let federation = Self::joined_federation(state, self.id)?;
        let f = &mut state.feds[self.id];
        if f.pending.is_some() {
            return Err(RtiError::TimeAdvanceAlreadyInProgress);
        }
        if to < f.time {
            return Err(RtiError::FederationTimeAlreadyPassed(f.time));
        }
        if !kind.is_available() && f.regulating && f.lookahead == 0.0 && !f.armed_available {
            return Err(RtiError::ZeroLookaheadRequiresAvailable);
        }
        f.pending = Some(PendingAdvance { kind, to });
        debug!(fed = self.id, ?kind, %to, "advance requested");
        evaluate_grants(state, &federation);
        drop(guard);
        self.shared.wakeup.notify_all();
        Ok(())
    }
}

impl RtiClient for LoopbackRti {
    fn create_federation_execution(&mut self, federation: &str, fom_file: &Path) -> Result<(), RtiError> {
        debug!(fed = self.id, federation, "LoopbackRti::create_federation_execution: called");
        let mut state = self.lock();
        if !fom_file.exists() {
            return Err(RtiError::CouldNotOpenFom(fom_file.display().to_string()));
        }
        if state.federations.contains_key(federation) {
            return Err(RtiError::FederationAlreadyExists);
        }
        state.federations.insert(
            federation.to_string(),
            Federation {
                members: BTreeSet::new(),
                sync_points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn destroy_federation_execution(&mut self, federation: &str) -> Result<(), RtiError> {
        debug!(fed = self.id, federation, "LoopbackRti::destroy_federation_execution: called");
        let mut state = self.lock();
        let fed = state
            .federations
            .get(federation)
            .ok_or(RtiError::FederationDoesNotExist)?;
        if !fed.members.is_empty() {
            return Err(RtiError::FederatesCurrentlyJoined);
        }
        state.federations.remove(federation);
        Ok(())
    }

    fn join_federation_execution(&mut self, federate: &str, federation: &str) -> Result<FederateHandle, RtiError> {
        debug!(fed = self.id, federate, federation, "LoopbackRti::join_federation_execution: called");
        let mut state = self.lock();
        if state.feds[self.id].joined {
            return Err(RtiError::AlreadyExecutionMember);
        }
        let fed = state
            .federations
            .get_mut(federation)
            .ok_or(RtiError::FederationDoesNotExist)?;
        fed.members.insert(self.id);
        let f = &mut state.feds[self.id];
        f.name = federate.to_string();
        f.joined = true;
        f.federation = Some(federation.to_string());
        Ok(FederateHandle(self.id as u32 + 1))
    }

    fn resign_federation_execution(&mut self) -> Result<(), RtiError> {
        debug!(fed = self.id, "LoopbackRti::resign_federation_execution: called");
        let mut guard = self.lock();
        let state = &mut *guard;
        let federation = Self::joined_federation(state, self.id)?;
        if let Some(fed) = state.federations.get_mut(&federation) {
            fed.members.remove(&self.id);
            // a resigning federate no longer blocks any sync point
            let mut completed = Vec::new();
            for (label, point) in fed.sync_points.iter_mut() {
                point.waiting_on.remove(&self.id);
                if point.waiting_on.is_empty() {
                    completed.push(label.clone());
                }
            }
            let members: Vec<usize> = fed.members.iter().copied().collect();
            for label in completed {
                fed.sync_points.remove(&label);
                for m in &members {
                    state.feds[*m]
                        .inbox
                        .push_back(Callback::FederationSynchronized(label.clone()));
                }
            }
        }
        // drop owned instances and their names
        let removed: Vec<ObjectHandle> = state
            .instances
            .iter()
            .filter(|(_, inst)| inst.owner == self.id)
            .map(|(&h, _)| h)
            .collect();
        for handle in removed {
            if let Some(inst) = state.instances.remove(&handle) {
                state.instance_names.remove(&inst.name);
            }
        }
        let f = &mut state.feds[self.id];
        f.joined = false;
        f.federation = None;
        f.regulating = false;
        f.lookahead = 0.0;
        f.constrained = false;
        f.time = LogicalTime::ZERO;
        f.pending = None;
        f.armed_available = false;
        f.inbox.clear();
        f.tso.clear();
        f.discovered.clear();
        f.subscriptions.clear();
        f.publications.clear();
        // losing a regulating member can unblock everyone else
        evaluate_grants(state, &federation);
        drop(guard);
        self.shared.wakeup.notify_all();
        Ok(())
    }

    fn object_class_handle(&mut self, name: &str) -> Result<ClassHandle, RtiError> {
        let mut state = self.lock();
        if let Some(&handle) = state.class_names.get(name) {
            return Ok(handle);
        }
        let handle = ClassHandle(state.classes.len() as u32 + 1);
        state.classes.push(ClassDef {
            name: name.to_string(),
            attributes: BTreeMap::new(),
        });
        state.class_names.insert(name.to_string(), handle);
        debug!(%handle, name, "object class registered");
        Ok(handle)
    }

    fn attribute_handle(&mut self, class: ClassHandle, name: &str) -> Result<AttributeHandle, RtiError> {
        let mut state = self.lock();
        let idx = state.class_index(class)?;
        if let Some(&handle) = state.classes[idx].attributes.get(name) {
            return Ok(handle);
        }
        state.next_attribute += 1;
        let handle = AttributeHandle(state.next_attribute);
        state.classes[idx].attributes.insert(name.to_string(), handle);
        debug!(%class, %handle, name, "attribute registered");
        Ok(handle)
    }

    fn publish_object_class(&mut self, class: ClassHandle, attributes: &[AttributeHandle]) -> Result<(), RtiError> {
        debug!(fed = self.id, %class, count = attributes.len(), "LoopbackRti::publish_object_class: called");
        let mut state = self.lock();
        Self::joined_federation(&state, self.id)?;
        state.class_index(class)?;
        state.feds[self.id]
            .publications
            .insert(class, attributes.iter().copied().collect());
        Ok(())
    }

    fn unpublish_object_class(&mut self, class: ClassHandle) -> Result<(), RtiError> {
        debug!(fed = self.id, %class, "LoopbackRti::unpublish_object_class: called");
        let mut state = self.lock();
        Self::joined_federation(&state, self.id)?;
        if state.feds[self.id].publications.remove(&class).is_none() {
            return Err(RtiError::ObjectClassNotPublished(class));
        }
        Ok(())
    }

    fn subscribe_object_class_attributes(
        &mut self,
        class: ClassHandle,
        attributes: &[AttributeHandle],
    ) -> Result<(), RtiError> {
        debug!(fed = self.id, %class, count = attributes.len(), "LoopbackRti::subscribe_object_class_attributes: called");
        let mut state = self.lock();
        Self::joined_federation(&state, self.id)?;
        state.class_index(class)?;
        state.feds[self.id]
            .subscriptions
            .insert(class, attributes.iter().copied().collect());
        Ok(())
    }

    fn unsubscribe_object_class(&mut self, class: ClassHandle) -> Result<(), RtiError> {
        debug!(fed = self.id, %class, "LoopbackRti::unsubscribe_object_class: called");
        let mut state = self.lock();
        Self::joined_federation(&state, self.id)?;
        if state.feds[self.id].subscriptions.remove(&class).is_none() {
            return Err(RtiError::ObjectClassNotSubscribed(class));
        }
        Ok(())
    }

    fn register_object_instance(&mut self, class: ClassHandle, name: &str) -> Result<ObjectHandle, RtiError> {
        debug!(fed = self.id, %class, name, "LoopbackRti::register_object_instance: called");
        let mut state = self.lock();
        Self::joined_federation(&state, self.id)?;
        state.class_index(class)?;
        if !state.feds[self.id].publications.contains_key(&class) {
            return Err(RtiError::ObjectClassNotPublished(class));
        }
        if state.instance_names.contains(name) {
            return Err(RtiError::ObjectNameInUse(name.to_string()));
        }
        state.next_object += 1;
        let handle = ObjectHandle(state.next_object);
        state.instances.insert(
            handle,
            Instance {
                name: name.to_string(),
                class,
                owner: self.id,
            },
        );
        state.instance_names.insert(name.to_string());
        Ok(handle)
    }

    fn update_attribute_values(
        &mut self,
        object: ObjectHandle,
        values: &[(AttributeHandle, Vec<u8>)],
        tag: &str,
        time: LogicalTime,
    ) -> Result<(), RtiError> {
        debug!(fed = self.id, %object, %time, tag, "LoopbackRti::update_attribute_values: called");
        let mut guard = self.lock();
        let state = &mut *guard;
        let federation = Self::joined_federation(state, self.id)?;
        let (class, instance_name) = {
            let instance = state.instances.get(&object).ok_or(RtiError::UnknownObject(object))?;
            if instance.owner != self.id {
                return Err(RtiError::UnknownObject(object));
            }
            (instance.class, instance.name.clone())
        };
        let sender_regulating = state.feds[self.id].regulating;
        if sender_regulating {
            let f = &state.feds[self.id];
            let floor = f.time.offset_by(f.lookahead);
            if time < floor {
                return Err(RtiError::InvalidFederationTime { sent: time, floor });
            }
        }
        let members: Vec<usize> = state
            .federations
            .get(&federation)
            .map(|fed| fed.members.iter().copied().collect())
            .unwrap_or_default();
        for m in members {
            if m == self.id {
                continue;
            }
            let receiver = &mut state.feds[m];
            let Some(subscribed) = receiver.subscriptions.get(&class) else {
                continue;
            };
            let filtered: Vec<(AttributeHandle, Vec<u8>)> = values
                .iter()
                .filter(|(attr, _)| subscribed.contains(attr))
                .cloned()
                .collect();
            if filtered.is_empty() {
                continue;
            }
            if receiver.discovered.insert(object) {
                receiver.inbox.push_back(Callback::ObjectDiscovered {
                    object,
                    class,
                    name: instance_name.clone(),
                });
            }
            let timestamp_order = receiver.constrained && sender_regulating;
            if timestamp_order && time > receiver.time {
                state.seq += 1;
                receiver.tso.insert(
                    (time, state.seq),
                    Callback::AttributesReflected {
                        object,
                        values: filtered,
                        tag: tag.to_string(),
                        time: Some(time),
                    },
                );
            } else {
                receiver.inbox.push_back(Callback::AttributesReflected {
                    object,
                    values: filtered,
                    tag: tag.to_string(),
                    time: timestamp_order.then_some(time),
                });
            }
        }
        // a freshly held event can pull a next-event grant earlier
        evaluate_grants(state, &federation);
        drop(guard);
        self.shared.wakeup.notify_all();
        Ok(())
    }

    fn enable_time_regulation(&mut self, lookahead: f64) -> Result<(), RtiError> {
        debug!(fed = self.id, lookahead, "LoopbackRti::enable_time_regulation: called");
        let mut state = self.lock();
        Self::joined_federation(&state, self.id)?;
        if !lookahead.is_finite() || lookahead < 0.0 {
            return Err(RtiError::InvalidLookahead(lookahead));
        }
        let f = &mut state.feds[self.id];
        if f.regulating {
            return Err(RtiError::TimeRegulationAlreadyEnabled);
        }
        f.regulating = true;
        f.lookahead = lookahead;
        let now = f.time;
        f.inbox.push_back(Callback::TimeRegulationEnabled(now));
        drop(state);
        self.shared.wakeup.notify_all();
        Ok(())
    }

    fn enable_time_constrained(&mut self) -> Result<(), RtiError> {
        debug!(fed = self.id, "LoopbackRti::enable_time_constrained: called");
        let mut state = self.lock();
        Self::joined_federation(&state, self.id)?;
        let f = &mut state.feds[self.id];
        if f.constrained {
            return Err(RtiError::TimeConstrainedAlreadyEnabled);
        }
        f.constrained = true;
        let now = f.time;
        f.inbox.push_back(Callback::TimeConstrainedEnabled(now));
        drop(state);
        self.shared.wakeup.notify_all();
        Ok(())
    }

    fn time_advance_request(&mut self, to: LogicalTime) -> Result<(), RtiError> {
        self.advance_request(AdvanceKind::TimeAdvance, to)
    }

    fn time_advance_request_available(&mut self, to: LogicalTime) -> Result<(), RtiError> {
        self.advance_request(AdvanceKind::TimeAdvanceAvailable, to)
    }

    fn next_event_request(&mut self, to: LogicalTime) -> Result<(), RtiError> {
        self.advance_request(AdvanceKind::NextEvent, to)
    }

    fn next_event_request_available(&mut self, to: LogicalTime) -> Result<(), RtiError> {
        self.advance_request(AdvanceKind::NextEventAvailable, to)
    }

    fn register_sync_point(&mut self, label: &str, tag: &str) -> Result<(), RtiError> {
        debug!(fed = self.id, label, "LoopbackRti::register_sync_point: called");
        let mut guard = self.lock();
        let state = &mut *guard;
        let federation = Self::joined_federation(state, self.id)?;
        let Some(fed) = state.federations.get_mut(&federation) else {
            return Err(RtiError::FederationDoesNotExist);
        };
        if fed.sync_points.contains_key(label) {
            state.feds[self.id]
                .inbox
                .push_back(Callback::SyncRegistrationFailed(label.to_string()));
        } else {
            let members = fed.members.clone();
            fed.sync_points.insert(
                label.to_string(),
                SyncPoint {
                    registrar: self.id,
                    waiting_on: members.clone(),
                },
            );
            state.feds[self.id]
                .inbox
                .push_back(Callback::SyncRegistrationSucceeded(label.to_string()));
            for m in members {
                state.feds[m].inbox.push_back(Callback::SyncAnnounced {
                    label: label.to_string(),
                    tag: tag.to_string(),
                });
            }
        }
        drop(guard);
        self.shared.wakeup.notify_all();
        Ok(())
    }

    fn sync_point_achieved(&mut self, label: &str) -> Result<(), RtiError> {
        debug!(fed = self.id, label, "LoopbackRti::sync_point_achieved: called");
        let mut guard = self.lock();
        let state = &mut *guard;
        let federation = Self::joined_federation(state, self.id)?;
        let Some(fed) = state.federations.get_mut(&federation) else {
            return Err(RtiError::FederationDoesNotExist);
        };
        let Some(point) = fed.sync_points.get_mut(label) else {
            return Err(RtiError::SyncPointLabelNotAnnounced(label.to_string()));
        };
        if !point.waiting_on.remove(&self.id) {
            // never announced to us, or achieved twice
            return Err(RtiError::SyncPointLabelNotAnnounced(label.to_string()));
        }
        if point.waiting_on.is_empty() {
            fed.sync_points.remove(label);
            let members: Vec<usize> = fed.members.iter().copied().collect();
            for m in members {
                state.feds[m]
                    .inbox
                    .push_back(Callback::FederationSynchronized(label.to_string()));
            }
        }
        drop(guard);
        self.shared.wakeup.notify_all();
        Ok(())
    }

    fn tick(&mut self, sink: &mut dyn FedEventSink, wait: Duration) -> Result<usize, RtiError> {
        let drained = {
            let mut guard = self.lock();
            if guard.feds[self.id].inbox.is_empty() && !wait.is_zero() {
                let (next, _timeout) = self.shared.wakeup.wait_timeout(guard, wait).unwrap();
                guard = next;
            }
            std::mem::take(&mut guard.feds[self.id].inbox)
        };
        let count = drained.len();
        // dispatch outside the critical section
        for callback in drained {
            match callback {
                Callback::ObjectDiscovered { object, class, name } => sink.on_object_discovered(object, class, &name),
                Callback::AttributesReflected {
                    object,
                    values,
                    tag,
                    time,
                } => sink.on_attributes_reflected(object, &values, &tag, time),
                Callback::TimeRegulationEnabled(time) => sink.on_time_regulation_enabled(time),
                Callback::TimeConstrainedEnabled(time) => sink.on_time_constrained_enabled(time),
                Callback::TimeAdvanceGrant(time) => sink.on_time_advance_grant(time),
                Callback::SyncRegistrationSucceeded(label) => sink.on_sync_registration_succeeded(&label),
                Callback::SyncRegistrationFailed(label) => sink.on_sync_registration_failed(&label),
                Callback::SyncAnnounced { label, tag } => sink.on_sync_announced(&label, &tag),
                Callback::FederationSynchronized(label) => sink.on_federation_synchronized(&label),
            }
        }
        Ok(count)
    }
}
