//! Attribute binding registry and handle resolution
//!
//! Bindings are declared by name before the federation is joined, then
//! resolved to RTI handles in one grouped pass: one class lookup, one
//! publish or subscribe call, and for published classes one object
//! instance registration shared by every binding on that class.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::debug;

use rtilink::{AttributeHandle, ClassHandle, ObjectHandle, RtiClient};

use crate::errors::{FedError, protocol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Publish,
    Subscribe,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Publish => write!(f, "publish"),
            Direction::Subscribe => write!(f, "subscribe"),
        }
    }
}

/// What a port declares about its binding
#[derive(Debug, Clone)]
pub struct BindingSpec {
    pub name: String,
    pub class_name: String,
    pub data_type: rtilink::DataType,
    pub timestamped: bool,
}

impl BindingSpec {
    pub fn new(name: impl Into<String>, class_name: impl Into<String>, data_type: rtilink::DataType) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            data_type,
            timestamped: false,
        }
    }

    pub fn timestamped(mut self) -> Self {
        self.timestamped = true;
        self
    }
}

/// A declared binding plus its resolved RTI handles
#[derive(Debug, Clone)]
pub struct AttributeBinding {
    pub name: String,
    pub class_name: String,
    pub data_type: rtilink::DataType,
    pub direction: Direction,
    pub timestamped: bool,
    /// Resolved at initialization
    pub class: Option<ClassHandle>,
    pub attribute: Option<AttributeHandle>,
    /// The shared per-class instance, publish side only
    pub instance: Option<ObjectHandle>,
}

impl AttributeBinding {
    fn from_spec(spec: BindingSpec, direction: Direction) -> Self {
        Self {
            name: spec.name,
            class_name: spec.class_name,
            data_type: spec.data_type,
            direction,
            timestamped: spec.timestamped,
            class: None,
            attribute: None,
            instance: None,
        }
    }
}

#[derive(Default)]
pub struct ObjectRegistry {
    publications: BTreeMap<String, AttributeBinding>,
    subscriptions: BTreeMap<String, AttributeBinding>,
    sealed: bool,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_publication(&mut self, spec: BindingSpec) -> Result<(), FedError> {
        debug!(name = %spec.name, class = %spec.class_name, "ObjectRegistry::register_publication: called");
        self.register(spec, Direction::Publish)
    }

    pub fn register_subscription(&mut self, spec: BindingSpec) -> Result<(), FedError> {
        debug!(name = %spec.name, class = %spec.class_name, "ObjectRegistry::register_subscription: called");
        self.register(spec, Direction::Subscribe)
    }

    fn register(&mut self, spec: BindingSpec, direction: Direction) -> Result<(), FedError> {
        if self.sealed {
            return Err(FedError::RegistrationClosed);
        }
        let table = match direction {
            Direction::Publish => &mut self.publications,
            Direction::Subscribe => &mut self.subscriptions,
        };
        if table.contains_key(&spec.name) {
            return Err(FedError::DuplicateBinding {
                name: spec.name,
                direction,
            });
        }
        table.insert(spec.name.clone(), AttributeBinding::from_spec(spec, direction));
        Ok(())
    }

    /// No further registrations once the federation is joined
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Resolve every binding to RTI handles, grouped by object class
    ///
    /// Published classes get exactly one object instance, registered under
    /// `<class>.<federate>`, shared by all bindings on that class.
    pub fn resolve_handles(&mut self, client: &mut dyn RtiClient, federate_name: &str) -> Result<(), FedError> {
        debug!(federate_name, "ObjectRegistry::resolve_handles: called");
        let subscribe_classes: BTreeSet<String> =
            self.subscriptions.values().map(|b| b.class_name.clone()).collect();
        for class_name in subscribe_classes {
            let class = client
                .object_class_handle(&class_name)
                .map_err(protocol("object class handle"))?;
            let mut attributes = Vec::new();
            for binding in self.subscriptions.values_mut().filter(|b| b.class_name == class_name) {
                let attribute = client
                    .attribute_handle(class, &binding.name)
                    .map_err(protocol("attribute handle"))?;
                binding.class = Some(class);
                binding.attribute = Some(attribute);
                attributes.push(attribute);
            }
            client
                .subscribe_object_class_attributes(class, &attributes)
                .map_err(protocol("subscribe object class attributes"))?;
        }

        let publish_classes: BTreeSet<String> =
            self.publications.values().map(|b| b.class_name.clone()).collect();
        for class_name in publish_classes {
            let class = client
                .object_class_handle(&class_name)
                .map_err(protocol("object class handle"))?;
            let mut attributes = Vec::new();
            for binding in self.publications.values_mut().filter(|b| b.class_name == class_name) {
                let attribute = client
                    .attribute_handle(class, &binding.name)
                    .map_err(protocol("attribute handle"))?;
                binding.class = Some(class);
                binding.attribute = Some(attribute);
                attributes.push(attribute);
            }
            client
                .publish_object_class(class, &attributes)
                .map_err(protocol("publish object class"))?;
            let instance_name = format!("{}.{}", class_name, federate_name);
            let instance = client
                .register_object_instance(class, &instance_name)
                .map_err(protocol("register object instance"))?;
            debug!(class = %class, instance = %instance, name = %instance_name, "instance registered");
            for binding in self.publications.values_mut().filter(|b| b.class_name == class_name) {
                binding.instance = Some(instance);
            }
        }
        Ok(())
    }

    pub fn publication(&self, name: &str) -> Option<&AttributeBinding> {
        self.publications.get(name)
    }

    pub fn subscription(&self, name: &str) -> Option<&AttributeBinding> {
        self.subscriptions.get(name)
    }

    pub fn publications(&self) -> impl Iterator<Item = &AttributeBinding> {
        self.publications.values()
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &AttributeBinding> {
        self.subscriptions.values()
    }

    /// Resolved class handles on the publish side
    pub fn published_classes(&self) -> BTreeSet<ClassHandle> {
        self.publications.values().filter_map(|b| b.class).collect()
    }

    /// Resolved class handles on the subscribe side
    pub fn subscribed_classes(&self) -> BTreeSet<ClassHandle> {
        self.subscriptions.values().filter_map(|b| b.class).collect()
    }
}
