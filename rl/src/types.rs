//! Handles assigned by the RTI
//!
//! The RTI names everything with opaque numeric handles. Each kind gets its
//! own newtype so a class handle can never be passed where an attribute
//! handle belongs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle the RTI assigns to an object class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassHandle(pub u32);

impl fmt::Display for ClassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Handle the RTI assigns to a class attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeHandle(pub u32);

impl fmt::Display for AttributeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attr#{}", self.0)
    }
}

/// Handle the RTI assigns to a registered object instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectHandle(pub u32);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Handle the RTI assigns to a joined federate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FederateHandle(pub u32);

impl fmt::Display for FederateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "federate#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_display() {
        assert_eq!(ClassHandle(3).to_string(), "class#3");
        assert_eq!(AttributeHandle(7).to_string(), "attr#7");
        assert_eq!(ObjectHandle(1).to_string(), "object#1");
        assert_eq!(FederateHandle(42).to_string(), "federate#42");
    }

    #[test]
    fn test_handles_as_map_keys() {
        let mut routes: HashMap<(ClassHandle, AttributeHandle), &str> = HashMap::new();
        routes.insert((ClassHandle(1), AttributeHandle(2)), "position");

        assert_eq!(routes.get(&(ClassHandle(1), AttributeHandle(2))), Some(&"position"));
        assert_eq!(routes.get(&(ClassHandle(1), AttributeHandle(3))), None);
    }

    #[test]
    fn test_ordering() {
        let mut handles = vec![ObjectHandle(3), ObjectHandle(1), ObjectHandle(2)];
        handles.sort();
        assert_eq!(handles, vec![ObjectHandle(1), ObjectHandle(2), ObjectHandle(3)]);
    }
}
