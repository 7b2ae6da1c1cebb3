//! Newtype domain identifiers.
//!
//! Component names, attribute names and the `component.attribute` paths that
//! join them are distinct types so a driver can never confuse "which unit of
//! work" with "which value on it", even though all three are strings underneath.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display, Borrow<str>.
// An optional `forbid` character is rejected in addition to the empty string.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident $(, forbid $forbidden:literal)?
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or contains a forbidden character.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() {
                    return None;
                }
                $(
                    if v.contains($forbidden) {
                        return None;
                    }
                )?
                Some(Self(v))
            }

            /// Creates an identifier from a compile-time constant.
            ///
            /// # Panics
            ///
            /// Panics if `value` would be rejected by [`Self::new`].
            pub fn from_static(value: &'static str) -> Self {
                match Self::new(value) {
                    Some(id) => id,
                    None => panic!("invalid {} constant: {value:?}", stringify!($name)),
                }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value.clone())
                    .ok_or_else(|| format!("invalid {}: {value:?}", stringify!($name)))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

string_id! {
    /// Identifies a component by its name within the owning container.
    ///
    /// Names are unique per container. A `.` is not allowed because it
    /// separates the component from the attribute in a [`VarPath`].
    ComponentName, forbid '.'
}

string_id! {
    /// Names an input or output attribute on a component.
    ///
    /// May itself be dotted when addressing into a nested assembly
    /// (`"sub.dis1.y"` on the outer assembly resolves to child `sub`,
    /// attribute `dis1.y`).
    AttributeName
}

// ---------------------------------------------------------------------------
// Variable paths
// ---------------------------------------------------------------------------

/// A `component.attribute` path naming one value inside a container.
///
/// This is the target of a reference attribute and the endpoint of a
/// connection. The component part ends at the first `.`; everything after it
/// is the attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VarPath {
    component: ComponentName,
    attribute: AttributeName,
}

impl VarPath {
    /// Creates a path from its two parts.
    pub fn new(component: ComponentName, attribute: AttributeName) -> Self {
        Self {
            component,
            attribute,
        }
    }

    /// The component the path points into.
    pub fn component(&self) -> &ComponentName {
        &self.component
    }

    /// The attribute on that component.
    pub fn attribute(&self) -> &AttributeName {
        &self.attribute
    }
}

impl FromStr for VarPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (component, attribute) = s
            .split_once('.')
            .ok_or_else(|| format!("'{s}' is not of the form 'component.attribute'"))?;
        let component = ComponentName::new(component)
            .ok_or_else(|| format!("'{s}' has an empty component name"))?;
        let attribute = AttributeName::new(attribute)
            .ok_or_else(|| format!("'{s}' has an empty attribute name"))?;
        Ok(Self::new(component, attribute))
    }
}

impl TryFrom<String> for VarPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VarPath> for String {
    fn from(path: VarPath) -> String {
        path.to_string()
    }
}

impl fmt::Display for VarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.attribute)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed, generated internally
// ---------------------------------------------------------------------------

/// Identifies one invocation of a driver's `execute`.
///
/// Generated fresh for every execution and recorded on the tracing span so
/// all activity of a single run, nested drivers included, can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    /// Generates a new random execution identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_name_rejects_empty_and_dotted() {
        assert!(ComponentName::new("").is_none());
        assert!(ComponentName::new("a.b").is_none());
        assert_eq!(ComponentName::new("dis1").unwrap().as_str(), "dis1");
    }

    #[test]
    fn var_path_splits_on_first_dot() {
        let path: VarPath = "sub.dis1.y".parse().unwrap();
        assert_eq!(path.component().as_str(), "sub");
        assert_eq!(path.attribute().as_str(), "dis1.y");
        assert_eq!(path.to_string(), "sub.dis1.y");
    }

    #[test]
    fn var_path_requires_both_parts() {
        assert!("nodot".parse::<VarPath>().is_err());
        assert!(".x".parse::<VarPath>().is_err());
        assert!("a.".parse::<VarPath>().is_err());
    }

    #[test]
    fn var_path_deserializes_from_string() {
        let path: VarPath = serde_json::from_str("\"bcastr.x1\"").unwrap();
        assert_eq!(path.component().as_str(), "bcastr");
        assert!(serde_json::from_str::<VarPath>("\"broken\"").is_err());
    }
}
