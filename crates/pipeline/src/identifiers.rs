//! Newtype domain identifiers.
//!
//! Card names, dimension names and model names are all strings on the wire, but
//! they are never interchangeable: a [`DimensionName`] passed where a
//! [`CardName`] is expected is a bug the compiler should catch.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or only whitespace.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.trim().is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// The name of a tarot card as it appears in the catalog (e.g. `"愚者"`).
    ///
    /// A card name alone is not an identity; pair it with a
    /// [`crate::Direction`] to form a [`crate::CardKey`].
    CardName
}

string_id! {
    /// The unique name of an interpretive dimension.
    ///
    /// Records are grouped and gap-checked by this name.
    DimensionName
}

string_id! {
    /// A provider-side model identifier (e.g. `"glm-4"`, `"qwen2.5:7b"`).
    ModelName
}

// ---------------------------------------------------------------------------
// UUID-backed identifiers (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single invocation of the generator.
///
/// Generated fresh for every CLI invocation and attached to the root span so
/// all activity from one run can be correlated in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_are_rejected() {
        assert!(CardName::new("").is_none());
        assert!(DimensionName::new("   ").is_none());
        assert_eq!(CardName::new("愚者").map(|n| n.to_string()), Some("愚者".into()));
    }

    #[test]
    fn names_serialize_as_plain_strings() {
        let name = DimensionName::new("感情-现状").unwrap();
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"感情-现状\"");
        let back: DimensionName = serde_json::from_str("\"感情-现状\"").unwrap();
        assert_eq!(back, name);
    }
}
