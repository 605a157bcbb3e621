use std::fmt;

use serde_derive::{Deserialize, Serialize};

/// Case-preserving name used for variations, state events and named graph
/// slots. Equality is case sensitive; case-insensitive matching goes through
/// [`StringId::eq_ignore_case`] so tooling can recover the canonical casing.
#[derive(
    Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StringId(String);

impl StringId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub const fn none() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl From<&str> for StringId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for StringId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for StringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
