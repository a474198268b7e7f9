//! Deterministic identity strings for entities and metrics.

use serde::Serialize;
use std::fmt::{self, Display, Write};

/// Signature built by concatenating parts with `/`.
///
/// Two values built from the same parts in the same order are equal,
/// so the string doubles as a registry key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one part.
    pub fn concat<T: Display>(&mut self, part: T) -> &mut Self {
        // Writing to a String cannot fail.
        let _ = write!(self.0, "/{}", part);
        self
    }

    /// Append one part, builder style.
    pub fn with<T: Display>(mut self, part: T) -> Self {
        self.concat(part);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
