//! Opaque identifiers shared across compiler stages

use std::fmt;
use serde::{Deserialize, Serialize};

/// An opaque identifier for a host-language method, stable across
/// compilations of the same program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodHandle {
    pub token: u64,
    pub name: String,
}

impl MethodHandle {
    pub fn new(token: u64, name: impl Into<String>) -> Self {
        Self {
            token,
            name: name.into(),
        }
    }
}

impl fmt::Display for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.token)
    }
}

/// A reference back into the host source, carried on method declarations for
/// diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub file: Option<String>,
    pub line: u32,
}

impl SourceRef {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: Some(file.into()),
            line,
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}", file, self.line),
            None => write!(f, "<unknown>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn test_handle_display() {
        let handle = MethodHandle::new(42, "saxpy");
        assert_eq!(handle.to_string(), "saxpy#42");
    }

    #[test]
    fn test_handle_equality() {
        let a = MethodHandle::new(1, "f");
        let b = MethodHandle::new(1, "f");
        let c = MethodHandle::new(2, "f");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
