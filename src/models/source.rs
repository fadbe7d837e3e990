//! Descriptors for the physical endpoint that served an operation.
//!
//! These are diagnostics only. They travel with each result instead of
//! living in shared state, so concurrent requests never see each other's
//! descriptor.

use std::fmt;

/// Whether an operation went through the read path or the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Read,
    Write,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Read => f.write_str("read"),
            Role::Write => f.write_str("write"),
        }
    }
}

/// Network (or file) address of a relational backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: Option<u16>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.host, port),
            None => f.write_str(&self.host),
        }
    }
}

/// Which endpoint served one operation, and in which role.
///
/// Renders as `read:<endpoint>` or `write:<endpoint>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub role: Role,
    pub endpoint: Endpoint,
    /// Server-side session id, when the backend exposes one.
    pub session: Option<u64>,
}

impl ConnectionTarget {
    pub fn new(role: Role, endpoint: Endpoint) -> Self {
        Self {
            role,
            endpoint,
            session: None,
        }
    }

    pub fn with_session(mut self, session: u64) -> Self {
        self.session = Some(session);
        self
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.endpoint)
    }
}

/// A value paired with the descriptor of the endpoint that produced it.
#[derive(Debug, Clone)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConnectionTarget,
}

impl<T> Sourced<T> {
    pub fn new(value: T, source: ConnectionTarget) -> Self {
        Self { value, source }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced {
            value: f(self.value),
            source: self.source,
        }
    }

    /// Descriptor string for response metadata.
    pub fn descriptor(&self) -> String {
        self.source.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_format() {
        let read = ConnectionTarget::new(Role::Read, Endpoint::new("10.0.0.2", Some(3306)));
        assert_eq!(read.to_string(), "read:10.0.0.2:3306");

        let write = ConnectionTarget::new(Role::Write, Endpoint::new("sqlite:data/app.db", None))
            .with_session(42);
        assert_eq!(write.to_string(), "write:sqlite:data/app.db");
        assert_eq!(write.session, Some(42));
    }

    #[test]
    fn map_keeps_source() {
        let source = ConnectionTarget::new(Role::Read, Endpoint::new("replica", Some(3307)));
        let sourced = Sourced::new(3, source.clone()).map(|n| n * 2);
        assert_eq!(sourced.value, 6);
        assert_eq!(sourced.source, source);
        assert_eq!(sourced.descriptor(), "read:replica:3307");
    }
}
