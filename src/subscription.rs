//! Subscription identity handed to listeners and handlers.
//!
//! The subscription lifecycle itself (creating, activating, destroying)
//! belongs to the transport layer. Listeners only need to know which
//! instrument a message is for and at what service level it was requested.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How data for a subscription is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ServiceLevel {
    /// Initial image followed by a continuous update stream
    #[default]
    RealTime,
    /// One full image, then nothing
    Snapshot,
}

/// Source/symbol identity of a book subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookSubscription {
    source: String,
    symbol: String,
    transport: Option<String>,
    service_level: ServiceLevel,
}

impl BookSubscription {
    /// Real-time subscription for `symbol` on `source`.
    pub fn new(source: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            symbol: symbol.into(),
            transport: None,
            service_level: ServiceLevel::RealTime,
        }
    }

    /// Set the transport name.
    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = Some(transport.into());
        self
    }

    /// The one-shot snapshot subscription for the same instrument.
    pub fn as_snapshot(&self) -> Self {
        Self {
            service_level: ServiceLevel::Snapshot,
            ..self.clone()
        }
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[inline]
    pub fn transport(&self) -> Option<&str> {
        self.transport.as_deref()
    }

    #[inline]
    pub fn service_level(&self) -> ServiceLevel {
        self.service_level
    }

    #[inline]
    pub fn is_snapshot(&self) -> bool {
        self.service_level == ServiceLevel::Snapshot
    }
}

impl fmt::Display for BookSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.source, self.symbol)?;
        if self.is_snapshot() {
            f.write_str(" (snapshot)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_snapshot_keeps_identity() {
        let sub = BookSubscription::new("NYSE", "IBM").with_transport("tport");
        let snap = sub.as_snapshot();

        assert!(snap.is_snapshot());
        assert!(!sub.is_snapshot());
        assert_eq!(snap.source(), "NYSE");
        assert_eq!(snap.symbol(), "IBM");
        assert_eq!(snap.transport(), Some("tport"));
    }

    #[test]
    fn test_display() {
        let sub = BookSubscription::new("NYSE", "IBM");
        assert_eq!(sub.to_string(), "NYSE.IBM");
        assert_eq!(sub.as_snapshot().to_string(), "NYSE.IBM (snapshot)");
    }
}
