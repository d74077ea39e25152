// # Notifier Trait
//
// Outbound channel to the orchestration system's event/audit stream.
// The engine uses it for exactly one thing: telling a resource that the domain
// it asked for already belongs to someone else.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::Result;
use crate::resource::ResourceSnapshot;

/// Reason attached to duplicate-claim notifications
pub const REASON_DUPLICATE_DOMAIN: &str = "DuplicateDomain";

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
}

impl Severity {
    /// Event type string used by Kubernetes
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "Warning",
        }
    }
}

/// A notification about a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub resource: ResourceSnapshot,
    pub severity: Severity,
    pub reason: String,
    pub message: String,
}

impl Notification {
    /// Build the duplicate-claim warning for `resource`
    pub fn duplicate_domain(resource: &ResourceSnapshot, domain: &str) -> Self {
        Self {
            resource: resource.clone(),
            severity: Severity::Warning,
            reason: REASON_DUPLICATE_DOMAIN.to_string(),
            message: format!(
                "Duplicate domain entry, {} is already owned by another service",
                domain
            ),
        }
    }
}

/// Trait for notification sinks
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish a notification
    ///
    /// Failures are logged by the caller and never affect reconciliation.
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Notifier that keeps every notification in memory
///
/// Useful for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications published so far
    pub fn notifications(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| crate::Error::notify("notification buffer poisoned"))?
            .push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_domain_notification() {
        let resource = ResourceSnapshot::new("default", "svc-b");
        let n = Notification::duplicate_domain(&resource, "api.example.com");
        assert_eq!(n.severity, Severity::Warning);
        assert_eq!(n.severity.as_str(), "Warning");
        assert_eq!(n.reason, "DuplicateDomain");
        assert_eq!(n.resource.name, "svc-b");
        assert!(n.message.contains("api.example.com"));
    }

    #[tokio::test]
    async fn test_memory_notifier_records() {
        let notifier = MemoryNotifier::new();
        let resource = ResourceSnapshot::new("default", "svc-b");
        notifier
            .notify(Notification::duplicate_domain(&resource, "api.example.com"))
            .await
            .unwrap();
        assert_eq!(notifier.notifications().len(), 1);
    }
}
