//! Resource snapshots and the DNS intent read from their annotations
//!
//! The watch layer turns orchestration-system objects into
//! [`ResourceSnapshot`]s; the engine only ever reads annotations through
//! [`DnsIntent`].

use std::collections::BTreeMap;
use std::fmt;

/// Prefix shared by every greydns annotation
pub const ANNOTATION_PREFIX: &str = "greydns.io/";

/// Enables DNS management when set to exactly `"true"`
pub const ANNOTATION_DNS: &str = "greydns.io/dns";

/// Desired fully-qualified domain name
pub const ANNOTATION_DOMAIN: &str = "greydns.io/domain";

/// Zone the domain belongs to
pub const ANNOTATION_ZONE: &str = "greydns.io/zone";

/// Point-in-time view of an annotated resource
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceSnapshot {
    pub namespace: String,
    pub name: String,
    /// Orchestration-system UID, used when publishing events against the object
    pub uid: Option<String>,
    pub annotations: BTreeMap<String, String>,
}

impl ResourceSnapshot {
    /// Create a snapshot without annotations
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid: None,
            annotations: BTreeMap::new(),
        }
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Set the UID
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Shorthand for a resource with all three greydns annotations
    pub fn annotated(
        namespace: impl Into<String>,
        name: impl Into<String>,
        enabled: bool,
        domain: impl Into<String>,
        zone: impl Into<String>,
    ) -> Self {
        Self::new(namespace, name)
            .with_annotation(ANNOTATION_DNS, if enabled { "true" } else { "false" })
            .with_annotation(ANNOTATION_DOMAIN, domain)
            .with_annotation(ANNOTATION_ZONE, zone)
    }

    /// `namespace/name` key
    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// Whether DNS management is enabled on this snapshot
    pub fn dns_enabled(&self) -> bool {
        self.annotations.get(ANNOTATION_DNS).map(String::as_str) == Some("true")
    }
}

/// Identity of a resource across snapshots
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Lifecycle notification delivered by the watch layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    Create(ResourceSnapshot),
    Update {
        old: ResourceSnapshot,
        new: ResourceSnapshot,
    },
    Delete(ResourceSnapshot),
}

impl ResourceEvent {
    /// The current snapshot carried by the event
    pub fn resource(&self) -> &ResourceSnapshot {
        match self {
            ResourceEvent::Create(r) | ResourceEvent::Delete(r) => r,
            ResourceEvent::Update { new, .. } => new,
        }
    }

    /// Short name of the event kind, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceEvent::Create(_) => "create",
            ResourceEvent::Update { .. } => "update",
            ResourceEvent::Delete(_) => "delete",
        }
    }
}

/// What a resource asks greydns to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsIntent {
    pub domain: String,
    pub zone: String,
}

/// Why an enabled resource has no usable intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentError {
    MissingDomain,
    MissingZone,
}

impl fmt::Display for IntentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentError::MissingDomain => write!(f, "annotation {} is missing or empty", ANNOTATION_DOMAIN),
            IntentError::MissingZone => write!(f, "annotation {} is missing or empty", ANNOTATION_ZONE),
        }
    }
}

impl DnsIntent {
    /// Read the intent from a snapshot
    ///
    /// `Ok(None)` when DNS management is not enabled. Enabled resources must
    /// carry both a domain and a zone.
    pub fn from_snapshot(resource: &ResourceSnapshot) -> Result<Option<Self>, IntentError> {
        if !resource.dns_enabled() {
            return Ok(None);
        }

        let domain = non_empty(resource, ANNOTATION_DOMAIN).ok_or(IntentError::MissingDomain)?;
        let zone = non_empty(resource, ANNOTATION_ZONE).ok_or(IntentError::MissingZone)?;

        Ok(Some(Self {
            domain: normalize(domain),
            zone: normalize(zone),
        }))
    }
}

fn non_empty<'a>(resource: &'a ResourceSnapshot, key: &str) -> Option<&'a str> {
    resource
        .annotations
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Lowercase, without the root dot; provider listings use this form
fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Whether any greydns annotation differs between two snapshots
pub fn annotations_changed(old: &ResourceSnapshot, new: &ResourceSnapshot) -> bool {
    let greydns = |r: &ResourceSnapshot| -> BTreeMap<String, String> {
        r.annotations
            .iter()
            .filter(|(k, _)| k.starts_with(ANNOTATION_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    };
    greydns(old) != greydns(new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_disabled() {
        let r = ResourceSnapshot::annotated("default", "svc", false, "api.example.com", "example.com");
        assert_eq!(DnsIntent::from_snapshot(&r), Ok(None));
    }

    #[test]
    fn test_intent_requires_literal_true() {
        let r = ResourceSnapshot::new("default", "svc")
            .with_annotation(ANNOTATION_DNS, "True")
            .with_annotation(ANNOTATION_DOMAIN, "api.example.com")
            .with_annotation(ANNOTATION_ZONE, "example.com");
        assert_eq!(DnsIntent::from_snapshot(&r), Ok(None));

        let r = ResourceSnapshot::new("default", "svc");
        assert_eq!(DnsIntent::from_snapshot(&r), Ok(None));
    }

    #[test]
    fn test_intent_enabled() {
        let r = ResourceSnapshot::annotated("default", "svc", true, "api.example.com", "example.com");
        let intent = DnsIntent::from_snapshot(&r).unwrap().unwrap();
        assert_eq!(intent.domain, "api.example.com");
        assert_eq!(intent.zone, "example.com");
    }

    #[test]
    fn test_intent_is_normalized() {
        let r = ResourceSnapshot::annotated("default", "svc", true, "API.Example.com.", "Example.com");
        let intent = DnsIntent::from_snapshot(&r).unwrap().unwrap();
        assert_eq!(intent.domain, "api.example.com");
        assert_eq!(intent.zone, "example.com");
    }

    #[test]
    fn test_intent_missing_fields() {
        let r = ResourceSnapshot::new("default", "svc")
            .with_annotation(ANNOTATION_DNS, "true")
            .with_annotation(ANNOTATION_ZONE, "example.com");
        assert_eq!(DnsIntent::from_snapshot(&r), Err(IntentError::MissingDomain));

        let r = ResourceSnapshot::new("default", "svc")
            .with_annotation(ANNOTATION_DNS, "true")
            .with_annotation(ANNOTATION_DOMAIN, "api.example.com")
            .with_annotation(ANNOTATION_ZONE, "  ");
        assert_eq!(DnsIntent::from_snapshot(&r), Err(IntentError::MissingZone));
    }

    #[test]
    fn test_annotations_changed_ignores_foreign_keys() {
        let old = ResourceSnapshot::annotated("default", "svc", true, "api.example.com", "example.com");
        let new = old.clone().with_annotation("kubectl.kubernetes.io/last-applied", "{}");
        assert!(!annotations_changed(&old, &new));
    }

    #[test]
    fn test_annotations_changed_detects_edits_and_removals() {
        let old = ResourceSnapshot::annotated("default", "svc", true, "api.example.com", "example.com");
        let renamed = ResourceSnapshot::annotated("default", "svc", true, "www.example.com", "example.com");
        assert!(annotations_changed(&old, &renamed));

        let mut removed = old.clone();
        removed.annotations.remove(ANNOTATION_ZONE);
        assert!(annotations_changed(&old, &removed));
        assert!(annotations_changed(&removed, &old));
    }

    #[test]
    fn test_resource_key_display() {
        let r = ResourceSnapshot::new("prod", "web");
        assert_eq!(r.key().to_string(), "prod/web");
    }
}
