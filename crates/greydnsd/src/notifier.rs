//! Kubernetes Event publishing for resource notifications

use async_trait::async_trait;
use greydns_core::traits::{Notification, Notifier};
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::jiff::Timestamp;
use kube::api::{Api, PostParams};
use kube::{Client, Resource};

/// Component name stamped on every published Event
pub const REPORTING_COMPONENT: &str = "greydns-controller";

/// Publishes notifications as core/v1 Events on the Service
pub struct KubeEventNotifier {
    client: Client,
    /// Pod name, when known
    instance: Option<String>,
}

impl KubeEventNotifier {
    pub fn new(client: Client, instance: Option<String>) -> Self {
        Self { client, instance }
    }
}

/// Build the Event object for a notification
pub(crate) fn build_event(notification: &Notification, instance: Option<&str>) -> Event {
    let resource = &notification.resource;
    let now = Time(Timestamp::now());

    Event {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", resource.name)),
            namespace: Some(resource.namespace.clone()),
            ..Default::default()
        },
        involved_object: ObjectReference {
            api_version: Some(Service::api_version(&()).to_string()),
            kind: Some(Service::kind(&()).to_string()),
            name: Some(resource.name.clone()),
            namespace: Some(resource.namespace.clone()),
            uid: resource.uid.clone(),
            ..Default::default()
        },
        reason: Some(notification.reason.clone()),
        message: Some(notification.message.clone()),
        type_: Some(notification.severity.as_str().to_string()),
        source: Some(EventSource {
            component: Some(REPORTING_COMPONENT.to_string()),
            ..Default::default()
        }),
        reporting_component: Some(REPORTING_COMPONENT.to_string()),
        reporting_instance: instance.map(str::to_string),
        first_timestamp: Some(now.clone()),
        last_timestamp: Some(now),
        count: Some(1),
        ..Default::default()
    }
}

#[async_trait]
impl Notifier for KubeEventNotifier {
    async fn notify(&self, notification: Notification) -> greydns_core::Result<()> {
        let event = build_event(&notification, self.instance.as_deref());
        let api: Api<Event> = Api::namespaced(self.client.clone(), &notification.resource.namespace);

        api.create(&PostParams::default(), &event)
            .await
            .map(|_| ())
            .map_err(|e| {
                greydns_core::Error::notify(format!(
                    "Failed to create event for {}/{}: {}",
                    notification.resource.namespace, notification.resource.name, e
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greydns_core::ResourceSnapshot;

    #[test]
    fn test_duplicate_domain_event() {
        let resource = ResourceSnapshot::new("default", "svc-b").with_uid("1234-abcd");
        let notification = Notification::duplicate_domain(&resource, "api.example.com");

        let event = build_event(&notification, Some("greydns-7d9f"));

        assert_eq!(event.type_.as_deref(), Some("Warning"));
        assert_eq!(event.reason.as_deref(), Some("DuplicateDomain"));
        assert_eq!(event.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(event.involved_object.kind.as_deref(), Some("Service"));
        assert_eq!(event.involved_object.api_version.as_deref(), Some("v1"));
        assert_eq!(event.involved_object.name.as_deref(), Some("svc-b"));
        assert_eq!(event.involved_object.uid.as_deref(), Some("1234-abcd"));
        assert_eq!(event.reporting_component.as_deref(), Some("greydns-controller"));
        assert_eq!(event.reporting_instance.as_deref(), Some("greydns-7d9f"));
        assert!(event.message.unwrap().contains("api.example.com"));
        assert_eq!(event.first_timestamp, event.last_timestamp);
        assert!(event.first_timestamp.is_some());
    }
}
