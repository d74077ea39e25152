//! Service watch
//!
//! Turns the raw Service watch into greydns resource events. The watcher only
//! reports current objects, so the previous snapshot of every Service is kept
//! here to synthesize `Update { old, new }` and to notice Services that
//! disappeared while the watch was re-listing.

use std::collections::{HashMap, HashSet};

use futures::StreamExt;
use greydns_core::resource::annotations_changed;
use greydns_core::{ResourceEvent, ResourceKey, ResourceSnapshot};
use k8s_openapi::api::core::v1::Service;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client, ResourceExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

/// Snapshot of a Service, `None` when it has no name
pub fn snapshot_from_service(service: &Service) -> Option<ResourceSnapshot> {
    let name = service.metadata.name.clone()?;
    Some(ResourceSnapshot {
        namespace: service.namespace().unwrap_or_else(|| "default".to_string()),
        name,
        uid: service.metadata.uid.clone(),
        annotations: service.annotations().clone(),
    })
}

/// Last-seen snapshot per Service
#[derive(Debug, Default)]
pub struct SnapshotTracker {
    known: HashMap<ResourceKey, ResourceSnapshot>,
    /// Keys seen since the current re-list started
    relisting: Option<HashSet<ResourceKey>>,
}

impl SnapshotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an added or modified Service
    ///
    /// Yields `Create` for unseen Services and `Update` when a greydns
    /// annotation changed; other modifications are absorbed.
    pub fn observe(&mut self, snapshot: ResourceSnapshot) -> Option<ResourceEvent> {
        let key = snapshot.key();
        if let Some(seen) = self.relisting.as_mut() {
            seen.insert(key.clone());
        }

        match self.known.insert(key, snapshot.clone()) {
            None => Some(ResourceEvent::Create(snapshot)),
            Some(old) if annotations_changed(&old, &snapshot) => Some(ResourceEvent::Update { old, new: snapshot }),
            Some(_) => None,
        }
    }

    /// Record a deleted Service
    pub fn forget(&mut self, snapshot: ResourceSnapshot) -> ResourceEvent {
        let key = snapshot.key();
        if let Some(seen) = self.relisting.as_mut() {
            seen.remove(&key);
        }
        self.known.remove(&key);
        ResourceEvent::Delete(snapshot)
    }

    /// A full re-list is starting
    pub fn begin_relist(&mut self) {
        self.relisting = Some(HashSet::new());
    }

    /// The re-list finished; Services it did not return are gone
    pub fn end_relist(&mut self) -> Vec<ResourceEvent> {
        let Some(seen) = self.relisting.take() else {
            return Vec::new();
        };

        let mut gone: Vec<ResourceKey> = self
            .known
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        gone.sort();

        gone.into_iter()
            .filter_map(|key| self.known.remove(&key))
            .map(ResourceEvent::Delete)
            .collect()
    }

    /// Translate one watcher event
    pub fn handle(&mut self, event: watcher::Event<Service>) -> Vec<ResourceEvent> {
        match event {
            watcher::Event::Init => {
                debug!("Service re-list started");
                self.begin_relist();
                Vec::new()
            }
            watcher::Event::InitApply(service) | watcher::Event::Apply(service) => snapshot_from_service(&service)
                .and_then(|s| self.observe(s))
                .into_iter()
                .collect(),
            watcher::Event::InitDone => {
                let gone = self.end_relist();
                debug!("Service re-list done, {} services vanished", gone.len());
                gone
            }
            watcher::Event::Delete(service) => snapshot_from_service(&service)
                .map(|s| self.forget(s))
                .into_iter()
                .collect(),
        }
    }

    /// Number of Services currently tracked
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// Watch Services in every namespace
///
/// Returns the event stream to feed the engine and the forwarding task. The
/// stream ends when the task stops.
pub fn spawn_service_watch(client: Client) -> (UnboundedReceiverStream<ResourceEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(forward_service_events(client, tx));
    (UnboundedReceiverStream::new(rx), handle)
}

async fn forward_service_events(client: Client, tx: mpsc::UnboundedSender<ResourceEvent>) {
    let api: Api<Service> = Api::all(client);
    let mut stream = std::pin::pin!(watcher(api, watcher::Config::default()).default_backoff());
    let mut tracker = SnapshotTracker::new();

    info!("Watching Services in all namespaces");

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                for resource_event in tracker.handle(event) {
                    if tx.send(resource_event).is_err() {
                        debug!("Engine stopped listening, ending Service watch");
                        return;
                    }
                }
            }
            Err(e) => warn!("Service watch error: {}", e),
        }
    }

    info!("Service watch ended");
}
