//! Core sync engine
//!
//! The SyncEngine is responsible for:
//! - Consuming resource lifecycle events from the watch layer
//! - Serializing events per resource while running resources in parallel
//! - Reconciling each event against the record cache via [`Reconciler`]
//! - Refreshing the cache from the provider on a timer
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ Watch layer │─── ResourceEvent ───┐
//! └─────────────┘                     │
//!                                     ▼
//!                            ┌──────────────┐      ┌──────────────┐
//!                            │  SyncEngine  │──────│ refresh loop │
//!                            └──────────────┘      └──────────────┘
//!                                     │ one worker per resource
//!         ┌───────────────────────────┼───────────────────────────┐
//!         ▼                           ▼                           ▼
//! ┌─────────────┐           ┌──────────────┐           ┌─────────────┐
//! │ RecordCache │           │ DnsProvider  │           │   Events    │
//! │ (decide)    │           │ (mutate)     │           │  (monitor)  │
//! └─────────────┘           └──────────────┘           └─────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. Resource event arrives
//! 2. Routed to the worker for that `namespace/name` (spawned on demand)
//! 3. Worker locks the affected domains and decides from the cache
//! 4. Provider call issued, cache updated on success
//! 5. Outcome emitted for monitoring/logging

pub mod locks;
pub mod reconcile;

pub use locks::{DomainGuard, DomainLocks};
pub use reconcile::{ReconcileOutcome, Reconciler};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::cache::RecordCache;
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::resource::{ResourceEvent, ResourceKey};
use crate::traits::{DnsProvider, Notifier};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started { cached_records: usize },

    /// Engine stopped
    Stopped { reason: String },

    /// A record was created for a resource
    RecordCreated { resource: ResourceKey, domain: String },

    /// A resource's record moved to a new domain
    RecordRenamed {
        resource: ResourceKey,
        from: String,
        to: String,
    },

    /// A resource's record was deleted
    RecordDeleted { resource: ResourceKey, domain: String },

    /// The resource already owns its record
    RecordUnchanged { resource: ResourceKey, domain: String },

    /// The requested domain is owned by another resource
    DuplicateDomain { resource: ResourceKey, domain: String },

    /// Reconciliation failed and the event was dropped
    ReconcileFailed { resource: ResourceKey, error: String },

    /// Nothing to do for the event
    EventSkipped { resource: ResourceKey },

    /// The cache was rebuilt from the provider
    CacheRefreshed { records: usize },

    /// A cache refresh failed; previous contents kept
    CacheRefreshFailed { error: String },
}

impl EngineEvent {
    fn from_outcome(resource: ResourceKey, outcome: ReconcileOutcome) -> Self {
        match outcome {
            ReconcileOutcome::Skipped => EngineEvent::EventSkipped { resource },
            ReconcileOutcome::Created(domain) => EngineEvent::RecordCreated { resource, domain },
            ReconcileOutcome::Unchanged(domain) => EngineEvent::RecordUnchanged { resource, domain },
            ReconcileOutcome::Renamed { from, to } => EngineEvent::RecordRenamed { resource, from, to },
            ReconcileOutcome::Deleted(domain) => EngineEvent::RecordDeleted { resource, domain },
            ReconcileOutcome::Conflict(domain) => EngineEvent::DuplicateDomain { resource, domain },
            ReconcileOutcome::Failed(error) => EngineEvent::ReconcileFailed { resource, error },
        }
    }
}

/// A running per-resource worker
struct Worker {
    tx: mpsc::UnboundedSender<ResourceEvent>,
    /// Resolves (with an error) once the worker task has exited
    done: oneshot::Receiver<()>,
}

/// Core sync engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Prime the cache with [`SyncEngine::refresh_now()`]
/// 3. Start with [`SyncEngine::run()`]
/// 4. Engine runs until the shutdown signal or the end of the event stream
///
/// ## Ordering
///
/// Events for one resource are handled strictly in arrival order. Events for
/// different resources run concurrently; races on a shared domain are settled
/// by per-domain locks inside the [`Reconciler`].
///
/// ## Load Resistance
///
/// The monitoring channel is bounded. When it is full, events are dropped
/// with a warning instead of stalling reconciliation.
pub struct SyncEngine {
    reconciler: Arc<Reconciler>,
    config: watch::Receiver<ControllerConfig>,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Parameters
    ///
    /// - `provider`: connected DNS provider
    /// - `cache`: record cache shared with the provider's cleanup pass
    /// - `notifier`: sink for duplicate-domain warnings
    /// - `config`: live controller settings
    /// - `event_channel_capacity`: size of the monitoring channel
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        provider: Arc<dyn DnsProvider>,
        cache: RecordCache,
        notifier: Arc<dyn Notifier>,
        config: watch::Receiver<ControllerConfig>,
        event_channel_capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.borrow().validate()?;
        if event_channel_capacity == 0 {
            return Err(Error::config("event_channel_capacity must be > 0"));
        }

        let (tx, rx) = mpsc::channel(event_channel_capacity);
        let reconciler = Reconciler::new(provider, cache, notifier, config.clone());

        let engine = Self {
            reconciler: Arc::new(reconciler),
            config,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// The reconciler driving this engine
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Run one full cache refresh immediately
    pub async fn refresh_now(&self) -> Result<usize> {
        let records = self.reconciler.refresh_cache().await?;
        emit_event(&self.event_tx, EngineEvent::CacheRefreshed { records });
        Ok(records)
    }

    /// Run the engine until SIGINT/SIGTERM or the end of `events`
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal error
    pub async fn run<S>(&self, events: S) -> Result<()>
    where
        S: Stream<Item = ResourceEvent> + Send + Unpin,
    {
        self.run_internal(events, None).await
    }

    /// Run with a programmatic shutdown signal
    ///
    /// Embedders and tests use this instead of OS signals.
    pub async fn run_with_shutdown<S>(&self, events: S, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()>
    where
        S: Stream<Item = ResourceEvent> + Send + Unpin,
    {
        self.run_internal(events, shutdown_rx).await
    }

    async fn run_internal<S>(&self, mut events: S, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()>
    where
        S: Stream<Item = ResourceEvent> + Send + Unpin,
    {
        self.emit_event(EngineEvent::Started {
            cached_records: self.reconciler.cache().len().await,
        });

        let refresh_task = tokio::spawn(refresh_loop(
            Arc::clone(&self.reconciler),
            self.config.clone(),
            self.event_tx.clone(),
        ));

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => wait_for_signal().await,
            }
        };
        tokio::pin!(shutdown);

        let mut workers: HashMap<ResourceKey, Worker> = HashMap::new();
        let mut retired: HashMap<ResourceKey, oneshot::Receiver<()>> = HashMap::new();
        let mut tasks = JoinSet::new();

        let reason = loop {
            tokio::select! {
                maybe_event = events.next() => {
                    match maybe_event {
                        Some(event) => self.dispatch(event, &mut workers, &mut retired, &mut tasks),
                        None => {
                            info!("Resource event stream closed");
                            break "Event stream closed";
                        }
                    }
                }

                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        error!("Resource worker panicked: {}", e);
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break "Shutdown signal";
                }
            }
        };

        refresh_task.abort();

        // Close every queue and let in-flight events finish
        workers.clear();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Resource worker panicked: {}", e);
            }
        }

        self.emit_event(EngineEvent::Stopped {
            reason: reason.to_string(),
        });
        info!("All workers drained, engine stopped");

        Ok(())
    }

    /// Route an event to its resource's worker, spawning one if needed
    fn dispatch(
        &self,
        event: ResourceEvent,
        workers: &mut HashMap<ResourceKey, Worker>,
        retired: &mut HashMap<ResourceKey, oneshot::Receiver<()>>,
        tasks: &mut JoinSet<()>,
    ) {
        let key = event.resource().key();
        debug!("[{}] Received {} event", key, event.kind());

        let is_delete = matches!(event, ResourceEvent::Delete(_));

        // A worker that exited (panic) leaves a closed sender behind
        if workers.get(&key).is_some_and(|w| w.tx.is_closed()) {
            if let Some(dead) = workers.remove(&key) {
                retired.insert(key.clone(), dead.done);
            }
        }

        if !workers.contains_key(&key) {
            retired.retain(|_, done| {
                matches!(done.try_recv(), Err(oneshot::error::TryRecvError::Empty))
            });
            let predecessor = retired.remove(&key);
            let worker = self.spawn_worker(key.clone(), predecessor, tasks);
            workers.insert(key.clone(), worker);
        }

        if let Some(worker) = workers.get(&key) {
            if worker.tx.send(event).is_err() {
                warn!("[{}] Worker gone, dropping event", key);
            }
        }

        // Retire the worker once its queue drains
        if is_delete {
            if let Some(worker) = workers.remove(&key) {
                retired.insert(key, worker.done);
            }
        }
    }

    fn spawn_worker(
        &self,
        key: ResourceKey,
        predecessor: Option<oneshot::Receiver<()>>,
        tasks: &mut JoinSet<()>,
    ) -> Worker {
        let (tx, mut rx) = mpsc::unbounded_channel::<ResourceEvent>();
        let (done_tx, done) = oneshot::channel::<()>();
        let reconciler = Arc::clone(&self.reconciler);
        let event_tx = self.event_tx.clone();

        tasks.spawn(async move {
            let _done = done_tx;

            // Keep per-resource order across a delete and re-create
            if let Some(previous) = predecessor {
                let _ = previous.await;
            }

            while let Some(event) = rx.recv().await {
                let outcome = reconciler.handle(&event).await;
                debug!("[{}] {} event: {}", key, event.kind(), outcome);
                emit_event(&event_tx, EngineEvent::from_outcome(key.clone(), outcome));
            }
        });

        Worker { tx, done }
    }

    fn emit_event(&self, event: EngineEvent) {
        emit_event(&self.event_tx, event);
    }
}

/// Periodic full refresh; the interval is re-read before every sleep
async fn refresh_loop(
    reconciler: Arc<Reconciler>,
    config: watch::Receiver<ControllerConfig>,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    loop {
        let interval = config.borrow().refresh_interval();
        tokio::time::sleep(interval).await;

        info!("Refreshing record cache");
        match reconciler.refresh_cache().await {
            Ok(records) => {
                info!("Record cache refreshed, {} records", records);
                emit_event(&event_tx, EngineEvent::CacheRefreshed { records });
            }
            Err(e) => {
                error!("Failed to refresh record cache: {}", e);
                emit_event(&event_tx, EngineEvent::CacheRefreshFailed { error: e.to_string() });
            }
        }
    }
}

/// Send an engine event, dropping it with a warning when the channel is full
fn emit_event(tx: &mpsc::Sender<EngineEvent>, event: EngineEvent) {
    if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event) {
        warn!("Event channel full, dropping event. Consider increasing the event channel capacity.");
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
