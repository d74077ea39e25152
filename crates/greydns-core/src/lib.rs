// # greydns-core
//
// Core library for annotation-driven DNS record management.
//
// ## Architecture Overview
//
// This library owns every decision greydns makes about DNS records:
// - **DnsProvider**: Trait for zone lookup and record CRUD against a backend
// - **Notifier**: Trait for warning a resource about a duplicate domain claim
// - **RecordCache**: In-memory view of the managed records at the provider
// - **Reconciler**: Ownership arbitration for a single resource event
// - **SyncEngine**: Run loop (per-resource workers, periodic refresh)
// - **ProviderRegistry**: Plugin-based registry for DNS providers
//
// ## Design Principles
//
// 1. **Ownership first**: a record is only touched by the resource named in its tag
// 2. **Event-Driven**: resource events arrive as an async stream
// 3. **Plugin-Based**: providers are registered by name, no hard-coded if-else
// 4. **Library-First**: the orchestration layer only translates objects to snapshots

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod ownership;
pub mod registry;
pub mod resource;
pub mod traits;
pub mod types;
pub mod zones;

// Re-export core types for convenience
pub use cache::RecordCache;
pub use config::ControllerConfig;
pub use engine::{EngineEvent, ReconcileOutcome, Reconciler, SyncEngine};
pub use error::{Error, ProviderErrorKind, Result};
pub use registry::ProviderRegistry;
pub use resource::{DnsIntent, ResourceEvent, ResourceKey, ResourceSnapshot};
pub use traits::{Credentials, DnsProvider, DnsProviderFactory, Notification, Notifier};
pub use types::{DnsRecord, RecordMap, RecordType, Zone, ZoneTable};
pub use zones::ZoneResolver;
