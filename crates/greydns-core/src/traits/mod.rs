//! Core traits for greydns
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DnsProvider`]: Zone lookup and record CRUD against a DNS backend
//! - [`Notifier`]: Outbound notifications about resources

pub mod dns_provider;
pub mod notifier;

pub use dns_provider::{Credentials, DnsProvider, DnsProviderFactory};
pub use notifier::{MemoryNotifier, Notification, Notifier, Severity, REASON_DUPLICATE_DOMAIN};
