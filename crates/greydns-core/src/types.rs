//! Provider-independent DNS data model
//!
//! Every provider adapter converts its own wire representation to and from
//! these types. The engine and the cache never see anything else.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Zone name → provider zone ID
pub type ZoneTable = HashMap<String, String>;

/// Domain name → managed record
pub type RecordMap = HashMap<String, DnsRecord>;

/// Supported DNS record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    Aaaa,
    /// Canonical name record
    Cname,
    /// Text record
    Txt,
    /// Mail exchange record
    Mx,
}

impl RecordType {
    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
            RecordType::Mx => "MX",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "TXT" => Ok(RecordType::Txt),
            "MX" => Ok(RecordType::Mx),
            other => Err(crate::Error::config(format!(
                "Unsupported record type: {}",
                other
            ))),
        }
    }
}

/// A DNS record as known to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-specific record handle, only used for update/delete
    pub id: String,
    /// Fully-qualified record name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Record content (address, target, text)
    pub content: String,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Free-text comment carrying the ownership tag
    pub comment: String,
    /// Proxy flag, for providers that have one
    pub proxied: Option<bool>,
    /// Zone the record lives in
    pub zone_id: String,
}

/// A DNS zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    /// Provider zone ID
    pub id: String,
    /// Zone name (e.g. "example.com")
    pub name: String,
}

/// Parameters for creating a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRecordParams {
    pub name: String,
    pub record_type: RecordType,
    pub content: String,
    pub ttl: u32,
    pub comment: String,
    pub proxied: Option<bool>,
    pub zone_id: String,
}

/// Parameters for updating a record in place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRecordParams {
    pub record_id: String,
    pub name: String,
    pub record_type: RecordType,
    pub content: String,
    pub ttl: u32,
    pub comment: String,
    pub proxied: Option<bool>,
    pub zone_id: String,
}
